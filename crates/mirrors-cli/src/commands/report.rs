use super::verify::{exit_code, print_entry};
use super::{describe, json_pretty};
use mirrors_core::Engine;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let report = engine.latest_report().map_err(|e| describe(&e))?;

    if json {
        let payload = serde_json::json!({
            "path": engine.layout().report_path(),
            "summary": report.summary(),
            "targets": report.iter().collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&payload)?);
    } else if report.is_empty() {
        println!("no verification results recorded yet");
    } else {
        println!("{}\n", report.summary());
        for entry in report.iter() {
            print_entry(entry);
            println!(
                "      verified at {} ({})",
                entry.verified_at.format("%Y-%m-%d %H:%M:%S UTC"),
                entry.mode
            );
        }
    }
    Ok(exit_code(&report))
}
