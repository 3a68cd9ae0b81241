use super::{colorize_state, describe, json_pretty, EXIT_SUCCESS};
use mirrors_core::{Engine, TargetFilter};

pub fn run(engine: &Engine, filter: &TargetFilter, json: bool) -> Result<u8, String> {
    let targets = engine.targets(filter).map_err(|e| describe(&e))?;
    let config = engine.config();

    if json {
        let entries: Vec<_> = targets
            .iter()
            .map(|t| {
                let enabled = config
                    .distributions
                    .get(&t.distribution)
                    .is_some_and(|d| d.enabled);
                serde_json::json!({
                    "key": t.key(),
                    "distribution": t.distribution,
                    "kind": t.kind,
                    "version": t.version,
                    "architecture": t.architecture,
                    "enabled": enabled,
                    "tree": engine.layout().tree_path(t),
                })
            })
            .collect();
        println!("{}", json_pretty(&entries)?);
        return Ok(EXIT_SUCCESS);
    }

    if targets.is_empty() {
        println!("no targets configured");
        return Ok(EXIT_SUCCESS);
    }
    println!("{:<32} {:<5} {:<48} STATE", "TARGET", "KIND", "TREE");
    for t in &targets {
        let enabled = config
            .distributions
            .get(&t.distribution)
            .is_some_and(|d| d.enabled);
        let state = if enabled { "enabled" } else { "skipped" };
        println!(
            "{:<32} {:<5} {:<48} {}",
            t.key().to_string(),
            t.kind.to_string(),
            engine.layout().tree_path(t).display().to_string(),
            colorize_state(state)
        );
    }
    Ok(EXIT_SUCCESS)
}
