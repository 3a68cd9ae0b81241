use super::{
    colorize_state, describe, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS,
    EXIT_VERIFY_FAILED,
};
use mirrors_core::{Engine, TargetFilter};
use mirrors_runtime::{check_verifier_prereqs, format_missing};
use mirrors_store::{TargetVerification, VerificationReport, VerifyMode, VerifyStatus};

pub(super) fn print_entry(entry: &TargetVerification) {
    let key = entry.target.to_string();
    let mut line = format!("  {key:<32} {}", colorize_state(&entry.status.to_string()));
    if entry.files_checked > 0 {
        line.push_str(&format!(
            " [{}/{} files]",
            entry.files_matched, entry.files_checked
        ));
    }
    if entry.status != VerifyStatus::Verified {
        match entry.kind {
            Some(kind) => line.push_str(&format!(" ({kind}: {})", entry.reason)),
            None => line.push_str(&format!(" ({})", entry.reason)),
        }
    }
    println!("{line}");
    for sub in entry
        .subunits
        .iter()
        .filter(|s| s.status != VerifyStatus::Verified)
    {
        println!(
            "      {} {}: {}",
            colorize_state(&sub.status.to_string()),
            sub.name,
            sub.reason
        );
    }
}

pub(super) fn exit_code(report: &VerificationReport) -> u8 {
    if report.iter().all(|e| e.status == VerifyStatus::Verified) {
        EXIT_SUCCESS
    } else {
        EXIT_VERIFY_FAILED
    }
}

pub fn run(
    engine: &Engine,
    filter: &TargetFilter,
    mode: VerifyMode,
    require_signature: bool,
    json: bool,
) -> Result<u8, String> {
    let targets = engine.targets(filter).map_err(|e| describe(&e))?;
    if targets.is_empty() {
        return Err("no targets match the selection".to_owned());
    }

    if mode == VerifyMode::Cryptographic
        && std::env::var("LINUX_MIRRORS_SKIP_PREREQS").as_deref() != Ok("1")
    {
        let missing = check_verifier_prereqs();
        if !missing.is_empty() {
            return Err(format_missing(&missing));
        }
    }

    let options = engine.verify_options(mode, require_signature);
    let pb = (!json).then(|| spinner(&format!("verifying {} target(s) ({mode})...", targets.len())));
    let report = match engine.verify(&targets, options) {
        Ok(r) => r,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "verification failed");
            }
            return Err(describe(&e));
        }
    };
    let summary = report.summary();

    if let Some(pb) = &pb {
        if summary.verified == summary.total {
            spin_ok(pb, &summary.to_string());
        } else {
            spin_fail(pb, &summary.to_string());
        }
        for entry in report.iter() {
            print_entry(entry);
        }
        if mode == VerifyMode::Cryptographic {
            println!(
                "\n{} of {} listed files matched",
                summary.files_matched, summary.files_checked
            );
        }
    } else {
        let payload = serde_json::json!({
            "mode": mode,
            "summary": summary,
            "targets": report.iter().collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&payload)?);
    }

    Ok(exit_code(&report))
}
