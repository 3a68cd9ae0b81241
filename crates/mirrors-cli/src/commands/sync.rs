use super::{
    colorize_state, describe, json_pretty, spin_fail, spin_ok, spinner, EXIT_CANCELLED,
    EXIT_FAILURE, EXIT_SUCCESS,
};
use mirrors_core::{CancelToken, Engine, JobResult, JobState, SyncOptions, SyncSummary, TargetFilter};
use mirrors_runtime::{check_container_prereqs, format_missing};
use tracing::warn;

fn result_line(result: &JobResult) -> String {
    let icon = match result.state {
        JobState::Succeeded => "✓",
        JobState::Skipped => "-",
        _ => "✗",
    };
    let key = result.target.key().to_string();
    let mut line = format!("  {icon} {key:<32} {}", colorize_state(result.state.as_str()));
    if result.state != JobState::Succeeded {
        line.push_str(&format!(" ({})", result.exit));
    }
    line
}

pub fn run(
    engine: &Engine,
    filter: &TargetFilter,
    options: &SyncOptions,
    cancel: &CancelToken,
    json: bool,
) -> Result<u8, String> {
    let targets = engine.targets(filter).map_err(|e| describe(&e))?;
    if targets.is_empty() {
        return Err("no targets match the selection".to_owned());
    }

    let backend = options
        .backend
        .as_deref()
        .unwrap_or(&engine.config().container_runtime);
    if std::env::var("LINUX_MIRRORS_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = check_container_prereqs(backend);
        if !missing.is_empty() {
            return Err(format!(
                "sandbox backend unavailable: {}",
                format_missing(&missing)
            ));
        }
    }

    let total = targets.len();
    let mut stream = engine
        .sync(targets, options, cancel)
        .map_err(|e| describe(&e))?;

    let pb = (!json).then(|| spinner(&format!("syncing {total} target(s)...")));
    let mut results = Vec::with_capacity(total);
    for result in stream.by_ref() {
        if let Some(pb) = &pb {
            let line = result_line(&result);
            pb.suspend(|| println!("{line}"));
            pb.set_message(format!(
                "syncing: {}/{total} finished",
                results.len() + 1
            ));
        }
        results.push(result);
    }
    let outcome = stream.finish();
    if let Err(e) = &outcome {
        warn!("sync run aborted: {e}");
    }
    let summary: SyncSummary = results.iter().collect();

    if let Some(pb) = &pb {
        if summary.is_clean() && outcome.is_ok() {
            spin_ok(pb, &summary.to_string());
        } else {
            spin_fail(pb, &summary.to_string());
        }
    } else {
        let payload = serde_json::json!({
            "results": results,
            "summary": summary,
            "aborted": outcome.as_ref().err().map(ToString::to_string),
        });
        println!("{}", json_pretty(&payload)?);
    }

    outcome.map_err(|e| describe(&e))?;
    if cancel.is_cancelled() {
        Ok(EXIT_CANCELLED)
    } else if summary.is_clean() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILURE)
    }
}
