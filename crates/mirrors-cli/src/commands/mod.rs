pub mod completions;
pub mod doctor;
pub mod man_pages;
pub mod plan;
pub mod report;
pub mod sync;
pub mod targets;
pub mod verify;

use indicatif::{ProgressBar, ProgressStyle};
use mirrors_core::CoreError;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_VERIFY_FAILED: u8 = 3;
pub const EXIT_SANDBOX_UNAVAILABLE: u8 = 4;
pub const EXIT_CANCELLED: u8 = 130;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Render a core error so `main` can map it to an exit code by prefix.
pub fn describe(err: &CoreError) -> String {
    match err {
        CoreError::SandboxUnavailable(_) | CoreError::Config(_) => err.to_string(),
        _ if err.is_sandbox_unavailable() => format!("sandbox backend unavailable: {err}"),
        _ => err.to_string(),
    }
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Colour a job state or verification status name for terminal output.
pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "succeeded" | "verified" | "enabled" => Style::new().green().apply_to(state).to_string(),
        "running" => Style::new().cyan().bold().apply_to(state).to_string(),
        "failed" => Style::new().red().bold().apply_to(state).to_string(),
        "missing" | "cancelled" => Style::new().yellow().apply_to(state).to_string(),
        "skipped" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrors_schema::ConfigError;

    #[test]
    fn json_pretty_serializes_string() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn colorize_state_keeps_unknown_names() {
        assert_eq!(colorize_state("queued"), "queued");
        assert!(colorize_state("failed").contains("failed"));
    }

    #[test]
    fn describe_prefixes_match_exit_code_mapping() {
        let config = CoreError::Config(ConfigError::UnknownDistribution("gentoo".to_owned()));
        assert!(describe(&config).starts_with("configuration error:"));

        let lost = CoreError::Sandbox(mirrors_runtime::SandboxError::Unavailable(
            "podman not found".to_owned(),
        ));
        assert!(describe(&lost).starts_with("sandbox backend unavailable:"));

        let aborted = CoreError::SandboxUnavailable("daemon went away".to_owned());
        assert!(describe(&aborted).starts_with("sandbox backend unavailable:"));
    }
}
