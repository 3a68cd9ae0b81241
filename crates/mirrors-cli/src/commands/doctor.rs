use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use mirrors_runtime::{check_container_prereqs, check_verifier_prereqs, format_missing};
use mirrors_schema::MirrorConfig;
use mirrors_store::{MirrorLayout, VerificationReport};
use std::path::Path;

pub fn run(config_path: &Path, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    let config = if config_path.exists() {
        match MirrorConfig::load(config_path) {
            Ok(c) => {
                checks.push(Check::pass(
                    "config",
                    &format!("Configuration loaded from {}", config_path.display()),
                ));
                c
            }
            Err(e) => {
                checks.push(Check::fail(
                    "config",
                    &format!("Configuration {} is invalid: {e}", config_path.display()),
                ));
                return print_results(&checks, false, json_output);
            }
        }
    } else {
        checks.push(Check::info(
            "config",
            &format!(
                "No configuration at {} (using built-in defaults)",
                config_path.display()
            ),
        ));
        MirrorConfig::default()
    };

    check_distributions(&config, &mut checks);
    check_runtime(&config, &mut checks, &mut all_pass);
    check_verifier(&config, &mut checks, &mut all_pass);
    check_mirror_root(&config, &mut checks);

    print_results(&checks, all_pass, json_output)
}

fn check_distributions(config: &MirrorConfig, checks: &mut Vec<Check>) {
    for dist in config.distributions.values() {
        let name = format!("distribution:{}", dist.name);
        if !dist.enabled {
            checks.push(Check::info(&name, &format!("{} is disabled", dist.name)));
            continue;
        }
        match dist.validate() {
            Ok(()) => checks.push(Check::pass(
                &name,
                &format!(
                    "{} ({}): {} version(s), {} architecture(s)",
                    dist.name,
                    dist.kind,
                    dist.versions.len(),
                    dist.architectures.len()
                ),
            )),
            // Only this distribution's jobs fail; the rest still sync.
            Err(e) => checks.push(Check::warn(&name, &e.to_string())),
        }
    }
}

fn check_runtime(config: &MirrorConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = check_container_prereqs(&config.container_runtime);
    if missing.is_empty() {
        checks.push(Check::pass(
            "container_runtime",
            &format!("Container runtime '{}' available", config.container_runtime),
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "container_runtime",
            &format!("Missing prerequisites: {}", format_missing(&missing)),
        ));
    }
}

fn check_verifier(config: &MirrorConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = check_verifier_prereqs();
    if missing.is_empty() {
        checks.push(Check::pass("gpgv", "Signature verifier available"));
    } else {
        checks.push(Check::warn(
            "gpgv",
            &format!(
                "Cryptographic verification unavailable: {}",
                format_missing(&missing)
            ),
        ));
    }

    match &config.keyring_path {
        None => checks.push(Check::info(
            "keyring",
            "No keyring_path configured (cryptographic verification disabled)",
        )),
        Some(path) if path.is_file() => checks.push(Check::pass(
            "keyring",
            &format!("Keyring {} present", path.display()),
        )),
        Some(path) => {
            *all_pass = false;
            checks.push(Check::fail(
                "keyring",
                &format!("Keyring {} does not exist", path.display()),
            ));
        }
    }
}

fn check_mirror_root(config: &MirrorConfig, checks: &mut Vec<Check>) {
    let layout = MirrorLayout::from_config(config);
    for (name, root) in [("apt_path", config.apt_path()), ("yum_path", config.yum_path())] {
        if root.is_dir() {
            checks.push(Check::pass(name, &format!("{} exists", root.display())));
        } else {
            checks.push(Check::info(
                name,
                &format!("{} not created yet (made on first sync)", root.display()),
            ));
        }
    }

    let report_path = layout.report_path();
    match VerificationReport::load_or_default(&report_path) {
        Ok(report) if report.is_empty() => {
            checks.push(Check::info("report", "No verification results recorded"));
        }
        Ok(report) => checks.push(Check::info(
            "report",
            &format!("Latest verification: {}", report.summary()),
        )),
        Err(e) => checks.push(Check::warn(
            "report",
            &format!("Cannot read {}: {e}", report_path.display()),
        )),
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&json)?);
    } else {
        println!("linux-mirrors doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
