use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check prerequisites for running sync jobs with the configured container
/// runtime. An empty list means everything needed is present.
pub fn check_container_prereqs(runtime: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    match runtime {
        "mock" => {}
        "podman" => {
            if !command_exists("podman") {
                missing.push(MissingPrereq {
                    name: "podman",
                    purpose: "isolated execution of sync jobs",
                    install_hint: "apt install podman | dnf install podman | zypper install podman | pacman -S podman",
                });
            }
        }
        "docker" => {
            if !command_exists("docker") {
                missing.push(MissingPrereq {
                    name: "docker",
                    purpose: "isolated execution of sync jobs",
                    install_hint: "apt install docker.io | dnf install moby-engine | pacman -S docker",
                });
            }
        }
        _ => missing.push(MissingPrereq {
            name: "container runtime",
            purpose: "isolated execution of sync jobs",
            install_hint: "set container_runtime to \"podman\" or \"docker\"",
        }),
    }

    missing
}

/// Check prerequisites for cryptographic verification.
pub fn check_verifier_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if !command_exists("gpgv") {
        missing.push(MissingPrereq {
            name: "gpgv",
            purpose: "checking repository metadata signatures",
            install_hint: "apt install gpgv | dnf install gnupg2 | zypper install gpg2 | pacman -S gnupg",
        });
    }
    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nlinux-mirrors needs these tools to sync and verify repositories.");
    msg
}
