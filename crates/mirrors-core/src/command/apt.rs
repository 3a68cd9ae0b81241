use super::{mount_path, shell_quote, url_file_name, SyncPlan};
use mirrors_runtime::{SandboxFile, MIRROR_MOUNT};
use mirrors_schema::{mirror_for_arch, Distribution, Family, Target};
use std::collections::HashSet;
use std::fmt::Write as _;

const DEBIAN_SECURITY: &str = "http://security.debian.org/debian-security/";

/// Debian releases whose security suite is `<codename>/updates` rather than
/// `<codename>-security`.
const LEGACY_SECURITY_SUITES: &[&str] = &["wheezy", "jessie", "stretch", "buster"];

struct Suite {
    /// Replaces the configured mirror when set.
    url: Option<&'static str>,
    name: String,
}

impl Suite {
    fn on_mirror(name: String) -> Self {
        Self { url: None, name }
    }
}

fn suites(dist: &Distribution, version: &str) -> Vec<Suite> {
    let mut out = vec![Suite::on_mirror(version.to_owned())];
    match dist.family() {
        Family::Debian => {
            out.push(Suite::on_mirror(format!("{version}-updates")));
            let security = if LEGACY_SECURITY_SUITES.contains(&version) {
                format!("{version}/updates")
            } else {
                format!("{version}-security")
            };
            out.push(Suite {
                url: Some(DEBIAN_SECURITY),
                name: security,
            });
        }
        Family::Ubuntu => {
            for pocket in ["security", "updates", "backports"] {
                out.push(Suite::on_mirror(format!("{version}-{pocket}")));
            }
        }
        Family::RhelLike | Family::Epel | Family::Other => {}
    }
    out
}

fn mirror_list(dist: &Distribution, target: &Target) -> String {
    let archs = target.architectures(dist);
    let base = MIRROR_MOUNT;
    let mut text = String::new();
    let _ = writeln!(text, "set base_path {base}");
    let _ = writeln!(text, "set mirror_path {base}/mirror");
    let _ = writeln!(text, "set skel_path {base}/skel");
    let _ = writeln!(text, "set var_path {base}/var");
    let _ = writeln!(text, "set cleanscript {base}/var/clean.sh");
    let _ = writeln!(text, "set defaultarch {}", archs.first().copied().unwrap_or("amd64"));
    let _ = writeln!(text, "set postmirror_script {base}/var/postmirror.sh");
    let _ = writeln!(text, "set run_postmirror 0");
    let _ = writeln!(text, "set nthreads 20");
    let _ = writeln!(text, "set _tilde 0");
    text.push('\n');

    let components = dist.components.join(" ");
    let suites = suites(dist, &target.version);
    let mut seen = HashSet::new();
    let mut clean: Vec<String> = Vec::new();
    for arch in &archs {
        for url in &dist.mirror_urls {
            for suite in &suites {
                let mirror = suite
                    .url
                    .map_or_else(|| mirror_for_arch(url, arch), str::to_owned);
                let line = format!("deb-{arch} {mirror} {} {components}", suite.name);
                if seen.insert(line.clone()) {
                    let _ = writeln!(text, "{line}");
                }
                if !clean.contains(&mirror) {
                    clean.push(mirror);
                }
            }
        }
    }

    text.push('\n');
    for url in &clean {
        let _ = writeln!(text, "clean {url}");
    }
    text
}

pub(super) fn plan(dist: &Distribution, target: &Target, dir: &str) -> SyncPlan {
    let list = format!("{dir}/mirror.list");
    let mirror = vec!["apt-mirror".to_owned(), mount_path(&list)];

    let command = if dist.include_gpg_keys {
        let mut steps = vec![format!("mkdir -p {MIRROR_MOUNT}/keys")];
        for url in &dist.gpg_key_urls {
            steps.push(format!(
                "curl -fsSL {} -o {}",
                shell_quote(url),
                shell_quote(&format!("{MIRROR_MOUNT}/keys/{}", url_file_name(url)))
            ));
        }
        steps.push(mirror.join(" "));
        vec!["sh".to_owned(), "-c".to_owned(), steps.join(" && ")]
    } else {
        mirror
    };

    SyncPlan {
        files: vec![SandboxFile {
            path: list,
            contents: mirror_list(dist, target),
        }],
        command,
    }
}
