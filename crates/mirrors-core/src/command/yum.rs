use super::{mount_path, shell_quote, url_file_name, SyncPlan};
use mirrors_runtime::{SandboxFile, MIRROR_MOUNT};
use mirrors_schema::{normalize_url, Distribution, Family, Target};
use std::fmt::Write as _;

const RHEL_REPOS: &[&str] = &["BaseOS", "AppStream", "codeready-builder", "supplementary"];
const EPEL_REPOS: &[&str] = &["Everything"];
const DEFAULT_REPOS: &[&str] = &["BaseOS", "AppStream"];

/// Repositories to mirror: the configured components, else the family's set.
fn repositories(dist: &Distribution) -> Vec<&str> {
    if !dist.components.is_empty() {
        return dist.components.iter().map(String::as_str).collect();
    }
    match dist.family() {
        Family::RhelLike => RHEL_REPOS.to_vec(),
        Family::Epel => EPEL_REPOS.to_vec(),
        Family::Debian | Family::Ubuntu | Family::Other => DEFAULT_REPOS.to_vec(),
    }
}

fn repo_id(dist: &Distribution, version: &str, repo: &str, arch: &str) -> String {
    format!(
        "{}-{version}-{}-{arch}",
        dist.name,
        repo.to_ascii_lowercase()
    )
}

fn base_url(dist: &Distribution, mirror: &str, version: &str, repo: &str, arch: &str) -> String {
    let mirror = normalize_url(mirror);
    match dist.family() {
        Family::Epel => format!("{mirror}{version}/{repo}/{arch}/"),
        _ => format!("{mirror}{version}/{repo}/{arch}/os/"),
    }
}

fn key_paths(dist: &Distribution) -> Vec<String> {
    dist.gpg_key_urls
        .iter()
        .map(|url| format!("{MIRROR_MOUNT}/keys/{}", url_file_name(url)))
        .collect()
}

fn repo_file(dist: &Distribution, target: &Target) -> String {
    let version = &target.version;
    let keys = key_paths(dist);
    let mut text = String::new();
    for arch in target.architectures(dist) {
        for repo in repositories(dist) {
            let _ = writeln!(text, "[{}]", repo_id(dist, version, repo, arch));
            let _ = writeln!(text, "name={} {version} - {repo} ({arch})", dist.name);
            for (i, mirror) in dist.mirror_urls.iter().enumerate() {
                let url = base_url(dist, mirror, version, repo, arch);
                if i == 0 {
                    let _ = writeln!(text, "baseurl={url}");
                } else {
                    let _ = writeln!(text, "        {url}");
                }
            }
            let _ = writeln!(text, "enabled=1");
            if dist.include_gpg_keys {
                let _ = writeln!(text, "gpgcheck=1");
                let uris: Vec<String> = keys.iter().map(|k| format!("file://{k}")).collect();
                let _ = writeln!(text, "gpgkey={}", uris.join(" "));
            } else {
                let _ = writeln!(text, "gpgcheck=0");
            }
            text.push('\n');
        }
    }
    text
}

pub(super) fn plan(dist: &Distribution, target: &Target, dir: &str) -> SyncPlan {
    let version = &target.version;
    let mut steps = Vec::new();

    if dist.include_gpg_keys {
        steps.push(format!("mkdir -p {MIRROR_MOUNT}/keys"));
        for (url, path) in dist.gpg_key_urls.iter().zip(key_paths(dist)) {
            let path = shell_quote(&path);
            steps.push(format!("curl -fsSL {} -o {path}", shell_quote(url)));
            steps.push(format!("rpm --import {path}"));
        }
    }

    let reposdir = mount_path(dir);
    for arch in target.architectures(dist) {
        for repo in repositories(dist) {
            let mut cmd = format!(
                "dnf reposync --setopt=reposdir={} --repoid={} --arch={},noarch \
                 --download-path={} --download-metadata --delete --newest-only",
                shell_quote(&reposdir),
                shell_quote(&repo_id(dist, version, repo, arch)),
                shell_quote(arch),
                shell_quote(&format!("{MIRROR_MOUNT}/{arch}")),
            );
            if dist.include_gpg_keys {
                cmd.push_str(" --gpgcheck");
            }
            steps.push(cmd);
        }
    }

    SyncPlan {
        files: vec![SandboxFile {
            path: format!("{dir}/mirror.repo"),
            contents: repo_file(dist, target),
        }],
        command: vec!["sh".to_owned(), "-c".to_owned(), steps.join(" && ")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrors_schema::RepoKind;

    fn rocky() -> Distribution {
        let mut d = Distribution::new("rocky", RepoKind::Yum);
        d.versions = vec!["9".to_owned()];
        d.mirror_urls = vec!["https://download.rockylinux.org/pub/rocky".to_owned()];
        d.architectures = vec!["x86_64".to_owned(), "aarch64".to_owned()];
        d
    }

    #[test]
    fn rhel_family_repositories() {
        let d = rocky();
        let text = repo_file(&d, &Target::new("rocky", RepoKind::Yum, "9"));
        assert!(text.contains("[rocky-9-baseos-x86_64]\n"));
        assert!(text.contains("[rocky-9-codeready-builder-aarch64]\n"));
        assert!(text.contains("[rocky-9-supplementary-x86_64]\n"));
        assert!(text.contains(
            "baseurl=https://download.rockylinux.org/pub/rocky/9/AppStream/x86_64/os/\n"
        ));
        assert!(text.contains("gpgcheck=0\n"));
    }

    #[test]
    fn epel_uses_everything() {
        let mut d = Distribution::new("epel", RepoKind::Yum);
        d.versions = vec!["9".to_owned()];
        d.mirror_urls = vec!["https://dl.fedoraproject.org/pub/epel/".to_owned()];
        d.architectures = vec!["x86_64".to_owned()];
        let text = repo_file(&d, &Target::new("epel", RepoKind::Yum, "9"));
        assert!(text.contains("[epel-9-everything-x86_64]\n"));
        assert!(text.contains("baseurl=https://dl.fedoraproject.org/pub/epel/9/Everything/x86_64/\n"));
        assert_eq!(text.matches('[').count(), 1);
    }

    #[test]
    fn reposync_policy_flags() {
        let d = rocky();
        let t = Target::new("rocky", RepoKind::Yum, "9").with_architecture("x86_64");
        let p = plan(&d, &t, ".linux-mirrors/rocky-9-x86_64");
        let script = &p.command[2];
        assert_eq!(script.matches("dnf reposync").count(), 4);
        assert!(script.contains("--download-path=/mirror/x86_64"));
        assert!(script.contains("--delete"));
        assert!(script.contains("--newest-only"));
        assert!(script.contains("--setopt=reposdir=/mirror/.linux-mirrors/rocky-9-x86_64"));
        assert!(!script.contains("aarch64"));
        assert_eq!(p.files[0].path, ".linux-mirrors/rocky-9-x86_64/mirror.repo");
    }

    #[test]
    fn gpg_keys_imported_before_sync() {
        let mut d = rocky();
        d.include_gpg_keys = true;
        d.gpg_key_urls = vec!["https://dl.rockylinux.org/pub/rocky/RPM-GPG-KEY-Rocky-9".to_owned()];
        let t = Target::new("rocky", RepoKind::Yum, "9");
        let p = plan(&d, &t, ".linux-mirrors/rocky-9");
        let script = &p.command[2];
        let import = script.find("rpm --import /mirror/keys/RPM-GPG-KEY-Rocky-9").unwrap();
        let sync = script.find("dnf reposync").unwrap();
        assert!(import < sync);
        assert!(script.contains("--gpgcheck"));
        let text = repo_file(&d, &t);
        assert!(text.contains("gpgkey=file:///mirror/keys/RPM-GPG-KEY-Rocky-9\n"));
    }

    #[test]
    fn configured_components_override_family() {
        let mut d = rocky();
        d.components = vec!["BaseOS".to_owned()];
        let text = repo_file(&d, &Target::new("rocky", RepoKind::Yum, "9"));
        assert_eq!(text.matches("[rocky-9-").count(), 2);
    }
}
