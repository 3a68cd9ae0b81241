use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Repository metadata flavour of a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    Apt,
    Yum,
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apt => f.write_str("apt"),
            Self::Yum => f.write_str("yum"),
        }
    }
}

/// Distribution family, which decides additional suites and repo layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Debian,
    Ubuntu,
    RhelLike,
    Epel,
    Other,
}

const RHEL_LIKE: &[&str] = &["rhel", "rocky", "almalinux", "alma", "centos", "oracle", "oraclelinux"];

const ARM_CLASS: &[&str] = &["arm64", "armhf", "armel"];
const UBUNTU_PORTS: &str = "http://ports.ubuntu.com/ubuntu-ports/";

/// Canonical form of a mirror URL: trimmed, with exactly one trailing slash.
pub fn normalize_url(url: &str) -> String {
    format!("{}/", url.trim().trim_end_matches('/'))
}

fn host(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    rest.split('/').next().unwrap_or(rest)
}

/// The primary Ubuntu archive only carries x86 architectures.
fn lacks_arm(url: &str) -> bool {
    let h = host(url);
    h == "archive.ubuntu.com" || h == "security.ubuntu.com" || h.ends_with(".archive.ubuntu.com")
}

/// Mirror that actually serves `arch` when `url` is configured: ARM-class
/// architectures of the primary Ubuntu archive live on ubuntu-ports.
///
/// Sync configuration and tree verification both go through this, so the
/// directory a sync writes is the one verification reads.
pub fn mirror_for_arch(url: &str, arch: &str) -> String {
    if ARM_CLASS.contains(&arch) && lacks_arm(url) {
        UBUNTU_PORTS.to_owned()
    } else {
        normalize_url(url)
    }
}

/// A configured distribution: one upstream repository family with its
/// versions, mirrors, components and architectures.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Distribution {
    /// Filled from the config table key when omitted.
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: RepoKind,
    pub versions: Vec<String>,
    pub mirror_urls: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_schedule")]
    pub sync_schedule: String,
    #[serde(default)]
    pub include_gpg_keys: bool,
    #[serde(default)]
    pub gpg_key_urls: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_schedule() -> String {
    "daily".to_owned()
}

impl Distribution {
    pub fn new(name: &str, kind: RepoKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            versions: Vec::new(),
            mirror_urls: Vec::new(),
            components: Vec::new(),
            architectures: Vec::new(),
            enabled: true,
            sync_schedule: default_schedule(),
            include_gpg_keys: false,
            gpg_key_urls: Vec::new(),
        }
    }

    pub fn family(&self) -> Family {
        let name = self.name.to_ascii_lowercase();
        match name.as_str() {
            "debian" => Family::Debian,
            "ubuntu" => Family::Ubuntu,
            "epel" => Family::Epel,
            n if RHEL_LIKE.contains(&n) => Family::RhelLike,
            _ => Family::Other,
        }
    }

    /// Check the record is complete enough to build sync commands for.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidDistribution {
            name: self.name.clone(),
            reason: reason.to_owned(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.versions.is_empty() {
            return Err(invalid("no versions configured"));
        }
        if self.versions.iter().any(|v| v.trim().is_empty() || v.contains('/')) {
            return Err(invalid("versions must be non-empty and must not contain '/'"));
        }
        if self.mirror_urls.is_empty() {
            return Err(invalid("no mirror_urls configured"));
        }
        if let Some(url) = self
            .mirror_urls
            .iter()
            .find(|u| !(u.starts_with("http://") || u.starts_with("https://")))
        {
            return Err(invalid(&format!("mirror url '{url}' is not http(s)")));
        }
        if self.architectures.is_empty() {
            return Err(invalid("no architectures configured"));
        }
        if self.kind == RepoKind::Apt && self.components.is_empty() {
            return Err(invalid("apt distributions require at least one component"));
        }
        if self.include_gpg_keys && self.gpg_key_urls.is_empty() {
            return Err(invalid("include_gpg_keys is set but gpg_key_urls is empty"));
        }
        Ok(())
    }
}
