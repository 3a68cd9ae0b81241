use crate::distribution::{Distribution, RepoKind};
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_MAX_CONCURRENT_SYNCS: usize = 3;

/// Top-level mirror configuration, loaded from TOML.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apt_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yum_path: Option<PathBuf>,
    #[serde(default = "default_runtime")]
    pub container_runtime: String,
    #[serde(default = "default_max_concurrent_syncs")]
    pub max_concurrent_syncs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_verifications: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyring_path: Option<PathBuf>,
    #[serde(default = "default_distributions")]
    pub distributions: BTreeMap<String, Distribution>,
}

fn default_base_path() -> PathBuf {
    PathBuf::from("/srv/mirror")
}

fn default_runtime() -> String {
    "podman".to_owned()
}

fn default_max_concurrent_syncs() -> usize {
    DEFAULT_MAX_CONCURRENT_SYNCS
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn default_distributions() -> BTreeMap<String, Distribution> {
    let mut debian = Distribution::new("debian", RepoKind::Apt);
    debian.versions = strings(&["bullseye", "bookworm", "trixie"]);
    debian.mirror_urls = strings(&["http://deb.debian.org/debian/"]);
    debian.components = strings(&["main", "contrib", "non-free"]);
    debian.architectures = strings(&["amd64", "arm64"]);

    let mut ubuntu = Distribution::new("ubuntu", RepoKind::Apt);
    ubuntu.versions = strings(&["focal", "jammy", "noble"]);
    ubuntu.mirror_urls = strings(&["http://archive.ubuntu.com/ubuntu/"]);
    ubuntu.components = strings(&["main", "restricted", "universe", "multiverse"]);
    ubuntu.architectures = strings(&["amd64", "arm64"]);

    let mut kali = Distribution::new("kali", RepoKind::Apt);
    kali.versions = strings(&["kali-rolling"]);
    kali.mirror_urls = strings(&["http://http.kali.org/kali/"]);
    kali.components = strings(&["main", "contrib", "non-free"]);
    kali.architectures = strings(&["amd64", "arm64"]);

    let mut rocky = Distribution::new("rocky", RepoKind::Yum);
    rocky.versions = strings(&["8", "9"]);
    rocky.mirror_urls = strings(&["https://download.rockylinux.org/pub/rocky/"]);
    rocky.architectures = strings(&["x86_64", "aarch64"]);

    // Requires a subscription, so it ships disabled.
    let mut rhel = Distribution::new("rhel", RepoKind::Yum);
    rhel.versions = strings(&["8", "9"]);
    rhel.mirror_urls = strings(&["https://cdn.redhat.com/content/dist/rhel/"]);
    rhel.architectures = strings(&["x86_64", "aarch64"]);
    rhel.enabled = false;

    [debian, ubuntu, kali, rocky, rhel]
        .into_iter()
        .map(|d| (d.name.clone(), d))
        .collect()
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            apt_path: None,
            yum_path: None,
            container_runtime: default_runtime(),
            max_concurrent_syncs: DEFAULT_MAX_CONCURRENT_SYNCS,
            max_concurrent_verifications: None,
            job_timeout_secs: None,
            keyring_path: None,
            distributions: default_distributions(),
        }
    }
}

impl MirrorConfig {
    pub fn parse_str(input: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(input)?;
        for (key, dist) in &mut config.distributions {
            if dist.name.is_empty() {
                dist.name.clone_from(key);
            }
        }
        config.validate_settings()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Load the file if it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_syncs == 0 {
            return Err(ConfigError::InvalidSetting(
                "max_concurrent_syncs must be at least 1".to_owned(),
            ));
        }
        if self.max_concurrent_verifications == Some(0) {
            return Err(ConfigError::InvalidSetting(
                "max_concurrent_verifications must be at least 1".to_owned(),
            ));
        }
        if self.job_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidSetting(
                "job_timeout_secs must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn apt_path(&self) -> PathBuf {
        self.apt_path
            .clone()
            .unwrap_or_else(|| self.base_path.join("apt"))
    }

    pub fn yum_path(&self) -> PathBuf {
        self.yum_path
            .clone()
            .unwrap_or_else(|| self.base_path.join("yum"))
    }

    pub fn distribution(&self, name: &str) -> Result<&Distribution, ConfigError> {
        self.distributions
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDistribution(name.to_owned()))
    }

    pub fn enabled_distributions(&self) -> impl Iterator<Item = &Distribution> {
        self.distributions.values().filter(|d| d.enabled)
    }
}

/// `$XDG_CONFIG_HOME/linux-mirrors/config.toml`, falling back to `~/.config`.
pub fn default_config_path() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("linux-mirrors/config.toml");
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
    PathBuf::from(home).join(".config/linux-mirrors/config.toml")
}
