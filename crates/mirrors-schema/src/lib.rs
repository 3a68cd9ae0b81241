//! Distribution records, sync targets, and configuration for linux-mirrors.
//!
//! This crate defines the schema layer: the `Distribution` record consumed from
//! the TOML configuration (`MirrorConfig`), the `Target` unit of sync and
//! verification together with its expansion from distributions, and the
//! newtype identifiers shared by the other crates.

pub mod config;
pub mod distribution;
pub mod kind;
pub mod target;
pub mod types;

pub use config::{default_config_path, MirrorConfig, DEFAULT_MAX_CONCURRENT_SYNCS};
pub use distribution::{mirror_for_arch, normalize_url, Distribution, Family, RepoKind};
pub use kind::ErrorKind;
pub use target::{expand_targets, interleave_by_distribution, Granularity, Target};
pub use types::TargetKey;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeToml(#[from] toml::ser::Error),
    #[error("invalid distribution '{name}': {reason}")]
    InvalidDistribution { name: String, reason: String },
    #[error("unknown distribution: {0}")]
    UnknownDistribution(String),
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_distribution_display_names_both_parts() {
        let e = ConfigError::InvalidDistribution {
            name: "debian".to_owned(),
            reason: "no versions configured".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("debian"));
        assert!(msg.contains("no versions configured"));
    }

    #[test]
    fn unknown_distribution_display() {
        let e = ConfigError::UnknownDistribution("gentoo".to_owned());
        assert!(e.to_string().contains("gentoo"));
    }
}
