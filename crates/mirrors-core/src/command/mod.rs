//! Deterministic sync command building.
//!
//! `build_plan` turns a distribution record and a target into the files to
//! stage into the mirror tree and the command to run in the sandbox. The
//! output depends only on its inputs, so a re-sync of the same target always
//! runs byte-identical configuration.

mod apt;
mod yum;

use crate::CoreError;
use mirrors_runtime::{SandboxFile, MIRROR_MOUNT};
use mirrors_schema::{ConfigError, Distribution, RepoKind, Target};
use std::fmt;

/// Tree-relative directory holding staged sync configuration.
pub const STAGING_DIR: &str = ".linux-mirrors";

/// Staged configuration plus the command that consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub files: Vec<SandboxFile>,
    pub command: Vec<String>,
}

impl fmt::Display for SyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for file in &self.files {
            writeln!(f, "# {}/{}", MIRROR_MOUNT, file.path)?;
            f.write_str(&file.contents)?;
            if !file.contents.ends_with('\n') {
                writeln!(f)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "$ {}", self.command.join(" "))
    }
}

/// Build the sync plan for `target`. Fails with a config error when the
/// record cannot describe a sync or does not own the target.
pub fn build_plan(dist: &Distribution, target: &Target) -> Result<SyncPlan, CoreError> {
    dist.validate()?;
    let invalid = |reason: String| ConfigError::InvalidDistribution {
        name: dist.name.clone(),
        reason,
    };
    if dist.name != target.distribution || dist.kind != target.kind {
        let reason = format!("target {target} does not belong to this distribution");
        return Err(invalid(reason).into());
    }
    if !dist.versions.contains(&target.version) {
        return Err(invalid(format!("version '{}' is not configured", target.version)).into());
    }
    if let Some(arch) = &target.architecture {
        if !dist.architectures.contains(arch) {
            return Err(invalid(format!("architecture '{arch}' is not configured")).into());
        }
    }

    let dir = format!("{STAGING_DIR}/{}", target.key().slug());
    Ok(match dist.kind {
        RepoKind::Apt => apt::plan(dist, target, &dir),
        RepoKind::Yum => yum::plan(dist, target, &dir),
    })
}

/// Quote `s` for a POSIX shell unless it is made only of safe characters.
fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if safe {
        s.to_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Last path segment of a URL, used to name downloaded files.
fn url_file_name(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("key")
}

fn mount_path(rel: &str) -> String {
    format!("{MIRROR_MOUNT}/{rel}")
}
