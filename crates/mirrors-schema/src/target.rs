use crate::distribution::{Distribution, RepoKind};
use crate::types::TargetKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;

/// One unit of sync and verification: a distribution version, optionally
/// narrowed to a single architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub distribution: String,
    pub kind: RepoKind,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

/// How finely distributions are split into targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// One target per version covering every configured architecture.
    #[default]
    Version,
    /// One target per version and architecture.
    Architecture,
}

impl Target {
    pub fn new(distribution: &str, kind: RepoKind, version: &str) -> Self {
        Self {
            distribution: distribution.to_owned(),
            kind,
            version: version.to_owned(),
            architecture: None,
        }
    }

    #[must_use]
    pub fn with_architecture(mut self, arch: &str) -> Self {
        self.architecture = Some(arch.to_owned());
        self
    }

    pub fn key(&self) -> TargetKey {
        match &self.architecture {
            Some(arch) => TargetKey::new(format!("{}/{}/{arch}", self.distribution, self.version)),
            None => self.tree_key(),
        }
    }

    /// Key of the on-disk tree this target writes to. Per-architecture targets
    /// of one version share a tree.
    pub fn tree_key(&self) -> TargetKey {
        TargetKey::new(format!("{}/{}", self.distribution, self.version))
    }

    /// Architectures this target covers, given its distribution record.
    pub fn architectures<'a>(&'a self, dist: &'a Distribution) -> Vec<&'a str> {
        match &self.architecture {
            Some(arch) => vec![arch.as_str()],
            None => dist.architectures.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key().as_str())
    }
}

/// Expand distributions into a flat, duplicate-free list of targets.
///
/// Disabled distributions are expanded too so callers can report them as
/// skipped; the scheduler never admits them.
pub fn expand_targets<'a>(
    distributions: impl IntoIterator<Item = &'a Distribution>,
    granularity: Granularity,
) -> Vec<Target> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for dist in distributions {
        for version in &dist.versions {
            let base = Target::new(&dist.name, dist.kind, version);
            match granularity {
                Granularity::Version => {
                    if seen.insert(base.key()) {
                        targets.push(base);
                    }
                }
                Granularity::Architecture => {
                    for arch in &dist.architectures {
                        let t = base.clone().with_architecture(arch);
                        if seen.insert(t.key()) {
                            targets.push(t);
                        }
                    }
                }
            }
        }
    }

    targets
}

/// Reorder targets so distributions take turns: the first target of every
/// distribution, then the second of every distribution, and so on.
/// Relative order within a distribution is preserved.
pub fn interleave_by_distribution(targets: Vec<Target>) -> VecDeque<Target> {
    let mut order: Vec<String> = Vec::new();
    let mut queues: BTreeMap<String, VecDeque<Target>> = BTreeMap::new();

    for t in targets {
        if !queues.contains_key(&t.distribution) {
            order.push(t.distribution.clone());
        }
        queues.entry(t.distribution.clone()).or_default().push_back(t);
    }

    let mut out = VecDeque::new();
    loop {
        let mut progressed = false;
        for name in &order {
            if let Some(t) = queues.get_mut(name).and_then(VecDeque::pop_front) {
                out.push_back(t);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(name: &str, versions: &[&str], archs: &[&str]) -> Distribution {
        let mut d = Distribution::new(name, RepoKind::Apt);
        d.versions = versions.iter().map(|v| (*v).to_owned()).collect();
        d.architectures = archs.iter().map(|a| (*a).to_owned()).collect();
        d
    }

    #[test]
    fn key_formats() {
        let t = Target::new("debian", RepoKind::Apt, "bookworm");
        assert_eq!(t.key(), "debian/bookworm");
        let t = t.with_architecture("arm64");
        assert_eq!(t.key(), "debian/bookworm/arm64");
        assert_eq!(t.tree_key(), "debian/bookworm");
    }

    #[test]
    fn expand_per_version() {
        let d = dist("debian", &["bookworm", "trixie"], &["amd64", "arm64"]);
        let targets = expand_targets([&d], Granularity::Version);
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.architecture.is_none()));
    }

    #[test]
    fn expand_per_architecture() {
        let d = dist("debian", &["bookworm", "trixie"], &["amd64", "arm64"]);
        let targets = expand_targets([&d], Granularity::Architecture);
        assert_eq!(targets.len(), 4);
        assert_eq!(targets[0].key(), "debian/bookworm/amd64");
        assert_eq!(targets[3].key(), "debian/trixie/arm64");
    }

    #[test]
    fn expansion_deduplicates() {
        let d = dist("debian", &["bookworm", "bookworm"], &["amd64", "amd64"]);
        assert_eq!(expand_targets([&d], Granularity::Version).len(), 1);
        assert_eq!(expand_targets([&d], Granularity::Architecture).len(), 1);
    }

    #[test]
    fn target_architectures_follow_narrowing() {
        let d = dist("debian", &["bookworm"], &["amd64", "arm64"]);
        let t = Target::new("debian", RepoKind::Apt, "bookworm");
        assert_eq!(t.architectures(&d), vec!["amd64", "arm64"]);
        let t = t.with_architecture("arm64");
        assert_eq!(t.architectures(&d), vec!["arm64"]);
    }

    #[test]
    fn interleave_round_robins_distributions() {
        let big = dist("debian", &["a", "b", "c", "d"], &["amd64"]);
        let small = dist("ubuntu", &["x", "y"], &["amd64"]);
        let targets = expand_targets([&big, &small], Granularity::Version);
        let order: Vec<String> = interleave_by_distribution(targets)
            .into_iter()
            .map(|t| t.key().into_inner())
            .collect();
        assert_eq!(
            order,
            vec![
                "debian/a", "ubuntu/x", "debian/b", "ubuntu/y", "debian/c", "debian/d"
            ]
        );
    }
}
