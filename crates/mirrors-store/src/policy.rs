//! Which architectures a release is expected to carry.
//!
//! Configured architectures are not always published for every release:
//! Debian gained arm64 in jessie, Ubuntu dropped i386 after bionic, and the
//! RHEL family only ships ppc64le and s390x from 9 on. Checks skip
//! architectures a release never had instead of failing on them.

use mirrors_schema::{Distribution, Family};

const DEBIAN_RELEASES: &[&str] = &[
    "wheezy", "jessie", "stretch", "buster", "bullseye", "bookworm", "trixie", "forky",
];
const UBUNTU_RELEASES: &[&str] = &[
    "trusty", "xenial", "bionic", "focal", "jammy", "mantic", "noble", "oracular", "plucky",
    "questing",
];

struct ArchRule {
    family: Family,
    architecture: &'static str,
    introduced: Option<&'static str>,
    retired_after: Option<&'static str>,
}

const RULES: &[ArchRule] = &[
    ArchRule {
        family: Family::Debian,
        architecture: "arm64",
        introduced: Some("jessie"),
        retired_after: None,
    },
    ArchRule {
        family: Family::Ubuntu,
        architecture: "i386",
        introduced: None,
        retired_after: Some("bionic"),
    },
    ArchRule {
        family: Family::RhelLike,
        architecture: "ppc64le",
        introduced: Some("9"),
        retired_after: None,
    },
    ArchRule {
        family: Family::RhelLike,
        architecture: "s390x",
        introduced: Some("9"),
        retired_after: None,
    },
    ArchRule {
        family: Family::RhelLike,
        architecture: "riscv64",
        introduced: Some("10"),
        retired_after: None,
    },
];

/// Position of `version` in the family's release order. Numeric versions
/// rank by their major number; unknown codenames have no rank.
fn release_rank(family: Family, version: &str) -> Option<u32> {
    let by_name = |list: &[&str]| list.iter().position(|v| *v == version).map(|p| p as u32);
    match family {
        Family::Debian => by_name(DEBIAN_RELEASES),
        Family::Ubuntu => by_name(UBUNTU_RELEASES),
        Family::RhelLike | Family::Epel | Family::Other => {
            version.split('.').next().and_then(|m| m.parse().ok())
        }
    }
}

/// Whether `version` of `dist` is expected to publish `arch`. Unknown
/// versions are assumed to carry every configured architecture.
pub fn architecture_expected(dist: &Distribution, version: &str, arch: &str) -> bool {
    let family = dist.family();
    let Some(rank) = release_rank(family, version) else {
        return true;
    };
    for rule in RULES
        .iter()
        .filter(|r| r.family == family && r.architecture == arch)
    {
        if let Some(first) = rule.introduced.and_then(|v| release_rank(family, v)) {
            if rank < first {
                return false;
            }
        }
        if let Some(last) = rule.retired_after.and_then(|v| release_rank(family, v)) {
            if rank > last {
                return false;
            }
        }
    }
    true
}

/// `all` holds architecture-independent packages and has no index of its own.
pub fn has_binary_index(arch: &str) -> bool {
    arch != "all"
}

/// The subset of `archs` that should exist on disk for `version`.
pub fn expected_architectures<'a>(
    dist: &Distribution,
    version: &str,
    archs: &[&'a str],
) -> Vec<&'a str> {
    archs
        .iter()
        .copied()
        .filter(|a| has_binary_index(a) && architecture_expected(dist, version, a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrors_schema::RepoKind;

    #[test]
    fn debian_arm64_starts_at_jessie() {
        let d = Distribution::new("debian", RepoKind::Apt);
        assert!(!architecture_expected(&d, "wheezy", "arm64"));
        assert!(architecture_expected(&d, "jessie", "arm64"));
        assert!(architecture_expected(&d, "bookworm", "arm64"));
        assert!(architecture_expected(&d, "wheezy", "amd64"));
    }

    #[test]
    fn ubuntu_i386_retired_after_bionic() {
        let d = Distribution::new("ubuntu", RepoKind::Apt);
        assert!(architecture_expected(&d, "bionic", "i386"));
        assert!(!architecture_expected(&d, "focal", "i386"));
        assert!(!architecture_expected(&d, "noble", "i386"));
    }

    #[test]
    fn rhel_family_numeric_versions() {
        let d = Distribution::new("rocky", RepoKind::Yum);
        assert!(!architecture_expected(&d, "8", "s390x"));
        assert!(architecture_expected(&d, "9", "s390x"));
        assert!(architecture_expected(&d, "9.4", "ppc64le"));
        assert!(!architecture_expected(&d, "9", "riscv64"));
        assert!(architecture_expected(&d, "10", "riscv64"));
    }

    #[test]
    fn unknown_versions_expect_everything() {
        let d = Distribution::new("debian", RepoKind::Apt);
        assert!(architecture_expected(&d, "sid", "arm64"));
        let k = Distribution::new("kali", RepoKind::Apt);
        assert!(architecture_expected(&k, "kali-rolling", "i386"));
    }

    #[test]
    fn all_is_never_expected_to_have_an_index() {
        let d = Distribution::new("debian", RepoKind::Apt);
        assert_eq!(
            expected_architectures(&d, "wheezy", &["amd64", "arm64", "all"]),
            vec!["amd64"]
        );
    }
}
