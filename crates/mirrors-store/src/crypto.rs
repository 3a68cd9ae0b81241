//! Cryptographic verification: signed metadata, then every listed file's
//! digest.
//!
//! A digest mismatch does not stop the pass; all listed files are checked so
//! the report shows the full extent of the damage. Listed files that are not
//! on disk are counted as absent, since mirrors routinely skip compressed
//! variants they never fetched. A sub-unit still needs at least one present
//! file and, when its primary index is listed, one variant of that index.

use crate::digest::{EntryCheck, ManifestEntry};
use crate::layout::{AptRoot, MirrorLayout};
use crate::policy;
use crate::release::{split_clearsigned, ReleaseFile};
use crate::report::{SubunitResult, TargetVerification, VerifyMode, VerifyStatus};
use crate::repomd::parse_repomd;
use crate::signature::{SignatureStatus, SignatureVerifier, SignedMetadata};
use crate::structural::{scoped_name, subunit_name};
use crate::StoreError;
use mirrors_schema::{Distribution, ErrorKind, RepoKind, Target};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const MODE: VerifyMode = VerifyMode::Cryptographic;
const MAX_LISTED_MISMATCHES: usize = 5;

/// Digest counters and problems for one sub-unit.
#[derive(Default)]
struct Tally {
    checked: u64,
    matched: u64,
    absent: u64,
    mismatches: Vec<String>,
    error: Option<(ErrorKind, String)>,
    /// Name of the primary index when listed, and whether any variant of it
    /// is on disk.
    primary: Option<(&'static str, bool)>,
}

impl Tally {
    /// Check one listed file; returns whether it was on disk.
    fn check(&mut self, entry: &ManifestEntry, base: &Path, source: &str) -> bool {
        match entry.check(base, source) {
            Ok(EntryCheck::Matched) => {
                self.checked += 1;
                self.matched += 1;
                true
            }
            Ok(EntryCheck::Absent) => {
                self.absent += 1;
                false
            }
            Ok(EntryCheck::SizeMismatch { expected, actual }) => {
                self.checked += 1;
                self.mismatches
                    .push(format!("{}: size {actual}, expected {expected}", entry.path));
                true
            }
            Ok(EntryCheck::DigestMismatch { expected, actual }) => {
                self.checked += 1;
                self.mismatches.push(format!(
                    "{}: {} {actual}, expected {expected}",
                    entry.path, entry.algorithm
                ));
                true
            }
            Err(StoreError::MalformedMetadata { reason, .. }) => {
                self.error
                    .get_or_insert((ErrorKind::MalformedMetadata, reason));
                false
            }
            Err(e) => {
                self.checked += 1;
                self.error
                    .get_or_insert((ErrorKind::Io, format!("{}: {e}", entry.path)));
                true
            }
        }
    }

    /// Check a variant of the sub-unit's primary index.
    fn check_index(
        &mut self,
        entry: &ManifestEntry,
        base: &Path,
        source: &str,
        index: &'static str,
    ) {
        let present = self.check(entry, base, source);
        let seen = self.primary.get_or_insert((index, false));
        seen.1 |= present;
    }

    fn into_subunit(self, name: String) -> SubunitResult {
        let mut s = if let Some((kind, reason)) = self.error {
            SubunitResult::problem(name, VerifyStatus::Failed, kind, reason)
        } else if !self.mismatches.is_empty() {
            let total = self.mismatches.len();
            let mut listed = self.mismatches[..total.min(MAX_LISTED_MISMATCHES)].join(", ");
            if total > MAX_LISTED_MISMATCHES {
                listed.push_str(&format!(", and {} more", total - MAX_LISTED_MISMATCHES));
            }
            SubunitResult::problem(
                name,
                VerifyStatus::Failed,
                ErrorKind::ChecksumMismatch,
                format!("{total} checksum mismatch(es): {listed}"),
            )
        } else if self.checked == 0 {
            SubunitResult::problem(
                name,
                VerifyStatus::Failed,
                ErrorKind::TreeIncomplete,
                format!("none of the {} listed file(s) is present", self.absent),
            )
        } else if let Some((index, false)) = self.primary {
            SubunitResult::problem(
                name,
                VerifyStatus::Failed,
                ErrorKind::TreeIncomplete,
                format!("no listed {index} index is present"),
            )
        } else {
            let mut ok = SubunitResult::verified(name);
            ok.reason = format!("{} files verified", self.matched);
            ok
        };
        s.files_checked = self.checked;
        s.files_matched = self.matched;
        s.files_absent = self.absent;
        s
    }
}

/// Sub-unit result for a signature check.
fn signature_subunit(name: &str, status: SignatureStatus, require: bool) -> SubunitResult {
    let mut s = match status {
        SignatureStatus::Valid => SubunitResult::verified(name),
        SignatureStatus::Absent if !require => {
            let mut s = SubunitResult::verified(name);
            s.reason = "unsigned".to_owned();
            s
        }
        SignatureStatus::Absent => SubunitResult::problem(
            name,
            VerifyStatus::Failed,
            ErrorKind::SignatureAbsent,
            "no signature for metadata",
        ),
        SignatureStatus::KeyUnknown => SubunitResult::problem(
            name,
            VerifyStatus::Failed,
            ErrorKind::KeyUnknown,
            "signing key not in trusted keyring",
        ),
        SignatureStatus::Invalid => SubunitResult::problem(
            name,
            VerifyStatus::Failed,
            ErrorKind::SignatureInvalid,
            "signature does not verify",
        ),
    };
    s.signature_status = Some(status);
    s
}

/// Verify signatures and digests of one target. Only a missing or unusable
/// verifier is an error; everything found on disk is a result.
pub fn verify_cryptographic(
    layout: &MirrorLayout,
    dist: &Distribution,
    target: &Target,
    verifier: &dyn SignatureVerifier,
    require_signature: bool,
) -> Result<TargetVerification, StoreError> {
    let tree = layout.tree_path(target);
    if !tree.is_dir() {
        return Ok(TargetVerification::single(
            target,
            MODE,
            VerifyStatus::Missing,
            Some(ErrorKind::TreeMissing),
            format!("repository directory not found at {}", tree.display()),
        ));
    }
    debug!(
        "cryptographic check of {target} at {} using {}",
        tree.display(),
        verifier.name()
    );
    match target.kind {
        RepoKind::Apt => verify_apt(&tree, dist, target, verifier, require_signature),
        RepoKind::Yum => verify_yum(&tree, dist, target, verifier, require_signature),
    }
}

enum AptMetadata {
    Inline(Vec<u8>),
    Detached { release: Vec<u8>, signature: Vec<u8> },
    Unsigned(Vec<u8>),
}

fn locate_apt_metadata(dists: &Path) -> Result<Option<AptMetadata>, std::io::Error> {
    let inrelease = dists.join("InRelease");
    if inrelease.is_file() {
        return Ok(Some(AptMetadata::Inline(fs::read(inrelease)?)));
    }
    let release = dists.join("Release");
    if !release.is_file() {
        return Ok(None);
    }
    let data = fs::read(release)?;
    let gpg = dists.join("Release.gpg");
    if gpg.is_file() {
        Ok(Some(AptMetadata::Detached {
            release: data,
            signature: fs::read(gpg)?,
        }))
    } else {
        Ok(Some(AptMetadata::Unsigned(data)))
    }
}

fn verify_apt(
    tree: &Path,
    dist: &Distribution,
    target: &Target,
    verifier: &dyn SignatureVerifier,
    require_signature: bool,
) -> Result<TargetVerification, StoreError> {
    let version = &target.version;
    let archs = policy::expected_architectures(dist, version, &target.architectures(dist));
    let (roots, unresolved) = MirrorLayout::group_apt_roots(tree, dist, version, &archs);
    if roots.is_empty() {
        return Ok(TargetVerification::single(
            target,
            MODE,
            VerifyStatus::Missing,
            Some(ErrorKind::TreeMissing),
            format!("missing dists/{version} directory"),
        ));
    }

    let scoped = roots.len() > 1;
    let mut subunits = Vec::new();
    for root in &roots {
        let prefix = scoped.then_some(root.label.as_str());
        subunits.extend(verify_apt_root(
            root,
            dist,
            target,
            prefix,
            verifier,
            require_signature,
        )?);
    }
    for arch in unresolved {
        for component in &dist.components {
            subunits.push(SubunitResult::problem(
                format!("{component}/{arch}"),
                VerifyStatus::Missing,
                ErrorKind::TreeMissing,
                format!("no dists/{version} for {arch} under any configured mirror"),
            ));
        }
    }
    Ok(TargetVerification::from_subunits(target, MODE, subunits))
}

fn verify_apt_root(
    root: &AptRoot<'_>,
    dist: &Distribution,
    target: &Target,
    prefix: Option<&str>,
    verifier: &dyn SignatureVerifier,
    require_signature: bool,
) -> Result<Vec<SubunitResult>, StoreError> {
    let version = &target.version;
    let dists = root.path.join("dists").join(version);
    let fail = |name: &str, kind: ErrorKind, reason: String| {
        vec![SubunitResult::problem(
            scoped_name(prefix, name),
            VerifyStatus::Failed,
            kind,
            reason,
        )]
    };

    let metadata = match locate_apt_metadata(&dists) {
        Ok(Some(m)) => m,
        Ok(None) => {
            return Ok(vec![SubunitResult::problem(
                scoped_name(prefix, "Release"),
                VerifyStatus::Missing,
                ErrorKind::TreeMissing,
                format!("no Release or InRelease in dists/{version}"),
            )])
        }
        Err(e) => {
            return Ok(fail(
                "Release",
                ErrorKind::Io,
                format!("cannot read Release: {e}"),
            ))
        }
    };

    let (status, text, source) = match &metadata {
        AptMetadata::Inline(message) => {
            let status = verifier.verify(&SignedMetadata::Inline { message })?;
            let text = String::from_utf8_lossy(message);
            let text = match split_clearsigned(&text) {
                Ok(cs) => cs.text,
                Err(e) => {
                    return Ok(fail(
                        "InRelease",
                        ErrorKind::MalformedMetadata,
                        e.to_string(),
                    ))
                }
            };
            (status, text, "InRelease")
        }
        AptMetadata::Detached { release, signature } => {
            let status = verifier.verify(&SignedMetadata::Detached {
                data: release,
                signature,
            })?;
            (status, String::from_utf8_lossy(release).into_owned(), "Release")
        }
        AptMetadata::Unsigned(release) => (
            SignatureStatus::Absent,
            String::from_utf8_lossy(release).into_owned(),
            "Release",
        ),
    };

    let sig = signature_subunit(&scoped_name(prefix, source), status, require_signature);
    if matches!(status, SignatureStatus::Invalid | SignatureStatus::KeyUnknown) {
        warn!("{target}: {source} signature is {status}");
        return Ok(vec![sig]);
    }

    let release = match ReleaseFile::parse(&text, source) {
        Ok(r) => r,
        Err(e) => {
            let mut out = vec![sig];
            out.extend(fail(source, ErrorKind::MalformedMetadata, e.to_string()));
            return Ok(out);
        }
    };
    let Some((algorithm, entries)) = release.strongest_checksums() else {
        let mut out = vec![sig];
        out.extend(fail(
            source,
            ErrorKind::MalformedMetadata,
            format!("{source} lists no checksums"),
        ));
        return Ok(out);
    };
    debug!(
        "{target}: checking {} entries of {} by {algorithm}",
        entries.len(),
        root.label
    );

    let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
    for entry in entries {
        let Some(unit) = apt_entry_subunit(&entry.path, &dist.components, &root.architectures)
        else {
            continue;
        };
        let tally = tallies.entry(unit).or_default();
        if is_packages_index(&entry.path) {
            tally.check_index(entry, &dists, source, "Packages");
        } else {
            tally.check(entry, &dists, source);
        }
    }

    let mut subunits = vec![sig];
    if tallies.is_empty() {
        subunits.extend(fail(
            "files",
            ErrorKind::TreeIncomplete,
            format!("{source} lists no file for this target"),
        ));
    }
    subunits.extend(
        tallies
            .into_iter()
            .map(|(name, t)| t.into_subunit(scoped_name(prefix, &name))),
    );
    Ok(subunits)
}

/// `<component>/binary-<arch>/Packages[.ext]`, the index apt resolves
/// packages from. Installer indexes nested deeper do not count.
fn is_packages_index(path: &str) -> bool {
    let parts: Vec<&str> = path.split('/').collect();
    parts.len() == 3
        && parts[1].starts_with("binary-")
        && (parts[2] == "Packages" || parts[2].starts_with("Packages."))
}

/// Sub-unit an APT index entry belongs to, or `None` when the entry is outside
/// the target: a component that is not mirrored or an architecture the target
/// does not cover.
fn apt_entry_subunit(path: &str, components: &[String], archs: &[&str]) -> Option<String> {
    let parts: Vec<&str> = path.split('/').collect();
    let component = (parts.len() > 1).then_some(parts[0]);
    if let Some(c) = component {
        if !components.is_empty() && !components.iter().any(|x| x == c) {
            return None;
        }
    }

    let arch = parts.iter().find_map(|p| {
        p.strip_prefix("binary-").or_else(|| {
            p.strip_prefix("Contents-")
                .map(|rest| rest.strip_prefix("udeb-").unwrap_or(rest))
                .map(|rest| rest.split('.').next().unwrap_or(rest))
        })
    });

    match (component, arch) {
        (_, Some(a)) if a != "all" && a != "source" && !archs.contains(&a) => None,
        (Some(c), Some(a)) => Some(format!("{c}/{a}")),
        (None, Some(a)) => Some(a.to_owned()),
        (Some(c), None) => Some(c.to_owned()),
        (None, None) => Some("release".to_owned()),
    }
}

fn verify_yum(
    tree: &Path,
    dist: &Distribution,
    target: &Target,
    verifier: &dyn SignatureVerifier,
    require_signature: bool,
) -> Result<TargetVerification, StoreError> {
    let archs = policy::expected_architectures(dist, &target.version, &target.architectures(dist));
    let mut subunits = Vec::new();

    for arch in archs {
        let Some(roots) = MirrorLayout::yum_repo_roots(tree, arch) else {
            subunits.push(SubunitResult::problem(
                arch,
                VerifyStatus::Missing,
                ErrorKind::TreeMissing,
                format!("no repository for architecture {arch}"),
            ));
            continue;
        };
        if roots.is_empty() {
            subunits.push(SubunitResult::problem(
                arch,
                VerifyStatus::Failed,
                ErrorKind::TreeIncomplete,
                format!("missing repodata for {arch}"),
            ));
            continue;
        }
        for root in roots {
            let name = subunit_name(tree, &root);
            subunits.extend(verify_yum_root(&root, &name, verifier, require_signature)?);
        }
    }

    Ok(TargetVerification::from_subunits(target, MODE, subunits))
}

fn verify_yum_root(
    root: &Path,
    name: &str,
    verifier: &dyn SignatureVerifier,
    require_signature: bool,
) -> Result<Vec<SubunitResult>, StoreError> {
    let repodata = root.join("repodata");
    let repomd_path = repodata.join("repomd.xml");
    if !repomd_path.is_file() {
        return Ok(vec![SubunitResult::problem(
            name,
            VerifyStatus::Missing,
            ErrorKind::TreeMissing,
            format!("no repomd.xml in {name}/repodata"),
        )]);
    }
    let data = match fs::read(&repomd_path) {
        Ok(d) => d,
        Err(e) => {
            return Ok(vec![SubunitResult::problem(
                name,
                VerifyStatus::Failed,
                ErrorKind::Io,
                format!("cannot read repomd.xml: {e}"),
            )])
        }
    };

    let asc = repodata.join("repomd.xml.asc");
    let status = if asc.is_file() {
        let signature = match fs::read(&asc) {
            Ok(sig) => sig,
            Err(e) => {
                return Ok(vec![SubunitResult::problem(
                    name,
                    VerifyStatus::Failed,
                    ErrorKind::Io,
                    format!("cannot read repomd.xml.asc: {e}"),
                )])
            }
        };
        verifier.verify(&SignedMetadata::Detached {
            data: &data,
            signature: &signature,
        })?
    } else {
        SignatureStatus::Absent
    };
    let sig = signature_subunit(&format!("{name}/repomd.xml"), status, require_signature);
    if matches!(status, SignatureStatus::Invalid | SignatureStatus::KeyUnknown) {
        return Ok(vec![sig]);
    }

    let xml = String::from_utf8_lossy(&data);
    let repomd = match parse_repomd(&xml) {
        Ok(md) => md,
        Err(e) => {
            return Ok(vec![
                sig,
                SubunitResult::problem(
                    name,
                    VerifyStatus::Failed,
                    ErrorKind::MalformedMetadata,
                    e.to_string(),
                ),
            ])
        }
    };

    let mut tally = Tally::default();
    for record in &repomd.records {
        if record.data_type == "primary" {
            tally.check_index(&record.entry, root, "repomd.xml", "primary");
        } else {
            tally.check(&record.entry, root, "repomd.xml");
        }
    }
    Ok(vec![sig, tally.into_subunit(name.to_owned())])
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(SignatureStatus);

    impl SignatureVerifier for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn verify(&self, _: &SignedMetadata<'_>) -> Result<SignatureStatus, StoreError> {
            Ok(self.0)
        }
    }

    fn comps() -> Vec<String> {
        vec!["main".to_owned(), "contrib".to_owned()]
    }

    #[test]
    fn entry_subunits() {
        let c = comps();
        let archs = ["amd64"];
        assert_eq!(
            apt_entry_subunit("main/binary-amd64/Packages.xz", &c, &archs).as_deref(),
            Some("main/amd64")
        );
        assert_eq!(
            apt_entry_subunit("main/binary-arm64/Packages.xz", &c, &archs),
            None
        );
        assert_eq!(
            apt_entry_subunit("non-free/binary-amd64/Packages", &c, &archs),
            None
        );
        assert_eq!(
            apt_entry_subunit("main/Contents-amd64.gz", &c, &archs).as_deref(),
            Some("main/amd64")
        );
        assert_eq!(
            apt_entry_subunit("main/Contents-udeb-arm64.gz", &c, &archs),
            None
        );
        assert_eq!(
            apt_entry_subunit("main/binary-all/Packages", &c, &archs).as_deref(),
            Some("main/all")
        );
        assert_eq!(
            apt_entry_subunit("main/i18n/Translation-en", &c, &archs).as_deref(),
            Some("main")
        );
        assert_eq!(
            apt_entry_subunit("Contents-amd64.gz", &c, &archs).as_deref(),
            Some("amd64")
        );
        assert_eq!(
            apt_entry_subunit("ChangeLog", &c, &archs).as_deref(),
            Some("release")
        );
    }

    #[test]
    fn signature_subunit_policy() {
        assert_eq!(
            signature_subunit("Release", SignatureStatus::Absent, true).status,
            VerifyStatus::Failed
        );
        assert_eq!(
            signature_subunit("Release", SignatureStatus::Absent, false).status,
            VerifyStatus::Verified
        );
        let s = signature_subunit("Release", SignatureStatus::KeyUnknown, false);
        assert_eq!(s.kind, Some(ErrorKind::KeyUnknown));
        assert_eq!(s.signature_status, Some(SignatureStatus::KeyUnknown));
    }

    #[test]
    fn tally_keeps_going_after_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"hello").unwrap();
        fs::write(dir.path().join("b"), b"hello").unwrap();
        let good = ManifestEntry {
            algorithm: crate::DigestAlgorithm::Md5,
            digest: "5d41402abc4b2a76b9719d911017c592".to_owned(),
            size: Some(5),
            path: "b".to_owned(),
        };
        let bad = ManifestEntry {
            digest: "0".repeat(32),
            path: "a".to_owned(),
            ..good.clone()
        };
        let absent = ManifestEntry {
            path: "c".to_owned(),
            ..good.clone()
        };

        let mut t = Tally::default();
        t.check(&bad, dir.path(), "Release");
        t.check(&good, dir.path(), "Release");
        t.check(&absent, dir.path(), "Release");
        let s = t.into_subunit("main/amd64".to_owned());
        assert_eq!(s.status, VerifyStatus::Failed);
        assert_eq!(s.kind, Some(ErrorKind::ChecksumMismatch));
        assert_eq!((s.files_checked, s.files_matched, s.files_absent), (2, 1, 1));
        assert!(s.reason.contains("a:"));
    }

    #[test]
    fn packages_index_paths() {
        assert!(is_packages_index("main/binary-amd64/Packages"));
        assert!(is_packages_index("contrib/binary-arm64/Packages.xz"));
        assert!(!is_packages_index("main/binary-amd64/Release"));
        assert!(!is_packages_index("main/debian-installer/binary-amd64/Packages"));
        assert!(!is_packages_index("main/Contents-amd64.gz"));
    }

    #[test]
    fn subunit_without_present_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        let absent = ManifestEntry {
            algorithm: crate::DigestAlgorithm::Md5,
            digest: "5d41402abc4b2a76b9719d911017c592".to_owned(),
            size: Some(5),
            path: "contrib/binary-amd64/Packages".to_owned(),
        };
        let mut t = Tally::default();
        t.check_index(&absent, dir.path(), "Release", "Packages");
        let s = t.into_subunit("contrib/amd64".to_owned());
        assert_eq!(s.status, VerifyStatus::Failed);
        assert_eq!(s.kind, Some(ErrorKind::TreeIncomplete));
        assert_eq!((s.files_checked, s.files_absent), (0, 1));
    }

    #[test]
    fn absent_primary_index_fails_despite_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("main")).unwrap();
        fs::write(dir.path().join("main/Contents-amd64.gz"), b"hello").unwrap();
        let contents = ManifestEntry {
            algorithm: crate::DigestAlgorithm::Md5,
            digest: "5d41402abc4b2a76b9719d911017c592".to_owned(),
            size: Some(5),
            path: "main/Contents-amd64.gz".to_owned(),
        };
        let packages = ManifestEntry {
            path: "main/binary-amd64/Packages.xz".to_owned(),
            ..contents.clone()
        };
        let mut t = Tally::default();
        t.check(&contents, dir.path(), "Release");
        t.check_index(&packages, dir.path(), "Release", "Packages");
        let s = t.into_subunit("main/amd64".to_owned());
        assert_eq!(s.status, VerifyStatus::Failed);
        assert!(s.reason.contains("Packages"), "{}", s.reason);
        assert_eq!(s.files_matched, 1);
    }

    #[test]
    fn invalid_signature_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let layout = MirrorLayout::new(dir.path().join("apt"), dir.path().join("yum"));
        let mut d = Distribution::new("debian", RepoKind::Apt);
        d.components = vec!["main".to_owned()];
        d.architectures = vec!["amd64".to_owned()];
        let target = Target::new("debian", RepoKind::Apt, "bookworm");
        let dists = layout.tree_path(&target).join("dists/bookworm");
        fs::create_dir_all(&dists).unwrap();
        fs::write(dists.join("Release"), "Suite: stable\n").unwrap();
        fs::write(dists.join("Release.gpg"), "sig").unwrap();

        let r = verify_cryptographic(
            &layout,
            &d,
            &target,
            &Fixed(SignatureStatus::Invalid),
            true,
        )
        .unwrap();
        assert_eq!(r.status, VerifyStatus::Failed);
        assert_eq!(r.signature_status, Some(SignatureStatus::Invalid));
        assert_eq!(r.kind, Some(ErrorKind::SignatureInvalid));
        assert_eq!(r.files_checked, 0);
    }
}
