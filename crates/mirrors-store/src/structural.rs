//! Structural verification: is the synced tree laid out like a repository?
//!
//! No signatures or digests are computed here, so a structural pass over a
//! large mirror finishes in seconds.

use crate::digest::resolve_relative;
use crate::layout::{AptRoot, MirrorLayout};
use crate::policy;
use crate::release::{scan_fields, split_clearsigned};
use crate::report::{SubunitResult, TargetVerification, VerifyMode, VerifyStatus};
use crate::repomd::parse_repomd;
use mirrors_schema::{Distribution, ErrorKind, RepoKind, Target};
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

const MODE: VerifyMode = VerifyMode::Structural;
const PACKAGES_INDEXES: &[&str] = &["Packages", "Packages.gz", "Packages.xz", "Packages.bz2"];

pub fn verify_structure(
    layout: &MirrorLayout,
    dist: &Distribution,
    target: &Target,
) -> TargetVerification {
    let tree = layout.tree_path(target);
    if !tree.is_dir() {
        return TargetVerification::single(
            target,
            MODE,
            VerifyStatus::Missing,
            Some(ErrorKind::TreeMissing),
            format!("repository directory not found at {}", tree.display()),
        );
    }
    debug!("structural check of {target} at {}", tree.display());
    match target.kind {
        RepoKind::Apt => verify_apt(&tree, dist, target),
        RepoKind::Yum => verify_yum(&tree, dist, target),
    }
}

fn verify_apt(tree: &Path, dist: &Distribution, target: &Target) -> TargetVerification {
    let version = &target.version;
    let archs = policy::expected_architectures(dist, version, &target.architectures(dist));
    let (roots, unresolved) = MirrorLayout::group_apt_roots(tree, dist, version, &archs);
    if roots.is_empty() {
        return TargetVerification::single(
            target,
            MODE,
            VerifyStatus::Missing,
            Some(ErrorKind::TreeMissing),
            format!("missing dists/{version} directory"),
        );
    }

    // Architectures served by different mirrors have separate roots; name
    // sub-units by root so they stay distinct.
    let scoped = roots.len() > 1;
    let mut subunits = Vec::new();
    for root in &roots {
        let prefix = scoped.then_some(root.label.as_str());
        subunits.extend(check_apt_root(root, dist, version, prefix));
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

    TargetVerification::from_subunits(target, MODE, subunits)
}

pub(crate) fn scoped_name(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{p}/{name}"),
        None => name.to_owned(),
    }
}

fn check_apt_root(
    root: &AptRoot<'_>,
    dist: &Distribution,
    version: &str,
    prefix: Option<&str>,
) -> Vec<SubunitResult> {
    let release_name = scoped_name(prefix, "Release");
    let dists = root.path.join("dists").join(version);

    let release_text = match read_release_text(&dists) {
        Some(Ok(text)) => text,
        Some(Err(reason)) => {
            return vec![SubunitResult::problem(
                release_name,
                VerifyStatus::Failed,
                ErrorKind::MalformedMetadata,
                reason,
            )]
        }
        None => {
            return vec![SubunitResult::problem(
                release_name,
                VerifyStatus::Missing,
                ErrorKind::TreeMissing,
                format!("missing Release/InRelease in dists/{version}"),
            )]
        }
    };

    let fields = scan_fields(&release_text);
    let suite = fields.get("Suite");
    let codename = fields.get("Codename");
    if (suite.is_some() || codename.is_some())
        && suite.map(String::as_str) != Some(version)
        && codename.map(String::as_str) != Some(version)
    {
        return vec![SubunitResult::problem(
            release_name,
            VerifyStatus::Failed,
            ErrorKind::TreeIncomplete,
            format!(
                "Release names suite '{}' / codename '{}', expected '{version}'",
                suite.map_or("", String::as_str),
                codename.map_or("", String::as_str),
            ),
        )];
    }

    let mut subunits = Vec::new();
    for component in &dist.components {
        for arch in &root.architectures {
            let name = scoped_name(prefix, &format!("{component}/{arch}"));
            let index_dir = dists.join(component).join(format!("binary-{arch}"));
            if PACKAGES_INDEXES.iter().any(|f| index_dir.join(f).is_file()) {
                subunits.push(SubunitResult::verified(name));
            } else {
                subunits.push(SubunitResult::problem(
                    name,
                    VerifyStatus::Failed,
                    ErrorKind::TreeIncomplete,
                    format!("missing Packages index for {component}/{arch}"),
                ));
            }
        }

        let pool = root.path.join("pool").join(component);
        let name = scoped_name(prefix, &format!("pool/{component}"));
        if contains_package(&pool) {
            subunits.push(SubunitResult::verified(name));
        } else {
            subunits.push(SubunitResult::problem(
                name,
                VerifyStatus::Failed,
                ErrorKind::TreeIncomplete,
                format!("no .deb packages in pool/{component}"),
            ));
        }
    }
    subunits
}

/// `Release` text of a suite: plain `Release` first, otherwise the signed
/// part of `InRelease`. `None` when neither exists.
fn read_release_text(dists: &Path) -> Option<Result<String, String>> {
    let release = dists.join("Release");
    if release.is_file() {
        return Some(
            fs::read_to_string(&release).map_err(|e| format!("cannot read Release: {e}")),
        );
    }
    let inrelease = dists.join("InRelease");
    if inrelease.is_file() {
        return Some(
            fs::read_to_string(&inrelease)
                .map_err(|e| format!("cannot read InRelease: {e}"))
                .and_then(|text| {
                    split_clearsigned(&text)
                        .map(|cs| cs.text)
                        .map_err(|e| e.to_string())
                }),
        );
    }
    None
}

fn contains_package(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .any(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .is_some_and(|ext| ext == "deb" || ext == "udeb")
        })
}

fn verify_yum(tree: &Path, dist: &Distribution, target: &Target) -> TargetVerification {
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
            subunits.push(check_yum_root(&root, name));
        }
    }

    TargetVerification::from_subunits(target, MODE, subunits)
}

/// Sub-unit name of a repository root: its path relative to the tree.
pub(crate) fn subunit_name(tree: &Path, root: &Path) -> String {
    root.strip_prefix(tree)
        .unwrap_or(root)
        .to_string_lossy()
        .into_owned()
}

fn check_yum_root(root: &Path, name: String) -> SubunitResult {
    let repomd_path = root.join("repodata").join("repomd.xml");
    let xml = match fs::read_to_string(&repomd_path) {
        Ok(xml) => xml,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return SubunitResult::problem(
                name.clone(),
                VerifyStatus::Failed,
                ErrorKind::TreeIncomplete,
                format!("missing repomd.xml in {name}/repodata"),
            )
        }
        Err(e) => {
            return SubunitResult::problem(
                name,
                VerifyStatus::Failed,
                ErrorKind::Io,
                format!("cannot read repomd.xml: {e}"),
            )
        }
    };
    let repomd = match parse_repomd(&xml) {
        Ok(md) => md,
        Err(e) => {
            return SubunitResult::problem(
                name,
                VerifyStatus::Failed,
                ErrorKind::MalformedMetadata,
                e.to_string(),
            )
        }
    };

    let present = repomd.records.iter().any(|r| {
        resolve_relative(root, &r.entry.path, "repomd.xml").is_ok_and(|p| p.is_file())
    });
    if present {
        SubunitResult::verified(name)
    } else {
        SubunitResult::problem(
            name,
            VerifyStatus::Failed,
            ErrorKind::TreeIncomplete,
            "no file referenced by repomd.xml exists",
        )
    }
}
