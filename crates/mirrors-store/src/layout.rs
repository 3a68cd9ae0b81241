use crate::StoreError;
use mirrors_schema::{mirror_for_arch, Distribution, MirrorConfig, RepoKind, Target};
use std::fs;
use std::path::{Path, PathBuf};

const LOCKS_DIR: &str = ".locks";
const REPORT_FILE: &str = "verification.json";

/// Directory layout of the mirror storage.
///
/// APT trees live under `apt_root/<dist>/<version>` and YUM trees under
/// `yum_root/<dist>/<version>`. Lock files sit next to the trees in a hidden
/// `.locks` directory so they are never mounted into a sandbox.
#[derive(Debug, Clone)]
pub struct MirrorLayout {
    apt_root: PathBuf,
    yum_root: PathBuf,
}

impl MirrorLayout {
    pub fn new(apt_root: impl Into<PathBuf>, yum_root: impl Into<PathBuf>) -> Self {
        Self {
            apt_root: apt_root.into(),
            yum_root: yum_root.into(),
        }
    }

    pub fn from_config(config: &MirrorConfig) -> Self {
        Self::new(config.apt_path(), config.yum_path())
    }

    #[inline]
    pub fn kind_root(&self, kind: RepoKind) -> &Path {
        match kind {
            RepoKind::Apt => &self.apt_root,
            RepoKind::Yum => &self.yum_root,
        }
    }

    #[inline]
    pub fn distribution_dir(&self, kind: RepoKind, distribution: &str) -> PathBuf {
        self.kind_root(kind).join(distribution)
    }

    /// Directory a target syncs into. Per-architecture targets share the
    /// directory of their version.
    #[inline]
    pub fn tree_path(&self, target: &Target) -> PathBuf {
        self.distribution_dir(target.kind, &target.distribution)
            .join(&target.version)
    }

    /// Lock file guarding the tree of `target`.
    #[inline]
    pub fn lock_path(&self, target: &Target) -> PathBuf {
        self.kind_root(target.kind)
            .join(LOCKS_DIR)
            .join(format!("{}.lock", target.tree_key().slug()))
    }

    /// Where the merged verification report is persisted.
    #[inline]
    pub fn report_path(&self) -> PathBuf {
        self.apt_root
            .parent()
            .unwrap_or(&self.apt_root)
            .join(REPORT_FILE)
    }

    /// Create the tree directory for `target` if it does not exist yet.
    pub fn initialize_tree(&self, target: &Target) -> Result<PathBuf, StoreError> {
        let path = self.tree_path(target);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Lock serialising read-merge-write cycles of the verification report.
    #[inline]
    pub fn report_lock_path(&self) -> PathBuf {
        self.report_path().with_extension("json.lock")
    }

    /// Candidate APT repository roots for `arch` inside a synced tree, most
    /// specific first.
    ///
    /// apt-mirror writes `<tree>/mirror/<host>/<path>` for the mirror that
    /// serves the architecture; a plain rsync lands the repository at the
    /// tree root.
    pub fn apt_root_candidates(tree: &Path, dist: &Distribution, arch: &str) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for url in &dist.mirror_urls {
            if let Some(rel) = url_host_path(&mirror_for_arch(url, arch)) {
                out.push(tree.join("mirror").join(&rel));
                out.push(tree.join(&rel));
            }
        }
        out.push(tree.to_path_buf());
        out.dedup();
        out
    }

    /// First candidate root for `arch` that contains `dists/<version>`.
    pub fn resolve_apt_root(
        tree: &Path,
        dist: &Distribution,
        version: &str,
        arch: &str,
    ) -> Option<PathBuf> {
        Self::apt_root_candidates(tree, dist, arch)
            .into_iter()
            .find(|root| root.join("dists").join(version).is_dir())
    }

    /// Resolve the root of every architecture in `archs` and group the
    /// architectures sharing one. Architectures with no root on disk come
    /// back in the second list.
    ///
    /// With no architectures at all the plain mirror root is resolved, so the
    /// suite metadata can still be checked.
    pub fn group_apt_roots<'a>(
        tree: &Path,
        dist: &Distribution,
        version: &str,
        archs: &[&'a str],
    ) -> (Vec<AptRoot<'a>>, Vec<&'a str>) {
        if archs.is_empty() {
            let roots = Self::resolve_apt_root(tree, dist, version, "")
                .map(|path| AptRoot::new(tree, path))
                .into_iter()
                .collect();
            return (roots, Vec::new());
        }

        let mut roots: Vec<AptRoot<'a>> = Vec::new();
        let mut unresolved = Vec::new();
        for &arch in archs {
            let Some(path) = Self::resolve_apt_root(tree, dist, version, arch) else {
                unresolved.push(arch);
                continue;
            };
            match roots.iter_mut().find(|r| r.path == path) {
                Some(root) => root.architectures.push(arch),
                None => {
                    let mut root = AptRoot::new(tree, path);
                    root.architectures.push(arch);
                    roots.push(root);
                }
            }
        }
        (roots, unresolved)
    }

    /// Repository roots (directories holding `repodata/`) for one architecture
    /// of a YUM tree, sorted by path. Returns `None` when nothing for the
    /// architecture exists on disk at all.
    pub fn yum_repo_roots(tree: &Path, arch: &str) -> Option<Vec<PathBuf>> {
        let arch_dir = tree.join(arch);
        let mut found_any = false;
        let mut roots = Vec::new();

        if arch_dir.is_dir() {
            found_any = true;
            if arch_dir.join("repodata").is_dir() {
                roots.push(arch_dir.clone());
            }
            roots.extend(subdirs_with_repodata(&arch_dir));
        }

        // Upstream layout: <tree>/<Component>/<arch>/os
        if let Ok(entries) = fs::read_dir(tree) {
            for entry in entries.flatten() {
                let os_dir = entry.path().join(arch).join("os");
                if os_dir.is_dir() {
                    found_any = true;
                    if os_dir.join("repodata").is_dir() {
                        roots.push(os_dir);
                    }
                }
            }
        }

        if !found_any {
            return None;
        }
        roots.sort();
        roots.dedup();
        Some(roots)
    }
}

/// One repository root of an APT tree and the architectures it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptRoot<'a> {
    pub path: PathBuf,
    /// Path relative to the tree, without the apt-mirror `mirror/` prefix.
    pub label: String,
    pub architectures: Vec<&'a str>,
}

impl AptRoot<'_> {
    fn new(tree: &Path, path: PathBuf) -> Self {
        let rel = path.strip_prefix(tree).unwrap_or(&path);
        let rel = rel.strip_prefix("mirror").unwrap_or(rel);
        let label = match rel.to_string_lossy() {
            l if l.is_empty() => ".".to_owned(),
            l => l.into_owned(),
        };
        Self {
            path,
            label,
            architectures: Vec::new(),
        }
    }
}

fn subdirs_with_repodata(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.join("repodata").is_dir())
        .collect()
}

/// `http://host/a/b/` -> `host/a/b`
fn url_host_path(url: &str) -> Option<PathBuf> {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let trimmed = rest.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.split('/').filter(|s| !s.is_empty()).collect())
}
