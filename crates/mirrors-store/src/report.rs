use crate::signature::SignatureStatus;
use crate::StoreError;
use chrono::{DateTime, Utc};
use mirrors_schema::{ErrorKind, Target, TargetKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Verification outcome, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Verified,
    Missing,
    Failed,
}

impl fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Verified => "verified",
            Self::Missing => "missing",
            Self::Failed => "failed",
        })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// Layout and index presence only.
    #[default]
    Structural,
    /// Signatures and checksums of every listed file.
    Cryptographic,
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => f.write_str("structural"),
            Self::Cryptographic => f.write_str("cryptographic"),
        }
    }
}

/// Result for one independently checked part of a target, e.g. a
/// component/architecture pair or one YUM repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubunitResult {
    pub name: String,
    pub status: VerifyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub reason: String,
    #[serde(default)]
    pub files_checked: u64,
    #[serde(default)]
    pub files_matched: u64,
    #[serde(default)]
    pub files_absent: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_status: Option<SignatureStatus>,
}

impl SubunitResult {
    pub fn verified(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: VerifyStatus::Verified,
            kind: None,
            reason: "ok".to_owned(),
            files_checked: 0,
            files_matched: 0,
            files_absent: 0,
            signature_status: None,
        }
    }

    pub fn problem(
        name: impl Into<String>,
        status: VerifyStatus,
        kind: ErrorKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status,
            kind: Some(kind),
            reason: reason.into(),
            ..Self::verified(name)
        }
    }
}

/// Verification result of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetVerification {
    pub target: TargetKey,
    pub distribution: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    pub mode: VerifyMode,
    pub status: VerifyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub reason: String,
    pub files_checked: u64,
    pub files_matched: u64,
    #[serde(default)]
    pub files_absent: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_status: Option<SignatureStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subunits: Vec<SubunitResult>,
    pub verified_at: DateTime<Utc>,
}

impl TargetVerification {
    fn base(target: &Target, mode: VerifyMode) -> Self {
        Self {
            target: target.key(),
            distribution: target.distribution.clone(),
            version: target.version.clone(),
            architecture: target.architecture.clone(),
            mode,
            status: VerifyStatus::Verified,
            kind: None,
            reason: String::new(),
            files_checked: 0,
            files_matched: 0,
            files_absent: 0,
            signature_status: None,
            subunits: Vec::new(),
            verified_at: Utc::now(),
        }
    }

    /// A target-level result with no sub-units, e.g. a missing tree.
    pub fn single(
        target: &Target,
        mode: VerifyMode,
        status: VerifyStatus,
        kind: Option<ErrorKind>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status,
            kind,
            reason: reason.into(),
            ..Self::base(target, mode)
        }
    }

    /// Fold sub-unit results: the target takes the most severe status and the
    /// kind of the first sub-unit at that severity; counters are summed.
    pub fn from_subunits(target: &Target, mode: VerifyMode, subunits: Vec<SubunitResult>) -> Self {
        let mut tv = Self::base(target, mode);
        if subunits.is_empty() {
            tv.status = VerifyStatus::Failed;
            tv.kind = Some(ErrorKind::TreeIncomplete);
            tv.reason = "nothing to verify".to_owned();
            return tv;
        }

        let worst = subunits
            .iter()
            .map(|s| s.status)
            .max()
            .unwrap_or(VerifyStatus::Verified);
        tv.status = worst;
        tv.kind = subunits.iter().find(|s| s.status == worst).and_then(|s| s.kind);
        tv.files_checked = subunits.iter().map(|s| s.files_checked).sum();
        tv.files_matched = subunits.iter().map(|s| s.files_matched).sum();
        tv.files_absent = subunits.iter().map(|s| s.files_absent).sum();
        tv.signature_status = subunits.iter().filter_map(|s| s.signature_status).max();

        tv.reason = if worst == VerifyStatus::Verified {
            "repository verified".to_owned()
        } else {
            subunits
                .iter()
                .filter(|s| s.status != VerifyStatus::Verified)
                .map(|s| format!("{}: {}", s.name, s.reason))
                .collect::<Vec<_>>()
                .join("; ")
        };
        tv.subunits = subunits;
        tv
    }

    /// Deterministic total order used to pick between two results for the
    /// same target: newer wins, then the more severe one. The remaining keys
    /// only break exact ties, so merge order never decides the survivor.
    fn precedence(&self, other: &Self) -> Ordering {
        self.verified_at
            .cmp(&other.verified_at)
            .then(self.status.cmp(&other.status))
            .then(self.files_checked.cmp(&other.files_checked))
            .then(self.files_matched.cmp(&other.files_matched))
            .then(self.files_absent.cmp(&other.files_absent))
            .then(self.mode.cmp(&other.mode))
            .then(self.kind.cmp(&other.kind))
            .then(self.signature_status.cmp(&other.signature_status))
            .then_with(|| self.reason.cmp(&other.reason))
            .then_with(|| self.subunits.cmp(&other.subunits))
    }
}

/// Aggregated counts over a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub verified: usize,
    pub missing: usize,
    pub failed: usize,
    pub files_checked: u64,
    pub files_matched: u64,
}

impl fmt::Display for VerificationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} verified, {} missing, {} failed",
            self.total, self.verified, self.missing, self.failed
        )
    }
}

/// Verification results keyed by target.
///
/// Merging is commutative and associative: for a key present on both sides
/// the newer result wins, ties going to the more severe one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub entries: BTreeMap<TargetKey, TargetVerification>,
}

impl VerificationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: TargetVerification) {
        match self.entries.get(&result.target) {
            Some(existing) if existing.precedence(&result) != Ordering::Less => {}
            _ => {
                self.entries.insert(result.target.clone(), result);
            }
        }
    }

    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for result in other.entries.into_values() {
            self.insert(result);
        }
        self
    }

    pub fn get(&self, key: &TargetKey) -> Option<&TargetVerification> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetVerification> {
        self.entries.values()
    }

    pub fn summary(&self) -> VerificationSummary {
        let mut s = VerificationSummary {
            total: self.entries.len(),
            ..VerificationSummary::default()
        };
        for r in self.entries.values() {
            match r.status {
                VerifyStatus::Verified => s.verified += 1,
                VerifyStatus::Missing => s.missing += 1,
                VerifyStatus::Failed => s.failed += 1,
            }
            s.files_checked += r.files_checked;
            s.files_matched += r.files_matched;
        }
        s
    }

    /// Deleting stale content of a target is only allowed once its tree has
    /// been verified.
    pub fn cleanup_allowed(&self, key: &TargetKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|r| r.status == VerifyStatus::Verified)
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load a previously saved report, or an empty one if none exists.
    pub fn load_or_default(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Atomically write the report as JSON.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let content = serde_json::to_string_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl FromIterator<TargetVerification> for VerificationReport {
    fn from_iter<I: IntoIterator<Item = TargetVerification>>(iter: I) -> Self {
        let mut report = Self::new();
        for r in iter {
            report.insert(r);
        }
        report
    }
}
