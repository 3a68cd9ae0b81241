//! Mirror tree layout, locking, repository metadata, and integrity verification
//! for linux-mirrors.
//!
//! This crate owns everything that touches a synced tree on disk: `MirrorLayout`
//! for path resolution, `TreeLock` for sync/verify exclusion, parsers for Debian
//! `Release`/`InRelease` files and YUM `repomd.xml`, the `SignatureVerifier`
//! seam, and the structural and cryptographic verification modes that produce a
//! mergeable `VerificationReport`.

pub mod crypto;
pub mod digest;
pub mod layout;
pub mod lock;
pub mod policy;
pub mod release;
pub mod report;
pub mod repomd;
pub mod signature;
pub mod structural;
pub mod verify;

pub use digest::{file_digest, DigestAlgorithm, EntryCheck, ManifestEntry};
pub use layout::{AptRoot, MirrorLayout};
pub use lock::{LockMode, TreeLock};
pub use release::{split_clearsigned, Clearsigned, ReleaseFile};
pub use report::{
    SubunitResult, TargetVerification, VerificationReport, VerificationSummary, VerifyMode,
    VerifyStatus,
};
pub use repomd::{parse_repomd, Repomd, RepomdRecord};
pub use signature::{GpgvVerifier, SignatureStatus, SignatureVerifier, SignedMetadata};
pub use verify::{verify_target, verify_targets, VerifyContext, VerifyOptions};

use mirrors_schema::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed metadata in {path}: {reason}")]
    MalformedMetadata { path: String, reason: String },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("signature verifier unavailable: {0}")]
    VerifierUnavailable(String),
    #[error("verification pool error: {0}")]
    Pool(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Classification used when the error becomes a verification result.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedMetadata { .. } => ErrorKind::MalformedMetadata,
            Self::VerifierUnavailable(_) | Self::Pool(_) => ErrorKind::ExecutionFailed,
            Self::Io(_) | Self::LockFailed(_) | Self::Serialization(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
