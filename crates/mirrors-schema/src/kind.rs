use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable classification carried next to every human-readable
/// failure reason, for sync jobs and verification results alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigInvalid,
    SandboxUnavailable,
    ExecutionFailed,
    Timeout,
    Cancelled,
    SignatureInvalid,
    KeyUnknown,
    SignatureAbsent,
    ChecksumMismatch,
    MalformedMetadata,
    TreeMissing,
    TreeIncomplete,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "config_invalid",
            Self::SandboxUnavailable => "sandbox_unavailable",
            Self::ExecutionFailed => "execution_failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::SignatureInvalid => "signature_invalid",
            Self::KeyUnknown => "key_unknown",
            Self::SignatureAbsent => "signature_absent",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::MalformedMetadata => "malformed_metadata",
            Self::TreeMissing => "tree_missing",
            Self::TreeIncomplete => "tree_incomplete",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
