use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::debug;

/// Result of checking a metadata signature against the trusted keyring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Valid,
    Absent,
    KeyUnknown,
    Invalid,
}

impl fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Valid => "valid",
            Self::Absent => "absent",
            Self::KeyUnknown => "key_unknown",
            Self::Invalid => "invalid",
        })
    }
}

/// Signed metadata handed to a verifier.
#[derive(Debug, Clone, Copy)]
pub enum SignedMetadata<'a> {
    /// `Release` + `Release.gpg`, or `repomd.xml` + `repomd.xml.asc`.
    Detached { data: &'a [u8], signature: &'a [u8] },
    /// A clearsigned message such as `InRelease`.
    Inline { message: &'a [u8] },
}

/// Checks signed repository metadata against a trusted keyring.
///
/// Implementations never panic on hostile input; undecodable signatures are
/// reported as [`SignatureStatus::Invalid`].
pub trait SignatureVerifier: Send + Sync {
    fn name(&self) -> &str;

    fn verify(&self, material: &SignedMetadata<'_>) -> Result<SignatureStatus, StoreError>;
}

const GPGV: &str = "gpgv";

/// Verifier backed by `gpgv` and a keyring file.
pub struct GpgvVerifier {
    keyring: PathBuf,
}

impl GpgvVerifier {
    pub fn new(keyring: impl Into<PathBuf>) -> Self {
        Self {
            keyring: keyring.into(),
        }
    }

    pub fn keyring(&self) -> &Path {
        &self.keyring
    }

    fn run(&self, files: &[&Path]) -> Result<SignatureStatus, StoreError> {
        if !self.keyring.is_file() {
            return Err(StoreError::VerifierUnavailable(format!(
                "keyring not found at {}",
                self.keyring.display()
            )));
        }
        let output = Command::new(GPGV)
            .arg("--status-fd")
            .arg("1")
            .arg("--keyring")
            .arg(&self.keyring)
            .args(files)
            .output()
            .map_err(|e| StoreError::VerifierUnavailable(format!("{GPGV}: {e}")))?;
        let status = String::from_utf8_lossy(&output.stdout);
        let result = classify_gpgv_status(&status);
        debug!("{GPGV} exited {:?}: {result}", output.status.code());
        Ok(result)
    }
}

fn temp_with(contents: &[u8]) -> Result<NamedTempFile, StoreError> {
    let mut f = NamedTempFile::new()?;
    f.write_all(contents)?;
    f.flush()?;
    Ok(f)
}

impl SignatureVerifier for GpgvVerifier {
    fn name(&self) -> &str {
        GPGV
    }

    fn verify(&self, material: &SignedMetadata<'_>) -> Result<SignatureStatus, StoreError> {
        match material {
            SignedMetadata::Detached { data, signature } => {
                let sig = temp_with(signature)?;
                let data = temp_with(data)?;
                self.run(&[sig.path(), data.path()])
            }
            SignedMetadata::Inline { message } => {
                let msg = temp_with(message)?;
                self.run(&[msg.path()])
            }
        }
    }
}

/// Map `gpgv --status-fd` output to a status. Any bad or revoked signature
/// wins over good ones.
pub fn classify_gpgv_status(status: &str) -> SignatureStatus {
    let mut good = false;
    let mut missing_key = false;
    let mut nodata = false;

    for line in status.lines() {
        let Some(rest) = line.strip_prefix("[GNUPG:] ") else {
            continue;
        };
        let keyword = rest.split_whitespace().next().unwrap_or("");
        match keyword {
            "BADSIG" | "EXPKEYSIG" | "REVKEYSIG" | "EXPSIG" => return SignatureStatus::Invalid,
            "GOODSIG" | "VALIDSIG" => good = true,
            "NO_PUBKEY" => missing_key = true,
            // ERRSIG <keyid> <pkalgo> <hashalgo> <sig_class> <time> <rc>; rc 9 is a missing key.
            "ERRSIG" => {
                if rest.split_whitespace().nth(6) == Some("9") {
                    missing_key = true;
                } else {
                    return SignatureStatus::Invalid;
                }
            }
            "NODATA" => nodata = true,
            _ => {}
        }
    }

    if missing_key {
        SignatureStatus::KeyUnknown
    } else if good {
        SignatureStatus::Valid
    } else if nodata {
        SignatureStatus::Absent
    } else {
        SignatureStatus::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn good_signature() {
        let out = "[GNUPG:] NEWSIG\n[GNUPG:] GOODSIG 6ED0E7B82643E131 Debian Archive\n[GNUPG:] VALIDSIG 4CB50190207B4758A3F73A796ED0E7B82643E131 2024-06-01\n";
        assert_eq!(classify_gpgv_status(out), SignatureStatus::Valid);
    }

    #[test]
    fn bad_signature_wins() {
        let out = "[GNUPG:] GOODSIG AAAA x\n[GNUPG:] BADSIG BBBB y\n";
        assert_eq!(classify_gpgv_status(out), SignatureStatus::Invalid);
    }

    #[test]
    fn missing_key() {
        let out = "[GNUPG:] ERRSIG 6ED0E7B82643E131 1 10 01 1718000000 9 -\n[GNUPG:] NO_PUBKEY 6ED0E7B82643E131\n";
        assert_eq!(classify_gpgv_status(out), SignatureStatus::KeyUnknown);
    }

    #[test]
    fn nodata_and_silence() {
        assert_eq!(
            classify_gpgv_status("[GNUPG:] NODATA 1\n"),
            SignatureStatus::Absent
        );
        assert_eq!(classify_gpgv_status(""), SignatureStatus::Invalid);
    }

    #[test]
    fn severity_order() {
        assert!(SignatureStatus::Invalid > SignatureStatus::KeyUnknown);
        assert!(SignatureStatus::KeyUnknown > SignatureStatus::Absent);
        assert!(SignatureStatus::Absent > SignatureStatus::Valid);
    }

    #[test]
    fn missing_keyring_is_unavailable() {
        let v = GpgvVerifier::new("/nonexistent/keyring.gpg");
        let err = v
            .verify(&SignedMetadata::Inline { message: b"x" })
            .unwrap_err();
        assert!(matches!(err, StoreError::VerifierUnavailable(_)));
    }
}
