use crate::StoreError;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Checksum algorithms found in repository metadata, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Map a Debian `Release` checksum field name.
    pub fn from_release_field(field: &str) -> Option<Self> {
        match field {
            "MD5Sum" => Some(Self::Md5),
            "SHA1" => Some(Self::Sha1),
            "SHA256" => Some(Self::Sha256),
            "SHA512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Map a `repomd.xml` `<checksum type="...">` value.
    pub fn from_repomd_type(ty: &str) -> Option<Self> {
        match ty.to_ascii_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "sha" | "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Length of the lowercase hex digest.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        })
    }
}

/// One file listed by signed metadata: its expected digest, optional size,
/// and path relative to the metadata's base directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub algorithm: DigestAlgorithm,
    pub digest: String,
    pub size: Option<u64>,
    pub path: String,
}

/// Outcome of checking one manifest entry against the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryCheck {
    Matched,
    SizeMismatch { expected: u64, actual: u64 },
    DigestMismatch { expected: String, actual: String },
    Absent,
}

fn stream<D: Digest + io::Write>(file: &mut File) -> io::Result<(String, u64)> {
    let mut hasher = D::new();
    let n = io::copy(file, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), n))
}

/// Streaming digest of a file; memory use does not depend on file size.
/// Returns the lowercase hex digest and the number of bytes read.
pub fn file_digest(path: &Path, algorithm: DigestAlgorithm) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    match algorithm {
        DigestAlgorithm::Md5 => stream::<Md5>(&mut file),
        DigestAlgorithm::Sha1 => stream::<Sha1>(&mut file),
        DigestAlgorithm::Sha256 => stream::<Sha256>(&mut file),
        DigestAlgorithm::Sha512 => stream::<Sha512>(&mut file),
    }
}

/// Join a metadata-relative path onto `base`, refusing anything that would
/// leave it.
pub fn resolve_relative(base: &Path, rel: &str, source: &str) -> Result<PathBuf, StoreError> {
    let rel_path = Path::new(rel);
    if rel.is_empty() {
        return Err(StoreError::malformed(source, "empty file path"));
    }
    for comp in rel_path.components() {
        match comp {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(StoreError::malformed(
                    source,
                    format!("path '{rel}' escapes the repository"),
                ))
            }
        }
    }
    Ok(base.join(rel_path))
}

impl ManifestEntry {
    /// Compare the file at `base/path` with this entry. A missing file is
    /// reported as `Absent`, not as an error.
    pub fn check(&self, base: &Path, source: &str) -> Result<EntryCheck, StoreError> {
        let path = resolve_relative(base, &self.path, source)?;
        if !path.is_file() {
            return Ok(EntryCheck::Absent);
        }
        let (actual, size) = file_digest(&path, self.algorithm)?;
        if let Some(expected) = self.size {
            if expected != size {
                return Ok(EntryCheck::SizeMismatch {
                    expected,
                    actual: size,
                });
            }
        }
        if actual.eq_ignore_ascii_case(&self.digest) {
            Ok(EntryCheck::Matched)
        } else {
            Ok(EntryCheck::DigestMismatch {
                expected: self.digest.clone(),
                actual,
            })
        }
    }
}

/// Check that `digest` looks like a hex digest of `algorithm`.
pub(crate) fn valid_hex_digest(digest: &str, algorithm: DigestAlgorithm) -> bool {
    digest.len() == algorithm.hex_len() && digest.bytes().all(|b| b.is_ascii_hexdigit())
}
