//! Debian `Release` / `InRelease` parsing.
//!
//! A `Release` file is a single RFC822-style stanza. Plain fields are kept as
//! strings; the multi-line checksum fields (`MD5Sum`, `SHA1`, `SHA256`,
//! `SHA512`) are parsed into [`ManifestEntry`] lists.

use crate::digest::{valid_hex_digest, DigestAlgorithm, ManifestEntry};
use crate::StoreError;
use std::collections::BTreeMap;

const BEGIN_SIGNED: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const BEGIN_SIGNATURE: &str = "-----BEGIN PGP SIGNATURE-----";
const END_SIGNATURE: &str = "-----END PGP SIGNATURE-----";

/// A clearsigned message split into its signed text and armored signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clearsigned {
    pub text: String,
    pub signature: String,
}

/// Split an `InRelease` style clearsigned message.
///
/// The returned text is dash-unescaped and excludes the line break that
/// precedes the signature block.
pub fn split_clearsigned(input: &str) -> Result<Clearsigned, StoreError> {
    let malformed = |reason: &str| StoreError::malformed("InRelease", reason);
    let mut lines = input.lines();

    loop {
        match lines.next() {
            Some(l) if l.trim_end() == BEGIN_SIGNED => break,
            Some(l) if l.trim().is_empty() => {}
            _ => return Err(malformed("missing PGP signed message header")),
        }
    }
    // Armor headers ("Hash: SHA512") end at the first empty line.
    loop {
        match lines.next() {
            Some(l) if l.trim().is_empty() => break,
            Some(_) => {}
            None => return Err(malformed("unterminated armor headers")),
        }
    }

    let mut text_lines = Vec::new();
    let mut found_signature = false;
    for line in lines.by_ref() {
        if line.trim_end() == BEGIN_SIGNATURE {
            found_signature = true;
            break;
        }
        text_lines.push(line.strip_prefix("- ").unwrap_or(line));
    }
    if !found_signature {
        return Err(malformed("missing PGP signature block"));
    }

    let mut signature = vec![BEGIN_SIGNATURE];
    let mut terminated = false;
    for line in lines {
        signature.push(line);
        if line.trim_end() == END_SIGNATURE {
            terminated = true;
            break;
        }
    }
    if !terminated {
        return Err(malformed("unterminated PGP signature block"));
    }

    let mut signature = signature.join("\n");
    signature.push('\n');
    Ok(Clearsigned {
        text: text_lines.join("\n"),
        signature,
    })
}

/// Parsed `Release` stanza.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseFile {
    pub fields: BTreeMap<String, String>,
    pub checksums: BTreeMap<DigestAlgorithm, Vec<ManifestEntry>>,
}

impl ReleaseFile {
    /// Parse the first stanza of `text`. `source` names the file in errors.
    pub fn parse(text: &str, source: &str) -> Result<Self, StoreError> {
        let mut release = Self::default();
        let mut current: Option<(String, Option<DigestAlgorithm>)> = None;

        for (idx, line) in text.lines().enumerate() {
            let lineno = idx + 1;
            if line.trim().is_empty() {
                if release.fields.is_empty() && release.checksums.is_empty() {
                    continue;
                }
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                let Some((field, algorithm)) = &current else {
                    return Err(StoreError::malformed(
                        source,
                        format!("line {lineno}: continuation line before any field"),
                    ));
                };
                match algorithm {
                    Some(alg) => {
                        let entry = parse_checksum_line(line, *alg, source, lineno)?;
                        release.checksums.entry(*alg).or_default().push(entry);
                    }
                    None => {
                        if let Some(value) = release.fields.get_mut(field) {
                            value.push('\n');
                            value.push_str(line.trim());
                        }
                    }
                }
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(StoreError::malformed(
                    source,
                    format!("line {lineno}: expected 'Field: value'"),
                ));
            };
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(StoreError::malformed(
                    source,
                    format!("line {lineno}: invalid field name '{name}'"),
                ));
            }
            let algorithm = DigestAlgorithm::from_release_field(name);
            if let Some(alg) = algorithm {
                release.checksums.entry(alg).or_default();
            } else {
                release
                    .fields
                    .insert(name.to_owned(), value.trim().to_owned());
            }
            current = Some((name.to_owned(), algorithm));
        }

        if release.fields.is_empty() && release.checksums.is_empty() {
            return Err(StoreError::malformed(source, "empty Release file"));
        }
        Ok(release)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn suite(&self) -> Option<&str> {
        self.field("Suite")
    }

    pub fn codename(&self) -> Option<&str> {
        self.field("Codename")
    }

    pub fn components(&self) -> Vec<&str> {
        self.field("Components")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn architectures(&self) -> Vec<&str> {
        self.field("Architectures")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Entries of the strongest checksum section present.
    pub fn strongest_checksums(&self) -> Option<(DigestAlgorithm, &[ManifestEntry])> {
        self.checksums
            .iter()
            .rev()
            .find(|(_, entries)| !entries.is_empty())
            .map(|(alg, entries)| (*alg, entries.as_slice()))
    }
}

fn parse_checksum_line(
    line: &str,
    algorithm: DigestAlgorithm,
    source: &str,
    lineno: usize,
) -> Result<ManifestEntry, StoreError> {
    let mut parts = line.split_whitespace();
    let (Some(digest), Some(size), Some(path), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(StoreError::malformed(
            source,
            format!("line {lineno}: expected '<digest> <size> <path>'"),
        ));
    };
    if !valid_hex_digest(digest, algorithm) {
        return Err(StoreError::malformed(
            source,
            format!("line {lineno}: '{digest}' is not a {algorithm} digest"),
        ));
    }
    let size = size.parse::<u64>().map_err(|_| {
        StoreError::malformed(source, format!("line {lineno}: invalid size '{size}'"))
    })?;
    Ok(ManifestEntry {
        algorithm,
        digest: digest.to_ascii_lowercase(),
        size: Some(size),
        path: path.to_owned(),
    })
}

/// Cheap field scan used by structural checks: `Field: value` pairs of the
/// first stanza, ignoring anything it cannot read.
pub fn scan_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in text.lines() {
        if line.trim().is_empty() && !fields.is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            fields.insert(name.trim().to_owned(), value.trim().to_owned());
        }
    }
    fields
}
