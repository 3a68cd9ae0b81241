//! YUM `repodata/repomd.xml` parsing.

use crate::digest::{valid_hex_digest, DigestAlgorithm, ManifestEntry};
use crate::StoreError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const SOURCE: &str = "repomd.xml";

/// One `<data>` record of a repomd index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepomdRecord {
    pub data_type: String,
    pub entry: ManifestEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repomd {
    pub revision: Option<String>,
    pub records: Vec<RepomdRecord>,
}

#[derive(Default)]
struct RecordBuilder {
    data_type: String,
    checksum_type: Option<String>,
    checksum: Option<String>,
    location: Option<String>,
    size: Option<u64>,
}

impl RecordBuilder {
    fn build(self) -> Result<RepomdRecord, StoreError> {
        let ty = &self.data_type;
        let algorithm = match &self.checksum_type {
            Some(t) => DigestAlgorithm::from_repomd_type(t).ok_or_else(|| {
                StoreError::malformed(SOURCE, format!("data '{ty}': unknown checksum type '{t}'"))
            })?,
            None => {
                return Err(StoreError::malformed(
                    SOURCE,
                    format!("data '{ty}': missing checksum"),
                ))
            }
        };
        let digest = self
            .checksum
            .ok_or_else(|| StoreError::malformed(SOURCE, format!("data '{ty}': empty checksum")))?
            .to_ascii_lowercase();
        if !valid_hex_digest(&digest, algorithm) {
            return Err(StoreError::malformed(
                SOURCE,
                format!("data '{ty}': '{digest}' is not a {algorithm} digest"),
            ));
        }
        let path = self.location.ok_or_else(|| {
            StoreError::malformed(SOURCE, format!("data '{ty}': missing location href"))
        })?;
        Ok(RepomdRecord {
            data_type: self.data_type,
            entry: ManifestEntry {
                algorithm,
                digest,
                size: self.size,
                path,
            },
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TextField {
    Revision,
    Checksum,
    Size,
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, StoreError> {
    for a in e.attributes() {
        let a = a.map_err(|err| StoreError::malformed(SOURCE, err.to_string()))?;
        if a.key.local_name().as_ref() == name {
            let value = a
                .unescape_value()
                .map_err(|err| StoreError::malformed(SOURCE, err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Parse a repomd document. Fails on malformed XML, a root element other than
/// `<repomd>`, or incomplete `<data>` records.
pub fn parse_repomd(xml: &str) -> Result<Repomd, StoreError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut repomd = Repomd::default();
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut current: Option<RecordBuilder> = None;
    let mut text_field: Option<TextField> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            StoreError::malformed(
                SOURCE,
                format!("XML error at byte {}: {e}", reader.buffer_position()),
            )
        })?;
        match event {
            Event::Start(e) => {
                if depth == 0 {
                    if seen_root || e.local_name().as_ref() != b"repomd" {
                        return Err(StoreError::malformed(SOURCE, "root element is not <repomd>"));
                    }
                    seen_root = true;
                }
                depth += 1;
                match e.local_name().as_ref() {
                    b"data" => {
                        current = Some(RecordBuilder {
                            data_type: attr(&e, b"type")?.unwrap_or_default(),
                            ..RecordBuilder::default()
                        });
                    }
                    b"checksum" if current.is_some() => {
                        let ty = attr(&e, b"type")?;
                        if let Some(rec) = current.as_mut() {
                            rec.checksum_type = ty;
                        }
                        text_field = Some(TextField::Checksum);
                    }
                    b"size" if current.is_some() => text_field = Some(TextField::Size),
                    b"revision" if depth == 2 => text_field = Some(TextField::Revision),
                    b"location" => {
                        let href = attr(&e, b"href")?;
                        if let Some(rec) = current.as_mut() {
                            rec.location = href;
                        }
                    }
                    _ => text_field = None,
                }
            }
            Event::Empty(e) => {
                if depth == 0 {
                    return Err(StoreError::malformed(SOURCE, "root element is not <repomd>"));
                }
                if e.local_name().as_ref() == b"location" {
                    let href = attr(&e, b"href")?;
                    if let Some(rec) = current.as_mut() {
                        rec.location = href;
                    }
                }
            }
            Event::Text(t) => {
                let Some(field) = text_field else { continue };
                let text = t
                    .unescape()
                    .map_err(|e| StoreError::malformed(SOURCE, e.to_string()))?
                    .trim()
                    .to_owned();
                match (field, current.as_mut()) {
                    (TextField::Revision, _) => repomd.revision = Some(text),
                    (TextField::Checksum, Some(rec)) => rec.checksum = Some(text),
                    (TextField::Size, Some(rec)) => {
                        let size = text.parse::<u64>().map_err(|_| {
                            StoreError::malformed(SOURCE, format!("invalid size '{text}'"))
                        })?;
                        rec.size = Some(size);
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                text_field = None;
                if e.local_name().as_ref() == b"data" {
                    if let Some(rec) = current.take() {
                        repomd.records.push(rec.build()?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(StoreError::malformed(SOURCE, "no <repomd> element"));
    }
    if depth != 0 {
        return Err(StoreError::malformed(SOURCE, "unexpected end of document"));
    }
    Ok(repomd)
}
