//! Metadata recovery from container streams.
//!
//! Two independent decoders run over whatever stream bytes can be found: a
//! regex pass over the legacy UTF-16 info blob, and an XML pass over the
//! part-atom descriptor. Their outputs are merged with an explicit
//! precedence table. Absence of data is `None` fields, never an error; only
//! transient I/O problems propagate so the caller can retry.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::container::CompoundFile;
use crate::error::{ExtractError, Result};
use crate::model::FamilyMetadata;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Autodesk Revit (20\d{2})").expect("version regex"));
static CATEGORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<category[^>]*>(.*?)</category>").expect("category regex"));

const ARC_CATEGORIES: &[&str] = &["Doors", "Windows", "Walls", "Floors", "Roofs", "Stairs"];
const MEP_CATEGORIES: &[&str] = &[
    "Pipes",
    "Ducts",
    "Electrical Fixtures",
    "Mechanical Equipment",
];
const STR_CATEGORIES: &[&str] = &[
    "Structural Columns",
    "Structural Foundations",
    "Structural Framing",
];

pub struct MetadataExtractor {
    cfg: PipelineConfig,
}

impl MetadataExtractor {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self { cfg: cfg.clone() }
    }

    /// Recover whatever metadata the container yields. An unparseable
    /// container or missing streams produce an empty record; only I/O
    /// failures (locked file) bubble up for retry.
    pub fn extract(&self, path: &Path) -> Result<FamilyMetadata> {
        let mut cf = match CompoundFile::open(path) {
            Ok(cf) => cf,
            Err(e) if e.is_recoverable() => {
                debug!(path = %path.display(), error = %e, "container unreadable, no metadata");
                return Ok(FamilyMetadata::default());
            }
            Err(e) => return Err(e),
        };

        let info_bytes =
            self.stream_or_fallback(&mut cf, &self.cfg.info_stream, &self.cfg.info_substrings)?;
        let atom_bytes =
            self.stream_or_fallback(&mut cf, &self.cfg.atom_stream, &self.cfg.atom_substrings)?;

        let legacy = info_bytes.map(|b| decode_legacy_info(&b)).unwrap_or_default();
        let atom = atom_bytes.map(|b| decode_part_atom(&b)).unwrap_or_default();
        Ok(merge(legacy, atom))
    }

    /// Exact-name lookup, then a non-recursive root-level scan against the
    /// stream's own substring allowlist. Each stream gets its own list so
    /// the info fallback cannot latch onto the XML descriptor and feed the
    /// UTF-16 decoder UTF-8 bytes.
    fn stream_or_fallback(
        &self,
        cf: &mut CompoundFile,
        exact: &str,
        substrings: &[String],
    ) -> Result<Option<Vec<u8>>> {
        match cf.stream(exact) {
            Ok(bytes) => return Ok(Some(bytes)),
            Err(ExtractError::StreamNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let mut candidate = None;
        cf.visit_entries(false, |entry| {
            if candidate.is_none()
                && entry.is_stream
                && substrings.iter().any(|s| entry.name.contains(s.as_str()))
            {
                candidate = Some(entry.clone());
            }
        });
        match candidate {
            Some(entry) => {
                debug!(stream = %entry.name, wanted = exact, "using fallback metadata stream");
                cf.read_entry(&entry).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Regex decoder over the legacy UTF-16 info blob.
fn decode_legacy_info(bytes: &[u8]) -> FamilyMetadata {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let text = String::from_utf16_lossy(&units);

    let version = VERSION_RE
        .captures(&text)
        .map(|c| c[1].to_string());

    // Heuristic: the category tends to be the last free-standing word line
    // in the blob, i.e. not a key:value pair, path, or file name.
    let category = text
        .split(['\0', '\r', '\n'])
        .filter(|l| l.len() > 3 && !l.contains(':') && !l.contains('\\') && !l.contains('.'))
        .last()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    FamilyMetadata {
        category,
        discipline: None,
        version,
    }
}

/// XML decoder over the part-atom descriptor stream.
fn decode_part_atom(bytes: &[u8]) -> FamilyMetadata {
    let text = String::from_utf8_lossy(bytes);
    let Some(xml_start) = text.find("<?xml") else {
        return FamilyMetadata::default();
    };
    let xml = &text[xml_start..];

    // Child elements (scheme, term) nest inside the category element; the
    // category's own label is the text after the last closing tag.
    let category = CATEGORY_RE
        .captures(xml)
        .map(|c| {
            let inner = c.get(1).map(|m| m.as_str()).unwrap_or("");
            let tail = inner.rfind('>').map(|i| &inner[i + 1..]).unwrap_or(inner);
            tail.trim().to_string()
        })
        .filter(|c| !c.is_empty());

    FamilyMetadata {
        category,
        discipline: None,
        version: None,
    }
}

/// Merge the two decoder outputs: first decoder (legacy blob) wins per
/// field, except the structured XML category always overrides the legacy
/// heuristic one.
fn merge(legacy: FamilyMetadata, atom: FamilyMetadata) -> FamilyMetadata {
    let category = atom.category.or(legacy.category);
    let version = legacy.version.or(atom.version);
    let discipline = category.as_deref().map(map_category_to_discipline);
    FamilyMetadata {
        category,
        discipline: discipline.map(str::to_string),
        version,
    }
}

/// Fixed keyword tables mapping category to discipline code.
pub fn map_category_to_discipline(category: &str) -> &'static str {
    if ARC_CATEGORIES.iter().any(|c| category.contains(c)) {
        "ARC"
    } else if MEP_CATEGORIES.iter().any(|c| category.contains(c)) {
        "MEP"
    } else if STR_CATEGORIES.iter().any(|c| category.contains(c)) {
        "STR"
    } else {
        "GEN"
    }
}
