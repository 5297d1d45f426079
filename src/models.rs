//! Core data models used throughout the harvester.
//!
//! These types represent the raw items, file descriptors, extracted fields
//! and normalized records that flow through the extraction pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of raw content held by a [`SourceItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    HtmlFragment,
    Pdf,
    Text,
    Json,
}

impl MediaKind {
    /// Maps a lower-case file extension (without the dot) to a media kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(MediaKind::Pdf),
            "txt" => Some(MediaKind::Text),
            "json" => Some(MediaKind::Json),
            "html" | "htm" => Some(MediaKind::HtmlFragment),
            _ => None,
        }
    }
}

/// Where the raw content of a [`SourceItem`] lives.
#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// A unit of raw content to process. Consumed by value by exactly one extractor.
#[derive(Debug, Clone)]
pub struct SourceItem {
    /// URL, file path, or archive entry path.
    pub locator: String,
    pub media_kind: MediaKind,
    pub payload: Payload,
}

impl SourceItem {
    pub fn from_path(path: &Path, media_kind: MediaKind) -> Self {
        Self {
            locator: path.display().to_string(),
            media_kind,
            payload: Payload::Path(path.to_path_buf()),
        }
    }

    pub fn from_bytes(locator: impl Into<String>, media_kind: MediaKind, bytes: Vec<u8>) -> Self {
        Self {
            locator: locator.into(),
            media_kind,
            payload: Payload::Bytes(bytes),
        }
    }
}

/// Metadata about a listed or extracted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Parent folder relative to the archive or listing root; `"root"` at the top.
    pub folder: String,
    pub name: String,
    pub path: PathBuf,
    /// Lower-case extension without the leading dot.
    pub extension: String,
    pub size: u64,
    /// Modification time as seconds since the epoch, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<i64>,
}

/// How a field's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Primary,
    Fallback,
    Ocr,
    Absent,
}

/// A named piece of extracted text.
///
/// Either present with non-empty text and a non-`Absent` method, or absent
/// with no text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub text: Option<String>,
    pub method: ExtractionMethod,
}

impl ExtractedField {
    /// Builds a present field; empty text degrades to an absent field.
    pub fn found(name: impl Into<String>, text: impl Into<String>, method: ExtractionMethod) -> Self {
        let text = text.into();
        let name = name.into();
        if text.trim().is_empty() || method == ExtractionMethod::Absent {
            return Self::absent(name);
        }
        Self {
            name,
            text: Some(text),
            method,
        }
    }

    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: None,
            method: ExtractionMethod::Absent,
        }
    }

    pub fn is_present(&self) -> bool {
        self.text.is_some()
    }
}

/// Field names that identify a record beyond its title.
pub const IDENTIFYING_FIELDS: &[&str] = &["position", "url", "path"];

/// Field names that carry no content of their own.
const NON_CONTENT_FIELDS: &[&str] = &[
    "title",
    "titulo",
    "position",
    "url",
    "path",
    "folder",
    "name",
    "extension",
    "size",
    "year",
    "image_url",
    "image_alt",
    "error",
];

/// Canonical output of the pipeline for one source item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
    pub locator: String,
    pub extracted_at: String,
    pub source: String,
    #[serde(default)]
    pub methods: BTreeMap<String, ExtractionMethod>,
    #[serde(default)]
    pub incomplete: bool,
}

impl NormalizedRecord {
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
            .or_else(|| self.get_str("titulo"))
            .filter(|t| !t.trim().is_empty())
    }

    /// A record needs a title and at least one identifying field to be persisted.
    pub fn is_valid(&self) -> bool {
        self.title().is_some()
            && IDENTIFYING_FIELDS
                .iter()
                .any(|f| self.fields.get(*f).is_some_and(|v| !v.is_null()))
    }

    /// Whether any field other than the identifying metadata carries a value.
    pub fn has_content(&self) -> bool {
        self.fields
            .iter()
            .any(|(k, v)| !NON_CONTENT_FIELDS.contains(&k.as_str()) && !is_blank(v))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Aggregate document written once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub count: usize,
    pub generated_at: String,
    pub source: String,
    pub items: Vec<NormalizedRecord>,
}

impl Manifest {
    pub fn new(source: impl Into<String>, generated_at: impl Into<String>, items: Vec<NormalizedRecord>) -> Self {
        Self {
            count: items.len(),
            generated_at: generated_at.into(),
            source: source.into(),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: Value) -> NormalizedRecord {
        let fields = match fields {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        NormalizedRecord {
            fields,
            locator: "https://example.test/list".into(),
            extracted_at: "2024-05-01 10:00:00".into(),
            source: "test".into(),
            methods: BTreeMap::new(),
            incomplete: false,
        }
    }

    #[test]
    fn empty_text_is_absent() {
        let field = ExtractedField::found("synopsis", "   ", ExtractionMethod::Primary);
        assert_eq!(field.method, ExtractionMethod::Absent);
        assert!(!field.is_present());
    }

    #[test]
    fn validity_needs_title_and_identifier() {
        assert!(record(json!({"title": "Movie X", "position": "1"})).is_valid());
        assert!(record(json!({"titulo": "Película", "url": "https://x"})).is_valid());
        assert!(!record(json!({"title": "Movie X"})).is_valid());
        assert!(!record(json!({"position": "1"})).is_valid());
    }

    #[test]
    fn content_ignores_identifying_metadata() {
        assert!(!record(json!({"title": "T", "position": "1"})).has_content());
        assert!(record(json!({"title": "T", "synopsis": "A story."})).has_content());
        assert!(!record(json!({"title": "T", "synopsis": ""})).has_content());
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut rec = record(json!({"title": "Movie X", "position": "1", "score": "91%"}));
        rec.methods
            .insert("synopsis".into(), ExtractionMethod::Fallback);
        let text = serde_json::to_string_pretty(&rec).unwrap();
        let back: NormalizedRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn media_kind_from_extension() {
        assert_eq!(MediaKind::from_extension(".PDF"), Some(MediaKind::Pdf));
        assert_eq!(MediaKind::from_extension("json"), Some(MediaKind::Json));
        assert_eq!(MediaKind::from_extension("docx"), None);
    }
}
