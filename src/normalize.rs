//! Assembly of [`NormalizedRecord`]s from extractor output.
//!
//! Normalization is pure: the run metadata (source label, timestamp) comes
//! in through [`RunContext`], so the same input always yields the same
//! record.

use std::collections::BTreeMap;

use chrono::Local;
use serde_json::Value;

use crate::extract::{ExtractedContent, Extraction};
use crate::html::ItemExtraction;
use crate::models::{ExtractionMethod, FileDescriptor, NormalizedRecord};

/// Timestamp format used for `extracted_at` and `generated_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Metadata shared by every record of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub source: String,
    pub extracted_at: String,
}

impl RunContext {
    pub fn new(source: impl Into<String>, extracted_at: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            extracted_at: extracted_at.into(),
        }
    }

    /// Context stamped with the current local time.
    pub fn now(source: impl Into<String>) -> Self {
        Self::new(source, Local::now().format(TIMESTAMP_FORMAT).to_string())
    }
}

struct RecordBuilder {
    fields: BTreeMap<String, Value>,
    methods: BTreeMap<String, ExtractionMethod>,
}

impl RecordBuilder {
    fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    fn text(&mut self, name: &str, value: Option<String>) {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.fields.insert(name.to_string(), Value::String(value));
        }
    }

    fn value(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    fn method(&mut self, name: &str, method: ExtractionMethod) {
        self.methods.insert(name.to_string(), method);
    }

    fn build(self, locator: String, ctx: &RunContext) -> NormalizedRecord {
        let mut record = NormalizedRecord {
            fields: self.fields,
            locator,
            extracted_at: ctx.extracted_at.clone(),
            source: ctx.source.clone(),
            methods: self.methods,
            incomplete: false,
        };
        record.incomplete = !record.has_content();
        if record.incomplete {
            tracing::debug!(locator = %record.locator, "record has no content fields");
        }
        record
    }
}

/// Builds the record for one listing item found at `locator`.
///
/// Absent sections are left out of the field map but recorded in
/// `methods` as [`ExtractionMethod::Absent`].
pub fn normalize_item(item: ItemExtraction, ctx: &RunContext, locator: &str) -> NormalizedRecord {
    let mut builder = RecordBuilder::new();
    builder.text("position", item.position);
    builder.text("title", item.title);
    builder.text("year", item.year);
    builder.text("tomatometer_score", item.score);

    for section in item.sections {
        builder.method(&section.name, section.method);
        builder.text(&section.name, section.text);
    }

    builder.text("image_url", item.image_url);
    builder.text("image_alt", item.image_alt);
    builder.text("url", item.url);
    builder.build(locator.to_string(), ctx)
}

/// Builds the record for one extracted file.
///
/// The file name is the record title. Text lands in `content`, parsed JSON
/// in `data`.
pub fn normalize_document(
    descriptor: &FileDescriptor,
    extraction: Extraction,
    ctx: &RunContext,
) -> NormalizedRecord {
    let mut builder = RecordBuilder::new();
    builder.text("title", Some(descriptor.name.clone()));
    builder.text("name", Some(descriptor.name.clone()));
    builder.text("path", Some(descriptor.path.display().to_string()));
    builder.text("folder", Some(descriptor.folder.clone()));
    builder.text("extension", Some(descriptor.extension.clone()));
    builder.value("size", Value::from(descriptor.size));

    match extraction.content {
        ExtractedContent::Text(text) => {
            builder.method("content", extraction.method);
            builder.text("content", Some(text));
        }
        ExtractedContent::Structure(value) => {
            builder.method("data", extraction.method);
            builder.value("data", value);
        }
    }
    if let Some(error) = extraction.error {
        builder.value("error", Value::String(error.to_string()));
    }

    builder.build(descriptor.path.display().to_string(), ctx)
}
