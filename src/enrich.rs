//! Optional translation of extracted text.
//!
//! Translation is an adapter at the edge of the pipeline. The [`Translator`]
//! trait hides the service; [`Enricher`] adds the policy: blank input is
//! passed through, long input is truncated, and any failure keeps the
//! original text.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::TranslationConfig;
use crate::error::{IngestError, IngestResult};

/// A text translation service.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` from `source_lang` (or `"auto"`) to `target_lang`.
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str)
        -> IngestResult<String>;
}

/// Client for the public Google translate endpoint.
pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(endpoint: &str, timeout_secs: u64) -> IngestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| IngestError::Setup(format!("translation client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> IngestResult<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", source_lang),
                ("tl", target_lang),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| IngestError::TranslationFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::TranslationFailure(format!(
                "translation service returned {}",
                status
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| IngestError::TranslationFailure(e.to_string()))?;
        parse_translation_response(&json)
    }
}

/// Joins the translated segments of a `translate_a/single` response.
///
/// The payload is a nested array whose first element lists
/// `[translated, original, ...]` pairs, one per sentence.
fn parse_translation_response(json: &Value) -> IngestResult<String> {
    let segments = json
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| IngestError::TranslationFailure("missing segment array".to_string()))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    if translated.trim().is_empty() {
        return Err(IngestError::TranslationFailure(
            "empty translation".to_string(),
        ));
    }
    Ok(translated)
}

/// Returns the input unchanged.
pub struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
    async fn translate(&self, text: &str, _source: &str, _target: &str) -> IngestResult<String> {
        Ok(text.to_string())
    }
}

/// Truncates `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Applies a [`Translator`] with pass-through on blank input and on failure.
pub struct Enricher {
    translator: Option<Box<dyn Translator>>,
    source_lang: String,
    target_lang: String,
    max_chars: usize,
    fields: Vec<String>,
}

impl Enricher {
    /// An enricher that never translates.
    pub fn disabled() -> Self {
        Self {
            translator: None,
            source_lang: String::new(),
            target_lang: String::new(),
            max_chars: usize::MAX,
            fields: Vec::new(),
        }
    }

    pub fn new(translator: Box<dyn Translator>, config: &TranslationConfig) -> Self {
        Self {
            translator: Some(translator),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
            max_chars: config.max_chars,
            fields: config.fields.clone(),
        }
    }

    /// Builds the enricher for `config`: the HTTP translator when enabled,
    /// otherwise a disabled one.
    pub fn from_config(config: &TranslationConfig) -> IngestResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let translator = GoogleTranslator::new(&config.endpoint, config.timeout_secs)?;
        Ok(Self::new(Box::new(translator), config))
    }

    pub fn is_enabled(&self) -> bool {
        self.translator.is_some()
    }

    /// Whether `field` should be translated. An empty field list selects
    /// the title and every section in `sections`.
    pub fn applies_to(&self, field: &str, sections: &[String]) -> bool {
        if self.fields.is_empty() {
            field == "title" || sections.iter().any(|s| s == field)
        } else {
            self.fields.iter().any(|f| f == field)
        }
    }

    /// Translated text, or the original on blank input, when disabled, or
    /// when the service fails. Failures are logged and never propagated.
    pub async fn enrich(&self, text: &str) -> String {
        let Some(translator) = &self.translator else {
            return text.to_string();
        };
        if text.trim().is_empty() {
            return text.to_string();
        }

        let input = truncate_chars(text, self.max_chars);
        if input.len() < text.len() {
            tracing::debug!(max_chars = self.max_chars, "truncating text before translation");
        }

        match translator
            .translate(input, &self.source_lang, &self.target_lang)
            .await
        {
            Ok(translated) => translated,
            Err(err) => {
                let err = match err {
                    IngestError::TranslationFailure(_) => err,
                    other => IngestError::TranslationFailure(other.to_string()),
                };
                tracing::warn!(error = %err, "keeping original text");
                text.to_string()
            }
        }
    }
}
