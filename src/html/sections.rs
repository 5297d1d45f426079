//! Two-phase extraction of labeled "Label: value" sections.
//!
//! The primary phase finds the text node carrying a label and reads the
//! remainder of its parent element's text. The fallback phase walks the
//! item's `div` containers and splits the innermost one holding the
//! literal `"<Label>:"` on that literal.
//!
//! The walk covers every descendant `div`, not only the item's direct
//! children, because listing markup wraps the labeled blocks in content
//! columns. Wrappers never produce a value: a `div` whose nested `div`
//! carries the same literal defers to it, so only the innermost holder is
//! read.
//! The fallback only runs for labels the primary phase missed, and it
//! never overwrites a value: the first phase to produce text wins.

use std::collections::BTreeMap;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::element_text;
use crate::models::{ExtractedField, ExtractionMethod};

/// A section label and the record field it populates.
#[derive(Debug, Clone)]
pub struct SectionLabel {
    /// Label as it appears in the markup, e.g. `"Critics Consensus"`.
    pub label: String,
    /// Record field name, e.g. `"critics_consensus"`.
    pub key: String,
    pattern: Regex,
    needle: String,
    marker: String,
}

impl SectionLabel {
    pub fn new(label: &str) -> Self {
        let label = label.trim();
        let key = label
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        // Escaped input always yields a valid pattern.
        let pattern = Regex::new(&format!(r"(?i){}[:\s]*(.+)", regex::escape(label)))
            .unwrap_or_else(|_| unreachable!("escaped label is a valid regex"));
        Self {
            label: label.to_string(),
            key,
            pattern,
            needle: label.to_lowercase(),
            marker: format!("{}:", label),
        }
    }
}

fn clean_value(raw: &str) -> Option<String> {
    let value = raw
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .trim_end();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Label substring search over text nodes, then a regex over the enclosing element.
#[derive(Debug, Clone, Default)]
pub struct PrimaryMatcher;

impl PrimaryMatcher {
    pub fn find(&self, item: ElementRef<'_>, label: &SectionLabel) -> Option<String> {
        for node in item.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            if !text.to_lowercase().contains(&label.needle) {
                continue;
            }
            let Some(parent) = node.parent().and_then(ElementRef::wrap) else {
                continue;
            };
            let full_text = element_text(parent);
            let value = label
                .pattern
                .captures(&full_text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| clean_value(m.as_str()));
            if value.is_some() {
                return value;
            }
        }
        None
    }
}

/// Structural pass over nested `div` containers.
#[derive(Debug, Clone)]
pub struct FallbackMatcher {
    containers: Selector,
}

impl Default for FallbackMatcher {
    fn default() -> Self {
        Self {
            containers: Selector::parse("div")
                .unwrap_or_else(|_| unreachable!("`div` is a valid selector")),
        }
    }
}

impl FallbackMatcher {
    /// Fills labels missing from `found`, at most one per container.
    pub fn fill(
        &self,
        item: ElementRef<'_>,
        labels: &[SectionLabel],
        found: &mut BTreeMap<String, (String, ExtractionMethod)>,
    ) {
        let item_class = item.value().attr("class");
        for container in item.select(&self.containers) {
            if container.id() == item.id() || container.value().attr("class") == item_class {
                continue;
            }
            let text = element_text(container);
            for label in labels {
                if found.contains_key(&label.key) {
                    continue;
                }
                let Some((_, rest)) = text.split_once(&label.marker) else {
                    continue;
                };
                if self.inner_container_holds(container, &label.marker) {
                    continue;
                }
                if let Some(value) = clean_value(rest) {
                    found.insert(label.key.clone(), (value, ExtractionMethod::Fallback));
                    break;
                }
            }
        }
    }
}

impl FallbackMatcher {
    /// Wrappers defer to the nested container that carries the same label.
    fn inner_container_holds(&self, container: ElementRef<'_>, marker: &str) -> bool {
        container
            .select(&self.containers)
            .any(|inner| element_text(inner).contains(marker))
    }
}

/// Primary matcher backed by the fallback matcher, applied per label.
#[derive(Debug, Clone)]
pub struct SectionStrategy {
    labels: Vec<SectionLabel>,
    primary: PrimaryMatcher,
    fallback: FallbackMatcher,
}

impl SectionStrategy {
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Self {
        Self {
            labels: labels.iter().map(|l| SectionLabel::new(l.as_ref())).collect(),
            primary: PrimaryMatcher,
            fallback: FallbackMatcher::default(),
        }
    }

    pub fn labels(&self) -> &[SectionLabel] {
        &self.labels
    }

    /// One field per configured label, in label order.
    pub fn extract(&self, item: ElementRef<'_>) -> Vec<ExtractedField> {
        let mut found: BTreeMap<String, (String, ExtractionMethod)> = BTreeMap::new();
        for label in &self.labels {
            if let Some(value) = self.primary.find(item, label) {
                found.insert(label.key.clone(), (value, ExtractionMethod::Primary));
            }
        }

        if found.len() < self.labels.len() {
            self.fallback.fill(item, &self.labels, &mut found);
        }

        self.labels
            .iter()
            .map(|label| match found.remove(&label.key) {
                Some((text, method)) => ExtractedField::found(&label.key, text, method),
                None => {
                    tracing::debug!(section = %label.label, "section not found in item");
                    ExtractedField::absent(&label.key)
                }
            })
            .collect()
    }
}
