//! Run progress on stderr.
//!
//! The pipeline emits one [`ProgressEvent`] when it opens a source, one per
//! item with that item's outcome, and one when the run is written out.
//! Reporters render them for a terminal or as JSON lines; stdout stays
//! free for command output.

use std::io::Write;

use serde::Serialize;

/// What kind of source an item came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Listing,
    Archive,
}

impl SourceKind {
    fn item_noun(self) -> &'static str {
        match self {
            SourceKind::Listing => "item",
            SourceKind::Archive => "entry",
        }
    }
}

/// Result of processing one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// A record with content was collected.
    Extracted,
    /// A record was collected but carries no content fields.
    Incomplete,
    /// Extraction failed; an empty record was collected.
    Failed(String),
    /// No record was produced.
    Skipped(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A listing page is being fetched or an archive opened.
    Opening { kind: SourceKind, locator: String },
    /// Item `n` of `total` is done.
    Item {
        kind: SourceKind,
        n: usize,
        total: usize,
        name: String,
        outcome: ItemOutcome,
    },
    /// Records and the manifest have been written.
    Finished {
        processed: usize,
        persisted: usize,
        skipped: usize,
        errors: usize,
    },
}

/// Human-readable line for `event`, without the trailing newline.
pub fn render_line(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Opening { kind, locator } => match kind {
            SourceKind::Listing => format!("listing  {}  fetching", locator),
            SourceKind::Archive => format!("archive  {}  opening", locator),
        },
        ProgressEvent::Item {
            kind,
            n,
            total,
            name,
            outcome,
        } => {
            let status = match outcome {
                ItemOutcome::Extracted => "extracted".to_string(),
                ItemOutcome::Incomplete => "incomplete".to_string(),
                ItemOutcome::Failed(reason) => format!("failed: {}", reason),
                ItemOutcome::Skipped(reason) => format!("skipped: {}", reason),
            };
            format!("[{}/{}] {}  {}  {}", n, total, kind.item_noun(), name, status)
        }
        ProgressEvent::Finished {
            processed,
            persisted,
            skipped,
            errors,
        } => format!(
            "done  processed {}, persisted {}, skipped {}, errors {}",
            processed, persisted, skipped, errors
        ),
    }
}

/// Receives pipeline progress.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Terminal lines on stderr.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: &ProgressEvent) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", render_line(event));
    }
}

/// One JSON object per event on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &ProgressEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

/// `--progress` values.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human lines when stderr is a terminal, nothing otherwise.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
