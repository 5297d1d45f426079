//! Error taxonomy for the extraction pipeline.
//!
//! Every variant except [`IngestError::Setup`] is non-fatal to a run: the
//! affected item (or archive) degrades to an empty result and the error is
//! handed back to the caller for reporting.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while acquiring, extracting, enriching or indexing content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Network failure, timeout, or non-2xx response.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    /// The archive failed integrity validation; nothing was extracted.
    #[error("corrupt archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    /// An entry listed in the archive was not on disk after extraction.
    #[error("entry {entry} missing after extraction to {path}")]
    ExtractionMismatch { entry: String, path: PathBuf },

    /// The PDF requires a password.
    #[error("encrypted document: {locator}")]
    EncryptedDocument { locator: String },

    /// Neither the primary nor the fallback text encoding could decode the input.
    #[error("unsupported encoding: {locator}")]
    UnsupportedEncoding { locator: String },

    /// The document could not be parsed (bad PDF, malformed JSON, ...).
    #[error("malformed document {locator}: {reason}")]
    MalformedDocument { locator: String, reason: String },

    /// OCR was requested but is not available in this build or failed to start.
    #[error("OCR unavailable for {locator}: {reason}")]
    OcrUnavailable { locator: String, reason: String },

    /// The translation service failed; the source text was kept.
    #[error("translation failed: {0}")]
    TranslationFailure(String),

    /// Some items of a bulk submission were rejected by the index.
    #[error("{failed} item(s) rejected by the index")]
    IndexingPartialFailure { failed: usize },

    /// Local I/O failure on a single item.
    #[error("I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    /// Setup failure (destination cannot be created, ...). Fatal for the run.
    #[error("setup failed: {0}")]
    Setup(String),

    /// The run was cancelled before the operation completed.
    #[error("cancelled")]
    Cancelled,
}

impl IngestError {
    /// Whether this error must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Setup(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        IngestError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// Result alias for pipeline operations.
pub type IngestResult<T> = Result<T, IngestError>;
