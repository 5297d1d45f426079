//! Run orchestration.
//!
//! A [`Pipeline`] owns everything scoped to one run: the HTTP client, the
//! enricher, the cancellation token and the ordered record collection.
//! Items are processed one at a time in source order; a failing item is
//! recorded in the [`RunReport`] and the run moves on. Only setup failures
//! abort.
//!
//! ```text
//! listing page ──► ListingExtractor ──► Enricher ──┐
//!                                                  ├─► normalize ──► records ──► finish()
//! ZIP archive ──► extract_archive ──► extract() ───┘                  (files + manifest)
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::archive::{download_and_extract, extract_archive};
use crate::config::Config;
use crate::enrich::Enricher;
use crate::error::{IngestError, IngestResult};
use crate::extract::{extract, ExtractOptions};
use crate::fetch::Fetcher;
use crate::html::{ItemExtraction, ListingExtractor};
use crate::models::{FileDescriptor, Manifest, MediaKind, NormalizedRecord, SourceItem};
use crate::normalize::{normalize_document, normalize_item, RunContext, TIMESTAMP_FORMAT};
use crate::progress::{ItemOutcome, NoProgress, ProgressEvent, ProgressReporter, SourceKind};
use crate::sink::{submit_records, BulkReport, IndexClient};
use crate::writer::{read_json, write_manifest, write_records};

/// Counts and non-fatal errors of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Items that went through extraction.
    pub processed: usize,
    /// Records written to disk.
    pub persisted: usize,
    /// Records not written: invalid or failed writes.
    pub skipped: usize,
    #[serde(serialize_with = "errors_as_strings")]
    pub errors: Vec<IngestError>,
    pub manifest: Option<PathBuf>,
}

fn errors_as_strings<S: serde::Serializer>(
    errors: &[IngestError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

/// State of one extraction run.
pub struct Pipeline {
    config: Config,
    fetcher: Fetcher,
    enricher: Enricher,
    cancel: CancellationToken,
    progress: Box<dyn ProgressReporter>,
    source: Option<String>,
    records: Vec<NormalizedRecord>,
    report: RunReport,
}

impl Pipeline {
    pub fn new(config: Config) -> IngestResult<Self> {
        let fetcher = Fetcher::new(&config.scrape.user_agent, config.scrape.timeout_secs)?;
        let enricher = Enricher::from_config(&config.translation)?;
        Ok(Self {
            config,
            fetcher,
            enricher,
            cancel: CancellationToken::new(),
            progress: Box::new(NoProgress),
            source: None,
            records: Vec::new(),
            report: RunReport::default(),
        })
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the run between items and at every wait.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Records collected so far, in source order.
    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    fn note(&mut self, error: IngestError) {
        if error == IngestError::Cancelled && self.report.errors.contains(&error) {
            return;
        }
        self.report.errors.push(error);
    }

    fn label(&mut self, source: &str) -> RunContext {
        let source = self.source.get_or_insert_with(|| source.to_string()).clone();
        RunContext::now(source)
    }

    /// Fetches the listing at `url` and collects one record per item.
    ///
    /// A fetch failure is recorded and yields zero items.
    pub async fn scrape_listing(&mut self, url: &str) -> IngestResult<usize> {
        self.progress.report(&ProgressEvent::Opening {
            kind: SourceKind::Listing,
            locator: url.to_string(),
        });

        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.fetcher.get_text(url) => Some(result),
        };
        match fetched {
            None => {
                self.note(IngestError::Cancelled);
                Ok(0)
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "listing not fetched");
                self.note(err);
                Ok(0)
            }
            Some(Ok(html)) => self.ingest_listing_html(&html, url).await,
        }
    }

    /// Extracts, enriches and normalizes every item of an already fetched page.
    ///
    /// Waits the configured delay after each item except the last.
    pub async fn ingest_listing_html(&mut self, html: &str, locator: &str) -> IngestResult<usize> {
        let extractor = ListingExtractor::new(&self.config.scrape)?;
        let section_keys: Vec<String> = extractor
            .strategy()
            .labels()
            .iter()
            .map(|l| l.key.clone())
            .collect();
        let items = extractor.extract_page(html);
        let ctx = self.label(&self.config.scrape.source_label.clone());

        let total = items.len();
        let mut collected = 0;
        for (index, item) in items.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.note(IngestError::Cancelled);
                break;
            }
            let item = enrich_item(&self.enricher, item, &section_keys).await;
            let record = normalize_item(item, &ctx, locator);
            let name = record
                .title()
                .or_else(|| record.get_str("position"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", index + 1));
            self.progress.report(&ProgressEvent::Item {
                kind: SourceKind::Listing,
                n: index + 1,
                total,
                name,
                outcome: outcome_of(&record, None),
            });
            self.report.processed += 1;
            self.records.push(record);
            collected += 1;

            if index + 1 < total && !self.pause().await {
                self.note(IngestError::Cancelled);
                break;
            }
        }

        tracing::info!(locator, collected, "listing processed");
        Ok(collected)
    }

    /// Sleeps the inter-item delay. Returns false if cancelled meanwhile.
    async fn pause(&self) -> bool {
        let delay = Duration::from_millis(self.config.scrape.delay_ms);
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Extracts the archive at `source` (a local path or an http(s) URL) into
    /// `dest` and collects one record per allowed file.
    ///
    /// A corrupt archive or failed download is recorded and yields zero items.
    pub async fn process_archive(
        &mut self,
        source: &str,
        dest: &Path,
        ocr: bool,
    ) -> IngestResult<usize> {
        self.progress.report(&ProgressEvent::Opening {
            kind: SourceKind::Archive,
            locator: source.to_string(),
        });
        let allowed = self.config.archive.allowed_extensions.clone();

        let extracted = if is_remote(source) {
            let fetcher = Fetcher::new(
                &self.config.scrape.user_agent,
                self.config.archive.download_timeout_secs,
            )?;
            tokio::select! {
                _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
                result = download_and_extract(&fetcher, source, dest, &allowed) => result,
            }
        } else {
            let zip_path = PathBuf::from(source);
            let dest_dir = dest.to_path_buf();
            tokio::task::spawn_blocking(move || extract_archive(&zip_path, &dest_dir, &allowed))
                .await
                .unwrap_or_else(|e| {
                    Err(IngestError::CorruptArchive {
                        path: PathBuf::from(source),
                        reason: format!("extraction task failed: {}", e),
                    })
                })
        };

        let files = match extracted {
            Ok(files) => files,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "archive not processed");
                self.note(err);
                return Ok(0);
            }
        };

        tracing::info!(source, files = files.len(), "archive extracted");
        Ok(self.process_files(&files, ocr).await)
    }

    /// Extracts and normalizes each file in order. Files whose extension maps
    /// to no media kind are skipped.
    pub async fn process_files(&mut self, files: &[FileDescriptor], ocr: bool) -> usize {
        let ctx = self.label(&self.config.archive.source_label.clone());
        let options = ExtractOptions {
            ocr,
            ocr_config: self.config.ocr.clone(),
        };

        let total = files.len();
        let mut collected = 0;
        for (index, file) in files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.note(IngestError::Cancelled);
                break;
            }
            let name = if file.folder == "root" {
                file.name.clone()
            } else {
                format!("{}/{}", file.folder, file.name)
            };

            let Some(kind) = MediaKind::from_extension(&file.extension) else {
                tracing::debug!(file = %file.name, "no extractor for extension");
                self.progress.report(&ProgressEvent::Item {
                    kind: SourceKind::Archive,
                    n: index + 1,
                    total,
                    name,
                    outcome: ItemOutcome::Skipped(format!("no extractor for .{}", file.extension)),
                });
                continue;
            };

            let extraction = extract(SourceItem::from_path(&file.path, kind), &options).await;
            let error = extraction.error.clone();
            let record = normalize_document(file, extraction, &ctx);
            self.progress.report(&ProgressEvent::Item {
                kind: SourceKind::Archive,
                n: index + 1,
                total,
                name,
                outcome: outcome_of(&record, error.as_ref()),
            });
            if let Some(err) = error {
                self.note(err);
            }
            self.report.processed += 1;
            self.records.push(record);
            collected += 1;
        }
        collected
    }

    /// Writes every collected record, then the manifest, into `out_dir`.
    ///
    /// The manifest lists the valid records in collection order.
    pub fn finish(mut self, out_dir: &Path) -> IngestResult<RunReport> {
        let summary = write_records(out_dir, &self.records, self.config.output.slug_max_len)?;
        self.report.persisted = summary.saved;
        self.report.skipped = summary.skipped_invalid + summary.failed;

        let items: Vec<NormalizedRecord> = self
            .records
            .into_iter()
            .filter(NormalizedRecord::is_valid)
            .collect();
        let source = self.source.unwrap_or_default();
        let generated_at = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let manifest = Manifest::new(source, generated_at, items);
        let path = write_manifest(out_dir, &manifest, &self.config.output.manifest_name)?;
        self.report.manifest = Some(path);

        self.progress.report(&ProgressEvent::Finished {
            processed: self.report.processed,
            persisted: self.report.persisted,
            skipped: self.report.skipped,
            errors: self.report.errors.len(),
        });
        tracing::info!(
            processed = self.report.processed,
            persisted = self.report.persisted,
            skipped = self.report.skipped,
            errors = self.report.errors.len(),
            "run finished"
        );
        Ok(self.report)
    }
}

async fn enrich_item(enricher: &Enricher, mut item: ItemExtraction, sections: &[String]) -> ItemExtraction {
    if !enricher.is_enabled() {
        return item;
    }
    if let Some(title) = item.title.take() {
        item.title = Some(if enricher.applies_to("title", sections) {
            enricher.enrich(&title).await
        } else {
            title
        });
    }
    for field in &mut item.sections {
        if !enricher.applies_to(&field.name, sections) {
            continue;
        }
        if let Some(text) = &field.text {
            field.text = Some(enricher.enrich(text).await);
        }
    }
    item
}

fn outcome_of(record: &NormalizedRecord, error: Option<&IngestError>) -> ItemOutcome {
    match error {
        Some(err) => ItemOutcome::Failed(err.to_string()),
        None if record.incomplete => ItemOutcome::Incomplete,
        None => ItemOutcome::Extracted,
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Reads a manifest written by [`Pipeline::finish`] and submits its items.
pub async fn index_manifest(
    client: &dyn IndexClient,
    manifest_path: &Path,
    index: &str,
) -> IngestResult<BulkReport> {
    let (value, error) = read_json(manifest_path);
    if let Some(err) = error {
        return Err(err);
    }
    let manifest: Manifest =
        serde_json::from_value(value).map_err(|e| IngestError::MalformedDocument {
            locator: manifest_path.display().to_string(),
            reason: e.to_string(),
        })?;
    submit_records(client, index, &manifest.items).await
}
