//! End-to-end runs of the pipeline against on-disk fixtures.
//!
//! Archives are built with `zip::ZipWriter`, PDFs with `lopdf`; nothing
//! touches the network.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::Value;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use content_harvester::config::Config;
use content_harvester::error::{IngestError, IngestResult};
use content_harvester::models::{ExtractionMethod, NormalizedRecord};
use content_harvester::pipeline::{index_manifest, Pipeline};
use content_harvester::sink::{BulkAction, BulkResponse, IndexClient};
use content_harvester::writer::read_json;

/// One-page PDF. `text: None` leaves the page without a text layer.
fn pdf(text: Option<&str>, encrypted: bool) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let operations = match text {
        Some(text) => vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
        None => vec![],
    };
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if encrypted {
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "P" => -44,
        });
        doc.trailer.set("Encrypt", encrypt_id);
    }

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut zip = zip::ZipWriter::new(fs::File::create(path).unwrap());
    for (name, body) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap();
}

fn config() -> Config {
    let mut config = Config::minimal();
    config.scrape.delay_ms = 0;
    config
}

fn record_by_name<'a>(records: &'a [NormalizedRecord], name: &str) -> &'a NormalizedRecord {
    records
        .iter()
        .find(|r| r.get_str("name") == Some(name))
        .unwrap_or_else(|| panic!("no record for {}", name))
}

#[tokio::test]
async fn archive_run_extracts_every_document() {
    let tmp = TempDir::new().unwrap();
    let zip_path = tmp.path().join("docs.zip");
    write_zip(
        &zip_path,
        &[
            ("notes/a.txt", b"Meeting notes\n".to_vec()),
            ("report.pdf", pdf(Some("Quarterly revenue grew"), false)),
            ("data.json", br#"{"title": "Inventory", "items": [1, 2]}"#.to_vec()),
            ("bad.json", b"{broken".to_vec()),
            ("secret.pdf", pdf(Some("Hidden"), true)),
            ("photo.png", b"\x89PNG".to_vec()),
        ],
    );
    let dest = tmp.path().join("extracted");
    let out = tmp.path().join("output");

    let mut pipeline = Pipeline::new(config()).unwrap();
    let n = pipeline
        .process_archive(zip_path.to_str().unwrap(), &dest, false)
        .await
        .unwrap();
    assert_eq!(n, 5);
    assert!(!dest.join("photo.png").exists());

    let records = pipeline.records().to_vec();
    let notes = record_by_name(&records, "a.txt");
    assert_eq!(notes.get_str("content"), Some("Meeting notes"));
    assert_eq!(notes.get_str("folder"), Some("notes"));

    let report_pdf = record_by_name(&records, "report.pdf");
    assert!(report_pdf
        .get_str("content")
        .unwrap()
        .contains("Quarterly revenue grew"));
    assert_eq!(report_pdf.methods["content"], ExtractionMethod::Primary);

    let data = record_by_name(&records, "data.json");
    assert_eq!(data.fields["data"]["title"], "Inventory");

    let bad = record_by_name(&records, "bad.json");
    assert_eq!(bad.fields["data"], serde_json::json!({}));
    assert!(bad.incomplete);

    let secret = record_by_name(&records, "secret.pdf");
    assert!(secret.get_str("content").is_none());
    assert!(secret.incomplete);

    let errors = &pipeline.report().errors;
    assert!(errors
        .iter()
        .any(|e| matches!(e, IngestError::EncryptedDocument { locator } if locator.ends_with("secret.pdf"))));
    assert!(errors
        .iter()
        .any(|e| matches!(e, IngestError::MalformedDocument { .. })));

    let report = pipeline.finish(&out).unwrap();
    assert_eq!(report.processed, 5);
    assert_eq!(report.persisted, 5);
    let (manifest, err) = read_json(&report.manifest.unwrap());
    assert!(err.is_none());
    assert_eq!(manifest["count"], 5);
    assert_eq!(manifest["source"], "archive");
}

#[tokio::test]
async fn corrupt_archive_is_reported_and_extracts_nothing() {
    let tmp = TempDir::new().unwrap();
    let good = tmp.path().join("good.zip");
    write_zip(&good, &[("a.txt", b"hello".to_vec()), ("b.txt", b"world".to_vec())]);
    let bytes = fs::read(&good).unwrap();
    let truncated = tmp.path().join("truncated.zip");
    fs::write(&truncated, &bytes[..bytes.len() / 2]).unwrap();

    let dest = tmp.path().join("extracted");
    let mut pipeline = Pipeline::new(config()).unwrap();
    let n = pipeline
        .process_archive(truncated.to_str().unwrap(), &dest, false)
        .await
        .unwrap();
    assert_eq!(n, 0);
    assert!(pipeline.records().is_empty());
    assert!(matches!(
        pipeline.report().errors.as_slice(),
        [IngestError::CorruptArchive { .. }]
    ));
    assert!(!dest.exists());
}

#[cfg(not(feature = "ocr"))]
#[tokio::test]
async fn scanned_pdf_without_ocr_support_is_incomplete() {
    let tmp = TempDir::new().unwrap();
    let zip_path = tmp.path().join("scans.zip");
    write_zip(&zip_path, &[("scan.pdf", pdf(None, false))]);

    let mut pipeline = Pipeline::new(config()).unwrap();
    pipeline
        .process_archive(zip_path.to_str().unwrap(), &tmp.path().join("x"), true)
        .await
        .unwrap();

    let record = &pipeline.records()[0];
    assert!(record.incomplete);
    assert_eq!(record.methods["content"], ExtractionMethod::Absent);
    assert!(matches!(
        pipeline.report().errors.as_slice(),
        [IngestError::OcrUnavailable { .. }]
    ));
}

const LISTING: &str = r#"<!doctype html>
<html><body>
<div class="row countdown-item">
  <div class="article_movie_poster"><a href="/m/movie_x"><img src="/img/x.jpg" alt="Movie X"></a></div>
  <div class="countdown-item-content">
    <span class="countdown-index">#1</span>
    <div class="article_movie_title"><h2>Movie X (2024) 91%</h2></div>
    <span class="tMeterScore">91%</span>
    <div class="info critics-consensus">Critics Consensus: Great film.</div>
    <div class="info synopsis"><strong>Synopsis:</strong> A heist goes wrong.</div>
  </div>
</div>
<div class="row countdown-item">
  <span class="countdown-index">#2</span>
  <h2>Película Ñ (2023)</h2>
  <span class="tMeterScore">N/A</span>
  <a href="https://other.test/m/n">link</a>
</div>
</body></html>"#;

#[tokio::test]
async fn listing_run_produces_files_and_manifest() {
    let tmp = TempDir::new().unwrap();
    let mut pipeline = Pipeline::new(config()).unwrap();
    let n = pipeline
        .ingest_listing_html(LISTING, "https://editorial.rottentomatoes.com/guide/best-new-movies/")
        .await
        .unwrap();
    assert_eq!(n, 2);

    let report = pipeline.finish(tmp.path()).unwrap();
    assert_eq!(report.persisted, 2);
    assert!(report.errors.is_empty());

    let (first, _) = read_json(&tmp.path().join("1_movie_x.json"));
    assert_eq!(first["title"], "Movie X");
    assert_eq!(first["year"], "2024");
    assert_eq!(first["tomatometer_score"], "91%");
    assert_eq!(first["critics_consensus"], "Great film.");
    assert_eq!(first["synopsis"], "A heist goes wrong.");
    assert_eq!(first["methods"]["synopsis"], "fallback");
    assert_eq!(first["methods"]["directed_by"], "absent");
    assert_eq!(first["image_url"], "https://editorial.rottentomatoes.com/img/x.jpg");
    assert_eq!(first["url"], "https://editorial.rottentomatoes.com/m/movie_x");

    let raw = fs::read_to_string(tmp.path().join("2_película_ñ.json")).unwrap();
    assert!(raw.contains("Película Ñ"));
    let second: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(second["tomatometer_score"], "N/A");
    assert_eq!(second["url"], "https://other.test/m/n");

    let (manifest, _) = read_json(&tmp.path().join("all_movies_combined.json"));
    assert_eq!(manifest["count"], 2);
    assert_eq!(manifest["items"][0]["position"], "1");
    assert_eq!(manifest["items"][1]["position"], "2");
}

struct RecordingIndex {
    submitted: Mutex<Vec<String>>,
}

#[async_trait]
impl IndexClient for RecordingIndex {
    async fn bulk(&self, actions: &[BulkAction]) -> IngestResult<BulkResponse> {
        let mut submitted = self.submitted.lock().unwrap();
        for action in actions {
            submitted.push(format!("{}:{}", action.index, action.source.title().unwrap_or("")));
        }
        Ok(BulkResponse {
            succeeded: actions.len(),
            errors: Vec::new(),
        })
    }
}

#[tokio::test]
async fn manifest_can_be_indexed() {
    let tmp = TempDir::new().unwrap();
    let mut pipeline = Pipeline::new(config()).unwrap();
    pipeline
        .ingest_listing_html(LISTING, "https://editorial.rottentomatoes.com/guide/best-new-movies/")
        .await
        .unwrap();
    let report = pipeline.finish(tmp.path()).unwrap();

    let index = RecordingIndex {
        submitted: Mutex::new(Vec::new()),
    };
    let bulk = index_manifest(&index, &report.manifest.unwrap(), "movies")
        .await
        .unwrap();
    assert_eq!(bulk.success_count, 2);
    assert!(bulk.errors.is_empty());
    assert_eq!(
        *index.submitted.lock().unwrap(),
        vec!["movies:Movie X".to_string(), "movies:Película Ñ".to_string()]
    );
}
