//! Persistence of records and the run manifest.
//!
//! Records are written one pretty-printed JSON file each. The manifest is
//! written once, after the collection is final, through a temporary file
//! in the same directory that is then renamed into place.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{IngestError, IngestResult};
use crate::files::ensure_dir;
use crate::models::{Manifest, NormalizedRecord};

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// File-system safe slug of `title`, at most `max_len` characters.
pub fn record_slug(title: &str, max_len: usize) -> String {
    let stripped: String = title.chars().filter(|c| !FORBIDDEN.contains(c)).collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
        .chars()
        .take(max_len)
        .collect()
}

/// `<position>_<slug>.json`, or `<seq:03>_<slug>.json` when the record has
/// no position. `seq` is 1-based.
pub fn record_file_name(record: &NormalizedRecord, seq: usize, max_len: usize) -> String {
    let slug = record_slug(record.title().unwrap_or_default(), max_len);
    match record
        .get_str("position")
        .map(|p| record_slug(p, max_len))
        .filter(|p| !p.is_empty())
    {
        Some(position) => format!("{}_{}.json", position, slug),
        None => format!("{:03}_{}.json", seq, slug),
    }
}

/// Outcome of [`write_records`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub saved: usize,
    pub skipped_invalid: usize,
    pub failed: usize,
    pub paths: Vec<PathBuf>,
}

/// Writes each valid record to its own file in `dir`.
///
/// Invalid records are skipped, a failed write is counted; neither stops
/// the loop. Only failing to create `dir` is an error.
pub fn write_records(
    dir: &Path,
    records: &[NormalizedRecord],
    slug_max_len: usize,
) -> IngestResult<WriteSummary> {
    ensure_dir(dir)?;

    let mut summary = WriteSummary::default();
    let mut used: HashSet<String> = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let seq = index + 1;
        if !record.is_valid() {
            tracing::warn!(locator = %record.locator, seq, "skipping record without title or identifier");
            summary.skipped_invalid += 1;
            continue;
        }

        let name = unique_name(&mut used, record, seq, slug_max_len);
        let path = dir.join(&name);
        match save_json(&path, record) {
            Ok(()) => {
                tracing::info!(file = %name, "record saved");
                summary.saved += 1;
                summary.paths.push(path);
            }
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "failed to save record");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

fn unique_name(
    used: &mut HashSet<String>,
    record: &NormalizedRecord,
    seq: usize,
    max_len: usize,
) -> String {
    let preferred = record_file_name(record, seq, max_len);
    let name = if used.contains(&preferred) {
        let slug = record_slug(record.title().unwrap_or_default(), max_len);
        let by_seq = format!("{:03}_{}.json", seq, slug);
        if used.contains(&by_seq) {
            format!("{:03}_{}_{}.json", seq, slug, used.len())
        } else {
            by_seq
        }
    } else {
        preferred
    };
    used.insert(name.clone());
    name
}

/// Atomically writes `manifest` to `dir/name`.
pub fn write_manifest(dir: &Path, manifest: &Manifest, name: &str) -> IngestResult<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join(name);

    let mut temp = tempfile::Builder::new()
        .prefix(".manifest-")
        .suffix(".json")
        .tempfile_in(dir)
        .map_err(|e| IngestError::io(dir, &e))?;
    let body = to_pretty_json(manifest, &path)?;
    if let Err(e) = temp.write_all(body.as_bytes()).and_then(|()| temp.flush()) {
        return Err(IngestError::io(temp.path(), &e));
    }
    temp.persist(&path)
        .map_err(|e| IngestError::io(&path, &e.error))?;

    tracing::info!(path = %path.display(), count = manifest.count, "manifest written");
    Ok(path)
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> IngestResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| IngestError::Io {
        path: path.to_path_buf(),
        reason: format!("serialize: {}", e),
    })
}

/// Writes `value` as pretty-printed UTF-8 JSON, creating parent directories.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> IngestResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    let body = to_pretty_json(value, path)?;
    std::fs::write(path, body).map_err(|e| IngestError::io(path, &e))
}

/// Reads a JSON file. A missing or malformed file yields an empty object
/// together with the error.
pub fn read_json(path: &Path) -> (Value, Option<IngestError>) {
    let empty = || Value::Object(Default::default());
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => return (empty(), Some(IngestError::io(path, &e))),
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => (value, None),
        Err(e) => (
            empty(),
            Some(IngestError::MalformedDocument {
                locator: path.display().to_string(),
                reason: e.to_string(),
            }),
        ),
    }
}
