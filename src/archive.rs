//! ZIP archive classification and extraction.
//!
//! An archive is validated in full before anything is written: the central
//! directory must parse and every entry must read back with a matching CRC.
//! Only then are the entries with an allowed extension extracted, one
//! [`FileDescriptor`] per file.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{IngestError, IngestResult};
use crate::fetch::Fetcher;
use crate::files::{allowed_file, ensure_dir, extension_of};
use crate::models::FileDescriptor;

/// Reads every entry to the end so the zip reader checks each CRC.
fn validate_archive<R: Read + io::Seek>(archive: &mut ZipArchive<R>) -> Result<(), String> {
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        io::copy(&mut entry, &mut io::sink()).map_err(|e| format!("{}: {}", name, e))?;
    }
    Ok(())
}

/// Extracts the allowed entries of the ZIP at `zip_path` into `dest`.
///
/// Fails with [`IngestError::CorruptArchive`] (and writes nothing) if the
/// archive does not validate. Only failing to create `dest` is fatal; an
/// entry that cannot be written or is missing on disk afterwards is logged
/// as [`IngestError::ExtractionMismatch`] and left out of the result.
pub fn extract_archive(
    zip_path: &Path,
    dest: &Path,
    allowed_extensions: &[String],
) -> IngestResult<Vec<FileDescriptor>> {
    let corrupt = |reason: String| IngestError::CorruptArchive {
        path: zip_path.to_path_buf(),
        reason,
    };

    let file = File::open(zip_path).map_err(|e| IngestError::io(zip_path, &e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;
    validate_archive(&mut archive).map_err(corrupt)?;

    ensure_dir(dest)?;

    let mut descriptors = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }

        let entry_name = entry.name().to_string();
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(entry = %entry_name, "skipping entry with unsafe path");
            continue;
        };
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !allowed_file(&name, allowed_extensions) {
            tracing::debug!(entry = %entry_name, "skipping entry with disallowed extension");
            continue;
        }

        let target = dest.join(&relative);
        if let Err(e) = write_entry(&mut entry, &target) {
            let err = IngestError::ExtractionMismatch {
                entry: entry_name,
                path: target,
            };
            tracing::warn!(error = %err, reason = %e, "excluding entry");
            continue;
        }

        match descriptor_for(&relative, &target, &name) {
            Some(descriptor) => {
                tracing::info!(entry = %entry_name, size = descriptor.size, "extracted");
                descriptors.push(descriptor);
            }
            None => {
                let err = IngestError::ExtractionMismatch {
                    entry: entry_name,
                    path: target,
                };
                tracing::warn!(error = %err, "excluding entry");
            }
        }
    }

    Ok(descriptors)
}

/// Writes one entry to `target`, creating its parent folders. A partially
/// written file is removed before the error is returned.
fn write_entry(entry: &mut impl Read, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = File::create(target)?;
    if let Err(e) = io::copy(entry, &mut out) {
        drop(out);
        let _ = std::fs::remove_file(target);
        return Err(e);
    }
    Ok(())
}

fn descriptor_for(relative: &Path, target: &Path, name: &str) -> Option<FileDescriptor> {
    let metadata = std::fs::metadata(target).ok().filter(|m| m.is_file())?;
    let folder = relative
        .parent()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "root".to_string());
    Some(FileDescriptor {
        folder,
        name: name.to_string(),
        path: target.to_path_buf(),
        extension: extension_of(name).unwrap_or_default(),
        size: metadata.len(),
        modified: None,
    })
}

/// Downloads the ZIP at `url` into a temporary file inside `dest`, then extracts it.
///
/// The temporary archive is removed whatever the outcome.
pub async fn download_and_extract(
    fetcher: &Fetcher,
    url: &str,
    dest: &Path,
    allowed_extensions: &[String],
) -> IngestResult<Vec<FileDescriptor>> {
    ensure_dir(dest)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".download-")
        .suffix(".zip")
        .tempfile_in(dest)
        .map_err(|e| IngestError::io(dest, &e))?;

    let bytes = fetcher.download_to(url, temp.as_file_mut()).await?;
    tracing::info!(url, bytes, "archive downloaded");

    let zip_path = temp.path().to_path_buf();
    let dest_dir = dest.to_path_buf();
    let allowed = allowed_extensions.to_vec();
    let result = tokio::task::spawn_blocking(move || extract_archive(&zip_path, &dest_dir, &allowed))
        .await
        .map_err(|e| IngestError::CorruptArchive {
            path: PathBuf::from(url),
            reason: format!("extraction task failed: {}", e),
        })?;

    if let Err(e) = temp.close() {
        tracing::warn!(url, error = %e, "could not remove temporary archive");
    }
    result
}
