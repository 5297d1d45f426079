//! Local folder helpers: idempotent directory creation, filtered listing,
//! and clearing a folder's contents.

use std::path::Path;
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::{IngestError, IngestResult};
use crate::models::FileDescriptor;

/// Creates `path` and its parents. Succeeds if it already exists.
pub fn ensure_dir(path: &Path) -> IngestResult<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| IngestError::Setup(format!("cannot create {}: {}", path.display(), e)))
}

/// Lower-case extension of `name` without the dot, if any.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Whether `name` carries one of `extensions` (compared case-insensitively,
/// leading dots ignored). Names without an extension are never allowed.
pub fn allowed_file(name: &str, extensions: &[String]) -> bool {
    match extension_of(name) {
        Some(ext) => extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

/// Lists the regular files directly inside `dir`, optionally filtered by extension.
///
/// A missing directory yields an empty list. Results are sorted by name.
pub fn list_files(dir: &Path, extensions: Option<&[String]>) -> IngestResult<Vec<FileDescriptor>> {
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "listing skipped, directory does not exist");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| IngestError::Io {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(exts) = extensions {
            if !allowed_file(&name, exts) {
                continue;
            }
        }

        files.push(describe_file(entry.path())?);
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Descriptor for a single file, with `"root"` as its folder.
pub fn describe_file(path: &Path) -> IngestResult<FileDescriptor> {
    let metadata = std::fs::metadata(path).map_err(|e| IngestError::io(path, &e))?;
    if !metadata.is_file() {
        return Err(IngestError::Io {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let modified = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64);

    Ok(FileDescriptor {
        folder: "root".to_string(),
        extension: extension_of(&name).unwrap_or_default(),
        name,
        path: path.to_path_buf(),
        size: metadata.len(),
        modified,
    })
}

pub fn list_json_files(dir: &Path) -> IngestResult<Vec<FileDescriptor>> {
    list_files(dir, Some(&["json".to_string()]))
}

/// Removes everything inside `dir` but keeps the directory itself.
pub fn clear_dir_contents(dir: &Path) -> IngestResult<()> {
    if !dir.exists() {
        return Ok(());
    }
    if !dir.is_dir() {
        return Err(IngestError::Io {
            path: dir.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| IngestError::io(dir, &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::io(dir, &e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| IngestError::io(&path, &e))?;
        let result = if file_type.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        result.map_err(|e| IngestError::io(&path, &e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn allowed_file_checks_extension() {
        let allowed = exts(&["txt", ".PDF"]);
        assert!(allowed_file("notes.TXT", &allowed));
        assert!(allowed_file("scan.pdf", &allowed));
        assert!(!allowed_file("data.json", &allowed));
        assert!(!allowed_file("README", &allowed));
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn list_files_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.json"), "{}").unwrap();
        fs::write(tmp.path().join("a.json"), "[1, 2]").unwrap();
        fs::write(tmp.path().join("c.txt"), "hello").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("d.json"), "{}").unwrap();

        let json = list_json_files(tmp.path()).unwrap();
        let names: Vec<_> = json.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
        assert_eq!(json[0].size, 6);
        assert!(json[0].modified.is_some());

        let all = list_files(tmp.path(), None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn describe_single_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Report.PDF");
        fs::write(&path, b"%PDF").unwrap();
        let d = describe_file(&path).unwrap();
        assert_eq!(d.name, "Report.PDF");
        assert_eq!(d.extension, "pdf");
        assert_eq!(d.folder, "root");
        assert_eq!(d.size, 4);
        assert!(describe_file(tmp.path()).is_err());
    }

    #[test]
    fn list_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(list_files(&tmp.path().join("nope"), None).unwrap().is_empty());
    }

    #[test]
    fn clear_keeps_directory() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("x.txt"), "x").unwrap();
        fs::create_dir_all(tmp.path().join("nested").join("deep")).unwrap();
        clear_dir_contents(tmp.path()).unwrap();
        assert!(tmp.path().is_dir());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
        clear_dir_contents(&tmp.path().join("missing")).unwrap();
    }

    #[test]
    fn clear_rejects_file_path() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("x.txt");
        fs::write(&file, "x").unwrap();
        assert!(clear_dir_contents(&file).is_err());
    }
}
