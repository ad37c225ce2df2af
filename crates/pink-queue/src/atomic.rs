//! Atomic file writes for the small state files (session id, attachments).
//!
//! Writes go to a temp file in the target directory and are renamed into
//! place, so a reader never observes a half-written value.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{QueueError, Result};

/// Writes `data` to `path` atomically, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| QueueError::DirectoryError {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let write_err = |source| QueueError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    temp_file.write_all(data).map_err(write_err)?;
    temp_file.flush().map_err(write_err)?;
    temp_file
        .persist(path)
        .map_err(|e| QueueError::WriteError {
            path: path.to_path_buf(),
            source: e.error,
        })?;

    Ok(())
}

/// Serializes `value` as JSON and writes it atomically.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    atomic_write(path, json.as_bytes())
}

/// Reads a trimmed text value. Missing or blank files read as `None`.
pub fn read_text_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(data) => {
            let value = data.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(QueueError::ReadError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Reads JSON from a file, returning `None` if it is missing or blank.
pub fn read_json_optional<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_text_optional(path)? {
        Some(data) => Ok(Some(serde_json::from_str(&data)?)),
        None => Ok(None),
    }
}

/// Removes a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(QueueError::WriteError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/session");

        atomic_write(&path, b"abc-123").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "abc-123");
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session");

        atomic_write(&path, b"a much longer first value").unwrap();
        atomic_write(&path, b"short").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "short");
    }

    #[test]
    fn test_read_text_optional_trims_and_handles_blank() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session");

        assert_eq!(read_text_optional(&path).unwrap(), None);

        fs::write(&path, "  \n").unwrap();
        assert_eq!(read_text_optional(&path).unwrap(), None);

        fs::write(&path, "abc\n").unwrap();
        assert_eq!(read_text_optional(&path).unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_json_list_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("attachments.json");
        let paths = vec!["/tmp/a.png".to_string(), "/tmp/b.txt".to_string()];

        atomic_write_json(&path, &paths).unwrap();
        let loaded: Option<Vec<String>> = read_json_optional(&path).unwrap();

        assert_eq!(loaded, Some(paths));
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone");

        remove_if_exists(&path).unwrap();
        fs::write(&path, "x").unwrap();
        remove_if_exists(&path).unwrap();

        assert!(!path.exists());
    }
}
