//! Files uploaded without a caption, waiting for the next prompt.

use std::path::{Path, PathBuf};

use tracing::warn;

use pink_queue::atomic;

use crate::error::Result;

/// JSON array of absolute paths, persisted across restarts.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    path: PathBuf,
}

impl AttachmentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pending paths. A missing, empty or unreadable file counts as none.
    pub fn load(&self) -> Vec<String> {
        match atomic::read_json_optional::<Vec<String>>(&self.path) {
            Ok(paths) => paths.unwrap_or_default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable attachments file");
                Vec::new()
            }
        }
    }

    /// Appends `paths` to the pending list.
    pub fn add(&self, paths: &[String]) -> Result<()> {
        let mut all = self.load();
        all.extend_from_slice(paths);
        atomic::atomic_write_json(&self.path, &all)?;
        Ok(())
    }

    /// Returns everything pending and clears the list.
    pub fn take(&self) -> Result<Vec<String>> {
        let paths = self.load();
        if !paths.is_empty() {
            self.clear()?;
        }
        Ok(paths)
    }

    pub fn clear(&self) -> Result<()> {
        atomic::remove_if_exists(&self.path)?;
        Ok(())
    }
}

/// `Files attached:` header followed by one `- path` line per file.
pub fn format_prefix(paths: &[String]) -> String {
    if paths.is_empty() {
        return String::new();
    }
    let mut lines = vec!["Files attached:".to_string()];
    lines.extend(paths.iter().map(|p| format!("- {p}")));
    lines.join("\n")
}
