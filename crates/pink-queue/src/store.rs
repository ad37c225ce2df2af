//! JSONL queues guarded by whole-file advisory locks.
//!
//! Every operation opens the file, takes a lock (shared for reads, exclusive
//! for appends and deletes), does its work and releases the lock before
//! returning. A lock never spans two opens, so independent processes can
//! share a queue without any other coordination.
//!
//! Ordering is strict FIFO: appends go to the end, deletes remove the head.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::entry::{CommandEntry, ResponseEntry};
use crate::error::{QueueError, Result};

/// Releases the advisory lock when dropped.
struct LockGuard<'a> {
    file: &'a File,
}

impl<'a> LockGuard<'a> {
    fn shared(file: &'a File, path: &Path) -> Result<Self> {
        file.lock_shared().map_err(|source| QueueError::LockError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { file })
    }

    fn exclusive(file: &'a File, path: &Path) -> Result<Self> {
        file.lock_exclusive().map_err(|source| QueueError::LockError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { file })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// A single append-only queue file of `T` entries.
#[derive(Debug, Clone)]
pub struct JsonlQueue<T> {
    path: PathBuf,
    _entry: PhantomData<fn() -> T>,
}

impl<T> JsonlQueue<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a handle for the queue at `path`. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _entry: PhantomData,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the file (and its directory) if missing.
    pub fn ensure_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| QueueError::DirectoryError {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| QueueError::OpenError {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }

    /// Appends one entry as a JSON line under an exclusive lock.
    ///
    /// The line is written and flushed before the lock is released, so the
    /// next shared-lock reader always sees it whole.
    pub fn append(&self, entry: &T) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        self.ensure_file()?;
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| QueueError::OpenError {
                path: self.path.clone(),
                source,
            })?;

        let _lock = LockGuard::exclusive(&file, &self.path)?;
        let mut file = &file;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| QueueError::WriteError {
                path: self.path.clone(),
                source,
            })?;

        trace!(path = %self.path.display(), "Entry appended");
        Ok(())
    }

    /// Returns the head entry without removing it, or `None` when empty.
    ///
    /// Blank lines are skipped; a malformed line is an error.
    pub fn read_first(&self) -> Result<Option<T>> {
        let Some(file) = self.open_existing(false)? else {
            return Ok(None);
        };

        let _lock = LockGuard::shared(&file, &self.path)?;
        let reader = BufReader::new(&file);
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| QueueError::ReadError {
                path: self.path.clone(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return self.parse_line(line, idx + 1).map(Some);
        }
        Ok(None)
    }

    /// Returns every entry in queue order.
    pub fn read_all(&self) -> Result<Vec<T>> {
        let Some(file) = self.open_existing(false)? else {
            return Ok(Vec::new());
        };

        let _lock = LockGuard::shared(&file, &self.path)?;
        let reader = BufReader::new(&file);
        let mut entries = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| QueueError::ReadError {
                path: self.path.clone(),
                source,
            })?;
            let line = line.trim();
            if !line.is_empty() {
                entries.push(self.parse_line(line, idx + 1)?);
            }
        }
        Ok(entries)
    }

    /// Removes the head entry, rewriting the rest of the file in order.
    ///
    /// A missing or empty file is a no-op.
    pub fn delete_first(&self) -> Result<()> {
        let Some(file) = self.open_existing(true)? else {
            return Ok(());
        };

        let _lock = LockGuard::exclusive(&file, &self.path)?;
        // The guard borrows the file; I/O goes through `&File`.
        let mut file = &file;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|source| QueueError::ReadError {
                path: self.path.clone(),
                source,
            })?;

        let mut remaining = content.lines().filter(|l| !l.trim().is_empty());
        if remaining.next().is_none() {
            return Ok(());
        }

        let mut rest = String::with_capacity(content.len());
        for line in remaining {
            rest.push_str(line.trim());
            rest.push('\n');
        }

        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.set_len(0))
            .and_then(|_| file.write_all(rest.as_bytes()))
            .and_then(|_| file.flush())
            .map_err(|source| QueueError::WriteError {
                path: self.path.clone(),
                source,
            })?;

        trace!(path = %self.path.display(), "Head entry deleted");
        Ok(())
    }

    /// Drops every entry.
    pub fn clear(&self) -> Result<()> {
        let Some(file) = self.open_existing(true)? else {
            return Ok(());
        };

        let _lock = LockGuard::exclusive(&file, &self.path)?;
        file.set_len(0).map_err(|source| QueueError::WriteError {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), "Queue cleared");
        Ok(())
    }

    fn open_existing(&self, write: bool) -> Result<Option<File>> {
        match OpenOptions::new().read(true).write(write).open(&self.path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(QueueError::OpenError {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn parse_line(&self, line: &str, line_no: usize) -> Result<T> {
        serde_json::from_str(line).map_err(|source| QueueError::CorruptEntry {
            path: self.path.clone(),
            line: line_no,
            source,
        })
    }
}

/// The two queues the daemons share.
#[derive(Debug, Clone)]
pub struct QueueStore {
    commands: JsonlQueue<CommandEntry>,
    responses: JsonlQueue<ResponseEntry>,
}

impl QueueStore {
    /// Creates a store with explicit file paths.
    pub fn new(commands_path: impl Into<PathBuf>, responses_path: impl Into<PathBuf>) -> Self {
        Self {
            commands: JsonlQueue::new(commands_path),
            responses: JsonlQueue::new(responses_path),
        }
    }

    /// Creates a store with `commands.jsonl` and `responses.jsonl` under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("commands.jsonl"), dir.join("responses.jsonl"))
    }

    /// Creates both files if they don't exist.
    pub fn ensure_files(&self) -> Result<()> {
        self.commands.ensure_file()?;
        self.responses.ensure_file()
    }

    pub fn commands(&self) -> &JsonlQueue<CommandEntry> {
        &self.commands
    }

    pub fn responses(&self) -> &JsonlQueue<ResponseEntry> {
        &self.responses
    }

    pub fn append_command(&self, message_id: i64, content: impl Into<String>) -> Result<()> {
        self.commands.append(&CommandEntry::new(message_id, content))
    }

    pub fn read_first_command(&self) -> Result<Option<CommandEntry>> {
        self.commands.read_first()
    }

    pub fn delete_first_command(&self) -> Result<()> {
        self.commands.delete_first()
    }

    /// Drops stale commands (called by the chat daemon on startup).
    pub fn clear_commands(&self) -> Result<()> {
        self.commands.clear()
    }

    pub fn append_response(&self, message_id: i64, output: impl Into<String>) -> Result<()> {
        self.responses.append(&ResponseEntry::new(message_id, output))
    }

    pub fn read_first_response(&self) -> Result<Option<ResponseEntry>> {
        self.responses.read_first()
    }

    pub fn delete_first_response(&self) -> Result<()> {
        self.responses.delete_first()
    }
}
