//! Session lifecycle: the one persisted "current session" id.
//!
//! The id lives behind [`SessionStore`] so tests can keep it in memory. A new
//! session is created by running a bootstrap prompt without `--resume` and then
//! reading back the id the CLI assigned from its own session logs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use pink_core::AgentSettings;
use pink_queue::atomic;

use crate::backend::{Backend, ExecOptions};
use crate::error::{ClaudeError, Result};

/// Prompt that opens every fresh session.
pub const BOOTSTRAP_PROMPT: &str =
    "Hello, you are a new Pink Agent session. Read the configuration:\n\n~/.claude/CLAUDE.md";

/// Persisted scalar holding the current session id.
pub trait SessionStore: Send + Sync {
    fn read(&self) -> Result<Option<String>>;
    fn write(&self, session_id: &str) -> Result<()>;
    /// Forgets the id. Returns whether one was stored.
    fn reset(&self) -> Result<bool>;
}

/// Session id kept in a single text file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn read(&self) -> Result<Option<String>> {
        Ok(atomic::read_text_optional(&self.path)?)
    }

    fn write(&self, session_id: &str) -> Result<()> {
        atomic::atomic_write(&self.path, session_id.as_bytes())?;
        Ok(())
    }

    fn reset(&self) -> Result<bool> {
        let existed = self.path.exists();
        atomic::remove_if_exists(&self.path)?;
        Ok(existed)
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    id: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            id: Mutex::new(Some(session_id.into())),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.id.lock().map(|g| g.clone()).unwrap_or_default())
    }

    fn write(&self, session_id: &str) -> Result<()> {
        if let Ok(mut guard) = self.id.lock() {
            *guard = Some(session_id.to_string());
        }
        Ok(())
    }

    fn reset(&self) -> Result<bool> {
        Ok(self.id.lock().map(|mut g| g.take().is_some()).unwrap_or(false))
    }
}

/// Owns the current session and the backend that serves it.
#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    store: Arc<dyn SessionStore>,
    settings: AgentSettings,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<dyn SessionStore>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            backend,
            store,
            settings,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn read_session_id(&self) -> Result<Option<String>> {
        self.store.read()
    }

    pub fn write_session_id(&self, session_id: &str) -> Result<()> {
        self.store.write(session_id)?;
        debug!(session_id, "Session id saved");
        Ok(())
    }

    /// Forgets the current session. The backend's own logs are left alone.
    pub fn reset_session(&self) -> Result<()> {
        if self.store.reset()? {
            debug!("Session reset, next command creates a new one");
        } else {
            warn!("No session to reset");
        }
        Ok(())
    }

    /// Starts a new backend session and persists its id.
    pub async fn initialize_session(&self) -> Result<String> {
        info!("Initializing new Claude Code session");

        let opts = ExecOptions::new().with_timeout(self.settings.main_timeout);
        let output = self.backend.execute(BOOTSTRAP_PROMPT, &opts).await?;
        if !output.success() {
            return Err(ClaudeError::SessionInit(output.stderr.trim().to_string()));
        }

        let session_id = self.backend.latest_session_id()?;
        self.write_session_id(&session_id)?;
        info!(session_id = %session_id, "New session initialized");
        Ok(session_id)
    }

    /// Returns the current session, creating one if there is none.
    pub async fn ensure_session(&self) -> Result<String> {
        match self.read_session_id()? {
            Some(id) => Ok(id),
            None => self.initialize_session().await,
        }
    }
}

/// Finds the id of the newest session log the CLI wrote for `home`.
///
/// The CLI keeps one directory per project under `projects_dir`. The home
/// directory's one is looked up by its derived names, falling back to the most
/// recently modified directory. The newest `*.jsonl` inside names the session.
pub fn extract_session_id(projects_dir: &Path, home: &Path) -> Result<String> {
    if !projects_dir.is_dir() {
        return Err(ClaudeError::SessionDiscovery(format!(
            "Claude projects directory not found: {}",
            projects_dir.display()
        )));
    }

    let session_dir = find_session_dir(projects_dir, home)?;
    let latest = newest_entry(&session_dir, |p| {
        p.is_file() && p.extension().is_some_and(|e| e == "jsonl")
    })?
    .ok_or_else(|| {
        ClaudeError::SessionDiscovery(format!(
            "no session files found in {}",
            session_dir.display()
        ))
    })?;

    let session_id = latest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| ClaudeError::SessionDiscovery("session file has no name".into()))?;

    debug!(session_id = %session_id, dir = %session_dir.display(), "Extracted session id");
    Ok(session_id)
}

fn candidate_names(home: &Path) -> Vec<String> {
    let home_str = home.to_string_lossy();
    let mut names = Vec::new();

    let underscored = home_str.replace('/', "_");
    if let Some(stripped) = underscored.get(1..) {
        names.push(stripped.to_string());
    }
    if let Some(base) = home.file_name() {
        names.push(base.to_string_lossy().into_owned());
    }
    names.push("home".to_string());
    names.push(home_str.replace('/', "-"));
    names.retain(|n| !n.is_empty());
    names
}

fn find_session_dir(projects_dir: &Path, home: &Path) -> Result<PathBuf> {
    for name in candidate_names(home) {
        let candidate = projects_dir.join(&name);
        if candidate.is_dir() {
            return Ok(candidate);
        }
    }

    newest_entry(projects_dir, |p| p.is_dir())?.ok_or_else(|| {
        ClaudeError::SessionDiscovery(format!(
            "no session directories found in {}",
            projects_dir.display()
        ))
    })
}

fn newest_entry(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !keep(&path) {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, p)| p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn touch_with_age(path: &Path, age_secs: u64) {
        fs::write(path, "{}").unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(when).unwrap();
    }

    #[test]
    fn test_file_store_lifecycle() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("state/session"));

        assert_eq!(store.read().unwrap(), None);
        store.write("abc-123").unwrap();
        assert_eq!(store.read().unwrap().as_deref(), Some("abc-123"));
        assert!(store.reset().unwrap());
        assert_eq!(store.read().unwrap(), None);
        assert!(!store.reset().unwrap());
    }

    #[test]
    fn test_memory_store_lifecycle() {
        let store = MemorySessionStore::with_session("x");
        assert_eq!(store.read().unwrap().as_deref(), Some("x"));
        assert!(store.reset().unwrap());
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn test_candidate_names() {
        let names = candidate_names(Path::new("/home/alice"));
        assert_eq!(names, vec!["home_alice", "alice", "home", "-home-alice"]);
    }

    #[test]
    fn test_extract_prefers_named_dir_and_newest_log() {
        let projects = tempdir().unwrap();
        let named = projects.path().join("-home-alice");
        let other = projects.path().join("zzz");
        fs::create_dir_all(&named).unwrap();
        fs::create_dir_all(&other).unwrap();
        touch_with_age(&named.join("old-session.jsonl"), 100);
        touch_with_age(&named.join("new-session.jsonl"), 1);
        touch_with_age(&named.join("notes.txt"), 0);
        touch_with_age(&other.join("elsewhere.jsonl"), 0);

        let id = extract_session_id(projects.path(), Path::new("/home/alice")).unwrap();
        assert_eq!(id, "new-session");
    }

    #[test]
    fn test_extract_falls_back_to_newest_dir() {
        let projects = tempdir().unwrap();
        let dir = projects.path().join("some-project");
        fs::create_dir_all(&dir).unwrap();
        touch_with_age(&dir.join("s1.jsonl"), 0);

        let id = extract_session_id(projects.path(), Path::new("/nowhere/bob")).unwrap();
        assert_eq!(id, "s1");
    }

    #[test]
    fn test_extract_fails_loudly() {
        let root = tempdir().unwrap();
        let missing = root.path().join("projects");
        assert!(matches!(
            extract_session_id(&missing, Path::new("/home/a")),
            Err(ClaudeError::SessionDiscovery(_))
        ));

        fs::create_dir_all(&missing).unwrap();
        assert!(matches!(
            extract_session_id(&missing, Path::new("/home/a")),
            Err(ClaudeError::SessionDiscovery(_))
        ));

        fs::create_dir_all(missing.join("home_a")).unwrap();
        assert!(matches!(
            extract_session_id(&missing, Path::new("/home/a")),
            Err(ClaudeError::SessionDiscovery(_))
        ));
    }
}
