//! Wakes a consumer when its queue file changes.
//!
//! The monitor watches the *directory* holding the queue file and filters
//! events down to the file itself: some platforms miss creation or
//! truncation when a single file is watched. Events that arrive together are
//! folded into one callback invocation, and callbacks never overlap.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{QueueError, Result};

/// How long `cleanup_async` waits for the watch loop to exit.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(1);

/// Watches one queue file and runs a callback on every change batch.
#[derive(Debug)]
pub struct QueueMonitor {
    target: PathBuf,
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl QueueMonitor {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            stop_tx: None,
            handle: None,
        }
    }

    /// File being watched.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Whether the watch loop is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Starts the watch loop. A second call while running is a no-op.
    ///
    /// The watcher is registered before this returns, so any write that
    /// happens afterwards is guaranteed to trigger `on_change`.
    pub fn start<F, Fut>(&mut self, on_change: F) -> Result<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            debug!(path = %self.target.display(), "Monitor already running");
            return Ok(());
        }

        let dir = match self.target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|source| QueueError::DirectoryError {
            path: dir.clone(),
            source,
        })?;

        let targets = match_targets(&self.target, &dir);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })
        .map_err(|e| QueueError::WatchError {
            path: dir.clone(),
            message: e.to_string(),
        })?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| QueueError::WatchError {
                path: dir.clone(),
                message: e.to_string(),
            })?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(watch_loop(watcher, event_rx, stop_rx, targets, on_change));

        info!(path = %self.target.display(), "Queue monitor started");
        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Asks the loop to stop. Safe before `start` and when called repeatedly.
    ///
    /// An in-flight callback is allowed to finish; the loop exits right after.
    pub fn shutdown(&self) {
        if let Some(tx) = &self.stop_tx {
            let _ = tx.send(true);
        }
    }

    /// Stops the loop without waiting for in-flight work.
    pub fn cleanup(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.stop_tx = None;
    }

    /// Stops the loop and waits up to [`CLEANUP_TIMEOUT`] for it to exit.
    pub async fn cleanup_async(&mut self) {
        self.shutdown();
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(CLEANUP_TIMEOUT, &mut handle).await.is_err() {
                warn!(path = %self.target.display(), "Monitor did not stop in time, aborting");
                handle.abort();
            }
        }
        self.stop_tx = None;
    }
}

impl Drop for QueueMonitor {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Paths an event may use to name the target: as given, and canonicalized
/// through the directory (the watcher reports resolved paths on some systems).
fn match_targets(target: &Path, dir: &Path) -> Vec<PathBuf> {
    let mut targets = vec![target.to_path_buf()];
    if let (Ok(canonical_dir), Some(name)) = (dir.canonicalize(), target.file_name()) {
        let canonical = canonical_dir.join(name);
        if !targets.contains(&canonical) {
            targets.push(canonical);
        }
    }
    targets
}

/// Kinds that can mean "the file content changed". Plain reads and opens
/// are ignored so consumers reading the queue don't wake themselves.
fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any
            | EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Remove(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

fn touches_target(res: &notify::Result<Event>, targets: &[PathBuf]) -> bool {
    match res {
        Ok(event) => {
            is_change(&event.kind) && event.paths.iter().any(|p| targets.contains(p))
        }
        Err(e) => {
            warn!(error = %e, "Watcher error");
            false
        }
    }
}

async fn watch_loop<F, Fut>(
    _watcher: RecommendedWatcher,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    mut stop_rx: watch::Receiver<bool>,
    targets: Vec<PathBuf>,
    mut on_change: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        if *stop_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            incoming = events.recv() => {
                let Some(first) = incoming else { break };
                let mut hit = touches_target(&first, &targets);
                while let Ok(more) = events.try_recv() {
                    hit |= touches_target(&more, &targets);
                }
                if hit {
                    on_change().await;
                }
            }
        }
    }

    debug!("Queue monitor loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    use crate::store::QueueStore;

    fn counting_callback(
        counter: Arc<AtomicUsize>,
        tx: mpsc::UnboundedSender<()>,
    ) -> impl FnMut() -> std::future::Ready<()> + Send + 'static {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
            std::future::ready(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_append_triggers_callback() {
        let dir = tempdir().unwrap();
        let store = QueueStore::in_dir(dir.path());
        store.ensure_files().unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut monitor = QueueMonitor::new(store.commands().path());
        monitor
            .start(counting_callback(counter.clone(), tx))
            .unwrap();

        store.append_command(1, "hello").unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("callback not invoked")
            .unwrap();
        assert!(counter.load(Ordering::SeqCst) >= 1);

        monitor.cleanup_async().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sibling_file_is_ignored() {
        let dir = tempdir().unwrap();
        let store = QueueStore::in_dir(dir.path());
        store.ensure_files().unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut monitor = QueueMonitor::new(store.commands().path());
        monitor
            .start(counting_callback(counter.clone(), tx))
            .unwrap();

        store.append_response(1, "not ours").unwrap();
        fs::write(dir.path().join("other.txt"), "noise").unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        monitor.cleanup();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_created_after_start_is_seen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue").join("commands.jsonl");

        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut monitor = QueueMonitor::new(&path);
        monitor
            .start(counting_callback(counter.clone(), tx))
            .unwrap();

        fs::write(&path, "{\"message_id\":1,\"content\":\"x\"}\n").unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("callback not invoked")
            .unwrap();
        monitor.cleanup_async().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut monitor = QueueMonitor::new(dir.path().join("commands.jsonl"));

        monitor.shutdown();
        monitor.cleanup();
        monitor.cleanup_async().await;

        let (tx, _rx) = mpsc::unbounded_channel();
        monitor
            .start(counting_callback(Arc::new(AtomicUsize::new(0)), tx))
            .unwrap();
        monitor.shutdown();
        monitor.shutdown();
        monitor.cleanup_async().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_second_start_is_noop() {
        let dir = tempdir().unwrap();
        let mut monitor = QueueMonitor::new(dir.path().join("commands.jsonl"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let counter = Arc::new(AtomicUsize::new(0));

        monitor
            .start(counting_callback(counter.clone(), tx.clone()))
            .unwrap();
        monitor.start(counting_callback(counter, tx)).unwrap();

        assert!(monitor.is_running());
        monitor.cleanup_async().await;
    }

    #[test]
    fn test_change_kinds() {
        use notify::event::{CreateKind, ModifyKind};

        assert!(is_change(&EventKind::Create(CreateKind::File)));
        assert!(is_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_change(&EventKind::Access(AccessKind::Close(
            AccessMode::Write
        ))));
        assert!(!is_change(&EventKind::Access(AccessKind::Open(
            AccessMode::Any
        ))));
        assert!(!is_change(&EventKind::Access(AccessKind::Close(
            AccessMode::Read
        ))));
    }
}
