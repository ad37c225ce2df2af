//! Single-flight consumer of the commands queue.
//!
//! A claim reads the head entry and deletes it *before* anything runs, so a
//! crash mid-execution can never make the same command loop forever. The
//! claimed entry is then handed to a worker and awaited; only one claim and
//! one worker are ever active, because the backend session cannot be shared.

use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use pink_core::messages;
use pink_queue::{CommandEntry, QueueMonitor, QueueStore};

use crate::error::{ClaudeError, Result};

/// Runs one claimed command to completion.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn run(&self, entry: CommandEntry) -> Result<()>;

    /// Asks the in-flight worker, if any, to stop. Does not wait.
    fn terminate(&self);
}

/// Launches each command in a detached copy of the current executable.
///
/// The child gets its own process group, so signals aimed at the daemon (or
/// its terminal) don't reach it, and it keeps running if the daemon dies.
/// The command text goes through stdin; argv has size and NUL limits.
#[derive(Debug)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    current: StdMutex<Option<u32>>,
}

impl ProcessLauncher {
    /// Launcher running `<exe> worker`.
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self::with_args(exe, ["worker"])
    }

    /// Launcher running `program` with `args`; `--message-id <id>` is
    /// appended per command.
    pub fn with_args<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            current: StdMutex::new(None),
        }
    }

    /// Launcher re-running this binary's `worker` subcommand.
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    fn set_current(&self, pid: Option<u32>) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = pid;
        }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn run(&self, entry: CommandEntry) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--message-id")
            .arg(entry.message_id.to_string())
            .stdin(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|e| ClaudeError::Launch(format!("{}: {e}", self.program.display())))?;

        let pid = child.id();
        self.set_current(pid);
        debug!(message_id = entry.message_id, pid, "Worker started");

        if let Some(mut stdin) = child.stdin.take() {
            // Dropping stdin closes it, which ends the worker's read.
            if let Err(e) = stdin.write_all(entry.content.as_bytes()).await {
                let _ = child.kill().await;
                self.set_current(None);
                return Err(ClaudeError::Launch(format!("could not pass command: {e}")));
            }
        }

        let status = child.wait().await;
        self.set_current(None);

        let status = status?;
        if status.success() {
            Ok(())
        } else {
            Err(ClaudeError::Worker(format!("worker exited with {}", status)))
        }
    }

    fn terminate(&self) {
        let pid = self.current.lock().ok().and_then(|g| *g);
        if let Some(pid) = pid {
            info!(pid, "Terminating in-flight worker");
            // SAFETY: plain signal delivery to a pid we spawned.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }
}

/// Claims commands one at a time and hands them to a launcher.
pub struct CommandProcessor {
    queue: QueueStore,
    launcher: Arc<dyn WorkerLauncher>,
    flight: Mutex<()>,
}

impl CommandProcessor {
    pub fn new(queue: QueueStore, launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self {
            queue,
            launcher,
            flight: Mutex::new(()),
        }
    }

    /// Claims the head command and runs it. Returns `false` when the queue
    /// was empty.
    ///
    /// Concurrent callers queue up behind the one in flight.
    pub async fn process_next(&self) -> Result<bool> {
        let _flight = self.flight.lock().await;

        let Some(entry) = self.queue.read_first_command()? else {
            return Ok(false);
        };
        self.queue.delete_first_command()?;

        let message_id = entry.message_id;
        debug!(message_id, "Command claimed");
        match self.launcher.run(entry).await {
            Ok(()) => {}
            // The command is already claimed; without a worker nobody else
            // will answer it.
            Err(e @ ClaudeError::Launch(_)) => {
                error!(message_id, error = %e, "Worker did not start");
                let reply = messages::error_response(&e.to_string());
                if let Err(e) = self.queue.append_response(message_id, reply) {
                    error!(message_id, error = %e, "Could not report launch failure");
                }
            }
            Err(e) => error!(message_id, error = %e, "Worker failed"),
        }
        Ok(true)
    }

    /// Processes commands until the queue is empty. Returns how many ran.
    pub async fn drain(&self) -> Result<usize> {
        let mut count = 0;
        while self.process_next().await? {
            count += 1;
        }
        Ok(count)
    }

    pub fn terminate_in_flight(&self) {
        self.launcher.terminate();
    }

    /// Runs until `shutdown` resolves.
    ///
    /// The monitor is registered before the backlog is drained, so nothing
    /// appended during a long first command slips through.
    pub async fn run<S>(self: Arc<Self>, monitor: &mut QueueMonitor, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        info!("Command processor started");

        let processor = Arc::clone(&self);
        monitor.start(move || {
            let processor = Arc::clone(&processor);
            async move {
                if let Err(e) = processor.drain().await {
                    error!(error = %e, "Command processor error");
                }
            }
        })?;

        let backlog = tokio::spawn({
            let processor = Arc::clone(&self);
            async move {
                match processor.drain().await {
                    Ok(0) => {}
                    Ok(n) => info!(count = n, "Processed queued backlog"),
                    Err(e) => error!(error = %e, "Command processor error"),
                }
            }
        });

        shutdown.await;
        info!("Shutting down command processor");

        self.terminate_in_flight();
        monitor.shutdown();
        backlog.abort();
        monitor.cleanup_async().await;
        if monitor.is_running() {
            warn!("Queue monitor still running after cleanup");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    /// Records run order and the highest observed concurrency.
    #[derive(Default)]
    struct RecordingLauncher {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        runs: StdMutex<Vec<i64>>,
        delay: Duration,
    }

    #[async_trait]
    impl WorkerLauncher for RecordingLauncher {
        async fn run(&self, entry: CommandEntry) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.runs.lock().unwrap().push(entry.message_id);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        fn terminate(&self) {}
    }

    /// Fails as if the worker crashed right after the claim.
    struct CrashingLauncher {
        queue: QueueStore,
        seen_head: StdMutex<Vec<Option<i64>>>,
    }

    #[async_trait]
    impl WorkerLauncher for CrashingLauncher {
        async fn run(&self, _entry: CommandEntry) -> Result<()> {
            let head = self.queue.read_first_command()?.map(|e| e.message_id);
            self.seen_head.lock().unwrap().push(head);
            Err(ClaudeError::Worker("crashed".into()))
        }

        fn terminate(&self) {}
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let dir = tempdir().unwrap();
        let queue = QueueStore::in_dir(dir.path());
        let processor = CommandProcessor::new(queue, Arc::new(RecordingLauncher::default()));

        assert!(!processor.process_next().await.unwrap());
        assert_eq!(processor.drain().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drain_runs_in_fifo_order() {
        let dir = tempdir().unwrap();
        let queue = QueueStore::in_dir(dir.path());
        for id in 1..=4 {
            queue.append_command(id, format!("cmd {id}")).unwrap();
        }
        let launcher = Arc::new(RecordingLauncher::default());
        let processor = CommandProcessor::new(queue.clone(), launcher.clone());

        assert_eq!(processor.drain().await.unwrap(), 4);

        assert_eq!(*launcher.runs.lock().unwrap(), vec![1, 2, 3, 4]);
        assert!(queue.read_first_command().unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_wakeups_stay_single_flight() {
        let dir = tempdir().unwrap();
        let queue = QueueStore::in_dir(dir.path());
        for id in 0..6 {
            queue.append_command(id, "burst").unwrap();
        }
        let launcher = Arc::new(RecordingLauncher {
            delay: Duration::from_millis(30),
            ..Default::default()
        });
        let processor = Arc::new(CommandProcessor::new(queue.clone(), launcher.clone()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let p = Arc::clone(&processor);
            handles.push(tokio::spawn(async move { p.drain().await.unwrap() }));
        }
        let mut total = 0;
        for h in handles {
            total += h.await.unwrap();
        }

        assert_eq!(total, 6);
        assert_eq!(launcher.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*launcher.runs.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_claimed_command_is_gone_before_it_runs() {
        let dir = tempdir().unwrap();
        let queue = QueueStore::in_dir(dir.path());
        queue.append_command(1, "first").unwrap();
        queue.append_command(2, "second").unwrap();
        let launcher = Arc::new(CrashingLauncher {
            queue: queue.clone(),
            seen_head: StdMutex::new(Vec::new()),
        });
        let processor = CommandProcessor::new(queue.clone(), launcher.clone());

        // A crashing worker does not stop the processor or bring the entry back.
        assert!(processor.process_next().await.unwrap());
        assert_eq!(queue.read_first_command().unwrap().unwrap().message_id, 2);
        assert!(processor.process_next().await.unwrap());

        assert_eq!(*launcher.seen_head.lock().unwrap(), vec![Some(2), None]);
        assert!(queue.read_first_command().unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_drains_backlog_and_follows_appends() {
        let dir = tempdir().unwrap();
        let queue = QueueStore::in_dir(dir.path());
        queue.ensure_files().unwrap();
        queue.append_command(1, "queued while offline").unwrap();

        let launcher = Arc::new(RecordingLauncher::default());
        let processor = Arc::new(CommandProcessor::new(queue.clone(), launcher.clone()));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let runner = tokio::spawn({
            let processor = Arc::clone(&processor);
            let path = queue.commands().path().to_path_buf();
            async move {
                let mut monitor = QueueMonitor::new(path);
                processor
                    .run(&mut monitor, async {
                        let _ = stop_rx.await;
                    })
                    .await
            }
        });

        let wait_for = |n: usize| {
            let launcher = launcher.clone();
            async move {
                for _ in 0..100 {
                    if launcher.runs.lock().unwrap().len() >= n {
                        return true;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                false
            }
        };

        assert!(wait_for(1).await, "backlog not drained");
        queue.append_command(2, "live").unwrap();
        assert!(wait_for(2).await, "append not picked up");

        stop_tx.send(()).unwrap();
        runner.await.unwrap().unwrap();
        assert_eq!(*launcher.runs.lock().unwrap(), vec![1, 2]);
    }
}
