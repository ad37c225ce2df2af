//! Supervision of the two agent daemons.
//!
//! Both daemons run as children. If either exits, or the supervisor is asked
//! to stop, both are stopped. SIGUSR1 (sent by the Telegram `/restart`
//! command) stops both and reports [`Outcome::Restart`] so the caller can
//! update and re-exec.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
use tracing::{error, info, warn};

use crate::error::{Result, SupervisorError};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long a daemon gets to exit after SIGINT before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(30);

const GIT_PULL_TIMEOUT: Duration = Duration::from_secs(30);
const BUILD_TIMEOUT: Duration = Duration::from_secs(600);

pub const INSTALL_DIR_ENV: &str = "PINK_AGENT_INSTALL_DIR";

/// Flags flipped by signal handlers.
#[derive(Debug, Clone, Default)]
pub struct SignalFlags {
    pub stop: Arc<AtomicBool>,
    pub restart: Arc<AtomicBool>,
}

impl SignalFlags {
    /// Flags wired to SIGINT/SIGTERM (stop) and SIGUSR1 (restart).
    pub fn register() -> Result<Self> {
        let flags = Self::default();
        signal_hook::flag::register(SIGINT, Arc::clone(&flags.stop))?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&flags.stop))?;
        signal_hook::flag::register(SIGUSR1, Arc::clone(&flags.restart))?;
        Ok(flags)
    }
}

/// How to start one daemon.
#[derive(Debug, Clone)]
pub struct DaemonSpec {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl DaemonSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Spec for the binary `name`, found next to this executable or on PATH.
    pub fn locate(name: &str) -> Result<Self> {
        find_binary(name)
            .map(|program| Self::new(name, program))
            .ok_or_else(|| SupervisorError::BinaryNotFound(name.to_string()))
    }
}

/// Finds a sibling binary of the current executable, falling back to PATH.
pub fn find_binary(name: &str) -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let binary = dir.join(name);
            if binary.exists() {
                return Some(binary);
            }
        }
    }
    which::which(name).ok()
}

/// Why the supervisor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// SIGINT or SIGTERM.
    Stopped,
    /// A daemon exited on its own.
    DaemonDied { name: String, code: Option<i32> },
    /// SIGUSR1.
    Restart,
}

struct Daemon {
    name: String,
    child: Child,
}

impl Daemon {
    fn spawn(spec: &DaemonSpec) -> Result<Self> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                name: spec.name.clone(),
                source,
            })?;
        info!(daemon = %spec.name, pid = child.id(), "Started");
        Ok(Self {
            name: spec.name.clone(),
            child,
        })
    }

    /// Exit code if the daemon has exited.
    fn exited(&mut self) -> Option<Option<i32>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code()),
            Ok(None) => None,
            Err(e) => {
                warn!(daemon = %self.name, error = %e, "Could not poll daemon");
                None
            }
        }
    }

    /// SIGINT, then SIGKILL if it outlives `grace`.
    fn stop(&mut self, grace: Duration) {
        if self.exited().is_some() {
            return;
        }
        info!(daemon = %self.name, "Stopping");
        // SAFETY: plain signal delivery to our own child.
        unsafe {
            libc::kill(self.child.id() as libc::pid_t, libc::SIGINT);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.exited().is_some() {
                info!(daemon = %self.name, "Stopped");
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        warn!(daemon = %self.name, "Did not stop in time, killing");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct Supervisor {
    specs: Vec<DaemonSpec>,
    flags: SignalFlags,
    poll_interval: Duration,
    stop_grace: Duration,
}

impl Supervisor {
    pub fn new(specs: Vec<DaemonSpec>, flags: SignalFlags) -> Self {
        Self {
            specs,
            flags,
            poll_interval: POLL_INTERVAL,
            stop_grace: STOP_GRACE,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Starts every daemon and blocks until one dies or a signal arrives.
    /// All daemons are stopped before this returns.
    pub fn run(&self) -> Result<Outcome> {
        let mut running = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            match Daemon::spawn(spec) {
                Ok(daemon) => running.push(daemon),
                Err(e) => {
                    self.stop_all(&mut running);
                    return Err(e);
                }
            }
        }

        let outcome = loop {
            if self.flags.restart.swap(false, Ordering::SeqCst) {
                info!("Restart requested");
                break Outcome::Restart;
            }
            if self.flags.stop.load(Ordering::SeqCst) {
                info!("Shutting down");
                break Outcome::Stopped;
            }
            if let Some(outcome) = running.iter_mut().find_map(|d| {
                d.exited().map(|code| Outcome::DaemonDied {
                    name: d.name.clone(),
                    code,
                })
            }) {
                error!(?outcome, "Daemon died");
                break outcome;
            }
            std::thread::sleep(self.poll_interval);
        };

        self.stop_all(&mut running);
        info!("All processes stopped");
        Ok(outcome)
    }

    /// Stops daemons in reverse start order.
    fn stop_all(&self, running: &mut [Daemon]) {
        for daemon in running.iter_mut().rev() {
            daemon.stop(self.stop_grace);
        }
    }
}

/// Directory holding the checkout this binary was built from.
///
/// `PINK_AGENT_INSTALL_DIR` wins; otherwise the nearest ancestor of the
/// executable that has a `Cargo.toml`.
pub fn install_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(INSTALL_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    let exe = std::env::current_exe().ok()?;
    exe.ancestors()
        .skip(1)
        .take(4)
        .find(|dir| dir.join("Cargo.toml").exists())
        .map(Path::to_path_buf)
}

/// Runs a command in `dir`, killing it after `timeout`. Returns whether it
/// succeeded.
pub fn run_step(program: &str, args: &[&str], dir: &Path, timeout: Duration) -> bool {
    let mut child = match Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            error!(program, error = %e, "Could not start");
            return false;
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return status.success(),
            Ok(None) if Instant::now() >= deadline => {
                warn!(program, timeout_secs = timeout.as_secs(), "Timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                return false;
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(200)),
            Err(e) => {
                error!(program, error = %e, "Could not wait");
                return false;
            }
        }
    }
}

/// Pulls the latest code and rebuilds. Failures are logged; the restart
/// goes ahead with whatever binaries exist.
pub fn update(dir: &Path) {
    info!(dir = %dir.display(), "Updating code (git pull)");
    if run_step("git", &["pull"], dir, GIT_PULL_TIMEOUT) {
        info!("Git pull done");
    } else {
        warn!("Git pull failed");
    }

    info!("Rebuilding (cargo build --release)");
    if run_step("cargo", &["build", "--release"], dir, BUILD_TIMEOUT) {
        info!("Build done");
    } else {
        warn!("Build failed");
    }
}

/// Replaces the current process with a fresh copy of itself. Only returns
/// on failure.
pub fn restart_self() -> std::io::Error {
    use std::os::unix::process::CommandExt;

    let args: Vec<String> = std::env::args().collect();
    let Some((program, rest)) = args.split_first() else {
        return std::io::Error::other("no program name in argv");
    };
    Command::new(program).args(rest).exec()
}
