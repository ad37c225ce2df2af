//! The Claude Code CLI, seen as an opaque text-in / events-out executable.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use pink_core::AgentSettings;

use crate::error::{ClaudeError, Result};
use crate::session;

/// How a single backend call is made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Session to continue. `None` starts a fresh one.
    pub resume: Option<String>,
    /// Ask for the JSON event array instead of plain text.
    pub structured_output: bool,
    /// Wall-clock limit. `None` waits as long as it takes.
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume = Some(session_id.into());
        self
    }

    pub fn structured(mut self) -> Self {
        self.structured_output = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// What the CLI left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOutput {
    /// Exit code; `-1` when killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl BackendOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs prompts and reports which session the last run created.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs one prompt to completion.
    async fn execute(&self, prompt: &str, opts: &ExecOptions) -> Result<BackendOutput>;

    /// Id of the most recently written session log.
    fn latest_session_id(&self) -> Result<String>;
}

/// The real `claude` executable, run from the home directory.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    bin: String,
    working_dir: PathBuf,
    projects_dir: PathBuf,
    env: Vec<(String, String)>,
}

impl ClaudeCli {
    pub fn new(settings: &AgentSettings) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            bin: settings.claude_bin.clone(),
            projects_dir: home.join(".claude").join("projects"),
            working_dir: home,
            env: settings.backend_env(),
        }
    }

    /// Overrides the directory session logs are discovered in.
    pub fn with_projects_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.projects_dir = dir.into();
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn command(&self, prompt: &str, opts: &ExecOptions) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-p").arg(prompt);
        if let Some(id) = &opts.resume {
            cmd.arg("--resume").arg(id);
        }
        cmd.arg("--dangerously-skip-permissions");
        if opts.structured_output {
            cmd.arg("--output-format=json");
        }
        cmd.current_dir(&self.working_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Backend for ClaudeCli {
    async fn execute(&self, prompt: &str, opts: &ExecOptions) -> Result<BackendOutput> {
        debug!(
            resume = opts.resume.as_deref().unwrap_or("-"),
            structured = opts.structured_output,
            "Running Claude Code"
        );

        let output = self.command(prompt, opts).output();
        let output = match opts.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| ClaudeError::Timeout(limit))?,
            None => output.await,
        };

        let output = output.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ClaudeError::NotInstalled(self.bin.clone()),
            _ => ClaudeError::Io(e),
        })?;

        Ok(BackendOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn latest_session_id(&self) -> Result<String> {
        session::extract_session_id(&self.projects_dir, &self.working_dir)
    }
}
