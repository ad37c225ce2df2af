//! Error types for the Claude daemon.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while driving the Claude Code CLI.
#[derive(Debug, Error)]
pub enum ClaudeError {
    /// The CLI binary could not be started.
    #[error("Claude Code binary not found ({0}). Is it installed?")]
    NotInstalled(String),

    /// The CLI did not finish in time.
    #[error("Claude Code timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// The CLI exited non-zero.
    #[error("Claude Code failed: {0}")]
    BackendFailed(String),

    /// The CLI ran out of heap. Only a fresh session helps.
    #[error("{}", pink_core::messages::OUT_OF_MEMORY)]
    OutOfMemory,

    /// Session id could not be discovered on disk.
    #[error("session discovery failed: {0}")]
    SessionDiscovery(String),

    /// A new session could not be created.
    #[error("failed to initialize session: {0}")]
    SessionInit(String),

    /// Structured output was not an event array.
    #[error("unparseable output: {0}")]
    Parse(String),

    /// A compaction step hit its timeout.
    #[error("Auto-compact timeout (>{} seconds)", .0.as_secs())]
    CompactTimeout(Duration),

    /// One step of compaction failed.
    #[error("{stage} failed: {reason}")]
    Compact { stage: &'static str, reason: String },

    /// The worker process could not be started or handed its command.
    #[error("could not start worker: {0}")]
    Launch(String),

    /// Worker process management error.
    #[error("worker error: {0}")]
    Worker(String),

    /// Queue access failed.
    #[error("queue error: {0}")]
    Queue(#[from] pink_queue::QueueError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Claude daemon operations.
pub type Result<T> = std::result::Result<T, ClaudeError>;
