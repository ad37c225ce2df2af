//! Error types for the supervisor and CLI.

use std::path::PathBuf;

use thiserror::Error;

use pink_core::SettingsError;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Another supervisor holds the PID file.
    #[error("pink-agent is already running (PID {0})")]
    AlreadyRunning(i32),

    /// A daemon binary is neither next to this executable nor on PATH.
    #[error("{0} not found next to pink-agent or in PATH")]
    BinaryNotFound(String),

    #[error("failed to start {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("provide either text or files")]
    NothingToSend,

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
