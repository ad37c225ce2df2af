//! Pink Agent supervisor.
//!
//! Keeps the Claude and Telegram daemons running together and provides the
//! `send` command for pushing messages to the chat from scripts.

pub mod cli;
pub mod error;
pub mod pidfile;
pub mod send;
pub mod supervisor;

pub use error::{Result, SupervisorError};
pub use pidfile::{process_alive, PidFile};
pub use supervisor::{DaemonSpec, Outcome, SignalFlags, Supervisor};

/// Daemon binaries started by `pink-agent run`, in start order.
pub const DAEMONS: [&str; 2] = ["pink-claude-agent", "pink-telegram-agent"];
