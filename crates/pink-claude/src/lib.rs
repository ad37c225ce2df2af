//! Claude side of Pink Agent.
//!
//! This crate consumes the commands queue and drives the Claude Code CLI:
//! - `CommandProcessor` - claims commands one at a time and hands each to a
//!   detached worker process
//! - `Worker` - runs one command against the current session and appends
//!   the result (and any compaction notices) to the responses queue
//! - `SessionManager` - owns the persisted session id and auto-compaction
//! - `parser` / `format` - turn the CLI's JSON events into chat text
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pink_claude::{ClaudeCli, FileSessionStore, Worker};
//! use pink_core::AgentSettings;
//! use pink_queue::QueueStore;
//!
//! let settings = AgentSettings::from_env();
//! let worker = Worker::new(
//!     Arc::new(ClaudeCli::new(&settings)),
//!     Arc::new(FileSessionStore::new(pink_core::session_file())),
//!     QueueStore::in_dir(pink_core::queue_dir()),
//!     settings,
//! );
//! worker.run(42, "hello").await?;
//! ```

pub mod backend;
pub mod compact;
pub mod error;
pub mod format;
pub mod parser;
pub mod processor;
pub mod session;
pub mod worker;

pub use backend::{Backend, BackendOutput, ClaudeCli, ExecOptions};
pub use error::{ClaudeError, Result};
pub use format::ToolKind;
pub use parser::{parse_output, ParsedOutput, Usage};
pub use processor::{CommandProcessor, ProcessLauncher, WorkerLauncher};
pub use session::{FileSessionStore, MemorySessionStore, SessionManager, SessionStore};
pub use worker::{ExecutionResult, Job, Worker};
