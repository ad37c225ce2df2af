//! Durable handoff between the Pink Agent daemons.
//!
//! Two JSONL files carry all traffic: `commands.jsonl` (chat → Claude) and
//! `responses.jsonl` (Claude → chat). Each operation takes a whole-file
//! advisory lock, so independent processes can append and consume safely.
//!
//! # Example
//!
//! ```no_run
//! use pink_queue::QueueStore;
//!
//! let store = QueueStore::in_dir("/home/user/.pink-agent/queue");
//! store.append_command(42, "hello").unwrap();
//!
//! if let Some(cmd) = store.read_first_command().unwrap() {
//!     store.delete_first_command().unwrap();
//!     println!("claimed {}", cmd.message_id);
//! }
//! ```

pub mod atomic;
pub mod entry;
pub mod error;
pub mod monitor;
pub mod store;

pub use entry::{CommandEntry, ResponseEntry};
pub use error::{QueueError, Result};
pub use monitor::QueueMonitor;
pub use store::{JsonlQueue, QueueStore};
