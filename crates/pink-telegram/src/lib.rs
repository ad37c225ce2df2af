//! Telegram side of Pink Agent.
//!
//! This crate connects a single authorized Telegram user to the queues:
//! - incoming text, voice and file messages become prompts on the commands
//!   queue (`handlers`, `prompt`, `attachments`, `transcriber`)
//! - `ResponseDispatcher` delivers the responses queue back to the chat,
//!   converted to MarkdownV2 and split to Telegram's size limit
//!
//! # Environment Variables
//!
//! Required:
//! - `TELEGRAM_BOT_TOKEN`: Bot token from @BotFather
//! - `TELEGRAM_USER_ID`: The only user the bot answers
//!
//! Optional:
//! - `PINK_TRANSCRIBER_BIN`: Voice transcriber (default: `pink-transcriber`)
//!
//! # Commands
//!
//! - `/start` - Check that the bot is up
//! - `/new` - Start a new Claude session
//! - `/compact` - Summarize the session and continue from the summary
//! - `/restart` - Ask the supervisor to update and restart both agents

pub mod attachments;
pub mod bot;
pub mod chunking;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod markdown;
pub mod notifier;
pub mod prompt;
pub mod transcriber;

pub use attachments::AttachmentStore;
pub use bot::PinkBot;
pub use chunking::{continuation_prefix, split_into_chunks};
pub use dispatcher::ResponseDispatcher;
pub use error::{Result, TelegramError};
pub use handlers::{Command, FileOutcome, HandlerState};
pub use markdown::to_markdown_v2;
pub use notifier::{Notifier, TelegramNotifier};
pub use prompt::{build_prompt, PromptSource, ReplyContext};
pub use transcriber::Transcriber;
