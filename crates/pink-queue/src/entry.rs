//! Wire format of the two queues. One JSON object per line.

use serde::{Deserialize, Serialize};

/// A prompt waiting for the Claude daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    /// Id of the chat message that produced this command.
    pub message_id: i64,
    /// Prompt text (already decorated with reply context, attachments, etc.).
    pub content: String,
}

impl CommandEntry {
    pub fn new(message_id: i64, content: impl Into<String>) -> Self {
        Self {
            message_id,
            content: content.into(),
        }
    }
}

/// Output waiting to be delivered to chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEntry {
    /// Id of the chat message this answers.
    pub message_id: i64,
    /// Display text or error notice.
    pub output: String,
}

impl ResponseEntry {
    pub fn new(message_id: i64, output: impl Into<String>) -> Self {
        Self {
            message_id,
            output: output.into(),
        }
    }
}
