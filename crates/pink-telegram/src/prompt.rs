//! Building the prompt text queued for Claude.

use teloxide::types::Message;

use pink_core::messages::VOICE_PREFIX;

use crate::attachments::format_prefix;

/// What the incoming message replies to, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyContext {
    None,
    /// Quoted selection or the full text of the replied-to message.
    Text(String),
    /// Replied-to message had no text, only a caption.
    Caption(String),
    /// Replied-to message had neither text nor caption.
    Bare,
}

impl ReplyContext {
    /// Extracts the context from an incoming message. A quoted selection
    /// wins over the replied-to message's full text.
    pub fn from_message(msg: &Message) -> Self {
        let Some(replied) = msg.reply_to_message() else {
            return ReplyContext::None;
        };

        if let Some(quote) = msg.quote() {
            let text = quote.text.trim();
            if !text.is_empty() {
                return ReplyContext::Text(text.to_string());
            }
        }
        if let Some(text) = replied.text() {
            return ReplyContext::Text(text.trim().to_string());
        }
        if let Some(caption) = replied.caption() {
            return ReplyContext::Caption(caption.trim().to_string());
        }
        ReplyContext::Bare
    }

    /// Prompt prefix, ending in a blank line when not empty.
    pub fn prefix(&self) -> String {
        match self {
            ReplyContext::None => String::new(),
            ReplyContext::Text(text) => format!("[Reply: \"{text}\"]\n\n"),
            ReplyContext::Caption(caption) => {
                format!("[Reply to message with caption: \"{caption}\"]\n\n")
            }
            ReplyContext::Bare => "[Reply to previous message]\n\n".to_string(),
        }
    }
}

/// Where the user's words came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSource {
    Typed,
    Voice,
}

/// Assembles reply context, voice marker, pending attachments and text.
pub fn build_prompt(
    reply: &ReplyContext,
    source: PromptSource,
    attachments: &[String],
    text: &str,
) -> String {
    let mut prompt = reply.prefix();
    if source == PromptSource::Voice {
        prompt.push_str(VOICE_PREFIX);
        prompt.push_str("\n\n");
    }
    if !attachments.is_empty() {
        prompt.push_str(&format_prefix(attachments));
        prompt.push_str("\n\n");
    }
    prompt.push_str(text);
    prompt
}
