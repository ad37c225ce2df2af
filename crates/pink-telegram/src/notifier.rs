//! Outgoing side of the chat transport.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, ReactionType, ReplyParameters};

use crate::error::Result;

/// Sends messages and reactions to the configured user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `text`, as MarkdownV2 when `markdown` is set, optionally as a
    /// reply to `reply_to`.
    async fn send_text(&self, text: &str, reply_to: Option<i64>, markdown: bool) -> Result<()>;

    /// Replaces the bot's reaction on `message_id` with `emoji`.
    async fn set_reaction(&self, message_id: i64, emoji: &str) -> Result<()>;
}

/// `Notifier` backed by the Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, text: &str, reply_to: Option<i64>, markdown: bool) -> Result<()> {
        let mut req = self.bot.send_message(self.chat_id, text);
        if markdown {
            req = req.parse_mode(ParseMode::MarkdownV2);
        }
        if let Some(id) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(id as i32)));
        }
        req.await?;
        Ok(())
    }

    async fn set_reaction(&self, message_id: i64, emoji: &str) -> Result<()> {
        self.bot
            .set_message_reaction(self.chat_id, MessageId(message_id as i32))
            .reaction(vec![ReactionType::Emoji {
                emoji: emoji.to_string(),
            }])
            .await?;
        Ok(())
    }
}
