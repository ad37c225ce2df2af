//! Telegram agent: long-polls updates into the commands queue and delivers
//! the responses queue back to the chat.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use pink_core::{messages, AgentSettings, TelegramSettings};
use pink_queue::{QueueMonitor, QueueStore};

use crate::attachments::AttachmentStore;
use crate::dispatcher::ResponseDispatcher;
use crate::error::Result;
use crate::handlers::{handle_command, handle_files, handle_text, handle_voice, has_files, Command, HandlerState};
use crate::notifier::TelegramNotifier;
use crate::transcriber::Transcriber;

/// Attempts for the command menu and the greeting.
const SETUP_ATTEMPTS: usize = 3;

/// Fallback when the bot's own name can't be fetched.
const DEFAULT_BOT_NAME: &str = "Bot";

/// The Telegram side of Pink Agent.
pub struct PinkBot {
    bot: Bot,
    user_id: i64,
    queue: QueueStore,
    attachments: AttachmentStore,
    transcriber: Transcriber,
    max_message_length: usize,
}

impl PinkBot {
    pub fn new(telegram: &TelegramSettings, settings: &AgentSettings, queue: QueueStore) -> Self {
        Self {
            bot: Bot::new(&telegram.bot_token),
            user_id: telegram.user_id,
            queue,
            attachments: AttachmentStore::new(pink_core::attachments_file()),
            transcriber: Transcriber::new(&settings.transcriber_bin),
            max_message_length: settings.max_message_length,
        }
    }

    pub fn with_attachments(mut self, attachments: AttachmentStore) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn transcriber(&self) -> &Transcriber {
        &self.transcriber
    }

    /// Runs until `shutdown` resolves.
    pub async fn run<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let chat_id = ChatId(self.user_id);

        // Prompts left over from a previous run are stale; unsent answers are not.
        self.queue.ensure_files()?;
        self.queue.clear_commands()?;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let notifier = Arc::new(TelegramNotifier::new(self.bot.clone(), chat_id));
        let dispatcher = Arc::new(ResponseDispatcher::new(
            self.queue.clone(),
            notifier,
            self.max_message_length,
        ));
        let responses_path = self.queue.responses().path().to_path_buf();
        let sender = tokio::spawn(async move {
            let mut monitor = QueueMonitor::new(responses_path);
            let result = dispatcher
                .run(&mut monitor, async {
                    let _ = stop_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Response sender failed");
            }
        });

        let bot_name = match self.bot.get_me().await {
            Ok(me) => me.user.first_name.clone(),
            Err(e) => {
                warn!(error = %e, "Could not fetch bot name");
                DEFAULT_BOT_NAME.to_string()
            }
        };
        info!(bot = %bot_name, "Agent ready");

        self.register_commands(&bot_name).await;
        self.greet(chat_id, &bot_name).await;

        let state = Arc::new(
            HandlerState::new(
                self.user_id,
                self.queue.clone(),
                self.attachments.clone(),
                self.transcriber.clone(),
            )
            .with_bot_name(bot_name)
            .with_max_message_length(self.max_message_length),
        );

        let handler = dptree::entry()
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(handle_command),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| msg.voice().is_some())
                    .endpoint(handle_voice),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| has_files(&msg))
                    .endpoint(handle_files),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| msg.text().is_some_and(|t| !t.starts_with('/')))
                    .endpoint(handle_text),
            );

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![state])
            .default_handler(|upd| async move {
                tracing::debug!(update = ?upd.id, "Unhandled update");
            })
            .build();

        let token = dispatcher.shutdown_token();
        tokio::spawn(async move {
            shutdown.await;
            // The token refuses while the dispatcher is still starting up.
            loop {
                match token.shutdown() {
                    Ok(done) => {
                        done.await;
                        break;
                    }
                    Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
                }
            }
        });

        dispatcher.dispatch().await;

        info!("Stopping response sender");
        let _ = stop_tx.send(());
        if let Err(e) = sender.await {
            warn!(error = %e, "Response sender task ended abnormally");
        }
        Ok(())
    }

    async fn register_commands(&self, bot_name: &str) {
        let commands = vec![
            BotCommand::new("new", "New session"),
            BotCommand::new("compact", "Continue with summary"),
            BotCommand::new("restart", format!("Restart {bot_name}")),
        ];
        for attempt in 1..=SETUP_ATTEMPTS {
            match self.bot.set_my_commands(commands.clone()).await {
                Ok(_) => return,
                Err(e) if attempt == SETUP_ATTEMPTS => {
                    error!(error = %e, "Could not register commands");
                }
                Err(e) => warn!(attempt, error = %e, "Registering commands failed, retrying"),
            }
        }
    }

    async fn greet(&self, chat_id: ChatId, bot_name: &str) {
        let text = messages::bot_started(bot_name);
        for attempt in 1..=SETUP_ATTEMPTS {
            match self.bot.send_message(chat_id, &text).await {
                Ok(_) => return,
                Err(e) if attempt == SETUP_ATTEMPTS => {
                    error!(error = %e, "Could not send greeting");
                }
                Err(e) => warn!(attempt, error = %e, "Greeting failed, retrying"),
            }
        }
    }
}
