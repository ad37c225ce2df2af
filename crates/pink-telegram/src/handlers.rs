//! Handlers for incoming updates.
//!
//! Text, voice and file messages become prompts on the commands queue. The
//! answer comes back through the responses queue, so handlers never wait for
//! Claude.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileMeta, ReactionType};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use pink_core::messages;
use pink_queue::QueueStore;

use crate::attachments::AttachmentStore;
use crate::chunking::split_into_chunks;
use crate::error::Result;
use crate::notifier::{Notifier, TelegramNotifier};
use crate::prompt::{build_prompt, PromptSource, ReplyContext};
use crate::transcriber::Transcriber;

/// Longest error notice sent to the chat.
const MAX_ERROR_NOTICE: usize = 1000;

/// Bot commands that can be invoked with /.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Check that the bot is up")]
    Start,

    #[command(description = "New session")]
    New,

    #[command(description = "Continue with summary")]
    Compact,

    #[command(description = "Restart the agents")]
    Restart,
}

impl Command {
    /// Control text queued for the Claude agent, if the command has one.
    pub fn control_text(&self) -> Option<&'static str> {
        match self {
            Command::New => Some("/new"),
            Command::Compact => Some("/compact"),
            Command::Start | Command::Restart => None,
        }
    }
}

/// What happened to uploaded files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// A caption came with them and the prompt was queued.
    Queued,
    /// Saved for the next prompt.
    Saved(usize),
}

/// State shared by all handlers.
pub struct HandlerState {
    user_id: i64,
    bot_name: String,
    queue: QueueStore,
    attachments: AttachmentStore,
    transcriber: Transcriber,
    files_dir: PathBuf,
    temp_dir: PathBuf,
    max_message_length: usize,
}

impl HandlerState {
    pub fn new(
        user_id: i64,
        queue: QueueStore,
        attachments: AttachmentStore,
        transcriber: Transcriber,
    ) -> Self {
        Self {
            user_id,
            bot_name: "Bot".to_string(),
            queue,
            attachments,
            transcriber,
            files_dir: pink_core::files_dir(),
            temp_dir: pink_core::temp_dir(),
            max_message_length: pink_core::settings::DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }

    pub fn with_bot_name(mut self, name: impl Into<String>) -> Self {
        self.bot_name = name.into();
        self
    }

    pub fn with_download_dirs(mut self, temp_dir: impl Into<PathBuf>, files_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self.files_dir = files_dir.into();
        self
    }

    pub fn with_max_message_length(mut self, len: usize) -> Self {
        self.max_message_length = len;
        self
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    pub fn is_authorized(&self, msg: &Message) -> bool {
        msg.from
            .as_ref()
            .is_some_and(|user| user.id.0 as i64 == self.user_id)
    }

    /// Where an uploaded file for `message_id` is stored.
    pub fn file_path(&self, message_id: i64, file_name: &str) -> PathBuf {
        let name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        self.files_dir.join(format!("{message_id}_{name}"))
    }

    /// Where a voice message is downloaded before transcription.
    pub fn voice_path(&self, message_id: i64) -> PathBuf {
        self.temp_dir.join(format!("{message_id}.ogg"))
    }

    /// Queues a typed prompt, consuming pending attachments.
    pub fn queue_text(&self, message_id: i64, reply: &ReplyContext, text: &str) -> Result<String> {
        self.queue_prompt(message_id, reply, PromptSource::Typed, text)
    }

    /// Queues a transcribed prompt, consuming pending attachments.
    pub fn queue_voice(&self, message_id: i64, reply: &ReplyContext, transcript: &str) -> Result<String> {
        self.queue_prompt(message_id, reply, PromptSource::Voice, transcript)
    }

    fn queue_prompt(
        &self,
        message_id: i64,
        reply: &ReplyContext,
        source: PromptSource,
        text: &str,
    ) -> Result<String> {
        let attachments = self.attachments.take()?;
        let prompt = build_prompt(reply, source, &attachments, text);
        self.queue.append_command(message_id, &prompt)?;
        Ok(prompt)
    }

    /// Queues downloaded files with their caption, or keeps them for the
    /// next prompt when there is none.
    pub fn accept_files(
        &self,
        message_id: i64,
        reply: &ReplyContext,
        paths: Vec<String>,
        caption: Option<&str>,
    ) -> Result<FileOutcome> {
        match caption.filter(|c| !c.trim().is_empty()) {
            Some(caption) => {
                let mut all = self.attachments.take()?;
                all.extend(paths);
                let prompt = build_prompt(reply, PromptSource::Typed, &all, caption);
                self.queue.append_command(message_id, &prompt)?;
                Ok(FileOutcome::Queued)
            }
            None => {
                let count = paths.len();
                self.attachments.add(&paths)?;
                Ok(FileOutcome::Saved(count))
            }
        }
    }

    /// Queues a `/new` or `/compact` control command.
    pub fn queue_control(&self, message_id: i64, command: &Command) -> Result<bool> {
        match command.control_text() {
            Some(text) => {
                self.queue.append_command(message_id, text)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Appends an error straight to the responses queue.
    fn report(&self, message_id: i64, text: String) {
        if let Err(e) = self.queue.append_response(message_id, text) {
            error!(message_id, error = %e, "Failed to queue error response");
        }
    }
}

async fn react(bot: &Bot, msg: &Message, emoji: &str) {
    let result = bot
        .set_message_reaction(msg.chat.id, msg.id)
        .reaction(vec![ReactionType::Emoji {
            emoji: emoji.to_string(),
        }])
        .await;
    if let Err(e) = result {
        warn!(message_id = msg.id.0, error = %e, "Failed to set reaction");
    }
}

/// Sends an error notice, as a reply when possible.
async fn send_error(bot: &Bot, msg: &Message, error: &str) {
    let text = messages::error_response(&messages::truncate_error(error, MAX_ERROR_NOTICE));
    let replied = bot
        .send_message(msg.chat.id, &text)
        .reply_parameters(teloxide::types::ReplyParameters::new(msg.id))
        .await;
    if replied.is_err() {
        if let Err(e) = bot.send_message(msg.chat.id, &text).await {
            error!(error = %e, "Failed to send error notice");
        }
    }
}

async fn download(bot: &Bot, file: &FileMeta, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let remote = bot.get_file(file.id.clone()).await?;
    let mut dst = tokio::fs::File::create(dest).await?;
    bot.download_file(&remote.path, &mut dst).await?;
    Ok(())
}

/// Handle a bot command.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<HandlerState>,
) -> ResponseResult<()> {
    if !state.is_authorized(&msg) {
        return Ok(());
    }
    info!(command = ?cmd, "Command received");

    match cmd {
        Command::Start => {
            bot.send_message(msg.chat.id, messages::READY).await?;
        }
        Command::New | Command::Compact => {
            react(&bot, &msg, messages::REACTION_IN_PROGRESS).await;
            if let Err(e) = state.queue_control(msg.id.0 as i64, &cmd) {
                error!(error = %e, "Failed to queue control command");
                send_error(&bot, &msg, &e.to_string()).await;
            }
        }
        Command::Restart => {
            bot.send_message(msg.chat.id, messages::restarting(state.bot_name()))
                .await?;
            // SAFETY: getppid never fails; kill only signals the supervisor.
            let parent = unsafe { libc::getppid() };
            if unsafe { libc::kill(parent, libc::SIGUSR1) } != 0 {
                error!(parent, "Failed to signal supervisor");
            }
        }
    }

    Ok(())
}

/// Handle a plain text message.
pub async fn handle_text(bot: Bot, msg: Message, state: Arc<HandlerState>) -> ResponseResult<()> {
    if !state.is_authorized(&msg) {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    debug!(message_id = msg.id.0, "Text message received");
    react(&bot, &msg, messages::REACTION_IN_PROGRESS).await;

    let reply = ReplyContext::from_message(&msg);
    if let Err(e) = state.queue_text(msg.id.0 as i64, &reply, text) {
        error!(error = %e, "Failed to queue prompt");
        send_error(&bot, &msg, &e.to_string()).await;
    }
    Ok(())
}

/// Handle a voice message: download, transcribe, queue, echo.
pub async fn handle_voice(bot: Bot, msg: Message, state: Arc<HandlerState>) -> ResponseResult<()> {
    if !state.is_authorized(&msg) {
        return Ok(());
    }
    let Some(voice) = msg.voice() else {
        return Ok(());
    };
    let message_id = msg.id.0 as i64;

    debug!(message_id, duration = ?voice.duration, "Voice message received");
    react(&bot, &msg, messages::REACTION_IN_PROGRESS).await;

    let path = state.voice_path(message_id);
    let transcript = async {
        download(&bot, &voice.file, &path).await?;
        let text = state.transcriber.transcribe(&path).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %e, "Could not remove voice file");
        }
        let text = text?;
        state.queue_voice(message_id, &ReplyContext::from_message(&msg), &text)?;
        Ok::<_, crate::error::TelegramError>(text)
    }
    .await;

    match transcript {
        Ok(text) => {
            debug!(message_id, "Voice prompt queued");
            let notifier = TelegramNotifier::new(bot.clone(), msg.chat.id);
            if let Err(e) =
                echo_transcription(&notifier, message_id, &text, state.max_message_length).await
            {
                warn!(error = %e, "Failed to send transcription");
            }
        }
        Err(e) => {
            error!(message_id, error = %e, "Voice processing error");
            state.report(message_id, format!("❌ Voice processing error: {e}"));
        }
    }
    Ok(())
}

/// Shows the user what was heard, in replies to their voice message.
async fn echo_transcription(
    notifier: &dyn Notifier,
    message_id: i64,
    text: &str,
    max_len: usize,
) -> Result<()> {
    let echo = format!("{} {}", messages::TRANSCRIPTION_PREFIX, text);
    for chunk in split_into_chunks(&echo, max_len) {
        notifier.send_text(&chunk, Some(message_id), false).await?;
    }
    Ok(())
}

/// Files in a message, with the names they are stored under.
fn collect_files(msg: &Message) -> Vec<(&FileMeta, String)> {
    let mut files = Vec::new();
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        files.push((&photo.file, "photo.jpg".to_string()));
    }
    if let Some(doc) = msg.document() {
        let name = doc.file_name.clone().unwrap_or_else(|| "document".to_string());
        files.push((&doc.file, name));
    }
    if let Some(video) = msg.video() {
        files.push((&video.file, "video.mp4".to_string()));
    }
    if let Some(audio) = msg.audio() {
        let name = audio.file_name.clone().unwrap_or_else(|| "audio.mp3".to_string());
        files.push((&audio.file, name));
    }
    files
}

/// True for messages carrying a photo, document, video or audio file.
pub fn has_files(msg: &Message) -> bool {
    msg.photo().is_some() || msg.document().is_some() || msg.video().is_some() || msg.audio().is_some()
}

/// Handle a photo, document, video or audio upload.
pub async fn handle_files(bot: Bot, msg: Message, state: Arc<HandlerState>) -> ResponseResult<()> {
    if !state.is_authorized(&msg) {
        return Ok(());
    }
    let files = collect_files(&msg);
    if files.is_empty() {
        return Ok(());
    }
    let message_id = msg.id.0 as i64;

    debug!(message_id, count = files.len(), "File message received");
    react(&bot, &msg, messages::REACTION_IN_PROGRESS).await;

    let outcome = async {
        let mut paths = Vec::with_capacity(files.len());
        for (file, name) in &files {
            let path = state.file_path(message_id, name);
            download(&bot, file, &path).await?;
            debug!(path = %path.display(), "File saved");
            paths.push(path.to_string_lossy().into_owned());
        }
        let caption = msg.caption().or_else(|| msg.text());
        state.accept_files(message_id, &ReplyContext::from_message(&msg), paths, caption)
    }
    .await;

    match outcome {
        Ok(FileOutcome::Queued) => {}
        Ok(FileOutcome::Saved(count)) => {
            bot.send_message(msg.chat.id, messages::files_saved(count)).await?;
        }
        Err(e) => {
            error!(message_id, error = %e, "File download error");
            state.report(message_id, format!("❌ File download error: {e}"));
            return Ok(());
        }
    }

    react(&bot, &msg, messages::REACTION_DONE).await;
    Ok(())
}
