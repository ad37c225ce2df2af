//! Execution of one claimed command.
//!
//! Every path through [`Worker::run`] ends with at least one response entry
//! for the message, so the user always hears back. Only a failure to write
//! the responses queue itself escapes.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use pink_core::{messages, AgentSettings};
use pink_queue::QueueStore;

use crate::backend::{Backend, ExecOptions};
use crate::error::{ClaudeError, Result};
use crate::parser;
use crate::session::{SessionManager, SessionStore};

/// Longest backend error text passed on to chat.
const MAX_ERROR_CHARS: usize = 500;

/// Placeholder for runs that printed nothing.
const EMPTY_OUTPUT_TEXT: &str = "Done";

/// What a queued command asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Prompt(String),
    /// Forget the current session.
    NewSession,
    /// Compact the current session now.
    Compact,
}

impl Job {
    pub fn parse(content: &str) -> Self {
        match content.trim() {
            "/new" => Self::NewSession,
            "/compact" => Self::Compact,
            _ => Self::Prompt(content.to_string()),
        }
    }
}

/// A finished prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub text: String,
    pub context_size: u64,
    pub session_id: String,
}

/// Maps a failed run's stderr to an error.
pub fn classify_failure(stderr: &str) -> ClaudeError {
    let message = match stderr.trim() {
        "" => "Unknown error",
        text => text,
    };
    let lower = message.to_lowercase();
    if lower.contains("heap out of memory") || lower.contains("heap limit") {
        return ClaudeError::OutOfMemory;
    }
    ClaudeError::BackendFailed(messages::truncate_error(message, MAX_ERROR_CHARS))
}

/// Runs commands against the current session and reports through the queue.
pub struct Worker {
    sessions: SessionManager,
    queue: QueueStore,
    settings: AgentSettings,
}

impl Worker {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<dyn SessionStore>,
        queue: QueueStore,
        settings: AgentSettings,
    ) -> Self {
        Self {
            sessions: SessionManager::new(backend, store, settings.clone()),
            queue,
            settings,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Runs `prompt` in the current session, creating one if needed.
    pub async fn execute(&self, prompt: &str) -> Result<ExecutionResult> {
        let session_id = self.sessions.ensure_session().await?;

        let opts = ExecOptions::new()
            .resume(&session_id)
            .structured()
            .with_timeout(self.settings.main_timeout);
        let output = self.sessions.backend().execute(prompt, &opts).await?;
        if !output.success() {
            return Err(classify_failure(&output.stderr));
        }

        let raw = output.stdout.trim();
        if raw.is_empty() {
            warn!("Empty output");
            return Ok(ExecutionResult {
                text: EMPTY_OUTPUT_TEXT.to_string(),
                context_size: 0,
                session_id,
            });
        }

        let (text, context_size) =
            match parser::parse_output(raw, &session_id, self.settings.max_session_context) {
                Ok(parsed) => (parsed.text, parsed.context_size),
                Err(e) => {
                    warn!(error = %e, "Structured output unparseable, returning raw text");
                    (raw.to_string(), 0)
                }
            };

        Ok(ExecutionResult {
            text: if text.is_empty() {
                EMPTY_OUTPUT_TEXT.to_string()
            } else {
                text
            },
            context_size,
            session_id,
        })
    }

    /// Handles one claimed command end to end.
    pub async fn run(&self, message_id: i64, content: &str) -> Result<()> {
        match Job::parse(content) {
            Job::Prompt(prompt) => self.run_prompt(message_id, &prompt).await,
            Job::NewSession => self.run_new_session(message_id),
            Job::Compact => self.run_compact(message_id).await,
        }
    }

    async fn run_prompt(&self, message_id: i64, prompt: &str) -> Result<()> {
        debug!(message_id, "Executing command");
        let result = match self.execute(prompt).await {
            Ok(result) => result,
            Err(e) => {
                error!(message_id, error = %e, "Execution failed");
                return self.respond(message_id, messages::error_response(&e.to_string()));
            }
        };

        self.respond(message_id, result.text)?;
        debug!(message_id, "Response queued");

        let threshold = self.settings.auto_compact_threshold;
        if result.context_size > threshold {
            warn!(
                context_size = result.context_size,
                threshold, "Context exceeded threshold"
            );
            self.respond(message_id, messages::auto_compact_notification(threshold))?;
            self.compact_and_report(message_id, &result.session_id).await?;
        }
        Ok(())
    }

    fn run_new_session(&self, message_id: i64) -> Result<()> {
        let reply = match self.sessions.reset_session() {
            Ok(()) => messages::NEW_SESSION.to_string(),
            Err(e) => {
                error!(error = %e, "Failed to reset session");
                format!("Failed to reset session: {}", e)
            }
        };
        self.respond(message_id, reply)
    }

    async fn run_compact(&self, message_id: i64) -> Result<()> {
        let session_id = match self.sessions.read_session_id() {
            Ok(Some(id)) => id,
            Ok(None) => return self.respond(message_id, messages::NO_SESSION),
            Err(e) => return self.respond(message_id, messages::compact_failed(&e.to_string())),
        };

        self.respond(message_id, messages::COMPACT_STARTING)?;
        self.compact_and_report(message_id, &session_id).await
    }

    async fn compact_and_report(&self, message_id: i64, session_id: &str) -> Result<()> {
        let reply = match self.sessions.perform_auto_compact(session_id).await {
            Ok(new_id) => messages::compact_success(&new_id),
            Err(e) => {
                error!(error = %e, "Auto-compact failed");
                messages::compact_failed(&e.to_string())
            }
        };
        self.respond(message_id, reply)
    }

    fn respond(&self, message_id: i64, output: impl Into<String>) -> Result<()> {
        self.queue.append_response(message_id, output)?;
        info!(message_id, "Response appended");
        Ok(())
    }
}
