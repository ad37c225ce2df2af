//! User-facing texts. English only.

pub const READY: &str = "Ready to work";
pub const NEW_SESSION: &str = "New session started. Previous context cleared.";
pub const COMPACT_STARTING: &str = "🔄 Starting auto-compact... This will take 1-2 minutes.";
pub const NO_SESSION: &str =
    "❌ No active session found. Send a message first to create a session.";
pub const OUT_OF_MEMORY: &str = "Claude Code ran out of memory. Session context is too large.\n\n\
    Use /new to start fresh.";

/// Prefix every error response carries. The dispatcher sends these as plain text.
pub const ERROR_PREFIX: &str = "❌ Error:";

/// Prefix of transcription echoes.
pub const TRANSCRIPTION_PREFIX: &str = "🎤";

pub const VOICE_PREFIX: &str =
    "[Voice input - if anything sounds unclear or nonsensical, please ask for clarification]";

/// Reaction set while a message is being worked on.
pub const REACTION_IN_PROGRESS: &str = "👀";
/// Reaction that replaces it once the answer is delivered.
pub const REACTION_DONE: &str = "👍";

pub fn compact_success(session_id: &str) -> String {
    format!(
        "✅ Auto-compact completed.\n\nNew session: {}...\nPrevious context saved in summary.",
        short_id(session_id)
    )
}

pub fn compact_failed(error: &str) -> String {
    format!("❌ Auto-compact failed: {}\n\nUse /new to create a new session.", error)
}

/// Notice appended before auto-compact runs; `threshold` is in tokens.
pub fn auto_compact_notification(threshold: u64) -> String {
    format!(
        "🔄 Auto-compact started (context exceeded {}k tokens).\n\n\
        Please wait 1-2 minutes, next commands will be processed after completion...",
        threshold / 1000
    )
}

pub fn error_response(error: &str) -> String {
    format!("{} {}", ERROR_PREFIX, error)
}

pub fn bot_started(bot_name: &str) -> String {
    format!("🦄 {} activated and ready to work", bot_name)
}

pub fn restarting(bot_name: &str) -> String {
    format!("🔄 Restarting {}...", bot_name)
}

pub fn files_saved(count: usize) -> String {
    let word = if count == 1 { "file" } else { "files" };
    format!("✅ {} {} saved", count, word)
}

/// First eight characters of a session id, used in counters and notices.
pub fn short_id(session_id: &str) -> &str {
    match session_id.char_indices().nth(8) {
        Some((idx, _)) => &session_id[..idx],
        None => session_id,
    }
}

/// Cut `text` to `max` characters, marking the cut.
pub fn truncate_error(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...\n(error truncated)", &text[..idx]),
        None => text.to_string(),
    }
}
