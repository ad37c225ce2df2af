//! Tunable policy values and credentials read from the environment.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Trigger auto-compact once the session context grows past this many tokens.
pub const DEFAULT_AUTO_COMPACT_THRESHOLD: u64 = 180_000;

/// Hard context limit of the backend, shown in the usage counter.
pub const DEFAULT_MAX_SESSION_CONTEXT: u64 = 200_000;

/// Timeout for auxiliary backend calls (summarize, takeover).
pub const DEFAULT_AUX_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_MAX_THINKING_TOKENS: u32 = 31_999;

pub const DEFAULT_NODE_HEAP_MB: u32 = 8192;

/// Telegram's limit is 4096; keep a safety margin for markup escapes.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4000;

pub const AUTO_COMPACT_THRESHOLD_ENV: &str = "PINK_AUTO_COMPACT_THRESHOLD";
pub const MAX_SESSION_CONTEXT_ENV: &str = "PINK_MAX_SESSION_CONTEXT";
pub const AUX_TIMEOUT_ENV: &str = "PINK_CLAUDE_TIMEOUT_SECS";
pub const MAIN_TIMEOUT_ENV: &str = "PINK_CLAUDE_MAIN_TIMEOUT_SECS";
pub const MAX_THINKING_TOKENS_ENV: &str = "PINK_MAX_THINKING_TOKENS";
pub const NODE_HEAP_MB_ENV: &str = "PINK_NODE_HEAP_MB";
pub const CLAUDE_BIN_ENV: &str = "PINK_CLAUDE_BIN";
pub const TRANSCRIBER_BIN_ENV: &str = "PINK_TRANSCRIBER_BIN";
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_USER_ENV: &str = "TELEGRAM_USER_ID";

/// Errors raised while reading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A required variable is missing.
    #[error("Missing {0}. Set it in the environment or in the .env file.")]
    Missing(&'static str),

    /// A variable is present but cannot be parsed.
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Backend and delivery policy shared by both daemons.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// Context size (tokens) above which auto-compact runs.
    pub auto_compact_threshold: u64,
    /// Context ceiling shown next to the usage counter.
    pub max_session_context: u64,
    /// Timeout for summarize/takeover calls.
    pub aux_timeout: Duration,
    /// Timeout for the main prompt call; `None` waits indefinitely.
    pub main_timeout: Option<Duration>,
    /// Exported to the backend as `MAX_THINKING_TOKENS`.
    pub max_thinking_tokens: u32,
    /// Exported to the backend as `NODE_OPTIONS=--max-old-space-size=<mb>`.
    pub node_heap_mb: u32,
    /// Backend executable.
    pub claude_bin: String,
    /// Voice transcription executable.
    pub transcriber_bin: String,
    /// Maximum length of a single outgoing chat message.
    pub max_message_length: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            auto_compact_threshold: DEFAULT_AUTO_COMPACT_THRESHOLD,
            max_session_context: DEFAULT_MAX_SESSION_CONTEXT,
            aux_timeout: Duration::from_secs(DEFAULT_AUX_TIMEOUT_SECS),
            main_timeout: None,
            max_thinking_tokens: DEFAULT_MAX_THINKING_TOKENS,
            node_heap_mb: DEFAULT_NODE_HEAP_MB,
            claude_bin: "claude".to_string(),
            transcriber_bin: "pink-transcriber".to_string(),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

impl AgentSettings {
    /// Creates settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from the environment on top of the defaults.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auto_compact_threshold: env_or(AUTO_COMPACT_THRESHOLD_ENV, defaults.auto_compact_threshold),
            max_session_context: env_or(MAX_SESSION_CONTEXT_ENV, defaults.max_session_context),
            aux_timeout: Duration::from_secs(env_or(AUX_TIMEOUT_ENV, DEFAULT_AUX_TIMEOUT_SECS)),
            main_timeout: env_parse::<u64>(MAIN_TIMEOUT_ENV)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            max_thinking_tokens: env_or(MAX_THINKING_TOKENS_ENV, defaults.max_thinking_tokens),
            node_heap_mb: env_or(NODE_HEAP_MB_ENV, defaults.node_heap_mb),
            claude_bin: std::env::var(CLAUDE_BIN_ENV).unwrap_or(defaults.claude_bin),
            transcriber_bin: std::env::var(TRANSCRIBER_BIN_ENV).unwrap_or(defaults.transcriber_bin),
            max_message_length: defaults.max_message_length,
        }
    }

    /// Sets the auto-compact threshold.
    pub fn with_auto_compact_threshold(mut self, tokens: u64) -> Self {
        self.auto_compact_threshold = tokens;
        self
    }

    /// Sets the displayed context ceiling.
    pub fn with_max_session_context(mut self, tokens: u64) -> Self {
        self.max_session_context = tokens;
        self
    }

    /// Sets the timeout for auxiliary calls.
    pub fn with_aux_timeout(mut self, timeout: Duration) -> Self {
        self.aux_timeout = timeout;
        self
    }

    /// Sets the timeout for the main prompt call.
    pub fn with_main_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.main_timeout = timeout;
        self
    }

    /// Sets the backend executable.
    pub fn with_claude_bin(mut self, bin: impl Into<String>) -> Self {
        self.claude_bin = bin.into();
        self
    }

    /// Sets the outgoing message length limit.
    pub fn with_max_message_length(mut self, len: usize) -> Self {
        self.max_message_length = len;
        self
    }

    /// Environment variables the backend process gets on top of ours.
    pub fn backend_env(&self) -> Vec<(String, String)> {
        vec![
            ("MAX_THINKING_TOKENS".to_string(), self.max_thinking_tokens.to_string()),
            (
                "NODE_OPTIONS".to_string(),
                format!("--max-old-space-size={}", self.node_heap_mb),
            ),
        ]
    }
}

/// Telegram credentials. Only one user is ever served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub user_id: i64,
}

impl TelegramSettings {
    /// Reads `TELEGRAM_BOT_TOKEN` and `TELEGRAM_USER_ID`.
    ///
    /// # Errors
    /// Returns an error if either is missing or the user id is not numeric.
    pub fn from_env() -> Result<Self, SettingsError> {
        let bot_token = std::env::var(TELEGRAM_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(SettingsError::Missing(TELEGRAM_TOKEN_ENV))?;
        let raw_user = std::env::var(TELEGRAM_USER_ENV)
            .map_err(|_| SettingsError::Missing(TELEGRAM_USER_ENV))?;
        let user_id = raw_user.trim().parse().map_err(|_| SettingsError::Invalid {
            name: TELEGRAM_USER_ENV,
            value: raw_user.clone(),
        })?;
        Ok(Self { bot_token, user_id })
    }
}

/// Whether `VERBOSE=1` is set.
pub fn verbose_from_env() -> bool {
    std::env::var("VERBOSE").map(|v| v == "1").unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_parse(name).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AgentSettings::default();

        assert_eq!(settings.auto_compact_threshold, 180_000);
        assert_eq!(settings.max_session_context, 200_000);
        assert_eq!(settings.aux_timeout, Duration::from_secs(120));
        assert_eq!(settings.main_timeout, None);
        assert_eq!(settings.max_message_length, 4000);
    }

    #[test]
    fn test_settings_builder() {
        let settings = AgentSettings::new()
            .with_auto_compact_threshold(1000)
            .with_max_session_context(2000)
            .with_aux_timeout(Duration::from_secs(5))
            .with_main_timeout(Some(Duration::from_secs(60)))
            .with_claude_bin("/opt/claude");

        assert_eq!(settings.auto_compact_threshold, 1000);
        assert_eq!(settings.max_session_context, 2000);
        assert_eq!(settings.aux_timeout, Duration::from_secs(5));
        assert_eq!(settings.main_timeout, Some(Duration::from_secs(60)));
        assert_eq!(settings.claude_bin, "/opt/claude");
    }

    #[test]
    fn test_backend_env() {
        let env = AgentSettings::default().backend_env();

        assert!(env.contains(&("MAX_THINKING_TOKENS".to_string(), "31999".to_string())));
        assert!(env.contains(&(
            "NODE_OPTIONS".to_string(),
            "--max-old-space-size=8192".to_string()
        )));
    }
}
