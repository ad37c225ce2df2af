//! Error types for the Telegram agent.

use teloxide::{ApiError, DownloadError, RequestError};
use thiserror::Error;

use pink_core::SettingsError;
use pink_queue::QueueError;

/// Errors that can occur in the Telegram agent.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Missing or invalid credentials.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Bot API call failed.
    #[error("Telegram API error: {0}")]
    Api(#[from] RequestError),

    /// File download failed.
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    /// Voice transcription failed.
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Queue access failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TelegramError {
    /// True when Telegram rejected the message markup rather than the message.
    pub fn is_markup_error(&self) -> bool {
        match self {
            TelegramError::Api(RequestError::Api(ApiError::CantParseEntities(_))) => true,
            TelegramError::Api(RequestError::Api(e)) => {
                let text = e.to_string().to_lowercase();
                text.contains("can't parse entities") || text.contains("can't find end")
            }
            _ => false,
        }
    }
}

/// Result type for Telegram operations.
pub type Result<T> = std::result::Result<T, TelegramError>;
