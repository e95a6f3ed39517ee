//! Telegram Bot API integration
//!
//! Incoming updates and outbound calls go through teloxide; the bot only
//! needs `sendMessage`, `getFile` and file downloads.

pub mod bot;
pub mod client;

use async_trait::async_trait;
use coursemart_core::MediaKind;
use teloxide::types::Message;
use thiserror::Error;

pub use bot::{handle_update, BotSessions};
pub use client::{HttpTelegramApi, LoggingTelegramApi};

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum TelegramError {
    /// Message is already stripped of the bot token
    #[error("Telegram request failed: {0}")]
    Request(String),

    #[error("Invalid Bot API URL: {0}")]
    InvalidUrl(String),

    #[error("Telegram bot token is not configured")]
    NotConfigured,
}

impl From<TelegramError> for ApiError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::NotConfigured => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Outbound calls to the Bot API
#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// Send a plain-text message to a chat
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;

    /// Resolve a file id into its path on the Bot API file server
    async fn file_path(&self, file_id: &str) -> Result<String, TelegramError>;

    /// Download a file's contents
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, TelegramError>;
}

/// Attached media, if any. Photos resolve to their largest size.
pub fn media_of(message: &Message) -> Option<(MediaKind, &str)> {
    if let Some(largest) = message.photo().and_then(|sizes| sizes.last()) {
        return Some((MediaKind::Photo, largest.file.id.0.as_str()));
    }
    if let Some(video) = message.video() {
        return Some((MediaKind::Video, video.file.id.0.as_str()));
    }
    message
        .document()
        .map(|doc| (MediaKind::Document, doc.file.id.0.as_str()))
}
