//! Bot API clients

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;

use super::{TelegramApi, TelegramError};

/// Client for the real Bot API
pub struct HttpTelegramApi {
    bot: Bot,
    token: String,
}

impl HttpTelegramApi {
    pub fn new(base_url: &str, token: &str) -> Result<Self, TelegramError> {
        let url = reqwest::Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| TelegramError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            bot: Bot::new(token).set_api_url(url),
            token: token.to_string(),
        })
    }

    /// Wrap a failed call. Request URLs carry the token, so it is cut out
    /// of the message before the error can reach a log line or a response.
    fn request_error(&self, err: impl std::fmt::Display) -> TelegramError {
        TelegramError::Request(redact(&err.to_string(), &self.token))
    }
}

fn redact(message: &str, token: &str) -> String {
    if token.is_empty() {
        return message.to_string();
    }
    message.replace(token, "<redacted>")
}

#[async_trait]
impl TelegramApi for HttpTelegramApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(|e| self.request_error(e))?;
        Ok(())
    }

    async fn file_path(&self, file_id: &str) -> Result<String, TelegramError> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| self.request_error(e))?;
        Ok(file.path)
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        let path = self.file_path(file_id).await?;
        let mut bytes: Vec<u8> = Vec::new();
        self.bot
            .download_file(&path, &mut bytes)
            .await
            .map_err(|e| self.request_error(e))?;
        tracing::debug!(file_id, size = bytes.len(), "Downloaded Telegram file");
        Ok(bytes)
    }
}

/// Stand-in used when no bot token is configured: replies are logged,
/// file lookups fail.
#[derive(Debug, Default)]
pub struct LoggingTelegramApi;

#[async_trait]
impl TelegramApi for LoggingTelegramApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        tracing::info!(chat_id, text, "Telegram reply (bot token not configured)");
        Ok(())
    }

    async fn file_path(&self, _file_id: &str) -> Result<String, TelegramError> {
        Err(TelegramError::NotConfigured)
    }

    async fn download(&self, _file_id: &str) -> Result<Vec<u8>, TelegramError> {
        Err(TelegramError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_removes_every_token_occurrence() {
        let message = "error sending request for url (http://h/bot123:abc/getFile): bot123:abc";
        let cleaned = redact(message, "123:abc");
        assert!(!cleaned.contains("123:abc"));
        assert_eq!(cleaned.matches("<redacted>").count(), 2);
        assert_eq!(redact("plain", ""), "plain");
    }

    #[test]
    fn test_bad_base_url_is_rejected() {
        assert!(matches!(
            HttpTelegramApi::new("not a url", "123:abc"),
            Err(TelegramError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_api_error_hides_token() {
        let api = HttpTelegramApi::new("http://127.0.0.1:1", "123456:SECRET-BOT-TOKEN").unwrap();
        let err = api.file_path("abc").await.unwrap_err();
        assert!(matches!(err, TelegramError::Request(_)));
        assert!(!err.to_string().contains("SECRET-BOT-TOKEN"));
    }

    #[tokio::test]
    async fn test_logging_api_has_no_files() {
        let api = LoggingTelegramApi;
        assert!(api.send_message(1, "hi").await.is_ok());
        assert!(matches!(
            api.file_path("x").await,
            Err(TelegramError::NotConfigured)
        ));
    }
}
