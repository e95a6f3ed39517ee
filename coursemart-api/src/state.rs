//! Application state

use std::sync::Arc;

use crate::config::Config;
use crate::email::EmailSender;
use crate::query::QueryService;
use crate::store::{DocumentStore, OtpStore};
use crate::telegram::{BotSessions, TelegramApi};

/// State shared by every handler
pub struct AppState<D, O, E> {
    pub config: Config,
    pub documents: D,
    pub otps: O,
    pub email_sender: E,
    pub telegram: Arc<dyn TelegramApi>,
    /// In-flight upload conversations, keyed by Telegram user id
    pub bot_sessions: BotSessions,
}

impl<D, O, E> AppState<D, O, E>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    pub fn new(
        config: Config,
        documents: D,
        otps: O,
        email_sender: E,
        telegram: Arc<dyn TelegramApi>,
    ) -> Self {
        Self {
            config,
            documents,
            otps,
            email_sender,
            telegram,
            bot_sessions: BotSessions::new(),
        }
    }

    /// Query service over this state's document store
    pub fn query(&self) -> QueryService<'_, D> {
        QueryService::new(
            &self.documents,
            self.config.bcrypt_cost,
            self.config.max_page_size,
        )
    }
}
