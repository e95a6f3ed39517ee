//! Upload bot
//!
//! Drives the product-upload conversation for incoming Telegram messages.
//! Each Telegram user gets one slot holding their session behind an async
//! mutex, locked for the whole handling of a message, so messages from one
//! user are processed in order while different users proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use coursemart_core::bot::CANCEL_COMMAND;
use coursemart_core::{Input, ProductDraft, Step, Table, UploadSession, UploadState};
use serde_json::json;
use teloxide::types::{Message, Update, UpdateKind};

use super::media_of;
use crate::email::EmailSender;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::{DocumentStore, OtpStore};

/// Reply to /start, /help and anything said outside a conversation
pub const USAGE: &str = "Coursemart seller bot\n\n\
    /upload - list a new product\n\
    /cancel - abandon the current upload\n\
    /help - show this message";

type Slot = Arc<tokio::sync::Mutex<Option<UploadSession>>>;

/// Registry of per-user upload sessions
#[derive(Default)]
pub struct BotSessions {
    slots: Mutex<HashMap<u64, Slot>>,
}

impl BotSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user_id: u64) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(user_id).or_default().clone()
    }

    /// Drop our handle and reclaim the slot if nobody else holds it and it
    /// has no session
    fn release(&self, user_id: u64, slot: Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in `slot`
        let idle = Arc::strong_count(&slot) == 2
            && slot.try_lock().map(|s| s.is_none()).unwrap_or(false);
        drop(slot);
        if idle {
            slots.remove(&user_id);
        }
    }

    /// Current conversation state for a user
    pub async fn state_of(&self, user_id: u64) -> Option<UploadState> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(&user_id).cloned()
        }?;
        let session = slot.lock().await;
        session.as_ref().map(|s| s.state)
    }

    /// Number of users with a live slot
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Handle one webhook update
pub async fn handle_update<D, O, E>(state: &AppState<D, O, E>, update: Update) -> ApiResult<()>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let UpdateKind::Message(message) = update.kind else {
        tracing::debug!(update_id = ?update.id, "Ignoring non-message update");
        return Ok(());
    };
    let Some(user_id) = message.from.as_ref().map(|u| u.id.0) else {
        return Ok(());
    };

    let slot = state.bot_sessions.slot(user_id);
    let result = {
        let mut session = slot.lock().await;
        handle_message(state, user_id, &message, &mut session).await
    };
    state.bot_sessions.release(user_id, slot);
    result
}

async fn handle_message<D, O, E>(
    state: &AppState<D, O, E>,
    user_id: u64,
    message: &Message,
    session: &mut Option<UploadSession>,
) -> ApiResult<()>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let chat_id = message.chat.id.0;
    let text = message.text().map(str::trim);

    if let Some(command) = text.and_then(command_name) {
        let reply = match command.as_str() {
            "/upload" => {
                let fresh = UploadSession::new();
                let prompt = fresh.state.prompt();
                *session = Some(fresh);
                tracing::info!(user_id, "Upload started");
                prompt.to_string()
            }
            CANCEL_COMMAND => match session.take() {
                Some(_) => {
                    tracing::info!(user_id, "Upload cancelled");
                    UploadState::Cancelled.prompt().to_string()
                }
                None => "Nothing to cancel.".to_string(),
            },
            _ => USAGE.to_string(),
        };
        return reply_to(state, chat_id, &reply).await;
    }

    let Some(current) = session.as_mut() else {
        return reply_to(state, chat_id, USAGE).await;
    };

    let input = match (media_of(message), text) {
        (Some((kind, file_id)), _) => Input::Media { kind, file_id },
        (None, Some(text)) => Input::Text(text),
        (None, None) => {
            return reply_to(state, chat_id, current.state.prompt()).await;
        }
    };

    let reply = match current.step(input) {
        Step::Advanced(UploadState::AwaitingConfirmation) => format!(
            "{}\n\n{}",
            current.draft.summary(),
            UploadState::AwaitingConfirmation.prompt()
        ),
        Step::Advanced(next) => next.prompt().to_string(),
        Step::Rejected(reason) => format!("{}\n{}", reason, current.state.prompt()),
        Step::Cancelled => {
            *session = None;
            tracing::info!(user_id, "Upload cancelled");
            UploadState::Cancelled.prompt().to_string()
        }
        Step::ReadyToPublish => match publish(state, user_id, &current.draft).await {
            Ok(product_id) => {
                current.mark_published();
                *session = None;
                tracing::info!(user_id, %product_id, "Product published");
                format!("{} Id: {}", UploadState::Published.prompt(), product_id)
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Publishing failed");
                format!(
                    "Publishing failed: {}\nReply yes to try again or /cancel.",
                    e
                )
            }
        },
    };

    reply_to(state, chat_id, &reply).await
}

/// Store the finished draft as a product, returning its id
async fn publish<D, O, E>(
    state: &AppState<D, O, E>,
    user_id: u64,
    draft: &ProductDraft,
) -> ApiResult<String>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let product = draft
        .complete()
        .ok_or_else(|| ApiError::Validation("The upload is incomplete".to_string()))?;

    // Confirms the file is still retrievable before listing it
    state.telegram.file_path(&product.file_id).await?;

    let created = state.query().create(
        Table::Products,
        json!({
            "title": product.title,
            "description": product.description,
            "price": product.price,
            "category": product.category,
            "stock": product.stock,
            "mediaType": product.media_kind.as_str(),
            "mediaUrl": format!("/api/telegram/files/{}", product.file_id),
            "telegramFileId": product.file_id,
            "sellerTelegramId": user_id,
        }),
    )?;

    Ok(created
        .get("_id")
        .and_then(|id| id.as_str())
        .unwrap_or_default()
        .to_string())
}

async fn reply_to<D, O, E>(state: &AppState<D, O, E>, chat_id: i64, text: &str) -> ApiResult<()> {
    state.telegram.send_message(chat_id, text).await?;
    Ok(())
}

/// `/upload@my_bot extra` -> `/upload`
fn command_name(text: &str) -> Option<String> {
    if !text.starts_with('/') {
        return None;
    }
    let word = text.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    Some(name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name() {
        assert_eq!(command_name("/upload"), Some("/upload".to_string()));
        assert_eq!(command_name("/Cancel@coursemart_bot now"), Some("/cancel".to_string()));
        assert_eq!(command_name("photo"), None);
    }

    #[tokio::test]
    async fn test_release_reclaims_empty_slot() {
        let sessions = BotSessions::new();
        let slot = sessions.slot(1);
        sessions.release(1, slot);
        assert_eq!(sessions.active(), 0);

        let slot = sessions.slot(2);
        *slot.lock().await = Some(UploadSession::new());
        sessions.release(2, slot);
        assert_eq!(sessions.active(), 1);
        assert_eq!(
            sessions.state_of(2).await,
            Some(UploadState::AwaitingMediaType)
        );
    }

    #[tokio::test]
    async fn test_release_keeps_slot_held_elsewhere() {
        let sessions = BotSessions::new();
        let first = sessions.slot(1);
        let second = sessions.slot(1);
        sessions.release(1, first);
        assert_eq!(sessions.active(), 1);
        sessions.release(1, second);
        assert_eq!(sessions.active(), 0);
    }
}
