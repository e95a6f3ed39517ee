//! Telegram webhook and file proxy

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use teloxide::types::Update;

use super::respond;
use crate::crypto::secret_matches;
use crate::email::EmailSender;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::{DocumentStore, OtpStore};
use crate::telegram;

/// Header Telegram echoes the webhook secret in
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// POST /api/telegram/webhook
///
/// Answers 200 for anything it could read, including updates it ignores
/// and conversations that failed; Telegram retries every other status.
pub async fn webhook<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    if let Some(expected) = state.config.telegram_webhook_secret.as_deref() {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if !given.is_some_and(|given| secret_matches(given, expected)) {
            tracing::warn!("Webhook call with a bad secret token");
            return Err(ApiError::Unauthorized("Invalid webhook secret".to_string()));
        }
    }

    let update = match serde_json::from_slice::<Update>(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unreadable update");
            return respond(StatusCode::OK, "Ignored", Value::Null);
        }
    };

    let update_id = update.id.0;
    if let Err(e) = telegram::handle_update(&*state, update).await {
        tracing::error!(update_id, error = %e, "Failed to handle update");
    }
    respond(StatusCode::OK, "OK", Value::Null)
}

/// GET /api/telegram/files/{file_id}
/// Stream a product file without exposing the bot token
pub async fn file<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path(file_id): Path<String>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let bytes = state.telegram.download(&file_id).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}
