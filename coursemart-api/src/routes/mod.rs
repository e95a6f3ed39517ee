//! HTTP routes for the service
//!
//! Every response, success or failure, uses the same envelope:
//! `{ "status": <http status>, "message": ..., "data": ..., "error": ... }`.

mod auth;
mod crud;
mod payment;
mod resume;
mod telegram;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::email::EmailSender;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::{DocumentStore, OtpStore};

pub use auth::bearer_claims;

/// Build an envelope response
pub fn envelope(status: StatusCode, message: &str, data: Value, error: Option<String>) -> Response {
    let body = json!({
        "status": status.as_u16(),
        "message": message,
        "data": data,
        "error": error,
    });
    (status, Json(body)).into_response()
}

/// Successful envelope with serialized data
pub(crate) fn respond<T: Serialize>(
    status: StatusCode,
    message: &str,
    data: T,
) -> ApiResult<Response> {
    Ok(envelope(status, message, serde_json::to_value(data)?, None))
}

/// JSON body extractor whose rejections use the envelope
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Create the router with all routes
pub fn create_router<D, O, E>(state: Arc<AppState<D, O, E>>) -> Router
where
    D: DocumentStore + 'static,
    O: OtpStore + 'static,
    E: EmailSender + 'static,
{
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/verify-signup", post(auth::verify_signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .route("/api/auth/me", get(auth::me))
        .route("/api/telegram/webhook", post(telegram::webhook))
        .route("/api/telegram/files/{file_id}", get(telegram::file))
        .route("/api/payments/verify", post(payment::verify))
        .route("/api/resume/parse", post(resume::parse))
        .route(
            "/api/{table}",
            post(crud::create)
                .get(crud::list)
                .patch(crud::update_many)
                .delete(crud::delete_many),
        )
        .route("/api/{table}/bulk", post(crud::bulk_create))
        .route("/api/{table}/find", post(crud::find))
        .route("/api/{table}/find-one", post(crud::find_one))
        .route("/api/{table}/search", post(crud::search))
        .route(
            "/api/{table}/{id}",
            get(crud::get_by_id)
                .patch(crud::update_by_id)
                .delete(crud::delete_by_id),
        )
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// GET /api/health
async fn health() -> Response {
    envelope(
        StatusCode::OK,
        "OK",
        json!({ "service": "coursemart-api", "version": env!("CARGO_PKG_VERSION") }),
        None,
    )
}

async fn not_found() -> Response {
    envelope(
        StatusCode::NOT_FOUND,
        "Not found",
        Value::Null,
        Some("No such route".to_string()),
    )
}
