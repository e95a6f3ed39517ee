//! Razorpay checkout verification

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use coursemart_core::Table;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{respond, ApiJson};
use crate::crypto;
use crate::email::EmailSender;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::{DocumentStore, OtpStore};

const DEFAULT_CURRENCY: &str = "INR";

/// Fields posted back by Razorpay checkout, plus what was bought
#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    pub user: String,
    pub course: String,
    pub amount: Value,
    #[serde(default)]
    pub currency: Option<String>,
}

/// POST /api/payments/verify
/// Record a payment once its checkout signature is confirmed
pub async fn verify<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    ApiJson(req): ApiJson<VerifyPaymentRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let Some(secret) = state.config.razorpay_key_secret.as_deref() else {
        return Err(ApiError::Internal(
            "Payment verification is not configured".to_string(),
        ));
    };

    if !crypto::verify_payment_signature(
        &req.razorpay_order_id,
        &req.razorpay_payment_id,
        &req.razorpay_signature,
        secret,
    ) {
        tracing::warn!(
            order_id = %req.razorpay_order_id,
            payment_id = %req.razorpay_payment_id,
            "Payment signature mismatch"
        );
        return Err(ApiError::Validation("Invalid payment signature".to_string()));
    }

    let currency = req
        .currency
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let payment = state.query().create(
        Table::Payments,
        json!({
            "user": req.user,
            "course": req.course,
            "amount": req.amount,
            "currency": currency,
            "status": "captured",
            "orderId": req.razorpay_order_id,
            "paymentId": req.razorpay_payment_id,
        }),
    )?;

    tracing::info!(order_id = %req.razorpay_order_id, "Payment recorded");
    respond(StatusCode::CREATED, "Payment verified", payment)
}
