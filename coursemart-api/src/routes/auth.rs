//! Account endpoints: OTP-verified signup, login and password reset

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use coursemart_core::document::ID_FIELD;
use coursemart_core::{Document, Table};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{respond, ApiJson};
use crate::crypto::{self, Claims};
use crate::email::EmailSender;
use crate::error::{ApiError, ApiResult};
use crate::query::SecretHandling;
use crate::state::AppState;
use crate::store::{DocumentStore, OtpStore};

/// Minimum password length
const MIN_PASSWORD_LENGTH: usize = 8;
/// Maximum password length
const MAX_PASSWORD_LENGTH: usize = 80;

/// Role given to self-registered accounts
const DEFAULT_ROLE: &str = "user";

const INVALID_OTP: &str = "Invalid or expired OTP";

/// Data parked with an OTP until it is verified
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum OtpPayload {
    Signup {
        name: String,
        email: String,
        password_hash: String,
        phone: Option<String>,
    },
    PasswordReset {
        user_id: String,
    },
}

impl OtpPayload {
    const SIGNUP: &'static str = "signup";
    const PASSWORD_RESET: &'static str = "password_reset";

    /// Flow the code belongs to; matches the serde tag
    fn purpose(&self) -> &'static str {
        match self {
            OtpPayload::Signup { .. } => Self::SIGNUP,
            OtpPayload::PasswordReset { .. } => Self::PASSWORD_RESET,
        }
    }
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: Value,
}

fn normalize_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ApiError::Validation("A valid email is required".to_string())),
    }
}

fn check_password(password: &str) -> ApiResult<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password too short (minimum {} characters)",
            MIN_PASSWORD_LENGTH
        )));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password too long (maximum {} characters)",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn email_condition(email: &str) -> Map<String, Value> {
    let mut cond = Map::new();
    cond.insert("email".to_string(), Value::String(email.to_string()));
    cond
}

fn id_condition(id: &str) -> Map<String, Value> {
    let mut cond = Map::new();
    cond.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    cond
}

fn text_field<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.fields.get(field).and_then(Value::as_str)
}

/// Issue a token for a stored user and pair it with the public record
fn auth_response<D, O, E>(state: &AppState<D, O, E>, user: &Document) -> ApiResult<AuthResponse> {
    let email = text_field(user, "email").unwrap_or_default();
    let role = text_field(user, "role").unwrap_or(DEFAULT_ROLE);
    let claims = Claims::new(&user.id.to_string(), email, role, state.config.jwt_ttl());
    let token = crypto::issue_token(&claims, &state.config.jwt_secret)
        .map_err(|e| ApiError::Internal(format!("Failed to sign token: {}", e)))?;

    Ok(AuthResponse {
        token,
        user: user.to_public_json(Table::Users.schema()),
    })
}

/// Validate an `Authorization: Bearer` header
pub fn bearer_claims(headers: &HeaderMap, secret: &str) -> ApiResult<Claims> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    crypto::decode_token(token, secret).map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })
}

/// POST /api/auth/signup
/// Park the new account behind an emailed OTP
pub async fn signup<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let email = normalize_email(&req.email)?;
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("Name is required".to_string()));
    }
    check_password(&req.password)?;

    if state
        .query()
        .find_one_raw(Table::Users, email_condition(&email))?
        .is_some()
    {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = crypto::hash_password(&req.password, state.config.bcrypt_cost)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let payload = OtpPayload::Signup {
        name,
        email: email.clone(),
        password_hash,
        phone: req.phone.filter(|p| !p.trim().is_empty()),
    };
    let code = crypto::generate_otp_code();
    state.otps.store(
        &email,
        payload.purpose(),
        &code,
        serde_json::to_value(&payload)?,
        state.config.otp_ttl(),
    )?;

    state
        .email_sender
        .send_signup_code(&email, &code)
        .map_err(ApiError::Internal)?;

    tracing::info!(email = %email, "Signup OTP sent");
    respond(StatusCode::OK, "OTP sent", json!({ "email": email }))
}

/// POST /api/auth/verify-signup
/// Create the account once the OTP checks out
pub async fn verify_signup<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let email = normalize_email(&req.email)?;
    let payload = state
        .otps
        .verify(&email, OtpPayload::SIGNUP, req.otp.trim())?
        .ok_or_else(|| ApiError::Validation(INVALID_OTP.to_string()))?;

    let Ok(OtpPayload::Signup {
        name,
        email: _,
        password_hash,
        phone,
    }) = serde_json::from_value::<OtpPayload>(payload)
    else {
        return Err(ApiError::Validation(INVALID_OTP.to_string()));
    };

    let user = state.query().create_with(
        Table::Users,
        json!({
            "name": name,
            "email": email,
            "password": password_hash,
            "phone": phone,
            "role": DEFAULT_ROLE,
        }),
        SecretHandling::Preserve,
    )?;
    state.otps.delete_all(&email)?;

    tracing::info!(email = %email, user_id = %user.id, "Account created");
    respond(StatusCode::CREATED, "Account created", auth_response(&*state, &user)?)
}

/// POST /api/auth/login
pub async fn login<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());
    let email = normalize_email(&req.email).map_err(|_| invalid())?;

    let user = state
        .query()
        .find_one_raw(Table::Users, email_condition(&email))?
        .ok_or_else(invalid)?;
    let hash = text_field(&user, "password").ok_or_else(invalid)?;

    let valid = crypto::verify_password(&req.password, hash)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !valid {
        tracing::debug!(email = %email, "Login failed");
        return Err(invalid());
    }

    respond(StatusCode::OK, "Logged in", auth_response(&*state, &user)?)
}

/// POST /api/auth/forgot-password
pub async fn forgot_password<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let email = normalize_email(&req.email)?;
    let user = state
        .query()
        .find_one_raw(Table::Users, email_condition(&email))?
        .ok_or_else(|| ApiError::NotFound("No account with that email".to_string()))?;

    let payload = OtpPayload::PasswordReset {
        user_id: user.id.to_string(),
    };
    let code = crypto::generate_otp_code();
    state.otps.store(
        &email,
        payload.purpose(),
        &code,
        serde_json::to_value(&payload)?,
        state.config.otp_ttl(),
    )?;

    state
        .email_sender
        .send_password_reset(&email, &code)
        .map_err(ApiError::Internal)?;

    tracing::info!(email = %email, "Password reset OTP sent");
    respond(StatusCode::OK, "OTP sent", json!({ "email": email }))
}

/// POST /api/auth/reset-password
pub async fn reset_password<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let email = normalize_email(&req.email)?;
    check_password(&req.password)?;

    let payload = state
        .otps
        .verify(&email, OtpPayload::PASSWORD_RESET, req.otp.trim())?
        .ok_or_else(|| ApiError::Validation(INVALID_OTP.to_string()))?;
    let Ok(OtpPayload::PasswordReset { user_id }) = serde_json::from_value::<OtpPayload>(payload)
    else {
        return Err(ApiError::Validation(INVALID_OTP.to_string()));
    };

    let password_hash = crypto::hash_password(&req.password, state.config.bcrypt_cost)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut patch = Map::new();
    patch.insert("password".to_string(), Value::String(password_hash));

    let outcome = state
        .query()
        .update_raw(Table::Users, id_condition(&user_id), patch)?;
    if outcome.matched_count == 0 {
        return Err(ApiError::NotFound("Account no longer exists".to_string()));
    }
    state.otps.delete_all(&email)?;

    tracing::info!(email = %email, "Password reset");
    respond(StatusCode::OK, "Password updated", Value::Null)
}

/// GET /api/auth/me
pub async fn me<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    headers: HeaderMap,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let claims = bearer_claims(&headers, &state.config.jwt_secret)?;
    let user = state
        .query()
        .find_one(Table::Users, id_condition(&claims.sub))?
        .ok_or_else(|| ApiError::NotFound("Account no longer exists".to_string()))?;
    respond(StatusCode::OK, "OK", user)
}
