//! Cryptographic utilities for the service

use chrono::Utc;
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hash a password with bcrypt at the given cost
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Verify a password against a bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(password, hash)
}

/// Generate a random 6-digit one-time code
pub fn generate_otp_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(100000..1000000);
    code.to_string()
}

/// Session token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: String,
    /// Expiry, seconds since the epoch
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: &str, email: &str, role: &str, ttl: chrono::Duration) -> Self {
        Self {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        }
    }
}

/// Sign claims into an HS256 token
pub fn issue_token(claims: &Claims, secret: &str) -> jsonwebtoken::errors::Result<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Check a token's signature and expiry
pub fn decode_token(token: &str, secret: &str) -> jsonwebtoken::errors::Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Verify a Razorpay checkout signature: hex HMAC-SHA256 of
/// `"{order_id}|{payment_id}"` keyed with the account secret.
/// The comparison runs in constant time.
pub fn verify_payment_signature(
    order_id: &str,
    payment_id: &str,
    signature: &str,
    secret: &str,
) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Hex signature for an order/payment pair, as Razorpay computes it
pub fn payment_signature(order_id: &str, payment_id: &str, secret: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Compare a presented secret with the configured one in constant time.
/// Both sides are MACed under the expected secret so lengths leak nothing.
pub fn secret_matches(given: &str, expected: &str) -> bool {
    let Ok(mut reference) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    reference.update(expected.as_bytes());
    let reference = reference.finalize().into_bytes();

    let Ok(mut mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    mac.update(given.as_bytes());
    mac.verify_slice(&reference).is_ok()
}
