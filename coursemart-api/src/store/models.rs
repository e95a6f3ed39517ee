//! Data models for auxiliary storage

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// A one-time password awaiting verification
#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub id: Uuid,
    /// Lower-cased address the code was sent to
    pub email: String,
    /// Flow the code was issued for, e.g. `signup`
    pub purpose: String,
    pub code: String,
    /// Data restored once the code is verified
    pub payload: Value,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl OtpRecord {
    pub fn new(
        email: &str,
        purpose: &str,
        code: &str,
        payload: Value,
        ttl: chrono::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            purpose: purpose.to_string(),
            code: code.to_string(),
            payload,
            expires_at: now + ttl,
            verified: false,
            created_at: now,
        }
    }

    /// Whether `code` verifies this record for `purpose` at time `now`
    pub fn accepts(&self, purpose: &str, code: &str, now: DateTime<Utc>) -> bool {
        !self.verified && self.purpose == purpose && self.code == code && self.expires_at > now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
