//! Background purge of expired one-time codes

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::email::EmailSender;
use crate::state::AppState;
use crate::store::{DocumentStore, OtpStore};

/// Purge expired codes every `interval` until the runtime shuts down
pub fn spawn_otp_cleanup<D, O, E>(state: Arc<AppState<D, O, E>>, interval: Duration) -> JoinHandle<()>
where
    D: DocumentStore + 'static,
    O: OtpStore + 'static,
    E: EmailSender + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.otps.purge_expired() {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired OTPs"),
                Err(e) => tracing::warn!(error = %e, "OTP cleanup failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::email::ConsoleEmailSender;
    use crate::store::{InMemoryDocumentStore, InMemoryOtpStore};
    use crate::telegram::LoggingTelegramApi;
    use serde_json::Value;

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_purges_expired_codes() {
        let state = Arc::new(AppState::new(
            Config::default(),
            InMemoryDocumentStore::new(),
            InMemoryOtpStore::new(),
            ConsoleEmailSender::new(),
            Arc::new(LoggingTelegramApi),
        ));
        state
            .otps
            .store("a@x.io", "signup", "123456", Value::Null, chrono::Duration::seconds(-1))
            .unwrap();

        let handle = spawn_otp_cleanup(state.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(state.otps.purge_expired().unwrap(), 0);
        handle.abort();
    }
}
