//! Coursemart API
//!
//! REST backend for an online course marketplace: generic CRUD over a fixed
//! set of tables, OTP-verified accounts with JWT sessions, Razorpay payment
//! verification, resume parsing and a Telegram bot for listing products.

pub mod cleanup;
pub mod config;
pub mod crypto;
pub mod email;
pub mod error;
pub mod query;
pub mod routes;
pub mod state;
pub mod store;
pub mod telegram;

pub use cleanup::spawn_otp_cleanup;
pub use config::Config;
pub use email::{ConsoleEmailSender, EmailSender, SmtpConfig, SmtpEmailSender};
pub use error::{ApiError, ApiResult};
pub use query::QueryService;
pub use state::AppState;
pub use store::{DocumentStore, InMemoryDocumentStore, InMemoryOtpStore, OtpStore, SqliteStore};
pub use telegram::{HttpTelegramApi, LoggingTelegramApi, TelegramApi};
