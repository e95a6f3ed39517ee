//! Common test utilities for API integration tests

#![allow(dead_code)]

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum_test::TestServer;
use coursemart_api::telegram::TelegramError;
use coursemart_api::{
    routes, AppState, Config, EmailSender, InMemoryDocumentStore, InMemoryOtpStore, TelegramApi,
};
use serde_json::{json, Value};

pub const WEBHOOK_SECRET: &str = "hook-secret";
pub const RAZORPAY_SECRET: &str = "rzp-test-secret";

pub type TestState = AppState<InMemoryDocumentStore, InMemoryOtpStore, MockEmailSender>;

/// Mock email sender that captures one-time codes
#[derive(Default, Clone)]
pub struct MockEmailSender {
    /// Captured (email, code) pairs
    pub sent: Arc<RwLock<Vec<(String, String)>>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the last code sent to an email
    pub fn get_code(&self, email: &str) -> Option<String> {
        self.sent
            .read()
            .unwrap()
            .iter()
            .rev()
            .find(|(e, _)| e == email)
            .map(|(_, c)| c.clone())
    }

    fn record(&self, email: &str, code: &str) -> Result<(), String> {
        self.sent
            .write()
            .unwrap()
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}

impl EmailSender for MockEmailSender {
    fn send_signup_code(&self, email: &str, code: &str) -> Result<(), String> {
        self.record(email, code)
    }

    fn send_password_reset(&self, email: &str, code: &str) -> Result<(), String> {
        self.record(email, code)
    }
}

/// Mock Bot API that records replies and serves fixed file contents
#[derive(Default, Clone)]
pub struct MockTelegram {
    /// Captured (chat id, text) pairs
    pub sent: Arc<RwLock<Vec<(i64, String)>>>,
}

impl MockTelegram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last reply sent to a chat
    pub fn last_reply(&self, chat_id: i64) -> Option<String> {
        self.sent
            .read()
            .unwrap()
            .iter()
            .rev()
            .find(|(c, _)| *c == chat_id)
            .map(|(_, t)| t.clone())
    }
}

#[async_trait]
impl TelegramApi for MockTelegram {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        self.sent.write().unwrap().push((chat_id, text.to_string()));
        // Suspend like a network call would, so concurrent updates can interleave
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn file_path(&self, file_id: &str) -> Result<String, TelegramError> {
        tokio::task::yield_now().await;
        if file_id.starts_with("missing") {
            return Err(TelegramError::Request(format!("file {} not found", file_id)));
        }
        Ok(format!("photos/{}.jpg", file_id))
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        self.file_path(file_id).await?;
        Ok(format!("contents of {}", file_id).into_bytes())
    }
}

/// Everything a test needs to drive the service and inspect side effects
pub struct TestApp {
    pub server: TestServer,
    pub email_sender: MockEmailSender,
    pub telegram: MockTelegram,
    pub state: Arc<TestState>,
}

pub fn test_config() -> Config {
    Config {
        jwt_secret: "test-secret".to_string(),
        bcrypt_cost: 4,
        max_page_size: 50,
        telegram_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        razorpay_key_secret: Some(RAZORPAY_SECRET.to_string()),
        ..Config::default()
    }
}

/// Create a test server over in-memory stores
pub fn create_test_app() -> TestApp {
    create_test_app_with(test_config())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    let telegram = MockTelegram::new();
    build_test_app(config, telegram.clone(), Arc::new(telegram))
}

/// Create a test server talking to the given Bot API client instead of the mock
pub fn create_test_app_with_telegram(config: Config, api: Arc<dyn TelegramApi>) -> TestApp {
    build_test_app(config, MockTelegram::new(), api)
}

fn build_test_app(config: Config, telegram: MockTelegram, api: Arc<dyn TelegramApi>) -> TestApp {
    let email_sender = MockEmailSender::new();

    let state = Arc::new(AppState::new(
        config,
        InMemoryDocumentStore::new(),
        InMemoryOtpStore::new(),
        email_sender.clone(),
        api,
    ));

    let app = routes::create_router(state.clone());
    let server = TestServer::new(app).expect("Failed to create test server");

    TestApp {
        server,
        email_sender,
        telegram,
        state,
    }
}

/// Sign up and verify an account, returning (token, user id)
pub async fn create_user(app: &TestApp, email: &str, password: &str) -> (String, String) {
    let response = app
        .server
        .post("/api/auth/signup")
        .json(&json!({ "name": "Test User", "email": email, "password": password }))
        .await;
    assert_eq!(response.status_code(), 200);

    let code = app.email_sender.get_code(email).expect("No OTP sent");

    let response = app
        .server
        .post("/api/auth/verify-signup")
        .json(&json!({ "email": email, "otp": code }))
        .await;
    assert_eq!(response.status_code(), 201);

    let body: Value = response.json();
    let token = body["data"]["token"].as_str().expect("No token").to_string();
    let id = body["data"]["user"]["_id"].as_str().expect("No id").to_string();
    (token, id)
}

/// Create a record through the API and return its id
pub async fn create_record(app: &TestApp, table: &str, payload: Value) -> String {
    let response = app
        .server
        .post(&format!("/api/{}", table))
        .json(&payload)
        .await;
    assert_eq!(response.status_code(), 201, "create {} failed", table);
    let body: Value = response.json();
    body["data"]["_id"].as_str().expect("No id").to_string()
}
