//! Tests for OTP signup, login and password reset

mod common;

use common::{create_test_app, create_user};
use serde_json::{json, Value};

#[tokio::test]
async fn test_signup_verify_login_me() {
    let app = create_test_app();
    let (token, id) = create_user(&app, "new@example.com", "correct-horse").await;
    assert!(!token.is_empty());

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "New@Example.com ", "password": "correct-horse" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    let token = body["data"]["token"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["user"]["_id"], id);
    assert!(body["data"]["user"].get("password").is_none());

    let response = app
        .server
        .get("/api/auth/me")
        .authorization_bearer(&token)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"]["email"], "new@example.com");
    assert_eq!(body["data"]["role"], "user");
}

#[tokio::test]
async fn test_signup_does_not_create_user_before_verification() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/auth/signup")
        .json(&json!({ "name": "Pending", "email": "p@example.com", "password": "long-enough" }))
        .await;
    assert_eq!(response.status_code(), 200);

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "p@example.com", "password": "long-enough" }))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn test_signup_rejects_short_and_long_passwords() {
    let app = create_test_app();

    for password in ["short", &"x".repeat(81)] {
        let response = app
            .server
            .post("/api/auth/signup")
            .json(&json!({ "name": "A", "email": "a@example.com", "password": password }))
            .await;
        assert_eq!(response.status_code(), 400);
    }
    assert!(app.email_sender.get_code("a@example.com").is_none());
}

#[tokio::test]
async fn test_signup_existing_email_conflicts() {
    let app = create_test_app();
    create_user(&app, "taken@example.com", "password-one").await;

    let response = app
        .server
        .post("/api/auth/signup")
        .json(&json!({ "name": "B", "email": "TAKEN@example.com", "password": "password-two" }))
        .await;
    assert_eq!(response.status_code(), 409);
}

#[tokio::test]
async fn test_otp_is_single_use() {
    let app = create_test_app();
    let email = "once@example.com";

    app.server
        .post("/api/auth/signup")
        .json(&json!({ "name": "Once", "email": email, "password": "password-one" }))
        .await;
    let code = app.email_sender.get_code(email).unwrap();

    let response = app
        .server
        .post("/api/auth/verify-signup")
        .json(&json!({ "email": email, "otp": code }))
        .await;
    assert_eq!(response.status_code(), 201);

    let response = app
        .server
        .post("/api/auth/verify-signup")
        .json(&json!({ "email": email, "otp": code }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_wrong_otp_is_rejected() {
    let app = create_test_app();
    let email = "wrong@example.com";

    app.server
        .post("/api/auth/signup")
        .json(&json!({ "name": "W", "email": email, "password": "password-one" }))
        .await;
    let code = app.email_sender.get_code(email).unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let response = app
        .server
        .post("/api/auth/verify-signup")
        .json(&json!({ "email": email, "otp": wrong }))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "Invalid or expired OTP");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = create_test_app();
    create_user(&app, "user@example.com", "right-password").await;

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "user@example.com", "password": "wrong-password" }))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn test_me_requires_valid_token() {
    let app = create_test_app();

    let response = app.server.get("/api/auth/me").await;
    assert_eq!(response.status_code(), 401);

    let response = app
        .server
        .get("/api/auth/me")
        .authorization_bearer("not-a-jwt")
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = create_test_app();
    let email = "reset@example.com";
    create_user(&app, email, "old-password").await;

    let response = app
        .server
        .post("/api/auth/forgot-password")
        .json(&json!({ "email": email }))
        .await;
    assert_eq!(response.status_code(), 200);
    let code = app.email_sender.get_code(email).unwrap();

    let response = app
        .server
        .post("/api/auth/reset-password")
        .json(&json!({ "email": email, "otp": code, "password": "new-password" }))
        .await;
    assert_eq!(response.status_code(), 200);

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": email, "password": "old-password" }))
        .await;
    assert_eq!(response.status_code(), 401);

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": email, "password": "new-password" }))
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_signup_otp_cannot_reset_password() {
    let app = create_test_app();
    let email = "mixed@example.com";

    app.server
        .post("/api/auth/signup")
        .json(&json!({ "name": "M", "email": email, "password": "password-one" }))
        .await;
    let code = app.email_sender.get_code(email).unwrap();

    let response = app
        .server
        .post("/api/auth/reset-password")
        .json(&json!({ "email": email, "otp": code, "password": "password-two" }))
        .await;
    assert_eq!(response.status_code(), 400);

    // The misdirected attempt did not use up the signup code
    let response = app
        .server
        .post("/api/auth/verify-signup")
        .json(&json!({ "email": email, "otp": code }))
        .await;
    assert_eq!(response.status_code(), 201);
}

#[tokio::test]
async fn test_reset_otp_survives_signup_verification_attempt() {
    let app = create_test_app();
    let email = "crossed@example.com";
    create_user(&app, email, "old-password").await;

    app.server
        .post("/api/auth/forgot-password")
        .json(&json!({ "email": email }))
        .await;
    let code = app.email_sender.get_code(email).unwrap();

    let response = app
        .server
        .post("/api/auth/verify-signup")
        .json(&json!({ "email": email, "otp": code }))
        .await;
    assert_eq!(response.status_code(), 400);

    let response = app
        .server
        .post("/api/auth/reset-password")
        .json(&json!({ "email": email, "otp": code, "password": "new-password" }))
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_forgot_password_unknown_email() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/auth/forgot-password")
        .json(&json!({ "email": "nobody@example.com" }))
        .await;
    assert_eq!(response.status_code(), 404);
}
