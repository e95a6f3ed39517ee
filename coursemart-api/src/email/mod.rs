//! Email sending abstractions

pub mod console;
pub mod smtp;

pub use console::ConsoleEmailSender;
pub use smtp::{SmtpConfig, SmtpEmailSender};

/// Trait for sending one-time codes by email
pub trait EmailSender: Send + Sync {
    /// Send the code that confirms a new account
    fn send_signup_code(&self, email: &str, code: &str) -> Result<(), String>;

    /// Send the code that authorizes a password reset
    fn send_password_reset(&self, email: &str, code: &str) -> Result<(), String>;
}

/// Allow using Box<dyn EmailSender> as an EmailSender
impl EmailSender for Box<dyn EmailSender> {
    fn send_signup_code(&self, email: &str, code: &str) -> Result<(), String> {
        (**self).send_signup_code(email, code)
    }

    fn send_password_reset(&self, email: &str, code: &str) -> Result<(), String> {
        (**self).send_password_reset(email, code)
    }
}
