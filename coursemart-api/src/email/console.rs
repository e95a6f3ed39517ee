//! Console-based email sender for development

use super::EmailSender;

/// Email sender that logs codes instead of mailing them
pub struct ConsoleEmailSender;

impl ConsoleEmailSender {
    pub fn new() -> Self {
        Self
    }

    fn print_code(&self, heading: &str, email: &str, code: &str) {
        println!();
        println!("========================================");
        println!("  {} FOR: {}", heading, email);
        println!("  OTP: {}", code);
        println!("========================================");
        println!();
    }
}

impl Default for ConsoleEmailSender {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailSender for ConsoleEmailSender {
    fn send_signup_code(&self, email: &str, code: &str) -> Result<(), String> {
        self.print_code("SIGNUP CODE", email, code);
        tracing::info!(email = %email, "Signup code logged to console");
        Ok(())
    }

    fn send_password_reset(&self, email: &str, code: &str) -> Result<(), String> {
        self.print_code("PASSWORD RESET CODE", email, code);
        tracing::info!(email = %email, "Password reset code logged to console");
        Ok(())
    }
}
