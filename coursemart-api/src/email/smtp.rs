//! SMTP email sender

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::EmailSender;

/// Port that implies STARTTLS rather than implicit TLS
const STARTTLS_PORT: u16 = 587;

/// Configuration for SMTP email sending
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    /// 465 for implicit TLS, 587 for STARTTLS
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .finish()
    }
}

impl SmtpConfig {
    /// Read `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD` and
    /// `SMTP_FROM_EMAIL` (all required), plus `SMTP_PORT` (default 465) and
    /// `SMTP_FROM_NAME` (default "Coursemart"). Returns `None` when any
    /// required variable is missing.
    pub fn from_env() -> Option<Self> {
        fn get_env(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|s| !s.is_empty())
        }

        Some(Self {
            host: get_env("SMTP_HOST")?,
            username: get_env("SMTP_USERNAME")?,
            password: get_env("SMTP_PASSWORD")?,
            from_email: get_env("SMTP_FROM_EMAIL")?,
            port: get_env("SMTP_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(465),
            from_name: get_env("SMTP_FROM_NAME").unwrap_or_else(|| "Coursemart".to_string()),
        })
    }

    /// Sender mailbox built from the configured name and address
    pub fn mailbox(&self) -> Result<Mailbox, String> {
        let address = self
            .from_email
            .parse()
            .map_err(|e| format!("Invalid from address: {}", e))?;
        Ok(Mailbox::new(Some(self.from_name.clone()), address))
    }
}

/// Email sender backed by an SMTP relay
pub struct SmtpEmailSender {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// Connect to the relay and check that it accepts us
    pub fn new(config: SmtpConfig) -> Result<Self, String> {
        let from = config.mailbox()?;
        let builder = if config.port == STARTTLS_PORT {
            SmtpTransport::starttls_relay(&config.host)
        } else {
            SmtpTransport::relay(&config.host)
        }
        .map_err(|e| format!("Failed to create SMTP transport: {}", e))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();

        transport
            .test_connection()
            .map_err(|e| format!("SMTP connection test failed: {}", e))?;

        tracing::info!(host = %config.host, port = config.port, "SMTP connection established");

        Ok(Self { transport, from })
    }

    fn send(&self, to: &str, subject: &str, body: String) -> Result<(), String> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| format!("Invalid recipient {}: {}", to, e))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| format!("Failed to build email: {}", e))?;

        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| format!("Failed to send email: {}", e))
    }
}

impl EmailSender for SmtpEmailSender {
    fn send_signup_code(&self, email: &str, code: &str) -> Result<(), String> {
        self.send(
            email,
            "Confirm your Coursemart account",
            format!(
                "Welcome to Coursemart!\n\n\
                 Your one-time code is: {}\n\n\
                 It expires in a few minutes. If you did not sign up, ignore this email.",
                code
            ),
        )?;
        tracing::info!(email = %email, "Signup email sent");
        Ok(())
    }

    fn send_password_reset(&self, email: &str, code: &str) -> Result<(), String> {
        self.send(
            email,
            "Reset your Coursemart password",
            format!(
                "Your password reset code is: {}\n\n\
                 Enter it with your new password. If you did not ask for a reset, \
                 your password is unchanged and you can ignore this email.",
                code
            ),
        )?;
        tracing::info!(email = %email, "Password reset email sent");
        Ok(())
    }
}
