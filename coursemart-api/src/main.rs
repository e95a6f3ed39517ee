//! Coursemart API server

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursemart_api::{
    routes, spawn_otp_cleanup, AppState, Config, ConsoleEmailSender, DocumentStore, EmailSender,
    HttpTelegramApi, InMemoryDocumentStore, InMemoryOtpStore, LoggingTelegramApi, OtpStore,
    SmtpConfig, SmtpEmailSender, SqliteStore, TelegramApi,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursemart_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    tracing::info!(?config, "Loaded configuration");

    let email_sender: Box<dyn EmailSender> = match SmtpConfig::from_env() {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, "Sending email over SMTP");
            Box::new(SmtpEmailSender::new(smtp).map_err(anyhow::Error::msg)?)
        }
        None => {
            tracing::info!("SMTP is not configured, printing codes to the console");
            Box::new(ConsoleEmailSender::new())
        }
    };

    let telegram: Arc<dyn TelegramApi> = match config.telegram_bot_token.as_deref() {
        Some(token) => Arc::new(HttpTelegramApi::new(&config.telegram_api_base, token)?),
        None => {
            tracing::info!("TELEGRAM_BOT_TOKEN is not set, bot replies will only be logged");
            Arc::new(LoggingTelegramApi)
        }
    };

    match config.database_path.clone() {
        Some(path) => {
            let store = Arc::new(SqliteStore::open(&path)?);
            tracing::info!(path = %path, "Opened SQLite database");
            serve(config, store.clone(), store, email_sender, telegram).await
        }
        None => {
            tracing::warn!("DATABASE_PATH is not set, data will be lost on restart");
            serve(
                config,
                InMemoryDocumentStore::new(),
                InMemoryOtpStore::new(),
                email_sender,
                telegram,
            )
            .await
        }
    }
}

async fn serve<D, O, E>(
    config: Config,
    documents: D,
    otps: O,
    email_sender: E,
    telegram: Arc<dyn TelegramApi>,
) -> Result<()>
where
    D: DocumentStore + 'static,
    O: OtpStore + 'static,
    E: EmailSender + 'static,
{
    let addr = format!("0.0.0.0:{}", config.port);
    let cleanup_interval = Duration::from_secs(config.otp_cleanup_interval_secs.max(1));

    // Create app state
    let state = Arc::new(AppState::new(config, documents, otps, email_sender, telegram));
    let cleanup = spawn_otp_cleanup(state.clone(), cleanup_interval);

    // Create router
    let app = routes::create_router(state);

    // Start server
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Coursemart API listening on http://{}", addr);

    axum::serve(listener, app).await?;

    cleanup.abort();
    Ok(())
}
