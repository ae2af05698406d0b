//! Lesson bot - lesson authoring and quiz delivery over a chat transport
//!
//! Reads transport updates as JSON lines on stdin and writes outbound
//! operations as JSON lines on stdout.

mod callback;
mod config;
mod db;
mod quiz;
mod runtime;
mod session;
mod state_machine;
mod transport;

use config::BotConfig;
use db::Database;
use runtime::{Bot, Dispatcher};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{ConsoleTransport, Update};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout carries the transport
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lessonbot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = BotConfig::from_env();
    if config.admin_ids.is_empty() {
        tracing::warn!("No admins configured. Set LESSONBOT_ADMIN_IDS to enable authoring.");
    }

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let bot = Bot::new(config, Arc::new(db), Arc::new(ConsoleTransport::stdout()));
    let mut dispatcher = Dispatcher::new(Arc::new(bot));
    tracing::info!("Lesson bot ready, reading updates from stdin");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Update>(&line) {
            Ok(update) => dispatcher.dispatch(update).await,
            Err(e) => tracing::warn!(error = %e, "Ignoring undecodable update"),
        }
    }

    tracing::info!("Input closed, shutting down");
    dispatcher.shutdown().await;
    Ok(())
}
