//! LeetAid - small hints for big breakthroughs
//!
//! A single-session chat client: paste code, send it with the conversation so
//! far to a hint endpoint, and keep the transcript across restarts.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod terminal;

use crate::config::Config;
use crate::core::{open_store, SessionController};
use crate::providers::HttpClient;
use crate::terminal::TranscriptPrinter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leetaid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;

    let store = open_store(&config.db_path(), &config.storage_key, config.ephemeral).await;

    let client = Arc::new(HttpClient::new(config.api_url.clone()));
    let controller = Arc::new(SessionController::new(store, client));

    let printer = controller.subscribe(Arc::new(TranscriptPrinter::new()));
    controller.initialize().await;

    tracing::info!(endpoint = %config.api_url, "LeetAid ready");
    let result = terminal::run(controller.clone()).await;

    // A reply still in flight should not print over the shell prompt
    controller.unsubscribe(printer);
    result
}
