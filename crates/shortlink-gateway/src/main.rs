use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shortlink_gateway::auth::SessionSigner;
use shortlink_gateway::config::{Cli, Settings};
use shortlink_gateway::{telemetry, App, AppState};
use shortlink_shortener::{Base58Generator, ShortenerService};
use shortlink_storage::StorageBackend;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format)?;

    let settings = Settings::load(cli)?;
    info!(
        server_address = %settings.server_address,
        base_url = %settings.base_url,
        url_length = settings.url_length,
        delete_concurrency = settings.delete_concurrency,
        trusted_subnet = ?settings.trusted_subnet.map(|s| s.to_string()),
        "starting gateway"
    );

    let backend = StorageBackend::select(
        settings.database_dsn.as_deref(),
        settings.file_storage_path.as_deref(),
    );
    let repository = backend.open().await.context("failed to open storage")?;

    let signer = match settings.cookie_secret.as_deref() {
        Some(secret) => SessionSigner::new(secret.as_bytes()),
        None => SessionSigner::random(),
    }
    .map_err(|_| anyhow::anyhow!("invalid cookie secret"))?;

    let shortener = ShortenerService::new(
        Arc::clone(&repository),
        Base58Generator::new(settings.url_length),
        settings.delete_concurrency,
    );
    let state = AppState::new(
        shortener,
        signer,
        settings.base_url.clone(),
        settings.trusted_subnet,
    );
    let router = App::router(state, settings.request_timeout);

    let listener = tokio::net::TcpListener::bind(&settings.server_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.server_address))?;
    info!(listen_addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
