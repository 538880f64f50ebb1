//! Relay Server - Main Entry Point

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use relay_server::crypto::KeyVault;
use relay_server::db::{self, PgTenantStore, TenantStore};
use relay_server::engine::{EngineConfig, EventEngine};
use relay_server::media::{MediaStore, S3MediaStore};
use relay_server::preview::LinkPreviewer;
use relay_server::tenants::TenantRegistry;
use relay_server::webhooks::WebhookDispatcher;
use relay_server::{api, config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        format = %config.webhook_format,
        "Starting Relay Server"
    );

    let db_pool = db::create_pool(&config.database_url).await?;
    let store: Arc<dyn TenantStore> = Arc::new(PgTenantStore::new(db_pool));

    // Media falls back to base64 without an S3 endpoint
    let media_store: Option<Arc<dyn MediaStore>> = if config.has_s3() {
        Some(Arc::new(S3MediaStore::new(&config)))
    } else {
        info!("S3_ENDPOINT not set, media delivered as base64 only");
        None
    };

    let vault = Arc::new(KeyVault::new(config.global_encryption_key.as_deref()));
    if !vault.is_configured() {
        warn!("GLOBAL_ENCRYPTION_KEY not set, webhooks will be sent unsigned");
    }

    let registry = Arc::new(TenantRegistry::new(config.registry()));

    let preview_config = config.preview();
    let preview_deadline = preview_config.fetch_timeout;
    let previewer = LinkPreviewer::new(preview_config, Arc::clone(&registry))
        .context("Failed to build link preview client")?;
    let sweeper = previewer.cache().spawn_sweeper();

    let dispatcher = WebhookDispatcher::new(
        vault,
        Arc::clone(&registry),
        config.webhook_format,
        config.webhook_timeout(),
    )
    .context("Failed to build webhook client")?;

    let engine = EventEngine::new(
        store,
        registry,
        previewer,
        dispatcher,
        media_store,
        EngineConfig {
            preview_deadline,
            global_webhook_url: config.global_webhook_url.clone(),
        },
    );

    let app = api::create_router(api::AppState::new(Arc::new(engine)));

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    sweeper.abort();
    info!("Server shutdown complete");

    Ok(())
}
