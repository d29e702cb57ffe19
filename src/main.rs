//! harp-environment server
//!
//! Usage:
//!   JWT_SECRET=... cargo run --bin harp_environment
//!   cargo run --bin load_data -- <data dir>    # optional sample rows
//!
//! Settings come from flags, environment variables or a `.env` file
//! (see `harp_environment::config::Settings`).

use std::sync::Arc;
use tokio::net::TcpListener;

use harp_environment::auth::TokenVerifier;
use harp_environment::config::Settings;
use harp_environment::logging;
use harp_environment::organization::OrganizationService;
use harp_environment::publisher::{EventPublisher, LogPublisher, RestProxyPublisher};
use harp_environment::rest::{create_router, AppState};
use harp_environment::storage::Storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load();
    let _log_guard = logging::init(&settings)?;

    let storage = if settings.in_memory {
        tracing::warn!("using in-memory environment store, data is lost on exit");
        Storage::temporary()?
    } else {
        Storage::open(&settings.data_dir)?
    };
    tracing::info!(environments = storage.len(), "environment store opened");

    let publisher: Arc<dyn EventPublisher> = match settings.kafka_rest_url.as_deref() {
        Some(url) => {
            tracing::info!(url, topic = %settings.environment_update_topic, "publishing through REST proxy");
            Arc::new(RestProxyPublisher::new(url, settings.upstream_timeout())?)
        }
        None => {
            tracing::warn!("KAFKA_REST_URL not set, environment events are only logged");
            Arc::new(LogPublisher)
        }
    };

    let organizations = OrganizationService::new(
        storage.clone(),
        &settings.scenarios_host,
        &settings.users_host,
        settings.upstream_timeout(),
    )?;

    let state = AppState::new(
        storage.clone(),
        publisher,
        organizations,
        TokenVerifier::new(&settings.jwt_secret),
        settings.environment_update_topic.clone(),
    );
    let app = create_router(state);

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "harp-environment listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.flush()?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
