//! clinic-auth server

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use clinic_auth::prelude::*;
use clinic_auth::{config::SessionSettings, observability};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init()?;

    let config = ClinicAuthConfig::load().context("failed to load configuration")?;
    if config
        .oauth2
        .get_provider(OAuthProvider::Google)
        .client_id()
        .is_none()
    {
        tracing::warn!("GOOGLE_CLIENT_ID is not set; login requests will fail until it is");
    }
    if config.request_timeout_too_short() {
        tracing::warn!(
            request_timeout_ms = config.server.request_timeout_ms,
            provider_timeout_ms = config.oauth2.google.timeout_ms,
            "Request timeout is shorter than two provider calls; slow callbacks will fail with 500"
        );
    }

    let sessions = session_store(&config.session)?;
    let state = AppState::with_store(config.clone(), sessions)?;
    let app = router(&state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        %addr,
        base_path = %config.server.normalized_base_path(),
        "Starting server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Redis when configured, otherwise in-memory with a periodic expiry sweep
fn session_store(settings: &SessionSettings) -> Result<Arc<dyn SessionStore>> {
    #[cfg(feature = "redis")]
    if let Some(url) = settings.redis_url.as_deref().filter(|u| !u.trim().is_empty()) {
        let store = RedisSessionStore::from_url(url).context("invalid session redis_url")?;
        tracing::info!("Using Redis session store");
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "redis"))]
    if settings.redis_url.is_some() {
        tracing::warn!("redis_url is set but the redis feature is disabled; using memory sessions");
    }

    let store = Arc::new(MemorySessionStore::new());
    if settings.sweep_interval_secs > 0 {
        spawn_sweeper(
            Arc::clone(&store),
            Duration::from_secs(settings.sweep_interval_secs),
        );
    }
    tracing::info!("Using in-memory session store");
    Ok(store)
}

fn spawn_sweeper(store: Arc<MemorySessionStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, remaining = store.len(), "Expired sessions purged");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
