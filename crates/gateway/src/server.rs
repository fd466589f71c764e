//! Router construction and server startup.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        routing::{get, post},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
    waygate_config::WaygateConfig,
    waygate_provider::{ConnectionProvider, FsCredentialStore},
    waygate_sessions::{ReconnectPolicy, SessionRegistry},
};

use crate::{api, state::AppState};

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/qr/{tenant_id}", get(api::qr_handler))
        .route("/api/status/{tenant_id}", get(api::status_handler))
        .route("/api/send", post(api::send_handler))
        .route("/api/bulk-send", post(api::bulk_send_handler))
        .route("/api/logout", post(api::logout_handler))
        .route("/health", get(api::health_handler))
        .fallback(api::fallback_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server and run until a shutdown signal arrives.
pub async fn start_gateway(
    config: WaygateConfig,
    provider: Arc<dyn ConnectionProvider>,
) -> anyhow::Result<()> {
    let store = Arc::new(FsCredentialStore::new(&config.credentials.dir));
    let registry = SessionRegistry::new(provider, store, ReconnectPolicy {
        retry_delay: Duration::from_millis(config.reconnect.retry_delay_ms),
        max_attempts: config.reconnect.max_attempts,
    });

    let state = AppState::new(
        registry.clone(),
        Duration::from_millis(config.dispatch.bulk_delay_ms),
    );
    let app = build_gateway_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "waygate gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Close live connections before the process exits; credentials are the
    // only state that survives a restart.
    registry.shutdown().await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
