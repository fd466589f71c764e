//! Shared per-process gateway state, threaded through every handler.

use std::{sync::Arc, time::Duration};

use {tokio::time::Instant, waygate_sessions::SessionRegistry};

/// Everything a request handler needs. No ambient globals — constructed
/// once at startup and passed through axum state.
pub struct AppState {
    pub registry: SessionRegistry,
    /// Inter-send delay for bulk dispatch.
    pub bulk_delay: Duration,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(registry: SessionRegistry, bulk_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry,
            bulk_delay,
            started_at: Instant::now(),
        })
    }

    /// Seconds since this process started serving.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
