//! Per-tenant session state.

use std::sync::Arc;

use {
    serde::Serialize,
    tokio::sync::{Mutex, RwLock},
    tracing::debug,
    waygate_provider::{Identity, ProviderConnection},
};

use crate::phase::Phase;

/// Mutable lifecycle state, guarded as one unit so phase and pairing code
/// always change together.
#[derive(Debug)]
struct SessionState {
    phase: Phase,
    pairing_code: Option<String>,
    identity: Option<Identity>,
}

/// Point-in-time view of a session, safe to hand to API handlers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub tenant_id: String,
    pub phase: Phase,
    pub pairing_code: Option<String>,
    pub identity: Option<Identity>,
}

/// One tenant's session: lifecycle state plus exclusive ownership of the
/// live provider connection, if any.
///
/// Phase transitions happen only through the `on_*` methods, and only the
/// lifecycle driver task calls them — one writer, serialized transitions.
pub struct SessionHandle {
    tenant_id: String,
    state: RwLock<SessionState>,
    connection: RwLock<Option<Arc<dyn ProviderConnection>>>,
    driver: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionHandle {
    pub(crate) fn new(tenant_id: &str) -> Arc<Self> {
        Arc::new(Self {
            tenant_id: tenant_id.to_string(),
            state: RwLock::new(SessionState {
                phase: Phase::Uninitialized,
                pairing_code: None,
                identity: None,
            }),
            connection: RwLock::new(None),
            driver: Mutex::new(None),
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub async fn phase(&self) -> Phase {
        self.state.read().await.phase
    }

    pub async fn pairing_code(&self) -> Option<String> {
        self.state.read().await.pairing_code.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            tenant_id: self.tenant_id.clone(),
            phase: state.phase,
            pairing_code: state.pairing_code.clone(),
            identity: state.identity.clone(),
        }
    }

    /// The live connection, if one has been established.
    pub async fn connection(&self) -> Option<Arc<dyn ProviderConnection>> {
        self.connection.read().await.clone()
    }

    // ── Transitions (driver task only) ──────────────────────────────────

    pub(crate) async fn on_pairing_code(&self, code: String) {
        let mut state = self.state.write().await;
        state.phase = Phase::PairingPending;
        state.pairing_code = Some(code);
        debug!(tenant = %self.tenant_id, "pairing code issued");
    }

    pub(crate) async fn on_authenticated(&self, identity: Identity) {
        let mut state = self.state.write().await;
        state.phase = Phase::Authenticated;
        state.pairing_code = None;
        state.identity = Some(identity);
    }

    pub(crate) async fn on_opened(&self, identity: Identity) {
        let mut state = self.state.write().await;
        state.phase = Phase::Live;
        state.pairing_code = None;
        state.identity = Some(identity);
        debug!(tenant = %self.tenant_id, "connection live");
    }

    pub(crate) async fn on_disconnected(&self) {
        let mut state = self.state.write().await;
        state.phase = Phase::Disconnected;
        state.pairing_code = None;
    }

    pub(crate) async fn on_logged_out(&self) {
        let mut state = self.state.write().await;
        state.phase = Phase::LoggedOut;
        state.pairing_code = None;
        state.identity = None;
    }

    pub(crate) async fn on_error(&self) {
        let mut state = self.state.write().await;
        state.phase = Phase::Error;
        state.pairing_code = None;
    }

    // ── Connection & driver plumbing ────────────────────────────────────

    pub(crate) async fn set_connection(&self, conn: Arc<dyn ProviderConnection>) {
        *self.connection.write().await = Some(conn);
    }

    pub(crate) async fn take_connection(&self) -> Option<Arc<dyn ProviderConnection>> {
        self.connection.write().await.take()
    }

    pub(crate) async fn set_driver(&self, handle: tokio::task::JoinHandle<()>) {
        *self.driver.lock().await = Some(handle);
    }

    /// Tear the session down from outside the driver: stop the driver
    /// task, then close the connection gracefully.
    pub(crate) async fn shutdown(&self) {
        if let Some(handle) = self.driver.lock().await.take() {
            handle.abort();
        }
        if let Some(conn) = self.take_connection().await {
            conn.close().await;
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}
