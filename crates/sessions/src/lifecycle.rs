//! Lifecycle driver: one task per session consuming the provider's event
//! stream and applying phase transitions.
//!
//! Transition table (event → phase):
//! - pairing code issued → `PairingPending` (code stored, reissue replaces)
//! - opened → `Live` (code cleared, identity stored)
//! - closed, logged out → `LoggedOut`, terminal: evict + credential purge
//! - closed, transient → `Disconnected`, then a bounded reconnect loop
//! - closed, unrecognized → `Disconnected`, a single reconnect attempt
//! - construction failure → `Error`, retried with a fixed delay up to the
//!   policy's attempt limit
//!
//! A single consumer per session keeps transitions serialized; there is no
//! recursion — reconnection is an explicit loop with a bounded attempt
//! count.

use std::sync::{Arc, Weak};

use {
    tokio::sync::mpsc,
    tracing::{info, warn},
    waygate_provider::{CloseReason, ConnectionEvent},
};

use crate::{registry::RegistryInner, session::SessionHandle};

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Entry point for the per-session driver task.
pub(crate) async fn drive(registry: Weak<RegistryInner>, session: Arc<SessionHandle>) {
    let mut events = match connect(&registry, &session, None).await {
        Some(rx) => rx,
        None => return,
    };

    loop {
        let reconnect_attempts = match events.recv().await {
            Some(ConnectionEvent::PairingCode(code)) => {
                session.on_pairing_code(code).await;
                continue;
            },
            Some(ConnectionEvent::Opened(identity)) => {
                session.on_opened(identity).await;
                continue;
            },
            Some(ConnectionEvent::CredentialsRotated(creds)) => {
                if let Some(reg) = registry.upgrade()
                    && let Err(e) = reg.credentials.save(session.tenant_id(), &creds).await
                {
                    warn!(tenant = %session.tenant_id(), error = %e, "failed to persist rotated credentials");
                }
                continue;
            },
            Some(ConnectionEvent::Closed(CloseReason::LoggedOut)) => {
                terminal_logout(&registry, &session).await;
                return;
            },
            // A dropped sender means the provider tore the connection down
            // without classifying it; treat like a transient close.
            Some(ConnectionEvent::Closed(CloseReason::ConnectionClosed)) | None => None,
            Some(ConnectionEvent::Closed(CloseReason::Other(reason))) => {
                warn!(tenant = %session.tenant_id(), %reason, "connection closed for unrecognized reason");
                Some(1)
            },
        };

        session.on_disconnected().await;
        // Drop the stale handle before dialing again.
        let _ = session.take_connection().await;

        match connect(&registry, &session, reconnect_attempts).await {
            Some(rx) => events = rx,
            None => return,
        }
    }
}

/// Load credentials and open a provider connection, retrying with the
/// policy's fixed delay. Returns the event receiver for the new
/// connection, or `None` when attempts are exhausted (session is left in
/// its failure phase) or the session was evicted meanwhile.
async fn connect(
    registry: &Weak<RegistryInner>,
    session: &Arc<SessionHandle>,
    attempts_override: Option<u32>,
) -> Option<mpsc::Receiver<ConnectionEvent>> {
    let reg = registry.upgrade()?;
    let tenant = session.tenant_id();
    let max_attempts = attempts_override
        .unwrap_or(reg.reconnect.max_attempts)
        .max(1);

    for attempt in 1..=max_attempts {
        if !reg.sessions.contains_key(tenant) {
            // Evicted while we were (re)connecting.
            return None;
        }

        let creds = match reg.credentials.load(tenant).await {
            Ok(creds) => creds,
            Err(e) => {
                warn!(tenant = %tenant, attempt, error = %e, "credential load failed");
                session.on_error().await;
                if attempt < max_attempts {
                    tokio::time::sleep(reg.reconnect.retry_delay).await;
                }
                continue;
            },
        };
        let known_identity = creds.identity.clone();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        match reg.provider.open(tenant, creds, tx).await {
            Ok(conn) => {
                session.set_connection(conn).await;
                if let Some(identity) = known_identity {
                    // Identity known from stored material; phase moves to
                    // Live once the provider reports the socket open.
                    session.on_authenticated(identity).await;
                }
                info!(tenant = %tenant, attempt, "provider connection established");
                return Some(rx);
            },
            Err(e) => {
                warn!(tenant = %tenant, attempt, error = %e, "provider connection failed");
                session.on_error().await;
                if attempt < max_attempts {
                    tokio::time::sleep(reg.reconnect.retry_delay).await;
                }
            },
        }
    }

    warn!(tenant = %tenant, attempts = max_attempts, "giving up on connection");
    None
}

/// The one terminal transition: the user revoked the pairing. The session
/// leaves the registry entirely and stored credentials are purged, so a
/// later request starts fresh.
async fn terminal_logout(registry: &Weak<RegistryInner>, session: &Arc<SessionHandle>) {
    session.on_logged_out().await;
    let _ = session.take_connection().await;

    if let Some(reg) = registry.upgrade() {
        reg.sessions.remove(session.tenant_id());
        if let Err(e) = reg.credentials.purge(session.tenant_id()).await {
            warn!(tenant = %session.tenant_id(), error = %e, "credential purge after logout failed");
        }
    }
    info!(tenant = %session.tenant_id(), "logged out; session evicted");
}
