//! In-process loopback provider.
//!
//! Stands in for the real network binding during tests and local
//! development: connections are plain channel endpoints, pairing is
//! completed programmatically, and every sent message is recorded.
//! Test code drives the lifecycle through [`LoopbackProvider::emit`] and
//! [`LoopbackProvider::complete_pairing`].

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use {
    async_trait::async_trait,
    rand::{Rng, distr::Alphanumeric},
    tokio::sync::mpsc,
    tracing::debug,
};

use crate::{
    CloseReason, ConnectionEvent, ConnectionProvider, Credentials, Identity, ProviderConnection,
    ProviderError,
};

/// A message accepted by a loopback connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub tenant_id: String,
    pub address: String,
    pub body: String,
}

#[derive(Default)]
struct LoopbackState {
    /// Event senders for currently-open connections, by tenant.
    links: Mutex<HashMap<String, mpsc::Sender<ConnectionEvent>>>,
    /// Normalized addresses whose sends are rejected.
    rejected: Mutex<HashSet<String>>,
    /// Remaining `open` calls that fail with a handshake error.
    failing_opens: AtomicU32,
    opens: AtomicU32,
    sent: Mutex<Vec<SentMessage>>,
}

/// Scriptable in-process [`ConnectionProvider`].
#[derive(Clone, Default)]
pub struct LoopbackProvider {
    state: Arc<LoopbackState>,
}

impl LoopbackProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` `open` calls fail with a handshake error.
    pub fn fail_next_opens(&self, n: u32) {
        self.state.failing_opens.store(n, Ordering::SeqCst);
    }

    /// Reject all future sends to a fully-qualified address.
    pub fn reject_address(&self, address: &str) {
        self.state
            .rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.to_string());
    }

    /// Number of `open` calls issued so far.
    pub fn open_count(&self) -> u32 {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Every message accepted so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state
            .sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Push a raw lifecycle event to a tenant's open connection. Returns
    /// false when the tenant has no connection.
    pub async fn emit(&self, tenant_id: &str, event: ConnectionEvent) -> bool {
        let tx = {
            let links = self.state.links.lock().unwrap_or_else(|e| e.into_inner());
            links.get(tenant_id).cloned()
        };
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Simulate the user scanning the pairing code: rotates credentials
    /// and opens the connection. Whether the tenant can later resume
    /// without pairing again is decided solely by the credentials the
    /// caller passes back to `open` — the provider keeps no identity of
    /// its own, so a purge genuinely starts the tenant over.
    pub async fn complete_pairing(&self, tenant_id: &str, identity: Identity) -> bool {
        let rotated = Credentials {
            material: serde_json::json!({ "paired": tenant_id }),
            identity: Some(identity.clone()),
        };
        self.emit(tenant_id, ConnectionEvent::CredentialsRotated(rotated))
            .await
            && self.emit(tenant_id, ConnectionEvent::Opened(identity)).await
    }
}

#[async_trait]
impl ConnectionProvider for LoopbackProvider {
    async fn open(
        &self,
        tenant_id: &str,
        credentials: Credentials,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn ProviderConnection>, ProviderError> {
        let failing = &self.state.failing_opens;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProviderError::Handshake("scripted failure".into()));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        self.state
            .links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tenant_id.to_string(), events.clone());

        // A registered tenant resumes straight into an open connection;
        // an unregistered one gets a pairing code to scan.
        let first_event = match credentials.identity {
            Some(identity) => ConnectionEvent::Opened(identity),
            None => ConnectionEvent::PairingCode(pairing_code()),
        };
        let _ = events.send(first_event).await;

        debug!(tenant = %tenant_id, "loopback connection opened");
        Ok(Arc::new(LoopbackConnection {
            tenant_id: tenant_id.to_string(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

struct LoopbackConnection {
    tenant_id: String,
    state: Arc<LoopbackState>,
    closed: AtomicBool,
}

impl LoopbackConnection {
    fn event_tx(&self) -> Option<mpsc::Sender<ConnectionEvent>> {
        self.state
            .links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&self.tenant_id)
            .cloned()
    }
}

#[async_trait]
impl ProviderConnection for LoopbackConnection {
    async fn send_text(&self, address: &str, body: &str) -> Result<String, ProviderError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::ConnectionClosed);
        }
        let rejected = self
            .state
            .rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(address);
        if rejected {
            return Err(ProviderError::SendRejected {
                address: address.to_string(),
                reason: "recipient not on network".into(),
            });
        }
        self.state
            .sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                tenant_id: self.tenant_id.clone(),
                address: address.to_string(),
                body: body.to_string(),
            });
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        if let Some(tx) = self.event_tx() {
            let _ = tx.send(ConnectionEvent::Closed(CloseReason::LoggedOut)).await;
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.state
            .links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.tenant_id);
    }
}

fn pairing_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<ConnectionEvent>, mpsc::Receiver<ConnectionEvent>) {
        mpsc::channel(16)
    }

    #[tokio::test]
    async fn unregistered_open_issues_pairing_code() {
        let provider = LoopbackProvider::new();
        let (tx, mut rx) = channel();
        provider
            .open("u1", Credentials::unregistered(), tx)
            .await
            .unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(ConnectionEvent::PairingCode(_))
        ));
    }

    #[tokio::test]
    async fn registered_open_resumes_live() {
        let provider = LoopbackProvider::new();
        let creds = Credentials {
            material: serde_json::json!({}),
            identity: Some(Identity {
                id: "55@net".into(),
                name: None,
            }),
        };
        let (tx, mut rx) = channel();
        provider.open("u1", creds, tx).await.unwrap();
        assert!(matches!(rx.recv().await, Some(ConnectionEvent::Opened(_))));
    }

    #[tokio::test]
    async fn reopen_without_credentials_pairs_from_scratch() {
        let provider = LoopbackProvider::new();
        let (tx, mut rx) = channel();
        let conn = provider
            .open("u1", Credentials::unregistered(), tx)
            .await
            .unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(ConnectionEvent::PairingCode(_))
        ));
        provider
            .complete_pairing("u1", Identity {
                id: "55@net".into(),
                name: None,
            })
            .await;
        conn.close().await;

        // Purged credentials mean a new pairing round — the provider must
        // not remember the old identity on its own.
        let (tx, mut rx) = channel();
        provider
            .open("u1", Credentials::unregistered(), tx)
            .await
            .unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(ConnectionEvent::PairingCode(_))
        ));
    }

    #[tokio::test]
    async fn scripted_open_failures_are_consumed() {
        let provider = LoopbackProvider::new();
        provider.fail_next_opens(1);
        let (tx, _rx) = channel();
        assert!(
            provider
                .open("u1", Credentials::unregistered(), tx.clone())
                .await
                .is_err()
        );
        assert!(
            provider
                .open("u1", Credentials::unregistered(), tx)
                .await
                .is_ok()
        );
        assert_eq!(provider.open_count(), 1);
    }

    #[tokio::test]
    async fn rejected_addresses_fail_sends() {
        let provider = LoopbackProvider::new();
        provider.reject_address("2@s.whatsapp.net");
        let (tx, _rx) = channel();
        let conn = provider
            .open("u1", Credentials::unregistered(), tx)
            .await
            .unwrap();
        assert!(conn.send_text("1@s.whatsapp.net", "hi").await.is_ok());
        assert!(matches!(
            conn.send_text("2@s.whatsapp.net", "hi").await,
            Err(ProviderError::SendRejected { .. })
        ));
        assert_eq!(provider.sent().len(), 1);
    }
}
