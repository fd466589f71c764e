//! Connection provider seam.
//!
//! The gateway never speaks the messaging network's wire protocol itself.
//! Everything network-facing goes through the [`ConnectionProvider`] trait:
//! open a connection for a tenant, receive lifecycle events on a channel,
//! send text through the returned [`ProviderConnection`]. Credential
//! material is read and written through [`CredentialStore`].
//!
//! `loopback` contains an in-process provider used by tests and local
//! development; a real network binding implements the same traits.

pub mod credentials;
pub mod loopback;

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    thiserror::Error,
    tokio::sync::mpsc,
};

pub use credentials::{CredentialStore, FsCredentialStore};

/// Address suffix appended to bare phone numbers when building a network
/// address.
pub const NETWORK_SUFFIX: &str = "@s.whatsapp.net";

// ── Credentials & identity ───────────────────────────────────────────────────

/// Identity the network reports for a tenant once pairing has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Network-assigned account id.
    pub id: String,
    /// Display name, if the network knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Per-tenant key material. The `material` blob is opaque to the gateway —
/// it is issued by the provider during pairing and handed back verbatim on
/// every reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub material: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

impl Credentials {
    /// Fresh credentials for a tenant that has never paired.
    pub fn unregistered() -> Self {
        Self {
            material: serde_json::Value::Null,
            identity: None,
        }
    }

    /// Whether this material has completed pairing at least once.
    pub fn is_registered(&self) -> bool {
        self.identity.is_some()
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Why the provider closed a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The user revoked the pairing on their device. Terminal.
    LoggedOut,
    /// Transient transport-level close.
    ConnectionClosed,
    /// Anything the provider could not classify.
    Other(String),
}

/// Lifecycle events emitted by a provider connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A pairing code was issued (or reissued) for an unpaired tenant.
    PairingCode(String),
    /// The connection is fully open and authenticated.
    Opened(Identity),
    /// The connection closed.
    Closed(CloseReason),
    /// The network rotated the tenant's key material; must be persisted.
    CredentialsRotated(Credentials),
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("handshake with the messaging network failed: {0}")]
    Handshake(String),
    #[error("send to {address} rejected: {reason}")]
    SendRejected { address: String, reason: String },
    #[error("connection is closed")]
    ConnectionClosed,
}

// ── Traits ───────────────────────────────────────────────────────────────────

/// Factory for per-tenant connections to the messaging network.
///
/// `open` performs the real handshake — it is neither cheap nor repeatable
/// without consequence. Lifecycle events for the returned connection are
/// delivered on `events`; when the provider drops the sender the connection
/// is gone.
#[async_trait]
pub trait ConnectionProvider: Send + Sync + 'static {
    async fn open(
        &self,
        tenant_id: &str,
        credentials: Credentials,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn ProviderConnection>, ProviderError>;
}

/// One live connection. The provider serializes writes at the transport
/// level; callers may invoke `send_text` concurrently.
#[async_trait]
pub trait ProviderConnection: Send + Sync {
    /// Send a text message to a fully-qualified network address.
    /// Returns the network's message id.
    async fn send_text(&self, address: &str, body: &str) -> Result<String, ProviderError>;

    /// Revoke the pairing on the network side. The provider reports the
    /// result as a `Closed(LoggedOut)` event.
    async fn logout(&self) -> Result<(), ProviderError>;

    /// Close the local connection without revoking the pairing. Emits no
    /// event — an intentional local close must not look like a network
    /// disconnect.
    async fn close(&self);
}
