//! Session registry: one session per tenant, created on first use.

use std::{sync::Arc, time::Duration};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    tracing::{info, warn},
    waygate_provider::{ConnectionProvider, CredentialStore},
};

use crate::{lifecycle, session::SessionHandle};

/// How construction failures and transient closes are retried.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Attempt limit per (re)connection round.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

pub(crate) struct RegistryInner {
    pub(crate) sessions: DashMap<String, Arc<SessionHandle>>,
    pub(crate) provider: Arc<dyn ConnectionProvider>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) reconnect: ReconnectPolicy,
}

/// Maps tenant ids to their sessions. The only shared mutable structure in
/// the gateway; owned explicitly and threaded through request handlers.
///
/// Cloning is cheap — clones share the same map.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        credentials: Arc<dyn CredentialStore>,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: DashMap::new(),
                provider,
                credentials,
                reconnect,
            }),
        }
    }

    /// Non-creating lookup for endpoints that must fail fast with
    /// "not initialized" instead of silently dialing the network.
    pub fn get(&self, tenant_id: &str) -> Option<Arc<SessionHandle>> {
        self.inner.sessions.get(tenant_id).map(|s| Arc::clone(s.value()))
    }

    /// Return the tenant's session, constructing it on first use.
    ///
    /// The map entry is claimed atomically, so concurrent calls for the
    /// same unseen tenant resolve to the same session and exactly one
    /// driver task — and therefore exactly one provider handshake — is
    /// started. Construction side effects (credential load, handshake)
    /// run in the driver task; the returned handle may still be
    /// `Uninitialized`.
    pub async fn get_or_create(&self, tenant_id: &str) -> Arc<SessionHandle> {
        let (session, created) = match self.inner.sessions.entry(tenant_id.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let session = SessionHandle::new(tenant_id);
                entry.insert(session.clone());
                (session, true)
            },
        };

        if created {
            let driver = tokio::spawn(lifecycle::drive(
                Arc::downgrade(&self.inner),
                session.clone(),
            ));
            session.set_driver(driver).await;
            info!(tenant = %tenant_id, "session created");
        }
        session
    }

    /// Remove a tenant's session: stop its driver, close the connection
    /// gracefully, purge stored credentials. Evicting an absent tenant is
    /// a no-op.
    pub async fn evict(&self, tenant_id: &str) {
        let Some((_, session)) = self.inner.sessions.remove(tenant_id) else {
            return;
        };
        session.shutdown().await;
        if let Err(e) = self.inner.credentials.purge(tenant_id).await {
            warn!(tenant = %tenant_id, error = %e, "credential purge on evict failed");
        }
        info!(tenant = %tenant_id, "session evicted");
    }

    /// Close every session without purging credentials. Used at process
    /// shutdown; phases are not persisted, only credentials survive a
    /// restart.
    pub async fn shutdown(&self) {
        let tenants: Vec<String> = self
            .inner
            .sessions
            .iter()
            .map(|e| e.key().clone())
            .collect();
        for tenant in tenants {
            if let Some((_, session)) = self.inner.sessions.remove(&tenant) {
                session.shutdown().await;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use waygate_provider::{
        CloseReason, ConnectionEvent, Credentials, FsCredentialStore, Identity,
        loopback::LoopbackProvider,
    };

    use super::*;
    use crate::phase::Phase;

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            name: None,
        }
    }

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            retry_delay: Duration::from_millis(10),
            max_attempts: 3,
        }
    }

    fn registry_with(provider: &LoopbackProvider) -> (tempfile::TempDir, SessionRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsCredentialStore::new(dir.path()));
        let registry = SessionRegistry::new(Arc::new(provider.clone()), store, fast_policy());
        (dir, registry)
    }

    async fn wait_until<F>(mut cond: F)
    where
        F: AsyncFnMut() -> bool,
    {
        for _ in 0..500 {
            if cond().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn concurrent_get_or_create_constructs_once() {
        let provider = LoopbackProvider::new();
        let (_dir, registry) = registry_with(&provider);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(
                async move { registry.get_or_create("u1").await },
            ));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        for pair in handles.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }

        wait_until(async || provider.open_count() > 0).await;
        assert_eq!(provider.open_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn fresh_tenant_reaches_pairing_then_live() {
        let provider = LoopbackProvider::new();
        let (_dir, registry) = registry_with(&provider);

        let session = registry.get_or_create("u1").await;
        wait_until(async || session.phase().await == Phase::PairingPending).await;
        assert!(session.pairing_code().await.is_some());

        assert!(provider.complete_pairing("u1", identity("111@net")).await);
        wait_until(async || session.phase().await == Phase::Live).await;
        assert!(session.pairing_code().await.is_none());
        assert_eq!(
            session.snapshot().await.identity.map(|i| i.id),
            Some("111@net".to_string())
        );
    }

    #[tokio::test]
    async fn rotated_credentials_are_persisted() {
        let provider = LoopbackProvider::new();
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsCredentialStore::new(dir.path()));
        let registry =
            SessionRegistry::new(Arc::new(provider.clone()), store.clone(), fast_policy());

        let session = registry.get_or_create("u1").await;
        wait_until(async || session.phase().await == Phase::PairingPending).await;
        provider.complete_pairing("u1", identity("7@net")).await;
        wait_until(async || session.phase().await == Phase::Live).await;

        use waygate_provider::CredentialStore as _;
        wait_until(async || store.load("u1").await.unwrap().is_registered()).await;
    }

    #[tokio::test]
    async fn logout_event_evicts_and_purges() {
        let provider = LoopbackProvider::new();
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsCredentialStore::new(dir.path()));
        let registry =
            SessionRegistry::new(Arc::new(provider.clone()), store.clone(), fast_policy());

        let session = registry.get_or_create("u1").await;
        wait_until(async || session.phase().await == Phase::PairingPending).await;
        provider.complete_pairing("u1", identity("7@net")).await;
        wait_until(async || session.phase().await == Phase::Live).await;

        provider
            .emit("u1", ConnectionEvent::Closed(CloseReason::LoggedOut))
            .await;
        wait_until(async || registry.get("u1").is_none()).await;

        // Stored material is gone; a fresh session starts from scratch.
        use waygate_provider::CredentialStore as _;
        assert!(!store.load("u1").await.unwrap().is_registered());
        let fresh = registry.get_or_create("u1").await;
        assert!(!Arc::ptr_eq(&fresh, &session));
        wait_until(async || fresh.phase().await == Phase::PairingPending).await;
    }

    #[tokio::test]
    async fn transient_close_reconnects_to_live() {
        let provider = LoopbackProvider::new();
        let (_dir, registry) = registry_with(&provider);

        let session = registry.get_or_create("u1").await;
        wait_until(async || session.phase().await == Phase::PairingPending).await;
        provider.complete_pairing("u1", identity("7@net")).await;
        wait_until(async || session.phase().await == Phase::Live).await;

        provider
            .emit("u1", ConnectionEvent::Closed(CloseReason::ConnectionClosed))
            .await;
        // Reconnect resumes with the stored identity and comes back live.
        wait_until(async || session.phase().await == Phase::Live && provider.open_count() == 2)
            .await;
        assert!(registry.get("u1").is_some());
    }

    #[tokio::test]
    async fn unrecognized_close_reconnects_once() {
        let provider = LoopbackProvider::new();
        let (_dir, registry) = registry_with(&provider);

        let session = registry.get_or_create("u1").await;
        wait_until(async || session.phase().await == Phase::PairingPending).await;
        provider.complete_pairing("u1", identity("7@net")).await;
        wait_until(async || session.phase().await == Phase::Live).await;

        provider
            .emit(
                "u1",
                ConnectionEvent::Closed(CloseReason::Other("stream error 515".into())),
            )
            .await;
        wait_until(async || session.phase().await == Phase::Live && provider.open_count() == 2)
            .await;
    }

    #[tokio::test]
    async fn unrecognized_close_does_not_retry_beyond_one_attempt() {
        let provider = LoopbackProvider::new();
        let (_dir, registry) = registry_with(&provider);

        let session = registry.get_or_create("u1").await;
        wait_until(async || session.phase().await == Phase::PairingPending).await;
        provider.complete_pairing("u1", identity("7@net")).await;
        wait_until(async || session.phase().await == Phase::Live).await;

        // Two scripted failures: a policy-driven retry loop (max_attempts
        // = 3) would burn through both and land a third, successful open.
        // An unrecognized close gets exactly one attempt and settles in
        // Error.
        provider.fail_next_opens(2);
        provider
            .emit(
                "u1",
                ConnectionEvent::Closed(CloseReason::Other("stream error 515".into())),
            )
            .await;
        wait_until(async || session.phase().await == Phase::Error).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.phase().await, Phase::Error);
        assert_eq!(provider.open_count(), 1);
    }

    #[tokio::test]
    async fn construction_failure_retries_and_recovers() {
        let provider = LoopbackProvider::new();
        provider.fail_next_opens(2);
        let (_dir, registry) = registry_with(&provider);

        let session = registry.get_or_create("u1").await;
        // First two attempts fail and surface as Error before the third
        // succeeds.
        wait_until(async || session.phase().await == Phase::PairingPending).await;
        assert_eq!(provider.open_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_construction_attempts_leave_error_phase() {
        let provider = LoopbackProvider::new();
        provider.fail_next_opens(10);
        let (_dir, registry) = registry_with(&provider);

        let session = registry.get_or_create("u1").await;
        wait_until(async || session.phase().await == Phase::Error).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.open_count(), 0);
        assert_eq!(session.phase().await, Phase::Error);
    }

    #[tokio::test]
    async fn unreadable_credentials_exhaust_attempts_without_opening() {
        let provider = LoopbackProvider::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("u1")).unwrap();
        std::fs::write(dir.path().join("u1/creds.json"), b"not json").unwrap();
        let store = Arc::new(FsCredentialStore::new(dir.path()));
        let registry = SessionRegistry::new(Arc::new(provider.clone()), store, fast_policy());

        let session = registry.get_or_create("u1").await;
        // Every attempt fails at the load step, so the provider is never
        // dialed and the session settles in Error.
        wait_until(async || session.phase().await == Phase::Error).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.phase().await, Phase::Error);
        assert_eq!(provider.open_count(), 0);
    }

    #[tokio::test]
    async fn evict_is_idempotent() {
        let provider = LoopbackProvider::new();
        let (_dir, registry) = registry_with(&provider);

        registry.evict("nobody").await;
        let _ = registry.get_or_create("u1").await;
        registry.evict("u1").await;
        registry.evict("u1").await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn shutdown_closes_all_sessions() {
        let provider = LoopbackProvider::new();
        let (_dir, registry) = registry_with(&provider);

        let _ = registry.get_or_create("u1").await;
        let _ = registry.get_or_create("u2").await;
        registry.shutdown().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn authenticated_phase_precedes_live_for_registered_tenant() {
        let provider = LoopbackProvider::new();
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsCredentialStore::new(dir.path()));
        use waygate_provider::CredentialStore as _;
        store
            .save("u1", &Credentials {
                material: serde_json::json!({"resume": true}),
                identity: Some(identity("9@net")),
            })
            .await
            .unwrap();

        let registry = SessionRegistry::new(Arc::new(provider.clone()), store, fast_policy());
        let session = registry.get_or_create("u1").await;
        // Stored identity resumes the connection; the loopback provider
        // reports it open immediately, so the session lands in Live.
        wait_until(async || session.phase().await == Phase::Live).await;
        assert_eq!(
            session.snapshot().await.identity.map(|i| i.id),
            Some("9@net".to_string())
        );
    }
}
