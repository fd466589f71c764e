//! Filesystem-backed credential storage.
//!
//! One directory per tenant under the configured root, with the key
//! material serialized as JSON. The store owns the on-disk layout
//! exclusively; nothing else reads or writes those files.

use std::path::PathBuf;

use {
    anyhow::Context,
    async_trait::async_trait,
    tracing::{debug, warn},
};

use crate::Credentials;

/// Durable per-tenant key material.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Load a tenant's credentials, or fresh unregistered material if the
    /// tenant has never paired.
    async fn load(&self, tenant_id: &str) -> anyhow::Result<Credentials>;

    /// Persist rotated credentials.
    async fn save(&self, tenant_id: &str, credentials: &Credentials) -> anyhow::Result<()>;

    /// Remove everything stored for a tenant. Idempotent.
    async fn purge(&self, tenant_id: &str) -> anyhow::Result<()>;
}

/// `CredentialStore` over a local directory tree: `<root>/<tenant>/creds.json`.
pub struct FsCredentialStore {
    root: PathBuf,
}

const CREDS_FILE: &str = "creds.json";

impl FsCredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn tenant_dir(&self, tenant_id: &str) -> PathBuf {
        // Tenant ids are opaque strings from the request path; flatten
        // anything that could escape the root.
        let safe: String = tenant_id
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '.' { '_' } else { c })
            .collect();
        self.root.join(safe)
    }

    fn creds_path(&self, tenant_id: &str) -> PathBuf {
        self.tenant_dir(tenant_id).join(CREDS_FILE)
    }
}

#[async_trait]
impl CredentialStore for FsCredentialStore {
    async fn load(&self, tenant_id: &str) -> anyhow::Result<Credentials> {
        let path = self.creds_path(tenant_id);
        match tokio::fs::read(&path).await {
            Ok(raw) => {
                let creds = serde_json::from_slice(&raw)
                    .with_context(|| format!("corrupt credentials at {}", path.display()))?;
                debug!(tenant = %tenant_id, "loaded stored credentials");
                Ok(creds)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Credentials::unregistered())
            },
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    async fn save(&self, tenant_id: &str, credentials: &Credentials) -> anyhow::Result<()> {
        let dir = self.tenant_dir(tenant_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let raw = serde_json::to_vec_pretty(credentials)?;
        let path = dir.join(CREDS_FILE);
        tokio::fs::write(&path, raw)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(tenant = %tenant_id, "credentials saved");
        Ok(())
    }

    async fn purge(&self, tenant_id: &str) -> anyhow::Result<()> {
        let dir = self.tenant_dir(tenant_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(tenant = %tenant_id, "credentials purged");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(tenant = %tenant_id, error = %e, "credential purge failed");
                Err(e).with_context(|| format!("failed to remove {}", dir.display()))
            },
        }
    }
}
