//! Config schema types (server, credentials, dispatch, reconnect).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaygateConfig {
    pub server: ServerConfig,
    pub credentials: CredentialsConfig,
    pub dispatch: DispatchConfig,
    pub reconnect: ReconnectConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// Where per-tenant credential material lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub dir: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./auth"),
        }
    }
}

/// Dispatch pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Minimum delay between successive sends in a bulk batch, in
    /// milliseconds. A rate-limiting heuristic, tunable per deployment.
    pub bulk_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { bulk_delay_ms: 1000 }
    }
}

/// Connection retry policy for construction failures and transient
/// closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Fixed delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Attempt limit per (re)connection round.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 5000,
            max_attempts: 5,
        }
    }
}
