//! Configuration for the waygate gateway.
//!
//! Discovery mirrors the usual layout: a project-local
//! `waygate.{toml,yaml,yml,json}` wins over the user-global copy in
//! `~/.config/waygate/`; missing or broken files fall back to defaults.

pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, load_config},
    schema::{CredentialsConfig, DispatchConfig, ReconnectConfig, ServerConfig, WaygateConfig},
};
