//! HTTP surface for the multi-tenant messaging gateway.
//!
//! Lifecycle:
//! 1. Load config
//! 2. Build the session registry over the configured provider and
//!    credential store
//! 3. Serve the polling API (QR, status) and the dispatch endpoints
//!    (send, bulk-send, logout)
//!
//! All session semantics live in `waygate-sessions`; handlers here only
//! validate input, locate sessions, and shape responses.

pub mod api;
pub mod error;
pub mod qr;
pub mod server;
pub mod state;

pub use {
    server::{build_gateway_app, start_gateway},
    state::AppState,
};
