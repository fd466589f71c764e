//! Session lifecycle and dispatch core.
//!
//! One [`SessionHandle`] per tenant, multiplexed by the [`SessionRegistry`];
//! a per-session driver task applies lifecycle transitions from provider
//! events, and the `dispatch` module relays sends onto the live connection.

pub mod dispatch;
mod lifecycle;
pub mod phase;
pub mod registry;
pub mod session;

pub use {
    dispatch::{
        BulkEntry, BulkReport, DEFAULT_BULK_SEND_DELAY, DeliveryStatus, DispatchError, SendReceipt,
        send_bulk, send_one,
    },
    phase::Phase,
    registry::{ReconnectPolicy, SessionRegistry},
    session::{SessionHandle, SessionSnapshot},
};
