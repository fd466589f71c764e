//! Dispatch pipeline: single and bulk sends over a live session.
//!
//! Bulk sends are strictly sequential and in input order, with a fixed
//! minimum delay between successive sends so the messaging network's
//! abuse defenses stay quiet. One bad recipient never aborts the batch;
//! every recipient gets an entry in the result list.

use std::time::Duration;

use {
    serde::Serialize,
    thiserror::Error,
    tracing::{debug, warn},
    waygate_provider::{NETWORK_SUFFIX, ProviderError},
};

use crate::{phase::Phase, session::SessionHandle};

/// Default inter-send delay for bulk dispatch. A rate-limiting heuristic,
/// not a protocol requirement; tunable per deployment via config.
pub const DEFAULT_BULK_SEND_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("session is not ready to send (phase: {phase})")]
    SessionNotReady { phase: Phase },
    #[error("recipient address is empty or malformed")]
    InvalidRecipient,
    #[error("message body is empty")]
    EmptyMessage,
    #[error("provider send failed: {0}")]
    ProviderSend(#[from] ProviderError),
}

impl DispatchError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::SessionNotReady { .. } => "session_not_ready",
            DispatchError::InvalidRecipient => "invalid_recipient",
            DispatchError::EmptyMessage => "empty_message",
            DispatchError::ProviderSend(_) => "provider_send_failed",
        }
    }
}

/// Successful single send.
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub recipient: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// Per-recipient outcome of a bulk send, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BulkEntry {
    pub recipient: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate bulk-send outcome. `results` preserves input order and has
/// one entry per requested recipient.
#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub results: Vec<BulkEntry>,
}

/// Turn a raw recipient into a network address: addresses that already
/// carry a domain pass through, anything else is reduced to its digits
/// and suffixed.
pub fn normalize_recipient(raw: &str) -> Result<String, DispatchError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DispatchError::InvalidRecipient);
    }
    if raw.contains('@') {
        return Ok(raw.to_string());
    }
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(DispatchError::InvalidRecipient);
    }
    Ok(format!("{digits}{NETWORK_SUFFIX}"))
}

async fn ensure_sendable(session: &SessionHandle) -> Result<(), DispatchError> {
    let phase = session.phase().await;
    if !phase.is_sendable() {
        return Err(DispatchError::SessionNotReady { phase });
    }
    Ok(())
}

/// Send one message. No retries — a failure is reported to the caller
/// as-is.
pub async fn send_one(
    session: &SessionHandle,
    recipient: &str,
    body: &str,
) -> Result<SendReceipt, DispatchError> {
    if body.is_empty() {
        return Err(DispatchError::EmptyMessage);
    }
    let address = normalize_recipient(recipient)?;
    ensure_sendable(session).await?;

    let conn = session
        .connection()
        .await
        .ok_or(DispatchError::SessionNotReady {
            phase: session.phase().await,
        })?;

    let message_id = conn.send_text(&address, body).await?;
    debug!(tenant = %session.tenant_id(), %address, %message_id, "message sent");
    Ok(SendReceipt {
        recipient: recipient.to_string(),
        message_id,
    })
}

/// Send the same body to every recipient, strictly in order, one at a
/// time, waiting `delay` between successive sends (also after failures).
///
/// The readiness precondition is checked once up front; if it fails the
/// whole batch is rejected with zero attempts. Individual failures are
/// captured per recipient and never abort the rest of the batch.
pub async fn send_bulk(
    session: &SessionHandle,
    recipients: &[String],
    body: &str,
    delay: Duration,
) -> Result<BulkReport, DispatchError> {
    if body.is_empty() {
        return Err(DispatchError::EmptyMessage);
    }
    ensure_sendable(session).await?;

    let mut results = Vec::with_capacity(recipients.len());
    let mut sent = 0usize;
    for (index, recipient) in recipients.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(delay).await;
        }
        match send_one(session, recipient, body).await {
            Ok(_) => {
                sent += 1;
                results.push(BulkEntry {
                    recipient: recipient.clone(),
                    status: DeliveryStatus::Sent,
                    error: None,
                });
            },
            Err(e) => {
                warn!(tenant = %session.tenant_id(), recipient = %recipient, error = %e, "bulk send entry failed");
                results.push(BulkEntry {
                    recipient: recipient.clone(),
                    status: DeliveryStatus::Failed,
                    error: Some(e.to_string()),
                });
            },
        }
    }

    Ok(BulkReport {
        total: recipients.len(),
        sent,
        failed: recipients.len() - sent,
        results,
    })
}
