//! HTTP API handlers.
//!
//! The surface the original deployment polls: QR + status per tenant,
//! single and bulk sends, logout, health. Input validation happens here,
//! before anything touches a session.

use std::sync::Arc;

use {
    axum::{
        Json,
        extract::{Path, State},
        response::IntoResponse,
    },
    serde::Deserialize,
    serde_json::json,
    tracing::info,
    waygate_sessions::{Phase, dispatch},
};

use crate::{error::ApiError, qr, state::AppState};

// ── Request bodies ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub tenant_id: String,
    pub recipient: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendRequest {
    pub tenant_id: String,
    pub recipients: Vec<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub tenant_id: String,
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(
            "invalid_input",
            format!("missing {field}"),
        ));
    }
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// `GET /api/qr/{tenantId}` — lazily initializes the session and returns
/// the current pairing code as a PNG data URL. 400 while no code exists;
/// callers poll.
pub async fn qr_handler(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.registry.get_or_create(&tenant_id).await;
    match session.pairing_code().await {
        Some(code) => {
            let data_url = qr::pairing_code_data_url(&code)
                .map_err(|e| ApiError::internal("qr_render_failed", e.to_string()))?;
            Ok(Json(json!({ "qr": data_url, "tenantId": tenant_id })))
        },
        None => match session.phase().await {
            Phase::Live | Phase::Authenticated => Err(ApiError::bad_request(
                "already_paired",
                "session is already authenticated",
            )),
            _ => Err(ApiError::bad_request(
                "qr_not_ready",
                "no QR code available yet; try again in a few seconds",
            )),
        },
    }
}

/// `GET /api/status/{tenantId}` — current phase, `not_initialized` when
/// no session exists. Never creates a session.
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&tenant_id) {
        None => Json(json!({ "status": "not_initialized", "tenantId": tenant_id })),
        Some(session) => {
            let snapshot = session.snapshot().await;
            Json(json!({
                "status": snapshot.phase,
                "tenantId": tenant_id,
                "user": snapshot.identity,
            }))
        },
    }
}

/// `POST /api/send` — relay one message onto the tenant's live connection.
pub async fn send_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require("tenantId", &req.tenant_id)?;
    require("recipient", &req.recipient)?;
    require("message", &req.message)?;

    let session = state
        .registry
        .get(&req.tenant_id)
        .ok_or_else(|| ApiError::not_initialized(&req.tenant_id))?;

    let receipt = dispatch::send_one(&session, &req.recipient, &req.message).await?;
    Ok(Json(json!({
        "success": true,
        "recipient": receipt.recipient,
        "messageId": receipt.message_id,
    })))
}

/// `POST /api/bulk-send` — sequential bulk dispatch with per-recipient
/// accounting. Individual failures land in `results`, not in the status
/// code.
pub async fn bulk_send_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkSendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require("tenantId", &req.tenant_id)?;
    require("message", &req.message)?;
    if req.recipients.is_empty() {
        return Err(ApiError::bad_request(
            "invalid_input",
            "recipients must be a non-empty array",
        ));
    }

    let session = state
        .registry
        .get(&req.tenant_id)
        .ok_or_else(|| ApiError::not_initialized(&req.tenant_id))?;

    let report =
        dispatch::send_bulk(&session, &req.recipients, &req.message, state.bulk_delay).await?;
    info!(
        tenant = %req.tenant_id,
        total = report.total,
        sent = report.sent,
        failed = report.failed,
        "bulk send finished"
    );
    Ok(Json(json!({
        "success": true,
        "total": report.total,
        "sent": report.sent,
        "failed": report.failed,
        "results": report.results,
    })))
}

/// `POST /api/logout` — evict the session and purge stored credentials.
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require("tenantId", &req.tenant_id)?;
    if let Some(session) = state.registry.get(&req.tenant_id)
        && let Some(conn) = session.connection().await
    {
        // Best effort: revoke the pairing on the network side before the
        // local teardown.
        if let Err(e) = conn.logout().await {
            tracing::warn!(tenant = %req.tenant_id, error = %e, "network-side logout failed");
        }
    }
    state.registry.evict(&req.tenant_id).await;
    Ok(Json(json!({ "ok": true })))
}

/// `GET /health` — always 200 while the process is alive.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "uptime": state.uptime_secs() }))
}

/// JSON 404 for anything outside the API surface.
pub async fn fallback_handler() -> ApiError {
    ApiError::not_found("endpoint not found")
}
