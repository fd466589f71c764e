//! API error mapping.
//!
//! Every error leaves the process as a stable `{error, code}` JSON pair;
//! no stack traces or internal identifiers reach the caller.

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
    waygate_sessions::DispatchError,
};

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }

    pub fn not_initialized(tenant_id: &str) -> Self {
        Self::bad_request(
            "not_initialized",
            format!("no session for tenant {tenant_id}; request a QR code first"),
        )
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        let code = e.code();
        match e {
            DispatchError::ProviderSend(_) => Self::internal(code, e.to_string()),
            _ => Self::bad_request(code, e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.message, "code": self.code })),
        )
            .into_response()
    }
}
