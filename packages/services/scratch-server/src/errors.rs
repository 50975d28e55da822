use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rmcp::ErrorData as McpError;
use scratch_core::error::{ErrorCode, ErrorPayload, ServiceError};

/// Maps `ServiceError` onto the `§6.3` HTTP status table, wrapped in the
/// `{ok: false, error: {...}}` envelope every tool response uses (`§6.1`),
/// used by both `http.rs` and `sse.rs` so the two transports never drift.
pub fn http_response(err: &ServiceError) -> Response {
    let payload = ErrorPayload::from(err);
    let status = StatusCode::from_u16(payload.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({ "ok": false, "error": payload });
    (status, Json(body)).into_response()
}

/// Maps `ServiceError` onto an MCP tool-call error, surfaced to the caller as
/// structured JSON in the error's `data` field rather than collapsed to a
/// bare message string.
pub fn mcp_error(err: ServiceError) -> McpError {
    let payload = ErrorPayload::from(&err);
    let data = serde_json::to_value(&payload).ok();
    match payload.code {
        ErrorCode::InternalError | ErrorCode::ConfigError => McpError::internal_error(payload.message, data),
        _ => McpError::invalid_params(payload.message, data),
    }
}
