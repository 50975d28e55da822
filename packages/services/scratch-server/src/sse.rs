use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::stream;
use serde::Deserialize;

use crate::auth::bearer_token_from_header;
use crate::http::AppState;
use crate::shutdown;

/// MCP-level SSE streaming (`§6.2`). Distinct from the HTTP POST tool
/// endpoint; a single call still resolves to one tool dispatch, emitted as
/// one `result`/`error` event followed by stream close — the minimal shape
/// that satisfies "SSE at `sse_path` for MCP-level streaming" without
/// inventing a bidirectional session protocol the spec does not ask for.
#[derive(Debug, Deserialize)]
struct SseQuery {
    tool: String,
    #[serde(default)]
    params: Option<String>,
}

pub fn router(state: AppState, sse_path: &str) -> Router {
    Router::new().route(sse_path, get(call_tool_sse)).with_state(state)
}

fn event_for(name: &str, payload: serde_json::Value) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event(name).data("serialization failed"))
}

async fn call_tool_sse(
    State(state): State<AppState>,
    Query(query): Query<SseQuery>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    if shutdown::is_stopped(&state.shutdown) {
        let event = event_for(
            "error",
            serde_json::json!({"ok": false, "error": {"code": "INTERNAL_ERROR", "message": "server is shutting down"}}),
        );
        return Sse::new(stream::iter(vec![Ok::<_, std::convert::Infallible>(event)])).keep_alive(KeepAlive::default());
    }

    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token_from_header);
    let tenant = match state.tenants.resolve_bearer(bearer) {
        Ok(t) => t,
        Err(e) => {
            let event = event_for("error", serde_json::json!({"ok": false, "error": scratch_core::error::ErrorPayload::from(&e)}));
            return Sse::new(stream::iter(vec![Ok(event)])).keep_alive(KeepAlive::default());
        }
    };

    let params: serde_json::Value = match query.params {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                let event = event_for(
                    "error",
                    serde_json::json!({"ok": false, "error": {"code": "VALIDATION_ERROR", "message": format!("bad params: {e}")}}),
                );
                return Sse::new(stream::iter(vec![Ok(event)])).keep_alive(KeepAlive::default());
            }
        },
        None => serde_json::Value::Null,
    };

    let result = crate::http::dispatch(&state.ops, &tenant, &query.tool, params).await;
    let event = match result {
        Ok(mut value) => {
            if let serde_json::Value::Object(ref mut fields) = value {
                fields.insert("ok".to_string(), serde_json::Value::Bool(true));
            }
            event_for("result", value)
        }
        Err(e) => event_for("error", serde_json::json!({"ok": false, "error": scratch_core::error::ErrorPayload::from(&e)})),
    };

    Sse::new(stream::iter(vec![Ok(event)])).keep_alive(KeepAlive::default())
}
