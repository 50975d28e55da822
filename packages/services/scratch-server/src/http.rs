use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{bearer_token_from_header, TenantRegistry};
use crate::errors::http_response;
use crate::ops::Ops;
use crate::params::*;
use crate::shutdown;

#[derive(Clone)]
pub struct AppState {
    pub ops: Arc<Ops>,
    pub tenants: Arc<TenantRegistry>,
    pub shutdown: tokio::sync::watch::Receiver<scratch_core::ServerState>,
}

/// Mirrors the teacher's `records/src/main.rs` router shape: a CORS layer,
/// a trace layer, and a `/health` check alongside the tool POST endpoint.
pub fn router(state: AppState, http_path: &str, metrics_path: Option<&str>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route(http_path, post(call_tool));

    if let Some(metrics_path) = metrics_path {
        router = router.route(metrics_path, get(metrics));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics() -> Json<serde_json::Value> {
    Json(crate::metrics::export_metrics_json())
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    params: serde_json::Value,
}

async fn call_tool(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<ToolCall>) -> Response {
    if shutdown::is_stopped(&state.shutdown) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"ok": false, "error": {"code": "INTERNAL_ERROR", "message": "server is shutting down"}})),
        )
            .into_response();
    }

    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token_from_header);
    let tenant = match state.tenants.resolve_bearer(bearer) {
        Ok(t) => t,
        Err(e) => return http_response(&e),
    };

    let started = Instant::now();
    let result = dispatch(&state.ops, &tenant, &body.tool, body.params).await;
    crate::metrics::record_tool_call_latency(started.elapsed().as_millis() as u64);

    match result {
        Ok(value) => {
            crate::metrics::record_tool_call_ok();
            let mut fields = serde_json::Map::new();
            fields.insert("ok".to_string(), serde_json::Value::Bool(true));
            if let serde_json::Value::Object(value_fields) = value {
                fields.extend(value_fields);
            }
            Json(serde_json::Value::Object(fields)).into_response()
        }
        Err(e) => {
            crate::metrics::record_tool_call_error();
            if matches!(e, scratch_core::error::ServiceError::ValidationTimeout) {
                crate::metrics::record_validation_timeout();
            }
            http_response(&e)
        }
    }
}

/// Parses `body.params` into the tool's typed parameter struct and calls the
/// matching `Ops` method, same dispatch table `sse.rs` and `tools.rs` (via
/// `rmcp`'s own derived routing) ultimately reach.
pub(crate) async fn dispatch(ops: &Ops, tenant: &str, tool: &str, params: serde_json::Value) -> scratch_core::error::Result<serde_json::Value> {
    fn parse<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> scratch_core::error::Result<T> {
        serde_json::from_value(params).map_err(|e| scratch_core::error::ServiceError::ValidationError(format!("bad params: {e}")))
    }

    match tool {
        "scratch_create" => ops.create(tenant, parse::<CreateParams>(params)?).await,
        "scratch_read" => ops.read(tenant, parse::<ReadParams>(params)?).await,
        "scratch_list" => ops.list(tenant, parse::<ListParams>(params)?).await,
        "scratch_list_cells" => ops.list_cells(tenant, parse::<ListCellsParams>(params)?).await,
        "scratch_append_cell" => ops.append_cell(tenant, parse::<AppendCellParams>(params)?).await,
        "scratch_replace_cell" => ops.replace_cell(tenant, parse::<ReplaceCellParams>(params)?).await,
        "scratch_delete" => ops.delete(tenant, parse::<DeleteParams>(params)?).await,
        "scratch_validate" => ops.validate(tenant, parse::<ValidateParams>(params)?).await,
        "scratch_search" => ops.search(tenant, parse::<SearchParams>(params)?).await,
        "scratch_list_tags" => ops.list_tags(tenant, parse::<ListTagsParams>(params)?).await,
        "scratch_upsert_schema" => ops.upsert_schema(tenant, parse::<UpsertSchemaParams>(params)?).await,
        "scratch_get_schema" => ops.get_schema(tenant, parse::<GetSchemaParams>(params)?).await,
        "scratch_list_schemas" => ops.list_schemas(tenant, parse::<ListSchemasParams>(params)?).await,
        "scratch_namespace_list" => ops.namespace_list(tenant, parse::<NamespaceListParams>(params)?).await,
        "scratch_namespace_create" => ops.namespace_create(tenant, parse::<NamespaceCreateParams>(params)?).await,
        "scratch_namespace_rename" => ops.namespace_rename(tenant, parse::<NamespaceRenameParams>(params)?).await,
        "scratch_namespace_delete" => ops.namespace_delete(tenant, parse::<NamespaceDeleteParams>(params)?).await,
        other => Err(scratch_core::error::ServiceError::ValidationError(format!("unknown tool: {other}"))),
    }
}
