use rmcp::handler::server::tool::{ToolCallContext, ToolRouter};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::{tool, tool_router, ErrorData as McpError, RoleServer, ServerHandler, ServiceExt};

use crate::errors::mcp_error;
use crate::ops::Ops;
use crate::params::*;

fn json_content(v: serde_json::Value) -> Vec<Content> {
    vec![Content::text(serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string()))]
}

/// The stdio MCP surface. Stdio has no per-call auth header, so `tenant` is
/// resolved once at process startup (`§4.A`) from `SCRATCH_BEARER_TOKEN` (or
/// the implicit default tenant when auth is disabled) and reused for every
/// call this process makes — unlike `http.rs`/`sse.rs`, which resolve a
/// tenant per request from the `Authorization` header.
#[derive(Clone)]
pub struct ScratchServer {
    ops: std::sync::Arc<Ops>,
    tenant: String,
    shutdown: tokio::sync::watch::Receiver<scratch_core::ServerState>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ScratchServer {
    pub fn new(ops: std::sync::Arc<Ops>, tenant: String, shutdown: tokio::sync::watch::Receiver<scratch_core::ServerState>) -> Self {
        Self {
            ops,
            tenant,
            shutdown,
            tool_router: Self::tool_router(),
        }
    }

    /// Shared shutdown-gate check (`§4.F`): every tool call runs this first so
    /// a `DRAINING`/`STOPPED` server rejects new work the same way `http.rs`'s
    /// `call_tool` does, regardless of which tool was invoked.
    fn check_running(&self) -> Result<(), McpError> {
        if crate::shutdown::is_stopped(&self.shutdown) {
            return Err(mcp_error(scratch_core::error::ServiceError::Internal(
                "server is shutting down".to_string(),
            )));
        }
        Ok(())
    }

    #[tool(name = "scratch_create", description = "Create a scratchpad, or reset one in place if scratch_id already exists.")]
    async fn scratch_create(&self, params: Parameters<CreateParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.create(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_read", description = "Read a scratchpad, optionally filtered by cell_ids/tags/namespaces.")]
    async fn scratch_read(&self, params: Parameters<ReadParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.read(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_list", description = "List scratchpads as lean rows (no cell content).")]
    async fn scratch_list(&self, params: Parameters<ListParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.list(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_list_cells", description = "List a scratchpad's cells as lightweight rows (no content).")]
    async fn scratch_list_cells(&self, params: Parameters<ListCellsParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.list_cells(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_append_cell", description = "Append a new cell to a scratchpad.")]
    async fn scratch_append_cell(&self, params: Parameters<AppendCellParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.append_cell(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_replace_cell", description = "Replace a cell's content, optionally reordering it via new_index.")]
    async fn scratch_replace_cell(&self, params: Parameters<ReplaceCellParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.replace_cell(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_delete", description = "Delete a scratchpad. Idempotent.")]
    async fn scratch_delete(&self, params: Parameters<DeleteParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.delete(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_validate", description = "Validate selected cells unconditionally, regardless of their stored validate flag.")]
    async fn scratch_validate(&self, params: Parameters<ValidateParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.validate(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_search", description = "Semantic search over cell content, pre-filtered by namespace/tags.")]
    async fn scratch_search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.search(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_list_tags", description = "List the union of scratchpad and cell tags, optionally restricted to namespaces.")]
    async fn scratch_list_tags(&self, params: Parameters<ListTagsParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.list_tags(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_upsert_schema", description = "Create or replace a named JSON-Schema entry in a scratchpad's schema registry.")]
    async fn scratch_upsert_schema(&self, params: Parameters<UpsertSchemaParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.upsert_schema(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_get_schema", description = "Fetch a named schema registry entry.")]
    async fn scratch_get_schema(&self, params: Parameters<GetSchemaParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.get_schema(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_list_schemas", description = "List every schema registry entry for a scratchpad.")]
    async fn scratch_list_schemas(&self, params: Parameters<ListSchemasParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.list_schemas(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_namespace_list", description = "List namespaces registered for the tenant.")]
    async fn scratch_namespace_list(&self, params: Parameters<NamespaceListParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.namespace_list(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_namespace_create", description = "Register a namespace, even if no pads exist under it yet.")]
    async fn scratch_namespace_create(&self, params: Parameters<NamespaceCreateParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.namespace_create(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_namespace_rename", description = "Rename a namespace, optionally migrating its pads (migrate=true).")]
    async fn scratch_namespace_rename(&self, params: Parameters<NamespaceRenameParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.namespace_rename(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }

    #[tool(name = "scratch_namespace_delete", description = "Delete a namespace, optionally cascading deletion to its pads (cascade=true).")]
    async fn scratch_namespace_delete(&self, params: Parameters<NamespaceDeleteParams>) -> Result<CallToolResult, McpError> {
        self.check_running()?;
        let v = self.ops.namespace_delete(&self.tenant, params.0).await.map_err(mcp_error)?;
        Ok(CallToolResult::success(json_content(v)))
    }
}

impl ServerHandler for ScratchServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Durable, multi-tenant scratch-notebook service. Scratchpads are UUID-addressed \
                 ordered lists of typed cells (json/yaml/md/txt/code) with tags, metadata, a \
                 per-pad schema registry, and semantic search over cell content. Mutations return \
                 lightweight pad views (never cell content); use scratch_read for full content."
                    .into(),
            ),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "scratch-server".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("Scratchpad MCP Server".into()),
                description: Some("Durable multi-tenant scratch-notebook service".into()),
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: Default::default(),
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let tool_context = ToolCallContext::new(self, request, context);
        async move { self.tool_router.call(tool_context).await }
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tool_router.get(name).cloned()
    }
}

/// Serves the MCP stdio transport until the client disconnects (`§6.2`).
pub async fn serve_stdio(server: ScratchServer) -> anyhow::Result<()> {
    let transport = rmcp::transport::io::stdio();
    let service = server.serve(transport).await.inspect_err(|e| {
        tracing::error!(error = %e, "mcp stdio serve error");
    })?;
    service.waiting().await?;
    Ok(())
}
