use std::sync::Arc;

use scratch_core::error::Result;
use scratch_store::Store;
use serde_json::json;

use crate::params::*;

/// One async function per tool (`§6.1`), called by both `tools.rs` (stdio)
/// and `http.rs`/`sse.rs` so no tool's logic is duplicated across
/// transports. Each returns the bare success payload; `errors.rs` handles
/// shaping a `ServiceError` into the transport-specific error envelope.
pub struct Ops {
    store: Arc<Store>,
}

impl Ops {
    pub fn new(store: Arc<Store>) -> Self {
        Ops { store }
    }

    pub async fn create(&self, tenant: &str, p: CreateParams) -> Result<serde_json::Value> {
        let metadata = metadata_object(p.metadata)?;
        let drafts = p
            .cells
            .into_iter()
            .map(CellParam::into_draft)
            .collect::<Result<Vec<_>>>()?;
        let outcome = self
            .store
            .create(tenant, p.scratch_id, p.namespace, p.tags, metadata, drafts)
            .await?;
        crate::metrics::record_scratchpad_created();
        if !outcome.evicted_scratchpads.is_empty() {
            crate::metrics::record_scratchpads_evicted(outcome.evicted_scratchpads.len() as u64);
        }
        Ok(json!({
            "scratchpad": outcome.pad,
            "validation_results": outcome.validation_results,
            "evicted_scratchpads": outcome.evicted_scratchpads,
        }))
    }

    pub async fn read(&self, tenant: &str, p: ReadParams) -> Result<serde_json::Value> {
        let pad = self
            .store
            .read(
                tenant,
                p.scratch_id,
                p.cell_ids.as_deref(),
                p.tags.as_deref(),
                p.namespaces.as_deref(),
            )
            .await?;
        Ok(json!({ "scratchpad": pad }))
    }

    pub async fn list(&self, tenant: &str, p: ListParams) -> Result<serde_json::Value> {
        let pads = self.store.list(tenant, &p.namespaces, &p.tags, p.limit).await?;
        Ok(json!({ "scratchpads": pads }))
    }

    pub async fn list_cells(&self, tenant: &str, p: ListCellsParams) -> Result<serde_json::Value> {
        let cells = self
            .store
            .list_cells(tenant, p.scratch_id, p.cell_ids.as_deref(), p.tags.as_deref())
            .await?;
        Ok(json!({ "cells": cells }))
    }

    pub async fn append_cell(&self, tenant: &str, p: AppendCellParams) -> Result<serde_json::Value> {
        let draft = p.cell.into_draft()?;
        let (pad, validation_result) = self.store.append_cell(tenant, p.scratch_id, draft).await?;
        Ok(json!({
            "scratchpad": pad,
            "validation_results": validation_result.into_iter().collect::<Vec<_>>(),
        }))
    }

    pub async fn replace_cell(&self, tenant: &str, p: ReplaceCellParams) -> Result<serde_json::Value> {
        let draft = p.cell.into_draft()?;
        let (pad, validation_result) = self
            .store
            .replace_cell(tenant, p.scratch_id, p.cell_id, draft, p.new_index)
            .await?;
        Ok(json!({
            "scratchpad": pad,
            "validation_results": validation_result.into_iter().collect::<Vec<_>>(),
        }))
    }

    pub async fn delete(&self, tenant: &str, p: DeleteParams) -> Result<serde_json::Value> {
        let deleted = self.store.delete(tenant, p.scratch_id).await?;
        Ok(json!({ "scratch_id": p.scratch_id, "deleted": deleted }))
    }

    pub async fn validate(&self, tenant: &str, p: ValidateParams) -> Result<serde_json::Value> {
        let results = self.store.validate(tenant, p.scratch_id, p.cell_ids.as_deref()).await?;
        Ok(json!({ "results": results }))
    }

    pub async fn search(&self, tenant: &str, p: SearchParams) -> Result<serde_json::Value> {
        let started = std::time::Instant::now();
        let limit = p.limit.unwrap_or(10);
        let hits = self.store.search(tenant, &p.query, &p.namespaces, &p.tags, limit).await?;
        crate::metrics::record_search_latency(started.elapsed().as_millis() as u64);
        Ok(json!({
            "hits": hits,
            "embedder": self.store.embedding_model_id(),
        }))
    }

    pub async fn list_tags(&self, tenant: &str, p: ListTagsParams) -> Result<serde_json::Value> {
        let listing = self.store.list_tags(tenant, &p.namespaces).await?;
        Ok(serde_json::to_value(listing)?)
    }

    pub async fn upsert_schema(&self, tenant: &str, p: UpsertSchemaParams) -> Result<serde_json::Value> {
        let entry = self
            .store
            .upsert_schema(tenant, p.scratch_id, &p.name, p.description, p.schema)
            .await?;
        Ok(json!({ "name": p.name, "entry": entry }))
    }

    pub async fn get_schema(&self, tenant: &str, p: GetSchemaParams) -> Result<serde_json::Value> {
        let entry = self.store.get_schema(tenant, p.scratch_id, &p.name).await?;
        Ok(json!({ "name": p.name, "entry": entry }))
    }

    pub async fn list_schemas(&self, tenant: &str, p: ListSchemasParams) -> Result<serde_json::Value> {
        let schemas = self.store.list_schemas(tenant, p.scratch_id).await?;
        Ok(json!({ "schemas": schemas }))
    }

    pub async fn namespace_list(&self, tenant: &str, _p: NamespaceListParams) -> Result<serde_json::Value> {
        let namespaces = self.store.list_namespaces(tenant).await?;
        Ok(json!({ "namespaces": namespaces }))
    }

    pub async fn namespace_create(&self, tenant: &str, p: NamespaceCreateParams) -> Result<serde_json::Value> {
        let row = self.store.create_namespace(tenant, &p.namespace).await?;
        Ok(json!({ "namespace": row }))
    }

    pub async fn namespace_rename(&self, tenant: &str, p: NamespaceRenameParams) -> Result<serde_json::Value> {
        let migrated = self
            .store
            .rename_namespace(tenant, &p.old_name, &p.new_name, p.migrate)
            .await?;
        Ok(json!({ "old_name": p.old_name, "new_name": p.new_name, "migrated_pads": migrated }))
    }

    pub async fn namespace_delete(&self, tenant: &str, p: NamespaceDeleteParams) -> Result<serde_json::Value> {
        let (deleted, migrated_or_deleted_pads) = self.store.delete_namespace(tenant, &p.namespace, p.cascade).await?;
        Ok(json!({
            "namespace": p.namespace,
            "deleted": deleted,
            "affected_pads": migrated_or_deleted_pads,
        }))
    }
}
