pub mod codec;
pub mod engine;
pub mod lifecycle;
pub mod migrate;
pub mod namespace;
pub mod pads;
pub mod schema;
pub mod search;
pub mod tags;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use scratch_core::embedder::Embedder;
use scratch_core::error::{Result, ServiceError};
use scratch_core::model::{
    Cell, CellDraft, CellLean, EvictionPolicy, NamespaceRow, PadSummary, SchemaEntry, Scratchpad,
    ScratchpadLean, SearchHit, TagListing, ValidationResult, DEFAULT_NAMESPACE,
};
use scratch_core::validator::Validator;
use uuid::Uuid;

pub use engine::Engine;

/// The policy knobs `Store` enforces, lifted out of `scratch_core::Config` so
/// this crate does not need to depend on every unrelated config field (the
/// transport/auth settings belong to `scratch-server`).
pub struct StoreConfig {
    pub max_scratchpads: u64,
    pub max_cells_per_pad: u64,
    pub max_cell_bytes: u64,
    pub eviction_policy: EvictionPolicy,
    pub validation_request_timeout: Duration,
    pub enable_semantic_search: bool,
}

/// The result of `scratch_create`: the lightweight pad, any validation
/// results for cells created with `validate: true`, and the ids of pads
/// evicted to make room under a `discard` policy.
pub struct CreateOutcome {
    pub pad: ScratchpadLean,
    pub validation_results: Vec<ValidationResult>,
    pub evicted_scratchpads: Vec<Uuid>,
}

/// The single entry point `scratch-server`'s tool handlers call. Ties the
/// Lance-backed `Engine` together with an injected `Embedder`/`Validator`,
/// handing every operation the same bundle of already-constructed shared
/// services rather than letting each one reach for globals.
pub struct Store {
    engine: Arc<Engine>,
    embedder: Arc<dyn Embedder>,
    validator: Arc<dyn Validator>,
    cfg: StoreConfig,
}

impl Store {
    pub fn new(engine: Arc<Engine>, embedder: Arc<dyn Embedder>, validator: Arc<dyn Validator>, cfg: StoreConfig) -> Self {
        Store {
            engine,
            embedder,
            validator,
            cfg,
        }
    }

    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }

    /// Validates `cells` against `schemas`, bounded by
    /// `validation_request_timeout` across the whole batch (`§4.C`). Cells
    /// with `validate: false` are skipped entirely — they never reach the
    /// validator, so a slow or buggy validator for one dialect cannot delay a
    /// write that did not ask for validation.
    async fn validate_requested(&self, cells: &[Cell], schemas: &BTreeMap<String, SchemaEntry>) -> Result<Vec<ValidationResult>> {
        let requested: Vec<&Cell> = cells.iter().filter(|c| c.validate).collect();
        if requested.is_empty() {
            return Ok(Vec::new());
        }
        let validator = self.validator.clone();
        let fut = async {
            let mut out = Vec::with_capacity(requested.len());
            for cell in requested {
                out.push(validator.validate(cell, schemas).await);
            }
            out
        };
        tokio::time::timeout(self.cfg.validation_request_timeout, fut)
            .await
            .map_err(|_| ServiceError::ValidationTimeout)
    }

    /// Validates `cells` unconditionally, ignoring each cell's own
    /// `validate` flag — the explicit `scratch_validate` tool asks for every
    /// selected cell to be checked regardless of how it was written.
    async fn validate_all(&self, cells: &[Cell], schemas: &BTreeMap<String, SchemaEntry>) -> Result<Vec<ValidationResult>> {
        let validator = self.validator.clone();
        let fut = async {
            let mut out = Vec::with_capacity(cells.len());
            for cell in cells {
                out.push(validator.validate(cell, schemas).await);
            }
            out
        };
        tokio::time::timeout(self.cfg.validation_request_timeout, fut)
            .await
            .map_err(|_| ServiceError::ValidationTimeout)
    }

    /// `scratch_create` (`§4.B`/`§4.D`). Existing ids are reset in place
    /// (Open Question resolution, see DESIGN.md): tenant/namespace membership
    /// is preserved and only cells/metadata/tags are replaced. New ids go
    /// through capacity enforcement first.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        tenant: &str,
        scratch_id: Option<Uuid>,
        namespace: Option<String>,
        tags: BTreeSet<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
        cell_drafts: Vec<CellDraft>,
    ) -> Result<CreateOutcome> {
        let scratch_id = scratch_id.unwrap_or_else(Uuid::new_v4);
        let _guard = self.engine.tenant_guard(tenant).await;

        let existing = pads::load_pad(&self.engine, tenant, scratch_id).await?;
        let mut evicted_scratchpads = Vec::new();

        let pad = if let Some(_existing) = existing {
            pads::reset_pad(
                &self.engine,
                tenant,
                scratch_id,
                tags,
                metadata,
                cell_drafts,
                self.cfg.max_cell_bytes,
                self.cfg.max_cells_per_pad,
            )
            .await?
        } else {
            match lifecycle::enforce_on_create(&self.engine, tenant, self.cfg.eviction_policy, self.cfg.max_scratchpads).await? {
                lifecycle::CapacityOutcome::Reject => return Err(ServiceError::CapacityLimitReached),
                lifecycle::CapacityOutcome::ProceedWithEvictions(victims) => {
                    lifecycle::evict(&self.engine, tenant, &victims).await?;
                    evicted_scratchpads = victims;
                }
                lifecycle::CapacityOutcome::Proceed => {}
            }
            pads::insert_pad(
                &self.engine,
                tenant,
                scratch_id,
                namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
                tags,
                metadata,
                cell_drafts,
                self.cfg.max_cell_bytes,
                self.cfg.max_cells_per_pad,
            )
            .await?
        };

        let validation_results = self.validate_requested(&pad.cells, &pad.schemas()).await?;
        if self.cfg.enable_semantic_search {
            search::reembed_pad(&self.engine, self.embedder.as_ref(), &pad).await?;
        }

        Ok(CreateOutcome {
            pad: ScratchpadLean::from(&pad),
            validation_results,
            evicted_scratchpads,
        })
    }

    /// `scratch_read` (`§4.B`): the full pad, content included.
    pub async fn read(
        &self,
        tenant: &str,
        scratch_id: Uuid,
        cell_ids: Option<&[Uuid]>,
        tags: Option<&[String]>,
        namespaces: Option<&[String]>,
    ) -> Result<Scratchpad> {
        pads::read_pad(&self.engine, tenant, scratch_id, cell_ids, tags, namespaces).await
    }

    /// `scratch_list` (`§4.B`): lean rows, no cells.
    pub async fn list(&self, tenant: &str, namespaces: &[String], tags: &[String], limit: Option<usize>) -> Result<Vec<PadSummary>> {
        pads::list_pads(&self.engine, tenant, namespaces, tags, limit).await
    }

    /// `scratch_list_cells` (`§4.B`): lightweight cell rows, no content.
    pub async fn list_cells(
        &self,
        tenant: &str,
        scratch_id: Uuid,
        cell_ids: Option<&[Uuid]>,
        tags: Option<&[String]>,
    ) -> Result<Vec<CellLean>> {
        let cells = pads::list_cells(&self.engine, tenant, scratch_id, cell_ids, tags).await?;
        Ok(cells.iter().map(CellLean::from).collect())
    }

    /// `scratch_append_cell` (`§4.B`). Validates and re-embeds the new cell
    /// in the same logical step as the write (`§4.E`).
    pub async fn append_cell(
        &self,
        tenant: &str,
        scratch_id: Uuid,
        draft: CellDraft,
    ) -> Result<(ScratchpadLean, Option<ValidationResult>)> {
        let _guard = self.engine.tenant_guard(tenant).await;
        let (pad, new_cell) = pads::append_cell(
            &self.engine,
            tenant,
            scratch_id,
            draft,
            self.cfg.max_cell_bytes,
            self.cfg.max_cells_per_pad,
        )
        .await?;

        let validation_result = self.validate_requested(std::slice::from_ref(&new_cell), &pad.schemas()).await?.into_iter().next();
        if self.cfg.enable_semantic_search {
            search::reembed_cell(&self.engine, self.embedder.as_ref(), tenant, scratch_id, &pad.namespace, &new_cell).await?;
        }
        Ok((ScratchpadLean::from(&pad), validation_result))
    }

    /// `scratch_replace_cell` (`§4.B`). Reorders via `new_index` (`§4.B`
    /// "Reorder semantics") before re-validating/re-embedding the replaced
    /// cell at its new position.
    pub async fn replace_cell(
        &self,
        tenant: &str,
        scratch_id: Uuid,
        cell_id: Uuid,
        draft: CellDraft,
        new_index: Option<u32>,
    ) -> Result<(ScratchpadLean, Option<ValidationResult>)> {
        let _guard = self.engine.tenant_guard(tenant).await;
        let (pad, replaced) = pads::replace_cell(&self.engine, tenant, scratch_id, cell_id, draft, new_index, self.cfg.max_cell_bytes).await?;

        let validation_result = self.validate_requested(std::slice::from_ref(&replaced), &pad.schemas()).await?.into_iter().next();
        if self.cfg.enable_semantic_search {
            pads::delete_cell_embeddings(&self.engine, tenant, scratch_id, cell_id).await?;
            search::reembed_cell(&self.engine, self.embedder.as_ref(), tenant, scratch_id, &pad.namespace, &replaced).await?;
        }
        Ok((ScratchpadLean::from(&pad), validation_result))
    }

    /// `scratch_delete` (`§4.B`). Idempotent.
    pub async fn delete(&self, tenant: &str, scratch_id: Uuid) -> Result<bool> {
        let _guard = self.engine.tenant_guard(tenant).await;
        pads::delete_pad(&self.engine, tenant, scratch_id).await
    }

    /// `scratch_validate` (`§4.C`): validates every selected cell
    /// unconditionally, independent of its stored `validate` flag.
    pub async fn validate(&self, tenant: &str, scratch_id: Uuid, cell_ids: Option<&[Uuid]>) -> Result<Vec<ValidationResult>> {
        let pad = pads::load_pad(&self.engine, tenant, scratch_id).await?.ok_or(ServiceError::NotFound)?;
        let cells: Vec<Cell> = match cell_ids {
            Some(ids) => {
                let id_set: BTreeSet<Uuid> = ids.iter().copied().collect();
                pad.cells.iter().filter(|c| id_set.contains(&c.cell_id)).cloned().collect()
            }
            None => pad.cells.clone(),
        };
        self.validate_all(&cells, &pad.schemas()).await
    }

    /// `scratch_search` (`§4.E`). Returns an empty hit list when semantic
    /// search is disabled rather than erroring (`§3`: writes still persist,
    /// just without vector rows).
    pub async fn search(&self, tenant: &str, query: &str, namespaces: &[String], tags: &[String], limit: usize) -> Result<Vec<SearchHit>> {
        if !self.cfg.enable_semantic_search {
            return Ok(Vec::new());
        }
        search::search(&self.engine, self.embedder.as_ref(), tenant, query, namespaces, tags, limit).await
    }

    pub fn embedding_model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// `scratch_list_tags` (`§4.B`).
    pub async fn list_tags(&self, tenant: &str, namespaces: &[String]) -> Result<TagListing> {
        tags::list_tags(&self.engine, tenant, namespaces).await
    }

    pub async fn upsert_schema(
        &self,
        tenant: &str,
        scratch_id: Uuid,
        name: &str,
        description: String,
        schema_value: serde_json::Value,
    ) -> Result<SchemaEntry> {
        let _guard = self.engine.tenant_guard(tenant).await;
        schema::upsert_schema(&self.engine, tenant, scratch_id, name, description, schema_value).await
    }

    pub async fn get_schema(&self, tenant: &str, scratch_id: Uuid, name: &str) -> Result<SchemaEntry> {
        schema::get_schema(&self.engine, tenant, scratch_id, name).await
    }

    pub async fn list_schemas(&self, tenant: &str, scratch_id: Uuid) -> Result<BTreeMap<String, SchemaEntry>> {
        schema::list_schemas(&self.engine, tenant, scratch_id).await
    }

    pub async fn list_namespaces(&self, tenant: &str) -> Result<Vec<NamespaceRow>> {
        namespace::list_namespaces(&self.engine, tenant).await
    }

    pub async fn create_namespace(&self, tenant: &str, name: &str) -> Result<NamespaceRow> {
        let _guard = self.engine.tenant_guard(tenant).await;
        namespace::create_namespace(&self.engine, tenant, name).await
    }

    pub async fn delete_namespace(&self, tenant: &str, name: &str, cascade: bool) -> Result<(bool, usize)> {
        let _guard = self.engine.tenant_guard(tenant).await;
        namespace::delete_namespace(&self.engine, tenant, name, cascade).await
    }

    pub async fn rename_namespace(&self, tenant: &str, old_name: &str, new_name: &str, migrate: bool) -> Result<usize> {
        let _guard = self.engine.tenant_guard(tenant).await;
        namespace::rename_namespace(&self.engine, tenant, old_name, new_name, migrate).await
    }

    /// Runs the first-enable tenant migration (`§4.A`) once at startup.
    /// `scratch-server::main` calls this before accepting any requests.
    pub async fn run_first_enable_migration(&self, implicit_default_tenant: &str, target_tenant: &str) -> Result<Option<scratch_core::model::AuditRecord>> {
        migrate::first_enable_tenant_migration(&self.engine, implicit_default_tenant, target_tenant).await
    }
}
