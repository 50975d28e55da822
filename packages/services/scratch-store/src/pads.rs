use std::collections::BTreeSet;

use chrono::Utc;
use scratch_core::error::{Result, ServiceError};
use scratch_core::model::{Cell, CellDraft, PadSummary, Scratchpad, ScratchpadLean};
use uuid::Uuid;

use crate::codec;
use crate::engine::{self, Engine};

/// `(tenant_id, scratch_id)` predicate shared by every single-pad operation.
fn pad_predicate(tenant: &str, scratch_id: Uuid) -> String {
    format!(
        "tenant_id = '{}' AND scratch_id = '{}'",
        engine::quote(tenant),
        scratch_id
    )
}

/// Loads the full pad (row + all its cells, index-sorted) or `None` if it
/// does not exist under this tenant. Cross-tenant pads are indistinguishable
/// from absence by construction: the predicate always includes `tenant_id`.
pub async fn load_pad(engine: &Engine, tenant: &str, scratch_id: Uuid) -> Result<Option<Scratchpad>> {
    let pad_batches = engine::query_rows(&engine.pads().await, &pad_predicate(tenant, scratch_id)).await?;
    let mut pad_rows = Vec::new();
    for batch in &pad_batches {
        pad_rows.extend(codec::batch_to_pad_rows(batch)?);
    }
    let Some(row) = pad_rows.into_iter().next() else {
        return Ok(None);
    };

    let cell_batches = engine::query_rows(&engine.cells().await, &pad_predicate(tenant, scratch_id)).await?;
    let mut cells = Vec::new();
    for batch in &cell_batches {
        cells.extend(codec::batch_to_cells(batch)?);
    }
    cells.sort_by_key(|c| c.index);

    Ok(Some(Scratchpad {
        scratch_id: row.scratch_id,
        tenant_id: row.tenant_id,
        namespace: row.namespace,
        tags: row.tags,
        metadata: row.metadata,
        cells,
        created_at: row.created_at,
        last_access_at: row.last_access_at,
    }))
}

/// Rewrites the pad row (Lance has no in-place column update; mutation is
/// modeled as delete-then-reinsert under the tenant's lock, matching the
/// migration cascade's rewrite idiom — see DESIGN.md "Cross-table
/// transaction").
async fn rewrite_pad_row(engine: &Engine, pad: &Scratchpad) -> Result<()> {
    engine::delete_rows(&engine.pads().await, &pad_predicate(&pad.tenant_id, pad.scratch_id)).await?;
    let batch = codec::pad_to_batch(pad)?;
    engine::add_batch(&engine.pads().await, engine::pads_schema(), batch).await
}

async fn rewrite_cells(engine: &Engine, tenant: &str, scratch_id: Uuid, cells: &[Cell]) -> Result<()> {
    engine::delete_rows(&engine.cells().await, &pad_predicate(tenant, scratch_id)).await?;
    for cell in cells {
        let batch = codec::cell_to_batch(tenant, scratch_id, cell)?;
        engine::add_batch(&engine.cells().await, engine::cells_schema(), batch).await?;
    }
    Ok(())
}

async fn delete_embeddings_for_pad(engine: &Engine, tenant: &str, scratch_id: Uuid) -> Result<()> {
    engine::delete_rows(&engine.embeddings().await, &pad_predicate(tenant, scratch_id)).await
}

async fn delete_embeddings_for_cell(engine: &Engine, tenant: &str, scratch_id: Uuid, cell_id: Uuid) -> Result<()> {
    let predicate = format!(
        "tenant_id = '{}' AND scratch_id = '{}' AND cell_id = '{}'",
        engine::quote(tenant),
        scratch_id,
        cell_id
    );
    engine::delete_rows(&engine.embeddings().await, &predicate).await
}

pub fn enforce_cell_size(content: &str, max_cell_bytes: u64) -> Result<()> {
    if max_cell_bytes == 0 {
        return Ok(());
    }
    if content.as_bytes().len() as u64 > max_cell_bytes {
        return Err(ServiceError::CapacityLimitReached);
    }
    Ok(())
}

fn enforce_cell_count(current: usize, max_cells_per_pad: u64) -> Result<()> {
    if max_cells_per_pad == 0 {
        return Ok(());
    }
    if current as u64 >= max_cells_per_pad {
        return Err(ServiceError::CapacityLimitReached);
    }
    Ok(())
}

/// `create_pad` (`§4.B`). Capacity/eviction decisions are made by the
/// caller (`crate::Store`, which owns the lifecycle policy); this function
/// only performs the write once the caller has decided it may proceed and
/// has resolved which ids (if any) must be evicted first.
pub async fn insert_pad(
    engine: &Engine,
    tenant: &str,
    scratch_id: Uuid,
    namespace: String,
    tags: BTreeSet<String>,
    metadata: serde_json::Map<String, serde_json::Value>,
    cell_drafts: Vec<CellDraft>,
    max_cell_bytes: u64,
    max_cells_per_pad: u64,
) -> Result<Scratchpad> {
    if load_pad(engine, tenant, scratch_id).await?.is_some() {
        return Err(ServiceError::InvalidId(format!(
            "scratchpad {scratch_id} already exists"
        )));
    }
    if max_cells_per_pad != 0 && cell_drafts.len() as u64 > max_cells_per_pad {
        return Err(ServiceError::CapacityLimitReached);
    }
    for draft in &cell_drafts {
        enforce_cell_size(&draft.content, max_cell_bytes)?;
    }

    let now = Utc::now();
    let cells: Vec<Cell> = cell_drafts
        .into_iter()
        .enumerate()
        .map(|(i, draft)| draft.into_cell(Uuid::new_v4(), i as u32))
        .collect();

    let pad = Scratchpad {
        scratch_id,
        tenant_id: tenant.to_string(),
        namespace,
        tags,
        metadata,
        cells,
        created_at: now,
        last_access_at: now,
    };

    rewrite_cells(engine, tenant, scratch_id, &pad.cells).await?;
    rewrite_pad_row(engine, &pad).await?;
    Ok(pad)
}

/// Reset-in-place semantics for `scratch_create` on an existing id (Open
/// Question resolution, see DESIGN.md): tenant/namespace membership is
/// preserved; only `cells`/`metadata`/`tags` are replaced.
pub async fn reset_pad(
    engine: &Engine,
    tenant: &str,
    scratch_id: Uuid,
    tags: BTreeSet<String>,
    metadata: serde_json::Map<String, serde_json::Value>,
    cell_drafts: Vec<CellDraft>,
    max_cell_bytes: u64,
    max_cells_per_pad: u64,
) -> Result<Scratchpad> {
    let existing = load_pad(engine, tenant, scratch_id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if max_cells_per_pad != 0 && cell_drafts.len() as u64 > max_cells_per_pad {
        return Err(ServiceError::CapacityLimitReached);
    }
    for draft in &cell_drafts {
        enforce_cell_size(&draft.content, max_cell_bytes)?;
    }

    let now = Utc::now();
    let cells: Vec<Cell> = cell_drafts
        .into_iter()
        .enumerate()
        .map(|(i, draft)| draft.into_cell(Uuid::new_v4(), i as u32))
        .collect();

    let pad = Scratchpad {
        scratch_id,
        tenant_id: existing.tenant_id,
        namespace: existing.namespace,
        tags,
        metadata,
        cells,
        created_at: existing.created_at,
        last_access_at: now,
    };

    delete_embeddings_for_pad(engine, tenant, scratch_id).await?;
    rewrite_cells(engine, tenant, scratch_id, &pad.cells).await?;
    rewrite_pad_row(engine, &pad).await?;
    Ok(pad)
}

/// `read_pad` (`§4.B`). Applies `cell_ids`/`tags` as an intersection when
/// both are given, touches `last_access_at`, and returns `CONFLICT` when the
/// caller constrained `namespaces` and the pad does not belong to one of
/// them (never `NOT_FOUND`, since the pad *was* found).
pub async fn read_pad(
    engine: &Engine,
    tenant: &str,
    scratch_id: Uuid,
    cell_ids: Option<&[Uuid]>,
    tags: Option<&[String]>,
    namespaces: Option<&[String]>,
) -> Result<Scratchpad> {
    let mut pad = load_pad(engine, tenant, scratch_id).await?.ok_or(ServiceError::NotFound)?;

    if let Some(allowed_namespaces) = namespaces {
        if !allowed_namespaces.is_empty() && !allowed_namespaces.contains(&pad.namespace) {
            return Err(ServiceError::Conflict(format!(
                "scratchpad does not belong to namespaces {allowed_namespaces:?}"
            )));
        }
    }

    if let Some(ids) = cell_ids {
        let id_set: BTreeSet<Uuid> = ids.iter().copied().collect();
        pad.cells.retain(|c| id_set.contains(&c.cell_id));
    }
    if let Some(tag_filter) = tags {
        if !tag_filter.is_empty() {
            let wanted: BTreeSet<&str> = tag_filter.iter().map(String::as_str).collect();
            pad.cells.retain(|c| c.tags.iter().any(|t| wanted.contains(t.as_str())));
        }
    }

    touch_last_access(engine, &mut pad).await?;
    Ok(pad)
}

/// Updates `last_access_at` and persists it (invariant 5/6: monotonic,
/// updated on every read and write). Mutates `pad.last_access_at` in place
/// so callers can hand the fresh value back to their own response.
pub async fn touch_last_access(engine: &Engine, pad: &mut Scratchpad) -> Result<()> {
    let now = Utc::now();
    if now > pad.last_access_at {
        pad.last_access_at = now;
    }
    rewrite_pad_row(engine, pad).await
}

/// `list_pads` (`§4.B`). Namespace/tag predicates are pushed into the store
/// scan rather than filtered after a full in-memory load — the scan reads
/// only the `pads` table (no cell content), matching the "lean rows" result
/// shape.
pub async fn list_pads(
    engine: &Engine,
    tenant: &str,
    namespaces: &[String],
    tags: &[String],
    limit: Option<usize>,
) -> Result<Vec<PadSummary>> {
    let mut predicate = format!("tenant_id = '{}'", engine::quote(tenant));
    if let Some(frag) = engine::namespace_predicate_fragment(namespaces) {
        predicate.push_str(" AND ");
        predicate.push_str(&frag);
    }
    if let Some(frag) = engine::tag_predicate_fragment(tags) {
        predicate.push_str(" AND ");
        predicate.push_str(&frag);
    }
    let batches = engine::query_rows(&engine.pads().await, &predicate).await?;
    let mut rows = Vec::new();
    for batch in &batches {
        rows.extend(codec::batch_to_pad_rows(batch)?);
    }

    let cell_counts = cell_counts_by_pad(engine, tenant).await?;

    let mut summaries: Vec<PadSummary> = rows
        .into_iter()
        .map(|r| {
            let title = r
                .metadata
                .get("title")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let description = r
                .metadata
                .get("description")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            PadSummary {
                scratch_id: r.scratch_id,
                title,
                description,
                namespace: r.namespace,
                cell_count: cell_counts.get(&r.scratch_id).copied().unwrap_or(0),
            }
        })
        .collect();

    summaries.sort_by_key(|s| s.scratch_id);
    if let Some(limit) = limit {
        summaries.truncate(limit);
    }
    Ok(summaries)
}

async fn cell_counts_by_pad(engine: &Engine, tenant: &str) -> Result<std::collections::HashMap<Uuid, usize>> {
    let predicate = format!("tenant_id = '{}'", engine::quote(tenant));
    let batches = engine::query_rows(&engine.cells().await, &predicate).await?;
    let mut counts = std::collections::HashMap::new();
    for batch in &batches {
        let scratch_col = engine::string_col(batch, "scratch_id")
            .ok_or_else(|| ServiceError::Internal("missing scratch_id column".into()))?;
        for i in 0..batch.num_rows() {
            let id = Uuid::parse_str(scratch_col.value(i))
                .map_err(|e| ServiceError::Internal(format!("bad scratch_id: {e}")))?;
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

/// `list_cells` (`§4.B`): lightweight cell rows, no content.
pub async fn list_cells(
    engine: &Engine,
    tenant: &str,
    scratch_id: Uuid,
    cell_ids: Option<&[Uuid]>,
    tags: Option<&[String]>,
) -> Result<Vec<Cell>> {
    let pad = load_pad(engine, tenant, scratch_id).await?.ok_or(ServiceError::NotFound)?;
    let mut cells = pad.cells;
    if let Some(ids) = cell_ids {
        let id_set: BTreeSet<Uuid> = ids.iter().copied().collect();
        cells.retain(|c| id_set.contains(&c.cell_id));
    }
    if let Some(tag_filter) = tags {
        if !tag_filter.is_empty() {
            let wanted: BTreeSet<&str> = tag_filter.iter().map(String::as_str).collect();
            cells.retain(|c| c.tags.iter().any(|t| wanted.contains(t.as_str())));
        }
    }
    Ok(cells)
}

/// `append_cell` (`§4.B`). Enforces `max_cells_per_pad`/`max_cell_bytes`
/// before mutating anything (atomicity: a rejected write leaves the store
/// byte-identical to its pre-call state).
pub async fn append_cell(
    engine: &Engine,
    tenant: &str,
    scratch_id: Uuid,
    draft: CellDraft,
    max_cell_bytes: u64,
    max_cells_per_pad: u64,
) -> Result<(Scratchpad, Cell)> {
    let mut pad = load_pad(engine, tenant, scratch_id).await?.ok_or(ServiceError::NotFound)?;
    enforce_cell_size(&draft.content, max_cell_bytes)?;
    enforce_cell_count(pad.cells.len(), max_cells_per_pad)?;

    let new_cell = draft.into_cell(Uuid::new_v4(), pad.cells.len() as u32);
    pad.cells.push(new_cell.clone());
    pad.last_access_at = Utc::now();

    rewrite_cells(engine, tenant, scratch_id, &pad.cells).await?;
    rewrite_pad_row(engine, &pad).await?;
    Ok((pad, new_cell))
}

/// `replace_cell` (`§4.B`). When `new_index` is given, the cell is removed
/// from its current position and reinserted there; every other cell keeps
/// relative order and indices are renumbered to stay contiguous (`§4.B`
/// "Reorder semantics").
pub async fn replace_cell(
    engine: &Engine,
    tenant: &str,
    scratch_id: Uuid,
    cell_id: Uuid,
    draft: CellDraft,
    new_index: Option<u32>,
    max_cell_bytes: u64,
) -> Result<(Scratchpad, Cell)> {
    let mut pad = load_pad(engine, tenant, scratch_id).await?.ok_or(ServiceError::NotFound)?;
    enforce_cell_size(&draft.content, max_cell_bytes)?;

    let current_pos = pad
        .cells
        .iter()
        .position(|c| c.cell_id == cell_id)
        .ok_or_else(|| ServiceError::InvalidId(format!("no such cell: {cell_id}")))?;

    let replaced = draft.into_cell(cell_id, pad.cells[current_pos].index);
    pad.cells.remove(current_pos);

    let insert_pos = match new_index {
        Some(idx) => (idx as usize).min(pad.cells.len()),
        None => current_pos.min(pad.cells.len()),
    };
    pad.cells.insert(insert_pos, replaced.clone());

    for (i, cell) in pad.cells.iter_mut().enumerate() {
        cell.index = i as u32;
    }
    let replaced = pad.cells[insert_pos].clone();
    pad.last_access_at = Utc::now();

    rewrite_cells(engine, tenant, scratch_id, &pad.cells).await?;
    rewrite_pad_row(engine, &pad).await?;
    Ok((pad, replaced))
}

/// `delete_pad` (`§4.B`). Idempotent: deleting twice returns `deleted: false`
/// on the second call rather than erroring. Cascades cells and embeddings in
/// the same logical operation (invariant 4: no orphaned embeddings).
pub async fn delete_pad(engine: &Engine, tenant: &str, scratch_id: Uuid) -> Result<bool> {
    if load_pad(engine, tenant, scratch_id).await?.is_none() {
        return Ok(false);
    }
    engine::delete_rows(&engine.pads().await, &pad_predicate(tenant, scratch_id)).await?;
    engine::delete_rows(&engine.cells().await, &pad_predicate(tenant, scratch_id)).await?;
    delete_embeddings_for_pad(engine, tenant, scratch_id).await?;
    Ok(true)
}

pub async fn delete_cell_embeddings(engine: &Engine, tenant: &str, scratch_id: Uuid, cell_id: Uuid) -> Result<()> {
    delete_embeddings_for_cell(engine, tenant, scratch_id, cell_id).await
}
