use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::Float32Array;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use scratch_core::embedder::Embedder;
use scratch_core::error::{Result, ServiceError};
use scratch_core::model::{Cell, Language, Scratchpad, SearchHit};
use uuid::Uuid;

use crate::codec::{self, EmbeddingRow};
use crate::engine::{self, Engine};
use crate::pads;

fn pad_metadata_text(pad: &Scratchpad) -> String {
    ["title", "description", "summary"]
        .iter()
        .filter_map(|key| pad.metadata.get(*key).and_then(|v| v.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Re-embeds a single cell and commits the vector into `embeddings` *within
/// the same logical operation* as the content mutation that triggered it
/// (`§4.E`: "commit their vector into `embeddings` within the same
/// transaction as the content change"). Callers invoke this while already
/// holding the tenant guard for the surrounding pad mutation.
pub async fn reembed_cell(
    engine: &Engine,
    embedder: &dyn Embedder,
    tenant: &str,
    scratch_id: Uuid,
    namespace: &str,
    cell: &Cell,
) -> Result<()> {
    let vector = embedder.embed(&cell.content).await?;
    let predicate = format!(
        "tenant_id = '{}' AND scratch_id = '{}' AND cell_id = '{}'",
        engine::quote(tenant),
        scratch_id,
        cell.cell_id
    );
    engine::delete_rows(&engine.embeddings().await, &predicate).await?;
    let row = EmbeddingRow {
        tenant_id: tenant.to_string(),
        scratch_id,
        cell_id: Some(cell.cell_id),
        namespace: namespace.to_string(),
        tags: cell.tags.clone(),
        language: cell.language,
        vector,
        embedding_version: embedder.model_id().to_string(),
        updated_at: Utc::now(),
    };
    let batch = codec::embedding_to_batch(&row)?;
    engine::add_batch(&engine.embeddings().await, engine::embeddings_schema(), batch).await
}

/// Re-embeds the pad-level metadata text (`title`/`description`/`summary`)
/// as a `cell_id = NULL` row, so metadata-only edits stay searchable too.
pub async fn reembed_pad_metadata(engine: &Engine, embedder: &dyn Embedder, pad: &Scratchpad) -> Result<()> {
    let text = pad_metadata_text(pad);
    let predicate = format!(
        "tenant_id = '{}' AND scratch_id = '{}' AND cell_id IS NULL",
        engine::quote(&pad.tenant_id),
        pad.scratch_id
    );
    engine::delete_rows(&engine.embeddings().await, &predicate).await?;
    if text.trim().is_empty() {
        return Ok(());
    }
    let vector = embedder.embed(&text).await?;
    let row = EmbeddingRow {
        tenant_id: pad.tenant_id.clone(),
        scratch_id: pad.scratch_id,
        cell_id: None,
        namespace: pad.namespace.clone(),
        tags: pad.tags.clone(),
        language: Language::Unknown,
        vector,
        embedding_version: embedder.model_id().to_string(),
        updated_at: Utc::now(),
    };
    let batch = codec::embedding_to_batch(&row)?;
    engine::add_batch(&engine.embeddings().await, engine::embeddings_schema(), batch).await
}

/// Re-embeds every cell of a pad plus its metadata — used after
/// whole-pad rewrites (`create`/reset) where recomputing per-cell is
/// simplest.
pub async fn reembed_pad(engine: &Engine, embedder: &dyn Embedder, pad: &Scratchpad) -> Result<()> {
    let predicate = format!(
        "tenant_id = '{}' AND scratch_id = '{}'",
        engine::quote(&pad.tenant_id),
        pad.scratch_id
    );
    engine::delete_rows(&engine.embeddings().await, &predicate).await?;
    for cell in &pad.cells {
        reembed_cell(engine, embedder, &pad.tenant_id, pad.scratch_id, &pad.namespace, cell).await?;
    }
    reembed_pad_metadata(engine, embedder, pad).await
}

/// `scratch_search` (`§4.E`). Pushes `tenant_id`/`namespace`/`tags`
/// predicates into the vector query's pre-filter *before* `nearest_to(..).
/// limit(k)` truncates, so filtered-out rows never starve the result set
/// (`§8` scenario 6). Ties in similarity break by ascending
/// `(scratch_id, cell_id)` for stable repeat-query ordering.
pub async fn search(
    engine: &Engine,
    embedder: &dyn Embedder,
    tenant: &str,
    query_text: &str,
    namespaces: &[String],
    tags: &[String],
    limit: usize,
) -> Result<Vec<SearchHit>> {
    if query_text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let vector = embedder.embed(query_text).await?;

    let mut predicate = format!("tenant_id = '{}'", engine::quote(tenant));
    if let Some(frag) = engine::namespace_predicate_fragment(namespaces) {
        predicate.push_str(" AND ");
        predicate.push_str(&frag);
    }
    if let Some(frag) = engine::tag_predicate_fragment(tags) {
        predicate.push_str(" AND ");
        predicate.push_str(&frag);
    }

    let table = engine.embeddings().await;
    let mut stream = table
        .query()
        .only_if(predicate.as_str())
        .nearest_to(vector)
        .map_err(|e| ServiceError::Internal(format!("vector query build failed: {e}")))?
        .limit(limit)
        .execute()
        .await
        .map_err(|e| ServiceError::Internal(format!("vector query failed: {e}")))?;

    let mut raw = Vec::new();
    while let Some(batch) = stream
        .try_next()
        .await
        .map_err(|e| ServiceError::Internal(format!("vector query stream failed: {e}")))?
    {
        let hits = codec::batch_to_embedding_hits(&batch)?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .map(|arr| arr.values().to_vec())
            .unwrap_or_else(|| vec![0.0; hits.len()]);
        for (hit, distance) in hits.into_iter().zip(distances) {
            raw.push((hit, distance));
        }
    }

    let mut pad_cache: HashMap<Uuid, Scratchpad> = HashMap::new();
    let mut out = Vec::with_capacity(raw.len());
    for (hit, distance) in raw {
        if !pad_cache.contains_key(&hit.scratch_id) {
            if let Some(pad) = pads::load_pad(engine, tenant, hit.scratch_id).await? {
                pad_cache.insert(hit.scratch_id, pad);
            }
        }
        let snippet = pad_cache
            .get(&hit.scratch_id)
            .map(|pad| snippet_for(pad, hit.cell_id))
            .unwrap_or_default();

        out.push(SearchHit {
            scratch_id: hit.scratch_id,
            cell_id: hit.cell_id,
            tenant_id: hit.tenant_id,
            namespace: hit.namespace,
            tags: hit.tags,
            score: 1.0 - (distance / 2.0).clamp(0.0, 1.0),
            snippet,
            embedding_version: hit.embedding_version,
        });
    }

    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.scratch_id.cmp(&b.scratch_id))
            .then(a.cell_id.cmp(&b.cell_id))
    });
    out.truncate(limit);
    Ok(out)
}

fn snippet_for(pad: &Scratchpad, cell_id: Option<Uuid>) -> String {
    const MAX_LEN: usize = 160;
    let text = match cell_id {
        Some(id) => pad
            .cells
            .iter()
            .find(|c| c.cell_id == id)
            .map(|c| c.content.clone())
            .unwrap_or_default(),
        None => pad_metadata_text(pad),
    };
    truncate_chars(&text, MAX_LEN)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}...")
}
