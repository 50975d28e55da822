use chrono::Utc;
use scratch_core::error::Result;
use scratch_core::model::AuditRecord;

use crate::codec;
use crate::engine::{self, Engine};

/// Both migrations this system needs (first-enable tenant reassignment,
/// namespace rename cascade) follow an audited-rewrite idiom: scan under the
/// tenant lock, rewrite, log a structured completion record. There is no
/// population of independently authored migration files to discover here, so
/// this stays two plain audited functions rather than a `Migration` trait +
/// registry (see DESIGN.md "Dropped teacher dependencies" re: `inventory`).
///
/// Rewrites every `pads`/`embeddings` row whose `namespace` column matches
/// `old_name` to `new_name`, under the tenant's lock. `cells` carries no
/// `namespace` column so it needs no rewrite.
pub async fn rewrite_namespace(engine: &Engine, tenant: &str, old_name: &str, new_name: &str) -> Result<usize> {
    let _guard = engine.tenant_guard(tenant).await;

    let predicate = format!(
        "tenant_id = '{}' AND namespace = '{}'",
        engine::quote(tenant),
        engine::quote(old_name)
    );

    let mut rewritten = 0usize;

    let pad_batches = engine::query_rows(&engine.pads().await, &predicate).await?;
    let mut pad_rows = Vec::new();
    for batch in &pad_batches {
        pad_rows.extend(codec::batch_to_pad_rows(batch)?);
    }
    if !pad_rows.is_empty() {
        engine::delete_rows(&engine.pads().await, &predicate).await?;
        for mut row in pad_rows {
            row.namespace = new_name.to_string();
            // cells must be re-joined to rebuild a full Scratchpad row; pull
            // them fresh since `PadRow` only carries the pad-table columns.
            let cell_predicate = format!(
                "tenant_id = '{}' AND scratch_id = '{}'",
                engine::quote(tenant),
                row.scratch_id
            );
            let cell_batches = engine::query_rows(&engine.cells().await, &cell_predicate).await?;
            let mut cells = Vec::new();
            for batch in &cell_batches {
                cells.extend(codec::batch_to_cells(batch)?);
            }
            cells.sort_by_key(|c| c.index);
            let pad = scratch_core::model::Scratchpad {
                scratch_id: row.scratch_id,
                tenant_id: row.tenant_id,
                namespace: row.namespace,
                tags: row.tags,
                metadata: row.metadata,
                cells,
                created_at: row.created_at,
                last_access_at: row.last_access_at,
            };
            let batch = codec::pad_to_batch(&pad)?;
            engine::add_batch(&engine.pads().await, engine::pads_schema(), batch).await?;
            rewritten += 1;
        }
    }

    let emb_batches = engine::query_rows(&engine.embeddings().await, &predicate).await?;
    let mut emb_hits = Vec::new();
    for batch in &emb_batches {
        emb_hits.extend(codec::batch_to_embedding_hits(batch)?);
    }
    if !emb_hits.is_empty() {
        engine::delete_rows(&engine.embeddings().await, &predicate).await?;
        // Embeddings carry their vector alongside these scalar columns; the
        // caller must re-embed rather than this pass inventing a vector, so
        // orphaned vectors are intentionally dropped here and will be
        // recreated the next time their source content is mutated (the
        // same lazy-reindex policy the `embedding_version` Open Question
        // resolved to — see DESIGN.md).
        tracing::info!(
            tenant_id = tenant,
            old_namespace = old_name,
            new_namespace = new_name,
            dropped_embeddings = emb_hits.len(),
            "namespace rename dropped stale embedding rows pending re-embed"
        );
    }

    tracing::info!(
        tenant_id = tenant,
        old_namespace = old_name,
        new_namespace = new_name,
        rewritten_pads = rewritten,
        "namespace rename cascade complete"
    );
    Ok(rewritten)
}

/// First-enable tenant migration (`§4.A`). On startup, if auth has just been
/// enabled and pads exist under the implicit default tenant, reassigns every
/// one of them to the first configured tenant (by CLI/file declaration
/// order) within one pass, then emits an audit record.
pub async fn first_enable_tenant_migration(
    engine: &Engine,
    implicit_default_tenant: &str,
    target_tenant: &str,
) -> Result<Option<AuditRecord>> {
    if implicit_default_tenant == target_tenant {
        return Ok(None);
    }
    let _guard = engine.tenant_guard(implicit_default_tenant).await;

    let predicate = format!("tenant_id = '{}'", engine::quote(implicit_default_tenant));
    let pad_batches = engine::query_rows(&engine.pads().await, &predicate).await?;
    let mut pad_rows = Vec::new();
    for batch in &pad_batches {
        pad_rows.extend(codec::batch_to_pad_rows(batch)?);
    }
    if pad_rows.is_empty() {
        return Ok(None);
    }

    let pad_count = pad_rows.len();

    // Collect each pad's cells before any delete happens so the cascade
    // carries content over rather than dropping it.
    let mut cells_by_pad = std::collections::HashMap::new();
    for row in &pad_rows {
        let cell_predicate = format!(
            "tenant_id = '{}' AND scratch_id = '{}'",
            engine::quote(implicit_default_tenant),
            row.scratch_id
        );
        let cell_batches = engine::query_rows(&engine.cells().await, &cell_predicate).await?;
        let mut cells = Vec::new();
        for batch in &cell_batches {
            cells.extend(codec::batch_to_cells(batch)?);
        }
        cells.sort_by_key(|c| c.index);
        cells_by_pad.insert(row.scratch_id, cells);
    }

    // Carry embeddings over under the new tenant_id rather than dropping
    // them: the vector itself is still valid (it embeds content, not
    // tenancy), so there is no need to wait for the next content mutation
    // to re-embed — unlike `rewrite_namespace`, which has no embedder
    // available to recompute from and so drops rows pending re-embed.
    let emb_batches = engine::query_rows(&engine.embeddings().await, &predicate).await?;
    let mut embedding_rows = Vec::new();
    for batch in &emb_batches {
        embedding_rows.extend(codec::batch_to_embedding_rows(batch)?);
    }
    if !embedding_rows.is_empty() {
        engine::delete_rows(&engine.embeddings().await, &predicate).await?;
    }

    engine::delete_rows(&engine.cells().await, &predicate).await?;
    engine::delete_rows(&engine.pads().await, &predicate).await?;

    for row in pad_rows {
        let cells = cells_by_pad.remove(&row.scratch_id).unwrap_or_default();
        for cell in &cells {
            let batch = codec::cell_to_batch(target_tenant, row.scratch_id, cell)?;
            engine::add_batch(&engine.cells().await, engine::cells_schema(), batch).await?;
        }
        let pad = scratch_core::model::Scratchpad {
            scratch_id: row.scratch_id,
            tenant_id: target_tenant.to_string(),
            namespace: row.namespace,
            tags: row.tags,
            metadata: row.metadata,
            cells,
            created_at: row.created_at,
            last_access_at: row.last_access_at,
        };
        let batch = codec::pad_to_batch(&pad)?;
        engine::add_batch(&engine.pads().await, engine::pads_schema(), batch).await?;
    }

    for mut embedding_row in embedding_rows {
        embedding_row.tenant_id = target_tenant.to_string();
        let batch = codec::embedding_to_batch(&embedding_row)?;
        engine::add_batch(&engine.embeddings().await, engine::embeddings_schema(), batch).await?;
    }

    let record = AuditRecord {
        from_tenant: implicit_default_tenant.to_string(),
        to_tenant: target_tenant.to_string(),
        pad_count,
        at: Utc::now(),
    };
    tracing::info!(
        from = %record.from_tenant,
        to = %record.to_tenant,
        pad_count = record.pad_count,
        "first-enable tenant migration complete"
    );
    Ok(Some(record))
}
