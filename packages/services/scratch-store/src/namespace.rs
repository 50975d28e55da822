use chrono::Utc;
use scratch_core::error::{Result, ServiceError};
use scratch_core::model::NamespaceRow;

use crate::codec;
use crate::engine::{self, Engine};
use crate::pads;

fn ns_predicate(tenant: &str, namespace: &str) -> String {
    format!(
        "tenant_id = '{}' AND namespace = '{}'",
        engine::quote(tenant),
        engine::quote(namespace)
    )
}

pub async fn list_namespaces(engine: &Engine, tenant: &str) -> Result<Vec<NamespaceRow>> {
    let predicate = format!("tenant_id = '{}'", engine::quote(tenant));
    let batches = engine::query_rows(&engine.namespaces().await, &predicate).await?;
    let mut rows = Vec::new();
    for batch in &batches {
        rows.extend(codec::batch_to_namespaces(batch)?);
    }
    rows.sort_by(|a, b| a.namespace.cmp(&b.namespace));
    Ok(rows)
}

/// Creates a namespace registry row so it lists even with zero pads (`§3`:
/// "a registry row so it may exist without pads"). `CONFLICT` if it already
/// exists.
pub async fn create_namespace(engine: &Engine, tenant: &str, namespace: &str) -> Result<NamespaceRow> {
    let existing = engine::query_rows(&engine.namespaces().await, &ns_predicate(tenant, namespace)).await?;
    if existing.iter().any(|b| b.num_rows() > 0) {
        return Err(ServiceError::Conflict(format!("namespace already exists: {namespace}")));
    }
    let row = NamespaceRow {
        tenant_id: tenant.to_string(),
        namespace: namespace.to_string(),
        created_at: Utc::now(),
    };
    let batch = codec::namespace_to_batch(&row)?;
    engine::add_batch(&engine.namespaces().await, engine::namespaces_schema(), batch).await?;
    Ok(row)
}

/// Deletes the namespace registry row. `cascade=true` also deletes every
/// pad (and its cells/embeddings) currently in that namespace; otherwise a
/// namespace still holding pads is left alone and reported via `CONFLICT`.
pub async fn delete_namespace(engine: &Engine, tenant: &str, namespace: &str, cascade: bool) -> Result<(bool, usize)> {
    let predicate = format!("tenant_id = '{}'", engine::quote(tenant));
    let batches = engine::query_rows(&engine.pads().await, &predicate).await?;
    let mut scratch_ids = Vec::new();
    for batch in &batches {
        for row in codec::batch_to_pad_rows(batch)? {
            if row.namespace == namespace {
                scratch_ids.push(row.scratch_id);
            }
        }
    }

    if !scratch_ids.is_empty() && !cascade {
        return Err(ServiceError::Conflict(format!(
            "namespace {namespace} still has {} pad(s); pass cascade to delete them",
            scratch_ids.len()
        )));
    }

    let mut cascaded = 0usize;
    for scratch_id in scratch_ids {
        if pads::delete_pad(engine, tenant, scratch_id).await? {
            cascaded += 1;
        }
    }

    let existing = engine::query_rows(&engine.namespaces().await, &ns_predicate(tenant, namespace)).await?;
    let existed = existing.iter().any(|b| b.num_rows() > 0);
    if existed {
        engine::delete_rows(&engine.namespaces().await, &ns_predicate(tenant, namespace)).await?;
    }
    Ok((existed, cascaded))
}

/// Renames a namespace. With `migrate=true`, every pad/embedding row
/// carrying the old namespace is rewritten to the new one in the same pass
/// (`§4.B` "supplement": namespace_rename cascade) via
/// `crate::migrate::rewrite_namespace`. With `migrate=false`, only the
/// registry row moves — existing pads keep their old namespace string.
pub async fn rename_namespace(
    engine: &Engine,
    tenant: &str,
    old_name: &str,
    new_name: &str,
    migrate: bool,
) -> Result<usize> {
    let old_rows = engine::query_rows(&engine.namespaces().await, &ns_predicate(tenant, old_name)).await?;
    if !old_rows.iter().any(|b| b.num_rows() > 0) {
        return Err(ServiceError::NotFound);
    }
    let new_rows = engine::query_rows(&engine.namespaces().await, &ns_predicate(tenant, new_name)).await?;
    if new_rows.iter().any(|b| b.num_rows() > 0) {
        return Err(ServiceError::Conflict(format!("namespace already exists: {new_name}")));
    }

    engine::delete_rows(&engine.namespaces().await, &ns_predicate(tenant, old_name)).await?;
    let row = NamespaceRow {
        tenant_id: tenant.to_string(),
        namespace: new_name.to_string(),
        created_at: Utc::now(),
    };
    let batch = codec::namespace_to_batch(&row)?;
    engine::add_batch(&engine.namespaces().await, engine::namespaces_schema(), batch).await?;

    if migrate {
        crate::migrate::rewrite_namespace(engine, tenant, old_name, new_name).await
    } else {
        Ok(0)
    }
}
