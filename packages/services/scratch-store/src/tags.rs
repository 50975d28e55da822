use std::collections::BTreeSet;

use scratch_core::error::Result;
use scratch_core::model::TagListing;

use crate::codec;
use crate::engine::{self, Engine};

/// `list_tags` (`§4.B`): the union of every pad's own tags and every cell's
/// tags across the tenant, optionally restricted to a set of namespaces.
/// Both the `pads` and `cells` scans push their predicates into the store
/// rather than loading the full tenant row set and filtering in memory.
/// `cells` carries no `namespace` column of its own, so its namespace
/// restriction is pushed as a `scratch_id IN (...)` predicate built from the
/// already namespace-filtered `pads` scan.
pub async fn list_tags(engine: &Engine, tenant: &str, namespaces: &[String]) -> Result<TagListing> {
    let mut pad_predicate = format!("tenant_id = '{}'", engine::quote(tenant));
    if let Some(frag) = engine::namespace_predicate_fragment(namespaces) {
        pad_predicate.push_str(" AND ");
        pad_predicate.push_str(&frag);
    }

    let pad_batches = engine::query_rows(&engine.pads().await, &pad_predicate).await?;
    let mut pad_rows = Vec::new();
    for batch in &pad_batches {
        pad_rows.extend(codec::batch_to_pad_rows(batch)?);
    }

    let mut scratchpad_tags = BTreeSet::new();
    for row in &pad_rows {
        scratchpad_tags.extend(row.tags.iter().cloned());
    }

    let mut cell_tags = BTreeSet::new();
    let namespace_scoped = !namespaces.is_empty();
    if !namespace_scoped || !pad_rows.is_empty() {
        let mut cell_predicate = format!("tenant_id = '{}'", engine::quote(tenant));
        if namespace_scoped {
            let ids: Vec<uuid::Uuid> = pad_rows.iter().map(|r| r.scratch_id).collect();
            if let Some(frag) = engine::id_in_predicate_fragment("scratch_id", &ids) {
                cell_predicate.push_str(" AND ");
                cell_predicate.push_str(&frag);
            }
        }
        let cell_batches = engine::query_rows(&engine.cells().await, &cell_predicate).await?;
        for batch in &cell_batches {
            for cell in codec::batch_to_cells(batch)? {
                cell_tags.extend(cell.tags.iter().cloned());
            }
        }
    }

    Ok(TagListing {
        scratchpad_tags,
        cell_tags,
        namespace_filter: if namespaces.is_empty() {
            None
        } else {
            Some(namespaces.to_vec())
        },
    })
}
