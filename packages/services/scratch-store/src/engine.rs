use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{
    BooleanArray, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_array::types::Float32Type;
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Table};
use scratch_core::error::{Result, ServiceError};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Default embedding dimension (`§4.E`: "fixed-dimension vector (default
/// 384)"). Fixed at connect time so the `embeddings` table schema can be
/// created eagerly alongside the others, the way `DatabaseManager::new`
/// creates its indices eagerly at startup.
pub const EMBEDDING_DIM: usize = 384;

pub const PADS_TABLE: &str = "pads";
pub const CELLS_TABLE: &str = "cells";
pub const NAMESPACES_TABLE: &str = "namespaces";
pub const EMBEDDINGS_TABLE: &str = "embeddings";

/// Owns the Lance connection and the four logical tables of `§4.B`, plus a
/// per-tenant mutex standing in for cross-table transaction scope (see
/// DESIGN.md "Cross-table transaction").
pub struct Engine {
    conn: Connection,
    pads: Mutex<Option<Table>>,
    cells: Mutex<Option<Table>>,
    namespaces: Mutex<Option<Table>>,
    embeddings: Mutex<Option<Table>>,
    tenant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Engine {
    pub async fn open(storage_dir: &str) -> Result<Self> {
        let conn = connect(storage_dir)
            .execute()
            .await
            .map_err(|e| ServiceError::Internal(format!("lance connect failed: {e}")))?;
        let engine = Engine {
            conn,
            pads: Mutex::new(None),
            cells: Mutex::new(None),
            namespaces: Mutex::new(None),
            embeddings: Mutex::new(None),
            tenant_locks: Mutex::new(HashMap::new()),
        };
        engine.ensure_schema().await?;
        engine.create_indices().await;
        Ok(engine)
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.open_or_create(&self.pads, PADS_TABLE, pads_schema()).await?;
        self.open_or_create(&self.cells, CELLS_TABLE, cells_schema()).await?;
        self.open_or_create(&self.namespaces, NAMESPACES_TABLE, namespaces_schema())
            .await?;
        self.open_or_create(&self.embeddings, EMBEDDINGS_TABLE, embeddings_schema())
            .await?;
        Ok(())
    }

    /// Eager index creation at startup: every table gets a scalar index on
    /// `tenant_id` (the mandatory tenant-scoped lookup path every query
    /// predicate starts from), and `embeddings` additionally gets a vector
    /// index on `vector`. A table can't build an index over too few rows to
    /// train on, so a freshly created empty store will see these fail on
    /// first boot; that's logged, not fatal, since an unindexed scan is
    /// still correct, just slower until there's enough data and the server
    /// restarts.
    async fn create_indices(&self) {
        for (name, table) in [
            (PADS_TABLE, self.pads().await),
            (CELLS_TABLE, self.cells().await),
            (NAMESPACES_TABLE, self.namespaces().await),
            (EMBEDDINGS_TABLE, self.embeddings().await),
        ] {
            if let Err(e) = table.create_index(&["tenant_id"], Index::Auto).execute().await {
                tracing::warn!(table = name, error = %e, "tenant_id index creation skipped");
            }
        }
        let embeddings = self.embeddings().await;
        if let Err(e) = embeddings.create_index(&["vector"], Index::Auto).execute().await {
            tracing::warn!(table = EMBEDDINGS_TABLE, error = %e, "vector index creation skipped");
        }
    }

    async fn open_or_create(
        &self,
        slot: &Mutex<Option<Table>>,
        name: &str,
        schema: Arc<Schema>,
    ) -> Result<()> {
        let mut guard = slot.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let table = match self.conn.open_table(name).execute().await {
            Ok(t) => {
                tracing::info!(table = name, "opened existing lance table");
                t
            }
            Err(_) => {
                tracing::info!(table = name, "creating lance table");
                self.conn
                    .create_empty_table(name, schema)
                    .execute()
                    .await
                    .map_err(|e| ServiceError::Internal(format!("create table {name}: {e}")))?
            }
        };
        *guard = Some(table);
        Ok(())
    }

    pub async fn pads(&self) -> Table {
        self.pads.lock().await.as_ref().expect("schema ensured at open").clone()
    }

    pub async fn cells(&self) -> Table {
        self.cells.lock().await.as_ref().expect("schema ensured at open").clone()
    }

    pub async fn namespaces(&self) -> Table {
        self.namespaces
            .lock()
            .await
            .as_ref()
            .expect("schema ensured at open")
            .clone()
    }

    pub async fn embeddings(&self) -> Table {
        self.embeddings
            .lock()
            .await
            .as_ref()
            .expect("schema ensured at open")
            .clone()
    }

    /// Acquires the per-tenant lock standing in for a transaction boundary.
    /// Never holds a lock across tenants (`§5`, "MUST NOT hold a global lock
    /// across tenants").
    pub async fn tenant_guard(&self, tenant_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.tenant_locks.lock().await;
            locks
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub fn pads_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("tenant_id", DataType::Utf8, false),
        Field::new("scratch_id", DataType::Utf8, false),
        Field::new("namespace", DataType::Utf8, false),
        Field::new("tags", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("last_access_at", DataType::Utf8, false),
        Field::new("cell_tags_cache", DataType::Utf8, false),
    ]))
}

pub fn cells_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("tenant_id", DataType::Utf8, false),
        Field::new("scratch_id", DataType::Utf8, false),
        Field::new("cell_id", DataType::Utf8, false),
        Field::new("index", DataType::Int32, false),
        Field::new("language", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("validate", DataType::Boolean, false),
        Field::new("json_schema", DataType::Utf8, true),
        Field::new("tags", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
    ]))
}

pub fn namespaces_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("tenant_id", DataType::Utf8, false),
        Field::new("namespace", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

pub fn embeddings_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("tenant_id", DataType::Utf8, false),
        Field::new("scratch_id", DataType::Utf8, false),
        Field::new("cell_id", DataType::Utf8, true),
        Field::new("namespace", DataType::Utf8, false),
        Field::new("tags", DataType::Utf8, false),
        Field::new("language", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                EMBEDDING_DIM as i32,
            ),
            false,
        ),
        Field::new("embedding_version", DataType::Utf8, false),
        Field::new("updated_at", DataType::Utf8, false),
    ]))
}

/// Escapes a value for embedding in a single-quoted Lance `only_if`
/// predicate string, the same convention the grounding storage module uses.
pub fn quote(value: &str) -> String {
    value.replace('\'', "''")
}

/// Builds an OR-joined `only_if` fragment matching any of `tags` against a
/// `tags` column serialized as a JSON array (`§4.B`: tag predicates MUST be
/// pushed into the store scan, never filtered after a full in-memory load).
/// Shared by `search.rs`, `pads::list_pads`, and `tags::list_tags` so every
/// tag-scoped query predicate stays in one place.
pub fn tag_predicate_fragment(tags: &[String]) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let clauses: Vec<String> = tags
        .iter()
        .map(|t| format!("tags LIKE '%\"{}\"%'", quote(t)))
        .collect();
    Some(format!("({})", clauses.join(" OR ")))
}

/// Builds an OR-joined `only_if` fragment matching any of `namespaces`
/// against a `namespace` column. Same pushdown rule as `tag_predicate_fragment`.
pub fn namespace_predicate_fragment(namespaces: &[String]) -> Option<String> {
    if namespaces.is_empty() {
        return None;
    }
    let clauses: Vec<String> = namespaces
        .iter()
        .map(|n| format!("namespace = '{}'", quote(n)))
        .collect();
    Some(format!("({})", clauses.join(" OR ")))
}

/// Builds an OR-joined `only_if` fragment matching any of `ids` against
/// `column`. Used to push a namespace filter down into a table (`cells`) that
/// carries no `namespace` column of its own, by restricting to the
/// `scratch_id`s of pads a prior, already-pushed-down query matched.
pub fn id_in_predicate_fragment(column: &str, ids: &[Uuid]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let clauses: Vec<String> = ids.iter().map(|id| format!("{column} = '{id}'")).collect();
    Some(format!("({})", clauses.join(" OR ")))
}

pub async fn query_rows(table: &Table, predicate: &str) -> Result<Vec<RecordBatch>> {
    let mut stream = table
        .query()
        .only_if(predicate)
        .execute()
        .await
        .map_err(|e| ServiceError::Internal(format!("query failed: {e}")))?;
    let mut batches = Vec::new();
    while let Some(batch) = stream
        .try_next()
        .await
        .map_err(|e| ServiceError::Internal(format!("stream failed: {e}")))?
    {
        batches.push(batch);
    }
    Ok(batches)
}

pub async fn delete_rows(table: &Table, predicate: &str) -> Result<()> {
    table
        .delete(predicate)
        .await
        .map_err(|e| ServiceError::Internal(format!("delete failed: {e}")))?;
    Ok(())
}

pub async fn add_batch(
    table: &Table,
    schema: Arc<Schema>,
    batch: RecordBatch,
) -> Result<()> {
    let iter = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
    table
        .add(iter)
        .execute()
        .await
        .map_err(|e| ServiceError::Internal(format!("add failed: {e}")))?;
    Ok(())
}

pub fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

pub fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Int32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
}

pub fn bool_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a BooleanArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
}

pub fn vector_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a FixedSizeListArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
}
