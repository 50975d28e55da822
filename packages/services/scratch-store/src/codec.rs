use std::collections::BTreeSet;
use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{BooleanArray, FixedSizeListArray, Int32Array, RecordBatch, StringArray};
use chrono::{DateTime, Utc};
use scratch_core::error::{Result, ServiceError};
use scratch_core::model::{Cell, Language, NamespaceRow, Scratchpad};
use uuid::Uuid;

use crate::engine::{self, EMBEDDING_DIM};

fn tags_to_json(tags: &BTreeSet<String>) -> String {
    serde_json::to_string(&tags.iter().collect::<Vec<_>>()).unwrap_or_else(|_| "[]".to_string())
}

fn json_to_tags(raw: &str) -> BTreeSet<String> {
    serde_json::from_str::<Vec<String>>(raw)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

pub fn pad_to_batch(pad: &Scratchpad) -> Result<RecordBatch> {
    let schema = engine::pads_schema();
    let cell_tags = pad.cell_tags();
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec![pad.tenant_id.as_str()])),
            Arc::new(StringArray::from(vec![pad.scratch_id.to_string()])),
            Arc::new(StringArray::from(vec![pad.namespace.as_str()])),
            Arc::new(StringArray::from(vec![tags_to_json(&pad.tags)])),
            Arc::new(StringArray::from(vec![serde_json::to_string(&pad.metadata)
                .unwrap_or_else(|_| "{}".to_string())])),
            Arc::new(StringArray::from(vec![pad.created_at.to_rfc3339()])),
            Arc::new(StringArray::from(vec![pad.last_access_at.to_rfc3339()])),
            Arc::new(StringArray::from(vec![tags_to_json(&cell_tags)])),
        ],
    )
    .map_err(|e| ServiceError::Internal(format!("encode pad row: {e}")))?;
    Ok(batch)
}

/// A pad row without its cells (cells live in the `cells` table and are
/// joined in by the caller).
pub struct PadRow {
    pub tenant_id: String,
    pub scratch_id: Uuid,
    pub namespace: String,
    pub tags: BTreeSet<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

pub fn batch_to_pad_rows(batch: &RecordBatch) -> Result<Vec<PadRow>> {
    let tenant_col = engine::string_col(batch, "tenant_id")
        .ok_or_else(|| ServiceError::Internal("missing tenant_id column".into()))?;
    let scratch_col = engine::string_col(batch, "scratch_id")
        .ok_or_else(|| ServiceError::Internal("missing scratch_id column".into()))?;
    let ns_col = engine::string_col(batch, "namespace")
        .ok_or_else(|| ServiceError::Internal("missing namespace column".into()))?;
    let tags_col = engine::string_col(batch, "tags")
        .ok_or_else(|| ServiceError::Internal("missing tags column".into()))?;
    let metadata_col = engine::string_col(batch, "metadata")
        .ok_or_else(|| ServiceError::Internal("missing metadata column".into()))?;
    let created_col = engine::string_col(batch, "created_at")
        .ok_or_else(|| ServiceError::Internal("missing created_at column".into()))?;
    let accessed_col = engine::string_col(batch, "last_access_at")
        .ok_or_else(|| ServiceError::Internal("missing last_access_at column".into()))?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let scratch_id = Uuid::parse_str(scratch_col.value(i))
            .map_err(|e| ServiceError::Internal(format!("bad scratch_id: {e}")))?;
        let metadata = serde_json::from_str(metadata_col.value(i)).unwrap_or_default();
        let created_at = DateTime::parse_from_rfc3339(created_col.value(i))
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| ServiceError::Internal(format!("bad created_at: {e}")))?;
        let last_access_at = DateTime::parse_from_rfc3339(accessed_col.value(i))
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| ServiceError::Internal(format!("bad last_access_at: {e}")))?;
        rows.push(PadRow {
            tenant_id: tenant_col.value(i).to_string(),
            scratch_id,
            namespace: ns_col.value(i).to_string(),
            tags: json_to_tags(tags_col.value(i)),
            metadata,
            created_at,
            last_access_at,
        });
    }
    Ok(rows)
}

pub fn cell_to_batch(tenant_id: &str, scratch_id: Uuid, cell: &Cell) -> Result<RecordBatch> {
    let schema = engine::cells_schema();
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec![tenant_id])),
            Arc::new(StringArray::from(vec![scratch_id.to_string()])),
            Arc::new(StringArray::from(vec![cell.cell_id.to_string()])),
            Arc::new(Int32Array::from(vec![cell.index as i32])),
            Arc::new(StringArray::from(vec![language_to_str(cell.language)])),
            Arc::new(StringArray::from(vec![cell.content.as_str()])),
            Arc::new(BooleanArray::from(vec![cell.validate])),
            Arc::new(StringArray::from(vec![cell
                .json_schema
                .as_ref()
                .map(|v| serde_json::to_string(v).unwrap_or_default())])),
            Arc::new(StringArray::from(vec![tags_to_json(&cell.tags)])),
            Arc::new(StringArray::from(vec![serde_json::to_string(&cell.metadata)
                .unwrap_or_else(|_| "{}".to_string())])),
        ],
    )
    .map_err(|e| ServiceError::Internal(format!("encode cell row: {e}")))?;
    Ok(batch)
}

pub fn batch_to_cells(batch: &RecordBatch) -> Result<Vec<Cell>> {
    let cell_col = engine::string_col(batch, "cell_id")
        .ok_or_else(|| ServiceError::Internal("missing cell_id column".into()))?;
    let index_col = engine::int_col(batch, "index")
        .ok_or_else(|| ServiceError::Internal("missing index column".into()))?;
    let lang_col = engine::string_col(batch, "language")
        .ok_or_else(|| ServiceError::Internal("missing language column".into()))?;
    let content_col = engine::string_col(batch, "content")
        .ok_or_else(|| ServiceError::Internal("missing content column".into()))?;
    let validate_col = engine::bool_col(batch, "validate")
        .ok_or_else(|| ServiceError::Internal("missing validate column".into()))?;
    let schema_col = engine::string_col(batch, "json_schema");
    let tags_col = engine::string_col(batch, "tags")
        .ok_or_else(|| ServiceError::Internal("missing tags column".into()))?;
    let metadata_col = engine::string_col(batch, "metadata")
        .ok_or_else(|| ServiceError::Internal("missing metadata column".into()))?;

    let mut cells = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let cell_id = Uuid::parse_str(cell_col.value(i))
            .map_err(|e| ServiceError::Internal(format!("bad cell_id: {e}")))?;
        cells.push(Cell {
            cell_id,
            index: index_col.value(i) as u32,
            language: str_to_language(lang_col.value(i)),
            content: content_col.value(i).to_string(),
            validate: validate_col.value(i),
            json_schema: schema_col
                .filter(|c| !c.is_null(i))
                .and_then(|c| serde_json::from_str(c.value(i)).ok()),
            metadata: serde_json::from_str(metadata_col.value(i)).unwrap_or_default(),
            tags: json_to_tags(tags_col.value(i)),
        });
    }
    Ok(cells)
}

pub fn namespace_to_batch(row: &NamespaceRow) -> Result<RecordBatch> {
    let schema = engine::namespaces_schema();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec![row.tenant_id.as_str()])),
            Arc::new(StringArray::from(vec![row.namespace.as_str()])),
            Arc::new(StringArray::from(vec![row.created_at.to_rfc3339()])),
        ],
    )
    .map_err(|e| ServiceError::Internal(format!("encode namespace row: {e}")))
}

pub fn batch_to_namespaces(batch: &RecordBatch) -> Result<Vec<NamespaceRow>> {
    let tenant_col = engine::string_col(batch, "tenant_id")
        .ok_or_else(|| ServiceError::Internal("missing tenant_id column".into()))?;
    let ns_col = engine::string_col(batch, "namespace")
        .ok_or_else(|| ServiceError::Internal("missing namespace column".into()))?;
    let created_col = engine::string_col(batch, "created_at")
        .ok_or_else(|| ServiceError::Internal("missing created_at column".into()))?;
    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let created_at = DateTime::parse_from_rfc3339(created_col.value(i))
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| ServiceError::Internal(format!("bad created_at: {e}")))?;
        rows.push(NamespaceRow {
            tenant_id: tenant_col.value(i).to_string(),
            namespace: ns_col.value(i).to_string(),
            created_at,
        });
    }
    Ok(rows)
}

pub struct EmbeddingRow {
    pub tenant_id: String,
    pub scratch_id: Uuid,
    pub cell_id: Option<Uuid>,
    pub namespace: String,
    pub tags: BTreeSet<String>,
    pub language: Language,
    pub vector: Vec<f32>,
    pub embedding_version: String,
    pub updated_at: DateTime<Utc>,
}

pub fn embedding_to_batch(row: &EmbeddingRow) -> Result<RecordBatch> {
    let schema = engine::embeddings_schema();
    let dim = EMBEDDING_DIM;
    if row.vector.len() != dim {
        return Err(ServiceError::Internal(format!(
            "embedding dimension mismatch: expected {dim}, got {}",
            row.vector.len()
        )));
    }
    let vectors = std::iter::once(Some(row.vector.iter().map(|v| Some(*v)).collect::<Vec<_>>()));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec![row.tenant_id.as_str()])),
            Arc::new(StringArray::from(vec![row.scratch_id.to_string()])),
            Arc::new(StringArray::from(vec![row.cell_id.map(|c| c.to_string())])),
            Arc::new(StringArray::from(vec![row.namespace.as_str()])),
            Arc::new(StringArray::from(vec![tags_to_json(&row.tags)])),
            Arc::new(StringArray::from(vec![language_to_str(row.language)])),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                vectors, dim as i32,
            )),
            Arc::new(StringArray::from(vec![row.embedding_version.as_str()])),
            Arc::new(StringArray::from(vec![row.updated_at.to_rfc3339()])),
        ],
    )
    .map_err(|e| ServiceError::Internal(format!("encode embedding row: {e}")))
}

pub struct EmbeddingHit {
    pub tenant_id: String,
    pub scratch_id: Uuid,
    pub cell_id: Option<Uuid>,
    pub namespace: String,
    pub tags: BTreeSet<String>,
    pub embedding_version: String,
}

pub fn batch_to_embedding_hits(batch: &RecordBatch) -> Result<Vec<EmbeddingHit>> {
    let tenant_col = engine::string_col(batch, "tenant_id")
        .ok_or_else(|| ServiceError::Internal("missing tenant_id column".into()))?;
    let scratch_col = engine::string_col(batch, "scratch_id")
        .ok_or_else(|| ServiceError::Internal("missing scratch_id column".into()))?;
    let cell_col = engine::string_col(batch, "cell_id");
    let ns_col = engine::string_col(batch, "namespace")
        .ok_or_else(|| ServiceError::Internal("missing namespace column".into()))?;
    let tags_col = engine::string_col(batch, "tags")
        .ok_or_else(|| ServiceError::Internal("missing tags column".into()))?;
    let version_col = engine::string_col(batch, "embedding_version")
        .ok_or_else(|| ServiceError::Internal("missing embedding_version column".into()))?;

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let scratch_id = Uuid::parse_str(scratch_col.value(i))
            .map_err(|e| ServiceError::Internal(format!("bad scratch_id: {e}")))?;
        let cell_id = cell_col
            .filter(|c| !c.is_null(i))
            .map(|c| Uuid::parse_str(c.value(i)))
            .transpose()
            .map_err(|e| ServiceError::Internal(format!("bad cell_id: {e}")))?;
        hits.push(EmbeddingHit {
            tenant_id: tenant_col.value(i).to_string(),
            scratch_id,
            cell_id,
            namespace: ns_col.value(i).to_string(),
            tags: json_to_tags(tags_col.value(i)),
            embedding_version: version_col.value(i).to_string(),
        });
    }
    Ok(hits)
}

/// Like `batch_to_embedding_hits` but also decodes `language`/`vector`/
/// `updated_at` — the full row shape needed to carry embeddings over to a
/// new `tenant_id` without recomputing them (`migrate::first_enable_tenant_migration`).
pub fn batch_to_embedding_rows(batch: &RecordBatch) -> Result<Vec<EmbeddingRow>> {
    let tenant_col = engine::string_col(batch, "tenant_id")
        .ok_or_else(|| ServiceError::Internal("missing tenant_id column".into()))?;
    let scratch_col = engine::string_col(batch, "scratch_id")
        .ok_or_else(|| ServiceError::Internal("missing scratch_id column".into()))?;
    let cell_col = engine::string_col(batch, "cell_id");
    let ns_col = engine::string_col(batch, "namespace")
        .ok_or_else(|| ServiceError::Internal("missing namespace column".into()))?;
    let tags_col = engine::string_col(batch, "tags")
        .ok_or_else(|| ServiceError::Internal("missing tags column".into()))?;
    let lang_col = engine::string_col(batch, "language")
        .ok_or_else(|| ServiceError::Internal("missing language column".into()))?;
    let vector_col = engine::vector_col(batch, "vector")
        .ok_or_else(|| ServiceError::Internal("missing vector column".into()))?;
    let version_col = engine::string_col(batch, "embedding_version")
        .ok_or_else(|| ServiceError::Internal("missing embedding_version column".into()))?;
    let updated_col = engine::string_col(batch, "updated_at")
        .ok_or_else(|| ServiceError::Internal("missing updated_at column".into()))?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let scratch_id = Uuid::parse_str(scratch_col.value(i))
            .map_err(|e| ServiceError::Internal(format!("bad scratch_id: {e}")))?;
        let cell_id = cell_col
            .filter(|c| !c.is_null(i))
            .map(|c| Uuid::parse_str(c.value(i)))
            .transpose()
            .map_err(|e| ServiceError::Internal(format!("bad cell_id: {e}")))?;
        let vector = vector_col
            .value(i)
            .as_any()
            .downcast_ref::<arrow_array::Float32Array>()
            .ok_or_else(|| ServiceError::Internal("vector column is not float32".into()))?
            .values()
            .to_vec();
        let updated_at = DateTime::parse_from_rfc3339(updated_col.value(i))
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| ServiceError::Internal(format!("bad updated_at: {e}")))?;
        rows.push(EmbeddingRow {
            tenant_id: tenant_col.value(i).to_string(),
            scratch_id,
            cell_id,
            namespace: ns_col.value(i).to_string(),
            tags: json_to_tags(tags_col.value(i)),
            language: str_to_language(lang_col.value(i)),
            vector,
            embedding_version: version_col.value(i).to_string(),
            updated_at,
        });
    }
    Ok(rows)
}

pub fn language_to_str(language: Language) -> &'static str {
    match language {
        Language::Json => "json",
        Language::Yaml => "yaml",
        Language::Yml => "yml",
        Language::Md => "md",
        Language::Txt => "txt",
        Language::Py => "py",
        Language::Js => "js",
        Language::Ts => "ts",
        Language::Tsx => "tsx",
        Language::Jsx => "jsx",
        Language::Rs => "rs",
        Language::C => "c",
        Language::H => "h",
        Language::Cpp => "cpp",
        Language::Hpp => "hpp",
        Language::Sh => "sh",
        Language::Css => "css",
        Language::Html => "html",
        Language::Htm => "htm",
        Language::Java => "java",
        Language::Go => "go",
        Language::Rb => "rb",
        Language::Toml => "toml",
        Language::Php => "php",
        Language::Cs => "cs",
        Language::Unknown => "unknown",
    }
}

pub fn str_to_language(raw: &str) -> Language {
    match raw {
        "json" => Language::Json,
        "yaml" => Language::Yaml,
        "yml" => Language::Yml,
        "md" => Language::Md,
        "txt" => Language::Txt,
        "py" => Language::Py,
        "js" => Language::Js,
        "ts" => Language::Ts,
        "tsx" => Language::Tsx,
        "jsx" => Language::Jsx,
        "rs" => Language::Rs,
        "c" => Language::C,
        "h" => Language::H,
        "cpp" => Language::Cpp,
        "hpp" => Language::Hpp,
        "sh" => Language::Sh,
        "css" => Language::Css,
        "html" => Language::Html,
        "htm" => Language::Htm,
        "java" => Language::Java,
        "go" => Language::Go,
        "rb" => Language::Rb,
        "toml" => Language::Toml,
        "php" => Language::Php,
        "cs" => Language::Cs,
        _ => Language::Unknown,
    }
}
