use std::collections::BTreeSet;

use schemars::JsonSchema;
use scratch_core::error::{Result, ServiceError};
use scratch_core::model::{CellDraft, Language};
use serde::Deserialize;
use uuid::Uuid;

/// Wire shape of a cell body accepted on create/append/replace (`§6.1`).
/// `language` travels as a bare string on the wire (`schemars::JsonSchema`
/// is not derived on `scratch_core::model::Language` since that crate has no
/// reason to depend on `schemars`); `into_draft` parses it the same way the
/// stored `Cell`'s own `#[serde(rename_all = "lowercase")]` dialect parses.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CellParam {
    pub language: String,
    pub content: String,
    #[serde(default)]
    pub validate: bool,
    #[serde(default)]
    pub json_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl CellParam {
    pub fn into_draft(self) -> Result<CellDraft> {
        let language: Language = serde_json::from_value(serde_json::Value::String(self.language.to_lowercase()))
            .map_err(|e| ServiceError::ValidationError(format!("bad language: {e}")))?;
        let metadata = metadata_object(self.metadata)?;
        Ok(CellDraft {
            language,
            content: self.content,
            validate: self.validate,
            json_schema: self.json_schema,
            metadata,
            tags: self.tags,
        })
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateParams {
    pub scratch_id: Option<Uuid>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub cells: Vec<CellParam>,
}

/// Parses a wire `metadata` value, accepting absent/`null` as empty.
pub fn metadata_object(value: serde_json::Value) -> Result<serde_json::Map<String, serde_json::Value>> {
    match value {
        serde_json::Value::Null => Ok(serde_json::Map::new()),
        serde_json::Value::Object(m) => Ok(m),
        _ => Err(ServiceError::ValidationError("metadata must be an object".to_string())),
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadParams {
    pub scratch_id: Uuid,
    #[serde(default)]
    pub cell_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub namespaces: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListParams {
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListCellsParams {
    pub scratch_id: Uuid,
    #[serde(default)]
    pub cell_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AppendCellParams {
    pub scratch_id: Uuid,
    pub cell: CellParam,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReplaceCellParams {
    pub scratch_id: Uuid,
    pub cell_id: Uuid,
    pub cell: CellParam,
    #[serde(default)]
    pub new_index: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteParams {
    pub scratch_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ValidateParams {
    pub scratch_id: Uuid,
    #[serde(default)]
    pub cell_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchParams {
    pub query: String,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTagsParams {
    #[serde(default)]
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpsertSchemaParams {
    pub scratch_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetSchemaParams {
    pub scratch_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListSchemasParams {
    pub scratch_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NamespaceListParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NamespaceCreateParams {
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NamespaceRenameParams {
    pub old_name: String,
    pub new_name: String,
    #[serde(default)]
    pub migrate: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NamespaceDeleteParams {
    pub namespace: String,
    #[serde(default)]
    pub cascade: bool,
}
