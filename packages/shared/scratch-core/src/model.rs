use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Languages recognized by the validation pipeline (`§3`). Anything else is
/// treated as an unknown dialect — still accepted, never validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Json,
    Yaml,
    Yml,
    Md,
    Txt,
    Py,
    Js,
    Ts,
    Tsx,
    Jsx,
    Rs,
    C,
    H,
    Cpp,
    Hpp,
    Sh,
    Css,
    Html,
    Htm,
    Java,
    Go,
    Rb,
    Toml,
    Php,
    Cs,
    #[serde(other)]
    #[default]
    Unknown,
}

impl Language {
    pub fn is_code_dialect(self) -> bool {
        !matches!(
            self,
            Language::Json | Language::Yaml | Language::Yml | Language::Md | Language::Txt
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub cell_id: Uuid,
    pub index: u32,
    pub language: Language,
    pub content: String,
    #[serde(default)]
    pub validate: bool,
    /// Inline schema object, a string to parse as one, or a
    /// `scratchpad://schemas/<name>` reference. Kept as raw JSON since the
    /// three accepted shapes are disambiguated by the validator, not here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// A client-supplied cell body with no `cell_id`/`index` yet assigned —
/// the shape `scratch_append_cell`/`scratch_create`/`scratch_replace_cell`
/// accept on the wire (`§6.1`). The store assigns `cell_id` on create and
/// computes `index` from position.
#[derive(Debug, Clone, Deserialize)]
pub struct CellDraft {
    pub language: Language,
    pub content: String,
    #[serde(default)]
    pub validate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl CellDraft {
    pub fn into_cell(self, cell_id: Uuid, index: u32) -> Cell {
        Cell {
            cell_id,
            index,
            language: self.language,
            content: self.content,
            validate: self.validate,
            json_schema: self.json_schema,
            metadata: self.metadata,
            tags: self.tags,
        }
    }
}

/// A registry entry under `scratchpad.metadata.schemas.<logical-name>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub id: Uuid,
    pub description: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scratchpad {
    pub scratch_id: Uuid,
    pub tenant_id: String,
    pub namespace: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub cells: Vec<Cell>,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

impl Scratchpad {
    /// `cell_tags(P) == union of tags(c) for c in cells(P)` — invariant 3.
    pub fn cell_tags(&self) -> BTreeSet<String> {
        self.cells
            .iter()
            .flat_map(|c| c.tags.iter().cloned())
            .collect()
    }

    pub fn schemas(&self) -> std::collections::BTreeMap<String, SchemaEntry> {
        self.metadata
            .get("schemas")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| {
                        serde_json::from_value::<SchemaEntry>(v.clone())
                            .ok()
                            .map(|entry| (k.clone(), entry))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The lightweight response shape mandated by `§4.F`: ids/indices/language/
/// tags/metadata/validation summaries, never cell `content`.
#[derive(Debug, Clone, Serialize)]
pub struct ScratchpadLean {
    pub scratch_id: Uuid,
    pub tenant_id: String,
    pub namespace: String,
    pub tags: BTreeSet<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub cells: Vec<CellLean>,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CellLean {
    pub cell_id: Uuid,
    pub index: u32,
    pub language: Language,
    pub tags: BTreeSet<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<&Cell> for CellLean {
    fn from(c: &Cell) -> Self {
        CellLean {
            cell_id: c.cell_id,
            index: c.index,
            language: c.language,
            tags: c.tags.clone(),
            metadata: c.metadata.clone(),
        }
    }
}

impl From<&Scratchpad> for ScratchpadLean {
    fn from(p: &Scratchpad) -> Self {
        ScratchpadLean {
            scratch_id: p.scratch_id,
            tenant_id: p.tenant_id.clone(),
            namespace: p.namespace.clone(),
            tags: p.tags.clone(),
            metadata: p.metadata.clone(),
            cells: p.cells.iter().map(CellLean::from).collect(),
            created_at: p.created_at,
            last_access_at: p.last_access_at,
        }
    }
}

/// The row shape returned by `list_pads` (`§4.B`).
#[derive(Debug, Clone, Serialize)]
pub struct PadSummary {
    pub scratch_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub namespace: String,
    pub cell_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Diagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ValidationResult {
    pub cell_id: Uuid,
    pub index: u32,
    pub language: Language,
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<Diagnostic>,
    #[serde(default)]
    pub warnings: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub scratch_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<Uuid>,
    pub tenant_id: String,
    pub namespace: String,
    pub tags: BTreeSet<String>,
    pub score: f32,
    pub snippet: String,
    pub embedding_version: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TagListing {
    pub scratchpad_tags: BTreeSet<String>,
    pub cell_tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_filter: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceRow {
    pub tenant_id: String,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    Discard,
    Fail,
    Preempt,
}

/// Emitted once by the first-enable tenant migration (`§4.A`). Logged
/// through `tracing`, never persisted as its own table — the spec only
/// requires the record be "emitted".
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub from_tenant: String,
    pub to_tenant: String,
    pub pad_count: usize,
    pub at: DateTime<Utc>,
}
