use std::collections::BTreeMap;

use scratch_core::model::{Diagnostic, SchemaEntry};
use serde_json::Value;

use crate::schema_ref;

pub struct JsonOutcome {
    pub valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub details: Value,
}

/// Validates already-parsed JSON content against an optional schema.
/// Shared by `json.rs` and `yaml.rs` (YAML is validated by first loading it
/// into a `serde_json::Value`, then reusing this schema-check path).
pub fn check(parsed: &Value, json_schema: Option<&Value>, schemas: &BTreeMap<String, SchemaEntry>) -> JsonOutcome {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut details = serde_json::Map::new();

    if let Some(schema_value) = json_schema {
        let mut schema_value = resolve_schema_literal(schema_value);
        let ref_warnings = schema_ref::resolve_refs(&mut schema_value, schemas);
        if let Some(first_ref_name) = ref_warnings
            .first()
            .and_then(|d| d.details.as_ref())
            .and_then(|d| d.get("ref"))
            .and_then(|v| v.as_str())
        {
            details.insert(
                "schema".to_string(),
                serde_json::json!({ "unresolved_ref": first_ref_name }),
            );
        }
        warnings.extend(ref_warnings);

        match jsonschema::JSONSchema::compile(&schema_value) {
            Ok(compiled) => {
                let validation_errors: Vec<Diagnostic> = compiled
                    .validate(parsed)
                    .err()
                    .map(|iter| {
                        iter.map(|e| Diagnostic {
                            message: e.to_string(),
                            code: Some("SCHEMA_MISMATCH".to_string()),
                            line: None,
                            column: None,
                            details: None,
                        })
                        .collect()
                    })
                    .unwrap_or_default();
                errors.extend(validation_errors);
            }
            Err(e) => errors.push(Diagnostic {
                message: format!("invalid json schema: {e}"),
                code: Some("SCHEMA_INVALID".to_string()),
                line: None,
                column: None,
                details: None,
            }),
        }
    }

    JsonOutcome {
        valid: errors.is_empty(),
        errors,
        warnings,
        details: Value::Object(details),
    }
}

/// `json_schema` may be given inline as an object, or as a string to be
/// parsed as one (`§3`). A `$ref`-only string is already a JSON object by
/// the time it reaches here (callers pass the cell's `json_schema` value
/// directly); this only handles the "schema as a JSON string" case.
fn resolve_schema_literal(value: &Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

pub fn validate_content(content: &str, json_schema: Option<&Value>, schemas: &BTreeMap<String, SchemaEntry>) -> JsonOutcome {
    match serde_json::from_str::<Value>(content) {
        Ok(parsed) => check(&parsed, json_schema, schemas),
        Err(e) => JsonOutcome {
            valid: false,
            errors: vec![Diagnostic {
                message: format!("invalid json: {e}"),
                code: Some("PARSE_ERROR".to_string()),
                line: Some(e.line() as u32),
                column: Some(e.column() as u32),
                details: None,
            }],
            warnings: Vec::new(),
            details: Value::Object(Default::default()),
        },
    }
}
