use std::collections::BTreeMap;

use scratch_core::model::{Diagnostic, SchemaEntry};
use serde_json::Value;

const REF_PREFIX: &str = "scratchpad://schemas/";

/// Resolves `{"$ref": "scratchpad://schemas/<name>"}` nodes against the
/// pad's schema registry (`§4.C`). A missing reference is replaced with an
/// empty (always-true) schema rather than left as a dangling `$ref` —
/// `jsonschema::JSONSchema::compile` has no resolver registered for the
/// fabricated `scratchpad://` scheme and would otherwise fail to compile,
/// turning an advisory miss into a hard `SCHEMA_INVALID` error. The miss is
/// still reported as a warning, never an error, per the advisory rule.
pub fn resolve_refs(schema: &mut Value, schemas: &BTreeMap<String, SchemaEntry>) -> Vec<Diagnostic> {
    let mut warnings = Vec::new();
    resolve_node(schema, schemas, &mut warnings);
    warnings
}

fn resolve_node(node: &mut Value, schemas: &BTreeMap<String, SchemaEntry>, warnings: &mut Vec<Diagnostic>) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref").cloned() {
                if let Some(name) = reference.strip_prefix(REF_PREFIX) {
                    match schemas.get(name) {
                        Some(entry) => {
                            *node = entry.schema.clone();
                            return;
                        }
                        None => {
                            warnings.push(Diagnostic {
                                message: format!("unresolved schema reference: {name}"),
                                code: Some("UNRESOLVED_SCHEMA_REF".to_string()),
                                line: None,
                                column: None,
                                details: Some(serde_json::json!({ "ref": name })),
                            });
                            *node = serde_json::json!({});
                            return;
                        }
                    }
                }
            }
            for value in map.values_mut() {
                resolve_node(value, schemas, warnings);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                resolve_node(item, schemas, warnings);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn missing_ref_is_a_warning_not_an_error() {
        let mut schema = serde_json::json!({ "$ref": "scratchpad://schemas/missing" });
        let warnings = resolve_refs(&mut schema, &BTreeMap::new());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code.as_deref(), Some("UNRESOLVED_SCHEMA_REF"));
    }

    #[test]
    fn missing_ref_node_becomes_an_empty_schema() {
        let mut schema = serde_json::json!({ "$ref": "scratchpad://schemas/missing" });
        resolve_refs(&mut schema, &BTreeMap::new());
        assert_eq!(schema, serde_json::json!({}));
        assert!(jsonschema::JSONSchema::compile(&schema).is_ok());
    }

    #[test]
    fn known_ref_is_substituted() {
        let mut schemas = BTreeMap::new();
        schemas.insert(
            "point".to_string(),
            SchemaEntry {
                id: Uuid::new_v4(),
                description: "a point".to_string(),
                schema: serde_json::json!({ "type": "object" }),
            },
        );
        let mut schema = serde_json::json!({ "$ref": "scratchpad://schemas/point" });
        let warnings = resolve_refs(&mut schema, &schemas);
        assert!(warnings.is_empty());
        assert_eq!(schema, serde_json::json!({ "type": "object" }));
    }
}
