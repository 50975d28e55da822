use std::collections::BTreeMap;

use scratch_core::model::{Diagnostic, SchemaEntry};
use serde_json::Value;

use crate::json::{self, JsonOutcome};

pub fn validate_content(content: &str, json_schema: Option<&Value>, schemas: &BTreeMap<String, SchemaEntry>) -> JsonOutcome {
    match serde_yaml::from_str::<Value>(content) {
        Ok(parsed) => json::check(&parsed, json_schema, schemas),
        Err(e) => JsonOutcome {
            valid: false,
            errors: vec![Diagnostic {
                message: format!("invalid yaml: {e}"),
                code: Some("PARSE_ERROR".to_string()),
                line: e.location().map(|l| l.line() as u32),
                column: e.location().map(|l| l.column() as u32),
                details: None,
            }],
            warnings: Vec::new(),
            details: Value::Object(Default::default()),
        },
    }
}
