use scratch_core::error::{Result, ServiceError};
use scratch_core::model::SchemaEntry;
use uuid::Uuid;

use crate::engine::Engine;
use crate::pads;

/// Structurally validates that `schema` parses as a JSON Schema object
/// (`§3`: "MUST structurally parse as a JSON Schema"). This is the one
/// place `VALIDATION_ERROR` may legitimately originate from *structure*
/// rather than cell content (`§4.C`: "the request structure itself is
/// malformed").
fn check_schema_structure(schema: &serde_json::Value) -> Result<()> {
    if !schema.is_object() {
        return Err(ServiceError::ValidationError(
            "schema must be a JSON object".to_string(),
        ));
    }
    jsonschema::JSONSchema::compile(schema)
        .map(|_| ())
        .map_err(|e| ServiceError::ValidationError(format!("invalid json schema: {e}")))
}

/// `upsert_schema` (`§4.B`). Registers `{id, description, schema}` under
/// `scratchpad.metadata.schemas.<name>`.
pub async fn upsert_schema(
    engine: &Engine,
    tenant: &str,
    scratch_id: Uuid,
    name: &str,
    description: String,
    schema: serde_json::Value,
) -> Result<SchemaEntry> {
    check_schema_structure(&schema)?;
    let mut pad = pads::load_pad(engine, tenant, scratch_id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    let entry = SchemaEntry {
        id: Uuid::new_v4(),
        description,
        schema,
    };

    let schemas_obj = pad
        .metadata
        .entry("schemas")
        .or_insert_with(|| serde_json::Value::Object(Default::default()));
    if !schemas_obj.is_object() {
        *schemas_obj = serde_json::Value::Object(Default::default());
    }
    schemas_obj
        .as_object_mut()
        .expect("set to object above")
        .insert(name.to_string(), serde_json::to_value(&entry)?);

    pads::touch_last_access(engine, &mut pad).await?;
    Ok(entry)
}

pub async fn get_schema(engine: &Engine, tenant: &str, scratch_id: Uuid, name: &str) -> Result<SchemaEntry> {
    let pad = pads::load_pad(engine, tenant, scratch_id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    pad.schemas()
        .get(name)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound)
}

pub async fn list_schemas(
    engine: &Engine,
    tenant: &str,
    scratch_id: Uuid,
) -> Result<std::collections::BTreeMap<String, SchemaEntry>> {
    let pad = pads::load_pad(engine, tenant, scratch_id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    Ok(pad.schemas())
}
