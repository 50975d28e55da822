use std::collections::BTreeMap;

use crate::model::{Cell, SchemaEntry, ValidationResult};

/// The seam between the catalog store (`scratch-store`) and the advisory
/// validation pipeline (`scratch-validate`), mirroring `Embedder`.
#[async_trait::async_trait]
pub trait Validator: Send + Sync {
    /// Pure, side-effect-free, deterministic per `§4.C`. `schemas` is the
    /// owning pad's schema registry, consulted for `$ref` resolution.
    async fn validate(&self, cell: &Cell, schemas: &BTreeMap<String, SchemaEntry>) -> ValidationResult;
}
