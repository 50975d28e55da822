use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use scratch_core::error::ServiceError;
use scratch_core::model::{CellDraft, EvictionPolicy, Language};
use scratch_search::LocalEmbedder;
use scratch_store::{Engine, Store, StoreConfig};
use scratch_validate::ScratchValidator;

async fn new_store(dir: &std::path::Path, cfg: StoreConfig) -> Store {
    let engine = Arc::new(Engine::open(dir.to_str().unwrap()).await.unwrap());
    let embedder: Arc<dyn scratch_core::embedder::Embedder> = Arc::new(LocalEmbedder::new(scratch_store::engine::EMBEDDING_DIM));
    let validator: Arc<dyn scratch_core::validator::Validator> = Arc::new(ScratchValidator::new());
    Store::new(engine, embedder, validator, cfg)
}

fn default_cfg() -> StoreConfig {
    StoreConfig {
        max_scratchpads: 0,
        max_cells_per_pad: 0,
        max_cell_bytes: 0,
        eviction_policy: EvictionPolicy::Fail,
        validation_request_timeout: Duration::from_secs(5),
        enable_semantic_search: true,
    }
}

fn draft(language: Language, content: &str, validate: bool) -> CellDraft {
    CellDraft {
        language,
        content: content.to_string(),
        validate,
        json_schema: None,
        metadata: Default::default(),
        tags: Default::default(),
    }
}

/// Spec `§8` scenario 1: create with initial cells, then reorder via
/// `replace_cell`'s `new_index`. Indices stay contiguous throughout.
#[tokio::test]
async fn create_with_initial_cells_and_reorder() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path(), default_cfg()).await;

    let outcome = store
        .create(
            "t1",
            None,
            None,
            BTreeSet::new(),
            Default::default(),
            vec![
                draft(Language::Json, "{\"x\":1}", true),
                draft(Language::Md, "# t", false),
            ],
        )
        .await
        .unwrap();

    assert_eq!(outcome.pad.cells.len(), 2);
    assert_eq!(outcome.pad.cells[0].index, 0);
    assert_eq!(outcome.pad.cells[1].index, 1);
    // no content in the lightweight response
    let scratch_id = outcome.pad.scratch_id;

    let full = store.read("t1", scratch_id, None, None, None).await.unwrap();
    let cell1_id = full.cells[1].cell_id;

    let (pad, _) = store
        .replace_cell("t1", scratch_id, cell1_id, draft(Language::Md, "# t2", false), Some(0))
        .await
        .unwrap();

    assert_eq!(pad.cells.len(), 2);
    assert_eq!(pad.cells[0].index, 0);
    assert_eq!(pad.cells[1].index, 1);
    assert_eq!(pad.cells[0].cell_id, cell1_id);

    let full = store.read("t1", scratch_id, None, None, None).await.unwrap();
    assert_eq!(full.cells[0].content, "# t2");
    assert_eq!(full.cells[1].content, "{\"x\":1}");
}

/// Spec `§8` scenario 2: advisory validation with a missing `$ref` persists
/// the cell and reports a warning, never an error.
#[tokio::test]
async fn missing_schema_ref_is_advisory() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path(), default_cfg()).await;

    let outcome = store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap();
    let scratch_id = outcome.pad.scratch_id;

    let mut cell = draft(Language::Json, "{\"y\":2}", true);
    cell.json_schema = Some(serde_json::json!({ "$ref": "scratchpad://schemas/missing" }));

    let (pad, validation) = store.append_cell("t1", scratch_id, cell).await.unwrap();
    assert_eq!(pad.cells.len(), 1);
    let result = validation.expect("validation requested");
    assert!(result.valid);
    assert_eq!(result.warnings[0].code.as_deref(), Some("UNRESOLVED_SCHEMA_REF"));

    // the write persisted despite the unresolved ref
    let full = store.read("t1", scratch_id, None, None, None).await.unwrap();
    assert_eq!(full.cells.len(), 1);
}

/// Spec `§8` scenario 3: discard eviction selects the LRU pad by ascending
/// `last_access_at`.
#[tokio::test]
async fn discard_eviction_picks_lru_victim() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig {
        max_scratchpads: 2,
        eviction_policy: EvictionPolicy::Discard,
        ..default_cfg()
    };
    let store = new_store(dir.path(), cfg).await;

    let p1 = store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap()
        .pad
        .scratch_id;
    let p2 = store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap()
        .pad
        .scratch_id;

    // touch p1 so it is more recently accessed than p2
    tokio::time::sleep(Duration::from_millis(5)).await;
    store.read("t1", p1, None, None, None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let outcome = store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap();

    assert_eq!(outcome.evicted_scratchpads, vec![p2]);

    let remaining = store.list("t1", &[], &[], None).await.unwrap();
    let ids: BTreeSet<_> = remaining.iter().map(|p| p.scratch_id).collect();
    assert!(ids.contains(&p1));
    assert!(!ids.contains(&p2));
    assert_eq!(remaining.len(), 2);
}

/// Spec `§8` scenario 3 (fail variant): under `fail`, the (N+1)-th create
/// errors and nothing is created.
#[tokio::test]
async fn fail_policy_rejects_over_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig {
        max_scratchpads: 1,
        eviction_policy: EvictionPolicy::Fail,
        ..default_cfg()
    };
    let store = new_store(dir.path(), cfg).await;

    store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap();

    let err = store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::CapacityLimitReached));
    assert_eq!(store.list("t1", &[], &[], None).await.unwrap().len(), 1);
}

/// Spec `§8` scenario 5: tenant isolation. A pad created under one tenant is
/// `NOT_FOUND` for another tenant, never leaking existence.
#[tokio::test]
async fn tenant_isolation_hides_existence() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path(), default_cfg()).await;

    let scratch_id = store
        .create("tenant-a", None, None, BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap()
        .pad
        .scratch_id;

    let err = store.read("tenant-b", scratch_id, None, None, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound));
}

/// Invariant 3 (`§3`/`§8`): `cell_tags` equals the union of cell tags, kept
/// current after an append.
#[tokio::test]
async fn cell_tags_aggregate_from_cells() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path(), default_cfg()).await;

    let mut d1 = draft(Language::Txt, "a", false);
    d1.tags = BTreeSet::from(["alpha".to_string()]);
    let outcome = store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![d1])
        .await
        .unwrap();
    let scratch_id = outcome.pad.scratch_id;

    let mut d2 = draft(Language::Txt, "b", false);
    d2.tags = BTreeSet::from(["beta".to_string()]);
    store.append_cell("t1", scratch_id, d2).await.unwrap();

    let full = store.read("t1", scratch_id, None, None, None).await.unwrap();
    assert_eq!(
        full.cell_tags(),
        BTreeSet::from(["alpha".to_string(), "beta".to_string()])
    );
}

/// Round-trip/idempotence (`§8`): deleting twice is safe and reports
/// `deleted=false` the second time.
#[tokio::test]
async fn delete_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path(), default_cfg()).await;

    let scratch_id = store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap()
        .pad
        .scratch_id;

    assert!(store.delete("t1", scratch_id).await.unwrap());
    assert!(!store.delete("t1", scratch_id).await.unwrap());
}

/// `max_cell_bytes` is enforced on UTF-8 byte length and rejects the write
/// atomically (the pad is left untouched).
#[tokio::test]
async fn max_cell_bytes_rejects_oversized_content() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig {
        max_cell_bytes: 4,
        ..default_cfg()
    };
    let store = new_store(dir.path(), cfg).await;

    let scratch_id = store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap()
        .pad
        .scratch_id;

    let err = store
        .append_cell("t1", scratch_id, draft(Language::Txt, "too long for four bytes", false))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::CapacityLimitReached));

    let full = store.read("t1", scratch_id, None, None, None).await.unwrap();
    assert!(full.cells.is_empty());
}

/// Namespace rename with `migrate=true` carries existing pads over to the
/// new namespace name.
#[tokio::test]
async fn namespace_rename_migrates_pads() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path(), default_cfg()).await;

    store.create_namespace("t1", "a").await.unwrap();
    let scratch_id = store
        .create("t1", None, Some("a".to_string()), BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap()
        .pad
        .scratch_id;

    store.rename_namespace("t1", "a", "b", true).await.unwrap();

    let pads_in_b = store.list("t1", &["b".to_string()], &[], None).await.unwrap();
    assert_eq!(pads_in_b.len(), 1);
    assert_eq!(pads_in_b[0].scratch_id, scratch_id);

    let pads_in_a = store.list("t1", &["a".to_string()], &[], None).await.unwrap();
    assert!(pads_in_a.is_empty());
}

/// Semantic search pre-filter (`§8` scenario 6, reduced scale): a tag filter
/// excludes non-matching pads from the result even though they might score
/// higher, proving the predicate runs before top-k truncation.
#[tokio::test]
async fn search_pushes_down_tag_filter() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path(), default_cfg()).await;

    let mut tagged = draft(Language::Txt, "deploy the release to production", false);
    tagged.tags = BTreeSet::from(["deploy".to_string()]);
    store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![tagged])
        .await
        .unwrap();

    let mut untagged = draft(Language::Txt, "deploy the release to production", false);
    untagged.tags = BTreeSet::new();
    store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![untagged])
        .await
        .unwrap();

    let hits = store
        .search("t1", "deploy the release", &[], &["deploy".to_string()], 5)
        .await
        .unwrap();

    assert!(!hits.is_empty());
    for hit in &hits {
        assert!(hit.tags.contains("deploy"));
    }
}

/// Schema registry: an upserted schema can be resolved by a cell's
/// `json_schema` `$ref`, turning a previously-unresolved reference into a
/// real schema validation.
#[tokio::test]
async fn upserted_schema_resolves_ref() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path(), default_cfg()).await;

    let scratch_id = store
        .create("t1", None, None, BTreeSet::new(), Default::default(), vec![])
        .await
        .unwrap()
        .pad
        .scratch_id;

    store
        .upsert_schema(
            "t1",
            scratch_id,
            "point",
            "a point".to_string(),
            serde_json::json!({
                "type": "object",
                "required": ["x"],
                "properties": { "x": { "type": "number" } }
            }),
        )
        .await
        .unwrap();

    let mut cell = draft(Language::Json, "{\"x\":1}", true);
    cell.json_schema = Some(serde_json::json!({ "$ref": "scratchpad://schemas/point" }));
    let (_, validation) = store.append_cell("t1", scratch_id, cell).await.unwrap();
    let result = validation.unwrap();
    assert!(result.valid);
    assert!(result.warnings.is_empty());
}
