//! Tests for the record catalog
//!
//! These tests verify:
//! - Dataset creation, patching and listing
//! - Insertion-ordered offset/limit paging
//! - Business id lookups, including negative and duplicate ids
//! - Cascade delete leaving nothing behind
//! - Persistence across an engine reopen

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use atlasgrid::catalog::{DatasetPatch, KvRecordStore, NewDataset, NewRecord, RecordStore};
use atlasgrid::config::WalSyncStrategy;
use atlasgrid::engine::Engine;
use atlasgrid::kv::KvStore;
use atlasgrid::GridError;

use common::{seed_dataset, seeded_record, setup_temp_dir};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store() -> KvRecordStore {
    KvRecordStore::in_memory()
}

fn new_dataset(name: &str) -> NewDataset {
    NewDataset {
        name: name.to_string(),
        byte_size: 42,
    }
}

fn record_with_id(dataset_id: u64, business_id: i64, title: &str) -> NewRecord {
    NewRecord {
        dataset_id,
        business_id,
        title: title.to_string(),
        source_ref: 0,
        images: Vec::new(),
    }
}

// =============================================================================
// Dataset Tests
// =============================================================================

#[test]
fn test_create_assigns_increasing_ids() {
    let store = setup_store();
    let first = store.create_dataset(new_dataset("a.csv")).unwrap();
    let second = store.create_dataset(new_dataset("b.csv")).unwrap();

    assert_eq!(first.id, 1);
    assert_eq!(second.id, 2);
    assert_eq!(first.total_rows, 0);
    assert_eq!(first.byte_size, 42);

    let listed = store.list_datasets().unwrap();
    assert_eq!(listed.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(), vec!["a.csv", "b.csv"]);
}

#[test]
fn test_ids_not_reused_after_delete() {
    let store = setup_store();
    let first = store.create_dataset(new_dataset("a.csv")).unwrap();
    store.delete_dataset_cascade(first.id).unwrap();
    let second = store.create_dataset(new_dataset("b.csv")).unwrap();
    assert!(second.id > first.id);
}

#[test]
fn test_update_dataset_patches_fields() {
    let store = setup_store();
    let dataset = store.create_dataset(new_dataset("a.csv")).unwrap();

    let updated = store.update_dataset(dataset.id, DatasetPatch::total_rows(12)).unwrap();
    assert_eq!(updated.total_rows, 12);
    assert_eq!(updated.name, "a.csv");

    let renamed = store
        .update_dataset(
            dataset.id,
            DatasetPatch {
                name: Some("renamed.csv".to_string()),
                total_rows: None,
            },
        )
        .unwrap();
    assert_eq!(renamed.total_rows, 12);
    assert_eq!(store.get_dataset(dataset.id).unwrap().unwrap().name, "renamed.csv");
}

#[test]
fn test_update_missing_dataset_fails() {
    let store = setup_store();
    let err = store.update_dataset(99, DatasetPatch::total_rows(1)).unwrap_err();
    assert!(matches!(err, GridError::Persistence(_)));
}

// =============================================================================
// Record Tests
// =============================================================================

#[test]
fn test_paging_follows_insertion_order() {
    let store = setup_store();
    let dataset = seed_dataset(&store, "items.csv", 450);

    let page = store.query_records_by_dataset(dataset.id, 200, 200).unwrap();
    assert_eq!(page.len(), 200);
    assert_eq!(page[0].business_id, 1200);
    assert_eq!(page[199].business_id, 1399);

    let tail = store.query_records_by_dataset(dataset.id, 400, 200).unwrap();
    assert_eq!(tail.len(), 50);
    assert!(store.query_records_by_dataset(dataset.id, 450, 200).unwrap().is_empty());
    assert_eq!(store.count_records_by_dataset(dataset.id).unwrap(), 450);
}

#[test]
fn test_datasets_do_not_mix() {
    let store = setup_store();
    let a = seed_dataset(&store, "a.csv", 30);
    let b = seed_dataset(&store, "b.csv", 10);

    let page = store.query_records_by_dataset(b.id, 0, 100).unwrap();
    assert_eq!(page.len(), 10);
    assert!(page.iter().all(|r| r.dataset_id == b.id));
    assert_eq!(store.count_records_by_dataset(a.id).unwrap(), 30);
}

#[test]
fn test_primary_keys_are_global() {
    let store = setup_store();
    let a = seed_dataset(&store, "a.csv", 3);
    let b = seed_dataset(&store, "b.csv", 3);

    let mut ids: Vec<u64> = store
        .query_records_by_dataset(a.id, 0, 10)
        .unwrap()
        .into_iter()
        .chain(store.query_records_by_dataset(b.id, 0, 10).unwrap())
        .map(|r| r.id)
        .collect();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

#[test]
fn test_insert_into_missing_dataset_rejected() {
    let store = setup_store();
    let err = store
        .bulk_insert_records(vec![seeded_record(7, 0)])
        .unwrap_err();
    assert!(matches!(err, GridError::Persistence(_)));
    assert_eq!(store.count_records_by_dataset(7).unwrap(), 0);
    assert_eq!(store.bulk_insert_records(Vec::new()).unwrap(), 0);
}

#[test]
fn test_business_id_lookup() {
    let store = setup_store();
    let dataset = store.create_dataset(new_dataset("ids.csv")).unwrap();
    store
        .bulk_insert_records(vec![
            record_with_id(dataset.id, 5, "five"),
            record_with_id(dataset.id, -3, "minus three"),
            record_with_id(dataset.id, 5, "five again"),
            record_with_id(dataset.id, 9, "nine"),
        ])
        .unwrap();

    let found = store
        .query_records_by_business_ids(dataset.id, &[9, 5, 404])
        .unwrap();
    assert_eq!(
        found.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
        vec!["five", "five again", "nine"]
    );

    assert_eq!(store.all_business_ids(dataset.id).unwrap(), vec![-3, 5, 9]);
    assert!(store.query_records_by_business_ids(dataset.id, &[]).unwrap().is_empty());
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_cascade_delete_removes_everything() {
    let store = setup_store();
    let doomed = seed_dataset(&store, "doomed.csv", 120);
    let kept = seed_dataset(&store, "kept.csv", 5);

    store.delete_dataset_cascade(doomed.id).unwrap();

    assert!(store.get_dataset(doomed.id).unwrap().is_none());
    assert_eq!(store.list_datasets().unwrap().len(), 1);
    assert_eq!(store.count_records_by_dataset(doomed.id).unwrap(), 0);
    assert!(store.all_business_ids(doomed.id).unwrap().is_empty());
    assert!(store
        .query_records_by_business_ids(doomed.id, &[1000, 1001])
        .unwrap()
        .is_empty());
    assert_eq!(store.count_records_by_dataset(kept.id).unwrap(), 5);
}

#[test]
fn test_delete_records_keeps_dataset() {
    let store = setup_store();
    let dataset = seed_dataset(&store, "a.csv", 25);

    store.delete_records_by_dataset(dataset.id).unwrap();
    assert!(store.get_dataset(dataset.id).unwrap().is_some());
    assert_eq!(store.count_records_by_dataset(dataset.id).unwrap(), 0);

    // Sequences restart so offsets stay dense
    store
        .bulk_insert_records(vec![record_with_id(dataset.id, 77, "fresh")])
        .unwrap();
    let page = store.query_records_by_dataset(dataset.id, 0, 10).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].business_id, 77);
}

// =============================================================================
// Durable Store Tests
// =============================================================================

#[test]
fn test_catalog_survives_reopen() {
    let temp = setup_temp_dir();
    let dataset_id = {
        let engine: Arc<dyn KvStore> =
            Arc::new(Engine::open_with(temp.path(), WalSyncStrategy::EveryWrite, 4096).unwrap());
        let store = KvRecordStore::new(engine);
        seed_dataset(&store, "durable.csv", 300).id
    };

    let engine: Arc<dyn KvStore> =
        Arc::new(Engine::open_with(temp.path(), WalSyncStrategy::EveryWrite, 4096).unwrap());
    let store = KvRecordStore::new(engine);

    let dataset = store.get_dataset(dataset_id).unwrap().unwrap();
    assert_eq!(dataset.total_rows, 300);
    assert_eq!(store.count_records_by_dataset(dataset_id).unwrap(), 300);
    let page = store.query_records_by_dataset(dataset_id, 250, 100).unwrap();
    assert_eq!(page.len(), 50);
    assert_eq!(page[0].title, "Item 250");
    assert_eq!(page[0].images, vec!["https://img.example/250.jpg".to_string()]);
}

#[test]
fn test_concurrent_inserts_into_separate_datasets() {
    let store = Arc::new(setup_store());
    let datasets: Vec<u64> = (0..4)
        .map(|i| store.create_dataset(new_dataset(&format!("{}.csv", i))).unwrap().id)
        .collect();

    let handles: Vec<_> = datasets
        .iter()
        .map(|&dataset_id| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for batch in 0..10 {
                    let rows = (0..20).map(|i| seeded_record(dataset_id, batch * 20 + i)).collect();
                    store.bulk_insert_records(rows).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for dataset_id in datasets {
        assert_eq!(store.count_records_by_dataset(dataset_id).unwrap(), 200);
        let page = store.query_records_by_dataset(dataset_id, 0, 200).unwrap();
        let ids: Vec<i64> = page.iter().map(|r| r.business_id).collect();
        assert_eq!(ids, (1000..1200).collect::<Vec<i64>>());
    }
}
