//! Tests for the ingestion pipeline
//!
//! These tests verify:
//! - Rows with unparsable business ids never reach the store
//! - Batches persist in order and `total_rows` matches the stored count
//! - Decode failures, store failures and cancellation roll the dataset back
//! - The controller state machine, driven through a plain channel

#[path = "../common/mod.rs"]
mod common;

use std::fmt::Write as _;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use atlasgrid::catalog::{NewDataset, RecordStore};
use atlasgrid::ingest::{
    begin_import, spawn_decode_worker, ImportController, ImportEvent, ImportState,
};
use atlasgrid::protocol::{ImportCommand, ImportMessage, Progress};
use atlasgrid::GridError;
use crossbeam::channel;

use common::{
    memory_store, seeded_record, setup_temp_dir, test_config, wait_until, write_source,
    FailingStore,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn csv_source(rows: usize) -> String {
    let mut text = String::from("businessId,title,sourceRef,images\n");
    for i in 0..rows {
        writeln!(text, "{},Item {},{},https://img.example/{}.jpg", 1000 + i, i, i, i).unwrap();
    }
    text
}

fn states(events: &channel::Receiver<ImportEvent>) -> Vec<ImportState> {
    events
        .try_iter()
        .filter_map(|event| match event {
            ImportEvent::State(state) => Some(state),
            ImportEvent::Progress(_) => None,
        })
        .collect()
}

fn empty_dataset(store: &dyn RecordStore) -> atlasgrid::catalog::Dataset {
    store
        .create_dataset(NewDataset {
            name: "manual.csv".to_string(),
            byte_size: 0,
        })
        .unwrap()
}

// =============================================================================
// End-to-End Import Tests
// =============================================================================

#[test]
fn test_json_example_drops_bad_row() {
    let temp = setup_temp_dir();
    let config = test_config(temp.path());
    let store = memory_store();
    let path = write_source(
        temp.path(),
        "example.json",
        r#"[{"id":1,"title":"A"},{"id":"x","title":"bad"},{"id":2,"title":"B"}]"#,
    );

    let dataset = begin_import(Arc::clone(&store), &path, &config).unwrap().wait().unwrap();

    assert_eq!(dataset.total_rows, 2);
    assert_eq!(store.count_records_by_dataset(dataset.id).unwrap(), 2);
    let titles: Vec<String> = store
        .query_records_by_dataset(dataset.id, 0, 10)
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn test_csv_example_drops_bad_row() {
    let temp = setup_temp_dir();
    let config = test_config(temp.path());
    let store = memory_store();
    let path = write_source(
        temp.path(),
        "example.csv",
        "id,title,sourceRef,images\n1,A,,\nx,bad,3,\n2,B,n/a,\"[\"\"u1.png\"\", 'u2.png']\"\n",
    );

    let dataset = begin_import(Arc::clone(&store), &path, &config).unwrap().wait().unwrap();

    assert_eq!(dataset.total_rows, 2);
    assert_eq!(dataset.name, "example.csv");
    let records = store.query_records_by_dataset(dataset.id, 0, 10).unwrap();
    assert_eq!(records[0].business_id, 1);
    assert!(records[0].images.is_empty());
    assert_eq!(records[1].source_ref, 0);
    assert_eq!(records[1].images, vec!["u1.png".to_string(), "u2.png".to_string()]);
}

#[test]
fn test_large_import_persists_in_order() {
    let temp = setup_temp_dir();
    let config = test_config(temp.path());
    let store = memory_store();
    let path = write_source(temp.path(), "items.tsv", &csv_source(95).replace(',', "\t"));

    let handle = begin_import(Arc::clone(&store), &path, &config).unwrap();
    let events = handle.events().clone();
    let dataset = handle.wait().unwrap();

    assert_eq!(dataset.total_rows, 95);
    assert_eq!(store.count_records_by_dataset(dataset.id).unwrap(), 95);
    let ids: Vec<i64> = store
        .query_records_by_dataset(dataset.id, 0, 200)
        .unwrap()
        .iter()
        .map(|r| r.business_id)
        .collect();
    assert_eq!(ids, (1000..1095).collect::<Vec<i64>>());

    let all: Vec<ImportEvent> = events.try_iter().collect();
    let progress: Vec<Progress> = all
        .iter()
        .filter_map(|e| match e {
            ImportEvent::Progress(p) => Some(*p),
            ImportEvent::State(_) => None,
        })
        .collect();
    // One per full batch of 10 plus the final report
    assert_eq!(progress.len(), 10);
    assert!(progress.windows(2).all(|w| w[0].processed <= w[1].processed));
    assert_eq!(progress.last().unwrap().processed, 95);

    let seen_states: Vec<&ImportState> = all
        .iter()
        .filter_map(|e| match e {
            ImportEvent::State(s) => Some(s),
            ImportEvent::Progress(_) => None,
        })
        .collect();
    assert_eq!(
        seen_states,
        vec![&ImportState::Parsing, &ImportState::Saving, &ImportState::Done]
    );
}

#[test]
fn test_import_on_durable_store() {
    let temp = setup_temp_dir();
    let config = test_config(temp.path());
    let engine = Arc::new(atlasgrid::Engine::open(&config.catalog_dir(), &config).unwrap());
    let store: Arc<dyn RecordStore> =
        Arc::new(atlasgrid::KvRecordStore::new(engine as Arc<dyn atlasgrid::KvStore>));
    let path = write_source(temp.path(), "items.csv", &csv_source(250));

    let dataset = begin_import(Arc::clone(&store), &path, &config).unwrap().wait().unwrap();
    assert_eq!(dataset.total_rows, 250);
    assert_eq!(store.count_records_by_dataset(dataset.id).unwrap(), 250);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_malformed_json_rolls_back() {
    let temp = setup_temp_dir();
    let config = test_config(temp.path());
    let store = memory_store();
    let mut text = String::from("[");
    for i in 0..40 {
        write!(text, "{{\"id\":{},\"title\":\"t\"}},", i).unwrap();
    }
    text.push_str("{\"id\": oops}]");
    let path = write_source(temp.path(), "broken.json", &text);

    let handle = begin_import(Arc::clone(&store), &path, &config).unwrap();
    let dataset_id = handle.dataset_id();
    let err = handle.wait().unwrap_err();

    assert!(matches!(err, GridError::Decode(_)));
    assert!(store.list_datasets().unwrap().is_empty());
    assert_eq!(store.count_records_by_dataset(dataset_id).unwrap(), 0);
}

#[test]
fn test_missing_business_column_rolls_back() {
    let temp = setup_temp_dir();
    let config = test_config(temp.path());
    let store = memory_store();
    let path = write_source(temp.path(), "nocol.csv", "title,images\nA,\nB,\n");

    let handle = begin_import(Arc::clone(&store), &path, &config).unwrap();
    let err = handle.wait().unwrap_err();
    assert!(matches!(&err, GridError::Decode(m) if m == "source has no business id column"));
    assert_eq!(err.to_string(), "Decode error: source has no business id column");
    assert!(store.list_datasets().unwrap().is_empty());
}

#[test]
fn test_insert_failure_rolls_back() {
    let temp = setup_temp_dir();
    let config = test_config(temp.path());
    let inner = memory_store();
    let failing = FailingStore::new(Arc::clone(&inner));
    failing.insert_budget.store(1, Ordering::SeqCst);
    let store: Arc<dyn RecordStore> = Arc::new(failing);
    let path = write_source(temp.path(), "items.csv", &csv_source(95));

    let handle = begin_import(Arc::clone(&store), &path, &config).unwrap();
    let dataset_id = handle.dataset_id();
    let events = handle.events().clone();
    let err = handle.wait().unwrap_err();

    assert!(matches!(err, GridError::Persistence(_)));
    assert!(inner.get_dataset(dataset_id).unwrap().is_none());
    assert_eq!(inner.count_records_by_dataset(dataset_id).unwrap(), 0);
    assert!(matches!(states(&events).last(), Some(ImportState::Error(m)) if m.contains("disk unavailable")));
}

#[test]
fn test_missing_file_creates_nothing() {
    let temp = setup_temp_dir();
    let config = test_config(temp.path());
    let store = memory_store();

    let err = begin_import(Arc::clone(&store), &temp.path().join("absent.csv"), &config)
        .err()
        .unwrap();
    assert!(matches!(err, GridError::Decode(_)));
    assert!(store.list_datasets().unwrap().is_empty());
}

#[test]
fn test_handle_cancel_leaves_nothing() {
    let temp = setup_temp_dir();
    let config = test_config(temp.path());
    let store = memory_store();
    let path = write_source(temp.path(), "big.csv", &csv_source(20_000));

    let handle = begin_import(Arc::clone(&store), &path, &config).unwrap();
    let dataset_id = handle.dataset_id();
    handle.cancel();

    match handle.wait() {
        Err(e) => {
            assert!(e.is_cancelled());
            assert!(store.get_dataset(dataset_id).unwrap().is_none());
            assert_eq!(store.count_records_by_dataset(dataset_id).unwrap(), 0);
        }
        // Finished before the flag was seen
        Ok(dataset) => {
            assert_eq!(store.count_records_by_dataset(dataset_id).unwrap(), dataset.total_rows)
        }
    }
}

// =============================================================================
// Decode Worker Tests
// =============================================================================

#[test]
fn test_decode_worker_message_order() {
    let temp = setup_temp_dir();
    let path = write_source(temp.path(), "items.csv", &csv_source(25));
    let (tx, rx) = channel::unbounded();

    let worker = spawn_decode_worker(
        ImportCommand::Parse {
            path,
            dataset_id: 9,
        },
        10,
        Arc::new(Default::default()),
        tx,
    )
    .unwrap();
    worker.join().unwrap();

    let messages: Vec<ImportMessage> = rx.try_iter().collect();
    let chunk_sizes: Vec<usize> = messages
        .iter()
        .filter_map(|m| match m {
            ImportMessage::Chunk { rows, dataset_id } => {
                assert_eq!(*dataset_id, 9);
                Some(rows.len())
            }
            _ => None,
        })
        .collect();
    assert_eq!(chunk_sizes, vec![10, 10, 5]);
    assert!(matches!(
        messages.last(),
        Some(ImportMessage::Done {
            total_rows: 25,
            dataset_id: 9
        })
    ));
    assert!(matches!(
        messages[messages.len() - 2],
        ImportMessage::Progress(Progress {
            processed: 25,
            total_seen: 25
        })
    ));
}

#[test]
fn test_decode_worker_reports_bare_message() {
    let temp = setup_temp_dir();
    let path = write_source(temp.path(), "nocol.csv", "title,images\nA,\n");
    let (tx, rx) = channel::unbounded();

    let worker = spawn_decode_worker(
        ImportCommand::Parse {
            path,
            dataset_id: 3,
        },
        10,
        Arc::new(Default::default()),
        tx,
    )
    .unwrap();
    worker.join().unwrap();

    let messages: Vec<ImportMessage> = rx.try_iter().collect();
    assert!(matches!(
        messages.as_slice(),
        [ImportMessage::Error { message }] if message == "source has no business id column"
    ));
}

// =============================================================================
// Controller Tests (synchronous channel, no decode worker)
// =============================================================================

#[test]
fn test_controller_finalizes_total_last() {
    let store = memory_store();
    let dataset = empty_dataset(store.as_ref());
    let (controller, _cancel, state, events) =
        ImportController::new(Arc::clone(&store), dataset.clone(), 2);

    let (tx, rx) = channel::unbounded();
    for batch in 0..3 {
        let rows = (0..10).map(|i| seeded_record(dataset.id, batch * 10 + i)).collect();
        tx.send(ImportMessage::Chunk {
            rows,
            dataset_id: dataset.id,
        })
        .unwrap();
    }
    tx.send(ImportMessage::Done {
        total_rows: 30,
        dataset_id: dataset.id,
    })
    .unwrap();

    let finished = controller.drive(rx).unwrap();
    assert_eq!(finished.total_rows, 30);
    assert_eq!(store.get_dataset(dataset.id).unwrap().unwrap().total_rows, 30);
    assert_eq!(*state.read(), ImportState::Done);
    assert_eq!(
        states(&events),
        vec![ImportState::Parsing, ImportState::Saving, ImportState::Done]
    );
}

#[test]
fn test_controller_cancel_mid_import() {
    let store = memory_store();
    let dataset = empty_dataset(store.as_ref());
    let (controller, cancel, state, events) =
        ImportController::new(Arc::clone(&store), dataset.clone(), 2);
    let (tx, rx) = channel::unbounded();

    let driver = thread::spawn(move || controller.drive(rx));

    let first = (0..10).map(|i| seeded_record(dataset.id, i)).collect();
    tx.send(ImportMessage::Chunk {
        rows: first,
        dataset_id: dataset.id,
    })
    .unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        store.count_records_by_dataset(dataset.id).unwrap() == 10
    }));

    cancel.store(true, Ordering::SeqCst);
    let second = (10..20).map(|i| seeded_record(dataset.id, i)).collect();
    let _ = tx.send(ImportMessage::Chunk {
        rows: second,
        dataset_id: dataset.id,
    });

    let err = driver.join().unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(store.list_datasets().unwrap().is_empty());
    assert_eq!(store.count_records_by_dataset(dataset.id).unwrap(), 0);
    assert_eq!(*state.read(), ImportState::Idle);
    assert_eq!(states(&events).last(), Some(&ImportState::Idle));
}

#[test]
fn test_controller_worker_error_rolls_back() {
    let store = memory_store();
    let dataset = empty_dataset(store.as_ref());
    let (controller, _cancel, state, _events) =
        ImportController::new(Arc::clone(&store), dataset.clone(), 2);

    let (tx, rx) = channel::unbounded();
    tx.send(ImportMessage::Chunk {
        rows: (0..5).map(|i| seeded_record(dataset.id, i)).collect(),
        dataset_id: dataset.id,
    })
    .unwrap();
    tx.send(ImportMessage::Error {
        message: "line 7: unterminated quote".to_string(),
    })
    .unwrap();

    let err = controller.drive(rx).unwrap_err();
    assert!(matches!(err, GridError::Decode(ref m) if m.contains("unterminated")));
    assert!(store.get_dataset(dataset.id).unwrap().is_none());
    assert_eq!(store.count_records_by_dataset(dataset.id).unwrap(), 0);
    assert!(matches!(&*state.read(), ImportState::Error(m) if m.contains("unterminated")));
}

#[test]
fn test_controller_drain_failure_rolls_back() {
    let inner = memory_store();
    let dataset = empty_dataset(inner.as_ref());
    let failing = FailingStore::new(Arc::clone(&inner));
    failing.insert_budget.store(1, Ordering::SeqCst);
    let (controller, _cancel, state, _events) =
        ImportController::new(Arc::new(failing), dataset.clone(), 2);

    let (tx, rx) = channel::unbounded();
    for batch in 0..3 {
        let rows = (0..10).map(|i| seeded_record(dataset.id, batch * 10 + i)).collect();
        tx.send(ImportMessage::Chunk {
            rows,
            dataset_id: dataset.id,
        })
        .unwrap();
    }
    tx.send(ImportMessage::Done {
        total_rows: 30,
        dataset_id: dataset.id,
    })
    .unwrap();

    let err = controller.drive(rx).unwrap_err();
    assert!(matches!(err, GridError::Persistence(_)));
    assert!(inner.get_dataset(dataset.id).unwrap().is_none());
    assert_eq!(inner.count_records_by_dataset(dataset.id).unwrap(), 0);
    assert!(matches!(&*state.read(), ImportState::Error(m) if m.contains("disk unavailable")));
}

#[test]
fn test_controller_finalize_failure_rolls_back() {
    let inner = memory_store();
    let dataset = empty_dataset(inner.as_ref());
    let failing = FailingStore::new(Arc::clone(&inner));
    failing.fail_updates.store(true, Ordering::SeqCst);
    let (controller, _cancel, state, events) =
        ImportController::new(Arc::new(failing), dataset.clone(), 2);

    let (tx, rx) = channel::unbounded();
    tx.send(ImportMessage::Chunk {
        rows: (0..10).map(|i| seeded_record(dataset.id, i)).collect(),
        dataset_id: dataset.id,
    })
    .unwrap();
    tx.send(ImportMessage::Done {
        total_rows: 10,
        dataset_id: dataset.id,
    })
    .unwrap();

    let err = controller.drive(rx).unwrap_err();
    assert!(matches!(err, GridError::Persistence(_)));
    assert!(inner.get_dataset(dataset.id).unwrap().is_none());
    assert_eq!(inner.count_records_by_dataset(dataset.id).unwrap(), 0);
    assert!(matches!(&*state.read(), ImportState::Error(_)));
    let seen = states(&events);
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[..2].to_vec(), vec![ImportState::Parsing, ImportState::Saving]);
}

#[test]
fn test_controller_worker_vanishing_is_an_error() {
    let store = memory_store();
    let dataset = empty_dataset(store.as_ref());
    let (controller, _cancel, _state, _events) =
        ImportController::new(Arc::clone(&store), dataset.clone(), 2);

    let (tx, rx) = channel::unbounded::<ImportMessage>();
    tx.send(ImportMessage::Progress(Progress {
        processed: 0,
        total_seen: 3,
    }))
    .unwrap();
    drop(tx);

    let err = controller.drive(rx).unwrap_err();
    assert!(matches!(err, GridError::Worker(_)));
    assert!(store.list_datasets().unwrap().is_empty());
}

#[test]
fn test_controller_rejects_foreign_chunk() {
    let store = memory_store();
    let dataset = empty_dataset(store.as_ref());
    let (controller, _cancel, _state, _events) =
        ImportController::new(Arc::clone(&store), dataset.clone(), 2);

    let (tx, rx) = channel::unbounded();
    tx.send(ImportMessage::Chunk {
        rows: vec![seeded_record(dataset.id + 1, 0)],
        dataset_id: dataset.id + 1,
    })
    .unwrap();

    assert!(controller.drive(rx).is_err());
    assert!(store.list_datasets().unwrap().is_empty());
}
