//! Tests for the Write-Ahead Log
//!
//! These tests verify:
//! - Entry framing and CRC corruption detection
//! - Batch entries surviving as one unit
//! - LSN sequencing across reopen and truncation
//! - Recovery from torn and corrupted tails

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use atlasgrid::config::WalSyncStrategy;
use atlasgrid::wal::{Operation, WalEntry, WalReader, WalRecovery, WalWriter, HEADER_SIZE};
use atlasgrid::GridError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put(key: &str, value: &str) -> Operation {
    Operation::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

fn batch(n: usize) -> Operation {
    Operation::Batch {
        ops: (0..n)
            .map(|i| put(&format!("r{:04}", i), &format!("row {}", i)))
            .chain(std::iter::once(Operation::Delete { key: b"stale".to_vec() }))
            .collect(),
    }
}

// =============================================================================
// Entry Tests
// =============================================================================

#[test]
fn test_entry_frame_layout() {
    let entry = WalEntry::new(7, put("key", "value"));
    let bytes = entry.serialize().unwrap();

    assert_eq!(&bytes[0..8], &7u64.to_le_bytes());
    let len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
    assert_eq!(bytes.len(), HEADER_SIZE + len);

    let crc = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    assert_eq!(crc, WalEntry::compute_crc(7, len as u32, &bytes[HEADER_SIZE..]));
}

#[test]
fn test_batch_entry_roundtrip() {
    let entry = WalEntry::new(1, batch(50));
    let recovered = WalEntry::deserialize(&entry.serialize().unwrap()).unwrap();
    assert_eq!(entry, recovered);
    match recovered.operation {
        Operation::Batch { ops } => assert_eq!(ops.len(), 51),
        other => panic!("expected batch, got {:?}", other),
    }
}

#[test]
fn test_payload_corruption_detected() {
    let mut bytes = WalEntry::new(1, put("key", "value")).serialize().unwrap();
    if let Some(byte) = bytes.last_mut() {
        *byte ^= 0xFF;
    }
    let err = WalEntry::deserialize(&bytes).unwrap_err();
    assert!(matches!(err, GridError::WalCorruption(_)));
}

#[test]
fn test_lsn_is_covered_by_crc() {
    let mut bytes = WalEntry::new(1, put("key", "value")).serialize().unwrap();
    bytes[0] ^= 0x01;
    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(GridError::WalCorruption(_))
    ));
}

#[test]
fn test_truncated_frame_rejected() {
    let bytes = WalEntry::new(1, put("key", "value")).serialize().unwrap();
    assert!(WalEntry::deserialize(&bytes[..bytes.len() - 1]).is_err());
    assert!(WalEntry::deserialize(&bytes[..HEADER_SIZE - 1]).is_err());
}

#[test]
fn test_payload_len() {
    assert_eq!(put("ab", "cde").payload_len(), 5);
    let op = Operation::Batch {
        ops: vec![put("ab", "cde"), Operation::Delete { key: b"xyz".to_vec() }],
    };
    assert_eq!(op.payload_len(), 8);
}

// =============================================================================
// Writer / Reader Tests
// =============================================================================

#[test]
fn test_write_and_read_back() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.append(put("a", "1")).unwrap(), 1);
    assert_eq!(writer.append(batch(3)).unwrap(), 2);
    assert_eq!(writer.append(Operation::Delete { key: b"a".to_vec() }).unwrap(), 3);
    drop(writer);

    let entries: Vec<WalEntry> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries.iter().map(|e| e.lsn).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(entries[0].operation, put("a", "1"));
}

#[test]
fn test_lsn_continues_after_reopen() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 10 }).unwrap();
        for i in 0..5 {
            writer.append(put(&format!("k{}", i), "v")).unwrap();
        }
        writer.sync().unwrap();
    }

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 6);
    assert_eq!(writer.append(put("k5", "v")).unwrap(), 6);
}

#[test]
fn test_truncate_keeps_lsn_increasing() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(put("a", "1")).unwrap();
    writer.append(put("b", "2")).unwrap();
    writer.truncate().unwrap();
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), 0);

    assert_eq!(writer.append(put("c", "3")).unwrap(), 3);
    drop(writer);

    let entries: Vec<WalEntry> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].lsn, 3);
}

#[test]
fn test_reader_position_tracks_whole_entries() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(put("a", "1")).unwrap();
    drop(writer);
    let size = fs::metadata(&wal_path).unwrap().len();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert_eq!(reader.position(), size);
    assert!(reader.next_entry().unwrap().is_none());
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_clean_log() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..10 {
        writer.append(put(&format!("k{}", i), "v")).unwrap();
    }
    drop(writer);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 10);
    assert!(!result.was_truncated);
}

#[test]
fn test_torn_batch_dropped_whole() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(put("before", "1")).unwrap();
    drop(writer);
    let valid_len = fs::metadata(&wal_path).unwrap().len();

    // Half of a batch frame, as if the process died mid-append
    let frame = WalEntry::new(2, batch(20)).serialize().unwrap();
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&frame[..frame.len() / 2]).unwrap();
    drop(file);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, put("before", "1"));
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), valid_len);
}

#[test]
fn test_corrupt_entry_stops_recovery() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(put("a", "1")).unwrap();
    writer.append(put("b", "2")).unwrap();
    writer.append(put("c", "3")).unwrap();
    drop(writer);

    // Flip the last payload byte of the final entry
    let mut bytes = fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let verified = WalRecovery::verify(&wal_path).unwrap();
    assert_eq!(verified.entries_recovered, 2);
    assert_eq!(verified.entries_corrupted, 1);
    assert!(verified.was_truncated);
    // verify leaves the file alone
    assert_eq!(fs::read(&wal_path).unwrap().len(), bytes.len());

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(result.last_lsn, 2);

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.append(put("d", "4")).unwrap(), 3);
}

#[test]
fn test_writer_open_discards_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(put("a", "1")).unwrap();
    drop(writer);

    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0xAB; 5]).unwrap();
    drop(file);

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(put("b", "2")).unwrap();
    drop(writer);

    let entries: Vec<WalEntry> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].operation, put("b", "2"));
}
