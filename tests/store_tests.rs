//! Tests for BlobStore
//!
//! These tests verify:
//! - Structured results (success flag, code, messages)
//! - Persistence across close/reopen
//! - Exclusive file locking
//! - Event notifications
//! - Error codes for corrupt, truncated, and non-blob records
//! - Concurrent callers through the store mutex

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use blobheap::{
    BlobError, BlobStore, Config, ErrorCode, FitPolicy, MemoryStream, StoreEvent, SyncStrategy,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, PathBuf, BlobStore) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("blobs.dat");
    let store = BlobStore::open(config_for(&path)).unwrap();
    (temp_dir, path, store)
}

fn config_for(path: &Path) -> Config {
    Config::builder()
        .path(path)
        .sync_strategy(SyncStrategy::EveryWrite)
        .build()
}

/// Store without the exclusive lock, so tests can tamper with the file
fn setup_unlocked_store() -> (TempDir, PathBuf, BlobStore) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("blobs.dat");
    let config = Config::builder().path(&path).exclusive_lock(false).build();
    let store = BlobStore::open(config).unwrap();
    (temp_dir, path, store)
}

fn overwrite(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_seeded_file() {
    let (_temp, path, store) = setup_temp_store();

    assert!(path.exists());
    assert_eq!(fs::read(&path).unwrap(), vec![0, 5, 0, 0, 0]);
    assert_eq!(store.list_keys().value, Some(vec![]));
}

#[test]
fn test_open_missing_file_without_create_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .path(temp_dir.path().join("absent.dat"))
        .create_if_missing(false)
        .build();

    assert!(matches!(BlobStore::open(config), Err(BlobError::Io(_))));
}

#[test]
fn test_second_open_of_same_file_fails() {
    let (_temp, path, _store) = setup_temp_store();

    let second = BlobStore::open(config_for(&path));

    assert!(matches!(second, Err(BlobError::Io(_))));
}

#[test]
fn test_close_releases_lock() {
    let (_temp, path, store) = setup_temp_store();
    store.close().unwrap();

    let reopened = BlobStore::open(config_for(&path));

    assert!(reopened.is_ok());
}

// =============================================================================
// CRUD Tests
// =============================================================================

#[test]
fn test_create_and_read() {
    let (_temp, path, store) = setup_temp_store();

    let created = store.create(&[1, 2, 3]);
    assert!(created.is_success());
    assert_eq!(created.code, ErrorCode::Ok);
    assert!(created.messages.is_empty());
    assert_eq!(created.value, Some(1));

    assert_eq!(store.read(1).value, Some(vec![1, 2, 3]));
    assert_eq!(
        fs::read(&path).unwrap(),
        vec![1, 12, 0, 0, 0, 1, 0, 0, 0, 1, 2, 3]
    );
}

#[test]
fn test_read_missing_key_is_structured_failure() {
    let (_temp, _path, store) = setup_temp_store();

    let result = store.read(42);

    assert!(!result.success);
    assert_eq!(result.code, ErrorCode::KeyNotFound);
    assert_eq!(result.code(), 1);
    assert_eq!(result.messages, vec!["Key not found: 42".to_string()]);
    assert_eq!(result.value, None);
}

#[test]
fn test_reserve_then_create_with_key() {
    let (_temp, _path, store) = setup_temp_store();

    let key = store.reserve_next_key().value.unwrap();
    assert!(store.create_with_key(key, b"reserved").is_success());

    assert_eq!(store.read(key).value, Some(b"reserved".to_vec()));
    assert_eq!(store.create(b"after").value, Some(key + 1));
}

#[test]
fn test_create_with_existing_key_fails() {
    let (_temp, _path, store) = setup_temp_store();
    let key = store.create(b"original").value.unwrap();

    let result = store.create_with_key(key, b"clash");

    assert!(!result.success);
    assert_eq!(result.code, ErrorCode::DuplicateKey);
    assert_eq!(store.read(key).value, Some(b"original".to_vec()));
}

#[test]
fn test_update_and_delete() {
    let (_temp, _path, store) = setup_temp_store();
    let key = store.create(b"short").value.unwrap();

    assert!(store.update(key, b"a considerably longer payload").is_success());
    assert_eq!(
        store.read(key).value,
        Some(b"a considerably longer payload".to_vec())
    );

    assert!(store.delete(key).is_success());
    assert_eq!(store.exists(key).value, Some(false));
    assert_eq!(store.delete(key).code, ErrorCode::KeyNotFound);
    assert!(store.verify().is_success());
}

#[test]
fn test_exists_and_list_keys() {
    let (_temp, _path, store) = setup_temp_store();
    for payload in [b"a", b"b", b"c"] {
        store.create(payload);
    }
    store.delete(2);

    assert_eq!(store.exists(1).value, Some(true));
    assert_eq!(store.exists(2).value, Some(false));
    assert_eq!(store.list_keys().value, Some(vec![1, 3]));
}

#[test]
fn test_flush_and_stats() {
    let (_temp, _path, store) = setup_temp_store();
    store.create(&[0u8; 100]);

    assert!(store.flush().is_success());

    let stats = store.stats().value.unwrap();
    assert_eq!(stats.blob_count, 1);
    assert_eq!(stats.file_len, 109);
    assert_eq!(stats.free_bytes, 0);
    assert_eq!(stats.next_key, 2);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_preserves_blobs_and_key_order() {
    let (_temp, path, store) = setup_temp_store();
    let a = store.create(b"alpha").value.unwrap();
    let b = store.create(b"beta").value.unwrap();
    store.update(a, b"alpha alpha alpha");
    store.close().unwrap();

    let store = BlobStore::open(config_for(&path)).unwrap();

    assert_eq!(store.read(a).value, Some(b"alpha alpha alpha".to_vec()));
    assert_eq!(store.read(b).value, Some(b"beta".to_vec()));
    assert_eq!(store.create(b"gamma").value, Some(b + 1));
    assert!(store.verify().is_success());
}

#[test]
fn test_memory_store_round_trip() {
    let store = BlobStore::with_stream(MemoryStream::default(), FitPolicy::FirstFit).unwrap();
    let key = store.create(b"in memory").value.unwrap();

    let bytes = store.into_stream().unwrap().into_inner();
    let store = BlobStore::with_stream(MemoryStream::new(bytes), FitPolicy::FirstFit).unwrap();

    assert_eq!(store.read(key).value, Some(b"in memory".to_vec()));
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_record_flipped_to_free_is_not_a_blob() {
    let (_temp, path, store) = setup_unlocked_store();
    let key = store.create(&[1, 2, 3]).value.unwrap();
    overwrite(&path, 0, &[0]);

    assert_eq!(store.update(key, &[9, 9]).code, ErrorCode::NotABlobRecord);
    assert_eq!(store.delete(key).code, ErrorCode::NotABlobRecord);
    assert_eq!(store.read(key).code, ErrorCode::CorruptRecord);

    // The escape hatch rewrites the record regardless
    assert!(store.update_unchecked(key, &[7, 8, 9]).is_success());
    assert_eq!(store.read(key).value, Some(vec![7, 8, 9]));
}

#[test]
fn test_truncated_file_reports_truncated_read() {
    let (_temp, path, store) = setup_unlocked_store();
    let key = store.create(b"0123456789").value.unwrap();

    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(15).unwrap();

    let result = store.read(key);
    assert_eq!(result.code, ErrorCode::TruncatedRead);
    assert!(result.messages[0].contains("expected 10 bytes, got 6"));
}

#[test]
fn test_open_corrupt_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("corrupt.dat");
    fs::write(&path, [9u8, 5, 0, 0, 0]).unwrap();

    let result = BlobStore::open(config_for(&path));

    assert!(matches!(result, Err(BlobError::CorruptRecord { .. })));
}

// =============================================================================
// Event Tests
// =============================================================================

#[test]
fn test_events_follow_mutations() {
    let (_temp, _path, store) = setup_temp_store();
    let events = store.subscribe();

    let key = store.create(b"one").value.unwrap();
    store.update(key, b"two");
    store.read(key);
    store.delete(key);

    assert_eq!(
        events.try_iter().collect::<Vec<_>>(),
        vec![
            StoreEvent::Created { key },
            StoreEvent::Updated { key },
            StoreEvent::Deleted { key },
        ]
    );
}

#[test]
fn test_failed_mutations_publish_nothing() {
    let (_temp, _path, store) = setup_temp_store();
    let events = store.subscribe();

    store.update(5, b"x");
    store.delete(5);

    assert!(events.try_recv().is_err());
}

#[test]
fn test_observer_is_called() {
    let (_temp, _path, store) = setup_temp_store();
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    store.add_observer(move |event: &StoreEvent| {
        if let StoreEvent::Created { .. } = event {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    store.create(b"a");
    store.create(b"b");
    store.delete(1);

    assert_eq!(created.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_creates_get_unique_keys() {
    let (_temp, _path, store) = setup_temp_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..4u8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..25u8)
                    .map(|i| store.create(&[t, i]).value.unwrap())
                    .collect::<Vec<u32>>()
            })
        })
        .collect();

    let mut keys: Vec<u32> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    keys.sort_unstable();
    keys.dedup();

    assert_eq!(keys.len(), 100);
    assert_eq!(store.list_keys().value.unwrap().len(), 100);
    assert!(store.verify().is_success());
}
