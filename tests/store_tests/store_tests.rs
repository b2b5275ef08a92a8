//! Tests for SecureStore
//!
//! These tests verify:
//! - Lifecycle (init / deinit / operations on a closed store)
//! - get / set / add round trips, including length limits
//! - Positional multi-value semantics via append
//! - delete of one occurrence or all occurrences
//! - set replacing the whole store
//! - wipe, including writes made before the store is reopened
//! - Failed writes leave no swap file behind

use std::fs;

use securekv::config::{Config, SyncStrategy};
use securekv::store::{Occurrence, SecureStore};
use securekv::StoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path().join("settings"))
        .device_id(0x18b4_3000_0000_0001u64)
        .port_offset("3")
        .sync_strategy(SyncStrategy::Never)
        .build()
}

fn setup_temp_store() -> (TempDir, SecureStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = SecureStore::open(test_config(&temp_dir)).unwrap();
    (temp_dir, store)
}

fn keys_and_values(store: &mut SecureStore) -> Vec<(u16, Vec<u8>)> {
    store
        .records()
        .unwrap()
        .into_iter()
        .map(|r| (r.key, r.value.to_vec()))
        .collect()
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_init_creates_directory_and_empty_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);

    let mut store = SecureStore::new(config).unwrap();
    assert!(!store.is_open());

    let report = store.init().unwrap();

    assert!(store.is_open());
    assert!(store.paths().data.exists());
    assert_eq!(fs::metadata(&store.paths().data).unwrap().len(), 0);
    assert_eq!(report.records, 0);
    assert!(!report.truncated);
}

#[cfg(unix)]
#[test]
fn test_store_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let (_temp, store) = setup_temp_store();
    let mode = fs::metadata(&store.paths().data).unwrap().permissions().mode();

    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_init_fails_when_directory_cannot_be_created() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    fs::write(&blocker, b"not a directory").unwrap();

    let config = Config::builder()
        .data_dir(blocker.join("settings"))
        .sync_strategy(SyncStrategy::Never)
        .build();

    let result = SecureStore::open(config);
    assert!(matches!(result, Err(StoreError::CreateDir { .. })));
}

#[test]
fn test_operations_require_open_store() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = SecureStore::new(test_config(&temp_dir)).unwrap();

    assert!(matches!(store.get(1, 0), Err(StoreError::NotOpen)));
    assert!(matches!(store.set(1, b"x"), Err(StoreError::NotOpen)));
    assert!(matches!(store.delete_all(1), Err(StoreError::NotOpen)));
    assert!(matches!(store.records(), Err(StoreError::NotOpen)));
    assert!(!store.paths().swap.exists());
}

#[test]
fn test_store_keeps_its_config() {
    let temp_dir = TempDir::new().unwrap();
    let store = SecureStore::new(test_config(&temp_dir)).unwrap();

    assert_eq!(store.config().port_offset, "3");
    assert_eq!(store.config().device_id.as_u64(), 0x18b4_3000_0000_0001);
    assert_eq!(store.config().paths().unwrap(), *store.paths());
}

#[test]
fn test_deinit_is_idempotent() {
    let (_temp, mut store) = setup_temp_store();

    store.deinit();
    store.deinit();

    assert!(!store.is_open());
    assert!(matches!(store.get(1, 0), Err(StoreError::NotOpen)));
}

#[test]
fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let mut store = SecureStore::open(test_config(&temp_dir)).unwrap();
        store.set(0x10, b"credential").unwrap();
        store.deinit();
    }

    let mut store = SecureStore::open(test_config(&temp_dir)).unwrap();
    assert_eq!(store.get(0x10, 0).unwrap(), Some(b"credential".to_vec()));
}

#[test]
fn test_reinit_after_deinit() {
    let (_temp, mut store) = setup_temp_store();
    store.set(2, b"value").unwrap();

    store.deinit();
    let report = store.init().unwrap();

    assert_eq!(report.records, 1);
    assert_eq!(store.get(2, 0).unwrap(), Some(b"value".to_vec()));
}

// =============================================================================
// Get / Set Tests
// =============================================================================

#[test]
fn test_set_get_scenario() {
    let (_temp, mut store) = setup_temp_store();

    store.set(0x1, &[0xAA, 0xBB]).unwrap();

    let mut buf = [0u8; 8];
    let len = store.get_into(0x1, 0, &mut buf).unwrap();
    assert_eq!(len, Some(2));
    assert_eq!(&buf[..2], &[0xAA, 0xBB]);

    store.delete(0x1, Occurrence::All).unwrap();

    assert_eq!(store.get(0x1, 0).unwrap(), None);
}

#[test]
fn test_get_missing_key() {
    let (_temp, mut store) = setup_temp_store();

    assert_eq!(store.get(42, 0).unwrap(), None);
    assert_eq!(store.value_len(42, 0).unwrap(), None);
}

#[test]
fn test_set_empty_value() {
    let (_temp, mut store) = setup_temp_store();

    store.set(5, b"").unwrap();

    assert_eq!(store.get(5, 0).unwrap(), Some(Vec::new()));
    assert_eq!(store.value_len(5, 0).unwrap(), Some(0));
}

#[test]
fn test_set_max_length_value() {
    let (_temp, mut store) = setup_temp_store();
    let value: Vec<u8> = (0..65535u32).map(|i| (i % 251) as u8).collect();

    store.set(9, &value).unwrap();

    assert_eq!(store.value_len(9, 0).unwrap(), Some(u16::MAX));
    assert_eq!(store.get(9, 0).unwrap(), Some(value));
}

#[test]
fn test_set_rejects_oversized_value_without_touching_store() {
    let (_temp, mut store) = setup_temp_store();
    store.set(1, b"keep").unwrap();

    let result = store.set(2, &vec![0u8; 65536]);

    assert!(matches!(result, Err(StoreError::ValueTooLarge(65536))));
    assert_eq!(store.get(1, 0).unwrap(), Some(b"keep".to_vec()));
}

#[test]
fn test_set_overwrites_existing_key() {
    let (_temp, mut store) = setup_temp_store();

    store.set(3, b"old").unwrap();
    store.set(3, b"new").unwrap();

    assert_eq!(store.get(3, 0).unwrap(), Some(b"new".to_vec()));
    assert_eq!(store.get(3, 1).unwrap(), None);
}

#[test]
fn test_set_replaces_entire_store() {
    let (_temp, mut store) = setup_temp_store();

    store.append(1, b"one").unwrap();
    store.append(2, b"two").unwrap();
    store.set(3, b"three").unwrap();

    assert_eq!(keys_and_values(&mut store), vec![(3, b"three".to_vec())]);
    assert_eq!(store.get(1, 0).unwrap(), None);
    assert_eq!(store.get(2, 0).unwrap(), None);
}

#[test]
fn test_add_matches_set() {
    let (_temp, mut store) = setup_temp_store();

    store.append(1, b"one").unwrap();
    store.add(7, b"seven").unwrap();
    store.add(7, b"SEVEN").unwrap();

    assert_eq!(keys_and_values(&mut store), vec![(7, b"SEVEN".to_vec())]);
}

#[test]
fn test_get_into_reports_true_length_on_short_buffer() {
    let (_temp, mut store) = setup_temp_store();
    store.set(4, b"0123456789").unwrap();

    let mut buf = [0xFFu8; 4];
    let len = store.get_into(4, 0, &mut buf).unwrap();

    assert_eq!(len, Some(10));
    assert_eq!(&buf, b"0123");
}

#[test]
fn test_get_into_larger_buffer_leaves_tail() {
    let (_temp, mut store) = setup_temp_store();
    store.set(4, b"abc").unwrap();

    let mut buf = [0xFFu8; 6];
    let len = store.get_into(4, 0, &mut buf).unwrap();

    assert_eq!(len, Some(3));
    assert_eq!(buf, [b'a', b'b', b'c', 0xFF, 0xFF, 0xFF]);
}

// =============================================================================
// Multi-Value Tests
// =============================================================================

#[test]
fn test_append_preserves_insertion_order() {
    let (_temp, mut store) = setup_temp_store();

    store.append(0x20, b"first").unwrap();
    store.append(0x21, b"other").unwrap();
    store.append(0x20, b"second").unwrap();
    store.append(0x20, b"third").unwrap();

    assert_eq!(store.get(0x20, 0).unwrap(), Some(b"first".to_vec()));
    assert_eq!(store.get(0x20, 1).unwrap(), Some(b"second".to_vec()));
    assert_eq!(store.get(0x20, 2).unwrap(), Some(b"third".to_vec()));
    assert_eq!(store.get(0x20, 3).unwrap(), None);
    assert_eq!(store.get(0x21, 0).unwrap(), Some(b"other".to_vec()));
}

#[test]
fn test_append_rejects_oversized_value() {
    let (_temp, mut store) = setup_temp_store();

    let result = store.append(1, &vec![0u8; 70_000]);

    assert!(matches!(result, Err(StoreError::ValueTooLarge(70_000))));
    assert!(keys_and_values(&mut store).is_empty());
}

// =============================================================================
// Delete Tests
// =============================================================================

fn setup_three_values() -> (TempDir, SecureStore) {
    let (temp, mut store) = setup_temp_store();
    store.append(1, b"a").unwrap();
    store.append(2, b"x").unwrap();
    store.append(1, b"b").unwrap();
    store.append(1, b"c").unwrap();
    (temp, store)
}

#[test]
fn test_delete_index_zero_removes_oldest_only() {
    let (_temp, mut store) = setup_three_values();

    store.delete(1, Occurrence::Nth(0)).unwrap();

    assert_eq!(store.get(1, 0).unwrap(), Some(b"b".to_vec()));
    assert_eq!(store.get(1, 1).unwrap(), Some(b"c".to_vec()));
    assert_eq!(store.get(1, 2).unwrap(), None);
    assert_eq!(store.get(2, 0).unwrap(), Some(b"x".to_vec()));
}

#[test]
fn test_delete_middle_index_keeps_later_occurrences() {
    let (_temp, mut store) = setup_three_values();

    store.delete(1, Occurrence::Nth(1)).unwrap();

    assert_eq!(
        keys_and_values(&mut store),
        vec![(1, b"a".to_vec()), (2, b"x".to_vec()), (1, b"c".to_vec())]
    );
}

#[test]
fn test_delete_all_occurrences() {
    let (_temp, mut store) = setup_three_values();

    store.delete_all(1).unwrap();

    assert_eq!(store.get(1, 0).unwrap(), None);
    assert_eq!(keys_and_values(&mut store), vec![(2, b"x".to_vec())]);
}

#[test]
fn test_delete_index_past_end_is_not_found() {
    let (_temp, mut store) = setup_three_values();

    let result = store.delete(1, Occurrence::Nth(3));

    assert!(matches!(result, Err(StoreError::NotFound)));
    assert_eq!(keys_and_values(&mut store).len(), 4);
}

#[test]
fn test_delete_missing_key_still_rewrites_file() {
    let (_temp, mut store) = setup_three_values();
    let before = fs::read(&store.paths().data).unwrap();

    let result = store.delete(99, Occurrence::All);

    assert!(matches!(result, Err(StoreError::NotFound)));
    assert_eq!(fs::read(&store.paths().data).unwrap(), before);
    assert!(!store.paths().swap.exists());
}

#[cfg(unix)]
#[test]
fn test_delete_missing_key_replaces_inode() {
    use std::os::unix::fs::MetadataExt;

    let (_temp, mut store) = setup_three_values();
    let before = fs::metadata(&store.paths().data).unwrap().ino();

    assert!(store.delete(99, Occurrence::Nth(0)).is_err());

    let after = fs::metadata(&store.paths().data).unwrap().ino();
    assert_ne!(before, after);
}

#[test]
fn test_occurrence_from_raw_index() {
    assert_eq!(Occurrence::try_from(-1i32).unwrap(), Occurrence::All);
    assert_eq!(Occurrence::try_from(0i32).unwrap(), Occurrence::Nth(0));
    assert_eq!(Occurrence::try_from(5i32).unwrap(), Occurrence::Nth(5));
    assert!(matches!(
        Occurrence::try_from(-2i32),
        Err(StoreError::InvalidIndex(-2))
    ));
    assert_eq!(Occurrence::from(2usize), Occurrence::Nth(2));
}

// =============================================================================
// Wipe Tests
// =============================================================================

#[test]
fn test_wipe_is_idempotent() {
    let (_temp, mut store) = setup_temp_store();
    store.set(1, b"secret").unwrap();

    store.wipe().unwrap();
    assert!(!store.paths().data.exists());

    store.wipe().unwrap();
    assert!(!store.paths().data.exists());

    store.deinit();
    let report = store.init().unwrap();

    assert_eq!(report.records, 0);
    assert_eq!(store.get(1, 0).unwrap(), None);
}

#[test]
fn test_wipe_without_init() {
    let temp_dir = TempDir::new().unwrap();
    let store = SecureStore::new(test_config(&temp_dir)).unwrap();

    store.wipe().unwrap();

    assert!(!store.paths().dir.exists());
}

#[test]
fn test_wipe_removes_stale_swap_file() {
    let (_temp, store) = setup_temp_store();
    fs::write(&store.paths().swap, b"leftover").unwrap();

    store.wipe().unwrap();

    assert!(!store.paths().swap.exists());
}

#[test]
fn test_write_after_wipe_without_reinit_restores_records() {
    let (_temp, mut store) = setup_temp_store();
    store.set(5, b"z").unwrap();
    store.append(6, b"y").unwrap();

    store.wipe().unwrap();
    assert!(!store.paths().data.exists());

    // The open handle still reads the removed file
    store.append(7, b"w").unwrap();

    assert_eq!(
        keys_and_values(&mut store),
        vec![(5, b"z".to_vec()), (6, b"y".to_vec()), (7, b"w".to_vec())]
    );
    assert!(store.paths().data.exists());
}

#[test]
fn test_write_after_wipe_and_reinit_starts_empty() {
    let (_temp, mut store) = setup_temp_store();
    store.set(5, b"z").unwrap();
    store.append(6, b"y").unwrap();

    store.wipe().unwrap();
    store.deinit();
    store.init().unwrap();
    store.append(7, b"w").unwrap();

    assert_eq!(keys_and_values(&mut store), vec![(7, b"w".to_vec())]);
}

// =============================================================================
// Failed Write Tests
// =============================================================================

/// Point the swap file at /dev/full so writes past the buffer fail
#[cfg(target_os = "linux")]
fn redirect_swap_to_full_device(store: &SecureStore) -> bool {
    if !std::path::Path::new("/dev/full").exists() {
        return false;
    }
    std::os::unix::fs::symlink("/dev/full", &store.paths().swap).unwrap();
    true
}

#[cfg(target_os = "linux")]
#[test]
fn test_failed_delete_removes_swap_file() {
    let (_temp, mut store) = setup_temp_store();
    store.append(1, b"small").unwrap();
    store.append(2, &[0x42; 10_000]).unwrap();
    let before = fs::read(&store.paths().data).unwrap();
    if !redirect_swap_to_full_device(&store) {
        return;
    }

    let err = store.delete(1, Occurrence::All).unwrap_err();

    assert!(err.is_fatal());
    assert!(fs::symlink_metadata(&store.paths().swap).is_err());
    assert_eq!(fs::read(&store.paths().data).unwrap(), before);
    assert_eq!(store.get(1, 0).unwrap(), Some(b"small".to_vec()));
}

#[cfg(target_os = "linux")]
#[test]
fn test_failed_append_removes_swap_file() {
    let (_temp, mut store) = setup_temp_store();
    store.append(1, b"small").unwrap();
    let before = fs::read(&store.paths().data).unwrap();
    if !redirect_swap_to_full_device(&store) {
        return;
    }

    let err = store.append(2, &[0x42; 10_000]).unwrap_err();

    assert!(err.is_fatal());
    assert!(fs::symlink_metadata(&store.paths().swap).is_err());
    assert_eq!(fs::read(&store.paths().data).unwrap(), before);
    assert!(store.is_open());
}

// =============================================================================
// Error Classification Tests
// =============================================================================

#[test]
fn test_only_not_found_is_recoverable() {
    assert!(!StoreError::NotFound.is_fatal());
    assert!(StoreError::NotOpen.is_fatal());
    assert!(StoreError::ValueTooLarge(70_000).is_fatal());
    assert!(StoreError::Io(std::io::Error::from(std::io::ErrorKind::WriteZero)).is_fatal());
}

#[test]
fn test_commit_with_fsync() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .sync_strategy(SyncStrategy::EveryCommit)
        .build();
    let mut store = SecureStore::open(config).unwrap();

    store.set(1, b"durable").unwrap();
    store.append(1, b"also durable").unwrap();

    assert_eq!(store.get(1, 1).unwrap(), Some(b"also durable".to_vec()));
    assert!(!store.paths().swap.exists());
}
