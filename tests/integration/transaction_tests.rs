use dupefiles::config::Config;
use dupefiles::duplicates::{DuplicateScanner, FinderError, ScanConfig};
use dupefiles::index::{FileIndex, HashState, IndexError};
use dupefiles::scanner::path_utils::identity_for;
use dupefiles::scanner::{compute_content_hash, HashPolicy};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// A file-backed index over `data/` holding two identical files.
fn fixture() -> (TempDir, PathBuf, FileIndex) {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("a.bin"), b"same").unwrap();
    fs::write(data.join("b.bin"), b"same").unwrap();
    let config = Config {
        min_file_size: 0,
        db_path: dir.path().join("index.db"),
        ..Config::default()
    };
    let mut index = FileIndex::open(config).unwrap();
    index.add_path(&data, false, None).unwrap();
    (dir, data, index)
}

/// Install a trigger that aborts every `event` on `table` from a second connection.
fn block(db: &Path, event: &str, table: &str) {
    let conn = Connection::open(db).unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER block_{event}_{table} BEFORE {event} ON {table}
         BEGIN SELECT RAISE(ABORT, 'blocked'); END;"
    ))
    .unwrap();
}

fn is_transaction_failure(err: &IndexError) -> bool {
    matches!(err, IndexError::TransactionFailure { .. })
}

#[test]
fn test_failed_add_leaves_index_unchanged() {
    let (dir, data, mut index) = fixture();
    block(&dir.path().join("index.db"), "INSERT", "files");
    fs::write(data.join("c.bin"), b"new!").unwrap();

    let err = index.add_path(&data, false, None).unwrap_err();
    assert!(is_transaction_failure(&err), "{err:?}");
    assert_eq!(index.len(), 2);
    assert!(index.record(&identity_for(&data.join("c.bin"))).is_none());

    let reopened = FileIndex::open(index.config().clone()).unwrap();
    assert_eq!(reopened.len(), 2);
}

#[test]
fn test_failed_purge_leaves_index_unchanged() {
    let (dir, data, mut index) = fixture();
    block(&dir.path().join("index.db"), "DELETE", "files");
    fs::remove_file(data.join("a.bin")).unwrap();

    let err = index.purge().unwrap_err();
    assert!(is_transaction_failure(&err), "{err:?}");
    assert_eq!(index.len(), 2);
    assert!(index.record(&identity_for(&data.join("a.bin"))).is_some());
}

#[test]
fn test_failed_hash_write_leaves_records_unhashed() {
    let (dir, data, mut index) = fixture();
    block(&dir.path().join("index.db"), "UPDATE", "files");
    let path = data.join("a.bin");
    let identity = identity_for(&path);
    let hash = compute_content_hash(&path, 4, &HashPolicy::default()).unwrap();

    let err = index.apply_hashes(&[(identity.clone(), hash)]).unwrap_err();
    assert!(is_transaction_failure(&err), "{err:?}");
    assert_eq!(index.record(&identity).unwrap().content_hash, HashState::Absent);
    assert!(index.all_hashed_records().unwrap().is_empty());
}

#[test]
fn test_failed_forget_hashes_keeps_membership() {
    let (dir, _data, mut index) = fixture();
    DuplicateScanner::new(ScanConfig::from_config(index.config()))
        .scan_for_duplicates(&mut index)
        .unwrap();
    block(&dir.path().join("index.db"), "UPDATE", "files");

    let err = index.forget_hashes().unwrap_err();
    assert!(is_transaction_failure(&err), "{err:?}");
    assert!(index.all_records().iter().all(|r| r.content_hash.as_hash().is_some()));
    assert_eq!(index.duplicate_identities().unwrap().len(), 2);
}

#[test]
fn test_failed_membership_write_fails_scan() {
    let (dir, _data, mut index) = fixture();
    block(&dir.path().join("index.db"), "INSERT", "duplicates");

    let result = DuplicateScanner::new(ScanConfig::from_config(index.config()))
        .scan_for_duplicates(&mut index);
    match result {
        Err(FinderError::Index(err)) => assert!(is_transaction_failure(&err), "{err:?}"),
        other => panic!("expected an index failure, got {other:?}"),
    }
    assert!(index.duplicate_identities().unwrap().is_empty());
}
