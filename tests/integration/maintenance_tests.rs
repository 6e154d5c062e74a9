use dupefiles::config::Config;
use dupefiles::duplicates::{DuplicateScanner, ScanConfig};
use dupefiles::index::{FileIndex, HashState};
use dupefiles::scanner::path_utils::identity_for;
use dupefiles::scanner::{compute_content_hash, HashPolicy};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use tempfile::tempdir;

fn config() -> Config {
    Config {
        min_file_size: 0,
        ..Config::default()
    }
}

fn scan(index: &mut FileIndex) {
    DuplicateScanner::new(ScanConfig::from_config(index.config()))
        .scan_for_duplicates(index)
        .unwrap();
}

#[test]
fn test_purge_drops_deleted_file_durably() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("1.txt"), b"abcd").unwrap();
    fs::write(data.join("2.txt"), b"abcd").unwrap();
    let config = Config {
        db_path: dir.path().join("index.db"),
        ..config()
    };

    {
        let mut index = FileIndex::open(config.clone()).unwrap();
        index.add_path(&data, false, None).unwrap();
        scan(&mut index);

        fs::remove_file(data.join("1.txt")).unwrap();
        assert_eq!(index.purge().unwrap().removed, 1);
        assert_eq!(index.purge().unwrap().removed, 0);
    }

    let index = FileIndex::open(config).unwrap();
    assert_eq!(index.len(), 1);
    assert!(index.record(&identity_for(&data.join("1.txt"))).is_none());
    // Membership cascades with the record
    let remaining = index.duplicate_identities().unwrap();
    assert!(!remaining.contains(&identity_for(&data.join("1.txt"))));
}

#[test]
fn test_update_rehashes_changed_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("1.txt");
    fs::write(&path, b"abcd").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();
    let identity = identity_for(&path);

    fs::write(&path, b"abcdefgh").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_500, 0)).unwrap();

    let summary = index.update().unwrap();
    assert_eq!(summary.changed, 1);
    assert!(!summary.has_failures());

    let record = index.record(&identity).unwrap();
    assert_eq!(record.size, 8);
    assert_eq!(record.modified_at, 1_600_000_500);
    let expected = compute_content_hash(&path, 8, &HashPolicy::default()).unwrap();
    assert_eq!(record.content_hash, HashState::Present(expected));

    // Nothing changed since
    assert_eq!(index.update().unwrap().affected(), 0);
}

#[test]
fn test_update_counts_mtime_only_change() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("f.bin");
    fs::write(&path, b"same").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();

    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_001, 0)).unwrap();
    assert_eq!(index.update().unwrap().changed, 1);
    let record = index.record(&identity_for(&path)).unwrap();
    assert_eq!(record.modified_at, 1_600_000_001);
    assert!(record.content_hash.as_hash().is_some());
}

#[test]
fn test_update_deletes_missing_records() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("keep.txt"), b"keep").unwrap();
    fs::write(dir.path().join("gone.txt"), b"gone").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();
    fs::remove_file(dir.path().join("gone.txt")).unwrap();

    let summary = index.update().unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.changed, 0);
    assert_eq!(index.len(), 1);
    assert!(index.record(&identity_for(&dir.path().join("keep.txt"))).is_some());
}

#[test]
fn test_add_invalidates_hash_of_changed_file() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.bin");
    let b = dir.path().join("b.bin");
    fs::write(&a, b"abcd").unwrap();
    fs::write(&b, b"abcd").unwrap();
    set_file_mtime(&a, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();
    scan(&mut index);
    assert!(index.record(&identity_for(&a)).unwrap().content_hash.as_hash().is_some());

    set_file_mtime(&a, FileTime::from_unix_time(1_600_000_900, 0)).unwrap();
    index.add_path(dir.path(), false, None).unwrap();

    assert_eq!(index.record(&identity_for(&a)).unwrap().content_hash, HashState::Absent);
    assert!(index.record(&identity_for(&b)).unwrap().content_hash.as_hash().is_some());
}

#[test]
fn test_remove_spares_sibling_prefix() {
    let dir = tempdir().unwrap();
    for name in ["b/one.txt", "b/deep/two.txt", "bc/three.txt"] {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, name.as_bytes()).unwrap();
    }

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), true, None).unwrap();
    assert_eq!(index.len(), 3);

    assert_eq!(index.remove(&dir.path().join("b")).unwrap(), 2);
    let remaining: Vec<&str> = index.all_records().iter().map(|r| r.path.as_str()).collect();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].ends_with("three.txt"));
}

#[test]
fn test_remove_single_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"aaaa").unwrap();
    fs::write(dir.path().join("a.txt.bak"), b"aaaa").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();

    assert_eq!(index.remove(&dir.path().join("a.txt")).unwrap(), 1);
    assert!(index.record(&identity_for(&dir.path().join("a.txt.bak"))).is_some());
}

#[test]
fn test_clear_empties_index_and_membership() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"same").unwrap();
    fs::write(dir.path().join("b"), b"same").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();
    scan(&mut index);
    assert_eq!(index.duplicate_identities().unwrap().len(), 2);

    assert_eq!(index.clear().unwrap(), 2);
    assert!(index.is_empty());
    assert!(index.duplicate_identities().unwrap().is_empty());
    assert!(index.all_hashed_records().unwrap().is_empty());
}

#[test]
fn test_forget_duplicates_removes_members_only() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"same").unwrap();
    fs::write(dir.path().join("b"), b"same").unwrap();
    fs::write(dir.path().join("c"), b"uniq").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();
    scan(&mut index);

    assert_eq!(index.forget_duplicates().unwrap(), 2);
    assert_eq!(index.len(), 1);
    assert!(index.record(&identity_for(&dir.path().join("c"))).is_some());
    assert!(dir.path().join("a").exists());
    assert!(index.all_duplicates().unwrap().is_empty());
}

#[test]
fn test_forget_hashes_forces_recompute() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"same").unwrap();
    fs::write(dir.path().join("b"), b"same").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();
    scan(&mut index);

    assert_eq!(index.forget_hashes().unwrap(), 2);
    assert!(index.all_hashed_records().unwrap().is_empty());
    assert!(index
        .all_records()
        .iter()
        .all(|r| r.content_hash == HashState::Absent));

    // Membership confirmed by the cleared hashes goes with them
    assert!(index.duplicate_identities().unwrap().is_empty());
    assert!(index.all_duplicates().unwrap().is_empty());

    let (groups, summary) = DuplicateScanner::new(ScanConfig::from_config(index.config()))
        .scan_for_duplicates(&mut index)
        .unwrap();
    assert_eq!(summary.hashes_computed, 2);
    assert_eq!(groups.len(), 1);
    assert_eq!(index.duplicate_identities().unwrap().len(), 2);
}

#[test]
fn test_purge_and_update_agree_on_replaced_path() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("keep"), b"keep").unwrap();
    fs::write(dir.path().join("swap"), b"swap").unwrap();

    let mut first = FileIndex::open_in_memory(config()).unwrap();
    first.add_path(dir.path(), false, None).unwrap();
    let mut second = FileIndex::open_in_memory(config()).unwrap();
    second.add_path(dir.path(), false, None).unwrap();

    // A directory now sits where the tracked file was
    fs::remove_file(dir.path().join("swap")).unwrap();
    fs::create_dir(dir.path().join("swap")).unwrap();

    let purged = first.purge().unwrap();
    assert_eq!(purged.removed, 1);
    assert_eq!(purged.skipped, 0);

    let updated = second.update().unwrap();
    assert_eq!(updated.deleted, 1);
    assert_eq!(updated.skipped, 0);

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert!(first.record(&identity_for(&dir.path().join("keep"))).is_some());
}

#[test]
fn test_stale_membership_pruned_after_content_change() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    fs::write(&a, b"same").unwrap();
    fs::write(dir.path().join("b"), b"same").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();
    scan(&mut index);
    assert_eq!(index.duplicate_identities().unwrap().len(), 2);

    fs::write(&a, b"diff").unwrap();
    set_file_mtime(&a, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    index.update().unwrap();
    scan(&mut index);

    assert!(index.duplicate_identities().unwrap().is_empty());
}

#[cfg(unix)]
#[test]
fn test_unstatable_path_is_skipped_not_dropped() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("inner.txt"), b"inner").unwrap();
    fs::write(dir.path().join("other.txt"), b"other").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), true, None).unwrap();
    assert_eq!(index.len(), 2);
    let inner = identity_for(&sub.join("inner.txt"));

    // A file where the parent directory was makes the stat fail with ENOTDIR
    fs::remove_dir_all(&sub).unwrap();
    fs::write(&sub, b"blocker").unwrap();

    let purged = index.purge().unwrap();
    assert_eq!(purged.removed, 0);
    assert_eq!(purged.skipped, 1);

    let updated = index.update().unwrap();
    assert_eq!(updated.deleted, 0);
    assert_eq!(updated.skipped, 1);
    assert!(updated.has_failures());

    assert_eq!(index.len(), 2);
    assert!(index.record(&inner).is_some());
}
