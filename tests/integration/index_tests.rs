use dupefiles::config::Config;
use dupefiles::index::{FileIndex, HashState, IndexError};
use dupefiles::scanner::path_utils::identity_for;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use tempfile::tempdir;

fn config() -> Config {
    Config {
        min_file_size: 0,
        ..Config::default()
    }
}

#[test]
fn test_add_directory_non_recursive() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"aaaa").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested").join("b.txt"), b"bbbb").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    let summary = index.add_path(dir.path(), false, None).unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(index.len(), 1);

    let summary = index.add_path(dir.path(), true, None).unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(index.len(), 2);
}

#[test]
fn test_min_size_filter() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("small.bin"), vec![0u8; 10]).unwrap();
    fs::write(dir.path().join("large.bin"), vec![0u8; 2048]).unwrap();

    let mut index = FileIndex::open_in_memory(Config::default()).unwrap();
    let summary = index.add_path(dir.path(), false, None).unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.filtered, 1);
    assert!(index.record(&identity_for(&dir.path().join("large.bin"))).is_some());
}

#[test]
fn test_empty_files_tracked_when_min_size_zero() {
    let dir = tempdir().unwrap();
    File::create(dir.path().join("empty")).unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    assert_eq!(index.add_path(dir.path(), false, None).unwrap().added, 1);
}

#[test]
fn test_glob_filter_applies_to_file_name() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("photo.jpg"), b"jpeg").unwrap();
    fs::write(dir.path().join("notes.txt"), b"text").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    let summary = index.add_path(dir.path(), false, Some("*.jpg")).unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.filtered, 1);

    let record = index.all_records()[0];
    assert_eq!(record.extension, "jpg");
    assert!(record.path.ends_with("photo.jpg"));
}

#[test]
fn test_changed_file_is_updated_on_add() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("f.bin");
    fs::write(&path, b"abcd").unwrap();
    filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_500_000_000, 0)).unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();

    File::create(&path).unwrap().write_all(b"abcdefgh").unwrap();
    filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_500_000_100, 0)).unwrap();
    let summary = index.add_path(dir.path(), false, None).unwrap();
    assert_eq!(summary.updated, 1);

    let record = index.record(&identity_for(&path)).unwrap();
    assert_eq!(record.size, 8);
    assert_eq!(record.modified_at, 1_500_000_100);
    assert_eq!(record.content_hash, HashState::Absent);
}

#[test]
fn test_records_reload_from_store() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("a.txt"), b"aaaa").unwrap();
    fs::write(data.join("b.txt"), b"bbbb").unwrap();

    let config = Config {
        db_path: dir.path().join("state").join("index.db"),
        ..config()
    };
    {
        let mut index = FileIndex::open(config.clone()).unwrap();
        index.add_path(&data, false, None).unwrap();
        assert_eq!(index.store_path(), Some(config.db_path.as_path()));
    }

    let index = FileIndex::open(config).unwrap();
    assert_eq!(index.len(), 2);
    let record = index.record(&identity_for(&data.join("a.txt"))).unwrap();
    assert_eq!(record.size, 4);
    assert_eq!(record.extension, "txt");
}

#[test]
fn test_identities_stay_unique_after_move() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"aaaa").unwrap();
    fs::write(dir.path().join("b.txt"), b"bbbb").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();

    let a = identity_for(&dir.path().join("a.txt"));
    fs::rename(dir.path().join("a.txt"), dir.path().join("c.TXT")).unwrap();
    let moved = index.move_record(&a, &dir.path().join("c.TXT")).unwrap();
    assert_eq!(moved.extension, "txt");
    assert!(index.record(&a).is_none());

    // Re-adding finds the moved file under its existing identity
    let summary = index.add_path(dir.path(), false, None).unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(summary.unchanged, 2);

    let identities: HashSet<&str> =
        index.all_records().iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(identities.len(), index.len());
}

#[test]
fn test_move_onto_tracked_identity_rejected() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"aaaa").unwrap();
    fs::write(dir.path().join("b.txt"), b"bbbb").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    index.add_path(dir.path(), false, None).unwrap();

    let a = identity_for(&dir.path().join("a.txt"));
    let err = index.move_record(&a, &dir.path().join("b.txt")).unwrap_err();
    assert!(matches!(err, IndexError::IdentityConflict(_)));
    assert_eq!(index.len(), 2);
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_not_tracked() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("real.txt"), b"real").unwrap();
    std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    let summary = index.add_path(dir.path(), false, None).unwrap();
    assert_eq!(summary.added, 1);
}

#[test]
fn test_invalid_arguments_leave_index_unchanged() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"aaaa").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    assert!(matches!(
        index.add_path(&dir.path().join("missing"), false, None),
        Err(IndexError::InvalidPath(_))
    ));
    assert!(matches!(
        index.add_path(dir.path(), false, Some("[")),
        Err(IndexError::InvalidFilter { .. })
    ));
    assert!(matches!(
        index.remove(std::path::Path::new("")),
        Err(IndexError::InvalidPath(_))
    ));
    assert!(index.is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn test_composed_and_decomposed_names_stay_distinct() {
    use dupefiles::duplicates::{DuplicateScanner, ScanConfig};

    let dir = tempdir().unwrap();
    let composed = dir.path().join("caf\u{e9}.txt");
    let decomposed = dir.path().join("cafe\u{0301}.txt");
    fs::write(&composed, b"same bytes").unwrap();
    fs::write(&decomposed, b"same bytes").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    let summary = index.add_path(dir.path(), false, None).unwrap();
    assert_eq!(summary.added, 2);
    assert_eq!(index.len(), 2);
    for record in index.all_records() {
        assert!(std::path::Path::new(&record.path).exists(), "{}", record.path);
    }

    // Both spellings exist on disk, so nothing is purged
    assert_eq!(index.purge().unwrap().removed, 0);
    assert_eq!(index.len(), 2);

    let (groups, _) = DuplicateScanner::new(ScanConfig::from_config(index.config()))
        .scan_for_duplicates(&mut index)
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members.len(), 2);
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_unicode_name_is_skipped() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("plain.txt"), b"plain").unwrap();
    fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.bin")), b"bytes").unwrap();

    let mut index = FileIndex::open_in_memory(config()).unwrap();
    let summary = index.add_path(dir.path(), false, None).unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(index.len(), 1);
    assert!(index.all_records().iter().all(|r| !r.path.contains('\u{fffd}')));
}
