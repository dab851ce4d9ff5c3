//! Write session behavior: discard on failure, overwrite rules, limits.

use std::path::Path;

use sygnals_hdf5::{
    ArrayData, CancelToken, ChunkingPolicy, Container, Error, ErrorKind, HostArray, WriteOptions,
    WriteSession, MAX_ATTRIBUTE_BYTES,
};

/// Names of everything in `dir`, sorted.
fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn ramp(n: u32) -> HostArray {
    HostArray::from((0..n).collect::<Vec<u32>>())
}

// ---------------------------------------------------------------------------
// Destination handling
// ---------------------------------------------------------------------------

#[test]
fn existing_file_is_kept_without_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keep.h5");
    std::fs::write(&path, b"precious").unwrap();

    let err = WriteSession::create(&path, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(matches!(&err, Error::Io(e) if e.kind() == std::io::ErrorKind::AlreadyExists));
    assert_eq!(std::fs::read(&path).unwrap(), b"precious");
    assert_eq!(entries(dir.path()), vec!["keep.h5".to_string()]);
}

#[test]
fn overwrite_replaces_on_flush_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replace.h5");
    std::fs::write(&path, b"old contents").unwrap();

    let mut session = WriteSession::create(&path, true).unwrap();
    session.write_dataset("/", "ramp", &ramp(10), None).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"old contents");
    session.flush().unwrap();

    let container = Container::open(&path).unwrap();
    assert_eq!(container.decode("/ramp", None).unwrap(), ramp(10));
    assert_eq!(entries(dir.path()), vec!["replace.h5".to_string()]);
}

#[test]
fn dropped_session_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.h5");
    {
        let mut session = WriteSession::create(&path, false).unwrap();
        session.write_group("/a/b").unwrap();
        session.write_dataset("/a/b", "ramp", &ramp(1000), None).unwrap();
        assert_eq!(entries(dir.path()).len(), 1, "temporary file exists while writing");
    }
    assert!(entries(dir.path()).is_empty());
    assert!(!path.exists());
}

#[test]
fn dropped_overwrite_session_keeps_the_old_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.h5");
    let mut first = WriteSession::create(&path, false).unwrap();
    first.write_dataset("/", "ramp", &ramp(5), None).unwrap();
    first.flush().unwrap();

    let mut second = WriteSession::create(&path, true).unwrap();
    second.write_dataset("/", "ramp", &ramp(50), None).unwrap();
    drop(second);

    let container = Container::open(&path).unwrap();
    assert_eq!(container.decode("/ramp", None).unwrap(), ramp(5));
}

#[test]
fn empty_session_writes_an_empty_root() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.h5");
    WriteSession::create(&path, false).unwrap().flush().unwrap();
    let container = Container::open(&path).unwrap();
    assert!(container.list_children("/").unwrap().is_empty());
    assert!(container.walk().is_empty());
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

#[test]
fn oversized_attribute_is_rejected_and_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attrs.h5");
    let mut session = WriteSession::create(&path, false).unwrap();
    session.write_dataset("/", "ramp", &ramp(10), None).unwrap();
    session
        .write_attribute("/ramp", "note", &HostArray::from("small"))
        .unwrap();

    let big = HostArray::from(vec![0u8; MAX_ATTRIBUTE_BYTES + 1]);
    let err = session.write_attribute("/ramp", "blob", &big).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValueTooLarge);
    assert!(matches!(
        err,
        Error::ValueTooLarge { size, limit } if size == MAX_ATTRIBUTE_BYTES + 1 && limit == MAX_ATTRIBUTE_BYTES
    ));

    // string bytes count towards the bound too
    let long = HostArray::from("x".repeat(MAX_ATTRIBUTE_BYTES).as_str());
    let err = session.write_attribute("/ramp", "note", &long).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValueTooLarge);
    session.flush().unwrap();

    let container = Container::open(&path).unwrap();
    let attrs = container.read_attributes("/ramp").unwrap();
    assert_eq!(attrs.keys().collect::<Vec<_>>(), vec!["note"]);
    assert_eq!(attrs["note"], HostArray::from("small"));
}

#[test]
fn long_name_counts_towards_the_header_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long_name.h5");
    let mut session = WriteSession::create(&path, false).unwrap();
    session.write_group("/g").unwrap();

    let name = "n".repeat(4000);
    let value = HostArray::from(vec![7u8; MAX_ATTRIBUTE_BYTES]);
    let err = session.write_attribute("/g", &name, &value).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValueTooLarge);
    assert!(matches!(
        err,
        Error::ValueTooLarge { size, limit } if size > limit && limit == u16::MAX as usize
    ));

    session.write_attribute("/g", "short", &value).unwrap();
    session.flush().unwrap();

    let attrs = Container::open(&path).unwrap().read_attributes("/g").unwrap();
    assert_eq!(attrs.keys().collect::<Vec<_>>(), vec!["short"]);
    assert_eq!(attrs["short"], value);
}

#[test]
fn custom_attribute_bound_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bound.h5");
    let options = WriteOptions::default().max_attribute_bytes(16);
    let mut session = WriteSession::create_with(&path, options).unwrap();
    session
        .write_attribute("/", "fits", &HostArray::from(vec![1u64, 2]))
        .unwrap();
    let err = session
        .write_attribute("/", "spills", &HostArray::from(vec![1u64, 2, 3]))
        .unwrap_err();
    assert!(matches!(err, Error::ValueTooLarge { size: 24, limit: 16 }));
}

#[test]
fn attribute_of_the_same_name_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replace_attr.h5");
    let mut session = WriteSession::create(&path, false).unwrap();
    session.write_group("/g").unwrap();
    session.write_attribute("/g", "gain", &HostArray::from(vec![1.0f32])).unwrap();
    session.write_attribute("/g", "gain", &HostArray::from("unity")).unwrap();
    session.flush().unwrap();

    let attrs = Container::open(&path).unwrap().read_attributes("/g").unwrap();
    assert_eq!(attrs.len(), 1);
    assert_eq!(attrs["gain"], HostArray::from("unity"));
}

#[test]
fn attribute_on_missing_node_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = WriteSession::create(dir.path().join("x.h5"), false).unwrap();
    let err = session
        .write_attribute("/nowhere", "a", &HostArray::from(vec![1i8]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ---------------------------------------------------------------------------
// Datasets and groups
// ---------------------------------------------------------------------------

#[test]
fn dataset_names_and_parents_are_checked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("names.h5");
    let mut session = WriteSession::create(&path, false).unwrap();
    session.write_dataset("/", "ramp", &ramp(4), None).unwrap();

    let duplicate = session.write_dataset("/", "ramp", &ramp(4), None).unwrap_err();
    assert_eq!(duplicate.kind(), ErrorKind::InvalidInput);
    let missing = session.write_dataset("/absent", "ramp", &ramp(4), None).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    let under_dataset = session.write_dataset("/ramp", "inner", &ramp(4), None).unwrap_err();
    assert_eq!(under_dataset.kind(), ErrorKind::InvalidInput);
    let group_through_dataset = session.write_group("/ramp/sub").unwrap_err();
    assert_eq!(group_through_dataset.kind(), ErrorKind::InvalidInput);
    let bad_name = session.write_dataset("/", "a/b", &ramp(4), None).unwrap_err();
    assert_eq!(bad_name.kind(), ErrorKind::InvalidInput);

    assert_eq!(session.write_group("/g").unwrap().path(), "/g");
    assert_eq!(session.write_group("g/").unwrap().path(), "/g");
    session.flush().unwrap();

    let container = Container::open(&path).unwrap();
    assert_eq!(container.walk().len(), 2);
}

#[test]
fn failed_dataset_leaves_the_session_usable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recover.h5");
    let mut session = WriteSession::create(&path, false).unwrap();

    let array = HostArray::new(vec![4, 4], ArrayData::I16(vec![3; 16])).unwrap();
    for bad in [vec![4], vec![0, 2], vec![5, 1]] {
        let err = session
            .write_dataset("/", "grid", &array, Some(ChunkingPolicy::Shape(bad.clone())))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{bad:?}");
    }
    let handle = session
        .write_dataset("/", "grid", &array, Some(ChunkingPolicy::Shape(vec![3, 3])))
        .unwrap();
    assert_eq!(handle.chunk_shape(), Some(&[3u64, 3][..]));
    session.flush().unwrap();

    let container = Container::open(&path).unwrap();
    assert_eq!(container.decode("/grid", None).unwrap(), array);
}

#[test]
fn cancelled_session_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cancelled.h5");
    let token = CancelToken::new();
    let options = WriteOptions::default().cancel_token(token.clone());
    let mut session = WriteSession::create_with(&path, options).unwrap();
    session
        .write_dataset("/", "before", &ramp(100), Some(ChunkingPolicy::Shape(vec![10])))
        .unwrap();

    token.cancel();
    let err = session
        .write_dataset("/", "after", &ramp(100), Some(ChunkingPolicy::Shape(vec![10])))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(session.flush().unwrap_err().kind(), ErrorKind::Cancelled);
    assert!(!path.exists());
    assert!(entries(dir.path()).is_empty());
}
