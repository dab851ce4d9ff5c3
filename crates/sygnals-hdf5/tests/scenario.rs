//! End-to-end: write a small sensor container, flush, reopen, read it back.

use sygnals_hdf5::{
    ArrayData, ChildEntry, Container, ElementType, Endian, HostArray, NodeKind, ReadOptions,
    Selection, WriteSession,
};

fn temperatures() -> Vec<f64> {
    (0..1000).map(f64::from).collect()
}

fn write_sensor_file(path: &std::path::Path) {
    let mut session = WriteSession::create(path, false).unwrap();
    session.write_group("/sensors").unwrap();
    let handle = session
        .write_dataset("/sensors", "temp", &HostArray::from(temperatures()), None)
        .unwrap();
    assert_eq!(handle.path(), "/sensors/temp");
    assert_eq!(handle.chunk_shape(), Some(&[1000u64][..]));
    session
        .write_attribute("/sensors/temp", "units", &HostArray::from("degC"))
        .unwrap();
    session
        .write_attribute("/sensors", "sample_rate", &HostArray::from(vec![48_000.0f64]))
        .unwrap();
    session.flush().unwrap();
}

#[test]
fn sensors_temp_round_trips_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensors.h5");
    write_sensor_file(&path);

    let container = Container::open(&path).unwrap();
    assert_eq!(container.format_version(), 3);
    assert_eq!(
        container.list_children("/").unwrap(),
        vec![ChildEntry {
            name: "sensors".into(),
            kind: NodeKind::Group
        }]
    );
    assert_eq!(
        container.list_children("/sensors").unwrap(),
        vec![ChildEntry {
            name: "temp".into(),
            kind: NodeKind::Dataset
        }]
    );

    let description = container.describe_dataset("/sensors/temp").unwrap();
    assert_eq!(description.shape, vec![1000]);
    assert_eq!(
        description.element_type,
        ElementType::Float {
            size: 8,
            order: Endian::Little
        }
    );
    assert_eq!(description.chunking, Some(vec![1000]));
    assert!(description.filters.is_empty());

    let values = container.decode("/sensors/temp", None).unwrap();
    assert_eq!(values.shape(), &[1000]);
    assert_eq!(values.as_f64().unwrap(), temperatures().as_slice());
}

#[test]
fn attributes_come_back_with_their_types() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensors.h5");
    write_sensor_file(&path);

    let container = Container::open(&path).unwrap();
    let attrs = container.read_attributes("/sensors/temp").unwrap();
    assert_eq!(attrs.len(), 1);
    let units = &attrs["units"];
    assert!(units.shape().is_empty());
    assert_eq!(units.data(), &ArrayData::Text(vec!["degC".into()]));

    let group_attrs = container.read_attributes("sensors").unwrap();
    assert_eq!(group_attrs["sample_rate"].as_f64(), Some(&[48_000.0][..]));
    assert!(container.read_attributes("/").unwrap().is_empty());
}

#[test]
fn selection_reads_a_window() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensors.h5");
    write_sensor_file(&path);

    let container = Container::open(&path).unwrap();
    let window = Selection::new(vec![990], vec![10]);
    let tail = container.decode("/sensors/temp", Some(&window)).unwrap();
    let expected: Vec<f64> = (990..1000).map(f64::from).collect();
    assert_eq!(tail.as_f64().unwrap(), expected.as_slice());
}

#[test]
fn walk_lists_every_node() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensors.h5");
    write_sensor_file(&path);

    let container = Container::open(&path).unwrap();
    assert_eq!(
        container.walk(),
        vec![
            ("/sensors".to_string(), NodeKind::Group),
            ("/sensors/temp".to_string(), NodeKind::Dataset),
        ]
    );
}

#[test]
fn owned_and_mapped_reads_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensors.h5");
    write_sensor_file(&path);

    let owned = Container::open_with(&path, ReadOptions::default().use_mmap(false)).unwrap();
    let mapped = Container::open_with(&path, ReadOptions::default().use_mmap(true)).unwrap();
    assert_eq!(owned.index(), mapped.index());
    assert_eq!(
        owned.decode("/sensors/temp", None).unwrap(),
        mapped.decode("/sensors/temp", None).unwrap()
    );

    let bytes = std::fs::read(&path).unwrap();
    let in_memory = Container::from_bytes(bytes, ReadOptions::default()).unwrap();
    assert!(in_memory.path().is_none());
    assert_eq!(in_memory.index(), owned.index());
}
