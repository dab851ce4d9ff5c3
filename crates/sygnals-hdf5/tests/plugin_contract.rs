//! The adapter as the host drives it: load, negotiate, then read and write
//! through the capability traits.

use std::path::Path;

use sygnals_hdf5::plugin::{FORMAT_NAME, PLUGIN_NAME, SYGNALS_API_RANGE};
use sygnals_hdf5::{
    ErrorKind, HostArray, PluginAdapter, ReaderCapable, WriteOptions, WriterCapable,
};

fn writer(adapter: &dyn WriterCapable, path: &Path) {
    let mut session = adapter.open_writer(path, WriteOptions::default()).unwrap();
    session.write_group("/run").unwrap();
    session
        .write_dataset("/run", "counts", &HostArray::from(vec![3u16, 1, 4, 1, 5]), None)
        .unwrap();
    session.flush().unwrap();
}

#[test]
fn host_round_trip_through_capabilities() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let adapter = PluginAdapter::load("1.2").unwrap();
    let caps = adapter.capabilities();
    assert!(caps.can_read(FORMAT_NAME) && caps.can_write(FORMAT_NAME));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("host.h5");
    writer(&adapter, &path);

    let reader: &dyn ReaderCapable = &adapter;
    let container = reader.open_reader(&path).unwrap();
    assert_eq!(
        container.decode("/run/counts", None).unwrap(),
        HostArray::from(vec![3u16, 1, 4, 1, 5])
    );
}

#[test]
fn identity_and_manifest_agree() {
    let adapter = PluginAdapter::load("1.0.0").unwrap();
    let identity = adapter.identity();
    let manifest = adapter.manifest();
    assert_eq!(identity.name, PLUGIN_NAME);
    assert_eq!(manifest.name, identity.name);
    assert_eq!(manifest.version, identity.version);
    assert_eq!(identity.api_compatibility_range.to_string(), SYGNALS_API_RANGE);
    assert!(manifest
        .to_manifest_string()
        .contains(&format!("version: {}", identity.version)));
}

#[test]
fn incompatible_host_is_refused_at_load() {
    for host in ["2.0.0", "0.99.0", "1.0.0-beta", ""] {
        let err = PluginAdapter::load(host).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ApiCompatibility, "{host:?}");
        assert!(err.to_string().contains(SYGNALS_API_RANGE), "{err}");
    }
}

#[test]
fn writer_refuses_to_clobber_through_the_adapter() {
    let adapter = PluginAdapter::load("1.9.9").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taken.h5");
    writer(&adapter, &path);
    let err = adapter
        .open_writer(&path, WriteOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    let replaced = adapter.open_writer(&path, WriteOptions::default().overwrite(true));
    assert!(replaced.is_ok());
}
