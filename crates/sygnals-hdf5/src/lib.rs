//! HDF5 dataset format adapter for the sygnals host.
//!
//! This crate maps HDF5 groups, datasets and attributes onto the host's
//! typed arrays, on top of `sygnals-hdf5-format`.
//!
//! # Reading
//!
//! ```no_run
//! use sygnals_hdf5::Container;
//!
//! let container = Container::open("run.h5").unwrap();
//! for child in container.list_children("/sensors").unwrap() {
//!     println!("{} ({:?})", child.name, child.kind);
//! }
//! let temp = container.decode("/sensors/temp", None).unwrap();
//! println!("shape {:?}", temp.shape());
//! ```
//!
//! # Writing
//!
//! ```no_run
//! use sygnals_hdf5::{HostArray, WriteSession};
//!
//! let mut session = WriteSession::create("run.h5", false).unwrap();
//! session.write_group("/sensors").unwrap();
//! let values: Vec<f64> = (0..1000).map(f64::from).collect();
//! session
//!     .write_dataset("/sensors", "temp", &HostArray::from(values), None)
//!     .unwrap();
//! session
//!     .write_attribute("/sensors/temp", "units", &HostArray::from("degC"))
//!     .unwrap();
//! session.flush().unwrap();
//! ```
//!
//! # Failure policy
//!
//! Writes are all or nothing. A session writes into a temporary file in the
//! destination directory and only [`WriteSession::flush`] moves it to the
//! destination, with an atomic rename after the data is synced. A session
//! that is dropped, fails to flush, or unwinds from a panic deletes its
//! temporary file and leaves any existing file at the destination untouched.
//!
//! # Features
//!
//! - `mmap` (default): map files instead of reading them into memory.
//! - `parallel` (default): decode chunks on the rayon pool when
//!   [`DecodeOptions::parallel`] is set.
//! - `deflate`: read and write gzip-compressed chunks.

pub mod array;
pub mod codec;
pub mod error;
pub mod options;
pub mod plugin;
pub mod reader;
pub mod selection;
mod storage;
pub mod types;
pub mod writer;

pub use array::{ArrayData, HostArray};
pub use codec::{decode, decode_with, encode, encode_with, EncodedChunk, EncodedDataset, EncodedLayout};
pub use error::{Error, ErrorKind, Result};
pub use options::{
    CancelToken, ChunkingPolicy, DecodeOptions, FilterSpec, ReadOptions, WriteOptions,
    MAX_ATTRIBUTE_BYTES, MAX_CHUNK_BYTES,
};
pub use plugin::{
    Capabilities, PluginAdapter, PluginIdentity, PluginManifest, ReaderCapable, WriterCapable,
};
pub use reader::{ChildEntry, Container, DatasetDescription, Index, NodeKind};
pub use selection::Selection;
pub use types::{
    from_host_type, to_host_type, ElementType, Endian, HostElementType, TextEncoding, TextPadding,
};
pub use writer::{DatasetHandle, GroupHandle, WriteSession};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_send<T: Send>() {}

    #[test]
    fn container_is_shareable() {
        assert_send_sync::<Container>();
        assert_send::<WriteSession>();
        assert_send_sync::<PluginAdapter>();
    }
}
