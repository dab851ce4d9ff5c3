//! HDF5 binary structures for the sygnals dataset adapter.
//!
//! Parsing and serialization of the on-disk pieces the adapter reads and
//! writes: superblock, object headers and their messages, old- and
//! new-style groups, chunk indexes, global heap collections and the chunk
//! filters. Nothing here performs I/O; every function works on byte slices.
//! It supports `no_std` environments with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod attribute;
pub mod btree_v1;
pub mod bytes;
pub mod checksum;
pub mod chunk_index;
pub mod data_layout;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod file_writer;
pub mod fill_value;
pub mod filter_pipeline;
pub mod filters;
pub mod fixed_array;
pub mod global_heap;
pub mod group_v1;
pub mod link_info;
pub mod link_message;
pub mod message_type;
pub mod object_header;
pub mod object_header_writer;
pub mod signature;
pub mod superblock;

pub use error::FormatError;
