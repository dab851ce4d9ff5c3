//! Write sessions.
//!
//! A session appends payload (heaps, chunks, chunk indexes) to a temporary
//! file created next to the destination and keeps the group tree in memory.
//! [`WriteSession::flush`] lays out the object headers, writes the
//! superblock, syncs, and renames the file into place. A session that is
//! dropped without a successful flush removes its temporary file, so the
//! destination never holds a partial container.

use std::collections::BTreeMap;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, trace};

use sygnals_hdf5_format::attribute::AttributeMessage;
use sygnals_hdf5_format::data_layout::{ChunkIndex, DataLayout, SINGLE_INDEX_WITH_FILTER};
use sygnals_hdf5_format::dataspace::Dataspace;
use sygnals_hdf5_format::file_writer::{serialize_objects, DatasetNode, ObjectNode};
use sygnals_hdf5_format::fill_value::FillValue;
use sygnals_hdf5_format::filter_pipeline::FilterPipeline;
use sygnals_hdf5_format::filters::encode_chunk;
use sygnals_hdf5_format::fixed_array::{self, FixedArrayEntry};
use sygnals_hdf5_format::global_heap::{build_collections, VlReference};
use sygnals_hdf5_format::superblock::{Superblock, SUPERBLOCK_V3_SIZE};

use crate::array::HostArray;
use crate::codec::{self, patch_references, ElementBytes, EncodedChunk, EncodedLayout};
use crate::error::{Error, Result, MAX_MESSAGE_BYTES};
use crate::options::{CancelToken, ChunkingPolicy, WriteOptions};
use crate::reader::{join, normalize};
use crate::types::{from_host_type, to_datatype, ElementType};

const ROOT: usize = 0;

/// Length field width of the files a session writes.
const LENGTH_SIZE: u8 = 8;

/// Allocation time "late" and fill time "if set", for every dataset.
const FILL_TIME: u8 = 2;

/// A group created in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHandle {
    path: String,
}

impl GroupHandle {
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A dataset written in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    path: String,
    shape: Vec<u64>,
    element_type: ElementType,
    chunk_shape: Option<Vec<u64>>,
}

impl DatasetHandle {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// `None` when the dataset is stored contiguously.
    pub fn chunk_shape(&self) -> Option<&[u64]> {
        self.chunk_shape.as_deref()
    }
}

/// An open write session. Nothing appears at the destination until
/// [`flush`](WriteSession::flush) succeeds.
#[derive(Debug)]
pub struct WriteSession {
    target: PathBuf,
    temp: NamedTempFile,
    position: u64,
    options: WriteOptions,
    nodes: Vec<ObjectNode>,
    paths: BTreeMap<String, usize>,
}

impl WriteSession {
    /// Start a session for `path`. Without `overwrite`, an existing file is
    /// an error.
    pub fn create(path: impl AsRef<Path>, overwrite: bool) -> Result<WriteSession> {
        WriteSession::create_with(path, WriteOptions::default().overwrite(overwrite))
    }

    pub fn create_with(path: impl AsRef<Path>, options: WriteOptions) -> Result<WriteSession> {
        let target = path.as_ref().to_path_buf();
        if !options.overwrite && target.try_exists()? {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            )));
        }
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".sygnals-")
            .suffix(".h5.tmp")
            .tempfile_in(&dir)?;
        // superblock goes here on flush
        temp.write_all(&[0u8; SUPERBLOCK_V3_SIZE])?;
        debug!(target = %target.display(), temp = %temp.path().display(), "write session created");

        let mut paths = BTreeMap::new();
        paths.insert("/".to_string(), ROOT);
        Ok(WriteSession {
            target,
            temp,
            position: SUPERBLOCK_V3_SIZE as u64,
            options,
            nodes: vec![ObjectNode::group()],
            paths,
        })
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.target
    }

    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Create the group at `path` and any missing parents. An existing group
    /// is returned as is.
    pub fn write_group(&mut self, path: &str) -> Result<GroupHandle> {
        let path = normalize(path)?;
        let mut current = ROOT;
        let mut current_path = "/".to_string();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let child_path = join(&current_path, part);
            current = match self.paths.get(&child_path) {
                Some(&id) => match self.nodes[id] {
                    ObjectNode::Group { .. } => id,
                    ObjectNode::Dataset(_) => {
                        return Err(Error::invalid(format!("{child_path} is a dataset")));
                    }
                },
                None => {
                    debug!(path = %child_path, "group created");
                    self.add_node(current, part, &child_path, ObjectNode::group())
                }
            };
            current_path = child_path;
        }
        Ok(GroupHandle { path })
    }

    /// Encode `array` and store it as `name` in the existing group
    /// `group_path`. `chunking` overrides the session default.
    pub fn write_dataset(
        &mut self,
        group_path: &str,
        name: &str,
        array: &HostArray,
        chunking: Option<ChunkingPolicy>,
    ) -> Result<DatasetHandle> {
        let group = normalize(group_path)?;
        let parent = self.group_id(&group)?;
        validate_name(name)?;
        let path = join(&group, name);
        if self.paths.contains_key(&path) {
            return Err(Error::invalid(format!("{path} already exists")));
        }

        let element_type = from_host_type(array.element_type())?;
        let policy = chunking.unwrap_or_else(|| self.options.chunking.clone());
        let mark = self.position;
        let node = match self.store_dataset(array, &element_type, &policy) {
            Ok(node) => node,
            Err(e) => {
                self.rewind(mark)?;
                return Err(e);
            }
        };
        let chunk_shape = match &node.layout {
            DataLayout::Chunked { chunk_dims, .. } => Some(chunk_dims.clone()),
            _ => None,
        };
        debug!(
            path = %path,
            shape = ?array.shape(),
            chunk = ?chunk_shape,
            bytes = self.position - mark,
            "dataset written"
        );
        self.add_node(parent, name, &path, ObjectNode::Dataset(node));
        Ok(DatasetHandle {
            path,
            shape: array.shape().to_vec(),
            element_type,
            chunk_shape,
        })
    }

    /// Attach `value` as attribute `name` of the group or dataset at
    /// `node_path`, replacing an attribute of the same name.
    ///
    /// Values above the session's attribute bound fail with
    /// [`Error::ValueTooLarge`] and leave the node unchanged.
    pub fn write_attribute(&mut self, node_path: &str, name: &str, value: &HostArray) -> Result<()> {
        let path = normalize(node_path)?;
        let id = *self
            .paths
            .get(&path)
            .ok_or_else(|| Error::NotFound(path.clone()))?;
        validate_name(name)?;

        let element_type = from_host_type(value.element_type())?;
        let ElementBytes { bytes, strings } = codec::array_to_bytes(value, &element_type)?;
        let size = bytes.len() + strings.iter().map(Vec::len).sum::<usize>();
        let limit = self.options.attribute_limit();
        if size > limit {
            return Err(Error::ValueTooLarge { size, limit });
        }
        let mut attribute = AttributeMessage {
            name: name.to_string(),
            datatype: to_datatype(&element_type),
            dataspace: Dataspace::simple(value.shape()),
            raw_data: bytes,
        };
        // the name and type travel in the same header message as the value
        let message = attribute.serialize(LENGTH_SIZE)?.len();
        if message > MAX_MESSAGE_BYTES {
            return Err(Error::ValueTooLarge {
                size: message,
                limit: MAX_MESSAGE_BYTES,
            });
        }
        if !strings.is_empty() {
            let references = self.append_heap(&strings)?;
            patch_references(&mut attribute.raw_data, &references)?;
        }
        let attributes = match &mut self.nodes[id] {
            ObjectNode::Group { attributes, .. } => attributes,
            ObjectNode::Dataset(ds) => &mut ds.attributes,
        };
        match attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => *existing = attribute,
            None => attributes.push(attribute),
        }
        trace!(path = %path, name, size, "attribute recorded");
        Ok(())
    }

    /// Write the object headers and superblock, sync, and move the file to
    /// its destination.
    pub fn flush(mut self) -> Result<()> {
        CancelToken::check(self.options.cancel.as_ref())?;
        let base = self.align()?;
        let (metadata, addresses) = serialize_objects(&self.nodes, base)?;
        self.temp.write_all(&metadata)?;
        let eof = base + metadata.len() as u64;
        let root = addresses
            .first()
            .copied()
            .ok_or_else(|| Error::invalid("session has no root group"))?;

        self.temp.seek(SeekFrom::Start(0))?;
        self.temp.write_all(&Superblock::new_v3(root, eof).serialize())?;
        self.temp.flush()?;
        self.temp.as_file().sync_all()?;
        debug!(
            target = %self.target.display(),
            objects = self.nodes.len(),
            bytes = eof,
            "flushing container"
        );

        let WriteSession {
            target,
            temp,
            options,
            ..
        } = self;
        let persisted = if options.overwrite {
            temp.persist(&target)
        } else {
            temp.persist_noclobber(&target)
        };
        persisted.map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn group_id(&self, path: &str) -> Result<usize> {
        let id = *self
            .paths
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        match self.nodes[id] {
            ObjectNode::Group { .. } => Ok(id),
            ObjectNode::Dataset(_) => Err(Error::invalid(format!("{path} is a dataset"))),
        }
    }

    fn add_node(&mut self, parent: usize, name: &str, path: &str, node: ObjectNode) -> usize {
        let id = self.nodes.len();
        self.nodes.push(node);
        if let ObjectNode::Group { links, .. } = &mut self.nodes[parent] {
            links.push((name.to_string(), id));
        }
        self.paths.insert(path.to_string(), id);
        id
    }

    /// Append payload for one dataset and return its header contents.
    fn store_dataset(
        &mut self,
        array: &HostArray,
        element_type: &ElementType,
        policy: &ChunkingPolicy,
    ) -> Result<DatasetNode> {
        let mut encoded = codec::encode_with(array, element_type, policy, self.options.cancel.as_ref())?;
        if !encoded.strings().is_empty() {
            let references = self.append_heap(encoded.strings())?;
            encoded.place_strings(&references)?;
        }
        let element_size = element_type.size();
        let (layout, pipeline) = match &encoded.layout {
            EncodedLayout::Contiguous { bytes } => {
                let address = if bytes.is_empty() {
                    None
                } else {
                    Some(self.append(bytes)?)
                };
                let layout = DataLayout::Contiguous {
                    address,
                    size: bytes.len() as u64,
                };
                (layout, None)
            }
            EncodedLayout::Chunked {
                chunk_shape,
                chunks,
            } => self.store_chunks(chunk_shape, chunks, element_size)?,
        };
        Ok(DatasetNode {
            datatype: to_datatype(element_type),
            dataspace: Dataspace::simple(&encoded.shape),
            fill_value: FillValue {
                alloc_time: FILL_TIME,
                write_time: FILL_TIME,
                value: None,
            },
            layout,
            pipeline,
            attributes: Vec::new(),
        })
    }

    /// Filter and append every chunk, then the index that locates them.
    fn store_chunks(
        &mut self,
        chunk_shape: &[u64],
        chunks: &[EncodedChunk],
        element_size: usize,
    ) -> Result<(DataLayout, Option<FilterPipeline>)> {
        let pipeline = self.options.filters.pipeline(element_size)?;
        let chunk_bytes = chunk_shape.iter().product::<u64>() * element_size as u64;
        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            CancelToken::check(self.options.cancel.as_ref())?;
            let piped;
            let stored = match &pipeline {
                Some(p) => {
                    piped = encode_chunk(&chunk.bytes, p, element_size)?;
                    &piped
                }
                None => &chunk.bytes,
            };
            let address = self.append(stored)?;
            trace!(origin = ?chunk.origin, address, size = stored.len(), "chunk stored");
            entries.push(FixedArrayEntry {
                address,
                size: stored.len() as u64,
                filter_mask: 0,
            });
        }

        let filtered = pipeline.is_some();
        let (index, flags) = match entries.as_slice() {
            [only] => {
                let index = ChunkIndex::Single {
                    address: Some(only.address),
                    filtered: filtered.then_some((only.size, 0)),
                };
                let flags = if filtered { SINGLE_INDEX_WITH_FILTER } else { 0 };
                (index, flags)
            }
            _ => {
                let page_bits = fixed_array::page_bits_for(entries.len());
                let header = self.align()?;
                let bytes = fixed_array::build(&entries, filtered, chunk_bytes, page_bits, header);
                self.append(&bytes)?;
                let index = ChunkIndex::FixedArray {
                    address: Some(header),
                    page_bits,
                };
                (index, 0)
            }
        };
        let layout = DataLayout::Chunked {
            chunk_dims: chunk_shape.to_vec(),
            element_size: element_size as u32,
            flags,
            index,
        };
        Ok((layout, pipeline))
    }

    /// Append global heap collections holding `strings`.
    fn append_heap(&mut self, strings: &[Vec<u8>]) -> Result<Vec<VlReference>> {
        let address = self.align()?;
        let objects: Vec<&[u8]> = strings.iter().map(Vec::as_slice).collect();
        let (bytes, references) = build_collections(&objects, address);
        self.append(&bytes)?;
        Ok(references)
    }

    /// Pad the file to an 8-byte boundary and return the new end.
    fn align(&mut self) -> Result<u64> {
        let padding = self.position.next_multiple_of(8) - self.position;
        if padding > 0 {
            self.temp.write_all(&[0u8; 8][..padding as usize])?;
            self.position += padding;
        }
        Ok(self.position)
    }

    /// Append `bytes` at the next aligned address and return that address.
    fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let address = self.align()?;
        self.temp.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(address)
    }

    /// Drop everything appended after `mark`.
    fn rewind(&mut self, mark: u64) -> Result<()> {
        self.temp.as_file().set_len(mark)?;
        self.temp.seek(SeekFrom::Start(mark))?;
        self.position = mark;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(Error::invalid(format!("invalid node name {name:?}")));
    }
    Ok(())
}
