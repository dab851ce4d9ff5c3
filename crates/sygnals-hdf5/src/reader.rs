//! Container reader: eager index, lazy payload.
//!
//! Opening a container walks the whole group tree once and records every
//! group, dataset and attribute message in an [`Index`]. Dataset payload is
//! only touched by [`Container::decode`].

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use sygnals_hdf5_format::attribute::AttributeMessage;
use sygnals_hdf5_format::chunk_index::ChunkGeometry;
use sygnals_hdf5_format::data_layout::{ChunkIndex, DataLayout};
use sygnals_hdf5_format::dataspace::Dataspace;
use sygnals_hdf5_format::datatype::Datatype;
use sygnals_hdf5_format::error::FormatError;
use sygnals_hdf5_format::fill_value::FillValue;
use sygnals_hdf5_format::filter_pipeline::FilterPipeline;
use sygnals_hdf5_format::group_v1::{self, SymbolTable};
use sygnals_hdf5_format::link_info::LinkInfo;
use sygnals_hdf5_format::link_message::{LinkMessage, LinkTarget};
use sygnals_hdf5_format::message_type::MessageType;
use sygnals_hdf5_format::object_header::ObjectHeader;
use sygnals_hdf5_format::signature::find_signature;
use sygnals_hdf5_format::superblock::Superblock;

use crate::array::HostArray;
use crate::codec::{self, grid_dims, stored_size, HeapReader};
use crate::error::{Error, Result};
use crate::options::{DecodeOptions, ReadOptions};
use crate::selection::Selection;
use crate::storage::Storage;
use crate::types::{classify, ElementType};

/// Header message flag marking a shared (committed) message.
const MSG_FLAG_SHARED: u8 = 0x02;

/// Largest chunk libhdf5 will store: its chunk sizes are 32-bit.
const MAX_STORED_CHUNK_BYTES: u64 = u32::MAX as u64;

/// Whether a node is a group or a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Group,
    Dataset,
}

/// One entry of [`Container::list_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// Shape, type and storage of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescription {
    pub shape: Vec<u64>,
    /// Maximum extent when stored; `u64::MAX` marks an unlimited dimension.
    pub max_shape: Option<Vec<u64>>,
    pub element_type: ElementType,
    /// Chunk extent, `None` for contiguous and compact storage.
    pub chunking: Option<Vec<u64>>,
    /// Filter ids in pipeline order.
    pub filters: Vec<u16>,
}

/// Everything needed to decode a dataset without reparsing its header.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DatasetMeta {
    pub dataspace: Dataspace,
    pub datatype: Datatype,
    pub layout: DataLayout,
    pub pipeline: Option<FilterPipeline>,
    pub fill: FillValue,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Group { children: BTreeMap<String, NodeKind> },
    Dataset(Box<DatasetMeta>),
}

#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    node: Node,
    attributes: Vec<AttributeMessage>,
}

/// Parsed hierarchy of a container, keyed by absolute path.
///
/// Two opens of the same bytes produce equal indexes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        normalize(path).is_ok_and(|p| self.entries.contains_key(&p))
    }

    fn get(&self, path: &str) -> Result<(String, &IndexEntry)> {
        let path = normalize(path)?;
        match self.entries.get(&path) {
            Some(entry) => Ok((path, entry)),
            None => Err(Error::NotFound(path)),
        }
    }
}

/// Canonical absolute form of `path`: `/` or `/a/b`.
pub(crate) fn normalize(path: &str) -> Result<String> {
    let mut out = String::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        if part == "." || part == ".." {
            return Err(Error::invalid(format!("relative component in path {path:?}")));
        }
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

pub(crate) fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// An open container.
///
/// The file must not be modified while a container over it is open.
#[derive(Debug)]
pub struct Container {
    path: Option<PathBuf>,
    storage: Storage,
    base: usize,
    superblock: Superblock,
    index: Index,
    verify_checksums: bool,
}

impl Container {
    /// Open the container at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Container> {
        Container::open_with(path, ReadOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: ReadOptions) -> Result<Container> {
        let path = path.as_ref();
        let storage = Storage::open(path, options.use_mmap)?;
        debug!(path = %path.display(), mapped = storage.is_mapped(), "opening container");
        Container::load(storage, Some(path.to_path_buf()), &options)
    }

    /// Open a container held in memory.
    pub fn from_bytes(bytes: Vec<u8>, options: ReadOptions) -> Result<Container> {
        Container::load(Storage::Owned(bytes), None, &options)
    }

    fn load(storage: Storage, path: Option<PathBuf>, options: &ReadOptions) -> Result<Container> {
        let bytes = storage.as_bytes();
        let signature = find_signature(bytes)?;
        let superblock =
            Superblock::parse(bytes, signature, options.verify_checksums).map_err(|e| match e {
                FormatError::UnexpectedEof { .. } => truncated("superblock is truncated"),
                other => Error::from(other),
            })?;
        let base = usize::try_from(superblock.base_address)
            .ok()
            .filter(|&b| b <= bytes.len())
            .ok_or_else(|| truncated("base address lies past the end of the file"))?;
        let available = (bytes.len() - base) as u64;
        if superblock.eof_address > available {
            return Err(truncated(&format!(
                "superblock declares {} bytes, file holds {available}",
                superblock.eof_address
            )));
        }

        let mut builder = IndexBuilder {
            data: &bytes[base..],
            offset_size: superblock.offset_size,
            length_size: superblock.length_size,
            verify_checksums: options.verify_checksums,
            entries: BTreeMap::new(),
        };
        let mut ancestors = Vec::new();
        builder.visit("/", superblock.root_group_address, &mut ancestors)?;
        let index = Index {
            entries: builder.entries,
        };
        match index.entries.get("/") {
            Some(IndexEntry {
                node: Node::Group { .. },
                ..
            }) => {}
            _ => return Err(Error::corrupt("root object is not a group")),
        }
        debug!(
            version = superblock.version,
            objects = index.len(),
            "container index built"
        );
        Ok(Container {
            path,
            storage,
            base,
            superblock,
            index,
            verify_checksums: options.verify_checksums,
        })
    }

    /// File path, `None` for in-memory containers.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Superblock version, 0 to 3.
    pub fn format_version(&self) -> u8 {
        self.superblock.version
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Children of the group at `group_path`, in name order.
    pub fn list_children(&self, group_path: &str) -> Result<Vec<ChildEntry>> {
        let (path, entry) = self.index.get(group_path)?;
        match &entry.node {
            Node::Group { children } => Ok(children
                .iter()
                .map(|(name, kind)| ChildEntry {
                    name: name.clone(),
                    kind: *kind,
                })
                .collect()),
            Node::Dataset(_) => Err(Error::invalid(format!("{path} is a dataset, not a group"))),
        }
    }

    /// All attributes of the group or dataset at `node_path`, by name.
    pub fn read_attributes(&self, node_path: &str) -> Result<BTreeMap<String, HostArray>> {
        let (path, entry) = self.index.get(node_path)?;
        let mut heap = HeapReader::new(self.data(), self.superblock.offset_size, self.superblock.length_size);
        entry
            .attributes
            .iter()
            .map(|attr| {
                let value = codec::decode_attribute(attr, &mut heap)
                    .map_err(|e| e.at(&join(&path, &attr.name)))?;
                Ok((attr.name.clone(), value))
            })
            .collect()
    }

    /// Shape, element type and storage of the dataset at `path`.
    pub fn describe_dataset(&self, path: &str) -> Result<DatasetDescription> {
        let (path, meta) = self.dataset_meta(path)?;
        let element_type = classify(&meta.datatype).map_err(|e| e.at(&path))?;
        let chunking = match &meta.layout {
            DataLayout::Chunked { chunk_dims, .. } => Some(chunk_dims.clone()),
            _ => None,
        };
        Ok(DatasetDescription {
            shape: meta.dataspace.dimensions.clone(),
            max_shape: meta.dataspace.max_dimensions.clone(),
            element_type,
            chunking,
            filters: meta
                .pipeline
                .iter()
                .flat_map(|p| p.filters.iter().map(|f| f.filter_id))
                .collect(),
        })
    }

    /// Decode the dataset at `path`, or the part inside `selection`.
    pub fn decode(&self, path: &str, selection: Option<&Selection>) -> Result<HostArray> {
        codec::decode(self, path, selection)
    }

    pub fn decode_with(
        &self,
        path: &str,
        selection: Option<&Selection>,
        options: &DecodeOptions,
    ) -> Result<HostArray> {
        codec::decode_with(self, path, selection, options)
    }

    /// Every node below the root as `(path, kind)`, depth first in name order.
    pub fn walk(&self) -> Vec<(String, NodeKind)> {
        let mut out = Vec::new();
        self.walk_from("/", &mut out);
        out
    }

    fn walk_from(&self, path: &str, out: &mut Vec<(String, NodeKind)>) {
        let Some(IndexEntry {
            node: Node::Group { children },
            ..
        }) = self.index.entries.get(path)
        else {
            return;
        };
        for (name, kind) in children {
            let child = join(path, name);
            out.push((child.clone(), *kind));
            if *kind == NodeKind::Group {
                self.walk_from(&child, out);
            }
        }
    }

    pub(crate) fn dataset_meta(&self, path: &str) -> Result<(String, &DatasetMeta)> {
        let (path, entry) = self.index.get(path)?;
        match &entry.node {
            Node::Dataset(meta) => Ok((path, meta)),
            Node::Group { .. } => Err(Error::invalid(format!("{path} is a group, not a dataset"))),
        }
    }

    /// File bytes from the base address on; addresses index into this.
    pub(crate) fn data(&self) -> &[u8] {
        &self.storage.as_bytes()[self.base..]
    }

    pub(crate) fn sizes(&self) -> (u8, u8) {
        (self.superblock.offset_size, self.superblock.length_size)
    }

    pub(crate) fn verifies_checksums(&self) -> bool {
        self.verify_checksums
    }
}

fn truncated(msg: &str) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, msg.to_string()))
}

struct IndexBuilder<'a> {
    data: &'a [u8],
    offset_size: u8,
    length_size: u8,
    verify_checksums: bool,
    entries: BTreeMap<String, IndexEntry>,
}

impl IndexBuilder<'_> {
    /// Index the object at `address` and, for groups, everything below it.
    /// Returns `None` for objects that are skipped.
    fn visit(&mut self, path: &str, address: u64, ancestors: &mut Vec<u64>) -> Result<Option<NodeKind>> {
        if ancestors.contains(&address) {
            return Err(Error::corrupt(format!(
                "{path}: link back to ancestor object at {address:#x}"
            )));
        }
        let offset = usize::try_from(address)
            .map_err(|_| Error::corrupt(format!("{path}: address {address:#x} out of range")))?;
        let header = ObjectHeader::parse(
            self.data,
            offset,
            self.offset_size,
            self.length_size,
            self.verify_checksums,
        )
        .map_err(|e| Error::from(e).at(path))?;
        let attributes = self.attributes(path, &header)?;

        if header.has(MessageType::DataLayout) {
            let Some(meta) = self.dataset_meta(path, &header)? else {
                return Ok(None);
            };
            self.entries.insert(
                path.to_string(),
                IndexEntry {
                    node: Node::Dataset(Box::new(meta)),
                    attributes,
                },
            );
            return Ok(Some(NodeKind::Dataset));
        }
        let is_group = header.has(MessageType::SymbolTable)
            || header.has(MessageType::LinkInfo)
            || header.has(MessageType::Link)
            || !header.has(MessageType::Datatype);
        if !is_group {
            warn!(path, "skipping committed datatype");
            return Ok(None);
        }

        let links = self.links(&header).map_err(|e| e.at(path))?;
        ancestors.push(address);
        let mut children = BTreeMap::new();
        for (name, child_address) in links {
            if name.is_empty() || name.contains('/') {
                return Err(Error::corrupt(format!("{path}: invalid link name {name:?}")));
            }
            let child_path = join(path, &name);
            if children.contains_key(&name) {
                return Err(Error::corrupt(format!("{path}: duplicate link {name:?}")));
            }
            if let Some(kind) = self.visit(&child_path, child_address, ancestors)? {
                children.insert(name, kind);
            }
        }
        ancestors.pop();
        self.entries.insert(
            path.to_string(),
            IndexEntry {
                node: Node::Group { children },
                attributes,
            },
        );
        Ok(Some(NodeKind::Group))
    }

    fn attributes(&self, path: &str, header: &ObjectHeader) -> Result<Vec<AttributeMessage>> {
        let mut out = Vec::new();
        for msg in header.messages_of(MessageType::Attribute) {
            match AttributeMessage::parse(&msg.data, self.length_size) {
                Ok(attr) => out.push(attr),
                Err(FormatError::UnsupportedMessage(_)) => {
                    warn!(path, "skipping attribute with a committed datatype");
                }
                Err(e) => return Err(Error::from(e).at(path)),
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Hard links of a group, in storage order.
    fn links(&self, header: &ObjectHeader) -> Result<Vec<(String, u64)>> {
        if let Some(msg) = header.find(MessageType::SymbolTable) {
            let table = SymbolTable::parse(&msg.data, self.offset_size)?;
            let entries = group_v1::read_entries(self.data, &table, self.offset_size, self.length_size)?;
            return Ok(entries
                .into_iter()
                .map(|e| (e.name, e.object_header_address))
                .collect());
        }
        if let Some(msg) = header.find(MessageType::LinkInfo) {
            if LinkInfo::parse(&msg.data, self.offset_size)?.is_dense() {
                return Err(FormatError::DenseLinkStorage.into());
            }
        }
        let mut out = Vec::new();
        for msg in header.messages_of(MessageType::Link) {
            let link = LinkMessage::parse(&msg.data, self.offset_size)?;
            match link.target {
                LinkTarget::Hard { address } => out.push((link.name, address)),
                LinkTarget::Soft { path } => {
                    warn!(name = %link.name, target = %path, "skipping soft link");
                }
                LinkTarget::External { file, path } => {
                    warn!(name = %link.name, %file, target = %path, "skipping external link");
                }
            }
        }
        Ok(out)
    }

    /// Dataset metadata, validated against the file. `None` for datasets
    /// whose type lives in a committed datatype.
    fn dataset_meta(&self, path: &str, header: &ObjectHeader) -> Result<Option<DatasetMeta>> {
        let required = |t: MessageType, what: &str| {
            header
                .find(t)
                .ok_or_else(|| Error::corrupt(format!("{path}: dataset without a {what} message")))
        };
        let type_msg = required(MessageType::Datatype, "datatype")?;
        if type_msg.flags & MSG_FLAG_SHARED != 0 {
            warn!(path, "skipping dataset with a committed datatype");
            return Ok(None);
        }
        let at = |e: FormatError| Error::from(e).at(path);
        let (datatype, _) = Datatype::parse(&type_msg.data).map_err(at)?;
        let dataspace =
            Dataspace::parse(&required(MessageType::Dataspace, "dataspace")?.data, self.length_size)
                .map_err(at)?;
        let layout = DataLayout::parse(
            &required(MessageType::DataLayout, "layout")?.data,
            self.offset_size,
            self.length_size,
        )
        .map_err(at)?;
        let pipeline = header
            .find(MessageType::FilterPipeline)
            .map(|m| FilterPipeline::parse(&m.data))
            .transpose()
            .map_err(at)?;
        let fill = match (header.find(MessageType::FillValue), header.find(MessageType::FillValueOld)) {
            (Some(m), _) => FillValue::parse(&m.data).map_err(at)?,
            (None, Some(m)) => FillValue::parse_old(&m.data).map_err(at)?,
            (None, None) => FillValue::default(),
        };
        let meta = DatasetMeta {
            dataspace,
            datatype,
            layout,
            pipeline,
            fill,
        };
        self.validate(&meta).map_err(|e| e.at(path))?;
        Ok(Some(meta))
    }

    /// Reject metadata that contradicts itself or the file extent.
    fn validate(&self, meta: &DatasetMeta) -> Result<()> {
        let rank = meta.dataspace.rank();
        let elements = meta.dataspace.num_elements();
        // unsupported classes still get a size; decode rejects them later
        let element_size = match classify(&meta.datatype) {
            Ok(t) => stored_size(&t, self.offset_size) as u64,
            Err(_) => u64::from(meta.datatype.type_size()),
        };
        let needed = elements.saturating_mul(element_size);
        match &meta.layout {
            DataLayout::Chunked {
                chunk_dims, index, ..
            } => {
                if chunk_dims.len() != rank {
                    return Err(Error::corrupt(format!(
                        "chunk rank {} does not match dataspace rank {rank}",
                        chunk_dims.len()
                    )));
                }
                if chunk_dims.contains(&0) {
                    return Err(Error::corrupt(format!("zero chunk dimension in {chunk_dims:?}")));
                }
                let grid_dims = grid_dims(&meta.dataspace);
                let geometry = ChunkGeometry {
                    dims: &meta.dataspace.dimensions,
                    grid_dims: &grid_dims,
                    chunk_dims,
                    element_size,
                };
                let chunk_bytes = geometry
                    .chunk_bytes()
                    .ok()
                    .filter(|&bytes| bytes <= MAX_STORED_CHUNK_BYTES)
                    .ok_or_else(|| {
                        Error::corrupt(format!(
                            "chunk of {chunk_dims:?} elements exceeds {MAX_STORED_CHUNK_BYTES} bytes"
                        ))
                    })?;
                self.validate_index(index, chunk_bytes, &geometry)?;
            }
            DataLayout::Contiguous {
                address: Some(address),
                size,
            } => {
                let end = address.checked_add(*size);
                if end.map_or(true, |end| end > self.data.len() as u64) {
                    return Err(Error::corrupt(format!(
                        "contiguous extent {address:#x}+{size} lies outside the file"
                    )));
                }
                if *size < needed {
                    return Err(Error::corrupt(format!(
                        "contiguous extent of {size} bytes for {needed} bytes of data"
                    )));
                }
            }
            DataLayout::Compact { data } => {
                if (data.len() as u64) < needed {
                    return Err(Error::corrupt(format!(
                        "compact data of {} bytes for {needed} bytes of data",
                        data.len()
                    )));
                }
            }
            // virtual datasets are indexed; decode rejects them
            DataLayout::Contiguous { address: None, .. } | DataLayout::Virtual => {}
        }
        if let Some(max) = &meta.dataspace.max_dimensions {
            if max.len() != rank {
                return Err(Error::corrupt("maximum dimensions differ in rank from dimensions"));
            }
        }
        Ok(())
    }

    /// A defined chunk index address must lie in the file. Indexes that name
    /// their chunk bytes directly must hold those bytes too.
    fn validate_index(
        &self,
        index: &ChunkIndex,
        chunk_bytes: u64,
        geometry: &ChunkGeometry<'_>,
    ) -> Result<()> {
        let (address, extent) = match *index {
            ChunkIndex::Single {
                address: Some(address),
                filtered,
            } => (address, filtered.map_or(chunk_bytes, |(size, _)| size)),
            ChunkIndex::Implicit {
                address: Some(address),
            } => {
                let extent = geometry
                    .slot_count()
                    .ok()
                    .and_then(|slots| slots.checked_mul(chunk_bytes))
                    .ok_or_else(|| Error::corrupt("implicit chunk index overflows"))?;
                (address, extent)
            }
            ChunkIndex::BTreeV1 {
                address: Some(address),
            }
            | ChunkIndex::FixedArray {
                address: Some(address),
                ..
            }
            | ChunkIndex::ExtensibleArray {
                address: Some(address),
            }
            | ChunkIndex::BTreeV2 {
                address: Some(address),
            } => (address, 1),
            _ => return Ok(()),
        };
        let end = address.checked_add(extent);
        if end.map_or(true, |end| end > self.data.len() as u64) {
            return Err(Error::corrupt(format!(
                "chunk index {address:#x}+{extent} lies outside the file"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_normalized() {
        assert_eq!(normalize("").unwrap(), "/");
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("sensors//temp/").unwrap(), "/sensors/temp");
        assert!(normalize("/a/../b").is_err());
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }

    #[test]
    fn garbage_is_not_a_container() {
        let err = Container::from_bytes(vec![0u8; 4096], ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        let err = Container::from_bytes(Vec::new(), ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = Container::open(dir.path().join("absent.h5")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
