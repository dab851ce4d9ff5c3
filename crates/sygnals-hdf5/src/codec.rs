//! Dataset codec: stored bytes to host arrays and back.
//!
//! Decoding locates the chunks overlapping a selection, undoes the filter
//! pipeline on each, and scatters them into a destination prefilled with the
//! dataset fill value. Encoding serializes the array in the element type's
//! canonical layout and cuts it into chunks in row-major grid order.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::{debug, trace};

use sygnals_hdf5_format::attribute::AttributeMessage;
use sygnals_hdf5_format::chunk_index::{locate_chunks, ChunkGeometry, ChunkLocation};
use sygnals_hdf5_format::data_layout::DataLayout;
use sygnals_hdf5_format::dataspace::Dataspace;
use sygnals_hdf5_format::filter_pipeline::FilterPipeline;
use sygnals_hdf5_format::filters::decode_chunk;
use sygnals_hdf5_format::global_heap::{GlobalHeapCollection, VlReference, VL_REFERENCE_SIZE};

use crate::array::{ArrayData, HostArray};
use crate::error::{Error, Result};
use crate::options::{CancelToken, ChunkingPolicy, DecodeOptions, MAX_CHUNK_BYTES};
use crate::reader::Container;
use crate::selection::{copy_overlap, Block, Selection};
use crate::types::{classify, to_host_type, ElementType, Endian, TextPadding};

/// Bytes of one element as stored in a file with `offset_size` addresses.
pub(crate) fn stored_size(element_type: &ElementType, offset_size: u8) -> usize {
    match element_type {
        ElementType::VarString { .. } => 4 + offset_size as usize + 4,
        other => other.size(),
    }
}

/// Extent that linearises chunk positions: the maximum dimensions when all
/// are fixed, the current ones otherwise.
pub(crate) fn grid_dims(dataspace: &Dataspace) -> Vec<u64> {
    match &dataspace.max_dimensions {
        Some(max) if max.iter().all(|&d| d != u64::MAX) => max.clone(),
        _ => dataspace.dimensions.clone(),
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode the dataset at `path`, or the part of it inside `selection`.
pub fn decode(container: &Container, path: &str, selection: Option<&Selection>) -> Result<HostArray> {
    decode_with(container, path, selection, &DecodeOptions::default())
}

/// [`decode`] with parallelism and cancellation control.
pub fn decode_with(
    container: &Container,
    path: &str,
    selection: Option<&Selection>,
    options: &DecodeOptions,
) -> Result<HostArray> {
    let (path, meta) = container.dataset_meta(path)?;
    let element_type = classify(&meta.datatype).map_err(|e| e.at(&path))?;
    if let Some(id) = meta.pipeline.as_ref().and_then(FilterPipeline::first_unsupported) {
        return Err(Error::UnsupportedFilter(id));
    }

    let shape = meta.dataspace.dimensions.clone();
    let selection = match selection {
        Some(s) => s.clone(),
        None => Selection::all(&shape),
    };
    selection.validate(&shape)?;

    let (offset_size, length_size) = container.sizes();
    let element_size = stored_size(&element_type, offset_size);
    let count = selection.num_elements() as usize;
    let mut out = meta.fill.element_bytes(element_size).repeat(count);
    let target = Block {
        origin: &selection.start,
        shape: &selection.count,
    };
    let whole = vec![0u64; shape.len()];
    let data = container.data();
    let cancel = options.cancel.as_ref();

    match &meta.layout {
        DataLayout::Compact { data: bytes } => {
            if count > 0 {
                let source = Block {
                    origin: &whole,
                    shape: &shape,
                };
                copy_overlap(bytes, source, &mut out, target, element_size);
            }
        }
        DataLayout::Contiguous { address: None, .. } => {}
        DataLayout::Contiguous {
            address: Some(address),
            size,
        } => {
            if count > 0 {
                let bytes = extent(data, *address, *size)?;
                let source = Block {
                    origin: &whole,
                    shape: &shape,
                };
                copy_overlap(bytes, source, &mut out, target, element_size);
            }
        }
        DataLayout::Chunked {
            chunk_dims, index, ..
        } => {
            let grid_dims = grid_dims(&meta.dataspace);
            let geometry = ChunkGeometry {
                dims: &shape,
                grid_dims: &grid_dims,
                chunk_dims,
                element_size: element_size as u64,
            };
            let chunks = locate_chunks(
                data,
                index,
                &geometry,
                offset_size,
                length_size,
                container.verifies_checksums(),
            )
            .map_err(|e| Error::from(e).at(&path))?;
            let wanted: Vec<&ChunkLocation> = chunks
                .iter()
                .filter(|c| count > 0 && selection.overlaps(&c.origin, chunk_dims))
                .collect();
            debug!(
                path = %path,
                allocated = chunks.len(),
                selected = wanted.len(),
                "decoding chunked dataset"
            );
            let chunk_bytes = geometry.chunk_bytes().map_err(|e| Error::from(e).at(&path))?;
            let job = ChunkJob {
                data,
                pipeline: meta.pipeline.as_ref(),
                chunk_bytes: chunk_bytes as usize,
                element_size,
            };
            let decoded = decode_chunks(&job, &wanted, options).map_err(|e| e.at(&path))?;
            for (location, bytes) in wanted.iter().zip(&decoded) {
                let source = Block {
                    origin: &location.origin,
                    shape: chunk_dims,
                };
                copy_overlap(bytes, source, &mut out, target, element_size);
            }
        }
        DataLayout::Virtual => {
            return Err(Error::UnsupportedFeature(format!("{path}: virtual dataset layout")));
        }
    }
    CancelToken::check(cancel)?;

    let mut heap = HeapReader::new(data, offset_size, length_size);
    array_from_bytes(&out, selection.count, &element_type, element_size, &mut heap)
        .map_err(|e| e.at(&path))
}

fn extent(data: &[u8], address: u64, size: u64) -> Result<&[u8]> {
    usize::try_from(address)
        .ok()
        .zip(usize::try_from(size).ok())
        .and_then(|(start, len)| data.get(start..start.checked_add(len)?))
        .ok_or_else(|| {
            Error::corrupt(format!("extent {address:#x}+{size} lies outside the file"))
        })
}

/// What every chunk of one dataset shares.
struct ChunkJob<'a> {
    data: &'a [u8],
    pipeline: Option<&'a FilterPipeline>,
    chunk_bytes: usize,
    element_size: usize,
}

impl ChunkJob<'_> {
    fn decode_one(&self, location: &ChunkLocation) -> Result<Vec<u8>> {
        let stored = extent(self.data, location.address, location.size)?;
        let raw = match self.pipeline {
            Some(p) if !p.filters.is_empty() => {
                decode_chunk(stored, p, location.filter_mask, self.element_size)?
            }
            _ => stored.to_vec(),
        };
        if raw.len() != self.chunk_bytes {
            return Err(Error::corrupt(format!(
                "chunk at {:?} decoded to {} bytes, expected {}",
                location.origin,
                raw.len(),
                self.chunk_bytes
            )));
        }
        trace!(origin = ?location.origin, stored = location.size, "chunk decoded");
        Ok(raw)
    }
}

/// Decode every chunk, in input order. The cancel flag is checked before each.
fn decode_chunks(
    job: &ChunkJob<'_>,
    wanted: &[&ChunkLocation],
    options: &DecodeOptions,
) -> Result<Vec<Vec<u8>>> {
    let cancel = options.cancel.as_ref();

    #[cfg(feature = "parallel")]
    {
        if options.parallel && wanted.len() > 1 {
            use rayon::prelude::*;
            return wanted
                .par_iter()
                .map(|location| {
                    CancelToken::check(cancel)?;
                    job.decode_one(location)
                })
                .collect();
        }
    }

    wanted
        .iter()
        .map(|location| {
            CancelToken::check(cancel)?;
            job.decode_one(location)
        })
        .collect()
}

/// Resolves variable-length references, caching parsed collections.
pub(crate) struct HeapReader<'a> {
    data: &'a [u8],
    offset_size: u8,
    length_size: u8,
    collections: HashMap<u64, GlobalHeapCollection>,
}

impl<'a> HeapReader<'a> {
    pub(crate) fn new(data: &'a [u8], offset_size: u8, length_size: u8) -> Self {
        HeapReader {
            data,
            offset_size,
            length_size,
            collections: HashMap::new(),
        }
    }

    fn text(&mut self, element: &[u8]) -> Result<String> {
        let reference = VlReference::parse(element, 0, self.offset_size)?;
        if reference.is_null(self.offset_size) {
            return Ok(String::new());
        }
        if !self.collections.contains_key(&reference.collection) {
            let collection =
                GlobalHeapCollection::parse(self.data, reference.collection, self.length_size)?;
            self.collections.insert(reference.collection, collection);
        }
        let object = match self.collections.get(&reference.collection) {
            Some(c) => c.object(reference.index)?,
            None => return Err(Error::corrupt("global heap collection vanished")),
        };
        let bytes = object.get(..reference.length as usize).ok_or_else(|| {
            Error::corrupt(format!(
                "string of {} bytes in a heap object of {}",
                reference.length,
                object.len()
            ))
        })?;
        utf8(bytes.to_vec())
    }
}

fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::corrupt(format!("text is not valid UTF-8: {e}")))
}

fn fixed_text(field: &[u8], padding: TextPadding) -> Result<String> {
    let end = match padding {
        TextPadding::NullTerminated | TextPadding::NullPadded => {
            field.iter().position(|&b| b == 0).unwrap_or(field.len())
        }
        TextPadding::SpacePadded => field
            .iter()
            .rposition(|&b| b != b' ' && b != 0)
            .map_or(0, |i| i + 1),
    };
    utf8(field[..end].to_vec())
}

macro_rules! decode_as {
    ($raw:expr, $order:expr, $ty:ty, $var:ident, $read:ident) => {{
        let mut out = vec![<$ty>::default(); $raw.len() / std::mem::size_of::<$ty>()];
        match $order {
            Endian::Little => LittleEndian::$read($raw, &mut out),
            Endian::Big => BigEndian::$read($raw, &mut out),
        }
        ArrayData::$var(out)
    }};
}

/// Convert canonical element bytes into a host array of `shape`.
pub(crate) fn array_from_bytes(
    raw: &[u8],
    shape: Vec<u64>,
    element_type: &ElementType,
    element_size: usize,
    heap: &mut HeapReader<'_>,
) -> Result<HostArray> {
    let data = match *element_type {
        ElementType::Int {
            size: 1,
            signed: true,
            ..
        } => ArrayData::I8(raw.iter().map(|&b| b as i8).collect()),
        ElementType::Int {
            size: 1,
            signed: false,
            ..
        } => ArrayData::U8(raw.to_vec()),
        ElementType::Int {
            size: 2,
            signed: true,
            order,
        } => decode_as!(raw, order, i16, I16, read_i16_into),
        ElementType::Int {
            size: 2,
            signed: false,
            order,
        } => decode_as!(raw, order, u16, U16, read_u16_into),
        ElementType::Int {
            size: 4,
            signed: true,
            order,
        } => decode_as!(raw, order, i32, I32, read_i32_into),
        ElementType::Int {
            size: 4,
            signed: false,
            order,
        } => decode_as!(raw, order, u32, U32, read_u32_into),
        ElementType::Int {
            size: 8,
            signed: true,
            order,
        } => decode_as!(raw, order, i64, I64, read_i64_into),
        ElementType::Int {
            size: 8,
            signed: false,
            order,
        } => decode_as!(raw, order, u64, U64, read_u64_into),
        ElementType::Float { size: 4, order } => decode_as!(raw, order, f32, F32, read_f32_into),
        ElementType::Float { size: 8, order } => decode_as!(raw, order, f64, F64, read_f64_into),
        ElementType::FixedString { size, padding, .. } => ArrayData::FixedText {
            width: size,
            values: raw
                .chunks_exact(size.max(1))
                .map(|field| fixed_text(field, padding))
                .collect::<Result<_>>()?,
        },
        ElementType::VarString { .. } => ArrayData::Text(
            raw.chunks_exact(element_size)
                .map(|element| heap.text(element))
                .collect::<Result<_>>()?,
        ),
        other => return Err(Error::UnsupportedType(other.to_string())),
    };
    HostArray::new(shape, data)
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Chunk of an encoded dataset, unfiltered and padded to the full chunk shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Element offset of the chunk origin in each dimension.
    pub origin: Vec<u64>,
    pub bytes: Vec<u8>,
}

/// How the payload of an encoded dataset is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedLayout {
    Contiguous { bytes: Vec<u8> },
    Chunked {
        chunk_shape: Vec<u64>,
        chunks: Vec<EncodedChunk>,
    },
}

/// An array serialized for storage, ready for the writer.
///
/// Variable-length elements hold placeholder references until
/// [`EncodedDataset::place_strings`] points them at a written heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDataset {
    pub shape: Vec<u64>,
    pub element_type: ElementType,
    pub layout: EncodedLayout,
    strings: Vec<Vec<u8>>,
}

impl EncodedDataset {
    pub fn chunk_shape(&self) -> Option<&[u64]> {
        match &self.layout {
            EncodedLayout::Chunked { chunk_shape, .. } => Some(chunk_shape),
            EncodedLayout::Contiguous { .. } => None,
        }
    }

    pub fn chunk_count(&self) -> usize {
        match &self.layout {
            EncodedLayout::Chunked { chunks, .. } => chunks.len(),
            EncodedLayout::Contiguous { .. } => 0,
        }
    }

    /// Text payloads that must go to the global heap, in element order.
    pub fn strings(&self) -> &[Vec<u8>] {
        &self.strings
    }

    /// Replace placeholder references with `references[ordinal]`.
    pub(crate) fn place_strings(&mut self, references: &[VlReference]) -> Result<()> {
        if self.strings.is_empty() {
            return Ok(());
        }
        match &mut self.layout {
            EncodedLayout::Contiguous { bytes } => patch_references(bytes, references),
            EncodedLayout::Chunked { chunks, .. } => chunks
                .iter_mut()
                .try_for_each(|c| patch_references(&mut c.bytes, references)),
        }
    }
}

/// Rewrite every placeholder element in `bytes`. Padding elements hold
/// index 0 and stay null.
pub(crate) fn patch_references(bytes: &mut [u8], references: &[VlReference]) -> Result<()> {
    for element in bytes.chunks_exact_mut(VL_REFERENCE_SIZE) {
        let ordinal = LittleEndian::read_u32(&element[12..]) as usize;
        if ordinal == 0 {
            continue;
        }
        let reference = references
            .get(ordinal - 1)
            .ok_or_else(|| Error::invalid(format!("no heap reference for string {ordinal}")))?;
        element.copy_from_slice(&reference.to_bytes());
    }
    Ok(())
}

/// Serialized elements plus the text payloads VL elements point at.
pub(crate) struct ElementBytes {
    pub bytes: Vec<u8>,
    pub strings: Vec<Vec<u8>>,
}

macro_rules! encode_as {
    ($values:expr, $order:expr, $width:expr, $write:ident) => {{
        let mut out = vec![0u8; $values.len() * $width];
        match $order {
            Endian::Little => LittleEndian::$write($values, &mut out),
            Endian::Big => BigEndian::$write($values, &mut out),
        }
        out
    }};
}

/// Serialize `array` as elements of `target`. The host type of `target` must
/// be exactly the array's element type.
pub(crate) fn array_to_bytes(array: &HostArray, target: &ElementType) -> Result<ElementBytes> {
    let expected = to_host_type(target)?;
    let actual = array.element_type();
    if expected != actual {
        return Err(Error::TypeMismatch {
            expected: format!("{expected} for {target}"),
            actual: actual.to_string(),
        });
    }
    let mut strings = Vec::new();
    let bytes = match (array.data(), *target) {
        (ArrayData::I8(v), _) => v.iter().map(|&x| x as u8).collect(),
        (ArrayData::U8(v), _) => v.clone(),
        (ArrayData::I16(v), ElementType::Int { order, .. }) => encode_as!(v, order, 2, write_i16_into),
        (ArrayData::U16(v), ElementType::Int { order, .. }) => encode_as!(v, order, 2, write_u16_into),
        (ArrayData::I32(v), ElementType::Int { order, .. }) => encode_as!(v, order, 4, write_i32_into),
        (ArrayData::U32(v), ElementType::Int { order, .. }) => encode_as!(v, order, 4, write_u32_into),
        (ArrayData::I64(v), ElementType::Int { order, .. }) => encode_as!(v, order, 8, write_i64_into),
        (ArrayData::U64(v), ElementType::Int { order, .. }) => encode_as!(v, order, 8, write_u64_into),
        (ArrayData::F32(v), ElementType::Float { order, .. }) => encode_as!(v, order, 4, write_f32_into),
        (ArrayData::F64(v), ElementType::Float { order, .. }) => encode_as!(v, order, 8, write_f64_into),
        (ArrayData::FixedText { values, .. }, ElementType::FixedString { size, padding, .. }) => {
            let pad = if padding == TextPadding::SpacePadded { b' ' } else { 0 };
            let mut out = Vec::with_capacity(values.len() * size);
            for value in values {
                if value.len() > size {
                    return Err(Error::TypeMismatch {
                        expected: format!("text of at most {size} bytes"),
                        actual: format!("{}-byte value", value.len()),
                    });
                }
                out.extend_from_slice(value.as_bytes());
                out.resize(out.len() + size - value.len(), pad);
            }
            out
        }
        (ArrayData::Text(values), ElementType::VarString { .. }) => {
            let mut out = Vec::with_capacity(values.len() * VL_REFERENCE_SIZE);
            for (i, value) in values.iter().enumerate() {
                let length = u32::try_from(value.len())
                    .map_err(|_| Error::invalid("text value longer than 4 GiB"))?;
                // collection 0 keeps the element null until the heap is placed
                let placeholder = VlReference {
                    length,
                    collection: 0,
                    index: (i + 1) as u32,
                };
                out.extend_from_slice(&placeholder.to_bytes());
                strings.push(value.as_bytes().to_vec());
            }
            out
        }
        (_, other) => {
            return Err(Error::TypeMismatch {
                expected: other.to_string(),
                actual: actual.to_string(),
            })
        }
    };
    Ok(ElementBytes { bytes, strings })
}

/// Resolve the chunk shape for a dataset of `shape`; `None` means contiguous.
pub(crate) fn resolve_chunk_shape(
    shape: &[u64],
    element_size: usize,
    policy: &ChunkingPolicy,
) -> Result<Option<Vec<u64>>> {
    if shape.is_empty() || shape.contains(&0) {
        return Ok(None);
    }
    let bytes = |chunk: &[u64]| {
        chunk
            .iter()
            .fold(element_size as u64, |acc, &d| acc.saturating_mul(d))
    };
    match policy {
        ChunkingPolicy::Contiguous => Ok(None),
        ChunkingPolicy::Auto => {
            let mut chunk = shape.to_vec();
            for d in 0..chunk.len() {
                while bytes(&chunk) > MAX_CHUNK_BYTES && chunk[d] > 1 {
                    chunk[d] = chunk[d].div_ceil(2);
                }
            }
            if bytes(&chunk) > MAX_CHUNK_BYTES {
                return Err(Error::invalid(format!(
                    "a single {element_size}-byte element exceeds the chunk limit"
                )));
            }
            Ok(Some(chunk))
        }
        ChunkingPolicy::Shape(chunk) => {
            if chunk.len() != shape.len() {
                return Err(Error::invalid(format!(
                    "chunk shape {chunk:?} does not match rank {} of {shape:?}",
                    shape.len()
                )));
            }
            if let Some(d) = (0..shape.len()).find(|&d| chunk[d] == 0 || chunk[d] > shape[d]) {
                return Err(Error::invalid(format!(
                    "chunk extent {} outside 1..={} in dimension {d}",
                    chunk[d], shape[d]
                )));
            }
            if bytes(chunk) > MAX_CHUNK_BYTES {
                return Err(Error::invalid(format!(
                    "chunk shape {chunk:?} holds {} bytes, limit is {MAX_CHUNK_BYTES}",
                    bytes(chunk)
                )));
            }
            Ok(Some(chunk.clone()))
        }
    }
}

/// Encode `array` as `target` elements laid out per `policy`.
pub fn encode(array: &HostArray, target: &ElementType, policy: &ChunkingPolicy) -> Result<EncodedDataset> {
    encode_with(array, target, policy, None)
}

/// [`encode`] that polls `cancel` before each chunk.
pub fn encode_with(
    array: &HostArray,
    target: &ElementType,
    policy: &ChunkingPolicy,
    cancel: Option<&CancelToken>,
) -> Result<EncodedDataset> {
    let ElementBytes { bytes, strings } = array_to_bytes(array, target)?;
    let shape = array.shape().to_vec();
    let element_size = target.size();

    let layout = match resolve_chunk_shape(&shape, element_size, policy)? {
        None => {
            CancelToken::check(cancel)?;
            EncodedLayout::Contiguous { bytes }
        }
        Some(chunk_shape) => {
            let geometry = ChunkGeometry {
                dims: &shape,
                grid_dims: &shape,
                chunk_dims: &chunk_shape,
                element_size: element_size as u64,
            };
            let chunk_bytes = geometry.chunk_bytes()? as usize;
            let slots = geometry.slot_count()?;
            let whole = vec![0u64; shape.len()];
            let mut chunks = Vec::with_capacity(slots as usize);
            for i in 0..slots {
                CancelToken::check(cancel)?;
                let origin = geometry.origin_of(i);
                // ragged edges stay zero
                let mut chunk = vec![0u8; chunk_bytes];
                copy_overlap(
                    &bytes,
                    Block {
                        origin: &whole,
                        shape: &shape,
                    },
                    &mut chunk,
                    Block {
                        origin: &origin,
                        shape: &chunk_shape,
                    },
                    element_size,
                );
                trace!(?origin, "chunk encoded");
                chunks.push(EncodedChunk {
                    origin,
                    bytes: chunk,
                });
            }
            debug!(shape = ?shape, chunk = ?chunk_shape, count = chunks.len(), "array encoded");
            EncodedLayout::Chunked {
                chunk_shape,
                chunks,
            }
        }
    };
    Ok(EncodedDataset {
        shape,
        element_type: *target,
        layout,
        strings,
    })
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Decode an attribute value, resolving text through the global heap.
pub(crate) fn decode_attribute(
    attribute: &AttributeMessage,
    heap: &mut HeapReader<'_>,
) -> Result<HostArray> {
    let element_type = classify(&attribute.datatype)?;
    let count = attribute.dataspace.num_elements() as usize;
    let element_size = match element_type {
        ElementType::VarString { .. } => stored_size(&element_type, heap.offset_size),
        other => other.size(),
    };
    let raw = attribute
        .raw_data
        .get(..count * element_size)
        .ok_or_else(|| Error::corrupt(format!("attribute {} is truncated", attribute.name)))?;
    array_from_bytes(
        raw,
        attribute.dataspace.dimensions.clone(),
        &element_type,
        element_size,
        heap,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{from_host_type, HostElementType, TextEncoding};

    fn f64_type() -> ElementType {
        from_host_type(HostElementType::F64).unwrap()
    }

    #[test]
    fn auto_policy_is_one_chunk_when_it_fits() {
        let shape = resolve_chunk_shape(&[1000], 8, &ChunkingPolicy::Auto).unwrap();
        assert_eq!(shape, Some(vec![1000]));
    }

    #[test]
    fn auto_policy_halves_leading_dimension() {
        // 512 x 512 x 8 bytes is 2 MiB
        let shape = resolve_chunk_shape(&[512, 512], 8, &ChunkingPolicy::Auto).unwrap();
        assert_eq!(shape, Some(vec![256, 512]));
        let tall = resolve_chunk_shape(&[1 << 20, 2], 8, &ChunkingPolicy::Auto)
            .unwrap()
            .unwrap();
        assert!(tall[0] * tall[1] * 8 <= MAX_CHUNK_BYTES);
    }

    #[test]
    fn explicit_shapes_are_validated() {
        let ok = ChunkingPolicy::Shape(vec![3, 4]);
        assert_eq!(resolve_chunk_shape(&[10, 4], 4, &ok).unwrap(), Some(vec![3, 4]));
        for bad in [vec![3], vec![0, 4], vec![11, 4], vec![3, 5]] {
            let err = resolve_chunk_shape(&[10, 4], 4, &ChunkingPolicy::Shape(bad)).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
        let big = ChunkingPolicy::Shape(vec![1 << 18]);
        assert!(resolve_chunk_shape(&[1 << 18], 8, &big).is_err());
    }

    #[test]
    fn scalars_and_empty_arrays_are_contiguous() {
        assert_eq!(resolve_chunk_shape(&[], 8, &ChunkingPolicy::Auto).unwrap(), None);
        assert_eq!(resolve_chunk_shape(&[0, 3], 8, &ChunkingPolicy::Auto).unwrap(), None);
    }

    #[test]
    fn ragged_chunks_are_zero_padded() {
        let array = HostArray::from((1..=10).map(f64::from).collect::<Vec<_>>());
        let encoded = encode(&array, &f64_type(), &ChunkingPolicy::Shape(vec![4])).unwrap();
        let EncodedLayout::Chunked { chunks, .. } = &encoded.layout else {
            panic!("expected chunks");
        };
        let origins: Vec<u64> = chunks.iter().map(|c| c.origin[0]).collect();
        assert_eq!(origins, vec![0, 4, 8]);
        let last = &chunks[2].bytes;
        assert_eq!(last.len(), 32);
        assert_eq!(LittleEndian::read_f64(&last[8..16]), 10.0);
        assert!(last[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn mismatched_target_is_rejected() {
        let array = HostArray::from(vec![1i32, 2]);
        let err = encode(&array, &f64_type(), &ChunkingPolicy::Auto).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn fixed_text_wider_than_field_is_rejected() {
        let target = ElementType::FixedString {
            size: 4,
            encoding: TextEncoding::Utf8,
            padding: TextPadding::NullPadded,
        };
        let array = HostArray::from_data(ArrayData::FixedText {
            width: 4,
            values: vec!["ok".into(), "too long".into()],
        })
        .unwrap();
        let err = encode(&array, &target, &ChunkingPolicy::Contiguous).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn big_endian_bytes_decode() {
        let target = ElementType::Int {
            size: 4,
            signed: true,
            order: Endian::Big,
        };
        let array = HostArray::from(vec![1i32, -2]);
        let bytes = array_to_bytes(&array, &target).unwrap().bytes;
        assert_eq!(&bytes[..4], &[0, 0, 0, 1]);
        let mut heap = HeapReader::new(&[], 8, 8);
        let back = array_from_bytes(&bytes, vec![2], &target, 4, &mut heap).unwrap();
        assert_eq!(back, array);
    }

    #[test]
    fn fixed_text_padding_is_stripped() {
        assert_eq!(fixed_text(b"ab\0\0", TextPadding::NullPadded).unwrap(), "ab");
        assert_eq!(fixed_text(b"ab  ", TextPadding::SpacePadded).unwrap(), "ab");
        assert_eq!(fixed_text(b"abcd", TextPadding::NullTerminated).unwrap(), "abcd");
    }

    #[test]
    fn placeholders_are_patched_in_order() {
        let array = HostArray::from(vec!["a".to_string(), "bcd".to_string()]);
        let target = ElementType::VarString {
            encoding: TextEncoding::Utf8,
        };
        let mut encoded = encode(&array, &target, &ChunkingPolicy::Contiguous).unwrap();
        assert_eq!(encoded.strings(), &[b"a".to_vec(), b"bcd".to_vec()]);
        let refs = [
            VlReference {
                length: 1,
                collection: 4096,
                index: 1,
            },
            VlReference {
                length: 3,
                collection: 4096,
                index: 2,
            },
        ];
        encoded.place_strings(&refs).unwrap();
        let EncodedLayout::Contiguous { bytes } = &encoded.layout else {
            panic!("expected contiguous");
        };
        assert_eq!(&bytes[..16], &refs[0].to_bytes());
        assert_eq!(&bytes[16..], &refs[1].to_bytes());
    }

    #[test]
    fn cancelled_encode_returns_nothing() {
        let token = CancelToken::new();
        token.cancel();
        let array = HostArray::from(vec![0u8; 64]);
        let target = from_host_type(HostElementType::U8).unwrap();
        let err = encode_with(&array, &target, &ChunkingPolicy::Shape(vec![8]), Some(&token))
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
