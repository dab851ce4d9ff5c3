//! Resolve a chunked layout's index into a flat list of chunk locations.

#[cfg(not(feature = "std"))]
use alloc::{format, vec, vec::Vec};

use crate::btree_v1::collect_chunks;
use crate::data_layout::ChunkIndex;
use crate::error::FormatError;
use crate::fixed_array;

/// Where one allocated chunk lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLocation {
    /// Element offset of the chunk origin in each dimension.
    pub origin: Vec<u64>,
    /// File address of the stored bytes.
    pub address: u64,
    /// Stored byte count (after filtering).
    pub size: u64,
    /// Filters skipped for this chunk.
    pub filter_mask: u32,
}

/// Geometry needed to interpret an index.
#[derive(Debug, Clone, Copy)]
pub struct ChunkGeometry<'a> {
    /// Current dataset extent.
    pub dims: &'a [u64],
    /// Extent used to linearise chunk positions: maximum dims when they
    /// are fixed, current dims otherwise.
    pub grid_dims: &'a [u64],
    pub chunk_dims: &'a [u64],
    pub element_size: u64,
}

impl ChunkGeometry<'_> {
    /// Unfiltered byte size of one full chunk.
    pub fn chunk_bytes(&self) -> Result<u64, FormatError> {
        self.chunk_dims
            .iter()
            .try_fold(self.element_size, |acc, &c| acc.checked_mul(c))
            .ok_or_else(|| {
                FormatError::InconsistentChunkLayout(format!(
                    "chunk of {:?} elements overflows its byte size",
                    self.chunk_dims
                ))
            })
    }

    fn chunks_per_dim(&self) -> Vec<u64> {
        self.grid_dims
            .iter()
            .zip(self.chunk_dims)
            .map(|(&d, &c)| d.div_ceil(c))
            .collect()
    }

    /// Number of chunk slots in the linearisation grid.
    pub fn slot_count(&self) -> Result<u64, FormatError> {
        if self.chunk_dims.contains(&0) {
            return Err(FormatError::InconsistentChunkLayout("zero chunk dimension".into()));
        }
        self.chunks_per_dim()
            .iter()
            .try_fold(1u64, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| FormatError::InconsistentChunkLayout("chunk grid overflows".into()))
    }

    /// Origin of the chunk at row-major slot `index`.
    pub fn origin_of(&self, index: u64) -> Vec<u64> {
        let per_dim = self.chunks_per_dim();
        let mut origin = vec![0u64; per_dim.len()];
        let mut rest = index;
        for d in (0..per_dim.len()).rev() {
            origin[d] = (rest % per_dim[d]) * self.chunk_dims[d];
            rest /= per_dim[d];
        }
        origin
    }

    fn in_extent(&self, origin: &[u64]) -> bool {
        origin.iter().zip(self.dims).all(|(&o, &d)| o < d)
    }
}

/// List the allocated chunks of a dataset. Chunks never written are absent.
pub fn locate_chunks(
    data: &[u8],
    index: &ChunkIndex,
    geometry: &ChunkGeometry<'_>,
    offset_size: u8,
    length_size: u8,
    verify_checksums: bool,
) -> Result<Vec<ChunkLocation>, FormatError> {
    if geometry.dims.iter().any(|&d| d == 0) {
        return Ok(Vec::new());
    }
    let chunk_bytes = geometry.chunk_bytes()?;
    let slots = geometry.slot_count()?;
    match index {
        ChunkIndex::Single { address, filtered } => Ok(address
            .map(|address| {
                let (size, filter_mask) = filtered.unwrap_or((chunk_bytes, 0));
                vec![ChunkLocation {
                    origin: vec![0; geometry.dims.len()],
                    address,
                    size,
                    filter_mask,
                }]
            })
            .unwrap_or_default()),
        ChunkIndex::Implicit { address } => {
            let Some(base) = *address else {
                return Ok(Vec::new());
            };
            let mut out = Vec::new();
            for i in 0..slots {
                let origin = geometry.origin_of(i);
                if geometry.in_extent(&origin) {
                    let address = i
                        .checked_mul(chunk_bytes)
                        .and_then(|offset| base.checked_add(offset))
                        .ok_or(FormatError::InvalidAddress(base))?;
                    out.push(ChunkLocation {
                        origin,
                        address,
                        size: chunk_bytes,
                        filter_mask: 0,
                    });
                }
            }
            Ok(out)
        }
        ChunkIndex::FixedArray { address, .. } => {
            let Some(header) = *address else {
                return Ok(Vec::new());
            };
            let entries = fixed_array::read_entries(
                data,
                header,
                slots,
                offset_size,
                length_size,
                verify_checksums,
            )?;
            let mut out = Vec::new();
            for (i, entry) in entries.into_iter().enumerate() {
                let Some(entry) = entry else { continue };
                let origin = geometry.origin_of(i as u64);
                if !geometry.in_extent(&origin) {
                    continue;
                }
                out.push(ChunkLocation {
                    origin,
                    address: entry.address,
                    // unfiltered arrays carry no size; a stored chunk is never empty
                    size: if entry.size == 0 { chunk_bytes } else { entry.size },
                    filter_mask: entry.filter_mask,
                });
            }
            Ok(out)
        }
        ChunkIndex::BTreeV1 { address } => {
            let Some(root) = *address else {
                return Ok(Vec::new());
            };
            let records = collect_chunks(data, root, offset_size, geometry.dims.len())?;
            let mut out = Vec::with_capacity(records.len());
            for r in records {
                if r.offsets.iter().zip(geometry.chunk_dims).any(|(&o, &c)| o % c != 0) {
                    return Err(FormatError::InconsistentChunkLayout(
                        "chunk origin not on a chunk boundary".into(),
                    ));
                }
                if geometry.in_extent(&r.offsets) {
                    out.push(ChunkLocation {
                        origin: r.offsets,
                        address: r.address,
                        size: r.size as u64,
                        filter_mask: r.filter_mask,
                    });
                }
            }
            Ok(out)
        }
        other => Err(FormatError::UnsupportedChunkIndex(other.type_id())),
    }
}
