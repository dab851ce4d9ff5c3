//! Data layout message (0x0008): versions 3 and 4.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::bytes::{bytes_needed, ensure_len, read_address, read_u16, read_u32, read_uint, read_var_uint, write_uint, UNDEFINED_ADDRESS};
use crate::error::FormatError;

/// v4 chunked flag: the single-chunk index stores filter information.
pub const SINGLE_INDEX_WITH_FILTER: u8 = 0x02;

/// How the chunks of a chunked dataset are located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkIndex {
    /// Version 1 B-tree (layout v3, or v4 index type 6).
    BTreeV1 { address: Option<u64> },
    /// One chunk covering the whole dataset.
    Single {
        address: Option<u64>,
        /// Stored size and filter mask, present when the chunk is filtered.
        filtered: Option<(u64, u32)>,
    },
    /// Unfiltered, fully allocated chunks laid out back to back.
    Implicit { address: Option<u64> },
    /// Fixed array index (FAHD/FADB).
    FixedArray { address: Option<u64>, page_bits: u8 },
    /// Extensible array index; recognised but not readable here.
    ExtensibleArray { address: Option<u64> },
    /// Version 2 B-tree index; recognised but not readable here.
    BTreeV2 { address: Option<u64> },
}

impl ChunkIndex {
    /// Numeric index type as used by the v4 message.
    pub fn type_id(&self) -> u8 {
        match self {
            ChunkIndex::Single { .. } => 1,
            ChunkIndex::Implicit { .. } => 2,
            ChunkIndex::FixedArray { .. } => 3,
            ChunkIndex::ExtensibleArray { .. } => 4,
            ChunkIndex::BTreeV2 { .. } => 5,
            ChunkIndex::BTreeV1 { .. } => 6,
        }
    }
}

/// Parsed data layout message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLayout {
    /// Data stored inline in the message.
    Compact { data: Vec<u8> },
    /// Data stored at a single address; `None` when never allocated.
    Contiguous { address: Option<u64>, size: u64 },
    /// Data split into equally sized chunks.
    Chunked {
        /// Chunk extent per dataset dimension (element size excluded).
        chunk_dims: Vec<u64>,
        /// Element size recorded as the trailing chunk dimension.
        element_size: u32,
        /// v4 layout flags (0 for v3).
        flags: u8,
        /// Chunk index.
        index: ChunkIndex,
    },
    /// Virtual dataset (class 3).
    Virtual,
}

impl DataLayout {
    /// Parse a layout message. `offset_size`/`length_size` come from the superblock.
    pub fn parse(data: &[u8], offset_size: u8, length_size: u8) -> Result<DataLayout, FormatError> {
        ensure_len(data, 0, 2)?;
        let version = data[0];
        if !matches!(version, 3 | 4) {
            return Err(FormatError::InvalidLayoutVersion(version));
        }
        let class = data[1];
        let pos = 2;
        match class {
            0 => {
                let size = read_u16(data, pos)? as usize;
                ensure_len(data, pos + 2, size)?;
                Ok(DataLayout::Compact {
                    data: data[pos + 2..pos + 2 + size].to_vec(),
                })
            }
            1 => {
                let address = read_address(data, pos, offset_size)?;
                let size = read_uint(data, pos + offset_size as usize, length_size)?;
                Ok(DataLayout::Contiguous { address, size })
            }
            2 if version == 3 => Self::parse_chunked_v3(data, offset_size),
            2 => Self::parse_chunked_v4(data, offset_size, length_size),
            3 if version == 4 => Ok(DataLayout::Virtual),
            other => Err(FormatError::InvalidLayoutClass(other)),
        }
    }

    fn parse_chunked_v3(data: &[u8], offset_size: u8) -> Result<DataLayout, FormatError> {
        ensure_len(data, 2, 1)?;
        let ndims = data[2] as usize;
        let mut pos = 3;
        let address = read_address(data, pos, offset_size)?;
        pos += offset_size as usize;
        let mut dims = Vec::with_capacity(ndims);
        for _ in 0..ndims {
            dims.push(read_u32(data, pos)? as u64);
            pos += 4;
        }
        let (chunk_dims, element_size) = split_element_dim(dims)?;
        Ok(DataLayout::Chunked {
            chunk_dims,
            element_size,
            flags: 0,
            index: ChunkIndex::BTreeV1 { address },
        })
    }

    fn parse_chunked_v4(
        data: &[u8],
        offset_size: u8,
        length_size: u8,
    ) -> Result<DataLayout, FormatError> {
        ensure_len(data, 2, 3)?;
        let flags = data[2];
        let ndims = data[3] as usize;
        let width = data[4] as usize;
        if !(1..=8).contains(&width) {
            return Err(FormatError::InconsistentChunkLayout(
                "chunk dimension width must be 1 to 8 bytes".into(),
            ));
        }
        let mut pos = 5;
        let mut dims = Vec::with_capacity(ndims);
        for _ in 0..ndims {
            dims.push(read_var_uint(data, pos, width)?);
            pos += width;
        }
        let (chunk_dims, element_size) = split_element_dim(dims)?;

        ensure_len(data, pos, 1)?;
        let index_type = data[pos];
        pos += 1;
        let os = offset_size as usize;
        let index = match index_type {
            1 => {
                let filtered = if flags & SINGLE_INDEX_WITH_FILTER != 0 {
                    let size = read_uint(data, pos, length_size)?;
                    let mask = read_u32(data, pos + length_size as usize)?;
                    pos += length_size as usize + 4;
                    Some((size, mask))
                } else {
                    None
                };
                ChunkIndex::Single {
                    address: read_address(data, pos, offset_size)?,
                    filtered,
                }
            }
            2 => ChunkIndex::Implicit {
                address: read_address(data, pos, offset_size)?,
            },
            3 => {
                ensure_len(data, pos, 1 + os)?;
                ChunkIndex::FixedArray {
                    page_bits: data[pos],
                    address: read_address(data, pos + 1, offset_size)?,
                }
            }
            // max bits, index elements, min pointers, min elements, page bits
            4 => ChunkIndex::ExtensibleArray {
                address: read_address(data, pos + 5, offset_size)?,
            },
            // node size(4), split percent, merge percent
            5 => ChunkIndex::BTreeV2 {
                address: read_address(data, pos + 6, offset_size)?,
            },
            other => return Err(FormatError::UnsupportedChunkIndex(other)),
        };
        Ok(DataLayout::Chunked {
            chunk_dims,
            element_size,
            flags,
            index,
        })
    }

    /// Serialize as a version 4 layout message with 8-byte addresses and lengths.
    ///
    /// Only the index kinds this crate writes are accepted: single chunk and
    /// fixed array. Other chunk indexes yield `UnsupportedChunkIndex`.
    pub fn serialize_v4(&self) -> Result<Vec<u8>, FormatError> {
        let mut buf = vec![4u8];
        match self {
            DataLayout::Compact { data } => {
                let size = u16::try_from(data.len())
                    .map_err(|_| FormatError::MessageTooLarge(data.len()))?;
                buf.push(0);
                buf.extend_from_slice(&size.to_le_bytes());
                buf.extend_from_slice(data);
            }
            DataLayout::Contiguous { address, size } => {
                buf.push(1);
                buf.extend_from_slice(&address.unwrap_or(UNDEFINED_ADDRESS).to_le_bytes());
                buf.extend_from_slice(&size.to_le_bytes());
            }
            DataLayout::Chunked {
                chunk_dims,
                element_size,
                flags,
                index,
            } => {
                buf.push(2);
                buf.push(*flags);
                buf.push((chunk_dims.len() + 1) as u8);
                let largest = chunk_dims
                    .iter()
                    .copied()
                    .chain(core::iter::once(*element_size as u64))
                    .max()
                    .unwrap_or(1);
                let width = bytes_needed(largest);
                buf.push(width as u8);
                for &d in chunk_dims {
                    write_uint(&mut buf, d, width);
                }
                write_uint(&mut buf, *element_size as u64, width);
                buf.push(index.type_id());
                match index {
                    ChunkIndex::Single { address, filtered } => {
                        if let Some((size, mask)) = filtered {
                            buf.extend_from_slice(&size.to_le_bytes());
                            buf.extend_from_slice(&mask.to_le_bytes());
                        }
                        buf.extend_from_slice(&address.unwrap_or(UNDEFINED_ADDRESS).to_le_bytes());
                    }
                    ChunkIndex::FixedArray { address, page_bits } => {
                        buf.push(*page_bits);
                        buf.extend_from_slice(&address.unwrap_or(UNDEFINED_ADDRESS).to_le_bytes());
                    }
                    other => return Err(FormatError::UnsupportedChunkIndex(other.type_id())),
                }
            }
            DataLayout::Virtual => return Err(FormatError::UnsupportedLayout(3)),
        }
        Ok(buf)
    }
}

/// Split the raw chunk dimensions into dataset dims and the trailing element size.
fn split_element_dim(mut dims: Vec<u64>) -> Result<(Vec<u64>, u32), FormatError> {
    let element_size = dims.pop().ok_or_else(|| {
        FormatError::InconsistentChunkLayout("chunked layout without dimensions".into())
    })?;
    let element_size = u32::try_from(element_size).map_err(|_| {
        FormatError::InconsistentChunkLayout("element size does not fit 32 bits".into())
    })?;
    if dims.iter().any(|&d| d == 0) {
        return Err(FormatError::InconsistentChunkLayout(
            "chunk dimension of zero".into(),
        ));
    }
    Ok((dims, element_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_compact_and_contiguous() {
        let mut buf = vec![3u8, 0];
        buf.extend_from_slice(&3u16.to_le_bytes());
        buf.extend_from_slice(&[1, 2, 3]);
        assert_eq!(
            DataLayout::parse(&buf, 8, 8).unwrap(),
            DataLayout::Compact { data: vec![1, 2, 3] }
        );

        let mut buf = vec![3u8, 1];
        buf.extend_from_slice(&[0xFF; 8]);
        buf.extend_from_slice(&0u64.to_le_bytes());
        assert_eq!(
            DataLayout::parse(&buf, 8, 8).unwrap(),
            DataLayout::Contiguous {
                address: None,
                size: 0
            }
        );
    }

    #[test]
    fn v3_chunked_btree() {
        let mut buf = vec![3u8, 2, 3];
        buf.extend_from_slice(&0x800u64.to_le_bytes());
        for d in [10u32, 20, 8] {
            buf.extend_from_slice(&d.to_le_bytes());
        }
        assert_eq!(
            DataLayout::parse(&buf, 8, 8).unwrap(),
            DataLayout::Chunked {
                chunk_dims: vec![10, 20],
                element_size: 8,
                flags: 0,
                index: ChunkIndex::BTreeV1 {
                    address: Some(0x800)
                },
            }
        );
    }

    #[test]
    fn v4_roundtrips() {
        let layouts = [
            DataLayout::Contiguous {
                address: Some(4096),
                size: 800,
            },
            DataLayout::Compact { data: vec![7; 16] },
            DataLayout::Chunked {
                chunk_dims: vec![100],
                element_size: 8,
                flags: 0,
                index: ChunkIndex::Single {
                    address: Some(512),
                    filtered: None,
                },
            },
            DataLayout::Chunked {
                chunk_dims: vec![4, 300],
                element_size: 4,
                flags: SINGLE_INDEX_WITH_FILTER,
                index: ChunkIndex::Single {
                    address: Some(512),
                    filtered: Some((77, 0)),
                },
            },
            DataLayout::Chunked {
                chunk_dims: vec![16, 16],
                element_size: 2,
                flags: 0,
                index: ChunkIndex::FixedArray {
                    address: Some(1000),
                    page_bits: 10,
                },
            },
        ];
        for layout in layouts {
            let bytes = layout.serialize_v4().unwrap();
            assert_eq!(DataLayout::parse(&bytes, 8, 8).unwrap(), layout);
        }
    }

    #[test]
    fn v4_extensible_array_is_recognised() {
        let mut buf = vec![4u8, 2, 0, 2, 1, 10, 8, 4, 32, 4, 4, 4, 10];
        buf.extend_from_slice(&0x400u64.to_le_bytes());
        match DataLayout::parse(&buf, 8, 8).unwrap() {
            DataLayout::Chunked { index, .. } => assert_eq!(
                index,
                ChunkIndex::ExtensibleArray {
                    address: Some(0x400)
                }
            ),
            other => panic!("unexpected layout {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_chunk_dim_and_old_versions() {
        let mut buf = vec![3u8, 2, 2];
        buf.extend_from_slice(&0x800u64.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&8u32.to_le_bytes());
        assert!(matches!(
            DataLayout::parse(&buf, 8, 8),
            Err(FormatError::InconsistentChunkLayout(_))
        ));
        assert_eq!(
            DataLayout::parse(&[2, 1], 8, 8),
            Err(FormatError::InvalidLayoutVersion(2))
        );
    }
}
