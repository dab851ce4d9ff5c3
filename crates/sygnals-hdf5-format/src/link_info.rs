//! Link info (0x0002) and group info (0x000A) messages of new-style groups.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::bytes::{ensure_len, read_address, read_uint, UNDEFINED_ADDRESS};
use crate::error::FormatError;

/// Parsed link info message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkInfo {
    /// Highest creation order index, when creation order is tracked.
    pub max_creation_order: Option<u64>,
    /// Fractal heap holding dense links; `None` for compact groups.
    pub fractal_heap_address: Option<u64>,
    /// Name index B-tree for dense links.
    pub name_index_address: Option<u64>,
    /// Creation order index B-tree, when indexed.
    pub creation_order_index_address: Option<u64>,
}

impl LinkInfo {
    /// Parse a version 0 link info message.
    pub fn parse(data: &[u8], offset_size: u8) -> Result<LinkInfo, FormatError> {
        ensure_len(data, 0, 2)?;
        if data[0] != 0 {
            return Err(FormatError::InvalidLinkInfoVersion(data[0]));
        }
        let flags = data[1];
        let os = offset_size as usize;
        let mut pos = 2;
        let max_creation_order = if flags & 0x01 != 0 {
            pos += 8;
            Some(read_uint(data, pos - 8, 8)?)
        } else {
            None
        };
        let fractal_heap_address = read_address(data, pos, offset_size)?;
        let name_index_address = read_address(data, pos + os, offset_size)?;
        pos += 2 * os;
        let creation_order_index_address = if flags & 0x02 != 0 {
            read_address(data, pos, offset_size)?
        } else {
            None
        };
        Ok(LinkInfo {
            max_creation_order,
            fractal_heap_address,
            name_index_address,
            creation_order_index_address,
        })
    }

    /// True if links live in a fractal heap rather than in link messages.
    pub fn is_dense(&self) -> bool {
        self.fractal_heap_address.is_some()
    }

    /// Serialize a compact-storage link info message with 8-byte addresses.
    pub fn serialize_compact() -> Vec<u8> {
        let mut buf = vec![0u8, 0];
        buf.extend_from_slice(&UNDEFINED_ADDRESS.to_le_bytes());
        buf.extend_from_slice(&UNDEFINED_ADDRESS.to_le_bytes());
        buf
    }
}

/// Group info message with every optional field left at its default.
pub fn serialize_default_group_info() -> Vec<u8> {
    vec![0u8, 0]
}
