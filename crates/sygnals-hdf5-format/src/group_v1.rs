//! Old-style groups: symbol table message (0x0011), local heap (`HEAP`)
//! and symbol table nodes (`SNOD`).

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use crate::btree_v1::collect_group_nodes;
use crate::bytes::{ensure_len, read_u16, read_u32, read_uint};
use crate::error::FormatError;

/// Symbol table message: where the group's B-tree and name heap live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTable {
    pub btree_address: u64,
    pub heap_address: u64,
}

impl SymbolTable {
    pub fn parse(data: &[u8], offset_size: u8) -> Result<SymbolTable, FormatError> {
        Ok(SymbolTable {
            btree_address: read_uint(data, 0, offset_size)?,
            heap_address: read_uint(data, offset_size as usize, offset_size)?,
        })
    }
}

/// Local heap header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalHeap {
    pub data_size: u64,
    pub data_address: u64,
}

impl LocalHeap {
    pub fn parse(
        data: &[u8],
        address: u64,
        offset_size: u8,
        length_size: u8,
    ) -> Result<LocalHeap, FormatError> {
        let pos = checked_offset(data, address)?;
        let ls = length_size as usize;
        ensure_len(data, pos, 8 + 2 * ls + offset_size as usize)?;
        if &data[pos..pos + 4] != b"HEAP" {
            return Err(FormatError::InvalidLocalHeapSignature);
        }
        Ok(LocalHeap {
            data_size: read_uint(data, pos + 8, length_size)?,
            data_address: read_uint(data, pos + 8 + 2 * ls, offset_size)?,
        })
    }

    /// NUL-terminated string at `offset` within the heap's data segment.
    pub fn string_at(&self, data: &[u8], offset: u64) -> Result<String, FormatError> {
        if offset >= self.data_size {
            return Err(FormatError::InvalidAddress(self.data_address.saturating_add(offset)));
        }
        let start = checked_offset(data, self.data_address.saturating_add(offset))?;
        let segment_end = self
            .data_address
            .saturating_add(self.data_size)
            .min(data.len() as u64) as usize;
        let end = data[start..segment_end]
            .iter()
            .position(|&b| b == 0)
            .map_or(segment_end, |n| start + n);
        Ok(String::from_utf8_lossy(&data[start..end]).into_owned())
    }
}

/// One entry of an old-style group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    pub object_header_address: u64,
}

/// All entries of the group described by `table`, in name order.
pub fn read_entries(
    data: &[u8],
    table: &SymbolTable,
    offset_size: u8,
    length_size: u8,
) -> Result<Vec<SymbolEntry>, FormatError> {
    let heap = LocalHeap::parse(data, table.heap_address, offset_size, length_size)?;
    let os = offset_size as usize;
    // name offset, header address, cache type, reserved, scratch pad
    let entry_size = 2 * os + 4 + 4 + 16;

    let mut entries = Vec::new();
    for node in collect_group_nodes(data, table.btree_address, offset_size, length_size)? {
        let pos = checked_offset(data, node)?;
        ensure_len(data, pos, 8)?;
        if &data[pos..pos + 4] != b"SNOD" {
            return Err(FormatError::InvalidSymbolTableNodeSignature);
        }
        let count = read_u16(data, pos + 6)? as usize;
        ensure_len(data, pos + 8, count * entry_size)?;
        for i in 0..count {
            let e = pos + 8 + i * entry_size;
            let name_offset = read_uint(data, e, offset_size)?;
            let object_header_address = read_uint(data, e + os, offset_size)?;
            // cache type is informational only
            let _cache_type = read_u32(data, e + 2 * os)?;
            entries.push(SymbolEntry {
                name: heap.string_at(data, name_offset)?,
                object_header_address,
            });
        }
    }
    Ok(entries)
}

fn checked_offset(data: &[u8], address: u64) -> Result<usize, FormatError> {
    match usize::try_from(address) {
        Ok(pos) if pos < data.len() => Ok(pos),
        _ => Err(FormatError::InvalidAddress(address)),
    }
}
