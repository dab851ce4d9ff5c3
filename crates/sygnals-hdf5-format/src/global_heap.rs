//! Global heap collections (`GCOL`) and the variable-length references into them.

#[cfg(not(feature = "std"))]
use alloc::{collections::BTreeMap, vec::Vec};
#[cfg(feature = "std")]
use std::collections::BTreeMap;

use crate::bytes::{ensure_len, is_undefined, pad8, read_u16, read_u32, read_uint};
use crate::error::FormatError;

/// Smallest collection libhdf5 creates; collections are padded up to it.
pub const MIN_COLLECTION_SIZE: usize = 4096;

/// Highest object index a collection can hold.
pub const MAX_OBJECTS_PER_COLLECTION: usize = u16::MAX as usize;

/// On-disk size of one VL element with 8-byte addresses.
pub const VL_REFERENCE_SIZE: usize = 16;

/// Header of one object: index, refcount, reserved, size.
const OBJECT_HEADER: usize = 16;

/// A variable-length element: sequence length plus heap object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlReference {
    /// Number of base elements (bytes for strings).
    pub length: u32,
    pub collection: u64,
    pub index: u32,
}

impl VlReference {
    /// Parse one reference from element bytes.
    pub fn parse(data: &[u8], pos: usize, offset_size: u8) -> Result<VlReference, FormatError> {
        let os = offset_size as usize;
        Ok(VlReference {
            length: read_u32(data, pos)?,
            collection: read_uint(data, pos + 4, offset_size)?,
            index: read_u32(data, pos + 4 + os)?,
        })
    }

    /// Serialize with an 8-byte address.
    pub fn to_bytes(&self) -> [u8; VL_REFERENCE_SIZE] {
        let mut out = [0u8; VL_REFERENCE_SIZE];
        out[..4].copy_from_slice(&self.length.to_le_bytes());
        out[4..12].copy_from_slice(&self.collection.to_le_bytes());
        out[12..].copy_from_slice(&self.index.to_le_bytes());
        out
    }

    /// True for the all-zero or undefined reference written for absent values.
    pub fn is_null(&self, offset_size: u8) -> bool {
        self.collection == 0 || is_undefined(self.collection, offset_size)
    }
}

/// Parsed collection: object index to object bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalHeapCollection {
    pub address: u64,
    objects: BTreeMap<u16, Vec<u8>>,
}

impl GlobalHeapCollection {
    pub fn parse(
        data: &[u8],
        address: u64,
        length_size: u8,
    ) -> Result<GlobalHeapCollection, FormatError> {
        let start = match usize::try_from(address) {
            Ok(pos) if pos < data.len() => pos,
            _ => return Err(FormatError::InvalidAddress(address)),
        };
        let ls = length_size as usize;
        ensure_len(data, start, 8 + ls)?;
        if &data[start..start + 4] != b"GCOL" {
            return Err(FormatError::InvalidGlobalHeapSignature);
        }
        if data[start + 4] != 1 {
            return Err(FormatError::InvalidGlobalHeapVersion(data[start + 4]));
        }
        let size = read_uint(data, start + 8, length_size)? as usize;
        let end = start.saturating_add(size).min(data.len());

        let mut objects = BTreeMap::new();
        let mut pos = start + 8 + ls;
        while pos + 8 + ls <= end {
            let index = read_u16(data, pos)?;
            if index == 0 {
                break;
            }
            let len = read_uint(data, pos + 8, length_size)? as usize;
            pos += 8 + ls;
            ensure_len(data, pos, len)?;
            objects.insert(index, data[pos..pos + len].to_vec());
            pos += pad8(len);
        }
        Ok(GlobalHeapCollection { address, objects })
    }

    /// Bytes of object `index`.
    pub fn object(&self, index: u32) -> Result<&[u8], FormatError> {
        u16::try_from(index)
            .ok()
            .and_then(|i| self.objects.get(&i))
            .map(Vec::as_slice)
            .ok_or(FormatError::GlobalHeapObjectNotFound {
                collection: self.address,
                index,
            })
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Pack `objects` into as many collections as needed, laid out back to back
/// starting at `address`. Returns the bytes and one reference per object.
pub fn build_collections(objects: &[&[u8]], address: u64) -> (Vec<u8>, Vec<VlReference>) {
    let mut buf = Vec::new();
    let mut refs = Vec::with_capacity(objects.len());
    for group in objects.chunks(MAX_OBJECTS_PER_COLLECTION) {
        let start = buf.len();
        let collection = address + start as u64;
        buf.extend_from_slice(b"GCOL");
        buf.extend_from_slice(&[1, 0, 0, 0]);
        buf.extend_from_slice(&[0u8; 8]);
        for (i, obj) in group.iter().enumerate() {
            let index = (i + 1) as u16;
            buf.extend_from_slice(&index.to_le_bytes());
            buf.extend_from_slice(&1u16.to_le_bytes());
            buf.extend_from_slice(&[0u8; 4]);
            buf.extend_from_slice(&(obj.len() as u64).to_le_bytes());
            buf.extend_from_slice(obj);
            buf.resize(start + pad8(buf.len() - start), 0);
            refs.push(VlReference {
                length: obj.len() as u32,
                collection,
                index: index as u32,
            });
        }
        let used = buf.len() - start;
        let size = used.max(MIN_COLLECTION_SIZE - OBJECT_HEADER) + OBJECT_HEADER;
        // free-space object spanning the remainder
        let free = size - used;
        buf.extend_from_slice(&[0u8; 8]);
        buf.extend_from_slice(&(free as u64).to_le_bytes());
        buf.resize(start + size, 0);
        buf[start + 8..start + 16].copy_from_slice(&(size as u64).to_le_bytes());
    }
    (buf, refs)
}
