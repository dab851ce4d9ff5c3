//! Fixed array chunk index: header (`FAHD`) and data block (`FADB`).

#[cfg(not(feature = "std"))]
use alloc::{format, vec::Vec};

use crate::bytes::{ensure_len, is_undefined, read_u32, read_uint, read_var_uint, write_uint};
use crate::checksum::{jenkins_lookup3, verify_trailing};
use crate::error::FormatError;

/// Smallest page size exponent written, matching libhdf5's default.
pub const MIN_PAGE_BITS: u8 = 10;

/// Size of a serialized header with 8-byte offsets and lengths.
pub const HEADER_SIZE: usize = 4 + 4 + 8 + 8 + 4;

/// One slot of the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedArrayEntry {
    pub address: u64,
    /// Stored chunk size; only meaningful for filtered arrays.
    pub size: u64,
    pub filter_mask: u32,
}

/// Width libhdf5 uses for the stored-size field of filtered entries.
pub fn filtered_size_width(chunk_bytes: u64) -> usize {
    let log2 = if chunk_bytes <= 1 {
        0
    } else {
        63 - chunk_bytes.leading_zeros() as usize
    };
    (1 + (log2 + 8) / 8).min(8)
}

/// Page size exponent that keeps `count` entries in a single unpaged block.
pub fn page_bits_for(count: usize) -> u8 {
    let needed = usize::BITS - count.saturating_sub(1).leading_zeros();
    (needed as u8).max(MIN_PAGE_BITS)
}

/// Read every slot of the array rooted at `header_address`, in index order.
/// Unallocated slots are `None`.
///
/// `expected_count` is the slot count of the dataset's chunk grid. A header
/// that disagrees is rejected before anything is allocated.
pub fn read_entries(
    data: &[u8],
    header_address: u64,
    expected_count: u64,
    offset_size: u8,
    length_size: u8,
    verify_checksums: bool,
) -> Result<Vec<Option<FixedArrayEntry>>, FormatError> {
    let os = offset_size as usize;
    let ls = length_size as usize;
    let h = offset_of(data, header_address)?;
    let header_len = 8 + ls + os;
    ensure_len(data, h, header_len + 4)?;
    if &data[h..h + 4] != b"FAHD" {
        return Err(FormatError::InvalidFixedArraySignature);
    }
    if verify_checksums {
        verify_trailing(data, h, h + header_len)?;
    }
    let client_id = data[h + 5];
    let entry_size = data[h + 6] as usize;
    let page_bits = data[h + 7];
    let stored_count = read_uint(data, h + 8, length_size)?;
    if stored_count != expected_count {
        return Err(FormatError::InconsistentChunkLayout(format!(
            "fixed array holds {stored_count} entries for {expected_count} chunks"
        )));
    }
    let count = usize::try_from(stored_count).map_err(|_| too_large())?;
    let block_address = read_uint(data, h + 8 + ls, offset_size)?;

    let filtered = client_id == 1;
    let size_width = if filtered {
        entry_size.checked_sub(os + 4).filter(|w| (1..=8).contains(w)).ok_or_else(|| {
            FormatError::InconsistentChunkLayout("fixed array entry size too small".into())
        })?
    } else {
        0
    };

    let b = offset_of(data, block_address)?;
    let prefix = 6 + os;
    ensure_len(data, b, prefix)?;
    if &data[b..b + 4] != b"FADB" {
        return Err(FormatError::InvalidFixedArraySignature);
    }

    let decode = |pos: usize| -> Result<Option<FixedArrayEntry>, FormatError> {
        let address = read_uint(data, pos, offset_size)?;
        if is_undefined(address, offset_size) {
            return Ok(None);
        }
        let (size, filter_mask) = if filtered {
            (
                read_var_uint(data, pos + os, size_width)?,
                read_u32(data, pos + os + size_width)?,
            )
        } else {
            (0, 0)
        };
        Ok(Some(FixedArrayEntry {
            address,
            size,
            filter_mask,
        }))
    };

    let entry_bytes = count.checked_mul(entry_size).ok_or_else(too_large)?;
    let page_size = 1usize.checked_shl(page_bits as u32).unwrap_or(usize::MAX);
    if count <= page_size {
        let body = b + prefix;
        ensure_len(data, body, entry_bytes + 4)?;
        if verify_checksums {
            verify_trailing(data, b, body + entry_bytes)?;
        }
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            entries.push(decode(body + i * entry_size)?);
        }
        return Ok(entries);
    }

    // Paged block: init bitmap and block checksum, then one checksummed page each.
    let pages = count.div_ceil(page_size);
    let bitmap = b + prefix;
    let bitmap_len = pages.div_ceil(8);
    // every page occupies its space, initialised or not
    let paged_bytes = pages
        .checked_mul(4)
        .and_then(|checksums| checksums.checked_add(entry_bytes))
        .and_then(|pages_len| pages_len.checked_add(bitmap_len + 4))
        .ok_or_else(too_large)?;
    ensure_len(data, bitmap, paged_bytes)?;
    let mut entries = Vec::with_capacity(count);
    if verify_checksums {
        verify_trailing(data, b, bitmap + bitmap_len)?;
    }
    let mut page_pos = bitmap + bitmap_len + 4;
    for p in 0..pages {
        let in_page = page_size.min(count - p * page_size);
        let initialised = data[bitmap + p / 8] & (0x80 >> (p % 8)) != 0;
        if !initialised {
            entries.extend(core::iter::repeat(None).take(in_page));
        } else {
            if verify_checksums {
                verify_trailing(data, page_pos, page_pos + in_page * entry_size)?;
            }
            for i in 0..in_page {
                entries.push(decode(page_pos + i * entry_size)?);
            }
        }
        page_pos += in_page * entry_size + 4;
    }
    Ok(entries)
}

/// Serialize header and unpaged data block for placement at `header_address`.
///
/// `chunk_bytes` is the unfiltered chunk size, used for the stored-size width
/// when `filtered` is set. `page_bits` must come from [`page_bits_for`].
pub fn build(
    entries: &[FixedArrayEntry],
    filtered: bool,
    chunk_bytes: u64,
    page_bits: u8,
    header_address: u64,
) -> Vec<u8> {
    let size_width = if filtered {
        filtered_size_width(chunk_bytes)
    } else {
        0
    };
    let entry_size = if filtered { 8 + size_width + 4 } else { 8 };
    let client_id = u8::from(filtered);

    let mut buf = Vec::with_capacity(HEADER_SIZE + 18 + entries.len() * entry_size);
    buf.extend_from_slice(b"FAHD");
    buf.extend_from_slice(&[0, client_id, entry_size as u8, page_bits]);
    buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    buf.extend_from_slice(&(header_address + HEADER_SIZE as u64).to_le_bytes());
    let checksum = jenkins_lookup3(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());

    let block_start = buf.len();
    buf.extend_from_slice(b"FADB");
    buf.extend_from_slice(&[0, client_id]);
    buf.extend_from_slice(&header_address.to_le_bytes());
    for e in entries {
        buf.extend_from_slice(&e.address.to_le_bytes());
        if filtered {
            write_uint(&mut buf, e.size, size_width);
            buf.extend_from_slice(&e.filter_mask.to_le_bytes());
        }
    }
    let checksum = jenkins_lookup3(&buf[block_start..]);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

fn too_large() -> FormatError {
    FormatError::InconsistentChunkLayout("fixed array is larger than the address space".into())
}

fn offset_of(data: &[u8], address: u64) -> Result<usize, FormatError> {
    match usize::try_from(address) {
        Ok(pos) if pos < data.len() => Ok(pos),
        _ => Err(FormatError::InvalidAddress(address)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(address: u64, size: u64) -> FixedArrayEntry {
        FixedArrayEntry {
            address,
            size,
            filter_mask: 0,
        }
    }

    #[test]
    fn size_width_matches_libhdf5() {
        assert_eq!(filtered_size_width(1), 2);
        assert_eq!(filtered_size_width(255), 2);
        assert_eq!(filtered_size_width(256), 3);
        assert_eq!(filtered_size_width(1 << 20), 4);
    }

    #[test]
    fn page_bits_never_page() {
        assert_eq!(page_bits_for(0), MIN_PAGE_BITS);
        assert_eq!(page_bits_for(1024), 10);
        assert_eq!(page_bits_for(1025), 11);
    }

    #[test]
    fn unfiltered_roundtrip_at_offset() {
        let entries = [entry(0x1000, 0), entry(0x2000, 0), entry(0x3000, 0)];
        let bytes = build(&entries, false, 800, 10, 64);
        let mut file = vec![0u8; 64];
        file.extend_from_slice(&bytes);
        let read = read_entries(&file, 64, 3, 8, 8, true).unwrap();
        assert_eq!(read, entries.iter().map(|&e| Some(e)).collect::<Vec<_>>());
    }

    #[test]
    fn filtered_roundtrip_and_unallocated_slot() {
        let entries = [entry(0x1000, 123), entry(u64::MAX, 0)];
        let bytes = build(&entries, true, 4096, 10, 0);
        let read = read_entries(&bytes, 0, 2, 8, 8, true).unwrap();
        assert_eq!(read, vec![Some(entry(0x1000, 123)), None]);
    }

    #[test]
    fn corrupted_block_fails_checksum() {
        let mut bytes = build(&[entry(0x1000, 0)], false, 8, 10, 0);
        let last_entry = bytes.len() - 5;
        bytes[last_entry] ^= 0xFF;
        assert!(matches!(
            read_entries(&bytes, 0, 1, 8, 8, true),
            Err(FormatError::ChecksumMismatch { .. })
        ));
        assert!(read_entries(&bytes, 0, 1, 8, 8, false).is_ok());
    }

    #[test]
    fn forged_count_is_rejected_before_reading() {
        let mut bytes = build(&[entry(0x1000, 0), entry(0x2000, 0)], false, 8, 10, 0);
        bytes[8..16].copy_from_slice(&(1u64 << 60).to_le_bytes());
        let checksum = jenkins_lookup3(&bytes[..HEADER_SIZE - 4]);
        bytes[HEADER_SIZE - 4..HEADER_SIZE].copy_from_slice(&checksum.to_le_bytes());

        assert!(matches!(
            read_entries(&bytes, 0, 2, 8, 8, true),
            Err(FormatError::InconsistentChunkLayout(_))
        ));
        // even a grid that agrees cannot claim more entries than the file holds
        assert!(matches!(
            read_entries(&bytes, 0, 1 << 60, 8, 8, true),
            Err(FormatError::UnexpectedEof { .. } | FormatError::InconsistentChunkLayout(_))
        ));
    }

    #[test]
    fn wrong_signature() {
        assert_eq!(
            read_entries(&[0u8; 64], 0, 1, 8, 8, true),
            Err(FormatError::InvalidFixedArraySignature)
        );
    }
}
