//! Little-endian field helpers shared by the parsers and writers.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// The "undefined address" sentinel (all bits set).
pub const UNDEFINED_ADDRESS: u64 = u64::MAX;

/// Fail with `UnexpectedEof` unless `data[offset..offset + needed]` exists.
pub(crate) fn ensure_len(data: &[u8], offset: usize, needed: usize) -> Result<(), FormatError> {
    match offset.checked_add(needed) {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(FormatError::UnexpectedEof {
            expected: offset.saturating_add(needed),
            available: data.len(),
        }),
    }
}

/// Read a 1/2/4/8-byte little-endian unsigned integer.
///
/// Width errors are reported as offset-size errors since that is where
/// variable widths come from in practice.
pub(crate) fn read_uint(data: &[u8], pos: usize, size: u8) -> Result<u64, FormatError> {
    let s = size as usize;
    ensure_len(data, pos, s)?;
    let slice = &data[pos..pos + s];
    Ok(match size {
        1 => slice[0] as u64,
        2 => LittleEndian::read_u16(slice) as u64,
        4 => LittleEndian::read_u32(slice) as u64,
        8 => LittleEndian::read_u64(slice),
        _ => return Err(FormatError::InvalidOffsetSize(size)),
    })
}

/// Read a little-endian integer of arbitrary width up to 8 bytes.
pub(crate) fn read_var_uint(data: &[u8], pos: usize, size: usize) -> Result<u64, FormatError> {
    ensure_len(data, pos, size)?;
    let mut value = 0u64;
    for (i, b) in data[pos..pos + size].iter().enumerate().take(8) {
        value |= (*b as u64) << (8 * i);
    }
    Ok(value)
}

/// Read an address and map the all-ones sentinel to `None`.
pub(crate) fn read_address(data: &[u8], pos: usize, size: u8) -> Result<Option<u64>, FormatError> {
    let raw = read_uint(data, pos, size)?;
    Ok(if is_undefined(raw, size) { None } else { Some(raw) })
}

/// True if `value` is the undefined-address pattern for a field of `size` bytes.
pub fn is_undefined(value: u64, size: u8) -> bool {
    match size {
        8 => value == u64::MAX,
        n => value == (1u64 << (8 * n as u32)) - 1,
    }
}

pub(crate) fn read_u16(data: &[u8], pos: usize) -> Result<u16, FormatError> {
    ensure_len(data, pos, 2)?;
    Ok(LittleEndian::read_u16(&data[pos..pos + 2]))
}

pub(crate) fn read_u32(data: &[u8], pos: usize) -> Result<u32, FormatError> {
    ensure_len(data, pos, 4)?;
    Ok(LittleEndian::read_u32(&data[pos..pos + 4]))
}

/// Append `value` as a `size`-byte little-endian integer.
pub(crate) fn write_uint(buf: &mut Vec<u8>, value: u64, size: usize) {
    buf.extend_from_slice(&value.to_le_bytes()[..size.min(8)]);
    for _ in 8..size {
        buf.push(0);
    }
}

/// Number of bytes needed to hold `value` (at least one).
pub(crate) fn bytes_needed(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

/// Round up to the next multiple of 8.
pub(crate) fn pad8(x: usize) -> usize {
    (x + 7) & !7
}
