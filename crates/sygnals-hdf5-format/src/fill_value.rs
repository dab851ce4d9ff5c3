//! Fill value messages: the current form (0x0005) and the old form (0x0004).

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::bytes::{ensure_len, read_u32};
use crate::error::FormatError;

/// Parsed fill value information.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FillValue {
    /// Space allocation time (1 early, 2 late, 3 incremental).
    pub alloc_time: u8,
    /// Fill write time (0 on alloc, 1 never, 2 if set).
    pub write_time: u8,
    /// Raw fill bytes, one element wide, if the dataset defines one.
    pub value: Option<Vec<u8>>,
}

impl FillValue {
    /// Parse a version 1, 2 or 3 fill value message.
    pub fn parse(data: &[u8]) -> Result<FillValue, FormatError> {
        ensure_len(data, 0, 2)?;
        match data[0] {
            1 | 2 => {
                ensure_len(data, 0, 4)?;
                let alloc_time = data[1];
                let write_time = data[2];
                let defined = data[3] != 0;
                // v1 always carries the size field, v2 only when defined.
                let value = if data[0] == 1 || defined {
                    read_sized(data, 4)?
                } else {
                    None
                };
                Ok(FillValue {
                    alloc_time,
                    write_time,
                    value,
                })
            }
            3 => {
                let flags = data[1];
                let value = if flags & 0x20 != 0 {
                    read_sized(data, 2)?
                } else {
                    None
                };
                Ok(FillValue {
                    alloc_time: flags & 0x03,
                    write_time: (flags >> 2) & 0x03,
                    value,
                })
            }
            other => Err(FormatError::InvalidFillValueVersion(other)),
        }
    }

    /// Parse the old-style fill value message, which is only a sized value.
    pub fn parse_old(data: &[u8]) -> Result<FillValue, FormatError> {
        Ok(FillValue {
            alloc_time: 2,
            write_time: 2,
            value: read_sized(data, 0)?,
        })
    }

    /// Serialize as a version 3 message.
    pub fn serialize(&self) -> Vec<u8> {
        let mut flags = (self.alloc_time & 0x03) | ((self.write_time & 0x03) << 2);
        if self.value.is_some() {
            flags |= 0x20;
        }
        let mut buf = vec![3u8, flags];
        if let Some(v) = &self.value {
            buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
            buf.extend_from_slice(v);
        }
        buf
    }

    /// Fill bytes for an element of `element_size`, zeros when undefined.
    pub fn element_bytes(&self, element_size: usize) -> Vec<u8> {
        match &self.value {
            Some(v) if v.len() == element_size => v.clone(),
            _ => vec![0u8; element_size],
        }
    }
}

fn read_sized(data: &[u8], pos: usize) -> Result<Option<Vec<u8>>, FormatError> {
    let size = read_u32(data, pos)? as usize;
    if size == 0 {
        return Ok(None);
    }
    ensure_len(data, pos + 4, size)?;
    Ok(Some(data[pos + 4..pos + 4 + size].to_vec()))
}
