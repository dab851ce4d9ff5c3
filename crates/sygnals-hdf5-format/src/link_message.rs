//! Link message (0x0006) used by compact new-style groups.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec, vec::Vec};

use crate::bytes::{ensure_len, read_u16, read_uint, write_uint};
use crate::datatype::CharacterSet;
use crate::error::FormatError;

/// Where a link points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Object header address in this file.
    Hard { address: u64 },
    /// Path resolved at access time.
    Soft { path: String },
    /// Object in another file.
    External { file: String, path: String },
}

/// Parsed link message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    pub name: String,
    pub target: LinkTarget,
    pub creation_order: Option<u64>,
    pub charset: CharacterSet,
}

impl LinkMessage {
    /// A hard link with a UTF-8 name.
    pub fn hard(name: &str, address: u64) -> Self {
        LinkMessage {
            name: name.into(),
            target: LinkTarget::Hard { address },
            creation_order: None,
            charset: CharacterSet::Utf8,
        }
    }

    /// Parse a link message. Only version 1 exists.
    pub fn parse(data: &[u8], offset_size: u8) -> Result<LinkMessage, FormatError> {
        ensure_len(data, 0, 2)?;
        if data[0] != 1 {
            return Err(FormatError::InvalidLinkVersion(data[0]));
        }
        let flags = data[1];
        let mut pos = 2;

        let link_type = if flags & 0x08 != 0 {
            ensure_len(data, pos, 1)?;
            pos += 1;
            data[pos - 1]
        } else {
            0
        };
        let creation_order = if flags & 0x04 != 0 {
            let v = read_uint(data, pos, 8)?;
            pos += 8;
            Some(v)
        } else {
            None
        };
        let charset = if flags & 0x10 != 0 {
            ensure_len(data, pos, 1)?;
            pos += 1;
            match data[pos - 1] {
                0 => CharacterSet::Ascii,
                1 => CharacterSet::Utf8,
                other => return Err(FormatError::InvalidCharacterSet(other)),
            }
        } else {
            CharacterSet::Ascii
        };

        let width = 1u8 << (flags & 0x03);
        let name_len = read_uint(data, pos, width)? as usize;
        pos += width as usize;
        ensure_len(data, pos, name_len)?;
        let name = String::from_utf8_lossy(&data[pos..pos + name_len]).into_owned();
        pos += name_len;

        let target = match link_type {
            0 => LinkTarget::Hard {
                address: read_uint(data, pos, offset_size)?,
            },
            1 => {
                let len = read_u16(data, pos)? as usize;
                ensure_len(data, pos + 2, len)?;
                LinkTarget::Soft {
                    path: String::from_utf8_lossy(&data[pos + 2..pos + 2 + len]).into_owned(),
                }
            }
            64 => {
                let len = read_u16(data, pos)? as usize;
                ensure_len(data, pos + 2, len)?;
                // version/flags byte, then two NUL-terminated strings
                let body = &data[pos + 2..pos + 2 + len];
                let mut parts = body.get(1..).unwrap_or(&[]).split(|&b| b == 0);
                let file = String::from_utf8_lossy(parts.next().unwrap_or(&[])).into_owned();
                let path = String::from_utf8_lossy(parts.next().unwrap_or(&[])).into_owned();
                LinkTarget::External { file, path }
            }
            other => return Err(FormatError::InvalidLinkType(other)),
        };

        Ok(LinkMessage {
            name,
            target,
            creation_order,
            charset,
        })
    }

    /// Serialize with 8-byte addresses.
    pub fn serialize(&self) -> Vec<u8> {
        let name = self.name.as_bytes();
        let (size_bits, width) = match name.len() {
            0..=0xFF => (0u8, 1usize),
            0x100..=0xFFFF => (1, 2),
            _ => (2, 4),
        };
        let mut flags = size_bits;
        if !matches!(self.target, LinkTarget::Hard { .. }) {
            flags |= 0x08;
        }
        if self.creation_order.is_some() {
            flags |= 0x04;
        }
        if self.charset != CharacterSet::Ascii {
            flags |= 0x10;
        }

        let mut buf = vec![1u8, flags];
        match self.target {
            LinkTarget::Soft { .. } => buf.push(1),
            LinkTarget::External { .. } => buf.push(64),
            LinkTarget::Hard { .. } => {}
        }
        if let Some(order) = self.creation_order {
            buf.extend_from_slice(&order.to_le_bytes());
        }
        if self.charset != CharacterSet::Ascii {
            buf.push(1);
        }
        write_uint(&mut buf, name.len() as u64, width);
        buf.extend_from_slice(name);

        match &self.target {
            LinkTarget::Hard { address } => buf.extend_from_slice(&address.to_le_bytes()),
            LinkTarget::Soft { path } => {
                buf.extend_from_slice(&(path.len() as u16).to_le_bytes());
                buf.extend_from_slice(path.as_bytes());
            }
            LinkTarget::External { file, path } => {
                let len = 1 + file.len() + 1 + path.len() + 1;
                buf.extend_from_slice(&(len as u16).to_le_bytes());
                buf.push(0);
                buf.extend_from_slice(file.as_bytes());
                buf.push(0);
                buf.extend_from_slice(path.as_bytes());
                buf.push(0);
            }
        }
        buf
    }
}
