//! Object header parsing (v1 and v2) including continuation blocks.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::bytes::{ensure_len, read_u16, read_u32, read_uint};
use crate::checksum::verify_trailing;
use crate::error::FormatError;
use crate::message_type::MessageType;

/// OHDR signature for v2 object headers.
pub(crate) const OHDR_SIGNATURE: [u8; 4] = *b"OHDR";

/// OCHK signature for v2 continuation chunks.
pub(crate) const OCHK_SIGNATURE: [u8; 4] = *b"OCHK";

/// Upper bound on continuation blocks followed for one header.
const MAX_CONTINUATIONS: usize = 4096;

/// A single parsed header message.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMessage {
    /// The message type.
    pub msg_type: MessageType,
    /// Message flags byte.
    pub flags: u8,
    /// Raw message data bytes.
    pub data: Vec<u8>,
}

/// Parsed object header: its version and every non-nil message in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHeader {
    /// Header version (1 or 2).
    pub version: u8,
    /// All non-nil, non-continuation messages collected from all chunks.
    pub messages: Vec<HeaderMessage>,
}

/// Where the next block of messages lives and how to read it.
struct Block {
    start: usize,
    end: usize,
}

impl ObjectHeader {
    /// Parse the object header at `offset`.
    ///
    /// Fails with `InvalidAddress` when `offset` is outside `data`, which is
    /// how dangling links surface.
    pub fn parse(
        data: &[u8],
        offset: usize,
        offset_size: u8,
        length_size: u8,
        verify_checksum: bool,
    ) -> Result<ObjectHeader, FormatError> {
        if offset >= data.len() {
            return Err(FormatError::InvalidAddress(offset as u64));
        }
        ensure_len(data, offset, 4)?;
        if data[offset..offset + 4] == OHDR_SIGNATURE {
            Self::parse_v2(data, offset, offset_size, length_size, verify_checksum)
        } else {
            Self::parse_v1(data, offset, offset_size, length_size)
        }
    }

    /// Messages of the given type, in file order.
    pub fn messages_of(&self, msg_type: MessageType) -> impl Iterator<Item = &HeaderMessage> {
        self.messages.iter().filter(move |m| m.msg_type == msg_type)
    }

    /// First message of the given type.
    pub fn find(&self, msg_type: MessageType) -> Option<&HeaderMessage> {
        self.messages_of(msg_type).next()
    }

    /// True if at least one message of the given type is present.
    pub fn has(&self, msg_type: MessageType) -> bool {
        self.find(msg_type).is_some()
    }

    fn parse_v1(
        data: &[u8],
        offset: usize,
        offset_size: u8,
        length_size: u8,
    ) -> Result<ObjectHeader, FormatError> {
        // version(1) reserved(1) nmessages(2) refcount(4) size(4), padded to 16
        ensure_len(data, offset, 16)?;
        let version = data[offset];
        if version != 1 {
            return Err(FormatError::InvalidObjectHeaderVersion(version));
        }
        let header_size = read_u32(data, offset + 8)? as usize;
        let start = offset + 16;
        ensure_len(data, start, header_size)?;

        let mut messages = Vec::new();
        let mut pending = vec![Block {
            start,
            end: start + header_size,
        }];
        let mut followed = 0usize;
        while let Some(block) = pending.pop() {
            let mut pos = block.start;
            while pos + 8 <= block.end {
                let raw_type = read_u16(data, pos)?;
                let size = read_u16(data, pos + 2)? as usize;
                let flags = data[pos + 4];
                pos += 8;
                if pos + size > block.end {
                    break;
                }
                let body = &data[pos..pos + size];
                pos += size;
                Self::accept(
                    raw_type,
                    flags,
                    body,
                    offset_size,
                    length_size,
                    data,
                    &mut messages,
                    &mut pending,
                    &mut followed,
                )?;
            }
        }
        Ok(ObjectHeader { version: 1, messages })
    }

    fn parse_v2(
        data: &[u8],
        offset: usize,
        offset_size: u8,
        length_size: u8,
        verify_checksum: bool,
    ) -> Result<ObjectHeader, FormatError> {
        ensure_len(data, offset, 6)?;
        let version = data[offset + 4];
        if version != 2 {
            return Err(FormatError::InvalidObjectHeaderVersion(version));
        }
        let flags = data[offset + 5];
        let mut pos = offset + 6;
        if flags & 0x20 != 0 {
            pos += 16; // access/modification/change/birth times
        }
        if flags & 0x10 != 0 {
            pos += 4; // attribute phase-change thresholds
        }
        let width = 1u8 << (flags & 0x03);
        let chunk0_size = read_uint(data, pos, width)? as usize;
        pos += width as usize;

        let chunk0_end = pos
            .checked_add(chunk0_size)
            .ok_or(FormatError::InvalidAddress(chunk0_size as u64))?;
        ensure_len(data, chunk0_end, 4)?;
        if verify_checksum {
            verify_trailing(data, offset, chunk0_end)?;
        }

        let tracks_order = flags & 0x04 != 0;
        let mut messages = Vec::new();
        let mut pending = vec![Block {
            start: pos,
            end: chunk0_end,
        }];
        let mut followed = 0usize;
        let mut first = true;
        while let Some(block) = pending.pop() {
            let (mut pos, end) = if first {
                first = false;
                (block.start, block.end)
            } else {
                // Continuation chunk: OCHK + messages + checksum.
                if block.end < block.start + 8 {
                    return Err(FormatError::UnexpectedEof {
                        expected: 8,
                        available: block.end.saturating_sub(block.start),
                    });
                }
                ensure_len(data, block.start, block.end - block.start)?;
                if data[block.start..block.start + 4] != OCHK_SIGNATURE {
                    return Err(FormatError::InvalidObjectHeaderSignature);
                }
                if verify_checksum {
                    verify_trailing(data, block.start, block.end - 4)?;
                }
                (block.start + 4, block.end - 4)
            };
            let prefix = if tracks_order { 6 } else { 4 };
            while pos + prefix <= end {
                let raw_type = data[pos] as u16;
                let size = read_u16(data, pos + 1)? as usize;
                let msg_flags = data[pos + 3];
                pos += prefix;
                if pos + size > end {
                    break;
                }
                let body = &data[pos..pos + size];
                pos += size;
                Self::accept(
                    raw_type,
                    msg_flags,
                    body,
                    offset_size,
                    length_size,
                    data,
                    &mut messages,
                    &mut pending,
                    &mut followed,
                )?;
            }
        }
        Ok(ObjectHeader { version: 2, messages })
    }

    /// Record one message, or queue the block a continuation message points at.
    #[allow(clippy::too_many_arguments)]
    fn accept(
        raw_type: u16,
        flags: u8,
        body: &[u8],
        offset_size: u8,
        length_size: u8,
        data: &[u8],
        messages: &mut Vec<HeaderMessage>,
        pending: &mut Vec<Block>,
        followed: &mut usize,
    ) -> Result<(), FormatError> {
        let msg_type = MessageType::from_u16(raw_type);
        match msg_type {
            MessageType::Nil => Ok(()),
            MessageType::ObjectHeaderContinuation => {
                let address = read_uint(body, 0, offset_size)?;
                let length = read_uint(body, offset_size as usize, length_size)? as usize;
                let start = usize::try_from(address)
                    .map_err(|_| FormatError::InvalidAddress(address))?;
                let end = start
                    .checked_add(length)
                    .filter(|&e| e <= data.len())
                    .ok_or(FormatError::InvalidAddress(address))?;
                *followed += 1;
                if *followed > MAX_CONTINUATIONS {
                    return Err(FormatError::InvalidAddress(address));
                }
                pending.push(Block { start, end });
                Ok(())
            }
            MessageType::Unknown(id) if flags & 0x08 != 0 => {
                Err(FormatError::UnsupportedMessage(id))
            }
            _ => {
                messages.push(HeaderMessage {
                    msg_type,
                    flags,
                    data: body.to_vec(),
                });
                Ok(())
            }
        }
    }
}
