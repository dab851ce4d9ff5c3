//! Version 2 object header serialization.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::checksum::jenkins_lookup3;
use crate::error::FormatError;
use crate::message_type::MessageType;
use crate::object_header::OHDR_SIGNATURE;

/// Message flag: the message content is constant.
pub const MSG_FLAG_CONSTANT: u8 = 0x01;

/// Accumulates messages and emits a single-chunk v2 object header.
#[derive(Debug, Default)]
pub struct ObjectHeaderWriter {
    messages: Vec<(MessageType, Vec<u8>, u8)>,
}

impl ObjectHeaderWriter {
    /// Create a writer with no messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message with flags 0.
    pub fn add_message(&mut self, msg_type: MessageType, data: Vec<u8>) {
        self.messages.push((msg_type, data, 0));
    }

    /// Add a message with explicit flags.
    pub fn add_message_with_flags(&mut self, msg_type: MessageType, data: Vec<u8>, flags: u8) {
        self.messages.push((msg_type, data, flags));
    }

    /// Serialize OHDR, all messages in insertion order, and the checksum.
    ///
    /// Fails if any message body exceeds the 16-bit size field.
    pub fn serialize(&self) -> Result<Vec<u8>, FormatError> {
        let mut body = Vec::new();
        for (msg_type, data, flags) in &self.messages {
            let size = u16::try_from(data.len())
                .map_err(|_| FormatError::MessageTooLarge(data.len()))?;
            body.push(msg_type.to_u16() as u8);
            body.extend_from_slice(&size.to_le_bytes());
            body.push(*flags);
            body.extend_from_slice(data);
        }

        // Flags bits 0-1 select the chunk0 size width: 1, 2, 4 or 8 bytes.
        let (flags, width) = match body.len() {
            0..=0xFF => (0u8, 1usize),
            0x100..=0xFFFF => (1, 2),
            0x1_0000..=0xFFFF_FFFF => (2, 4),
            _ => (3, 8),
        };

        let mut buf = Vec::with_capacity(6 + width + body.len() + 4);
        buf.extend_from_slice(&OHDR_SIGNATURE);
        buf.push(2);
        buf.push(flags);
        buf.extend_from_slice(&(body.len() as u64).to_le_bytes()[..width]);
        buf.extend_from_slice(&body);
        let checksum = jenkins_lookup3(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        Ok(buf)
    }
}
