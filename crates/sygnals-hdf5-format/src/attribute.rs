//! Attribute message (0x000C): versions 1 to 3, written as version 3.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec, vec::Vec};

use crate::bytes::{ensure_len, pad8, read_u16};
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::message_type::MessageType;

/// Parsed attribute: name, element type, shape and raw element bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMessage {
    pub name: String,
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    /// `num_elements * type_size` bytes; VL elements hold heap references.
    pub raw_data: Vec<u8>,
}

impl AttributeMessage {
    /// Parse an attribute message.
    ///
    /// Attributes whose datatype or dataspace is a shared (committed)
    /// message report `UnsupportedMessage`.
    pub fn parse(data: &[u8], length_size: u8) -> Result<AttributeMessage, FormatError> {
        ensure_len(data, 0, 8)?;
        let version = data[0];
        if !(1..=3).contains(&version) {
            return Err(FormatError::InvalidAttributeVersion(version));
        }
        let flags = data[1];
        if version >= 2 && flags & 0x01 != 0 {
            return Err(FormatError::UnsupportedMessage(MessageType::Datatype.to_u16()));
        }
        if version >= 2 && flags & 0x02 != 0 {
            return Err(FormatError::UnsupportedMessage(MessageType::Dataspace.to_u16()));
        }
        let name_size = read_u16(data, 2)? as usize;
        let datatype_size = read_u16(data, 4)? as usize;
        let dataspace_size = read_u16(data, 6)? as usize;
        // v1 pads each field to 8 bytes; v3 adds a name encoding byte
        let step = |n: usize| if version == 1 { pad8(n) } else { n };
        let mut pos = if version == 3 { 9 } else { 8 };

        ensure_len(data, pos, name_size)?;
        let raw_name = &data[pos..pos + name_size];
        let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        let name = String::from_utf8_lossy(&raw_name[..end]).into_owned();
        pos += step(name_size);

        ensure_len(data, pos, datatype_size)?;
        let (datatype, _) = Datatype::parse(&data[pos..pos + datatype_size])?;
        pos += step(datatype_size);

        ensure_len(data, pos, dataspace_size)?;
        let dataspace = Dataspace::parse(&data[pos..pos + dataspace_size], length_size)?;
        pos += step(dataspace_size);

        let expected = (dataspace.num_elements() as usize)
            .checked_mul(datatype.type_size() as usize)
            .ok_or(FormatError::MessageTooLarge(usize::MAX))?;
        let available = data.len().saturating_sub(pos);
        if available < expected {
            return Err(FormatError::DataSizeMismatch {
                expected,
                actual: available,
            });
        }
        Ok(AttributeMessage {
            name,
            datatype,
            dataspace,
            raw_data: data[pos..pos + expected].to_vec(),
        })
    }

    /// Serialize as a version 3 message with a UTF-8 name.
    pub fn serialize(&self, length_size: u8) -> Result<Vec<u8>, FormatError> {
        let mut name = self.name.as_bytes().to_vec();
        name.push(0);
        let dt = self.datatype.serialize();
        let ds = self.dataspace.serialize(length_size);
        let field = |n: usize| u16::try_from(n).map_err(|_| FormatError::MessageTooLarge(n));

        let mut buf = vec![3u8, 0];
        buf.extend_from_slice(&field(name.len())?.to_le_bytes());
        buf.extend_from_slice(&field(dt.len())?.to_le_bytes());
        buf.extend_from_slice(&field(ds.len())?.to_le_bytes());
        // name encoding: UTF-8
        buf.push(1);
        buf.extend_from_slice(&name);
        buf.extend_from_slice(&dt);
        buf.extend_from_slice(&ds);
        buf.extend_from_slice(&self.raw_data);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::ByteOrder;

    fn sample() -> AttributeMessage {
        AttributeMessage {
            name: "units".into(),
            datatype: Datatype::integer(4, true, ByteOrder::LittleEndian),
            dataspace: Dataspace::simple(&[3]),
            raw_data: [1i32, -2, 3].iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    #[test]
    fn v3_roundtrip() {
        let attr = sample();
        let bytes = attr.serialize(8).unwrap();
        assert_eq!(bytes[0], 3);
        assert_eq!(AttributeMessage::parse(&bytes, 8).unwrap(), attr);
    }

    #[test]
    fn v1_padded_fields() {
        let attr = sample();
        let name = b"units\0";
        let dt = attr.datatype.serialize();
        let ds = attr.dataspace.serialize(8);
        let mut buf = vec![1u8, 0];
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(dt.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(ds.len() as u16).to_le_bytes());
        for field in [&name[..], &dt[..], &ds[..]] {
            buf.extend_from_slice(field);
            buf.resize(pad8(buf.len()), 0);
        }
        buf.extend_from_slice(&attr.raw_data);
        assert_eq!(AttributeMessage::parse(&buf, 8).unwrap(), attr);
    }

    #[test]
    fn truncated_value_is_rejected() {
        let mut bytes = sample().serialize(8).unwrap();
        bytes.truncate(bytes.len() - 2);
        assert_eq!(
            AttributeMessage::parse(&bytes, 8),
            Err(FormatError::DataSizeMismatch {
                expected: 12,
                actual: 10
            })
        );
    }

    #[test]
    fn shared_datatype_is_reported() {
        let mut bytes = sample().serialize(8).unwrap();
        bytes[1] = 0x01;
        assert_eq!(
            AttributeMessage::parse(&bytes, 8),
            Err(FormatError::UnsupportedMessage(0x0003))
        );
    }
}
