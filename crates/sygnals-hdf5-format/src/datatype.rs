//! Datatype message (0x0003) parsing and serialization.
//!
//! Integer, float, fixed-length string and variable-length string classes are
//! decoded in full. The remaining classes are recognised by id and size only,
//! which is enough for callers to reject them with a precise message.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec, vec::Vec};

use byteorder::{ByteOrder as _, LittleEndian};

use crate::bytes::ensure_len;
use crate::error::FormatError;

/// Byte order of numeric data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
    /// VAX mixed-endian floats; parsed so that they can be rejected.
    Vax,
}

/// String padding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringPadding {
    NullTerminate,
    NullPad,
    SpacePad,
}

/// Character set encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterSet {
    Ascii,
    Utf8,
}

/// Datatype class ids 0 to 11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatatypeClass {
    FixedPoint,
    FloatingPoint,
    Time,
    String,
    BitField,
    Opaque,
    Compound,
    Reference,
    Enumeration,
    VariableLength,
    Array,
    Complex,
}

impl DatatypeClass {
    fn from_id(id: u8) -> Result<DatatypeClass, FormatError> {
        Ok(match id {
            0 => DatatypeClass::FixedPoint,
            1 => DatatypeClass::FloatingPoint,
            2 => DatatypeClass::Time,
            3 => DatatypeClass::String,
            4 => DatatypeClass::BitField,
            5 => DatatypeClass::Opaque,
            6 => DatatypeClass::Compound,
            7 => DatatypeClass::Reference,
            8 => DatatypeClass::Enumeration,
            9 => DatatypeClass::VariableLength,
            10 => DatatypeClass::Array,
            11 => DatatypeClass::Complex,
            other => return Err(FormatError::InvalidDatatypeClass(other)),
        })
    }

    /// Lower-case class name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            DatatypeClass::FixedPoint => "integer",
            DatatypeClass::FloatingPoint => "float",
            DatatypeClass::Time => "time",
            DatatypeClass::String => "string",
            DatatypeClass::BitField => "bitfield",
            DatatypeClass::Opaque => "opaque",
            DatatypeClass::Compound => "compound",
            DatatypeClass::Reference => "reference",
            DatatypeClass::Enumeration => "enum",
            DatatypeClass::VariableLength => "vlen",
            DatatypeClass::Array => "array",
            DatatypeClass::Complex => "complex",
        }
    }
}

/// Parsed datatype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    /// Class 0: integers.
    FixedPoint {
        size: u32,
        byte_order: ByteOrder,
        signed: bool,
        bit_offset: u16,
        bit_precision: u16,
    },
    /// Class 1: IEEE-style floats.
    FloatingPoint {
        size: u32,
        byte_order: ByteOrder,
        sign_location: u8,
        bit_offset: u16,
        bit_precision: u16,
        exponent_location: u8,
        exponent_size: u8,
        mantissa_location: u8,
        mantissa_size: u8,
        exponent_bias: u32,
    },
    /// Class 3: fixed-length strings.
    String {
        size: u32,
        padding: StringPadding,
        charset: CharacterSet,
    },
    /// Class 9: variable-length sequences and strings.
    VariableLength {
        is_string: bool,
        padding: StringPadding,
        charset: CharacterSet,
        base: Box<Datatype>,
    },
    /// Any other class, kept as id and element size.
    Other { class: DatatypeClass, size: u32 },
}

fn parse_padding(val: u8) -> Result<StringPadding, FormatError> {
    match val {
        0 => Ok(StringPadding::NullTerminate),
        1 => Ok(StringPadding::NullPad),
        2 => Ok(StringPadding::SpacePad),
        _ => Err(FormatError::InvalidStringPadding(val)),
    }
}

fn parse_charset(val: u8) -> Result<CharacterSet, FormatError> {
    match val {
        0 => Ok(CharacterSet::Ascii),
        1 => Ok(CharacterSet::Utf8),
        _ => Err(FormatError::InvalidCharacterSet(val)),
    }
}

fn padding_bits(p: StringPadding) -> u8 {
    match p {
        StringPadding::NullTerminate => 0,
        StringPadding::NullPad => 1,
        StringPadding::SpacePad => 2,
    }
}

fn charset_bits(c: CharacterSet) -> u8 {
    match c {
        CharacterSet::Ascii => 0,
        CharacterSet::Utf8 => 1,
    }
}

fn header(class: u8, version: u8, bits: [u8; 3], size: u32) -> Vec<u8> {
    let mut buf = vec![(version << 4) | (class & 0x0F), bits[0], bits[1], bits[2]];
    buf.extend_from_slice(&size.to_le_bytes());
    buf
}

impl Datatype {
    /// Parse a datatype message; returns the type and the bytes consumed.
    ///
    /// For classes kept as `Other` the consumed count covers only the 8-byte
    /// header, since their property blocks are never walked.
    pub fn parse(data: &[u8]) -> Result<(Datatype, usize), FormatError> {
        ensure_len(data, 0, 8)?;
        let class_id = data[0] & 0x0F;
        let version = data[0] >> 4;
        let bits = [data[1], data[2], data[3]];
        let size = LittleEndian::read_u32(&data[4..8]);
        let class = DatatypeClass::from_id(class_id)?;
        if version == 0 {
            return Err(FormatError::InvalidDatatypeVersion {
                class: class_id,
                version,
            });
        }

        match class {
            DatatypeClass::FixedPoint => {
                ensure_len(data, 8, 4)?;
                let dt = Datatype::FixedPoint {
                    size,
                    byte_order: if bits[0] & 0x01 == 0 {
                        ByteOrder::LittleEndian
                    } else {
                        ByteOrder::BigEndian
                    },
                    signed: bits[0] & 0x08 != 0,
                    bit_offset: LittleEndian::read_u16(&data[8..10]),
                    bit_precision: LittleEndian::read_u16(&data[10..12]),
                };
                Ok((dt, 12))
            }
            DatatypeClass::FloatingPoint => {
                ensure_len(data, 8, 12)?;
                let byte_order = match (bits[0] & 0x40 != 0, bits[0] & 0x01 != 0) {
                    (false, false) => ByteOrder::LittleEndian,
                    (false, true) => ByteOrder::BigEndian,
                    (true, _) => ByteOrder::Vax,
                };
                let p = &data[8..20];
                let dt = Datatype::FloatingPoint {
                    size,
                    byte_order,
                    sign_location: bits[1],
                    bit_offset: LittleEndian::read_u16(&p[0..2]),
                    bit_precision: LittleEndian::read_u16(&p[2..4]),
                    exponent_location: p[4],
                    exponent_size: p[5],
                    mantissa_location: p[6],
                    mantissa_size: p[7],
                    exponent_bias: LittleEndian::read_u32(&p[8..12]),
                };
                Ok((dt, 20))
            }
            DatatypeClass::String => {
                let dt = Datatype::String {
                    size,
                    padding: parse_padding(bits[0] & 0x0F)?,
                    charset: parse_charset(bits[0] >> 4)?,
                };
                Ok((dt, 8))
            }
            DatatypeClass::VariableLength => {
                let (base, consumed) = Datatype::parse(&data[8..])?;
                let dt = Datatype::VariableLength {
                    is_string: bits[0] & 0x0F == 1,
                    padding: parse_padding(bits[0] >> 4)?,
                    charset: parse_charset(bits[1] & 0x0F)?,
                    base: Box::new(base),
                };
                Ok((dt, 8 + consumed))
            }
            other => Ok((Datatype::Other { class: other, size }, 8)),
        }
    }

    /// Serialize to message bytes.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Datatype::FixedPoint {
                size,
                byte_order,
                signed,
                bit_offset,
                bit_precision,
            } => {
                let mut b0 = 0u8;
                if *byte_order == ByteOrder::BigEndian {
                    b0 |= 0x01;
                }
                if *signed {
                    b0 |= 0x08;
                }
                let mut buf = header(0, 1, [b0, 0, 0], *size);
                buf.extend_from_slice(&bit_offset.to_le_bytes());
                buf.extend_from_slice(&bit_precision.to_le_bytes());
                buf
            }
            Datatype::FloatingPoint {
                size,
                byte_order,
                sign_location,
                bit_offset,
                bit_precision,
                exponent_location,
                exponent_size,
                mantissa_location,
                mantissa_size,
                exponent_bias,
            } => {
                // Mantissa normalization 2 (implied MSB), as written by libhdf5.
                let mut b0 = 0x20u8;
                match byte_order {
                    ByteOrder::BigEndian => b0 |= 0x01,
                    ByteOrder::Vax => b0 |= 0x41,
                    ByteOrder::LittleEndian => {}
                }
                let mut buf = header(1, 1, [b0, *sign_location, 0], *size);
                buf.extend_from_slice(&bit_offset.to_le_bytes());
                buf.extend_from_slice(&bit_precision.to_le_bytes());
                buf.extend_from_slice(&[
                    *exponent_location,
                    *exponent_size,
                    *mantissa_location,
                    *mantissa_size,
                ]);
                buf.extend_from_slice(&exponent_bias.to_le_bytes());
                buf
            }
            Datatype::String {
                size,
                padding,
                charset,
            } => header(
                3,
                1,
                [padding_bits(*padding) | (charset_bits(*charset) << 4), 0, 0],
                *size,
            ),
            Datatype::VariableLength {
                is_string,
                padding,
                charset,
                base,
            } => {
                let b0 = u8::from(*is_string) | (padding_bits(*padding) << 4);
                let mut buf = header(9, 1, [b0, charset_bits(*charset), 0], 16);
                buf.extend_from_slice(&base.serialize());
                buf
            }
            Datatype::Other { class, size } => {
                let id = match class {
                    DatatypeClass::FixedPoint => 0,
                    DatatypeClass::FloatingPoint => 1,
                    DatatypeClass::Time => 2,
                    DatatypeClass::String => 3,
                    DatatypeClass::BitField => 4,
                    DatatypeClass::Opaque => 5,
                    DatatypeClass::Compound => 6,
                    DatatypeClass::Reference => 7,
                    DatatypeClass::Enumeration => 8,
                    DatatypeClass::VariableLength => 9,
                    DatatypeClass::Array => 10,
                    DatatypeClass::Complex => 11,
                };
                header(id, 1, [0, 0, 0], *size)
            }
        }
    }

    /// Standard integer type of `size` bytes.
    pub fn integer(size: u32, signed: bool, byte_order: ByteOrder) -> Datatype {
        Datatype::FixedPoint {
            size,
            byte_order,
            signed,
            bit_offset: 0,
            bit_precision: (size * 8) as u16,
        }
    }

    /// IEEE 754 binary32.
    pub fn float32(byte_order: ByteOrder) -> Datatype {
        Datatype::FloatingPoint {
            size: 4,
            byte_order,
            sign_location: 31,
            bit_offset: 0,
            bit_precision: 32,
            exponent_location: 23,
            exponent_size: 8,
            mantissa_location: 0,
            mantissa_size: 23,
            exponent_bias: 127,
        }
    }

    /// IEEE 754 binary64.
    pub fn float64(byte_order: ByteOrder) -> Datatype {
        Datatype::FloatingPoint {
            size: 8,
            byte_order,
            sign_location: 63,
            bit_offset: 0,
            bit_precision: 64,
            exponent_location: 52,
            exponent_size: 11,
            mantissa_location: 0,
            mantissa_size: 52,
            exponent_bias: 1023,
        }
    }

    /// Variable-length string with a single-byte character base type.
    pub fn vl_string(charset: CharacterSet) -> Datatype {
        Datatype::VariableLength {
            is_string: true,
            padding: StringPadding::NullTerminate,
            charset,
            base: Box::new(Datatype::integer(1, false, ByteOrder::LittleEndian)),
        }
    }

    /// Size in bytes of one element as stored in the dataset.
    ///
    /// Variable-length elements are 16 bytes: length, heap address, index.
    pub fn type_size(&self) -> u32 {
        match self {
            Datatype::FixedPoint { size, .. }
            | Datatype::FloatingPoint { size, .. }
            | Datatype::String { size, .. }
            | Datatype::Other { size, .. } => *size,
            Datatype::VariableLength { .. } => 16,
        }
    }

    /// The class of this datatype.
    pub fn class(&self) -> DatatypeClass {
        match self {
            Datatype::FixedPoint { .. } => DatatypeClass::FixedPoint,
            Datatype::FloatingPoint { .. } => DatatypeClass::FloatingPoint,
            Datatype::String { .. } => DatatypeClass::String,
            Datatype::VariableLength { .. } => DatatypeClass::VariableLength,
            Datatype::Other { class, .. } => *class,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_roundtrip_all_widths() {
        for size in [1u32, 2, 4, 8] {
            for signed in [false, true] {
                for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
                    let dt = Datatype::integer(size, signed, order);
                    let bytes = dt.serialize();
                    assert_eq!(bytes.len(), 12);
                    assert_eq!(Datatype::parse(&bytes).unwrap(), (dt, 12));
                }
            }
        }
    }

    #[test]
    fn float64_matches_libhdf5_bytes() {
        let bytes = Datatype::float64(ByteOrder::LittleEndian).serialize();
        assert_eq!(&bytes[..8], &[0x11, 0x20, 0x3f, 0x00, 8, 0, 0, 0]);
        assert_eq!(&bytes[8..], &[0, 0, 64, 0, 52, 11, 0, 52, 0xff, 0x03, 0, 0]);
    }

    #[test]
    fn float32_sign_location() {
        let bytes = Datatype::float32(ByteOrder::BigEndian).serialize();
        assert_eq!(bytes[1], 0x21);
        assert_eq!(bytes[2], 31);
        let (dt, used) = Datatype::parse(&bytes).unwrap();
        assert_eq!(used, 20);
        assert_eq!(dt, Datatype::float32(ByteOrder::BigEndian));
    }

    #[test]
    fn fixed_string_roundtrip() {
        let dt = Datatype::String {
            size: 12,
            padding: StringPadding::SpacePad,
            charset: CharacterSet::Utf8,
        };
        let bytes = dt.serialize();
        assert_eq!(bytes[1], 0x12);
        assert_eq!(Datatype::parse(&bytes).unwrap(), (dt, 8));
    }

    #[test]
    fn vl_string_roundtrip() {
        let dt = Datatype::vl_string(CharacterSet::Utf8);
        let bytes = dt.serialize();
        assert_eq!(bytes.len(), 20);
        let (parsed, used) = Datatype::parse(&bytes).unwrap();
        assert_eq!(used, 20);
        assert_eq!(parsed, dt);
        assert_eq!(parsed.type_size(), 16);
    }

    #[test]
    fn compound_is_kept_as_other() {
        // Compound, version 3, one member worth of properties following.
        let mut bytes = header(6, 3, [1, 0, 0], 8);
        bytes.extend_from_slice(b"x\0");
        let (dt, _) = Datatype::parse(&bytes).unwrap();
        assert_eq!(
            dt,
            Datatype::Other {
                class: DatatypeClass::Compound,
                size: 8
            }
        );
        assert_eq!(dt.class().name(), "compound");
    }

    #[test]
    fn invalid_class_and_truncation() {
        let bytes = header(12, 1, [0, 0, 0], 4);
        assert_eq!(
            Datatype::parse(&bytes),
            Err(FormatError::InvalidDatatypeClass(12))
        );
        assert!(matches!(
            Datatype::parse(&[0x10, 0, 0]),
            Err(FormatError::UnexpectedEof { .. })
        ));
    }
}
