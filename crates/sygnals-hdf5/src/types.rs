//! Type mapping between on-disk element types and host element types.
//!
//! The mapping is a fixed table. Anything outside it is rejected with
//! [`Error::UnsupportedType`]; nothing is approximated.

use std::fmt;

use sygnals_hdf5_format::datatype::{ByteOrder, CharacterSet, Datatype, StringPadding};
use sygnals_hdf5_format::global_heap::VL_REFERENCE_SIZE;

use crate::error::{Error, Result};

/// Byte order of numeric elements on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
}

/// Character set of text elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    Ascii,
    Utf8,
}

/// How fixed-width text fills its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextPadding {
    NullTerminated,
    NullPadded,
    SpacePadded,
}

/// Container-native element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int { size: u8, signed: bool, order: Endian },
    Float { size: u8, order: Endian },
    FixedString {
        size: usize,
        encoding: TextEncoding,
        padding: TextPadding,
    },
    VarString { encoding: TextEncoding },
}

impl ElementType {
    /// Bytes per element as stored in a dataset written by this crate.
    pub fn size(&self) -> usize {
        match self {
            ElementType::Int { size, .. } | ElementType::Float { size, .. } => *size as usize,
            ElementType::FixedString { size, .. } => *size,
            ElementType::VarString { .. } => VL_REFERENCE_SIZE,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ElementType::FixedString { .. } | ElementType::VarString { .. })
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = |o: &Endian| if *o == Endian::Big { "be" } else { "le" };
        match self {
            ElementType::Int {
                size,
                signed,
                order: o,
            } => {
                let prefix = if *signed { "int" } else { "uint" };
                write!(f, "{prefix}{}{}", size * 8, order(o))
            }
            ElementType::Float { size, order: o } => write!(f, "float{}{}", size * 8, order(o)),
            ElementType::FixedString { size, .. } => write!(f, "string[{size}]"),
            ElementType::VarString { .. } => write!(f, "vlen string"),
        }
    }
}

/// Element types of the host's in-memory arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostElementType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// Fixed-width text; each value takes at most `width` bytes.
    FixedText { width: usize },
    /// Dynamic text.
    Text,
}

impl fmt::Display for HostElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostElementType::I8 => write!(f, "i8"),
            HostElementType::I16 => write!(f, "i16"),
            HostElementType::I32 => write!(f, "i32"),
            HostElementType::I64 => write!(f, "i64"),
            HostElementType::U8 => write!(f, "u8"),
            HostElementType::U16 => write!(f, "u16"),
            HostElementType::U32 => write!(f, "u32"),
            HostElementType::U64 => write!(f, "u64"),
            HostElementType::F32 => write!(f, "f32"),
            HostElementType::F64 => write!(f, "f64"),
            HostElementType::FixedText { width } => write!(f, "text[{width}]"),
            HostElementType::Text => write!(f, "text"),
        }
    }
}

/// Integer rows of the mapping table: (size, signed, host type).
const INTEGERS: [(u8, bool, HostElementType); 8] = [
    (1, true, HostElementType::I8),
    (2, true, HostElementType::I16),
    (4, true, HostElementType::I32),
    (8, true, HostElementType::I64),
    (1, false, HostElementType::U8),
    (2, false, HostElementType::U16),
    (4, false, HostElementType::U32),
    (8, false, HostElementType::U64),
];

/// Float rows of the mapping table.
const FLOATS: [(u8, HostElementType); 2] = [(4, HostElementType::F32), (8, HostElementType::F64)];

/// Map a container element type to the host element type it decodes to.
pub fn to_host_type(element_type: &ElementType) -> Result<HostElementType> {
    let found = match *element_type {
        ElementType::Int { size, signed, .. } => INTEGERS
            .iter()
            .find(|(s, sg, _)| *s == size && *sg == signed)
            .map(|(_, _, h)| *h),
        ElementType::Float { size, .. } => {
            FLOATS.iter().find(|(s, _)| *s == size).map(|(_, h)| *h)
        }
        ElementType::FixedString { size, .. } if size > 0 => {
            Some(HostElementType::FixedText { width: size })
        }
        ElementType::FixedString { .. } => None,
        ElementType::VarString { .. } => Some(HostElementType::Text),
    };
    found.ok_or_else(|| Error::UnsupportedType(element_type.to_string()))
}

/// Map a host element type to the element type written for it: little-endian
/// numbers, UTF-8 text, null-padded fixed fields.
pub fn from_host_type(host: HostElementType) -> Result<ElementType> {
    if let Some((size, signed, _)) = INTEGERS.iter().find(|(_, _, h)| *h == host) {
        return Ok(ElementType::Int {
            size: *size,
            signed: *signed,
            order: Endian::Little,
        });
    }
    if let Some((size, _)) = FLOATS.iter().find(|(_, h)| *h == host) {
        return Ok(ElementType::Float {
            size: *size,
            order: Endian::Little,
        });
    }
    match host {
        HostElementType::FixedText { width } if width > 0 && width <= u32::MAX as usize => {
            Ok(ElementType::FixedString {
                size: width,
                encoding: TextEncoding::Utf8,
                padding: TextPadding::NullPadded,
            })
        }
        HostElementType::Text => Ok(ElementType::VarString {
            encoding: TextEncoding::Utf8,
        }),
        other => Err(Error::UnsupportedType(other.to_string())),
    }
}

fn endian(order: ByteOrder) -> Result<Endian> {
    match order {
        ByteOrder::LittleEndian => Ok(Endian::Little),
        ByteOrder::BigEndian => Ok(Endian::Big),
        ByteOrder::Vax => Err(Error::UnsupportedType("VAX byte order".into())),
    }
}

fn encoding(charset: CharacterSet) -> TextEncoding {
    match charset {
        CharacterSet::Ascii => TextEncoding::Ascii,
        CharacterSet::Utf8 => TextEncoding::Utf8,
    }
}

/// Classify an on-disk datatype, rejecting everything outside the table.
pub(crate) fn classify(dt: &Datatype) -> Result<ElementType> {
    let element_type = match dt {
        Datatype::FixedPoint {
            size,
            byte_order,
            signed,
            bit_offset,
            bit_precision,
        } => {
            if *bit_offset != 0 || u32::from(*bit_precision) != size * 8 {
                return Err(Error::UnsupportedType(format!(
                    "integer with {bit_precision} significant bits at offset {bit_offset}"
                )));
            }
            ElementType::Int {
                size: u8::try_from(*size).unwrap_or(0),
                signed: *signed,
                order: endian(*byte_order)?,
            }
        }
        Datatype::FloatingPoint {
            size, byte_order, ..
        } => {
            let standard = match size {
                4 => Datatype::float32(*byte_order),
                8 => Datatype::float64(*byte_order),
                _ => {
                    return Err(Error::UnsupportedType(format!("{}-byte float", size)));
                }
            };
            if *dt != standard {
                return Err(Error::UnsupportedType(format!(
                    "non-IEEE {}-byte float layout",
                    size
                )));
            }
            ElementType::Float {
                size: *size as u8,
                order: endian(*byte_order)?,
            }
        }
        Datatype::String {
            size,
            padding,
            charset,
        } => ElementType::FixedString {
            size: *size as usize,
            encoding: encoding(*charset),
            padding: match padding {
                StringPadding::NullTerminate => TextPadding::NullTerminated,
                StringPadding::NullPad => TextPadding::NullPadded,
                StringPadding::SpacePad => TextPadding::SpacePadded,
            },
        },
        Datatype::VariableLength {
            is_string: true,
            charset,
            ..
        } => ElementType::VarString {
            encoding: encoding(*charset),
        },
        Datatype::VariableLength { .. } => {
            return Err(Error::UnsupportedType("variable-length sequence".into()));
        }
        Datatype::Other { class, size } => {
            return Err(Error::UnsupportedType(format!(
                "{} ({size} bytes)",
                class.name()
            )));
        }
    };
    to_host_type(&element_type)?;
    Ok(element_type)
}

/// The datatype message written for `element_type`.
pub(crate) fn to_datatype(element_type: &ElementType) -> Datatype {
    let order = |e: Endian| match e {
        Endian::Little => ByteOrder::LittleEndian,
        Endian::Big => ByteOrder::BigEndian,
    };
    let charset = |e: TextEncoding| match e {
        TextEncoding::Ascii => CharacterSet::Ascii,
        TextEncoding::Utf8 => CharacterSet::Utf8,
    };
    match *element_type {
        ElementType::Int {
            size,
            signed,
            order: o,
        } => Datatype::integer(u32::from(size), signed, order(o)),
        ElementType::Float { size: 4, order: o } => Datatype::float32(order(o)),
        ElementType::Float { order: o, .. } => Datatype::float64(order(o)),
        ElementType::FixedString {
            size,
            encoding,
            padding,
        } => Datatype::String {
            size: size as u32,
            padding: match padding {
                TextPadding::NullTerminated => StringPadding::NullTerminate,
                TextPadding::NullPadded => StringPadding::NullPad,
                TextPadding::SpacePadded => StringPadding::SpacePad,
            },
            charset: charset(encoding),
        },
        ElementType::VarString { encoding } => Datatype::vl_string(charset(encoding)),
    }
}
