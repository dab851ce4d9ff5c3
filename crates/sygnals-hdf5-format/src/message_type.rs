//! Object header message type identifiers.

/// Header message types this crate distinguishes.
///
/// Everything else is carried as `Unknown` so that the must-understand
/// flag can be enforced by the object header parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Nil,
    Dataspace,
    LinkInfo,
    Datatype,
    FillValueOld,
    FillValue,
    Link,
    DataLayout,
    GroupInfo,
    FilterPipeline,
    Attribute,
    ObjectHeaderContinuation,
    SymbolTable,
    ObjectModificationTime,
    AttributeInfo,
    /// Any other message id.
    Unknown(u16),
}

const TABLE: [(u16, MessageType); 15] = [
    (0x0000, MessageType::Nil),
    (0x0001, MessageType::Dataspace),
    (0x0002, MessageType::LinkInfo),
    (0x0003, MessageType::Datatype),
    (0x0004, MessageType::FillValueOld),
    (0x0005, MessageType::FillValue),
    (0x0006, MessageType::Link),
    (0x0008, MessageType::DataLayout),
    (0x000A, MessageType::GroupInfo),
    (0x000B, MessageType::FilterPipeline),
    (0x000C, MessageType::Attribute),
    (0x0010, MessageType::ObjectHeaderContinuation),
    (0x0011, MessageType::SymbolTable),
    (0x0012, MessageType::ObjectModificationTime),
    (0x0015, MessageType::AttributeInfo),
];

impl MessageType {
    /// Convert a raw type id to a `MessageType`.
    pub fn from_u16(val: u16) -> MessageType {
        TABLE
            .iter()
            .find(|(id, _)| *id == val)
            .map(|(_, t)| *t)
            .unwrap_or(MessageType::Unknown(val))
    }

    /// Convert back to the raw type id.
    pub fn to_u16(self) -> u16 {
        match self {
            MessageType::Unknown(v) => v,
            known => TABLE
                .iter()
                .find(|(_, t)| *t == known)
                .map(|(id, _)| *id)
                .unwrap_or(0),
        }
    }
}
