//! Error types for HDF5 format parsing and serialization.

#[cfg(not(feature = "std"))]
use alloc::string::String;

use core::fmt;

/// Errors that can occur when parsing or producing HDF5 binary structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The HDF5 magic signature was not found at any valid offset.
    SignatureNotFound,
    /// The superblock version is not supported.
    UnsupportedVersion(u8),
    /// Unexpected end of data.
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// Invalid offset size (must be 2, 4, or 8).
    InvalidOffsetSize(u8),
    /// Invalid length size (must be 2, 4, or 8).
    InvalidLengthSize(u8),
    /// Invalid object header signature.
    InvalidObjectHeaderSignature,
    /// Invalid object header version.
    InvalidObjectHeaderVersion(u8),
    /// Unknown message type that is marked as must-understand.
    UnsupportedMessage(u16),
    /// Jenkins lookup3 checksum mismatch.
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// Datatype class id outside 0..=11.
    InvalidDatatypeClass(u8),
    /// Datatype version not valid for its class.
    InvalidDatatypeVersion {
        /// Datatype class id.
        class: u8,
        /// Version found.
        version: u8,
    },
    /// String padding field out of range.
    InvalidStringPadding(u8),
    /// Character set field out of range.
    InvalidCharacterSet(u8),
    /// Dataspace type byte out of range.
    InvalidDataspaceType(u8),
    /// Dataspace message version not supported.
    InvalidDataspaceVersion(u8),
    /// Fill value message version not supported.
    InvalidFillValueVersion(u8),
    /// Data layout message version not supported.
    InvalidLayoutVersion(u8),
    /// Data layout class not recognized.
    InvalidLayoutClass(u8),
    /// Layout class that is valid HDF5 but not readable here (e.g. virtual).
    UnsupportedLayout(u8),
    /// Chunk index type that is valid HDF5 but not readable here.
    UnsupportedChunkIndex(u8),
    /// Chunk layout metadata that contradicts itself.
    InconsistentChunkLayout(String),
    /// Link message version not supported.
    InvalidLinkVersion(u8),
    /// Link type not recognized.
    InvalidLinkType(u8),
    /// Link info message version not supported.
    InvalidLinkInfoVersion(u8),
    /// Group uses fractal-heap (dense) link storage.
    DenseLinkStorage,
    /// Attribute message version not supported.
    InvalidAttributeVersion(u8),
    /// Filter pipeline message version not supported.
    InvalidFilterPipelineVersion(u8),
    /// Filter id without an implementation.
    UnsupportedFilter(u16),
    /// A filter failed while decoding or encoding chunk bytes.
    FilterError(String),
    /// B-tree node signature is not `TREE`.
    InvalidBTreeSignature,
    /// B-tree node type is not the one the caller asked for.
    InvalidBTreeNodeType(u8),
    /// Local heap signature is not `HEAP`.
    InvalidLocalHeapSignature,
    /// Symbol table node signature is not `SNOD`.
    InvalidSymbolTableNodeSignature,
    /// Global heap signature is not `GCOL`.
    InvalidGlobalHeapSignature,
    /// Global heap version is not 1.
    InvalidGlobalHeapVersion(u8),
    /// A variable-length reference points to a missing heap object.
    GlobalHeapObjectNotFound {
        /// Collection address.
        collection: u64,
        /// Object index within the collection.
        index: u32,
    },
    /// Fixed array header or data block signature mismatch.
    InvalidFixedArraySignature,
    /// An address that does not point inside the file.
    InvalidAddress(u64),
    /// Serialized message does not fit the 16-bit size field.
    MessageTooLarge(usize),
    /// Byte count that does not match what the metadata declares.
    DataSizeMismatch {
        /// Bytes the metadata implies.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },
    /// A link refers to an object id that was never declared.
    UnknownObject(usize),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::SignatureNotFound => {
                write!(f, "HDF5 signature not found at any valid offset")
            }
            FormatError::UnsupportedVersion(v) => {
                write!(f, "unsupported superblock version: {v}")
            }
            FormatError::UnexpectedEof {
                expected,
                available,
            } => {
                write!(f, "unexpected EOF: need {expected} bytes, have {available}")
            }
            FormatError::InvalidOffsetSize(s) => {
                write!(f, "invalid offset size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidLengthSize(s) => {
                write!(f, "invalid length size: {s} (must be 2, 4, or 8)")
            }
            FormatError::InvalidObjectHeaderSignature => {
                write!(f, "invalid object header signature")
            }
            FormatError::InvalidObjectHeaderVersion(v) => {
                write!(f, "invalid object header version: {v}")
            }
            FormatError::UnsupportedMessage(id) => {
                write!(
                    f,
                    "unsupported message type {id:#06x} marked as must-understand"
                )
            }
            FormatError::ChecksumMismatch { expected, computed } => {
                write!(
                    f,
                    "checksum mismatch: expected {expected:#010x}, computed {computed:#010x}"
                )
            }
            FormatError::InvalidDatatypeClass(c) => write!(f, "invalid datatype class: {c}"),
            FormatError::InvalidDatatypeVersion { class, version } => {
                write!(f, "invalid version {version} for datatype class {class}")
            }
            FormatError::InvalidStringPadding(p) => write!(f, "invalid string padding: {p}"),
            FormatError::InvalidCharacterSet(c) => write!(f, "invalid character set: {c}"),
            FormatError::InvalidDataspaceType(t) => write!(f, "invalid dataspace type: {t}"),
            FormatError::InvalidDataspaceVersion(v) => {
                write!(f, "invalid dataspace version: {v}")
            }
            FormatError::InvalidFillValueVersion(v) => {
                write!(f, "invalid fill value message version: {v}")
            }
            FormatError::InvalidLayoutVersion(v) => write!(f, "invalid data layout version: {v}"),
            FormatError::InvalidLayoutClass(c) => write!(f, "invalid data layout class: {c}"),
            FormatError::UnsupportedLayout(c) => {
                write!(f, "data layout class {c} is not supported")
            }
            FormatError::UnsupportedChunkIndex(t) => {
                write!(f, "chunk index type {t} is not supported")
            }
            FormatError::InconsistentChunkLayout(msg) => {
                write!(f, "inconsistent chunk layout: {msg}")
            }
            FormatError::InvalidLinkVersion(v) => write!(f, "invalid link message version: {v}"),
            FormatError::InvalidLinkType(t) => write!(f, "invalid link type: {t}"),
            FormatError::InvalidLinkInfoVersion(v) => {
                write!(f, "invalid link info message version: {v}")
            }
            FormatError::DenseLinkStorage => {
                write!(f, "group uses dense (fractal heap) link storage")
            }
            FormatError::InvalidAttributeVersion(v) => {
                write!(f, "invalid attribute message version: {v}")
            }
            FormatError::InvalidFilterPipelineVersion(v) => {
                write!(f, "invalid filter pipeline version: {v}")
            }
            FormatError::UnsupportedFilter(id) => write!(f, "unsupported filter id {id}"),
            FormatError::FilterError(msg) => write!(f, "filter error: {msg}"),
            FormatError::InvalidBTreeSignature => write!(f, "invalid B-tree node signature"),
            FormatError::InvalidBTreeNodeType(t) => write!(f, "unexpected B-tree node type {t}"),
            FormatError::InvalidLocalHeapSignature => write!(f, "invalid local heap signature"),
            FormatError::InvalidSymbolTableNodeSignature => {
                write!(f, "invalid symbol table node signature")
            }
            FormatError::InvalidGlobalHeapSignature => write!(f, "invalid global heap signature"),
            FormatError::InvalidGlobalHeapVersion(v) => {
                write!(f, "invalid global heap version: {v}")
            }
            FormatError::GlobalHeapObjectNotFound { collection, index } => {
                write!(
                    f,
                    "global heap object {index} not found in collection at {collection:#x}"
                )
            }
            FormatError::InvalidFixedArraySignature => {
                write!(f, "invalid fixed array signature")
            }
            FormatError::InvalidAddress(a) => write!(f, "address {a:#x} is outside the file"),
            FormatError::MessageTooLarge(n) => {
                write!(f, "header message of {n} bytes exceeds 65535")
            }
            FormatError::DataSizeMismatch { expected, actual } => {
                write!(f, "data size mismatch: expected {expected} bytes, got {actual}")
            }
            FormatError::UnknownObject(id) => write!(f, "link to undeclared object {id}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FormatError {}
