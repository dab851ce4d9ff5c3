//! Error taxonomy of the adapter.

use std::io;

use sygnals_hdf5_format::error::FormatError;

/// Largest body a header message can carry.
pub(crate) const MAX_MESSAGE_BYTES: usize = u16::MAX as usize;

/// Errors surfaced to the host. Nothing is logged and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing, unwritable or truncated file, or not an HDF5 file at all.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The index contradicts itself: dangling reference, cycle, checksum
    /// mismatch, corrupt chunk.
    #[error("structural corruption: {0}")]
    StructuralCorruption(String),

    /// Element type outside the mapping table.
    #[error("unsupported element type: {0}")]
    UnsupportedType(String),

    /// Chunk filter that is unknown or not compiled in.
    #[error("unsupported filter id {0}")]
    UnsupportedFilter(u16),

    /// Encode target incompatible with the array, or text wider than its field.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Attribute payload over the configured bound.
    #[error("attribute value of {size} bytes exceeds the {limit}-byte limit; store it as a dataset")]
    ValueTooLarge { size: usize, limit: usize },

    /// Group or dataset path absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Host API version outside the declared compatibility range.
    #[error("host API version {host} is outside the supported range {supported}")]
    ApiCompatibility { host: String, supported: String },

    /// Valid HDF5 outside the basic scope (dense links, virtual layout, ...).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Caller error: bad selection, duplicate name, bad chunk shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The cancellation flag was raised between chunks.
    #[error("operation cancelled")]
    Cancelled,
}

/// Payload-free discriminant of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    StructuralCorruption,
    UnsupportedType,
    UnsupportedFilter,
    TypeMismatch,
    ValueTooLarge,
    NotFound,
    ApiCompatibility,
    UnsupportedFeature,
    InvalidInput,
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::StructuralCorruption(_) => ErrorKind::StructuralCorruption,
            Error::UnsupportedType(_) => ErrorKind::UnsupportedType,
            Error::UnsupportedFilter(_) => ErrorKind::UnsupportedFilter,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::ValueTooLarge { .. } => ErrorKind::ValueTooLarge,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::ApiCompatibility { .. } => ErrorKind::ApiCompatibility,
            Error::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Prefix the message with the object path it concerns.
    pub(crate) fn at(self, path: &str) -> Error {
        match self {
            Error::StructuralCorruption(msg) => Error::StructuralCorruption(format!("{path}: {msg}")),
            Error::UnsupportedType(msg) => Error::UnsupportedType(format!("{path}: {msg}")),
            Error::UnsupportedFeature(msg) => Error::UnsupportedFeature(format!("{path}: {msg}")),
            other => other,
        }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Error {
        Error::StructuralCorruption(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Error {
        Error::InvalidInput(msg.into())
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::SignatureNotFound => Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "not an HDF5 container: signature not found",
            )),
            FormatError::UnsupportedFilter(id) => Error::UnsupportedFilter(id),
            FormatError::MessageTooLarge(size) => Error::ValueTooLarge {
                size,
                limit: MAX_MESSAGE_BYTES,
            },
            FormatError::UnsupportedVersion(_)
            | FormatError::UnsupportedLayout(_)
            | FormatError::UnsupportedChunkIndex(_)
            | FormatError::UnsupportedMessage(_)
            | FormatError::DenseLinkStorage => Error::UnsupportedFeature(e.to_string()),
            other => Error::StructuralCorruption(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
