//! Dataspace message (0x0001) parsing and serialization.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::bytes::{ensure_len, read_uint, write_uint};
use crate::error::FormatError;

/// Kind of dataspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataspaceType {
    /// A single element.
    Scalar,
    /// An N-dimensional array.
    Simple,
    /// No elements at all.
    Null,
}

/// Parsed dataspace message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    /// The type of this dataspace.
    pub space_type: DataspaceType,
    /// Current dimension sizes (empty for scalar and null).
    pub dimensions: Vec<u64>,
    /// Maximum dimension sizes, if stored. `u64::MAX` means unlimited.
    pub max_dimensions: Option<Vec<u64>>,
}

impl Dataspace {
    /// Scalar dataspace.
    pub fn scalar() -> Dataspace {
        Dataspace {
            space_type: DataspaceType::Scalar,
            dimensions: Vec::new(),
            max_dimensions: None,
        }
    }

    /// Simple dataspace with fixed dimensions. An empty slice yields a scalar.
    pub fn simple(dimensions: &[u64]) -> Dataspace {
        if dimensions.is_empty() {
            return Dataspace::scalar();
        }
        Dataspace {
            space_type: DataspaceType::Simple,
            dimensions: dimensions.to_vec(),
            max_dimensions: None,
        }
    }

    /// Parse a dataspace message; `length_size` comes from the superblock.
    pub fn parse(data: &[u8], length_size: u8) -> Result<Dataspace, FormatError> {
        ensure_len(data, 0, 4)?;
        let version = data[0];
        let rank = data[1] as usize;
        let flags = data[2];

        let (space_type, mut pos) = match version {
            // v1: 1 reserved byte + 4 reserved bytes; rank 0 means scalar.
            1 => {
                ensure_len(data, 0, 8)?;
                let t = if rank == 0 {
                    DataspaceType::Scalar
                } else {
                    DataspaceType::Simple
                };
                (t, 8usize)
            }
            2 => {
                let t = match data[3] {
                    0 => DataspaceType::Scalar,
                    1 => DataspaceType::Simple,
                    2 => DataspaceType::Null,
                    other => return Err(FormatError::InvalidDataspaceType(other)),
                };
                (t, 4usize)
            }
            other => return Err(FormatError::InvalidDataspaceVersion(other)),
        };

        let ls = length_size as usize;
        let mut dimensions = Vec::with_capacity(rank);
        for _ in 0..rank {
            dimensions.push(read_uint(data, pos, length_size)?);
            pos += ls;
        }
        let max_dimensions = if flags & 0x01 != 0 {
            let mut max = Vec::with_capacity(rank);
            for _ in 0..rank {
                max.push(read_uint(data, pos, length_size)?);
                pos += ls;
            }
            Some(max)
        } else {
            None
        };

        Ok(Dataspace {
            space_type,
            dimensions,
            max_dimensions,
        })
    }

    /// Serialize as a version 2 dataspace message.
    pub fn serialize(&self, length_size: u8) -> Vec<u8> {
        let ls = length_size as usize;
        let mut buf = Vec::with_capacity(4 + 2 * ls * self.dimensions.len());
        buf.push(2);
        buf.push(self.dimensions.len() as u8);
        buf.push(u8::from(self.max_dimensions.is_some()));
        buf.push(match self.space_type {
            DataspaceType::Scalar => 0,
            DataspaceType::Simple => 1,
            DataspaceType::Null => 2,
        });
        for &d in &self.dimensions {
            write_uint(&mut buf, d, ls);
        }
        if let Some(max) = &self.max_dimensions {
            for &d in max {
                write_uint(&mut buf, d, ls);
            }
        }
        buf
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Total number of elements: 1 for scalar, 0 for null.
    pub fn num_elements(&self) -> u64 {
        match self.space_type {
            DataspaceType::Scalar => 1,
            DataspaceType::Null => 0,
            DataspaceType::Simple => self.dimensions.iter().product(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_roundtrip() {
        let ds = Dataspace::simple(&[3, 4, 5]);
        let parsed = Dataspace::parse(&ds.serialize(8), 8).unwrap();
        assert_eq!(parsed, ds);
        assert_eq!(parsed.num_elements(), 60);
        assert_eq!(parsed.rank(), 3);
    }

    #[test]
    fn scalar_and_null() {
        let s = Dataspace::simple(&[]);
        assert_eq!(s.space_type, DataspaceType::Scalar);
        assert_eq!(Dataspace::parse(&s.serialize(8), 8).unwrap().num_elements(), 1);

        let null = [2u8, 0, 0, 2];
        assert_eq!(Dataspace::parse(&null, 8).unwrap().num_elements(), 0);
    }

    #[test]
    fn v1_with_max_dims() {
        let mut buf = vec![1u8, 1, 0x01, 0, 0, 0, 0, 0];
        buf.extend_from_slice(&10u64.to_le_bytes());
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        let ds = Dataspace::parse(&buf, 8).unwrap();
        assert_eq!(ds.dimensions, vec![10]);
        assert_eq!(ds.max_dimensions, Some(vec![u64::MAX]));
    }

    #[test]
    fn zero_extent_dimension() {
        let ds = Dataspace::simple(&[0, 7]);
        assert_eq!(ds.num_elements(), 0);
        assert_eq!(Dataspace::parse(&ds.serialize(8), 8).unwrap(), ds);
    }

    #[test]
    fn rejects_bad_version_and_type() {
        assert_eq!(
            Dataspace::parse(&[3, 0, 0, 0], 8),
            Err(FormatError::InvalidDataspaceVersion(3))
        );
        assert_eq!(
            Dataspace::parse(&[2, 0, 0, 7], 8),
            Err(FormatError::InvalidDataspaceType(7))
        );
    }
}
