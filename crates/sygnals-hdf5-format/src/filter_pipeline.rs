//! Filter pipeline message (0x000B), versions 1 and 2.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec, vec::Vec};

use crate::bytes::{ensure_len, pad8, read_u16, read_u32};
use crate::error::FormatError;

/// zlib deflate.
pub const FILTER_DEFLATE: u16 = 1;
/// Byte shuffle.
pub const FILTER_SHUFFLE: u16 = 2;
/// Fletcher-32 checksum.
pub const FILTER_FLETCHER32: u16 = 3;
/// SZIP; recognised by id only.
pub const FILTER_SZIP: u16 = 4;

/// Filter flag: failure to apply the filter while writing is tolerated.
pub const FILTER_FLAG_OPTIONAL: u16 = 0x0001;

/// One stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescription {
    /// Registered filter id.
    pub filter_id: u16,
    /// Optional name; always present for ids >= 256 in files written by libhdf5.
    pub name: Option<String>,
    /// Filter flags.
    pub flags: u16,
    /// Integer parameters passed to the filter.
    pub client_data: Vec<u32>,
}

impl FilterDescription {
    /// A filter with no name and the given parameters.
    pub fn new(filter_id: u16, client_data: Vec<u32>) -> Self {
        FilterDescription {
            filter_id,
            name: None,
            flags: 0,
            client_data,
        }
    }

    /// True if the optional flag is set.
    pub fn is_optional(&self) -> bool {
        self.flags & FILTER_FLAG_OPTIONAL != 0
    }
}

/// Ordered list of filters; encoding applies them front to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPipeline {
    /// Message version (1 or 2).
    pub version: u8,
    /// Filters in encode order.
    pub filters: Vec<FilterDescription>,
}

impl FilterPipeline {
    /// A version 2 pipeline over `filters`.
    pub fn new(filters: Vec<FilterDescription>) -> Self {
        FilterPipeline {
            version: 2,
            filters,
        }
    }

    /// Parse a filter pipeline message.
    pub fn parse(data: &[u8]) -> Result<FilterPipeline, FormatError> {
        ensure_len(data, 0, 2)?;
        let version = data[0];
        let count = data[1] as usize;
        let mut pos = match version {
            1 => {
                ensure_len(data, 0, 8)?;
                8
            }
            2 => 2,
            other => return Err(FormatError::InvalidFilterPipelineVersion(other)),
        };

        let mut filters = Vec::with_capacity(count);
        for _ in 0..count {
            let filter_id = read_u16(data, pos)?;
            pos += 2;
            // v2 omits the name length for library-defined filters.
            let name_len = if version == 1 || filter_id >= 256 {
                let n = read_u16(data, pos)? as usize;
                pos += 2;
                n
            } else {
                0
            };
            let flags = read_u16(data, pos)?;
            let n_values = read_u16(data, pos + 2)? as usize;
            pos += 4;

            let name = if name_len > 0 {
                ensure_len(data, pos, name_len)?;
                let raw = &data[pos..pos + name_len];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                pos += if version == 1 { pad8(name_len) } else { name_len };
                Some(String::from_utf8_lossy(&raw[..end]).into_owned())
            } else {
                None
            };

            let mut client_data = Vec::with_capacity(n_values);
            for _ in 0..n_values {
                client_data.push(read_u32(data, pos)?);
                pos += 4;
            }
            if version == 1 && n_values % 2 == 1 {
                pos += 4;
            }

            filters.push(FilterDescription {
                filter_id,
                name,
                flags,
                client_data,
            });
        }

        Ok(FilterPipeline { version, filters })
    }

    /// Serialize as a version 2 message.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![2u8, self.filters.len() as u8];
        for f in &self.filters {
            buf.extend_from_slice(&f.filter_id.to_le_bytes());
            if f.filter_id >= 256 {
                let mut name = f.name.clone().unwrap_or_default().into_bytes();
                name.push(0);
                buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
                buf.extend_from_slice(&f.flags.to_le_bytes());
                buf.extend_from_slice(&(f.client_data.len() as u16).to_le_bytes());
                buf.extend_from_slice(&name);
            } else {
                buf.extend_from_slice(&f.flags.to_le_bytes());
                buf.extend_from_slice(&(f.client_data.len() as u16).to_le_bytes());
            }
            for v in &f.client_data {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        buf
    }

    /// First filter id this crate cannot apply, if any.
    pub fn first_unsupported(&self) -> Option<u16> {
        self.filters
            .iter()
            .map(|f| f.filter_id)
            .find(|&id| !crate::filters::is_supported(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_v1_with_padding_and_name() {
        let mut buf = vec![1u8, 2, 0, 0, 0, 0, 0, 0];
        buf.extend_from_slice(&FILTER_DEFLATE.to_le_bytes());
        buf.extend_from_slice(&8u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(b"deflate\0");
        buf.extend_from_slice(&6u32.to_le_bytes());
        buf.extend_from_slice(&[0; 4]);
        buf.extend_from_slice(&FILTER_FLETCHER32.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&FILTER_FLAG_OPTIONAL.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());

        let fp = FilterPipeline::parse(&buf).unwrap();
        assert_eq!(fp.version, 1);
        assert_eq!(fp.filters[0].name.as_deref(), Some("deflate"));
        assert_eq!(fp.filters[0].client_data, vec![6]);
        assert_eq!(fp.filters[1].filter_id, FILTER_FLETCHER32);
        assert!(fp.filters[1].is_optional());
    }

    #[test]
    fn v2_roundtrip_including_named_filter() {
        let fp = FilterPipeline::new(vec![
            FilterDescription::new(FILTER_SHUFFLE, vec![]),
            FilterDescription::new(FILTER_DEFLATE, vec![4]),
            FilterDescription {
                filter_id: 32001,
                name: Some("blosc".into()),
                flags: FILTER_FLAG_OPTIONAL,
                client_data: vec![2, 2, 4],
            },
        ]);
        let parsed = FilterPipeline::parse(&fp.serialize()).unwrap();
        assert_eq!(parsed, fp);
        assert_eq!(parsed.first_unsupported(), Some(32001));
    }

    #[test]
    fn rejects_unknown_version() {
        assert_eq!(
            FilterPipeline::parse(&[3, 0]),
            Err(FormatError::InvalidFilterPipelineVersion(3))
        );
    }
}
