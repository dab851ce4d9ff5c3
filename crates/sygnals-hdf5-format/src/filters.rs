//! Filter implementations: deflate (behind the `deflate` feature), shuffle, fletcher32.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::error::FormatError;
use crate::filter_pipeline::{FilterPipeline, FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_SHUFFLE};

/// Default zlib level when a deflate filter carries no parameter.
pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;

/// True if `filter_id` can be applied in both directions.
pub fn is_supported(filter_id: u16) -> bool {
    match filter_id {
        FILTER_SHUFFLE | FILTER_FLETCHER32 => true,
        FILTER_DEFLATE => cfg!(feature = "deflate"),
        _ => false,
    }
}

/// Undo a pipeline on stored chunk bytes.
///
/// Filters run in reverse order. Bit `i` of `filter_mask` marks filter `i`
/// as skipped for this chunk.
pub fn decode_chunk(
    stored: &[u8],
    pipeline: &FilterPipeline,
    filter_mask: u32,
    element_size: usize,
) -> Result<Vec<u8>, FormatError> {
    let mut data = stored.to_vec();
    for (i, filter) in pipeline.filters.iter().enumerate().rev() {
        if i < 32 && filter_mask & (1 << i) != 0 {
            continue;
        }
        data = match filter.filter_id {
            FILTER_SHUFFLE => unshuffle(&data, element_size),
            FILTER_DEFLATE => inflate(&data)?,
            FILTER_FLETCHER32 => fletcher32_strip(&data)?,
            other => return Err(FormatError::UnsupportedFilter(other)),
        };
    }
    Ok(data)
}

/// Apply a pipeline to raw chunk bytes. Every filter is applied, so the
/// resulting filter mask is always zero.
pub fn encode_chunk(
    raw: &[u8],
    pipeline: &FilterPipeline,
    element_size: usize,
) -> Result<Vec<u8>, FormatError> {
    let mut data = raw.to_vec();
    for filter in &pipeline.filters {
        data = match filter.filter_id {
            FILTER_SHUFFLE => shuffle(&data, element_size),
            FILTER_DEFLATE => {
                let level = filter
                    .client_data
                    .first()
                    .copied()
                    .unwrap_or(DEFAULT_DEFLATE_LEVEL);
                deflate(&data, level)?
            }
            FILTER_FLETCHER32 => fletcher32_append(&data),
            other => return Err(FormatError::UnsupportedFilter(other)),
        };
    }
    Ok(data)
}

#[cfg(feature = "deflate")]
fn inflate(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    use std::io::Read;
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FormatError::FilterError(e.to_string()))?;
    Ok(out)
}

#[cfg(not(feature = "deflate"))]
fn inflate(_data: &[u8]) -> Result<Vec<u8>, FormatError> {
    Err(FormatError::UnsupportedFilter(FILTER_DEFLATE))
}

#[cfg(feature = "deflate")]
fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>, FormatError> {
    use std::io::Write;
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| FormatError::FilterError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| FormatError::FilterError(e.to_string()))
}

#[cfg(not(feature = "deflate"))]
fn deflate(_data: &[u8], _level: u32) -> Result<Vec<u8>, FormatError> {
    Err(FormatError::UnsupportedFilter(FILTER_DEFLATE))
}

/// Group byte `j` of every element together. Trailing bytes that do not
/// form a whole element are copied unchanged.
fn shuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 || data.len() < element_size {
        return data.to_vec();
    }
    let n = data.len() / element_size;
    let mut out = vec![0u8; data.len()];
    for i in 0..n {
        for j in 0..element_size {
            out[j * n + i] = data[i * element_size + j];
        }
    }
    let tail = n * element_size;
    out[tail..].copy_from_slice(&data[tail..]);
    out
}

fn unshuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 || data.len() < element_size {
        return data.to_vec();
    }
    let n = data.len() / element_size;
    let mut out = vec![0u8; data.len()];
    for i in 0..n {
        for j in 0..element_size {
            out[i * element_size + j] = data[j * n + i];
        }
    }
    let tail = n * element_size;
    out[tail..].copy_from_slice(&data[tail..]);
    out
}

/// Fletcher-32 over big-endian 16-bit words with end-around-carry folding.
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;
    let mut words = data.chunks_exact(2);
    // 360 words keep both sums inside u32 before folding.
    loop {
        let mut taken = 0;
        for w in words.by_ref().take(360) {
            sum1 += ((w[0] as u32) << 8) | w[1] as u32;
            sum2 += sum1;
            taken += 1;
        }
        sum1 = (sum1 & 0xffff) + (sum1 >> 16);
        sum2 = (sum2 & 0xffff) + (sum2 >> 16);
        if taken < 360 {
            break;
        }
    }
    if let [last] = words.remainder() {
        sum1 += (*last as u32) << 8;
        sum2 += sum1;
        sum1 = (sum1 & 0xffff) + (sum1 >> 16);
        sum2 = (sum2 & 0xffff) + (sum2 >> 16);
    }
    sum1 = (sum1 & 0xffff) + (sum1 >> 16);
    sum2 = (sum2 & 0xffff) + (sum2 >> 16);
    (sum2 << 16) | sum1
}

fn fletcher32_append(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 4);
    out.extend_from_slice(data);
    out.extend_from_slice(&fletcher32(data).to_le_bytes());
    out
}

fn fletcher32_strip(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    if data.len() < 4 {
        return Err(FormatError::FilterError(
            "fletcher32: chunk shorter than its checksum".into(),
        ));
    }
    let (payload, tail) = data.split_at(data.len() - 4);
    let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let computed = fletcher32(payload);
    // Very old writers stored each 16-bit half byte-swapped.
    let swapped = ((computed & 0x00ff_00ff) << 8) | ((computed & 0xff00_ff00) >> 8);
    if stored != computed && stored != swapped {
        return Err(FormatError::ChecksumMismatch {
            expected: stored,
            computed,
        });
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_pipeline::FilterDescription;

    #[test]
    fn shuffle_layout_and_inverse() {
        let data = [0xA0, 0xA1, 0xA2, 0xA3, 0xB0, 0xB1, 0xB2, 0xB3, 0xCC];
        let s = shuffle(&data, 4);
        assert_eq!(s, [0xA0, 0xB0, 0xA1, 0xB1, 0xA2, 0xB2, 0xA3, 0xB3, 0xCC]);
        assert_eq!(unshuffle(&s, 4), data);
    }

    #[test]
    fn fletcher32_reference_values() {
        assert_eq!(fletcher32(&[0; 16]), 0);
        // words 0x0102, 0x0304: sum1 = 0x0406, sum2 = 0x0102 + 0x0406
        assert_eq!(fletcher32(&[1, 2, 3, 4]), (0x0508 << 16) | 0x0406);
        // odd length pads the last byte as the high half of a word
        assert_eq!(fletcher32(&[1, 2, 3]), (0x0504 << 16) | 0x0402);
    }

    #[test]
    fn fletcher32_detects_corruption() {
        let pipeline = FilterPipeline::new(vec![FilterDescription::new(FILTER_FLETCHER32, vec![])]);
        let mut stored = encode_chunk(&[9u8; 40], &pipeline, 1).unwrap();
        assert_eq!(decode_chunk(&stored, &pipeline, 0, 1).unwrap(), vec![9u8; 40]);
        stored[3] ^= 0x10;
        assert!(matches!(
            decode_chunk(&stored, &pipeline, 0, 1),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn filter_mask_skips_stages() {
        let pipeline = FilterPipeline::new(vec![
            FilterDescription::new(FILTER_SHUFFLE, vec![]),
            FilterDescription::new(FILTER_FLETCHER32, vec![]),
        ]);
        let raw: Vec<u8> = (0..32).collect();
        // shuffle skipped: only the checksum was applied
        let stored = fletcher32_append(&raw);
        assert_eq!(decode_chunk(&stored, &pipeline, 0b01, 4).unwrap(), raw);
    }

    #[test]
    fn unknown_filter_is_rejected_both_ways() {
        let pipeline = FilterPipeline::new(vec![FilterDescription::new(307, vec![])]);
        assert_eq!(
            decode_chunk(&[0; 8], &pipeline, 0, 1),
            Err(FormatError::UnsupportedFilter(307))
        );
        assert_eq!(
            encode_chunk(&[0; 8], &pipeline, 1),
            Err(FormatError::UnsupportedFilter(307))
        );
        assert!(!is_supported(307));
    }

    #[test]
    #[cfg(feature = "deflate")]
    fn shuffle_deflate_fletcher_pipeline() {
        let pipeline = FilterPipeline::new(vec![
            FilterDescription::new(FILTER_SHUFFLE, vec![]),
            FilterDescription::new(FILTER_DEFLATE, vec![6]),
            FilterDescription::new(FILTER_FLETCHER32, vec![]),
        ]);
        let raw: Vec<u8> = (0..4000u32).flat_map(|i| (i as f64).to_le_bytes()).collect();
        let stored = encode_chunk(&raw, &pipeline, 8).unwrap();
        assert!(stored.len() < raw.len());
        assert_eq!(decode_chunk(&stored, &pipeline, 0, 8).unwrap(), raw);
    }

    #[test]
    #[cfg(feature = "deflate")]
    fn inflate_known_zlib_stream() {
        let compressed = [
            120u8, 156, 99, 96, 100, 98, 102, 97, 101, 99, 231, 224, 4, 0, 0, 175, 0, 46,
        ];
        assert_eq!(inflate(&compressed).unwrap(), (0u8..10).collect::<Vec<_>>());
    }
}
