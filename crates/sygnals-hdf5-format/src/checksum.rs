//! Metadata checksum: Bob Jenkins' lookup3 `hashlittle`.
//!
//! Superblocks v2/v3, v2 object headers, continuation blocks and fixed-array
//! index blocks all carry this checksum over their preceding bytes.

use byteorder::{ByteOrder, LittleEndian};

/// Compute the lookup3 checksum of `data` with an initial value of zero.
pub fn jenkins_lookup3(data: &[u8]) -> u32 {
    hashlittle(data, 0)
}

/// Verify that the 4 bytes at `data[end..end + 4]` hold the checksum of `data[start..end]`.
pub fn verify_trailing(data: &[u8], start: usize, end: usize) -> Result<(), crate::error::FormatError> {
    crate::bytes::ensure_len(data, end, 4)?;
    let stored = LittleEndian::read_u32(&data[end..end + 4]);
    let computed = jenkins_lookup3(&data[start..end]);
    if stored == computed {
        Ok(())
    } else {
        Err(crate::error::FormatError::ChecksumMismatch {
            expected: stored,
            computed,
        })
    }
}

#[inline]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

#[inline]
fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

fn hashlittle(data: &[u8], initval: u32) -> u32 {
    let seed = 0xdead_beef_u32
        .wrapping_add(data.len() as u32)
        .wrapping_add(initval);
    let (mut a, mut b, mut c) = (seed, seed, seed);

    // Every 12-byte block except the last one goes through `mix`.
    let mut rest = data;
    while rest.len() > 12 {
        a = a.wrapping_add(LittleEndian::read_u32(&rest[0..4]));
        b = b.wrapping_add(LittleEndian::read_u32(&rest[4..8]));
        c = c.wrapping_add(LittleEndian::read_u32(&rest[8..12]));
        mix(&mut a, &mut b, &mut c);
        rest = &rest[12..];
    }

    if rest.is_empty() {
        return c;
    }

    // The final 1..=12 bytes are added as zero-padded little-endian words.
    let mut tail = [0u8; 12];
    tail[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(LittleEndian::read_u32(&tail[0..4]));
    b = b.wrapping_add(LittleEndian::read_u32(&tail[4..8]));
    c = c.wrapping_add(LittleEndian::read_u32(&tail[8..12]));
    final_mix(&mut a, &mut b, &mut c);
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_seed() {
        assert_eq!(jenkins_lookup3(b""), 0xdead_beef);
    }

    #[test]
    fn reference_vector() {
        // hashlittle("Four score and seven years ago", 30, 0) from lookup3.c
        assert_eq!(
            jenkins_lookup3(b"Four score and seven years ago"),
            0x1777_0551
        );
    }

    #[test]
    fn seeded_reference_vector() {
        let text = b"Four score and seven years ago";
        assert_eq!(hashlittle(text, 1), 0xcd62_8161);
    }

    #[test]
    fn every_tail_length_differs() {
        let data: Vec<u8> = (0u8..40).collect();
        let mut seen = std::collections::HashSet::new();
        for len in 0..=data.len() {
            assert!(seen.insert(jenkins_lookup3(&data[..len])), "collision at {len}");
        }
    }

    #[test]
    fn verify_trailing_detects_flip() {
        let mut buf = b"OHDRsome header bytes".to_vec();
        let sum = jenkins_lookup3(&buf);
        let end = buf.len();
        buf.extend_from_slice(&sum.to_le_bytes());
        assert!(verify_trailing(&buf, 0, end).is_ok());
        buf[5] ^= 0x40;
        assert!(matches!(
            verify_trailing(&buf, 0, end),
            Err(crate::error::FormatError::ChecksumMismatch { .. })
        ));
    }
}
