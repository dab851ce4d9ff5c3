//! Container signature (magic bytes) detection.

use crate::error::FormatError;

/// The 8-byte HDF5 magic signature.
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// Candidate offsets where a signature may live: 0, then 512, 1024, 2048, ...
fn candidate_offsets(len: usize) -> impl Iterator<Item = usize> {
    core::iter::once(0)
        .chain(core::iter::successors(Some(512usize), |o| o.checked_mul(2)))
        .take_while(move |o| o.saturating_add(HDF5_SIGNATURE.len()) <= len)
}

/// Locate the signature and return its byte offset.
///
/// A user block may precede the superblock, so the signature can appear at
/// offset 0 or at any power of two from 512 upward.
pub fn find_signature(data: &[u8]) -> Result<usize, FormatError> {
    candidate_offsets(data.len())
        .find(|&off| data[off..off + HDF5_SIGNATURE.len()] == HDF5_SIGNATURE)
        .ok_or(FormatError::SignatureNotFound)
}
