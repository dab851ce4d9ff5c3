//! Hyperslab selections and the block copy used to scatter chunks.

use crate::error::{Error, Result};

/// A rectangular region: `count[d]` elements from `start[d]` in each dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub start: Vec<u64>,
    pub count: Vec<u64>,
}

impl Selection {
    pub fn new(start: Vec<u64>, count: Vec<u64>) -> Selection {
        Selection { start, count }
    }

    /// The whole of a dataset of `shape`.
    pub fn all(shape: &[u64]) -> Selection {
        Selection {
            start: vec![0; shape.len()],
            count: shape.to_vec(),
        }
    }

    /// Check rank and bounds against `shape`.
    pub fn validate(&self, shape: &[u64]) -> Result<()> {
        if self.start.len() != shape.len() || self.count.len() != shape.len() {
            return Err(Error::invalid(format!(
                "selection of rank {} on a dataset of rank {}",
                self.start.len(),
                shape.len()
            )));
        }
        for (d, ((&s, &c), &n)) in self.start.iter().zip(&self.count).zip(shape).enumerate() {
            if s.checked_add(c).map_or(true, |end| end > n) {
                return Err(Error::invalid(format!(
                    "selection {s}+{c} exceeds extent {n} in dimension {d}"
                )));
            }
        }
        Ok(())
    }

    pub fn num_elements(&self) -> u64 {
        self.count.iter().product()
    }

    /// True if the block at `origin` with extent `shape` intersects the selection.
    pub fn overlaps(&self, origin: &[u64], shape: &[u64]) -> bool {
        (0..origin.len()).all(|d| {
            origin[d] < self.start[d] + self.count[d] && self.start[d] < origin[d] + shape[d]
        })
    }
}

/// A row-major block of elements placed at `origin` in dataset coordinates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Block<'a> {
    pub origin: &'a [u64],
    pub shape: &'a [u64],
}

impl Block<'_> {
    fn offset_of(&self, index: &[u64]) -> usize {
        let mut offset = 0u64;
        for d in 0..index.len() {
            offset = offset * self.shape[d] + (index[d] - self.origin[d]);
        }
        offset as usize
    }
}

/// Copy the elements where `from` and `to` intersect.
///
/// Both buffers must hold their whole block. Runs along the last dimension
/// are copied with a single slice copy.
pub(crate) fn copy_overlap(
    src: &[u8],
    from: Block<'_>,
    dst: &mut [u8],
    to: Block<'_>,
    element_size: usize,
) {
    let rank = from.shape.len();
    if rank == 0 {
        dst[..element_size].copy_from_slice(&src[..element_size]);
        return;
    }
    let mut lo = vec![0u64; rank];
    let mut hi = vec![0u64; rank];
    for d in 0..rank {
        lo[d] = from.origin[d].max(to.origin[d]);
        hi[d] = (from.origin[d] + from.shape[d]).min(to.origin[d] + to.shape[d]);
        if lo[d] >= hi[d] {
            return;
        }
    }
    let run = (hi[rank - 1] - lo[rank - 1]) as usize * element_size;
    let mut index = lo.clone();
    loop {
        let s = from.offset_of(&index) * element_size;
        let t = to.offset_of(&index) * element_size;
        dst[t..t + run].copy_from_slice(&src[s..s + run]);

        // odometer over every dimension but the last
        let mut d = rank - 1;
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            index[d] += 1;
            if index[d] < hi[d] {
                break;
            }
            index[d] = lo[d];
        }
    }
}
