//! Option structs, limits and the cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sygnals_hdf5_format::filter_pipeline::{
    FilterDescription, FilterPipeline, FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_SHUFFLE,
};

use crate::error::{Error, Result};

/// Upper bound on the unfiltered size of one chunk.
pub const MAX_CHUNK_BYTES: u64 = 1024 * 1024;

/// Upper bound on an attribute value; larger data belongs in a dataset.
pub const MAX_ATTRIBUTE_BYTES: usize = 64 * 1024 - 1024;

/// Shared flag polled between chunks. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(token: Option<&CancelToken>) -> Result<()> {
        match token {
            Some(t) if t.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Options for opening a container.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Verify Jenkins checksums on superblock, object headers and indexes.
    pub verify_checksums: bool,
    /// Map the file instead of reading it into memory.
    pub use_mmap: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            verify_checksums: true,
            use_mmap: cfg!(feature = "mmap"),
        }
    }
}

impl ReadOptions {
    pub fn verify_checksums(mut self, on: bool) -> Self {
        self.verify_checksums = on;
        self
    }

    pub fn use_mmap(mut self, on: bool) -> Self {
        self.use_mmap = on;
        self
    }
}

/// Options for a single decode.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Decode chunks on the rayon pool (needs the `parallel` feature).
    pub parallel: bool,
    pub cancel: Option<CancelToken>,
}

impl DecodeOptions {
    pub fn parallel(mut self, on: bool) -> Self {
        self.parallel = on;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// How a dataset is split into chunks on write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChunkingPolicy {
    /// One chunk over the whole array; leading dimensions are halved until
    /// the chunk fits `MAX_CHUNK_BYTES`.
    #[default]
    Auto,
    /// Explicit chunk extent per dimension.
    Shape(Vec<u64>),
    /// No chunking. Filters are not applied to contiguous data.
    Contiguous,
}

/// Filters applied to every chunk on write, in libhdf5 order: shuffle,
/// deflate, fletcher32.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSpec {
    pub shuffle: bool,
    /// zlib level 0 to 9; needs the `deflate` feature.
    pub deflate: Option<u32>,
    pub fletcher32: bool,
}

impl FilterSpec {
    pub fn none() -> FilterSpec {
        FilterSpec::default()
    }

    pub fn shuffle(mut self, on: bool) -> Self {
        self.shuffle = on;
        self
    }

    pub fn deflate(mut self, level: u32) -> Self {
        self.deflate = Some(level.min(9));
        self
    }

    pub fn fletcher32(mut self, on: bool) -> Self {
        self.fletcher32 = on;
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.shuffle && self.deflate.is_none() && !self.fletcher32
    }

    /// The pipeline message for these filters; `None` when no filter is set.
    pub(crate) fn pipeline(&self, element_size: usize) -> Result<Option<FilterPipeline>> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut filters = Vec::new();
        if self.shuffle {
            filters.push(FilterDescription::new(FILTER_SHUFFLE, vec![element_size as u32]));
        }
        if let Some(level) = self.deflate {
            if !sygnals_hdf5_format::filters::is_supported(FILTER_DEFLATE) {
                return Err(Error::UnsupportedFilter(FILTER_DEFLATE));
            }
            filters.push(FilterDescription::new(FILTER_DEFLATE, vec![level]));
        }
        if self.fletcher32 {
            filters.push(FilterDescription::new(FILTER_FLETCHER32, Vec::new()));
        }
        Ok(Some(FilterPipeline::new(filters)))
    }
}

/// Options for a write session.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Replace an existing file at the target path on flush.
    pub overwrite: bool,
    /// Chunking used when `write_dataset` is given none.
    pub chunking: ChunkingPolicy,
    pub filters: FilterSpec,
    /// Attribute bound; values above `MAX_ATTRIBUTE_BYTES` are clamped to it.
    pub max_attribute_bytes: usize,
    pub cancel: Option<CancelToken>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            overwrite: false,
            chunking: ChunkingPolicy::Auto,
            filters: FilterSpec::none(),
            max_attribute_bytes: MAX_ATTRIBUTE_BYTES,
            cancel: None,
        }
    }
}

impl WriteOptions {
    pub fn overwrite(mut self, on: bool) -> Self {
        self.overwrite = on;
        self
    }

    pub fn chunking(mut self, policy: ChunkingPolicy) -> Self {
        self.chunking = policy;
        self
    }

    pub fn filters(mut self, filters: FilterSpec) -> Self {
        self.filters = filters;
        self
    }

    pub fn max_attribute_bytes(mut self, limit: usize) -> Self {
        self.max_attribute_bytes = limit.min(MAX_ATTRIBUTE_BYTES);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn attribute_limit(&self) -> usize {
        self.max_attribute_bytes.min(MAX_ATTRIBUTE_BYTES)
    }
}
