//! Read-only backing bytes of an open container.
//!
//! With the `mmap` feature the file is mapped and payload pages are only
//! touched when a decode reads them. Otherwise the file is read into memory.

use std::fs;
use std::io;
use std::path::Path;

#[cfg(feature = "mmap")]
use memmap2::Mmap;

pub(crate) enum Storage {
    Owned(Vec<u8>),
    #[cfg(feature = "mmap")]
    Mapped { _file: fs::File, map: Mmap },
}

impl Storage {
    pub(crate) fn open(path: &Path, use_mmap: bool) -> io::Result<Storage> {
        #[cfg(feature = "mmap")]
        {
            if use_mmap {
                let file = fs::File::open(path)?;
                // an empty file cannot be mapped on every platform
                if file.metadata()?.len() == 0 {
                    return Ok(Storage::Owned(Vec::new()));
                }
                // SAFETY: the mapping is read-only; the container documents
                // that the file must not be modified while it is open.
                let map = unsafe { Mmap::map(&file)? };
                return Ok(Storage::Mapped { _file: file, map });
            }
        }
        #[cfg(not(feature = "mmap"))]
        let _ = use_mmap;
        fs::read(path).map(Storage::Owned)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v,
            #[cfg(feature = "mmap")]
            Storage::Mapped { map, .. } => map,
        }
    }

    pub(crate) fn is_mapped(&self) -> bool {
        match self {
            Storage::Owned(_) => false,
            #[cfg(feature = "mmap")]
            Storage::Mapped { .. } => true,
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("len", &self.as_bytes().len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}
