use std::error;
use std::fmt;

/// Size in bytes of one memory page.
pub const PAGE_SIZE: u64 = 1 << 16;

/// The largest page count a 32-bit linear memory can reach.
pub const MAX_PAGES: u64 = 1 << 16;

/// A possible error value when dealing with the linear memory.
#[derive(Debug, PartialEq, Eq)]
pub enum MemoryError {
    /// No more memory could be allocated.
    OutOfMemory,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("Out of memory"),
        }
    }
}

impl error::Error for MemoryError {}

/// The linear memory interface. An implementation can decide where to store
/// the data as long as it provides the given functionalities: the memory only
/// ever grows, in whole pages, and bytes below the old size keep their address
/// and content across every growth.
pub trait Memory {
    /// Current size of the memory in pages.
    fn size(&self) -> u64;

    /// Grow the memory by `new_pages` zero-initialized pages and return the
    /// previous size in pages, or `-1` if the backend cannot grow any further.
    fn grow(&mut self, new_pages: u64) -> i64;

    /// Read `buf.len()` bytes starting at the given byte offset.
    fn read(&mut self, offset: u64, buf: &mut [u8]);

    /// Write the buffer at the given byte offset.
    fn write(&mut self, offset: u64, buf: &[u8]);
}

/// A linear memory backend that stores everything in the heap.
pub struct HeapMemory {
    data: Vec<u8>,
    max_pages: u64,
}

impl Default for HeapMemory {
    fn default() -> Self {
        Self::with_max_pages(MAX_PAGES)
    }
}

impl HeapMemory {
    /// An empty memory bounded by [`MAX_PAGES`].
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty memory that refuses to grow past `max_pages`.
    pub fn with_max_pages(max_pages: u64) -> Self {
        Self {
            data: Vec::new(),
            max_pages,
        }
    }
}

impl Memory for HeapMemory {
    fn size(&self) -> u64 {
        self.data.len() as u64 >> 16
    }

    fn grow(&mut self, new_pages: u64) -> i64 {
        let old_pages = self.size();
        if old_pages + new_pages > self.max_pages {
            return -1;
        }
        self.data
            .resize(((old_pages + new_pages) << 16) as usize, 0);
        old_pages as i64
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) {
        let offset = offset as usize;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
    }

    fn write(&mut self, offset: u64, buf: &[u8]) {
        let offset = offset as usize;
        self.data[offset..offset + buf.len()].copy_from_slice(buf);
    }
}

#[cfg(not(target_family = "wasm"))]
mod file {
    use super::{Memory, MAX_PAGES, PAGE_SIZE};
    use memmap::MmapMut;
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::path::Path;

    /// A linear memory backend that uses a mapped file under the hood to
    /// provide the storage space. Growing extends the file and remaps it;
    /// offsets within the linear memory stay valid even though the host
    /// mapping may move.
    pub struct FileMemory {
        file: File,
        map: Option<MmapMut>,
        max_pages: u64,
    }

    impl FileMemory {
        /// Open or create the backing file at the given path, bounded by
        /// [`MAX_PAGES`]. An existing file is truncated down to a whole number
        /// of pages.
        pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
            Self::with_max_pages(path, MAX_PAGES)
        }

        /// Like [`open`](Self::open), refusing to grow past `max_pages`.
        pub fn with_max_pages<P: AsRef<Path>>(path: P, max_pages: u64) -> io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?;
            let len = file.metadata()?.len() / PAGE_SIZE * PAGE_SIZE;
            file.set_len(len)?;
            let map = if len == 0 {
                None
            } else {
                Some(unsafe { MmapMut::map_mut(&file)? })
            };
            Ok(Self {
                file,
                map,
                max_pages,
            })
        }

        /// Flush outstanding writes to the backing file.
        pub fn flush(&self) -> io::Result<()> {
            match &self.map {
                Some(map) => map.flush(),
                None => Ok(()),
            }
        }

        fn remap(file: &File, len: u64) -> Option<MmapMut> {
            if len == 0 {
                None
            } else {
                unsafe { MmapMut::map_mut(file).ok() }
            }
        }
    }

    impl Memory for FileMemory {
        fn size(&self) -> u64 {
            self.map.as_ref().map_or(0, |m| m.len() as u64 >> 16)
        }

        fn grow(&mut self, new_pages: u64) -> i64 {
            let old_pages = self.size();
            if new_pages == 0 {
                return old_pages as i64;
            }
            if old_pages + new_pages > self.max_pages {
                return -1;
            }
            // The old mapping must be unmapped before the file is resized.
            // A failed resize or remap rolls back so the memory stays usable
            // at its old size.
            self.map = None;
            let old_len = old_pages * PAGE_SIZE;
            if self
                .file
                .set_len((old_pages + new_pages) * PAGE_SIZE)
                .is_err()
            {
                self.map = Self::remap(&self.file, old_len);
                return -1;
            }
            match unsafe { MmapMut::map_mut(&self.file) } {
                Ok(map) => {
                    self.map = Some(map);
                    old_pages as i64
                }
                Err(_) => {
                    let _ = self.file.set_len(old_len);
                    self.map = Self::remap(&self.file, old_len);
                    -1
                }
            }
        }

        fn read(&mut self, offset: u64, buf: &mut [u8]) {
            let map = self.map.as_ref().expect("read from an empty memory");
            let offset = offset as usize;
            buf.copy_from_slice(&map[offset..offset + buf.len()]);
        }

        fn write(&mut self, offset: u64, buf: &[u8]) {
            let map = self.map.as_mut().expect("write to an empty memory");
            let offset = offset as usize;
            map[offset..offset + buf.len()].copy_from_slice(buf);
        }
    }
}

#[cfg(not(target_family = "wasm"))]
pub use file::FileMemory;
