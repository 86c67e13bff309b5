use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::{
    constants::TOUCH_SENTINEL,
    core::{domain::TargetSize, errors::AllocationError},
};

/// One page-aligned, zero-initialised allocation.
///
/// Bytes are exposed as `AtomicU8` so every worker can mutate them through a
/// shared reference. Relaxed loads and stores compile to plain moves, which
/// keeps the hot loops as cheap as unsynchronised access while staying sound.
#[derive(Debug)]
pub struct MemoryChunk {
    ptr: NonNull<AtomicU8>,
    layout: Layout,
}

// SAFETY: the chunk exclusively owns its allocation and only hands out
// `&[AtomicU8]`, which is itself `Send + Sync`.
unsafe impl Send for MemoryChunk {}
unsafe impl Sync for MemoryChunk {}

impl MemoryChunk {
    pub fn allocate(index: usize, bytes: usize, page_size: usize) -> Result<Self, AllocationError> {
        let invalid = || AllocationError::InvalidLayout {
            index,
            bytes,
            align: page_size,
        };
        if bytes == 0 {
            return Err(invalid());
        }
        let layout = Layout::from_size_align(bytes, page_size).map_err(|_| invalid())?;

        // SAFETY: `layout` has a non-zero size. Zeroed memory is a valid
        // `[AtomicU8]`, which has the same layout as `[u8]`.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw.cast::<AtomicU8>())
            .ok_or(AllocationError::OutOfMemory { index, bytes })?;

        Ok(Self { ptr, layout })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn bytes(&self) -> &[AtomicU8] {
        // SAFETY: `ptr` points to `len()` initialised bytes that live as long
        // as `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    pub fn read(&self, offset: usize) -> u8 {
        self.bytes()[offset].load(Ordering::Relaxed)
    }

    pub fn write(&self, offset: usize, value: u8) {
        self.bytes()[offset].store(value, Ordering::Relaxed);
    }

    /// `byte = (byte + 1) mod 256`. Concurrent bumps of the same byte may
    /// lose increments, which is fine: only the access itself matters.
    pub fn bump(&self, offset: usize) {
        let byte = &self.bytes()[offset];
        byte.store(byte.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
    }
}

impl Drop for MemoryChunk {
    fn drop(&mut self) {
        // SAFETY: allocated in `allocate` with exactly this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout) };
    }
}

/// Allocates chunk `index` of `bytes` bytes aligned to `page_size`.
pub type ChunkAllocator = fn(usize, usize, usize) -> Result<MemoryChunk, AllocationError>;

/// Ordered set of chunks. The list only changes through `&mut self`, so once
/// the pool is shared behind an `Arc` its structure is frozen.
#[derive(Debug)]
pub struct BufferPool {
    page_size: usize,
    chunks: Vec<MemoryChunk>,
    alloc_chunk: ChunkAllocator,
}

impl BufferPool {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            chunks: Vec::new(),
            alloc_chunk: MemoryChunk::allocate,
        }
    }

    pub fn with_chunk_allocator(mut self, alloc_chunk: ChunkAllocator) -> Self {
        self.alloc_chunk = alloc_chunk;
        self
    }

    /// Allocates every chunk of `target` in order. On the first failure the
    /// loop stops, already allocated chunks are kept and the error returned.
    pub fn allocate(&mut self, target: &TargetSize) -> Result<usize, AllocationError> {
        let page_size = self.page_size as u64;
        let progress_step = (target.chunk_count / 20).max(1);

        for (index, len) in target.chunk_lengths().enumerate() {
            let aligned = len / page_size * page_size;
            let bytes = usize::try_from(aligned).map_err(|_| AllocationError::OutOfMemory {
                index,
                bytes: usize::MAX,
            })?;
            let chunk = (self.alloc_chunk)(index, bytes, self.page_size)?;
            self.chunks.push(chunk);

            if (index + 1) % progress_step == 0 || index + 1 == target.chunk_count {
                tracing::info!(
                    chunk = index + 1,
                    chunks = target.chunk_count,
                    allocated_mb = self.total_bytes() / (1024 * 1024),
                    "allocation progress"
                );
            }
        }

        Ok(self.chunks.len())
    }

    /// Writes the sentinel to the first byte of every page, forcing the
    /// kernel to back each page with physical memory. Returns the page count.
    pub fn touch_all(&self) -> usize {
        let progress_step = (self.chunks.len() / 20).max(1);
        let mut pages = 0;

        for (index, chunk) in self.chunks.iter().enumerate() {
            for offset in (0..chunk.len()).step_by(self.page_size) {
                chunk.write(offset, TOUCH_SENTINEL);
                pages += 1;
            }

            if (index + 1) % progress_step == 0 || index + 1 == self.chunks.len() {
                tracing::info!(
                    pages,
                    chunk = index + 1,
                    chunks = self.chunks.len(),
                    "touch progress"
                );
            }
        }

        pages
    }

    /// Drops every chunk. Safe to call on an empty pool.
    pub fn release(&mut self) {
        if self.chunks.is_empty() {
            return;
        }
        let bytes = self.total_bytes();
        self.chunks.clear();
        self.chunks.shrink_to_fit();
        tracing::info!(released_mb = bytes / (1024 * 1024), "memory buffers released");
    }

    pub fn chunks(&self) -> &[MemoryChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.len() as u64).sum()
    }
}
