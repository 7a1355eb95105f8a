//! A first-fit free-list allocator over a growable linear memory.
//!
//! The allocator manages a byte-addressable memory that only ever grows, in
//! fixed 64KiB pages, and is never relocated. Free blocks are indexed by an
//! address-ordered singly-linked list stored inside the managed memory itself,
//! so the allocator carries no heap-side state beyond the list root.

mod allocator;
mod memory;
mod utils;

pub use allocator::{
    AllocatorConfig, BlockAddress, BlockSize, FreeListAllocator, NULL_ADDRESS, PAGE_UNITS,
    UNIT_SIZE,
};
#[cfg(not(target_family = "wasm"))]
pub use memory::FileMemory;
pub use memory::{HeapMemory, Memory, MemoryError, MAX_PAGES, PAGE_SIZE};
