//! Codec for the per-block metadata stored in the managed memory.
//!
//! Every block is preceded by a one-unit header holding its payload size in
//! units. A free block additionally borrows the first unit of its payload for
//! the intrusive next-pointer of the free list. No bounds checking is done
//! here; callers only pass addresses of valid blocks.

use super::{BlockAddress, BlockSize, HEADER_UNITS};
use crate::memory::Memory;
use crate::utils::{read_unit, write_unit};

/// Read the size header of the block at `address`.
pub(crate) fn read_size<M: Memory>(memory: &mut M, address: BlockAddress) -> BlockSize {
    read_unit(memory, address - HEADER_UNITS)
}

/// Write the size header of the block at `address`.
pub(crate) fn write_size<M: Memory>(memory: &mut M, address: BlockAddress, size: BlockSize) {
    write_unit(memory, address - HEADER_UNITS, size);
}

/// Read the next-pointer of the free block at `address`.
pub(crate) fn read_next<M: Memory>(memory: &mut M, address: BlockAddress) -> BlockAddress {
    read_unit(memory, address)
}

/// Write the next-pointer of the free block at `address`.
pub(crate) fn write_next<M: Memory>(memory: &mut M, address: BlockAddress, next: BlockAddress) {
    write_unit(memory, address, next)
}
