use crate::memory::PAGE_SIZE;

/// Address of a block's payload, in units.
pub type BlockAddress = u32;

/// Size of a block's payload, in units.
pub type BlockSize = u32;

/// Width in bytes of one allocation unit. Every address and size the
/// allocator handles is expressed in units.
pub const UNIT_SIZE: u64 = 4;

/// Number of units in one memory page.
pub const PAGE_UNITS: BlockSize = (PAGE_SIZE / UNIT_SIZE) as BlockSize;

/// The "no block" sentinel. The first block header occupies the lowest
/// units of the memory, so no payload can ever start at zero.
pub const NULL_ADDRESS: BlockAddress = 0;

/// Units occupied by a block header.
pub(crate) const HEADER_UNITS: BlockSize = 1;

#[allow(clippy::module_inception)]
mod allocator;
mod block;
mod free_list;

pub use allocator::{AllocatorConfig, FreeListAllocator};
