use log::{debug, trace};

use super::block::{read_size, write_size};
use super::free_list::FreeList;
use super::{BlockAddress, BlockSize, HEADER_UNITS, NULL_ADDRESS, PAGE_UNITS};
use crate::memory::{Memory, MemoryError};
use crate::utils::copy_units;

/// Configuration values for a [`FreeListAllocator`].
pub struct AllocatorConfig {
    /// Largest number of surplus units a block may carry before the allocator
    /// splits it. A chosen block with capacity above `size + max_extra` is
    /// split; anything below is handed out whole, accepting the surplus as
    /// internal fragmentation. Must be at least 2 units.
    /// Default: 4 units.
    pub max_extra: BlockSize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self { max_extra: 4 }
    }
}

/// A first-fit allocator over a growable linear memory. The allocator assumes
/// that it owns the entire memory.
///
/// Free blocks are kept in an address-ordered list stored inside the managed
/// memory itself. When no free block satisfies a request the memory is grown;
/// freed blocks are reinserted in address order but never merged with their
/// neighbors.
///
/// All operations assume exclusive access for their full duration; callers
/// sharing an allocator across threads must add their own lock around it.
pub struct FreeListAllocator<M: Memory> {
    memory: M,
    free_list: FreeList,
    max_extra: BlockSize,
}

impl<M: Memory> FreeListAllocator<M> {
    /// Create an allocator owning `memory`, with the default configuration.
    pub fn new(memory: M) -> Result<Self, MemoryError> {
        Self::with_config(memory, AllocatorConfig::default())
    }

    /// Create an allocator owning `memory`. The memory is grown to one page
    /// if it is empty, and the free list is seeded with a single block
    /// spanning the whole store minus its header.
    ///
    /// # Panics
    ///
    /// If `config.max_extra` is smaller than 2 units.
    pub fn with_config(mut memory: M, config: AllocatorConfig) -> Result<Self, MemoryError> {
        if config.max_extra < 2 {
            panic!("max_extra must be at least 2 units.");
        }

        if memory.size() == 0 && memory.grow(1) < 0 {
            return Err(MemoryError::OutOfMemory);
        }

        let total_units = memory.size() as BlockSize * PAGE_UNITS;
        let first = HEADER_UNITS;
        write_size(&mut memory, first, total_units - HEADER_UNITS);

        let mut free_list = FreeList::new();
        free_list.link_tail(&mut memory, NULL_ADDRESS, first);

        debug!("allocator initialized over {} page(s)", memory.size());

        Ok(Self {
            memory,
            free_list,
            max_extra: config.max_extra,
        })
    }

    /// Allocate a payload of at least `size` units and return its address.
    ///
    /// Returns [`NULL_ADDRESS`] when `size` is zero, or when no free block
    /// fits and the memory refuses to grow; the allocator stays consistent
    /// and usable after such a failure.
    pub fn allocate(&mut self, size: BlockSize) -> BlockAddress {
        if size == 0 {
            return NULL_ADDRESS;
        }

        let fit = self.free_list.find_fit(&mut self.memory, size);
        let (mut prev, mut curr) = (fit.prev, fit.curr);

        if curr == NULL_ADDRESS {
            // No block fits; grow the memory by enough pages to hold the
            // payload and its header, plus one page so that a burst of small
            // requests does not grow again right away.
            let pages =
                (size as u64 + HEADER_UNITS as u64).div_ceil(PAGE_UNITS as u64) + 1;
            let old_pages = self.memory.grow(pages);
            if old_pages < 0 {
                debug!("growth by {} page(s) refused", pages);
                return NULL_ADDRESS;
            }

            let grown_units = pages as BlockSize * PAGE_UNITS;
            let start = old_pages as BlockAddress * PAGE_UNITS;
            debug!("grew memory by {} page(s), new region at unit {}", pages, start);

            if prev != NULL_ADDRESS && prev + read_size(&mut self.memory, prev) == start {
                // The free-list tail runs right up to the grown region;
                // extend it in place instead of linking a second block.
                let merged = read_size(&mut self.memory, prev) + grown_units;
                write_size(&mut self.memory, prev, merged);
                curr = prev;
                prev = fit.before_prev;
            } else {
                let address = start + HEADER_UNITS;
                write_size(&mut self.memory, address, grown_units - HEADER_UNITS);
                self.free_list.link_tail(&mut self.memory, prev, address);
                curr = address;
            }
            // the grown or merged block holds at least `size` units by
            // construction, so the fit check below cannot miss.
        }

        let capacity = read_size(&mut self.memory, curr);
        let address = if capacity > size + self.max_extra {
            // Split: the leading portion keeps its spot in the free list and
            // the trailing `size` units become the allocated block, leaving
            // the next-pointer bookkeeping untouched. One unit between the
            // two is reserved for the new block's header so that neither
            // block's capacity overlaps the other's metadata.
            let remaining = capacity - size - HEADER_UNITS;
            write_size(&mut self.memory, curr, remaining);
            let address = curr + remaining + HEADER_UNITS;
            write_size(&mut self.memory, address, size);
            address
        } else {
            self.free_list.unlink(&mut self.memory, prev, curr);
            curr
        };

        trace!("allocate({}) = {}", size, address);
        address
    }

    /// Give the block at `address` back to the allocator.
    ///
    /// The address must be one returned by a previous [`allocate`] or
    /// [`realloc`] call and not freed since; nothing is validated. A null
    /// address is ignored.
    ///
    /// [`allocate`]: Self::allocate
    /// [`realloc`]: Self::realloc
    pub fn free(&mut self, address: BlockAddress) {
        if address == NULL_ADDRESS {
            return;
        }

        trace!("free({})", address);
        self.free_list.insert(&mut self.memory, address);
    }

    /// Resize the block at `address` to hold at least `size` units.
    ///
    /// When `size` fits in the block's current capacity the address is
    /// returned unchanged. Otherwise a new block is allocated, the current
    /// capacity is copied over, and the original block is freed. Returns
    /// [`NULL_ADDRESS`] when the new allocation fails, leaving the original
    /// block untouched.
    pub fn realloc(&mut self, address: BlockAddress, size: BlockSize) -> BlockAddress {
        let capacity = read_size(&mut self.memory, address);
        if size <= capacity {
            return address;
        }

        let new_address = self.allocate(size);
        if new_address == NULL_ADDRESS {
            return NULL_ADDRESS;
        }

        // only the original capacity is valid payload; copying `size` units
        // would read past the old block.
        copy_units(&mut self.memory, address, new_address, capacity);
        self.free(address);
        new_address
    }

    /// The configured fragmentation threshold in units.
    pub fn max_extra(&self) -> BlockSize {
        self.max_extra
    }

    /// The memory this allocator manages.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Mutable access to the managed memory. Payload bytes are read and
    /// written through this handle.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Consume the allocator and hand the memory back.
    pub fn into_memory(self) -> M {
        self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapMemory;
    use crate::utils::{read_unit, write_unit};

    /// Payload units of the seed block of a one-page allocator.
    const SEED_UNITS: BlockSize = PAGE_UNITS - HEADER_UNITS;

    fn fresh() -> FreeListAllocator<HeapMemory> {
        FreeListAllocator::new(HeapMemory::new()).unwrap()
    }

    #[test]
    fn starts_with_one_page_spanning_block() {
        let mut allocator = fresh();
        assert_eq!(allocator.memory().size(), 1);
        assert_eq!(allocator.free_list.root(), 1);
        assert_eq!(read_size(&mut allocator.memory, 1), SEED_UNITS);
    }

    #[test]
    #[should_panic]
    fn rejects_tiny_max_extra() {
        let _ = FreeListAllocator::with_config(
            HeapMemory::new(),
            AllocatorConfig { max_extra: 1 },
        );
    }

    #[test]
    fn fails_when_first_page_cannot_be_grown() {
        let result = FreeListAllocator::new(HeapMemory::with_max_pages(0));
        assert_eq!(result.err(), Some(MemoryError::OutOfMemory));
    }

    #[test]
    fn allocate_zero_is_null_and_touches_nothing() {
        let mut allocator = fresh();
        assert_eq!(allocator.allocate(0), NULL_ADDRESS);
        assert_eq!(allocator.memory().size(), 1);
        assert_eq!(allocator.free_list.addresses(&mut allocator.memory), vec![1]);
        assert_eq!(read_size(&mut allocator.memory, 1), SEED_UNITS);
    }

    #[test]
    fn successive_small_allocations_split_the_tail() {
        let mut allocator = fresh();

        let first = allocator.allocate(1);
        let second = allocator.allocate(1);

        assert_eq!(first, SEED_UNITS);
        assert_eq!(second, SEED_UNITS - 2);
        assert_ne!(first, second);
        // each one-unit request costs the seed block its payload plus a
        // header unit of capacity.
        assert_eq!(read_size(&mut allocator.memory, 1), SEED_UNITS - 4);
    }

    #[test]
    fn split_leaves_remainder_in_place() {
        let mut allocator = fresh();

        let address = allocator.allocate(100);

        assert_eq!(address, 1 + (SEED_UNITS - 100));
        assert_eq!(read_size(&mut allocator.memory, address), 100);
        // the leading remainder keeps the block's address and list spot.
        assert_eq!(allocator.free_list.root(), 1);
        assert_eq!(read_size(&mut allocator.memory, 1), SEED_UNITS - 101);
    }

    #[test]
    fn no_split_below_threshold_hands_out_whole_block() {
        let mut allocator = fresh();

        // carve the seed block down to a 5-unit remainder.
        let big = allocator.allocate(SEED_UNITS - 6);
        assert_eq!(big, 7);
        assert_eq!(read_size(&mut allocator.memory, 1), 5);

        // 5 <= 3 + max_extra(4): the block is handed out whole, header intact.
        let small = allocator.allocate(3);
        assert_eq!(small, 1);
        assert_eq!(read_size(&mut allocator.memory, small), 5);
        assert!(allocator.free_list.addresses(&mut allocator.memory).is_empty());
    }

    #[test]
    fn payload_round_trip() {
        let mut allocator = fresh();

        let size = 32;
        let address = allocator.allocate(size);
        for i in 0..size {
            write_unit(&mut allocator.memory, address + i, 0xa000 + i);
        }
        for i in 0..size {
            assert_eq!(read_unit(&mut allocator.memory, address + i), 0xa000 + i);
        }
    }

    #[test]
    fn live_payloads_never_overlap() {
        let mut allocator = fresh();

        let sizes = [1, 7, 16, 3, 120, 9, 2000, 5];
        let mut ranges: Vec<(BlockAddress, BlockAddress)> = Vec::new();
        for size in sizes {
            let address = allocator.allocate(size);
            assert_ne!(address, NULL_ADDRESS);
            assert!(read_size(&mut allocator.memory, address) >= size);
            ranges.push((address, address + size));
        }

        for (i, &(a_start, a_end)) in ranges.iter().enumerate() {
            for &(b_start, b_end) in &ranges[i + 1..] {
                assert!(a_end <= b_start || b_end <= a_start);
            }
        }
    }

    #[test]
    fn free_list_stays_ordered_and_acyclic_under_churn() {
        let mut allocator = fresh();

        let a = allocator.allocate(10);
        let b = allocator.allocate(20);
        let c = allocator.allocate(30);
        let d = allocator.allocate(40);

        // free out of address order; `addresses` asserts strict ordering.
        allocator.free(b);
        allocator.free(d);
        allocator.free(a);
        allocator.free(c);

        let addresses = allocator.free_list.addresses(&mut allocator.memory);
        assert_eq!(addresses.len(), 5);
        for pair in addresses.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn freed_blocks_are_not_coalesced() {
        let mut allocator = fresh();

        let a = allocator.allocate(10);
        let b = allocator.allocate(10);
        allocator.free(a);
        allocator.free(b);

        // two adjacent frees stay two list entries with their own headers.
        let addresses = allocator.free_list.addresses(&mut allocator.memory);
        assert!(addresses.contains(&a));
        assert!(addresses.contains(&b));
        assert_eq!(read_size(&mut allocator.memory, a), 10);
        assert_eq!(read_size(&mut allocator.memory, b), 10);
    }

    #[test]
    fn growth_merges_with_adjacent_tail() {
        let mut allocator = fresh();

        // the seed block ends exactly at the page boundary, so growth for an
        // oversized request extends it instead of linking a second block.
        let address = allocator.allocate(20_000);

        assert_eq!(allocator.memory().size(), 4);
        let merged = SEED_UNITS + 3 * PAGE_UNITS;
        assert_eq!(address, 1 + (merged - 20_000));
        assert_eq!(read_size(&mut allocator.memory, address), 20_000);
        // one free-list entry, not two.
        assert_eq!(allocator.free_list.addresses(&mut allocator.memory), vec![1]);
        assert_eq!(read_size(&mut allocator.memory, 1), merged - 20_001);
    }

    #[test]
    fn growth_links_fresh_block_when_not_adjacent() {
        let mut allocator = fresh();

        // empty the free list so the grown region has no neighbor to merge.
        let whole = allocator.allocate(SEED_UNITS - 4);
        assert_eq!(whole, 1);
        assert!(allocator.free_list.addresses(&mut allocator.memory).is_empty());

        let address = allocator.allocate(10);
        assert_eq!(allocator.memory().size(), 3);

        let fresh_block = PAGE_UNITS + HEADER_UNITS;
        assert_eq!(
            allocator.free_list.addresses(&mut allocator.memory),
            vec![fresh_block]
        );
        assert_eq!(address, fresh_block + 2 * PAGE_UNITS - HEADER_UNITS - 10);
        assert_eq!(read_size(&mut allocator.memory, address), 10);
    }

    #[test]
    fn grown_block_full_capacity_write_stays_in_bounds() {
        let mut allocator = fresh();

        // empty the free list so the request below is served from a fresh
        // grown region at the end of memory.
        let whole = allocator.allocate(SEED_UNITS - 4);
        assert_eq!(whole, 1);

        let size = 2 * PAGE_UNITS;
        let address = allocator.allocate(size);
        assert_ne!(address, NULL_ADDRESS);

        // every unit of the advertised capacity lies inside the store.
        let capacity = read_size(&mut allocator.memory, address);
        assert!(capacity >= size);
        assert!((address + capacity) as u64 <= allocator.memory().size() * PAGE_UNITS as u64);
        for i in 0..capacity {
            write_unit(&mut allocator.memory, address + i, i);
        }
        assert_eq!(
            read_unit(&mut allocator.memory, address + capacity - 1),
            capacity - 1
        );
    }

    #[test]
    fn full_write_of_exact_fit_block_leaves_neighbor_header_intact() {
        let mut allocator = fresh();

        let one = allocator.allocate(1);
        let remainder = read_size(&mut allocator.memory, 1);

        // exact fit: the remainder block is handed out whole.
        let address = allocator.allocate(remainder);
        assert_eq!(address, 1);
        for i in 0..remainder {
            write_unit(&mut allocator.memory, address + i, 0x5555_5555);
        }

        // the one-unit block just above keeps its header.
        assert_eq!(read_size(&mut allocator.memory, one), 1);
    }

    #[test]
    fn growth_failure_returns_null_and_leaves_state_usable() {
        let mut allocator =
            FreeListAllocator::new(HeapMemory::with_max_pages(1)).unwrap();

        let whole = allocator.allocate(SEED_UNITS - 4);
        assert_ne!(whole, NULL_ADDRESS);
        assert_eq!(allocator.allocate(100), NULL_ADDRESS);
        assert_eq!(allocator.memory().size(), 1);

        // freeing makes the request satisfiable again.
        allocator.free(whole);
        assert_ne!(allocator.allocate(100), NULL_ADDRESS);
    }

    #[test]
    fn realloc_shrink_is_noop() {
        let mut allocator = fresh();

        let address = allocator.allocate(10);
        assert_eq!(allocator.realloc(address, 4), address);
        assert_eq!(allocator.realloc(address, 10), address);
        assert_eq!(read_size(&mut allocator.memory, address), 10);
    }

    #[test]
    fn realloc_growth_preserves_data() {
        let mut allocator = fresh();

        let size = 8;
        let address = allocator.allocate(size);
        for i in 0..size {
            write_unit(&mut allocator.memory, address + i, 0x1000 + i);
        }

        let new_address = allocator.realloc(address, 64);
        assert_ne!(new_address, address);
        assert!(read_size(&mut allocator.memory, new_address) >= 64);
        for i in 0..size {
            assert_eq!(read_unit(&mut allocator.memory, new_address + i), 0x1000 + i);
        }

        // the original block went back to the free list.
        assert!(allocator
            .free_list
            .addresses(&mut allocator.memory)
            .contains(&address));
    }

    #[test]
    fn realloc_failure_keeps_original_block() {
        let mut allocator =
            FreeListAllocator::new(HeapMemory::with_max_pages(1)).unwrap();

        let address = allocator.allocate(SEED_UNITS - 4);
        write_unit(&mut allocator.memory, address, 0xdead);

        assert_eq!(allocator.realloc(address, SEED_UNITS * 4), NULL_ADDRESS);
        assert_eq!(read_size(&mut allocator.memory, address), SEED_UNITS);
        assert_eq!(read_unit(&mut allocator.memory, address), 0xdead);
    }

    #[test]
    fn free_null_is_ignored() {
        let mut allocator = fresh();
        allocator.free(NULL_ADDRESS);
        assert_eq!(allocator.free_list.addresses(&mut allocator.memory), vec![1]);
    }

    #[test]
    fn allocate_after_free_reuses_block() {
        let mut allocator = fresh();

        let a = allocator.allocate(SEED_UNITS - 4);
        assert_eq!(a, 1);
        allocator.free(a);
        assert_eq!(allocator.allocate(SEED_UNITS - 4), 1);
    }
}
