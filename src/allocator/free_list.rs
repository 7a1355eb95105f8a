use super::block::{read_next, read_size, write_next};
use super::{BlockAddress, BlockSize, NULL_ADDRESS};
use crate::memory::Memory;

/// The address-ordered singly-linked list of free blocks.
///
/// The list is intrusive: each link is stored in the first payload unit of the
/// free block it belongs to, so the only state kept outside the managed memory
/// is the root address. The chain is always sorted by strictly increasing
/// block address and terminates at [`NULL_ADDRESS`].
pub(crate) struct FreeList {
    root: BlockAddress,
}

/// Outcome of a first-fit walk. `curr` is the first block whose capacity
/// suffices, or null when the walk exhausted the list; `prev` is its
/// predecessor and `before_prev` the predecessor of `prev`, both null when
/// undefined.
pub(crate) struct Fit {
    pub before_prev: BlockAddress,
    pub prev: BlockAddress,
    pub curr: BlockAddress,
}

impl FreeList {
    pub fn new() -> Self {
        Self {
            root: NULL_ADDRESS,
        }
    }

    #[cfg(test)]
    pub fn root(&self) -> BlockAddress {
        self.root
    }

    /// Walk the list from the root and stop at the first block with capacity
    /// of at least `size` units.
    pub fn find_fit<M: Memory>(&self, memory: &mut M, size: BlockSize) -> Fit {
        let mut before_prev = NULL_ADDRESS;
        let mut prev = NULL_ADDRESS;
        let mut curr = self.root;

        while curr != NULL_ADDRESS && read_size(memory, curr) < size {
            before_prev = prev;
            prev = curr;
            curr = read_next(memory, curr);
        }

        Fit {
            before_prev,
            prev,
            curr,
        }
    }

    /// Unlink `curr` from the list. `prev` must be its predecessor, or null
    /// when `curr` is the root.
    pub fn unlink<M: Memory>(&mut self, memory: &mut M, prev: BlockAddress, curr: BlockAddress) {
        let next = read_next(memory, curr);
        if prev == NULL_ADDRESS {
            self.root = next;
        } else {
            write_next(memory, prev, next);
        }
    }

    /// Link `address` as the new tail of the list. `prev` must be the current
    /// last node, or null when the list is empty.
    pub fn link_tail<M: Memory>(
        &mut self,
        memory: &mut M,
        prev: BlockAddress,
        address: BlockAddress,
    ) {
        write_next(memory, address, NULL_ADDRESS);
        if prev == NULL_ADDRESS {
            self.root = address;
        } else {
            write_next(memory, prev, address);
        }
    }

    /// Insert `address` at the position that keeps the list sorted by block
    /// address. Neighboring free blocks are left unmerged.
    pub fn insert<M: Memory>(&mut self, memory: &mut M, address: BlockAddress) {
        let mut prev = NULL_ADDRESS;
        let mut curr = self.root;

        while curr != NULL_ADDRESS && curr <= address {
            prev = curr;
            curr = read_next(memory, curr);
        }

        write_next(memory, address, curr);
        if prev == NULL_ADDRESS {
            self.root = address;
        } else {
            write_next(memory, prev, address);
        }
    }

    /// Collect the addresses reachable from the root, asserting that the walk
    /// never steps backwards. A cycle would trip the ordering assertion.
    #[cfg(test)]
    pub fn addresses<M: Memory>(&self, memory: &mut M) -> Vec<BlockAddress> {
        let mut result: Vec<BlockAddress> = Vec::new();
        let mut curr = self.root;
        while curr != NULL_ADDRESS {
            if let Some(&last) = result.last() {
                assert!(last < curr, "free list is out of address order");
            }
            result.push(curr);
            curr = read_next(memory, curr);
        }
        result
    }
}
