use crate::allocator::{BlockAddress, BlockSize, UNIT_SIZE};
use crate::memory::Memory;

/// Read the unit at the given unit address.
pub(crate) fn read_unit<M: Memory>(memory: &mut M, address: BlockAddress) -> u32 {
    let mut buf = [0u8; UNIT_SIZE as usize];
    memory.read(address as u64 * UNIT_SIZE, &mut buf);
    u32::from_le_bytes(buf)
}

/// Write a unit at the given unit address.
pub(crate) fn write_unit<M: Memory>(memory: &mut M, address: BlockAddress, value: u32) {
    memory.write(address as u64 * UNIT_SIZE, &value.to_le_bytes());
}

/// Copy `count` units from `src` to `dst`. The two ranges must not overlap.
pub(crate) fn copy_units<M: Memory>(
    memory: &mut M,
    src: BlockAddress,
    dst: BlockAddress,
    count: BlockSize,
) {
    let mut buf = vec![0u8; count as usize * UNIT_SIZE as usize];
    memory.read(src as u64 * UNIT_SIZE, &mut buf);
    memory.write(dst as u64 * UNIT_SIZE, &buf);
}
