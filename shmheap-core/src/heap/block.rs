//! Block header words and size arithmetic.

use super::memory::{HeapMemory, HeapMemoryMut};

/// Allocation unit; every block size and payload offset is a multiple.
pub const UNIT: u64 = 8;

/// Size of the block header word.
pub const BLOCK_HEADER: u64 = 8;

/// Smallest payload handed out (room for the free-list links and footer).
pub const MIN_PAYLOAD: u64 = 24;

/// Smallest block, header included.
pub const MIN_BLOCK: u64 = BLOCK_HEADER + MIN_PAYLOAD;

/// Heap capacity granularity.
pub const PAGE_SIZE: u64 = 4096;

const ALLOCATED: u64 = 0b001;
const PREV_ALLOCATED: u64 = 0b010;
const FLAG_MASK: u64 = UNIT - 1;

/// The 8-byte header word of a block: `size | P | A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHeader(u64);

impl BlockHeader {
    pub(crate) fn new(size: u64, allocated: bool, prev_allocated: bool) -> Self {
        debug_assert_eq!(size & FLAG_MASK, 0, "block size {size} is not unit aligned");
        let mut word = size;
        if allocated {
            word |= ALLOCATED;
        }
        if prev_allocated {
            word |= PREV_ALLOCATED;
        }
        Self(word)
    }

    /// Whole block size, header included.
    pub(crate) fn size(self) -> u64 {
        self.0 & !FLAG_MASK
    }

    pub(crate) fn is_allocated(self) -> bool {
        self.0 & ALLOCATED != 0
    }

    pub(crate) fn prev_allocated(self) -> bool {
        self.0 & PREV_ALLOCATED != 0
    }

    pub(crate) fn with_prev_allocated(self, prev_allocated: bool) -> Self {
        Self::new(self.size(), self.is_allocated(), prev_allocated)
    }
}

/// Round up to the allocation unit.
pub const fn round_unit(n: u64) -> u64 {
    (n + UNIT - 1) & !(UNIT - 1)
}

/// Round up to a whole page.
pub const fn round_page(n: u64) -> u64 {
    (n + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Payload size actually reserved for a request.
pub const fn payload_size(request: u64) -> u64 {
    let rounded = round_unit(request);
    if rounded < MIN_PAYLOAD {
        MIN_PAYLOAD
    } else {
        rounded
    }
}

// Blocks are addressed by the heap offset of their header word `h`; the
// payload starts at `h + BLOCK_HEADER`. A free block keeps its previous and
// next free-list links (payload offsets) in the first two payload words and
// a copy of its size in its last word.

pub(crate) fn header<M: HeapMemory + ?Sized>(mem: &M, h: u64) -> BlockHeader {
    BlockHeader(mem.read_u64(h))
}

pub(crate) fn set_header<M: HeapMemoryMut + ?Sized>(mem: &mut M, h: u64, header: BlockHeader) {
    mem.write_u64(h, header.0);
}

pub(crate) fn set_footer<M: HeapMemoryMut + ?Sized>(mem: &mut M, h: u64, size: u64) {
    mem.write_u64(h + size - UNIT, size);
}

/// Size stored in the footer of the block ending right before `h`.
pub(crate) fn footer_before<M: HeapMemory + ?Sized>(mem: &M, h: u64) -> u64 {
    mem.read_u64(h - UNIT)
}

/// Update the P flag of the block at `h`, if `h` is inside the heap.
pub(crate) fn set_prev_allocated<M: HeapMemoryMut + ?Sized>(mem: &mut M, h: u64, flag: bool) {
    if h < mem.heap_capacity() {
        let current = header(mem, h);
        set_header(mem, h, current.with_prev_allocated(flag));
    }
}

pub(crate) fn prev_free<M: HeapMemory + ?Sized>(mem: &M, h: u64) -> u64 {
    mem.read_u64(h + BLOCK_HEADER)
}

pub(crate) fn next_free<M: HeapMemory + ?Sized>(mem: &M, h: u64) -> u64 {
    mem.read_u64(h + BLOCK_HEADER + UNIT)
}

/// Push the free block at `h` onto the front of the free list.
pub(crate) fn push_free<M: HeapMemoryMut + ?Sized>(mem: &mut M, h: u64) {
    let payload = h + BLOCK_HEADER;
    let head = mem.free_head();
    mem.write_u64(payload, 0);
    mem.write_u64(payload + UNIT, head);
    if head != 0 {
        mem.write_u64(head, payload);
    }
    mem.set_free_head(payload);
}

/// Unlink the free block at `h` from the free list.
pub(crate) fn unlink_free<M: HeapMemoryMut + ?Sized>(mem: &mut M, h: u64) {
    let prev = prev_free(mem, h);
    let next = next_free(mem, h);
    if prev == 0 {
        assert_eq!(
            mem.free_head(),
            h + BLOCK_HEADER,
            "free list corrupted: block at {h:#x} has no predecessor but is not the head"
        );
        mem.set_free_head(next);
    } else {
        mem.write_u64(prev + UNIT, next);
    }
    if next != 0 {
        mem.write_u64(next, prev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_word_packs_flags() {
        let header = BlockHeader::new(264, true, false);
        assert_eq!(header.size(), 264);
        assert!(header.is_allocated());
        assert!(!header.prev_allocated());

        let header = header.with_prev_allocated(true);
        assert_eq!(header.size(), 264);
        assert!(header.prev_allocated());
        assert_eq!(header.0, 264 | 0b011);
    }

    #[test]
    fn request_rounding() {
        assert_eq!(payload_size(0), 24);
        assert_eq!(payload_size(1), 24);
        assert_eq!(payload_size(25), 32);
        assert_eq!(payload_size(0x1FA), 512);
        assert_eq!(round_page(1024), 4096);
        assert_eq!(round_page(4096 * 2 + 1), 4096 * 3);
        assert_eq!(round_unit(90), 96);
    }
}
