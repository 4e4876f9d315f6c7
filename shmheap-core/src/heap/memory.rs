//! Word-level access to a formatted region.
//!
//! All addressing goes through the live header words: heap offsets are
//! turned into byte positions by adding the current static capacity, on
//! every access.

use crate::error::Result;
use crate::region::{ENTRANCE_AT, FREE_HEAD_AT, HEAP_CAPACITY_AT, STATIC_CAPACITY_AT};
use crate::types::HeapOffset;
use byteorder::{ByteOrder, LittleEndian};

/// Read access to region bytes.
pub(crate) trait HeapMemory {
    /// All mapped bytes, header included.
    fn bytes(&self) -> &[u8];

    fn word_at(&self, at: usize) -> u64 {
        LittleEndian::read_u64(&self.bytes()[at..at + 8])
    }

    fn static_capacity(&self) -> u64 {
        self.word_at(STATIC_CAPACITY_AT)
    }

    fn heap_capacity(&self) -> u64 {
        self.word_at(HEAP_CAPACITY_AT)
    }

    /// Payload offset of the first free block, 0 when the list is empty.
    fn free_head(&self) -> u64 {
        self.word_at(FREE_HEAD_AT)
    }

    fn entrance(&self) -> HeapOffset {
        HeapOffset::new(self.word_at(ENTRANCE_AT))
    }

    /// Word at a heap-relative offset.
    fn read_u64(&self, off: u64) -> u64 {
        self.word_at((self.static_capacity() + off) as usize)
    }

    /// Bytes at a heap-relative offset.
    fn slice(&self, off: u64, len: usize) -> &[u8] {
        let at = (self.static_capacity() + off) as usize;
        &self.bytes()[at..at + len]
    }
}

/// Write access to region bytes, plus region growth.
pub(crate) trait HeapMemoryMut: HeapMemory {
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Make at least `total_len` bytes of region addressable.
    fn grow_to(&mut self, total_len: u64) -> Result<()>;

    /// Growth limit for the heap.
    fn max_heap_capacity(&self) -> u64;

    fn set_word_at(&mut self, at: usize, value: u64) {
        LittleEndian::write_u64(&mut self.bytes_mut()[at..at + 8], value);
    }

    fn set_static_capacity(&mut self, value: u64) {
        self.set_word_at(STATIC_CAPACITY_AT, value);
    }

    fn set_heap_capacity(&mut self, value: u64) {
        self.set_word_at(HEAP_CAPACITY_AT, value);
    }

    fn set_free_head(&mut self, value: u64) {
        self.set_word_at(FREE_HEAD_AT, value);
    }

    fn set_entrance(&mut self, offset: HeapOffset) {
        self.set_word_at(ENTRANCE_AT, offset.as_u64());
    }

    fn write_u64(&mut self, off: u64, value: u64) {
        let at = (self.static_capacity() + off) as usize;
        self.set_word_at(at, value);
    }

    fn slice_mut(&mut self, off: u64, len: usize) -> &mut [u8] {
        let at = (self.static_capacity() + off) as usize;
        &mut self.bytes_mut()[at..at + len]
    }

    /// Copy `len` heap bytes from `src` to `dst` (ranges may overlap).
    fn copy_within(&mut self, src: u64, dst: u64, len: usize) {
        let base = self.static_capacity() as usize;
        let src = base + src as usize;
        self.bytes_mut()
            .copy_within(src..src + len, base + dst as usize);
    }
}

/// Read-only view used while holding the shared lock.
pub(crate) struct HeapView<'a> {
    bytes: &'a [u8],
}

impl<'a> HeapView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl HeapMemory for HeapView<'_> {
    fn bytes(&self) -> &[u8] {
        self.bytes
    }
}

/// A growable in-process heap image for unit tests.
#[cfg(test)]
pub(crate) struct VecMemory {
    bytes: Vec<u8>,
    max_heap: u64,
}

#[cfg(test)]
impl VecMemory {
    /// A formatted heap of the given (already rounded) capacities.
    pub(crate) fn formatted(static_capacity: u64, heap_capacity: u64) -> Self {
        let mut mem = Self {
            bytes: vec![0; (static_capacity + heap_capacity) as usize],
            max_heap: crate::region::MAX_HEAP_CAPACITY,
        };
        super::alloc::format(&mut mem, static_capacity, heap_capacity);
        mem
    }

    pub(crate) fn with_max_heap(mut self, max: u64) -> Self {
        self.max_heap = max;
        self
    }
}

#[cfg(test)]
impl HeapMemory for VecMemory {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
impl HeapMemoryMut for VecMemory {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn grow_to(&mut self, total_len: u64) -> Result<()> {
        if total_len as usize > self.bytes.len() {
            self.bytes.resize(total_len as usize, 0);
        }
        Ok(())
    }

    fn max_heap_capacity(&self) -> u64 {
        self.max_heap
    }
}
