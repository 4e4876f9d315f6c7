//! First-fit block allocator with splitting, coalescing and growth.

use super::block::{
    BLOCK_HEADER, BlockHeader, MIN_BLOCK, PAGE_SIZE, UNIT, footer_before, header, next_free,
    payload_size, push_free, round_page, round_unit, set_footer, set_header, set_prev_allocated,
    unlink_free,
};
use super::memory::{HeapMemory, HeapMemoryMut};
use crate::error::{Result, ShmError};
use crate::region::{HEADER_SIZE, RegionHeader};
use crate::types::HeapOffset;

/// Static capacity for a requested static size.
pub const fn static_capacity_for(requested: u64) -> u64 {
    let rounded = round_unit(requested);
    if rounded < HEADER_SIZE as u64 {
        HEADER_SIZE as u64
    } else {
        rounded
    }
}

/// Heap capacity for a requested heap size.
pub const fn heap_capacity_for(requested: u64) -> u64 {
    let rounded = round_page(requested);
    if rounded == 0 { PAGE_SIZE } else { rounded }
}

/// Write fresh header words and a single free block spanning the heap.
pub(crate) fn format<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    static_capacity: u64,
    heap_capacity: u64,
) {
    let header = RegionHeader::new(static_capacity, heap_capacity);
    // Writing into a Vec cannot fail.
    if let Ok(bytes) = header.to_bytes() {
        mem.bytes_mut()[..HEADER_SIZE].copy_from_slice(&bytes);
    }

    // The first block has no predecessor; marking it as allocated stops
    // backward coalescing at the heap head.
    set_header(mem, 0, BlockHeader::new(heap_capacity, false, true));
    set_footer(mem, 0, heap_capacity);
    push_free(mem, 0);
}

/// Allocate a block with at least `size` payload bytes.
pub(crate) fn allocate<M: HeapMemoryMut + ?Sized>(mem: &mut M, size: u64) -> Result<HeapOffset> {
    let need = payload_size(size) + BLOCK_HEADER;

    let h = match first_fit(mem, need) {
        Some(h) => h,
        None => {
            grow_for(mem, size, need)?;
            first_fit(mem, need).ok_or_else(|| ShmError::OutOfMemory {
                requested: size,
                cause: "no free block after growth".to_string(),
            })?
        }
    };

    place(mem, h, need);
    let offset = HeapOffset::new(h + BLOCK_HEADER);
    tracing::trace!(%offset, size, "Allocated block");
    Ok(offset)
}

/// Bytes a block for a `size` byte request takes, header included.
pub(crate) const fn block_size(size: u64) -> u64 {
    payload_size(size) + BLOCK_HEADER
}

/// Grow the heap until its tail free block spans `need` bytes.
///
/// Any run of allocations whose [`block_size`]s add up to `need` then
/// succeeds without growing: the tail block is always split while more
/// requests remain.
pub(crate) fn reserve<M: HeapMemoryMut + ?Sized>(mem: &mut M, need: u64) -> Result<()> {
    let capacity = mem.heap_capacity();
    let available = tail_free(mem, capacity);
    if available >= need {
        return Ok(());
    }
    tracing::debug!(need, available, "Reserving heap space");
    resize(mem, None, Some(capacity + round_page(need - available)))
}

/// Resize an allocated block, in place when the following block is free
/// and large enough, otherwise by moving it.
pub(crate) fn reallocate<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    offset: HeapOffset,
    size: u64,
) -> Result<HeapOffset> {
    let h = allocated_block(mem, offset)?;
    let current = header(mem, h);
    let need = payload_size(size) + BLOCK_HEADER;

    let next = h + current.size();
    let next_size = if next < mem.heap_capacity() {
        let next_header = header(mem, next);
        (!next_header.is_allocated()).then(|| next_header.size())
    } else {
        None
    };
    let available = current.size() + next_size.unwrap_or(0);

    if available >= need {
        if next_size.is_some() {
            unlink_free(mem, next);
        }
        if available - need >= MIN_BLOCK {
            set_header(mem, h, BlockHeader::new(need, true, current.prev_allocated()));
            let rest = h + need;
            let rest_size = available - need;
            set_header(mem, rest, BlockHeader::new(rest_size, false, true));
            set_footer(mem, rest, rest_size);
            push_free(mem, rest);
            set_prev_allocated(mem, rest + rest_size, false);
        } else {
            set_header(
                mem,
                h,
                BlockHeader::new(available, true, current.prev_allocated()),
            );
            set_prev_allocated(mem, h + available, true);
        }
        tracing::trace!(%offset, size, "Reallocated block in place");
        return Ok(offset);
    }

    let moved = allocate(mem, size)?;
    let keep = (current.size() - BLOCK_HEADER).min(payload_size(size));
    mem.copy_within(offset.as_u64(), moved.as_u64(), keep as usize);
    release(mem, h);
    tracing::trace!(from = %offset, to = %moved, size, "Moved block");
    Ok(moved)
}

/// Free an allocated block.
pub(crate) fn free<M: HeapMemoryMut + ?Sized>(mem: &mut M, offset: HeapOffset) -> Result<()> {
    let h = allocated_block(mem, offset)?;
    release(mem, h);
    tracing::trace!(%offset, "Freed block");
    Ok(())
}

/// Free `offset` after checking that it starts a block.
///
/// Walks the block list, so it is only used for offsets handed in from
/// outside the crate.
pub(crate) fn free_checked<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    offset: HeapOffset,
) -> Result<()> {
    check_boundary(mem, offset)?;
    free(mem, offset)
}

/// Reallocate `offset` after checking that it starts a block.
pub(crate) fn reallocate_checked<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    offset: HeapOffset,
    size: u64,
) -> Result<HeapOffset> {
    check_boundary(mem, offset)?;
    reallocate(mem, offset, size)
}

/// Grow static and/or heap capacity. `None` keeps the current value.
pub(crate) fn resize<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    static_size: Option<u64>,
    heap_size: Option<u64>,
) -> Result<()> {
    let old_static = mem.static_capacity();
    let old_heap = mem.heap_capacity();
    let new_static = static_size.map_or(old_static, static_capacity_for);
    let new_heap = heap_size.map_or(old_heap, heap_capacity_for);

    if new_static < old_static {
        return Err(ShmError::ShrinkNotSupported {
            space: "static",
            current: old_static,
            requested: new_static,
        });
    }
    if new_heap < old_heap {
        return Err(ShmError::ShrinkNotSupported {
            space: "heap",
            current: old_heap,
            requested: new_heap,
        });
    }
    if new_heap > mem.max_heap_capacity() {
        return Err(ShmError::OutOfMemory {
            requested: new_heap - old_heap,
            cause: format!(
                "heap capacity {new_heap} exceeds limit {}",
                mem.max_heap_capacity()
            ),
        });
    }
    if new_static == old_static && new_heap == old_heap {
        return Ok(());
    }

    mem.grow_to(new_static + new_heap)?;

    if new_static > old_static {
        let (s, h, n) = (
            old_static as usize,
            old_heap as usize,
            new_static as usize,
        );
        let bytes = mem.bytes_mut();
        bytes.copy_within(s..s + h, n);
        bytes[s..n].fill(0);
        mem.set_static_capacity(new_static);
    }

    if new_heap > old_heap {
        append_free_space(mem, old_heap, new_heap - old_heap);
        mem.set_heap_capacity(new_heap);
    }

    tracing::debug!(
        static_capacity = new_static,
        heap_capacity = new_heap,
        "Resized heap"
    );
    Ok(())
}

fn first_fit<M: HeapMemory + ?Sized>(mem: &M, need: u64) -> Option<u64> {
    let mut payload = mem.free_head();
    while payload != 0 {
        let h = payload - BLOCK_HEADER;
        let block = header(mem, h);
        assert!(
            !block.is_allocated(),
            "free list corrupted: allocated block at {h:#x}"
        );
        if block.size() >= need {
            return Some(h);
        }
        payload = next_free(mem, h);
    }
    None
}

/// Hand out the free block at `h`, splitting off a free remainder when it
/// is at least one minimum block.
fn place<M: HeapMemoryMut + ?Sized>(mem: &mut M, h: u64, need: u64) {
    let block = header(mem, h);
    let size = block.size();
    unlink_free(mem, h);

    if size - need >= MIN_BLOCK {
        set_header(mem, h, BlockHeader::new(need, true, block.prev_allocated()));
        let rest = h + need;
        set_header(mem, rest, BlockHeader::new(size - need, false, true));
        set_footer(mem, rest, size - need);
        push_free(mem, rest);
        tracing::trace!(block = h, size = need, rest = size - need, "Split block");
    } else {
        set_header(mem, h, BlockHeader::new(size, true, block.prev_allocated()));
        set_prev_allocated(mem, h + size, true);
    }
}

/// Return the block at `h` to the free list, merging with free neighbours.
fn release<M: HeapMemoryMut + ?Sized>(mem: &mut M, h: u64) {
    let block = header(mem, h);
    let capacity = mem.heap_capacity();
    let mut start = h;
    let mut size = block.size();
    let mut prev_allocated = block.prev_allocated();

    let next = h + size;
    if next < capacity {
        let next_block = header(mem, next);
        if !next_block.is_allocated() {
            unlink_free(mem, next);
            size += next_block.size();
        }
    }

    if !prev_allocated {
        assert!(h > 0, "first block at the heap head claims a free predecessor");
        let prev_size = footer_before(mem, h);
        let prev = h - prev_size;
        let prev_block = header(mem, prev);
        assert!(
            !prev_block.is_allocated() && prev_block.size() == prev_size,
            "block list corrupted: footer before {h:#x} does not match block at {prev:#x}"
        );
        unlink_free(mem, prev);
        start = prev;
        size += prev_size;
        prev_allocated = prev_block.prev_allocated();
    }

    set_header(mem, start, BlockHeader::new(size, false, prev_allocated));
    set_footer(mem, start, size);
    push_free(mem, start);
    set_prev_allocated(mem, start + size, false);

    if start != h || size != block.size() {
        tracing::trace!(block = start, size, "Coalesced free blocks");
    }
}

/// Grow the heap by whole pages until the tail free space holds `need`.
fn grow_for<M: HeapMemoryMut + ?Sized>(mem: &mut M, requested: u64, need: u64) -> Result<()> {
    let capacity = mem.heap_capacity();
    let new_capacity = capacity + round_page(need - tail_free(mem, capacity));

    tracing::debug!(
        requested,
        from = capacity,
        to = new_capacity,
        "Growing heap for allocation"
    );

    resize(mem, None, Some(new_capacity)).map_err(|e| match e {
        ShmError::OutOfMemory { cause, .. } => ShmError::OutOfMemory { requested, cause },
        e => ShmError::OutOfMemory {
            requested,
            cause: e.to_string(),
        },
    })
}

/// Append `added` bytes of new heap at `end`, merging with a free tail.
fn append_free_space<M: HeapMemoryMut + ?Sized>(mem: &mut M, end: u64, added: u64) {
    let (tail_h, tail) = tail_block(mem, end);
    if tail.is_allocated() {
        set_header(mem, end, BlockHeader::new(added, false, true));
        set_footer(mem, end, added);
        push_free(mem, end);
    } else {
        let size = tail.size() + added;
        set_header(
            mem,
            tail_h,
            BlockHeader::new(size, false, tail.prev_allocated()),
        );
        set_footer(mem, tail_h, size);
    }
}

/// Size of the tail block when it is free, else zero.
fn tail_free<M: HeapMemory + ?Sized>(mem: &M, end: u64) -> u64 {
    let (_, tail) = tail_block(mem, end);
    if tail.is_allocated() { 0 } else { tail.size() }
}

/// The last block before `end`.
fn tail_block<M: HeapMemory + ?Sized>(mem: &M, end: u64) -> (u64, BlockHeader) {
    let mut h = 0;
    loop {
        let block = header(mem, h);
        assert!(
            block.size() >= MIN_BLOCK,
            "block list corrupted: block at {h:#x} has size {}",
            block.size()
        );
        if h + block.size() >= end {
            return (h, block);
        }
        h += block.size();
    }
}

/// Header offset of the allocated block whose payload is `offset`.
fn allocated_block<M: HeapMemory + ?Sized>(mem: &M, offset: HeapOffset) -> Result<u64> {
    let payload = offset.as_u64();
    let capacity = mem.heap_capacity();
    if payload < BLOCK_HEADER || payload % UNIT != 0 || payload - BLOCK_HEADER + MIN_BLOCK > capacity
    {
        return Err(ShmError::InvalidPointer {
            offset,
            cause: "outside the heap or misaligned".to_string(),
        });
    }

    let h = payload - BLOCK_HEADER;
    let block = header(mem, h);
    if !block.is_allocated() {
        tracing::warn!(%offset, "Rejected free of unallocated block");
        return Err(ShmError::InvalidPointer {
            offset,
            cause: "block is not allocated".to_string(),
        });
    }
    if block.size() < MIN_BLOCK || h + block.size() > capacity {
        return Err(ShmError::InvalidPointer {
            offset,
            cause: format!("bad block size {}", block.size()),
        });
    }
    Ok(h)
}

fn check_boundary<M: HeapMemory + ?Sized>(mem: &M, offset: HeapOffset) -> Result<()> {
    let target = offset.as_u64().wrapping_sub(BLOCK_HEADER);
    let capacity = mem.heap_capacity();
    let mut h = 0;
    while h < capacity && h < target {
        let size = header(mem, h).size();
        assert!(
            size >= MIN_BLOCK,
            "block list corrupted: block at {h:#x} has size {size}"
        );
        h += size;
    }
    if h == target && h < capacity {
        Ok(())
    } else {
        tracing::warn!(%offset, "Rejected offset that is not a block boundary");
        Err(ShmError::InvalidPointer {
            offset,
            cause: "not a block boundary".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::layout::{layout_string, verify};
    use super::super::memory::VecMemory;
    use super::*;

    fn heap(static_size: u64, heap_size: u64) -> VecMemory {
        VecMemory::formatted(
            static_capacity_for(static_size),
            heap_capacity_for(heap_size),
        )
    }

    #[test]
    fn capacities_are_rounded() {
        let mem = heap(80, 1024);
        assert_eq!(mem.static_capacity(), 80);
        assert_eq!(mem.heap_capacity(), 4096);
        assert_eq!(mem.bytes().len(), 4096 + 80);

        let mem = heap(1, 1);
        assert_eq!(mem.static_capacity(), 48);
        assert_eq!(mem.heap_capacity(), 4096);
    }

    #[test]
    fn fresh_heap_is_one_free_block() {
        let mem = heap(80, 1024);
        assert_eq!(layout_string(&mem), "4088E");
        assert_eq!(mem.free_head(), 8);
    }

    #[test]
    fn small_allocation_rounds_to_minimum() {
        let mut mem = heap(80, 1024);
        let offset = allocate(&mut mem, 1).unwrap();
        assert_eq!(offset, HeapOffset::new(8));
        assert_eq!(layout_string(&mem), "24A, 4056E");
    }

    #[test]
    fn realloc_grows_in_place() {
        let mut mem = heap(80, 4096);
        let offset = allocate(&mut mem, 0x100).unwrap();
        assert_eq!(layout_string(&mem), "256A, 3824E");

        mem.slice_mut(offset.as_u64(), 4).copy_from_slice(b"data");
        let moved = reallocate(&mut mem, offset, 0x1FA).unwrap();
        assert_eq!(moved, offset);
        assert_eq!(layout_string(&mem), "512A, 3568E");
        assert_eq!(mem.slice(moved.as_u64(), 4), b"data");
    }

    #[test]
    fn realloc_shrinks_in_place() {
        let mut mem = heap(48, 4096);
        let a = allocate(&mut mem, 512).unwrap();
        let _b = allocate(&mut mem, 24).unwrap();
        assert_eq!(layout_string(&mem), "512A, 24A, 3536E");

        let same = reallocate(&mut mem, a, 100).unwrap();
        assert_eq!(same, a);
        assert_eq!(layout_string(&mem), "104A, 400E, 24A, 3536E");
        verify(&mem).unwrap();
    }

    #[test]
    fn realloc_moves_when_blocked() {
        let mut mem = heap(48, 4096);
        let a = allocate(&mut mem, 24).unwrap();
        let _b = allocate(&mut mem, 24).unwrap();
        mem.slice_mut(a.as_u64(), 24).copy_from_slice(&[7u8; 24]);

        let moved = reallocate(&mut mem, a, 100).unwrap();
        assert_ne!(moved, a);
        assert_eq!(mem.slice(moved.as_u64(), 24), &[7u8; 24]);
        assert_eq!(layout_string(&mem), "24E, 24A, 104A, 3912E");
        verify(&mem).unwrap();
    }

    #[test]
    fn full_allocation_and_coalescing() {
        let mut mem = heap(48, 4096);
        for _ in 0..128 {
            allocate(&mut mem, 1).unwrap();
        }
        assert_eq!(layout_string(&mem), vec!["24A"; 128].join(", "));
        assert_eq!(mem.free_head(), 0);

        for i in 1..127u64 {
            free(&mut mem, HeapOffset::new(i * 32 + 8)).unwrap();
        }
        assert_eq!(layout_string(&mem), "24A, 4024E, 24A");

        free(&mut mem, HeapOffset::new(8)).unwrap();
        assert_eq!(layout_string(&mem), "4056E, 24A");

        free(&mut mem, HeapOffset::new(4096 - 32 + 8)).unwrap();
        assert_eq!(layout_string(&mem), "4088E");
        verify(&mem).unwrap();
    }

    #[test]
    fn double_free_is_rejected() {
        let mut mem = heap(48, 4096);
        let a = allocate(&mut mem, 10).unwrap();
        free(&mut mem, a).unwrap();
        assert!(matches!(
            free(&mut mem, a),
            Err(ShmError::InvalidPointer { .. })
        ));
    }

    #[test]
    fn interior_offsets_are_rejected() {
        let mut mem = heap(48, 4096);
        let a = allocate(&mut mem, 64).unwrap();
        assert!(matches!(
            free_checked(&mut mem, a.add(16)),
            Err(ShmError::InvalidPointer { .. })
        ));
        assert!(matches!(
            free_checked(&mut mem, HeapOffset::new(3)),
            Err(ShmError::InvalidPointer { .. })
        ));
        assert!(matches!(
            free_checked(&mut mem, HeapOffset::new(1 << 20)),
            Err(ShmError::InvalidPointer { .. })
        ));
        free_checked(&mut mem, a).unwrap();
    }

    #[test]
    fn allocation_grows_heap() {
        let mut mem = heap(48, 4096);
        let a = allocate(&mut mem, 4000).unwrap();
        let b = allocate(&mut mem, 6000).unwrap();
        assert!(mem.heap_capacity() >= 4096 * 3);
        assert!(b > a);
        verify(&mem).unwrap();
    }

    #[test]
    fn growth_merges_free_tail() {
        let mut mem = heap(48, 4096);
        allocate(&mut mem, 2000).unwrap();
        assert_eq!(layout_string(&mem), "2000A, 2080E");

        allocate(&mut mem, 3000).unwrap();
        assert_eq!(mem.heap_capacity(), 8192);
        assert_eq!(layout_string(&mem), "2000A, 3000A, 3168E");
    }

    #[test]
    fn growth_limit_is_out_of_memory() {
        let mut mem = heap(48, 4096).with_max_heap(8192);
        let err = allocate(&mut mem, 10_000).unwrap_err();
        assert!(matches!(err, ShmError::OutOfMemory { .. }));
        assert_eq!(mem.heap_capacity(), 4096);
        verify(&mem).unwrap();
    }

    #[test]
    fn reserve_grows_only_when_the_tail_is_short() {
        let mut mem = heap(48, 4096).with_max_heap(8192);
        reserve(&mut mem, 4096).unwrap();
        assert_eq!(mem.heap_capacity(), 4096);

        allocate(&mut mem, 2000).unwrap();
        reserve(&mut mem, 3000).unwrap();
        assert_eq!(mem.heap_capacity(), 8192);
        assert_eq!(layout_string(&mem), "2000A, 6176E");

        assert!(matches!(
            reserve(&mut mem, 10_000),
            Err(ShmError::OutOfMemory { .. })
        ));
        assert_eq!(mem.heap_capacity(), 8192);
    }

    #[test]
    fn resize_appends_and_merges() {
        let mut mem = heap(80, 4096);
        allocate(&mut mem, 0x100).unwrap();
        resize(&mut mem, None, Some(4096 * 2)).unwrap();
        let p2 = allocate(&mut mem, 7712).unwrap();
        let p3 = allocate(&mut mem, 200).unwrap();
        free(&mut mem, p2).unwrap();
        assert_eq!(layout_string(&mem), "256A, 7712E, 200A");

        resize(&mut mem, Some(90), Some(4096 * 2 + 1)).unwrap();
        assert_eq!(mem.static_capacity(), 96);
        assert_eq!(mem.heap_capacity(), 4096 * 3);
        assert_eq!(layout_string(&mem), "256A, 7712E, 200A, 4088E");

        free(&mut mem, p3).unwrap();
        allocate(&mut mem, 4096 * 3 - 0x100 - 16 - 32).unwrap();
        assert_eq!(layout_string(&mem), "256A, 11984A, 24E");

        resize(&mut mem, None, Some(4096 * 3 + 1)).unwrap();
        assert_eq!(layout_string(&mem), "256A, 11984A, 4120E");
        verify(&mem).unwrap();
    }

    #[test]
    fn static_growth_moves_heap_intact() {
        let mut mem = heap(64, 4096);
        mem.bytes_mut()[48..56].copy_from_slice(b"reserved");
        let a = allocate(&mut mem, 16).unwrap();
        mem.slice_mut(a.as_u64(), 5).copy_from_slice(b"hello");

        resize(&mut mem, Some(200), None).unwrap();
        assert_eq!(mem.static_capacity(), 200);
        assert_eq!(&mem.bytes()[48..56], b"reserved");
        assert!(mem.bytes()[56..200].iter().all(|b| *b == 0));
        assert_eq!(mem.slice(a.as_u64(), 5), b"hello");
        verify(&mem).unwrap();
    }

    #[test]
    fn shrinking_is_rejected() {
        let mut mem = heap(96, 8192);
        assert!(matches!(
            resize(&mut mem, Some(48), None),
            Err(ShmError::ShrinkNotSupported { space: "static", .. })
        ));
        assert!(matches!(
            resize(&mut mem, None, Some(4096)),
            Err(ShmError::ShrinkNotSupported { space: "heap", .. })
        ));
        resize(&mut mem, Some(96), Some(8192)).unwrap();
    }

    #[test]
    fn mixed_sequence_keeps_accounting() {
        let mut mem = heap(48, 4096);
        let mut live = Vec::new();
        for round in 0..200u64 {
            let size = (round * 37) % 700 + 1;
            live.push(allocate(&mut mem, size).unwrap());
            if round % 3 == 0 {
                let victim = live.remove((round as usize * 7) % live.len());
                free(&mut mem, victim).unwrap();
            }
            if round % 5 == 0 {
                let idx = (round as usize * 11) % live.len();
                live[idx] = reallocate(&mut mem, live[idx], size * 2).unwrap();
            }
            verify(&mem).unwrap();
        }
        for offset in live {
            free(&mut mem, offset).unwrap();
        }
        let stats = verify(&mem).unwrap();
        assert_eq!(stats.blocks, 1);
        assert_eq!(stats.free_bytes + BLOCK_HEADER, mem.heap_capacity());
    }
}
