//! Layout summaries and structural checks.

use super::block::{BLOCK_HEADER, MIN_BLOCK, header, next_free, prev_free};
use super::memory::HeapMemory;
use crate::types::HeapOffset;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write;

/// One block of the heap, in address order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    /// Payload offset.
    pub offset: HeapOffset,
    /// Payload size in bytes.
    pub size: u64,
    /// Whether the block is allocated.
    pub allocated: bool,
}

/// Accounting over all blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapStats {
    /// Heap capacity in bytes.
    pub capacity: u64,
    /// Number of blocks.
    pub blocks: usize,
    /// Number of allocated blocks.
    pub allocated_blocks: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Payload bytes in allocated blocks.
    pub allocated_bytes: u64,
    /// Payload bytes in free blocks.
    pub free_bytes: u64,
    /// Bytes taken by block headers.
    pub header_bytes: u64,
}

pub(crate) fn layout<M: HeapMemory + ?Sized>(mem: &M) -> Vec<BlockInfo> {
    let capacity = mem.heap_capacity();
    let mut blocks = Vec::new();
    let mut h = 0;
    while h < capacity {
        let block = header(mem, h);
        assert!(
            block.size() >= MIN_BLOCK,
            "block list corrupted: block at {h:#x} has size {}",
            block.size()
        );
        blocks.push(BlockInfo {
            offset: HeapOffset::new(h + BLOCK_HEADER),
            size: block.size() - BLOCK_HEADER,
            allocated: block.is_allocated(),
        });
        h += block.size();
    }
    blocks
}

/// Layout summary such as `"256A, 3824E"`.
pub(crate) fn layout_string<M: HeapMemory + ?Sized>(mem: &M) -> String {
    layout(mem)
        .iter()
        .map(|b| format!("{}{}", b.size, if b.allocated { 'A' } else { 'E' }))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Multi-line dump of the header words, blocks and free list.
pub(crate) fn describe<M: HeapMemory + ?Sized>(mem: &M) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "static capacity: {}", mem.static_capacity());
    let _ = writeln!(out, "heap capacity:   {}", mem.heap_capacity());
    let _ = writeln!(out, "entrance:        {}", mem.entrance());
    let _ = writeln!(
        out,
        "free-list head:  {}",
        HeapOffset::new(mem.free_head())
    );
    let _ = writeln!(out, "blocks:");
    for block in layout(mem) {
        let _ = writeln!(
            out,
            "  {} {:>10} {}",
            block.offset,
            block.size,
            if block.allocated { "allocated" } else { "free" }
        );
    }
    let _ = writeln!(out, "free list:");
    let mut payload = mem.free_head();
    let mut seen = BTreeSet::new();
    while payload != 0 && seen.insert(payload) {
        let h = payload - BLOCK_HEADER;
        let _ = writeln!(
            out,
            "  {} size {}",
            HeapOffset::new(payload),
            header(mem, h).size() - BLOCK_HEADER
        );
        payload = next_free(mem, h);
    }
    out
}

/// Check every structural invariant of the block list and free list.
pub(crate) fn verify<M: HeapMemory + ?Sized>(mem: &M) -> Result<HeapStats, String> {
    let capacity = mem.heap_capacity();
    let mut stats = HeapStats {
        capacity,
        ..HeapStats::default()
    };
    let mut free_blocks = BTreeSet::new();
    let mut prev_allocated = true;
    let mut h = 0;

    while h < capacity {
        let block = header(mem, h);
        let size = block.size();
        if size < MIN_BLOCK || h + size > capacity {
            return Err(format!("block at {h:#x} has bad size {size}"));
        }
        if block.prev_allocated() != prev_allocated {
            return Err(format!("block at {h:#x} has a stale previous-allocated flag"));
        }
        if block.is_allocated() {
            stats.allocated_blocks += 1;
            stats.allocated_bytes += size - BLOCK_HEADER;
        } else {
            if !prev_allocated {
                return Err(format!("free block at {h:#x} follows another free block"));
            }
            if mem.read_u64(h + size - 8) != size {
                return Err(format!("free block at {h:#x} has a bad footer"));
            }
            stats.free_blocks += 1;
            stats.free_bytes += size - BLOCK_HEADER;
            free_blocks.insert(h + BLOCK_HEADER);
        }
        stats.blocks += 1;
        stats.header_bytes += BLOCK_HEADER;
        prev_allocated = block.is_allocated();
        h += size;
    }
    if h != capacity {
        return Err(format!("blocks end at {h:#x}, capacity is {capacity:#x}"));
    }

    let mut listed = BTreeSet::new();
    let mut prev = 0;
    let mut payload = mem.free_head();
    while payload != 0 {
        if !free_blocks.contains(&payload) {
            return Err(format!("free list entry {payload:#x} is not a free block"));
        }
        if !listed.insert(payload) {
            return Err(format!("free list cycles at {payload:#x}"));
        }
        let h = payload - BLOCK_HEADER;
        if prev_free(mem, h) != prev {
            return Err(format!("free list entry {payload:#x} has a bad back link"));
        }
        prev = payload;
        payload = next_free(mem, h);
    }
    if listed != free_blocks {
        return Err(format!(
            "{} free blocks but {} on the free list",
            free_blocks.len(),
            listed.len()
        ));
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::super::alloc::{allocate, free};
    use super::super::memory::{HeapMemoryMut, VecMemory};
    use super::*;

    #[test]
    fn layout_lists_blocks_in_address_order() {
        let mut mem = VecMemory::formatted(48, 4096);
        let a = allocate(&mut mem, 100).unwrap();
        let b = allocate(&mut mem, 8).unwrap();

        let blocks = layout(&mem);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].offset, a);
        assert_eq!(blocks[0].size, 104);
        assert!(blocks[0].allocated);
        assert_eq!(blocks[1].offset, b);
        assert!(!blocks[2].allocated);
    }

    #[test]
    fn stats_account_for_whole_heap() {
        let mut mem = VecMemory::formatted(48, 8192);
        let a = allocate(&mut mem, 300).unwrap();
        allocate(&mut mem, 40).unwrap();
        free(&mut mem, a).unwrap();

        let stats = verify(&mem).unwrap();
        assert_eq!(
            stats.allocated_bytes + stats.free_bytes + stats.header_bytes,
            8192
        );
        assert_eq!(stats.free_blocks, 2);
        assert_eq!(stats.allocated_blocks, 1);
    }

    #[test]
    fn verify_detects_broken_footer() {
        let mut mem = VecMemory::formatted(48, 4096);
        mem.write_u64(4096 - 8, 12);
        assert!(verify(&mem).is_err());
    }

    #[test]
    fn describe_mentions_free_list() {
        let mut mem = VecMemory::formatted(48, 4096);
        allocate(&mut mem, 1).unwrap();
        let text = describe(&mem);
        assert!(text.contains("heap capacity:   4096"));
        assert!(text.contains("allocated"));
        assert!(text.contains("size 4056"));
    }
}
