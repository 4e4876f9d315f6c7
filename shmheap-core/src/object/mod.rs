//! Typed objects stored in heap blocks.
//!
//! Every function here works on borrowed heap memory and is called with the
//! region lock already held. Objects form a tree: a container owns the
//! blocks of its children, its table and (for maps) its string keys, and
//! destroying it releases all of them.
//!
//! Children are reached through a [`Slot`], the place a child offset is
//! stored: the entrance word, a word inside a tuple or a container table,
//! or an element of a primitive array.

mod build;
mod edit;
mod read;
mod render;

pub(crate) use build::assign;
#[cfg(test)]
pub(crate) use build::construct;
pub(crate) use edit::{clear, list_push, map_insert, remove_child};
pub(crate) use read::{child, contains, decode, element, key_at, keys, type_tag};
pub(crate) use render::render;

use crate::encoding::{ENTRY_SIZE, OBJECT_HEADER, ObjectHeader, SLOT_SIZE, count_of};
use crate::error::{Result, ShmError};
use crate::heap::{HeapMemory, HeapMemoryMut};
use crate::types::{HeapOffset, Key};
use byteorder::{ByteOrder, LittleEndian};

/// Smallest integer map key that can be stored inline.
pub const MIN_INT_KEY: i64 = -(1 << 62);

/// Largest integer map key that can be stored inline.
pub const MAX_INT_KEY: i64 = (1 << 62) - 1;

/// Smallest table a growing list or map gets.
const MIN_TABLE_CAPACITY: usize = 4;

/// Table capacity of a new map with `len` entries. Empty maps have no table.
fn map_capacity(len: usize) -> usize {
    if len == 0 { 0 } else { len.max(MIN_TABLE_CAPACITY) }
}

/// Where a child offset lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// The entrance word of the region header.
    Entrance,
    /// An 8-byte word at this heap offset.
    Word(u64),
    /// Element `index` of the primitive array at `array`.
    Element { array: HeapOffset, index: usize },
}

pub(crate) fn read_slot<M: HeapMemory + ?Sized>(mem: &M, slot: Slot) -> HeapOffset {
    match slot {
        Slot::Entrance => mem.entrance(),
        Slot::Word(at) => HeapOffset::new(mem.read_u64(at)),
        Slot::Element { .. } => HeapOffset::NULL,
    }
}

pub(crate) fn write_slot<M: HeapMemoryMut + ?Sized>(mem: &mut M, slot: Slot, offset: HeapOffset) {
    match slot {
        Slot::Entrance => mem.set_entrance(offset),
        Slot::Word(at) => mem.write_u64(at, offset.as_u64()),
        Slot::Element { .. } => {}
    }
}

/// Check that `len` bytes at `offset` lie inside the heap.
fn check_range<M: HeapMemory + ?Sized>(mem: &M, offset: HeapOffset, len: usize) -> Result<()> {
    let end = offset.as_u64().checked_add(len as u64);
    if offset.is_null() || end.is_none_or(|end| end > mem.heap_capacity()) {
        return Err(ShmError::InvalidPointer {
            offset,
            cause: format!("object of {len} bytes does not fit in the heap"),
        });
    }
    Ok(())
}

/// Object header at `offset`.
pub(crate) fn header<M: HeapMemory + ?Sized>(mem: &M, offset: HeapOffset) -> Result<ObjectHeader> {
    check_range(mem, offset, OBJECT_HEADER)?;
    ObjectHeader::from_bytes(mem.slice(offset.as_u64(), OBJECT_HEADER))
}

fn set_count<M: HeapMemoryMut + ?Sized>(mem: &mut M, offset: HeapOffset, count: usize) -> Result<()> {
    let count = count_of(count)?;
    LittleEndian::write_u32(mem.slice_mut(offset.as_u64() + 4, 4), count);
    Ok(())
}

/// Table offset and capacity of a list or map.
fn table<M: HeapMemory + ?Sized>(mem: &M, offset: HeapOffset) -> (HeapOffset, usize) {
    let at = offset.as_u64() + OBJECT_HEADER as u64;
    (
        HeapOffset::new(mem.read_u64(at)),
        mem.read_u64(at + 8) as usize,
    )
}

fn set_table<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    offset: HeapOffset,
    table: HeapOffset,
    capacity: usize,
) {
    let at = offset.as_u64() + OBJECT_HEADER as u64;
    mem.write_u64(at, table.as_u64());
    mem.write_u64(at + 8, capacity as u64);
}

/// Word holding child `index` of a tuple.
fn tuple_slot(tuple: HeapOffset, index: usize) -> u64 {
    tuple.as_u64() + (OBJECT_HEADER + index * SLOT_SIZE) as u64
}

/// Word holding child `index` of a list table.
fn list_slot(table: HeapOffset, index: usize) -> u64 {
    table.as_u64() + (index * SLOT_SIZE) as u64
}

/// Key word of map entry `index`; the value offset follows it.
fn entry_key_slot(table: HeapOffset, index: usize) -> u64 {
    table.as_u64() + (index * ENTRY_SIZE) as u64
}

fn entry_value_slot(table: HeapOffset, index: usize) -> u64 {
    entry_key_slot(table, index) + 8
}

/// Encode an integer map key inline: shifted left, low bit set.
pub(crate) fn int_key_word(key: i64) -> Result<u64> {
    if !(MIN_INT_KEY..=MAX_INT_KEY).contains(&key) {
        return Err(ShmError::InvalidKey {
            key: key.to_string(),
            cause: format!("integer keys must lie in {MIN_INT_KEY}..={MAX_INT_KEY}"),
        });
    }
    Ok(((key << 1) | 1) as u64)
}

/// Resolve a possibly negative index against `len`.
pub(crate) fn normalize_index(index: i64, len: usize) -> Result<usize> {
    let resolved = if index < 0 {
        index.checked_add(len as i64)
    } else {
        Some(index)
    };
    match resolved {
        Some(i) if i >= 0 && (i as usize) < len => Ok(i as usize),
        _ => Err(ShmError::IndexOutOfRange { index, len }),
    }
}

fn not_indexable(header: &ObjectHeader, key: &Key) -> ShmError {
    ShmError::NotIndexable {
        kind: header.type_tag().to_string(),
        key: key.describe(),
    }
}
