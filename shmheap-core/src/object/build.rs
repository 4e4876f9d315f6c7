//! Construction and destruction of object trees.

use super::read::{element, primitive_element};
use super::{
    Slot, entry_key_slot, entry_value_slot, header, int_key_word, list_slot, map_capacity,
    read_slot, set_count, set_table, table, tuple_slot, write_slot,
};
use crate::encoding::{
    CONTAINER_HEADER, ENTRY_SIZE, OBJECT_HEADER, ObjectHeader, ObjectKind, SLOT_SIZE, Value,
    count_of, object_size, primitive_header, write_primitive_data,
};
use crate::error::{Result, ShmError};
use crate::heap::{HeapMemoryMut, allocate, block_size, free, reserve};
use crate::types::{HeapOffset, Key};
use std::collections::BTreeMap;

/// Build `value` in the heap and return the offset of its root block.
///
/// `Null` builds nothing and returns the null offset. On failure every block
/// allocated so far is released again.
pub(crate) fn construct<M: HeapMemoryMut + ?Sized>(mem: &mut M, value: &Value) -> Result<HeapOffset> {
    let offset = match value {
        Value::Null => return Ok(HeapOffset::NULL),
        Value::Scalar(_) | Value::Array(_) | Value::Text(_) => construct_primitive(mem, value)?,
        Value::Tuple(items) => construct_tuple(mem, items)?,
        Value::List(items) => construct_list(mem, items)?,
        Value::Map(entries) => construct_map(mem, entries)?,
    };
    tracing::trace!(%offset, kind = %value.type_tag(), "Constructed object");
    Ok(offset)
}

fn construct_primitive<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    value: &Value,
) -> Result<HeapOffset> {
    let header = primitive_header(value)?;
    let size = object_size(&header);
    let offset = allocate(mem, size as u64)?;
    let bytes = mem.slice_mut(offset.as_u64(), size);
    bytes[..OBJECT_HEADER].copy_from_slice(&header.to_bytes());
    write_primitive_data(value, &mut bytes[OBJECT_HEADER..]);
    Ok(offset)
}

/// Allocate a zeroed object of `size` bytes with `header`.
fn allocate_object<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    header: ObjectHeader,
    size: usize,
) -> Result<HeapOffset> {
    let offset = allocate(mem, size as u64)?;
    let bytes = mem.slice_mut(offset.as_u64(), size);
    bytes.fill(0);
    bytes[..OBJECT_HEADER].copy_from_slice(&header.to_bytes());
    Ok(offset)
}

/// Allocate a zeroed table of `len` bytes, or nothing when empty.
fn allocate_table<M: HeapMemoryMut + ?Sized>(mem: &mut M, len: usize) -> Result<HeapOffset> {
    if len == 0 {
        return Ok(HeapOffset::NULL);
    }
    let table = allocate(mem, len as u64)?;
    mem.slice_mut(table.as_u64(), len).fill(0);
    Ok(table)
}

/// Run `fill` on a freshly allocated container, destroying it if it fails.
fn fill_or_destroy<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    offset: HeapOffset,
    fill: impl FnOnce(&mut M) -> Result<()>,
) -> Result<HeapOffset> {
    match fill(mem) {
        Ok(()) => Ok(offset),
        Err(e) => {
            destroy(mem, offset)?;
            Err(e)
        }
    }
}

fn construct_tuple<M: HeapMemoryMut + ?Sized>(mem: &mut M, items: &[Value]) -> Result<HeapOffset> {
    let header = ObjectHeader::container(ObjectKind::Tuple, count_of(items.len())?);
    let tuple = allocate_object(mem, header, object_size(&header))?;
    fill_or_destroy(mem, tuple, |mem| {
        for (i, item) in items.iter().enumerate() {
            let child = construct(mem, item)?;
            write_slot(mem, Slot::Word(tuple_slot(tuple, i)), child);
        }
        Ok(())
    })
}

fn construct_list<M: HeapMemoryMut + ?Sized>(mem: &mut M, items: &[Value]) -> Result<HeapOffset> {
    count_of(items.len())?;
    let list = allocate_object(
        mem,
        ObjectHeader::container(ObjectKind::List, 0),
        CONTAINER_HEADER,
    )?;
    fill_or_destroy(mem, list, |mem| {
        let table = allocate_table(mem, items.len() * SLOT_SIZE)?;
        set_table(mem, list, table, items.len());
        for (i, item) in items.iter().enumerate() {
            let child = construct(mem, item)?;
            write_slot(mem, Slot::Word(list_slot(table, i)), child);
            set_count(mem, list, i + 1)?;
        }
        Ok(())
    })
}

fn construct_map<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    entries: &BTreeMap<Key, Value>,
) -> Result<HeapOffset> {
    count_of(entries.len())?;
    let map = allocate_object(
        mem,
        ObjectHeader::container(ObjectKind::Map, 0),
        CONTAINER_HEADER,
    )?;
    fill_or_destroy(mem, map, |mem| {
        let capacity = map_capacity(entries.len());
        let table = allocate_table(mem, capacity * ENTRY_SIZE)?;
        set_table(mem, map, table, capacity);
        for (i, (key, value)) in entries.iter().enumerate() {
            let word = construct_key(mem, key)?;
            mem.write_u64(entry_key_slot(table, i), word);
            set_count(mem, map, i + 1)?;
            let child = construct(mem, value)?;
            write_slot(mem, Slot::Word(entry_value_slot(table, i)), child);
        }
        Ok(())
    })
}

/// Block bytes [`construct`] takes for `value`.
///
/// Also rejects everything that would make the build fail for a reason
/// other than running out of memory.
fn footprint(value: &Value) -> Result<u64> {
    Ok(match value {
        Value::Null => 0,
        Value::Scalar(_) | Value::Array(_) | Value::Text(_) => {
            block_size(object_size(&primitive_header(value)?) as u64)
        }
        Value::Tuple(items) => {
            let header = ObjectHeader::container(ObjectKind::Tuple, count_of(items.len())?);
            block_size(object_size(&header) as u64)
                + items.iter().map(footprint).sum::<Result<u64>>()?
        }
        Value::List(items) => {
            count_of(items.len())?;
            block_size(CONTAINER_HEADER as u64)
                + table_footprint(items.len() * SLOT_SIZE)
                + items.iter().map(footprint).sum::<Result<u64>>()?
        }
        Value::Map(entries) => {
            count_of(entries.len())?;
            let mut total = block_size(CONTAINER_HEADER as u64)
                + table_footprint(map_capacity(entries.len()) * ENTRY_SIZE);
            for (key, value) in entries {
                total += match key {
                    Key::Int(i) => int_key_word(*i).map(|_| 0)?,
                    Key::Str(s) => footprint(&Value::Text(s.clone()))?,
                };
                total += footprint(value)?;
            }
            total
        }
    })
}

fn table_footprint(len: usize) -> u64 {
    if len == 0 { 0 } else { block_size(len as u64) }
}

/// Encode a map key: inline for integers, a text object for strings.
pub(super) fn construct_key<M: HeapMemoryMut + ?Sized>(mem: &mut M, key: &Key) -> Result<u64> {
    match key {
        Key::Int(i) => int_key_word(*i),
        Key::Str(s) => Ok(construct_primitive(mem, &Value::Text(s.clone()))?.as_u64()),
    }
}

/// Release a key word built by [`construct_key`].
pub(super) fn destroy_key<M: HeapMemoryMut + ?Sized>(mem: &mut M, word: u64) -> Result<()> {
    if word & 1 == 0 && word != 0 {
        free(mem, HeapOffset::new(word))?;
    }
    Ok(())
}

/// Release the object at `offset` and everything it owns.
pub(crate) fn destroy<M: HeapMemoryMut + ?Sized>(mem: &mut M, offset: HeapOffset) -> Result<()> {
    if offset.is_null() {
        return Ok(());
    }
    let header = header(mem, offset)?;
    let count = header.count as usize;
    match header.kind {
        ObjectKind::Primitive => {}
        ObjectKind::Tuple => {
            for i in 0..count {
                let child = read_slot(mem, Slot::Word(tuple_slot(offset, i)));
                destroy(mem, child)?;
            }
        }
        ObjectKind::List => {
            let (table, _) = table(mem, offset);
            for i in 0..count {
                let child = read_slot(mem, Slot::Word(list_slot(table, i)));
                destroy(mem, child)?;
            }
            if !table.is_null() {
                free(mem, table)?;
            }
        }
        ObjectKind::Map => {
            let (table, _) = table(mem, offset);
            for i in 0..count {
                let word = mem.read_u64(entry_key_slot(table, i));
                destroy_key(mem, word)?;
                let child = read_slot(mem, Slot::Word(entry_value_slot(table, i)));
                destroy(mem, child)?;
            }
            if !table.is_null() {
                free(mem, table)?;
            }
        }
    }
    free(mem, offset)?;
    tracing::trace!(%offset, kind = header.kind.name(), "Destroyed object");
    Ok(())
}

/// Store `value` at `slot`.
///
/// The value is checked and room for all of its blocks reserved in the
/// tail free block before the old content is destroyed, so a store that
/// fails leaves the slot as it was. Array elements are overwritten in
/// place after a numeric cast.
pub(crate) fn assign<M: HeapMemoryMut + ?Sized>(mem: &mut M, slot: Slot, value: &Value) -> Result<()> {
    if let Slot::Element { array, index } = slot {
        let scalar = value
            .as_scalar()
            .ok_or_else(|| ShmError::type_mismatch("scalar", value.type_tag().to_string()))?;
        let element_type = primitive_element(&header(mem, array)?)?;
        // Bounds check before the write.
        element(mem, array, index)?;
        let scalar = scalar.cast(element_type)?;
        let size = element_type.size();
        let at = array.as_u64() + (OBJECT_HEADER + index * size) as u64;
        scalar.write_le(mem.slice_mut(at, size));
        return Ok(());
    }

    reserve(mem, footprint(value)?)?;
    let old = read_slot(mem, slot);
    destroy(mem, old)?;
    write_slot(mem, slot, HeapOffset::NULL);
    let new = construct(mem, value)?;
    write_slot(mem, slot, new);
    Ok(())
}
