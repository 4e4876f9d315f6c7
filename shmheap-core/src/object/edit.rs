//! In-place edits of containers and arrays.

use super::build::{assign, construct, construct_key, destroy, destroy_key};
use super::read::find_entry;
use super::{
    MIN_TABLE_CAPACITY, Slot, entry_key_slot, entry_value_slot, header, int_key_word, list_slot,
    normalize_index, not_indexable, read_slot, set_count, set_table, table, tuple_slot, write_slot,
};
use crate::encoding::{ENTRY_SIZE, OBJECT_HEADER, ObjectHeader, ObjectKind, SLOT_SIZE, Value};
use crate::error::{Result, ShmError};
use crate::heap::{HeapMemoryMut, allocate, free, reallocate};
use crate::types::{HeapOffset, Key};

fn expect_kind(header: &ObjectHeader, kind: ObjectKind) -> Result<()> {
    if header.kind != kind {
        return Err(ShmError::type_mismatch(
            kind.name(),
            header.type_tag().to_string(),
        ));
    }
    Ok(())
}

/// Resize a table block to `len` bytes, allocating or freeing as needed.
fn resize_table<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    table: HeapOffset,
    len: usize,
) -> Result<HeapOffset> {
    match (table.is_null(), len) {
        (true, 0) => Ok(HeapOffset::NULL),
        (true, _) => allocate(mem, len as u64),
        (false, 0) => {
            free(mem, table)?;
            Ok(HeapOffset::NULL)
        }
        (false, _) => reallocate(mem, table, len as u64),
    }
}

/// Append `value` to the list at `list`, doubling the table when full.
pub(crate) fn list_push<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    list: HeapOffset,
    value: &Value,
) -> Result<()> {
    let header = header(mem, list)?;
    expect_kind(&header, ObjectKind::List)?;
    let count = header.count as usize;
    let (mut table, capacity) = table(mem, list);

    let child = construct(mem, value)?;
    if count == capacity {
        let capacity = (capacity * 2).max(MIN_TABLE_CAPACITY);
        table = match resize_table(mem, table, capacity * SLOT_SIZE) {
            Ok(table) => table,
            Err(e) => {
                destroy(mem, child)?;
                return Err(e);
            }
        };
        set_table(mem, list, table, capacity);
        tracing::trace!(%list, capacity, "Grew list table");
    }
    write_slot(mem, Slot::Word(list_slot(table, count)), child);
    set_count(mem, list, count + 1)
}

/// Store `value` under `key` in the map at `map`, replacing an existing
/// entry or appending a new one. A full table doubles.
pub(crate) fn map_insert<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    map: HeapOffset,
    key: &Key,
    value: &Value,
) -> Result<()> {
    let header = header(mem, map)?;
    expect_kind(&header, ObjectKind::Map)?;
    if let Some(index) = find_entry(mem, map, key)? {
        let (table, _) = table(mem, map);
        return assign(mem, Slot::Word(entry_value_slot(table, index)), value);
    }
    if let Key::Int(i) = key {
        int_key_word(*i)?;
    }

    let count = header.count as usize;
    let child = construct(mem, value)?;
    let word = match construct_key(mem, key) {
        Ok(word) => word,
        Err(e) => {
            destroy(mem, child)?;
            return Err(e);
        }
    };
    let (table, capacity) = table(mem, map);
    let table = if count == capacity {
        let capacity = (capacity * 2).max(MIN_TABLE_CAPACITY);
        match resize_table(mem, table, capacity * ENTRY_SIZE) {
            Ok(table) => {
                set_table(mem, map, table, capacity);
                tracing::trace!(%map, capacity, "Grew map table");
                table
            }
            Err(e) => {
                destroy_key(mem, word)?;
                destroy(mem, child)?;
                return Err(e);
            }
        }
    } else {
        table
    };

    mem.write_u64(entry_key_slot(table, count), word);
    write_slot(mem, Slot::Word(entry_value_slot(table, count)), child);
    set_count(mem, map, count + 1)
}

/// Remove the child of `parent` at `key` and destroy it. Sequences, arrays
/// and map tables close the gap; a map table is released once empty.
pub(crate) fn remove_child<M: HeapMemoryMut + ?Sized>(
    mem: &mut M,
    parent: HeapOffset,
    key: &Key,
) -> Result<()> {
    let header = header(mem, parent)?;
    let count = header.count as usize;
    match (header.kind, key) {
        (ObjectKind::Primitive, Key::Int(i)) if !header.is_scalar() && !header.is_text() => {
            let index = normalize_index(*i, count)?;
            let size = header.element.map_or(0, |e| e.size());
            let at = parent.as_u64() + (OBJECT_HEADER + index * size) as u64;
            mem.copy_within(at + size as u64, at, (count - index - 1) * size);
            set_count(mem, parent, count - 1)
        }
        (ObjectKind::Tuple, Key::Int(i)) => {
            let index = normalize_index(*i, count)?;
            let at = tuple_slot(parent, index);
            let child = read_slot(mem, Slot::Word(at));
            mem.copy_within(at + SLOT_SIZE as u64, at, (count - index - 1) * SLOT_SIZE);
            set_count(mem, parent, count - 1)?;
            destroy(mem, child)
        }
        (ObjectKind::List, Key::Int(i)) => {
            let index = normalize_index(*i, count)?;
            let (table, _) = table(mem, parent);
            let at = list_slot(table, index);
            let child = read_slot(mem, Slot::Word(at));
            mem.copy_within(at + SLOT_SIZE as u64, at, (count - index - 1) * SLOT_SIZE);
            set_count(mem, parent, count - 1)?;
            destroy(mem, child)
        }
        (ObjectKind::Map, _) => {
            let index = find_entry(mem, parent, key)?.ok_or_else(|| ShmError::KeyNotFound {
                key: key.describe(),
            })?;
            let (table, _) = table(mem, parent);
            let word = mem.read_u64(entry_key_slot(table, index));
            let child = read_slot(mem, Slot::Word(entry_value_slot(table, index)));
            let at = entry_key_slot(table, index);
            mem.copy_within(at + ENTRY_SIZE as u64, at, (count - index - 1) * ENTRY_SIZE);
            set_count(mem, parent, count - 1)?;

            destroy(mem, child)?;
            destroy_key(mem, word)?;
            if count == 1 {
                resize_table(mem, table, 0)?;
                set_table(mem, parent, HeapOffset::NULL, 0);
            }
            Ok(())
        }
        _ => Err(not_indexable(&header, key)),
    }
}

/// Remove every child or element of the collection at `offset`.
pub(crate) fn clear<M: HeapMemoryMut + ?Sized>(mem: &mut M, offset: HeapOffset) -> Result<()> {
    let header = header(mem, offset)?;
    let count = header.count as usize;
    match header.kind {
        ObjectKind::Primitive if header.is_scalar() => {
            return Err(ShmError::type_mismatch(
                "collection",
                header.type_tag().to_string(),
            ));
        }
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
            resize_table(mem, table, 0)?;
            set_table(mem, offset, HeapOffset::NULL, 0);
        }
        ObjectKind::Map => {
            let (table, _) = table(mem, offset);
            for i in 0..count {
                let word = mem.read_u64(entry_key_slot(table, i));
                destroy_key(mem, word)?;
                let child = read_slot(mem, Slot::Word(entry_value_slot(table, i)));
                destroy(mem, child)?;
            }
            resize_table(mem, table, 0)?;
            set_table(mem, offset, HeapOffset::NULL, 0);
        }
    }
    set_count(mem, offset, 0)
}

#[cfg(test)]
mod tests {
    use super::super::decode;
    use super::*;
    use crate::heap::VecMemory;

    fn mem() -> VecMemory {
        VecMemory::formatted(48, 4096)
    }

    fn layout(mem: &VecMemory) -> String {
        crate::heap::layout_string(mem)
    }

    #[test]
    fn push_grows_table() {
        let mut mem = mem();
        let list = construct(&mut mem, &Value::list([])).unwrap();
        for i in 0..10i64 {
            list_push(&mut mem, list, &Value::from(i)).unwrap();
        }
        let (_, capacity) = table(&mem, list);
        assert_eq!(capacity, 16);
        assert_eq!(
            decode(&mem, list).unwrap(),
            Value::list((0..10i64).map(Value::from))
        );
    }

    #[test]
    fn push_onto_non_list_is_rejected() {
        let mut mem = mem();
        let map = construct(&mut mem, &Value::map()).unwrap();
        assert!(matches!(
            list_push(&mut mem, map, &Value::from(1i64)),
            Err(ShmError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn map_insert_appends_and_replaces() {
        let mut mem = mem();
        let map = construct(&mut mem, &Value::map()).unwrap();
        map_insert(&mut mem, map, &Key::from("a"), &Value::from(1i64)).unwrap();
        map_insert(&mut mem, map, &Key::Int(7), &Value::from("seven")).unwrap();
        map_insert(&mut mem, map, &Key::from("a"), &Value::from(2i64)).unwrap();

        let expected = Value::map_from([
            (Key::from("a"), Value::from(2i64)),
            (Key::Int(7), Value::from("seven")),
        ]);
        assert_eq!(decode(&mem, map).unwrap(), expected);
        assert_eq!(header(&mem, map).unwrap().count, 2);
    }

    #[test]
    fn map_insert_then_remove_restores_layout() {
        let mut mem = mem();
        let map = construct(&mut mem, &Value::map_from([("9", 2i64)])).unwrap();
        let before = layout(&mem);
        assert_eq!(before, "24A, 64A, 24A, 24A, 3920E");

        let long = Key::from("k".repeat(100));
        map_insert(&mut mem, map, &long, &Value::from(2i64)).unwrap();
        assert_eq!(layout(&mem), "24A, 64A, 24A, 24A, 24A, 112A, 3768E");

        remove_child(&mut mem, map, &long).unwrap();
        assert_eq!(decode(&mem, map).unwrap(), Value::map_from([("9", 2i64)]));
        assert_eq!(layout(&mem), before);
    }

    #[test]
    fn map_table_doubles_and_is_released_when_empty() {
        let mut mem = mem();
        let map = construct(&mut mem, &Value::map_from([("a", 1i64), ("b", 2i64)])).unwrap();
        assert_eq!(table(&mem, map).1, 4);
        for key in ["c", "d", "e"] {
            map_insert(&mut mem, map, &Key::from(key), &Value::from(0i64)).unwrap();
        }
        assert_eq!(table(&mem, map).1, 8);

        for key in ["a", "b", "c", "d"] {
            remove_child(&mut mem, map, &Key::from(key)).unwrap();
        }
        assert_eq!(table(&mem, map).1, 8);
        remove_child(&mut mem, map, &Key::from("e")).unwrap();
        assert_eq!(table(&mem, map), (HeapOffset::NULL, 0));
        assert!(matches!(
            remove_child(&mut mem, map, &Key::from("e")),
            Err(ShmError::KeyNotFound { .. })
        ));

        destroy(&mut mem, map).unwrap();
        assert_eq!(layout(&mem), "4088E");
    }

    #[test]
    fn remove_compacts_sequences() {
        let mut mem = mem();
        let list = construct(
            &mut mem,
            &Value::list(["a".into(), "b".into(), "c".into()]),
        )
        .unwrap();
        remove_child(&mut mem, list, &Key::Int(0)).unwrap();
        assert_eq!(
            decode(&mem, list).unwrap(),
            Value::list(["b".into(), "c".into()])
        );

        let array = construct(&mut mem, &Value::from(vec![1u32, 2, 3, 4])).unwrap();
        remove_child(&mut mem, array, &Key::Int(-3)).unwrap();
        assert_eq!(decode(&mem, array).unwrap(), Value::from(vec![1u32, 3, 4]));

        let tuple = construct(&mut mem, &Value::tuple([1i8.into(), 2i8.into()])).unwrap();
        remove_child(&mut mem, tuple, &Key::Int(1)).unwrap();
        assert_eq!(decode(&mem, tuple).unwrap(), Value::tuple([1i8.into()]));
    }

    #[test]
    fn clear_releases_children() {
        let mut mem = mem();
        let list = construct(&mut mem, &Value::list([])).unwrap();
        let empty = layout(&mem);
        for word in ["x", "y", "z"] {
            list_push(&mut mem, list, &Value::from(word)).unwrap();
        }
        clear(&mut mem, list).unwrap();
        assert_eq!(decode(&mem, list).unwrap(), Value::list([]));
        assert_eq!(layout(&mem), empty);

        let scalar = construct(&mut mem, &Value::from(1.0)).unwrap();
        assert!(clear(&mut mem, scalar).is_err());
    }
}
