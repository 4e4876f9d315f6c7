//! Lookups and decoding. Nothing here writes to the heap.

use super::{
    Slot, check_range, entry_key_slot, entry_value_slot, header, list_slot, normalize_index,
    not_indexable, read_slot, table, tuple_slot,
};
use crate::encoding::{
    OBJECT_HEADER, ObjectHeader, ObjectKind, Scalar, TypeTag, Value, decode_primitive_data,
    object_size,
};
use crate::error::{Result, ShmError};
use crate::heap::HeapMemory;
use crate::types::{HeapOffset, Key};
use std::collections::BTreeMap;

/// Stored type of the object at `offset`; `Null` for the null offset.
pub(crate) fn type_tag<M: HeapMemory + ?Sized>(mem: &M, offset: HeapOffset) -> Result<TypeTag> {
    if offset.is_null() {
        return Ok(TypeTag::Null);
    }
    Ok(header(mem, offset)?.type_tag())
}

/// Locate the child of `offset` addressed by `key`.
pub(crate) fn child<M: HeapMemory + ?Sized>(
    mem: &M,
    offset: HeapOffset,
    key: &Key,
) -> Result<Slot> {
    let header = header(mem, offset)?;
    let count = header.count as usize;
    match (header.kind, key) {
        (ObjectKind::Primitive, Key::Int(i)) if !header.is_scalar() && !header.is_text() => {
            Ok(Slot::Element {
                array: offset,
                index: normalize_index(*i, count)?,
            })
        }
        (ObjectKind::Tuple, Key::Int(i)) => {
            Ok(Slot::Word(tuple_slot(offset, normalize_index(*i, count)?)))
        }
        (ObjectKind::List, Key::Int(i)) => {
            let index = normalize_index(*i, count)?;
            let (table, _) = table(mem, offset);
            Ok(Slot::Word(list_slot(table, index)))
        }
        (ObjectKind::Map, _) => {
            let index = find_entry(mem, offset, key)?.ok_or_else(|| ShmError::KeyNotFound {
                key: key.describe(),
            })?;
            let (table, _) = table(mem, offset);
            Ok(Slot::Word(entry_value_slot(table, index)))
        }
        _ => Err(not_indexable(&header, key)),
    }
}

/// Index of the entry for `key` in the map at `map`.
pub(super) fn find_entry<M: HeapMemory + ?Sized>(
    mem: &M,
    map: HeapOffset,
    key: &Key,
) -> Result<Option<usize>> {
    let count = header(mem, map)?.count as usize;
    let (table, _) = table(mem, map);
    for index in 0..count {
        let word = mem.read_u64(entry_key_slot(table, index));
        let matches = match key {
            Key::Int(i) => word & 1 == 1 && (word as i64) >> 1 == *i,
            Key::Str(s) => word & 1 == 0 && text_equals(mem, HeapOffset::new(word), s)?,
        };
        if matches {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn text_equals<M: HeapMemory + ?Sized>(mem: &M, offset: HeapOffset, s: &str) -> Result<bool> {
    let header = header(mem, offset)?;
    if !header.is_text() || header.count as usize != s.len() {
        return Ok(false);
    }
    check_range(mem, offset, OBJECT_HEADER + s.len())?;
    Ok(mem.slice(offset.as_u64() + OBJECT_HEADER as u64, s.len()) == s.as_bytes())
}

/// Key of map entry `index`.
pub(super) fn entry_key<M: HeapMemory + ?Sized>(
    mem: &M,
    table: HeapOffset,
    index: usize,
) -> Result<Key> {
    let word = mem.read_u64(entry_key_slot(table, index));
    if word & 1 == 1 {
        return Ok(Key::Int((word as i64) >> 1));
    }
    match decode(mem, HeapOffset::new(word))? {
        Value::Text(s) => Ok(Key::Str(s)),
        other => Err(ShmError::type_mismatch("text key", other.type_tag().to_string())),
    }
}

/// Key of entry `index` of the map at `offset`.
pub(crate) fn key_at<M: HeapMemory + ?Sized>(
    mem: &M,
    offset: HeapOffset,
    index: usize,
) -> Result<Key> {
    let header = header(mem, offset)?;
    if header.kind != ObjectKind::Map {
        return Err(ShmError::type_mismatch("dict", header.type_tag().to_string()));
    }
    if index >= header.count as usize {
        return Err(ShmError::IndexOutOfRange {
            index: index as i64,
            len: header.count as usize,
        });
    }
    let (table, _) = table(mem, offset);
    entry_key(mem, table, index)
}

/// Keys of the map at `offset`, in insertion order.
pub(crate) fn keys<M: HeapMemory + ?Sized>(mem: &M, offset: HeapOffset) -> Result<Vec<Key>> {
    let header = header(mem, offset)?;
    if header.kind != ObjectKind::Map {
        return Err(ShmError::type_mismatch("dict", header.type_tag().to_string()));
    }
    let (table, _) = table(mem, offset);
    (0..header.count as usize)
        .map(|i| entry_key(mem, table, i))
        .collect()
}

/// Element `index` of the primitive array at `array`.
pub(crate) fn element<M: HeapMemory + ?Sized>(
    mem: &M,
    array: HeapOffset,
    index: usize,
) -> Result<Scalar> {
    let header = header(mem, array)?;
    let element = primitive_element(&header)?;
    if index >= header.count as usize {
        return Err(ShmError::IndexOutOfRange {
            index: index as i64,
            len: header.count as usize,
        });
    }
    let size = element.size();
    let at = OBJECT_HEADER + index * size;
    check_range(mem, array, at + size)?;
    Ok(Scalar::read_le(
        element,
        mem.slice(array.as_u64() + at as u64, size),
    ))
}

pub(super) fn primitive_element(
    header: &ObjectHeader,
) -> Result<crate::encoding::ElementType> {
    match (header.kind, header.element) {
        (ObjectKind::Primitive, Some(element)) => Ok(element),
        _ => Err(ShmError::type_mismatch(
            "primitive",
            header.type_tag().to_string(),
        )),
    }
}

/// Decode the object at `offset` into a native value.
pub(crate) fn decode<M: HeapMemory + ?Sized>(mem: &M, offset: HeapOffset) -> Result<Value> {
    if offset.is_null() {
        return Ok(Value::Null);
    }
    let header = header(mem, offset)?;
    let count = header.count as usize;
    match header.kind {
        ObjectKind::Primitive => {
            let size = object_size(&header);
            check_range(mem, offset, size)?;
            let data = mem.slice(
                offset.as_u64() + OBJECT_HEADER as u64,
                size - OBJECT_HEADER,
            );
            decode_primitive_data(&header, data)
        }
        ObjectKind::Tuple => {
            check_range(mem, offset, object_size(&header))?;
            let items = (0..count)
                .map(|i| decode(mem, read_slot(mem, Slot::Word(tuple_slot(offset, i)))))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Tuple(items))
        }
        ObjectKind::List => {
            let (table, _) = table(mem, offset);
            let items = (0..count)
                .map(|i| decode(mem, read_slot(mem, Slot::Word(list_slot(table, i)))))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::List(items))
        }
        ObjectKind::Map => {
            let (table, _) = table(mem, offset);
            let mut entries = BTreeMap::new();
            for i in 0..count {
                let key = entry_key(mem, table, i)?;
                let value = decode(mem, read_slot(mem, Slot::Word(entry_value_slot(table, i))))?;
                entries.insert(key, value);
            }
            Ok(Value::Map(entries))
        }
    }
}

/// Membership test: map keys, array elements, list and tuple children, or
/// a substring of text.
pub(crate) fn contains<M: HeapMemory + ?Sized>(
    mem: &M,
    offset: HeapOffset,
    needle: &Value,
) -> Result<bool> {
    let header = header(mem, offset)?;
    match header.kind {
        ObjectKind::Map => {
            let key = match needle {
                Value::Text(s) => Key::Str(s.clone()),
                Value::Scalar(s) => match s.as_i64() {
                    Some(i) => Key::Int(i),
                    None => return Ok(false),
                },
                _ => return Ok(false),
            };
            Ok(find_entry(mem, offset, &key)?.is_some())
        }
        ObjectKind::Primitive if header.is_text() => match (decode(mem, offset)?, needle) {
            (Value::Text(hay), Value::Text(s)) => Ok(hay.contains(s.as_str())),
            _ => Ok(false),
        },
        ObjectKind::Primitive if header.is_scalar() => Err(ShmError::NotIterable {
            kind: header.type_tag().to_string(),
        }),
        ObjectKind::Primitive => {
            let Some(needle) = needle.as_scalar() else {
                return Ok(false);
            };
            for i in 0..header.count as usize {
                if element(mem, offset, i)?.loosely_equals(&needle) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ObjectKind::Tuple | ObjectKind::List => match decode(mem, offset)? {
            Value::Tuple(items) | Value::List(items) => {
                Ok(items.iter().any(|item| item.loosely_equals(needle)))
            }
            _ => Ok(false),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::super::construct;
    use super::*;
    use crate::heap::VecMemory;

    fn heap() -> VecMemory {
        VecMemory::formatted(48, 4096)
    }

    #[test]
    fn child_of_each_kind() {
        let mut mem = heap();
        let list = construct(&mut mem, &Value::list([1i64.into(), "x".into()])).unwrap();
        let Slot::Word(at) = child(&mem, list, &Key::Int(-1)).unwrap() else {
            panic!("list child is a word slot");
        };
        assert_eq!(decode(&mem, HeapOffset::new(mem.read_u64(at))).unwrap(), Value::from("x"));

        let array = construct(&mut mem, &Value::from(vec![5i32, 6, 7])).unwrap();
        assert_eq!(
            child(&mem, array, &Key::Int(1)).unwrap(),
            Slot::Element { array, index: 1 }
        );
        assert_eq!(element(&mem, array, 2).unwrap(), Scalar::I32(7));

        let map = construct(&mut mem, &Value::map_from([("a", 1i64)])).unwrap();
        assert!(matches!(
            child(&mem, map, &Key::from("b")),
            Err(ShmError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn scalars_and_text_are_not_indexable() {
        let mut mem = heap();
        let scalar = construct(&mut mem, &Value::from(3i64)).unwrap();
        assert!(matches!(
            child(&mem, scalar, &Key::Int(0)),
            Err(ShmError::NotIndexable { .. })
        ));
        let text = construct(&mut mem, &Value::from("abc")).unwrap();
        assert!(matches!(
            child(&mem, text, &Key::Int(0)),
            Err(ShmError::NotIndexable { .. })
        ));
        let list = construct(&mut mem, &Value::list([])).unwrap();
        assert!(matches!(
            child(&mem, list, &Key::from("a")),
            Err(ShmError::NotIndexable { .. })
        ));
    }

    #[test]
    fn mixed_keys_decode() {
        let mut mem = heap();
        let value = Value::map_from([
            (Key::Int(-3), Value::from(1i64)),
            (Key::from("name"), Value::from("ada")),
        ]);
        let map = construct(&mut mem, &value).unwrap();
        assert_eq!(decode(&mem, map).unwrap(), value);
        let keys = keys(&mem, map).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&Key::Int(-3)));
    }

    #[test]
    fn membership() {
        let mut mem = heap();
        let map = construct(&mut mem, &Value::map_from([("k", 1i64)])).unwrap();
        assert!(contains(&mem, map, &Value::from("k")).unwrap());
        assert!(!contains(&mem, map, &Value::from(1i64)).unwrap());

        let array = construct(&mut mem, &Value::from(vec![1.5f64, 2.0])).unwrap();
        assert!(contains(&mem, array, &Value::from(2i64)).unwrap());

        let text = construct(&mut mem, &Value::from("hello")).unwrap();
        assert!(contains(&mem, text, &Value::from("ell")).unwrap());

        let scalar = construct(&mut mem, &Value::from(1i64)).unwrap();
        assert!(matches!(
            contains(&mem, scalar, &Value::from(1i64)),
            Err(ShmError::NotIterable { .. })
        ));
    }
}
