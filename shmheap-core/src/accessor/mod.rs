//! Path-addressed access to the object graph.
//!
//! An [`Accessor`] is a heap handle plus a key path from the entrance. It
//! holds no offsets: every call takes the region lock, walks the path from
//! the entrance and works on whatever it finds there. An accessor whose
//! path no longer resolves (because something on the way was deleted or
//! replaced) reports `StaleReference` on fetch and `PathNotFound` elsewhere.
//!
//! ```no_run
//! use shmheap_core::{Heap, HeapConfig, Value};
//!
//! # fn main() -> shmheap_core::Result<()> {
//! let heap = Heap::open("jobs", &HeapConfig::default())?;
//! let root = heap.root();
//! root.set(Value::map())?;
//! root.at("queue").set(Value::list([]))?;
//! root.at("queue").add("first")?;
//! assert_eq!(root.at("queue").len()?, 1);
//! # Ok(())
//! # }
//! ```

mod iter;

pub use iter::Iter;

use crate::codec::{StreamReader, StreamWriter};
use crate::encoding::{ObjectKind, TypeTag, Value};
use crate::error::{Result, ResultExt, ShmError};
use crate::heap::{Heap, HeapMemory};
use crate::object::{self, Slot};
use crate::types::{HeapOffset, Key, format_path, parse_path};
use std::fmt;
use std::io::{Read, Write};

/// Elements shown per collection by `Display`.
pub const DEFAULT_MAX_ELEMENTS: usize = 8;

/// What a path currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// An empty slot.
    Null,
    /// A typed object.
    Object(HeapOffset),
    /// One element of a primitive array.
    Element {
        /// The array object.
        array: HeapOffset,
        /// Element index.
        index: usize,
    },
}

/// A path-bound cursor into a heap.
#[derive(Clone)]
pub struct Accessor {
    heap: Heap,
    path: Vec<Key>,
}

impl Accessor {
    pub(crate) fn new(heap: Heap, path: Vec<Key>) -> Self {
        Self { heap, path }
    }

    /// The heap this accessor reads.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Accessor for the child at `key`.
    pub fn at(&self, key: impl Into<Key>) -> Accessor {
        let mut path = self.path.clone();
        path.push(key.into());
        Accessor::new(self.heap.clone(), path)
    }

    /// Accessor for a dotted path below this one.
    pub fn at_path(&self, path: &str) -> Accessor {
        let mut keys = self.path.clone();
        keys.extend(parse_path(path));
        Accessor::new(self.heap.clone(), keys)
    }

    /// Accessor for the parent, `None` at the entrance.
    pub fn parent(&self) -> Option<Accessor> {
        let (_, parent) = self.path.split_last()?;
        Some(Accessor::new(self.heap.clone(), parent.to_vec()))
    }

    /// Key path from the entrance.
    pub fn path(&self) -> &[Key] {
        &self.path
    }

    /// Dotted form of the path.
    pub fn path_string(&self) -> String {
        format_path(&self.path)
    }

    /// Walk the path and report what it points at.
    pub fn resolve(&self) -> Result<Resolved> {
        self.heap
            .read(|mem| walk(mem, &self.path))
            .path_not_found(&self.path_string())
    }

    /// Decode the value at the path.
    pub fn fetch(&self) -> Result<Value> {
        let path = self.path_string();
        self.heap
            .read(|mem| match walk(mem, &self.path).path_not_found(&path)? {
                Resolved::Null => Ok(Value::Null),
                Resolved::Object(offset) => object::decode(mem, offset),
                Resolved::Element { array, index } => {
                    Ok(Value::Scalar(object::element(mem, array, index)?))
                }
            })
            .stale(&path)
    }

    /// Store `value` at the path.
    ///
    /// Whatever was there is destroyed first. Map parents accept new keys;
    /// array parents accept scalars, cast to the array's element type.
    /// `Value::Null` clears the slot.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let path = self.path_string();
        self.heap.write(|mem| {
            let Some((last, parent_path)) = self.path.split_last() else {
                return object::assign(mem, Slot::Entrance, &value);
            };
            let parent = object_at(mem, parent_path).path_not_found(&path)?;
            match object::child(mem, parent, last) {
                Ok(slot) => object::assign(mem, slot, &value),
                Err(ShmError::KeyNotFound { .. }) => object::map_insert(mem, parent, last, &value),
                Err(e) => Err(e).path_not_found(&path),
            }
        })?;
        tracing::debug!(heap = %self.heap.name(), path = %path, kind = %value.type_tag(), "Set value");
        Ok(())
    }

    /// Append `value` to the list at the path.
    pub fn add(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let path = self.path_string();
        self.heap.write(|mem| {
            let list = object_at(mem, &self.path).path_not_found(&path)?;
            object::list_push(mem, list, &value)
        })
    }

    /// Store `value` under `key` in the map at the path.
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        let path = self.path_string();
        self.heap.write(|mem| {
            let map = object_at(mem, &self.path).path_not_found(&path)?;
            object::map_insert(mem, map, &key, &value)
        })
    }

    /// Delete the object at the path and its entry in the parent.
    ///
    /// Lists, tuples and arrays close the gap, so accessors to later
    /// indices now see the following element.
    pub fn delete(&self) -> Result<()> {
        let path = self.path_string();
        self.heap.write(|mem| {
            let Some((last, parent_path)) = self.path.split_last() else {
                return object::assign(mem, Slot::Entrance, &Value::Null);
            };
            let parent = object_at(mem, parent_path).path_not_found(&path)?;
            object::remove_child(mem, parent, last).path_not_found(&path)
        })?;
        tracing::debug!(heap = %self.heap.name(), path = %path, "Deleted value");
        Ok(())
    }

    /// Remove the child at `key` and return its value.
    pub fn remove(&self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        let path = self.path_string();
        self.heap.write(|mem| {
            let parent = object_at(mem, &self.path).path_not_found(&path)?;
            let value = match object::child(mem, parent, &key).path_not_found(&path)? {
                Slot::Element { array, index } => {
                    Value::Scalar(object::element(&*mem, array, index)?)
                }
                slot => object::decode(&*mem, object::read_slot(&*mem, slot))?,
            };
            object::remove_child(mem, parent, &key)?;
            Ok(value)
        })
    }

    /// Remove the last element of the list at the path and return it.
    pub fn pop(&self) -> Result<Value> {
        let path = self.path_string();
        self.heap.write(|mem| {
            let list = object_at(mem, &self.path).path_not_found(&path)?;
            let header = object::header(&*mem, list)?;
            if header.kind != ObjectKind::List {
                return Err(ShmError::type_mismatch("list", header.type_tag().to_string()));
            }
            if header.count == 0 {
                return Err(ShmError::IndexOutOfRange { index: -1, len: 0 });
            }
            let last = Key::Int(-1);
            let slot = object::child(&*mem, list, &last)?;
            let value = object::decode(&*mem, object::read_slot(&*mem, slot))?;
            object::remove_child(mem, list, &last)?;
            Ok(value)
        })
    }

    /// Remove every child of the collection at the path.
    pub fn clear(&self) -> Result<()> {
        let path = self.path_string();
        self.heap.write(|mem| {
            let target = object_at(mem, &self.path).path_not_found(&path)?;
            object::clear(mem, target)
        })
    }

    /// Element, child or entry count; 0 for null, 1 for a scalar.
    pub fn len(&self) -> Result<usize> {
        let path = self.path_string();
        self.heap.read(|mem| {
            Ok(match walk(mem, &self.path).path_not_found(&path)? {
                Resolved::Null => 0,
                Resolved::Object(offset) => object::header(mem, offset)?.count as usize,
                Resolved::Element { .. } => 1,
            })
        })
    }

    /// Whether [`Accessor::len`] is zero.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Stored type at the path.
    pub fn type_tag(&self) -> Result<TypeTag> {
        let path = self.path_string();
        self.heap.read(|mem| {
            Ok(match walk(mem, &self.path).path_not_found(&path)? {
                Resolved::Null => TypeTag::Null,
                Resolved::Object(offset) => object::type_tag(mem, offset)?,
                Resolved::Element { array, index } => {
                    TypeTag::Scalar(object::element(mem, array, index)?.element_type())
                }
            })
        })
    }

    /// Type name such as `int`, `double[]`, `str`, `list` or `dict`.
    pub fn type_name(&self) -> Result<String> {
        Ok(self.type_tag()?.to_string())
    }

    /// Whether the collection at the path contains `value`: a map key, an
    /// element or child equal to it, or a substring of text.
    pub fn contains(&self, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        let path = self.path_string();
        self.heap.read(|mem| {
            let target = object_at(mem, &self.path).path_not_found(&path)?;
            object::contains(mem, target, &value)
        })
    }

    /// Keys of the map at the path, in insertion order.
    pub fn keys(&self) -> Result<Vec<Key>> {
        let path = self.path_string();
        self.heap.read(|mem| {
            let map = object_at(mem, &self.path).path_not_found(&path)?;
            object::keys(mem, map)
        })
    }

    /// Compare the stored value with `value`, numbers compared by value.
    pub fn equals(&self, value: impl Into<Value>) -> Result<bool> {
        Ok(self.fetch()?.loosely_equals(&value.into()))
    }

    /// Iterate over child accessors of the collection at the path.
    pub fn iter(&self) -> Result<Iter> {
        let tag = self.type_tag()?;
        if !tag.is_collection() {
            return Err(ShmError::NotIterable {
                kind: tag.to_string(),
            });
        }
        Ok(Iter::new(self.clone(), tag == TypeTag::Map))
    }

    /// Debug rendering with at most `max_elements` per collection.
    pub fn render(&self, max_elements: usize) -> Result<String> {
        let path = self.path_string();
        self.heap.read(|mem| match walk(mem, &self.path).path_not_found(&path)? {
            Resolved::Null => Ok("null".to_string()),
            Resolved::Object(offset) => object::render(mem, offset, max_elements),
            Resolved::Element { array, index } => {
                Ok(object::element(mem, array, index)?.to_string())
            }
        })
    }

    /// Write the value at the path to `writer` in stream format.
    pub fn export<W: Write>(&self, writer: W) -> Result<()> {
        let value = self.fetch()?;
        let mut writer = StreamWriter::new(writer);
        writer.write_value(&value)?;
        writer.flush()
    }

    /// Read a value in stream format from `reader` and store it at the path.
    pub fn import<R: Read>(&self, reader: R) -> Result<()> {
        let value = StreamReader::new(reader).read_value()?;
        self.set(value)
    }
}

impl PartialEq for Accessor {
    /// Same heap handle and same path.
    fn eq(&self, other: &Self) -> bool {
        self.heap.same_handle(&other.heap) && self.path == other.path
    }
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render(DEFAULT_MAX_ELEMENTS) {
            Ok(text) => f.write_str(&text),
            Err(e) => write!(f, "<{e}>"),
        }
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("heap", &self.heap.name())
            .field("path", &self.path_string())
            .finish()
    }
}

/// Follow `path` from the entrance.
fn walk<M: HeapMemory + ?Sized>(mem: &M, path: &[Key]) -> Result<Resolved> {
    let mut current = mem.entrance();
    for (depth, key) in path.iter().enumerate() {
        if current.is_null() {
            return Err(ShmError::NotIndexable {
                kind: TypeTag::Null.to_string(),
                key: key.describe(),
            });
        }
        match object::child(mem, current, key)? {
            Slot::Element { array, index } => {
                if let Some(next) = path.get(depth + 1) {
                    let element = object::element(mem, array, index)?;
                    return Err(ShmError::NotIndexable {
                        kind: element.element_type().to_string(),
                        key: next.describe(),
                    });
                }
                return Ok(Resolved::Element { array, index });
            }
            slot => current = object::read_slot(mem, slot),
        }
    }
    if current.is_null() {
        Ok(Resolved::Null)
    } else {
        Ok(Resolved::Object(current))
    }
}

/// Walk `path` and require a non-null object at its end.
fn object_at<M: HeapMemory + ?Sized>(mem: &M, path: &[Key]) -> Result<HeapOffset> {
    match walk(mem, path)? {
        Resolved::Object(offset) => Ok(offset),
        Resolved::Null => Err(ShmError::type_mismatch("object", "null")),
        Resolved::Element { array, index } => Err(ShmError::type_mismatch(
            "object",
            object::element(mem, array, index)?.element_type().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::HeapConfig;
    use tempfile::TempDir;

    fn heap() -> (TempDir, Heap) {
        let dir = tempfile::tempdir().unwrap();
        let config = HeapConfig::default()
            .with_directory(dir.path())
            .with_static_size(80)
            .with_heap_size(1024);
        let heap = Heap::create("accessor", &config).unwrap();
        (dir, heap)
    }

    #[test]
    fn empty_heap_resolves_to_null() {
        let (_dir, heap) = heap();
        assert_eq!(heap.root().resolve().unwrap(), Resolved::Null);
        assert_eq!(heap.root().fetch().unwrap(), Value::Null);
        assert_eq!(heap.root().len().unwrap(), 0);
        assert!(matches!(
            heap.at(["a"]).resolve(),
            Err(ShmError::PathNotFound { .. })
        ));
    }

    #[test]
    fn set_and_fetch_nested() {
        let (_dir, heap) = heap();
        let root = heap.root();
        root.set(Value::map()).unwrap();
        root.at("user").set(Value::map()).unwrap();
        root.at("user").at("name").set("ada").unwrap();
        root.at("user").at("langs").set(Value::list([])).unwrap();
        root.at("user").at("langs").add("rust").unwrap();
        root.at("user").at("langs").add(1i64).unwrap();

        assert_eq!(heap.at_path("user.name").fetch().unwrap(), Value::from("ada"));
        assert_eq!(heap.at_path("user.langs").len().unwrap(), 2);
        assert_eq!(heap.at_path("user.langs[-1]").fetch().unwrap(), Value::from(1i64));
        assert_eq!(heap.at_path("user").type_name().unwrap(), "dict");
        assert_eq!(root.keys().unwrap(), vec![Key::from("user")]);
    }

    #[test]
    fn set_on_missing_parent_fails() {
        let (_dir, heap) = heap();
        heap.root().set(Value::map()).unwrap();
        let err = heap.at(["missing", "child"]).set(1i64).unwrap_err();
        assert_eq!(err.code(), "E201");
    }

    #[test]
    fn element_access_on_arrays() {
        let (_dir, heap) = heap();
        let root = heap.root();
        root.set(vec![1i32, 2, 3]).unwrap();

        let Resolved::Object(array) = root.resolve().unwrap() else {
            panic!("root should be an object");
        };
        let second = root.at(1i64);
        assert_eq!(second.resolve().unwrap(), Resolved::Element { array, index: 1 });
        second.set(20i64).unwrap();
        assert_eq!(root.fetch().unwrap(), Value::from(vec![1i32, 20, 3]));
        assert_eq!(second.type_name().unwrap(), "int");
        assert!(matches!(
            second.set("text"),
            Err(ShmError::TypeMismatch { .. })
        ));
        assert!(matches!(
            root.at(1i64).at(0i64).fetch(),
            Err(ShmError::StaleReference { .. })
        ));

        root.at(0i64).delete().unwrap();
        assert_eq!(root.fetch().unwrap(), Value::from(vec![20i32, 3]));
    }

    #[test]
    fn delete_and_stale_accessors() {
        let (_dir, heap) = heap();
        let root = heap.root();
        root.set(Value::map_from([("a", Value::map_from([("b", 1i64)]))]))
            .unwrap();
        let inner = root.at("a").at("b");
        assert!(inner.equals(1i64).unwrap());

        root.at("a").delete().unwrap();
        assert!(matches!(inner.fetch(), Err(ShmError::StaleReference { .. })));
        assert!(matches!(
            root.at("a").delete(),
            Err(ShmError::PathNotFound { .. })
        ));
        assert_eq!(root.len().unwrap(), 0);
    }

    #[test]
    fn list_operations() {
        let (_dir, heap) = heap();
        let root = heap.root();
        root.set(Value::list([])).unwrap();
        for i in 0..5i64 {
            root.add(i).unwrap();
        }
        assert_eq!(root.pop().unwrap(), Value::from(4i64));
        assert_eq!(root.remove(0i64).unwrap(), Value::from(0i64));
        assert!(root.contains(2i32).unwrap());
        assert!(root.equals(Value::list([1i64.into(), 2i64.into(), 3i64.into()])).unwrap());

        root.clear().unwrap();
        assert!(root.is_empty().unwrap());
        assert!(matches!(
            root.pop(),
            Err(ShmError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn insert_requires_a_map() {
        let (_dir, heap) = heap();
        let root = heap.root();
        root.set(Value::list([])).unwrap();
        assert!(matches!(
            root.insert("k", 1i64),
            Err(ShmError::TypeMismatch { .. })
        ));
        root.set(Value::map()).unwrap();
        root.insert("k", 1i64).unwrap();
        root.insert(3i64, "three").unwrap();
        assert!(root.contains("k").unwrap());
        assert!(root.contains(3i64).unwrap());
        assert!(matches!(root.add(1i64), Err(ShmError::TypeMismatch { .. })));
    }

    #[test]
    fn iteration_yields_child_accessors() {
        let (_dir, heap) = heap();
        let root = heap.root();
        root.set(Value::map_from([("x", 1i64), ("y", 2i64)])).unwrap();

        let children: Vec<Accessor> = root.iter().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(children, vec![root.at("x"), root.at("y")]);

        root.at("x").set("text").unwrap();
        assert!(matches!(
            root.at("x").iter(),
            Err(ShmError::NotIterable { .. })
        ));
    }

    #[test]
    fn rendering_and_display() {
        let (_dir, heap) = heap();
        let root = heap.root();
        root.set(Value::map()).unwrap();
        assert_eq!(root.to_string(), "(D:0){}");
        root.set((0..20i64).collect::<Vec<_>>()).unwrap();
        assert_eq!(root.render(2).unwrap(), "(P:long:20)[0, 1, ...]");
        assert_eq!(root.at(3i64).to_string(), "3");
    }

    #[test]
    fn accessor_equality_is_handle_and_path() {
        let (_dir, heap) = heap();
        assert_eq!(heap.at(["a"]), heap.root().at("a"));
        assert_ne!(heap.at(["a"]), heap.at(["b"]));
        assert_eq!(heap.root().at("a").parent(), Some(heap.root()));
    }

    #[test]
    fn export_import() {
        let (_dir, heap) = heap();
        let root = heap.root();
        let value = Value::map_from([("k", Value::from(vec![1u8, 2, 3]))]);
        root.set(value.clone()).unwrap();

        let mut bytes = Vec::new();
        root.export(&mut bytes).unwrap();
        root.set(Value::Null).unwrap();
        root.import(bytes.as_slice()).unwrap();
        assert_eq!(root.fetch().unwrap(), value);
    }
}
