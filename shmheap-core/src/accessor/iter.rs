use super::{Accessor, object_at};
use crate::error::{Result, ResultExt};
use crate::object;
use crate::types::Key;

/// Child accessors of a collection.
///
/// Each step re-reads the collection, so children added or removed while
/// iterating are seen; iteration ends once the position passes the
/// current length.
pub struct Iter {
    parent: Accessor,
    is_map: bool,
    position: usize,
    done: bool,
}

impl Iter {
    pub(super) fn new(parent: Accessor, is_map: bool) -> Self {
        Self {
            parent,
            is_map,
            position: 0,
            done: false,
        }
    }

    fn next_key(&self) -> Result<Option<Key>> {
        let path = self.parent.path_string();
        self.parent.heap.read(|mem| {
            let target = object_at(mem, &self.parent.path).path_not_found(&path)?;
            let count = object::header(mem, target)?.count as usize;
            if self.position >= count {
                return Ok(None);
            }
            if self.is_map {
                object::key_at(mem, target, self.position).map(Some)
            } else {
                Ok(Some(Key::Int(self.position as i64)))
            }
        })
    }
}

impl Iterator for Iter {
    type Item = Result<Accessor>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_key() {
            Ok(Some(key)) => {
                self.position += 1;
                Some(Ok(self.parent.at(key)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
