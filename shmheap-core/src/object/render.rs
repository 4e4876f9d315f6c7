//! Debug rendering of stored objects.
//!
//! ```text
//! (P:int:3)[1, 2, 3]        primitive array or scalar
//! (P:char:5)"hello"         text
//! (T:2)(..., ...)           tuple
//! (L:2)[..., ...]           list
//! (D:2){"a": ..., 7: ...}   map
//! ```

use super::read::{element, entry_key};
use super::{Slot, entry_value_slot, header, list_slot, read_slot, table, tuple_slot};
use crate::encoding::{ObjectKind, Value};
use crate::error::Result;
use crate::heap::HeapMemory;
use crate::types::HeapOffset;
use std::fmt::Write;

/// Render the object at `offset`, showing at most `max_elements` elements
/// or children per collection.
pub(crate) fn render<M: HeapMemory + ?Sized>(
    mem: &M,
    offset: HeapOffset,
    max_elements: usize,
) -> Result<String> {
    let mut out = String::new();
    render_into(mem, offset, max_elements, &mut out)?;
    Ok(out)
}

fn render_into<M: HeapMemory + ?Sized>(
    mem: &M,
    offset: HeapOffset,
    max_elements: usize,
    out: &mut String,
) -> Result<()> {
    if offset.is_null() {
        out.push_str("null");
        return Ok(());
    }
    let header = header(mem, offset)?;
    let count = header.count as usize;
    let shown = count.min(max_elements);
    let more = count > max_elements;

    match header.kind {
        ObjectKind::Primitive if header.is_text() => {
            let text = match super::decode(mem, offset)? {
                Value::Text(s) => s,
                _ => String::new(),
            };
            let truncated: String = text.chars().take(max_elements).collect();
            let _ = write!(out, "(P:char:{count}){truncated:?}");
            if truncated.len() < text.len() {
                out.push_str("...");
            }
        }
        ObjectKind::Primitive => {
            let element_type = header.element.map_or("?", |e| e.name());
            let _ = write!(out, "(P:{element_type}:{count})[");
            for i in 0..shown {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}", element(mem, offset, i)?);
            }
            close(out, shown, more, "]");
        }
        ObjectKind::Tuple => {
            let _ = write!(out, "(T:{count})(");
            for i in 0..shown {
                if i > 0 {
                    out.push_str(", ");
                }
                let child = read_slot(mem, Slot::Word(tuple_slot(offset, i)));
                render_into(mem, child, max_elements, out)?;
            }
            close(out, shown, more, ")");
        }
        ObjectKind::List => {
            let (table, _) = table(mem, offset);
            let _ = write!(out, "(L:{count})[");
            for i in 0..shown {
                if i > 0 {
                    out.push_str(", ");
                }
                let child = read_slot(mem, Slot::Word(list_slot(table, i)));
                render_into(mem, child, max_elements, out)?;
            }
            close(out, shown, more, "]");
        }
        ObjectKind::Map => {
            let (table, _) = table(mem, offset);
            let _ = write!(out, "(D:{count}){{");
            for i in 0..shown {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: ", entry_key(mem, table, i)?.describe());
                let child = read_slot(mem, Slot::Word(entry_value_slot(table, i)));
                render_into(mem, child, max_elements, out)?;
            }
            close(out, shown, more, "}");
        }
    }
    Ok(())
}

fn close(out: &mut String, shown: usize, more: bool, bracket: &str) {
    if more {
        out.push_str(if shown > 0 { ", ..." } else { "..." });
    }
    out.push_str(bracket);
}

#[cfg(test)]
mod tests {
    use super::super::construct;
    use super::*;
    use crate::heap::VecMemory;

    fn rendered(value: Value, max_elements: usize) -> String {
        let mut mem = VecMemory::formatted(48, 8192);
        let offset = construct(&mut mem, &value).unwrap();
        render(&mem, offset, max_elements).unwrap()
    }

    #[test]
    fn primitives() {
        assert_eq!(rendered(Value::from(5i32), 10), "(P:int:1)[5]");
        assert_eq!(rendered(Value::from(vec![1.5f64, 2.0]), 10), "(P:double:2)[1.5, 2]");
        assert_eq!(rendered(Value::from("hi"), 10), "(P:char:2)\"hi\"");
    }

    #[test]
    fn containers() {
        let value = Value::map_from([
            ("a", Value::list([1i64.into(), Value::Null])),
            ("t", Value::tuple([true.into()])),
        ]);
        assert_eq!(
            rendered(value, 10),
            "(D:2){\"a\": (L:2)[(P:long:1)[1], null], \"t\": (T:1)((P:bool:1)[true])}"
        );
        assert_eq!(rendered(Value::map(), 10), "(D:0){}");
    }

    #[test]
    fn truncation() {
        assert_eq!(
            rendered(Value::from((0..100i32).collect::<Vec<_>>()), 3),
            "(P:int:100)[0, 1, 2, ...]"
        );
        assert_eq!(rendered(Value::list([1i64.into()]), 0), "(L:1)[...]");
        assert_eq!(rendered(Value::from("abcdef"), 3), "(P:char:6)\"abc\"...");
    }
}
