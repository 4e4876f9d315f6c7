//! Self-describing type encoding.
//!
//! Every typed object starts with an 8-byte [`ObjectHeader`] (kind, element
//! type, flags, count) followed by a kind-specific body:
//!
//! ```text
//! primitive  [header][count * element_size bytes, little-endian]
//! tuple      [header][child offset; count]
//! list       [header][table offset][table capacity]  table: [child offset; capacity]
//! map        [header][table offset][table capacity]  table: [(key word, value offset); capacity]
//! ```
//!
//! A map key word with its low bit set holds an inline integer key; with the
//! low bit clear it is the offset of a text object holding a string key.
//! The extent of any object is recoverable from its header alone.

mod json;
mod primitive;
mod tags;
mod value;

pub use primitive::{decode_primitive, encode_primitive, encoded_len, object_size, primitive_header};
pub use tags::{
    CONTAINER_HEADER, ENTRY_SIZE, ElementType, FLAG_SCALAR, FLAG_TEXT, OBJECT_HEADER, ObjectHeader,
    ObjectKind, SLOT_SIZE, TypeTag,
};
pub use value::{PrimitiveArray, Scalar, Value};

pub(crate) use primitive::{count_of, decode_primitive_data, write_primitive_data};
