//! Type tags and the 8-byte object header.

use crate::error::{Result, ShmError};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the object header at the start of every typed payload.
pub const OBJECT_HEADER: usize = 8;

/// Size of a list or map header: object header, table offset, table capacity.
pub const CONTAINER_HEADER: usize = OBJECT_HEADER + 16;

/// Size of one child slot (a heap offset).
pub const SLOT_SIZE: usize = 8;

/// Size of one map entry: key word and value offset.
pub const ENTRY_SIZE: usize = 16;

/// Header flag: a single value rather than an array.
pub const FLAG_SCALAR: u8 = 0b01;

/// Header flag: a `char` array holding UTF-8 text.
pub const FLAG_TEXT: u8 = 0b10;

/// Element type of a primitive object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ElementType {
    /// One-byte boolean.
    Bool = 1,
    /// Signed byte; also the element of text.
    Char = 2,
    /// Unsigned byte; raw bytes.
    UChar = 3,
    /// 16-bit signed.
    Short = 4,
    /// 16-bit unsigned.
    UShort = 5,
    /// 32-bit signed.
    Int = 6,
    /// 32-bit unsigned.
    UInt = 7,
    /// 64-bit signed.
    Long = 8,
    /// 64-bit unsigned.
    ULong = 9,
    /// 32-bit float.
    Float = 21,
    /// 64-bit float.
    Double = 22,
}

impl ElementType {
    /// Decode a stored type code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Bool,
            2 => Self::Char,
            3 => Self::UChar,
            4 => Self::Short,
            5 => Self::UShort,
            6 => Self::Int,
            7 => Self::UInt,
            8 => Self::Long,
            9 => Self::ULong,
            21 => Self::Float,
            22 => Self::Double,
            _ => return None,
        })
    }

    /// Stored type code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Bool | Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Long | Self::ULong | Self::Double => 8,
        }
    }

    /// C-style type name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::UChar => "unsigned char",
            Self::Short => "short",
            Self::UShort => "unsigned short",
            Self::Int => "int",
            Self::UInt => "unsigned int",
            Self::Long => "long",
            Self::ULong => "unsigned long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    /// Whether this is a floating-point type.
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of a typed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObjectKind {
    /// Scalar, homogeneous array or text.
    Primitive = 1,
    /// Fixed arity, children inline.
    Tuple = 2,
    /// Growable sequence with a separate child table.
    List = 3,
    /// Key/value entries in a separate table.
    Map = 4,
}

impl ObjectKind {
    /// Decode a stored kind tag.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Primitive,
            2 => Self::Tuple,
            3 => Self::List,
            4 => Self::Map,
            _ => return None,
        })
    }

    /// Kind name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::Tuple => "tuple",
            Self::List => "list",
            Self::Map => "dict",
        }
    }
}

/// Full type of an object as reported by accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    /// Empty slot.
    Null,
    /// Single primitive value.
    Scalar(ElementType),
    /// Homogeneous array.
    Array(ElementType),
    /// UTF-8 text.
    Text,
    /// Tuple.
    Tuple,
    /// List.
    List,
    /// Map.
    Map,
}

impl TypeTag {
    /// Whether the type has addressable children.
    pub fn is_collection(self) -> bool {
        matches!(self, Self::Array(_) | Self::Tuple | Self::List | Self::Map)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Scalar(element) => write!(f, "{element}"),
            Self::Array(element) => write!(f, "{element}[]"),
            Self::Text => f.write_str("str"),
            Self::Tuple => f.write_str("tuple"),
            Self::List => f.write_str("list"),
            Self::Map => f.write_str("dict"),
        }
    }
}

/// The 8-byte header of a typed object.
///
/// ```text
/// byte 0   kind
/// byte 1   element type (primitives only)
/// byte 2   flags (scalar, text)
/// byte 3   reserved
/// 4..8     count (u32): elements, children or entries
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Object kind.
    pub kind: ObjectKind,
    /// Element type of a primitive.
    pub element: Option<ElementType>,
    /// Flag bits.
    pub flags: u8,
    /// Element, child or entry count.
    pub count: u32,
}

impl ObjectHeader {
    /// Header of a primitive.
    pub fn primitive(element: ElementType, flags: u8, count: u32) -> Self {
        Self {
            kind: ObjectKind::Primitive,
            element: Some(element),
            flags,
            count,
        }
    }

    /// Header of a container.
    pub fn container(kind: ObjectKind, count: u32) -> Self {
        Self {
            kind,
            element: None,
            flags: 0,
            count,
        }
    }

    /// Type reported to callers.
    pub fn type_tag(&self) -> TypeTag {
        match (self.kind, self.element) {
            (ObjectKind::Primitive, _) if self.flags & FLAG_TEXT != 0 => TypeTag::Text,
            (ObjectKind::Primitive, Some(e)) if self.flags & FLAG_SCALAR != 0 => {
                TypeTag::Scalar(e)
            }
            (ObjectKind::Primitive, Some(e)) => TypeTag::Array(e),
            (ObjectKind::Primitive, None) => TypeTag::Null,
            (ObjectKind::Tuple, _) => TypeTag::Tuple,
            (ObjectKind::List, _) => TypeTag::List,
            (ObjectKind::Map, _) => TypeTag::Map,
        }
    }

    /// Whether this is a scalar primitive.
    pub fn is_scalar(&self) -> bool {
        self.kind == ObjectKind::Primitive && self.flags & FLAG_SCALAR != 0
    }

    /// Whether this is text.
    pub fn is_text(&self) -> bool {
        self.kind == ObjectKind::Primitive && self.flags & FLAG_TEXT != 0
    }

    /// Encode to bytes.
    pub fn to_bytes(&self) -> [u8; OBJECT_HEADER] {
        let mut buf = [0u8; OBJECT_HEADER];
        buf[0] = self.kind as u8;
        buf[1] = self.element.map_or(0, ElementType::code);
        buf[2] = self.flags;
        LittleEndian::write_u32(&mut buf[4..8], self.count);
        buf
    }

    /// Decode from the first 8 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < OBJECT_HEADER {
            return Err(ShmError::type_mismatch(
                "object header",
                format!("{} bytes", bytes.len()),
            ));
        }
        let kind = ObjectKind::from_code(bytes[0])
            .ok_or_else(|| ShmError::type_mismatch("object kind", format!("tag {}", bytes[0])))?;
        let element = match kind {
            ObjectKind::Primitive => Some(ElementType::from_code(bytes[1]).ok_or_else(|| {
                ShmError::type_mismatch("element type", format!("code {}", bytes[1]))
            })?),
            _ => None,
        };
        Ok(Self {
            kind,
            element,
            flags: bytes[2],
            count: LittleEndian::read_u32(&bytes[4..8]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_codes_are_stable() {
        assert_eq!(ElementType::Int.code(), 6);
        assert_eq!(ElementType::Double.code(), 22);
        assert_eq!(ElementType::from_code(21), Some(ElementType::Float));
        assert_eq!(ElementType::from_code(10), None);
        assert_eq!(ElementType::Long.size(), 8);
    }

    #[test]
    fn header_bytes() {
        let header = ObjectHeader::primitive(ElementType::Int, FLAG_SCALAR, 1);
        let bytes = header.to_bytes();
        assert_eq!(bytes, [1, 6, 1, 0, 1, 0, 0, 0]);
        assert_eq!(ObjectHeader::from_bytes(&bytes).unwrap(), header);
        assert_eq!(header.type_tag(), TypeTag::Scalar(ElementType::Int));
    }

    #[test]
    fn container_header_has_no_element() {
        let header = ObjectHeader::container(ObjectKind::Map, 3);
        let back = ObjectHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(back.element, None);
        assert_eq!(back.type_tag(), TypeTag::Map);
        assert_eq!(back.count, 3);
    }

    #[test]
    fn unknown_tags_are_type_mismatches() {
        let err = ObjectHeader::from_bytes(&[9, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ShmError::TypeMismatch { .. }));
        let err = ObjectHeader::from_bytes(&[1, 99, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ShmError::TypeMismatch { .. }));
    }

    #[test]
    fn type_tag_names() {
        assert_eq!(TypeTag::Array(ElementType::Double).to_string(), "double[]");
        assert_eq!(TypeTag::Map.to_string(), "dict");
        assert_eq!(TypeTag::Text.to_string(), "str");
        assert!(TypeTag::List.is_collection());
        assert!(!TypeTag::Text.is_collection());
    }
}
