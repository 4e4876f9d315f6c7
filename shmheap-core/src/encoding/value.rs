//! The native value model and its classification rules.

use super::tags::{ElementType, TypeTag};
use crate::error::{Result, ShmError};
use crate::types::Key;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use std::fmt;

/// A single primitive value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// `bool`
    Bool(bool),
    /// `char`
    I8(i8),
    /// `unsigned char`
    U8(u8),
    /// `short`
    I16(i16),
    /// `unsigned short`
    U16(u16),
    /// `int`
    I32(i32),
    /// `unsigned int`
    U32(u32),
    /// `long`
    I64(i64),
    /// `unsigned long`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
}

impl Scalar {
    /// Stored element type.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Bool(_) => ElementType::Bool,
            Self::I8(_) => ElementType::Char,
            Self::U8(_) => ElementType::UChar,
            Self::I16(_) => ElementType::Short,
            Self::U16(_) => ElementType::UShort,
            Self::I32(_) => ElementType::Int,
            Self::U32(_) => ElementType::UInt,
            Self::I64(_) => ElementType::Long,
            Self::U64(_) => ElementType::ULong,
            Self::F32(_) => ElementType::Float,
            Self::F64(_) => ElementType::Double,
        }
    }

    /// Integer value, for booleans and integer types.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Self::Bool(v) => i128::from(v),
            Self::I8(v) => i128::from(v),
            Self::U8(v) => i128::from(v),
            Self::I16(v) => i128::from(v),
            Self::U16(v) => i128::from(v),
            Self::I32(v) => i128::from(v),
            Self::U32(v) => i128::from(v),
            Self::I64(v) => i128::from(v),
            Self::U64(v) => i128::from(v),
            Self::F32(_) | Self::F64(_) => return None,
        })
    }

    /// Value as `f64` (possibly lossy for 64-bit integers).
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::F32(v) => f64::from(v),
            Self::F64(v) => v,
            _ => self.as_i128().unwrap_or_default() as f64,
        }
    }

    /// Value as `i64`, if it is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    /// Value as `bool`, if it is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to another element type.
    ///
    /// Integers convert when in range, floats convert to integers only when
    /// integral, and booleans accept only 0 and 1.
    pub fn cast(self, target: ElementType) -> Result<Scalar> {
        if self.element_type() == target {
            return Ok(self);
        }
        let mismatch = || ShmError::type_mismatch(target.name(), self.to_string());

        if target.is_float() {
            if matches!(self, Self::Bool(_)) {
                return Err(mismatch());
            }
            let v = self.as_f64();
            return Ok(match target {
                ElementType::Float => Self::F32(v as f32),
                _ => Self::F64(v),
            });
        }

        let int = match self.as_i128() {
            Some(v) => v,
            None => {
                let v = self.as_f64();
                if !v.is_finite() || v.fract() != 0.0 {
                    return Err(mismatch());
                }
                v as i128
            }
        };
        let converted = match target {
            ElementType::Bool => match int {
                0 => Some(Self::Bool(false)),
                1 => Some(Self::Bool(true)),
                _ => None,
            },
            ElementType::Char => i8::try_from(int).ok().map(Self::I8),
            ElementType::UChar => u8::try_from(int).ok().map(Self::U8),
            ElementType::Short => i16::try_from(int).ok().map(Self::I16),
            ElementType::UShort => u16::try_from(int).ok().map(Self::U16),
            ElementType::Int => i32::try_from(int).ok().map(Self::I32),
            ElementType::UInt => u32::try_from(int).ok().map(Self::U32),
            ElementType::Long => i64::try_from(int).ok().map(Self::I64),
            ElementType::ULong => u64::try_from(int).ok().map(Self::U64),
            ElementType::Float | ElementType::Double => None,
        };
        converted.ok_or_else(mismatch)
    }

    /// Numeric equality across element types.
    pub fn loosely_equals(&self, other: &Scalar) -> bool {
        match (self.as_i128(), other.as_i128()) {
            (Some(a), Some(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }

    /// Write the little-endian encoding into `buf`.
    pub(crate) fn write_le(&self, buf: &mut [u8]) {
        match *self {
            Self::Bool(v) => buf[0] = u8::from(v),
            Self::I8(v) => buf[0] = v as u8,
            Self::U8(v) => buf[0] = v,
            Self::I16(v) => LittleEndian::write_i16(buf, v),
            Self::U16(v) => LittleEndian::write_u16(buf, v),
            Self::I32(v) => LittleEndian::write_i32(buf, v),
            Self::U32(v) => LittleEndian::write_u32(buf, v),
            Self::I64(v) => LittleEndian::write_i64(buf, v),
            Self::U64(v) => LittleEndian::write_u64(buf, v),
            Self::F32(v) => LittleEndian::write_f32(buf, v),
            Self::F64(v) => LittleEndian::write_f64(buf, v),
        }
    }

    /// Read one element of type `element` from the front of `buf`.
    pub(crate) fn read_le(element: ElementType, buf: &[u8]) -> Scalar {
        match element {
            ElementType::Bool => Self::Bool(buf[0] != 0),
            ElementType::Char => Self::I8(buf[0] as i8),
            ElementType::UChar => Self::U8(buf[0]),
            ElementType::Short => Self::I16(LittleEndian::read_i16(buf)),
            ElementType::UShort => Self::U16(LittleEndian::read_u16(buf)),
            ElementType::Int => Self::I32(LittleEndian::read_i32(buf)),
            ElementType::UInt => Self::U32(LittleEndian::read_u32(buf)),
            ElementType::Long => Self::I64(LittleEndian::read_i64(buf)),
            ElementType::ULong => Self::U64(LittleEndian::read_u64(buf)),
            ElementType::Float => Self::F32(LittleEndian::read_f32(buf)),
            ElementType::Double => Self::F64(LittleEndian::read_f64(buf)),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
        }
    }
}

/// A homogeneous array of one element type.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveArray {
    /// `bool[]`
    Bool(Vec<bool>),
    /// `char[]`
    I8(Vec<i8>),
    /// `unsigned char[]`, raw bytes
    U8(Vec<u8>),
    /// `short[]`
    I16(Vec<i16>),
    /// `unsigned short[]`
    U16(Vec<u16>),
    /// `int[]`
    I32(Vec<i32>),
    /// `unsigned int[]`
    U32(Vec<u32>),
    /// `long[]`
    I64(Vec<i64>),
    /// `unsigned long[]`
    U64(Vec<u64>),
    /// `float[]`
    F32(Vec<f32>),
    /// `double[]`
    F64(Vec<f64>),
}

macro_rules! each_array {
    ($array:expr, $items:ident => $body:expr) => {
        match $array {
            PrimitiveArray::Bool($items) => $body,
            PrimitiveArray::I8($items) => $body,
            PrimitiveArray::U8($items) => $body,
            PrimitiveArray::I16($items) => $body,
            PrimitiveArray::U16($items) => $body,
            PrimitiveArray::I32($items) => $body,
            PrimitiveArray::U32($items) => $body,
            PrimitiveArray::I64($items) => $body,
            PrimitiveArray::U64($items) => $body,
            PrimitiveArray::F32($items) => $body,
            PrimitiveArray::F64($items) => $body,
        }
    };
}

impl PrimitiveArray {
    /// An empty array of `element`.
    pub fn empty(element: ElementType) -> Self {
        match element {
            ElementType::Bool => Self::Bool(Vec::new()),
            ElementType::Char => Self::I8(Vec::new()),
            ElementType::UChar => Self::U8(Vec::new()),
            ElementType::Short => Self::I16(Vec::new()),
            ElementType::UShort => Self::U16(Vec::new()),
            ElementType::Int => Self::I32(Vec::new()),
            ElementType::UInt => Self::U32(Vec::new()),
            ElementType::Long => Self::I64(Vec::new()),
            ElementType::ULong => Self::U64(Vec::new()),
            ElementType::Float => Self::F32(Vec::new()),
            ElementType::Double => Self::F64(Vec::new()),
        }
    }

    /// Build an array of `element` from scalars, casting each.
    pub fn from_scalars(
        element: ElementType,
        scalars: impl IntoIterator<Item = Scalar>,
    ) -> Result<Self> {
        let mut array = Self::empty(element);
        for scalar in scalars {
            array.push(scalar.cast(element)?);
        }
        Ok(array)
    }

    /// Element type.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Bool(_) => ElementType::Bool,
            Self::I8(_) => ElementType::Char,
            Self::U8(_) => ElementType::UChar,
            Self::I16(_) => ElementType::Short,
            Self::U16(_) => ElementType::UShort,
            Self::I32(_) => ElementType::Int,
            Self::U32(_) => ElementType::UInt,
            Self::I64(_) => ElementType::Long,
            Self::U64(_) => ElementType::ULong,
            Self::F32(_) => ElementType::Float,
            Self::F64(_) => ElementType::Double,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        each_array!(self, items => items.len())
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> Option<Scalar> {
        Some(match self {
            Self::Bool(v) => Scalar::Bool(*v.get(index)?),
            Self::I8(v) => Scalar::I8(*v.get(index)?),
            Self::U8(v) => Scalar::U8(*v.get(index)?),
            Self::I16(v) => Scalar::I16(*v.get(index)?),
            Self::U16(v) => Scalar::U16(*v.get(index)?),
            Self::I32(v) => Scalar::I32(*v.get(index)?),
            Self::U32(v) => Scalar::U32(*v.get(index)?),
            Self::I64(v) => Scalar::I64(*v.get(index)?),
            Self::U64(v) => Scalar::U64(*v.get(index)?),
            Self::F32(v) => Scalar::F32(*v.get(index)?),
            Self::F64(v) => Scalar::F64(*v.get(index)?),
        })
    }

    /// Iterate over the elements.
    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    /// Append a scalar of the same element type.
    ///
    /// # Panics
    ///
    /// Panics if the scalar has a different element type.
    fn push(&mut self, scalar: Scalar) {
        match (self, scalar) {
            (Self::Bool(v), Scalar::Bool(s)) => v.push(s),
            (Self::I8(v), Scalar::I8(s)) => v.push(s),
            (Self::U8(v), Scalar::U8(s)) => v.push(s),
            (Self::I16(v), Scalar::I16(s)) => v.push(s),
            (Self::U16(v), Scalar::U16(s)) => v.push(s),
            (Self::I32(v), Scalar::I32(s)) => v.push(s),
            (Self::U32(v), Scalar::U32(s)) => v.push(s),
            (Self::I64(v), Scalar::I64(s)) => v.push(s),
            (Self::U64(v), Scalar::U64(s)) => v.push(s),
            (Self::F32(v), Scalar::F32(s)) => v.push(s),
            (Self::F64(v), Scalar::F64(s)) => v.push(s),
            (array, scalar) => panic!(
                "pushing {} onto {} array",
                scalar.element_type(),
                array.element_type()
            ),
        }
    }

    /// Decode `count` little-endian elements.
    pub(crate) fn read_le(element: ElementType, count: usize, data: &[u8]) -> Self {
        let size = element.size();
        let mut array = Self::empty(element);
        for chunk in data.chunks_exact(size).take(count) {
            array.push(Scalar::read_le(element, chunk));
        }
        array
    }

    /// Encode all elements little-endian into `buf`.
    pub(crate) fn write_le(&self, buf: &mut [u8]) {
        let size = self.element_type().size();
        for (scalar, chunk) in self.iter().zip(buf.chunks_exact_mut(size)) {
            scalar.write_le(chunk);
        }
    }
}

/// A native value that can be stored in the heap.
///
/// Sequences are classified by [`Value::seq`]: uniform scalars become a
/// primitive array, anything else a list. [`Value::list`] and
/// [`Value::tuple`] force the container kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No object.
    #[default]
    Null,
    /// A single primitive.
    Scalar(Scalar),
    /// A homogeneous primitive array.
    Array(PrimitiveArray),
    /// UTF-8 text.
    Text(String),
    /// A growable heterogeneous sequence.
    List(Vec<Value>),
    /// A fixed-arity sequence.
    Tuple(Vec<Value>),
    /// A map with string or integer keys.
    Map(BTreeMap<Key, Value>),
}

impl Value {
    /// Classify a sequence: all scalars of one element type become an
    /// array, anything else (including the empty sequence) a list.
    pub fn seq(items: impl IntoIterator<Item = Value>) -> Value {
        let items: Vec<Value> = items.into_iter().collect();
        let element = match items.first() {
            Some(Value::Scalar(s)) => s.element_type(),
            _ => return Value::List(items),
        };
        let uniform = items
            .iter()
            .all(|v| matches!(v, Value::Scalar(s) if s.element_type() == element));
        if !uniform {
            return Value::List(items);
        }
        let mut array = PrimitiveArray::empty(element);
        for item in items {
            if let Value::Scalar(s) = item {
                array.push(s);
            }
        }
        Value::Array(array)
    }

    /// A list, never classified as an array.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(items.into_iter().collect())
    }

    /// A tuple.
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Tuple(items.into_iter().collect())
    }

    /// An empty map.
    pub fn map() -> Value {
        Value::Map(BTreeMap::new())
    }

    /// A map from key/value pairs.
    pub fn map_from<K: Into<Key>, V: Into<Value>>(
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// A `unsigned char` array holding raw bytes.
    pub fn bytes(bytes: &[u8]) -> Value {
        Value::Array(PrimitiveArray::U8(bytes.to_vec()))
    }

    /// Stored type this value would get.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Scalar(s) => TypeTag::Scalar(s.element_type()),
            Value::Array(a) => TypeTag::Array(a.element_type()),
            Value::Text(_) => TypeTag::Text,
            Value::List(_) => TypeTag::List,
            Value::Tuple(_) => TypeTag::Tuple,
            Value::Map(_) => TypeTag::Map,
        }
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Element, child or entry count; UTF-8 length for text; 1 for scalars.
    pub fn len(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Scalar(_) => 1,
            Value::Array(a) => a.len(),
            Value::Text(s) => s.len(),
            Value::List(items) | Value::Tuple(items) => items.len(),
            Value::Map(entries) => entries.len(),
        }
    }

    /// Whether [`Value::len`] is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The scalar, if this is one.
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Integer value of a scalar.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(|s| s.as_i64())
    }

    /// Numeric value of a scalar.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().map(|s| s.as_f64())
    }

    /// Boolean value of a scalar.
    pub fn as_bool(&self) -> Option<bool> {
        self.as_scalar().and_then(|s| s.as_bool())
    }

    /// The text, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Child at `key`: list/tuple index or map key.
    pub fn get(&self, key: impl Into<Key>) -> Option<&Value> {
        let key = key.into();
        match (self, &key) {
            (Value::List(items) | Value::Tuple(items), Key::Int(i)) => {
                usize::try_from(*i).ok().and_then(|i| items.get(i))
            }
            (Value::Map(entries), _) => entries.get(&key),
            _ => None,
        }
    }

    /// Structural equality with numeric comparison across element types.
    ///
    /// Arrays compare equal to lists and tuples holding equal scalars, so a
    /// stored `int[]` equals `Value::list([1, 2, 3])`.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Scalar(a), Value::Scalar(b)) => a.loosely_equals(b),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loosely_equals(&y))
            }
            (Value::Array(a), Value::List(items) | Value::Tuple(items))
            | (Value::List(items) | Value::Tuple(items), Value::Array(a)) => {
                a.len() == items.len()
                    && a.iter()
                        .zip(items)
                        .all(|(x, y)| y.as_scalar().is_some_and(|y| x.loosely_equals(&y)))
            }
            (Value::List(a) | Value::Tuple(a), Value::List(b) | Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loosely_equals(w)))
            }
            _ => false,
        }
    }
}

macro_rules! impl_scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(v: $ty) -> Self {
                    Scalar::$variant(v)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Scalar(Scalar::$variant(v))
                }
            }

            impl From<Vec<$ty>> for Value {
                fn from(v: Vec<$ty>) -> Self {
                    Value::Array(PrimitiveArray::$variant(v))
                }
            }
        )*
    };
}

impl_scalar_from! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}

impl From<PrimitiveArray> for Value {
    fn from(v: PrimitiveArray) -> Self {
        Value::Array(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::seq(v)
    }
}

impl<K: Into<Key>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(v: BTreeMap<K, V>) -> Self {
        Value::map_from(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_scalars_become_an_array() {
        let v = Value::seq([1i64.into(), 2i64.into(), 3i64.into()]);
        assert_eq!(v, Value::Array(PrimitiveArray::I64(vec![1, 2, 3])));
        assert_eq!(v.type_tag(), TypeTag::Array(ElementType::Long));
    }

    #[test]
    fn mixed_sequences_become_lists() {
        let v = Value::seq([1i64.into(), "x".into()]);
        assert!(matches!(v, Value::List(ref items) if items.len() == 2));

        let v = Value::seq([1i64.into(), 2.5f64.into()]);
        assert_eq!(v.type_tag(), TypeTag::List);

        assert_eq!(Value::seq(Vec::new()).type_tag(), TypeTag::List);
    }

    #[test]
    fn forced_kinds() {
        let v = Value::list([1i32.into(), 2i32.into()]);
        assert_eq!(v.type_tag(), TypeTag::List);
        assert_eq!(Value::map().type_tag(), TypeTag::Map);
        assert_eq!(Value::bytes(b"ab").type_tag(), TypeTag::Array(ElementType::UChar));
    }

    #[test]
    fn widths_are_kept() {
        assert_eq!(Value::from(7i16).type_tag(), TypeTag::Scalar(ElementType::Short));
        assert_eq!(Value::from(1.5f32).type_tag(), TypeTag::Scalar(ElementType::Float));
        assert_eq!(Value::from(1.5).type_tag(), TypeTag::Scalar(ElementType::Double));
    }

    #[test]
    fn cast_checks_range() {
        assert_eq!(Scalar::I64(7).cast(ElementType::Short).unwrap(), Scalar::I16(7));
        assert_eq!(Scalar::F64(3.0).cast(ElementType::Int).unwrap(), Scalar::I32(3));
        assert!(Scalar::I64(300).cast(ElementType::UChar).is_err());
        assert!(Scalar::F64(2.5).cast(ElementType::Long).is_err());
        assert!(Scalar::I64(2).cast(ElementType::Bool).is_err());
        assert_eq!(Scalar::I32(2).cast(ElementType::Double).unwrap(), Scalar::F64(2.0));
    }

    #[test]
    fn loose_equality_crosses_widths() {
        assert!(Value::from(5i16).loosely_equals(&Value::from(5u64)));
        assert!(Value::from(2i32).loosely_equals(&Value::from(2.0)));
        assert!(!Value::from(2i32).loosely_equals(&Value::from(2.5)));
        assert!(Value::from(vec![1i32, 2]).loosely_equals(&Value::list([1i64.into(), 2i64.into()])));
        assert!(!Value::from("1").loosely_equals(&Value::from(1i64)));

        let a = Value::map_from([("k", 1i32)]);
        let b = Value::map_from([("k", 1i64)]);
        assert!(a.loosely_equals(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn array_bytes_round_trip() {
        let array = PrimitiveArray::I16(vec![-1, 2, 300]);
        let mut buf = vec![0u8; 6];
        array.write_le(&mut buf);
        assert_eq!(buf, [0xff, 0xff, 2, 0, 0x2c, 0x01]);
        assert_eq!(PrimitiveArray::read_le(ElementType::Short, 3, &buf), array);
    }

    #[test]
    fn get_follows_keys() {
        let v = Value::map_from([("a", Value::list(["x".into(), 3i64.into()]))]);
        assert_eq!(v.get("a").and_then(|a| a.get(1i64)), Some(&Value::from(3i64)));
        assert_eq!(v.get("b"), None);
    }
}
