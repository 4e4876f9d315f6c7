//! Pure encode / decode of typed payloads.
//!
//! These functions work on plain byte slices and know nothing about the
//! heap: the object layer copies their output into allocated blocks.

use super::tags::{
    CONTAINER_HEADER, ElementType, FLAG_SCALAR, FLAG_TEXT, OBJECT_HEADER, ObjectHeader,
    ObjectKind, SLOT_SIZE,
};
use super::value::{PrimitiveArray, Value};
use crate::error::{Result, ShmError};

/// Convert a length to the stored `u32` count.
pub(crate) fn count_of(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        ShmError::type_mismatch(format!("at most {} elements", u32::MAX), format!("{len}"))
    })
}

/// Header a primitive value is stored with.
pub fn primitive_header(value: &Value) -> Result<ObjectHeader> {
    match value {
        Value::Scalar(s) => Ok(ObjectHeader::primitive(s.element_type(), FLAG_SCALAR, 1)),
        Value::Array(a) => Ok(ObjectHeader::primitive(a.element_type(), 0, count_of(a.len())?)),
        Value::Text(s) => Ok(ObjectHeader::primitive(
            ElementType::Char,
            FLAG_TEXT,
            count_of(s.len())?,
        )),
        other => Err(ShmError::type_mismatch("primitive", other.type_tag().to_string())),
    }
}

/// Size of the object described by `header`, header included.
///
/// For lists and maps this is the fixed-size object only; their tables are
/// separate blocks.
pub fn object_size(header: &ObjectHeader) -> usize {
    let count = header.count as usize;
    match header.kind {
        ObjectKind::Primitive => {
            OBJECT_HEADER + count * header.element.map_or(0, ElementType::size)
        }
        ObjectKind::Tuple => OBJECT_HEADER + count * SLOT_SIZE,
        ObjectKind::List | ObjectKind::Map => CONTAINER_HEADER,
    }
}

/// Size of an encoded object, read from its header alone.
pub fn encoded_len(bytes: &[u8]) -> Result<usize> {
    Ok(object_size(&ObjectHeader::from_bytes(bytes)?))
}

/// Encode a scalar, array or text into header plus little-endian data.
pub fn encode_primitive(value: &Value) -> Result<Vec<u8>> {
    let header = primitive_header(value)?;
    let mut buf = vec![0u8; object_size(&header)];
    buf[..OBJECT_HEADER].copy_from_slice(&header.to_bytes());
    write_primitive_data(value, &mut buf[OBJECT_HEADER..]);
    Ok(buf)
}

/// Write the data part of a primitive into `buf`.
pub(crate) fn write_primitive_data(value: &Value, buf: &mut [u8]) {
    match value {
        Value::Scalar(s) => s.write_le(buf),
        Value::Array(a) => a.write_le(buf),
        Value::Text(s) => buf[..s.len()].copy_from_slice(s.as_bytes()),
        _ => {}
    }
}

/// Decode an encoded primitive (header plus data).
pub fn decode_primitive(bytes: &[u8]) -> Result<Value> {
    let header = ObjectHeader::from_bytes(bytes)?;
    let size = object_size(&header);
    if header.kind != ObjectKind::Primitive {
        return Err(ShmError::type_mismatch("primitive", header.type_tag().to_string()));
    }
    if bytes.len() < size {
        return Err(ShmError::type_mismatch(
            format!("{size} bytes"),
            format!("{} bytes", bytes.len()),
        ));
    }
    decode_primitive_data(&header, &bytes[OBJECT_HEADER..size])
}

/// Decode the data part of a primitive described by `header`.
pub(crate) fn decode_primitive_data(header: &ObjectHeader, data: &[u8]) -> Result<Value> {
    let element = header
        .element
        .ok_or_else(|| ShmError::type_mismatch("primitive", header.kind.name()))?;
    let count = header.count as usize;
    if header.is_text() {
        let text = std::str::from_utf8(&data[..count])
            .map_err(|e| ShmError::type_mismatch("UTF-8 text", e.to_string()))?;
        return Ok(Value::Text(text.to_string()));
    }
    let array = PrimitiveArray::read_le(element, count, data);
    if header.is_scalar() {
        return array
            .get(0)
            .map(Value::Scalar)
            .ok_or_else(|| ShmError::type_mismatch("scalar", "empty primitive"));
    }
    Ok(Value::Array(array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Scalar;

    #[test]
    fn scalar_encoding() {
        let bytes = encode_primitive(&Value::from(5i32)).unwrap();
        assert_eq!(bytes, [1, 6, 1, 0, 1, 0, 0, 0, 5, 0, 0, 0]);
        assert_eq!(encoded_len(&bytes).unwrap(), 12);
        assert_eq!(decode_primitive(&bytes).unwrap(), Value::from(5i32));
    }

    #[test]
    fn text_is_char_with_text_flag() {
        let bytes = encode_primitive(&Value::from("héllo")).unwrap();
        let header = ObjectHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.element, Some(ElementType::Char));
        assert!(header.is_text());
        assert_eq!(header.count, 6);
        assert_eq!(decode_primitive(&bytes).unwrap(), Value::from("héllo"));
    }

    #[test]
    fn char_array_is_not_text() {
        let value = Value::from(vec![104i8, 105]);
        let bytes = encode_primitive(&value).unwrap();
        assert_eq!(decode_primitive(&bytes).unwrap(), value);
    }

    #[test]
    fn doubles_are_little_endian() {
        let bytes = encode_primitive(&Value::from(vec![1.5f64, -2.0])).unwrap();
        assert_eq!(bytes.len(), 8 + 16);
        assert_eq!(&bytes[8..16], &1.5f64.to_le_bytes());
        let back = decode_primitive(&bytes).unwrap();
        assert_eq!(
            back,
            Value::Array(PrimitiveArray::F64(vec![1.5, -2.0]))
        );
    }

    #[test]
    fn containers_are_not_primitives() {
        assert!(encode_primitive(&Value::map()).is_err());
        let header = ObjectHeader::container(ObjectKind::List, 3);
        assert!(decode_primitive(&header.to_bytes()).is_err());
        assert_eq!(encoded_len(&header.to_bytes()).unwrap(), CONTAINER_HEADER);

        let tuple = ObjectHeader::container(ObjectKind::Tuple, 3);
        assert_eq!(encoded_len(&tuple.to_bytes()).unwrap(), 8 + 24);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = encode_primitive(&Value::from(vec![1u64, 2, 3])).unwrap();
        assert!(decode_primitive(&bytes[..20]).is_err());
    }

    #[test]
    fn invalid_utf8_is_a_type_mismatch() {
        let header = ObjectHeader::primitive(ElementType::Char, FLAG_TEXT, 2);
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        let err = decode_primitive(&bytes).unwrap_err();
        assert_eq!(err.code(), "E301");
    }

    #[test]
    fn bool_scalar() {
        let bytes = encode_primitive(&Value::from(true)).unwrap();
        assert_eq!(bytes.len(), 9);
        assert_eq!(
            decode_primitive(&bytes).unwrap().as_scalar(),
            Some(Scalar::Bool(true))
        );
    }
}
