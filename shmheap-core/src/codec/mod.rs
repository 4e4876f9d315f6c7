//! Byte-stream import and export of values.
//!
//! The stream uses the same primitive encoding as the heap: every value is
//! introduced by an 8-byte type descriptor (the object header layout, kind
//! `0` for null) followed by its body.
//!
//! ```text
//! primitive  [descriptor][count * element_size bytes]
//! tuple      [descriptor][value; count]
//! list       [descriptor][value; count]
//! map        [descriptor][(key, value); count]
//! key        [1][i64]  or  [2][u32 len][UTF-8 bytes]
//! ```

use crate::encoding::{
    ElementType, OBJECT_HEADER, ObjectHeader, ObjectKind, PrimitiveArray, Scalar, Value,
    count_of, primitive_header,
};
use crate::error::{Result, ShmError};
use crate::types::Key;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Write};

const KEY_INT: u8 = 1;
const KEY_STR: u8 = 2;

/// Writes values to a byte stream.
pub struct StreamWriter<W: Write> {
    inner: W,
}

impl<W: Write> StreamWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Write the 8-byte descriptor of `value`.
    pub fn write_type_descriptor(&mut self, value: &Value) -> Result<()> {
        let header = match value {
            Value::Null => {
                self.inner.write_all(&[0u8; OBJECT_HEADER])?;
                return Ok(());
            }
            Value::Scalar(_) | Value::Array(_) | Value::Text(_) => primitive_header(value)?,
            Value::Tuple(items) => ObjectHeader::container(ObjectKind::Tuple, count_of(items.len())?),
            Value::List(items) => ObjectHeader::container(ObjectKind::List, count_of(items.len())?),
            Value::Map(entries) => {
                ObjectHeader::container(ObjectKind::Map, count_of(entries.len())?)
            }
        };
        self.inner.write_all(&header.to_bytes())?;
        Ok(())
    }

    /// Write array elements, optionally preceded by a `u32` length.
    pub fn write_primitive(&mut self, array: &PrimitiveArray, with_len: bool) -> Result<()> {
        if with_len {
            self.inner
                .write_u32::<LittleEndian>(count_of(array.len())?)?;
        }
        for scalar in array.iter() {
            self.write_scalar(scalar)?;
        }
        Ok(())
    }

    fn write_scalar(&mut self, scalar: Scalar) -> Result<()> {
        let w = &mut self.inner;
        match scalar {
            Scalar::Bool(v) => w.write_u8(u8::from(v))?,
            Scalar::I8(v) => w.write_i8(v)?,
            Scalar::U8(v) => w.write_u8(v)?,
            Scalar::I16(v) => w.write_i16::<LittleEndian>(v)?,
            Scalar::U16(v) => w.write_u16::<LittleEndian>(v)?,
            Scalar::I32(v) => w.write_i32::<LittleEndian>(v)?,
            Scalar::U32(v) => w.write_u32::<LittleEndian>(v)?,
            Scalar::I64(v) => w.write_i64::<LittleEndian>(v)?,
            Scalar::U64(v) => w.write_u64::<LittleEndian>(v)?,
            Scalar::F32(v) => w.write_f32::<LittleEndian>(v)?,
            Scalar::F64(v) => w.write_f64::<LittleEndian>(v)?,
        }
        Ok(())
    }

    /// Write a complete value: descriptor and body.
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        self.write_type_descriptor(value)?;
        match value {
            Value::Null => {}
            Value::Scalar(s) => self.write_scalar(*s)?,
            Value::Array(a) => self.write_primitive(a, false)?,
            Value::Text(s) => self.inner.write_all(s.as_bytes())?,
            Value::Tuple(items) | Value::List(items) => {
                for item in items {
                    self.write_value(item)?;
                }
            }
            Value::Map(entries) => {
                for (key, value) in entries {
                    self.write_key(key)?;
                    self.write_value(value)?;
                }
            }
        }
        Ok(())
    }

    fn write_key(&mut self, key: &Key) -> Result<()> {
        match key {
            Key::Int(i) => {
                self.inner.write_u8(KEY_INT)?;
                self.inner.write_i64::<LittleEndian>(*i)?;
            }
            Key::Str(s) => {
                self.inner.write_u8(KEY_STR)?;
                self.inner.write_u32::<LittleEndian>(count_of(s.len())?)?;
                self.inner.write_all(s.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Reads values from a byte stream.
pub struct StreamReader<R: Read> {
    inner: R,
}

impl<R: Read> StreamReader<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read a type descriptor; `None` for null.
    pub fn read_type_descriptor(&mut self) -> Result<Option<ObjectHeader>> {
        let mut buf = [0u8; OBJECT_HEADER];
        self.inner.read_exact(&mut buf)?;
        if buf[0] == 0 {
            return Ok(None);
        }
        ObjectHeader::from_bytes(&buf)
            .map(Some)
            .map_err(|e| ShmError::Codec {
                cause: format!("bad type descriptor: {e}"),
            })
    }

    /// Read `count` elements of `element`, or a `u32` length followed by
    /// that many elements when `count` is `None`.
    pub fn read_primitive(
        &mut self,
        element: ElementType,
        count: Option<usize>,
    ) -> Result<PrimitiveArray> {
        let count = match count {
            Some(count) => count,
            None => self.inner.read_u32::<LittleEndian>()? as usize,
        };
        let mut buf = vec![0u8; element.size()];
        let mut scalars = Vec::new();
        for _ in 0..count {
            self.inner.read_exact(&mut buf)?;
            scalars.push(Scalar::read_le(element, &buf));
        }
        PrimitiveArray::from_scalars(element, scalars)
    }

    /// Read a complete value written by [`StreamWriter::write_value`].
    pub fn read_value(&mut self) -> Result<Value> {
        let Some(header) = self.read_type_descriptor()? else {
            return Ok(Value::Null);
        };
        let count = header.count as usize;
        match header.kind {
            ObjectKind::Primitive => {
                let element = header.element.ok_or_else(|| ShmError::Codec {
                    cause: "primitive without element type".to_string(),
                })?;
                if header.is_text() {
                    let mut bytes = Vec::new();
                    (&mut self.inner).take(count as u64).read_to_end(&mut bytes)?;
                    if bytes.len() != count {
                        return Err(truncated());
                    }
                    let text = String::from_utf8(bytes).map_err(|e| ShmError::Codec {
                        cause: format!("text is not UTF-8: {e}"),
                    })?;
                    return Ok(Value::Text(text));
                }
                let array = self.read_primitive(element, Some(count))?;
                if header.is_scalar() {
                    return array.get(0).map(Value::Scalar).ok_or_else(truncated);
                }
                Ok(Value::Array(array))
            }
            ObjectKind::Tuple => Ok(Value::Tuple(self.read_values(count)?)),
            ObjectKind::List => Ok(Value::List(self.read_values(count)?)),
            ObjectKind::Map => {
                let mut entries = BTreeMap::new();
                for _ in 0..count {
                    let key = self.read_key()?;
                    entries.insert(key, self.read_value()?);
                }
                Ok(Value::Map(entries))
            }
        }
    }

    fn read_values(&mut self, count: usize) -> Result<Vec<Value>> {
        (0..count).map(|_| self.read_value()).collect()
    }

    fn read_key(&mut self) -> Result<Key> {
        match self.inner.read_u8()? {
            KEY_INT => Ok(Key::Int(self.inner.read_i64::<LittleEndian>()?)),
            KEY_STR => {
                let len = self.inner.read_u32::<LittleEndian>()? as usize;
                let mut bytes = Vec::new();
                (&mut self.inner).take(len as u64).read_to_end(&mut bytes)?;
                if bytes.len() != len {
                    return Err(truncated());
                }
                String::from_utf8(bytes)
                    .map(Key::Str)
                    .map_err(|e| ShmError::Codec {
                        cause: format!("key is not UTF-8: {e}"),
                    })
            }
            tag => Err(ShmError::Codec {
                cause: format!("unknown key tag {tag}"),
            }),
        }
    }
}

fn truncated() -> ShmError {
    ShmError::Codec {
        cause: "stream ended inside a value".to_string(),
    }
}
