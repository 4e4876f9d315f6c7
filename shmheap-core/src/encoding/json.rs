//! Conversions between [`Value`] and `serde_json::Value`.

use super::value::{Scalar, Value};
use crate::types::Key;
use serde_json::{Map, Number};

impl From<serde_json::Value> for Value {
    /// Integers become `long` (`unsigned long` above `i64::MAX`), other
    /// numbers `double`. Arrays are classified with [`Value::seq`], objects
    /// become string-keyed maps.
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::from(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::from(i)
                } else if let Some(u) = n.as_u64() {
                    Value::from(u)
                } else {
                    Value::from(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => Value::seq(items.into_iter().map(Value::from)),
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (Key::Str(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Value {
    /// Convert to JSON. Integer map keys become strings, non-finite floats
    /// become `null`, tuples become arrays.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Scalar(s) => scalar_to_json(*s),
            Value::Array(a) => serde_json::Value::Array(a.iter().map(scalar_to_json).collect()),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) | Value::Tuple(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    map.insert(k.to_string(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

fn scalar_to_json(s: Scalar) -> serde_json::Value {
    match s {
        Scalar::Bool(b) => serde_json::Value::Bool(b),
        Scalar::F32(_) | Scalar::F64(_) => Number::from_f64(s.as_f64())
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Scalar::U64(u) => serde_json::Value::Number(u.into()),
        _ => serde_json::Value::Number(s.as_i64().unwrap_or_default().into()),
    }
}
