//! Path elements and map keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of an accessor path, and the key type of stored maps.
///
/// Integer keys index lists, tuples and primitive arrays (negative values
/// count from the end) and are also valid map keys. String keys only
/// address maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Integer index or integer map key.
    Int(i64),
    /// String map key.
    Str(String),
}

impl Key {
    /// Get the integer form, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(_) => None,
        }
    }

    /// Get the string form, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Int(_) => None,
            Self::Str(s) => Some(s),
        }
    }

    /// Render for error messages: strings quoted, integers bare.
    pub fn describe(&self) -> String {
        match self {
            Self::Int(i) => i.to_string(),
            Self::Str(s) => format!("{s:?}"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for Key {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Parse a dotted path such as `users.0.name` or `users[0].name`.
///
/// Segments that parse as integers become [`Key::Int`]. An empty string is
/// the empty path (the entrance).
pub fn parse_path(path: &str) -> Vec<Key> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    if path.is_empty() || path == "$" {
        return Vec::new();
    }

    let mut keys = Vec::new();
    for part in path.split('.') {
        // field[0][1] notation
        let (field, rest) = match part.split_once('[') {
            Some((field, rest)) => (field, Some(rest)),
            None => (part, None),
        };
        if !field.is_empty() {
            keys.push(segment(field));
        }
        if let Some(rest) = rest {
            for idx in rest.split('[') {
                let idx = idx.strip_suffix(']').unwrap_or(idx);
                keys.push(segment(idx));
            }
        }
    }
    keys
}

fn segment(s: &str) -> Key {
    s.parse::<i64>()
        .map(Key::Int)
        .unwrap_or_else(|_| Key::Str(s.to_string()))
}

/// Join a path with `.` separators.
pub fn format_path(path: &[Key]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}
