//! Heap-relative offsets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset of a block payload, relative to the first byte of the heap.
///
/// Offsets are what gets stored inside the region; addresses are always
/// recomputed from the current mapping. The first payload of the heap sits
/// behind an 8-byte block header, so `0` is never a payload and encodes null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct HeapOffset(u64);

impl HeapOffset {
    /// The null offset.
    pub const NULL: Self = Self(0);

    /// Create a new heap offset.
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Get the raw offset value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check if this is the null offset.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Add a byte offset.
    #[must_use]
    pub const fn add(&self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }

    /// `None` for the null offset.
    #[must_use]
    pub const fn non_null(self) -> Option<Self> {
        if self.is_null() { None } else { Some(self) }
    }
}

impl fmt::Display for HeapOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u64> for HeapOffset {
    fn from(offset: u64) -> Self {
        Self(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_offset() {
        assert!(HeapOffset::NULL.is_null());
        assert!(!HeapOffset::new(8).is_null());
        assert_eq!(HeapOffset::NULL.non_null(), None);
        assert_eq!(HeapOffset::new(8).non_null(), Some(HeapOffset::new(8)));
    }

    #[test]
    fn offset_display_is_hex() {
        assert_eq!(HeapOffset::new(0x120).to_string(), "0x00000120");
        assert_eq!(HeapOffset::new(8).add(24).as_u64(), 32);
    }
}
