//! Core type definitions for shmheap.
//!
//! This module contains the offset and key types shared by every layer.

mod key;
mod offset;

pub use key::{Key, format_path, parse_path};
pub use offset::HeapOffset;
