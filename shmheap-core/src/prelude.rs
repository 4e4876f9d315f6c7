//! Prelude for convenient imports.
//!
//! ```ignore
//! use shmheap_core::prelude::*;
//! ```

// Core types
pub use crate::types::{HeapOffset, Key, format_path, parse_path};

// Error handling
pub use crate::error::{Result, ResultExt, ShmError};

// Region and heap
pub use crate::heap::{BlockInfo, Heap, HeapStats};
pub use crate::region::{HeapConfig, RegionHeader};

// Values
pub use crate::encoding::{ElementType, ObjectKind, PrimitiveArray, Scalar, TypeTag, Value};

// Access
pub use crate::accessor::{Accessor, Iter, Resolved};
pub use crate::codec::{StreamReader, StreamWriter};
