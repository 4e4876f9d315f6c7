//! shmheap Core Library
//!
//! A typed, persistent heap living in a named shared memory region. Any
//! number of processes attach to the same region by name, allocate blocks
//! inside it and exchange structured values (scalars, arrays, text,
//! tuples, lists and maps) without serializing through pipes or sockets.
//!
//! # Key Components
//!
//! - **Region**: Named file-backed mapping plus the cross-process lock
//! - **Heap**: Block allocator with a free list, growth and in-place resize
//! - **Encoding**: Type tags, element codes and the primitive byte format
//! - **Object**: Typed objects built from heap blocks and their operations
//! - **Accessor**: Path-addressed, lock-taking view of the object graph
//! - **Codec**: Byte-stream import and export of values
//!
//! # Example
//!
//! ```no_run
//! use shmheap_core::prelude::*;
//!
//! # fn main() -> shmheap_core::Result<()> {
//! let config = HeapConfig::default();
//! let heap = Heap::open("metrics", &config)?;
//!
//! heap.root().set(Value::map())?;
//! heap.root().at("latency").set(vec![1.5f64, 2.25, 3.0])?;
//!
//! // Another process attaching to "metrics" sees the same values.
//! let latency = heap.at_path("latency[1]").fetch()?;
//! assert_eq!(latency.as_f64(), Some(2.25));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessor;
pub mod codec;
pub mod encoding;
pub mod error;
pub mod heap;
mod object;
pub mod prelude;
pub mod region;
pub mod types;

// Re-export key types at crate root for convenience
pub use accessor::{Accessor, Resolved};
pub use codec::{StreamReader, StreamWriter};
pub use encoding::{ElementType, PrimitiveArray, Scalar, TypeTag, Value};
pub use error::{Result, ResultExt, ShmError};
pub use heap::{BlockInfo, Heap, HeapStats};
pub use object::{MAX_INT_KEY, MIN_INT_KEY};
pub use region::{HeapConfig, RegionHeader};
pub use types::{HeapOffset, Key};
