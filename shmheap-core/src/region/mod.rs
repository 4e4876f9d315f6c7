//! Named, file-backed shared regions.
//!
//! A region is a file `<directory>/<name>.shm` mapped read-write into every
//! attached process. On Linux the default directory is `/dev/shm`, so the
//! file lives in memory and the mapping is true shared memory.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header words (48 bytes)                                      │
//! │   [0] static capacity  [1] heap capacity  [2] free-list head │
//! │   [3] entrance         [4] magic          [5] version        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Caller-reserved static space (up to static capacity)         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Heap (blocks, heap capacity bytes)                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The region also carries the cross-process lock: an advisory whole-file
//! lock on the region file, exclusive for writers and shared for readers.
//! The kernel drops it if the holder dies.

mod backing;
mod config;
mod header;

pub use backing::{LockGuard, Region, RegionLock};
pub use config::{
    DEFAULT_HEAP_SIZE, DEFAULT_STATIC_SIZE, HeapConfig, MAX_HEAP_CAPACITY, default_directory,
};
pub use header::{HEADER_SIZE, REGION_MAGIC, REGION_VERSION, RegionHeader};
pub(crate) use header::{ENTRANCE_AT, FREE_HEAD_AT, HEAP_CAPACITY_AT, STATIC_CAPACITY_AT};
