//! The shared heap: a block allocator over a named region.
//!
//! A [`Heap`] is a handle to one attached region. Every operation takes the
//! region lock (exclusive for mutation, shared for reads), re-reads the
//! capacity words, remaps if another handle grew the region, and then works
//! directly on the mapped bytes. No state survives between calls other than
//! the mapping itself.
//!
//! # Block layout
//!
//! ```text
//! allocated: [size|P|A][payload .................................]
//! free:      [size|P|0][prev][next][ ......................... ][size]
//! ```
//!
//! `A` marks the block allocated, `P` marks the previous adjacent block
//! allocated. Free blocks form a doubly linked list anchored in the header
//! and carry a footer so the following block can find their start.

mod alloc;
mod block;
mod layout;
mod memory;

pub use alloc::{heap_capacity_for, static_capacity_for};
pub use block::{BLOCK_HEADER, MIN_BLOCK, MIN_PAYLOAD, PAGE_SIZE, UNIT};
pub use layout::{BlockInfo, HeapStats};

pub(crate) use alloc::{allocate, block_size, free, reallocate, reserve};
pub(crate) use memory::{HeapMemory, HeapMemoryMut, HeapView};

#[cfg(test)]
pub(crate) use layout::{layout_string, verify};
#[cfg(test)]
pub(crate) use memory::VecMemory;

use crate::accessor::Accessor;
use crate::error::{Result, ShmError};
use crate::region::{HEADER_SIZE, HeapConfig, Region, RegionHeader, RegionLock};
use crate::types::{HeapOffset, Key};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Region memory seen through a mutable borrow of the mapping.
pub(crate) struct MappedHeap<'a> {
    region: &'a mut Region,
    max_heap_capacity: u64,
}

impl HeapMemory for MappedHeap<'_> {
    fn bytes(&self) -> &[u8] {
        self.region.bytes()
    }
}

impl HeapMemoryMut for MappedHeap<'_> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.region.bytes_mut()
    }

    fn grow_to(&mut self, total_len: u64) -> Result<()> {
        if total_len > self.region.mapped_len() {
            self.region.grow(total_len)?;
        }
        Ok(())
    }

    fn max_heap_capacity(&self) -> u64 {
        self.max_heap_capacity
    }
}

/// A handle to a shared heap.
///
/// Cloning is cheap and shares the mapping. Handles are `Send + Sync`; calls
/// through one handle are serialized, calls through different handles or
/// processes are coordinated by the region lock.
#[derive(Clone)]
pub struct Heap {
    name: Arc<str>,
    region: Arc<RwLock<Region>>,
    lock: Arc<RegionLock>,
    max_heap_capacity: u64,
}

impl Heap {
    /// Create a new region and format it as an empty heap.
    ///
    /// The static size is rounded up to 8 bytes (at least the header words),
    /// the heap size up to a whole page.
    pub fn create(name: &str, config: &HeapConfig) -> Result<Self> {
        let static_capacity = static_capacity_for(config.static_size);
        let heap_capacity = heap_capacity_for(config.heap_size);
        if heap_capacity > config.max_heap_capacity {
            return Err(ShmError::OutOfMemory {
                requested: heap_capacity,
                cause: format!(
                    "initial heap exceeds limit {}",
                    config.max_heap_capacity
                ),
            });
        }

        let mut region = Region::create(name, static_capacity + heap_capacity, config)?;
        let lock = region.lock_handle()?;
        {
            let _guard = lock.exclusive()?;
            let mut mem = MappedHeap {
                region: &mut region,
                max_heap_capacity: config.max_heap_capacity,
            };
            alloc::format(&mut mem, static_capacity, heap_capacity);
        }

        tracing::info!(
            name = %name,
            static_capacity,
            heap_capacity,
            "Created heap"
        );

        Ok(Self::from_parts(name, region, lock, config))
    }

    /// Attach to an existing heap.
    pub fn attach(name: &str, config: &HeapConfig) -> Result<Self> {
        let mut region = Region::attach(name, config)?;
        let lock = region.lock_handle()?;

        let header = {
            let _guard = lock.shared()?;
            let file_len = std::fs::metadata(region.path())
                .map(|m| m.len())
                .map_err(|e| ShmError::RegionCreate {
                    path: region.path().to_path_buf(),
                    cause: e.to_string(),
                })?;
            // The file may have grown while waiting for the lock.
            region.remap(file_len)?;
            let header =
                RegionHeader::from_bytes(region.bytes()).map_err(|e| ShmError::Corrupted {
                    name: name.to_string(),
                    cause: e.to_string(),
                })?;
            header
                .validate(file_len)
                .map_err(|cause| ShmError::Corrupted {
                    name: name.to_string(),
                    cause: cause.to_string(),
                })?;
            header
        };

        tracing::info!(
            name = %name,
            static_capacity = header.static_capacity,
            heap_capacity = header.heap_capacity,
            "Attached heap"
        );

        Ok(Self::from_parts(name, region, lock, config))
    }

    /// Create the heap, or attach if it already exists.
    pub fn open(name: &str, config: &HeapConfig) -> Result<Self> {
        match Self::create(name, config) {
            Err(ShmError::AlreadyExists { .. }) => Self::attach(name, config),
            other => other,
        }
    }

    /// Remove a heap by name without attaching to it.
    pub fn remove(name: &str, config: &HeapConfig) -> Result<()> {
        Region::remove(name, config)
    }

    /// Check whether a heap with this name exists.
    pub fn exists(name: &str, config: &HeapConfig) -> Result<bool> {
        Region::exists(name, config)
    }

    fn from_parts(name: &str, region: Region, lock: RegionLock, config: &HeapConfig) -> Self {
        Self {
            name: Arc::from(name),
            region: Arc::new(RwLock::new(region)),
            lock: Arc::new(lock),
            max_heap_capacity: config.max_heap_capacity,
        }
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.region.read().path().to_path_buf()
    }

    /// Whether two handles share the same mapping.
    pub fn same_handle(&self, other: &Heap) -> bool {
        Arc::ptr_eq(&self.region, &other.region)
    }

    /// Run `op` under the exclusive region lock.
    pub(crate) fn write<R>(&self, op: impl FnOnce(&mut MappedHeap<'_>) -> Result<R>) -> Result<R> {
        let mut region = self.region.write();
        let _guard = self.lock.exclusive()?;
        sync_mapping(&mut region)?;
        let mut mem = MappedHeap {
            region: &mut region,
            max_heap_capacity: self.max_heap_capacity,
        };
        op(&mut mem)
    }

    /// Run `op` under the shared region lock.
    ///
    /// The upgradable guard keeps readers of one handle from overlapping,
    /// since the file lock belongs to the handle, not to the thread.
    pub(crate) fn read<R>(&self, op: impl FnOnce(&HeapView<'_>) -> Result<R>) -> Result<R> {
        let region = self.region.upgradable_read();
        let _guard = self.lock.shared()?;
        if needs_remap(&region) {
            let mut region = RwLockUpgradableReadGuard::upgrade(region);
            sync_mapping(&mut region)?;
            return op(&HeapView::new(region.bytes()));
        }
        op(&HeapView::new(region.bytes()))
    }

    /// Decoded header words.
    pub fn header(&self) -> Result<RegionHeader> {
        self.read(|mem| {
            RegionHeader::from_bytes(mem.bytes()).map_err(|e| ShmError::Corrupted {
                name: self.name.to_string(),
                cause: e.to_string(),
            })
        })
    }

    /// Current static capacity in bytes (header words included).
    pub fn static_capacity(&self) -> Result<u64> {
        self.read(|mem| Ok(mem.static_capacity()))
    }

    /// Current heap capacity in bytes.
    pub fn heap_capacity(&self) -> Result<u64> {
        self.read(|mem| Ok(mem.heap_capacity()))
    }

    /// Total region size in bytes.
    pub fn capacity(&self) -> Result<u64> {
        self.read(|mem| Ok(mem.static_capacity() + mem.heap_capacity()))
    }

    /// Allocate a block of at least `size` payload bytes, growing the heap
    /// if nothing fits.
    pub fn allocate(&self, size: u64) -> Result<HeapOffset> {
        self.write(|mem| allocate(mem, size))
    }

    /// Resize the block at `offset`, preserving its leading bytes.
    pub fn reallocate(&self, offset: HeapOffset, size: u64) -> Result<HeapOffset> {
        self.write(|mem| alloc::reallocate_checked(mem, offset, size))
    }

    /// Free the block at `offset`.
    pub fn free(&self, offset: HeapOffset) -> Result<()> {
        self.write(|mem| alloc::free_checked(mem, offset))
    }

    /// Grow the static space and/or the heap. `None` leaves a size unchanged.
    pub fn resize(&self, static_size: Option<u64>, heap_size: Option<u64>) -> Result<()> {
        self.write(|mem| alloc::resize(mem, static_size, heap_size))?;
        tracing::info!(name = %self.name, ?static_size, ?heap_size, "Resized heap");
        Ok(())
    }

    /// Copy `len` bytes out of the heap at `offset`.
    pub fn read_bytes(&self, offset: HeapOffset, len: usize) -> Result<Vec<u8>> {
        self.read(|mem| {
            check_heap_range(mem, offset, len)?;
            Ok(mem.slice(offset.as_u64(), len).to_vec())
        })
    }

    /// Copy `bytes` into the heap at `offset`.
    pub fn write_bytes(&self, offset: HeapOffset, bytes: &[u8]) -> Result<()> {
        self.write(|mem| {
            check_heap_range(mem, offset, bytes.len())?;
            mem.slice_mut(offset.as_u64(), bytes.len())
                .copy_from_slice(bytes);
            Ok(())
        })
    }

    /// Size of the caller-reserved static space.
    pub fn static_space_len(&self) -> Result<u64> {
        self.read(|mem| Ok(mem.static_capacity() - HEADER_SIZE as u64))
    }

    /// Copy `len` bytes out of the caller-reserved static space.
    pub fn read_static(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.read(|mem| {
            let at = check_static_range(mem, offset, len)?;
            Ok(mem.bytes()[at..at + len].to_vec())
        })
    }

    /// Copy `bytes` into the caller-reserved static space.
    pub fn write_static(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.write(|mem| {
            let at = check_static_range(mem, offset, bytes.len())?;
            mem.bytes_mut()[at..at + bytes.len()].copy_from_slice(bytes);
            Ok(())
        })
    }

    /// All blocks in address order.
    pub fn layout(&self) -> Result<Vec<BlockInfo>> {
        self.read(|mem| Ok(layout::layout(mem)))
    }

    /// Payload sizes of all blocks in address order.
    pub fn brief_layout(&self) -> Result<Vec<u64>> {
        Ok(self.layout()?.into_iter().map(|b| b.size).collect())
    }

    /// Layout summary such as `"256A, 3824E"`.
    pub fn layout_string(&self) -> Result<String> {
        self.read(|mem| Ok(layout::layout_string(mem)))
    }

    /// Multi-line dump of header words, blocks and the free list.
    pub fn describe(&self) -> Result<String> {
        self.read(|mem| Ok(layout::describe(mem)))
    }

    /// Check the block and free-list invariants and return block statistics.
    pub fn verify(&self) -> Result<HeapStats> {
        self.read(|mem| {
            layout::verify(mem).map_err(|cause| ShmError::Corrupted {
                name: self.name.to_string(),
                cause,
            })
        })
    }

    /// Flush the mapping to the backing file.
    pub fn flush(&self) -> Result<()> {
        self.region.read().flush()
    }

    /// Accessor for the root object.
    pub fn root(&self) -> Accessor {
        Accessor::new(self.clone(), Vec::new())
    }

    /// Accessor for a key path below the root.
    pub fn at<K: Into<Key>>(&self, path: impl IntoIterator<Item = K>) -> Accessor {
        Accessor::new(self.clone(), path.into_iter().map(Into::into).collect())
    }

    /// Accessor for a dotted path such as `users.0.name`.
    pub fn at_path(&self, path: &str) -> Accessor {
        Accessor::new(self.clone(), crate::types::parse_path(path))
    }

    /// Remove the region name. This handle and other attached handles keep
    /// working until dropped; new attaches fail with `NotFound`.
    pub fn destroy(self) -> Result<()> {
        self.region.read().unlink()
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap").field("name", &self.name).finish()
    }
}

fn needs_remap(region: &Region) -> bool {
    let mem = HeapView::new(region.bytes());
    mem.static_capacity() + mem.heap_capacity() > region.mapped_len()
}

/// Remap when another handle has grown the region.
fn sync_mapping(region: &mut Region) -> Result<()> {
    if needs_remap(region) {
        let mem = HeapView::new(region.bytes());
        let total = mem.static_capacity() + mem.heap_capacity();
        region.remap(total)?;
    }
    Ok(())
}

fn check_heap_range<M: HeapMemory + ?Sized>(mem: &M, offset: HeapOffset, len: usize) -> Result<()> {
    let end = offset.as_u64().checked_add(len as u64);
    if offset.is_null() || end.is_none_or(|end| end > mem.heap_capacity()) {
        return Err(ShmError::InvalidPointer {
            offset,
            cause: format!("{len} bytes do not fit in the heap"),
        });
    }
    Ok(())
}

fn check_static_range<M: HeapMemory + ?Sized>(mem: &M, offset: u64, len: usize) -> Result<usize> {
    let available = mem.static_capacity() - HEADER_SIZE as u64;
    match offset.checked_add(len as u64) {
        Some(end) if end <= available => {}
        end => {
            return Err(ShmError::IndexOutOfRange {
                index: end.and_then(|end| i64::try_from(end).ok()).unwrap_or(i64::MAX),
                len: available as usize,
            });
        }
    }
    Ok(HEADER_SIZE + offset as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn attach_waits_until_the_creator_has_formatted() {
        let dir = tempdir().unwrap();
        let config = HeapConfig::default().with_directory(dir.path());
        let mut region = Region::create("racing", HEADER_SIZE as u64 + 4096, &config).unwrap();

        let attacher = {
            let config = config.clone();
            std::thread::spawn(move || Heap::attach("racing", &config))
        };
        std::thread::sleep(Duration::from_millis(100));
        assert!(!attacher.is_finished());

        let lock = region.lock_handle().unwrap();
        {
            let _guard = lock.exclusive().unwrap();
            let mut mem = MappedHeap {
                region: &mut region,
                max_heap_capacity: config.max_heap_capacity,
            };
            alloc::format(&mut mem, HEADER_SIZE as u64, 4096);
        }

        let heap = attacher.join().unwrap().unwrap();
        assert_eq!(heap.layout_string().unwrap(), "4088E");
    }

    #[test]
    fn create_leaves_no_staging_files() {
        let dir = tempdir().unwrap();
        let config = HeapConfig::default().with_directory(dir.path());
        let _heap = Heap::create("tidy", &config).unwrap();
        assert!(matches!(
            Heap::create("tidy", &config),
            Err(ShmError::AlreadyExists { .. })
        ));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("tidy.shm")]);
    }
}
