//! Common test utilities for shmheap-core tests.

use shmheap_core::{Heap, HeapConfig};
use tempfile::TempDir;
use uuid::Uuid;

/// A freshly created heap in its own temporary directory.
#[allow(dead_code)]
pub struct TestHeap {
    /// Kept alive for the test duration.
    _dir: TempDir,
    /// Configuration pointing at the temporary directory.
    pub config: HeapConfig,
    /// Unique region name.
    pub name: String,
    /// The creating handle.
    pub heap: Heap,
}

#[allow(dead_code)]
impl TestHeap {
    /// Create a heap with the given requested static and heap sizes.
    pub fn new(static_size: u64, heap_size: u64) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = HeapConfig::default()
            .with_directory(dir.path())
            .with_static_size(static_size)
            .with_heap_size(heap_size);
        let name = format!("test_{}", Uuid::new_v4().simple());
        let heap = Heap::create(&name, &config).expect("Failed to create heap");
        Self {
            _dir: dir,
            config,
            name,
            heap,
        }
    }

    /// Attach another handle to the same region.
    pub fn attach(&self) -> Heap {
        Heap::attach(&self.name, &self.config).expect("Failed to attach heap")
    }
}
