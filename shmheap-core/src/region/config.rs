//! Region and heap configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default caller-reserved static space: the header words plus 16 bytes.
pub const DEFAULT_STATIC_SIZE: u64 = 64;

/// Default initial heap capacity: 64 KB.
pub const DEFAULT_HEAP_SIZE: u64 = 64 * 1024;

/// Maximum heap capacity: 4 GB.
pub const MAX_HEAP_CAPACITY: u64 = 4 * 1024 * 1024 * 1024;

/// Configuration for creating and attaching heaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapConfig {
    /// Directory holding region files.
    pub directory: PathBuf,
    /// Requested static space in bytes (rounded up, at least the header).
    pub static_size: u64,
    /// Requested initial heap capacity in bytes (rounded up to a page).
    pub heap_size: u64,
    /// Upper bound for heap growth; allocations beyond it fail.
    pub max_heap_capacity: u64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            static_size: DEFAULT_STATIC_SIZE,
            heap_size: DEFAULT_HEAP_SIZE,
            max_heap_capacity: MAX_HEAP_CAPACITY,
        }
    }
}

impl HeapConfig {
    /// Create an isolated configuration for testing.
    ///
    /// Uses a temporary directory with a unique name per invocation.
    pub fn in_memory() -> Self {
        Self {
            directory: std::env::temp_dir().join(format!("shmheap_{}", uuid::Uuid::new_v4())),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SHMHEAP_DIR`: directory holding region files
    /// - `SHMHEAP_MAX_HEAP`: maximum heap capacity in bytes
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("SHMHEAP_DIR") {
            config.directory = PathBuf::from(dir);
        }

        if let Ok(max) = std::env::var("SHMHEAP_MAX_HEAP") {
            match max.parse::<u64>() {
                Ok(max) => config.max_heap_capacity = max,
                Err(e) => tracing::warn!(value = %max, error = %e, "Ignoring SHMHEAP_MAX_HEAP"),
            }
        }

        config
    }

    /// Use a custom directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the requested static space.
    pub fn with_static_size(mut self, size: u64) -> Self {
        self.static_size = size;
        self
    }

    /// Set the requested initial heap capacity.
    pub fn with_heap_size(mut self, size: u64) -> Self {
        self.heap_size = size.min(MAX_HEAP_CAPACITY);
        self
    }

    /// Bound heap growth.
    pub fn with_max_heap_capacity(mut self, max: u64) -> Self {
        self.max_heap_capacity = max.min(MAX_HEAP_CAPACITY);
        self
    }
}

/// `/dev/shm` when it exists, otherwise `<tmp>/shmheap`.
pub fn default_directory() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir().join("shmheap")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides() {
        let config = HeapConfig::default()
            .with_directory("/tmp/heaps")
            .with_static_size(80)
            .with_heap_size(1024)
            .with_max_heap_capacity(u64::MAX);

        assert_eq!(config.directory, PathBuf::from("/tmp/heaps"));
        assert_eq!(config.static_size, 80);
        assert_eq!(config.heap_size, 1024);
        assert_eq!(config.max_heap_capacity, MAX_HEAP_CAPACITY);
    }

    #[test]
    fn in_memory_configs_are_isolated() {
        let a = HeapConfig::in_memory();
        let b = HeapConfig::in_memory();
        assert_ne!(a.directory, b.directory);
    }

    #[test]
    fn config_serializes() {
        let config = HeapConfig::default().with_directory("/tmp/heaps");
        let json = serde_json::to_string(&config).unwrap();
        let back: HeapConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
