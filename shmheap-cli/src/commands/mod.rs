//! CLI command implementations.

pub mod create;
pub mod inspect;
pub mod transfer;
pub mod value;

use anyhow::{Context, Result};
use shmheap_core::{Heap, HeapConfig};
use std::path::PathBuf;

/// Environment configuration with an optional directory override.
pub fn heap_config(dir: Option<PathBuf>) -> HeapConfig {
    let config = HeapConfig::from_env();
    match dir {
        Some(dir) => config.with_directory(dir),
        None => config,
    }
}

/// Attach to an existing heap.
fn attach(config: &HeapConfig, name: &str) -> Result<Heap> {
    Heap::attach(name, config).with_context(|| {
        format!(
            "Failed to attach heap '{}' in {}",
            name,
            config.directory.display()
        )
    })
}
