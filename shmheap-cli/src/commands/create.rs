//! Create and destroy commands.

use anyhow::{Context, Result};
use shmheap_core::{Heap, HeapConfig};

/// Run the create command.
pub fn run(config: &HeapConfig, name: &str, static_size: u64, heap_size: u64) -> Result<()> {
    let config = config
        .clone()
        .with_static_size(static_size)
        .with_heap_size(heap_size);
    let heap = Heap::create(name, &config)
        .with_context(|| format!("Failed to create heap '{}'", name))?;

    println!("Created heap '{}'", name);
    println!("  Path:   {}", heap.path().display());
    println!("  Static: {} bytes", heap.static_capacity()?);
    println!("  Heap:   {} bytes", heap.heap_capacity()?);
    Ok(())
}

/// Run the destroy command.
pub fn destroy(config: &HeapConfig, name: &str) -> Result<()> {
    Heap::remove(name, config).with_context(|| format!("Failed to destroy heap '{}'", name))?;
    println!("Destroyed heap '{}'", name);
    Ok(())
}
