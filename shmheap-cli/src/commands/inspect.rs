//! Inspect commands - header words, block statistics and layout.

use super::attach;
use anyhow::Result;
use shmheap_core::HeapConfig;

/// Run the info command.
pub fn info(config: &HeapConfig, name: &str, json: bool) -> Result<()> {
    let heap = attach(config, name)?;
    let header = heap.header()?;
    let stats = heap.verify()?;
    let root = heap.root().type_name()?;

    if json {
        let out = serde_json::json!({
            "name": name,
            "path": heap.path(),
            "static_capacity": header.static_capacity,
            "heap_capacity": header.heap_capacity,
            "version": header.version,
            "entrance": header.entrance.as_u64(),
            "root": root,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Heap Information");
    println!("================");
    println!("Name:            {}", name);
    println!("Path:            {}", heap.path().display());
    println!("Static capacity: {} bytes", header.static_capacity);
    println!("Heap capacity:   {} bytes", header.heap_capacity);
    println!("Version:         {}", header.version);
    println!("Root:            {} at {}", root, header.entrance);
    println!();
    println!(
        "Blocks:          {} ({} allocated, {} free)",
        stats.blocks, stats.allocated_blocks, stats.free_blocks
    );
    println!("Allocated bytes: {}", stats.allocated_bytes);
    println!("Free bytes:      {}", stats.free_bytes);
    Ok(())
}

/// Run the layout command.
pub fn layout(config: &HeapConfig, name: &str, detailed: bool) -> Result<()> {
    let heap = attach(config, name)?;
    if detailed {
        print!("{}", heap.describe()?);
    } else {
        println!("{}", heap.layout_string()?);
    }
    Ok(())
}
