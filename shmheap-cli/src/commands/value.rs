//! Value commands - get, set and delete by path.

use super::attach;
use anyhow::{Context, Result};
use shmheap_core::{HeapConfig, Value};

/// Run the get command.
pub fn get(
    config: &HeapConfig,
    name: &str,
    path: &str,
    json: bool,
    max_elements: usize,
) -> Result<()> {
    let heap = attach(config, name)?;
    let accessor = heap.at_path(path);
    if json {
        let value = accessor
            .fetch()
            .with_context(|| format!("Failed to read '{}'", path))?;
        println!("{}", serde_json::to_string(&value.to_json())?);
    } else {
        let text = accessor
            .render(max_elements)
            .with_context(|| format!("Failed to read '{}'", path))?;
        println!("{}", text);
    }
    Ok(())
}

/// Run the set command.
pub fn set(config: &HeapConfig, name: &str, path: &str, value: &str) -> Result<()> {
    let json: serde_json::Value =
        serde_json::from_str(value).with_context(|| format!("Invalid JSON value: {}", value))?;
    let heap = attach(config, name)?;
    heap.at_path(path)
        .set(Value::from(json))
        .with_context(|| format!("Failed to set '{}'", path))?;
    tracing::info!(name = %name, path = %path, "Stored value");
    Ok(())
}

/// Run the delete command.
pub fn delete(config: &HeapConfig, name: &str, path: &str) -> Result<()> {
    let heap = attach(config, name)?;
    heap.at_path(path)
        .delete()
        .with_context(|| format!("Failed to delete '{}'", path))?;
    Ok(())
}
