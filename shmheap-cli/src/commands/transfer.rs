//! Export and import through the byte codec.

use super::attach;
use anyhow::{Context, Result};
use shmheap_core::HeapConfig;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

/// Run the export command.
pub fn export(config: &HeapConfig, name: &str, path: &str, output: Option<&Path>) -> Result<()> {
    let heap = attach(config, name)?;
    let accessor = heap.at_path(path);
    match output {
        Some(file) => {
            let out = File::create(file)
                .with_context(|| format!("Failed to create {}", file.display()))?;
            accessor.export(BufWriter::new(out))?;
            tracing::info!(name = %name, path = %path, file = %file.display(), "Exported value");
        }
        None => accessor.export(BufWriter::new(io::stdout().lock()))?,
    }
    Ok(())
}

/// Run the import command.
pub fn import(config: &HeapConfig, name: &str, path: &str, input: Option<&Path>) -> Result<()> {
    let heap = attach(config, name)?;
    let accessor = heap.at_path(path);
    match input {
        Some(file) => {
            let src =
                File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
            accessor
                .import(BufReader::new(src))
                .with_context(|| format!("Failed to import into '{}'", path))?;
        }
        None => accessor
            .import(BufReader::new(io::stdin().lock()))
            .with_context(|| format!("Failed to import into '{}'", path))?,
    }
    Ok(())
}
