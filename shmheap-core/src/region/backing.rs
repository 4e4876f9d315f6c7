//! File-backed shared mapping and its cross-process lock.

use super::config::HeapConfig;
use crate::error::{Result, ShmError};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File extension of region files.
const REGION_EXTENSION: &str = "shm";

/// A named region mapped into this process.
///
/// The mapping always covers the whole file as it was when last mapped.
/// Another process may grow the file; [`Region::remap`] picks that up.
pub struct Region {
    /// Region name.
    name: String,
    /// Path to the region file.
    path: PathBuf,
    /// The underlying file handle.
    file: File,
    /// The memory mapping.
    mmap: MmapMut,
}

impl Region {
    /// Path of the file backing `name`.
    pub fn path_for(name: &str, config: &HeapConfig) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(config
            .directory
            .join(format!("{name}.{REGION_EXTENSION}")))
    }

    /// Check whether a region with this name exists.
    pub fn exists(name: &str, config: &HeapConfig) -> Result<bool> {
        Ok(Self::path_for(name, config)?.exists())
    }

    /// Create a zero-filled region of `len` bytes.
    ///
    /// The file is sized and locked exclusively under a private staging name
    /// and only then linked under its real name, so an attacher never sees
    /// it unlocked before the creator has formatted it. The lock is released
    /// by the first guard dropped through [`Region::lock_handle`].
    pub fn create(name: &str, len: u64, config: &HeapConfig) -> Result<Self> {
        let path = Self::path_for(name, config)?;

        std::fs::create_dir_all(&config.directory).map_err(|e| ShmError::RegionCreate {
            path: config.directory.clone(),
            cause: e.to_string(),
        })?;

        let staging = config.directory.join(format!(
            ".{name}.{}.{REGION_EXTENSION}",
            Uuid::new_v4().simple()
        ));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&staging)
            .map_err(|e| ShmError::RegionCreate {
                path: staging.clone(),
                cause: e.to_string(),
            })?;

        let mapped = prepare(name, &file, &staging, len).and_then(|mmap| {
            std::fs::hard_link(&staging, &path).map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => ShmError::AlreadyExists {
                    name: name.to_string(),
                },
                _ => ShmError::RegionCreate {
                    path: path.clone(),
                    cause: e.to_string(),
                },
            })?;
            Ok(mmap)
        });
        let _ = std::fs::remove_file(&staging);
        let mmap = mapped?;

        tracing::info!(name = %name, path = %path.display(), len, "Created region");

        Ok(Self {
            name: name.to_string(),
            path,
            file,
            mmap,
        })
    }

    /// Attach to an existing region.
    pub fn attach(name: &str, config: &HeapConfig) -> Result<Self> {
        let path = Self::path_for(name, config)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ShmError::NotFound {
                    name: name.to_string(),
                },
                _ => ShmError::RegionCreate {
                    path: path.clone(),
                    cause: e.to_string(),
                },
            })?;

        let len = file_len(&file, &path)?;
        let mmap = map(&file, &path, len)?;

        tracing::info!(name = %name, path = %path.display(), len, "Attached region");

        Ok(Self {
            name: name.to_string(),
            path,
            file,
            mmap,
        })
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path to the region file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the current mapping.
    pub fn mapped_len(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Mapped bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Mapped bytes, writable.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Extend the file to `new_len` bytes and remap. Never shrinks.
    pub fn grow(&mut self, new_len: u64) -> Result<()> {
        let current = file_len(&self.file, &self.path)?;
        if new_len > current {
            self.file
                .set_len(new_len)
                .map_err(|e| ShmError::RegionCreate {
                    path: self.path.clone(),
                    cause: format!("Failed to grow region to {new_len} bytes: {e}"),
                })?;
        }
        self.remap(new_len.max(current))
    }

    /// Map `len` bytes of the file, replacing the current mapping.
    pub fn remap(&mut self, len: u64) -> Result<()> {
        if len == self.mmap.len() as u64 {
            return Ok(());
        }
        let available = file_len(&self.file, &self.path)?;
        if len > available {
            return Err(ShmError::RegionMap {
                path: self.path.clone(),
                cause: format!("Mapping {len} bytes but file holds {available}"),
            });
        }

        self.mmap = map(&self.file, &self.path, len)?;
        tracing::debug!(name = %self.name, len, "Remapped region");
        Ok(())
    }

    /// Flush the mapping to the backing file.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush().map_err(|e| ShmError::RegionMap {
            path: self.path.clone(),
            cause: e.to_string(),
        })
    }

    /// A lock handle for this region.
    pub fn lock_handle(&self) -> Result<RegionLock> {
        let file = self.file.try_clone().map_err(|e| ShmError::Lock {
            name: self.name.clone(),
            cause: e.to_string(),
        })?;
        Ok(RegionLock {
            name: self.name.clone(),
            file,
        })
    }

    /// Remove the region name, keeping this mapping usable.
    pub fn unlink(&self) -> Result<()> {
        Self::remove_path(&self.name, self.path.clone())
    }

    /// Remove the region name and unmap. Other mappings stay valid until dropped.
    pub fn destroy(self) -> Result<()> {
        self.unlink()
    }

    /// Remove a region by name without attaching to it.
    pub fn remove(name: &str, config: &HeapConfig) -> Result<()> {
        let path = Self::path_for(name, config)?;
        Self::remove_path(name, path)
    }

    fn remove_path(name: &str, path: PathBuf) -> Result<()> {
        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ShmError::NotFound {
                name: name.to_string(),
            },
            _ => ShmError::RegionCreate {
                path: path.clone(),
                cause: format!("Failed to delete region file: {e}"),
            },
        })?;
        tracing::info!(name = %name, "Destroyed region");
        Ok(())
    }
}

/// The cross-process lock of a region.
///
/// Holds its own descriptor of the region file so a guard can be held while
/// the [`Region`] itself is borrowed mutably.
pub struct RegionLock {
    name: String,
    file: File,
}

impl RegionLock {
    /// Block until the region is locked for writing.
    pub fn exclusive(&self) -> Result<LockGuard<'_>> {
        fs2::FileExt::lock_exclusive(&self.file).map_err(|e| self.lock_error(e))?;
        Ok(LockGuard { lock: self })
    }

    /// Block until the region is locked for reading.
    pub fn shared(&self) -> Result<LockGuard<'_>> {
        fs2::FileExt::lock_shared(&self.file).map_err(|e| self.lock_error(e))?;
        Ok(LockGuard { lock: self })
    }

    fn lock_error(&self, e: std::io::Error) -> ShmError {
        ShmError::Lock {
            name: self.name.clone(),
            cause: e.to_string(),
        }
    }
}

/// Releases the region lock when dropped.
pub struct LockGuard<'a> {
    lock: &'a RegionLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.lock.file) {
            tracing::warn!(name = %self.lock.name, error = %e, "Failed to release region lock");
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let cause = if name.is_empty() {
        "name is empty"
    } else if name == "." || name == ".." {
        "name is a directory reference"
    } else if name.contains(['/', '\\', '\0']) {
        "name contains a path separator or NUL"
    } else {
        return Ok(());
    };
    Err(ShmError::InvalidName {
        name: name.to_string(),
        cause: cause.to_string(),
    })
}

/// Lock a fresh file exclusively, size it and map it.
fn prepare(name: &str, file: &File, path: &Path, len: u64) -> Result<MmapMut> {
    fs2::FileExt::lock_exclusive(file).map_err(|e| ShmError::Lock {
        name: name.to_string(),
        cause: e.to_string(),
    })?;
    file.set_len(len).map_err(|e| ShmError::RegionCreate {
        path: path.to_path_buf(),
        cause: e.to_string(),
    })?;
    map(file, path, len)
}

fn file_len(file: &File, path: &Path) -> Result<u64> {
    file.metadata()
        .map(|m| m.len())
        .map_err(|e| ShmError::RegionCreate {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })
}

fn map(file: &File, path: &Path, len: u64) -> Result<MmapMut> {
    // The file is only ever grown while every handle holds the region lock,
    // and mappings never exceed the file length.
    unsafe {
        MmapOptions::new()
            .len(len as usize)
            .map_mut(file)
            .map_err(|e| ShmError::RegionMap {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &Path) -> HeapConfig {
        HeapConfig::default().with_directory(dir)
    }

    #[test]
    fn create_and_attach() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        let mut region = Region::create("jobs", 4096, &config).unwrap();
        assert!(region.path().exists());
        assert_eq!(region.mapped_len(), 4096);
        region.bytes_mut()[100] = 7;

        let other = Region::attach("jobs", &config).unwrap();
        assert_eq!(other.mapped_len(), 4096);
        assert_eq!(other.bytes()[100], 7);
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        let _region = Region::create("jobs", 4096, &config).unwrap();
        let err = Region::create("jobs", 4096, &config).err().unwrap();
        assert!(matches!(err, ShmError::AlreadyExists { .. }));
    }

    #[test]
    fn attach_missing_fails() {
        let dir = tempdir().unwrap();
        let err = Region::attach("missing", &config(dir.path())).err().unwrap();
        assert!(matches!(err, ShmError::NotFound { .. }));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        for name in ["", "..", "a/b", "a\\b"] {
            let err = Region::create(name, 4096, &config).err().unwrap();
            assert!(matches!(err, ShmError::InvalidName { .. }), "{name}");
        }
    }

    #[test]
    fn growth_is_visible_after_remap() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        let mut region = Region::create("grow", 4096, &config).unwrap();
        let mut other = Region::attach("grow", &config).unwrap();

        region.grow(8192).unwrap();
        region.bytes_mut()[8000] = 9;
        assert_eq!(other.mapped_len(), 4096);

        other.remap(8192).unwrap();
        assert_eq!(other.bytes()[8000], 9);
    }

    #[test]
    fn remap_past_file_end_fails() {
        let dir = tempdir().unwrap();
        let mut region = Region::create("short", 4096, &config(dir.path())).unwrap();
        assert!(matches!(
            region.remap(8192),
            Err(ShmError::RegionMap { .. })
        ));
    }

    #[test]
    fn destroy_removes_name() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        let region = Region::create("gone", 4096, &config).unwrap();
        region.destroy().unwrap();
        assert!(!Region::exists("gone", &config).unwrap());
        assert!(matches!(
            Region::remove("gone", &config),
            Err(ShmError::NotFound { .. })
        ));
    }

    #[test]
    fn lock_guard_releases() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        let region = Region::create("locked", 4096, &config).unwrap();
        let other = Region::attach("locked", &config).unwrap();
        let lock = region.lock_handle().unwrap();
        let other_lock = other.lock_handle().unwrap();

        {
            let _guard = lock.exclusive().unwrap();
            assert!(fs2::FileExt::try_lock_exclusive(&other_lock.file).is_err());
        }
        let _guard = other_lock.exclusive().unwrap();
    }
}
