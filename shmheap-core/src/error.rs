//! Error types for shmheap.
//!
//! Every error carries a stable code (`E001`, `E101`, ...) and enough
//! context (region name, offset, path) to act on it without a debugger.

use crate::types::HeapOffset;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for shmheap operations.
#[derive(Error, Debug)]
pub enum ShmError {
    // =========================================================================
    // Region Errors (E001-E099)
    // =========================================================================
    /// Failed to create, open, size or remove a region file.
    #[error("E001: Failed to create region at {path}: {cause}")]
    RegionCreate {
        /// The path of the region file.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    /// Failed to memory-map the region file.
    #[error("E002: Failed to mmap region at {path}: {cause}")]
    RegionMap {
        /// The path of the region file.
        path: PathBuf,
        /// Reason for the mmap failure.
        cause: String,
    },

    /// A region with this name already exists.
    #[error("E003: Region '{name}' already exists")]
    AlreadyExists {
        /// The region name.
        name: String,
    },

    /// No region with this name exists.
    #[error("E004: Region '{name}' not found")]
    NotFound {
        /// The region name.
        name: String,
    },

    /// The region name cannot be used as a file name.
    #[error("E005: Invalid region name '{name}': {cause}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        cause: String,
    },

    /// The header or block structure of a region is inconsistent.
    #[error("E006: Region '{name}' is corrupted: {cause}")]
    Corrupted {
        /// The region name.
        name: String,
        /// Description of the problem.
        cause: String,
    },

    /// Acquiring or releasing the region lock failed.
    #[error("E007: Region lock failed for '{name}': {cause}")]
    Lock {
        /// The region name.
        name: String,
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Allocator Errors (E100-E199)
    // =========================================================================
    /// The heap could not grow to satisfy an allocation.
    #[error("E101: Out of memory: requested {requested} bytes: {cause}")]
    OutOfMemory {
        /// Number of payload bytes requested.
        requested: u64,
        /// Why growth failed.
        cause: String,
    },

    /// A resize request was below the current capacity.
    #[error("E102: Cannot shrink {space} space from {current} to {requested} bytes")]
    ShrinkNotSupported {
        /// Which space ("static" or "heap").
        space: &'static str,
        /// Current capacity in bytes.
        current: u64,
        /// Requested capacity in bytes.
        requested: u64,
    },

    /// An offset is not the start of a currently allocated block.
    #[error("E103: Invalid pointer {offset}: {cause}")]
    InvalidPointer {
        /// The rejected offset.
        offset: HeapOffset,
        /// Why it was rejected.
        cause: String,
    },

    // =========================================================================
    // Navigation Errors (E200-E299)
    // =========================================================================
    /// A path element could not be followed.
    #[error("E201: Path '{path}' not found: {cause}")]
    PathNotFound {
        /// The path being resolved.
        path: String,
        /// What went wrong at the failing step.
        cause: String,
    },

    /// A previously valid path no longer resolves.
    #[error("E202: Stale reference to '{path}': {cause}")]
    StaleReference {
        /// The accessor's path.
        path: String,
        /// What went wrong at the failing step.
        cause: String,
    },

    /// A map has no entry for the key.
    #[error("E203: Key {key} not found")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// An index is outside a collection.
    #[error("E204: Index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// The requested index.
        index: i64,
        /// The collection length.
        len: usize,
    },

    /// The object cannot be indexed with this key.
    #[error("E205: {kind} is not indexable by {key}")]
    NotIndexable {
        /// Type name of the object.
        kind: String,
        /// The key that was used.
        key: String,
    },

    /// The object has no children to iterate.
    #[error("E206: {kind} is not iterable")]
    NotIterable {
        /// Type name of the object.
        kind: String,
    },

    /// A map key cannot be stored.
    #[error("E207: Invalid key {key}: {cause}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        cause: String,
    },

    // =========================================================================
    // Encoding Errors (E300-E399)
    // =========================================================================
    /// An object or value has a different kind than the operation expects.
    #[error("E301: Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// What the operation expected.
        expected: String,
        /// What it found.
        actual: String,
    },

    /// Import or export through the byte codec failed.
    #[error("E302: Codec error: {cause}")]
    Codec {
        /// Description of the failure.
        cause: String,
    },

    // =========================================================================
    // I/O Errors (E900-E999)
    // =========================================================================
    /// Generic I/O error.
    #[error("E901: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShmError {
    /// Get the error code (e.g., "E001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RegionCreate { .. } => "E001",
            Self::RegionMap { .. } => "E002",
            Self::AlreadyExists { .. } => "E003",
            Self::NotFound { .. } => "E004",
            Self::InvalidName { .. } => "E005",
            Self::Corrupted { .. } => "E006",
            Self::Lock { .. } => "E007",
            Self::OutOfMemory { .. } => "E101",
            Self::ShrinkNotSupported { .. } => "E102",
            Self::InvalidPointer { .. } => "E103",
            Self::PathNotFound { .. } => "E201",
            Self::StaleReference { .. } => "E202",
            Self::KeyNotFound { .. } => "E203",
            Self::IndexOutOfRange { .. } => "E204",
            Self::NotIndexable { .. } => "E205",
            Self::NotIterable { .. } => "E206",
            Self::InvalidKey { .. } => "E207",
            Self::TypeMismatch { .. } => "E301",
            Self::Codec { .. } => "E302",
            Self::Io(_) => "E901",
        }
    }

    /// Check if this error concerns the region itself (creation, mapping, locking).
    pub fn is_region_error(&self) -> bool {
        matches!(
            self,
            Self::RegionCreate { .. }
                | Self::RegionMap { .. }
                | Self::AlreadyExists { .. }
                | Self::NotFound { .. }
                | Self::InvalidName { .. }
                | Self::Corrupted { .. }
                | Self::Lock { .. }
        )
    }

    /// Check if this error was raised by the allocator.
    pub fn is_allocator_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfMemory { .. } | Self::ShrinkNotSupported { .. } | Self::InvalidPointer { .. }
        )
    }

    /// Check if this error was raised while following a path or key.
    pub fn is_navigation_error(&self) -> bool {
        matches!(
            self,
            Self::PathNotFound { .. }
                | Self::StaleReference { .. }
                | Self::KeyNotFound { .. }
                | Self::IndexOutOfRange { .. }
                | Self::NotIndexable { .. }
                | Self::NotIterable { .. }
                | Self::InvalidKey { .. }
        )
    }

    pub(crate) fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result type alias using `ShmError`.
pub type Result<T> = std::result::Result<T, ShmError>;

/// Extension trait for adding path context to errors.
pub trait ResultExt<T> {
    /// Report a failed step as `PathNotFound` for `path`.
    fn path_not_found(self, path: &str) -> Result<T>;

    /// Report a failed step as `StaleReference` for `path`.
    fn stale(self, path: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn path_not_found(self, path: &str) -> Result<T> {
        self.map_err(|e| match e {
            ShmError::PathNotFound { .. } => e,
            e if e.is_navigation_error() || matches!(e, ShmError::TypeMismatch { .. }) => {
                ShmError::PathNotFound {
                    path: path.to_string(),
                    cause: e.to_string(),
                }
            }
            e => e,
        })
    }

    fn stale(self, path: &str) -> Result<T> {
        self.map_err(|e| match e {
            ShmError::PathNotFound { cause, .. } => ShmError::StaleReference {
                path: path.to_string(),
                cause,
            },
            e => e,
        })
    }
}
