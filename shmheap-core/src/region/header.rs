//! Static header words at the start of every region.

use crate::types::HeapOffset;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Magic number for shmheap regions ("SHMHEAP\x01" little-endian).
pub const REGION_MAGIC: u64 = u64::from_le_bytes(*b"SHMHEAP\x01");

/// Current region layout version.
pub const REGION_VERSION: u32 = 1;

/// Size of the header words in bytes; also the minimum static capacity.
pub const HEADER_SIZE: usize = 48;

pub(crate) const STATIC_CAPACITY_AT: usize = 0;
pub(crate) const HEAP_CAPACITY_AT: usize = 8;
pub(crate) const FREE_HEAD_AT: usize = 16;
pub(crate) const ENTRANCE_AT: usize = 24;

/// Decoded view of the header words.
///
/// The live words are read and written in place by the allocator; this
/// struct is used for formatting a fresh region, validating on attach and
/// for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHeader {
    /// Static space capacity in bytes, header words included.
    pub static_capacity: u64,
    /// Heap capacity in bytes.
    pub heap_capacity: u64,
    /// First block of the free list.
    pub free_head: HeapOffset,
    /// Root object.
    pub entrance: HeapOffset,
    /// Magic number.
    pub magic: u64,
    /// Layout version.
    pub version: u32,
    /// Reserved flags.
    pub flags: u32,
}

impl RegionHeader {
    /// Header for a freshly formatted region.
    pub fn new(static_capacity: u64, heap_capacity: u64) -> Self {
        Self {
            static_capacity,
            heap_capacity,
            free_head: HeapOffset::NULL,
            entrance: HeapOffset::NULL,
            magic: REGION_MAGIC,
            version: REGION_VERSION,
            flags: 0,
        }
    }

    /// Total region length described by the header.
    pub fn total_len(&self) -> u64 {
        self.static_capacity + self.heap_capacity
    }

    /// Validate the header against the region file length.
    pub fn validate(&self, file_len: u64) -> Result<(), &'static str> {
        if self.magic != REGION_MAGIC {
            return Err("Invalid magic number");
        }
        if self.version != REGION_VERSION {
            return Err("Unsupported region version");
        }
        if self.static_capacity < HEADER_SIZE as u64 || self.static_capacity % 8 != 0 {
            return Err("Invalid static capacity");
        }
        if self.heap_capacity == 0 || self.heap_capacity % 8 != 0 {
            return Err("Invalid heap capacity");
        }
        if self.total_len() > file_len {
            return Err("Capacities exceed region length");
        }
        Ok(())
    }

    /// Read the header from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Buffer too small for header",
            ));
        }

        let mut cursor = io::Cursor::new(bytes);

        let static_capacity = cursor.read_u64::<LittleEndian>()?;
        let heap_capacity = cursor.read_u64::<LittleEndian>()?;
        let free_head = HeapOffset::new(cursor.read_u64::<LittleEndian>()?);
        let entrance = HeapOffset::new(cursor.read_u64::<LittleEndian>()?);
        let magic = cursor.read_u64::<LittleEndian>()?;
        let version = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            static_capacity,
            heap_capacity,
            free_head,
            entrance,
            magic,
            version,
            flags,
        })
    }

    /// Write the header to a byte buffer.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);

        buf.write_u64::<LittleEndian>(self.static_capacity)?;
        buf.write_u64::<LittleEndian>(self.heap_capacity)?;
        buf.write_u64::<LittleEndian>(self.free_head.as_u64())?;
        buf.write_u64::<LittleEndian>(self.entrance.as_u64())?;
        buf.write_u64::<LittleEndian>(self.magic)?;
        buf.write_u32::<LittleEndian>(self.version)?;
        buf.write_u32::<LittleEndian>(self.flags)?;

        debug_assert_eq!(buf.len(), HEADER_SIZE);

        Ok(buf)
    }
}
