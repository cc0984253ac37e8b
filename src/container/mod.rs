//! Chunked Container Module
//!
//! A small self-describing binary container: a tree of named groups carrying
//! attributes, and extensible 2-D datasets stored as fixed-size chunks along
//! the row axis.
//!
//! ## Responsibilities
//! - Group hierarchy with string/integer attributes
//! - Extensible chunked datasets (grow/shrink along axis 0)
//! - Lazy chunk allocation (unwritten rows read back as zeros)
//! - Checksummed directory so a torn or foreign file is rejected on open
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Superblock (32 bytes)                                   │
//! │   Magic: "MDEC" (4) | Format: u16 (2) | Reserved (2)    │
//! │   DirOffset: u64 (8) | DirLen: u64 (8)                  │
//! │   DirCRC: u32 (4) | Padding (4)                         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Chunk Region (variable)                                 │
//! │   chunk_rows * cols * element_size bytes per chunk      │
//! │   ... allocated in write order, any dataset ...         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Directory (variable, starts at DirOffset)               │
//! │   bincode(GroupNode) - attributes, datasets, chunk map  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The directory always sits right after the last chunk. Allocating a new
//! chunk reuses the directory's bytes; the directory is rewritten on flush.

mod directory;
mod file;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

pub use directory::DatasetInfo;
pub use file::Container;

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying a container file
pub(crate) const MAGIC: &[u8; 4] = b"MDEC";

/// Current container format version
pub(crate) const FORMAT_VERSION: u16 = 1;

/// Superblock size in bytes
pub(crate) const SUPERBLOCK_SIZE: u64 = 32;

// =============================================================================
// Element Types
// =============================================================================

/// Primitive stored in a dataset cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    F32,
    F64,
    U64,
}

impl ElementType {
    /// Size of one element in bytes
    pub fn size(self) -> usize {
        match self {
            ElementType::F32 => 4,
            ElementType::F64 | ElementType::U64 => 8,
        }
    }
}

/// A primitive that can be stored in a dataset (little-endian on disk)
pub trait Element: Copy + Default + Send + Sync + 'static {
    const TYPE: ElementType;

    fn put(self, buf: &mut BytesMut);
    fn get(buf: &mut &[u8]) -> Self;
}

impl Element for f32 {
    const TYPE: ElementType = ElementType::F32;

    fn put(self, buf: &mut BytesMut) {
        buf.put_f32_le(self);
    }

    fn get(buf: &mut &[u8]) -> Self {
        buf.get_f32_le()
    }
}

impl Element for f64 {
    const TYPE: ElementType = ElementType::F64;

    fn put(self, buf: &mut BytesMut) {
        buf.put_f64_le(self);
    }

    fn get(buf: &mut &[u8]) -> Self {
        buf.get_f64_le()
    }
}

impl Element for u64 {
    const TYPE: ElementType = ElementType::U64;

    fn put(self, buf: &mut BytesMut) {
        buf.put_u64_le(self);
    }

    fn get(buf: &mut &[u8]) -> Self {
        buf.get_u64_le()
    }
}

/// Encode a slice of elements to little-endian bytes
pub fn encode<T: Element>(values: &[T]) -> Bytes {
    let mut buf = BytesMut::with_capacity(values.len() * T::TYPE.size());
    for v in values {
        v.put(&mut buf);
    }
    buf.freeze()
}

/// Decode little-endian bytes into elements (trailing partial element ignored)
pub fn decode<T: Element>(bytes: &[u8]) -> Vec<T> {
    let size = T::TYPE.size();
    let mut cursor = bytes;
    let mut out = Vec::with_capacity(bytes.len() / size);
    while cursor.remaining() >= size {
        out.push(T::get(&mut cursor));
    }
    out
}

// =============================================================================
// Attributes
// =============================================================================

/// Attribute value attached to a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    UInt(u64),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            AttrValue::UInt(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttrValue::UInt(v) => Some(*v),
            AttrValue::Str(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::UInt(v)
    }
}
