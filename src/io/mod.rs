//! Event Store I/O Module
//!
//! The contract a box tree uses to persist blocks of event records, and the
//! chunked-container implementation of it.
//!
//! ## Responsibilities
//! - Open/create containers through the layout manager
//! - Save/load fixed-width record blocks addressed in records
//! - Negotiate the record layout (precision + event kind)
//! - Place new blocks using the free-space allocator
//!
//! ## Concurrency Model
//! One mutex per adapter. Every operation holds it for its full duration,
//! so callers on different threads are serialized, never interleaved.

mod chunked;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::allocator::FreeSpaceBlock;
use crate::error::{Result, StoreError};

pub use chunked::ChunkedFileIo;

/// How a container is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `"r"`: existing container, no writes
    Read,
    /// `"w"`: create if absent, otherwise open read/write
    Write,
}

impl FromStr for OpenMode {
    type Err = StoreError;

    fn from_str(mode: &str) -> Result<Self> {
        match mode {
            "r" => Ok(OpenMode::Read),
            "w" => Ok(OpenMode::Write),
            other => Err(StoreError::Argument(format!(
                "Unknown open mode {:?} (expected \"r\" or \"w\")",
                other
            ))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Read => f.write_str("r"),
            OpenMode::Write => f.write_str("w"),
        }
    }
}

/// Storage-engine contract consumed by the box tree
///
/// Every method except `open_file`, `is_opened`, `set_data_type` and
/// `data_type` fails with a file error when no container is open.
pub trait EventStore: Send + Sync {
    /// Open or create a container. Returns `false` (and changes nothing)
    /// if a container is already open.
    fn open_file(&self, name: &str, mode: OpenMode) -> Result<bool>;

    fn is_opened(&self) -> bool;

    /// Absolute path of the open container
    fn file_name(&self) -> Option<PathBuf>;

    /// Write whole records of a 4-byte-coordinate buffer at `position`
    fn save_block_f32(&self, records: &[f32], position: u64) -> Result<()>;

    /// Write whole records of an 8-byte-coordinate buffer at `position`
    fn save_block_f64(&self, records: &[f64], position: u64) -> Result<()>;

    /// Read `n_records` records at `position` into `out` (resized to fit)
    fn load_block_f32(&self, out: &mut Vec<f32>, position: u64, n_records: u64) -> Result<()>;

    fn load_block_f64(&self, out: &mut Vec<f64>, position: u64, n_records: u64) -> Result<()>;

    /// Persist the free list (write mode) and push writes to the medium
    fn flush_data(&self) -> Result<()>;

    /// Release the container; no-op when already closed
    fn close_file(&self) -> Result<()>;

    /// Set coordinate size (4 or 8) and event kind name; only while closed
    fn set_data_type(&self, coord_size: usize, event_kind: &str) -> Result<()>;

    /// `(coordSize, eventKindName)`
    fn data_type(&self) -> (usize, &'static str);

    /// Reserve room for `n_records`, reusing free space when possible
    fn allocate(&self, n_records: u64) -> Result<u64>;

    /// Return an obsolete extent to the free list
    fn free_block(&self, position: u64, n_records: u64) -> Result<()>;

    fn free_space_blocks(&self) -> Result<Vec<FreeSpaceBlock>>;

    /// Records currently in the event array
    fn file_length(&self) -> Result<u64>;
}
