//! # mdevstore
//!
//! Out-of-core storage for multidimensional event data:
//! - Fixed-width event records (lean or fat, 4- or 8-byte coordinates)
//! - Chunked, appendable binary container with a checksummed directory
//! - Block I/O adapter serialized by a single per-adapter lock
//! - Persisted free-space allocator for reusing obsolete extents
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Box Tree (caller)                         │
//! │             holds Arc<BoxController> per box                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   EventStore (Mutex)                         │
//! │       open / save / load / flush / close / allocate          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Layout    │          │ Free Space  │
//!   │   Manager   │          │  Allocator  │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │  Container  │
//!   │  (chunked)  │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod data_type;
pub mod event;
pub mod container;
pub mod allocator;
pub mod layout;
pub mod path;
pub mod io;
pub mod controller;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::StoreConfig;
pub use data_type::{CoordSize, EventKind, StorageConfig};
pub use allocator::{FreeSpaceAllocator, FreeSpaceBlock};
pub use io::{ChunkedFileIo, EventStore, OpenMode};
pub use controller::BoxController;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mdevstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
