//! Box Controller
//!
//! The single context every box of a box tree holds a handle to. It owns
//! the tree-wide settings and, when the workspace is file backed, the event
//! store the boxes persist through.
//!
//! Boxes hold an `Arc<BoxController>`; the controller never points back at
//! boxes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::io::{EventStore, OpenMode};

/// Shared configuration and storage handle for one box tree
pub struct BoxController {
    /// Dimensionality of every event in the tree
    n_dims: usize,

    /// Next box id to hand out (atomic, lock-free)
    next_id: AtomicU64,

    /// Store boxes are saved to; `None` while the tree lives in memory
    file_io: RwLock<Option<Arc<dyn EventStore>>>,
}

impl BoxController {
    pub fn new(n_dims: usize) -> Self {
        Self {
            n_dims,
            next_id: AtomicU64::new(0),
            file_io: RwLock::new(None),
        }
    }

    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    // =========================================================================
    // Box Ids
    // =========================================================================

    /// Claim one box id
    pub fn next_box_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Claim `count` consecutive ids; returns the first
    pub fn claim_box_ids(&self, count: u64) -> u64 {
        self.next_id.fetch_add(count, Ordering::SeqCst)
    }

    /// Highest id handed out so far plus one
    pub fn max_box_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Continue numbering after ids restored from a file
    pub fn set_max_box_id(&self, id: u64) {
        self.next_id.fetch_max(id, Ordering::SeqCst);
    }

    // =========================================================================
    // File Backing
    // =========================================================================

    /// Attach a store and open `name` on it for writing if it is not open yet
    pub fn set_file_backed(&self, store: Arc<dyn EventStore>, name: &str) -> Result<()> {
        let mut slot = self.file_io.write();
        if slot.is_some() {
            return Err(StoreError::Argument(
                "Box controller is already file backed".to_string(),
            ));
        }

        if !store.is_opened() {
            store.open_file(name, OpenMode::Write)?;
        }

        info!(file = ?store.file_name(), "box controller is now file backed");
        *slot = Some(store);
        Ok(())
    }

    pub fn is_file_backed(&self) -> bool {
        self.file_io.read().is_some()
    }

    /// Handle to the backing store, if any
    pub fn file_io(&self) -> Option<Arc<dyn EventStore>> {
        self.file_io.read().clone()
    }

    /// Detach the store, flushing and closing it
    pub fn clear_file_backed(&self) -> Result<()> {
        let Some(store) = self.file_io.write().take() else {
            return Ok(());
        };

        if store.is_opened() {
            store.flush_data()?;
            store.close_file()?;
        }
        Ok(())
    }
}
