//! Container Layout Manager
//!
//! Knows the group hierarchy an event container must have and brings a file
//! into that shape: creating it on first write-mode open, validating it on
//! every later open.
//!
//! ## Layout
//! ```text
//! /                       attrs: nDims, eventKind, description
//! ├── event_data/         attrs: version = "1.0", description
//! │   └── event_data      [recordCount, recordWidth]  f32 | f64
//! └── free_space/
//!     └── free_space_blocks  [N >= 2, 2]  u64 (position, length)
//! ```

use std::path::Path;

use tracing::{debug, info};

use crate::allocator::{FreeSpaceAllocator, MIN_PERSISTED_BLOCKS};
use crate::container::{Container, ElementType};
use crate::data_type::StorageConfig;
use crate::error::{Result, StoreError};

// =============================================================================
// Layout Constants
// =============================================================================

pub const ROOT_GROUP: &str = "/";
pub const ATTR_N_DIMS: &str = "nDims";
pub const ATTR_EVENT_KIND: &str = "eventKind";
pub const ATTR_DESCRIPTION: &str = "description";
pub const ATTR_VERSION: &str = "version";

pub const EVENT_GROUP: &str = "event_data";
pub const EVENT_DATASET: &str = "event_data/event_data";

/// Version of the event-data group this code reads and writes
pub const EVENT_DATA_VERSION: &str = "1.0";

pub const FREE_SPACE_GROUP: &str = "free_space";
pub const FREE_SPACE_DATASET: &str = "free_space/free_space_blocks";

/// Chunk size of the (small) free-space dataset
const FREE_SPACE_CHUNK: u64 = 1024;

/// A container brought into event-store shape
pub struct OpenedLayout {
    pub container: Container,
    /// Rows currently in the event array
    pub record_count: u64,
    /// Persisted free list; only loaded for write-mode opens
    pub free_space: Option<FreeSpaceAllocator>,
}

/// Create or open the container at `path` and validate its layout
///
/// Read-only opens never create anything: a missing file, event group or
/// event array is a file error.
pub fn create_or_open(
    path: &Path,
    storage: &StorageConfig,
    data_chunk: u64,
    read_only: bool,
) -> Result<OpenedLayout> {
    // Step 1: Open or create the file and check the root attributes
    let mut container = if path.is_file() {
        let mut container = Container::open(path, !read_only)?;
        check_root_attrs(&mut container, storage)?;
        info!(path = %path.display(), read_only, "opened event container");
        container
    } else if read_only {
        return Err(StoreError::file("Container does not exist", path));
    } else {
        let mut container = Container::create(path)?;
        write_root_attrs(&mut container, storage)?;
        info!(path = %path.display(), "created event container");
        container
    };

    // Step 2: Event data group, version gate first
    let record_count = open_event_data(&mut container, storage, data_chunk)?;

    // Step 3: Free space, write mode only
    let free_space = if read_only {
        None
    } else {
        Some(load_free_space(&mut container)?)
    };

    Ok(OpenedLayout {
        container,
        record_count,
        free_space,
    })
}

/// Persist the allocator's list, padding to the minimum size
pub fn write_free_space(container: &mut Container, allocator: &FreeSpaceAllocator) -> Result<()> {
    if !container.has_dataset(FREE_SPACE_DATASET) {
        create_free_space(container)?;
    }

    let flat = allocator.to_flat();
    container.resize_dataset(FREE_SPACE_DATASET, (flat.len() / 2) as u64)?;
    container.write_elements(FREE_SPACE_DATASET, 0, &flat)?;
    debug!(blocks = allocator.len(), "wrote free space list");
    Ok(())
}

// =============================================================================
// Private Helpers
// =============================================================================

fn write_root_attrs(container: &mut Container, storage: &StorageConfig) -> Result<()> {
    let format = storage.event_kind().format();
    container.set_attr(ROOT_GROUP, ATTR_N_DIMS, storage.n_dims() as u64)?;
    container.set_attr(ROOT_GROUP, ATTR_EVENT_KIND, format.name)?;
    container.set_attr(ROOT_GROUP, ATTR_DESCRIPTION, format.fields)?;
    Ok(())
}

fn check_root_attrs(container: &mut Container, storage: &StorageConfig) -> Result<()> {
    let stored_dims = container.attr(ROOT_GROUP, ATTR_N_DIMS).and_then(|v| v.as_u64());
    let stored_kind = container
        .attr(ROOT_GROUP, ATTR_EVENT_KIND)
        .and_then(|v| v.as_str())
        .map(str::to_string);

    match (stored_dims, stored_kind) {
        (Some(dims), Some(kind)) => {
            if dims != storage.n_dims() as u64 {
                return Err(StoreError::Layout(format!(
                    "{} holds {}-dimensional events, requested {}",
                    container.path().display(),
                    dims,
                    storage.n_dims()
                )));
            }
            if kind != storage.event_kind().name() {
                return Err(StoreError::Layout(format!(
                    "{} holds {} records, requested {}",
                    container.path().display(),
                    kind,
                    storage.event_kind()
                )));
            }
            Ok(())
        }
        // A bare container (no event layout yet) is adopted in write mode
        _ if container.is_writable() => write_root_attrs(container, storage),
        _ => Err(StoreError::file(
            "Container has no event layout attributes",
            container.path(),
        )),
    }
}

/// Open (validating the version) or create the event array; returns its row count
fn open_event_data(container: &mut Container, storage: &StorageConfig, data_chunk: u64) -> Result<u64> {
    let width = storage.record_width() as u64;

    if container.has_group(EVENT_GROUP) {
        let version = container
            .attr(EVENT_GROUP, ATTR_VERSION)
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if version != EVENT_DATA_VERSION {
            return Err(StoreError::file(
                format!(
                    "Event data version {:?} is not supported (expected {:?})",
                    version, EVENT_DATA_VERSION
                ),
                container.path(),
            ));
        }
    } else if container.is_writable() {
        container.create_group(EVENT_GROUP)?;
        container.set_attr(EVENT_GROUP, ATTR_VERSION, EVENT_DATA_VERSION)?;
        container.set_attr(EVENT_GROUP, ATTR_DESCRIPTION, storage.event_kind().format().fields)?;
    } else {
        return Err(StoreError::file("Container has no event data group", container.path()));
    }

    let info = match container.dataset_info(EVENT_DATASET) {
        Some(info) => info,
        None if container.is_writable() => {
            container.create_dataset(EVENT_DATASET, storage.element_type(), width, data_chunk)?;
            debug!(width, data_chunk, "created event array");
            return Ok(0);
        }
        None => {
            return Err(StoreError::file("Container has no event array", container.path()));
        }
    };

    if info.dtype != storage.element_type() {
        return Err(StoreError::Layout(format!(
            "{} stores {}-byte coordinates, configured for {}",
            container.path().display(),
            info.dtype.size(),
            storage.coord_size().bytes()
        )));
    }
    if info.cols != width {
        return Err(StoreError::Layout(format!(
            "{} stores {}-wide records, configured for {}",
            container.path().display(),
            info.cols,
            width
        )));
    }

    debug!(records = info.rows, "opened event array");
    Ok(info.rows)
}

fn create_free_space(container: &mut Container) -> Result<()> {
    if !container.has_group(FREE_SPACE_GROUP) {
        container.create_group(FREE_SPACE_GROUP)?;
    }
    container.create_dataset(FREE_SPACE_DATASET, ElementType::U64, 2, FREE_SPACE_CHUNK)?;
    container.resize_dataset(FREE_SPACE_DATASET, MIN_PERSISTED_BLOCKS as u64)?;
    Ok(())
}

fn load_free_space(container: &mut Container) -> Result<FreeSpaceAllocator> {
    let Some(info) = container.dataset_info(FREE_SPACE_DATASET) else {
        create_free_space(container)?;
        return Ok(FreeSpaceAllocator::new());
    };

    let flat: Vec<u64> = container.read_elements(FREE_SPACE_DATASET, 0, info.rows)?;
    let allocator = FreeSpaceAllocator::from_flat(&flat)?;
    debug!(blocks = allocator.len(), free = allocator.total_free(), "loaded free space list");
    Ok(allocator)
}
