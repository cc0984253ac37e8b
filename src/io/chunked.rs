//! Chunked container event store
//!
//! `EventStore` backed by a chunked container file laid out by the layout
//! manager.

use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::allocator::{FreeSpaceAllocator, FreeSpaceBlock};
use crate::config::StoreConfig;
use crate::container::{Container, ElementType};
use crate::data_type::{Coordinate, StorageConfig};
use crate::error::{Result, StoreError};
use crate::layout::{self, EVENT_DATASET};
use crate::path::{is_bare_filename, PathResolver, SearchPathResolver};

use super::{EventStore, OpenMode};

/// Event store over a chunked container file
///
/// ## Concurrency:
/// - All mutable state sits behind one `Mutex` (scoped guards only)
/// - Every public method takes the lock for its whole duration
/// - Safe to share via `Arc` between box-tree worker threads
pub struct ChunkedFileIo {
    /// Adapter configuration (chunking, save/search directories)
    config: StoreConfig,

    /// Name → path lookup used by `open_file`
    resolver: Box<dyn PathResolver>,

    /// Everything that changes after construction
    state: Mutex<IoState>,
}

struct IoState {
    storage: StorageConfig,
    session: Option<Session>,
}

/// One open container
struct Session {
    container: Container,
    /// Absolute path reported by `file_name`
    path: PathBuf,
    read_only: bool,
    /// Records in the event array (persisted length)
    file_length: u64,
    /// Empty and unused in read-only sessions
    allocator: FreeSpaceAllocator,
}

impl ChunkedFileIo {
    /// Create an adapter for `n_dims`-dimensional events
    pub fn new(n_dims: usize, config: StoreConfig) -> Self {
        let resolver = Box::new(SearchPathResolver::from_config(&config));
        Self::with_resolver(n_dims, config, resolver)
    }

    /// Create an adapter with a caller-supplied path resolver
    pub fn with_resolver(n_dims: usize, config: StoreConfig, resolver: Box<dyn PathResolver>) -> Self {
        Self {
            config,
            resolver,
            state: Mutex::new(IoState {
                storage: StorageConfig::new(n_dims),
                session: None,
            }),
        }
    }

    /// Current record layout
    pub fn storage_config(&self) -> StorageConfig {
        self.state.lock().storage
    }

    /// Primitives per record under the current layout
    pub fn record_width(&self) -> usize {
        self.state.lock().storage.record_width()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // Block I/O
    // =========================================================================

    /// Write the whole records in `records` starting at record `position`.
    ///
    /// The buffer precision must match the configured coordinate size.
    /// Writing past the persisted length extends it. A trailing partial
    /// record is not written.
    pub fn save_block<T: Coordinate>(&self, records: &[T], position: u64) -> Result<()> {
        let mut state = self.state.lock();
        let IoState { storage, session } = &mut *state;
        let session = writable_session(session)?;

        if T::TYPE != storage.element_type() {
            return Err(StoreError::NotImplemented(format!(
                "Saving {}-byte coordinates into a container of {}-byte coordinates",
                T::size(),
                storage.coord_size().bytes()
            )));
        }

        let width = storage.record_width();
        let n_records = (records.len() / width) as u64;
        if records.len() % width != 0 {
            warn!(
                values = records.len(),
                width,
                "block buffer has a trailing partial record; it is not written"
            );
        }
        if n_records == 0 {
            return Ok(());
        }

        let end = position.checked_add(n_records).ok_or_else(|| {
            StoreError::Argument(format!(
                "Block of {} records at {} overflows the event array",
                n_records, position
            ))
        })?;
        if end > session.file_length {
            session.container.resize_dataset(EVENT_DATASET, end)?;
            session.file_length = end;
        }

        let whole = &records[..n_records as usize * width];
        session.container.write_elements(EVENT_DATASET, position, whole)?;
        debug!(position, n_records, "saved block");
        Ok(())
    }

    /// Read `n_records` records at `position` into `out`.
    ///
    /// `out` is resized to `n_records * record_width`. A buffer of the other
    /// precision is filled by converting element-wise.
    pub fn load_block<T: Coordinate>(&self, out: &mut Vec<T>, position: u64, n_records: u64) -> Result<()> {
        let mut state = self.state.lock();
        let IoState { storage, session } = &mut *state;
        let session = open_session(session)?;

        let end = position.checked_add(n_records).unwrap_or(u64::MAX);
        if end > session.file_length {
            return Err(StoreError::file(
                format!(
                    "Read of records {}..{} past end of event data ({} records)",
                    position, end, session.file_length
                ),
                &session.path,
            ));
        }

        let values: Vec<T> = match storage.element_type() {
            ElementType::F32 => convert(session.container.read_elements::<f32>(EVENT_DATASET, position, n_records)?),
            ElementType::F64 => convert(session.container.read_elements::<f64>(EVENT_DATASET, position, n_records)?),
            ElementType::U64 => {
                return Err(StoreError::Layout("Event data must be floating point".to_string()));
            }
        };

        *out = values;
        debug!(position, n_records, "loaded block");
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Work out which file `name` refers to
    fn resolve(&self, name: &str, read_only: bool) -> Result<PathBuf> {
        if let Some(found) = self.resolver.find(name) {
            return Ok(found);
        }
        if read_only {
            return Err(StoreError::file("Cannot find container", name));
        }
        if is_bare_filename(name) {
            Ok(self.resolver.default_save_dir().join(name))
        } else {
            Ok(PathBuf::from(name))
        }
    }
}

impl EventStore for ChunkedFileIo {
    fn open_file(&self, name: &str, mode: OpenMode) -> Result<bool> {
        let mut state = self.state.lock();
        if let Some(session) = &state.session {
            warn!(open = %session.path.display(), requested = name, "container already open");
            return Ok(false);
        }

        let read_only = mode == OpenMode::Read;
        let path = self.resolve(name, read_only)?;
        let opened = layout::create_or_open(&path, &state.storage, self.config.data_chunk, read_only)?;

        let path = fs::canonicalize(&path)
            .map_err(|e| StoreError::file(format!("Cannot resolve absolute path ({})", e), &path))?;

        info!(
            path = %path.display(),
            %mode,
            records = opened.record_count,
            "opened event store"
        );

        state.session = Some(Session {
            container: opened.container,
            path,
            read_only,
            file_length: opened.record_count,
            allocator: opened.free_space.unwrap_or_default(),
        });
        Ok(true)
    }

    fn is_opened(&self) -> bool {
        self.state.lock().session.is_some()
    }

    fn file_name(&self) -> Option<PathBuf> {
        self.state.lock().session.as_ref().map(|s| s.path.clone())
    }

    fn save_block_f32(&self, records: &[f32], position: u64) -> Result<()> {
        self.save_block(records, position)
    }

    fn save_block_f64(&self, records: &[f64], position: u64) -> Result<()> {
        self.save_block(records, position)
    }

    fn load_block_f32(&self, out: &mut Vec<f32>, position: u64, n_records: u64) -> Result<()> {
        self.load_block(out, position, n_records)
    }

    fn load_block_f64(&self, out: &mut Vec<f64>, position: u64, n_records: u64) -> Result<()> {
        self.load_block(out, position, n_records)
    }

    fn flush_data(&self) -> Result<()> {
        let mut state = self.state.lock();
        let session = open_session(&mut state.session)?;

        if !session.read_only {
            layout::write_free_space(&mut session.container, &session.allocator)?;
        }
        session.container.flush()
    }

    fn close_file(&self) -> Result<()> {
        let mut state = self.state.lock();
        let Some(mut session) = state.session.take() else {
            return Ok(());
        };

        // The session is already detached: handles are released even if
        // persisting the free list fails
        let persisted = if session.read_only {
            Ok(())
        } else {
            layout::write_free_space(&mut session.container, &session.allocator)
        };
        let closed = session.container.close();

        info!(path = %session.path.display(), "closed event store");
        persisted.and(closed)
    }

    fn set_data_type(&self, coord_size: usize, event_kind: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(session) = &state.session {
            return Err(StoreError::Layout(format!(
                "Cannot change the data type while {} is open",
                session.path.display()
            )));
        }
        state.storage.set_data_type(coord_size, event_kind)
    }

    fn data_type(&self) -> (usize, &'static str) {
        self.state.lock().storage.data_type()
    }

    fn allocate(&self, n_records: u64) -> Result<u64> {
        let mut state = self.state.lock();
        let session = writable_session(&mut state.session)?;

        let mut file_length = session.file_length;
        let position = session.allocator.allocate(n_records, &mut file_length)?;

        if file_length > session.file_length {
            session.container.resize_dataset(EVENT_DATASET, file_length)?;
            session.file_length = file_length;
        }

        debug!(position, n_records, "allocated block");
        Ok(position)
    }

    fn free_block(&self, position: u64, n_records: u64) -> Result<()> {
        let mut state = self.state.lock();
        let session = writable_session(&mut state.session)?;

        if position.saturating_add(n_records) > session.file_length {
            return Err(StoreError::Argument(format!(
                "Free block {}+{} lies past end of event data ({} records)",
                position, n_records, session.file_length
            )));
        }
        session.allocator.free_block(position, n_records)
    }

    fn free_space_blocks(&self) -> Result<Vec<FreeSpaceBlock>> {
        let mut state = self.state.lock();
        Ok(open_session(&mut state.session)?.allocator.blocks())
    }

    fn file_length(&self) -> Result<u64> {
        let mut state = self.state.lock();
        Ok(open_session(&mut state.session)?.file_length)
    }
}

impl Drop for ChunkedFileIo {
    fn drop(&mut self) {
        if self.state.get_mut().session.is_some() {
            if let Err(e) = self.close_file() {
                warn!(error = %e, "failed to close event store on drop");
            }
        }
    }
}

fn open_session(session: &mut Option<Session>) -> Result<&mut Session> {
    session
        .as_mut()
        .ok_or_else(|| StoreError::file("No container is open", "<none>"))
}

fn writable_session(session: &mut Option<Session>) -> Result<&mut Session> {
    let session = open_session(session)?;
    if session.read_only {
        return Err(StoreError::file("Container is open read-only", &session.path));
    }
    Ok(session)
}

fn convert<S: Coordinate, T: Coordinate>(values: Vec<S>) -> Vec<T> {
    values.into_iter().map(|v| T::from_f64(v.to_f64())).collect()
}
