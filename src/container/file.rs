//! Container file handle
//!
//! Opens/creates container files and performs row-level dataset I/O through
//! the chunk map.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, StoreError};

use super::directory::{split_dataset_path, DatasetInfo, DatasetNode, GroupNode};
use super::{decode, encode, AttrValue, Element, ElementType, FORMAT_VERSION, MAGIC, SUPERBLOCK_SIZE};

/// An open container file
///
/// Owns the file handle exclusively. The directory lives in memory and is
/// written back by `flush()` (and on drop, best effort).
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    file: File,
    writable: bool,
    root: GroupNode,
    /// End of the chunk region; the directory is written here
    data_end: u64,
    /// Directory changed since the last flush
    dirty: bool,
}

impl Container {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a new, empty container. Fails if the file already exists.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| io_to_file_error("Cannot create container", path, e))?;

        let mut container = Self {
            path: path.to_path_buf(),
            file,
            writable: true,
            root: GroupNode::default(),
            data_end: SUPERBLOCK_SIZE,
            dirty: true,
        };

        // Make the fresh file a valid container straight away
        container.flush()?;
        debug!(path = %path.display(), "created container");
        Ok(container)
    }

    /// Open an existing container, read-only or read/write
    pub fn open(path: &Path, writable: bool) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|e| io_to_file_error("Cannot open container", path, e))?;

        let file_size = file.metadata()?.len();
        if file_size < SUPERBLOCK_SIZE {
            return Err(StoreError::file("Not a container file (too short)", path));
        }

        // Read and validate superblock
        let mut header = [0u8; SUPERBLOCK_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(StoreError::file(
                format!("Invalid container magic {:?}", &header[0..4]),
                path,
            ));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != FORMAT_VERSION {
            return Err(StoreError::file(
                format!("Unsupported container format version {}", version),
                path,
            ));
        }

        let dir_offset = read_u64(&header[8..16]);
        let dir_len = read_u64(&header[16..24]);
        let dir_crc = u32::from_le_bytes([header[24], header[25], header[26], header[27]]);

        if dir_offset < SUPERBLOCK_SIZE || dir_offset.saturating_add(dir_len) > file_size {
            return Err(StoreError::file("Container directory out of bounds", path));
        }

        // Load directory and check it was fully written
        let mut dir_bytes = vec![0u8; dir_len as usize];
        file.seek(SeekFrom::Start(dir_offset))?;
        file.read_exact(&mut dir_bytes)?;

        if crc32fast::hash(&dir_bytes) != dir_crc {
            return Err(StoreError::file("Container directory checksum mismatch", path));
        }

        let root: GroupNode = bincode::deserialize(&dir_bytes)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            writable,
            root,
            data_end: dir_offset,
            dirty: false,
        })
    }

    /// Write the directory and superblock (if changed) and sync to disk
    pub fn flush(&mut self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }

        if self.dirty {
            let dir_bytes = bincode::serialize(&self.root)?;
            let dir_crc = crc32fast::hash(&dir_bytes);

            self.file.seek(SeekFrom::Start(self.data_end))?;
            self.file.write_all(&dir_bytes)?;
            self.file.set_len(self.data_end + dir_bytes.len() as u64)?;

            let mut header = [0u8; SUPERBLOCK_SIZE as usize];
            header[0..4].copy_from_slice(MAGIC);
            header[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
            header[8..16].copy_from_slice(&self.data_end.to_le_bytes());
            header[16..24].copy_from_slice(&(dir_bytes.len() as u64).to_le_bytes());
            header[24..28].copy_from_slice(&dir_crc.to_le_bytes());

            self.file.seek(SeekFrom::Start(0))?;
            self.file.write_all(&header)?;
            self.dirty = false;
        }

        self.file.sync_all()?;
        Ok(())
    }

    /// Flush and release the file handle
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    // =========================================================================
    // Groups and Attributes
    // =========================================================================

    pub fn has_group(&self, path: &str) -> bool {
        self.root.group(path).is_some()
    }

    /// Create a group (and any missing parents)
    pub fn create_group(&mut self, path: &str) -> Result<()> {
        self.check_writable()?;
        self.root.ensure_group(path);
        self.dirty = true;
        Ok(())
    }

    pub fn attr(&self, group: &str, name: &str) -> Option<&AttrValue> {
        self.root.group(group)?.attrs.get(name)
    }

    pub fn set_attr(&mut self, group: &str, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        self.check_writable()?;
        let node = self
            .root
            .group_mut(group)
            .ok_or_else(|| StoreError::file(format!("No group '{}'", group), &self.path))?;
        node.attrs.insert(name.to_string(), value.into());
        self.dirty = true;
        Ok(())
    }

    // =========================================================================
    // Datasets
    // =========================================================================

    pub fn has_dataset(&self, path: &str) -> bool {
        self.root.dataset(path).is_some()
    }

    pub fn dataset_info(&self, path: &str) -> Option<DatasetInfo> {
        self.root.dataset(path).map(DatasetNode::info)
    }

    /// Create an empty `[0, cols]` dataset inside an existing group
    pub fn create_dataset(
        &mut self,
        path: &str,
        dtype: ElementType,
        cols: u64,
        chunk_rows: u64,
    ) -> Result<()> {
        self.check_writable()?;
        if cols == 0 || chunk_rows == 0 {
            return Err(StoreError::Argument(format!(
                "Dataset '{}' needs at least one column and one row per chunk",
                path
            )));
        }

        let (parent, name) = split_dataset_path(path)
            .ok_or_else(|| StoreError::Argument(format!("Invalid dataset path '{}'", path)))?;
        let group = self
            .root
            .group_mut(parent)
            .ok_or_else(|| StoreError::file(format!("No group '{}'", parent), &self.path))?;

        if group.datasets.contains_key(name) {
            return Err(StoreError::file(format!("Dataset '{}' already exists", path), &self.path));
        }

        group
            .datasets
            .insert(name.to_string(), DatasetNode::new(dtype, cols, chunk_rows));
        self.dirty = true;
        Ok(())
    }

    /// Grow or shrink a dataset along the row axis.
    ///
    /// Rows added by growing read back as zeros until written.
    pub fn resize_dataset(&mut self, path: &str, rows: u64) -> Result<()> {
        self.check_writable()?;
        let Self { root, file, path: file_path, dirty, .. } = self;
        let ds = root
            .dataset_mut(path)
            .ok_or_else(|| StoreError::file(format!("No dataset '{}'", path), &*file_path))?;

        if rows < ds.rows {
            let keep = ds.chunks_for(rows);
            ds.chunks.truncate(keep);

            // Zero the dropped tail of the last kept chunk so regrowth reads
            // zeros. The table is sparse: it may end before that chunk.
            let tail_start = rows % ds.chunk_rows;
            if tail_start != 0 && ds.chunks.len() == keep {
                if let Some(Some(offset)) = ds.chunks.get(keep - 1).copied() {
                    let start = offset + tail_start * ds.row_bytes();
                    let len = (ds.chunk_rows - tail_start) * ds.row_bytes();
                    file.seek(SeekFrom::Start(start))?;
                    file.write_all(&vec![0u8; len as usize])?;
                }
            }
        }

        ds.rows = rows;
        *dirty = true;
        Ok(())
    }

    /// Write whole rows starting at `start_row`; the rows must already exist
    pub fn write_rows(&mut self, path: &str, start_row: u64, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        let Self { root, file, path: file_path, data_end, dirty, .. } = self;
        let ds = root
            .dataset_mut(path)
            .ok_or_else(|| StoreError::file(format!("No dataset '{}'", path), &*file_path))?;

        let row_bytes = ds.row_bytes();
        if data.len() as u64 % row_bytes != 0 {
            return Err(StoreError::Argument(format!(
                "Write of {} bytes is not a whole number of {}-byte rows",
                data.len(),
                row_bytes
            )));
        }

        let n_rows = data.len() as u64 / row_bytes;
        let end_row = start_row.saturating_add(n_rows);
        if end_row > ds.rows {
            return Err(StoreError::file(
                format!("Write of rows {}..{} past end of '{}' ({} rows)", start_row, end_row, path, ds.rows),
                &*file_path,
            ));
        }

        let chunk_bytes = ds.chunk_bytes();
        let mut row = start_row;
        let mut consumed = 0usize;

        while row < end_row {
            let chunk_idx = (row / ds.chunk_rows) as usize;
            let row_in_chunk = row % ds.chunk_rows;
            let take = (ds.chunk_rows - row_in_chunk).min(end_row - row);

            if ds.chunks.len() <= chunk_idx {
                ds.chunks.resize(chunk_idx + 1, None);
            }

            let chunk_offset = match ds.chunks[chunk_idx] {
                Some(offset) => offset,
                None => {
                    // New chunk goes where the directory was; two set_len
                    // calls give a zero-filled extent. The superblock still
                    // points at the overwritten directory until the next
                    // flush, so an unclean exit before then leaves the file
                    // unreadable.
                    let offset = *data_end;
                    file.set_len(offset)?;
                    file.set_len(offset + chunk_bytes)?;
                    *data_end += chunk_bytes;
                    ds.chunks[chunk_idx] = Some(offset);
                    *dirty = true;
                    offset
                }
            };

            let len = (take * row_bytes) as usize;
            file.seek(SeekFrom::Start(chunk_offset + row_in_chunk * row_bytes))?;
            file.write_all(&data[consumed..consumed + len])?;

            consumed += len;
            row += take;
        }

        Ok(())
    }

    /// Read `n_rows` rows starting at `start_row`
    pub fn read_rows(&mut self, path: &str, start_row: u64, n_rows: u64) -> Result<Vec<u8>> {
        let Self { root, file, path: file_path, .. } = self;
        let ds = root
            .dataset(path)
            .ok_or_else(|| StoreError::file(format!("No dataset '{}'", path), &*file_path))?;

        let end_row = start_row.saturating_add(n_rows);
        if end_row > ds.rows {
            return Err(StoreError::file(
                format!("Read of rows {}..{} past end of '{}' ({} rows)", start_row, end_row, path, ds.rows),
                &*file_path,
            ));
        }

        let row_bytes = ds.row_bytes();
        let mut out = vec![0u8; (n_rows * row_bytes) as usize];
        let mut row = start_row;
        let mut filled = 0usize;

        while row < end_row {
            let chunk_idx = (row / ds.chunk_rows) as usize;
            let row_in_chunk = row % ds.chunk_rows;
            let take = (ds.chunk_rows - row_in_chunk).min(end_row - row);
            let len = (take * row_bytes) as usize;

            // Unallocated chunks stay zero
            if let Some(Some(offset)) = ds.chunks.get(chunk_idx) {
                file.seek(SeekFrom::Start(offset + row_in_chunk * row_bytes))?;
                file.read_exact(&mut out[filled..filled + len])?;
            }

            filled += len;
            row += take;
        }

        Ok(out)
    }

    // =========================================================================
    // Typed Dataset I/O
    // =========================================================================

    /// Write elements as rows; the element type must match the dataset's
    pub fn write_elements<T: Element>(&mut self, path: &str, start_row: u64, values: &[T]) -> Result<()> {
        self.check_element_type::<T>(path)?;
        self.write_rows(path, start_row, &encode(values))
    }

    /// Read rows as elements; the element type must match the dataset's
    pub fn read_elements<T: Element>(&mut self, path: &str, start_row: u64, n_rows: u64) -> Result<Vec<T>> {
        self.check_element_type::<T>(path)?;
        let bytes = self.read_rows(path, start_row, n_rows)?;
        Ok(decode(&bytes))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StoreError::file("Container is open read-only", &self.path))
        }
    }

    fn check_element_type<T: Element>(&self, path: &str) -> Result<()> {
        let info = self
            .dataset_info(path)
            .ok_or_else(|| StoreError::file(format!("No dataset '{}'", path), &self.path))?;
        if info.dtype != T::TYPE {
            return Err(StoreError::Layout(format!(
                "Dataset '{}' holds {:?}, not {:?}",
                path,
                info.dtype,
                T::TYPE
            )));
        }
        Ok(())
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.writable && self.dirty {
            if let Err(e) = self.flush() {
                warn!(path = %self.path.display(), error = %e, "failed to flush container on drop");
            }
        }
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

fn io_to_file_error(context: &str, path: &Path, e: io::Error) -> StoreError {
    let reason = match e.kind() {
        io::ErrorKind::NotFound => "file not found".to_string(),
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        io::ErrorKind::AlreadyExists => "file already exists".to_string(),
        _ => e.to_string(),
    };
    StoreError::file(format!("{} ({})", context, reason), path)
}
