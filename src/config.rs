//! Configuration for mdevstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Default number of records per chunk of the event array
pub const DEFAULT_DATA_CHUNK: u64 = 10_000;

/// Main configuration for an event store adapter
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Container Configuration
    // -------------------------------------------------------------------------
    /// Records per chunk along the record axis of the event array.
    /// Only applied when the array is created; existing containers keep
    /// the chunking they were written with.
    pub data_chunk: u64,

    // -------------------------------------------------------------------------
    // Path Resolution
    // -------------------------------------------------------------------------
    /// Where bare filenames land when a container is created in write mode
    pub default_save_dir: PathBuf,

    /// Directories searched (in order) when a bare filename is opened
    pub search_dirs: Vec<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_chunk: DEFAULT_DATA_CHUNK,
            default_save_dir: PathBuf::from("."),
            search_dirs: Vec::new(),
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct ConfigBuilder {
    config: StoreConfig,
}

impl ConfigBuilder {
    /// Set the chunk granularity (records per chunk, minimum 1)
    pub fn data_chunk(mut self, records: u64) -> Self {
        self.config.data_chunk = records.max(1);
        self
    }

    /// Set the directory new containers are created in
    pub fn default_save_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.default_save_dir = path.into();
        self
    }

    /// Append a directory to the filename search path
    pub fn search_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.search_dirs.push(path.into());
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}
