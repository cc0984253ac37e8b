//! Container directory
//!
//! The in-memory group tree persisted at the end of the container file.
//! Paths are `/`-separated; empty components are ignored, so `""` and `"/"`
//! both name the root group.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{AttrValue, ElementType};

/// A group: attributes, child groups and datasets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct GroupNode {
    pub attrs: BTreeMap<String, AttrValue>,
    pub groups: BTreeMap<String, GroupNode>,
    pub datasets: BTreeMap<String, DatasetNode>,
}

/// A 2-D dataset chunked along the row axis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DatasetNode {
    pub dtype: ElementType,
    pub rows: u64,
    pub cols: u64,
    pub chunk_rows: u64,
    /// File offset of each chunk; `None` until first written
    pub chunks: Vec<Option<u64>>,
}

/// Shape and type of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetInfo {
    pub dtype: ElementType,
    pub rows: u64,
    pub cols: u64,
    pub chunk_rows: u64,
}

impl DatasetNode {
    pub fn new(dtype: ElementType, cols: u64, chunk_rows: u64) -> Self {
        Self {
            dtype,
            rows: 0,
            cols,
            chunk_rows,
            chunks: Vec::new(),
        }
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            dtype: self.dtype,
            rows: self.rows,
            cols: self.cols,
            chunk_rows: self.chunk_rows,
        }
    }

    /// Bytes in one row
    pub fn row_bytes(&self) -> u64 {
        self.cols * self.dtype.size() as u64
    }

    /// Bytes in one full chunk
    pub fn chunk_bytes(&self) -> u64 {
        self.chunk_rows * self.row_bytes()
    }

    /// Number of chunks needed to cover `rows`
    pub fn chunks_for(&self, rows: u64) -> usize {
        rows.div_ceil(self.chunk_rows) as usize
    }
}

/// Split a path into its non-empty components
pub(crate) fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Split a dataset path into (parent group path, dataset name)
pub(crate) fn split_dataset_path(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => Some((&trimmed[..idx], &trimmed[idx + 1..])).filter(|(_, n)| !n.is_empty()),
        None if !trimmed.is_empty() => Some(("", trimmed)),
        None => None,
    }
}

impl GroupNode {
    pub fn group(&self, path: &str) -> Option<&GroupNode> {
        components(path).try_fold(self, |node, name| node.groups.get(name))
    }

    pub fn group_mut(&mut self, path: &str) -> Option<&mut GroupNode> {
        components(path).try_fold(self, |node, name| node.groups.get_mut(name))
    }

    pub fn dataset(&self, path: &str) -> Option<&DatasetNode> {
        let (parent, name) = split_dataset_path(path)?;
        self.group(parent)?.datasets.get(name)
    }

    pub fn dataset_mut(&mut self, path: &str) -> Option<&mut DatasetNode> {
        let (parent, name) = split_dataset_path(path)?;
        self.group_mut(parent)?.datasets.get_mut(name)
    }

    /// Create every missing group along `path`; returns the leaf
    pub fn ensure_group(&mut self, path: &str) -> &mut GroupNode {
        components(path).fold(self, |node, name| node.groups.entry(name.to_string()).or_default())
    }
}
