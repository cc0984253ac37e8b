//! Free-Space Allocator
//!
//! Tracks reclaimed extents of the event array so new blocks can reuse them
//! instead of growing the file.
//!
//! ## Responsibilities
//! - Record extents the box tree no longer needs (`free_block`)
//! - Hand out positions for new blocks (`allocate`), first-fit by position
//! - Coalesce neighbouring free extents
//! - Flatten to / rebuild from the persisted `[N, 2]` pair list
//!
//! Positions and lengths are in records, not bytes.

use std::collections::BTreeMap;

use crate::error::{Result, StoreError};

/// Minimum number of pairs in the persisted free-space list
pub const MIN_PERSISTED_BLOCKS: usize = 2;

/// A contiguous extent of records in the event array
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FreeSpaceBlock {
    pub position: u64,
    pub length: u64,
}

impl FreeSpaceBlock {
    pub fn new(position: u64, length: u64) -> Self {
        Self { position, length }
    }

    /// One past the last record of the extent (saturating at `u64::MAX`)
    pub fn end(&self) -> u64 {
        self.position.saturating_add(self.length)
    }
}

/// In-memory free list, keyed by position
#[derive(Debug, Default, Clone)]
pub struct FreeSpaceAllocator {
    /// position → length; entries never overlap or touch
    blocks: BTreeMap<u64, u64>,
}

impl FreeSpaceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return an extent to the free list, merging with touching neighbours.
    ///
    /// Zero-length extents are ignored. Overlapping an extent that is
    /// already free is an error and leaves the list unchanged.
    pub fn free_block(&mut self, position: u64, length: u64) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        let end = position.checked_add(length).ok_or_else(|| {
            StoreError::Argument(format!("Free block {}+{} overflows", position, length))
        })?;

        let before = self
            .blocks
            .range(..=position)
            .next_back()
            .map(|(&p, &l)| FreeSpaceBlock::new(p, l));
        let after = self
            .blocks
            .range(position..)
            .next()
            .map(|(&p, &l)| FreeSpaceBlock::new(p, l));

        if let Some(b) = before {
            if b.end() > position {
                return Err(overlap_error(position, length, b));
            }
        }
        if let Some(a) = after {
            if a.position < end {
                return Err(overlap_error(position, length, a));
            }
        }

        let mut merged = FreeSpaceBlock::new(position, length);

        if let Some(b) = before.filter(|b| b.end() == position) {
            self.blocks.remove(&b.position);
            merged = FreeSpaceBlock::new(b.position, merged.length + b.length);
        }
        if let Some(a) = after.filter(|a| a.position == end) {
            self.blocks.remove(&a.position);
            merged.length += a.length;
        }

        self.blocks.insert(merged.position, merged.length);
        Ok(())
    }

    /// Find room for `length` records.
    ///
    /// Takes the lowest-positioned free extent that fits, shrinking it from
    /// the front (or removing it on an exact fit). With no fit, the block is
    /// placed at `file_length` and `file_length` is advanced past it; if
    /// that would overflow, nothing changes and an error is returned.
    pub fn allocate(&mut self, length: u64, file_length: &mut u64) -> Result<u64> {
        if length == 0 {
            return Ok(*file_length);
        }

        let fit = self
            .blocks
            .iter()
            .find(|(_, &l)| l >= length)
            .map(|(&p, &l)| (p, l));

        match fit {
            Some((position, available)) => {
                self.blocks.remove(&position);
                if available > length {
                    self.blocks.insert(position + length, available - length);
                }
                Ok(position)
            }
            None => {
                let position = *file_length;
                *file_length = position.checked_add(length).ok_or_else(|| {
                    StoreError::Argument(format!(
                        "Allocating {} records past {} overflows the event array",
                        length, position
                    ))
                })?;
                Ok(position)
            }
        }
    }

    /// Current free extents in position order
    pub fn blocks(&self) -> Vec<FreeSpaceBlock> {
        self.blocks
            .iter()
            .map(|(&p, &l)| FreeSpaceBlock::new(p, l))
            .collect()
    }

    /// Number of free extents
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total free records across all extents
    pub fn total_free(&self) -> u64 {
        self.blocks.values().sum()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    // =========================================================================
    // Persistence Format
    // =========================================================================

    /// Flatten to `[pos0, len0, pos1, len1, ...]`, padded with `(0, 0)` pairs
    /// up to the minimum persisted size
    pub fn to_flat(&self) -> Vec<u64> {
        let pairs = self.blocks.len().max(MIN_PERSISTED_BLOCKS);
        let mut flat = Vec::with_capacity(pairs * 2);
        for (&p, &l) in &self.blocks {
            flat.push(p);
            flat.push(l);
        }
        flat.resize(pairs * 2, 0);
        flat
    }

    /// Rebuild from a flat pair list; zero-length padding pairs are dropped
    pub fn from_flat(flat: &[u64]) -> Result<Self> {
        if flat.len() % 2 != 0 {
            return Err(StoreError::Argument(format!(
                "Free space list has odd length {}",
                flat.len()
            )));
        }

        let mut allocator = Self::new();
        for pair in flat.chunks_exact(2) {
            allocator.free_block(pair[0], pair[1])?;
        }
        Ok(allocator)
    }
}

fn overlap_error(position: u64, length: u64, existing: FreeSpaceBlock) -> StoreError {
    StoreError::Argument(format!(
        "Free block {}+{} overlaps free block {}+{}",
        position, length, existing.position, existing.length
    ))
}
