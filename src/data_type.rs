//! Storage data type negotiation
//!
//! Describes how one event record is laid out on disk: how many dimensions,
//! whether coordinates are 4- or 8-byte floats, and which event kind is
//! stored. Together these fix the record width (primitives per record).
//!
//! ## Record Layout
//! ```text
//! LeanEvent: [signal][errorSquared][coord 0] ... [coord n-1]          (n + 2)
//! FatEvent:  [signal][errorSquared][runIndex][detectorId][coord 0] ... (n + 4)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::container::{Element, ElementType};
use crate::error::{Result, StoreError};

// =============================================================================
// Event Kinds
// =============================================================================

/// The two on-disk event record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Signal, squared error and coordinates
    Lean,
    /// Lean fields plus run index and detector id
    Fat,
}

/// Static description of one event kind
#[derive(Debug)]
pub struct EventFormat {
    pub kind: EventKind,
    /// Name written to the container's `eventKind` attribute
    pub name: &'static str,
    /// Human-readable field list written as the `description` attribute
    pub fields: &'static str,
    /// Primitives per record on top of the coordinates
    pub fixed_fields: usize,
}

static EVENT_FORMATS: [EventFormat; 2] = [
    EventFormat {
        kind: EventKind::Lean,
        name: "LeanEvent",
        fields: "signal, errorSquared, center (each dim.)",
        fixed_fields: 2,
    },
    EventFormat {
        kind: EventKind::Fat,
        name: "FatEvent",
        fields: "signal, errorSquared, runIndex, detectorId, center (each dim.)",
        fixed_fields: 4,
    },
];

/// All known event formats
pub fn event_formats() -> &'static [EventFormat] {
    &EVENT_FORMATS
}

impl EventKind {
    pub fn format(self) -> &'static EventFormat {
        match self {
            EventKind::Lean => &EVENT_FORMATS[0],
            EventKind::Fat => &EVENT_FORMATS[1],
        }
    }

    pub fn name(self) -> &'static str {
        self.format().name
    }

    /// Primitives per record for `n_dims` coordinates
    pub fn record_width(self, n_dims: usize) -> usize {
        n_dims + self.format().fixed_fields
    }
}

impl FromStr for EventKind {
    type Err = StoreError;

    fn from_str(name: &str) -> Result<Self> {
        event_formats()
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.kind)
            .ok_or_else(|| StoreError::Argument(format!("Unknown event kind: {:?}", name)))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Coordinate Precision
// =============================================================================

/// Width of a stored coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordSize {
    Single = 4,
    Double = 8,
}

impl CoordSize {
    pub fn bytes(self) -> usize {
        self as usize
    }

    pub fn element_type(self) -> ElementType {
        match self {
            CoordSize::Single => ElementType::F32,
            CoordSize::Double => ElementType::F64,
        }
    }
}

impl TryFrom<usize> for CoordSize {
    type Error = StoreError;

    fn try_from(bytes: usize) -> Result<Self> {
        match bytes {
            4 => Ok(CoordSize::Single),
            8 => Ok(CoordSize::Double),
            other => Err(StoreError::Argument(format!(
                "Unsupported coordinate size: {} (expected 4 or 8)",
                other
            ))),
        }
    }
}

/// Floating point types a block buffer can hold
pub trait Coordinate: Element + PartialEq + fmt::Debug {
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;

    /// Byte width of this type
    fn size() -> usize {
        Self::TYPE.size()
    }
}

impl Coordinate for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Coordinate for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

// =============================================================================
// Storage Config
// =============================================================================

/// Record layout for one container: dimensionality, precision and kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    n_dims: usize,
    coord_size: CoordSize,
    event_kind: EventKind,
}

impl StorageConfig {
    /// Default layout: 4-byte coordinates, fat events
    pub fn new(n_dims: usize) -> Self {
        Self {
            n_dims,
            coord_size: CoordSize::Single,
            event_kind: EventKind::Fat,
        }
    }

    /// Change precision and event kind. Leaves the config untouched on error.
    pub fn set_data_type(&mut self, coord_size: usize, event_kind: &str) -> Result<()> {
        let coord_size = CoordSize::try_from(coord_size)?;
        let event_kind = event_kind.parse::<EventKind>()?;
        self.coord_size = coord_size;
        self.event_kind = event_kind;
        Ok(())
    }

    /// `(coordSize, eventKindName)`
    pub fn data_type(&self) -> (usize, &'static str) {
        (self.coord_size.bytes(), self.event_kind.name())
    }

    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    pub fn coord_size(&self) -> CoordSize {
        self.coord_size
    }

    pub fn event_kind(&self) -> EventKind {
        self.event_kind
    }

    pub fn element_type(&self) -> ElementType {
        self.coord_size.element_type()
    }

    /// Primitives per stored record
    pub fn record_width(&self) -> usize {
        self.event_kind.record_width(self.n_dims)
    }
}
