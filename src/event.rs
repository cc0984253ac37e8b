//! Event records
//!
//! Typed event values and their packing into the flat primitive buffers
//! exchanged with an [`EventStore`](crate::io::EventStore).

use crate::data_type::{Coordinate, EventKind};
use crate::error::{Result, StoreError};

/// Signal, squared error and coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct LeanEvent {
    pub signal: f32,
    pub error_squared: f32,
    pub coords: Vec<f64>,
}

/// Lean fields plus provenance: which run and which detector
#[derive(Debug, Clone, PartialEq)]
pub struct FatEvent {
    pub signal: f32,
    pub error_squared: f32,
    pub run_index: u16,
    pub detector_id: i32,
    pub coords: Vec<f64>,
}

/// A single stored data point
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    Lean(LeanEvent),
    Fat(FatEvent),
}

impl EventRecord {
    pub fn kind(&self) -> EventKind {
        match self {
            EventRecord::Lean(_) => EventKind::Lean,
            EventRecord::Fat(_) => EventKind::Fat,
        }
    }

    pub fn coords(&self) -> &[f64] {
        match self {
            EventRecord::Lean(e) => &e.coords,
            EventRecord::Fat(e) => &e.coords,
        }
    }

    /// Append this record's primitives to `out`
    fn pack_into<T: Coordinate>(&self, out: &mut Vec<T>) {
        match self {
            EventRecord::Lean(e) => {
                out.push(T::from_f64(e.signal as f64));
                out.push(T::from_f64(e.error_squared as f64));
            }
            EventRecord::Fat(e) => {
                out.push(T::from_f64(e.signal as f64));
                out.push(T::from_f64(e.error_squared as f64));
                out.push(T::from_f64(e.run_index as f64));
                out.push(T::from_f64(e.detector_id as f64));
            }
        }
        out.extend(self.coords().iter().map(|&c| T::from_f64(c)));
    }

    /// Rebuild one record from exactly `kind.record_width(n_dims)` primitives
    fn unpack<T: Coordinate>(kind: EventKind, fields: &[T]) -> Self {
        let value = |i: usize| fields[i].to_f64();
        match kind {
            EventKind::Lean => EventRecord::Lean(LeanEvent {
                signal: value(0) as f32,
                error_squared: value(1) as f32,
                coords: fields[2..].iter().map(|c| c.to_f64()).collect(),
            }),
            EventKind::Fat => EventRecord::Fat(FatEvent {
                signal: value(0) as f32,
                error_squared: value(1) as f32,
                run_index: value(2) as u16,
                detector_id: value(3) as i32,
                coords: fields[4..].iter().map(|c| c.to_f64()).collect(),
            }),
        }
    }
}

/// Pack records of one kind into a flat buffer ready for `save_block`
pub fn pack_events<T: Coordinate>(events: &[EventRecord], kind: EventKind, n_dims: usize) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(events.len() * kind.record_width(n_dims));
    for (i, event) in events.iter().enumerate() {
        if event.kind() != kind {
            return Err(StoreError::Argument(format!(
                "Event {} is a {}, expected {}",
                i,
                event.kind(),
                kind
            )));
        }
        if event.coords().len() != n_dims {
            return Err(StoreError::Argument(format!(
                "Event {} has {} coordinates, expected {}",
                i,
                event.coords().len(),
                n_dims
            )));
        }
        event.pack_into(&mut out);
    }
    Ok(out)
}

/// Unpack a flat buffer produced by `load_block`
pub fn unpack_events<T: Coordinate>(data: &[T], kind: EventKind, n_dims: usize) -> Result<Vec<EventRecord>> {
    let width = kind.record_width(n_dims);
    if data.len() % width != 0 {
        return Err(StoreError::Argument(format!(
            "Buffer of {} values is not a whole number of {}-wide records",
            data.len(),
            width
        )));
    }
    Ok(data
        .chunks_exact(width)
        .map(|fields| EventRecord::unpack(kind, fields))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fat(signal: f32, detector_id: i32) -> EventRecord {
        EventRecord::Fat(FatEvent {
            signal,
            error_squared: signal * 2.0,
            run_index: 3,
            detector_id,
            coords: vec![0.5, 1.5],
        })
    }

    #[test]
    fn test_fat_field_order() {
        let packed: Vec<f32> = pack_events(&[fat(1.0, 42)], EventKind::Fat, 2).unwrap();
        assert_eq!(packed, vec![1.0, 2.0, 3.0, 42.0, 0.5, 1.5]);
    }

    #[test]
    fn test_unpack_restores_records() {
        let events = vec![fat(1.0, 7), fat(4.0, -1)];
        let packed: Vec<f64> = pack_events(&events, EventKind::Fat, 2).unwrap();
        assert_eq!(unpack_events(&packed, EventKind::Fat, 2).unwrap(), events);
    }

    #[test]
    fn test_pack_rejects_wrong_kind_and_dims() {
        let lean = EventRecord::Lean(LeanEvent {
            signal: 1.0,
            error_squared: 1.0,
            coords: vec![0.0],
        });
        assert!(pack_events::<f32>(&[lean], EventKind::Fat, 1).is_err());
        assert!(pack_events::<f32>(&[fat(1.0, 1)], EventKind::Fat, 3).is_err());
    }

    #[test]
    fn test_unpack_rejects_partial_record() {
        let data = vec![0.0f32; 5];
        assert!(unpack_events(&data, EventKind::Lean, 2).is_err());
    }
}
