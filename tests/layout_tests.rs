//! Tests for the container layout manager
//!
//! These tests verify:
//! - Creation of the group hierarchy and root attributes
//! - Version gating of the event data group
//! - Dimensionality / precision validation on reopen
//! - Free space loading (write mode only) and lazy creation

use std::path::PathBuf;

use mdevstore::allocator::FreeSpaceAllocator;
use mdevstore::container::{Container, ElementType};
use mdevstore::layout::{
    create_or_open, write_free_space, ATTR_DESCRIPTION, ATTR_EVENT_KIND, ATTR_N_DIMS, ATTR_VERSION,
    EVENT_DATASET, EVENT_DATA_VERSION, EVENT_GROUP, FREE_SPACE_DATASET, FREE_SPACE_GROUP, ROOT_GROUP,
};
use mdevstore::{FreeSpaceBlock, StorageConfig, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("layout.mdc");
    (temp_dir, path)
}

fn fat_f32(n_dims: usize) -> StorageConfig {
    StorageConfig::new(n_dims)
}

fn lean_f64(n_dims: usize) -> StorageConfig {
    let mut storage = StorageConfig::new(n_dims);
    storage.set_data_type(8, "LeanEvent").unwrap();
    storage
}

// =============================================================================
// Creation Tests
// =============================================================================

#[test]
fn test_read_only_missing_file_fails() {
    let (_temp, path) = setup_temp_path();

    let result = create_or_open(&path, &fat_f32(3), 100, true);

    assert!(result.err().unwrap().is_file_error());
    assert!(!path.exists());
}

#[test]
fn test_create_writes_layout() {
    let (_temp, path) = setup_temp_path();

    let opened = create_or_open(&path, &fat_f32(3), 500, false).unwrap();
    let container = &opened.container;

    assert_eq!(opened.record_count, 0);
    assert!(opened.free_space.unwrap().is_empty());

    assert_eq!(container.attr(ROOT_GROUP, ATTR_N_DIMS).and_then(|v| v.as_u64()), Some(3));
    assert_eq!(
        container.attr(ROOT_GROUP, ATTR_EVENT_KIND).and_then(|v| v.as_str()),
        Some("FatEvent")
    );
    assert!(container
        .attr(ROOT_GROUP, ATTR_DESCRIPTION)
        .and_then(|v| v.as_str())
        .unwrap()
        .contains("detectorId"));
    assert_eq!(
        container.attr(EVENT_GROUP, ATTR_VERSION).and_then(|v| v.as_str()),
        Some(EVENT_DATA_VERSION)
    );

    let events = container.dataset_info(EVENT_DATASET).unwrap();
    assert_eq!(events.dtype, ElementType::F32);
    assert_eq!((events.rows, events.cols, events.chunk_rows), (0, 7, 500));

    assert!(container.has_group(FREE_SPACE_GROUP));
    let free = container.dataset_info(FREE_SPACE_DATASET).unwrap();
    assert_eq!((free.rows, free.cols), (2, 2));
}

#[test]
fn test_lean_double_layout() {
    let (_temp, path) = setup_temp_path();

    let opened = create_or_open(&path, &lean_f64(2), 10, false).unwrap();

    let events = opened.container.dataset_info(EVENT_DATASET).unwrap();
    assert_eq!(events.dtype, ElementType::F64);
    assert_eq!(events.cols, 4);
    assert_eq!(
        opened.container.attr(EVENT_GROUP, ATTR_DESCRIPTION).and_then(|v| v.as_str()),
        Some("signal, errorSquared, center (each dim.)")
    );
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_reports_record_count() {
    let (_temp, path) = setup_temp_path();
    {
        let mut opened = create_or_open(&path, &fat_f32(1), 10, false).unwrap();
        opened.container.resize_dataset(EVENT_DATASET, 1).unwrap();
        opened.container.close().unwrap();
    }

    let opened = create_or_open(&path, &fat_f32(1), 10, true).unwrap();

    assert_eq!(opened.record_count, 1);
    assert!(opened.free_space.is_none());
}

#[test]
fn test_empty_and_single_record_distinguishable() {
    let (_temp, path) = setup_temp_path();
    create_or_open(&path, &fat_f32(1), 10, false)
        .unwrap()
        .container
        .close()
        .unwrap();

    let opened = create_or_open(&path, &fat_f32(1), 10, true).unwrap();

    assert_eq!(opened.record_count, 0);
}

#[test]
fn test_chunking_kept_on_reopen() {
    let (_temp, path) = setup_temp_path();
    create_or_open(&path, &fat_f32(2), 64, false)
        .unwrap()
        .container
        .close()
        .unwrap();

    let opened = create_or_open(&path, &fat_f32(2), 9999, false).unwrap();

    assert_eq!(opened.container.dataset_info(EVENT_DATASET).unwrap().chunk_rows, 64);
}

#[test]
fn test_version_mismatch_is_file_error() {
    let (_temp, path) = setup_temp_path();
    {
        let mut opened = create_or_open(&path, &fat_f32(2), 10, false).unwrap();
        opened.container.set_attr(EVENT_GROUP, ATTR_VERSION, "0.9").unwrap();
        opened.container.close().unwrap();
    }

    let result = create_or_open(&path, &fat_f32(2), 10, false);

    assert!(result.err().unwrap().is_file_error());
}

#[test]
fn test_missing_version_is_file_error() {
    let (_temp, path) = setup_temp_path();
    {
        let mut container = Container::create(&path).unwrap();
        container.set_attr(ROOT_GROUP, ATTR_N_DIMS, 2u64).unwrap();
        container.set_attr(ROOT_GROUP, ATTR_EVENT_KIND, "FatEvent").unwrap();
        container.create_group(EVENT_GROUP).unwrap();
        container.close().unwrap();
    }

    let result = create_or_open(&path, &fat_f32(2), 10, true);

    assert!(result.err().unwrap().is_file_error());
}

#[test]
fn test_dimension_mismatch_is_layout_error() {
    let (_temp, path) = setup_temp_path();
    create_or_open(&path, &fat_f32(4), 10, false)
        .unwrap()
        .container
        .close()
        .unwrap();

    let result = create_or_open(&path, &fat_f32(3), 10, false);

    assert!(matches!(result, Err(StoreError::Layout(_))));
}

#[test]
fn test_precision_mismatch_is_layout_error() {
    let (_temp, path) = setup_temp_path();
    create_or_open(&path, &fat_f32(2), 10, false)
        .unwrap()
        .container
        .close()
        .unwrap();

    let mut double = StorageConfig::new(2);
    double.set_data_type(8, "FatEvent").unwrap();
    let result = create_or_open(&path, &double, 10, true);

    assert!(matches!(result, Err(StoreError::Layout(_))));
}

#[test]
fn test_bare_container_adopted_in_write_mode() {
    let (_temp, path) = setup_temp_path();
    Container::create(&path).unwrap().close().unwrap();

    let opened = create_or_open(&path, &fat_f32(2), 10, false).unwrap();

    assert!(opened.container.has_dataset(EVENT_DATASET));
    assert_eq!(
        opened.container.attr(ROOT_GROUP, ATTR_N_DIMS).and_then(|v| v.as_u64()),
        Some(2)
    );
}

#[test]
fn test_bare_container_rejected_read_only() {
    let (_temp, path) = setup_temp_path();
    Container::create(&path).unwrap().close().unwrap();

    let result = create_or_open(&path, &fat_f32(2), 10, true);

    assert!(result.err().unwrap().is_file_error());
}

// =============================================================================
// Free Space Tests
// =============================================================================

#[test]
fn test_free_space_round_trip() {
    let (_temp, path) = setup_temp_path();
    {
        let mut opened = create_or_open(&path, &fat_f32(2), 10, false).unwrap();
        let alloc = FreeSpaceAllocator::from_flat(&[3, 4, 10, 2, 40, 8]).unwrap();
        write_free_space(&mut opened.container, &alloc).unwrap();
        opened.container.close().unwrap();
    }

    let opened = create_or_open(&path, &fat_f32(2), 10, false).unwrap();

    assert_eq!(
        opened.free_space.unwrap().blocks(),
        vec![
            FreeSpaceBlock::new(3, 4),
            FreeSpaceBlock::new(10, 2),
            FreeSpaceBlock::new(40, 8),
        ]
    );
}

#[test]
fn test_free_space_shrinks_to_minimum() {
    let (_temp, path) = setup_temp_path();
    let mut opened = create_or_open(&path, &fat_f32(2), 10, false).unwrap();

    let big = FreeSpaceAllocator::from_flat(&[0, 1, 5, 1, 9, 1, 20, 1]).unwrap();
    write_free_space(&mut opened.container, &big).unwrap();
    write_free_space(&mut opened.container, &FreeSpaceAllocator::new()).unwrap();

    let info = opened.container.dataset_info(FREE_SPACE_DATASET).unwrap();
    assert_eq!(info.rows, 2);
    let flat: Vec<u64> = opened.container.read_elements(FREE_SPACE_DATASET, 0, 2).unwrap();
    assert_eq!(flat, vec![0, 0, 0, 0]);
}

#[test]
fn test_missing_free_space_created_lazily() {
    let (_temp, path) = setup_temp_path();
    {
        let mut container = Container::create(&path).unwrap();
        container.set_attr(ROOT_GROUP, ATTR_N_DIMS, 2u64).unwrap();
        container.set_attr(ROOT_GROUP, ATTR_EVENT_KIND, "FatEvent").unwrap();
        container.create_group(EVENT_GROUP).unwrap();
        container.set_attr(EVENT_GROUP, ATTR_VERSION, EVENT_DATA_VERSION).unwrap();
        container.create_dataset(EVENT_DATASET, ElementType::F32, 6, 10).unwrap();
        container.close().unwrap();
    }

    let read_only = create_or_open(&path, &fat_f32(2), 10, true).unwrap();
    assert!(!read_only.container.has_group(FREE_SPACE_GROUP));
    drop(read_only);

    let writable = create_or_open(&path, &fat_f32(2), 10, false).unwrap();
    assert!(writable.free_space.unwrap().is_empty());
    assert_eq!(writable.container.dataset_info(FREE_SPACE_DATASET).unwrap().rows, 2);
}
