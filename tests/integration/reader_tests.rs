//! Reader integration tests.
//!
//! Tests verify:
//! - Sparse datasets: missing in-range coordinates are Metadata errors
//! - Range validation on every axis
//! - Truncated sidecar repair and corruption handling
//! - Positions placed by recorded index, not listing order
//! - Data written by other producers (legacy keys, string indices)

use serde_json::json;
use std::fs;

use g2s_dataset::{DatasetError, DatasetReader, DatasetShape, KeyFormat, PositionReader};

use super::test_utils::{
    coordinates, path_str, summary_json, write_dataset, write_sidecar, MemoryStorage,
};

// =============================================================================
// Sparse Datasets
// =============================================================================

#[test]
fn test_sparse_dataset_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(1, 2, 3, 3);
    let present: Vec<_> = coordinates(shape)
        .into_iter()
        .filter(|c| (c.channel + c.z_slice + c.frame) % 2 == 0)
        .collect();
    let root = write_dataset(dir.path(), "sparse", shape, &["DAPI", "Cy5"], &present);

    let reader = DatasetReader::open(&root).unwrap();
    for coord in coordinates(shape) {
        let result = reader.image_pixels(0, coord.channel, coord.z_slice, coord.frame);
        if present.contains(&coord) {
            assert!(result.is_ok(), "expected image at {:?}", coord);
        } else {
            match result {
                Err(e @ DatasetError::Metadata(_)) => assert!(e.is_missing_image()),
                other => panic!("Expected Metadata error at {:?}, got {:?}", coord, other),
            }
        }
    }
}

#[test]
fn test_unwritten_position_slot() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(3, 1, 1, 1);
    let present = vec![
        g2s_dataset::Coordinate::new(0, 0, 0, 0),
        g2s_dataset::Coordinate::new(2, 0, 0, 0),
    ];
    let root = write_dataset(dir.path(), "gaps", shape, &["DAPI"], &present);

    let reader = DatasetReader::open(&root).unwrap();
    assert_eq!(reader.num_positions(), 3);
    assert_eq!(reader.position_indices(), vec![0, 2]);
    assert!(reader.image_pixels(2, 0, 0, 0).is_ok());
    assert!(matches!(
        reader.image_pixels(1, 0, 0, 0),
        Err(DatasetError::InvalidCoordinate(_))
    ));
    assert!(matches!(
        reader.position(3),
        Err(DatasetError::InvalidCoordinate(_))
    ));
}

// =============================================================================
// Range Validation
// =============================================================================

#[test]
fn test_channel_range_validation() {
    for channel_count in [0usize, 1, 5] {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..channel_count).map(|i| format!("Ch{}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        write_sidecar(dir.path(), summary_json(&name_refs, 2, 2), &[]);

        let reader = PositionReader::open(dir.path()).unwrap();
        for channel in [channel_count, channel_count + 1] {
            assert!(
                matches!(
                    reader.image_metadata(channel, 0, 0),
                    Err(DatasetError::InvalidCoordinate(_))
                ),
                "channel {} of {} should be out of range",
                channel,
                channel_count
            );
        }
        if channel_count > 0 {
            // In range, but nothing written
            assert!(matches!(
                reader.image_metadata(channel_count - 1, 0, 0),
                Err(DatasetError::Metadata(_))
            ));
        }
    }
}

#[test]
fn test_slice_and_frame_range_validation() {
    let dir = tempfile::tempdir().unwrap();
    write_sidecar(dir.path(), summary_json(&["DAPI"], 2, 3), &[]);
    let reader = PositionReader::open(dir.path()).unwrap();

    assert!(matches!(
        reader.image_metadata(0, 2, 0),
        Err(DatasetError::InvalidCoordinate(_))
    ));
    assert!(matches!(
        reader.image_metadata(0, 0, 3),
        Err(DatasetError::InvalidCoordinate(_))
    ));
    assert!(matches!(
        reader.image_metadata(0, 1, 2),
        Err(DatasetError::Metadata(_))
    ));
}

#[test]
fn test_unknown_channel_name() {
    let dir = tempfile::tempdir().unwrap();
    write_sidecar(dir.path(), summary_json(&["DAPI", "Cy5"], 1, 1), &[]);
    let reader = PositionReader::open(dir.path()).unwrap();

    assert_eq!(reader.resolve_channel("Cy5").unwrap(), 1);
    // Names are matched exactly
    assert!(matches!(
        reader.resolve_channel("cy5"),
        Err(DatasetError::InvalidCoordinate(_))
    ));
}

// =============================================================================
// Sidecar Repair and Corruption
// =============================================================================

#[test]
fn test_truncated_sidecar_is_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(1, 1, 2, 1);
    let root = write_dataset(dir.path(), "run", shape, &["DAPI"], &coordinates(shape));

    let sidecar = root.join("Pos-0").join("metadata.txt");
    let text = fs::read_to_string(&sidecar).unwrap();
    let truncated = text.trim_end().strip_suffix('}').unwrap().to_string();
    fs::write(&sidecar, truncated).unwrap();

    let reader = DatasetReader::open(&root).unwrap();
    assert_eq!(reader.image_count(), 2);
    assert!(reader.image_pixels(0, 0, 1, 0).is_ok());
}

#[test]
fn test_corrupted_sidecar_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(1, 1, 1, 1);
    let root = write_dataset(dir.path(), "run", shape, &["DAPI"], &coordinates(shape));

    let sidecar = root.join("Pos-0").join("metadata.txt");
    let text = fs::read_to_string(&sidecar).unwrap();
    fs::write(&sidecar, text.replacen("\"Summary\"", "\"Summary", 1)).unwrap();

    assert!(matches!(
        DatasetReader::open(&root),
        Err(DatasetError::Format { .. })
    ));
}

#[test]
fn test_non_utf8_sidecar_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("metadata.txt"), [0x7b, 0xff, 0xfe, 0x7d]).unwrap();
    assert!(matches!(
        PositionReader::open(dir.path()),
        Err(DatasetError::Format { .. })
    ));

    let storage = MemoryStorage::new().with_object("run/Pos-0/metadata.txt", vec![0xc3u8, 0x28]);
    assert!(matches!(
        DatasetReader::open_with(storage, "run"),
        Err(DatasetError::Format { .. })
    ));
}

#[test]
fn test_missing_mandatory_summary_field() {
    let dir = tempfile::tempdir().unwrap();
    let mut summary = summary_json(&["DAPI"], 1, 1);
    summary.as_object_mut().unwrap().remove("Frames");
    write_sidecar(dir.path(), summary, &[]);

    assert!(matches!(
        PositionReader::open(dir.path()),
        Err(DatasetError::Metadata(_))
    ));
}

#[test]
fn test_missing_image_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(1, 1, 1, 2);
    let root = write_dataset(dir.path(), "run", shape, &["DAPI"], &coordinates(shape));
    fs::remove_file(root.join("Pos-0").join("img_000000001_DAPI_000.tif")).unwrap();

    let reader = DatasetReader::open(&root).unwrap();
    assert!(reader.image_pixels(0, 0, 0, 0).is_ok());
    match reader.image_pixels(0, 0, 0, 1) {
        Err(e @ DatasetError::ImageRead { .. }) => assert!(!e.is_missing_image()),
        other => panic!("Expected ImageRead, got {:?}", other),
    }
    // Metadata alone is still readable
    assert!(reader.image_metadata(0, 0, 0, 1).is_ok());
}

#[test]
fn test_undecodable_image_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(1, 1, 1, 1);
    let root = write_dataset(dir.path(), "run", shape, &["DAPI"], &coordinates(shape));
    fs::write(
        root.join("Pos-0").join("img_000000000_DAPI_000.tif"),
        b"not a tiff",
    )
    .unwrap();

    let reader = DatasetReader::open(&root).unwrap();
    assert!(matches!(
        reader.image_pixels(0, 0, 0, 0),
        Err(DatasetError::ImageRead { .. })
    ));
}

// =============================================================================
// Position Discovery
// =============================================================================

#[test]
fn test_position_index_independent_of_listing_order() {
    let dir = tempfile::tempdir().unwrap();
    // Directory names sort opposite to their indices
    for (dir_name, index) in [("z-first", 0), ("a-second", 1), ("m-third", 2)] {
        let key = format!("FrameKey-{}-0-0-0", index);
        write_sidecar(
            &dir.path().join(dir_name),
            json!({
                "Prefix": dir_name,
                "ChNames": ["DAPI"],
                "Slices": 1,
                "Frames": 1,
                "Positions": 3,
                "PixelType": "GRAY16"
            }),
            &[(
                key.as_str(),
                json!({"PositionIndex": index, "FileName": "img_000000000_DAPI_000.tif"}),
            )],
        );
    }

    let local = DatasetReader::open(dir.path()).unwrap();
    assert_eq!(local.position_labels(), vec!["z-first", "a-second", "m-third"]);

    let prefix = "bucket/run";
    let forward = MemoryStorage::new().with_directory(dir.path(), prefix);
    let reversed = MemoryStorage::new()
        .with_directory(dir.path(), prefix)
        .with_reversed_listing();

    let forward = DatasetReader::open_with(forward, prefix).unwrap();
    let reversed = DatasetReader::open_with(reversed, prefix).unwrap();
    for reader in [&forward, &reversed] {
        for index in 0..3 {
            let position = reader.position(index).unwrap();
            assert_eq!(position.position_index().unwrap(), index);
        }
        assert_eq!(reader.position(0).unwrap().name(), "z-first");
    }
    assert_eq!(forward.position_labels(), reversed.position_labels());
}

#[test]
fn test_duplicate_position_index() {
    let dir = tempfile::tempdir().unwrap();
    for dir_name in ["Pos-A", "Pos-B"] {
        write_sidecar(
            &dir.path().join(dir_name),
            summary_json(&["DAPI"], 1, 1),
            &[("FrameKey-0-0-0-0", json!({"PositionIndex": 0}))],
        );
    }

    assert!(matches!(
        DatasetReader::open(dir.path()),
        Err(DatasetError::Metadata(_))
    ));
}

#[test]
fn test_position_index_beyond_declared_count() {
    for index in [json!(1), json!(1_000_000_000_000u64), json!(u64::MAX)] {
        let dir = tempfile::tempdir().unwrap();
        write_sidecar(
            &dir.path().join("Pos-0"),
            summary_json(&["DAPI"], 1, 1),
            &[("FrameKey-0-0-0-0", json!({"PositionIndex": index}))],
        );

        match DatasetReader::open(dir.path()) {
            Err(DatasetError::Metadata(message)) => {
                assert!(message.contains("declares 1 positions"), "{}", message)
            }
            other => panic!("Expected Metadata error for {}, got {:?}", index, other),
        }
    }
}

#[test]
fn test_position_without_index() {
    let dir = tempfile::tempdir().unwrap();
    write_sidecar(
        &dir.path().join("Pos-0"),
        summary_json(&["DAPI"], 1, 1),
        &[("FrameKey-0-0-0", json!({"FileName": "x.tif"}))],
    );

    assert!(matches!(
        DatasetReader::open(dir.path()),
        Err(DatasetError::Metadata(_))
    ));
}

#[test]
fn test_empty_root_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        DatasetReader::open(dir.path()),
        Err(DatasetError::DatasetNotFound(_))
    ));

    let storage = MemoryStorage::new().with_object("other/Pos-0/metadata.txt", "{}");
    assert!(matches!(
        DatasetReader::open_with(storage, "missing"),
        Err(DatasetError::DatasetNotFound(_))
    ));
}

// =============================================================================
// Foreign Producers
// =============================================================================

#[test]
fn test_legacy_producer_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let position_dir = dir.path().join("Default");
    let shape = DatasetShape::new(1, 2, 1, 1);

    // Borrow real image files from a dataset written by this crate
    let source = write_dataset(dir.path(), "source", shape, &["DAPI", "Cy5"], &coordinates(shape));
    fs::create_dir_all(&position_dir).unwrap();
    for file in ["img_000000000_DAPI_000.tif", "img_000000000_Cy5_000.tif"] {
        fs::copy(source.join("Pos-0").join(file), position_dir.join(file)).unwrap();
    }
    fs::remove_dir_all(&source).unwrap();

    // Legacy keys, string position index, legacy colors, no prefix
    write_sidecar(
        &position_dir,
        json!({
            "ChNames": ["DAPI", "Cy5"],
            "Colors": [255, 16711680],
            "Slices": 1,
            "Frames": 1,
            "Positions": 1,
            "PixelType": "GRAY16"
        }),
        &[
            (
                "FrameKey-0-0-0",
                json!({"PositionIndex": "0", "FileName": "img_000000000_DAPI_000.tif"}),
            ),
            (
                "FrameKey-0-1-0",
                json!({"PositionIndex": "0", "FileName": "img_000000000_Cy5_000.tif"}),
            ),
        ],
    );

    let reader = DatasetReader::open(dir.path()).unwrap();
    let position = reader.position(0).unwrap();
    assert_eq!(position.name(), "Default");
    assert_eq!(position.key_format(), Some(KeyFormat::Legacy));
    assert_eq!(reader.channel_colors(), vec![255, 16711680]);
    assert_eq!(reader.bit_depth(), 0);

    let cy5 = reader.resolve_channel("Cy5").unwrap();
    let pixels = reader.image_pixels(0, cy5, 0, 0).unwrap();
    assert_eq!(pixels.width(), super::test_utils::TEST_WIDTH);
    assert_eq!(path_str(dir.path()), reader.path());
}
