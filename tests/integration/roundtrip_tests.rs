//! Write/read round-trip tests.
//!
//! Tests verify:
//! - Every written plane reads back bit-identical
//! - Producer fields survive, computed fields are added
//! - Both key formats are readable
//! - The same dataset reads identically through a remote-style backend

use ndarray::Array3;

use g2s_dataset::{
    Coordinate, DatasetReader, DatasetShape, DatasetWriter, KeyFormat, PixelArray, PixelType,
    PositionReader,
};

use super::test_utils::{
    coordinates, gray16_plane, path_str, test_config, test_extra, write_dataset, MemoryStorage,
    TEST_HEIGHT, TEST_WIDTH,
};

const CHANNELS: [&str; 3] = ["DAPI", "FITC", "Cy5"];

// =============================================================================
// Full Round Trip
// =============================================================================

#[test]
fn test_full_round_trip_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(2, 3, 2, 2);
    let coords = coordinates(shape);
    let root = write_dataset(dir.path(), "run", shape, &CHANNELS, &coords);

    let reader = DatasetReader::open(&root).unwrap();
    assert_eq!(reader.num_positions(), 2);
    assert_eq!(reader.image_count(), coords.len());

    for coord in coords {
        let pixels = reader
            .image_pixels(coord.position, coord.channel, coord.z_slice, coord.frame)
            .unwrap();
        let expected = gray16_plane(TEST_HEIGHT as usize, TEST_WIDTH as usize, coord);
        assert_eq!(pixels, expected, "pixel mismatch at {:?}", coord);
    }
}

#[test]
fn test_full_round_trip_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(2, 3, 2, 2);
    let coords = coordinates(shape);
    let root = write_dataset(dir.path(), "run", shape, &CHANNELS, &coords);

    let reader = DatasetReader::open(&root).unwrap();
    for coord in coords {
        let record = reader
            .image_metadata(coord.position, coord.channel, coord.z_slice, coord.frame)
            .unwrap();

        // Producer fields unchanged
        for (key, value) in test_extra(coord).as_map() {
            assert_eq!(record.get(key), Some(value), "{} at {:?}", key, coord);
        }

        // Computed fields
        assert_eq!(record.width(), Some(TEST_WIDTH));
        assert_eq!(record.height(), Some(TEST_HEIGHT));
        assert_eq!(record.channel_name(), Some(CHANNELS[coord.channel]));
        assert_eq!(record.channel_index(), Some(coord.channel));
        assert_eq!(record.slice_index(), Some(coord.z_slice));
        assert_eq!(record.frame_index(), Some(coord.frame));
        assert_eq!(record.position_index(), Some(coord.position));
        assert_eq!(
            record.file_name().map(str::to_string),
            Some(format!(
                "img_{:09}_{}_{:03}.tif",
                coord.frame, CHANNELS[coord.channel], coord.z_slice
            ))
        );
    }
}

#[test]
fn test_round_trip_dataset_accessors() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(2, 3, 2, 4);
    let root = write_dataset(dir.path(), "run", shape, &CHANNELS, &coordinates(shape));

    let reader = DatasetReader::open(&root).unwrap();
    assert_eq!(reader.name(), "run");
    assert_eq!(reader.width(), TEST_WIDTH);
    assert_eq!(reader.height(), TEST_HEIGHT);
    assert_eq!(reader.pixel_type(), PixelType::Gray16);
    assert_eq!(reader.bit_depth(), 12);
    assert_eq!(reader.pixel_size(), 0.325);
    assert_eq!(reader.num_channels(), 3);
    assert_eq!(reader.num_z_slices(), 2);
    assert_eq!(reader.num_frames(), 4);
    assert_eq!(reader.channel_names(), &["DAPI", "FITC", "Cy5"]);
    assert_eq!(reader.channel_colors(), vec![0x100000, 0x200000, 0x300000]);
    assert_eq!(reader.position_labels(), vec!["Pos-0", "Pos-1"]);

    let summary = reader.summary_metadata();
    assert_eq!(summary["Source"], "G2SDataset");
    assert_eq!(summary["UUID"], "session-0001");
    assert_eq!(summary["UserName"], "tester");
    assert_eq!(summary["NumComponents"], 1);
    assert_eq!(summary["Positions"], 2);
}

#[test]
fn test_channel_name_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(1, 3, 1, 1);
    let root = write_dataset(dir.path(), "run", shape, &CHANNELS, &coordinates(shape));

    let reader = DatasetReader::open(&root).unwrap();
    let cy5 = reader.resolve_channel("Cy5").unwrap();
    assert_eq!(cy5, 2);

    let record = reader.image_metadata(0, cy5, 0, 0).unwrap();
    assert_eq!(record.channel_name(), Some("Cy5"));
}

// =============================================================================
// Pixel Types and Key Formats
// =============================================================================

#[test]
fn test_rgb32_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = DatasetWriter::open(
        dir.path(),
        "color",
        DatasetShape::new(1, 1, 1, 1),
        false,
        test_config(),
        None,
    )
    .unwrap();
    writer.initialize(7, 5, PixelType::Rgb32, 0).unwrap();

    let pixels = PixelArray::from(Array3::from_shape_fn((5, 7, 4), |(y, x, c)| {
        (y * 31 + x * 17 + c * 60) as u8
    }));
    writer
        .add_image(&pixels, Coordinate::default(), None, None)
        .unwrap();
    writer.close().unwrap();

    let reader = DatasetReader::open(writer.path()).unwrap();
    assert_eq!(reader.pixel_type(), PixelType::Rgb32);
    assert_eq!(reader.bit_depth(), 8);
    assert_eq!(reader.summary_metadata()["NumComponents"], 4);
    assert_eq!(reader.image_pixels(0, 0, 0, 0).unwrap(), pixels);
}

#[test]
fn test_rgb64_and_gray8_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let rgb64 = PixelArray::from(Array3::from_shape_fn((5, 7, 4), |(y, x, c)| {
        (y * 9000 + x * 1100 + c * 300) as u16
    }));
    let gray8 = PixelArray::from(ndarray::Array2::from_shape_fn((5, 7), |(y, x)| {
        (y * 50 + x) as u8
    }));

    for (name, pixel_type, pixels, bit_depth) in [
        ("rgb64", PixelType::Rgb64, &rgb64, 16),
        ("gray8", PixelType::Gray8, &gray8, 8),
    ] {
        let mut writer = DatasetWriter::open(
            dir.path(),
            name,
            DatasetShape::new(1, 1, 1, 1),
            false,
            test_config(),
            None,
        )
        .unwrap();
        writer.initialize(7, 5, pixel_type, 0).unwrap();
        writer
            .add_image(pixels, Coordinate::default(), None, None)
            .unwrap();
        writer.close().unwrap();

        let reader = DatasetReader::open(writer.path()).unwrap();
        assert_eq!(reader.pixel_type(), pixel_type);
        assert_eq!(reader.bit_depth(), bit_depth);
        assert_eq!(&reader.image_pixels(0, 0, 0, 0).unwrap(), pixels);
    }
}

#[test]
fn test_legacy_key_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(2, 1, 1, 2);
    let mut writer = DatasetWriter::open(
        dir.path(),
        "legacy",
        shape,
        false,
        test_config().with_key_format(KeyFormat::Legacy),
        None,
    )
    .unwrap();
    writer
        .initialize(TEST_WIDTH, TEST_HEIGHT, PixelType::Gray16, 0)
        .unwrap();
    for coord in coordinates(shape) {
        let pixels = gray16_plane(TEST_HEIGHT as usize, TEST_WIDTH as usize, coord);
        writer.add_image(&pixels, coord, None, None).unwrap();
    }
    writer.close().unwrap();

    let reader = DatasetReader::open(writer.path()).unwrap();
    let position = reader.position(1).unwrap();
    assert_eq!(position.key_format(), Some(KeyFormat::Legacy));
    assert!(position.image_keys().all(|k| k.split('-').count() == 4));

    for coord in coordinates(shape) {
        let pixels = reader
            .image_pixels(coord.position, coord.channel, coord.z_slice, coord.frame)
            .unwrap();
        assert_eq!(
            pixels,
            gray16_plane(TEST_HEIGHT as usize, TEST_WIDTH as usize, coord)
        );
    }
}

// =============================================================================
// Remote-Style Backend
// =============================================================================

#[test]
fn test_round_trip_through_memory_storage() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(2, 2, 1, 2);
    let coords = coordinates(shape);
    let root = write_dataset(dir.path(), "run", shape, &["DAPI", "Cy5"], &coords);

    let storage = MemoryStorage::new().with_directory(&root, "datasets/run");
    let fetches = storage.fetch_counter();
    let reader = DatasetReader::open_with(storage, "datasets/run").unwrap();
    assert_eq!(reader.name(), "run");
    assert_eq!(reader.path(), "datasets/run");

    let opened = fetches.load(std::sync::atomic::Ordering::SeqCst);
    for coord in &coords {
        let pixels = reader
            .image_pixels(coord.position, coord.channel, coord.z_slice, coord.frame)
            .unwrap();
        assert_eq!(
            pixels,
            gray16_plane(TEST_HEIGHT as usize, TEST_WIDTH as usize, *coord)
        );
    }

    // One fetch per plane, nothing cached
    let after = fetches.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(after - opened, coords.len());
    reader.image_pixels(0, 0, 0, 0).unwrap();
    assert_eq!(
        fetches.load(std::sync::atomic::Ordering::SeqCst),
        after + 1
    );
}

#[test]
fn test_position_reader_matches_local_directory() {
    let dir = tempfile::tempdir().unwrap();
    let shape = DatasetShape::new(1, 1, 2, 1);
    let root = write_dataset(dir.path(), "run", shape, &["DAPI"], &coordinates(shape));

    let position = PositionReader::open(root.join("Pos-0")).unwrap();
    assert_eq!(position.name(), "Pos-0");
    assert_eq!(position.path(), path_str(&root.join("Pos-0")));
    assert_eq!(position.position_index().unwrap(), 0);
    assert_eq!(position.image_count(), 2);
}
