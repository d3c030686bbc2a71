//! g2s - Inspect and generate Go2Scope microscopy datasets.

use clap::Parser;
use ndarray::Array2;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use g2s_dataset::{
    config::{Cli, Command, InfoConfig, WriteTestConfig},
    ChannelDef, Coordinate, DatasetError, DatasetReader, DatasetShape, DatasetWriter,
    ImageRecord, PixelArray, PixelType, S3Storage, StorageBackend, WriterConfig, WriterIdentity,
};

/// Channel names used by `write-test`, extended with `Channel-{i}`.
const TEST_CHANNEL_NAMES: [&str; 4] = ["DAPI", "FITC", "Cy3", "Cy5"];
const TEST_CHANNEL_COLORS: [u32; 4] = [0x0000FF, 0x00FF00, 0xFFA500, 0xFF0000];

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Info(config) => run_info(config),
        Command::WriteTest(config) => run_write_test(config),
    }
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(config: InfoConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match &config.s3_bucket {
        Some(bucket) => {
            info!("Reading s3://{}/{}", bucket, config.path);
            S3Storage::connect(bucket.as_str(), config.s3_endpoint.as_deref(), &config.s3_region)
                .map_err(DatasetError::from)
                .and_then(|storage| DatasetReader::open_with(storage, &config.path))
                .map(|reader| print_info(&reader, config.list_images))
        }
        None => DatasetReader::open(&config.path).map(|reader| print_info(&reader, config.list_images)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to open dataset {}: {}", config.path, e);
            ExitCode::FAILURE
        }
    }
}

fn print_info<S: StorageBackend>(reader: &DatasetReader<S>, list_images: bool) {
    println!("Dataset: {}", reader.name());
    println!("═════════════════════════════════");
    println!("  Path:        {}", reader.path());
    println!(
        "  Shape:       {} positions x {} channels x {} slices x {} frames",
        reader.num_positions(),
        reader.num_channels(),
        reader.num_z_slices(),
        reader.num_frames()
    );
    println!("  Image size:  {} x {}", reader.width(), reader.height());
    println!(
        "  Pixel type:  {} ({} bit)",
        reader.pixel_type(),
        reader.bit_depth()
    );
    println!("  Pixel size:  {} um", reader.pixel_size());
    println!("  Channels:    {}", reader.channel_names().join(", "));
    println!("  Positions:   {}", reader.position_labels().join(", "));
    println!("  Images:      {}", reader.image_count());
    println!();

    match serde_json::to_string_pretty(reader.summary_metadata()) {
        Ok(summary) => println!("Summary:\n{}", summary),
        Err(e) => warn!("Cannot print summary: {}", e),
    }

    if list_images {
        println!();
        print_images(reader);
    }
}

/// List every coordinate of the declared shape. Missing images are reported
/// and skipped.
fn print_images<S: StorageBackend>(reader: &DatasetReader<S>) {
    for p in reader.position_indices() {
        for c in 0..reader.num_channels() {
            for z in 0..reader.num_z_slices() {
                for t in 0..reader.num_frames() {
                    match reader.image_metadata(p, c, z, t) {
                        Ok(record) => println!(
                            "  p={} c={} z={} t={}  {}",
                            p,
                            c,
                            z,
                            t,
                            record.file_name().unwrap_or("<no file>")
                        ),
                        Err(e) if e.is_missing_image() => {
                            println!("  p={} c={} z={} t={}  missing", p, c, z, t)
                        }
                        Err(e) => warn!("p={} c={} z={} t={}: {}", p, c, z, t, e),
                    }
                }
            }
        }
    }
}

// =============================================================================
// Write-Test Command
// =============================================================================

fn run_write_test(config: WriteTestConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = write_test_dataset(&config).and_then(|path| {
        let reader = DatasetReader::open(&path)?;
        print_info(&reader, false);
        Ok(())
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to write test dataset: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn write_test_dataset(config: &WriteTestConfig) -> Result<std::path::PathBuf, DatasetError> {
    let shape = DatasetShape::new(
        config.positions,
        config.channels,
        config.slices,
        config.frames,
    );
    let writer_config = WriterConfig::new(WriterIdentity::from_env());

    let mut writer = DatasetWriter::open(
        &config.root,
        &config.name,
        shape,
        config.overwrite,
        writer_config,
        None,
    )?;
    writer.initialize(config.width, config.height, PixelType::Gray16, 0)?;
    writer.set_pixel_size(0.65)?;
    writer.set_channel_data(test_channels(config.channels))?;

    let (height, width) = (config.height as usize, config.width as usize);
    for p in 0..config.positions {
        for t in 0..config.frames {
            for c in 0..config.channels {
                for z in 0..config.slices {
                    let pixels = PixelArray::from(Array2::from_shape_fn(
                        (height, width),
                        |(y, x)| ((x + y + p * 1000 + c * 100 + z * 10 + t) % 65536) as u16,
                    ));
                    let extra = ImageRecord::new()
                        .with_elapsed_ms(t as f64 * 500.0)
                        .with_stage_position(p as f64 * 1000.0, p as f64 * 500.0, z as f64 * 0.5);

                    writer.add_image(&pixels, Coordinate::new(p, c, z, t), None, Some(extra))?;
                }
            }
        }
        info!("Wrote position {}", p);
    }

    writer.close()?;
    info!(
        "Wrote {} images to {}",
        writer.image_count(),
        writer.path().display()
    );
    Ok(writer.path().to_path_buf())
}

fn test_channels(count: usize) -> Vec<ChannelDef> {
    (0..count)
        .map(|i| match (TEST_CHANNEL_NAMES.get(i), TEST_CHANNEL_COLORS.get(i)) {
            (Some(name), Some(&color)) => ChannelDef::new(*name, color),
            _ => ChannelDef::named(format!("Channel-{}", i)),
        })
        .collect()
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "g2s_dataset=debug,g2s=debug"
    } else {
        "g2s_dataset=info,g2s=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
