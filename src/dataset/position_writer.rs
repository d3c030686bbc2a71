//! Writer for a single position sub-dataset.
//!
//! # Lifecycle
//!
//! ```text
//! create ──► Opened ──initialize──► Dimensioned ──begin_writing──► Writing ──close──► Closed
//!                                        │                            ▲
//!                                        └──────── add_image ─────────┘
//! ```
//!
//! Channel names, colors and pixel size may change until writing begins. The
//! summary is materialized once, on the transition to `Writing`, and is
//! immutable afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::WriterConfig;
use crate::error::DatasetError;
use crate::format::{
    image_file_name, image_meta, sidecar, summary_meta, ChannelDef, Coordinate, DatasetShape,
    ImageCodec, ImageRecord, PixelArray, PixelFormat, PixelType, TiffCodec, KEY_SUMMARY,
    METADATA_FILE_NAME, SOURCE_NAME,
};

/// Writer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Directory created, shape declared.
    Opened,
    /// Pixel format fixed.
    Dimensioned,
    /// Summary frozen, images being added.
    Writing,
    /// Sidecar persisted; no further calls allowed.
    Closed,
}

/// Writer for one position directory.
#[derive(Debug)]
pub struct PositionWriter {
    path: PathBuf,
    name: String,
    shape: DatasetShape,
    config: WriterConfig,
    channels: Vec<ChannelDef>,
    pixel_size_um: f64,
    format: Option<PixelFormat>,
    producer_summary: Map<String, Value>,
    metadata: Map<String, Value>,
    state: WriterState,
    codec: TiffCodec,
}

impl PositionWriter {
    /// Create the position directory `root/name` and declare the shape.
    ///
    /// `additional_summary` holds producer fields copied into the summary;
    /// computed fields take precedence on conflict.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::InvalidCoordinate`] if `name` is empty, `.`, `..` or
    ///   contains a path separator
    /// - [`DatasetError::AlreadyExists`] if `root/name` exists
    pub fn create(
        root: impl AsRef<Path>,
        name: &str,
        shape: DatasetShape,
        config: WriterConfig,
        additional_summary: Option<Map<String, Value>>,
    ) -> Result<Self, DatasetError> {
        check_position_name(name)?;
        let path = root.as_ref().join(name);
        if path.exists() {
            return Err(DatasetError::AlreadyExists(path.display().to_string()));
        }
        fs::create_dir_all(&path)?;

        let channels = (0..shape.channels)
            .map(|i| ChannelDef::named(format!("Channel-{}", i)))
            .collect();

        debug!(path = %path.display(), ?shape, "Created position directory");
        Ok(Self {
            path,
            name: name.to_string(),
            shape,
            config,
            channels,
            pixel_size_um: 1.0,
            format: None,
            producer_summary: additional_summary.unwrap_or_default(),
            metadata: Map::new(),
            state: WriterState::Opened,
            codec: TiffCodec::new(),
        })
    }

    /// Fix the image size and pixel type. A `bit_depth` of 0 selects the
    /// natural depth of the pixel type.
    pub fn initialize(
        &mut self,
        width: u32,
        height: u32,
        pixel_type: PixelType,
        bit_depth: u32,
    ) -> Result<(), DatasetError> {
        self.require(&[WriterState::Opened], "initialize")?;

        let bit_depth = if bit_depth == 0 {
            pixel_type.default_bit_depth()
        } else {
            bit_depth
        };
        self.format = Some(PixelFormat {
            width,
            height,
            pixel_type,
            bit_depth,
        });
        self.state = WriterState::Dimensioned;
        Ok(())
    }

    /// Replace channel names and colors.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::Lifecycle`] once writing has begun
    /// - [`DatasetError::ChannelCount`] if the list length differs from the
    ///   declared channel count
    pub fn set_channel_data(&mut self, channels: Vec<ChannelDef>) -> Result<(), DatasetError> {
        self.require(
            &[WriterState::Opened, WriterState::Dimensioned],
            "set_channel_data",
        )?;
        if channels.len() != self.shape.channels {
            return Err(DatasetError::ChannelCount {
                expected: self.shape.channels,
                actual: channels.len(),
            });
        }
        self.channels = channels;
        Ok(())
    }

    /// Set the physical pixel size in microns.
    pub fn set_pixel_size(&mut self, pixel_size_um: f64) -> Result<(), DatasetError> {
        self.require(
            &[WriterState::Opened, WriterState::Dimensioned],
            "set_pixel_size",
        )?;
        self.pixel_size_um = pixel_size_um;
        Ok(())
    }

    /// Materialize and freeze the summary.
    pub fn begin_writing(&mut self) -> Result<(), DatasetError> {
        self.require(&[WriterState::Dimensioned], "begin_writing")?;
        let format = self.pixel_format()?;

        let mut summary = self.producer_summary.clone();
        let identity = &self.config.identity;
        let computed = [
            (summary_meta::PREFIX, json!(self.name)),
            (summary_meta::SOURCE, json!(SOURCE_NAME)),
            (summary_meta::WIDTH, json!(format.width)),
            (summary_meta::HEIGHT, json!(format.height)),
            (summary_meta::PIXEL_TYPE, json!(format.pixel_type)),
            (summary_meta::PIXEL_SIZE, json!(self.pixel_size_um)),
            (summary_meta::BIT_DEPTH, json!(format.bit_depth)),
            (summary_meta::PIXEL_ASPECT, json!(1)),
            (summary_meta::POSITIONS, json!(self.shape.positions)),
            (summary_meta::CHANNELS, json!(self.shape.channels)),
            (
                summary_meta::CHANNEL_NAMES,
                json!(self.channels.iter().map(|c| &c.name).collect::<Vec<_>>()),
            ),
            (
                summary_meta::CHANNEL_COLORS,
                json!(self.channels.iter().map(|c| c.color).collect::<Vec<_>>()),
            ),
            (summary_meta::SLICES, json!(self.shape.z_slices)),
            (summary_meta::FRAMES, json!(self.shape.frames)),
            (summary_meta::TIME_FIRST, json!(false)),
            (summary_meta::SLICES_FIRST, json!(false)),
            (summary_meta::NUMBER_OF_COMPONENTS, json!(format.components())),
            (summary_meta::UUID, json!(identity.session_uuid)),
            (summary_meta::VERSION, json!(self.config.metadata_version)),
            (summary_meta::COMPUTER_NAME, json!(identity.computer_name)),
            (summary_meta::USER_NAME, json!(identity.user_name)),
        ];
        for (key, value) in computed {
            summary.insert(key.to_string(), value);
        }

        self.metadata
            .insert(KEY_SUMMARY.to_string(), Value::Object(summary));
        self.state = WriterState::Writing;
        debug!(position = %self.name, "Summary metadata frozen");
        Ok(())
    }

    /// Validate, encode and store one image plane.
    ///
    /// The record is inserted only after the file is written, so a failed
    /// call leaves the metadata untouched. Writing the same coordinate twice
    /// replaces the earlier record and file.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::Lifecycle`] before `initialize` or after `close`
    /// - [`DatasetError::TypeMismatch`] / [`DatasetError::SizeMismatch`] if the
    ///   plane disagrees with the pixel format
    /// - [`DatasetError::InvalidCoordinate`] if a coordinate is outside the
    ///   declared shape
    /// - [`DatasetError::ImageWrite`] if encoding or writing fails
    pub fn add_image(
        &mut self,
        pixels: &PixelArray,
        coord: Coordinate,
        extra: Option<ImageRecord>,
    ) -> Result<(), DatasetError> {
        self.require(
            &[WriterState::Dimensioned, WriterState::Writing],
            "add_image",
        )?;
        let format = self.pixel_format()?;
        self.check_pixels(pixels, &format)?;
        self.check_coordinate(&coord)?;

        let channel_name = self.channels[coord.channel].name.clone();
        let file_name = image_file_name(coord.frame, &channel_name, coord.z_slice);
        let file_path = self.path.join(&file_name);

        let mut record = extra.unwrap_or_default();
        record.insert(image_meta::WIDTH, format.width);
        record.insert(image_meta::HEIGHT, format.height);
        record.insert(image_meta::CHANNEL, channel_name);
        record.insert(image_meta::CHANNEL_INDEX, coord.channel);
        record.insert(image_meta::FRAME, coord.frame);
        record.insert(image_meta::FRAME_INDEX, coord.frame);
        record.insert(image_meta::SLICE, coord.z_slice);
        record.insert(image_meta::SLICE_INDEX, coord.z_slice);
        record.insert(image_meta::POS_INDEX, coord.position);
        if !record.contains(image_meta::POS_NAME) {
            record.insert(image_meta::POS_NAME, self.name.clone());
        }
        record.insert(summary_meta::PIXEL_TYPE, format.pixel_type.as_str());
        record.insert(summary_meta::PIXEL_SIZE, self.pixel_size_um);
        record.insert(summary_meta::BIT_DEPTH, format.bit_depth);
        if !record.contains(summary_meta::UUID) {
            record.insert(summary_meta::UUID, Uuid::new_v4().to_string());
        }
        record.insert(image_meta::FILE_NAME, file_name);

        let image_write_error = |message: String| DatasetError::ImageWrite {
            path: file_path.display().to_string(),
            message,
        };
        let encoded = self
            .codec
            .encode(pixels)
            .map_err(|e| image_write_error(e.to_string()))?;
        fs::write(&file_path, encoded).map_err(|e| image_write_error(e.to_string()))?;

        if self.state == WriterState::Dimensioned {
            self.begin_writing()?;
        }

        let key = self.config.key_format.encode(&coord);
        debug!(position = %self.name, key = %key, file = %file_path.display(), "Added image");
        self.metadata.insert(key, record.into());
        Ok(())
    }

    /// Persist the sidecar without closing.
    pub fn save_metadata(&mut self) -> Result<(), DatasetError> {
        self.require(&[WriterState::Writing], "save_metadata")?;
        self.write_sidecar()
    }

    /// Persist the sidecar and close the writer.
    ///
    /// Closing a dimensioned writer with no images still freezes the summary
    /// so the directory remains readable.
    pub fn close(&mut self) -> Result<(), DatasetError> {
        self.require(&[WriterState::Dimensioned, WriterState::Writing], "close")?;
        if self.state == WriterState::Dimensioned {
            self.begin_writing()?;
        }
        self.write_sidecar()?;
        self.state = WriterState::Closed;

        info!(
            path = %self.path.display(),
            images = self.image_count(),
            "Closed position dataset"
        );
        Ok(())
    }

    fn write_sidecar(&self) -> Result<(), DatasetError> {
        let text = sidecar::to_string(&self.metadata)?;
        let sidecar_path = self.path.join(METADATA_FILE_NAME);
        fs::write(&sidecar_path, text)?;
        debug!(path = %sidecar_path.display(), "Saved metadata");
        Ok(())
    }

    fn require(&self, allowed: &[WriterState], operation: &str) -> Result<(), DatasetError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(DatasetError::Lifecycle(format!(
                "{} not allowed in state {:?} for position {}",
                operation, self.state, self.name
            )))
        }
    }

    fn pixel_format(&self) -> Result<PixelFormat, DatasetError> {
        self.format.ok_or_else(|| {
            DatasetError::Lifecycle(format!("position {} is not initialized", self.name))
        })
    }

    fn check_pixels(&self, pixels: &PixelArray, format: &PixelFormat) -> Result<(), DatasetError> {
        let pixel_type = pixels
            .pixel_type()
            .ok_or_else(|| DatasetError::TypeMismatch {
                expected: format.pixel_type.to_string(),
                found: pixels.describe(),
            })?;
        if pixel_type != format.pixel_type {
            return Err(DatasetError::TypeMismatch {
                expected: format.pixel_type.to_string(),
                found: pixel_type.to_string(),
            });
        }

        if pixels.width() != format.width || pixels.height() != format.height {
            return Err(DatasetError::SizeMismatch {
                expected_width: format.width,
                expected_height: format.height,
                width: pixels.width(),
                height: pixels.height(),
            });
        }
        Ok(())
    }

    fn check_coordinate(&self, coord: &Coordinate) -> Result<(), DatasetError> {
        let checks = [
            ("position", coord.position, self.shape.positions),
            ("channel", coord.channel, self.shape.channels),
            ("slice", coord.z_slice, self.shape.z_slices),
            ("frame", coord.frame, self.shape.frames),
        ];
        let offending: Vec<String> = checks
            .iter()
            .filter(|(_, value, limit)| value >= limit)
            .map(|(axis, value, limit)| format!("{}={} (limit {})", axis, value, limit))
            .collect();

        if offending.is_empty() {
            Ok(())
        } else {
            Err(DatasetError::InvalidCoordinate(offending.join(", ")))
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn shape(&self) -> DatasetShape {
        self.shape
    }

    /// Pixel format, once initialized.
    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    pub fn channels(&self) -> &[ChannelDef] {
        &self.channels
    }

    pub fn pixel_size(&self) -> f64 {
        self.pixel_size_um
    }

    /// Frozen summary, once writing has begun.
    pub fn summary_metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.get(KEY_SUMMARY).and_then(Value::as_object)
    }

    pub fn image_count(&self) -> usize {
        self.metadata.len().saturating_sub(1)
    }
}

/// A position name must be exactly one directory below the dataset root.
fn check_position_name(name: &str) -> Result<(), DatasetError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(DatasetError::InvalidCoordinate(format!(
            "position name {:?} is not a directory name",
            name
        )));
    }
    Ok(())
}
