//! Multi-position dataset writer.
//!
//! Positions are created lazily: the first image addressed to a position index
//! creates its sub-directory and [`PositionWriter`], configured with whatever
//! was passed to [`DatasetWriter::initialize`], channel data and pixel size.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::position_writer::{PositionWriter, WriterState};
use crate::config::WriterConfig;
use crate::error::DatasetError;
use crate::format::{
    ChannelDef, Coordinate, DatasetShape, ImageRecord, PixelArray, PixelFormat, PixelType,
    METADATA_FILE_NAME,
};

/// Writer for a dataset made of one sub-directory per stage position.
#[derive(Debug)]
pub struct DatasetWriter {
    path: PathBuf,
    name: String,
    shape: DatasetShape,
    config: WriterConfig,
    additional_summary: Option<Map<String, Value>>,
    format: Option<PixelFormat>,
    channels: Option<Vec<ChannelDef>>,
    pixel_size_um: Option<f64>,
    positions: Vec<Option<PositionWriter>>,
    closed: bool,
}

impl DatasetWriter {
    /// Create the dataset root `root/name`.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::AlreadyExists`] if the path exists and `overwrite`
    ///   is false
    /// - [`DatasetError::OverwriteRefused`] if `overwrite` is set but the
    ///   existing path does not look like a dataset
    pub fn open(
        root: impl AsRef<Path>,
        name: &str,
        shape: DatasetShape,
        overwrite: bool,
        config: WriterConfig,
        additional_summary: Option<Map<String, Value>>,
    ) -> Result<Self, DatasetError> {
        let path = root.as_ref().join(name);

        if path.exists() {
            if !overwrite {
                return Err(DatasetError::AlreadyExists(path.display().to_string()));
            }
            check_overwritable(&path)?;
            warn!(path = %path.display(), "Removing existing dataset");
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;

        info!(path = %path.display(), ?shape, "Created dataset");
        Ok(Self {
            path,
            name: name.to_string(),
            shape,
            config,
            additional_summary,
            format: None,
            channels: None,
            pixel_size_um: None,
            positions: (0..shape.positions).map(|_| None).collect(),
            closed: false,
        })
    }

    /// Fix the image size and pixel type for every position.
    pub fn initialize(
        &mut self,
        width: u32,
        height: u32,
        pixel_type: PixelType,
        bit_depth: u32,
    ) -> Result<(), DatasetError> {
        self.require_unwritten("initialize")?;
        if self.format.is_some() {
            return Err(DatasetError::Lifecycle(
                "dataset is already initialized".to_string(),
            ));
        }
        self.format = Some(PixelFormat {
            width,
            height,
            pixel_type,
            bit_depth,
        });
        Ok(())
    }

    /// Set channel names and colors for every position.
    pub fn set_channel_data(&mut self, channels: Vec<ChannelDef>) -> Result<(), DatasetError> {
        self.require_unwritten("set_channel_data")?;
        if channels.len() != self.shape.channels {
            return Err(DatasetError::ChannelCount {
                expected: self.shape.channels,
                actual: channels.len(),
            });
        }
        self.channels = Some(channels);
        Ok(())
    }

    /// Set the pixel size in microns for every position.
    pub fn set_pixel_size(&mut self, pixel_size_um: f64) -> Result<(), DatasetError> {
        self.require_unwritten("set_pixel_size")?;
        self.pixel_size_um = Some(pixel_size_um);
        Ok(())
    }

    /// Add one image plane.
    ///
    /// `position_name` names the position directory the first time an index
    /// is seen (`Pos-{index}` when `None`); afterwards it must match.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::Lifecycle`] before `initialize` or after `close`
    /// - [`DatasetError::InvalidCoordinate`] if the position index is outside
    ///   the declared shape
    /// - [`DatasetError::NameMismatch`] if `position_name` disagrees with the
    ///   name bound to the index
    /// - [`DatasetError::InvalidCoordinate`] if `position_name` is not a
    ///   single directory name
    /// - any error from [`PositionWriter::add_image`]
    ///
    /// If the first image of a position fails, the position is not created.
    pub fn add_image(
        &mut self,
        pixels: &PixelArray,
        coord: Coordinate,
        position_name: Option<&str>,
        extra: Option<ImageRecord>,
    ) -> Result<(), DatasetError> {
        self.require_open("add_image")?;
        let format = self.format.ok_or_else(|| {
            DatasetError::Lifecycle("dataset is not initialized".to_string())
        })?;

        let index = coord.position;
        if index >= self.positions.len() {
            return Err(DatasetError::InvalidCoordinate(format!(
                "position={} (limit {})",
                index,
                self.positions.len()
            )));
        }

        if let Some(writer) = self.positions[index].as_mut() {
            if let Some(name) = position_name {
                if name != writer.name() {
                    return Err(DatasetError::NameMismatch {
                        index,
                        expected: writer.name().to_string(),
                        found: name.to_string(),
                    });
                }
            }
            return writer.add_image(pixels, coord, extra);
        }

        // A position is kept only once its first image is stored
        let name = position_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("Pos-{}", index));
        let mut writer = PositionWriter::create(
            &self.path,
            &name,
            self.shape,
            self.config.clone(),
            self.additional_summary.clone(),
        )?;
        if let Err(e) = self
            .configure_position(&mut writer, &format)
            .and_then(|()| writer.add_image(pixels, coord, extra))
        {
            discard_position(writer.path());
            return Err(e);
        }

        debug!(dataset = %self.name, position = index, name = %name, "Created position");
        self.positions[index] = Some(writer);
        Ok(())
    }

    fn configure_position(
        &self,
        writer: &mut PositionWriter,
        format: &PixelFormat,
    ) -> Result<(), DatasetError> {
        writer.initialize(format.width, format.height, format.pixel_type, format.bit_depth)?;
        if let Some(channels) = &self.channels {
            writer.set_channel_data(channels.clone())?;
        }
        if let Some(pixel_size_um) = self.pixel_size_um {
            writer.set_pixel_size(pixel_size_um)?;
        }
        Ok(())
    }

    /// Persist the sidecar of every position that has started writing.
    pub fn save_metadata(&mut self) -> Result<(), DatasetError> {
        self.require_open("save_metadata")?;
        for writer in self.positions.iter_mut().flatten() {
            if writer.state() == WriterState::Writing {
                writer.save_metadata()?;
            }
        }
        Ok(())
    }

    /// Close every position writer. Positions that never received an image
    /// are not created.
    pub fn close(&mut self) -> Result<(), DatasetError> {
        self.require_open("close")?;
        for writer in self.positions.iter_mut().flatten() {
            writer.close()?;
        }
        self.closed = true;

        info!(
            path = %self.path.display(),
            positions = self.positions.iter().flatten().count(),
            images = self.image_count(),
            "Closed dataset"
        );
        Ok(())
    }

    fn require_open(&self, operation: &str) -> Result<(), DatasetError> {
        if self.closed {
            Err(DatasetError::Lifecycle(format!(
                "{} not allowed: dataset {} is closed",
                operation, self.name
            )))
        } else {
            Ok(())
        }
    }

    fn require_unwritten(&self, operation: &str) -> Result<(), DatasetError> {
        self.require_open(operation)?;
        if self.positions.iter().any(Option::is_some) {
            Err(DatasetError::Lifecycle(format!(
                "{} not allowed after the first image",
                operation
            )))
        } else {
            Ok(())
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

    pub fn shape(&self) -> DatasetShape {
        self.shape
    }

    pub fn num_positions(&self) -> usize {
        self.positions.len()
    }

    /// Writer for a position, if it has been created.
    pub fn position(&self, index: usize) -> Option<&PositionWriter> {
        self.positions.get(index).and_then(Option::as_ref)
    }

    /// Names of the created positions, by index.
    pub fn position_names(&self) -> Vec<Option<&str>> {
        self.positions
            .iter()
            .map(|p| p.as_ref().map(PositionWriter::name))
            .collect()
    }

    pub fn image_count(&self) -> usize {
        self.positions
            .iter()
            .flatten()
            .map(PositionWriter::image_count)
            .sum()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Remove a position directory whose first image failed.
fn discard_position(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %e, "Cannot remove unused position directory");
    }
}

/// Overwriting is allowed only for a directory holding at least one position
/// sub-directory with a sidecar file.
fn check_overwritable(path: &Path) -> Result<(), DatasetError> {
    let refuse = |reason: &str| DatasetError::OverwriteRefused {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    if !path.is_dir() {
        return Err(refuse("path is not a directory"));
    }

    let has_position = fs::read_dir(path)?
        .filter_map(Result::ok)
        .any(|entry| entry.path().join(METADATA_FILE_NAME).is_file());
    if has_position {
        Ok(())
    } else {
        Err(refuse("directory does not contain a dataset"))
    }
}
