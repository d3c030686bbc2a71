//! Reader for a single position sub-dataset.
//!
//! A position directory holds one `metadata.txt` sidecar and the image files it
//! references. The sidecar is read and parsed once at open; pixel data is
//! fetched from storage on every call and never cached.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{DatasetError, StorageError};
use crate::format::key::lookup;
use crate::format::{
    image_meta, is_frame_key, sidecar, value_as_usize, Coordinate, ImageCodec, ImageRecord,
    KeyFormat, PixelArray, PixelType, Summary, TiffCodec, KEY_SUMMARY, METADATA_FILE_NAME,
};
use crate::io::{LocalStorage, StorageBackend};

// =============================================================================
// Channel Selector
// =============================================================================

/// Channel addressed either by index or by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSelector<'a> {
    Index(usize),
    Name(&'a str),
}

impl From<usize> for ChannelSelector<'_> {
    fn from(index: usize) -> Self {
        ChannelSelector::Index(index)
    }
}

impl<'a> From<&'a str> for ChannelSelector<'a> {
    fn from(name: &'a str) -> Self {
        ChannelSelector::Name(name)
    }
}

impl<'a> From<&'a String> for ChannelSelector<'a> {
    fn from(name: &'a String) -> Self {
        ChannelSelector::Name(name.as_str())
    }
}

// =============================================================================
// Position Reader
// =============================================================================

/// Read-only view of one position sub-dataset.
///
/// Generic over the storage backend so the same reader serves local
/// directories and remote object stores.
pub struct PositionReader<S: StorageBackend = LocalStorage> {
    storage: Arc<S>,
    path: String,
    name: String,
    metadata: Map<String, Value>,
    summary_raw: Map<String, Value>,
    summary: Summary,
    key_format: Option<KeyFormat>,
    position_index: Option<usize>,
    codec: TiffCodec,
}

impl PositionReader<LocalStorage> {
    /// Open a position directory on the local filesystem.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_string_lossy().replace('\\', "/");
        Self::open_with(LocalStorage::new(), &path)
    }
}

impl<S: StorageBackend> PositionReader<S> {
    /// Open a position directory through `storage`.
    pub fn open_with(storage: S, path: &str) -> Result<Self, DatasetError> {
        Self::open_shared(Arc::new(storage), path)
    }

    /// Open a position directory through a storage backend shared with other
    /// readers.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::Storage`] if the sidecar cannot be fetched
    /// - [`DatasetError::Format`] if the sidecar is not UTF-8 text or not a
    ///   JSON object
    /// - [`DatasetError::Metadata`] if the summary is absent or lacks a
    ///   mandatory field
    pub fn open_shared(storage: Arc<S>, path: &str) -> Result<Self, DatasetError> {
        let path = path.trim_end_matches('/').to_string();
        let sidecar_path = storage.join(&path, METADATA_FILE_NAME);
        let text = storage
            .get_text(&sidecar_path)
            .map_err(|e| match e {
                StorageError::InvalidText(_) => DatasetError::Format {
                    path: sidecar_path.clone(),
                    message: "not valid UTF-8 text".to_string(),
                },
                other => other.into(),
            })?;
        let metadata = sidecar::parse(&sidecar_path, &text)?;

        let summary_value = metadata
            .get(KEY_SUMMARY)
            .filter(|v| v.is_object())
            .ok_or_else(|| {
                DatasetError::Metadata(format!("no summary object in {}", sidecar_path))
            })?;
        let summary = Summary::from_value(summary_value)?;
        let summary_raw = summary_value.as_object().cloned().unwrap_or_default();

        let name = summary
            .prefix
            .clone()
            .unwrap_or_else(|| base_name(&path).to_string());

        let key_format = KeyFormat::detect(metadata.keys().map(String::as_str));
        let position_index = metadata
            .iter()
            .filter(|(key, _)| is_frame_key(key))
            .find_map(|(_, record)| record.get(image_meta::POS_INDEX).and_then(value_as_usize));

        let reader = Self {
            storage,
            path,
            name,
            metadata,
            summary_raw,
            summary,
            key_format,
            position_index,
            codec: TiffCodec::new(),
        };

        info!(
            path = %reader.path,
            name = %reader.name,
            images = reader.image_count(),
            key_format = ?reader.key_format,
            "Opened position dataset"
        );
        Ok(reader)
    }

    /// Position index recovered from the image records.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Metadata`] when no image record carries a
    /// `PositionIndex` field.
    pub fn position_index(&self) -> Result<usize, DatasetError> {
        self.position_index.ok_or_else(|| {
            DatasetError::Metadata(format!("no image in {} records a position index", self.path))
        })
    }

    /// Resolve a channel selector to a channel index.
    ///
    /// Names must match exactly. Indices are returned unchecked; range checks
    /// happen when the coordinate is used.
    pub fn resolve_channel<'a>(
        &self,
        channel: impl Into<ChannelSelector<'a>>,
    ) -> Result<usize, DatasetError> {
        match channel.into() {
            ChannelSelector::Index(index) => Ok(index),
            ChannelSelector::Name(name) => self
                .summary
                .channel_names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| {
                    DatasetError::InvalidCoordinate(format!(
                        "channel name {} not found in {:?}",
                        name, self.summary.channel_names
                    ))
                }),
        }
    }

    /// Metadata record of the image at the given coordinates.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::InvalidCoordinate`] if a coordinate is outside the
    ///   declared shape
    /// - [`DatasetError::Metadata`] if the dataset holds no image there
    pub fn image_metadata(
        &self,
        channel: usize,
        z_slice: usize,
        frame: usize,
    ) -> Result<ImageRecord, DatasetError> {
        let (_, record) = self.find_record(channel, z_slice, frame)?;
        Ok(record)
    }

    /// Pixel data of the image at the given coordinates.
    ///
    /// # Errors
    ///
    /// Same as [`image_metadata`](Self::image_metadata), plus
    /// [`DatasetError::Metadata`] when the record has no file name and
    /// [`DatasetError::ImageRead`] when the file cannot be fetched or decoded.
    pub fn image_pixels(
        &self,
        channel: usize,
        z_slice: usize,
        frame: usize,
    ) -> Result<PixelArray, DatasetError> {
        let (key, record) = self.find_record(channel, z_slice, frame)?;
        let file_name = record.file_name().ok_or_else(|| {
            DatasetError::Metadata(format!("image record {} has no file name", key))
        })?;

        let file_path = self.storage.join(&self.path, file_name);
        let data = self
            .storage
            .get_bytes(&file_path)
            .map_err(|e| DatasetError::ImageRead {
                path: file_path.clone(),
                message: e.to_string(),
            })?;

        let pixels = self
            .codec
            .decode(&data)
            .map_err(|e| DatasetError::ImageRead {
                path: file_path.clone(),
                message: e.to_string(),
            })?;
        if pixels.is_empty() {
            return Err(DatasetError::ImageRead {
                path: file_path,
                message: "decoded image is empty".to_string(),
            });
        }

        debug!(path = %file_path, shape = ?pixels.shape(), "Read image");
        Ok(pixels)
    }

    fn find_record(
        &self,
        channel: usize,
        z_slice: usize,
        frame: usize,
    ) -> Result<(String, ImageRecord), DatasetError> {
        self.check_coordinates(channel, z_slice, frame)?;

        let coord = Coordinate::new(self.position_index.unwrap_or(0), channel, z_slice, frame);
        let (key, value) = lookup(
            &self.metadata,
            self.key_format,
            &coord,
            self.position_index.is_some(),
        )
        .ok_or_else(|| {
            DatasetError::Metadata(format!(
                "no image at channel={}, slice={}, frame={} in {}",
                channel, z_slice, frame, self.path
            ))
        })?;

        let record = ImageRecord::from_value(value)
            .ok_or_else(|| DatasetError::Metadata(format!("image record {} is not an object", key)))?;
        Ok((key, record))
    }

    fn check_coordinates(
        &self,
        channel: usize,
        z_slice: usize,
        frame: usize,
    ) -> Result<(), DatasetError> {
        let checks = [
            ("channel", channel, self.num_channels()),
            ("slice", z_slice, self.num_z_slices()),
            ("frame", frame, self.num_frames()),
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

    /// Position name (summary `Prefix`, else the directory name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory path as given to the storage backend.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.summary.width
    }

    pub fn height(&self) -> u32 {
        self.summary.height
    }

    pub fn pixel_type(&self) -> PixelType {
        self.summary.pixel_type
    }

    pub fn bit_depth(&self) -> u32 {
        self.summary.bit_depth
    }

    pub fn num_channels(&self) -> usize {
        self.summary.channel_names.len()
    }

    pub fn num_z_slices(&self) -> usize {
        self.summary.slices
    }

    pub fn num_frames(&self) -> usize {
        self.summary.frames
    }

    /// Position count declared by the summary.
    pub fn num_positions(&self) -> usize {
        self.summary.positions
    }

    pub fn channel_names(&self) -> &[String] {
        &self.summary.channel_names
    }

    pub fn channel_colors(&self) -> Vec<u32> {
        self.summary.colors()
    }

    /// Pixel size in microns.
    pub fn pixel_size(&self) -> f64 {
        self.summary.pixel_size_um
    }

    /// The raw summary object, including producer fields.
    pub fn summary_metadata(&self) -> &Map<String, Value> {
        &self.summary_raw
    }

    /// Key form detected in the sidecar, `None` when it holds no images.
    pub fn key_format(&self) -> Option<KeyFormat> {
        self.key_format
    }

    /// Number of image records.
    pub fn image_count(&self) -> usize {
        self.metadata.keys().filter(|k| is_frame_key(k)).count()
    }

    /// Image record keys in file order.
    pub fn image_keys(&self) -> impl Iterator<Item = &str> {
        self.metadata
            .keys()
            .map(String::as_str)
            .filter(|k| is_frame_key(k))
    }
}

impl<S: StorageBackend> std::fmt::Debug for PositionReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionReader")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("images", &self.image_count())
            .field("key_format", &self.key_format)
            .finish()
    }
}

/// Last path component.
pub(crate) fn base_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}
