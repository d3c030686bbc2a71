//! Multi-position dataset reader.
//!
//! A dataset root contains one sub-directory per stage position, each with its
//! own `metadata.txt`. Listing order carries no meaning: every position is
//! placed by the index recovered from its image records.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::position_reader::{base_name, PositionReader};
use crate::error::{DatasetError, StorageError};
use crate::format::{ImageRecord, PixelArray, PixelType, METADATA_FILE_NAME};
use crate::io::{LocalStorage, StorageBackend};

/// Read-only view of a multi-position dataset.
pub struct DatasetReader<S: StorageBackend = LocalStorage> {
    path: String,
    name: String,
    readers: Vec<PositionReader<S>>,
    /// Position index to entry in `readers`.
    slots: BTreeMap<usize, usize>,
    num_positions: usize,
}

impl DatasetReader<LocalStorage> {
    /// Open a dataset root on the local filesystem.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_string_lossy().replace('\\', "/");
        Self::open_with(LocalStorage::new(), &path)
    }
}

impl<S: StorageBackend> DatasetReader<S> {
    /// Open a dataset root through `storage`.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::DatasetNotFound`] if the root is missing or has no
    ///   sub-directory with a sidecar file
    /// - [`DatasetError::Metadata`] if a position has no recoverable index,
    ///   records an index outside its declared position count, or two
    ///   positions claim the same one
    /// - any error from opening a position
    pub fn open_with(storage: S, path: &str) -> Result<Self, DatasetError> {
        let storage = Arc::new(storage);
        let path = path.trim_end_matches('/').to_string();

        let listed = match storage.list(&path) {
            Ok(listed) => listed,
            Err(StorageError::NotFound(_)) => {
                return Err(DatasetError::DatasetNotFound(path));
            }
            Err(e) => return Err(e.into()),
        };

        let position_dirs = position_directories(&path, &listed);
        if position_dirs.is_empty() {
            return Err(DatasetError::DatasetNotFound(path));
        }

        let mut readers = Vec::with_capacity(position_dirs.len());
        for dir in &position_dirs {
            let dir_path = storage.join(&path, dir);
            readers.push(PositionReader::open_shared(Arc::clone(&storage), &dir_path)?);
        }

        let mut indices = Vec::with_capacity(readers.len());
        for reader in &readers {
            indices.push(reader.position_index()?);
        }

        let mut slots = BTreeMap::new();
        for (entry, &index) in indices.iter().enumerate() {
            let declared = readers[entry].num_positions();
            if index >= declared {
                return Err(DatasetError::Metadata(format!(
                    "position {} records index {} but declares {} positions",
                    readers[entry].path(),
                    index,
                    declared
                )));
            }
            if let Some(previous) = slots.insert(index, entry) {
                return Err(DatasetError::Metadata(format!(
                    "positions {} and {} both claim index {}",
                    readers[previous].path(),
                    readers[entry].path(),
                    index
                )));
            }
        }

        // Indices are bounded by their declared counts, so this cannot overflow
        let num_positions = slots
            .keys()
            .next_back()
            .map_or(0, |&index| index + 1)
            .max(readers.first().map_or(0, PositionReader::num_positions));

        let missing = num_positions - slots.len();
        if missing > 0 {
            warn!(path = %path, missing, "Dataset has positions without data");
        }

        let name = base_name(&path).to_string();
        info!(path = %path, name = %name, positions = readers.len(), "Opened dataset");
        Ok(Self {
            path,
            name,
            readers,
            slots,
            num_positions,
        })
    }

    /// Reader for a position index.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidCoordinate`] if no position was found
    /// for `index`.
    pub fn position(&self, index: usize) -> Result<&PositionReader<S>, DatasetError> {
        self.slots
            .get(&index)
            .map(|&entry| &self.readers[entry])
            .ok_or_else(|| {
                DatasetError::InvalidCoordinate(format!(
                    "position={} (limit {})",
                    index, self.num_positions
                ))
            })
    }

    /// Metadata record of an image. See [`PositionReader::image_metadata`].
    pub fn image_metadata(
        &self,
        position: usize,
        channel: usize,
        z_slice: usize,
        frame: usize,
    ) -> Result<ImageRecord, DatasetError> {
        self.position(position)?
            .image_metadata(channel, z_slice, frame)
    }

    /// Pixel data of an image. See [`PositionReader::image_pixels`].
    pub fn image_pixels(
        &self,
        position: usize,
        channel: usize,
        z_slice: usize,
        frame: usize,
    ) -> Result<PixelArray, DatasetError> {
        self.position(position)?
            .image_pixels(channel, z_slice, frame)
    }

    /// Channel index for a name, resolved against the first position.
    pub fn resolve_channel(&self, name: &str) -> Result<usize, DatasetError> {
        self.first().resolve_channel(name)
    }

    fn first(&self) -> &PositionReader<S> {
        // Readers are never empty after open
        let entry = self.slots.values().next().copied().unwrap_or(0);
        &self.readers[entry]
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Dataset name (base name of the root).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of position slots (highest index found plus one, at least the
    /// declared position count).
    pub fn num_positions(&self) -> usize {
        self.num_positions
    }

    /// Names of the positions present, in index order.
    pub fn position_labels(&self) -> Vec<String> {
        self.slots
            .values()
            .map(|&entry| self.readers[entry].name().to_string())
            .collect()
    }

    /// Position indices present, in order.
    pub fn position_indices(&self) -> Vec<usize> {
        self.slots.keys().copied().collect()
    }

    pub fn width(&self) -> u32 {
        self.first().width()
    }

    pub fn height(&self) -> u32 {
        self.first().height()
    }

    pub fn pixel_type(&self) -> PixelType {
        self.first().pixel_type()
    }

    pub fn bit_depth(&self) -> u32 {
        self.first().bit_depth()
    }

    pub fn num_channels(&self) -> usize {
        self.first().num_channels()
    }

    pub fn num_z_slices(&self) -> usize {
        self.first().num_z_slices()
    }

    pub fn num_frames(&self) -> usize {
        self.first().num_frames()
    }

    pub fn channel_names(&self) -> &[String] {
        self.first().channel_names()
    }

    pub fn channel_colors(&self) -> Vec<u32> {
        self.first().channel_colors()
    }

    pub fn pixel_size(&self) -> f64 {
        self.first().pixel_size()
    }

    pub fn summary_metadata(&self) -> &Map<String, Value> {
        self.first().summary_metadata()
    }

    /// Total number of image records across positions.
    pub fn image_count(&self) -> usize {
        self.readers.iter().map(PositionReader::image_count).sum()
    }
}

impl<S: StorageBackend> std::fmt::Debug for DatasetReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetReader")
            .field("path", &self.path)
            .field("positions", &self.readers)
            .field("slots", &self.slots)
            .field("num_positions", &self.num_positions)
            .finish()
    }
}

/// Immediate sub-directories of `root` that hold a sidecar file, sorted.
fn position_directories(root: &str, listed: &[String]) -> BTreeSet<String> {
    let prefix = if root.is_empty() {
        String::new()
    } else {
        format!("{}/", root)
    };

    listed
        .iter()
        .filter_map(|path| path.strip_prefix(&prefix))
        .filter_map(|relative| {
            let mut parts = relative.split('/');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(dir), Some(METADATA_FILE_NAME), None) if !dir.is_empty() => {
                    Some(dir.to_string())
                }
                _ => None,
            }
        })
        .collect()
}
