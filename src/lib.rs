//! # G2S Dataset
//!
//! Reader and writer for multi-dimensional microscopy datasets in the
//! Go2Scope / Micro-Manager layout: one directory per stage position, each
//! holding a JSON sidecar (`metadata.txt`) and one TIFF file per image plane.
//!
//! Images are addressed by a 4-D coordinate (position, channel, z-slice,
//! frame). The coordinate space is declared up front but may be sparsely
//! populated.
//!
//! ## Architecture
//!
//! - [`io`] - Storage backends (local filesystem, S3)
//! - [`mod@format`] - Metadata vocabulary, coordinate keys, sidecar files and
//!   the TIFF codec
//! - [`dataset`] - Position and multi-position readers and writers
//! - [`config`] - Writer configuration and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use g2s_dataset::{
//!     Coordinate, DatasetReader, DatasetShape, DatasetWriter, PixelArray, PixelType,
//!     WriterConfig, WriterIdentity,
//! };
//! use ndarray::Array2;
//!
//! # fn main() -> Result<(), g2s_dataset::DatasetError> {
//! let config = WriterConfig::new(WriterIdentity::from_env());
//! let shape = DatasetShape::new(1, 1, 1, 1);
//!
//! let mut writer = DatasetWriter::open("/data", "run1", shape, false, config, None)?;
//! writer.initialize(256, 200, PixelType::Gray16, 0)?;
//! let plane = PixelArray::from(Array2::<u16>::zeros((200, 256)));
//! writer.add_image(&plane, Coordinate::new(0, 0, 0, 0), None, None)?;
//! writer.close()?;
//!
//! let reader = DatasetReader::open("/data/run1")?;
//! let pixels = reader.image_pixels(0, 0, 0, 0)?;
//! assert_eq!(pixels, plane);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod format;
pub mod io;

// Re-export commonly used types
pub use config::{WriterConfig, WriterIdentity};
pub use dataset::{
    ChannelSelector, DatasetReader, DatasetWriter, PositionReader, PositionWriter, WriterState,
};
pub use error::{CodecError, DatasetError, StorageError};
pub use format::{
    ChannelDef, Coordinate, DatasetShape, ImageCodec, ImageRecord, KeyFormat, PixelArray,
    PixelFormat, PixelType, Summary, TiffCodec,
};
pub use io::{create_s3_client, LocalStorage, S3Storage, StorageBackend};
