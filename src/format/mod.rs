//! On-disk format: metadata vocabulary, coordinate keys, sidecar files and the
//! image codec.

pub mod codec;
pub mod key;
pub mod record;
pub mod schema;
pub mod sidecar;

pub use codec::{ImageCodec, PixelArray, TiffCodec};
pub use key::{is_frame_key, Coordinate, KeyFormat, FRAME_KEY_PREFIX};
pub use record::{value_as_usize, ImageRecord, Summary};
pub use schema::{
    image_file_name, image_meta, stage_meta, summary_meta, ChannelDef, DatasetShape, PixelFormat,
    PixelType, DEFAULT_CHANNEL_COLOR, KEY_SUMMARY, METADATA_FILE_NAME, METADATA_VERSION,
    SOURCE_NAME,
};
