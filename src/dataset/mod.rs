//! Dataset readers and writers.
//!
//! A dataset is a directory with one sub-directory per stage position:
//!
//! ```text
//! {root}/
//! ├── Pos-0/
//! │   ├── metadata.txt
//! │   ├── img_000000000_DAPI_000.tif
//! │   └── ...
//! └── Pos-1/
//!     └── ...
//! ```
//!
//! [`PositionReader`] and [`PositionWriter`] handle one position directory;
//! [`DatasetReader`] and [`DatasetWriter`] compose them.

mod position_reader;
mod position_writer;
mod reader;
mod writer;

pub use position_reader::{ChannelSelector, PositionReader};
pub use position_writer::{PositionWriter, WriterState};
pub use reader::DatasetReader;
pub use writer::DatasetWriter;
