//! Metadata vocabulary shared by readers and writers.
//!
//! Field names are part of the on-disk contract with other tools (Micro-Manager
//! and the Go2Scope Java/Python implementations) and must not change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name of the sidecar metadata file in every position directory.
pub const METADATA_FILE_NAME: &str = "metadata.txt";

/// Top-level sidecar field holding the summary record.
pub const KEY_SUMMARY: &str = "Summary";

/// Value written to the summary `Source` field.
pub const SOURCE_NAME: &str = "G2SDataset";

/// Metadata version written by this crate. Must stay below 10.
pub const METADATA_VERSION: u32 = 9;

/// Default channel display color (white).
pub const DEFAULT_CHANNEL_COLOR: u32 = 0xFF_FF_FF;

/// Summary (dataset-level) field names.
pub mod summary_meta {
    pub const PREFIX: &str = "Prefix";
    pub const SOURCE: &str = "Source";
    pub const VERSION: &str = "MetadataVersion";
    pub const UUID: &str = "UUID";

    // Intended coordinate space limits. Images may be missing.
    pub const CHANNELS: &str = "Channels";
    pub const SLICES: &str = "Slices";
    pub const FRAMES: &str = "Frames";
    pub const POSITIONS: &str = "Positions";
    pub const CHANNEL_NAMES: &str = "ChNames";
    pub const CHANNEL_COLORS: &str = "ChColors";
    /// Older producers wrote channel colors under this name.
    pub const CHANNEL_COLORS_LEGACY: &str = "Colors";

    pub const STAGE_POSITIONS: &str = "StagePositions";

    pub const WIDTH: &str = "Width";
    pub const HEIGHT: &str = "Height";
    pub const PIXEL_TYPE: &str = "PixelType";
    pub const PIXEL_SIZE: &str = "PixelSize_um";
    pub const BIT_DEPTH: &str = "BitDepth";
    pub const PIXEL_ASPECT: &str = "PixelAspect";
    pub const NUMBER_OF_COMPONENTS: &str = "NumComponents";

    pub const TIME_FIRST: &str = "TimeFirst";
    pub const SLICES_FIRST: &str = "SlicesFirst";
    pub const COMPUTER_NAME: &str = "ComputerName";
    pub const USER_NAME: &str = "UserName";
    pub const TIME: &str = "Time";
}

/// Per-image field names.
pub mod image_meta {
    pub const WIDTH: &str = "Width";
    pub const HEIGHT: &str = "Height";
    /// Holds the channel name; the channel index lives in [`CHANNEL_INDEX`].
    pub const CHANNEL: &str = "Channel";
    pub const FRAME: &str = "Frame";
    pub const SLICE: &str = "Slice";
    pub const CHANNEL_INDEX: &str = "ChannelIndex";
    pub const SLICE_INDEX: &str = "SliceIndex";
    pub const FRAME_INDEX: &str = "FrameIndex";
    pub const POS_NAME: &str = "PositionName";
    pub const POS_INDEX: &str = "PositionIndex";
    pub const XUM: &str = "XPositionUm";
    pub const YUM: &str = "YPositionUm";
    pub const ZUM: &str = "ZPositionUm";
    pub const FILE_NAME: &str = "FileName";
    pub const ELAPSED_TIME_MS: &str = "ElapsedTime-ms";
}

/// Stage position list entry field names.
pub mod stage_meta {
    pub const LABEL: &str = "Label";
    pub const GRID_ROW: &str = "GridRow";
    pub const GRID_COL: &str = "GridCol";
}

// =============================================================================
// PixelType
// =============================================================================

/// Pixel type of every image in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "GRAY8")]
    Gray8,
    #[serde(rename = "GRAY16")]
    Gray16,
    #[serde(rename = "GRAY32")]
    Gray32,
    /// 4 x 8-bit color
    #[serde(rename = "RGB32")]
    Rgb32,
    /// 4 x 16-bit color
    #[serde(rename = "RGB64")]
    Rgb64,
}

impl PixelType {
    /// The string stored in metadata.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PixelType::None => "NONE",
            PixelType::Gray8 => "GRAY8",
            PixelType::Gray16 => "GRAY16",
            PixelType::Gray32 => "GRAY32",
            PixelType::Rgb32 => "RGB32",
            PixelType::Rgb64 => "RGB64",
        }
    }

    /// Number of components per pixel.
    pub const fn components(&self) -> u32 {
        match self {
            PixelType::Rgb32 | PixelType::Rgb64 => 4,
            _ => 1,
        }
    }

    /// Bit depth of a full-range component, used when no explicit bit depth
    /// is given.
    pub const fn default_bit_depth(&self) -> u32 {
        match self {
            PixelType::None => 0,
            PixelType::Gray8 | PixelType::Rgb32 => 8,
            PixelType::Gray16 | PixelType::Rgb64 => 16,
            PixelType::Gray32 => 32,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(PixelType::None),
            "GRAY8" => Ok(PixelType::Gray8),
            "GRAY16" => Ok(PixelType::Gray16),
            "GRAY32" => Ok(PixelType::Gray32),
            "RGB32" => Ok(PixelType::Rgb32),
            "RGB64" => Ok(PixelType::Rgb64),
            other => Err(format!("unknown pixel type: {}", other)),
        }
    }
}

// =============================================================================
// Channels and Shape
// =============================================================================

/// Channel name and display color. Channel index is the position in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDef {
    pub name: String,
    pub color: u32,
}

impl ChannelDef {
    pub fn new(name: impl Into<String>, color: u32) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }

    /// A white channel with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_CHANNEL_COLOR)
    }
}

/// Declared coordinate space of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatasetShape {
    pub positions: usize,
    pub channels: usize,
    pub z_slices: usize,
    pub frames: usize,
}

impl DatasetShape {
    pub const fn new(positions: usize, channels: usize, z_slices: usize, frames: usize) -> Self {
        Self {
            positions,
            channels,
            z_slices,
            frames,
        }
    }
}

/// Fixed image format of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_type: PixelType,
    pub bit_depth: u32,
}

impl PixelFormat {
    pub const fn components(&self) -> u32 {
        self.pixel_type.components()
    }
}

/// Deterministic image file name for a plane.
pub fn image_file_name(frame: usize, channel_name: &str, z_slice: usize) -> String {
    format!("img_{:09}_{}_{:03}.tif", frame, channel_name, z_slice)
}
