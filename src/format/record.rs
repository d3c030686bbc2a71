//! Typed views over summary and image metadata records.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::schema::{image_meta, PixelType, DEFAULT_CHANNEL_COLOR};
use crate::error::DatasetError;

/// Read a non-negative integer that may have been stored as a number or as a
/// numeric string.
pub fn value_as_usize(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Summary
// =============================================================================

fn default_pixel_size() -> f64 {
    1.0
}

/// Typed subset of the summary record.
///
/// Only the coordinate-shape fields and the pixel type are mandatory; producers
/// disagree on everything else, so the rest is optional with a fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct Summary {
    #[serde(rename = "Prefix", default)]
    pub prefix: Option<String>,

    #[serde(rename = "Source", default)]
    pub source: Option<String>,

    #[serde(rename = "ChNames")]
    pub channel_names: Vec<String>,

    #[serde(rename = "ChColors", alias = "Colors", default)]
    pub channel_colors: Option<Vec<i64>>,

    #[serde(rename = "Slices")]
    pub slices: usize,

    #[serde(rename = "Frames")]
    pub frames: usize,

    #[serde(rename = "Positions")]
    pub positions: usize,

    #[serde(rename = "Width", default)]
    pub width: u32,

    #[serde(rename = "Height", default)]
    pub height: u32,

    #[serde(rename = "PixelType")]
    pub pixel_type: PixelType,

    #[serde(rename = "PixelSize_um", default = "default_pixel_size")]
    pub pixel_size_um: f64,

    #[serde(rename = "BitDepth", default)]
    pub bit_depth: u32,
}

impl Summary {
    /// Extract the typed summary from the raw `Summary` object.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Metadata`] if a mandatory field is absent or has
    /// the wrong type.
    pub fn from_value(value: &Value) -> Result<Self, DatasetError> {
        Summary::deserialize(value)
            .map_err(|e| DatasetError::Metadata(format!("invalid summary metadata: {}", e)))
    }

    /// Display color of each channel, white when not recorded.
    pub fn colors(&self) -> Vec<u32> {
        (0..self.channel_names.len())
            .map(|i| {
                self.channel_colors
                    .as_ref()
                    .and_then(|colors| colors.get(i))
                    .map(|&c| c as u32)
                    .unwrap_or(DEFAULT_CHANNEL_COLOR)
            })
            .collect()
    }
}

// =============================================================================
// ImageRecord
// =============================================================================

/// Per-image metadata record.
///
/// A thin wrapper over the JSON object stored in the sidecar file, with typed
/// getters for the well-known fields. Producers may add any other field; those
/// are preserved as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageRecord {
    fields: Map<String, Value>,
}

impl ImageRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing field map.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a record from a JSON value, which must be an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned().map(Self::from_map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_elapsed_ms(self, elapsed_ms: f64) -> Self {
        self.with_field(image_meta::ELAPSED_TIME_MS, elapsed_ms)
    }

    /// Stage coordinates in microns.
    pub fn with_stage_position(self, x_um: f64, y_um: f64, z_um: f64) -> Self {
        self.with_field(image_meta::XUM, x_um)
            .with_field(image_meta::YUM, y_um)
            .with_field(image_meta::ZUM, z_um)
    }

    pub fn with_position_name(self, name: impl Into<String>) -> Self {
        self.with_field(image_meta::POS_NAME, name.into())
    }

    fn usize_field(&self, key: &str) -> Option<usize> {
        self.fields.get(key).and_then(value_as_usize)
    }

    fn f64_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn width(&self) -> Option<u32> {
        self.usize_field(image_meta::WIDTH).map(|w| w as u32)
    }

    pub fn height(&self) -> Option<u32> {
        self.usize_field(image_meta::HEIGHT).map(|h| h as u32)
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.str_field(image_meta::CHANNEL)
    }

    pub fn channel_index(&self) -> Option<usize> {
        self.usize_field(image_meta::CHANNEL_INDEX)
    }

    pub fn slice_index(&self) -> Option<usize> {
        self.usize_field(image_meta::SLICE_INDEX)
            .or_else(|| self.usize_field(image_meta::SLICE))
    }

    pub fn frame_index(&self) -> Option<usize> {
        self.usize_field(image_meta::FRAME_INDEX)
            .or_else(|| self.usize_field(image_meta::FRAME))
    }

    pub fn position_index(&self) -> Option<usize> {
        self.usize_field(image_meta::POS_INDEX)
    }

    pub fn position_name(&self) -> Option<&str> {
        self.str_field(image_meta::POS_NAME)
    }

    pub fn elapsed_ms(&self) -> Option<f64> {
        self.f64_field(image_meta::ELAPSED_TIME_MS)
    }

    pub fn x_um(&self) -> Option<f64> {
        self.f64_field(image_meta::XUM)
    }

    pub fn y_um(&self) -> Option<f64> {
        self.f64_field(image_meta::YUM)
    }

    pub fn z_um(&self) -> Option<f64> {
        self.f64_field(image_meta::ZUM)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.str_field(image_meta::FILE_NAME)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.str_field(super::schema::summary_meta::UUID)
    }
}

impl From<Map<String, Value>> for ImageRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_map(fields)
    }
}

impl From<ImageRecord> for Value {
    fn from(record: ImageRecord) -> Self {
        Value::Object(record.fields)
    }
}
