//! Coordinate key codec.
//!
//! Image records in a sidecar file are keyed by a string derived from the
//! image coordinates. Two forms exist in the wild:
//!
//! - **Legacy**: `FrameKey-{frame}-{channel}-{slice}`; the position index is
//!   only stored inside the record.
//! - **Positional**: `FrameKey-{position}-{frame}-{channel}-{slice}`.
//!
//! Lookups always re-encode the query and probe the map; keys are never parsed
//! back into coordinates.

use serde_json::{Map, Value};

/// Prefix shared by every image key.
pub const FRAME_KEY_PREFIX: &str = "FrameKey";

/// A point in the 4-D coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coordinate {
    pub position: usize,
    pub channel: usize,
    pub z_slice: usize,
    pub frame: usize,
}

impl Coordinate {
    pub const fn new(position: usize, channel: usize, z_slice: usize, frame: usize) -> Self {
        Self {
            position,
            channel,
            z_slice,
            frame,
        }
    }
}

/// Which key form to emit or probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyFormat {
    /// Three coordinates, position stored out of band.
    Legacy,
    /// Four coordinates, position first.
    #[default]
    Positional,
}

impl KeyFormat {
    /// Encode a coordinate in this form.
    pub fn encode(&self, coord: &Coordinate) -> String {
        match self {
            KeyFormat::Legacy => format!(
                "{}-{}-{}-{}",
                FRAME_KEY_PREFIX, coord.frame, coord.channel, coord.z_slice
            ),
            KeyFormat::Positional => format!(
                "{}-{}-{}-{}-{}",
                FRAME_KEY_PREFIX, coord.position, coord.frame, coord.channel, coord.z_slice
            ),
        }
    }

    /// Number of numeric fields after the prefix.
    pub const fn arity(&self) -> usize {
        match self {
            KeyFormat::Legacy => 3,
            KeyFormat::Positional => 4,
        }
    }

    /// The other form.
    pub const fn other(&self) -> KeyFormat {
        match self {
            KeyFormat::Legacy => KeyFormat::Positional,
            KeyFormat::Positional => KeyFormat::Legacy,
        }
    }

    /// Detect the form used by a set of keys from the first image key found.
    ///
    /// Returns `None` when no key carries the image key prefix with a known
    /// arity (e.g. a summary-only sidecar).
    pub fn detect<'a>(keys: impl IntoIterator<Item = &'a str>) -> Option<KeyFormat> {
        keys.into_iter().find_map(Self::of_key)
    }

    /// The form of a single key, if it is an image key.
    pub fn of_key(key: &str) -> Option<KeyFormat> {
        let rest = key.strip_prefix(FRAME_KEY_PREFIX)?.strip_prefix('-')?;
        let fields: Vec<&str> = rest.split('-').collect();
        if fields.iter().any(|f| f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit())) {
            return None;
        }
        match fields.len() {
            3 => Some(KeyFormat::Legacy),
            4 => Some(KeyFormat::Positional),
            _ => None,
        }
    }

    /// Order in which to probe: the detected form first, then the other.
    pub fn probe_order(detected: Option<KeyFormat>) -> [KeyFormat; 2] {
        let first = detected.unwrap_or(KeyFormat::Legacy);
        [first, first.other()]
    }
}

/// Whether a sidecar key names an image record.
pub fn is_frame_key(key: &str) -> bool {
    key.starts_with(FRAME_KEY_PREFIX)
}

/// Find the record for `coord` in a metadata map, trying both key forms.
///
/// The positional form needs the position index; when `position_known` is
/// false only the legacy form is probed.
pub fn lookup<'a>(
    metadata: &'a Map<String, Value>,
    detected: Option<KeyFormat>,
    coord: &Coordinate,
    position_known: bool,
) -> Option<(String, &'a Value)> {
    KeyFormat::probe_order(detected)
        .into_iter()
        .filter(|format| position_known || *format == KeyFormat::Legacy)
        .find_map(|format| {
            let key = format.encode(coord);
            metadata.get(&key).map(|value| (key, value))
        })
}
