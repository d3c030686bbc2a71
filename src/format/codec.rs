//! Pixel arrays and the TIFF image codec.
//!
//! Image planes are handled as `ndarray` arrays in row-major `(height, width)`
//! order, or `(height, width, 4)` for color. The element type and the number
//! of dimensions together determine the [`PixelType`]:
//!
//! | element | shape          | pixel type |
//! |---------|----------------|------------|
//! | `u8`    | `(h, w)`       | `GRAY8`    |
//! | `u16`   | `(h, w)`       | `GRAY16`   |
//! | `u32`   | `(h, w)`       | `GRAY32`   |
//! | `u8`    | `(h, w, 4)`    | `RGB32`    |
//! | `u16`   | `(h, w, 4)`    | `RGB64`    |
//!
//! Encoding is lossless, so a decoded plane is bit-identical to the written
//! one.

use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgba};
use ndarray::{Array2, Array3, ArrayD, IxDyn};

use super::schema::PixelType;
use crate::error::CodecError;

// =============================================================================
// PixelArray
// =============================================================================

/// A single image plane.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelArray {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
}

impl PixelArray {
    /// Array shape.
    pub fn shape(&self) -> &[usize] {
        match self {
            PixelArray::U8(a) => a.shape(),
            PixelArray::U16(a) => a.shape(),
            PixelArray::U32(a) => a.shape(),
        }
    }

    /// Number of array dimensions.
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Pixel rows (array axis 0).
    pub fn height(&self) -> u32 {
        self.shape().first().copied().unwrap_or(0) as u32
    }

    /// Row length (array axis 1).
    pub fn width(&self) -> u32 {
        self.shape().get(1).copied().unwrap_or(0) as u32
    }

    /// Whether the array holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.shape().iter().any(|&d| d == 0) || self.ndim() < 2
    }

    /// Name of the element type.
    pub const fn element_name(&self) -> &'static str {
        match self {
            PixelArray::U8(_) => "u8",
            PixelArray::U16(_) => "u16",
            PixelArray::U32(_) => "u32",
        }
    }

    /// Human-readable description for error messages, e.g. `u16 array [200, 256]`.
    pub fn describe(&self) -> String {
        format!("{} array {:?}", self.element_name(), self.shape())
    }

    /// Infer the pixel type from element type and dimensionality.
    ///
    /// Returns `None` for layouts that have no pixel type (3-D arrays whose last
    /// axis is not 4, `u32` color, arrays of other rank).
    pub fn pixel_type(&self) -> Option<PixelType> {
        let shape = self.shape();
        let color = shape.len() == 3 && shape[2] == 4;
        match (self, shape.len(), color) {
            (PixelArray::U8(_), 2, _) => Some(PixelType::Gray8),
            (PixelArray::U16(_), 2, _) => Some(PixelType::Gray16),
            (PixelArray::U32(_), 2, _) => Some(PixelType::Gray32),
            (PixelArray::U8(_), 3, true) => Some(PixelType::Rgb32),
            (PixelArray::U16(_), 3, true) => Some(PixelType::Rgb64),
            _ => None,
        }
    }
}

impl From<Array2<u8>> for PixelArray {
    fn from(a: Array2<u8>) -> Self {
        PixelArray::U8(a.into_dyn())
    }
}

impl From<Array2<u16>> for PixelArray {
    fn from(a: Array2<u16>) -> Self {
        PixelArray::U16(a.into_dyn())
    }
}

impl From<Array2<u32>> for PixelArray {
    fn from(a: Array2<u32>) -> Self {
        PixelArray::U32(a.into_dyn())
    }
}

impl From<Array3<u8>> for PixelArray {
    fn from(a: Array3<u8>) -> Self {
        PixelArray::U8(a.into_dyn())
    }
}

impl From<Array3<u16>> for PixelArray {
    fn from(a: Array3<u16>) -> Self {
        PixelArray::U16(a.into_dyn())
    }
}

// =============================================================================
// Codec Trait
// =============================================================================

/// Single-plane image codec.
pub trait ImageCodec {
    /// Encode a plane into a file byte stream.
    fn encode(&self, pixels: &PixelArray) -> Result<Vec<u8>, CodecError>;

    /// Decode a file byte stream into a plane.
    fn decode(&self, data: &[u8]) -> Result<PixelArray, CodecError>;
}

// =============================================================================
// TIFF Codec
// =============================================================================

/// Lossless TIFF codec for image planes.
///
/// Delegates the actual file format to the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct TiffCodec {}

impl TiffCodec {
    /// Create a new TIFF codec.
    pub fn new() -> Self {
        Self {}
    }
}

impl ImageCodec for TiffCodec {
    /// Encode a plane as a TIFF byte stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the array has no pixel type the codec can store
    /// (`GRAY32` has no TIFF representation here) or the encoder fails.
    fn encode(&self, pixels: &PixelArray) -> Result<Vec<u8>, CodecError> {
        let width = pixels.width();
        let height = pixels.height();
        let pixel_type = pixels
            .pixel_type()
            .ok_or_else(|| CodecError::Unsupported(pixels.describe()))?;

        let img = match (pixels, pixel_type) {
            (PixelArray::U8(a), PixelType::Gray8) => {
                ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(width, height, a.iter().copied().collect())
                    .map(DynamicImage::ImageLuma8)
            }
            (PixelArray::U16(a), PixelType::Gray16) => {
                ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(width, height, a.iter().copied().collect())
                    .map(DynamicImage::ImageLuma16)
            }
            (PixelArray::U8(a), PixelType::Rgb32) => {
                ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, a.iter().copied().collect())
                    .map(DynamicImage::ImageRgba8)
            }
            (PixelArray::U16(a), PixelType::Rgb64) => {
                ImageBuffer::<Rgba<u16>, Vec<u16>>::from_raw(width, height, a.iter().copied().collect())
                    .map(DynamicImage::ImageRgba16)
            }
            _ => return Err(CodecError::Unsupported(pixels.describe())),
        }
        .ok_or_else(|| CodecError::EncodeError {
            message: format!("buffer does not match {}x{}", width, height),
        })?;

        let mut output = Cursor::new(Vec::new());
        img.write_to(&mut output, ImageFormat::Tiff)
            .map_err(|e| CodecError::EncodeError {
                message: e.to_string(),
            })?;

        Ok(output.into_inner())
    }

    /// Decode a TIFF byte stream into a plane.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not a TIFF image, uses a color layout
    /// with no pixel type, or decodes to an empty image.
    fn decode(&self, data: &[u8]) -> Result<PixelArray, CodecError> {
        let img = image::load_from_memory_with_format(data, ImageFormat::Tiff).map_err(|e| {
            CodecError::DecodeError {
                message: e.to_string(),
            }
        })?;

        let (width, height) = (img.width() as usize, img.height() as usize);
        if width == 0 || height == 0 {
            return Err(CodecError::DecodeError {
                message: "image is empty".to_string(),
            });
        }

        let gray = IxDyn(&[height, width]);
        let color = IxDyn(&[height, width, 4]);
        let shape_error = |e: ndarray::ShapeError| CodecError::DecodeError {
            message: e.to_string(),
        };

        match img {
            DynamicImage::ImageLuma8(buf) => ArrayD::from_shape_vec(gray, buf.into_raw())
                .map(PixelArray::U8)
                .map_err(shape_error),
            DynamicImage::ImageLuma16(buf) => ArrayD::from_shape_vec(gray, buf.into_raw())
                .map(PixelArray::U16)
                .map_err(shape_error),
            DynamicImage::ImageRgba8(buf) => ArrayD::from_shape_vec(color, buf.into_raw())
                .map(PixelArray::U8)
                .map_err(shape_error),
            DynamicImage::ImageRgba16(buf) => ArrayD::from_shape_vec(color, buf.into_raw())
                .map(PixelArray::U16)
                .map_err(shape_error),
            DynamicImage::ImageRgb8(_) => ArrayD::from_shape_vec(color, img.to_rgba8().into_raw())
                .map(PixelArray::U8)
                .map_err(shape_error),
            DynamicImage::ImageRgb16(_) => {
                ArrayD::from_shape_vec(color, img.to_rgba16().into_raw())
                    .map(PixelArray::U16)
                    .map_err(shape_error)
            }
            other => Err(CodecError::Unsupported(format!("{:?}", other.color()))),
        }
    }
}
