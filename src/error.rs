use thiserror::Error;

/// I/O errors that can occur when reading from a storage backend
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object or file not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Local filesystem error
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// Object contents are not valid UTF-8 text
    #[error("Object is not valid UTF-8 text: {0}")]
    InvalidText(String),
}

impl StorageError {
    /// Build an [`StorageError`] from a `std::io::Error` on `path`, mapping
    /// `NotFound` to the dedicated variant.
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path.to_string())
        } else {
            StorageError::Io {
                path: path.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors from the image codec
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Source data is not a decodable image
    #[error("Failed to decode image: {message}")]
    DecodeError { message: String },

    /// Encoder rejected the pixel data
    #[error("Failed to encode image: {message}")]
    EncodeError { message: String },

    /// Pixel layout the codec cannot represent
    #[error("Unsupported pixel layout: {0}")]
    Unsupported(String),
}

/// Errors raised while reading or writing a dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Sidecar file is not parseable, even after the truncation repair
    #[error("Metadata format error in {path}: {message}")]
    Format { path: String, message: String },

    /// A required field or coordinate key is absent from well-formed metadata
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// A coordinate or channel name outside the declared shape
    #[error("Invalid image coordinates: {0}")]
    InvalidCoordinate(String),

    /// Written image pixel type disagrees with the dataset
    #[error("Pixel type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Written image dimensions disagree with the dataset
    #[error(
        "Image dimensions do not match existing data: expected {expected_width}x{expected_height}, found {width}x{height}"
    )]
    SizeMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    /// Codec or storage failure while reading an image
    #[error("Image read failed for {path}: {message}")]
    ImageRead { path: String, message: String },

    /// Codec or filesystem failure while writing an image
    #[error("Image write failed for {path}: {message}")]
    ImageWrite { path: String, message: String },

    /// Overwrite requested on a path that does not look like a dataset
    #[error("Refusing to overwrite {path}: {reason}")]
    OverwriteRefused { path: String, reason: String },

    /// Position name disagrees with the one bound to the index
    #[error("Position name does not match existing one for position {index}: expected {expected}, found {found}")]
    NameMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// Operation invoked in the wrong writer state
    #[error("Invalid writer state: {0}")]
    Lifecycle(String),

    /// No position sub-datasets found under the root
    #[error("Dataset not identified in {0}")]
    DatasetNotFound(String),

    /// Target directory already exists
    #[error("Directory already exists: {0}")]
    AlreadyExists(String),

    /// Channel definition list has the wrong length
    #[error("Channel data size does not match existing data: expected {expected}, found {actual}")]
    ChannelCount { expected: usize, actual: usize },

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatasetError {
    /// Whether this error means "this coordinate holds no image" rather than a
    /// systemic failure.
    ///
    /// Sparse datasets are normal: scan loops should skip coordinates for which
    /// this returns `true` and keep going.
    pub fn is_missing_image(&self) -> bool {
        matches!(
            self,
            DatasetError::Metadata(_) | DatasetError::InvalidCoordinate(_)
        )
    }
}
