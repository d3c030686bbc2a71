//! Configuration for dataset writers and the `g2s` command-line tool.
//!
//! Writers take a [`WriterConfig`] from the caller; nothing inside the library
//! reads the process environment. The binary builds one with
//! [`WriterIdentity::from_env`].
//!
//! # Environment Variables
//!
//! Every command-line option can also be set with a `G2S_` prefixed variable:
//!
//! - `G2S_S3_BUCKET` - Read datasets from this S3 bucket instead of the local disk
//! - `G2S_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `G2S_S3_REGION` - AWS region (default: us-east-1)
//! - `G2S_NAME` - Dataset name for `write-test` (default: g2s-test)
//! - `G2S_POSITIONS`, `G2S_CHANNELS`, `G2S_SLICES`, `G2S_FRAMES` - Test dataset shape
//! - `G2S_WIDTH`, `G2S_HEIGHT` - Test image size

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::format::{KeyFormat, METADATA_VERSION};

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default name of the synthetic test dataset.
pub const DEFAULT_TEST_NAME: &str = "g2s-test";

/// Default test image width.
pub const DEFAULT_TEST_WIDTH: u32 = 256;

/// Default test image height.
pub const DEFAULT_TEST_HEIGHT: u32 = 200;

// =============================================================================
// Writer Configuration
// =============================================================================

/// Who is writing: recorded in every summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterIdentity {
    pub computer_name: String,
    pub user_name: String,
    /// Acquisition session id, shared by every position of a dataset.
    pub session_uuid: String,
}

impl WriterIdentity {
    /// Identity with a fresh session id.
    pub fn new(computer_name: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            computer_name: computer_name.into(),
            user_name: user_name.into(),
            session_uuid: Uuid::new_v4().to_string(),
        }
    }

    /// Identity of the current host and user, read from the environment.
    pub fn from_env() -> Self {
        let var = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
                .unwrap_or_default()
        };
        Self::new(var(&["HOSTNAME", "COMPUTERNAME"]), var(&["USER", "USERNAME"]))
    }

    /// Replace the session id.
    pub fn with_session_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.session_uuid = uuid.into();
        self
    }
}

impl Default for WriterIdentity {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Settings shared by every position writer of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub identity: WriterIdentity,
    /// Key form emitted for image records.
    pub key_format: KeyFormat,
    pub metadata_version: u32,
}

impl WriterConfig {
    pub fn new(identity: WriterIdentity) -> Self {
        Self {
            identity,
            key_format: KeyFormat::default(),
            metadata_version: METADATA_VERSION,
        }
    }

    pub fn with_key_format(mut self, key_format: KeyFormat) -> Self {
        self.key_format = key_format;
        self
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new(WriterIdentity::default())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// g2s - Inspect and generate Go2Scope microscopy datasets.
#[derive(Parser, Debug, Clone)]
#[command(name = "g2s")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the shape, channels and positions of a dataset.
    Info(InfoConfig),

    /// Write a synthetic dataset and read it back.
    WriteTest(WriteTestConfig),
}

/// Options for `g2s info`.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Dataset root directory (or key prefix when reading from S3).
    pub path: String,

    /// Read the dataset from this S3 bucket.
    #[arg(long, env = "G2S_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "G2S_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "G2S_S3_REGION")]
    pub s3_region: String,

    /// List every coordinate with its image file.
    #[arg(long, default_value_t = false)]
    pub list_images: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InfoConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("Dataset path is required".to_string());
        }

        if let Some(bucket) = &self.s3_bucket {
            if bucket.is_empty() {
                return Err("S3 bucket name must not be empty".to_string());
            }
        } else if self.s3_endpoint.is_some() {
            return Err(
                "An S3 endpoint was given without a bucket. Set --s3-bucket or G2S_S3_BUCKET"
                    .to_string(),
            );
        }

        Ok(())
    }
}

/// Options for `g2s write-test`.
#[derive(Args, Debug, Clone)]
pub struct WriteTestConfig {
    /// Directory that will contain the dataset.
    pub root: PathBuf,

    /// Dataset name (directory created under the root).
    #[arg(long, default_value = DEFAULT_TEST_NAME, env = "G2S_NAME")]
    pub name: String,

    #[arg(long, default_value_t = 2, env = "G2S_POSITIONS")]
    pub positions: usize,

    #[arg(long, default_value_t = 2, env = "G2S_CHANNELS")]
    pub channels: usize,

    #[arg(long, default_value_t = 3, env = "G2S_SLICES")]
    pub slices: usize,

    #[arg(long, default_value_t = 4, env = "G2S_FRAMES")]
    pub frames: usize,

    #[arg(long, default_value_t = DEFAULT_TEST_WIDTH, env = "G2S_WIDTH")]
    pub width: u32,

    #[arg(long, default_value_t = DEFAULT_TEST_HEIGHT, env = "G2S_HEIGHT")]
    pub height: u32,

    /// Replace an existing dataset of the same name.
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl WriteTestConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) {
            return Err("Dataset name must be a non-empty single path component".to_string());
        }

        for (axis, count) in [
            ("positions", self.positions),
            ("channels", self.channels),
            ("slices", self.slices),
            ("frames", self.frames),
        ] {
            if count == 0 {
                return Err(format!("{} must be greater than 0", axis));
            }
        }

        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
