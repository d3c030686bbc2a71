mod s3_storage;
mod storage;

pub use s3_storage::{create_s3_client, S3Storage};
pub use storage::{LocalStorage, StorageBackend};
