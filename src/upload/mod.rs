//! Object storage for transcoded images.
//!
//! The pipeline talks to storage through the [`ObjectStore`] trait;
//! [`S3Uploader`] is the production implementation.

mod s3;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use s3::{S3Settings, S3Uploader, DEFAULT_REGION};

/// Prefix under which every uploaded image is stored.
pub const OBJECT_KEY_PREFIX: &str = "photo/";

/// Extension of every uploaded image.
pub const OBJECT_KEY_SUFFIX: &str = ".webp";

#[derive(Debug, Error)]
pub enum UploadError {
    /// The put request was rejected or never reached the service.
    #[error("Upload of {key} failed: {message}")]
    Put { key: String, message: String },
}

/// Destination for uploaded bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `data` under `key`, overwriting any existing object, and
    /// returns the public URL of the stored object.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String, UploadError>;
}

/// Generates a fresh `photo/<uuid>.webp` object key.
pub fn object_key() -> String {
    format!("{OBJECT_KEY_PREFIX}{}{OBJECT_KEY_SUFFIX}", Uuid::new_v4())
}
