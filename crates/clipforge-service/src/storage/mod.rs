//! Durable media storage.
//!
//! Holds user-uploaded customization assets and re-hosted render outputs, so
//! stored URLs outlive the render provider's temporary links.

pub mod client;
pub mod types;

use async_trait::async_trait;

use clipforge_core::RenderError;

pub use client::CloudStorageClient;
pub use types::*;

/// Error type for durable storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Storage API returned an error.
    #[error("storage API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<StorageError> for RenderError {
    fn from(err: StorageError) -> Self {
        Self::ExternalService {
            service: "durable storage",
            message: err.to_string(),
        }
    }
}

/// The durable storage API.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Upload raw bytes.
    async fn upload_bytes(
        &self,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<StoredMedia, StorageError>;

    /// Have the storage fetch and keep a remote file.
    async fn upload_from_url(
        &self,
        url: &str,
        options: &UploadOptions,
    ) -> Result<StoredMedia, StorageError>;
}
