//! Render provider integration.
//!
//! The provider hosts template projects and renders them into videos:
//! - Template assets (register, upload, status)
//! - Render jobs (submit, poll)
//! - Output downloads

pub mod client;
pub mod types;

use async_trait::async_trait;

use clipforge_core::RenderError;

pub use client::ProviderClient;
pub use types::*;

/// Error type for render provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider API returned an error.
    #[error("provider API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A response lacked a required field.
    #[error("missing field in provider response: {0}")]
    MissingField(&'static str),
}

impl From<ProviderError> for RenderError {
    fn from(err: ProviderError) -> Self {
        Self::ExternalService {
            service: "render provider",
            message: err.to_string(),
        }
    }
}

/// The rendering provider's API.
#[async_trait]
pub trait RenderProvider: Send + Sync {
    /// Register a new template asset; the response carries the upload target.
    async fn register_template(
        &self,
        request: &RegisterTemplateRequest,
    ) -> Result<ProviderTemplate, ProviderError>;

    /// Send the project binary to a registered asset's upload target.
    async fn upload_template(&self, target: &UploadInfo, bytes: Vec<u8>)
        -> Result<(), ProviderError>;

    /// Get a template asset; `None` if the provider does not know it.
    async fn get_template(&self, asset_id: &str) -> Result<Option<ProviderTemplate>, ProviderError>;

    /// All template assets on the account.
    async fn list_templates(&self) -> Result<Vec<ProviderTemplate>, ProviderError>;

    /// Delete a template asset.
    async fn delete_template(&self, asset_id: &str) -> Result<(), ProviderError>;

    /// Submit a render job.
    async fn submit_job(&self, request: &SubmitJobRequest) -> Result<ProviderJob, ProviderError>;

    /// Poll a render job.
    async fn get_job(&self, job_id: &str) -> Result<ProviderJob, ProviderError>;

    /// Download a finished output.
    async fn download_output(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}
