//! Error types for clipforge.
//!
//! These are the error kinds that cross the orchestration core's boundary.
//! Raw provider and storage payloads are logged where they occur and never
//! carried in these variants verbatim.

use crate::ids::IdError;
use crate::TemplateId;

/// Result type for clipforge operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors that can occur in clipforge operations.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A template, job, registration or account does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Malformed customization payload or request.
    #[error("validation error: {0}")]
    Validation(String),

    /// Not enough credits for the operation.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// The template exposes no composition to render.
    #[error("template {template_id} exposes no compositions")]
    NoCompositions {
        /// The template.
        template_id: TemplateId,
    },

    /// Registering or uploading a template with the provider failed.
    #[error("template upload failed: {0}")]
    Upload(String),

    /// The provider did not report the template as uploaded in time.
    #[error("template {template_id} not ready after {attempts} status checks")]
    Timeout {
        /// The template.
        template_id: TemplateId,
        /// Status checks performed.
        attempts: u32,
    },

    /// External service error (render provider, durable storage).
    #[error("external service error: {service} - {message}")]
    ExternalService {
        /// The service that failed.
        service: &'static str,
        /// Error message.
        message: String,
    },

    /// Re-hosting a completed render failed.
    #[error("reconciliation failed: {0}")]
    Reconciliation(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RenderError {
    /// Shorthand for [`RenderError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
