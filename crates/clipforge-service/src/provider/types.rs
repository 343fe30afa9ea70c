//! Render provider API types.
//!
//! Job payloads from submission, polling and webhooks come in several
//! historical shapes. They are parsed into [`RawJobResponse`] and normalised
//! once by [`normalize_job`]; nothing else reads the raw fields.

use serde::{Deserialize, Serialize};

use clipforge_core::{AssetInstruction, LayerInfo};

use super::ProviderError;

// ============================================================================
// Templates
// ============================================================================

/// Template project archive format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    /// Zipped project with collected footage.
    Zip,
    /// Bare project file.
    Aep,
}

impl TemplateFormat {
    /// Format for a file extension, case-insensitive.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "zip" => Some(Self::Zip),
            "aep" => Some(Self::Aep),
            _ => None,
        }
    }
}

/// Register asset request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTemplateRequest {
    /// Archive format.
    #[serde(rename = "type")]
    pub format: TemplateFormat,
    /// Display name.
    pub display_name: String,
}

/// Where to send the template binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInfo {
    /// Upload URL.
    pub url: String,
    /// HTTP method, usually `PUT`.
    #[serde(default = "default_upload_method")]
    pub method: String,
}

fn default_upload_method() -> String {
    "PUT".into()
}

/// Template asset as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTemplate {
    /// Provider asset ID.
    pub id: String,
    /// Processing status (`created`, `uploaded`, `error`, ...).
    #[serde(default)]
    pub status: String,
    /// Display name given at registration.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Compositions, in provider order.
    #[serde(default)]
    pub compositions: Vec<String>,
    /// Layers across all compositions.
    #[serde(default)]
    pub layers: Vec<LayerInfo>,
    /// Upload target, present right after registration.
    #[serde(default)]
    pub upload_info: Option<UploadInfo>,
}

impl ProviderTemplate {
    /// The provider finished processing the upload.
    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        self.status.eq_ignore_ascii_case("uploaded")
    }

    /// The provider rejected the upload.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("error") || self.status.eq_ignore_ascii_case("failed")
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// Render target.
#[derive(Debug, Clone, Serialize)]
pub struct JobTemplate {
    /// Provider asset ID.
    pub id: String,
    /// Composition to render.
    pub composition: String,
}

/// Callback registration.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookTarget {
    /// Callback URL.
    pub url: String,
    /// HTTP method the provider uses.
    pub method: String,
}

/// A layer replacement in the provider's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAsset {
    /// `data`, `image` or `video`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Target layer.
    pub layer_name: String,
    /// Property path for `data` assets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<&'static str>,
    /// Value for `data` assets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Media URL for `image`/`video` assets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

/// Property path of a text layer's content.
pub const SOURCE_TEXT_PROPERTY: &str = "Source Text";

/// Property path of a solid or shape fill colour.
pub const FILL_COLOR_PROPERTY: &str = "Effects.Fill.Color";

impl From<&AssetInstruction> for ProviderAsset {
    fn from(instruction: &AssetInstruction) -> Self {
        match instruction {
            AssetInstruction::Text { layer_name, value } => Self {
                kind: "data",
                layer_name: layer_name.clone(),
                property: Some(SOURCE_TEXT_PROPERTY),
                value: Some(serde_json::Value::String(value.clone())),
                src: None,
            },
            AssetInstruction::Image { layer_name, src } => Self {
                kind: "image",
                layer_name: layer_name.clone(),
                property: None,
                value: None,
                src: Some(src.clone()),
            },
            AssetInstruction::Video { layer_name, src } => Self {
                kind: "video",
                layer_name: layer_name.clone(),
                property: None,
                value: None,
                src: Some(src.clone()),
            },
            AssetInstruction::Color { layer_name, rgb } => Self {
                kind: "data",
                layer_name: layer_name.clone(),
                property: Some(FILL_COLOR_PROPERTY),
                value: Some(serde_json::json!(rgb)),
                src: None,
            },
        }
    }
}

/// Submit job request.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitJobRequest {
    /// Render target.
    pub template: JobTemplate,
    /// Layer replacements; empty renders the template defaults.
    pub assets: Vec<ProviderAsset>,
    /// Completion callback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookTarget>,
}

impl SubmitJobRequest {
    /// Build a request for an uploaded template.
    #[must_use]
    pub fn new(
        asset_id: &str,
        composition: &str,
        assets: &[AssetInstruction],
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            template: JobTemplate {
                id: asset_id.to_string(),
                composition: composition.to_string(),
            },
            assets: assets.iter().map(ProviderAsset::from).collect(),
            webhook: webhook_url.map(|url| WebhookTarget {
                url,
                method: "POST".into(),
            }),
        }
    }
}

/// An object carrying a URL (`output`, `result`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrlHolder {
    /// The URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// Job payload as received, every historical field spelling included.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawJobResponse {
    /// Job ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Job ID, webhook spelling.
    #[serde(default)]
    pub job_id: Option<String>,
    /// State.
    #[serde(default)]
    pub state: Option<String>,
    /// State, alternate spelling.
    #[serde(default)]
    pub status: Option<String>,
    /// State, alternate spelling.
    #[serde(default)]
    pub render_status: Option<String>,
    /// Progress percentage.
    #[serde(default)]
    pub progress: Option<f64>,
    /// Progress percentage, alternate spelling.
    #[serde(default)]
    pub render_progress: Option<f64>,
    /// Output holder.
    #[serde(default)]
    pub output: Option<UrlHolder>,
    /// Output URL, flat spelling.
    #[serde(default)]
    pub output_url: Option<String>,
    /// Output holder, alternate spelling.
    #[serde(default)]
    pub result: Option<UrlHolder>,
    /// Error, either a string or an object with a `message`.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Normalised job state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderJobState {
    /// Accepted, not started.
    Queued,
    /// In progress.
    Rendering,
    /// Finished successfully.
    Finished,
    /// Failed on the provider.
    Failed,
    /// A state this service does not know.
    Unknown(String),
}

impl ProviderJobState {
    /// Parse a provider state string, case-insensitive.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" | "created" | "submitted" | "waiting" => Self::Queued,
            "rendering" | "processing" | "in_progress" | "running" | "started" => Self::Rendering,
            "done" | "finished" | "completed" | "complete" | "succeeded" | "success" => {
                Self::Finished
            }
            "failed" | "error" | "errored" | "cancelled" | "canceled" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A job update in one canonical shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderJob {
    /// Provider job ID.
    pub id: String,
    /// State.
    pub state: ProviderJobState,
    /// Progress percentage, if reported.
    pub progress: Option<f64>,
    /// Output URL, if reported.
    pub output_url: Option<String>,
    /// Error message, if reported.
    pub error: Option<String>,
}

/// Normalise any job payload shape.
///
/// A payload with no state at all is treated as queued.
///
/// # Errors
///
/// Returns `ProviderError::MissingField` if no job ID is present.
pub fn normalize_job(raw: RawJobResponse) -> Result<ProviderJob, ProviderError> {
    let id = raw
        .id
        .or(raw.job_id)
        .filter(|id| !id.trim().is_empty())
        .ok_or(ProviderError::MissingField("id"))?;

    let state = raw
        .state
        .or(raw.status)
        .or(raw.render_status)
        .map_or(ProviderJobState::Queued, |s| ProviderJobState::parse(&s));

    let output_url = raw
        .output
        .and_then(|o| o.url)
        .or(raw.output_url)
        .or_else(|| raw.result.and_then(|r| r.url))
        .filter(|url| !url.trim().is_empty());

    let error = raw.error.and_then(|e| match e {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .or_else(|| Some(serde_json::Value::Object(map).to_string())),
        other => Some(other.to_string()),
    });

    Ok(ProviderJob {
        id,
        state,
        progress: raw.progress.or(raw.render_progress),
        output_url,
        error,
    })
}

/// Provider API error response.
#[derive(Debug, Deserialize)]
pub struct ProviderErrorResponse {
    /// Error message.
    #[serde(default, alias = "error")]
    pub message: Option<String>,
}
