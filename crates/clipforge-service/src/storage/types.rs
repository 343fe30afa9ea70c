//! Durable storage API types.

use serde::{Deserialize, Serialize};

/// Media class on the storage side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Still images.
    Image,
    /// Videos (and audio).
    Video,
    /// Let the storage detect it.
    Auto,
}

impl ResourceType {
    /// Path segment used in the upload URL.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Auto => "auto",
        }
    }

    /// Resource type for a MIME type, if it is an accepted media type.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// Options for one upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Destination folder.
    pub folder: String,
    /// Media class.
    pub resource_type: ResourceType,
    /// Stable public ID; the storage generates one when absent.
    pub public_id: Option<String>,
    /// Original file name, sent with byte uploads.
    pub file_name: Option<String>,
}

impl UploadOptions {
    /// Folder for customization assets uploaded by users.
    pub const USER_ASSETS_FOLDER: &'static str = "clipforge/uploads";

    /// Folder for re-hosted render outputs.
    pub const RENDERS_FOLDER: &'static str = "clipforge/renders";

    /// Options for a user asset.
    #[must_use]
    pub fn user_asset(resource_type: ResourceType, file_name: Option<String>) -> Self {
        Self {
            folder: Self::USER_ASSETS_FOLDER.into(),
            resource_type,
            public_id: None,
            file_name,
        }
    }

    /// Options for a render output, keyed by the job ID.
    #[must_use]
    pub fn render_output(job_id: impl Into<String>) -> Self {
        Self {
            folder: Self::RENDERS_FOLDER.into(),
            resource_type: ResourceType::Video,
            public_id: Some(job_id.into()),
            file_name: None,
        }
    }
}

/// A stored media object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMedia {
    /// Public HTTPS URL.
    pub secure_url: String,
    /// Storage public ID.
    pub public_id: String,
    /// File format (`mp4`, `png`, ...).
    #[serde(default)]
    pub format: Option<String>,
    /// Pixel width.
    #[serde(default)]
    pub width: Option<u32>,
    /// Pixel height.
    #[serde(default)]
    pub height: Option<u32>,
    /// Size in bytes.
    #[serde(default)]
    pub bytes: Option<u64>,
    /// Duration in seconds, for videos.
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Storage API error response.
#[derive(Debug, Deserialize)]
pub struct StorageErrorResponse {
    /// Error details.
    pub error: StorageErrorBody,
}

/// Storage API error body.
#[derive(Debug, Deserialize)]
pub struct StorageErrorBody {
    /// Error message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_from_mime() {
        assert_eq!(ResourceType::from_mime("image/png"), Some(ResourceType::Image));
        assert_eq!(ResourceType::from_mime("VIDEO/mp4"), Some(ResourceType::Video));
        assert_eq!(ResourceType::from_mime("application/pdf"), None);
    }

    #[test]
    fn parses_upload_response() {
        let media: StoredMedia = serde_json::from_str(
            r#"{"secure_url":"https://cdn/x.mp4","public_id":"clipforge/renders/j","format":"mp4",
                "width":1920,"height":1080,"bytes":1024,"duration":12.5,"resource_type":"video"}"#,
        )
        .unwrap();
        assert_eq!(media.width, Some(1920));
        assert_eq!(media.duration, Some(12.5));
    }
}
