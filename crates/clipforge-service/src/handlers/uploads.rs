//! Customization asset uploads.

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use clipforge_core::RenderError;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::{ResourceType, StoredMedia, UploadOptions};

/// Upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Durable URL to use in a customization payload.
    pub url: String,
    /// Storage public ID.
    pub public_id: String,
    /// `image` or `video`.
    pub resource_type: ResourceType,
    /// File format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Pixel width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Duration in seconds, for videos.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl UploadResponse {
    fn new(media: StoredMedia, resource_type: ResourceType) -> Self {
        Self {
            url: media.secure_url,
            public_id: media.public_id,
            resource_type,
            format: media.format,
            width: media.width,
            height: media.height,
            bytes: media.bytes,
            duration: media.duration,
        }
    }
}

/// A file read from the multipart body.
struct UploadPayload {
    file_name: Option<String>,
    resource_type: ResourceType,
    bytes: Vec<u8>,
}

/// Upload an image or video for use in a render.
///
/// Expects a multipart body with a `file` part.
pub async fn upload_asset(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let storage = state
        .storage
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Uploads are not configured".into()))?;

    let payload = read_upload_payload(&mut multipart).await?;

    let options = UploadOptions::user_asset(payload.resource_type, payload.file_name);
    let media = storage
        .upload_bytes(payload.bytes, &options)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %auth.user_id, error = %e, "Asset upload failed");
            ApiError::from(RenderError::from(e))
        })?;

    tracing::info!(
        user_id = %auth.user_id,
        public_id = %media.public_id,
        resource_type = payload.resource_type.as_str(),
        "Customization asset uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse::new(media, payload.resource_type)),
    ))
}

async fn read_upload_payload(multipart: &mut Multipart) -> Result<UploadPayload, ApiError> {
    loop {
        let Some(field) = multipart.next_field().await.map_err(multipart_error)? else {
            return Err(ApiError::BadRequest("Missing `file` part".into()));
        };
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let resource_type = ResourceType::from_mime(&content_type).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unsupported file type `{content_type}`, expected an image or video"
            ))
        })?;

        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty());

        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".into()));
        }

        return Ok(UploadPayload {
            file_name,
            resource_type,
            bytes: bytes.to_vec(),
        });
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    tracing::debug!(status = err.status().as_u16(), error = %err, "Failed to read multipart payload");
    ApiError::BadRequest(err.body_text())
}
