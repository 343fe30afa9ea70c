//! Template administration handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use clipforge_core::{TemplateId, TemplateRegistration};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;
use crate::templates::TemplateManager;

/// Template listing response.
#[derive(Debug, Serialize)]
pub struct ListTemplatesResponse {
    /// Registration records.
    pub templates: Vec<TemplateRegistration>,
    /// Template IDs with a project file on disk.
    pub available: Vec<TemplateId>,
}

/// Result of one template in a bulk upload.
#[derive(Debug, Serialize)]
pub struct UploadResult {
    /// Template ID.
    pub template_id: TemplateId,
    /// Whether the template is ready for rendering.
    pub success: bool,
    /// Provider asset ID on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_asset_id: Option<String>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bulk upload response.
#[derive(Debug, Serialize)]
pub struct UploadAllResponse {
    /// Per-template results, by template ID.
    pub results: Vec<UploadResult>,
    /// Templates uploaded successfully.
    pub succeeded: usize,
    /// Templates that failed.
    pub failed: usize,
}

fn manager(state: &AppState) -> Result<&Arc<TemplateManager>, ApiError> {
    state
        .templates
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Render provider is not configured".into()))
}

fn parse_template_id(raw: &str) -> Result<TemplateId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid template ID `{raw}`")))
}

/// List template registrations.
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<ListTemplatesResponse>, ApiError> {
    let manager = manager(&state)?;

    Ok(Json(ListTemplatesResponse {
        templates: manager.list()?,
        available: manager.available_template_ids().await?,
    }))
}

/// Get a template registration.
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(template_id): Path<String>,
) -> Result<Json<TemplateRegistration>, ApiError> {
    let template_id = parse_template_id(&template_id)?;
    Ok(Json(manager(&state)?.get(template_id)?))
}

/// Delete a template registration and its provider asset.
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(template_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let template_id = parse_template_id(&template_id)?;
    manager(&state)?.delete(template_id).await?;

    tracing::info!(admin_id = %admin.admin_id, template_id = %template_id, "Template deleted");

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Upload one template now.
pub async fn upload_template(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(template_id): Path<String>,
) -> Result<Json<TemplateRegistration>, ApiError> {
    let template_id = parse_template_id(&template_id)?;

    tracing::info!(admin_id = %admin.admin_id, template_id = %template_id, "Template upload requested");

    Ok(Json(manager(&state)?.ensure_uploaded(template_id).await?))
}

/// Upload every template that has a project file.
pub async fn upload_all_templates(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
) -> Result<Json<UploadAllResponse>, ApiError> {
    tracing::info!(admin_id = %admin.admin_id, "Bulk template upload requested");

    let results: Vec<UploadResult> = manager(&state)?
        .upload_all()
        .await?
        .into_iter()
        .map(|(template_id, result)| match result {
            Ok(registration) => UploadResult {
                template_id,
                success: true,
                provider_asset_id: registration.provider_asset_id,
                error: None,
            },
            Err(e) => UploadResult {
                template_id,
                success: false,
                provider_asset_id: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    let succeeded = results.iter().filter(|r| r.success).count();
    Ok(Json(UploadAllResponse {
        failed: results.len() - succeeded,
        succeeded,
        results,
    }))
}
