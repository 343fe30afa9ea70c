//! Render job handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use clipforge_core::{CustomizationRequest, JobStatus, RenderJob, RenderJobId, TemplateId};

use super::PageQuery;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::orchestrator::RenderOrchestrator;
use crate::state::AppState;

/// Create render request.
#[derive(Debug, Deserialize)]
pub struct CreateRenderRequest {
    /// Catalog template to render.
    #[serde(alias = "templateId")]
    pub template_id: TemplateId,
    /// Customization payload; missing fields keep the template defaults.
    #[serde(default)]
    pub customizations: CustomizationRequest,
}

/// Render job response.
#[derive(Debug, Serialize)]
pub struct RenderJobResponse {
    /// Job ID.
    pub id: String,
    /// Catalog template.
    pub template_id: TemplateId,
    /// Job status.
    pub status: JobStatus,
    /// Provider progress percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Durable output URL, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Credits charged.
    pub credits_used: i64,
    /// Submitted customization payload.
    pub customizations: serde_json::Value,
    /// Created timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl From<&RenderJob> for RenderJobResponse {
    fn from(job: &RenderJob) -> Self {
        Self {
            id: job.id.to_string(),
            template_id: job.template_id,
            status: job.status,
            progress: job.progress,
            output_url: job.output_url.clone(),
            error: job.error.clone(),
            credits_used: job.credits_used,
            customizations: job.customizations.clone(),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// List render jobs response.
#[derive(Debug, Serialize)]
pub struct ListRendersResponse {
    /// Jobs (newest first).
    pub renders: Vec<RenderJobResponse>,
    /// Whether there are more jobs.
    pub has_more: bool,
}

fn orchestrator(state: &AppState) -> Result<&Arc<RenderOrchestrator>, ApiError> {
    state
        .renders
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Rendering is not configured".into()))
}

/// Create a render job. Charges one credit.
pub async fn create_render(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateRenderRequest>,
) -> Result<(StatusCode, Json<RenderJobResponse>), ApiError> {
    let job = orchestrator(&state)?
        .create_job(auth.user_id, body.template_id, &body.customizations)
        .await?;

    Ok((StatusCode::CREATED, Json(RenderJobResponse::from(&job))))
}

/// Get a render job, reconciling with the provider if still running.
pub async fn get_render(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(job_id): Path<String>,
) -> Result<Json<RenderJobResponse>, ApiError> {
    let job_id: RenderJobId = job_id
        .parse()
        .map_err(|_| ApiError::NotFound(format!("render job not found: {job_id}")))?;

    let job = orchestrator(&state)?.job_status(auth.user_id, job_id).await?;

    Ok(Json(RenderJobResponse::from(&job)))
}

/// List the current user's render jobs.
pub async fn list_renders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListRendersResponse>, ApiError> {
    let limit = query.capped_limit();
    let jobs = orchestrator(&state)?.list_jobs(&auth.user_id, limit + 1, query.offset)?;

    let has_more = jobs.len() > limit;
    let renders = jobs
        .iter()
        .take(limit)
        .map(RenderJobResponse::from)
        .collect();

    Ok(Json(ListRendersResponse { renders, has_more }))
}
