//! Render job records.
//!
//! A job is created PENDING once its credit is debited and the provider has
//! accepted it. It then moves through PROCESSING (optional) to COMPLETED or
//! FAILED, both terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RenderJobId, TemplateId, UserId};

/// Credits charged per render job.
pub const RENDER_CREDIT_COST: i64 = 1;

/// Lifecycle state of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Submitted, not yet picked up by the provider.
    Pending,
    /// The provider reports progress.
    Processing,
    /// Output re-hosted to durable storage.
    Completed,
    /// Failed on the provider or while re-hosting. The credit was refunded.
    Failed,
}

impl JobStatus {
    /// COMPLETED and FAILED never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A render job owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    /// Job ID.
    pub id: RenderJobId,

    /// Owner.
    pub user_id: UserId,

    /// Template being rendered.
    pub template_id: TemplateId,

    /// Job ID assigned by the render provider.
    pub provider_job_id: Option<String>,

    /// Current status.
    pub status: JobStatus,

    /// Last progress reported by the provider, 0-100.
    pub progress: Option<f64>,

    /// Durable-storage URL of the rendered video.
    pub output_url: Option<String>,

    /// Original provider URL, kept for audit after re-hosting.
    pub provider_output_url: Option<String>,

    /// Snapshot of the customization payload as submitted.
    pub customizations: serde_json::Value,

    /// Credits debited for this job.
    pub credits_used: i64,

    /// Human-readable failure reason.
    pub error: Option<String>,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    /// Create a PENDING job for an accepted provider submission.
    #[must_use]
    pub fn new(
        id: RenderJobId,
        user_id: UserId,
        template_id: TemplateId,
        provider_job_id: String,
        customizations: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            template_id,
            provider_job_id: Some(provider_job_id),
            status: JobStatus::Pending,
            progress: None,
            output_url: None,
            provider_output_url: None,
            customizations,
            credits_used: RENDER_CREDIT_COST,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the job has reached COMPLETED or FAILED.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record provider progress. Terminal jobs are left untouched.
    ///
    /// Returns `true` if anything changed.
    pub fn record_progress(&mut self, progress: Option<f64>) -> bool {
        if self.is_terminal() {
            return false;
        }
        let progress = progress.map(|p| p.clamp(0.0, 100.0)).or(self.progress);
        let changed = self.status != JobStatus::Processing || self.progress != progress;
        if changed {
            self.status = JobStatus::Processing;
            self.progress = progress;
            self.updated_at = Utc::now();
        }
        changed
    }

    /// Mark COMPLETED with both output URLs.
    ///
    /// Returns `false` if the job is already terminal or already has an output.
    pub fn complete(&mut self, output_url: String, provider_output_url: String) -> bool {
        if self.is_terminal() || self.output_url.is_some() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = Some(100.0);
        self.output_url = Some(output_url);
        self.provider_output_url = Some(provider_output_url);
        self.updated_at = Utc::now();
        true
    }

    /// Mark FAILED with a reason.
    ///
    /// Returns `false` if the job is already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        true
    }
}
