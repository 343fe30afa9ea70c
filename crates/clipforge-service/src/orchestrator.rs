//! Render job orchestration and reconciliation.
//!
//! Jobs are created against an uploaded template and paid for up front.
//! Provider state flows back in through status polls and webhooks; both paths
//! end in [`RenderOrchestrator::apply_update`], where terminal transitions are
//! conditional in the store so a job completes or refunds exactly once.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use clipforge_core::{
    build_assets, CustomizationRequest, RenderError, RenderJob, RenderJobId, Result, TemplateId,
    UserId, RENDER_CREDIT_COST,
};
use clipforge_store::Store;

use crate::ledger::CreditsLedger;
use crate::provider::{
    normalize_job, ProviderJob, ProviderJobState, RawJobResponse, RenderProvider, SubmitJobRequest,
};
use crate::storage::{MediaStorage, StoredMedia, UploadOptions};
use crate::templates::TemplateManager;

/// Error stored on a job whose output could not be re-hosted.
const REHOST_FAILED: &str = "Failed to store render output";

/// Error stored on a job the provider failed without a reason.
const PROVIDER_FAILED: &str = "Render failed";

/// Render job orchestrator.
pub struct RenderOrchestrator {
    store: Arc<dyn Store>,
    ledger: CreditsLedger,
    templates: Arc<TemplateManager>,
    provider: Arc<dyn RenderProvider>,
    storage: Arc<dyn MediaStorage>,
    webhook_url: Option<String>,
    /// Jobs whose output is being re-hosted right now.
    in_flight: Mutex<HashSet<RenderJobId>>,
}

impl RenderOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        ledger: CreditsLedger,
        templates: Arc<TemplateManager>,
        provider: Arc<dyn RenderProvider>,
        storage: Arc<dyn MediaStorage>,
        webhook_url: Option<String>,
    ) -> Self {
        if webhook_url.is_none() {
            tracing::warn!("No webhook base URL configured - render status relies on polling");
        }

        Self {
            store,
            ledger,
            templates,
            provider,
            storage,
            webhook_url,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Create a render job.
    ///
    /// One credit is debited before submission. If submission or persistence
    /// fails afterwards, the credit is refunded and the original error returned.
    ///
    /// # Errors
    ///
    /// - `RenderError::Validation` for a malformed payload.
    /// - `RenderError::InsufficientCredits` if the balance is too low.
    /// - `RenderError::NoCompositions` if the template has nothing to render.
    /// - Template upload errors from [`TemplateManager::ensure_uploaded`].
    /// - `RenderError::ExternalService` if the provider rejects the job.
    pub async fn create_job(
        &self,
        user_id: UserId,
        template_id: TemplateId,
        request: &CustomizationRequest,
    ) -> Result<RenderJob> {
        let customization = request.validate()?;

        let balance = self.ledger.balance(&user_id)?;
        if balance < RENDER_CREDIT_COST {
            return Err(RenderError::InsufficientCredits {
                balance,
                required: RENDER_CREDIT_COST,
            });
        }

        let registration = self.templates.ensure_uploaded(template_id).await?;

        let Some(composition) = registration.primary_composition() else {
            return Err(RenderError::NoCompositions { template_id });
        };
        let Some(asset_id) = registration.ready_asset_id() else {
            return Err(RenderError::Upload(format!(
                "template {template_id} has no provider asset"
            )));
        };

        let mapping = self.templates.resolver().resolve(
            template_id,
            &registration.layers,
            registration.layer_mapping.as_ref(),
        );
        let assets = build_assets(&customization, &mapping);

        let job_id = RenderJobId::generate();
        self.ledger
            .deduct_credits(user_id, RENDER_CREDIT_COST, job_id)?;

        let submit = SubmitJobRequest::new(asset_id, composition, &assets, self.webhook_url.clone());
        let submitted = match self.provider.submit_job(&submit).await {
            Ok(submitted) => submitted,
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    job_id = %job_id,
                    template_id = %template_id,
                    error = %e,
                    "Render submission failed"
                );
                self.compensate(user_id, job_id, "submission failed");
                return Err(e.into());
            }
        };

        let job = RenderJob::new(
            job_id,
            user_id,
            template_id,
            submitted.id.clone(),
            request.snapshot(),
        );
        if let Err(e) = self.store.put_render_job(&job) {
            tracing::error!(
                job_id = %job_id,
                provider_job_id = %submitted.id,
                error = %e,
                "Failed to persist submitted render job"
            );
            self.compensate(user_id, job_id, "job could not be saved");
            return Err(e.into());
        }

        tracing::info!(
            user_id = %user_id,
            job_id = %job_id,
            template_id = %template_id,
            provider_job_id = %submitted.id,
            assets = assets.len(),
            "Render job submitted"
        );

        Ok(job)
    }

    /// Best-effort refund after a post-debit failure.
    fn compensate(&self, user_id: UserId, job_id: RenderJobId, reason: &str) {
        if let Err(e) = self
            .ledger
            .refund_credits(user_id, RENDER_CREDIT_COST, job_id, reason)
        {
            tracing::error!(
                user_id = %user_id,
                job_id = %job_id,
                error = %e,
                "Compensating refund failed"
            );
        }
    }

    /// A user's job, reconciled with the provider if not yet terminal.
    ///
    /// Provider poll failures are logged and the stored job is returned.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::NotFound` if the job doesn't exist or belongs to
    /// another user.
    pub async fn job_status(&self, user_id: UserId, job_id: RenderJobId) -> Result<RenderJob> {
        let job = self
            .store
            .get_render_job(&job_id)?
            .filter(|job| job.user_id == user_id)
            .ok_or_else(|| RenderError::not_found("render job", job_id))?;

        if job.is_terminal() {
            return Ok(job);
        }
        let Some(provider_job_id) = job.provider_job_id.clone() else {
            return Ok(job);
        };

        match self.provider.get_job(&provider_job_id).await {
            Ok(update) => self.apply_update(job, update).await,
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    provider_job_id = %provider_job_id,
                    error = %e,
                    "Render status poll failed"
                );
                Ok(job)
            }
        }
    }

    /// Apply a provider callback. Unknown jobs are a logged no-op.
    ///
    /// # Errors
    ///
    /// - `RenderError::Validation` if the payload carries no job ID.
    /// - `RenderError::Storage` on store failures.
    pub async fn handle_webhook(&self, raw: RawJobResponse) -> Result<Option<RenderJob>> {
        let update = normalize_job(raw).map_err(|e| RenderError::Validation(e.to_string()))?;

        let Some(job) = self.store.find_render_job_by_provider_id(&update.id)? else {
            tracing::info!(provider_job_id = %update.id, "Webhook for unknown render job");
            return Ok(None);
        };

        self.apply_update(job, update).await.map(Some)
    }

    /// Move a job forward according to a provider update.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Storage` on store failures. Re-hosting failures
    /// fail the job instead of returning an error.
    pub async fn apply_update(&self, job: RenderJob, update: ProviderJob) -> Result<RenderJob> {
        if job.is_terminal() {
            return Ok(job);
        }

        match update.state {
            ProviderJobState::Queued => Ok(job),
            ProviderJobState::Rendering => Ok(self
                .store
                .update_render_progress(&job.id, update.progress)?
                .into_job()),
            ProviderJobState::Finished => match update.output_url {
                Some(url) if job.output_url.is_none() => self.rehost(job, &url).await,
                Some(_) => Ok(job),
                None => {
                    tracing::warn!(
                        job_id = %job.id,
                        provider_job_id = %update.id,
                        "Provider finished render without output URL"
                    );
                    Ok(job)
                }
            },
            ProviderJobState::Failed => {
                let reason = update.error.as_deref().unwrap_or(PROVIDER_FAILED);
                tracing::warn!(
                    job_id = %job.id,
                    provider_job_id = %update.id,
                    error = %reason,
                    "Provider reported render failure"
                );
                Ok(self.ledger.fail_job(&job.id, reason)?.into_job())
            }
            ProviderJobState::Unknown(state) => {
                tracing::warn!(
                    job_id = %job.id,
                    provider_job_id = %update.id,
                    state = %state,
                    "Unknown provider job state"
                );
                Ok(job)
            }
        }
    }

    async fn rehost(&self, job: RenderJob, provider_url: &str) -> Result<RenderJob> {
        if !self.in_flight.lock().await.insert(job.id) {
            tracing::debug!(job_id = %job.id, "Render output already being stored");
            return Ok(job);
        }

        let outcome = self.rehost_claimed(&job.id, provider_url).await;
        self.in_flight.lock().await.remove(&job.id);
        outcome
    }

    /// Store the output and finish the job. The caller holds the `in_flight`
    /// slot for `job_id` until this returns.
    async fn rehost_claimed(&self, job_id: &RenderJobId, provider_url: &str) -> Result<RenderJob> {
        // The caller's copy may predate a reconciler that already finished.
        let job = self
            .store
            .get_render_job(job_id)?
            .ok_or_else(|| RenderError::not_found("render job", job_id))?;
        if job.is_terminal() || job.output_url.is_some() {
            return Ok(job);
        }

        match self.store_output(&job, provider_url).await {
            Ok(media) => {
                let transition =
                    self.store
                        .complete_render_job(&job.id, &media.secure_url, provider_url)?;
                if transition.is_applied() {
                    tracing::info!(
                        user_id = %job.user_id,
                        job_id = %job.id,
                        output_url = %media.secure_url,
                        "Render job completed"
                    );
                }
                Ok(transition.into_job())
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Storing render output failed");
                Ok(self.ledger.fail_job(&job.id, REHOST_FAILED)?.into_job())
            }
        }
    }

    async fn store_output(&self, job: &RenderJob, provider_url: &str) -> Result<StoredMedia> {
        let bytes = self
            .provider
            .download_output(provider_url)
            .await
            .map_err(|e| RenderError::Reconciliation(format!("download failed: {e}")))?;

        let mut options = UploadOptions::render_output(job.id.to_string());
        options.file_name = Some(format!("{}.mp4", job.id));

        self.storage
            .upload_bytes(bytes, &options)
            .await
            .map_err(|e| RenderError::Reconciliation(format!("upload failed: {e}")))
    }

    /// A user's jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Storage` on store failures.
    pub fn list_jobs(&self, user_id: &UserId, limit: usize, offset: usize) -> Result<Vec<RenderJob>> {
        Ok(self.store.list_render_jobs_by_user(user_id, limit, offset)?)
    }
}
