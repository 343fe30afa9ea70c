//! Template registration and upload manager.
//!
//! Makes sure a catalog template is uploaded to the render provider before a
//! job is submitted against it, and keeps the local registration record in
//! step with the provider.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use clipforge_core::{
    LayerMappingResolver, RenderError, Result, TemplateId, TemplateRegistration, TemplateStatus,
};
use clipforge_store::Store;

use crate::provider::{ProviderTemplate, RegisterTemplateRequest, RenderProvider, TemplateFormat};

/// Concurrent uploads in [`TemplateManager::upload_all`].
const BULK_UPLOAD_CONCURRENCY: usize = 4;

/// File stems tried for a template, in order. `{}` is the template id.
const FILE_STEMS: [&str; 4] = ["template_{}", "template-{}", "template{}", "{}"];

/// Project file formats tried for each stem, in order.
const FILE_FORMATS: [TemplateFormat; 2] = [TemplateFormat::Zip, TemplateFormat::Aep];

/// Upload manager settings.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Directory holding the project files.
    pub templates_dir: PathBuf,
    /// Status checks after an upload before giving up.
    pub poll_attempts: u32,
    /// Delay between status checks.
    pub poll_delay: Duration,
}

/// Template registration and upload manager.
pub struct TemplateManager {
    store: Arc<dyn Store>,
    provider: Arc<dyn RenderProvider>,
    resolver: Arc<LayerMappingResolver>,
    settings: UploadSettings,
    /// One lock per template so concurrent callers never register twice.
    locks: Mutex<HashMap<TemplateId, Arc<Mutex<()>>>>,
}

impl TemplateManager {
    /// Create a manager.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn RenderProvider>,
        resolver: Arc<LayerMappingResolver>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            store,
            provider,
            resolver,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The mapping resolver shared with the orchestrator.
    #[must_use]
    pub fn resolver(&self) -> &LayerMappingResolver {
        &self.resolver
    }

    /// Return an uploaded registration for `template_id`, uploading if needed.
    ///
    /// # Errors
    ///
    /// - `RenderError::NotFound` if no project file exists for the template.
    /// - `RenderError::Upload` if registration or the binary upload fails.
    /// - `RenderError::Timeout` if the provider does not finish processing in time.
    pub async fn ensure_uploaded(&self, template_id: TemplateId) -> Result<TemplateRegistration> {
        let lock = self.lock_for(template_id).await;
        let _guard = lock.lock().await;

        let local = self.store.get_template(template_id)?;

        if let Some(registration) = &local {
            match registration.status {
                TemplateStatus::Uploaded => {
                    if let Some(cached) = self.check_cached(registration).await {
                        return Ok(cached);
                    }
                }
                TemplateStatus::AwaitingUpload => {
                    if let Some(asset_id) = registration.provider_asset_id.clone() {
                        tracing::info!(
                            template_id = %template_id,
                            asset_id = %asset_id,
                            "Resuming wait for template upload"
                        );
                        return self.await_ready(registration.clone(), &asset_id).await;
                    }
                }
                TemplateStatus::NotRegistered | TemplateStatus::Error => {}
            }
        }

        let registration = local.unwrap_or_else(|| TemplateRegistration::new(template_id));
        self.upload(registration).await
    }

    /// Cache-hit check: `Some` if the local Uploaded record can be used as is.
    async fn check_cached(&self, registration: &TemplateRegistration) -> Option<TemplateRegistration> {
        let template_id = registration.template_id;
        let asset_id = registration.ready_asset_id()?;

        match self.provider.get_template(asset_id).await {
            Ok(Some(remote)) if remote.is_uploaded() => Some(registration.clone()),
            Ok(Some(remote)) => {
                tracing::warn!(
                    template_id = %template_id,
                    asset_id = %asset_id,
                    status = %remote.status,
                    "Provider no longer reports template as uploaded, re-uploading"
                );
                None
            }
            Ok(None) => {
                tracing::warn!(
                    template_id = %template_id,
                    asset_id = %asset_id,
                    "Template asset missing on provider, re-uploading"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    template_id = %template_id,
                    asset_id = %asset_id,
                    error = %e,
                    "Template status check failed, trusting local record"
                );
                Some(registration.clone())
            }
        }
    }

    async fn upload(&self, mut registration: TemplateRegistration) -> Result<TemplateRegistration> {
        let template_id = registration.template_id;
        let (path, format) = self.locate_file(template_id).await?;

        if let Some(existing) = self.find_existing(&registration.display_name).await {
            tracing::info!(
                template_id = %template_id,
                asset_id = %existing.id,
                "Recovered existing provider asset"
            );
            return self.finish(registration, existing);
        }

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            RenderError::Upload(format!("cannot read {}: {e}", path.display()))
        })?;

        let request = RegisterTemplateRequest {
            format,
            display_name: registration.display_name.clone(),
        };
        let remote = match self.provider.register_template(&request).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::error!(template_id = %template_id, error = %e, "Template registration failed");
                return Err(self.record_failure(registration, format!("registration failed: {e}")));
            }
        };

        let Some(target) = remote.upload_info.clone() else {
            tracing::error!(template_id = %template_id, asset_id = %remote.id, "Registration returned no upload target");
            self.discard_asset(template_id, &remote.id).await;
            return Err(self.record_failure(registration, "registration returned no upload target".into()));
        };

        registration.awaiting_upload(remote.id.clone());
        self.store.put_template(&registration)?;

        tracing::info!(
            template_id = %template_id,
            asset_id = %remote.id,
            bytes = bytes.len(),
            "Uploading template"
        );

        if let Err(e) = self.provider.upload_template(&target, bytes).await {
            tracing::error!(template_id = %template_id, error = %e, "Template upload failed");
            self.discard_asset(template_id, &remote.id).await;
            return Err(self.record_failure(registration, format!("upload failed: {e}")));
        }

        self.await_ready(registration, &remote.id).await
    }

    /// Best-effort delete of a provider asset the record is about to forget.
    async fn discard_asset(&self, template_id: TemplateId, asset_id: &str) {
        if let Err(e) = self.provider.delete_template(asset_id).await {
            tracing::warn!(
                template_id = %template_id,
                asset_id,
                error = %e,
                "Failed to delete abandoned template asset"
            );
        }
    }

    /// Mark the record failed and build the error to return.
    fn record_failure(&self, mut registration: TemplateRegistration, message: String) -> RenderError {
        registration.mark_error(message.clone());
        if let Err(e) = self.store.put_template(&registration) {
            tracing::error!(
                template_id = %registration.template_id,
                error = %e,
                "Failed to record template error"
            );
        }
        RenderError::Upload(message)
    }

    async fn await_ready(
        &self,
        registration: TemplateRegistration,
        asset_id: &str,
    ) -> Result<TemplateRegistration> {
        let template_id = registration.template_id;
        let attempts = self.settings.poll_attempts;

        for attempt in 1..=attempts {
            match self.provider.get_template(asset_id).await {
                Ok(Some(remote)) if remote.is_uploaded() => {
                    return self.finish(registration, remote);
                }
                Ok(Some(remote)) if remote.is_error() => {
                    tracing::error!(template_id = %template_id, asset_id, "Provider rejected template");
                    self.discard_asset(template_id, asset_id).await;
                    return Err(self.record_failure(
                        registration,
                        "provider rejected the template".into(),
                    ));
                }
                Ok(Some(remote)) => {
                    tracing::debug!(
                        template_id = %template_id,
                        attempt,
                        status = %remote.status,
                        "Template still processing"
                    );
                }
                Ok(None) => {
                    tracing::error!(template_id = %template_id, asset_id, "Template asset disappeared");
                    return Err(self.record_failure(
                        registration,
                        "template asset disappeared during upload".into(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(
                        template_id = %template_id,
                        attempt,
                        error = %e,
                        "Template status check failed, retrying"
                    );
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.settings.poll_delay).await;
            }
        }

        tracing::warn!(template_id = %template_id, attempts, "Template not ready in time");
        Err(RenderError::Timeout {
            template_id,
            attempts,
        })
    }

    /// Persist an Uploaded record built from the provider's view.
    fn finish(
        &self,
        mut registration: TemplateRegistration,
        remote: ProviderTemplate,
    ) -> Result<TemplateRegistration> {
        let template_id = registration.template_id;
        let mapping = self.resolver.generate(template_id, &remote.layers);

        registration.mark_uploaded(remote.id, remote.compositions, remote.layers, mapping);
        self.store.put_template(&registration)?;

        tracing::info!(
            template_id = %template_id,
            compositions = registration.compositions.len(),
            layers = registration.layers.len(),
            "Template uploaded"
        );

        Ok(registration)
    }

    /// An already uploaded provider asset with this display name.
    async fn find_existing(&self, display_name: &str) -> Option<ProviderTemplate> {
        match self.provider.list_templates().await {
            Ok(templates) => templates.into_iter().find(|t| {
                t.is_uploaded() && t.display_name.as_deref() == Some(display_name)
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Listing provider templates failed, registering anew");
                None
            }
        }
    }

    /// The project file for `template_id`, recognised the same way as
    /// [`TemplateManager::available_template_ids`]. Stems and formats earlier
    /// in `FILE_STEMS` and `FILE_FORMATS` win.
    async fn locate_file(&self, template_id: TemplateId) -> Result<(PathBuf, TemplateFormat)> {
        let stems: Vec<String> = FILE_STEMS
            .iter()
            .map(|stem| stem.replace("{}", &template_id.to_string()))
            .collect();

        self.project_files()
            .await?
            .into_iter()
            .filter(|path| template_id_from_path(path) == Some(template_id))
            .filter_map(|path| {
                let format = TemplateFormat::from_extension(path.extension()?.to_str()?)?;
                let stem = path.file_stem()?.to_str()?.to_ascii_lowercase();
                let stem_rank = stems.iter().position(|s| *s == stem).unwrap_or(stems.len());
                let format_rank = FILE_FORMATS.iter().position(|f| *f == format)?;
                Some(((stem_rank, format_rank), path, format))
            })
            .min_by_key(|(rank, _, _)| *rank)
            .map(|(_, path, format)| (path, format))
            .ok_or_else(|| RenderError::not_found("template file", template_id))
    }

    /// All registration records, by template ID.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Storage` on store failures.
    pub fn list(&self) -> Result<Vec<TemplateRegistration>> {
        Ok(self.store.list_templates()?)
    }

    /// One registration record.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::NotFound` if the template was never registered.
    pub fn get(&self, template_id: TemplateId) -> Result<TemplateRegistration> {
        self.store
            .get_template(template_id)?
            .ok_or_else(|| RenderError::not_found("template", template_id))
    }

    /// Remove a registration, deleting the provider asset when there is one.
    ///
    /// A provider-side failure is logged; the local record is removed regardless.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::NotFound` if the template was never registered.
    pub async fn delete(&self, template_id: TemplateId) -> Result<()> {
        let lock = self.lock_for(template_id).await;
        let _guard = lock.lock().await;

        let registration = self.get(template_id)?;

        if let Some(asset_id) = &registration.provider_asset_id {
            if let Err(e) = self.provider.delete_template(asset_id).await {
                tracing::warn!(
                    template_id = %template_id,
                    asset_id = %asset_id,
                    error = %e,
                    "Provider template delete failed"
                );
            }
        }

        self.store.delete_template(template_id)?;
        tracing::info!(template_id = %template_id, "Template registration deleted");
        Ok(())
    }

    /// Upload every template that has a project file, a few at a time.
    ///
    /// # Errors
    ///
    /// Fails only if the templates directory cannot be listed; per-template
    /// failures are reported in the result.
    pub async fn upload_all(&self) -> Result<Vec<(TemplateId, Result<TemplateRegistration>)>> {
        let ids = self.available_template_ids().await?;

        let mut results: Vec<_> = stream::iter(ids)
            .map(|id| async move { (id, self.ensure_uploaded(id).await) })
            .buffer_unordered(BULK_UPLOAD_CONCURRENCY)
            .collect()
            .await;
        results.sort_by_key(|(id, _)| *id);

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        tracing::info!(total = results.len(), failed, "Bulk template upload finished");

        Ok(results)
    }

    /// Template IDs with a project file in the templates directory.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Configuration` if the directory cannot be read.
    pub async fn available_template_ids(&self) -> Result<Vec<TemplateId>> {
        let mut ids: Vec<TemplateId> = self
            .project_files()
            .await?
            .iter()
            .filter_map(|path| template_id_from_path(path))
            .collect();

        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Regular files in the templates directory; empty if it doesn't exist.
    async fn project_files(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.settings.templates_dir;
        let unreadable = |e: std::io::Error| {
            RenderError::Configuration(format!(
                "cannot read templates directory {}: {e}",
                dir.display()
            ))
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %dir.display(), "Templates directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(unreadable(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
            let path = entry.path();
            if is_file(&path).await {
                files.push(path);
            }
        }
        Ok(files)
    }

    async fn lock_for(&self, template_id: TemplateId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(template_id)
            .or_default()
            .clone()
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

/// Template ID encoded in a project file name, if any.
fn template_id_from_path(path: &Path) -> Option<TemplateId> {
    let ext = path.extension()?.to_str()?;
    TemplateFormat::from_extension(ext)?;

    let stem = path.file_stem()?.to_str()?.to_ascii_lowercase();
    let digits = stem
        .strip_prefix("template_")
        .or_else(|| stem.strip_prefix("template-"))
        .or_else(|| stem.strip_prefix("template"))
        .unwrap_or(&stem);
    digits.parse().ok()
}
