//! Application state.

use std::sync::Arc;

use clipforge_core::{LayerMappingResolver, MappingTables, RenderError};
use clipforge_store::Store;

use crate::config::ServiceConfig;
use crate::ledger::CreditsLedger;
use crate::orchestrator::RenderOrchestrator;
use crate::provider::{ProviderClient, RenderProvider};
use crate::storage::{CloudStorageClient, MediaStorage};
use crate::templates::{TemplateManager, UploadSettings};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Credits ledger.
    pub ledger: CreditsLedger,

    /// Durable media storage (optional).
    pub storage: Option<Arc<dyn MediaStorage>>,

    /// Template manager, available when the render provider is configured.
    pub templates: Option<Arc<TemplateManager>>,

    /// Render orchestrator, available when provider and storage are configured.
    pub renders: Option<Arc<RenderOrchestrator>>,
}

impl AppState {
    /// Create application state, building HTTP clients from the configuration.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Configuration` if the layer mapping file cannot be
    /// loaded or its patterns do not compile.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self, RenderError> {
        // Create render provider client if configured
        let provider = config
            .provider_api_url
            .as_ref()
            .zip(config.provider_api_key.as_ref())
            .and_then(|(url, key)| match ProviderClient::new(url, key) {
                Ok(client) => {
                    tracing::info!(provider_url = %url, "Render provider integration enabled");
                    Some(Arc::new(client) as Arc<dyn RenderProvider>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create render provider client");
                    None
                }
            });

        if provider.is_none() {
            tracing::warn!("Render provider not configured - renders will not be available");
        }

        // Create durable storage client if configured
        let storage = match (
            &config.storage_cloud_name,
            &config.storage_api_key,
            &config.storage_api_secret,
        ) {
            (Some(cloud), Some(key), Some(secret)) => {
                match CloudStorageClient::new(&config.storage_api_url, cloud, key, secret) {
                    Ok(client) => {
                        tracing::info!(cloud_name = %cloud, "Durable storage integration enabled");
                        Some(Arc::new(client) as Arc<dyn MediaStorage>)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to create storage client");
                        None
                    }
                }
            }
            _ => None,
        };

        if storage.is_none() {
            tracing::warn!("Durable storage not configured - uploads and renders will not be available");
        }

        Self::with_services(store, config, provider, storage)
    }

    /// Create application state around already-built integrations.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Configuration` if the layer mapping file cannot be
    /// loaded or its patterns do not compile.
    pub fn with_services(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        provider: Option<Arc<dyn RenderProvider>>,
        storage: Option<Arc<dyn MediaStorage>>,
    ) -> Result<Self, RenderError> {
        let ledger = CreditsLedger::new(store.clone());
        let resolver = Arc::new(LayerMappingResolver::new(load_mapping_tables(&config)?)?);

        let templates = provider.as_ref().map(|provider| {
            Arc::new(TemplateManager::new(
                store.clone(),
                provider.clone(),
                resolver.clone(),
                UploadSettings {
                    templates_dir: config.templates_dir.clone(),
                    poll_attempts: config.upload_poll_attempts,
                    poll_delay: config.upload_poll_delay,
                },
            ))
        });

        let renders = match (&provider, &storage, &templates) {
            (Some(provider), Some(storage), Some(templates)) => {
                Some(Arc::new(RenderOrchestrator::new(
                    store.clone(),
                    ledger.clone(),
                    templates.clone(),
                    provider.clone(),
                    storage.clone(),
                    config.render_webhook_url(),
                )))
            }
            _ => None,
        };

        Ok(Self {
            store,
            config,
            ledger,
            storage,
            templates,
            renders,
        })
    }

    /// Check if rendering is available.
    #[must_use]
    pub fn has_renders(&self) -> bool {
        self.renders.is_some()
    }
}

/// Mapping tables from `LAYER_MAPPINGS_PATH`, or the built-in ones.
fn load_mapping_tables(config: &ServiceConfig) -> Result<MappingTables, RenderError> {
    let Some(path) = &config.layer_mappings_path else {
        return Ok(MappingTables::builtin());
    };

    let json = std::fs::read_to_string(path).map_err(|e| {
        RenderError::Configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    let tables = MappingTables::from_json(&json)?;

    tracing::info!(
        path = %path.display(),
        predefined = tables.predefined.len(),
        fields = tables.patterns.len(),
        "Loaded layer mapping tables"
    );
    Ok(tables)
}
