//! Common test utilities for clipforge integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use tempfile::TempDir;

use clipforge_core::{LayerInfo, UserId};
use clipforge_service::auth::JwtClaims;
use clipforge_service::provider::{
    ProviderJob, ProviderJobState, ProviderTemplate, RegisterTemplateRequest, SubmitJobRequest,
    UploadInfo,
};
use clipforge_service::storage::{StoredMedia, UploadOptions};
use clipforge_service::{
    create_router, AppState, MediaStorage, ProviderError, RenderOrchestrator, RenderProvider,
    ServiceConfig, StorageError,
};
use clipforge_store::MemoryStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ADMIN_KEY: &str = "test-admin-key";

/// Template with a project file and no predefined mapping.
pub const TEMPLATE_ID: u32 = 5;

// ============================================================================
// Fake render provider
// ============================================================================

/// Recorded calls and scripted behaviour of the fake provider.
#[derive(Default)]
pub struct ProviderState {
    pub templates: HashMap<String, ProviderTemplate>,
    pub jobs: HashMap<String, ProviderJob>,
    pub submitted: Vec<SubmitJobRequest>,
    pub register_calls: usize,
    pub upload_calls: usize,
    pub download_calls: usize,
    pub fail_submit: bool,
    pub fail_upload: bool,
    pub fail_download: bool,
    pub fail_status_checks: bool,
    /// Status checks that report "processing" before "uploaded".
    pub processing_checks: usize,
    pub compositions: Vec<String>,
    pub layers: Vec<LayerInfo>,
}

pub struct FakeProvider {
    pub state: Mutex<ProviderState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProviderState {
                compositions: vec!["main".into(), "outro".into()],
                layers: vec![
                    LayerInfo::new("txt_1", "main"),
                    LayerInfo::new("txt_2", "main"),
                    LayerInfo::new("img_1.png", "main"),
                    LayerInfo::new("background.png", "main"),
                    LayerInfo::new("txt_1", "outro"),
                ],
                ..ProviderState::default()
            }),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ProviderState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Script the provider's view of a job.
    pub fn set_job(&self, id: &str, state: ProviderJobState, output_url: Option<&str>, error: Option<&str>) {
        self.with(|s| {
            s.jobs.insert(
                id.to_string(),
                ProviderJob {
                    id: id.to_string(),
                    state,
                    progress: None,
                    output_url: output_url.map(String::from),
                    error: error.map(String::from),
                },
            );
        });
    }

    fn api_error(status: u16) -> ProviderError {
        ProviderError::Api {
            status,
            message: "scripted failure".into(),
        }
    }
}

#[async_trait]
impl RenderProvider for FakeProvider {
    async fn register_template(
        &self,
        request: &RegisterTemplateRequest,
    ) -> Result<ProviderTemplate, ProviderError> {
        Ok(self.with(|s| {
            s.register_calls += 1;
            let id = format!("asset_{}", s.register_calls);
            let template = ProviderTemplate {
                id: id.clone(),
                status: "created".into(),
                display_name: Some(request.display_name.clone()),
                compositions: Vec::new(),
                layers: Vec::new(),
                upload_info: Some(UploadInfo {
                    url: format!("https://upload.test/{id}"),
                    method: "PUT".into(),
                }),
            };
            s.templates.insert(id, template.clone());
            template
        }))
    }

    async fn upload_template(&self, target: &UploadInfo, bytes: Vec<u8>) -> Result<(), ProviderError> {
        assert!(!bytes.is_empty());
        self.with(|s| {
            if s.fail_upload {
                return Err(Self::api_error(500));
            }
            s.upload_calls += 1;
            let id = target.url.rsplit('/').next().unwrap_or_default().to_string();
            let (compositions, layers) = (s.compositions.clone(), s.layers.clone());
            if let Some(template) = s.templates.get_mut(&id) {
                template.compositions = compositions;
                template.layers = layers;
            }
            Ok(())
        })
    }

    async fn get_template(&self, asset_id: &str) -> Result<Option<ProviderTemplate>, ProviderError> {
        self.with(|s| {
            if s.fail_status_checks {
                return Err(Self::api_error(503));
            }
            let Some(template) = s.templates.get_mut(asset_id) else {
                return Ok(None);
            };
            if template.status == "created" && s.upload_calls > 0 {
                if s.processing_checks > 0 {
                    s.processing_checks -= 1;
                    template.status = "processing".into();
                    return Ok(Some(template.clone()));
                }
                template.status = "uploaded".into();
            } else if template.status == "processing" {
                if s.processing_checks > 0 {
                    s.processing_checks -= 1;
                    return Ok(Some(template.clone()));
                }
                template.status = "uploaded".into();
            }
            Ok(Some(template.clone()))
        })
    }

    async fn list_templates(&self) -> Result<Vec<ProviderTemplate>, ProviderError> {
        Ok(self.with(|s| s.templates.values().cloned().collect()))
    }

    async fn delete_template(&self, asset_id: &str) -> Result<(), ProviderError> {
        self.with(|s| s.templates.remove(asset_id));
        Ok(())
    }

    async fn submit_job(&self, request: &SubmitJobRequest) -> Result<ProviderJob, ProviderError> {
        self.with(|s| {
            if s.fail_submit {
                return Err(Self::api_error(500));
            }
            s.submitted.push(request.clone());
            let id = format!("job_{}", s.submitted.len());
            let job = ProviderJob {
                id: id.clone(),
                state: ProviderJobState::Queued,
                progress: None,
                output_url: None,
                error: None,
            };
            s.jobs.insert(id, job.clone());
            Ok(job)
        })
    }

    async fn get_job(&self, job_id: &str) -> Result<ProviderJob, ProviderError> {
        self.with(|s| s.jobs.get(job_id).cloned().ok_or_else(|| Self::api_error(404)))
    }

    async fn download_output(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        self.with(|s| {
            s.download_calls += 1;
            if s.fail_download {
                return Err(Self::api_error(410));
            }
            Ok(format!("video from {url}").into_bytes())
        })
    }
}

// ============================================================================
// Fake durable storage
// ============================================================================

#[derive(Default)]
pub struct FakeStorage {
    pub uploads: Mutex<Vec<(String, Option<String>, usize)>>,
}

#[async_trait]
impl MediaStorage for FakeStorage {
    async fn upload_bytes(
        &self,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<StoredMedia, StorageError> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((options.folder.clone(), options.public_id.clone(), bytes.len()));
        let public_id = options
            .public_id
            .clone()
            .unwrap_or_else(|| format!("asset{}", uploads.len()));
        Ok(StoredMedia {
            secure_url: format!("https://cdn.test/{}/{public_id}", options.folder),
            public_id: format!("{}/{public_id}", options.folder),
            format: Some("mp4".into()),
            width: None,
            height: None,
            bytes: Some(bytes.len() as u64),
            duration: None,
        })
    }

    async fn upload_from_url(
        &self,
        url: &str,
        options: &UploadOptions,
    ) -> Result<StoredMedia, StorageError> {
        self.upload_bytes(url.as_bytes().to_vec(), options).await
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary templates directory (kept alive for test duration).
    pub templates_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    pub provider: Arc<FakeProvider>,
    pub storage: Arc<FakeStorage>,
    pub store: Arc<MemoryStore>,
    pub renders: Arc<RenderOrchestrator>,
}

impl TestHarness {
    /// Create a new test harness with a fresh store and one template file.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Same as [`TestHarness::new`] with configuration overrides.
    pub fn with_config(customize: impl FnOnce(&mut ServiceConfig)) -> Self {
        let templates_dir = TempDir::new().expect("Failed to create temp directory");
        write_template_file(templates_dir.path(), &format!("template_{TEMPLATE_ID}.zip"));

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            jwt_secret: Some(JWT_SECRET.into()),
            admin_api_key: Some(ADMIN_KEY.into()),
            webhook_base_url: Some("https://api.clipforge.test".into()),
            templates_dir: templates_dir.path().to_path_buf(),
            upload_poll_attempts: 3,
            upload_poll_delay: Duration::from_millis(1),
            max_body_bytes: 1024 * 1024,
            ..ServiceConfig::default()
        };
        customize(&mut config);

        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let storage = Arc::new(FakeStorage::default());

        let state = AppState::with_services(
            store.clone() as Arc<dyn clipforge_store::Store>,
            config,
            Some(provider.clone() as Arc<dyn RenderProvider>),
            Some(storage.clone() as Arc<dyn MediaStorage>),
        )
        .expect("Failed to build state");
        let renders = state.renders.clone().expect("Rendering configured");
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            templates_dir,
            test_user_id: UserId::generate(),
            provider,
            storage,
            store,
            renders,
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        auth_header_for(self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        auth_header_for(UserId::generate())
    }

    /// Open the test user's account (3 welcome credits).
    pub async fn open_account(&self) {
        self.server
            .post("/v1/accounts")
            .add_header("authorization", self.user_auth_header())
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    /// Create a render for the default template; returns the response body.
    pub async fn create_render(&self, customizations: serde_json::Value) -> axum_test::TestResponse {
        self.server
            .post("/v1/renders")
            .add_header("authorization", self.user_auth_header())
            .json(&json!({
                "template_id": TEMPLATE_ID,
                "customizations": customizations
            }))
            .await
    }

    /// Current balance of the test user.
    pub async fn balance(&self) -> i64 {
        let response = self
            .server
            .get("/v1/credits/balance")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        response.json::<serde_json::Value>()["credits"]
            .as_i64()
            .expect("credits")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Bearer header carrying a valid HS256 token for `user_id`.
pub fn auth_header_for(user_id: UserId) -> String {
    let claims = JwtClaims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
        iat: Some(chrono::Utc::now().timestamp()),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign token");
    format!("Bearer {token}")
}

pub fn write_template_file(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), b"PK\x03\x04 project").expect("Failed to write template file");
}
