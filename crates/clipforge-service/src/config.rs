//! Service configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/clipforge").
    pub data_dir: String,

    /// HS256 secret used to validate end-user JWTs.
    pub jwt_secret: Option<String>,

    /// Admin API key for template administration and credit grants.
    pub admin_api_key: Option<String>,

    /// Render provider API base URL (optional).
    pub provider_api_url: Option<String>,

    /// Render provider API key (optional).
    pub provider_api_key: Option<String>,

    /// Shared secret for render provider webhook signatures (optional).
    pub provider_webhook_secret: Option<String>,

    /// Public base URL the provider calls back on; `/webhooks/render` is appended.
    pub webhook_base_url: Option<String>,

    /// Durable storage API base URL (default: `<https://api.cloudinary.com>`).
    pub storage_api_url: String,

    /// Durable storage account (cloud) name (optional).
    pub storage_cloud_name: Option<String>,

    /// Durable storage API key (optional).
    pub storage_api_key: Option<String>,

    /// Durable storage API secret (optional).
    pub storage_api_secret: Option<String>,

    /// Directory holding template project files (default: "./templates").
    pub templates_dir: PathBuf,

    /// JSON file overriding the built-in layer mapping tables (optional).
    pub layer_mappings_path: Option<PathBuf>,

    /// Template status checks after an upload before giving up.
    pub upload_poll_attempts: u32,

    /// Delay between template status checks.
    pub upload_poll_delay: Duration,

    /// Stripe webhook secret (optional).
    pub stripe_webhook_secret: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Render provider secrets file structure.
#[derive(Debug, Deserialize)]
struct ProviderSecrets {
    api_url: String,
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

/// Durable storage secrets file structure.
#[derive(Debug, Deserialize)]
struct StorageSecrets {
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

/// Default number of template status checks.
const DEFAULT_UPLOAD_POLL_ATTEMPTS: u32 = 30;

/// Default delay between template status checks, in milliseconds.
const DEFAULT_UPLOAD_POLL_DELAY_MS: u64 = 2000;

/// Default request body limit; customization uploads may be short videos.
const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        // Secrets files take precedence over environment variables
        let (provider_api_url, provider_api_key, provider_webhook_secret) =
            load_provider_secrets();
        let (storage_cloud_name, storage_api_key, storage_api_secret) = load_storage_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/clipforge".into()),
            jwt_secret: std::env::var("JWT_SECRET").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            provider_api_url,
            provider_api_key,
            provider_webhook_secret,
            webhook_base_url: std::env::var("WEBHOOK_BASE_URL").ok(),
            storage_api_url: std::env::var("STORAGE_API_URL")
                .unwrap_or_else(|_| "https://api.cloudinary.com".into()),
            storage_cloud_name,
            storage_api_key,
            storage_api_secret,
            templates_dir: std::env::var("TEMPLATES_DIR")
                .map_or_else(|_| PathBuf::from("./templates"), PathBuf::from),
            layer_mappings_path: std::env::var("LAYER_MAPPINGS_PATH").ok().map(PathBuf::from),
            upload_poll_attempts: env_parse("UPLOAD_POLL_ATTEMPTS")
                .unwrap_or(DEFAULT_UPLOAD_POLL_ATTEMPTS),
            upload_poll_delay: Duration::from_millis(
                env_parse("UPLOAD_POLL_DELAY_MS").unwrap_or(DEFAULT_UPLOAD_POLL_DELAY_MS),
            ),
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(DEFAULT_MAX_BODY_BYTES),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS").unwrap_or(30),
        }
    }

    /// Full webhook callback URL, if a public base URL is configured.
    #[must_use]
    pub fn render_webhook_url(&self) -> Option<String> {
        self.webhook_base_url
            .as_deref()
            .map(|base| format!("{}/webhooks/render", base.trim_end_matches('/')))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Load render provider secrets from file or environment.
fn load_provider_secrets() -> (Option<String>, Option<String>, Option<String>) {
    let secret_paths = [".secrets/provider.json", "../.secrets/provider.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<ProviderSecrets>(path) {
            tracing::info!(path = %path, "Loaded render provider secrets from file");
            return (
                Some(secrets.api_url),
                Some(secrets.api_key),
                secrets.webhook_secret,
            );
        }
    }

    tracing::debug!("Render provider secrets file not found, using environment variables");
    (
        std::env::var("PROVIDER_API_URL").ok(),
        std::env::var("PROVIDER_API_KEY").ok(),
        std::env::var("PROVIDER_WEBHOOK_SECRET").ok(),
    )
}

/// Load durable storage secrets from file or environment.
fn load_storage_secrets() -> (Option<String>, Option<String>, Option<String>) {
    let secret_paths = [".secrets/storage.json", "../.secrets/storage.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StorageSecrets>(path) {
            tracing::info!(path = %path, "Loaded storage secrets from file");
            return (
                Some(secrets.cloud_name),
                Some(secrets.api_key),
                Some(secrets.api_secret),
            );
        }
    }

    tracing::debug!("Storage secrets file not found, using environment variables");
    (
        std::env::var("STORAGE_CLOUD_NAME").ok(),
        std::env::var("STORAGE_API_KEY").ok(),
        std::env::var("STORAGE_API_SECRET").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/clipforge".into(),
            jwt_secret: None,
            admin_api_key: None,
            provider_api_url: None,
            provider_api_key: None,
            provider_webhook_secret: None,
            webhook_base_url: None,
            storage_api_url: "https://api.cloudinary.com".into(),
            storage_cloud_name: None,
            storage_api_key: None,
            storage_api_secret: None,
            templates_dir: PathBuf::from("./templates"),
            layer_mappings_path: None,
            upload_poll_attempts: DEFAULT_UPLOAD_POLL_ATTEMPTS,
            upload_poll_delay: Duration::from_millis(DEFAULT_UPLOAD_POLL_DELAY_MS),
            stripe_webhook_secret: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout_seconds: 30,
        }
    }
}
