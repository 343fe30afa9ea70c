//! Durable storage API client implementation.
//!
//! Uploads are signed: the signature is the SHA-256 of the sorted upload
//! parameters joined as `k=v&k=v`, immediately followed by the API secret.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

use super::types::{StorageErrorResponse, StoredMedia, UploadOptions};
use super::{MediaStorage, StorageError};
use crate::crypto::sha256_hex;

/// Uploads can carry whole render outputs.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Durable storage HTTP client.
#[derive(Debug, Clone)]
pub struct CloudStorageClient {
    client: Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl CloudStorageClient {
    /// Create a new storage client.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        })
    }

    fn upload_url(&self, options: &UploadOptions) -> String {
        format!(
            "{}/v1_1/{}/{}/upload",
            self.base_url,
            self.cloud_name,
            options.resource_type.as_str()
        )
    }

    /// Signed parameters for an upload, `signature` included.
    fn signed_params(&self, options: &UploadOptions, timestamp: i64) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        params.insert("folder", options.folder.clone());
        params.insert("timestamp", timestamp.to_string());
        if let Some(public_id) = &options.public_id {
            params.insert("public_id", public_id.clone());
            params.insert("overwrite", "true".to_string());
        }

        let signature = sign(&params, &self.api_secret);
        params.insert("signature", signature);
        params.insert("api_key", self.api_key.clone());
        params.insert("signature_algorithm", "sha256".to_string());
        params
    }

    fn form(&self, options: &UploadOptions, file: Part) -> Form {
        let timestamp = chrono::Utc::now().timestamp();
        self.signed_params(options, timestamp)
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value))
            .part("file", file)
    }

    async fn send(&self, options: &UploadOptions, form: Form) -> Result<StoredMedia, StorageError> {
        let response = self
            .client
            .post(self.upload_url(options))
            .multipart(form)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StorageError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<StorageErrorResponse, _> = response.json().await;

        match error_body {
            Ok(body) => Err(StorageError::Api {
                status: status.as_u16(),
                message: body.error.message,
            }),
            Err(_) => Err(StorageError::Api {
                status: status.as_u16(),
                message: format!("HTTP {status}"),
            }),
        }
    }
}

/// Signature over the sorted parameters.
fn sign(params: &BTreeMap<&'static str, String>, secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    sha256_hex(&format!("{joined}{secret}"))
}

#[async_trait]
impl MediaStorage for CloudStorageClient {
    async fn upload_bytes(
        &self,
        bytes: Vec<u8>,
        options: &UploadOptions,
    ) -> Result<StoredMedia, StorageError> {
        let file_name = options
            .file_name
            .clone()
            .unwrap_or_else(|| "upload.bin".to_string());
        let part = Part::bytes(bytes).file_name(file_name);

        let media = self.send(options, self.form(options, part)).await?;
        tracing::debug!(public_id = %media.public_id, bytes = ?media.bytes, "Stored media upload");
        Ok(media)
    }

    async fn upload_from_url(
        &self,
        url: &str,
        options: &UploadOptions,
    ) -> Result<StoredMedia, StorageError> {
        let part = Part::text(url.to_string());

        let media = self.send(options, self.form(options, part)).await?;
        tracing::debug!(public_id = %media.public_id, source = %url, "Stored remote media");
        Ok(media)
    }
}
