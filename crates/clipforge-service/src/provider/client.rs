//! Render provider API client implementation.

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::Duration;

use super::types::{
    normalize_job, ProviderErrorResponse, ProviderJob, ProviderTemplate, RawJobResponse,
    RegisterTemplateRequest, SubmitJobRequest, UploadInfo,
};
use super::{ProviderError, RenderProvider};

/// Render provider HTTP client.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    api_key: String,
}

/// Templates listing, either bare or wrapped.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum TemplateList {
    Wrapped { data: Vec<ProviderTemplate> },
    Bare(Vec<ProviderTemplate>),
}

impl ProviderClient {
    /// Create a new provider client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Provider API URL (e.g., `"https://api.provider.example/v1"`)
    /// * `api_key` - Provider API key
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn authorized(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        Err(Self::api_error(status, response).await)
    }

    async fn api_error(status: reqwest::StatusCode, response: reqwest::Response) -> ProviderError {
        let body: Result<ProviderErrorResponse, _> = response.json().await;
        let message = body
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| format!("HTTP {status}"));
        ProviderError::Api {
            status: status.as_u16(),
            message,
        }
    }

    async fn job_response(&self, response: reqwest::Response) -> Result<ProviderJob, ProviderError> {
        let raw: RawJobResponse = self.handle_response(response).await?;
        normalize_job(raw)
    }
}

#[async_trait]
impl RenderProvider for ProviderClient {
    async fn register_template(
        &self,
        request: &RegisterTemplateRequest,
    ) -> Result<ProviderTemplate, ProviderError> {
        let url = format!("{}/templates", self.base_url);

        let response = self
            .authorized(Method::POST, &url)
            .json(request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn upload_template(
        &self,
        target: &UploadInfo,
        bytes: Vec<u8>,
    ) -> Result<(), ProviderError> {
        let method = Method::from_bytes(target.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ProviderError::Configuration(format!("bad upload method {}", target.method)))?;

        // Presigned target; no bearer header.
        let response = self
            .client
            .request(method, &target.url)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Self::api_error(status, response).await)
    }

    async fn get_template(&self, asset_id: &str) -> Result<Option<ProviderTemplate>, ProviderError> {
        let url = format!("{}/templates/{}", self.base_url, asset_id);

        let response = self.authorized(Method::GET, &url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        self.handle_response(response).await.map(Some)
    }

    async fn list_templates(&self) -> Result<Vec<ProviderTemplate>, ProviderError> {
        let url = format!("{}/templates", self.base_url);

        let response = self.authorized(Method::GET, &url).send().await?;

        self.handle_response::<TemplateList>(response)
            .await
            .map(|list| match list {
                TemplateList::Wrapped { data } | TemplateList::Bare(data) => data,
            })
    }

    async fn delete_template(&self, asset_id: &str) -> Result<(), ProviderError> {
        let url = format!("{}/templates/{}", self.base_url, asset_id);

        let response = self.authorized(Method::DELETE, &url).send().await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::api_error(status, response).await)
    }

    async fn submit_job(&self, request: &SubmitJobRequest) -> Result<ProviderJob, ProviderError> {
        let url = format!("{}/jobs", self.base_url);

        let response = self
            .authorized(Method::POST, &url)
            .json(request)
            .send()
            .await?;

        self.job_response(response).await
    }

    async fn get_job(&self, job_id: &str) -> Result<ProviderJob, ProviderError> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);

        let response = self.authorized(Method::GET, &url).send().await?;

        self.job_response(response).await
    }

    async fn download_output(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: format!("output download returned HTTP {status}"),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
