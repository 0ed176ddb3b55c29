//! REST API client for the QCrBox HTTP endpoints.
//!
//! Wraps health, catalog, dataset upload/download, command invocation and
//! calculation lookup using [`reqwest`].

use std::path::Path;
use std::time::Duration;

use qcrbox_core::catalog::Application;
use qcrbox_core::error::RemoteError;
use qcrbox_core::status::JobStatus;
use qcrbox_core::types::{JobId, RemoteFileRef};

use crate::config::ClientConfig;
use crate::messages::{
    parse_error_body, parse_status, ApplicationsPayload, CalculationData, CalculationsPayload,
    DatasetData, DatasetsPayload, Envelope, HealthResponse, InvokeCommandRequest, InvokePayload,
};

/// HTTP client for a single QCrBox instance.
#[derive(Debug, Clone)]
pub struct QCrBoxApi {
    client: reqwest::Client,
    api_url: String,
    timeout_secs: u64,
}

/// Errors from the QCrBox REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx status without a service error body.
    #[error("QCrBox API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The service returned its error envelope.
    #[error("QCrBox rejected the request ({code}): {message}")]
    Rejected { code: u16, message: String },

    /// A 2xx body that does not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// A local file could not be read for upload.
    #[error("Cannot read {path}: {source}")]
    LocalFile {
        path: String,
        source: std::io::Error,
    },
}

impl ApiError {
    /// Convert into the transport-neutral [`RemoteError`].
    pub fn into_remote(self, timeout_secs: u64) -> RemoteError {
        match self {
            Self::Request(e) if e.is_timeout() => RemoteError::Timeout(timeout_secs),
            Self::Request(e) if e.is_decode() => RemoteError::Protocol(e.to_string()),
            Self::Request(e) => RemoteError::Network(e.to_string()),
            Self::Status { status: 404, body } | Self::Rejected { code: 404, message: body } => {
                RemoteError::NotFound(body)
            }
            Self::Status { status, body } => RemoteError::Rejected {
                code: status,
                message: body,
            },
            Self::Rejected { code, message } => RemoteError::Rejected { code, message },
            Self::Decode(msg) => RemoteError::Protocol(msg),
            Self::LocalFile { path, source } => RemoteError::LocalIo(format!("{path}: {source}")),
        }
    }
}

impl QCrBoxApi {
    /// Create a client with a per-request timeout.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:11000`.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url, timeout))
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(config.base_url.clone(), config.request_timeout)
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub(crate) fn remote_error(&self, err: ApiError) -> RemoteError {
        err.into_remote(self.timeout_secs)
    }

    /// `GET /api/admin/healthz`.
    pub async fn health(&self) -> Result<bool, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/admin/healthz", self.api_url))
            .send()
            .await?;
        let health: HealthResponse = Self::parse_response(response).await?;
        Ok(health.is_ok())
    }

    /// `GET /api/applications`, with commands embedded.
    pub async fn list_applications(&self) -> Result<Vec<Application>, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/applications", self.api_url))
            .send()
            .await?;
        let envelope: Envelope<ApplicationsPayload> = Self::parse_response(response).await?;
        Ok(envelope
            .payload
            .applications
            .into_iter()
            .map(|a| a.into_application())
            .collect())
    }

    /// Upload one file as a new dataset (`POST /api/datasets`).
    pub async fn create_dataset(&self, path: &Path) -> Result<RemoteFileRef, ApiError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ApiError::Decode(format!("{} has no file name", path.display())))?;
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::LocalFile {
            path: path.display().to_string(),
            source,
        })?;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.clone());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(format!("{}/api/datasets", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let dataset = Self::first_dataset(Self::parse_response(response).await?)?;
        let file = dataset.data_files.get(&file_name).ok_or_else(|| {
            ApiError::Decode(format!(
                "dataset {} does not list uploaded file {file_name}",
                dataset.qcrbox_dataset_id
            ))
        })?;
        Ok(RemoteFileRef::new(file.qcrbox_file_id.clone(), file_name)
            .in_dataset(dataset.qcrbox_dataset_id.clone()))
    }

    /// `GET /api/datasets/{id}`.
    pub async fn get_dataset(&self, dataset_id: &str) -> Result<DatasetData, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/datasets/{}", self.api_url, dataset_id))
            .send()
            .await?;
        Self::first_dataset(Self::parse_response(response).await?)
    }

    /// `GET /api/data_files/{id}/download`.
    pub async fn download_data_file(&self, file_id: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/data_files/{}/download", self.api_url, file_id))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Invoke a command (`POST /api/commands/invoke`); returns the
    /// calculation id.
    pub async fn invoke_command(&self, request: &InvokeCommandRequest<'_>) -> Result<JobId, ApiError> {
        let response = self
            .client
            .post(format!("{}/api/commands/invoke", self.api_url))
            .json(request)
            .send()
            .await?;
        let envelope: Envelope<InvokePayload> = Self::parse_response(response).await?;
        Ok(JobId::new(envelope.payload.calculation_id))
    }

    /// `GET /api/calculations/{id}`.
    pub async fn get_calculation(&self, calculation_id: &str) -> Result<CalculationData, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/calculations/{}", self.api_url, calculation_id))
            .send()
            .await?;
        let envelope: Envelope<CalculationsPayload> = Self::parse_response(response).await?;
        envelope
            .payload
            .calculations
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Decode(format!("no calculation {calculation_id} in response")))
    }

    /// Current status of a calculation.
    pub async fn calculation_status(&self, calculation_id: &str) -> Result<JobStatus, ApiError> {
        let calc = self.get_calculation(calculation_id).await?;
        parse_status(&calc.status)
            .ok_or_else(|| ApiError::Decode(format!("unknown calculation status '{}'", calc.status)))
    }

    // ---- private helpers ----

    fn first_dataset(envelope: Envelope<DatasetsPayload>) -> Result<DatasetData, ApiError> {
        envelope
            .payload
            .datasets
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Decode("response contains no dataset".into()))
    }

    /// Ensure the response has a success status code. A body carrying the
    /// service error envelope becomes [`ApiError::Rejected`], anything else
    /// [`ApiError::Status`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(match parse_error_body(&body) {
                Some(err) => ApiError::Rejected {
                    code: err.code,
                    message: err.message,
                },
                None => ApiError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
