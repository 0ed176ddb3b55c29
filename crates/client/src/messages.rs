//! QCrBox REST wire types.
//!
//! Every response is wrapped in an envelope `{"status": ..., "message": ...,
//! "payload": {...}}`; errors use `{"status": "error", "error": {"code",
//! "message"}}`. This module deserializes the parts the workflow needs and
//! converts them into the domain types of `qcrbox-core`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use qcrbox_core::catalog::{Application, Command, ParameterSpec};
use qcrbox_core::status::JobStatus;
use qcrbox_core::types::RemoteFileRef;

/// Success envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub payload: T,
}

/// Error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

/// Try to read a service error from a non-2xx body.
pub fn parse_error_body(body: &str) -> Option<ErrorBody> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

// ---------------------------------------------------------------------------
// Applications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationsPayload {
    pub applications: Vec<ApplicationData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationData {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub name: String,
    pub slug: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub commands: Vec<CommandData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandData {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub name: String,
    /// Application slug; falls back to the owning application.
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Parameter name -> declaration.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterData {
    #[serde(default)]
    pub dtype: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
}

fn id_string(id: &Option<serde_json::Value>, fallback: &str) -> String {
    match id {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => fallback.to_string(),
    }
}

impl ApplicationData {
    /// Convert into the domain model. Private commands are kept here and
    /// filtered at selection time.
    pub fn into_application(self) -> Application {
        let commands = self
            .commands
            .into_iter()
            .map(|c| c.into_command(&self.slug, &self.version))
            .collect();
        Application {
            id: self.slug.clone(),
            name: self.name,
            version: self.version,
            description: self.description,
            commands,
        }
    }
}

impl CommandData {
    pub fn into_command(self, app_slug: &str, app_version: &str) -> Command {
        let application = self.application.unwrap_or_else(|| app_slug.to_string());
        let version = self.version.unwrap_or_else(|| app_version.to_string());
        let id = id_string(&self.id, &format!("{application}:{}", self.name));

        let parameters = self
            .parameters
            .into_iter()
            .map(|(name, raw)| {
                let data: ParameterData = serde_json::from_value(raw).unwrap_or_else(|e| {
                    tracing::warn!(
                        command = %self.name,
                        parameter = %name,
                        error = %e,
                        "Unreadable parameter declaration",
                    );
                    ParameterData::default()
                });
                let mut spec =
                    ParameterSpec::from_dtype(name, data.dtype, data.required, data.default_value);
                spec.description = data.description;
                spec
            })
            .collect();

        Command {
            id,
            name: self.name,
            application,
            version,
            description: self.description,
            parameters,
            output_patterns: self.outputs,
        }
    }
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetsPayload {
    pub datasets: Vec<DatasetData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetData {
    pub qcrbox_dataset_id: String,
    /// File name -> metadata.
    #[serde(default)]
    pub data_files: BTreeMap<String, DataFileData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataFileData {
    pub qcrbox_file_id: String,
    #[serde(default)]
    pub filename: Option<String>,
}

impl DatasetData {
    /// Remote references of every file in the dataset.
    pub fn file_refs(&self) -> Vec<RemoteFileRef> {
        self.data_files
            .iter()
            .map(|(name, f)| {
                RemoteFileRef::new(
                    f.qcrbox_file_id.clone(),
                    f.filename.clone().unwrap_or_else(|| name.clone()),
                )
                .in_dataset(self.qcrbox_dataset_id.clone())
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Commands / calculations
// ---------------------------------------------------------------------------

/// Body of `POST /api/commands/invoke`.
#[derive(Debug, Clone, Serialize)]
pub struct InvokeCommandRequest<'a> {
    pub application_slug: &'a str,
    pub application_version: &'a str,
    pub command_name: &'a str,
    pub arguments: &'a serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvokePayload {
    pub calculation_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalculationsPayload {
    pub calculations: Vec<CalculationData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalculationData {
    #[serde(default)]
    pub calculation_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub output_dataset_id: Option<String>,
}

/// Map a remote calculation status string to [`JobStatus`].
pub fn parse_status(raw: &str) -> Option<JobStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "queued" | "pending" | "submitted" => Some(JobStatus::Queued),
        "running" => Some(JobStatus::Running),
        "successful" | "succeeded" | "completed" => Some(JobStatus::Succeeded),
        "failed" => Some(JobStatus::Failed),
        "stopped" | "cancelled" | "canceled" => Some(JobStatus::Cancelled),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
