//! [`RemoteService`] and [`Catalog`] on top of [`QCrBoxApi`].
//!
//! Each trait method issues one logical request. Results of a calculation
//! live in its output dataset, so listing them resolves the calculation
//! first and then the dataset.

use std::path::Path;

use async_trait::async_trait;

use qcrbox_core::catalog::{Application, Command};
use qcrbox_core::error::RemoteError;
use qcrbox_core::host::{Catalog, RemoteService};
use qcrbox_core::status::JobStatus;
use qcrbox_core::types::{JobId, RemoteFileRef};

use crate::api::QCrBoxApi;
use crate::messages::InvokeCommandRequest;

#[async_trait]
impl RemoteService for QCrBoxApi {
    async fn upload_file(&self, local_path: &Path) -> Result<RemoteFileRef, RemoteError> {
        tracing::debug!(path = %local_path.display(), "Uploading dataset");
        let file = self
            .create_dataset(local_path)
            .await
            .map_err(|e| self.remote_error(e))?;
        tracing::info!(
            path = %local_path.display(),
            file_id = %file.file_id,
            dataset_id = ?file.dataset_id,
            "Uploaded dataset",
        );
        Ok(file)
    }

    async fn submit_job(
        &self,
        command: &Command,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<JobId, RemoteError> {
        let request = InvokeCommandRequest {
            application_slug: &command.application,
            application_version: &command.version,
            command_name: &command.name,
            arguments,
        };
        let job_id = self
            .invoke_command(&request)
            .await
            .map_err(|e| self.remote_error(e))?;
        tracing::info!(command = %command.label(), job_id = %job_id, "Command invoked");
        Ok(job_id)
    }

    async fn get_job_status(&self, job_id: &JobId) -> Result<JobStatus, RemoteError> {
        self.calculation_status(job_id.as_str())
            .await
            .map_err(|e| self.remote_error(e))
    }

    async fn list_job_results(&self, job_id: &JobId) -> Result<Vec<RemoteFileRef>, RemoteError> {
        let calc = self
            .get_calculation(job_id.as_str())
            .await
            .map_err(|e| self.remote_error(e))?;
        let Some(dataset_id) = calc.output_dataset_id else {
            tracing::warn!(job_id = %job_id, "Calculation has no output dataset");
            return Ok(Vec::new());
        };
        let dataset = self
            .get_dataset(&dataset_id)
            .await
            .map_err(|e| self.remote_error(e))?;
        Ok(dataset.file_refs())
    }

    async fn download_file(&self, file: &RemoteFileRef) -> Result<Vec<u8>, RemoteError> {
        self.download_data_file(&file.file_id)
            .await
            .map_err(|e| self.remote_error(e))
    }
}

#[async_trait]
impl Catalog for QCrBoxApi {
    async fn list_applications(&self) -> Result<Vec<Application>, RemoteError> {
        QCrBoxApi::list_applications(self)
            .await
            .map_err(|e| self.remote_error(e))
    }
}
