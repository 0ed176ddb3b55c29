//! Moves files between the local workspace and the remote service.
//!
//! Within one workflow run an upload of the same local file (and a download
//! of the same remote file to the same destination) happens at most once;
//! repeated requests are served from the adapter's cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use qcrbox_core::error::WorkflowError;
use qcrbox_core::host::RemoteService;
use qcrbox_core::types::RemoteFileRef;

use crate::call::bounded;

pub struct FileTransferAdapter {
    remote: Arc<dyn RemoteService>,
    timeout: Duration,
    uploads: HashMap<PathBuf, RemoteFileRef>,
    downloads: HashMap<(String, PathBuf), PathBuf>,
}

impl FileTransferAdapter {
    pub fn new(remote: Arc<dyn RemoteService>, timeout: Duration) -> Self {
        Self {
            remote,
            timeout,
            uploads: HashMap::new(),
            downloads: HashMap::new(),
        }
    }

    /// Cache key: the canonical path when it can be resolved.
    fn upload_key(local_path: &Path) -> PathBuf {
        std::fs::canonicalize(local_path).unwrap_or_else(|_| local_path.to_path_buf())
    }

    /// Upload a local file, or return the reference of an earlier upload.
    pub async fn upload(&mut self, local_path: &Path) -> Result<RemoteFileRef, WorkflowError> {
        let key = Self::upload_key(local_path);
        if let Some(cached) = self.uploads.get(&key) {
            tracing::debug!(path = %local_path.display(), file_id = %cached.file_id, "Upload cache hit");
            return Ok(cached.clone());
        }

        let file = bounded(self.timeout, self.remote.upload_file(local_path))
            .await
            .map_err(|e| WorkflowError::Transfer {
                file: local_path.display().to_string(),
                reason: e.to_string(),
            })?;
        self.uploads.insert(key, file.clone());
        Ok(file)
    }

    /// Fetch the raw content of a remote file.
    async fn fetch(&self, file: &RemoteFileRef) -> Result<Vec<u8>, WorkflowError> {
        bounded(self.timeout, self.remote.download_file(file))
            .await
            .map_err(|e| WorkflowError::Transfer {
                file: file.file_name.clone(),
                reason: e.to_string(),
            })
    }

    /// Download a remote file to `destination` unchanged.
    pub async fn download(
        &mut self,
        file: &RemoteFileRef,
        destination: &Path,
    ) -> Result<PathBuf, WorkflowError> {
        let key = (file.file_id.clone(), destination.to_path_buf());
        if let Some(path) = self.downloads.get(&key) {
            if path.exists() {
                return Ok(path.clone());
            }
        }

        let content = self.fetch(file).await?;
        let io_error = |e: std::io::Error| WorkflowError::Transfer {
            file: file.file_name.clone(),
            reason: format!("cannot write {}: {e}", destination.display()),
        };
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(destination, &content).await.map_err(io_error)?;

        self.downloads.insert(key, destination.to_path_buf());
        Ok(destination.to_path_buf())
    }

    /// Number of distinct files uploaded in this run.
    pub fn uploaded_count(&self) -> usize {
        self.uploads.len()
    }
}
