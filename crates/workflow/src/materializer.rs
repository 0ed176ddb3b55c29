//! Retrieval of a succeeded job's results into the local workspace.
//!
//! Primary results are all-or-nothing from the caller's point of view: the
//! first failed download stops materialization with
//! [`WorkflowError::Materialization`], and files already written stay on
//! disk. Companion artifacts are derived afterwards from the raw downloads
//! and never invalidate the primary results.
//!
//! Downloads go through the [`FileTransferAdapter`], so materializing the
//! same job into the same workspace again reuses files already on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use qcrbox_core::cif::convert_ddl2_to_ddl1;
use qcrbox_core::companion::CompanionRule;
use qcrbox_core::error::WorkflowError;
use qcrbox_core::host::RemoteService;
use qcrbox_core::status::JobStatus;

use crate::call::bounded;
use crate::job::Job;
use crate::transfer::FileTransferAdapter;
use crate::workspace::LocalWorkspace;

pub struct ResultMaterializer {
    remote: Arc<dyn RemoteService>,
    timeout: Duration,
    convert_ddl1: bool,
    rules: Vec<CompanionRule>,
}

/// A companion artifact that could not be derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionFailure {
    pub source_file: String,
    pub rule: String,
    pub reason: String,
}

/// Files written by one materialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializedResults {
    pub files: Vec<PathBuf>,
    pub companions: Vec<PathBuf>,
    pub companion_failures: Vec<CompanionFailure>,
}

impl MaterializedResults {
    /// First CIF among the primary results, the one a host would open.
    pub fn primary_cif(&self) -> Option<&PathBuf> {
        self.files.iter().find(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("cif"))
        })
    }
}

fn is_cif_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".cif")
}

impl ResultMaterializer {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        timeout: Duration,
        convert_ddl1: bool,
        rules: Vec<CompanionRule>,
    ) -> Self {
        Self {
            remote,
            timeout,
            convert_ddl1,
            rules,
        }
    }

    pub async fn materialize(
        &self,
        job: &mut Job,
        transfer: &mut FileTransferAdapter,
        workspace: &mut LocalWorkspace,
    ) -> Result<MaterializedResults, WorkflowError> {
        if job.status() != JobStatus::Succeeded {
            return Err(WorkflowError::InvalidState(format!(
                "cannot materialize job {} in status {}",
                job.id(),
                job.status()
            )));
        }

        let files = bounded(self.timeout, self.remote.list_job_results(job.id()))
            .await
            .map_err(|e| WorkflowError::Materialization {
                failed_file: "<result list>".to_string(),
                reason: e.to_string(),
                saved: Vec::new(),
            })?;
        job.record_manifest(files.clone())?;
        tracing::info!(job_id = %job.id(), count = files.len(), "Materializing results");

        let mut results = MaterializedResults::default();
        let mut raw_outputs = Vec::with_capacity(files.len());

        for file in &files {
            let failed = |reason: String, saved: &[PathBuf]| WorkflowError::Materialization {
                failed_file: file.file_name.clone(),
                reason,
                saved: saved.to_vec(),
            };

            let destination = workspace.output_path(&file.file_name);
            let path = match transfer.download(file, &destination).await {
                Ok(path) => path,
                Err(WorkflowError::Transfer { reason, .. }) => {
                    return Err(failed(reason, &results.files));
                }
                Err(other) => return Err(failed(other.to_string(), &results.files)),
            };
            workspace.record_output(&path);

            let raw = tokio::fs::read(&path)
                .await
                .map_err(|e| failed(format!("cannot read back result: {e}"), &results.files))?;
            if self.convert_ddl1 && is_cif_name(&file.file_name) {
                match std::str::from_utf8(&raw) {
                    Ok(text) => {
                        let converted = convert_ddl2_to_ddl1(text);
                        if converted != text {
                            tokio::fs::write(&path, converted).await.map_err(|e| {
                                failed(format!("cannot write result: {e}"), &results.files)
                            })?;
                        }
                    }
                    Err(_) => {
                        tracing::warn!(file = %file.file_name, "CIF result is not UTF-8; saved unconverted");
                    }
                }
            }
            tracing::debug!(job_id = %job.id(), path = %path.display(), "Result saved");
            results.files.push(path);
            raw_outputs.push((file.file_name.clone(), raw));
        }

        self.derive_companions(&raw_outputs, workspace, &mut results)
            .await;
        Ok(results)
    }

    async fn derive_companions(
        &self,
        raw_outputs: &[(String, Vec<u8>)],
        workspace: &mut LocalWorkspace,
        results: &mut MaterializedResults,
    ) {
        for rule in &self.rules {
            for (name, raw) in raw_outputs {
                if !rule.matches(name, raw) {
                    continue;
                }
                let companion_name = rule.companion_name(name);
                let outcome = match rule.derive(raw) {
                    Ok(bytes) => workspace
                        .write_output(&companion_name, &bytes)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                match outcome {
                    Ok(path) => {
                        tracing::info!(rule = %rule.name, path = %path.display(), "Companion written");
                        results.companions.push(path);
                    }
                    Err(reason) => {
                        tracing::warn!(rule = %rule.name, file = %name, error = %reason, "Companion derivation failed");
                        results.companion_failures.push(CompanionFailure {
                            source_file: name.clone(),
                            rule: rule.name.clone(),
                            reason,
                        });
                    }
                }
            }
        }
    }
}
