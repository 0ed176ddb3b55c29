//! Fakes shared by the workflow integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use qcrbox_core::catalog::{Command, ParameterSpec, ScalarType};
use qcrbox_core::error::RemoteError;
use qcrbox_core::host::{
    Checkpoint, FileChoice, HostSession, Notifier, NotifyKind, ParameterSource, PromptReply,
    RemoteService,
};
use qcrbox_core::status::JobStatus;
use qcrbox_core::types::{JobId, RemoteFileRef};
use qcrbox_workflow::backoff::RetryBackoff;
use qcrbox_workflow::WorkflowConfig;

pub const ASPHERIC_CIF: &str = "\
data_nosphera2
_aspheric_ffs.source          'NoSpherA2'
_aspheric_ffs_partitioning.name      Hirshfeld
_aspheric_ffs_partitioning.software  NoSpherA2
loop_
_wfn_moiety.asu_atom_site_label
C1
O1
loop_
_aspheric_ff.index_h
_aspheric_ff.index_k
_aspheric_ff.index_l
_aspheric_ff.form_factor_real
_aspheric_ff.form_factor_imag
1 0 0 '[5.5 7.25]' '[0.0 0.5]'
0 1 -1 '[4.0 6.0]' '[0.1 -0.2]'
";

/// `refine(olex2)`: a required CIF input and an iteration count.
pub fn refine_command() -> Command {
    Command::new("olex2.refine", "refine", "olex2", "1.5")
        .with_parameter(ParameterSpec::file("cif").required())
        .with_parameter(
            ParameterSpec::scalar("iterations", ScalarType::Integer).with_default(json!(10)),
        )
        .with_output_pattern("*.cif")
}

pub fn test_config(workspace_root: &Path) -> WorkflowConfig {
    WorkflowConfig {
        request_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(5),
        tracking_timeout: Duration::from_secs(10),
        workspace_root: workspace_root.to_path_buf(),
        submit_backoff: RetryBackoff {
            first_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            factor: 2.0,
        },
        ..WorkflowConfig::default()
    }
}

pub fn write_input(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, "data_input\n_cell.length_a 10.0\n").unwrap();
    path
}

// ---------------------------------------------------------------------------
// Remote service
// ---------------------------------------------------------------------------

/// Scripted remote service that records every call it receives.
#[derive(Default)]
pub struct FakeRemote {
    calls: Mutex<Vec<String>>,
    submissions: Mutex<VecDeque<Result<JobId, RemoteError>>>,
    statuses: Mutex<VecDeque<Result<JobStatus, RemoteError>>>,
    results: Vec<(RemoteFileRef, Result<Vec<u8>, RemoteError>)>,
    hanging: Vec<String>,
    failing_uploads: Mutex<Vec<String>>,
    arguments: Mutex<Vec<Map<String, Value>>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies to successive submissions. Without any, submissions succeed
    /// with `calc-1`.
    pub fn with_submissions(self, replies: Vec<Result<JobId, RemoteError>>) -> Self {
        *self.submissions.lock().unwrap() = replies.into();
        self
    }

    /// Replies to successive status queries; the last one repeats.
    pub fn with_statuses(self, replies: Vec<Result<JobStatus, RemoteError>>) -> Self {
        *self.statuses.lock().unwrap() = replies.into();
        self
    }

    pub fn with_result(mut self, name: &str, content: &[u8]) -> Self {
        let file = RemoteFileRef::new(format!("out-{}", self.results.len()), name);
        self.results.push((file, Ok(content.to_vec())));
        self
    }

    pub fn with_failing_result(mut self, name: &str, error: RemoteError) -> Self {
        let file = RemoteFileRef::new(format!("out-{}", self.results.len()), name);
        self.results.push((file, Err(error)));
        self
    }

    /// A result whose download never finishes.
    pub fn with_hanging_result(mut self, name: &str) -> Self {
        let file = RemoteFileRef::new(format!("out-{}", self.results.len()), name);
        self.results.push((file, Ok(Vec::new())));
        self.hanging.push(name.to_string());
        self
    }

    /// The first upload of a file called `name` fails with a network error.
    pub fn with_failing_upload(self, name: &str) -> Self {
        self.failing_uploads.lock().unwrap().push(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn submitted_arguments(&self) -> Vec<Map<String, Value>> {
        self.arguments.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn upload_file(&self, local_path: &Path) -> Result<RemoteFileRef, RemoteError> {
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record(format!("upload:{name}"));
        {
            let mut failing = self.failing_uploads.lock().unwrap();
            if let Some(pos) = failing.iter().position(|f| *f == name) {
                failing.remove(pos);
                return Err(RemoteError::Network("connection reset".into()));
            }
        }
        let n = self.count("upload:");
        Ok(RemoteFileRef::new(format!("file-{n}"), name).in_dataset(format!("ds-{n}")))
    }

    async fn submit_job(
        &self,
        command: &Command,
        arguments: &Map<String, Value>,
    ) -> Result<JobId, RemoteError> {
        self.record(format!("submit:{}", command.name));
        self.arguments.lock().unwrap().push(arguments.clone());
        self.submissions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(JobId::new("calc-1")))
    }

    async fn get_job_status(&self, job_id: &JobId) -> Result<JobStatus, RemoteError> {
        self.record(format!("status:{job_id}"));
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses.front().cloned().unwrap_or(Ok(JobStatus::Succeeded))
        }
    }

    async fn list_job_results(&self, job_id: &JobId) -> Result<Vec<RemoteFileRef>, RemoteError> {
        self.record(format!("results:{job_id}"));
        Ok(self.results.iter().map(|(f, _)| f.clone()).collect())
    }

    async fn download_file(&self, file: &RemoteFileRef) -> Result<Vec<u8>, RemoteError> {
        self.record(format!("download:{}", file.file_name));
        if self.hanging.contains(&file.file_name) {
            std::future::pending::<()>().await;
        }
        self.results
            .iter()
            .find(|(f, _)| f == file)
            .map(|(_, content)| content.clone())
            .unwrap_or_else(|| Err(RemoteError::NotFound(file.file_id.clone())))
    }
}

// ---------------------------------------------------------------------------
// Host fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, NotifyKind)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, NotifyKind)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<NotifyKind> {
        self.messages().into_iter().map(|(_, k)| k).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, kind: NotifyKind) {
        self.messages.lock().unwrap().push((message.to_string(), kind));
    }
}

/// Interactive user with fixed answers to each checkpoint.
pub struct ScriptedUser {
    pub accept_upload: bool,
    pub accept_status_check: bool,
    pub values: Mutex<VecDeque<PromptReply>>,
    pub files: Mutex<VecDeque<FileChoice>>,
    pub checkpoints: Mutex<Vec<Checkpoint>>,
}

impl ScriptedUser {
    pub fn accepting() -> Self {
        Self {
            accept_upload: true,
            accept_status_check: true,
            values: Mutex::default(),
            files: Mutex::default(),
            checkpoints: Mutex::default(),
        }
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.checkpoints.lock().unwrap().clone()
    }
}

impl ParameterSource for ScriptedUser {
    fn prompt_value(&self, _spec: &ParameterSpec) -> PromptReply {
        self.values
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PromptReply::Skip)
    }

    fn prompt_for_file(&self, _spec: &ParameterSpec) -> FileChoice {
        self.files
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FileChoice::Cancelled)
    }

    fn confirm(&self, checkpoint: &Checkpoint) -> bool {
        self.checkpoints.lock().unwrap().push(checkpoint.clone());
        match checkpoint {
            Checkpoint::BeforeUpload { .. } => self.accept_upload,
            Checkpoint::BeforeStatusCheck { .. } => self.accept_status_check,
        }
    }
}

#[derive(Default)]
pub struct FakeHost {
    structure: Option<PathBuf>,
    fail_open: bool,
    opened: Mutex<Vec<PathBuf>>,
}

impl FakeHost {
    /// Host with `path` loaded as the current structure.
    pub fn with_structure(path: impl Into<PathBuf>) -> Self {
        Self {
            structure: Some(path.into()),
            ..Self::default()
        }
    }

    /// Host whose viewer refuses to open anything.
    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }
}

impl HostSession for FakeHost {
    fn open_file_in_host(&self, path: &Path) -> Result<(), String> {
        if self.fail_open {
            return Err("viewer busy".into());
        }
        self.opened.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn current_structure(&self) -> Option<PathBuf> {
        self.structure.clone()
    }
}
