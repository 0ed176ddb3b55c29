//! Local files of one calculation.
//!
//! Inputs are recorded where they already live; outputs are written under
//! a per-calculation directory that is created on first write. Nothing in
//! a workspace is ever deleted by the workflow.

use std::path::{Path, PathBuf};

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
}

impl LocalWorkspace {
    /// Workspace under `parent`, named after the command and workflow id.
    pub fn for_calculation(parent: &Path, command_name: &str, workflow_id: Uuid) -> Self {
        let dir = format!("{}-{}", sanitize_file_name(command_name), workflow_id.simple());
        Self::at(parent.join(dir))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    pub(crate) fn stage_input(&mut self, path: &Path) {
        if !self.inputs.iter().any(|p| p == path) {
            self.inputs.push(path.to_path_buf());
        }
    }

    /// Target path for an output named by the remote service.
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.root.join(sanitize_file_name(file_name))
    }

    /// Record an output that was written to [`Self::output_path`] elsewhere.
    pub(crate) fn record_output(&mut self, path: &Path) {
        if !self.outputs.iter().any(|p| p == path) {
            self.outputs.push(path.to_path_buf());
        }
    }

    /// Write an output file and record it.
    pub(crate) async fn write_output(
        &mut self,
        file_name: &str,
        content: &[u8],
    ) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.output_path(file_name);
        tokio::fs::write(&path, content).await?;
        self.record_output(&path);
        Ok(path)
    }
}

/// Keep only the final path component and replace characters that are
/// unsafe in file names.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "result".to_string(),
        _ => cleaned,
    }
}
