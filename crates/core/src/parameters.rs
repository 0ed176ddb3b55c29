//! Parameter resolution: from a command's declared schema and the values
//! at hand to a complete [`ParameterBinding`].
//!
//! Resolution order for each declared parameter:
//!
//! 1. a supplied value (validated against the declared kind),
//! 2. the declared default,
//! 3. the host's current structure, for CIF file inputs,
//! 4. an interactive prompt, when a [`ParameterSource`] is available.
//!
//! A required parameter left unresolved fails with
//! [`WorkflowError::MissingParameter`]. Optional ones are omitted.
//!
//! Names listed in [`ResolveContext::rejected`] skip steps 1-3: their
//! earlier value was refused, so only the prompt can replace it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::catalog::{Command, ParameterKind, ParameterSpec, ScalarType};
use crate::error::WorkflowError;
use crate::host::{FileChoice, ParameterSource, PromptReply};
use crate::types::RemoteFileRef;

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// A resolved parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// Scalar value, already converted to its declared type.
    Scalar(Value),
    /// Local file, not yet uploaded.
    File(PathBuf),
    /// Uploaded file, ready for submission.
    Remote(RemoteFileRef),
}

/// Name -> value map for one submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBinding {
    values: BTreeMap<String, ParameterValue>,
}

impl ParameterBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParameterValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Local files still waiting for upload, as `(parameter, path)`.
    pub fn local_files(&self) -> Vec<(String, PathBuf)> {
        self.values
            .iter()
            .filter_map(|(name, value)| match value {
                ParameterValue::File(path) => Some((name.clone(), path.clone())),
                _ => None,
            })
            .collect()
    }

    /// Replace a local file parameter with its remote reference.
    pub fn bind_remote(&mut self, name: &str, file: RemoteFileRef) {
        if let Some(value) = self.values.get_mut(name) {
            *value = ParameterValue::Remote(file);
        }
    }

    /// Build the command-argument object sent to the service.
    ///
    /// Fails if any file parameter has not been uploaded yet.
    pub fn to_arguments(&self) -> Result<serde_json::Map<String, Value>, WorkflowError> {
        let mut args = serde_json::Map::new();
        for (name, value) in &self.values {
            let json = match value {
                ParameterValue::Scalar(v) => v.clone(),
                ParameterValue::Remote(file) => serde_json::json!({ "data_file_id": file.file_id }),
                ParameterValue::File(path) => {
                    return Err(WorkflowError::InvalidState(format!(
                        "parameter '{name}' still refers to local file {}",
                        path.display()
                    )));
                }
            };
            args.insert(name.clone(), json);
        }
        Ok(args)
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Everything the resolver may draw values from.
#[derive(Default)]
pub struct ResolveContext<'a> {
    /// Pre-filled `name -> raw value` map.
    pub supplied: HashMap<String, String>,
    /// Interactive prompt; `None` in unattended mode.
    pub prompt: Option<&'a dyn ParameterSource>,
    /// CIF of the structure currently loaded in the host.
    pub current_structure: Option<PathBuf>,
    /// Parameters whose previous value was refused and must be asked again.
    pub rejected: HashSet<String>,
}

impl<'a> ResolveContext<'a> {
    pub fn unattended(supplied: HashMap<String, String>) -> Self {
        Self {
            supplied,
            prompt: None,
            current_structure: None,
            rejected: HashSet::new(),
        }
    }
}

/// Resolve every declared parameter of `command`.
pub fn resolve(command: &Command, ctx: &ResolveContext<'_>) -> Result<ParameterBinding, WorkflowError> {
    if let Some(unknown) = ctx
        .supplied
        .keys()
        .find(|name| command.parameter(name).is_none())
    {
        return Err(WorkflowError::InvalidParameter {
            name: unknown.clone(),
            reason: format!("not declared by command '{}'", command.label()),
        });
    }

    let mut binding = ParameterBinding::new();
    for spec in &command.parameters {
        if let Some(value) = resolve_one(spec, ctx)? {
            binding.insert(spec.name.clone(), value);
        } else if spec.required {
            return Err(WorkflowError::MissingParameter {
                name: spec.name.clone(),
            });
        }
    }
    Ok(binding)
}

fn resolve_one(
    spec: &ParameterSpec,
    ctx: &ResolveContext<'_>,
) -> Result<Option<ParameterValue>, WorkflowError> {
    if !ctx.rejected.contains(&spec.name) {
        if let Some(value) = resolve_unprompted(spec, ctx)? {
            return Ok(Some(value));
        }
    }

    let Some(prompt) = ctx.prompt else {
        return Ok(None);
    };

    match spec.kind {
        ParameterKind::File => match prompt.prompt_for_file(spec) {
            FileChoice::Selected(path) => existing_file(spec, &path).map(Some),
            FileChoice::Cancelled if spec.required => Err(WorkflowError::UserCancelled),
            FileChoice::Cancelled => Ok(None),
        },
        ParameterKind::Scalar(_) => match prompt.prompt_value(spec) {
            PromptReply::Value(raw) => parse_value(spec, &raw).map(Some),
            PromptReply::Skip => Ok(None),
            PromptReply::Cancel => Err(WorkflowError::UserCancelled),
        },
    }
}

/// Supplied value, declared default, then the host's current structure.
fn resolve_unprompted(
    spec: &ParameterSpec,
    ctx: &ResolveContext<'_>,
) -> Result<Option<ParameterValue>, WorkflowError> {
    if let Some(raw) = ctx.supplied.get(&spec.name) {
        return parse_value(spec, raw).map(Some);
    }

    if let Some(default) = &spec.default {
        return match (spec.kind, default) {
            (ParameterKind::File, Value::String(path)) => parse_value(spec, path).map(Some),
            (ParameterKind::File, other) => Err(WorkflowError::InvalidParameter {
                name: spec.name.clone(),
                reason: format!("default {other} is not a file path"),
            }),
            (ParameterKind::Scalar(_), v) => Ok(Some(ParameterValue::Scalar(v.clone()))),
        };
    }

    if spec.accepts_current_structure() {
        if let Some(path) = &ctx.current_structure {
            return existing_file(spec, path).map(Some);
        }
    }
    Ok(None)
}

/// Validate a raw value against the declared kind.
pub fn parse_value(spec: &ParameterSpec, raw: &str) -> Result<ParameterValue, WorkflowError> {
    let invalid = |reason: String| WorkflowError::InvalidParameter {
        name: spec.name.clone(),
        reason,
    };
    let raw = raw.trim();

    let ty = match spec.kind {
        ParameterKind::File => return existing_file(spec, Path::new(raw)),
        ParameterKind::Scalar(ty) => ty,
    };

    let value = match ty {
        ScalarType::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid(format!("'{raw}' is not an integer")))?,
        ScalarType::Float => {
            let v = raw
                .parse::<f64>()
                .map_err(|_| invalid(format!("'{raw}' is not a number")))?;
            serde_json::Number::from_f64(v)
                .map(Value::Number)
                .ok_or_else(|| invalid(format!("'{raw}' is not a finite number")))?
        }
        ScalarType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Value::Bool(true),
            "false" | "no" | "0" | "off" => Value::Bool(false),
            _ => return Err(invalid(format!("'{raw}' is not a boolean"))),
        },
        ScalarType::OutputName => {
            if raw.is_empty() || raw.contains(['/', '\\']) {
                return Err(invalid(format!("'{raw}' is not a plain file name")));
            }
            Value::String(raw.to_string())
        }
        ScalarType::Text => Value::String(raw.to_string()),
    };
    Ok(ParameterValue::Scalar(value))
}

fn existing_file(spec: &ParameterSpec, path: &Path) -> Result<ParameterValue, WorkflowError> {
    if path.is_file() {
        Ok(ParameterValue::File(path.to_path_buf()))
    } else {
        Err(WorkflowError::InvalidParameter {
            name: spec.name.clone(),
            reason: format!("file {} does not exist", path.display()),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
