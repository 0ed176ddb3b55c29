//! Remote catalog model: applications, commands, parameter schemas.
//!
//! The service declares parameter types as dtype strings. Plain Python
//! type names map to scalar kinds; `QCrBox.*data_file` dtypes are file
//! inputs that must be uploaded before submission.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Dtype constants
// ---------------------------------------------------------------------------

/// A CIF file input, filled from the host's current structure when unset.
pub const DTYPE_CIF_DATA_FILE: &str = "QCrBox.cif_data_file";
/// Any other uploaded file input.
pub const DTYPE_DATA_FILE: &str = "QCrBox.data_file";
/// Name of an output CIF the command writes remotely.
pub const DTYPE_OUTPUT_CIF: &str = "QCrBox.output_cif";

/// Default used for output-CIF parameters declared without one.
pub const DEFAULT_OUTPUT_NAME: &str = "output";

/// Commands whose name starts with this prefix are internal to the service.
const PRIVATE_COMMAND_PREFIX: &str = "__";

// ---------------------------------------------------------------------------
// Parameter schema
// ---------------------------------------------------------------------------

/// Value type of a scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Text,
    Integer,
    Float,
    Boolean,
    /// Remote output file name; validated like text.
    OutputName,
}

/// Declared kind of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    Scalar(ScalarType),
    File,
}

impl ParameterKind {
    /// Map a remote dtype string to a parameter kind.
    ///
    /// Unknown dtypes are treated as free text.
    pub fn from_dtype(dtype: &str) -> Self {
        match dtype {
            "int" | "integer" => Self::Scalar(ScalarType::Integer),
            "float" | "number" => Self::Scalar(ScalarType::Float),
            "bool" | "boolean" => Self::Scalar(ScalarType::Boolean),
            DTYPE_OUTPUT_CIF => Self::Scalar(ScalarType::OutputName),
            d if d.starts_with("QCrBox.") && d.ends_with("data_file") => Self::File,
            _ => Self::Scalar(ScalarType::Text),
        }
    }

    pub fn is_file(self) -> bool {
        matches!(self, Self::File)
    }
}

/// One declared parameter of a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    /// Raw dtype as declared by the service.
    pub dtype: String,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    pub description: Option<String>,
}

impl ParameterSpec {
    /// Build a spec from a remote dtype, applying the output-name default.
    pub fn from_dtype(
        name: impl Into<String>,
        dtype: impl Into<String>,
        required: bool,
        default: Option<serde_json::Value>,
    ) -> Self {
        let dtype = dtype.into();
        let kind = ParameterKind::from_dtype(&dtype);
        let default = match default {
            Some(serde_json::Value::Null) | None if dtype == DTYPE_OUTPUT_CIF => {
                Some(serde_json::Value::String(DEFAULT_OUTPUT_NAME.to_string()))
            }
            Some(serde_json::Value::Null) => None,
            other => other,
        };
        Self {
            name: name.into(),
            kind,
            dtype,
            required,
            default,
            description: None,
        }
    }

    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Scalar(ty),
            dtype: match ty {
                ScalarType::Text => "str",
                ScalarType::Integer => "int",
                ScalarType::Float => "float",
                ScalarType::Boolean => "bool",
                ScalarType::OutputName => DTYPE_OUTPUT_CIF,
            }
            .to_string(),
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::File,
            dtype: DTYPE_CIF_DATA_FILE.to_string(),
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// File parameter that accepts the host's current structure.
    pub fn accepts_current_structure(&self) -> bool {
        self.dtype == DTYPE_CIF_DATA_FILE
    }
}

// ---------------------------------------------------------------------------
// Command / Application
// ---------------------------------------------------------------------------

/// One invocable calculation offered by an [`Application`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub name: String,
    /// Slug of the owning application.
    pub application: String,
    /// Version of the owning application.
    pub version: String,
    pub description: Option<String>,
    pub parameters: Vec<ParameterSpec>,
    /// Glob-like patterns of the files the command produces, e.g. `*.cif`.
    pub output_patterns: Vec<String>,
}

impl Command {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        application: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            application: application.into(),
            version: version.into(),
            description: None,
            parameters: Vec::new(),
            output_patterns: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn with_output_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.output_patterns.push(pattern.into());
        self
    }

    /// Selection label shown to users, `name(application)`.
    pub fn label(&self) -> String {
        format!("{}({})", self.name, self.application)
    }

    /// Internal commands are hidden from selection.
    pub fn is_private(&self) -> bool {
        self.name.starts_with(PRIVATE_COMMAND_PREFIX)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Whether the command writes an output CIF.
    pub fn has_output_cif(&self) -> bool {
        self.parameters.iter().any(|p| p.dtype == DTYPE_OUTPUT_CIF)
            || self
                .output_patterns
                .iter()
                .any(|p| p.to_ascii_lowercase().ends_with(".cif"))
    }
}

/// A remote service grouping related commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Slug identifying the application, e.g. `qcrboxtools`.
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub commands: Vec<Command>,
}

impl Application {
    /// Commands offered to users (private ones removed).
    pub fn public_commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(|c| !c.is_private())
    }
}

/// All public commands across applications, in catalog order.
pub fn public_commands(applications: &[Application]) -> Vec<&Command> {
    applications
        .iter()
        .flat_map(|app| app.public_commands())
        .collect()
}

/// Find a public command by its `name(application)` label or by bare name
/// when that name is unambiguous.
pub fn find_command<'a>(applications: &'a [Application], label: &str) -> Option<&'a Command> {
    let commands = public_commands(applications);
    if let Some(cmd) = commands.iter().find(|c| c.label() == label) {
        return Some(*cmd);
    }
    let mut by_name = commands.into_iter().filter(|c| c.name == label);
    match (by_name.next(), by_name.next()) {
        (Some(cmd), None) => Some(cmd),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
