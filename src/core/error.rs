//! Error taxonomy for composition, planning and apply.
//!
//! Configuration errors surface before any descriptor is built. Provisioning
//! errors carry the engine's message verbatim and are never retried.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for edgestack.
#[derive(Debug, Error)]
pub enum StackError {
    /// A required input resolved to nothing.
    #[error("missing required input '{input}' (environment variable {variable} is not set)")]
    MissingInput {
        /// Input name in the stack file.
        input: &'static str,
        /// Environment variable the input was templated from.
        variable: String,
    },

    /// A required input is present but unusable.
    #[error("malformed input '{input}' = \"{value}\": {reason}")]
    MalformedInput {
        input: &'static str,
        value: String,
        reason: String,
    },

    /// Several inputs failed at once; reported together.
    #[error("{} invalid input(s): {}", .0.len(), join_errors(.0))]
    InvalidInputs(Vec<StackError>),

    /// Structural problems in the stack file.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A `{{...}}` expression could not be resolved.
    #[error("template error: {0}")]
    Template(String),

    /// A reference points at something that is not (yet) available.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// The provisioning engine rejected a resource.
    #[error("provisioning {resource} failed: {message}")]
    Provisioning { resource: String, message: String },

    /// Tripwire mode found drifted resources.
    #[error("{0} drift finding(s)")]
    Drift(usize),

    /// Filesystem failure.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StackError {
    /// Wrap an I/O error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised while reading or validating configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingInput { .. }
                | Self::MalformedInput { .. }
                | Self::InvalidInputs(_)
                | Self::Validation(_)
                | Self::Template(_)
        )
    }
}

fn join_errors(errors: &[StackError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StackError>;
