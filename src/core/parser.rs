//! YAML parsing and structural validation of `edgestack.yaml`.
//!
//! - Version must be "1.0"
//! - Stack name must be usable as a logical-id prefix
//! - Bucket name must be a valid bucket name
//!
//! Input values are not checked here; see [`super::inputs`].

use super::error::{Result, StackError};
use super::types::*;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a stack file from disk.
pub fn parse_config_file(path: &Path) -> Result<StackConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StackError::io(path, e))?;
    parse_config(&content)
}

/// Parse a stack file from a string.
pub fn parse_config(yaml: &str) -> Result<StackConfig> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

fn stack_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").expect("static regex"))
}

fn bucket_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("static regex"))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &StackConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(ValidationError {
            message: format!("version must be \"1.0\", got \"{}\"", config.version),
        });
    }

    if config.name.is_empty() {
        errors.push(ValidationError {
            message: "name must not be empty".to_string(),
        });
    } else if !stack_name_pattern().is_match(&config.name) {
        errors.push(ValidationError {
            message: format!(
                "name '{}' must start with a letter and contain only letters and digits",
                config.name
            ),
        });
    }

    if !bucket_name_pattern().is_match(&config.bucket.name) {
        errors.push(ValidationError {
            message: format!("bucket name '{}' is not a valid bucket name", config.bucket.name),
        });
    }
    if config.bucket.name.contains("..") {
        errors.push(ValidationError {
            message: format!(
                "bucket name '{}' must not contain consecutive dots",
                config.bucket.name
            ),
        });
    }
    if let Some(domain) = &config.bucket.regional_domain_name {
        if domain.trim().is_empty() || domain.contains("://") {
            errors.push(ValidationError {
                message: format!(
                    "bucket regional_domain_name '{}' must be a bare host name",
                    domain
                ),
            });
        }
    }

    errors
}

/// Parse and validate in one step, folding structural errors into one error.
pub fn load_config(path: &Path) -> Result<StackConfig> {
    let config = parse_config_file(path)?;
    let errors = validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    Err(StackError::Validation(
        errors.into_iter().map(|e| e.message).collect(),
    ))
}
