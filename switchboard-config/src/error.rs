use thiserror::Error;

/// Structured outcome of a [`crate::loader::ConfigLoader`] load attempt.
///
/// Mirrors the reference framework's `{ success, error-kind, message }`
/// triple as a `thiserror` enum so callers match on variant rather than
/// parse a message string.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid YAML in {path}: {cause}")]
    InvalidYaml { path: String, cause: String },

    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("config validation failed: {reason}")]
    ValidationFailed { reason: String },
}
