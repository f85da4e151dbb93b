use thiserror::Error;

/// Raised when a built-in middleware's `config:` options fail to parse or
/// validate. The factory turns this into its own `create()` failure rather
/// than constructing a half-configured instance.
#[derive(Error, Debug)]
pub enum MiddlewareConfigError {
    #[error("invalid option '{field}': {reason}")]
    InvalidOption { field: String, reason: String },
}
