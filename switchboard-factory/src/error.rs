use thiserror::Error;

/// Errors raised while building a middleware instance from configuration.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("middleware type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("no middleware type registered under '{0}'")]
    UnknownType(String),

    #[error("middleware '{name}' ({r#type}) rejected its configuration: {reason}")]
    InvalidConfig { name: String, r#type: String, reason: String },
}
