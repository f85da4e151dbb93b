use thiserror::Error;

/// An error that has been attributed to the pipeline component that raised
/// it. Once a `PipelineError` exists it is never re-wrapped: propagating it
/// back up through additional pipeline frames leaves `component` and
/// `cause` untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("pipeline error in {component}: {cause}")]
pub struct PipelineError {
    pub component: String,
    pub cause: String,
}

impl PipelineError {
    pub fn new(component: impl Into<String>, cause: impl Into<String>) -> Self {
        PipelineError {
            component: component.into(),
            cause: cause.into(),
        }
    }
}

/// The error type a [`crate::middleware::Middleware`] implementation
/// returns. `Raw` is an ordinary, not-yet-attributed failure that the
/// pipeline will wrap with the offending middleware's name; `Wrapped`
/// already carries an attributed [`PipelineError`] (typically propagated
/// via `?` from a `Next::call`) and must pass through unchanged.
#[derive(Debug)]
pub enum MiddlewareError {
    Wrapped(PipelineError),
    Raw(anyhow::Error),
}

impl MiddlewareError {
    pub fn raw(message: impl std::fmt::Display) -> Self {
        MiddlewareError::Raw(anyhow::anyhow!(message.to_string()))
    }
}

impl From<PipelineError> for MiddlewareError {
    fn from(err: PipelineError) -> Self {
        MiddlewareError::Wrapped(err)
    }
}

impl From<anyhow::Error> for MiddlewareError {
    fn from(err: anyhow::Error) -> Self {
        MiddlewareError::Raw(err)
    }
}

impl std::fmt::Display for MiddlewareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MiddlewareError::Wrapped(e) => write!(f, "{e}"),
            MiddlewareError::Raw(e) => write!(f, "{e}"),
        }
    }
}
