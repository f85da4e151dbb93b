use thiserror::Error;

/// Errors surfaced by the routing and record layer.
///
/// Pipeline-level and config-level errors live in `switchboard-pipeline`
/// and `switchboard-config` respectively; this enum covers only what
/// `switchboard-core` itself can fail at (pattern registration).
#[derive(Error, Debug)]
pub enum SwitchboardError {
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
