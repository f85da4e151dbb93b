//! Built-in middleware: CORS, structured-logging, token-bucket rate
//! limiting, JWT authentication, and role-based authorization.
//!
//! Each type implements both [`switchboard_pipeline::Middleware`] and
//! [`switchboard_pipeline::AsyncMiddleware`] over the same evaluation logic,
//! so a single configured instance works in either pipeline variant.

pub mod auth;
pub mod authz;
pub mod cors;
pub mod error;
pub mod logging;
pub mod rate_limit;

pub use auth::{AuthMiddleware, AuthScheme, TokenClaimsInput};
pub use authz::AuthzMiddleware;
pub use cors::CorsMiddleware;
pub use error::MiddlewareConfigError;
pub use logging::LoggingMiddleware;
pub use rate_limit::{RateLimitBackend, RateLimitMiddleware, RateLimitStats};
