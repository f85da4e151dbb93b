//! Synchronous and asynchronous middleware pipeline engines.
//!
//! Both engines run the same priority-sorted-descending middleware
//! discipline over the same [`switchboard_core::Request`] /
//! [`switchboard_core::Response`] / [`switchboard_core::Context`] types;
//! they differ only in the sync pipeline's lazy, dirty-flagged sort versus
//! the async pipeline's eager sort-on-add, and in whether failures must
//! propagate as a typed error (sync) or are always converted to a `500`
//! response before reaching the caller (async).

pub mod async_pipeline;
pub mod error;
pub mod middleware;
pub mod sync_pipeline;

pub use async_pipeline::{AsyncMiddleware, AsyncNext, AsyncPipeline, AsyncTerminalHandler};
pub use error::{MiddlewareError, PipelineError};
pub use middleware::{Middleware, Next};
pub use sync_pipeline::{SyncPipeline, TerminalHandler};
