use switchboard_core::{Context, Request, Response};

use crate::error::{MiddlewareError, PipelineError};
use crate::sync_pipeline::SyncPipeline;

/// The next step in a synchronous pipeline: either the next middleware or
/// the terminal handler. Consumed by value so a middleware can only call
/// it once per invocation (calling it twice would require cloning it,
/// which `Next` deliberately does not implement).
pub struct Next<'p> {
    pub(crate) pipeline: &'p SyncPipeline,
    pub(crate) index: usize,
}

impl<'p> Next<'p> {
    pub fn call(self, request: Request, context: &mut Context) -> Result<Response, PipelineError> {
        self.pipeline.execute_from(self.index, request, context)
    }
}

/// A synchronous pipeline participant.
///
/// Implementations MUST invoke `next` exactly once along the normal path,
/// or return a response directly without invoking it to short-circuit the
/// chain. Implementations MUST be safe under concurrent invocation: a
/// single middleware instance is shared across every request that matches
/// its route.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    fn enabled(&self) -> bool {
        true
    }

    fn handle(
        &self,
        request: Request,
        context: &mut Context,
        next: Next<'_>,
    ) -> Result<Response, MiddlewareError>;
}
