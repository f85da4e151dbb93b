use std::sync::Arc;
use std::time::Instant;

use switchboard_core::{Context, Request, Response};

use crate::error::{MiddlewareError, PipelineError};
use crate::middleware::{Middleware, Next};

/// The pipeline's terminal step. Built with [`TerminalHandler::sync`] or
/// [`TerminalHandler::async_placeholder`]; setting one clears the other,
/// mirroring the source pipeline's mutually-exclusive final handler slot.
pub enum TerminalHandler {
    Sync(Arc<dyn Fn(Request, &mut Context) -> Result<Response, anyhow::Error> + Send + Sync>),
    /// An async final handler registered on a synchronous pipeline. Never
    /// actually invoked: reaching it during `execute` always raises a
    /// `PipelineError`, since a sync pipeline must not block on asynchrony.
    Async,
}

impl TerminalHandler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Request, &mut Context) -> Result<Response, anyhow::Error> + Send + Sync + 'static,
    {
        TerminalHandler::Sync(Arc::new(f))
    }
}

/// An ordered, priority-sorted composition of middleware plus a terminal
/// handler. Not `Clone`: a pipeline is built once per route and shared via
/// `Arc` by callers that need to reuse it across requests.
pub struct SyncPipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
    terminal: Option<TerminalHandler>,
    performance_monitoring: bool,
    sorted: bool,
}

impl Default for SyncPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncPipeline {
    pub fn new() -> Self {
        SyncPipeline {
            middlewares: Vec::new(),
            terminal: None,
            performance_monitoring: false,
            sorted: true,
        }
    }

    pub fn with_performance_monitoring(mut self, enabled: bool) -> Self {
        self.performance_monitoring = enabled;
        self
    }

    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
        self.sorted = false;
    }

    pub fn remove_middleware(&mut self, name: &str) -> bool {
        let before = self.middlewares.len();
        self.middlewares.retain(|m| m.name() != name);
        before != self.middlewares.len()
    }

    pub fn clear_middleware(&mut self) {
        self.middlewares.clear();
        self.sorted = true;
    }

    pub fn set_final_handler(&mut self, handler: TerminalHandler) {
        self.terminal = Some(handler);
    }

    /// Returns middleware names in priority-execution order, sorting first
    /// if the list is dirty.
    pub fn names(&mut self) -> Vec<String> {
        self.sort_if_dirty();
        self.middlewares.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    fn sort_if_dirty(&mut self) {
        if !self.sorted {
            // stable: ties preserve insertion order.
            self.middlewares.sort_by_key(|m| std::cmp::Reverse(m.priority()));
            self.sorted = true;
        }
    }

    /// Runs the pipeline. An empty middleware list invokes the terminal
    /// handler directly.
    pub fn execute(&mut self, request: Request, context: &mut Context) -> Result<Response, PipelineError> {
        self.sort_if_dirty();
        self.execute_from(0, request, context)
    }

    pub(crate) fn execute_from(
        &self,
        index: usize,
        request: Request,
        context: &mut Context,
    ) -> Result<Response, PipelineError> {
        if index >= self.middlewares.len() {
            return self.execute_terminal(request, context);
        }

        let middleware = &self.middlewares[index];
        if !middleware.enabled() {
            return self.execute_from(index + 1, request, context);
        }

        let next = Next { pipeline: self, index: index + 1 };
        let start = self.performance_monitoring.then(Instant::now);
        let result = middleware.handle(request, context, next);
        if let Some(start) = start {
            tracing::debug!(
                middleware = middleware.name(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "sync pipeline middleware timing"
            );
        }

        match result {
            Ok(response) => Ok(response),
            Err(MiddlewareError::Wrapped(pipeline_error)) => Err(pipeline_error),
            Err(MiddlewareError::Raw(cause)) => {
                Err(PipelineError::new(middleware.name(), cause.to_string()))
            }
        }
    }

    fn execute_terminal(&self, request: Request, context: &mut Context) -> Result<Response, PipelineError> {
        match &self.terminal {
            Some(TerminalHandler::Sync(handler)) => {
                let start = self.performance_monitoring.then(Instant::now);
                let result = handler(request, context);
                if let Some(start) = start {
                    tracing::debug!(
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "sync pipeline terminal handler timing"
                    );
                }
                result.map_err(|cause| PipelineError::new("final_handler", cause.to_string()))
            }
            Some(TerminalHandler::Async) => Err(PipelineError::new(
                "pipeline",
                "Async final handlers not yet supported in synchronous pipeline",
            )),
            None => Err(PipelineError::new("pipeline", "no final handler configured")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::{Context, ContextValue, HttpMethod};

    struct Named {
        name: &'static str,
        priority: i32,
        enabled: bool,
    }

    impl Middleware for Named {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn enabled(&self) -> bool {
            self.enabled
        }
        fn handle(&self, request: Request, context: &mut Context, next: Next<'_>) -> Result<Response, MiddlewareError> {
            let mut order = match context.get("call_order") {
                Some(ContextValue::StringList(list)) => list.clone(),
                _ => Vec::new(),
            };
            order.push(self.name.to_string());
            context.set("call_order", order);
            next.call(request, context)
        }
    }

    fn req() -> Request {
        Request::new(HttpMethod::Get, "/", "HTTP/1.1")
    }

    #[test]
    fn empty_pipeline_returns_terminal_response_directly() {
        let mut pipeline = SyncPipeline::new();
        pipeline.set_final_handler(TerminalHandler::sync(|_, _| Ok(Response::new(200).with_body("ok"))));
        let resp = pipeline.execute(req(), &mut Context::new()).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body().as_ref(), b"ok");
    }

    #[test]
    fn executes_in_priority_order_highest_first() {
        let mut pipeline = SyncPipeline::new();
        pipeline.add_middleware(Arc::new(Named { name: "Low", priority: 1, enabled: true }));
        pipeline.add_middleware(Arc::new(Named { name: "High", priority: 100, enabled: true }));
        pipeline.add_middleware(Arc::new(Named { name: "Medium", priority: 50, enabled: true }));
        pipeline.set_final_handler(TerminalHandler::sync(|_, _| Ok(Response::new(200))));

        assert_eq!(pipeline.names(), vec!["High", "Medium", "Low"]);

        let mut context = Context::new();
        pipeline.execute(req(), &mut context).unwrap();
        match context.get("call_order") {
            Some(ContextValue::StringList(order)) => {
                assert_eq!(order, &vec!["High".to_string(), "Medium".to_string(), "Low".to_string()]);
            }
            other => panic!("expected call_order, got {other:?}"),
        }
    }

    #[test]
    fn disabled_middleware_is_skipped_but_next_still_advances() {
        let mut pipeline = SyncPipeline::new();
        pipeline.add_middleware(Arc::new(Named { name: "Disabled", priority: 100, enabled: false }));
        pipeline.add_middleware(Arc::new(Named { name: "Active", priority: 1, enabled: true }));
        pipeline.set_final_handler(TerminalHandler::sync(|_, _| Ok(Response::new(200))));

        let mut context = Context::new();
        pipeline.execute(req(), &mut context).unwrap();
        match context.get("call_order") {
            Some(ContextValue::StringList(order)) => assert_eq!(order, &vec!["Active".to_string()]),
            other => panic!("expected call_order, got {other:?}"),
        }
    }

    #[test]
    fn error_is_wrapped_with_middleware_name() {
        struct Failing;
        impl Middleware for Failing {
            fn name(&self) -> &str {
                "Failing"
            }
            fn handle(&self, _r: Request, _c: &mut Context, _n: Next<'_>) -> Result<Response, MiddlewareError> {
                Err(MiddlewareError::raw("boom"))
            }
        }
        let mut pipeline = SyncPipeline::new();
        pipeline.add_middleware(Arc::new(Failing));
        pipeline.set_final_handler(TerminalHandler::sync(|_, _| Ok(Response::new(200))));

        let err = pipeline.execute(req(), &mut Context::new()).unwrap_err();
        assert_eq!(err.component, "Failing");
        assert!(err.cause.contains("boom"));
    }

    #[test]
    fn wrapped_error_propagating_through_another_frame_is_not_rewrapped() {
        struct Passthrough;
        impl Middleware for Passthrough {
            fn name(&self) -> &str {
                "Passthrough"
            }
            fn priority(&self) -> i32 {
                10
            }
            fn handle(&self, request: Request, context: &mut Context, next: Next<'_>) -> Result<Response, MiddlewareError> {
                Ok(next.call(request, context)?)
            }
        }
        struct Failing;
        impl Middleware for Failing {
            fn name(&self) -> &str {
                "Failing"
            }
            fn priority(&self) -> i32 {
                0
            }
            fn handle(&self, _r: Request, _c: &mut Context, _n: Next<'_>) -> Result<Response, MiddlewareError> {
                Err(MiddlewareError::raw("boom"))
            }
        }
        let mut pipeline = SyncPipeline::new();
        pipeline.add_middleware(Arc::new(Passthrough));
        pipeline.add_middleware(Arc::new(Failing));
        pipeline.set_final_handler(TerminalHandler::sync(|_, _| Ok(Response::new(200))));

        let err = pipeline.execute(req(), &mut Context::new()).unwrap_err();
        assert_eq!(err.component, "Failing", "the original component name must survive unchanged");
    }

    #[test]
    fn async_terminal_handler_in_sync_pipeline_raises() {
        let mut pipeline = SyncPipeline::new();
        pipeline.set_final_handler(TerminalHandler::Async);
        let err = pipeline.execute(req(), &mut Context::new()).unwrap_err();
        assert_eq!(err.component, "pipeline");
    }

    #[test]
    fn names_triggers_sort_when_dirty() {
        let mut pipeline = SyncPipeline::new();
        pipeline.add_middleware(Arc::new(Named { name: "A", priority: 1, enabled: true }));
        pipeline.add_middleware(Arc::new(Named { name: "B", priority: 5, enabled: true }));
        assert_eq!(pipeline.names(), vec!["B", "A"]);
    }
}
