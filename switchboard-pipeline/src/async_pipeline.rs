use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use switchboard_core::{Context, Request, Response};

/// An asynchronous pipeline participant. `handle_async` receives a `next`
/// continuation it `.await`s; `next` itself never fails (any failure
/// further down the chain has already been converted into a response by
/// the time it resolves), so only this middleware's own logic can produce
/// the `Err` side of the return value.
#[async_trait]
pub trait AsyncMiddleware: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn handle_async(
        &self,
        request: Request,
        context: &mut Context,
        next: AsyncNext<'_>,
    ) -> Result<Response, anyhow::Error>;
}

/// The asynchronous pipeline's terminal step.
#[async_trait]
pub trait AsyncTerminalHandler: Send + Sync {
    async fn handle(&self, request: Request, context: &mut Context) -> Result<Response, anyhow::Error>;
}

/// The next step in an asynchronous pipeline. Infallible by construction:
/// whatever happens further down the chain, `call` always resolves to a
/// `Response` — middleware and final-handler failures are converted to a
/// `500` before they reach a caller.
pub struct AsyncNext<'p> {
    pipeline: &'p AsyncPipeline,
    index: usize,
}

impl<'p> AsyncNext<'p> {
    pub async fn call(self, request: Request, context: &mut Context) -> Response {
        self.pipeline.execute_from(self.index, request, context).await
    }
}

/// Same priority discipline as [`crate::sync_pipeline::SyncPipeline`], but
/// sorted eagerly on every `add_middleware` rather than lazily before
/// execution — the asynchronous pipeline in the source framework sorts
/// immediately on add, in contrast with the synchronous one's dirty-flag.
pub struct AsyncPipeline {
    middlewares: Vec<Arc<dyn AsyncMiddleware>>,
    terminal: Option<Arc<dyn AsyncTerminalHandler>>,
    performance_monitoring: bool,
}

impl Default for AsyncPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncPipeline {
    pub fn new() -> Self {
        AsyncPipeline {
            middlewares: Vec::new(),
            terminal: None,
            performance_monitoring: false,
        }
    }

    pub fn with_performance_monitoring(mut self, enabled: bool) -> Self {
        self.performance_monitoring = enabled;
        self
    }

    pub fn add_middleware(&mut self, middleware: Arc<dyn AsyncMiddleware>) {
        self.middlewares.push(middleware);
        self.sort_middleware();
    }

    pub fn remove_middleware(&mut self, name: &str) -> bool {
        let before = self.middlewares.len();
        self.middlewares.retain(|m| m.name() != name);
        before != self.middlewares.len()
    }

    pub fn clear_middleware(&mut self) {
        self.middlewares.clear();
    }

    pub fn set_final_handler(&mut self, handler: Arc<dyn AsyncTerminalHandler>) {
        self.terminal = Some(handler);
    }

    pub fn names(&self) -> Vec<String> {
        self.middlewares.iter().map(|m| m.name().to_string()).collect()
    }

    fn sort_middleware(&mut self) {
        self.middlewares.sort_by_key(|m| std::cmp::Reverse(m.priority()));
    }

    /// Runs the pipeline, always resolving to a `Response`. No final
    /// handler configured is itself surfaced as a `500` body, mirroring
    /// the source pipeline's "no final handler" callback synthesis rather
    /// than panicking the caller's task.
    pub async fn execute(&self, request: Request, context: &mut Context) -> Response {
        if self.terminal.is_none() {
            return error_response(500, "No final handler set in async pipeline");
        }
        self.execute_from(0, request, context).await
    }

    pub(crate) fn execute_from<'a>(
        &'a self,
        index: usize,
        request: Request,
        context: &'a mut Context,
    ) -> Pin<Box<dyn Future<Output = Response> + Send + 'a>> {
        Box::pin(async move {
            if index >= self.middlewares.len() {
                return self.execute_terminal(request, context).await;
            }

            let middleware = &self.middlewares[index];
            if !middleware.enabled() {
                return self.execute_from(index + 1, request, context).await;
            }

            let next = AsyncNext { pipeline: self, index: index + 1 };
            let start = self.performance_monitoring.then(Instant::now);
            let result = middleware.handle_async(request, context, next).await;
            if let Some(start) = start {
                tracing::debug!(
                    middleware = middleware.name(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "async pipeline middleware timing"
                );
            }

            match result {
                Ok(response) => response,
                Err(cause) => error_response(
                    500,
                    &format!("Middleware error in {}: {cause}", middleware.name()),
                ),
            }
        })
    }

    async fn execute_terminal(&self, request: Request, context: &mut Context) -> Response {
        match &self.terminal {
            Some(handler) => {
                let start = self.performance_monitoring.then(Instant::now);
                let result = handler.handle(request, context).await;
                if let Some(start) = start {
                    tracing::debug!(
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "async pipeline terminal handler timing"
                    );
                }
                match result {
                    Ok(response) => response,
                    Err(cause) => error_response(500, &format!("Final handler error: {cause}")),
                }
            }
            None => error_response(500, "No final handler set in async pipeline"),
        }
    }
}

fn error_response(status: u16, message: &str) -> Response {
    Response::new(status).with_body(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::HttpMethod;

    struct EchoAsync;
    #[async_trait]
    impl AsyncMiddleware for EchoAsync {
        fn name(&self) -> &str {
            "echo"
        }
        async fn handle_async(
            &self,
            request: Request,
            context: &mut Context,
            next: AsyncNext<'_>,
        ) -> Result<Response, anyhow::Error> {
            Ok(next.call(request, context).await)
        }
    }

    struct Ok200;
    #[async_trait]
    impl AsyncTerminalHandler for Ok200 {
        async fn handle(&self, _request: Request, _context: &mut Context) -> Result<Response, anyhow::Error> {
            Ok(Response::new(200))
        }
    }

    fn req() -> Request {
        Request::new(HttpMethod::Get, "/", "HTTP/1.1")
    }

    #[tokio::test]
    async fn executes_through_middleware_to_terminal() {
        let mut pipeline = AsyncPipeline::new();
        pipeline.add_middleware(Arc::new(EchoAsync));
        pipeline.set_final_handler(Arc::new(Ok200));

        let resp = pipeline.execute(req(), &mut Context::new()).await;
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn no_final_handler_yields_500() {
        let pipeline = AsyncPipeline::new();
        let resp = pipeline.execute(req(), &mut Context::new()).await;
        assert_eq!(resp.status, 500);
    }

    #[tokio::test]
    async fn middleware_failure_converts_to_500_with_name_in_body() {
        struct Failing;
        #[async_trait]
        impl AsyncMiddleware for Failing {
            fn name(&self) -> &str {
                "BadAuth"
            }
            async fn handle_async(
                &self,
                _request: Request,
                _context: &mut Context,
                _next: AsyncNext<'_>,
            ) -> Result<Response, anyhow::Error> {
                Err(anyhow::anyhow!("token expired"))
            }
        }
        let mut pipeline = AsyncPipeline::new();
        pipeline.add_middleware(Arc::new(Failing));
        pipeline.set_final_handler(Arc::new(Ok200));

        let resp = pipeline.execute(req(), &mut Context::new()).await;
        assert_eq!(resp.status, 500);
        let body = String::from_utf8(resp.body().to_vec()).unwrap();
        assert!(body.contains("BadAuth"));
        assert!(body.contains("token expired"));
    }

    #[tokio::test]
    async fn middleware_added_later_is_sorted_immediately() {
        let mut pipeline = AsyncPipeline::new();
        struct P(&'static str, i32);
        #[async_trait]
        impl AsyncMiddleware for P {
            fn name(&self) -> &str {
                self.0
            }
            fn priority(&self) -> i32 {
                self.1
            }
            async fn handle_async(
                &self,
                request: Request,
                context: &mut Context,
                next: AsyncNext<'_>,
            ) -> Result<Response, anyhow::Error> {
                Ok(next.call(request, context).await)
            }
        }
        pipeline.add_middleware(Arc::new(P("Low", 1)));
        pipeline.add_middleware(Arc::new(P("High", 100)));
        assert_eq!(pipeline.names(), vec!["High", "Low"]);
    }
}
