use std::time::Instant;

use async_trait::async_trait;
use switchboard_core::{Context, ContextValue, Request, Response};
use switchboard_pipeline::{AsyncMiddleware, AsyncNext, Middleware, MiddlewareError, Next};

/// Observability-band middleware: records method, path, status, and
/// duration for every request via `tracing`. Carries no config of its own —
/// file output and rotation are a transport/operator concern, not this
/// middleware's.
pub struct LoggingMiddleware {
    name: String,
    priority: i32,
}

impl LoggingMiddleware {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        LoggingMiddleware { name: name.into(), priority }
    }

    fn record(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        tracing::info!(
            method,
            path,
            status,
            duration_ms,
            "request handled"
        );
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn handle(&self, request: Request, context: &mut Context, next: Next<'_>) -> Result<Response, MiddlewareError> {
        let method = request.method.as_str().to_string();
        let path = request.path.clone();
        let start = Instant::now();

        let result = next.call(request, context);
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(resp) => {
                context.set("request_duration_ms", ContextValue::Float(duration_ms));
                self.record(&method, &path, resp.status, duration_ms);
            }
            Err(err) => {
                self.record(&method, &path, 500, duration_ms);
                tracing::warn!(method = %method, path = %path, error = %err, "request failed");
            }
        }
        result.map_err(MiddlewareError::from)
    }
}

#[async_trait]
impl AsyncMiddleware for LoggingMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle_async(&self, request: Request, context: &mut Context, next: AsyncNext<'_>) -> Result<Response, anyhow::Error> {
        let method = request.method.as_str().to_string();
        let path = request.path.clone();
        let start = Instant::now();

        let resp = next.call(request, context).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        context.set("request_duration_ms", ContextValue::Float(duration_ms));
        self.record(&method, &path, resp.status, duration_ms);
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::HttpMethod;
    use switchboard_pipeline::{SyncPipeline, TerminalHandler};
    use std::sync::Arc;

    #[test]
    fn records_duration_in_context_on_success() {
        let mut pipeline = SyncPipeline::new();
        pipeline.add_middleware(Arc::new(LoggingMiddleware::new("logging", 0)));
        pipeline.set_final_handler(TerminalHandler::sync(|_, _| Ok(Response::new(200))));

        let mut ctx = Context::new();
        let resp = pipeline.execute(Request::new(HttpMethod::Get, "/", "HTTP/1.1"), &mut ctx).unwrap();
        assert_eq!(resp.status, 200);
        assert!(matches!(ctx.get("request_duration_ms"), Some(ContextValue::Float(_))));
    }
}
