use async_trait::async_trait;
use serde::Deserialize;
use switchboard_core::{Context, ContextValue, Request, Response};
use switchboard_pipeline::{AsyncMiddleware, AsyncNext, Middleware, MiddlewareError, Next};

use crate::error::MiddlewareConfigError;

#[derive(Debug, Deserialize, Clone)]
struct CorsConfig {
    #[serde(default = "default_allow_origins")]
    allow_origins: Vec<String>,
    #[serde(default = "default_allow_methods")]
    allow_methods: Vec<String>,
    #[serde(default = "default_allow_headers")]
    allow_headers: Vec<String>,
    #[serde(default)]
    allow_credentials: bool,
    #[serde(default = "default_max_age")]
    max_age: u32,
}

fn default_allow_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allow_methods() -> Vec<String> {
    vec!["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_allow_headers() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_age() -> u32 {
    5
}

/// Access-control middleware. Resolves the effective `Access-Control-*`
/// headers against an allow-list, short-circuits preflight `OPTIONS` with a
/// `204`, and stashes the resolved headers in context for simple requests so
/// a later step (or the terminal handler) can apply them to the real
/// response — the pipeline here has no dedicated response-rewrite phase.
pub struct CorsMiddleware {
    name: String,
    priority: i32,
    config: CorsConfig,
}

impl CorsMiddleware {
    pub fn from_config(name: impl Into<String>, priority: i32, options: &serde_json::Value) -> Result<Self, MiddlewareConfigError> {
        let config: CorsConfig = serde_json::from_value(options.clone()).map_err(|e| {
            MiddlewareConfigError::InvalidOption { field: "cors".to_string(), reason: e.to_string() }
        })?;
        Ok(CorsMiddleware { name: name.into(), priority, config })
    }

    fn resolve_origin(&self, origin: &str) -> Option<String> {
        if self.config.allow_origins.iter().any(|o| o == "*") {
            return Some("*".to_string());
        }
        self.config
            .allow_origins
            .iter()
            .find(|o| o.as_str() == origin)
            .cloned()
    }

    fn cors_headers(&self, origin_value: &str) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Access-Control-Allow-Origin".to_string(), origin_value.to_string()),
            ("Access-Control-Allow-Methods".to_string(), self.config.allow_methods.join(", ")),
            ("Access-Control-Allow-Headers".to_string(), self.config.allow_headers.join(", ")),
            ("Access-Control-Max-Age".to_string(), self.config.max_age.to_string()),
        ];
        if self.config.allow_credentials {
            headers.push(("Access-Control-Allow-Credentials".to_string(), "true".to_string()));
        }
        headers
    }

    /// Returns `Some(response)` to short-circuit (disallowed origin, or a
    /// satisfied preflight); `None` to continue, having already stashed the
    /// resolved headers into `context` for a simple request.
    fn evaluate(&self, request: &Request, context: &mut Context) -> Option<Response> {
        let origin = request.header("Origin")?.to_string();

        let resolved = match self.resolve_origin(&origin) {
            Some(o) => o,
            None => {
                return Some(
                    Response::new(403)
                        .with_json_body(r#"{"error":"Forbidden - origin not allowed"}"#.to_string()),
                );
            }
        };

        if request.method == switchboard_core::HttpMethod::Options {
            let mut resp = Response::new(204);
            for (k, v) in self.cors_headers(&resolved) {
                resp = resp.with_header(k, v);
            }
            return Some(resp);
        }

        for (k, v) in self.cors_headers(&resolved) {
            context.set(format!("cors_header_{k}"), ContextValue::String(v));
        }
        None
    }
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn handle(&self, request: Request, context: &mut Context, next: Next<'_>) -> Result<Response, MiddlewareError> {
        if let Some(resp) = self.evaluate(&request, context) {
            return Ok(resp);
        }
        next.call(request, context).map_err(MiddlewareError::from)
    }
}

#[async_trait]
impl AsyncMiddleware for CorsMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle_async(&self, request: Request, context: &mut Context, next: AsyncNext<'_>) -> Result<Response, anyhow::Error> {
        if let Some(resp) = self.evaluate(&request, context) {
            return Ok(resp);
        }
        Ok(next.call(request, context).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::HttpMethod;

    fn req(method: HttpMethod, origin: Option<&str>) -> Request {
        let mut r = Request::new(method, "/api", "HTTP/1.1");
        if let Some(o) = origin {
            r = r.with_header("Origin", o);
        }
        r
    }

    fn mw(options: serde_json::Value) -> CorsMiddleware {
        CorsMiddleware::from_config("cors", 200, &options).unwrap()
    }

    #[test]
    fn no_origin_header_passes_through() {
        let middleware = mw(serde_json::json!({}));
        let mut ctx = Context::new();
        assert!(middleware.evaluate(&req(HttpMethod::Get, None), &mut ctx).is_none());
    }

    #[test]
    fn wildcard_allows_any_origin() {
        let middleware = mw(serde_json::json!({ "allow_origins": ["*"] }));
        let mut ctx = Context::new();
        assert!(middleware.evaluate(&req(HttpMethod::Get, Some("https://evil.example")), &mut ctx).is_none());
        assert!(ctx.has_key("cors_header_Access-Control-Allow-Origin"));
    }

    #[test]
    fn disallowed_origin_returns_403() {
        let middleware = mw(serde_json::json!({ "allow_origins": ["https://good.example"] }));
        let mut ctx = Context::new();
        let resp = middleware.evaluate(&req(HttpMethod::Get, Some("https://evil.example")), &mut ctx).unwrap();
        assert_eq!(resp.status, 403);
    }

    #[test]
    fn preflight_short_circuits_with_204() {
        let middleware = mw(serde_json::json!({ "allow_origins": ["https://good.example"] }));
        let mut ctx = Context::new();
        let resp = middleware
            .evaluate(&req(HttpMethod::Options, Some("https://good.example")), &mut ctx)
            .unwrap();
        assert_eq!(resp.status, 204);
        assert_eq!(resp.headers.get("Content-Length"), Some("0"));
        assert_eq!(resp.headers.get("Access-Control-Allow-Origin"), Some("https://good.example"));
    }
}
