use async_trait::async_trait;
use serde::Deserialize;
use switchboard_core::{Context, ContextValue, Request, Response};
use switchboard_pipeline::{AsyncMiddleware, AsyncNext, Middleware, MiddlewareError, Next};

use crate::error::MiddlewareConfigError;

#[derive(Debug, Deserialize, Clone)]
struct AuthzConfig {
    #[serde(default)]
    required_roles: Vec<String>,
    #[serde(default)]
    require_all_roles: bool,
}

/// Role-based authorization middleware. Reads the `roles` context entry a
/// preceding auth middleware populated and denies the request with a `403`
/// unless the configured role requirement is satisfied.
pub struct AuthzMiddleware {
    name: String,
    priority: i32,
    config: AuthzConfig,
}

impl AuthzMiddleware {
    pub fn from_config(name: impl Into<String>, priority: i32, options: &serde_json::Value) -> Result<Self, MiddlewareConfigError> {
        let config: AuthzConfig = serde_json::from_value(options.clone()).map_err(|e| {
            MiddlewareConfigError::InvalidOption { field: "authz".to_string(), reason: e.to_string() }
        })?;
        Ok(AuthzMiddleware { name: name.into(), priority, config })
    }

    fn granted_roles(context: &Context) -> Vec<String> {
        match context.get("roles") {
            Some(ContextValue::StringList(roles)) => roles.clone(),
            _ => Vec::new(),
        }
    }

    fn satisfied(&self, granted: &[String]) -> bool {
        if self.config.required_roles.is_empty() {
            return true;
        }
        if self.config.require_all_roles {
            self.config.required_roles.iter().all(|r| granted.contains(r))
        } else {
            self.config.required_roles.iter().any(|r| granted.contains(r))
        }
    }

    /// Returns `Some(response)` to short-circuit with a `403`; `None` to
    /// continue.
    fn evaluate(&self, context: &Context) -> Option<Response> {
        let granted = Self::granted_roles(context);
        if self.satisfied(&granted) {
            return None;
        }
        Some(
            Response::new(403).with_json_body(
                serde_json::json!({
                    "error": "forbidden",
                    "message": "insufficient role privileges",
                    "required_roles": self.config.required_roles,
                })
                .to_string(),
            ),
        )
    }
}

impl Middleware for AuthzMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn handle(&self, request: Request, context: &mut Context, next: Next<'_>) -> Result<Response, MiddlewareError> {
        if let Some(resp) = self.evaluate(context) {
            return Ok(resp);
        }
        next.call(request, context).map_err(MiddlewareError::from)
    }
}

#[async_trait]
impl AsyncMiddleware for AuthzMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle_async(&self, request: Request, context: &mut Context, next: AsyncNext<'_>) -> Result<Response, anyhow::Error> {
        if let Some(resp) = self.evaluate(context) {
            return Ok(resp);
        }
        Ok(next.call(request, context).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_roles(roles: &[&str]) -> Context {
        let mut ctx = Context::new();
        ctx.set("roles", roles.iter().map(|r| r.to_string()).collect::<Vec<_>>());
        ctx
    }

    #[test]
    fn no_required_roles_always_passes() {
        let mw = AuthzMiddleware::from_config("authz", 90, &serde_json::json!({})).unwrap();
        assert!(mw.evaluate(&Context::new()).is_none());
    }

    #[test]
    fn require_any_passes_with_one_matching_role() {
        let mw = AuthzMiddleware::from_config("authz", 90, &serde_json::json!({ "required_roles": ["admin", "ops"] })).unwrap();
        assert!(mw.evaluate(&ctx_with_roles(&["ops"])).is_none());
        assert!(mw.evaluate(&ctx_with_roles(&["guest"])).is_some());
    }

    #[test]
    fn require_all_rejects_partial_match() {
        let mw = AuthzMiddleware::from_config(
            "authz",
            90,
            &serde_json::json!({ "required_roles": ["admin", "ops"], "require_all_roles": true }),
        )
        .unwrap();
        assert!(mw.evaluate(&ctx_with_roles(&["admin", "ops"])).is_none());
        let resp = mw.evaluate(&ctx_with_roles(&["admin"])).unwrap();
        assert_eq!(resp.status, 403);
    }

    #[test]
    fn missing_roles_in_context_is_denied_when_roles_required() {
        let mw = AuthzMiddleware::from_config("authz", 90, &serde_json::json!({ "required_roles": ["admin"] })).unwrap();
        assert!(mw.evaluate(&Context::new()).is_some());
    }
}
