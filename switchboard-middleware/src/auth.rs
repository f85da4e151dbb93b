use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use switchboard_core::{Context, ContextValue, Request, Response};
use switchboard_pipeline::{AsyncMiddleware, AsyncNext, Middleware, MiddlewareError, Next};

use crate::error::MiddlewareConfigError;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_EXPIRATION_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    Bearer,
    Jwt,
    Custom,
}

#[derive(Debug, Deserialize, Clone)]
struct AuthConfig {
    #[serde(default = "default_scheme")]
    scheme: AuthScheme,
    secret: Option<String>,
    #[serde(default)]
    issuer: String,
    #[serde(default)]
    audience: String,
    #[serde(default = "default_tolerance")]
    expiration_tolerance_secs: i64,
    #[serde(default = "default_header_name")]
    auth_header_name: String,
}

fn default_scheme() -> AuthScheme {
    AuthScheme::Bearer
}
fn default_tolerance() -> i64 {
    DEFAULT_EXPIRATION_TOLERANCE_SECS
}
fn default_header_name() -> String {
    "Authorization".to_string()
}

/// Outcome of validating a token's claims, independent of how the token was
/// extracted or which scheme produced it.
struct TokenClaims {
    user_id: Option<String>,
    roles: Vec<String>,
    issuer: Option<String>,
    audience: Option<String>,
    expiration: Option<i64>,
    issued_at: Option<i64>,
}

type CustomValidator = dyn Fn(&str) -> Result<TokenClaimsInput, String> + Send + Sync;

/// The subset of claims a caller-supplied validator can report back, for
/// the `Custom` scheme.
pub struct TokenClaimsInput {
    pub user_id: Option<String>,
    pub roles: Vec<String>,
}

/// JWT / bearer-token authentication middleware. Validates a token either
/// by recomputing an HMAC-SHA256 signature against a configured secret, or
/// by delegating to a caller-supplied validator function for the `Custom`
/// scheme.
pub struct AuthMiddleware {
    name: String,
    priority: i32,
    config: AuthConfig,
    custom_validator: Option<Box<CustomValidator>>,
}

impl AuthMiddleware {
    pub fn from_config(name: impl Into<String>, priority: i32, options: &serde_json::Value) -> Result<Self, MiddlewareConfigError> {
        let config: AuthConfig = serde_json::from_value(options.clone()).map_err(|e| {
            MiddlewareConfigError::InvalidOption { field: "auth".to_string(), reason: e.to_string() }
        })?;
        if config.scheme != AuthScheme::Custom && config.secret.as_deref().unwrap_or("").is_empty() {
            return Err(MiddlewareConfigError::InvalidOption {
                field: "auth.secret".to_string(),
                reason: "required unless scheme is custom".to_string(),
            });
        }
        Ok(AuthMiddleware { name: name.into(), priority, config, custom_validator: None })
    }

    pub fn with_custom_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<TokenClaimsInput, String> + Send + Sync + 'static,
    {
        self.custom_validator = Some(Box::new(f));
        self
    }

    /// Extracts the raw token from the configured header, per §4.8's
    /// scheme-dependent extraction rule.
    fn extract_token(&self, request: &Request) -> Option<String> {
        let header = request.header(&self.config.auth_header_name)?;
        if header.is_empty() {
            return None;
        }
        match self.config.scheme {
            AuthScheme::Bearer | AuthScheme::Jwt => {
                const PREFIX: &str = "Bearer ";
                if let Some(token) = header.strip_prefix(PREFIX) {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                    return None;
                }
                if self.config.scheme == AuthScheme::Jwt {
                    return Some(header.to_string());
                }
                None
            }
            AuthScheme::Custom => Some(header.to_string()),
        }
    }

    fn validate(&self, token: &str) -> Result<TokenClaims, String> {
        if self.config.scheme == AuthScheme::Custom {
            let validator = self.custom_validator.as_ref().ok_or("no custom validator configured")?;
            let input = validator(token)?;
            return Ok(TokenClaims {
                user_id: input.user_id,
                roles: input.roles,
                issuer: None,
                audience: None,
                expiration: None,
                issued_at: None,
            });
        }
        self.validate_jwt(token)
    }

    fn validate_jwt(&self, token: &str) -> Result<TokenClaims, String> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err("Invalid JWT format".to_string());
        }
        let secret = self.config.secret.as_deref().unwrap_or_default();
        verify_signature(parts[0], parts[1], parts[2], secret)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| "Failed to parse JWT payload".to_string())?;
        let payload: serde_json::Value =
            serde_json::from_slice(&payload_bytes).map_err(|_| "Invalid JSON in JWT payload".to_string())?;

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;

        let expiration = payload.get("exp").and_then(|v| v.as_i64());
        if let Some(exp) = expiration {
            if now > exp + self.config.expiration_tolerance_secs {
                return Err("JWT token has expired".to_string());
            }
        }
        let issued_at = payload.get("iat").and_then(|v| v.as_i64());

        if !self.config.issuer.is_empty() {
            let token_issuer = payload.get("iss").and_then(|v| v.as_str());
            if token_issuer != Some(self.config.issuer.as_str()) {
                return Err("Invalid JWT issuer".to_string());
            }
        }

        if !self.config.audience.is_empty() {
            let matches = match payload.get("aud") {
                Some(serde_json::Value::String(s)) => s == &self.config.audience,
                Some(serde_json::Value::Array(items)) => {
                    items.iter().any(|v| v.as_str() == Some(self.config.audience.as_str()))
                }
                _ => false,
            };
            if !matches {
                return Err("Invalid JWT audience".to_string());
            }
        }

        let user_id = payload
            .get("sub")
            .and_then(|v| v.as_str())
            .or_else(|| payload.get("user_id").and_then(|v| v.as_str()))
            .map(str::to_string);

        let roles = match payload.get("roles") {
            Some(serde_json::Value::Array(items)) => {
                items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
            }
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        };

        Ok(TokenClaims {
            user_id,
            roles,
            issuer: if self.config.issuer.is_empty() { None } else { Some(self.config.issuer.clone()) },
            audience: if self.config.audience.is_empty() { None } else { Some(self.config.audience.clone()) },
            expiration,
            issued_at,
        })
    }

    fn write_context(&self, context: &mut Context, claims: &TokenClaims) {
        context.set("authenticated", ContextValue::Boolean(true));
        if let Some(user_id) = &claims.user_id {
            context.set("user_id", ContextValue::String(user_id.clone()));
        }
        if !claims.roles.is_empty() {
            context.set("roles", ContextValue::StringList(claims.roles.clone()));
        }
        if let Some(issuer) = &claims.issuer {
            context.set("jwt_issuer", ContextValue::String(issuer.clone()));
        }
        if let Some(audience) = &claims.audience {
            context.set("jwt_audience", ContextValue::String(audience.clone()));
        }
        if let Some(exp) = claims.expiration {
            context.set("jwt_expiration", ContextValue::Integer(exp));
        }
        if let Some(iat) = claims.issued_at {
            context.set("jwt_issued_at", ContextValue::Integer(iat));
        }
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
        context.set("auth_timestamp", ContextValue::Integer(now));
    }

    fn unauthorized(message: &str) -> Response {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let body = serde_json::json!({
            "error": "unauthorized",
            "message": message,
            "timestamp": timestamp,
        });
        Response::new(401)
            .with_json_body(body.to_string())
            .with_header("WWW-Authenticate", "Bearer")
    }

    /// Runs extraction and validation; `Ok` means admitted (context already
    /// updated), `Err` carries the 401 response to short-circuit with.
    fn evaluate(&self, request: &Request, context: &mut Context) -> Result<(), Response> {
        let Some(token) = self.extract_token(request) else {
            return Err(Self::unauthorized("Missing or invalid authorization header"));
        };
        match self.validate(&token) {
            Ok(claims) => {
                self.write_context(context, &claims);
                Ok(())
            }
            Err(message) => Err(Self::unauthorized(&message)),
        }
    }
}

fn verify_signature(header_b64: &str, payload_b64: &str, signature_b64: &str, secret: &str) -> Result<(), String> {
    let signing_input = format!("{header_b64}.{payload_b64}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "Invalid JWT signature".to_string())?;
    mac.update(signing_input.as_bytes());
    let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    if expected.len() != signature_b64.len() {
        return Err("Invalid JWT signature".to_string());
    }
    let mismatch = expected
        .as_bytes()
        .iter()
        .zip(signature_b64.as_bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    if mismatch == 0 {
        Ok(())
    } else {
        Err("Invalid JWT signature".to_string())
    }
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn handle(&self, request: Request, context: &mut Context, next: Next<'_>) -> Result<Response, MiddlewareError> {
        match self.evaluate(&request, context) {
            Ok(()) => next.call(request, context).map_err(MiddlewareError::from),
            Err(resp) => Ok(resp),
        }
    }
}

#[async_trait]
impl AsyncMiddleware for AuthMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle_async(&self, request: Request, context: &mut Context, next: AsyncNext<'_>) -> Result<Response, anyhow::Error> {
        match self.evaluate(&request, context) {
            Ok(()) => Ok(next.call(request, context).await),
            Err(resp) => Ok(resp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::HttpMethod;

    fn sign(secret: &str, header: &str, payload: &str) -> String {
        let signing_input = format!("{header}.{payload}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signing_input.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    fn make_token(secret: &str, payload_json: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload_json.to_string());
        let sig = sign(secret, &header, &payload);
        format!("{header}.{payload}.{sig}")
    }

    fn mw(secret: &str) -> AuthMiddleware {
        AuthMiddleware::from_config("auth", 100, &serde_json::json!({ "secret": secret })).unwrap()
    }

    #[test]
    fn happy_path_sets_context_from_valid_jwt() {
        let middleware = mw("k");
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        let token = make_token("k", &serde_json::json!({ "sub": "u1", "roles": ["admin"], "exp": now + 3600 }));
        let request = Request::new(HttpMethod::Get, "/", "HTTP/1.1").with_header("Authorization", format!("Bearer {token}"));
        let mut ctx = Context::new();
        assert!(middleware.evaluate(&request, &mut ctx).is_ok());
        assert_eq!(ctx.get("authenticated"), Some(&ContextValue::Boolean(true)));
        assert_eq!(ctx.get("user_id"), Some(&ContextValue::String("u1".to_string())));
        assert_eq!(ctx.get("roles"), Some(&ContextValue::StringList(vec!["admin".to_string()])));
    }

    #[test]
    fn flipped_signature_bit_fails_verification() {
        let middleware = mw("k");
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        let mut token = make_token("k", &serde_json::json!({ "sub": "u1", "exp": now + 3600 }));
        let last = token.pop().unwrap();
        let flipped = if last == 'A' { 'B' } else { 'A' };
        token.push(flipped);
        let request = Request::new(HttpMethod::Get, "/", "HTTP/1.1").with_header("Authorization", format!("Bearer {token}"));
        assert!(middleware.evaluate(&request, &mut Context::new()).is_err());
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let middleware = mw("k");
        let request = Request::new(HttpMethod::Get, "/", "HTTP/1.1");
        let resp = middleware.evaluate(&request, &mut Context::new()).unwrap_err();
        assert_eq!(resp.status, 401);
        assert_eq!(resp.headers.get("WWW-Authenticate"), Some("Bearer"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let middleware = mw("k");
        let token = make_token("k", &serde_json::json!({ "sub": "u1", "exp": 1 }));
        let request = Request::new(HttpMethod::Get, "/", "HTTP/1.1").with_header("Authorization", format!("Bearer {token}"));
        assert!(middleware.evaluate(&request, &mut Context::new()).is_err());
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let middleware = AuthMiddleware::from_config("auth", 100, &serde_json::json!({ "secret": "k", "issuer": "expected" })).unwrap();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        let token = make_token("k", &serde_json::json!({ "sub": "u1", "exp": now + 3600, "iss": "other" }));
        let request = Request::new(HttpMethod::Get, "/", "HTTP/1.1").with_header("Authorization", format!("Bearer {token}"));
        assert!(middleware.evaluate(&request, &mut Context::new()).is_err());
    }

    #[test]
    fn jwt_scheme_accepts_raw_token_without_bearer_prefix() {
        let middleware = AuthMiddleware::from_config("auth", 100, &serde_json::json!({ "secret": "k", "scheme": "jwt" })).unwrap();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        let token = make_token("k", &serde_json::json!({ "sub": "u1", "exp": now + 3600 }));
        let request = Request::new(HttpMethod::Get, "/", "HTTP/1.1").with_header("Authorization", token);
        assert!(middleware.evaluate(&request, &mut Context::new()).is_ok());
    }

    #[test]
    fn secret_required_unless_custom_scheme() {
        let err = AuthMiddleware::from_config("auth", 100, &serde_json::json!({}));
        assert!(err.is_err());
        let ok = AuthMiddleware::from_config("auth", 100, &serde_json::json!({ "scheme": "custom" }));
        assert!(ok.is_ok());
    }
}
