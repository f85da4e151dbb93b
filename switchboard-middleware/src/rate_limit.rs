use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use ipnet::IpNet;
use serde::Deserialize;
use switchboard_core::{Context, ContextValue, Request, Response};
use switchboard_pipeline::{AsyncMiddleware, AsyncNext, Middleware, MiddlewareError, Next};

use crate::error::MiddlewareConfigError;

const BLACKLIST_RETRY_AFTER_SECS: u64 = 3600;
const FALLBACK_PEER_SENTINEL: &str = "127.0.0.1";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStrategy {
    IpBased,
    UserBased,
    Combined,
    Custom,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefillWindow {
    Second,
    Minute,
    Hour,
    Day,
}

impl RefillWindow {
    fn seconds(&self) -> u64 {
        match self {
            RefillWindow::Second => 1,
            RefillWindow::Minute => 60,
            RefillWindow::Hour => 3600,
            RefillWindow::Day => 86_400,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
struct RateLimitConfig {
    #[serde(default = "default_strategy")]
    strategy: RateLimitStrategy,
    #[serde(default = "default_max_tokens")]
    max_tokens: u64,
    #[serde(default = "default_refill_rate")]
    refill_rate: u64,
    #[serde(default = "default_refill_window")]
    refill_window: RefillWindow,
    #[serde(default)]
    burst_allowed: bool,
    #[serde(default)]
    burst_size: u64,
    #[serde(default = "default_user_id_key")]
    user_id_key: String,
    #[serde(default)]
    skip_authenticated: bool,
    #[serde(default)]
    whitelist: Vec<String>,
    #[serde(default)]
    blacklist: Vec<String>,
}

fn default_strategy() -> RateLimitStrategy {
    RateLimitStrategy::IpBased
}
fn default_max_tokens() -> u64 {
    100
}
fn default_refill_rate() -> u64 {
    100
}
fn default_refill_window() -> RefillWindow {
    RefillWindow::Minute
}
fn default_user_id_key() -> String {
    "user_id".to_string()
}

struct TokenBucketState {
    tokens: f64,
    last_refill: Instant,
    total_requests: u64,
}

/// Contract for an external rate-limit store. When configured and
/// connected, bucket state lives remotely; otherwise the local
/// mutex-guarded map is authoritative.
pub trait RateLimitBackend: Send + Sync {
    fn get_bucket(&self, key: &str) -> Option<(f64, Instant)>;
    fn set_bucket(&self, key: &str, tokens: f64, last_refill: Instant);
    fn increment_counter(&self, key: &str, by: u64, expiry: Duration) -> u64;
    fn get_counter(&self, key: &str) -> u64;
    fn is_connected(&self) -> bool;
}

#[derive(Default)]
pub struct RateLimitStats {
    pub total_requests: AtomicU64,
    pub blocked: AtomicU64,
    pub whitelisted: AtomicU64,
}

impl RateLimitStats {
    pub fn allowed(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed) - self.blocked.load(Ordering::Relaxed)
    }
}

impl RateLimitMiddleware {
    /// Number of distinct keys with local bucket state. Always zero when a
    /// connected remote backend is authoritative, since that state isn't
    /// enumerable through the minimal backend contract.
    pub fn active_buckets(&self) -> usize {
        self.buckets.lock().expect("rate limit bucket mutex poisoned").len()
    }
}

type CustomKeyGenerator = dyn Fn(&Request, &Context) -> String + Send + Sync;

/// Token-bucket rate limiter. Local state is a mutex-guarded map keyed by
/// the strategy's derived key; an optional remote backend overrides it when
/// present and connected.
pub struct RateLimitMiddleware {
    name: String,
    priority: i32,
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, TokenBucketState>>,
    backend: Option<Box<dyn RateLimitBackend>>,
    custom_key_generator: Option<Box<CustomKeyGenerator>>,
    pub stats: RateLimitStats,
}

impl RateLimitMiddleware {
    pub fn from_config(name: impl Into<String>, priority: i32, options: &serde_json::Value) -> Result<Self, MiddlewareConfigError> {
        let config: RateLimitConfig = serde_json::from_value(options.clone()).map_err(|e| {
            MiddlewareConfigError::InvalidOption { field: "rate_limit".to_string(), reason: e.to_string() }
        })?;
        if config.max_tokens == 0 {
            return Err(MiddlewareConfigError::InvalidOption {
                field: "rate_limit.max_tokens".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(RateLimitMiddleware {
            name: name.into(),
            priority,
            config,
            buckets: Mutex::new(HashMap::new()),
            backend: None,
            custom_key_generator: None,
            stats: RateLimitStats::default(),
        })
    }

    pub fn with_backend(mut self, backend: Box<dyn RateLimitBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_custom_key_generator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request, &Context) -> String + Send + Sync + 'static,
    {
        self.custom_key_generator = Some(Box::new(f));
        self
    }

    fn client_ip(&self, request: &Request) -> String {
        if let Some(xff) = request.header("X-Forwarded-For") {
            if let Some(first) = xff.split(',').next() {
                let trimmed = first.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
        if let Some(xri) = request.header("X-Real-IP") {
            if !xri.is_empty() {
                return xri.to_string();
            }
        }
        if let Some(xci) = request.header("X-Client-IP") {
            if !xci.is_empty() {
                return xci.to_string();
            }
        }
        if let Some(peer) = &request.peer_addr {
            return peer.clone();
        }
        tracing::warn!("no client IP available from headers or transport; using fallback sentinel");
        FALLBACK_PEER_SENTINEL.to_string()
    }

    fn user_id(&self, context: &Context) -> Option<String> {
        match context.get(&self.config.user_id_key) {
            Some(ContextValue::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Derives the bucket key for this request, or `None` if the custom
    /// generator returned empty string ("do not rate limit").
    fn derive_key(&self, request: &Request, context: &Context) -> Option<String> {
        match self.config.strategy {
            RateLimitStrategy::IpBased => Some(format!("ip:{}", self.client_ip(request))),
            RateLimitStrategy::UserBased => match self.user_id(context) {
                Some(uid) => Some(format!("user:{uid}")),
                None => Some(format!("ip:{}", self.client_ip(request))),
            },
            RateLimitStrategy::Combined => {
                let ip = self.client_ip(request);
                match self.user_id(context) {
                    Some(uid) => Some(format!("combined:{ip}:{uid}")),
                    None => Some(format!("ip:{ip}")),
                }
            }
            RateLimitStrategy::Custom => {
                let key = self
                    .custom_key_generator
                    .as_ref()
                    .map(|f| f(request, context))
                    .unwrap_or_default();
                if key.is_empty() {
                    None
                } else {
                    Some(key)
                }
            }
        }
    }

    fn matches_list(&self, client_ip: &str, patterns: &[String]) -> bool {
        let parsed_client: Option<IpAddr> = client_ip.parse().ok();
        patterns.iter().any(|pattern| {
            if pattern == client_ip {
                return true;
            }
            if let (Some(client), Ok(net)) = (parsed_client, IpNet::from_str(pattern)) {
                return net.contains(&client);
            }
            false
        })
    }

    fn window_seconds(&self) -> u64 {
        self.config.refill_window.seconds()
    }

    fn max_tokens(&self) -> f64 {
        if self.config.burst_allowed {
            (self.config.max_tokens + self.config.burst_size) as f64
        } else {
            self.config.max_tokens as f64
        }
    }

    /// Refills and attempts to consume one token for `key`, returning the
    /// resulting `(allowed, tokens_remaining, retry_after_secs)`.
    fn consume(&self, key: &str) -> (bool, f64, u64) {
        if let Some(backend) = &self.backend {
            if backend.is_connected() {
                return self.consume_remote(backend.as_ref(), key);
            }
        }
        self.consume_local(key)
    }

    fn refill(&self, tokens: f64, elapsed: Duration) -> f64 {
        let window = self.window_seconds() as f64;
        let refilled = tokens + (self.config.refill_rate as f64 * elapsed.as_secs_f64() / window).floor();
        refilled.min(self.max_tokens())
    }

    fn consume_local(&self, key: &str) -> (bool, f64, u64) {
        let mut buckets = self.buckets.lock().expect("rate limit bucket mutex poisoned");
        let now = Instant::now();
        let state = buckets.entry(key.to_string()).or_insert_with(|| TokenBucketState {
            tokens: self.max_tokens(),
            last_refill: now,
            total_requests: 0,
        });

        let elapsed = now.duration_since(state.last_refill);
        let refilled = self.refill(state.tokens, elapsed);
        if refilled > state.tokens {
            state.last_refill = now;
        }
        state.tokens = refilled;
        state.total_requests += 1;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            (true, state.tokens, 0)
        } else {
            let retry_after = ((self.window_seconds() as f64) / (self.config.refill_rate.max(1) as f64)).ceil() as u64;
            (false, state.tokens, retry_after.max(1))
        }
    }

    fn consume_remote(&self, backend: &dyn RateLimitBackend, key: &str) -> (bool, f64, u64) {
        let now = Instant::now();
        let (tokens, last_refill) = backend.get_bucket(key).unwrap_or((self.max_tokens(), now));
        let elapsed = now.duration_since(last_refill);
        let refilled = self.refill(tokens, elapsed);
        let new_last_refill = if refilled > tokens { now } else { last_refill };

        if refilled >= 1.0 {
            backend.set_bucket(key, refilled - 1.0, new_last_refill);
            (true, refilled - 1.0, 0)
        } else {
            backend.set_bucket(key, refilled, new_last_refill);
            let retry_after = ((self.window_seconds() as f64) / (self.config.refill_rate.max(1) as f64)).ceil() as u64;
            (false, refilled, retry_after.max(1))
        }
    }

    fn rate_limited_response(&self, key: &str, retry_after: u64, remaining: f64) -> Response {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let body = serde_json::json!({
            "error": "rate_limit_exceeded",
            "message": "Too many requests",
            "retry_after": retry_after,
            "limit": self.config.max_tokens,
            "window": self.window_seconds(),
            "timestamp": timestamp,
            "key": key,
        });
        Response::new(429)
            .with_json_body(body.to_string())
            .with_header("Retry-After", retry_after.to_string())
            .with_header("X-RateLimit-Limit", self.config.max_tokens.to_string())
            .with_header("X-RateLimit-Remaining", remaining.max(0.0).floor().to_string())
            .with_header("X-RateLimit-Reset", self.reset_at())
            .with_header("X-RateLimit-Window", self.window_seconds().to_string())
    }

    fn reset_at(&self) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        (now + self.window_seconds()).to_string()
    }

    fn success_headers(&self, remaining: f64) -> Vec<(String, String)> {
        vec![
            ("X-RateLimit-Limit".to_string(), self.config.max_tokens.to_string()),
            ("X-RateLimit-Remaining".to_string(), remaining.max(0.0).floor().to_string()),
            ("X-RateLimit-Reset".to_string(), self.reset_at()),
            ("X-RateLimit-Window".to_string(), self.window_seconds().to_string()),
        ]
    }

    /// Evaluates whether `request` should be admitted. `ShortCircuit` means
    /// the pipeline must stop here with the carried response; `Continue`
    /// carries the `X-RateLimit-*` headers the caller should attach to
    /// whatever the rest of the pipeline produces.
    fn evaluate(&self, request: &Request, context: &Context) -> RateLimitOutcome {
        if self.config.skip_authenticated {
            if let Some(ContextValue::Boolean(true)) = context.get("authenticated") {
                return RateLimitOutcome::Continue(Vec::new());
            }
        }

        let client_ip = self.client_ip(request);

        if self.matches_list(&client_ip, &self.config.whitelist) {
            self.stats.whitelisted.fetch_add(1, Ordering::Relaxed);
            return RateLimitOutcome::Continue(Vec::new());
        }

        if self.matches_list(&client_ip, &self.config.blacklist) {
            self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
            self.stats.blocked.fetch_add(1, Ordering::Relaxed);
            return RateLimitOutcome::ShortCircuit(
                self.rate_limited_response(&client_ip, BLACKLIST_RETRY_AFTER_SECS, 0.0),
            );
        }

        let Some(key) = self.derive_key(request, context) else {
            return RateLimitOutcome::Continue(Vec::new());
        };

        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        let (allowed, remaining, retry_after) = self.consume(&key);
        if allowed {
            RateLimitOutcome::Continue(self.success_headers(remaining))
        } else {
            self.stats.blocked.fetch_add(1, Ordering::Relaxed);
            RateLimitOutcome::ShortCircuit(self.rate_limited_response(&key, retry_after, remaining))
        }
    }
}

enum RateLimitOutcome {
    ShortCircuit(Response),
    Continue(Vec<(String, String)>),
}

fn apply_headers(mut resp: Response, headers: Vec<(String, String)>) -> Response {
    for (k, v) in headers {
        resp = resp.with_header(k, v);
    }
    resp
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn handle(&self, request: Request, context: &mut Context, next: Next<'_>) -> Result<Response, MiddlewareError> {
        match self.evaluate(&request, context) {
            RateLimitOutcome::ShortCircuit(resp) => Ok(resp),
            RateLimitOutcome::Continue(headers) => {
                let resp = next.call(request, context).map_err(MiddlewareError::from)?;
                Ok(apply_headers(resp, headers))
            }
        }
    }
}

#[async_trait]
impl AsyncMiddleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle_async(&self, request: Request, context: &mut Context, next: AsyncNext<'_>) -> Result<Response, anyhow::Error> {
        match self.evaluate(&request, context) {
            RateLimitOutcome::ShortCircuit(resp) => Ok(resp),
            RateLimitOutcome::Continue(headers) => Ok(apply_headers(next.call(request, context).await, headers)),
        }
    }
}
