//! Process-wide registry that turns a [`MiddlewareInstanceConfig`] into a
//! runnable middleware instance.
//!
//! Built-in types (`cors`, `logging`, `auth`, `rate_limit`, `authz`) are
//! registered under [`MiddlewareFactory::with_builtins`]. A plugin loader can
//! extend the same registry with [`MiddlewareFactory::register_type`] under
//! names it discovers at runtime. `create` looks the type up by
//! [`MiddlewareInstanceConfig::name`], validates and builds it, and returns
//! `Ok(None)` for both disabled entries and unknown type names — the two
//! cases in which a route simply runs without this middleware rather than
//! failing to start.

pub mod error;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use switchboard_config::MiddlewareInstanceConfig;
use switchboard_middleware::{AuthMiddleware, AuthzMiddleware, CorsMiddleware, LoggingMiddleware, RateLimitMiddleware};
use switchboard_pipeline::{AsyncMiddleware, Middleware};

pub use error::FactoryError;

/// A constructed middleware instance, usable from either pipeline variant.
///
/// Both fields point at the same underlying value; `sync` and `async_` are
/// simply that value seen through each pipeline's trait object, since a
/// single `dyn` cannot carry two unrelated vtables at once.
#[derive(Clone)]
pub struct BuiltMiddleware {
    pub sync: Arc<dyn Middleware>,
    pub async_: Arc<dyn AsyncMiddleware>,
}

fn built<T>(instance: T) -> BuiltMiddleware
where
    T: Middleware + AsyncMiddleware + 'static,
{
    let shared = Arc::new(instance);
    BuiltMiddleware { sync: shared.clone(), async_: shared }
}

type Constructor = Box<dyn Fn(&str, i32, &serde_json::Value) -> Result<BuiltMiddleware, String> + Send + Sync>;

/// Keyed registry of middleware constructors.
///
/// An owned instance is available for tests and for callers assembling a
/// pipeline with a custom set of types; [`MiddlewareFactory::global`] exposes
/// a process-wide singleton seeded with the same built-ins for production
/// use, so application code doesn't thread a factory handle through every
/// layer that configures routes.
pub struct MiddlewareFactory {
    constructors: HashMap<String, Constructor>,
}

impl MiddlewareFactory {
    /// An empty factory with no registered types.
    pub fn new() -> Self {
        MiddlewareFactory { constructors: HashMap::new() }
    }

    /// A factory pre-populated with `cors`, `logging`, `auth`, `rate_limit`,
    /// and `authz`.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register_builtins();
        factory
    }

    fn register_builtins(&mut self) {
        self.register_type("cors", |name, priority, options| {
            CorsMiddleware::from_config(name, priority, options).map(built).map_err(|e| e.to_string())
        });
        self.register_type("logging", |name, priority, _options| Ok(built(LoggingMiddleware::new(name, priority))));
        self.register_type("auth", |name, priority, options| {
            AuthMiddleware::from_config(name, priority, options).map(built).map_err(|e| e.to_string())
        });
        self.register_type("rate_limit", |name, priority, options| {
            RateLimitMiddleware::from_config(name, priority, options).map(built).map_err(|e| e.to_string())
        });
        self.register_type("authz", |name, priority, options| {
            AuthzMiddleware::from_config(name, priority, options).map(built).map_err(|e| e.to_string())
        });
    }

    /// Register (or overwrite) the constructor for a type name.
    pub fn register_type<F>(&mut self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn(&str, i32, &serde_json::Value) -> Result<BuiltMiddleware, String> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        tracing::info!(middleware_type = %type_name, "registered middleware constructor");
        self.constructors.insert(type_name, Box::new(constructor));
    }

    /// Does this factory know how to build `type_name`?
    pub fn supports(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names.
    pub fn registered_types(&self) -> Vec<&str> {
        self.constructors.keys().map(|s| s.as_str()).collect()
    }

    /// Build the middleware described by `config`.
    ///
    /// Returns `Ok(None)` when the entry is disabled or its type name is
    /// unregistered. Returns `Err` when the type is known but the instance
    /// rejects its options — config errors must surface at startup, not get
    /// silently swallowed into an absent middleware.
    pub fn create(&self, config: &MiddlewareInstanceConfig) -> Result<Option<BuiltMiddleware>, FactoryError> {
        if !config.enabled {
            return Ok(None);
        }
        let Some(constructor) = self.constructors.get(config.name.as_str()) else {
            return Ok(None);
        };
        let options = serde_json::Value::Object(config.config.clone());
        constructor(&config.name, config.priority, &options)
            .map(Some)
            .map_err(|reason| FactoryError::InvalidConfig { name: config.name.clone(), r#type: config.name.clone(), reason })
    }
}

impl Default for MiddlewareFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

static GLOBAL: OnceLock<RwLock<MiddlewareFactory>> = OnceLock::new();

impl MiddlewareFactory {
    /// The process-wide factory, lazily seeded with the built-in types on
    /// first access. Plugin loading extends this instance so every
    /// subsequently configured route sees the new type.
    pub fn global() -> &'static RwLock<MiddlewareFactory> {
        GLOBAL.get_or_init(|| RwLock::new(MiddlewareFactory::with_builtins()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, enabled: bool, options: serde_json::Value) -> MiddlewareInstanceConfig {
        MiddlewareInstanceConfig {
            name: name.to_string(),
            enabled,
            priority: 0,
            config: match options {
                serde_json::Value::Object(m) => m,
                _ => serde_json::Map::new(),
            },
        }
    }

    #[test]
    fn empty_factory_builds_nothing() {
        let factory = MiddlewareFactory::new();
        assert!(!factory.supports("logging"));
        assert!(factory.create(&config("logging", true, serde_json::json!({}))).unwrap().is_none());
    }

    #[test]
    fn builtins_are_registered() {
        let factory = MiddlewareFactory::with_builtins();
        for ty in ["cors", "logging", "auth", "rate_limit", "authz"] {
            assert!(factory.supports(ty), "expected '{ty}' to be registered");
        }
    }

    #[test]
    fn unknown_type_name_returns_none() {
        let factory = MiddlewareFactory::with_builtins();
        assert!(factory.create(&config("does-not-exist", true, serde_json::json!({}))).unwrap().is_none());
    }

    #[test]
    fn disabled_entry_is_not_built() {
        let factory = MiddlewareFactory::with_builtins();
        let built = factory.create(&config("logging", false, serde_json::json!({}))).unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn logging_builds_with_no_options() {
        let factory = MiddlewareFactory::with_builtins();
        let built = factory.create(&config("logging", true, serde_json::json!({}))).unwrap().unwrap();
        assert_eq!(built.sync.name(), "logging");
    }

    #[test]
    fn auth_rejects_missing_secret_for_bearer_scheme() {
        let factory = MiddlewareFactory::with_builtins();
        let result = factory.create(&config("auth", true, serde_json::json!({ "scheme": "bearer" })));
        assert!(result.is_err());
    }

    #[test]
    fn register_type_overwrites_existing_entry() {
        let mut factory = MiddlewareFactory::with_builtins();
        factory.register_type("logging", |name, priority, _opts| Ok(built(LoggingMiddleware::new(format!("{name}-v2"), priority))));
        let built = factory.create(&config("logging", true, serde_json::json!({}))).unwrap().unwrap();
        assert_eq!(built.sync.name(), "logging-v2");
    }

    #[test]
    fn global_factory_has_builtins() {
        let factory = MiddlewareFactory::global().read().unwrap();
        assert!(factory.supports("rate_limit"));
    }
}
