use std::sync::Arc;

use switchboard_config::MiddlewareInstanceConfig;
use switchboard_pipeline::{AsyncMiddleware, Middleware};

use crate::abi::PluginInfo;

/// A middleware instance produced by a plugin, usable from either pipeline
/// variant. Mirrors `switchboard_factory::BuiltMiddleware`; duplicated here
/// rather than depending on the factory crate, which in turn depends on
/// this one's sibling `switchboard-middleware` — keeping the dependency
/// edge one-directional (server glues plugin output into the factory,
/// this crate doesn't need to know the factory exists).
#[derive(Clone)]
pub struct PluginMiddleware {
    pub sync: Arc<dyn Middleware>,
    pub async_: Arc<dyn AsyncMiddleware>,
}

impl PluginMiddleware {
    pub fn new<T>(instance: T) -> Self
    where
        T: Middleware + AsyncMiddleware + 'static,
    {
        let shared = Arc::new(instance);
        PluginMiddleware { sync: shared.clone(), async_: shared }
    }
}

/// The behavior a dynamically loaded middleware plugin must implement.
///
/// An instance lives behind `Box<dyn MiddlewarePlugin>` on the host side of
/// the FFI boundary defined in [`crate::abi`]; the plugin author links
/// against this crate so the trait and the ABI wrapper that exports it
/// agree on the contract.
pub trait MiddlewarePlugin: Send + Sync {
    /// Called once right after construction, before any middleware is
    /// built. Returning `false` aborts the load.
    fn initialize(&self, framework_version: crate::abi::PluginVersion) -> bool;

    /// Called once before the plugin is unloaded.
    fn shutdown(&self);

    /// Build a middleware instance for `config`. `config.name` is one of
    /// [`MiddlewarePlugin::supported_types`].
    fn create_middleware(&self, config: &MiddlewareInstanceConfig) -> Result<PluginMiddleware, String>;

    /// Validate `config` without constructing anything.
    fn validate_config(&self, config: &MiddlewareInstanceConfig) -> Result<(), String>;

    /// Middleware type names this plugin can build.
    fn supported_types(&self) -> Vec<String>;

    /// Metadata matching what the library also exports as
    /// `cppSwitchboard_plugin_info`.
    fn info(&self) -> &PluginInfo;

    /// Periodic liveness check; an unhealthy plugin is a hot-reload and
    /// health-check candidate for unloading.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Configuration schema, JSON Schema preferred, for documentation and
    /// external validation tooling.
    fn config_schema(&self) -> String {
        "{}".to_string()
    }
}
