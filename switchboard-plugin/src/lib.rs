//! Dynamic loading and lifecycle management for shared-library middleware
//! plugins.
//!
//! [`abi`] defines the C ABI a plugin exports; [`plugin`] defines the
//! in-process Rust trait a loaded plugin's instance implements;
//! [`manager`] ties the two together into discovery, load/unload,
//! dependency resolution, hot reload, and health checking.

pub mod abi;
pub mod manager;
pub mod plugin;

pub use abi::{PluginDependency, PluginInfo, PluginVersion, RawInfoError, ABI_VERSION, FRAMEWORK_VERSION};
pub use manager::{DiscoveryConfig, PluginEventKind, PluginLoadResult, PluginManager, PluginManagerStats};
pub use plugin::{MiddlewarePlugin, PluginMiddleware};
