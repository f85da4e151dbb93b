//! Dynamic loading, lifecycle, and dependency management for middleware
//! plugins backed by platform-native shared libraries.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};

use libloading::{Library, Symbol};

use crate::abi::{
    read_plugin_info, CreatePluginFn, DestroyPluginFn, PluginInfo, PluginVersion, ABI_VERSION,
    CREATE_PLUGIN_SYMBOL, DESTROY_PLUGIN_SYMBOL, FRAMEWORK_VERSION, PLUGIN_INFO_SYMBOL,
};
use crate::plugin::MiddlewarePlugin;

/// Outcome of a single [`PluginManager::load_plugin`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginLoadResult {
    Success,
    FileNotFound,
    InvalidFormat,
    MissingExports,
    VersionMismatch,
    DependencyMissing,
    InitializationFailed,
    AlreadyLoaded,
    UnknownError,
}

impl PluginLoadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PluginLoadResult::Success)
    }
}

impl std::fmt::Display for PluginLoadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PluginLoadResult::Success => "success",
            PluginLoadResult::FileNotFound => "plugin file not found",
            PluginLoadResult::InvalidFormat => "invalid plugin file format",
            PluginLoadResult::MissingExports => "required exports not found in plugin",
            PluginLoadResult::VersionMismatch => "plugin version incompatible with framework",
            PluginLoadResult::DependencyMissing => "required plugin dependency not available",
            PluginLoadResult::InitializationFailed => "plugin initialization failed",
            PluginLoadResult::AlreadyLoaded => "plugin with same name already loaded",
            PluginLoadResult::UnknownError => "unknown error",
        };
        f.write_str(s)
    }
}

/// Directories, extensions, and traversal rules used by [`PluginManager::discover`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub search_directories: Vec<PathBuf>,
    pub file_extensions: Vec<String>,
    pub recursive: bool,
    pub follow_symlinks: bool,
    pub max_depth: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            search_directories: Vec::new(),
            file_extensions: vec![platform_extension().to_string()],
            recursive: true,
            follow_symlinks: false,
            max_depth: 10,
        }
    }
}

/// The dynamically loaded library's file extension on this platform.
#[cfg(target_os = "windows")]
fn platform_extension() -> &'static str {
    "dll"
}
#[cfg(target_os = "macos")]
fn platform_extension() -> &'static str {
    "dylib"
}
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn platform_extension() -> &'static str {
    "so"
}

/// A fired event's kind, matching the reference manager's
/// `(eventType, pluginName, message)` callback shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginEventKind {
    Loaded,
    Unloaded,
    Error,
    HotReload,
}

impl PluginEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            PluginEventKind::Loaded => "loaded",
            PluginEventKind::Unloaded => "unloaded",
            PluginEventKind::Error => "error",
            PluginEventKind::HotReload => "hot_reload",
        }
    }
}

type EventCallback = dyn Fn(PluginEventKind, &str, &str) + Send + Sync;

/// Aggregate counters mirroring the reference manager's statistics map.
#[derive(Default)]
pub struct PluginManagerStats {
    pub total_load_attempts: AtomicU64,
    pub successful_loads: AtomicU64,
    pub total_unloads: AtomicU64,
    pub hot_reloads: AtomicU64,
    pub health_check_failures: AtomicU64,
}

/// A plugin in active use: its library (kept alive for the instance's
/// lifetime), the constructed instance, and the bookkeeping a safe
/// unload needs.
///
/// `instance` owns the plugin object outright: [`PluginManager::load_plugin`]
/// reconstructs it once from the raw pointer `cppSwitchboard_create_plugin`
/// hands back, and nothing else ever touches that pointer again. Freeing it
/// is therefore this field's `Drop` alone; the exported
/// `cppSwitchboard_destroy_plugin` is resolved (to satisfy the load
/// protocol's required-exports check) but deliberately never called for a
/// plugin loaded this way, since calling it as well would free the same
/// allocation a second time.
///
/// `instance` is declared before `_library` so it drops first: its `Drop`
/// runs code that lives inside the shared library, which must still be
/// mapped when that happens. Field order matters here because `LoadedPlugin`
/// has an explicit `Drop` impl — fields always drop in declaration order
/// after it returns.
struct LoadedPlugin {
    file_path: PathBuf,
    info: PluginInfo,
    instance: Box<dyn MiddlewarePlugin>,
    /// Kept alive only to keep the library mapped for `instance`'s sake;
    /// never called directly itself once `instance` is reconstructed.
    _library: Library,
    ref_count: AtomicI32,
    load_time: Instant,
    hot_reload: bool,
    last_modified: Option<SystemTime>,
}

// `instance` is `Box<dyn MiddlewarePlugin>`, and the trait requires
// `Send + Sync` of its implementors; every other field is itself
// `Send + Sync`, including `Library` on the platforms this loader targets.
unsafe impl Send for LoadedPlugin {}
unsafe impl Sync for LoadedPlugin {}

impl Drop for LoadedPlugin {
    fn drop(&mut self) {
        self.instance.shutdown();
    }
}

/// Loads, tracks, and retires middleware plugins from platform-native
/// shared libraries.
///
/// Guards its plugin map with a single mutex per the framework's locking
/// discipline (§5): load, unload, ref-count, hot-reload, and health-check
/// paths all serialize through it.
pub struct PluginManager {
    plugins: Mutex<HashMap<String, LoadedPlugin>>,
    discovery: Mutex<DiscoveryConfig>,
    event_callback: Mutex<Option<Arc<EventCallback>>>,
    pub stats: PluginManagerStats,
    health_check_enabled: AtomicBool,
    health_check_interval_secs: AtomicU64,
    shutdown_requested: AtomicBool,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    pub fn new() -> Self {
        PluginManager {
            plugins: Mutex::new(HashMap::new()),
            discovery: Mutex::new(DiscoveryConfig::default()),
            event_callback: Mutex::new(None),
            stats: PluginManagerStats::default(),
            health_check_enabled: AtomicBool::new(false),
            health_check_interval_secs: AtomicU64::new(60),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    pub fn set_discovery_config(&self, config: DiscoveryConfig) {
        *self.discovery.lock().expect("plugin discovery mutex poisoned") = config;
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        self.discovery.lock().expect("plugin discovery mutex poisoned").clone()
    }

    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(PluginEventKind, &str, &str) + Send + Sync + 'static,
    {
        *self.event_callback.lock().expect("event callback mutex poisoned") = Some(Arc::new(callback));
    }

    fn fire_event(&self, kind: PluginEventKind, plugin_name: &str, message: &str) {
        if let Some(cb) = self.event_callback.lock().expect("event callback mutex poisoned").as_ref() {
            cb(kind, plugin_name, message);
        }
        tracing::debug!(event = kind.as_str(), plugin = plugin_name, message, "plugin event");
    }

    /// Enumerates candidate plugin files under the configured search
    /// directories without loading any of them.
    pub fn discover(&self) -> Vec<PathBuf> {
        let config = self.discovery_config();
        let mut found = Vec::new();
        for dir in &config.search_directories {
            walk(dir, &config, 0, &mut found);
        }
        found
    }

    /// Discovers candidate files and attempts to load each; returns every
    /// attempt's outcome keyed by the path it was tried at.
    pub fn discover_and_load(&self) -> Vec<(PathBuf, PluginLoadResult)> {
        self.discover()
            .into_iter()
            .map(|path| {
                let result = self.load_plugin(&path, false);
                (path, result)
            })
            .collect()
    }

    /// Loads a single plugin file, running the full validation and
    /// dependency-resolution protocol of §4.6 before registering it.
    pub fn load_plugin(&self, path: impl AsRef<Path>, hot_reload: bool) -> PluginLoadResult {
        let path = path.as_ref();
        self.stats.total_load_attempts.fetch_add(1, Ordering::Relaxed);

        if !path.exists() {
            self.fire_event(PluginEventKind::Error, "", &format!("plugin file not found: {}", path.display()));
            return PluginLoadResult::FileNotFound;
        }

        let library = match unsafe { Library::new(path) } {
            Ok(lib) => lib,
            Err(e) => {
                self.fire_event(PluginEventKind::Error, "", &format!("failed to open {}: {e}", path.display()));
                return PluginLoadResult::InvalidFormat;
            }
        };

        let (info, abi_version) = unsafe {
            let symbol = match library.get::<*const crate::abi::RawPluginInfo>(PLUGIN_INFO_SYMBOL) {
                Ok(sym) => sym,
                Err(_) => {
                    self.fire_event(PluginEventKind::Error, "", "missing plugin-info export");
                    return PluginLoadResult::MissingExports;
                }
            };
            let raw_ptr: *const crate::abi::RawPluginInfo = *symbol;
            if raw_ptr.is_null() {
                self.fire_event(PluginEventKind::Error, "", "plugin-info export is null");
                return PluginLoadResult::InvalidFormat;
            }
            match read_plugin_info(&*raw_ptr) {
                Ok(info) => (info, (*raw_ptr).version),
                Err(e) => {
                    self.fire_event(PluginEventKind::Error, "", &format!("invalid plugin-info record: {e}"));
                    return PluginLoadResult::InvalidFormat;
                }
            }
        };

        if abi_version != ABI_VERSION {
            self.fire_event(
                PluginEventKind::Error,
                &info.name,
                &format!("ABI version {abi_version} does not match framework ABI {ABI_VERSION}"),
            );
            return PluginLoadResult::VersionMismatch;
        }

        if !FRAMEWORK_VERSION.is_compatible(&info.min_framework_version) {
            self.fire_event(
                PluginEventKind::Error,
                &info.name,
                &format!(
                    "framework {FRAMEWORK_VERSION} does not satisfy plugin's minimum {}",
                    info.min_framework_version
                ),
            );
            return PluginLoadResult::VersionMismatch;
        }

        {
            let plugins = self.plugins.lock().expect("plugin map mutex poisoned");
            if plugins.contains_key(&info.name) {
                return PluginLoadResult::AlreadyLoaded;
            }
            if let Some(missing) = first_unsatisfied_dependency(&info, &plugins) {
                self.fire_event(
                    PluginEventKind::Error,
                    &info.name,
                    &format!("missing required dependency '{missing}'"),
                );
                return PluginLoadResult::DependencyMissing;
            }
        }

        let create_fn: CreatePluginFn = unsafe {
            let create: Symbol<CreatePluginFn> = match library.get(CREATE_PLUGIN_SYMBOL) {
                Ok(f) => f,
                Err(_) => return PluginLoadResult::MissingExports,
            };
            // Resolved solely to satisfy the load protocol's required-exports
            // check; never invoked for a plugin loaded this way. `instance`
            // below takes full ownership of the reconstructed box, so calling
            // the destructor export as well would free it a second time.
            let _destroy: Symbol<DestroyPluginFn> = match library.get(DESTROY_PLUGIN_SYMBOL) {
                Ok(f) => f,
                Err(_) => return PluginLoadResult::MissingExports,
            };
            *create
        };

        let raw_instance = unsafe { create_fn() };
        if raw_instance.is_null() {
            return PluginLoadResult::InitializationFailed;
        }

        // The library doubly-boxes its `Box<dyn MiddlewarePlugin>` and
        // leaks the outer box (see crate::abi docs); reconstruct it here.
        // This is the only reconstruction of this pointer anywhere in the
        // manager — `instance` now owns it for the rest of its lifetime.
        let instance: Box<dyn MiddlewarePlugin> =
            unsafe { *Box::from_raw(raw_instance as *mut Box<dyn MiddlewarePlugin>) };

        if !instance.initialize(FRAMEWORK_VERSION) {
            self.fire_event(PluginEventKind::Error, &info.name, "plugin initialize() returned false");
            // `instance` drops here, freeing itself exactly once.
            return PluginLoadResult::InitializationFailed;
        }

        let last_modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        let loaded = LoadedPlugin {
            file_path: path.to_path_buf(),
            info: info.clone(),
            instance,
            _library: library,
            ref_count: AtomicI32::new(0),
            load_time: Instant::now(),
            hot_reload,
            last_modified,
        };

        let mut plugins = self.plugins.lock().expect("plugin map mutex poisoned");
        if plugins.contains_key(&info.name) {
            // Raced with a concurrent load of the same name; drop ours.
            return PluginLoadResult::AlreadyLoaded;
        }
        plugins.insert(info.name.clone(), loaded);
        drop(plugins);

        self.stats.successful_loads.fetch_add(1, Ordering::Relaxed);
        self.fire_event(PluginEventKind::Loaded, &info.name, &format!("loaded from {}", path.display()));
        PluginLoadResult::Success
    }

    /// Creates a middleware instance from a loaded plugin's type registry.
    /// The caller is responsible for calling [`PluginManager::increment_ref`]
    /// / [`PluginManager::decrement_ref`] around the instance's lifetime.
    pub fn create_middleware(
        &self,
        plugin_name: &str,
        config: &switchboard_config::MiddlewareInstanceConfig,
    ) -> Result<crate::plugin::PluginMiddleware, String> {
        let plugins = self.plugins.lock().expect("plugin map mutex poisoned");
        let plugin = plugins.get(plugin_name).ok_or_else(|| format!("plugin '{plugin_name}' is not loaded"))?;
        plugin.instance.create_middleware(config)
    }

    pub fn is_plugin_loaded(&self, name: &str) -> bool {
        self.plugins.lock().expect("plugin map mutex poisoned").contains_key(name)
    }

    pub fn loaded_plugins(&self) -> Vec<String> {
        self.plugins.lock().expect("plugin map mutex poisoned").keys().cloned().collect()
    }

    pub fn plugin_info(&self, name: &str) -> Option<PluginInfo> {
        self.plugins.lock().expect("plugin map mutex poisoned").get(name).map(|p| p.info.clone())
    }

    pub fn increment_ref(&self, name: &str) -> bool {
        match self.plugins.lock().expect("plugin map mutex poisoned").get(name) {
            Some(plugin) => {
                plugin.ref_count.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn decrement_ref(&self, name: &str) -> bool {
        match self.plugins.lock().expect("plugin map mutex poisoned").get(name) {
            Some(plugin) => {
                plugin.ref_count.fetch_sub(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn ref_count(&self, name: &str) -> Option<i32> {
        self.plugins
            .lock()
            .expect("plugin map mutex poisoned")
            .get(name)
            .map(|p| p.ref_count.load(Ordering::SeqCst))
    }

    /// Unloads `name` if its reference count is zero. Returns `false`
    /// otherwise or if the plugin isn't loaded.
    pub fn unload_plugin(&self, name: &str) -> bool {
        self.unload(name, false)
    }

    /// Unloads `name` regardless of outstanding references. Documented as
    /// unsafe: callers must guarantee no middleware produced by this
    /// plugin is still reachable.
    pub fn force_unload_plugin(&self, name: &str) -> bool {
        self.unload(name, true)
    }

    fn unload(&self, name: &str, force: bool) -> bool {
        let mut plugins = self.plugins.lock().expect("plugin map mutex poisoned");
        let Some(plugin) = plugins.get(name) else { return false };
        if !force && plugin.ref_count.load(Ordering::SeqCst) > 0 {
            return false;
        }
        plugins.remove(name);
        drop(plugins);
        self.stats.total_unloads.fetch_add(1, Ordering::Relaxed);
        self.fire_event(PluginEventKind::Unloaded, name, "unloaded");
        true
    }

    /// Validates that every non-optional dependency declared by `name` is
    /// currently satisfied; returns the missing dependency names.
    pub fn validate_dependencies(&self, name: &str) -> Vec<String> {
        let plugins = self.plugins.lock().expect("plugin map mutex poisoned");
        let Some(plugin) = plugins.get(name) else { return Vec::new() };
        plugin
            .info
            .dependencies
            .iter()
            .filter(|dep| !dep.optional)
            .filter(|dep| match plugins.get(&dep.name) {
                Some(loaded) => !loaded.info.plugin_version.is_compatible(&dep.min_version),
                None => true,
            })
            .map(|dep| dep.name.clone())
            .collect()
    }

    /// Plugins whose declared dependencies include `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let plugins = self.plugins.lock().expect("plugin map mutex poisoned");
        plugins
            .iter()
            .filter(|(_, p)| p.info.dependencies.iter().any(|d| d.name == name))
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Re-stats every hot-reload-enabled plugin's file; any whose
    /// modification time has advanced and whose reference count is zero is
    /// unloaded and reloaded in place. Returns the names that were
    /// successfully reloaded.
    pub fn check_and_reload_plugins(&self) -> Vec<String> {
        let candidates: Vec<(String, PathBuf, Option<SystemTime>)> = {
            let plugins = self.plugins.lock().expect("plugin map mutex poisoned");
            plugins
                .iter()
                .filter(|(_, p)| p.hot_reload)
                .map(|(name, p)| (name.clone(), p.file_path.clone(), p.last_modified))
                .collect()
        };

        let mut reloaded = Vec::new();
        for (name, path, last_modified) in candidates {
            let current_modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
            if current_modified <= last_modified {
                continue;
            }
            let ref_count = self.ref_count(&name).unwrap_or(0);
            if ref_count > 0 {
                continue;
            }
            if !self.unload_plugin(&name) {
                continue;
            }
            if self.load_plugin(&path, true).is_success() {
                self.stats.hot_reloads.fetch_add(1, Ordering::Relaxed);
                self.fire_event(PluginEventKind::HotReload, &name, &format!("reloaded from {}", path.display()));
                reloaded.push(name);
            }
        }
        reloaded
    }

    /// Runs `is_healthy()` on every loaded plugin; any that reports
    /// unhealthy is unloaded, subject to the same ref-count rule as a
    /// normal unload.
    pub fn run_health_checks(&self) -> Vec<String> {
        let names = self.loaded_plugins();
        let mut unloaded = Vec::new();
        for name in names {
            let healthy = {
                let plugins = self.plugins.lock().expect("plugin map mutex poisoned");
                plugins.get(&name).map(|p| p.instance.is_healthy())
            };
            if healthy == Some(false) {
                self.stats.health_check_failures.fetch_add(1, Ordering::Relaxed);
                if self.unload_plugin(&name) {
                    unloaded.push(name);
                }
            }
        }
        unloaded
    }

    pub fn set_health_check_enabled(&self, enabled: bool, interval_secs: u64) {
        self.health_check_enabled.store(enabled, Ordering::SeqCst);
        self.health_check_interval_secs.store(interval_secs, Ordering::SeqCst);
    }

    pub fn health_check_enabled(&self) -> bool {
        self.health_check_enabled.load(Ordering::SeqCst)
    }

    pub fn health_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.health_check_interval_secs.load(Ordering::SeqCst))
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Unloads every plugin in dependency order (dependents before their
    /// dependencies) so no plugin is torn down while something still
    /// depends on it. Returns the number successfully unloaded; a plugin
    /// left in a cycle (which the load-time dependency discipline should
    /// never produce) is reported via the event callback and skipped.
    pub fn unload_all_plugins(&self, force: bool) -> usize {
        let order = self.topological_unload_order();
        let mut count = 0;
        for name in order {
            if self.unload(&name, force) {
                count += 1;
            } else {
                self.fire_event(PluginEventKind::Error, &name, "could not unload in dependency order");
            }
        }
        count
    }

    fn topological_unload_order(&self) -> Vec<String> {
        let plugins = self.plugins.lock().expect("plugin map mutex poisoned");
        let mut remaining: HashSet<String> = plugins.keys().cloned().collect();
        let mut order = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            // A plugin is ready to unload once nothing still-remaining
            // depends on it.
            let ready: Vec<String> = remaining
                .iter()
                .filter(|name| {
                    !remaining.iter().any(|other| {
                        other != *name
                            && plugins
                                .get(other)
                                .map(|p| p.info.dependencies.iter().any(|d| &d.name == *name))
                                .unwrap_or(false)
                    })
                })
                .cloned()
                .collect();

            if ready.is_empty() {
                // Cycle (should not occur under the load-time dependency
                // discipline); drain remaining names in arbitrary order
                // rather than loop forever.
                order.extend(remaining.iter().cloned());
                break;
            }
            for name in &ready {
                remaining.remove(name);
            }
            order.extend(ready);
        }
        order
    }
}

fn first_unsatisfied_dependency(info: &PluginInfo, plugins: &HashMap<String, LoadedPlugin>) -> Option<String> {
    info.dependencies.iter().find_map(|dep| {
        if dep.optional {
            return None;
        }
        match plugins.get(&dep.name) {
            Some(loaded) if loaded.info.plugin_version.is_compatible(&dep.min_version) => None,
            _ => Some(dep.name.clone()),
        }
    })
}

fn walk(dir: &Path, config: &DiscoveryConfig, depth: usize, found: &mut Vec<PathBuf>) {
    if depth > config.max_depth {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_symlink = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
        if is_symlink && !config.follow_symlinks {
            continue;
        }
        if path.is_dir() {
            if config.recursive {
                walk(&path, config, depth + 1, found);
            }
            continue;
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if config.file_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)) {
                found.push(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::PluginDependency;

    fn info(name: &str, deps: Vec<PluginDependency>) -> PluginInfo {
        PluginInfo {
            name: name.to_string(),
            description: String::new(),
            author: String::new(),
            plugin_version: PluginVersion::new(1, 0, 0),
            min_framework_version: PluginVersion::new(1, 0, 0),
            dependencies: deps,
        }
    }

    #[test]
    fn discovery_config_defaults_to_platform_extension() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.file_extensions, vec![platform_extension().to_string()]);
        assert!(config.recursive);
        assert!(!config.follow_symlinks);
    }

    #[test]
    fn load_plugin_reports_file_not_found() {
        let manager = PluginManager::new();
        let result = manager.load_plugin("/nonexistent/path/plugin.so", false);
        assert_eq!(result, PluginLoadResult::FileNotFound);
        assert_eq!(manager.stats.total_load_attempts.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn first_unsatisfied_dependency_flags_missing_required_dep() {
        let plugins: HashMap<String, LoadedPlugin> = HashMap::new();
        let dep = PluginDependency { name: "base".to_string(), min_version: PluginVersion::new(1, 0, 0), optional: false };
        let plugin_info = info("extra", vec![dep]);
        assert_eq!(first_unsatisfied_dependency(&plugin_info, &plugins), Some("base".to_string()));
    }

    #[test]
    fn optional_dependency_is_never_blocking() {
        let plugins: HashMap<String, LoadedPlugin> = HashMap::new();
        let dep = PluginDependency { name: "base".to_string(), min_version: PluginVersion::new(1, 0, 0), optional: true };
        let plugin_info = info("extra", vec![dep]);
        assert_eq!(first_unsatisfied_dependency(&plugin_info, &plugins), None);
    }

    #[test]
    fn increment_and_decrement_ref_on_unknown_plugin_return_false() {
        let manager = PluginManager::new();
        assert!(!manager.increment_ref("nope"));
        assert!(!manager.decrement_ref("nope"));
        assert_eq!(manager.ref_count("nope"), None);
    }

    #[test]
    fn unload_unknown_plugin_returns_false() {
        let manager = PluginManager::new();
        assert!(!manager.unload_plugin("nope"));
        assert!(!manager.force_unload_plugin("nope"));
    }

    #[test]
    fn health_check_config_round_trips() {
        let manager = PluginManager::new();
        assert!(!manager.health_check_enabled());
        manager.set_health_check_enabled(true, 30);
        assert!(manager.health_check_enabled());
        assert_eq!(manager.health_check_interval(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn discover_returns_empty_for_no_search_directories() {
        let manager = PluginManager::new();
        assert!(manager.discover().is_empty());
    }
}
