//! The C ABI a plugin shared library must expose.
//!
//! A plugin exports exactly three symbols, named verbatim so the loader
//! can resolve them with [`libloading`] regardless of the language the
//! plugin happens to be written in:
//!
//! - `cppSwitchboard_plugin_info` — a `static` [`RawPluginInfo`] record.
//! - `cppSwitchboard_create_plugin` — constructs a plugin instance.
//! - `cppSwitchboard_destroy_plugin` — destroys one produced by the above.
//!
//! The instance itself crosses the boundary as an opaque `*mut c_void`; a
//! Rust plugin produces it by doubly boxing its `Box<dyn MiddlewarePlugin>`
//! and leaking the outer box with [`Box::into_raw`], so the pointer the
//! host receives is thin. This only round-trips correctly when host and
//! plugin share a Rust version and a trait-object layout, which is the
//! same caveat every dlopen-based Rust plugin system carries; it is not
//! a general cross-language ABI like the metadata record is.

use std::ffi::{c_char, c_void, CStr};
use std::fmt;

/// Plugin ABI version. Bumped only on breaking changes to this module's
/// contract; a plugin compiled against a different version is rejected
/// before any of its code runs.
pub const ABI_VERSION: u32 = 1;

/// The framework version plugins declare compatibility against.
pub const FRAMEWORK_VERSION: PluginVersion = PluginVersion { major: 1, minor: 2, patch: 0 };

pub const PLUGIN_INFO_SYMBOL: &[u8] = b"cppSwitchboard_plugin_info\0";
pub const CREATE_PLUGIN_SYMBOL: &[u8] = b"cppSwitchboard_create_plugin\0";
pub const DESTROY_PLUGIN_SYMBOL: &[u8] = b"cppSwitchboard_destroy_plugin\0";

/// Semantic version, `repr(C)` so it can sit inline in [`RawPluginInfo`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PluginVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl PluginVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        PluginVersion { major, minor, patch }
    }

    /// -1 if `self` < `other`, 0 if equal, 1 if `self` > `other`.
    pub fn compare(&self, other: &PluginVersion) -> i32 {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) as i32
    }

    /// True when `self` can stand in for a declared minimum `required`
    /// version: same major component, and not older within it.
    pub fn is_compatible(&self, required: &PluginVersion) -> bool {
        if self.major != required.major {
            return false;
        }
        (self.minor, self.patch) >= (required.minor, required.patch)
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A single dependency entry in a plugin's `dependencies` array.
#[repr(C)]
pub struct RawPluginDependency {
    pub name: *const c_char,
    pub min_version: PluginVersion,
    pub optional: bool,
}

/// The metadata record a plugin exports as `cppSwitchboard_plugin_info`.
///
/// This is a POD layout shared verbatim with non-Rust plugins; string
/// fields are NUL-terminated C strings with a lifetime tied to the
/// library's lifetime (they must be `'static` string literals or
/// otherwise outlive the library being unloaded).
#[repr(C)]
pub struct RawPluginInfo {
    pub version: u32,
    pub name: *const c_char,
    pub description: *const c_char,
    pub author: *const c_char,
    pub plugin_version: PluginVersion,
    pub min_framework_version: PluginVersion,
    pub dependencies: *const RawPluginDependency,
    pub dependency_count: usize,
}

/// A dependency, owned and safe to hold past the plugin library's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDependency {
    pub name: String,
    pub min_version: PluginVersion,
    pub optional: bool,
}

/// Plugin metadata, converted out of the raw C record into owned data the
/// manager can keep around after (or even instead of) touching the
/// library again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub author: String,
    pub plugin_version: PluginVersion,
    pub min_framework_version: PluginVersion,
    pub dependencies: Vec<PluginDependency>,
}

/// Reasons a raw info record fails to convert; always maps to
/// [`crate::manager::PluginLoadResult::InvalidFormat`] upstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RawInfoError {
    #[error("plugin info field '{0}' is a null pointer")]
    NullField(&'static str),
    #[error("plugin info field '{0}' is not valid UTF-8")]
    InvalidUtf8(&'static str),
}

/// # Safety
/// `raw` must point at a fully initialized `RawPluginInfo` whose string and
/// dependency-array pointers remain valid for the duration of this call —
/// true immediately after resolving the `cppSwitchboard_plugin_info` symbol
/// from a library that has not yet been unloaded.
pub unsafe fn read_plugin_info(raw: &RawPluginInfo) -> Result<PluginInfo, RawInfoError> {
    let name = read_c_str(raw.name, "name")?;
    let description = read_c_str(raw.description, "description")?;
    let author = read_c_str(raw.author, "author")?;

    let mut dependencies = Vec::with_capacity(raw.dependency_count);
    if raw.dependency_count > 0 {
        let entries = unsafe { std::slice::from_raw_parts(raw.dependencies, raw.dependency_count) };
        for entry in entries {
            let dep_name = read_c_str(entry.name, "dependencies[].name")?;
            dependencies.push(PluginDependency { name: dep_name, min_version: entry.min_version, optional: entry.optional });
        }
    }

    Ok(PluginInfo {
        name,
        description,
        author,
        plugin_version: raw.plugin_version,
        min_framework_version: raw.min_framework_version,
        dependencies,
    })
}

unsafe fn read_c_str(ptr: *const c_char, field: &'static str) -> Result<String, RawInfoError> {
    if ptr.is_null() {
        return Err(RawInfoError::NullField(field));
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().map(str::to_owned).map_err(|_| RawInfoError::InvalidUtf8(field))
}

/// Signature of `cppSwitchboard_create_plugin`: constructs a plugin
/// instance and hands back an opaque, thin pointer to it.
pub type CreatePluginFn = unsafe extern "C" fn() -> *mut c_void;

/// Signature of `cppSwitchboard_destroy_plugin`: destroys an instance
/// previously produced by [`CreatePluginFn`].
pub type DestroyPluginFn = unsafe extern "C" fn(*mut c_void);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_compare_orders_lexicographically() {
        assert_eq!(PluginVersion::new(1, 2, 0).compare(&PluginVersion::new(1, 2, 0)), 0);
        assert_eq!(PluginVersion::new(1, 2, 0).compare(&PluginVersion::new(1, 3, 0)), -1);
        assert_eq!(PluginVersion::new(2, 0, 0).compare(&PluginVersion::new(1, 9, 9)), 1);
    }

    #[test]
    fn compatibility_requires_matching_major() {
        let v = PluginVersion::new(1, 3, 1);
        assert!(v.is_compatible(&PluginVersion::new(1, 2, 0)));
        assert!(!v.is_compatible(&PluginVersion::new(2, 0, 0)));
        assert!(!PluginVersion::new(1, 1, 0).is_compatible(&PluginVersion::new(1, 2, 0)));
    }

    #[test]
    fn read_plugin_info_rejects_null_name() {
        let raw = RawPluginInfo {
            version: ABI_VERSION,
            name: std::ptr::null(),
            description: c"".as_ptr(),
            author: c"".as_ptr(),
            plugin_version: PluginVersion::default(),
            min_framework_version: PluginVersion::default(),
            dependencies: std::ptr::null(),
            dependency_count: 0,
        };
        let err = unsafe { read_plugin_info(&raw) }.unwrap_err();
        assert_eq!(err, RawInfoError::NullField("name"));
    }

    #[test]
    fn read_plugin_info_converts_valid_record() {
        let raw = RawPluginInfo {
            version: ABI_VERSION,
            name: c"demo".as_ptr(),
            description: c"a demo plugin".as_ptr(),
            author: c"switchboard".as_ptr(),
            plugin_version: PluginVersion::new(1, 0, 0),
            min_framework_version: PluginVersion::new(1, 2, 0),
            dependencies: std::ptr::null(),
            dependency_count: 0,
        };
        let info = unsafe { read_plugin_info(&raw) }.unwrap();
        assert_eq!(info.name, "demo");
        assert_eq!(info.plugin_version, PluginVersion::new(1, 0, 0));
        assert!(info.dependencies.is_empty());
    }
}
