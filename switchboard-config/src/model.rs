use std::collections::HashSet;
use std::fmt;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

const PRIORITY_MIN: i32 = -1000;
const PRIORITY_MAX: i32 = 1000;

/// One middleware entry as declared in YAML: a type name, its enabled/priority
/// knobs, and an opaque options map each factory parses for itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MiddlewareInstanceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl MiddlewareInstanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "middleware.name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&self.priority) {
            return Err(ConfigError::InvalidValue {
                field: format!("middleware.{}.priority", self.name),
                reason: format!("must be in [{PRIORITY_MIN}, {PRIORITY_MAX}]"),
            });
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// A per-route middleware list, gated by a glob or regular-expression pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteMiddlewareConfig {
    pub pattern: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub middlewares: Vec<MiddlewareInstanceConfig>,
}

impl RouteMiddlewareConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pattern.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "routes.pattern".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.is_regex {
            regex::Regex::new(&self.pattern).map_err(|e| ConfigError::InvalidValue {
                field: format!("routes.{}.pattern", self.pattern),
                reason: format!("invalid regex: {e}"),
            })?;
        }
        for mw in &self.middlewares {
            mw.validate()?;
        }
        Ok(())
    }

    /// Does `path` match this route's pattern, under its declared mode?
    pub fn matches(&self, path: &str) -> bool {
        if self.is_regex {
            regex::Regex::new(&self.pattern).map(|re| re.is_match(path)).unwrap_or(false)
        } else {
            crate::glob::glob_matches(&self.pattern, path)
        }
    }
}

/// The `routes` section accepts either a mapping of `pattern -> [middleware]`
/// (glob mode) or a sequence of explicit route objects (the only way to opt
/// into `is_regex: true`). Both deserialize into the same `Vec`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RouteList(pub Vec<RouteMiddlewareConfig>);

impl<'de> Deserialize<'de> for RouteList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RouteListVisitor;

        impl<'de> Visitor<'de> for RouteListVisitor {
            type Value = RouteList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of pattern to middleware list, or a sequence of route objects")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut routes = Vec::new();
                while let Some((pattern, middlewares)) =
                    map.next_entry::<String, Vec<MiddlewareInstanceConfig>>()?
                {
                    routes.push(RouteMiddlewareConfig { pattern, is_regex: false, middlewares });
                }
                Ok(RouteList(routes))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut routes = Vec::new();
                while let Some(route) = seq.next_element::<RouteMiddlewareConfig>()? {
                    routes.push(route);
                }
                Ok(RouteList(routes))
            }
        }

        deserializer.deserialize_any(RouteListVisitor)
    }
}

/// Hot-reload watch policy. `check_interval_secs` and `watched_files` are
/// only meaningful (and validated) when `enabled`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HotReloadConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default)]
    pub watched_files: Vec<String>,
    #[serde(default)]
    pub reload_on_change: bool,
    #[serde(default)]
    pub validate_before_reload: bool,
}

fn default_check_interval() -> u64 {
    5
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        HotReloadConfig {
            enabled: false,
            check_interval_secs: default_check_interval(),
            watched_files: Vec::new(),
            reload_on_change: true,
            validate_before_reload: true,
        }
    }
}

impl HotReloadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.check_interval_secs < 1 {
            return Err(ConfigError::InvalidValue {
                field: "hot_reload.check_interval".to_string(),
                reason: "must be >= 1 second when enabled".to_string(),
            });
        }
        if self.watched_files.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "hot_reload.watched_files".to_string(),
                reason: "must be non-empty when enabled".to_string(),
            });
        }
        Ok(())
    }
}

/// The validated, whole-process middleware configuration: global middleware
/// applied to every request, per-route overrides, and the hot-reload policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MiddlewareConfig {
    #[serde(default)]
    pub global: Vec<MiddlewareInstanceConfig>,
    #[serde(default)]
    pub routes: RouteList,
    #[serde(default)]
    pub hot_reload: HotReloadConfig,
}

impl MiddlewareConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for mw in &self.global {
            mw.validate()?;
        }

        let mut seen = HashSet::new();
        for route in &self.routes.0 {
            route.validate()?;
            if !seen.insert(route.pattern.clone()) {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("duplicate route pattern '{}'", route.pattern),
                });
            }
        }

        self.hot_reload.validate()
    }

    /// The effective, priority-ordered middleware list for `path`: the
    /// union of global middleware and the first matching route's
    /// middleware, deduplicated by name with route entries winning.
    pub fn effective_middlewares_for(&self, path: &str) -> Vec<MiddlewareInstanceConfig> {
        let route_middlewares = self
            .routes
            .0
            .iter()
            .find(|r| r.matches(path))
            .map(|r| r.middlewares.clone())
            .unwrap_or_default();

        let route_names: HashSet<&str> = route_middlewares.iter().map(|m| m.name.as_str()).collect();

        let mut effective: Vec<MiddlewareInstanceConfig> = self
            .global
            .iter()
            .filter(|m| !route_names.contains(m.name.as_str()))
            .cloned()
            .collect();
        effective.extend(route_middlewares);

        effective.sort_by_key(|m| std::cmp::Reverse(m.priority));
        effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mw(name: &str, priority: i32) -> MiddlewareInstanceConfig {
        MiddlewareInstanceConfig {
            name: name.to_string(),
            enabled: true,
            priority,
            config: serde_json::Map::new(),
        }
    }

    #[test]
    fn rejects_empty_name() {
        assert!(mw("", 0).validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_priority() {
        assert!(mw("x", 1001).validate().is_err());
        assert!(mw("x", -1001).validate().is_err());
        assert!(mw("x", 1000).validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_route_patterns() {
        let cfg = MiddlewareConfig {
            global: vec![],
            routes: RouteList(vec![
                RouteMiddlewareConfig { pattern: "/a/*".to_string(), is_regex: false, middlewares: vec![] },
                RouteMiddlewareConfig { pattern: "/a/*".to_string(), is_regex: false, middlewares: vec![] },
            ]),
            hot_reload: HotReloadConfig::default(),
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn hot_reload_requires_watched_files_when_enabled() {
        let cfg = HotReloadConfig { enabled: true, watched_files: vec![], ..HotReloadConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn effective_middlewares_route_wins_on_name_clash_and_sorts_by_priority() {
        let cfg = MiddlewareConfig {
            global: vec![mw("cors", 200), mw("logging", 0)],
            routes: RouteList(vec![RouteMiddlewareConfig {
                pattern: "/api/v1/*".to_string(),
                is_regex: false,
                middlewares: vec![mw("auth", 100), mw("rate_limit", 50)],
            }]),
            hot_reload: HotReloadConfig::default(),
        };

        let effective = cfg.effective_middlewares_for("/api/v1/users");
        let names: Vec<&str> = effective.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["cors", "auth", "rate_limit", "logging"]);
    }

    #[test]
    fn non_matching_path_falls_back_to_global_only() {
        let cfg = MiddlewareConfig {
            global: vec![mw("cors", 200)],
            routes: RouteList(vec![RouteMiddlewareConfig {
                pattern: "/api/v1/*".to_string(),
                is_regex: false,
                middlewares: vec![mw("auth", 100)],
            }]),
            hot_reload: HotReloadConfig::default(),
        };
        let effective = cfg.effective_middlewares_for("/other");
        assert_eq!(effective.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(), vec!["cors"]);
    }

    #[test]
    fn regex_route_pattern_matches() {
        let route = RouteMiddlewareConfig {
            pattern: r"^/api/v[0-9]+/.*$".to_string(),
            is_regex: true,
            middlewares: vec![],
        };
        assert!(route.validate().is_ok());
        assert!(route.matches("/api/v2/users"));
        assert!(!route.matches("/other"));
    }

    #[test]
    fn invalid_regex_pattern_fails_validation() {
        let route = RouteMiddlewareConfig { pattern: "(".to_string(), is_regex: true, middlewares: vec![] };
        assert!(route.validate().is_err());
    }

    #[test]
    fn routes_deserialize_from_mapping_shorthand() {
        let yaml = "\"/api/v1/*\":\n  - name: auth\n    priority: 100\n";
        let routes: RouteList = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(routes.0.len(), 1);
        assert_eq!(routes.0[0].pattern, "/api/v1/*");
        assert!(!routes.0[0].is_regex);
    }

    #[test]
    fn routes_deserialize_from_object_sequence() {
        let yaml = "- pattern: \"^/api/.*$\"\n  is_regex: true\n  middlewares:\n    - name: auth\n";
        let routes: RouteList = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(routes.0.len(), 1);
        assert!(routes.0[0].is_regex);
    }
}
