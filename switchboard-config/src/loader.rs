use std::path::Path;

use tracing::{info, warn};

use crate::error::ConfigError;
use crate::model::MiddlewareConfig;

/// Loads and validates a [`MiddlewareConfig`] from YAML, substituting
/// `${NAME}` placeholders against the process environment before
/// deserializing.
///
/// This substitution is deliberately separate from the figment
/// `Env`-provider overlay the server binary layers on top of its broader
/// `ServerConfig`: here, `${NAME}` expands inside individual YAML string
/// scalars (e.g. a secret embedded in a middleware's `config:` block),
/// whereas the server's overlay replaces whole config *fields* by path.
#[derive(Debug, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn new() -> Self {
        ConfigLoader
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<MiddlewareConfig, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        self.load_str(&raw, &path.display().to_string())
    }

    pub fn load_str(&self, yaml: &str, source_label: &str) -> Result<MiddlewareConfig, ConfigError> {
        let mut value: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::InvalidYaml {
                path: source_label.to_string(),
                cause: e.to_string(),
            })?;

        substitute_env(&mut value);

        let config: MiddlewareConfig =
            serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidYaml {
                path: source_label.to_string(),
                cause: e.to_string(),
            })?;

        config.validate()?;
        info!(
            source = source_label,
            global = config.global.len(),
            routes = config.routes.0.len(),
            "loaded middleware configuration"
        );
        Ok(config)
    }
}

/// Recursively walks a YAML value, replacing `${NAME}` occurrences in every
/// string scalar with the value of the `NAME` environment variable. A
/// reference to an unset variable is left verbatim and logged, matching the
/// reference framework's "warn, don't fail" substitution behavior.
fn substitute_env(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::String(s) => {
            *s = expand_env_refs(s);
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                substitute_env(item);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_env(v);
            }
        }
        _ => {}
    }
}

fn expand_env_refs(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        let end = start + end_rel;
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..end];
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                warn!(var = name, "environment variable referenced in config is unset");
                out.push_str(&rest[start..=end]);
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}
