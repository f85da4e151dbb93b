use std::path::PathBuf;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Server-level configuration, layered from a YAML file under a
/// `SWITCHBOARD_`-prefixed environment overlay, mirroring the reference
/// gateway's `AndoConfig::load`. This is distinct from [`switchboard_config::MiddlewareConfig`],
/// which governs per-route middleware rather than transport/process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http1_port")]
    pub http1_port: u16,
    #[serde(default = "default_http2_port")]
    pub http2_port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_middleware_config")]
    pub middleware_config: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_http1_port() -> u16 {
    8080
}
fn default_http2_port() -> u16 {
    8443
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_middleware_config() -> PathBuf {
    PathBuf::from("switchboard.yaml")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            http1_port: default_http1_port(),
            http2_port: default_http2_port(),
            bind: default_bind(),
            middleware_config: default_middleware_config(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Loads an optional YAML file at `path`, overlaid by any
    /// `SWITCHBOARD_*` environment variables; fields absent from both
    /// fall back to the `#[serde(default = ...)]` values above.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut figment = Figment::new();
        if path.exists() {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed("SWITCHBOARD_"));
        Ok(figment.extract()?)
    }
}
