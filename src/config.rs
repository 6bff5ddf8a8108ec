//! Process configuration.
//!
//! Values come from, in order of precedence: `ANSWERD_*` environment variables, a TOML file
//! (`ANSWERD_CONFIG`, else `answerd.toml` in the working directory when present), and the
//! built-in defaults. Nothing is reconfigurable once the server is running.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "answerd.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Hub repo id or local directory of the base model.
    pub base_model: String,
    /// Directory holding `adapter_model.safetensors`.
    pub adapter_path: PathBuf,
    /// `auto`, `cpu`, `cuda`, `cuda:N` or `metal`.
    pub device: String,
    pub dtype: String,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_model: "TinyLlama/TinyLlama-1.1B-Chat-v1.0".to_string(),
            adapter_path: PathBuf::from("./my-tinyllama-adapter"),
            device: "auto".to_string(),
            dtype: "f32".to_string(),
            seed: 299_792_458,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Raises log verbosity to debug for this crate and the HTTP layer.
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            debug: false,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AppConfig {
    /// Resolves the configuration from the process environment and optional file.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("ANSWERD_CONFIG") {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("ANSWERD_BASE_MODEL") {
            self.model.base_model = v;
        }
        if let Some(v) = lookup("ANSWERD_ADAPTER_PATH") {
            self.model.adapter_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ANSWERD_DEVICE") {
            self.model.device = v;
        }
        if let Some(v) = lookup("ANSWERD_DTYPE") {
            self.model.dtype = v;
        }
        if let Some(v) = lookup("ANSWERD_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("ANSWERD_PORT") {
            self.server.port = v
                .trim()
                .parse()
                .map_err(|_| anyhow!("ANSWERD_PORT must be a port number, got '{}'", v))?;
        }
        if let Some(v) = lookup("ANSWERD_DEBUG") {
            self.server.debug = parse_flag(&v)
                .ok_or_else(|| anyhow!("ANSWERD_DEBUG must be a boolean, got '{}'", v))?;
        }
        Ok(())
    }

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.server.debug {
            "answerd=debug,tower_http=debug"
        } else {
            "answerd=info,tower_http=info"
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.model.base_model, "TinyLlama/TinyLlama-1.1B-Chat-v1.0");
        assert_eq!(config.model.adapter_path, PathBuf::from("./my-tinyllama-adapter"));
        assert_eq!(config.server.addr(), "0.0.0.0:5000");
        assert!(!config.server.debug);
    }

    #[test]
    fn toml_sections_override_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
[model]
adapter_path = "/srv/adapters/qa"
dtype = "bf16"

[server]
port = 8080
debug = true
"#,
        )
        .expect("parse toml");

        assert_eq!(config.model.adapter_path, PathBuf::from("/srv/adapters/qa"));
        assert_eq!(config.model.dtype, "bf16");
        assert_eq!(config.model.device, "auto");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.log_filter(), "answerd=debug,tower_http=debug");
    }

    #[test]
    fn env_wins_over_file_values() {
        let mut config = AppConfig::from_toml_str("[server]\nport = 8080\n").expect("parse toml");
        config
            .apply_env(env(&[
                ("ANSWERD_PORT", "9000"),
                ("ANSWERD_BASE_MODEL", "/models/tinyllama"),
                ("ANSWERD_DEBUG", "yes"),
            ]))
            .expect("apply env");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.model.base_model, "/models/tinyllama");
        assert!(config.server.debug);
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let mut config = AppConfig::default();
        assert!(config.apply_env(env(&[("ANSWERD_PORT", "http")])).is_err());
        assert!(config.apply_env(env(&[("ANSWERD_DEBUG", "maybe")])).is_err());
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let path = std::env::temp_dir().join(format!("answerd_config_{}.toml", std::process::id()));
        std::fs::write(&path, "[server]\nhost = \"127.0.0.1\"\n").expect("write config");

        let path_str = path.to_str().expect("utf8 path").to_string();
        let config = AppConfig::load_with(env(&[("ANSWERD_CONFIG", path_str.as_str())]))
            .expect("load config");
        assert_eq!(config.server.addr(), "127.0.0.1:5000");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let err = AppConfig::load_with(env(&[("ANSWERD_CONFIG", "/nonexistent/answerd.toml")]))
            .expect_err("missing file");
        assert!(err.to_string().contains("cannot read config file"));
    }
}
