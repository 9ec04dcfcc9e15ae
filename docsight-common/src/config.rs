//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Gateway endpoint configuration (one section per external dependency)
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Token bucket capacity, requests per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

fn default_requests_per_minute() -> u32 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

/// Inference service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    "docsight-analyst-1".to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            model: default_model(),
        }
    }
}

/// Similarity store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityConfig {
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    /// Number of nearest matches requested per query
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_top_k() -> u32 {
    5
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            top_k: default_top_k(),
        }
    }
}

/// Pipeline tuning knobs
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Wall-clock budget for one complete execution
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    /// Per-call HTTP timeout for gateway requests
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
    /// Bounded retry attempts for gateway calls
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Optional TTL for deterministic cache entries; None = no expiry
    #[serde(default)]
    pub cache_ttl_secs: Option<i64>,
}

fn default_execution_timeout_secs() -> u64 {
    300
}

fn default_gateway_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            execution_timeout_secs: default_execution_timeout_secs(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            max_retries: default_max_retries(),
            cache_ttl_secs: None,
        }
    }
}

/// TOML configuration file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<String>,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub web_search: GatewayConfig,
    #[serde(default)]
    pub social_search: GatewayConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl TomlConfig {
    /// Load configuration from the platform config file, if present.
    ///
    /// Missing file yields defaults; a malformed file is an error.
    pub fn load() -> Result<Self> {
        match find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let mut config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Cannot parse {}: {}", path.display(), e)))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables take precedence over TOML values for secrets
    /// and deployment-specific endpoints.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("DOCSIGHT_INFERENCE_API_KEY") {
            self.inference.gateway.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("DOCSIGHT_WEB_SEARCH_API_KEY") {
            self.web_search.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("DOCSIGHT_SOCIAL_SEARCH_API_KEY") {
            self.social_search.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("DOCSIGHT_INFERENCE_URL") {
            self.inference.gateway.base_url = url;
        }
        if let Ok(url) = std::env::var("DOCSIGHT_SIMILARITY_URL") {
            self.similarity.gateway.base_url = url;
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable DOCSIGHT_ROOT_FOLDER
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("DOCSIGHT_ROOT_FOLDER") {
        return PathBuf::from(path);
    }

    if let Some(ref root_folder) = toml_config.root_folder {
        return PathBuf::from(root_folder);
    }

    get_default_root_folder()
}

/// Get default configuration file path for the platform
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("docsight").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/docsight/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("docsight"))
        .unwrap_or_else(|| PathBuf::from("./docsight_data"))
}

/// Standard User-Agent string for outbound HTTP clients
pub fn get_user_agent() -> String {
    format!(
        "DocSight/{} ( github.com/docsight/docsight )",
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.pipeline.execution_timeout_secs, 300);
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.similarity.top_k, 5);
        assert_eq!(config.inference.model, "docsight-analyst-1");
        assert!(config.pipeline.cache_ttl_secs.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            root_folder = "/srv/docsight"

            [inference]
            base_url = "http://inference.local:9000"
            api_key = "key-1"
            requests_per_minute = 30
            model = "analyst-2"

            [web_search]
            base_url = "http://search.local"
            requests_per_minute = 10

            [pipeline]
            execution_timeout_secs = 120
            cache_ttl_secs = 86400
        "#;
        let config: TomlConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.root_folder.as_deref(), Some("/srv/docsight"));
        assert_eq!(config.inference.gateway.base_url, "http://inference.local:9000");
        assert_eq!(config.inference.gateway.requests_per_minute, 30);
        assert_eq!(config.inference.model, "analyst-2");
        assert_eq!(config.web_search.requests_per_minute, 10);
        assert_eq!(config.pipeline.execution_timeout_secs, 120);
        assert_eq!(config.pipeline.cache_ttl_secs, Some(86400));
        // Sections absent from the file fall back to defaults
        assert_eq!(config.social_search.requests_per_minute, 60);
    }

    #[test]
    fn test_cli_arg_wins() {
        let config = TomlConfig {
            root_folder: Some("/from/toml".to_string()),
            ..Default::default()
        };
        let resolved = resolve_root_folder(Some("/from/cli"), &config);
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_user_agent_format() {
        let ua = get_user_agent();
        assert!(ua.starts_with("DocSight/"));
        assert!(ua.contains("github.com/docsight/docsight"));
    }
}
