//! Dashboard Configuration
//!
//! Server list, ranking divisor and engine settings, loaded from TOML or
//! JSON. The default configuration carries the dashboard's four stock
//! servers.
//!
//! ```toml
//! score_divisor = 10
//! connect_timeout_ms = 5000
//!
//! [engine]
//! delay_ms = 2000
//! fail_servers = []
//!
//! [[servers]]
//! id = "us-east-1"
//! name = "US East (Virginia)"
//! latency_ms = 12
//! load_percent = 45
//! ```

use crate::catalog::{CatalogError, ServerCatalog, ServerDescriptor, DEFAULT_SCORE_DIVISOR};
use crate::engine::SimulatedEngine;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// One server entry in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub id: String,
    pub name: String,
    pub latency_ms: u32,
    pub load_percent: u8,
    /// Disabled servers are left out of the catalog
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ServerEntry {
    fn new(id: &str, name: &str, latency_ms: u32, load_percent: u8) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            latency_ms,
            load_percent,
            enabled: true,
        }
    }

    /// Convert to a catalog descriptor measured now
    pub fn to_descriptor(&self) -> ServerDescriptor {
        ServerDescriptor::new(&self.id, &self.name, self.latency_ms, self.load_percent)
    }
}

/// Simulated engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Handshake/teardown delay
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Servers whose handshake fails
    #[serde(default)]
    pub fail_servers: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            fail_servers: Vec::new(),
        }
    }
}

impl EngineSettings {
    pub fn build(&self) -> SimulatedEngine {
        SimulatedEngine::new(Duration::from_millis(self.delay_ms))
            .failing(self.fail_servers.iter().cloned())
    }
}

/// Dashboard configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// K in `load + latency / K`
    #[serde(default = "default_score_divisor")]
    pub score_divisor: u32,
    /// How long the engine gets per operation
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub engine: EngineSettings,
    pub servers: Vec<ServerEntry>,
}

fn default_true() -> bool {
    true
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_score_divisor() -> u32 {
    DEFAULT_SCORE_DIVISOR
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick a format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

impl DashboardConfig {
    /// Load from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

        let config = Self::parse(&content, format)?;
        info!(
            "Loaded dashboard config from {} ({} servers)",
            path.display(),
            config.servers.len()
        );
        Ok(config)
    }

    /// Parse and validate
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config: Self = match format {
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// The dashboard's stock servers
    pub fn default_config() -> Self {
        Self {
            score_divisor: DEFAULT_SCORE_DIVISOR,
            connect_timeout_ms: default_connect_timeout_ms(),
            engine: EngineSettings::default(),
            servers: vec![
                ServerEntry::new("us-east-1", "US East (Virginia)", 12, 45),
                ServerEntry::new("us-west-1", "US West (California)", 34, 67),
                ServerEntry::new("eu-west-1", "EU West (Ireland)", 89, 23),
                ServerEntry::new("ap-southeast-1", "Asia Pacific (Singapore)", 156, 78),
            ],
        }
    }

    /// Check invariants the catalog relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.score_divisor == 0 {
            return Err(ConfigError::Invalid("score_divisor must be positive".into()));
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate server id {}", server.id)));
            }
            if server.load_percent > 100 {
                return Err(ConfigError::Invalid(format!(
                    "server {} has load {}%",
                    server.id, server.load_percent
                )));
            }
        }

        if self.enabled_servers().next().is_none() {
            return Err(ConfigError::Invalid("no enabled servers".into()));
        }
        Ok(())
    }

    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerEntry> {
        self.servers.iter().filter(|s| s.enabled)
    }

    /// Build the catalog from enabled servers
    pub fn build_catalog(&self) -> Result<ServerCatalog, ConfigError> {
        let catalog = ServerCatalog::from_servers(
            self.score_divisor,
            self.enabled_servers().map(ServerEntry::to_descriptor),
        )?;
        Ok(catalog)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Export as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Export as JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default_config();

        assert_eq!(config.servers.len(), 4);
        assert_eq!(config.score_divisor, 10);
        assert_eq!(config.engine.delay_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_catalog_recommends_ireland() {
        let catalog = DashboardConfig::default_config().build_catalog().unwrap();
        assert_eq!(catalog.recommend().unwrap().id, "eu-west-1");
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = DashboardConfig::default_config();
        let toml = config.to_toml().unwrap();

        let parsed = DashboardConfig::parse(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "servers": [
                { "id": "fra-1", "name": "Frankfurt", "latency_ms": 20, "load_percent": 10 },
                { "id": "tyo-1", "name": "Tokyo", "latency_ms": 200, "load_percent": 5, "enabled": false }
            ]
        }"#;

        let config = DashboardConfig::parse(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.score_divisor, 10);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));

        let catalog = config.build_catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.contains("tyo-1"));
    }

    #[test]
    fn test_validation() {
        let mut config = DashboardConfig::default_config();
        config.score_divisor = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = DashboardConfig::default_config();
        config.servers[1].id = "us-east-1".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = DashboardConfig::default_config();
        config.servers[0].load_percent = 150;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = DashboardConfig::default_config();
        config.servers.iter_mut().for_each(|s| s.enabled = false);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")).unwrap(), ConfigFormat::Json);
        assert!(ConfigFormat::from_path(Path::new("a.yaml")).is_err());
    }

    #[test]
    fn test_parse_error() {
        let result = DashboardConfig::parse("servers = 3", ConfigFormat::Toml);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
