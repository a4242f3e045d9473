// ABOUTME: Configuration management for pipelog
// Handles server connection settings and viewer tuning (containers, backlog, debounce)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the server URL
pub const SERVER_ENV: &str = "ARGO_SERVER";
/// Environment variable carrying the bearer token
pub const TOKEN_ENV: &str = "ARGO_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pipeline server connection
    pub server: ServerConfig,

    /// Log viewer behaviour
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the pipeline server (e.g. http://localhost:2746)
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Seconds to wait for a connection to be established
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:2746".to_string(),
            token: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Selectable containers, in display order
    pub containers: Vec<String>,

    /// Container selected when a viewer starts
    pub default_container: String,

    /// Backlog requested from the source when a stream opens
    pub tail_lines: u32,

    /// Quiet period before a typed filter is committed (milliseconds)
    #[serde(with = "duration_millis")]
    pub debounce: Duration,

    /// Lines kept for late subscribers of a shared stream (unset = `scrollback`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_capacity: Option<usize>,

    /// Display lines kept by a viewer
    pub scrollback: usize,

    /// Size limit in bytes for a compiled filter pattern
    pub max_pattern_size: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            containers: vec!["init".to_string(), "main".to_string(), "sidecar".to_string()],
            default_container: "main".to_string(),
            tail_lines: 50,
            debounce: Duration::from_millis(1000),
            replay_capacity: None,
            scrollback: 10_000,
            max_pattern_size: 1 << 20,
        }
    }
}

impl ViewerConfig {
    /// Replay buffer bound for shared streams. Follow streams never end on their
    /// own, so the buffer is always capped; an unset value uses `scrollback`.
    pub fn replay_limit(&self) -> usize {
        self.replay_capacity.unwrap_or(self.scrollback)
    }

    /// Reject settings the viewer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.containers.is_empty() {
            bail!("viewer.containers must list at least one container");
        }
        if !self.containers.contains(&self.default_container) {
            bail!(
                "viewer.default_container '{}' is not one of {:?}",
                self.default_container,
                self.containers
            );
        }
        if self.scrollback == 0 {
            bail!("viewer.scrollback must be greater than zero");
        }
        if self.replay_capacity == Some(0) {
            bail!("viewer.replay_capacity must be greater than zero when set");
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from the standard locations, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // First existing file wins; missing fields fall back to defaults
        if let Some(path) = Self::get_config_paths().iter().find(|p| p.exists()) {
            config = Self::load_from(path)?;
            tracing::debug!("Loaded configuration from {}", path.display());
        }

        config.apply_env();
        config.viewer.validate()?;
        Ok(config)
    }

    /// Load a single configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the user config directory
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::get_user_config_dir()?;
        fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;

        Ok(config_path)
    }

    /// Apply `ARGO_SERVER` / `ARGO_TOKEN` when set
    pub fn apply_env(&mut self) {
        if let Ok(server) = std::env::var(SERVER_ENV) {
            if !server.trim().is_empty() {
                self.server.base_url = server;
            }
        }
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.server.token = Some(token);
            }
        }
    }

    /// Configuration file paths in order of precedence
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        // 1. Local project config
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(".pipelog").join("config.toml"));
        }

        // 2. User config (~/.pipelog/config.toml)
        if let Ok(config_dir) = Self::get_user_config_dir() {
            paths.push(config_dir.join("config.toml"));
        }

        paths
    }

    fn get_user_config_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home_dir.join(".pipelog"))
    }
}

/// Serde helper for Duration as seconds (u64)
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helper for Duration as milliseconds (u64)
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.base_url, "http://localhost:2746");
        assert_eq!(config.viewer.containers, vec!["init", "main", "sidecar"]);
        assert_eq!(config.viewer.default_container, "main");
        assert_eq!(config.viewer.tail_lines, 50);
        assert_eq!(config.viewer.debounce, Duration::from_millis(1000));
        assert_eq!(config.viewer.replay_capacity, None);
        assert_eq!(config.viewer.replay_limit(), 10_000);
        assert!(config.viewer.validate().is_ok());
    }

    #[test]
    fn test_replay_limit_prefers_explicit_capacity() {
        let mut viewer = ViewerConfig::default();
        viewer.scrollback = 300;
        assert_eq!(viewer.replay_limit(), 300);

        viewer.replay_capacity = Some(40);
        assert_eq!(viewer.replay_limit(), 40);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[server]\nbase_url = \"https://argo.internal\"\n\n[viewer]\ndebounce = 250\ntail_lines = 200\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.server.base_url, "https://argo.internal");
        assert_eq!(config.server.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.viewer.debounce, Duration::from_millis(250));
        assert_eq!(config.viewer.tail_lines, 200);
        assert_eq!(config.viewer.default_container, "main");
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = AppConfig::default();
        config.viewer.replay_capacity = Some(500);
        config.server.token = Some("secret".to_string());

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[viewer\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_validate_rejects_unknown_default_container() {
        let mut viewer = ViewerConfig::default();
        viewer.default_container = "wait".to_string();
        assert!(viewer.validate().is_err());

        viewer.containers.clear();
        assert!(viewer.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_replay_capacity() {
        let mut viewer = ViewerConfig::default();
        viewer.replay_capacity = Some(0);
        assert!(viewer.validate().is_err());
    }
}
