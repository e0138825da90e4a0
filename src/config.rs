//! Engine configuration.
//!
//! Loaded from TOML. Every section has defaults so a partial (or missing)
//! file is valid.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Environment variable naming a config file for [`Config::load_from_env`].
pub const CONFIG_ENV: &str = "SY_FETCH_CONFIG";

/// Upper bound for `download.max_update_retries`
const MAX_UPDATE_RETRIES_LIMIT: u32 = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub core: CoreConfig,
    pub download: DownloadConfig,
    pub logging: LoggingConfig,
}

/// Core context settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// How long a pseudo-pause may last before it counts as a device timeout
    pub pause_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pause_timeout_ms: 180_000,
        }
    }
}

impl CoreConfig {
    pub fn pause_timeout(&self) -> Duration {
        Duration::from_millis(self.pause_timeout_ms)
    }
}

/// Download state machine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Same-device retries when the remote reports an update in progress
    pub max_update_retries: u32,
    /// Fixed delay between those retries
    pub update_retry_delay_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_update_retries: 3,
            update_retry_delay_ms: 1_000,
        }
    }
}

impl DownloadConfig {
    pub fn update_retry_delay(&self) -> Duration {
        Duration::from_millis(self.update_retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load the file named by `SY_FETCH_CONFIG`, or defaults if it is unset
    pub fn load_from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                tracing::debug!("Loading config from {}", Path::new(&path).display());
                Self::load(Path::new(&path))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.core.pause_timeout_ms == 0 {
            return Err(SyncError::Config(
                "core.pause_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.download.max_update_retries > MAX_UPDATE_RETRIES_LIMIT {
            return Err(SyncError::Config(format!(
                "download.max_update_retries must be at most {} (got {})",
                MAX_UPDATE_RETRIES_LIMIT, self.download.max_update_retries
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.core.pause_timeout(), Duration::from_secs(180));
        assert_eq!(config.download.max_update_retries, 3);
        assert_eq!(config.download.update_retry_delay(), Duration::from_secs(1));
        assert_eq!(config.logging.filter, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [download]
            max_update_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.download.max_update_retries, 5);
        assert_eq!(config.download.update_retry_delay_ms, 1_000);
        assert_eq!(config.core, CoreConfig::default());
    }

    #[test]
    fn test_rejects_zero_pause_timeout() {
        let err = Config::from_toml_str("[core]\npause_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_rejects_unbounded_retries() {
        let err = Config::from_toml_str("[download]\nmax_update_retries = 1000\n").unwrap_err();
        assert!(err.to_string().contains("max_update_retries"));
    }

    #[test]
    fn test_rejects_bad_toml() {
        let err = Config::from_toml_str("[download\n").unwrap_err();
        assert!(matches!(err, SyncError::ConfigParse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = Config::load(&tmp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fetch.toml");
        fs::write(
            &path,
            "[core]\npause_timeout_ms = 250\n[logging]\nfilter = \"sy_fetch=debug\"\n",
        )
        .unwrap();

        std::env::set_var(CONFIG_ENV, &path);
        let config = Config::load_from_env();
        std::env::remove_var(CONFIG_ENV);

        let config = config.unwrap();
        assert_eq!(config.core.pause_timeout(), Duration::from_millis(250));
        assert_eq!(config.logging.filter, "sy_fetch=debug");
    }

    #[test]
    #[serial]
    fn test_load_from_env_unset() {
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(Config::load_from_env().unwrap(), Config::default());
    }
}
