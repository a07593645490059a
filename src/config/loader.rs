//! Configuration loading utilities
//!
//! Provides helper functions for loading configuration from various sources
//! with proper error handling and validation.

use crate::{Result, config::Settings};
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "STREAM_PROXY_CONFIG";

/// Configuration loader with multiple source support
#[derive(Debug)]
pub struct ConfigLoader {
    /// Default settings
    defaults: Settings,
}

impl ConfigLoader {
    /// Create new configuration loader
    pub fn new() -> Self {
        Self {
            defaults: Settings::default(),
        }
    }

    /// Get the config file path from STREAM_PROXY_CONFIG or the default location
    ///
    /// Priority:
    /// 1. STREAM_PROXY_CONFIG environment variable
    /// 2. ~/.config/stream-proxy/config.toml (or platform equivalent)
    pub fn get_config_path() -> Option<std::path::PathBuf> {
        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = std::path::PathBuf::from(config_path);
            if path.exists() {
                debug!("Using config file from {}: {:?}", CONFIG_ENV_VAR, path);
                return Some(path);
            } else {
                warn!("{} points to non-existent file: {:?}", CONFIG_ENV_VAR, path);
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let default_path = config_dir.join("stream-proxy").join("config.toml");
            if default_path.exists() {
                debug!("Using default config file: {:?}", default_path);
                return Some(default_path);
            }
        }

        debug!("No config file found");
        None
    }

    /// Load configuration with precedence order:
    /// 1. Command line arguments (applied by the caller)
    /// 2. Environment variables
    /// 3. Configuration file
    /// 4. Default values
    pub fn load(&self, config_file: Option<&Path>) -> Result<Settings> {
        let mut settings = self.defaults.clone();

        if let Some(path) = config_file {
            if path.exists() {
                info!("Loading configuration from file: {:?}", path);
                settings = Settings::from_file(path)?;
            } else {
                warn!("Configuration file not found: {:?}, using defaults", path);
            }
        }

        debug!("Applying environment variable overrides");
        settings = settings.merge_with_env()?;

        settings.validate()?;

        info!("Configuration loaded successfully");
        debug!(
            "Final configuration: port={} ttl={}s sources={}",
            settings.server.port,
            settings.session.ttl_secs,
            settings.resolver.sources.len()
        );

        Ok(settings)
    }

    /// Load configuration from environment only
    pub fn from_env_only(&self) -> Result<Settings> {
        let settings = Settings::from_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Get default configuration
    pub fn defaults(&self) -> &Settings {
        &self.defaults
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_defaults() {
        let loader = ConfigLoader::new();
        let defaults = loader.defaults();
        assert_eq!(defaults.server.port, 8888);
        assert_eq!(defaults.session.ttl_secs, 1800);
    }

    #[test]
    fn test_load_from_file() {
        let _lock = crate::config::ENV_TEST_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 8080

[session]
ttl_secs = 600
        "#
        )
        .unwrap();

        let loader = ConfigLoader::new();
        let settings = loader.load(Some(temp_file.path())).unwrap();

        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.session.ttl_secs, 600);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let _lock = crate::config::ENV_TEST_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let loader = ConfigLoader::new();
        let settings = loader
            .load(Some(Path::new("/nonexistent/stream-proxy.toml")))
            .unwrap();
        assert_eq!(settings.resolver.manifest_marker, ".m3u8");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let _lock = crate::config::ENV_TEST_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[resolver]\nsources = []").unwrap();

        let loader = ConfigLoader::new();
        assert!(loader.load(Some(temp_file.path())).is_err());
    }

    #[test]
    fn test_env_var_override() {
        let _lock = crate::config::ENV_TEST_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let original_port = std::env::var("PORT").ok();
        unsafe {
            std::env::set_var("PORT", "9100");
        }

        let loader = ConfigLoader::new();
        let settings = loader.from_env_only().unwrap();
        assert_eq!(settings.server.port, 9100);

        unsafe {
            std::env::remove_var("PORT");
            if let Some(port) = original_port {
                std::env::set_var("PORT", port);
            }
        }
    }
}
