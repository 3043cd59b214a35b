use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    pub host: String,
    pub port: Option<u16>, // Optional to allow default value
    pub username: String,
    pub password: String,
    pub source_dir: String,
    pub criteria: Option<String>, // LIST filter, e.g. "*.zip"
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    pub target_dir: String,
    pub history_file: Option<String>, // Optional to allow default value
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub remote: RemoteConfig,
    pub local: LocalConfig,
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path))?;
        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse configuration file: {}", path))?;

        // Set defaults if not specified
        if config.remote.port.is_none() {
            config.remote.port = Some(21);
        }

        Ok(config)
    }

    pub fn port(&self) -> u16 {
        self.remote.port.unwrap_or(21)
    }

    /// Where the download history lives. A relative path is taken inside
    /// the target directory.
    pub fn history_path(&self) -> PathBuf {
        match &self.local.history_file {
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            Some(p) => Path::new(&self.local.target_dir).join(p),
            None => Path::new(&self.local.target_dir).join(".ftpmirror.history"),
        }
    }
}

// Helper function to log configuration options
pub fn log_config(config: &Config) {
    info!("  Host: {}:{}", config.remote.host, config.port());
    info!("  Username: {}", config.remote.username);
    info!("  Source Directory: {}", config.remote.source_dir);
    info!(
        "  Criteria: {}",
        config.remote.criteria.as_deref().unwrap_or("(none)")
    );
    info!("  Target Directory: {}", config.local.target_dir);
    info!("  History File: {}", config.history_path().display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let toml_str = r#"
            [remote]
            host = "ftp.example.org"
            username = "anonymous"
            password = "guest@"
            source_dir = "/pub/data"

            [local]
            target_dir = "/var/mirror"
        "#;
        let mut config: Config = toml::from_str(toml_str).unwrap();
        if config.remote.port.is_none() {
            config.remote.port = Some(21);
        }
        assert_eq!(config.port(), 21);
        assert_eq!(config.remote.criteria, None);
        assert_eq!(
            config.history_path(),
            Path::new("/var/mirror/.ftpmirror.history")
        );
    }

    #[test]
    fn test_history_path_resolution() {
        let toml_str = r#"
            [remote]
            host = "h"
            port = 2121
            username = "u"
            password = "p"
            source_dir = "/d"
            criteria = "*.zip"

            [local]
            target_dir = "/var/mirror"
            history_file = "ledger.txt"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port(), 2121);
        assert_eq!(config.history_path(), Path::new("/var/mirror/ledger.txt"));
    }
}
