//! Server configuration loaded from TOML
//!
//! The file is looked up at `$TRIBUNA_CONFIG`, then `config.toml` in the
//! platform config directory. Missing files and missing keys fall back
//! to defaults.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::DEFAULT_SESSION_HOURS;
use crate::{Error, Result};

pub const CONFIG_ENV: &str = "TRIBUNA_CONFIG";
pub const DEFAULT_PORT: u16 = 7340;
pub const DEFAULT_MAX_PEERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    pub max_peers: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_peers: DEFAULT_MAX_PEERS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Defaults to `tribuna.db` in the platform data directory
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Lifetime of a login session
    pub session_hours: i64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            session_hours: DEFAULT_SESSION_HOURS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "tribuna", "tribuna").ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine platform directories",
        ))
    })
}

impl AppConfig {
    /// Load from the environment-selected or platform path
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => project_dirs()?.config_dir().join("config.toml"),
        };
        Self::load_from(&path)
    }

    /// Load from a file, using defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.max_peers == 0 {
            return Err(Error::Config("server.max_peers must be at least 1".into()));
        }
        if self.auth.session_hours <= 0 {
            return Err(Error::Config("auth.session_hours must be positive".into()));
        }
        Ok(())
    }

    /// Socket address the server listens on
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }

    /// Database file, creating its parent directory when needed
    pub fn database_path(&self) -> Result<PathBuf> {
        let path = match &self.database.path {
            Some(path) => path.clone(),
            None => project_dirs()?.data_dir().join("tribuna.db"),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 7340);
        assert_eq!(config.server.max_peers, 64);
        assert_eq!(config.auth.session_hours, 168);
        assert_eq!(config.listen_addr(), "0.0.0.0:7340");
    }

    #[test]
    fn test_partial_file() {
        let config = AppConfig::from_toml(
            r#"
[server]
port = 9000

[auth]
session_hours = 24
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_peers, 64);
        assert_eq!(config.auth.session_hours, 24);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            AppConfig::from_toml("[server]\nmax_peers = 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[auth]\nsession_hours = 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[server]\nport = \"high\"\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let missing = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing, AppConfig::default());

        let db_path = dir.path().join("data").join("tribuna.db");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!("[database]\npath = {:?}\n", db_path.display().to_string()),
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.database_path().unwrap(), db_path);
        assert!(dir.path().join("data").is_dir());
    }
}
