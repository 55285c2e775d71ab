//! Startup state resolved before the server binds

use std::path::PathBuf;

use tribuna_core::{AppConfig, Database, Result};
use tribuna_net::ServerConfig;

/// Configuration and storage location for one server run
pub struct AppState {
    pub config: AppConfig,
    pub db_path: PathBuf,
}

impl AppState {
    /// Load the config file and resolve the database path
    pub fn load() -> Result<Self> {
        Self::from_config(AppConfig::load()?)
    }

    pub fn from_config(config: AppConfig) -> Result<Self> {
        let db_path = config.database_path()?;
        Ok(Self { config, db_path })
    }

    pub fn open_database(&self) -> Result<Database> {
        let db = Database::open(&self.db_path)?;
        tracing::info!(
            path = %self.db_path.display(),
            schema = db.schema_version(),
            "Opened database"
        );
        Ok(db)
    }

    pub fn listen_addr(&self) -> String {
        self.config.listen_addr()
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::from(&self.config)
    }
}
