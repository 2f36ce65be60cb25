//! Subcommands.

pub mod batch;
pub mod config;
pub mod ingest;
pub mod process;

use std::path::{Path, PathBuf};

use acta_core::ActaConfig;
use tracing::debug;

use crate::store::SqliteStore;

/// Load the configuration from `--config`, else the user config file, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<ActaConfig> {
    if let Some(path) = config_path {
        return Ok(ActaConfig::from_file(Path::new(path))?);
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        debug!("Using config file {}", default_path.display());
        Ok(ActaConfig::from_file(&default_path)?)
    } else {
        Ok(ActaConfig::default())
    }
}

/// Open the database named on the command line or in the configuration.
pub fn open_store(config: &ActaConfig, database: Option<&PathBuf>) -> anyhow::Result<Option<SqliteStore>> {
    let Some(path) = database.or(config.storage.database.as_ref()) else {
        return Ok(None);
    };
    debug!("Opening database {}", path.display());
    SqliteStore::open(path)
        .map(Some)
        .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", path.display(), e))
}
