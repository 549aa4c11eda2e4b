//! meshdb CLI Configuration Management
//!
//! Configuration is read from a TOML file. Every section is optional; missing
//! values fall back to the defaults. Command line flags take precedence over
//! the file.

use std::path::{Path, PathBuf};

use meshdb_core::NetworkConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

/// Default name of the network database file
pub const DEFAULT_NETWORK_FILE: &str = "mesh.json";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the meshdb CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Defaults for newly created networks and provisioners
    pub network: NetworkConfig,

    /// CLI-specific configuration
    pub cli: CliConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Network database used when `--file` is not given
    pub network_file: PathBuf,

    /// Write indented JSON
    pub pretty: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            network_file: PathBuf::from(DEFAULT_NETWORK_FILE),
            pretty: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.network
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        if self.cli.network_file.as_os_str().is_empty() {
            return Err(CliError::Config("network_file must not be empty".to_string()));
        }
        Ok(())
    }

    /// The network file, with `--file` taking precedence
    pub fn network_file(&self, file: Option<&Path>) -> PathBuf {
        file.map_or_else(|| self.cli.network_file.clone(), Path::to_path_buf)
    }
}
