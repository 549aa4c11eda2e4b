//! Network database file persistence

use std::path::{Path, PathBuf};

use meshdb_core::MeshNetwork;
use tracing::debug;

use crate::error::{CliError, Result};

/// A network database stored as a JSON file
#[derive(Debug, Clone)]
pub struct NetworkStore {
    path: PathBuf,
    pretty: bool,
}

impl NetworkStore {
    pub fn new<P: Into<PathBuf>>(path: P, pretty: bool) -> Self {
        Self {
            path: path.into(),
            pretty,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load and validate the network
    pub fn load(&self) -> Result<MeshNetwork> {
        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            CliError::NetworkFile(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let network = MeshNetwork::from_json(&json)?;
        debug!("Loaded network '{}' from {}", network.name(), self.path.display());
        Ok(network)
    }

    pub fn save(&self, network: &MeshNetwork) -> Result<()> {
        write_network(&self.path, network, self.pretty)?;
        debug!("Saved network '{}' to {}", network.name(), self.path.display());
        Ok(())
    }
}

/// Write a network as JSON
pub fn write_network(path: &Path, network: &MeshNetwork, pretty: bool) -> Result<()> {
    let json = if pretty {
        network.to_json_pretty()?
    } else {
        network.to_json()?
    };
    std::fs::write(path, json)
        .map_err(|e| CliError::NetworkFile(format!("Failed to write {}: {}", path.display(), e)))
}
