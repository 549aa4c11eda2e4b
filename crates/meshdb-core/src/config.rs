//! Network creation defaults
//!
//! These settings are used when creating a network or a provisioner. They are
//! not part of the network document itself.

use serde::{Deserialize, Serialize};

use crate::address::{Address, SceneNumber};
use crate::errors::MeshError;
use crate::exclusion::DEFAULT_EXCLUSION_WINDOW;
use crate::key::NetworkKey;
use crate::publish::MAX_TTL;
use crate::range::{AddressRange, SceneRange};
use crate::Result;

// ----------------------------------------------------------------------------
// Provisioner Defaults
// ----------------------------------------------------------------------------

/// Ranges allocated to a newly created provisioner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerDefaults {
    pub unicast_range: AddressRange,
    pub group_range: AddressRange,
    pub scene_range: SceneRange,
}

impl Default for ProvisionerDefaults {
    fn default() -> Self {
        Self {
            unicast_range: AddressRange::new(Address::new(0x0001), Address::new(0x199A)),
            group_range: AddressRange::new(Address::new(0xC000), Address::new(0xCC9A)),
            scene_range: SceneRange::new(SceneNumber::new(0x0001), SceneNumber::new(0x3333)),
        }
    }
}

impl ProvisionerDefaults {
    /// The whole address and scene space
    pub fn full_range() -> Self {
        Self {
            unicast_range: AddressRange::ALL_UNICAST,
            group_range: AddressRange::ALL_GROUP,
            scene_range: SceneRange::ALL_SCENES,
        }
    }

    /// Small ranges, so that tests run out of addresses quickly
    pub fn testing() -> Self {
        Self {
            unicast_range: AddressRange::new(Address::new(0x0001), Address::new(0x00FF)),
            group_range: AddressRange::new(Address::new(0xC000), Address::new(0xC0FF)),
            scene_range: SceneRange::new(SceneNumber::new(0x0001), SceneNumber::new(0x00FF)),
        }
    }
}

// ----------------------------------------------------------------------------
// Network Configuration
// ----------------------------------------------------------------------------

/// Configuration for creating networks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Name of the primary network key
    pub primary_key_name: String,
    /// Ranges of the local provisioner
    pub provisioner: ProvisionerDefaults,
    /// Default TTL of the local provisioner's node
    pub default_ttl: u8,
    /// IV Index values for which removed addresses stay excluded
    pub exclusion_window: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            primary_key_name: NetworkKey::PRIMARY_KEY_NAME.to_string(),
            provisioner: ProvisionerDefaults::default(),
            default_ttl: 5,
            exclusion_window: DEFAULT_EXCLUSION_WINDOW,
        }
    }
}

impl NetworkConfig {
    /// Provisioner owning the whole address and scene space
    pub fn full_range() -> Self {
        Self {
            provisioner: ProvisionerDefaults::full_range(),
            ..Self::default()
        }
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            primary_key_name: "Test Network Key".to_string(),
            provisioner: ProvisionerDefaults::testing(),
            default_ttl: 5,
            exclusion_window: DEFAULT_EXCLUSION_WINDOW,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.primary_key_name.is_empty() {
            return Err(MeshError::config_error("primary key name must not be empty"));
        }
        let ranges = &self.provisioner;
        if !ranges.unicast_range.is_unicast_range() {
            return Err(MeshError::config_error(format!(
                "{} is not a unicast range",
                ranges.unicast_range
            )));
        }
        if !ranges.group_range.is_group_range() {
            return Err(MeshError::config_error(format!("{} is not a group range", ranges.group_range)));
        }
        if !ranges.scene_range.is_valid() {
            return Err(MeshError::config_error(format!("{} is not a scene range", ranges.scene_range)));
        }
        if self.default_ttl == 1 || self.default_ttl > MAX_TTL {
            return Err(MeshError::config_error(format!("invalid default TTL {}", self.default_ttl)));
        }
        if self.exclusion_window == 0 {
            return Err(MeshError::config_error("exclusion window must be at least 1"));
        }
        Ok(())
    }
}
