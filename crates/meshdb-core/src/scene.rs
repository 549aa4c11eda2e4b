//! Scenes and the element addresses that store them

use serde::{Deserialize, Serialize};

use crate::address::{Address, SceneNumber};
use crate::errors::{MeshError, ValidationError};
use crate::Result;

#[derive(Serialize, Deserialize)]
struct SceneRecord {
    #[serde(alias = "scene")]
    number: SceneNumber,
    name: String,
    addresses: Vec<Address>,
}

/// A scene with the unicast addresses of the elements that store it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SceneRecord", into = "SceneRecord")]
pub struct Scene {
    number: SceneNumber,
    pub name: String,
    addresses: Vec<Address>,
}

impl Scene {
    pub fn new<T: Into<String>>(number: SceneNumber, name: T) -> Result<Self> {
        if !number.is_valid() {
            return Err(ValidationError::InvalidSceneNumber { scene: number.value() }.into());
        }
        Ok(Self {
            number,
            name: name.into(),
            addresses: Vec::new(),
        })
    }

    pub fn number(&self) -> SceneNumber {
        self.number
    }

    /// Element addresses, sorted
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// A scene is in use while any element stores it
    pub fn is_used(&self) -> bool {
        !self.addresses.is_empty()
    }

    /// Returns false for non-unicast or already present addresses
    pub(crate) fn add_address(&mut self, address: Address) -> bool {
        if !address.is_unicast() {
            return false;
        }
        match self.addresses.binary_search(&address) {
            Ok(_) => false,
            Err(position) => {
                self.addresses.insert(position, address);
                true
            }
        }
    }

    pub(crate) fn remove_address(&mut self, address: Address) -> bool {
        match self.addresses.binary_search(&address) {
            Ok(position) => {
                self.addresses.remove(position);
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn retain_addresses(&mut self, f: impl Fn(Address) -> bool) -> bool {
        let before = self.addresses.len();
        self.addresses.retain(|a| f(*a));
        before != self.addresses.len()
    }
}

impl TryFrom<SceneRecord> for Scene {
    type Error = MeshError;

    fn try_from(record: SceneRecord) -> Result<Self> {
        if !record.number.is_valid() {
            return Err(MeshError::decode("Invalid scene number: 0000"));
        }
        if let Some(address) = record.addresses.iter().find(|a| !a.is_unicast()) {
            return Err(MeshError::decode(format!(
                "Scene address must be of unicast type: {}",
                address
            )));
        }
        let mut addresses = record.addresses;
        addresses.sort_unstable();
        addresses.dedup();
        Ok(Self {
            number: record.number,
            name: record.name,
            addresses,
        })
    }
}

impl From<Scene> for SceneRecord {
    fn from(scene: Scene) -> Self {
        Self {
            number: scene.number,
            name: scene.name,
            addresses: scene.addresses,
        }
    }
}
