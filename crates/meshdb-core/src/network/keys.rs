//! Network and application key management

use tracing::{debug, info, warn};

use super::MeshNetwork;
use crate::errors::{ConflictError, MeshError, PolicyError, ValidationError};
use crate::key::{
    is_valid_key_index, random_key, ApplicationKey, Key, KeyIndex, KeyRefreshPhase, NetworkKey, MAX_KEY_INDEX,
};
use crate::node::Node;
use crate::Result;

impl NetworkKey {
    /// A network key is used when it is the primary key, when an application
    /// key is bound to it, or when a node other than the local provisioner's
    /// knows it
    pub fn is_used(&self, network: &MeshNetwork) -> bool {
        self.is_primary()
            || network.application_keys.iter().any(|k| k.bound_network_key() == self.index())
            || network.remote_nodes().any(|n| n.knows_network_key(self.index()))
    }
}

impl ApplicationKey {
    /// An application key is used when a node other than the local
    /// provisioner's knows it
    pub fn is_used(&self, network: &MeshNetwork) -> bool {
        network.remote_nodes().any(|n| n.knows_application_key(self.index()))
    }
}

fn next_index<'a, K: Key + 'a>(keys: impl Iterator<Item = &'a K>) -> Option<KeyIndex> {
    match keys.map(|k| k.index()).max() {
        None => Some(0),
        Some(max) => Some(max + 1).filter(|i| is_valid_key_index(*i)),
    }
}

impl MeshNetwork {
    /// Nodes other than the one of the local provisioner
    fn remote_nodes(&self) -> impl Iterator<Item = &Node> {
        let local = self.local_provisioner().map(|p| p.uuid());
        self.nodes.iter().filter(move |n| Some(n.uuid()) != local)
    }

    // ------------------------------------------------------------------------
    // Network Keys
    // ------------------------------------------------------------------------

    pub fn network_key(&self, index: KeyIndex) -> Option<&NetworkKey> {
        self.network_keys.iter().find(|k| k.index() == index)
    }

    fn network_key_mut(&mut self, index: KeyIndex) -> Result<&mut NetworkKey> {
        self.network_keys
            .iter_mut()
            .find(|k| k.index() == index)
            .ok_or_else(|| MeshError::not_found(format!("Network key {}", index)))
    }

    /// One more than the highest index in use, or `None` when exhausted
    pub fn next_available_network_key_index(&self) -> Option<KeyIndex> {
        next_index(self.network_keys.iter())
    }

    /// Add a network key
    ///
    /// Random key material is generated when `key` is `None`, and the next
    /// available index is used when `index` is `None`.
    pub fn add_network_key<T: Into<String>>(
        &mut self,
        key: Option<[u8; 16]>,
        index: Option<KeyIndex>,
        name: T,
    ) -> Result<&NetworkKey> {
        let index = index
            .or_else(|| self.next_available_network_key_index())
            .ok_or(ValidationError::KeyIndexOutOfRange {
                index: MAX_KEY_INDEX + 1,
            })?;
        if self.network_key(index).is_some() {
            return Err(ConflictError::KeyIndexInUse { index }.into());
        }
        let network_key = NetworkKey::new(name, index, key.unwrap_or_else(random_key))?;

        if let Some(node) = self.local_node_mut() {
            node.add_network_key(index);
        }
        self.network_keys.push(network_key);
        self.touch();
        info!("Added network key {}", index);
        Ok(&self.network_keys[self.network_keys.len() - 1])
    }

    /// Remove a network key
    ///
    /// The primary key can never be removed. A key in use is removed only
    /// when `force` is set; application keys bound to it are removed with it
    /// and every node forgets both.
    pub fn remove_network_key(&mut self, index: KeyIndex, force: bool) -> Result<NetworkKey> {
        let position = self
            .network_keys
            .iter()
            .position(|k| k.index() == index)
            .ok_or_else(|| MeshError::not_found(format!("Network key {}", index)))?;
        let network_key = &self.network_keys[position];
        if network_key.is_primary() || (!force && network_key.is_used(self)) {
            return Err(MeshError::key_in_use(index));
        }

        let bound: Vec<ApplicationKey> = self
            .application_keys
            .iter()
            .filter(|k| k.bound_network_key() == index)
            .cloned()
            .collect();
        for node in &mut self.nodes {
            node.remove_network_key(index, &bound);
            for app_key in &bound {
                node.remove_application_key(app_key.index());
            }
        }
        if !bound.is_empty() {
            warn!("Removing {} application key(s) bound to network key {}", bound.len(), index);
            self.application_keys.retain(|k| k.bound_network_key() != index);
        }
        let removed = self.network_keys.remove(position);
        self.touch();
        info!("Removed network key {}", index);
        Ok(removed)
    }

    /// Start a key refresh with new key material
    pub fn rotate_network_key(&mut self, index: KeyIndex, key: Option<[u8; 16]>) -> Result<()> {
        let network_key = self.network_key_mut(index)?;
        network_key.set_key(key.unwrap_or_else(random_key));
        for node in &mut self.nodes {
            if let Some(node_key) = node.net_keys.iter_mut().find(|k| k.index == index) {
                node_key.updated = false;
            }
        }
        self.touch();
        info!("Network key {} entered key distribution", index);
        Ok(())
    }

    /// Move a network key to another key refresh phase
    ///
    /// Returning to normal operation ends the key refresh: the old key of the
    /// network key and of every application key bound to it is dropped.
    pub fn set_network_key_phase(&mut self, index: KeyIndex, phase: KeyRefreshPhase) -> Result<()> {
        let network_key = self.network_key_mut(index)?;
        if phase == KeyRefreshPhase::NormalOperation {
            network_key.clear_old_key();
            let mut bound = Vec::new();
            for app_key in self.application_keys.iter_mut().filter(|k| k.bound_network_key() == index) {
                app_key.clear_old_key();
                bound.push(app_key.index());
            }
            for node in &mut self.nodes {
                let keys = node.net_keys.iter_mut().filter(|k| k.index == index);
                let app_keys = node.app_keys.iter_mut().filter(|k| bound.contains(&k.index));
                for node_key in keys.chain(app_keys) {
                    node_key.updated = false;
                }
            }
        } else {
            network_key.set_phase(phase);
        }
        self.touch();
        debug!("Network key {} phase: {}", index, phase);
        Ok(())
    }

    pub fn nodes_knowing_network_key(&self, index: KeyIndex) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.knows_network_key(index))
    }

    // ------------------------------------------------------------------------
    // Application Keys
    // ------------------------------------------------------------------------

    pub fn application_key(&self, index: KeyIndex) -> Option<&ApplicationKey> {
        self.application_keys.iter().find(|k| k.index() == index)
    }

    pub fn next_available_application_key_index(&self) -> Option<KeyIndex> {
        next_index(self.application_keys.iter())
    }

    pub fn application_keys_bound_to(&self, network_key: KeyIndex) -> impl Iterator<Item = &ApplicationKey> {
        self.application_keys
            .iter()
            .filter(move |k| k.bound_network_key() == network_key)
    }

    /// Add an application key bound to the first network key
    pub fn add_application_key<T: Into<String>>(
        &mut self,
        key: Option<[u8; 16]>,
        index: Option<KeyIndex>,
        name: T,
    ) -> Result<&ApplicationKey> {
        let bound_to = self.network_keys.first().ok_or(PolicyError::NoNetworkKey)?;
        let index = index
            .or_else(|| self.next_available_application_key_index())
            .ok_or(ValidationError::KeyIndexOutOfRange {
                index: MAX_KEY_INDEX + 1,
            })?;
        if self.application_key(index).is_some() {
            return Err(ConflictError::KeyIndexInUse { index }.into());
        }
        let application_key = ApplicationKey::new(name, index, key.unwrap_or_else(random_key), bound_to)?;

        if let Some(node) = self.local_node_mut() {
            node.add_application_key(index);
        }
        self.application_keys.push(application_key);
        self.touch();
        info!("Added application key {}", index);
        Ok(&self.application_keys[self.application_keys.len() - 1])
    }

    /// Remove an application key; a key in use requires `force`
    pub fn remove_application_key(&mut self, index: KeyIndex, force: bool) -> Result<ApplicationKey> {
        let position = self
            .application_keys
            .iter()
            .position(|k| k.index() == index)
            .ok_or_else(|| MeshError::not_found(format!("Application key {}", index)))?;
        if !force && self.application_keys[position].is_used(self) {
            return Err(MeshError::key_in_use(index));
        }
        for node in &mut self.nodes {
            node.remove_application_key(index);
        }
        let removed = self.application_keys.remove(position);
        self.touch();
        info!("Removed application key {}", index);
        Ok(removed)
    }

    /// Bind an unused application key to another network key
    pub fn bind_application_key(&mut self, index: KeyIndex, network_key: KeyIndex) -> Result<()> {
        let application_key = self
            .application_key(index)
            .ok_or_else(|| MeshError::not_found(format!("Application key {}", index)))?;
        if self.network_key(network_key).is_none() {
            return Err(ConflictError::InvalidKey { index: network_key }.into());
        }
        if application_key.bound_network_key() == network_key {
            return Ok(());
        }
        if application_key.is_used(self) {
            return Err(MeshError::key_in_use(index));
        }
        if let Some(application_key) = self.application_keys.iter_mut().find(|k| k.index() == index) {
            application_key.set_bound_network_key(network_key);
        }
        self.touch();
        debug!("Application key {} bound to network key {}", index, network_key);
        Ok(())
    }

    /// Start a key refresh of an application key with new key material
    pub fn rotate_application_key(&mut self, index: KeyIndex, key: Option<[u8; 16]>) -> Result<()> {
        let application_key = self
            .application_keys
            .iter_mut()
            .find(|k| k.index() == index)
            .ok_or_else(|| MeshError::not_found(format!("Application key {}", index)))?;
        application_key.set_key(key.unwrap_or_else(random_key));
        for node in &mut self.nodes {
            if let Some(node_key) = node.app_keys.iter_mut().find(|k| k.index == index) {
                node_key.updated = false;
            }
        }
        self.touch();
        info!("Application key {} rotated", index);
        Ok(())
    }
}
