//! Provisioned nodes of the network

use tracing::{debug, info};
use uuid::Uuid;

use super::MeshNetwork;
use crate::address::Address;
use crate::errors::{ConflictError, MeshError, PolicyError};
use crate::key::{Key, Security};
use crate::node::Node;
use crate::range::AddressRange;
use crate::Result;

impl MeshNetwork {
    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    pub fn node(&self, uuid: Uuid) -> Option<&Node> {
        self.nodes.iter().find(|n| n.uuid() == uuid)
    }

    /// The node owning the given unicast address, if any
    pub fn node_with_address(&self, address: Address) -> Option<&Node> {
        if !address.is_unicast() {
            return None;
        }
        self.nodes.iter().find(|n| n.contains_element_with_address(address))
    }

    pub fn node_for_provisioner(&self, provisioner_uuid: Uuid) -> Option<&Node> {
        self.node(provisioner_uuid)
    }

    pub fn contains_node(&self, uuid: Uuid) -> bool {
        self.node(uuid).is_some()
    }

    /// The node of the local provisioner, if it has one
    pub fn local_provisioner_node(&self) -> Option<&Node> {
        let uuid = self.local_provisioner()?.uuid();
        self.node(uuid)
    }

    pub(crate) fn local_node_mut(&mut self) -> Option<&mut Node> {
        let uuid = self.local_provisioner()?.uuid();
        self.nodes.iter_mut().find(|n| n.uuid() == uuid)
    }

    /// Modify a node in place
    pub fn with_node_mut<R>(&mut self, uuid: Uuid, f: impl FnOnce(&mut Node) -> R) -> Result<R> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.uuid() == uuid)
            .ok_or_else(|| MeshError::not_found(format!("Node {}", uuid)))?;
        let result = f(node);
        self.touch();
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Address Availability
    // ------------------------------------------------------------------------

    /// Whether `count` addresses starting at `address` are free
    ///
    /// Addresses of existing nodes and excluded addresses are not available.
    pub fn is_address_available(&self, address: Address, count: u8) -> bool {
        self.is_address_range_available(&AddressRange::from_address(address, count))
    }

    /// Like `is_address_available` for the elements of `node`, ignoring the
    /// node itself
    pub fn is_address_available_for(&self, address: Address, node: &Node) -> bool {
        let range = AddressRange::from_address(address, node.element_count());
        range.is_unicast_range()
            && !self
                .nodes
                .iter()
                .filter(|n| n.uuid() != node.uuid())
                .any(|n| n.overlaps_addresses(&range))
            && !self.is_excluded(&range)
    }

    pub fn is_address_range_available(&self, range: &AddressRange) -> bool {
        range.is_unicast_range() && !self.nodes.iter().any(|n| n.overlaps_addresses(range)) && !self.is_excluded(range)
    }

    fn is_excluded(&self, range: &AddressRange) -> bool {
        self.network_exclusions
            .contains(range, self.iv_index, self.exclusion_window)
    }

    // ------------------------------------------------------------------------
    // Add / Remove
    // ------------------------------------------------------------------------

    /// Add a provisioned node
    ///
    /// The node must use free unicast addresses and know at least one network
    /// key, all of which must exist in the network. Network keys known to an
    /// insecurely provisioned node have their minimum security lowered.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.contains_node(node.uuid()) {
            return Err(ConflictError::NodeAlreadyExists { uuid: node.uuid() }.into());
        }
        let range = node.unicast_range();
        if !range.is_unicast_range() {
            return Err(MeshError::invalid_address(node.primary_unicast_address()));
        }
        if !self.is_address_available_for(node.primary_unicast_address(), &node) {
            return Err(MeshError::address_not_available(node.primary_unicast_address()));
        }
        if node.network_keys().is_empty() {
            return Err(PolicyError::NoNetworkKey.into());
        }
        if let Some(unknown) = node
            .network_keys()
            .iter()
            .find(|k| self.network_key(k.index).is_none())
        {
            return Err(ConflictError::InvalidKey { index: unknown.index }.into());
        }

        if node.security() == Security::Insecure {
            for network_key in &mut self.network_keys {
                if node.knows_network_key(network_key.index()) {
                    network_key.lower_security();
                }
            }
        }
        info!("Added node {} ({}) at {}", node, node.uuid(), range);
        self.nodes.push(node);
        self.touch();
        Ok(())
    }

    /// Remove a node
    ///
    /// The node's addresses are removed from all scenes and excluded from
    /// reuse at the current IV Index.
    pub fn remove_node(&mut self, uuid: Uuid) -> Result<Node> {
        let position = self
            .nodes
            .iter()
            .position(|n| n.uuid() == uuid)
            .ok_or_else(|| MeshError::not_found(format!("Node {}", uuid)))?;
        let node = self.nodes.remove(position);
        let range = node.unicast_range();

        for scene in &mut self.scenes {
            scene.retain_addresses(|a| !range.contains_address(a));
        }
        let addresses = (range.low_address().value()..=range.high_address().value()).map(Address::new);
        self.network_exclusions.exclude(addresses, self.iv_index);
        debug!("Excluded {} at IV Index {}", range, self.iv_index.index);

        self.touch();
        info!("Removed node {} ({})", node, uuid);
        Ok(node)
    }
}
