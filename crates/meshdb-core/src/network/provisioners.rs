//! Provisioners of the network and their nodes
//!
//! The first provisioner is the local one. Its node, if any, knows every
//! network and application key of the network.

use tracing::{debug, info};
use uuid::Uuid;

use super::MeshNetwork;
use crate::address::Address;
use crate::element::Element;
use crate::errors::{ConflictError, MeshError, PolicyError, ValidationError};
use crate::key::Key;
use crate::node::Node;
use crate::provisioner::Provisioner;
use crate::range::{AddressRange, RangeSet};
use crate::Result;

impl MeshNetwork {
    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// The provisioner of this device, always the first one
    pub fn local_provisioner(&self) -> Option<&Provisioner> {
        self.provisioners.first()
    }

    pub fn provisioner(&self, uuid: Uuid) -> Option<&Provisioner> {
        self.provisioners.iter().find(|p| p.uuid() == uuid)
    }

    pub fn contains_provisioner(&self, uuid: Uuid) -> bool {
        self.provisioner(uuid).is_some()
    }

    pub fn is_local_provisioner(&self, uuid: Uuid) -> bool {
        self.local_provisioner().map_or(false, |p| p.uuid() == uuid)
    }

    /// A node for the provisioner knowing every key, with the primary element
    fn provisioner_node(&self, provisioner: &Provisioner, address: Address) -> Node {
        let mut node = Node::for_provisioner(provisioner, address);
        node.set_network_keys(self.network_keys.iter().map(|k| k.index()).collect());
        node.set_application_keys(self.application_keys.iter().map(|k| k.index()).collect());
        node.add_element(Element::primary());
        node
    }

    // ------------------------------------------------------------------------
    // Add
    // ------------------------------------------------------------------------

    /// Add a provisioner with a node at the first free address of its ranges
    pub fn add_provisioner(&mut self, provisioner: Provisioner) -> Result<()> {
        let address = self
            .next_available_unicast_address(Address::MIN_UNICAST, 1, &provisioner)
            .ok_or(ConflictError::NoAddressAvailable)?;
        self.add_provisioner_with_address(provisioner, Some(address))
    }

    /// Add a provisioner
    ///
    /// With an address, a node is created for the provisioner. Without one
    /// the provisioner cannot configure nodes until an address is assigned.
    /// Adding a provisioner that is already in the network does nothing.
    pub fn add_provisioner_with_address(&mut self, provisioner: Provisioner, address: Option<Address>) -> Result<()> {
        if !provisioner.is_valid() {
            return Err(MeshError::invalid_range());
        }
        if self
            .provisioners
            .iter()
            .filter(|p| p.uuid() != provisioner.uuid())
            .any(|p| p.has_overlapping_ranges(&provisioner))
        {
            return Err(ConflictError::OverlappingProvisionerRanges.into());
        }
        if let Some(address) = address {
            if !provisioner.allocated_unicast_range().contains_value(address.value()) {
                return Err(ValidationError::AddressNotInAllocatedRange { address }.into());
            }
            if self.nodes.iter().any(|n| n.contains_element_with_address(address)) {
                return Err(MeshError::address_not_available(address));
            }
        }
        if self.contains_provisioner(provisioner.uuid()) {
            return Ok(());
        }
        if self.contains_node(provisioner.uuid()) {
            return Err(ConflictError::NodeAlreadyExists {
                uuid: provisioner.uuid(),
            }
            .into());
        }

        if let Some(address) = address {
            let node = self.provisioner_node(&provisioner, address);
            self.add_node(node)?;
        }
        info!("Added provisioner {}", provisioner);
        self.provisioners.push(provisioner);
        self.touch();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Remove
    // ------------------------------------------------------------------------

    /// Remove the provisioner at `index` together with its node
    ///
    /// The last provisioner cannot be removed.
    pub fn remove_provisioner_at(&mut self, index: usize) -> Result<Provisioner> {
        if self.provisioners.len() <= 1 {
            return Err(PolicyError::CannotRemove.into());
        }
        if index >= self.provisioners.len() {
            return Err(MeshError::not_found(format!("Provisioner at index {}", index)));
        }
        let provisioner = self.provisioners.remove(index);
        if self.contains_node(provisioner.uuid()) {
            self.remove_node(provisioner.uuid())?;
        }
        if index == 0 {
            self.refresh_local_node();
        }
        self.touch();
        info!("Removed provisioner {}", provisioner);
        Ok(provisioner)
    }

    pub fn remove_provisioner(&mut self, uuid: Uuid) -> Result<Provisioner> {
        let index = self
            .provisioners
            .iter()
            .position(|p| p.uuid() == uuid)
            .ok_or(ConflictError::ProvisionerNotInNetwork { uuid })?;
        self.remove_provisioner_at(index)
    }

    /// Remove the provisioner's node; it can no longer configure nodes
    pub fn disable_configuration_capabilities(&mut self, uuid: Uuid) -> Result<()> {
        if !self.contains_provisioner(uuid) {
            return Err(ConflictError::ProvisionerNotInNetwork { uuid }.into());
        }
        if self.contains_node(uuid) {
            self.remove_node(uuid)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Order
    // ------------------------------------------------------------------------

    /// Move a provisioner to another position
    ///
    /// When the local provisioner changes, the composition data of the old
    /// local node is cleared and the new local node learns every key.
    pub fn move_provisioner(&mut self, from: usize, to: usize) -> Result<()> {
        let count = self.provisioners.len();
        if from >= count || to > count {
            return Err(MeshError::not_found(format!("Provisioner at index {}", from.max(to))));
        }
        if from == to {
            return Ok(());
        }
        let old_local = self.local_provisioner().map(|p| p.uuid());
        let provisioner = self.provisioners.remove(from);
        let to = if to > from + 1 { to - 1 } else { to };
        self.provisioners.insert(to.min(self.provisioners.len()), provisioner);

        if from == 0 || to == 0 {
            if let Some(uuid) = old_local {
                if let Some(node) = self.nodes.iter_mut().find(|n| n.uuid() == uuid) {
                    node.company_identifier = None;
                    node.product_identifier = None;
                    node.version_identifier = None;
                    node.default_ttl = None;
                    node.set_elements(vec![Element::primary()]);
                }
            }
            self.refresh_local_node();
        }
        self.touch();
        debug!("Moved provisioner from {} to {}", from, to);
        Ok(())
    }

    /// Make the provisioner the local one, adding it first if needed
    pub fn set_local_provisioner(&mut self, provisioner: Provisioner) -> Result<()> {
        let uuid = provisioner.uuid();
        if !self.contains_provisioner(uuid) {
            self.add_provisioner(provisioner)?;
        }
        let from = self
            .provisioners
            .iter()
            .position(|p| p.uuid() == uuid)
            .ok_or(ConflictError::ProvisionerNotInNetwork { uuid })?;
        self.move_provisioner(from, 0)
    }

    /// The local node knows every key by definition
    fn refresh_local_node(&mut self) {
        let network_keys = self.network_keys.iter().map(|k| k.index()).collect();
        let application_keys = self.application_keys.iter().map(|k| k.index()).collect();
        if let Some(node) = self.local_node_mut() {
            node.set_network_keys(network_keys);
            node.set_application_keys(application_keys);
            node.product_identifier = None;
            node.version_identifier = None;
            node.default_ttl = None;
            node.minimum_number_of_replay_protection_list = Some(Address::MAX_UNICAST.value());
        }
    }

    // ------------------------------------------------------------------------
    // Modify
    // ------------------------------------------------------------------------

    /// Set the unicast address of the provisioner's node, creating the node
    /// if the provisioner has none
    pub fn assign_unicast_address(&mut self, address: Address, uuid: Uuid) -> Result<()> {
        let provisioner = self
            .provisioner(uuid)
            .ok_or(ConflictError::ProvisionerNotInNetwork { uuid })?;
        let is_new = !self.contains_node(uuid);
        let node = match self.node(uuid) {
            Some(node) => node.clone(),
            None => self.provisioner_node(provisioner, address),
        };

        let range = AddressRange::from_address(address, node.element_count());
        if !provisioner.has_allocated_address_range(&range) {
            return Err(ValidationError::AddressNotInAllocatedRange { address }.into());
        }
        if !self.is_address_available_for(address, &node) {
            return Err(MeshError::address_not_available(address));
        }

        if is_new {
            self.add_node(node)?;
        } else {
            self.with_node_mut(uuid, |node| node.set_primary_unicast_address(address))?;
        }
        info!("Assigned {} to provisioner {}", address, uuid);
        Ok(())
    }

    /// Rename a provisioner and its node
    pub fn rename_provisioner<T: Into<String>>(&mut self, uuid: Uuid, name: T) -> Result<()> {
        let name = name.into();
        let provisioner = self
            .provisioners
            .iter_mut()
            .find(|p| p.uuid() == uuid)
            .ok_or(ConflictError::ProvisionerNotInNetwork { uuid })?;
        provisioner.name = name.clone();
        if let Some(node) = self.nodes.iter_mut().find(|n| n.uuid() == uuid) {
            node.name = Some(name);
        }
        self.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;

    fn unicast(low: u16, high: u16) -> AddressRange {
        AddressRange::new(Address::new(low), Address::new(high))
    }

    fn provisioner(name: &str, low: u16, high: u16) -> Provisioner {
        Provisioner::with_ranges(name, &[unicast(low, high)], &[], &[])
    }

    #[test]
    fn test_overlapping_provisioners() {
        let mut network = MeshNetwork::new("Test");
        network.add_provisioner(provisioner("P0", 0x0001, 0x00FF)).unwrap();
        network.add_provisioner(provisioner("P1", 0x0100, 0x01FF)).unwrap();

        let err = network.add_provisioner(provisioner("P2", 0x0080, 0x0120)).unwrap_err();
        assert!(matches!(err, MeshError::Conflict(ConflictError::OverlappingProvisionerRanges)));
        assert_eq!(network.provisioners().len(), 2);
        assert_eq!(network.nodes().len(), 2);
        assert_eq!(network.nodes()[1].primary_unicast_address(), Address::new(0x0100));
    }

    #[test]
    fn test_add_provisioner_checks() {
        let mut network = MeshNetwork::new("Test");
        let invalid = Provisioner::with_ranges("Invalid", &[AddressRange::ALL_GROUP], &[], &[]);
        assert!(network.add_provisioner(invalid).unwrap_err().is_validation());

        let err = network
            .add_provisioner_with_address(provisioner("P0", 0x0001, 0x00FF), Some(Address::new(0x0100)))
            .unwrap_err();
        assert!(matches!(
            err,
            MeshError::Validation(ValidationError::AddressNotInAllocatedRange { .. })
        ));

        let node = Node::new("Light", Address::new(0x0005), 1);
        network.add_node(node).unwrap();
        let err = network
            .add_provisioner_with_address(provisioner("P0", 0x0001, 0x00FF), Some(Address::new(0x0005)))
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(network.provisioners().is_empty());

        // Without an address the provisioner has no node
        let p = provisioner("P0", 0x0001, 0x00FF);
        let uuid = p.uuid();
        network.add_provisioner_with_address(p.clone(), None).unwrap();
        assert!(network.node_for_provisioner(uuid).is_none());
        network.add_provisioner_with_address(p, None).unwrap();
        assert_eq!(network.provisioners().len(), 1);
    }

    #[test]
    fn test_provisioner_node_knows_all_keys() {
        let mut network = MeshNetwork::create("Test", "Phone", &NetworkConfig::testing()).unwrap();
        network.add_network_key(None, None, "Second").unwrap();
        network.add_application_key(None, None, "App").unwrap();

        let p = provisioner("Tablet", 0x0100, 0x01FF);
        let uuid = p.uuid();
        network.add_provisioner(p).unwrap();
        let node = network.node_for_provisioner(uuid).unwrap();
        assert!(node.knows_network_key(1));
        assert!(node.knows_application_key(0));
        assert_eq!(node.element_count(), 1);
        assert!(node.is_config_complete);
    }

    #[test]
    fn test_last_provisioner_cannot_be_removed() {
        let mut network = MeshNetwork::create("Test", "Phone", &NetworkConfig::testing()).unwrap();
        let err = network.remove_provisioner_at(0).unwrap_err();
        assert!(matches!(err, MeshError::Policy(PolicyError::CannotRemove)));

        let p = provisioner("Tablet", 0x0100, 0x01FF);
        let uuid = p.uuid();
        network.add_provisioner(p).unwrap();
        let removed = network.remove_provisioner(uuid).unwrap();
        assert_eq!(removed.name, "Tablet");
        assert!(network.node(uuid).is_none());
        assert_eq!(network.provisioners().len(), 1);
    }

    #[test]
    fn test_change_local_provisioner() {
        let mut network = MeshNetwork::create("Test", "Phone", &NetworkConfig::testing()).unwrap();
        let phone = network.provisioners()[0].uuid();
        let tablet = provisioner("Tablet", 0x0100, 0x01FF);
        let tablet_uuid = tablet.uuid();
        network.add_provisioner(tablet.clone()).unwrap();
        network.add_application_key(None, None, "App").unwrap();
        assert!(!network.node(tablet_uuid).unwrap().knows_application_key(0));

        network.set_local_provisioner(tablet).unwrap();
        assert!(network.is_local_provisioner(tablet_uuid));
        assert!(network.node(tablet_uuid).unwrap().knows_application_key(0));
        assert_eq!(network.node(phone).unwrap().default_ttl(), None);

        network.move_provisioner(1, 0).unwrap();
        assert!(network.is_local_provisioner(phone));
        assert!(network.move_provisioner(5, 0).is_err());
    }

    #[test]
    fn test_assign_unicast_address() {
        let mut network = MeshNetwork::create("Test", "Phone", &NetworkConfig::testing()).unwrap();
        let phone = network.provisioners()[0].uuid();
        network.add_node(Node::new("Light", Address::new(0x0010), 1)).unwrap();

        network.assign_unicast_address(Address::new(0x0020), phone).unwrap();
        assert_eq!(network.node(phone).unwrap().primary_unicast_address(), Address::new(0x0020));

        let err = network.assign_unicast_address(Address::new(0x0010), phone).unwrap_err();
        assert!(err.is_conflict());
        let err = network.assign_unicast_address(Address::new(0x0200), phone).unwrap_err();
        assert!(err.is_validation());
        let err = network.assign_unicast_address(Address::new(0x0030), Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, MeshError::Conflict(ConflictError::ProvisionerNotInNetwork { .. })));

        network.disable_configuration_capabilities(phone).unwrap();
        assert!(network.node(phone).is_none());
        network.assign_unicast_address(Address::new(0x0040), phone).unwrap();
        assert_eq!(network.node(phone).unwrap().primary_unicast_address(), Address::new(0x0040));
    }

    #[test]
    fn test_rename_provisioner() {
        let mut network = MeshNetwork::create("Test", "Phone", &NetworkConfig::testing()).unwrap();
        let uuid = network.provisioners()[0].uuid();
        network.rename_provisioner(uuid, "Laptop").unwrap();
        assert_eq!(network.provisioners()[0].name, "Laptop");
        assert_eq!(network.node(uuid).unwrap().name.as_deref(), Some("Laptop"));
        assert!(network.rename_provisioner(Uuid::new_v4(), "Nobody").is_err());
    }
}
