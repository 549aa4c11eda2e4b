//! Provisioned nodes
//!
//! A node owns its elements and the references to the keys it knows. Keys
//! themselves live in the network; cascades that need them take the
//! network's key list as an argument.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::Address;
use crate::element::{Element, Location};
use crate::errors::{ConflictError, MeshError, ValidationError};
use crate::heartbeat::{HeartbeatPublication, HeartbeatSubscription};
use crate::key::{random_key, ApplicationKey, Key, KeyIndex, KeyRefreshPhase, NetworkKey, Security};
use crate::model::Model;
use crate::provisioner::Provisioner;
use crate::publish::MAX_TTL;
use crate::range::{AddressRange, RangeObject};
use crate::serde_hex::{option_key_hex, option_u16_hex, uuid_hex};
use crate::Result;

mod composition;
mod features;

pub use composition::CompositionDataPage0;
pub use features::{NodeFeature, NodeFeatureState, NodeFeatures, NodeFeaturesState};

// ----------------------------------------------------------------------------
// Node Key
// ----------------------------------------------------------------------------

/// Reference from a node to a network or application key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub index: KeyIndex,
    /// Set once the node received the new key during key refresh
    pub updated: bool,
}

impl NodeKey {
    pub fn new(index: KeyIndex) -> Self {
        Self { index, updated: false }
    }
}

fn insert_sorted(keys: &mut Vec<NodeKey>, key: NodeKey) -> bool {
    match keys.binary_search_by_key(&key.index, |k| k.index) {
        Ok(_) => false,
        Err(position) => {
            keys.insert(position, key);
            true
        }
    }
}

fn sorted_keys(mut indexes: Vec<KeyIndex>) -> Vec<NodeKey> {
    indexes.sort_unstable();
    indexes.dedup();
    indexes.into_iter().map(NodeKey::new).collect()
}

// ----------------------------------------------------------------------------
// Transmit Parameters
// ----------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct TransmitRecord {
    count: u8,
    interval: u16,
}

/// Network transmit or relay retransmit parameters
///
/// `count` is the number of transmissions (1-8), `interval` the delay between
/// them in milliseconds (10-320, in 10 ms steps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "TransmitRecord")]
pub struct Transmit {
    count: u8,
    interval: u16,
}

pub type NetworkTransmit = Transmit;
pub type RelayRetransmit = Transmit;

impl Transmit {
    pub fn new(count: u8, interval: u16) -> Result<Self> {
        if !(1..=8).contains(&count) || !(10..=320).contains(&interval) || interval % 10 != 0 {
            return Err(ValidationError::InvalidRetransmit {
                reason: format!("{} transmissions every {} ms", count, interval),
            }
            .into());
        }
        Ok(Self { count, interval })
    }

    /// From the 3-bit count and 5-bit interval step fields of a config message
    pub fn from_steps(count_field: u8, interval_steps: u8) -> Self {
        Self {
            count: (count_field & 0x07) + 1,
            interval: (u16::from(interval_steps & 0x1F) + 1) * 10,
        }
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn interval(&self) -> u16 {
        self.interval
    }

    pub fn steps(&self) -> u8 {
        (self.interval / 10 - 1) as u8
    }

    /// Decode a stored value; zero values mean "not set"
    ///
    /// Some exporters wrote the step count instead of milliseconds. Such values
    /// (not a multiple of 10, at most 32) are converted.
    fn from_record(record: TransmitRecord) -> Result<Option<Self>> {
        if record.count == 0 || record.interval == 0 {
            return Ok(None);
        }
        let interval = if record.interval % 10 != 0 && record.interval <= 32 {
            record.interval * 10
        } else {
            record.interval
        };
        Self::new(record.count, interval).map(Some)
    }
}

impl From<Transmit> for TransmitRecord {
    fn from(transmit: Transmit) -> Self {
        Self {
            count: transmit.count,
            interval: transmit.interval,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration State
// ----------------------------------------------------------------------------

/// How far the configuration of a node has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigurationState {
    /// Provisioned, composition data not received
    Stub,
    CompositionDataReceived,
    /// Default TTL has been read
    TtlKnown,
    ConfigComplete,
}

// ----------------------------------------------------------------------------
// Node
// ----------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRecord {
    #[serde(rename = "UUID", with = "uuid_hex")]
    uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    unicast_address: Address,
    #[serde(default, with = "option_key_hex", skip_serializing_if = "Option::is_none")]
    device_key: Option<[u8; 16]>,
    security: Security,
    net_keys: Vec<NodeKey>,
    app_keys: Vec<NodeKey>,
    config_complete: bool,
    #[serde(default, with = "option_u16_hex", skip_serializing_if = "Option::is_none")]
    cid: Option<u16>,
    #[serde(default, with = "option_u16_hex", skip_serializing_if = "Option::is_none")]
    pid: Option<u16>,
    #[serde(default, with = "option_u16_hex", skip_serializing_if = "Option::is_none")]
    vid: Option<u16>,
    #[serde(default, with = "option_u16_hex", skip_serializing_if = "Option::is_none")]
    crpl: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<NodeFeaturesState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secure_network_beacon: Option<bool>,
    #[serde(default, rename = "defaultTTL", skip_serializing_if = "Option::is_none")]
    default_ttl: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    network_transmit: Option<TransmitRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    relay_retransmit: Option<TransmitRecord>,
    elements: Vec<Element>,
    #[serde(default, alias = "blacklisted")]
    excluded: bool,
    #[serde(default, rename = "heartbeatPub", skip_serializing_if = "Option::is_none")]
    heartbeat_publication: Option<HeartbeatPublication>,
    #[serde(default, rename = "heartbeatSub", skip_serializing_if = "Option::is_none")]
    heartbeat_subscription: Option<HeartbeatSubscription>,
}

/// A provisioned device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NodeRecord", into = "NodeRecord")]
pub struct Node {
    pub(crate) uuid: Uuid,
    pub name: Option<String>,
    pub(crate) primary_unicast_address: Address,
    pub(crate) device_key: Option<[u8; 16]>,
    pub(crate) security: Security,
    pub(crate) net_keys: Vec<NodeKey>,
    pub(crate) app_keys: Vec<NodeKey>,
    pub is_config_complete: bool,
    pub(crate) company_identifier: Option<u16>,
    pub(crate) product_identifier: Option<u16>,
    pub(crate) version_identifier: Option<u16>,
    pub(crate) minimum_number_of_replay_protection_list: Option<u16>,
    pub(crate) features: Option<NodeFeaturesState>,
    pub secure_network_beacon: Option<bool>,
    pub(crate) default_ttl: Option<u8>,
    pub(crate) network_transmit: Option<NetworkTransmit>,
    pub(crate) relay_retransmit: Option<RelayRetransmit>,
    pub(crate) elements: Vec<Element>,
    pub is_excluded: bool,
    pub(crate) heartbeat_publication: Option<HeartbeatPublication>,
    pub(crate) heartbeat_subscription: Option<HeartbeatSubscription>,
}

impl Node {
    fn blank(uuid: Uuid, name: Option<String>, address: Address, device_key: [u8; 16], security: Security) -> Self {
        Self {
            uuid,
            name,
            primary_unicast_address: address,
            device_key: Some(device_key),
            security,
            net_keys: Vec::new(),
            app_keys: Vec::new(),
            is_config_complete: false,
            company_identifier: None,
            product_identifier: None,
            version_identifier: None,
            minimum_number_of_replay_protection_list: None,
            features: None,
            secure_network_beacon: None,
            default_ttl: None,
            network_transmit: None,
            relay_retransmit: None,
            elements: Vec::new(),
            is_excluded: false,
            heartbeat_publication: None,
            heartbeat_subscription: None,
        }
    }

    /// A node with `element_count` empty elements, knowing the primary network key
    pub fn new<T: Into<String>>(name: T, address: Address, element_count: u8) -> Self {
        let mut node = Self::blank(Uuid::new_v4(), Some(name.into()), address, random_key(), Security::Secure);
        node.net_keys.push(NodeKey::new(0));
        for _ in 0..element_count {
            node.add_element(Element::empty(Location::UNKNOWN));
        }
        node
    }

    /// Stub for a device that has just been provisioned
    ///
    /// The elements are placeholders reserving addresses until the composition
    /// data is received.
    pub fn for_provisioning(
        uuid: Uuid,
        name: Option<String>,
        address: Address,
        element_count: u8,
        device_key: [u8; 16],
        network_key: &NetworkKey,
        security: Security,
    ) -> Self {
        let mut node = Self::blank(uuid, name, address, device_key, security);
        node.net_keys.push(NodeKey {
            index: network_key.index(),
            updated: network_key.phase() == KeyRefreshPhase::Finalizing,
        });
        for _ in 0..element_count {
            node.add_element(Element::empty(Location::UNKNOWN));
        }
        node
    }

    /// The node of a provisioner; keys and elements are added by the network
    pub fn for_provisioner(provisioner: &Provisioner, address: Address) -> Self {
        let mut node = Self::blank(
            provisioner.uuid(),
            Some(provisioner.name.clone()),
            address,
            random_key(),
            Security::Secure,
        );
        node.minimum_number_of_replay_protection_list = Some(Address::MAX_UNICAST.value());
        node.is_config_complete = true;
        node.features = Some(NodeFeaturesState::not_supported());
        node
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn device_key(&self) -> Option<&[u8; 16]> {
        self.device_key.as_ref()
    }

    pub fn security(&self) -> Security {
        self.security
    }

    // ------------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------------

    pub fn primary_unicast_address(&self) -> Address {
        self.primary_unicast_address
    }

    /// Number of elements, at least 1 for address purposes
    pub fn element_count(&self) -> u8 {
        self.elements.len().min(u8::MAX as usize) as u8
    }

    pub fn last_unicast_address(&self) -> Address {
        let count = u16::from(self.element_count().max(1));
        Address::new(self.primary_unicast_address.value().saturating_add(count - 1))
    }

    /// Addresses of all elements of the node
    pub fn unicast_range(&self) -> AddressRange {
        AddressRange::from_address(self.primary_unicast_address, self.element_count())
    }

    pub fn contains_element_with_address(&self, address: Address) -> bool {
        self.unicast_range().contains_address(address)
    }

    pub fn overlaps_addresses(&self, range: &AddressRange) -> bool {
        self.unicast_range().overlaps(range)
    }

    pub fn element_with_address(&self, address: Address) -> Option<&Element> {
        let offset = address.value().checked_sub(self.primary_unicast_address.value())?;
        self.elements.get(usize::from(offset))
    }

    pub fn element_with_address_mut(&mut self, address: Address) -> Option<&mut Element> {
        let offset = address.value().checked_sub(self.primary_unicast_address.value())?;
        self.elements.get_mut(usize::from(offset))
    }

    /// Unicast address of the element at `index`
    pub fn element_address(&self, index: u8) -> Option<Address> {
        self.elements
            .get(usize::from(index))
            .and_then(|_| self.primary_unicast_address.offset(u16::from(index)))
    }

    pub(crate) fn set_primary_unicast_address(&mut self, address: Address) {
        self.primary_unicast_address = address;
    }

    // ------------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------------

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut [Element] {
        &mut self.elements
    }

    /// Append an element, assigning the next index
    pub fn add_element(&mut self, mut element: Element) {
        element.index = self.element_count();
        self.elements.push(element);
    }

    /// Replace all elements, reindexing them
    pub fn set_elements(&mut self, elements: Vec<Element>) {
        self.elements.clear();
        for element in elements {
            self.add_element(element);
        }
    }

    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.elements.iter().flat_map(|e| e.models.iter())
    }

    pub fn models_mut(&mut self) -> impl Iterator<Item = &mut Model> {
        self.elements.iter_mut().flat_map(|e| e.models.iter_mut())
    }

    /// Apply Composition Data Page 0
    ///
    /// Elements are replaced wholesale; bindings, subscriptions and
    /// publications configured on the previous elements are discarded.
    /// Feature states are only set when not known yet.
    pub fn apply_composition_data(&mut self, page: CompositionDataPage0) {
        self.company_identifier = Some(page.company_identifier);
        self.product_identifier = Some(page.product_identifier);
        self.version_identifier = Some(page.version_identifier);
        self.minimum_number_of_replay_protection_list = Some(page.minimum_number_of_replay_protection_list);
        if self.features.is_none() {
            self.features = Some(page.features);
        }
        self.set_elements(page.elements);
    }

    // ------------------------------------------------------------------------
    // Composition Data and Configuration
    // ------------------------------------------------------------------------

    pub fn company_identifier(&self) -> Option<u16> {
        self.company_identifier
    }

    pub fn product_identifier(&self) -> Option<u16> {
        self.product_identifier
    }

    pub fn version_identifier(&self) -> Option<u16> {
        self.version_identifier
    }

    pub fn minimum_number_of_replay_protection_list(&self) -> Option<u16> {
        self.minimum_number_of_replay_protection_list
    }

    pub fn features(&self) -> Option<&NodeFeaturesState> {
        self.features.as_ref()
    }

    /// Feature states, created as all-unknown when missing
    pub fn ensure_features(&mut self) -> &mut NodeFeaturesState {
        self.features.get_or_insert_with(NodeFeaturesState::default)
    }

    pub fn default_ttl(&self) -> Option<u8> {
        self.default_ttl
    }

    /// Valid values are 0 and 2-127
    pub fn set_default_ttl(&mut self, ttl: u8) -> Result<()> {
        if ttl == 1 || ttl > MAX_TTL {
            return Err(ValidationError::InvalidTtl { ttl }.into());
        }
        self.default_ttl = Some(ttl);
        Ok(())
    }

    pub fn network_transmit(&self) -> Option<&NetworkTransmit> {
        self.network_transmit.as_ref()
    }

    pub fn set_network_transmit(&mut self, transmit: Option<NetworkTransmit>) {
        self.network_transmit = transmit;
    }

    pub fn relay_retransmit(&self) -> Option<&RelayRetransmit> {
        self.relay_retransmit.as_ref()
    }

    pub fn set_relay_retransmit(&mut self, retransmit: Option<RelayRetransmit>) {
        self.relay_retransmit = retransmit;
    }

    pub fn configuration_state(&self) -> ConfigurationState {
        if self.is_config_complete {
            ConfigurationState::ConfigComplete
        } else if self.company_identifier.is_none() {
            ConfigurationState::Stub
        } else if self.default_ttl.is_some() {
            ConfigurationState::TtlKnown
        } else {
            ConfigurationState::CompositionDataReceived
        }
    }

    // ------------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------------

    /// Known network keys, sorted by index
    pub fn network_keys(&self) -> &[NodeKey] {
        &self.net_keys
    }

    /// Known application keys, sorted by index
    pub fn application_keys(&self) -> &[NodeKey] {
        &self.app_keys
    }

    pub fn knows_network_key(&self, index: KeyIndex) -> bool {
        self.net_keys.iter().any(|k| k.index == index)
    }

    pub fn knows_application_key(&self, index: KeyIndex) -> bool {
        self.app_keys.iter().any(|k| k.index == index)
    }

    /// Returns false if the key was already known
    pub fn add_network_key(&mut self, index: KeyIndex) -> bool {
        insert_sorted(&mut self.net_keys, NodeKey::new(index))
    }

    pub fn set_network_keys(&mut self, indexes: Vec<KeyIndex>) {
        self.net_keys = sorted_keys(indexes);
    }

    /// Mark the network key as updated during key refresh
    pub fn update_network_key(&mut self, index: KeyIndex) -> bool {
        match self.net_keys.iter_mut().find(|k| k.index == index) {
            Some(key) => {
                key.updated = true;
                true
            }
            None => false,
        }
    }

    pub fn add_application_key(&mut self, index: KeyIndex) -> bool {
        insert_sorted(&mut self.app_keys, NodeKey::new(index))
    }

    pub fn set_application_keys(&mut self, indexes: Vec<KeyIndex>) {
        self.app_keys = sorted_keys(indexes);
    }

    /// Replace the application keys bound to one network key
    ///
    /// Keys bound to other network keys are kept.
    pub fn set_application_keys_for_network_key(
        &mut self,
        indexes: Vec<KeyIndex>,
        network_key: KeyIndex,
        application_keys: &[ApplicationKey],
    ) {
        let bound_elsewhere = |index: KeyIndex| {
            application_keys
                .iter()
                .find(|k| k.index() == index)
                .map_or(true, |k| k.bound_network_key() != network_key)
        };
        let mut keep: Vec<KeyIndex> = self
            .app_keys
            .iter()
            .map(|k| k.index)
            .filter(|i| bound_elsewhere(*i))
            .collect();
        keep.extend(indexes);
        self.set_application_keys(keep);
    }

    pub fn update_application_key(&mut self, index: KeyIndex) -> bool {
        match self.app_keys.iter_mut().find(|k| k.index == index) {
            Some(key) => {
                key.updated = true;
                true
            }
            None => false,
        }
    }

    /// Forget a network key
    ///
    /// Every application key bound to it is removed as well, and a heartbeat
    /// publication using it is cleared.
    pub fn remove_network_key(&mut self, index: KeyIndex, application_keys: &[ApplicationKey]) -> bool {
        let Some(position) = self.net_keys.iter().position(|k| k.index == index) else {
            return false;
        };
        self.net_keys.remove(position);
        for app_key in application_keys.iter().filter(|k| k.bound_network_key() == index) {
            self.remove_application_key(app_key.index());
        }
        if self.heartbeat_publication.as_ref().map_or(false, |p| p.index() == index) {
            self.heartbeat_publication = None;
        }
        true
    }

    /// Forget an application key and unbind it from every model
    pub fn remove_application_key(&mut self, index: KeyIndex) -> bool {
        let Some(position) = self.app_keys.iter().position(|k| k.index == index) else {
            return false;
        };
        self.app_keys.remove(position);
        for model in self.models_mut() {
            model.unbind(index);
        }
        true
    }

    // ------------------------------------------------------------------------
    // Heartbeats
    // ------------------------------------------------------------------------

    pub fn heartbeat_publication(&self) -> Option<&HeartbeatPublication> {
        self.heartbeat_publication.as_ref()
    }

    /// Fails if the node does not know the network key of the publication
    pub fn set_heartbeat_publication(&mut self, publication: Option<HeartbeatPublication>) -> Result<()> {
        if let Some(publication) = &publication {
            if !self.knows_network_key(publication.index()) {
                return Err(ConflictError::InvalidKey {
                    index: publication.index(),
                }
                .into());
            }
        }
        self.heartbeat_publication = publication;
        Ok(())
    }

    pub fn heartbeat_subscription(&self) -> Option<&HeartbeatSubscription> {
        self.heartbeat_subscription.as_ref()
    }

    pub fn heartbeat_subscription_mut(&mut self) -> Option<&mut HeartbeatSubscription> {
        self.heartbeat_subscription.as_mut()
    }

    pub fn set_heartbeat_subscription(&mut self, subscription: Option<HeartbeatSubscription>) {
        self.heartbeat_subscription = subscription;
    }
}

impl TryFrom<NodeRecord> for Node {
    type Error = MeshError;

    fn try_from(record: NodeRecord) -> Result<Self> {
        if !record.unicast_address.is_unicast() {
            return Err(MeshError::decode(format!(
                "{} is not a unicast address",
                record.unicast_address
            )));
        }
        if let Some(ttl) = record.default_ttl.filter(|ttl| *ttl > MAX_TTL) {
            return Err(ValidationError::InvalidTtl { ttl }.into());
        }
        let network_transmit = record.network_transmit.map(Transmit::from_record).transpose()?.flatten();
        let relay_retransmit = record.relay_retransmit.map(Transmit::from_record).transpose()?.flatten();

        let mut node = Self {
            uuid: record.uuid,
            name: record.name,
            primary_unicast_address: record.unicast_address,
            device_key: record.device_key,
            security: record.security,
            net_keys: record.net_keys,
            app_keys: record.app_keys,
            is_config_complete: record.config_complete,
            company_identifier: record.cid,
            product_identifier: record.pid,
            version_identifier: record.vid,
            minimum_number_of_replay_protection_list: record.crpl,
            features: record.features,
            secure_network_beacon: record.secure_network_beacon,
            default_ttl: record.default_ttl,
            network_transmit,
            relay_retransmit,
            elements: Vec::new(),
            is_excluded: record.excluded,
            heartbeat_publication: None,
            heartbeat_subscription: record.heartbeat_subscription,
        };
        node.net_keys.sort_by_key(|k| k.index);
        node.app_keys.sort_by_key(|k| k.index);
        node.elements = record.elements;
        node.set_heartbeat_publication(record.heartbeat_publication)
            .map_err(|_| {
                MeshError::decode(format!(
                    "Heartbeat publication uses a network key unknown to node 0x{}",
                    node.primary_unicast_address
                ))
            })?;
        Ok(node)
    }
}

impl From<Node> for NodeRecord {
    fn from(node: Node) -> Self {
        Self {
            uuid: node.uuid,
            name: node.name,
            unicast_address: node.primary_unicast_address,
            device_key: node.device_key,
            security: node.security,
            net_keys: node.net_keys,
            app_keys: node.app_keys,
            config_complete: node.is_config_complete,
            cid: node.company_identifier,
            pid: node.product_identifier,
            vid: node.version_identifier,
            crpl: node.minimum_number_of_replay_protection_list,
            features: node.features,
            secure_network_beacon: node.secure_network_beacon,
            default_ttl: node.default_ttl,
            network_transmit: node.network_transmit.map(Into::into),
            relay_retransmit: node.relay_retransmit.map(Into::into),
            elements: node.elements,
            excluded: node.is_excluded,
            heartbeat_publication: node.heartbeat_publication,
            heartbeat_subscription: node.heartbeat_subscription,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (0x{})",
            self.name.as_deref().unwrap_or("Unknown Device"),
            self.primary_unicast_address
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::HeartbeatPublication;
    use crate::model::ids;
    use crate::publish::Publish;
    use crate::address::MeshAddress;

    fn node_with_app_keys() -> (Node, Vec<ApplicationKey>) {
        let primary = NetworkKey::new("Primary", 0, [1u8; 16]).unwrap();
        let secondary = NetworkKey::new("Secondary", 1, [2u8; 16]).unwrap();
        let app_keys = vec![
            ApplicationKey::new("App 0", 0, [3u8; 16], &primary).unwrap(),
            ApplicationKey::new("App 1", 1, [4u8; 16], &secondary).unwrap(),
            ApplicationKey::new("App 2", 2, [5u8; 16], &secondary).unwrap(),
        ];

        let mut node = Node::new("Light", Address::new(0x0010), 0);
        node.add_network_key(1);
        for app_key in &app_keys {
            node.add_application_key(app_key.index());
        }
        let mut element = Element::empty(Location::UNKNOWN);
        let mut model = Model::sig(ids::GENERIC_ON_OFF_SERVER);
        model.bind(0).unwrap();
        model.bind(1).unwrap();
        model.set_publication(Publish::to(MeshAddress::new(Address::new(0xC000)), 1));
        element.add_model(model);
        node.add_element(element);
        (node, app_keys)
    }

    #[test]
    fn test_element_indexes_and_addresses() {
        let mut node = Node::new("Node", Address::new(0x0100), 3);
        assert_eq!(node.element_count(), 3);
        assert_eq!(node.last_unicast_address(), Address::new(0x0102));
        assert_eq!(node.elements()[2].index(), 2);
        assert!(node.contains_element_with_address(Address::new(0x0102)));
        assert!(!node.contains_element_with_address(Address::new(0x0103)));
        assert_eq!(node.element_with_address(Address::new(0x0101)).map(|e| e.index()), Some(1));
        assert!(node.element_with_address(Address::new(0x00FF)).is_none());

        node.set_elements(vec![Element::primary()]);
        assert_eq!(node.element_count(), 1);
        assert_eq!(node.elements()[0].index(), 0);
    }

    #[test]
    fn test_node_without_elements_uses_one_address() {
        let node = Node::new("Node", Address::new(0x0005), 0);
        assert_eq!(node.last_unicast_address(), Address::new(0x0005));
        assert_eq!(node.unicast_range().count(), 1);
    }

    #[test]
    fn test_remove_network_key_cascade() {
        let (mut node, app_keys) = node_with_app_keys();
        node.set_heartbeat_publication(Some(
            HeartbeatPublication::new(Address::new(0xC000), 4, 5, 1, NodeFeatures::NONE).unwrap(),
        ))
        .unwrap();

        assert!(node.remove_network_key(1, &app_keys));
        assert!(!node.knows_network_key(1));
        assert!(node.knows_application_key(0));
        assert!(!node.knows_application_key(1));
        assert!(!node.knows_application_key(2));
        assert!(node.heartbeat_publication().is_none());

        let model = &node.elements()[0].models()[0];
        assert_eq!(model.bound_keys(), &[0]);
        assert!(model.publication().is_none());
    }

    #[test]
    fn test_remove_application_key_unbinds_models() {
        let (mut node, _) = node_with_app_keys();
        assert!(node.remove_application_key(0));
        assert!(!node.remove_application_key(0));
        let model = &node.elements()[0].models()[0];
        assert_eq!(model.bound_keys(), &[1]);
        assert!(model.publication().is_some());
    }

    #[test]
    fn test_key_lists_stay_sorted() {
        let mut node = Node::new("Node", Address::new(0x0001), 1);
        node.add_network_key(5);
        node.add_network_key(2);
        assert!(!node.add_network_key(2));
        let indexes: Vec<KeyIndex> = node.network_keys().iter().map(|k| k.index).collect();
        assert_eq!(indexes, vec![0, 2, 5]);

        assert!(node.update_network_key(2));
        assert!(node.network_keys()[1].updated);
        assert!(!node.update_application_key(2));
    }

    #[test]
    fn test_set_application_keys_for_network_key() {
        let (mut node, app_keys) = node_with_app_keys();
        node.set_application_keys_for_network_key(vec![2], 1, &app_keys);
        let indexes: Vec<KeyIndex> = node.application_keys().iter().map(|k| k.index).collect();
        assert_eq!(indexes, vec![0, 2]);
    }

    #[test]
    fn test_heartbeat_publication_requires_known_key() {
        let mut node = Node::new("Node", Address::new(0x0001), 1);
        let publication = HeartbeatPublication::new(Address::new(0xC000), 4, 5, 3, NodeFeatures::NONE).unwrap();
        assert!(node.set_heartbeat_publication(Some(publication)).is_err());
    }

    #[test]
    fn test_configuration_state() {
        let mut node = Node::new("Node", Address::new(0x0001), 2);
        assert_eq!(node.configuration_state(), ConfigurationState::Stub);

        let page = CompositionDataPage0 {
            company_identifier: 0x0059,
            product_identifier: 1,
            version_identifier: 1,
            minimum_number_of_replay_protection_list: 8,
            features: NodeFeaturesState::from_mask(0x0001),
            elements: vec![Element::primary()],
        };
        node.apply_composition_data(page);
        assert_eq!(node.configuration_state(), ConfigurationState::CompositionDataReceived);
        assert_eq!(node.element_count(), 1);

        node.set_default_ttl(5).unwrap();
        assert_eq!(node.configuration_state(), ConfigurationState::TtlKnown);
        assert!(node.set_default_ttl(1).is_err());

        node.is_config_complete = true;
        assert_eq!(node.configuration_state(), ConfigurationState::ConfigComplete);
    }

    #[test]
    fn test_composition_data_keeps_known_features() {
        let mut node = Node::new("Node", Address::new(0x0001), 1);
        node.ensure_features().relay = Some(NodeFeatureState::Enabled);
        let page = CompositionDataPage0 {
            company_identifier: 1,
            product_identifier: 2,
            version_identifier: 3,
            minimum_number_of_replay_protection_list: 4,
            features: NodeFeaturesState::not_supported(),
            elements: Vec::new(),
        };
        node.apply_composition_data(page);
        assert_eq!(node.features().unwrap().relay, Some(NodeFeatureState::Enabled));
    }

    #[test]
    fn test_transmit() {
        let transmit = Transmit::from_steps(2, 9);
        assert_eq!(transmit.count(), 3);
        assert_eq!(transmit.interval(), 100);
        assert_eq!(transmit.steps(), 9);
        assert!(Transmit::new(0, 100).is_err());
        assert!(Transmit::new(1, 330).is_err());
        assert!(Transmit::new(1, 15).is_err());
    }

    #[test]
    fn test_node_json_legacy_fields() {
        let json = r#"{
            "UUID": "70cf7c97-32a3-45b6-9149-4810d2e9cbf4",
            "unicastAddress": "0004",
            "deviceKey": "3C5D6E2B7E4F1A2B3C4D5E6F708192A3",
            "security": "high",
            "netKeys": [{"index": 1, "updated": false}, {"index": 0, "updated": true}],
            "appKeys": [],
            "configComplete": false,
            "name": "Sensor",
            "cid": "0059",
            "defaultTTL": 5,
            "networkTransmit": {"count": 2, "interval": 3},
            "relayRetransmit": {"count": 0, "interval": 0},
            "elements": [],
            "blacklisted": true
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.security(), Security::Secure);
        assert!(node.is_excluded);
        assert_eq!(node.network_keys()[0].index, 0);
        assert_eq!(node.company_identifier(), Some(0x0059));
        assert_eq!(node.network_transmit().map(|t| t.interval()), Some(30));
        assert!(node.relay_retransmit().is_none());

        let encoded = serde_json::to_value(&node).unwrap();
        assert_eq!(encoded["UUID"], "70CF7C9732A345B691494810D2E9CBF4");
        assert_eq!(encoded["excluded"], true);
        assert_eq!(encoded["security"], "secure");
        assert!(encoded.get("blacklisted").is_none());
    }

    #[test]
    fn test_node_json_rejects_group_address() {
        let json = r#"{
            "UUID": "70CF7C9732A345B691494810D2E9CBF4",
            "unicastAddress": "C000",
            "security": "secure",
            "netKeys": [], "appKeys": [], "configComplete": true, "elements": []
        }"#;
        assert!(serde_json::from_str::<Node>(json).is_err());
    }
}
