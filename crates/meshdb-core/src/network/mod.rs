//! The mesh network aggregate
//!
//! `MeshNetwork` owns every entity of the network database and enforces the
//! invariants that span more than one of them. Every mutating operation
//! validates completely before changing anything and refreshes the timestamp
//! on success.
//!
//! Operations are grouped by the entity they manage:
//! - `keys`: network and application keys
//! - `provisioners`: provisioners and their nodes
//! - `nodes`: provisioned nodes
//! - `addresses`: unicast and group address availability
//! - `ranges`: range allocation across provisioners
//! - `groups`, `scenes`: groups and scenes
//! - `export`: partial exports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::NetworkConfig;
use crate::errors::MeshError;
use crate::exclusion::{IvIndex, NetworkExclusions, DEFAULT_EXCLUSION_WINDOW};
use crate::group::Group;
use crate::key::{random_key, ApplicationKey, Key, NetworkKey};
use crate::node::Node;
use crate::provisioner::Provisioner;
use crate::scene::Scene;
use crate::serde_hex::uuid_hex;
use crate::Result;

mod addresses;
mod export;
mod groups;
mod keys;
mod nodes;
mod provisioners;
mod ranges;
mod scenes;

pub use export::{ExportConfiguration, NodeSelection, ProvisionerSelection, Selection};

pub const SCHEMA: &str = "http://json-schema.org/draft-04/schema#";
pub const SCHEMA_ID: &str = "https://www.bluetooth.com/specifications/specs/mesh-cdb-1-0-1-schema.json#";
pub const SCHEMA_VERSION: &str = "1.0.1";

/// A Bluetooth Mesh network configuration database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshNetwork {
    uuid: Uuid,
    name: String,
    timestamp: DateTime<Utc>,
    partial: bool,
    provisioners: Vec<Provisioner>,
    network_keys: Vec<NetworkKey>,
    application_keys: Vec<ApplicationKey>,
    nodes: Vec<Node>,
    groups: Vec<Group>,
    scenes: Vec<Scene>,
    network_exclusions: NetworkExclusions,
    iv_index: IvIndex,
    exclusion_window: u32,
}

impl MeshNetwork {
    /// An empty network with a random primary network key
    ///
    /// The network has no provisioner yet; add one before exporting it.
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self::with_primary_key(name, NetworkKey::primary())
    }

    fn with_primary_key<T: Into<String>>(name: T, primary_key: NetworkKey) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            timestamp: Utc::now(),
            partial: false,
            provisioners: Vec::new(),
            network_keys: vec![primary_key],
            application_keys: Vec::new(),
            nodes: Vec::new(),
            groups: Vec::new(),
            scenes: Vec::new(),
            network_exclusions: NetworkExclusions::new(),
            iv_index: IvIndex::default(),
            exclusion_window: DEFAULT_EXCLUSION_WINDOW,
        }
    }

    /// A network with a local provisioner owning the configured ranges
    pub fn create<N: Into<String>, P: Into<String>>(
        name: N,
        provisioner_name: P,
        config: &NetworkConfig,
    ) -> Result<Self> {
        config.validate()?;
        let primary_key = NetworkKey::new(config.primary_key_name.clone(), 0, random_key())?;
        let mut network = Self::with_primary_key(name, primary_key);
        network.exclusion_window = config.exclusion_window;

        let ranges = &config.provisioner;
        let provisioner = Provisioner::with_ranges(
            provisioner_name,
            &[ranges.unicast_range],
            &[ranges.group_range],
            &[ranges.scene_range],
        );
        let uuid = provisioner.uuid();
        network.add_provisioner(provisioner)?;
        network.with_node_mut(uuid, |node| node.set_default_ttl(config.default_ttl))??;

        info!("Created mesh network '{}' ({})", network.name, network.uuid);
        Ok(network)
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name<T: Into<String>>(&mut self, name: T) {
        self.name = name.into();
        self.touch();
    }

    /// Time of the last modification
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// True for exports that leave out some of the network
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn network_keys(&self) -> &[NetworkKey] {
        &self.network_keys
    }

    pub fn application_keys(&self) -> &[ApplicationKey] {
        &self.application_keys
    }

    pub fn provisioners(&self) -> &[Provisioner] {
        &self.provisioners
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn network_exclusions(&self) -> &NetworkExclusions {
        &self.network_exclusions
    }

    // ------------------------------------------------------------------------
    // IV Index
    // ------------------------------------------------------------------------

    pub fn iv_index(&self) -> IvIndex {
        self.iv_index
    }

    /// Set the current IV Index and drop exclusion lists that expired
    pub fn set_iv_index(&mut self, iv_index: IvIndex) {
        self.iv_index = iv_index;
        self.network_exclusions.clean_up(iv_index, self.exclusion_window);
        debug!("{}", iv_index);
    }

    pub fn exclusion_window(&self) -> u32 {
        self.exclusion_window
    }

    pub(crate) fn touch(&mut self) {
        self.timestamp = Utc::now();
    }

    // ------------------------------------------------------------------------
    // JSON
    // ------------------------------------------------------------------------

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MeshError::decode(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ----------------------------------------------------------------------------
// Serialization
// ----------------------------------------------------------------------------

/// `$schema`, `id` and `version` are not validated
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkRecord {
    #[serde(rename = "meshUUID", with = "uuid_hex")]
    mesh_uuid: Uuid,
    mesh_name: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    partial: bool,
    provisioners: Vec<Provisioner>,
    net_keys: Vec<NetworkKey>,
    app_keys: Vec<ApplicationKey>,
    nodes: Vec<Node>,
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    scenes: Vec<Scene>,
    #[serde(default)]
    network_exclusions: Option<NetworkExclusions>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkRecordRef<'a> {
    #[serde(rename = "$schema")]
    schema: &'static str,
    id: &'static str,
    version: &'static str,
    #[serde(rename = "meshUUID", with = "uuid_hex")]
    mesh_uuid: Uuid,
    mesh_name: &'a str,
    timestamp: &'a DateTime<Utc>,
    partial: bool,
    provisioners: &'a [Provisioner],
    net_keys: &'a [NetworkKey],
    app_keys: &'a [ApplicationKey],
    nodes: &'a [Node],
    groups: &'a [Group],
    scenes: &'a [Scene],
    #[serde(skip_serializing_if = "NetworkExclusions::is_empty")]
    network_exclusions: &'a NetworkExclusions,
}

impl Serialize for MeshNetwork {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        NetworkRecordRef {
            schema: SCHEMA,
            id: SCHEMA_ID,
            version: SCHEMA_VERSION,
            mesh_uuid: self.uuid,
            mesh_name: &self.name,
            timestamp: &self.timestamp,
            partial: self.partial,
            provisioners: &self.provisioners,
            net_keys: &self.network_keys,
            app_keys: &self.application_keys,
            nodes: &self.nodes,
            groups: &self.groups,
            scenes: &self.scenes,
            network_exclusions: &self.network_exclusions,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MeshNetwork {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let record = NetworkRecord::deserialize(deserializer)?;
        Self::try_from(record).map_err(serde::de::Error::custom)
    }
}

fn has_duplicates<T: Ord + Copy>(values: impl Iterator<Item = T>) -> bool {
    let mut values: Vec<T> = values.collect();
    let count = values.len();
    values.sort_unstable();
    values.dedup();
    values.len() != count
}

/// Every parent of `group` exists and the chain of parents ends
fn check_group_ancestry(group: &Group, groups: &[Group]) -> Result<()> {
    let mut current = group;
    for _ in 0..groups.len() {
        let Some(parent) = current.parent_address() else {
            return Ok(());
        };
        current = groups.iter().find(|g| g.address() == parent).ok_or_else(|| {
            MeshError::decode(format!(
                "Parent 0x{} of group 0x{} does not exist",
                parent.address(),
                current.address().address()
            ))
        })?;
    }
    Err(MeshError::decode(format!(
        "Group 0x{} is its own ancestor",
        group.address().address()
    )))
}

impl TryFrom<NetworkRecord> for MeshNetwork {
    type Error = MeshError;

    fn try_from(record: NetworkRecord) -> Result<Self> {
        if record.provisioners.is_empty() {
            return Err(MeshError::decode("At least one provisioner is required"));
        }
        if record.net_keys.is_empty() {
            return Err(MeshError::decode("At least one network key is required"));
        }
        if !record.partial && record.nodes.iter().any(|n| n.device_key().is_none()) {
            return Err(MeshError::decode(
                "Device key cannot be empty in a non-partial configuration",
            ));
        }
        if has_duplicates(record.net_keys.iter().map(|k| k.index())) {
            return Err(MeshError::decode("Duplicate network key index"));
        }
        if has_duplicates(record.app_keys.iter().map(|k| k.index())) {
            return Err(MeshError::decode("Duplicate application key index"));
        }
        if let Some(key) = record
            .app_keys
            .iter()
            .find(|a| !record.net_keys.iter().any(|n| n.index() == a.bound_network_key()))
        {
            return Err(MeshError::decode(format!(
                "Application key {} is bound to an unknown network key {}",
                key.index(),
                key.bound_network_key()
            )));
        }
        if has_duplicates(record.nodes.iter().map(|n| n.uuid())) {
            return Err(MeshError::decode("Duplicate node UUID"));
        }
        for (i, node) in record.nodes.iter().enumerate() {
            let range = node.unicast_range();
            if record.nodes[i + 1..].iter().any(|other| other.overlaps_addresses(&range)) {
                return Err(MeshError::decode(format!(
                    "Address 0x{} is used by more than one node",
                    node.primary_unicast_address()
                )));
            }
        }
        for (i, provisioner) in record.provisioners.iter().enumerate() {
            if record.provisioners[i + 1..]
                .iter()
                .any(|other| other.has_overlapping_ranges(provisioner))
            {
                return Err(MeshError::decode(format!(
                    "Ranges of provisioner '{}' overlap with another provisioner",
                    provisioner.name
                )));
            }
        }

        if has_duplicates(record.groups.iter().map(|g| g.address().address())) {
            return Err(MeshError::decode("Duplicate group address"));
        }
        for group in &record.groups {
            check_group_ancestry(group, &record.groups)?;
        }
        let mut network = Self {
            uuid: record.mesh_uuid,
            name: record.mesh_name,
            timestamp: record.timestamp,
            partial: record.partial,
            provisioners: record.provisioners,
            network_keys: record.net_keys,
            application_keys: record.app_keys,
            nodes: record.nodes,
            groups: record.groups,
            scenes: record.scenes,
            network_exclusions: record.network_exclusions.unwrap_or_default(),
            iv_index: IvIndex::default(),
            exclusion_window: DEFAULT_EXCLUSION_WINDOW,
        };

        // Heartbeats of the local node are not restored with the network
        if let Some(uuid) = network.local_provisioner().map(|p| p.uuid()) {
            if let Some(node) = network.nodes.iter_mut().find(|n| n.uuid() == uuid) {
                node.heartbeat_publication = None;
                node.heartbeat_subscription = None;
            }
        }
        Ok(network)
    }
}
