//! Partial exports
//!
//! A partial export shares a subset of the network with another provisioner:
//! chosen keys, provisioners, nodes, groups and scenes. Everything that
//! refers to a part left out is cut from the copy, so the result is a valid
//! network on its own. The exported network itself is never changed.

use tracing::info;
use uuid::Uuid;

use super::MeshNetwork;
use crate::address::{Address, MeshAddress, SceneNumber};
use crate::key::{Key, KeyIndex};
use crate::node::Node;
use crate::provisioner::Provisioner;
use crate::range::AddressRange;
use crate::scene::Scene;

/// Which provisioners an export contains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProvisionerSelection {
    #[default]
    All,
    /// Only this provisioner, usually with ranges prepared for the importer
    ///
    /// Nodes of every provisioner of the network are left out.
    One(Provisioner),
    /// Provisioners with the given UUIDs; nodes of the others are left out
    Selected(Vec<Uuid>),
}

/// Which nodes an export contains and whether their device keys are shared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSelection {
    All { device_keys: bool },
    Selected {
        with_device_key: Vec<Uuid>,
        without_device_key: Vec<Uuid>,
    },
}

impl Default for NodeSelection {
    fn default() -> Self {
        Self::All { device_keys: true }
    }
}

impl NodeSelection {
    fn includes(&self, uuid: Uuid) -> bool {
        match self {
            Self::All { .. } => true,
            Self::Selected {
                with_device_key,
                without_device_key,
            } => with_device_key.contains(&uuid) || without_device_key.contains(&uuid),
        }
    }

    fn keeps_device_key(&self, uuid: Uuid) -> bool {
        match self {
            Self::All { device_keys } => *device_keys,
            Self::Selected { with_device_key, .. } => with_device_key.contains(&uuid),
        }
    }
}

/// Selection of groups or scenes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection<T> {
    #[default]
    All,
    /// Only those used by the exported nodes
    Related,
    Selected(Vec<T>),
}

/// What an export should contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfiguration {
    /// Network keys to export; `None` exports all of them
    pub network_keys: Option<Vec<KeyIndex>>,
    /// Application keys to export, if bound to an exported network key
    pub application_keys: Option<Vec<KeyIndex>>,
    pub provisioners: ProvisionerSelection,
    pub nodes: NodeSelection,
    pub groups: Selection<Address>,
    pub scenes: Selection<SceneNumber>,
}

impl Default for ExportConfiguration {
    fn default() -> Self {
        Self::full()
    }
}

impl ExportConfiguration {
    /// Everything, device keys included
    pub fn full() -> Self {
        Self {
            network_keys: None,
            application_keys: None,
            provisioners: ProvisionerSelection::All,
            nodes: NodeSelection::default(),
            groups: Selection::All,
            scenes: Selection::All,
        }
    }

    /// All keys, provisioners and nodes, with only the groups and scenes
    /// the nodes use
    pub fn partial() -> Self {
        Self {
            groups: Selection::Related,
            scenes: Selection::Related,
            ..Self::full()
        }
    }

    pub fn with_network_keys(network_keys: Vec<KeyIndex>) -> Self {
        Self {
            network_keys: Some(network_keys),
            ..Self::partial()
        }
    }

    pub fn select_application_keys(mut self, application_keys: Vec<KeyIndex>) -> Self {
        self.application_keys = Some(application_keys);
        self
    }

    pub fn select_provisioners(mut self, provisioners: ProvisionerSelection) -> Self {
        self.provisioners = provisioners;
        self
    }

    pub fn select_nodes(mut self, nodes: NodeSelection) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn select_groups(mut self, groups: Selection<Address>) -> Self {
        self.groups = groups;
        self
    }

    pub fn select_scenes(mut self, scenes: Selection<SceneNumber>) -> Self {
        self.scenes = scenes;
        self
    }

    /// Keep the node selection but share no device key
    pub fn without_device_keys(mut self) -> Self {
        self.nodes = match self.nodes {
            NodeSelection::All { .. } => NodeSelection::All { device_keys: false },
            NodeSelection::Selected {
                mut with_device_key,
                mut without_device_key,
            } => {
                without_device_key.append(&mut with_device_key);
                NodeSelection::Selected {
                    with_device_key,
                    without_device_key,
                }
            }
        };
        self
    }

    pub fn is_full(&self) -> bool {
        self.network_keys.is_none()
            && self.application_keys.is_none()
            && self.provisioners == ProvisionerSelection::All
            && self.nodes == NodeSelection::default()
            && self.groups == Selection::All
            && self.scenes == Selection::All
    }

    fn exports_network_key(&self, index: KeyIndex) -> bool {
        self.network_keys.as_ref().map_or(true, |keys| keys.contains(&index))
    }

    fn exports_application_key(&self, index: KeyIndex) -> bool {
        self.application_keys.as_ref().map_or(true, |keys| keys.contains(&index))
    }
}

impl MeshNetwork {
    /// A copy of the network restricted by `config`
    ///
    /// Any configuration other than a full one marks the copy as partial.
    pub fn export_partial(&self, config: &ExportConfiguration) -> MeshNetwork {
        if config.is_full() {
            info!("Exported network '{}'", self.name);
            return self.clone();
        }
        let mut network = self.clone();
        network.partial = true;

        // Keys
        network.network_keys.retain(|k| config.exports_network_key(k.index()));
        let net_keys: Vec<KeyIndex> = network.network_keys.iter().map(|k| k.index()).collect();
        network.application_keys.retain(|k| {
            config.exports_application_key(k.index()) && net_keys.contains(&k.bound_network_key())
        });
        let app_keys: Vec<KeyIndex> = network.application_keys.iter().map(|k| k.index()).collect();

        // Provisioners
        network.provisioners = match &config.provisioners {
            ProvisionerSelection::All => self.provisioners.clone(),
            ProvisionerSelection::One(provisioner) => vec![provisioner.clone()],
            ProvisionerSelection::Selected(uuids) => self
                .provisioners
                .iter()
                .filter(|p| uuids.contains(&p.uuid()))
                .cloned()
                .collect(),
        };
        let excluded: Vec<Uuid> = self
            .provisioners
            .iter()
            .map(|p| p.uuid())
            .filter(|uuid| !network.provisioners.iter().any(|p| p.uuid() == *uuid))
            .collect();

        // Groups, related ones are picked once the nodes are known
        if let Selection::Selected(addresses) = &config.groups {
            network.groups.retain(|g| addresses.contains(&g.address().address()));
        }
        let groups: Vec<MeshAddress> = network.groups.iter().map(|g| *g.address()).collect();
        let exports_group = |address: &MeshAddress| address.address().is_special_group() || groups.contains(address);

        // Nodes
        network.nodes.retain(|n| {
            n.network_keys().iter().any(|k| net_keys.contains(&k.index))
                && !excluded.contains(&n.uuid())
                && config.nodes.includes(n.uuid())
        });
        let ranges: Vec<AddressRange> = network.nodes.iter().map(Node::unicast_range).collect();
        let exports_element = |address: Address| ranges.iter().any(|r| r.contains_address(address));
        let reachable = |address: Address| {
            if address.is_unicast() {
                exports_element(address)
            } else {
                exports_group(&MeshAddress::new(address))
            }
        };

        for node in &mut network.nodes {
            node.net_keys.retain(|k| net_keys.contains(&k.index));
            node.app_keys.retain(|k| app_keys.contains(&k.index));
            if !config.nodes.keeps_device_key(node.uuid()) {
                node.device_key = None;
            }
            for model in node.models_mut() {
                model.retain_keys(|index| app_keys.contains(&index));
                model.retain_subscriptions(exports_group);
                if let Some(publish) = model.publication().copied() {
                    let destination = publish.address;
                    let keep = if destination.address().is_unicast() {
                        exports_element(destination.address())
                    } else {
                        exports_group(&destination)
                    };
                    if !keep {
                        model.clear_publication();
                    }
                }
            }
            let keep_publication = node
                .heartbeat_publication
                .as_ref()
                .map_or(true, |p| net_keys.contains(&p.index()) && reachable(p.address()));
            if !keep_publication {
                node.heartbeat_publication = None;
            }
            let keep_subscription = node
                .heartbeat_subscription
                .as_ref()
                .map_or(true, |s| exports_element(s.source()) && reachable(s.destination()));
            if !keep_subscription {
                node.heartbeat_subscription = None;
            }
        }

        if config.groups == Selection::Related {
            let nodes = &network.nodes;
            network.groups.retain(|g| {
                nodes.iter().flat_map(|n| n.models()).any(|m| {
                    m.is_subscribed_to(g.address()) || m.publication().map_or(false, |p| &p.address == g.address())
                })
            });
        }
        let groups: Vec<MeshAddress> = network.groups.iter().map(|g| *g.address()).collect();
        for group in &mut network.groups {
            if group.parent_address().map_or(false, |parent| !groups.contains(parent)) {
                group.set_parent_address(None);
            }
        }

        // Scenes
        if let Selection::Selected(numbers) = &config.scenes {
            network.scenes.retain(|s| numbers.contains(&s.number()));
        }
        for scene in &mut network.scenes {
            scene.retain_addresses(exports_element);
        }
        if config.scenes == Selection::Related {
            network.scenes.retain(Scene::is_used);
        }

        info!(
            "Exported network '{}' with {} network keys, {} nodes and {} groups (partial)",
            network.name,
            network.network_keys.len(),
            network.nodes.len(),
            network.groups.len()
        );
        network
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, SceneNumber};
    use crate::config::NetworkConfig;
    use crate::element::{Element, Location};
    use crate::group::Group;
    use crate::heartbeat::HeartbeatPublication;
    use crate::model::Model;
    use crate::node::NodeFeatures;
    use crate::publish::Publish;

    fn network() -> MeshNetwork {
        let mut network = MeshNetwork::create("Home", "Phone", &NetworkConfig::testing()).unwrap();
        network.add_network_key(None, Some(1), "Guest").unwrap();
        network.add_application_key(None, Some(0), "Lights").unwrap();
        network.add_application_key(None, Some(1), "Guest App").unwrap();
        network.bind_application_key(1, 1).unwrap();

        let mut light = Node::new("Light", Address::new(0x0010), 0);
        light.set_network_keys(vec![0, 1]);
        light.set_application_keys(vec![0, 1]);
        let mut element = Element::empty(Location::UNKNOWN);
        let mut model = Model::sig(0x1000);
        model.bind(0).unwrap();
        model.bind(1).unwrap();
        element.add_model(model);
        light.add_element(element);
        network.add_node(light).unwrap();

        let mut guest = Node::new("Guest Lamp", Address::new(0x0020), 1);
        guest.set_network_keys(vec![1]);
        network.add_node(guest).unwrap();

        network.add_scene(SceneNumber::new(1), "Night").unwrap();
        network.add_scene_address(SceneNumber::new(1), Address::new(0x0010)).unwrap();
        network.add_scene_address(SceneNumber::new(1), Address::new(0x0020)).unwrap();
        network
    }

    #[test]
    fn test_full_export() {
        let network = network();
        let export = network.export_partial(&ExportConfiguration::full());
        assert!(!export.is_partial());
        assert_eq!(export, network);
    }

    #[test]
    fn test_export_selected_network_keys() {
        let network = network();
        let export = network.export_partial(&ExportConfiguration::with_network_keys(vec![0]));
        assert!(export.is_partial());
        assert_eq!(export.network_keys().len(), 1);
        assert_eq!(export.application_keys().len(), 1);
        assert_eq!(export.application_keys()[0].index(), 0);

        // The guest lamp only knows the guest key
        assert_eq!(export.nodes().len(), 2);
        let light = export.node_with_address(Address::new(0x0010)).unwrap();
        assert!(!light.knows_network_key(1));
        assert!(!light.knows_application_key(1));
        assert_eq!(light.models().next().unwrap().bound_keys(), &[0]);

        let scene = export.scene(SceneNumber::new(1)).unwrap();
        assert_eq!(scene.addresses(), &[Address::new(0x0010)]);

        // The original is untouched
        assert_eq!(network.nodes().len(), 3);
        assert!(network.node_with_address(Address::new(0x0010)).unwrap().knows_network_key(1));
    }

    #[test]
    fn test_export_without_device_keys() {
        let network = network();
        let export = network.export_partial(&ExportConfiguration::full().without_device_keys());
        assert!(export.is_partial());
        assert!(export.nodes().iter().all(|n| n.device_key().is_none()));

        // Partial documents may omit device keys
        let decoded = MeshNetwork::from_json(&export.to_json().unwrap()).unwrap();
        assert!(decoded.is_partial());
        assert_eq!(decoded.nodes().len(), 3);
    }

    #[test]
    fn test_export_selected_application_keys() {
        let network = network();
        let export = network.export_partial(&ExportConfiguration::full().select_application_keys(vec![1]));
        assert!(export.is_partial());
        assert_eq!(export.network_keys().len(), 2);
        assert_eq!(export.application_keys().len(), 1);

        let light = export.node_with_address(Address::new(0x0010)).unwrap();
        assert!(!light.knows_application_key(0));
        assert_eq!(light.models().next().unwrap().bound_keys(), &[1]);
    }

    #[test]
    fn test_export_selected_provisioners() {
        let mut network = network();
        let phone = network.local_provisioner().unwrap().uuid();
        let tablet = Provisioner::with_ranges(
            "Tablet",
            &[AddressRange::new(Address::new(0x0100), Address::new(0x01FF))],
            &[],
            &[],
        );
        let tablet_uuid = tablet.uuid();
        network.add_provisioner(tablet.clone()).unwrap();
        assert_eq!(network.nodes().len(), 4);

        let config = ExportConfiguration::partial().select_provisioners(ProvisionerSelection::Selected(vec![phone]));
        let export = network.export_partial(&config);
        let uuids: Vec<Uuid> = export.provisioners().iter().map(|p| p.uuid()).collect();
        assert_eq!(uuids, vec![phone]);
        assert!(export.node(phone).is_some());
        assert!(export.node(tablet_uuid).is_none());
        assert_eq!(export.nodes().len(), 3);

        // A single provisioner replaces the others, whose nodes are left out
        let config = ExportConfiguration::partial().select_provisioners(ProvisionerSelection::One(tablet));
        let export = network.export_partial(&config);
        let uuids: Vec<Uuid> = export.provisioners().iter().map(|p| p.uuid()).collect();
        assert_eq!(uuids, vec![tablet_uuid]);
        assert!(export.node(phone).is_none());
        assert!(export.node(tablet_uuid).is_some());
    }

    #[test]
    fn test_export_selected_nodes() {
        let network = network();
        let light = network.node_with_address(Address::new(0x0010)).unwrap().uuid();
        let guest = network.node_with_address(Address::new(0x0020)).unwrap().uuid();
        let config = ExportConfiguration::partial().select_nodes(NodeSelection::Selected {
            with_device_key: vec![light],
            without_device_key: vec![guest],
        });
        assert!(!config.is_full());

        let export = network.export_partial(&config);
        assert_eq!(export.nodes().len(), 2);
        assert!(export.node(light).unwrap().device_key().is_some());
        assert!(export.node(guest).unwrap().device_key().is_none());

        let export = network.export_partial(&config.without_device_keys());
        assert_eq!(export.nodes().len(), 2);
        assert!(export.nodes().iter().all(|n| n.device_key().is_none()));
    }

    /// The test network with a group hierarchy and a switch using some of the groups
    fn grouped_network() -> MeshNetwork {
        let mut network = network();
        for (address, name) in [(0xC000, "House"), (0xC001, "Kitchen"), (0xC002, "Garage"), (0xC003, "Attic")] {
            network.add_group(Group::with_address(name, Address::new(address)).unwrap()).unwrap();
        }
        network
            .set_group_parent(Address::new(0xC001), Some(Address::new(0xC000)))
            .unwrap();

        let mut switch = Node::new("Switch", Address::new(0x0030), 0);
        switch.set_application_keys(vec![0]);
        let mut model = Model::sig(0x1001);
        model.bind(0).unwrap();
        model.subscribe(MeshAddress::new(Address::new(0xC001))).unwrap();
        model.set_publication(Publish::to(MeshAddress::new(Address::new(0xC002)), 0));
        let mut element = Element::empty(Location::UNKNOWN);
        element.add_model(model);
        switch.add_element(element);
        let heartbeat = HeartbeatPublication::new(Address::new(0xC002), 4, 5, 0, NodeFeatures::NONE).unwrap();
        switch.set_heartbeat_publication(Some(heartbeat)).unwrap();
        network.add_node(switch).unwrap();
        network
    }

    #[test]
    fn test_export_related_groups() {
        let network = grouped_network();
        let export = network.export_partial(&ExportConfiguration::with_network_keys(vec![0]));
        let mut addresses: Vec<Address> = export.groups().iter().map(|g| g.address().address()).collect();
        addresses.sort();
        assert_eq!(addresses, vec![Address::new(0xC001), Address::new(0xC002)]);

        // The parent is not used by any exported model
        assert!(export.group(Address::new(0xC001)).unwrap().parent_address().is_none());
        let decoded = MeshNetwork::from_json(&export.to_json().unwrap()).unwrap();
        assert_eq!(decoded.groups().len(), 2);

        assert_eq!(network.export_partial(&ExportConfiguration::full()).groups().len(), 4);
    }

    #[test]
    fn test_export_selected_groups() {
        let network = grouped_network();
        let config = ExportConfiguration::partial().select_groups(Selection::Selected(vec![Address::new(0xC001)]));
        let export = network.export_partial(&config);
        assert_eq!(export.groups().len(), 1);

        let switch = export.node_with_address(Address::new(0x0030)).unwrap();
        let model = switch.models().next().unwrap();
        assert!(model.is_subscribed_to(&MeshAddress::new(Address::new(0xC001))));
        // Nothing may publish to the garage once it is left out
        assert!(model.publication().is_none());
        assert!(switch.heartbeat_publication().is_none());

        let source = network.node_with_address(Address::new(0x0030)).unwrap();
        assert!(source.heartbeat_publication().is_some());
        assert!(source.models().next().unwrap().publication().is_some());
    }

    #[test]
    fn test_export_scenes() {
        let mut network = network();
        network.add_scene(SceneNumber::new(2), "Empty").unwrap();

        let export = network.export_partial(&ExportConfiguration::partial());
        assert!(export.is_partial());
        assert!(export.scene(SceneNumber::new(1)).is_some());
        assert!(export.scene(SceneNumber::new(2)).is_none());

        let export = network.export_partial(&ExportConfiguration::partial().select_scenes(Selection::All));
        assert_eq!(export.scenes().len(), 2);

        let config =
            ExportConfiguration::with_network_keys(vec![0]).select_scenes(Selection::Selected(vec![SceneNumber::new(1)]));
        let export = network.export_partial(&config);
        assert_eq!(export.scenes().len(), 1);
        assert_eq!(export.scene(SceneNumber::new(1)).unwrap().addresses(), &[Address::new(0x0010)]);
    }
}
