//! Scenario tests for the mesh network database
//!
//! These tests drive `MeshNetwork` through complete workflows: building a
//! network, allocating ranges across provisioners, removing keys that are in
//! use, and reading a document written by another provisioner.

use meshdb_core::element::{Element, Location};
use meshdb_core::errors::{ConflictError, PolicyError};
use meshdb_core::range::SceneRange;
use meshdb_core::*;
use uuid::Uuid;

fn unicast(low: u16, high: u16) -> AddressRange {
    AddressRange::new(Address::new(low), Address::new(high))
}

/// A light with one model bound to `app_key`, publishing with it to 0xC000
fn light(address: u16, net_keys: Vec<KeyIndex>, app_key: KeyIndex) -> Node {
    let mut node = Node::new("Light", Address::new(address), 0);
    node.set_network_keys(net_keys);
    node.set_application_keys(vec![app_key]);

    let mut model = Model::sig(0x1000);
    model.bind(app_key).unwrap();
    model.set_publication(Publish::to(MeshAddress::new(Address::new(0xC000)), app_key));
    let mut element = Element::empty(Location::UNKNOWN);
    element.add_model(model);
    node.add_element(element);
    node
}

// ----------------------------------------------------------------------------
// Provisioners and Ranges
// ----------------------------------------------------------------------------

#[test]
fn test_provisioner_overlap_is_rejected() {
    let mut network = MeshNetwork::new("Home");
    let first = Provisioner::with_ranges("First", &[unicast(0x0001, 0x00FF)], &[], &[]);
    let second = Provisioner::with_ranges("Second", &[unicast(0x0100, 0x01FF)], &[], &[]);
    let third = Provisioner::with_ranges("Third", &[unicast(0x0080, 0x0120)], &[], &[]);

    network.add_provisioner(first).unwrap();
    network.add_provisioner(second).unwrap();
    let err = network.add_provisioner(third).unwrap_err();

    assert!(matches!(err, MeshError::Conflict(ConflictError::OverlappingProvisionerRanges)));
    assert_eq!(network.provisioners().len(), 2);
    assert_eq!(network.nodes().len(), 2);
}

#[test]
fn test_second_provisioner_gets_next_free_ranges() {
    let mut network = MeshNetwork::create("Home", "Phone", &NetworkConfig::default()).unwrap();

    let unicast_range = network.next_available_unicast_address_range(0x1000).unwrap();
    let group_range = network.next_available_group_address_range(0x0100).unwrap();
    let scene_range = network.next_available_scene_range(0x0100).unwrap();
    assert_eq!(unicast_range, unicast(0x199B, 0x299A));
    assert_eq!(group_range, AddressRange::new(Address::new(0xCC9B), Address::new(0xCD9A)));
    assert_eq!(
        scene_range,
        SceneRange::new(SceneNumber::new(0x3334), SceneNumber::new(0x3433))
    );

    let tablet = Provisioner::with_ranges("Tablet", &[unicast_range], &[group_range], &[scene_range]);
    let tablet_uuid = tablet.uuid();
    network.add_provisioner(tablet).unwrap();

    let node = network.node_for_provisioner(tablet_uuid).unwrap();
    assert_eq!(node.primary_unicast_address(), Address::new(0x199B));
    assert!(network.network_keys().iter().all(|k| node.knows_network_key(k.index())));
    assert!(!network.is_local_provisioner(tablet_uuid));

    // A new node of the tablet is placed in the tablet's range
    let tablet = network.provisioner(tablet_uuid).unwrap();
    let address = network
        .next_available_unicast_address(Address::MIN_UNICAST, 3, tablet)
        .unwrap();
    assert_eq!(address, Address::new(0x199C));
}

#[test]
fn test_removed_node_addresses_are_excluded() {
    let mut network = MeshNetwork::create("Home", "Phone", &NetworkConfig::testing()).unwrap();
    let phone = network.local_provisioner().unwrap().clone();

    let node = Node::new("Switch", Address::new(0x0002), 3);
    let uuid = node.uuid();
    network.add_node(node).unwrap();
    network.remove_node(uuid).unwrap();

    let next = network.next_available_unicast_address(Address::MIN_UNICAST, 2, &phone);
    assert_eq!(next, Some(Address::new(0x0005)));

    network.set_iv_index(IvIndex::new(2, false));
    let next = network.next_available_unicast_address(Address::MIN_UNICAST, 2, &phone);
    assert_eq!(next, Some(Address::new(0x0002)));
}

// ----------------------------------------------------------------------------
// Keys
// ----------------------------------------------------------------------------

#[test]
fn test_forced_network_key_removal_cascades() {
    let mut network = MeshNetwork::create("Home", "Phone", &NetworkConfig::testing()).unwrap();
    network.add_network_key(None, None, "Guest").unwrap();
    network.add_application_key(None, None, "Guest App").unwrap();
    network.bind_application_key(0, 1).unwrap();

    let node = light(0x0010, vec![0, 1], 0);
    let uuid = node.uuid();
    network.add_node(node).unwrap();

    let err = network.remove_network_key(1, false).unwrap_err();
    assert!(matches!(err, MeshError::Policy(PolicyError::KeyInUse { index: 1 })));
    assert_eq!(network.network_keys().len(), 2);

    network.remove_network_key(1, true).unwrap();
    assert!(network.network_key(1).is_none());
    assert!(network.application_keys().is_empty());

    let node = network.node(uuid).unwrap();
    assert!(!node.knows_network_key(1));
    assert!(node.application_keys().is_empty());
    let model = node.models().next().unwrap();
    assert!(model.bound_keys().is_empty());
    assert!(model.publication().is_none());
}

#[test]
fn test_primary_network_key_is_permanent() {
    let mut network = MeshNetwork::create("Home", "Phone", &NetworkConfig::testing()).unwrap();
    assert!(network.remove_network_key(0, false).unwrap_err().is_policy());
    assert!(network.remove_network_key(0, true).unwrap_err().is_policy());
    assert!(network.network_key(0).unwrap().is_primary());
}

#[test]
fn test_key_refresh_round() {
    let mut network = MeshNetwork::create("Home", "Phone", &NetworkConfig::testing()).unwrap();
    network.add_application_key(None, None, "Lights").unwrap();
    let node = light(0x0010, vec![0], 0);
    let uuid = node.uuid();
    network.add_node(node).unwrap();

    network.rotate_network_key(0, None).unwrap();
    network.rotate_application_key(0, None).unwrap();
    assert_eq!(network.network_key(0).unwrap().phase(), KeyRefreshPhase::KeyDistribution);
    assert!(network.application_key(0).unwrap().old_key().is_some());

    network
        .with_node_mut(uuid, |node| {
            node.update_network_key(0);
            node.update_application_key(0);
        })
        .unwrap();
    assert!(network.node(uuid).unwrap().network_keys()[0].updated);

    network.set_network_key_phase(0, KeyRefreshPhase::Finalizing).unwrap();
    network.set_network_key_phase(0, KeyRefreshPhase::NormalOperation).unwrap();
    assert!(network.network_key(0).unwrap().old_key().is_none());
    assert!(network.application_key(0).unwrap().old_key().is_none());
    let node = network.node(uuid).unwrap();
    assert!(!node.network_keys()[0].updated);
    assert!(!node.application_keys()[0].updated);
}

// ----------------------------------------------------------------------------
// Documents
// ----------------------------------------------------------------------------

const DOCUMENT: &str = r#"{
    "$schema": "http://json-schema.org/draft-04/schema#",
    "id": "https://www.bluetooth.com/specifications/specs/mesh-cdb-1-0-1-schema.json#",
    "version": "1.0.1",
    "meshUUID": "9b7bdd5e-5b0b-4e3b-a3b8-7cc9b3b1e3f1",
    "meshName": "Home",
    "timestamp": "2024-03-01T10:00:00Z",
    "partial": false,
    "provisioners": [{
        "provisionerName": "Phone",
        "UUID": "5f1a9e0c-1c43-4c5a-9d4e-2d3b6a0f7e11",
        "allocatedUnicastRange": [{"lowAddress": "0001", "highAddress": "00ff"}],
        "allocatedGroupRange": [{"lowAddress": "C000", "highAddress": "C0FF"}],
        "allocatedSceneRange": [{"firstScene": "0001", "lastScene": "00FF"}]
    }],
    "netKeys": [{
        "name": "Primary Network Key",
        "index": 0,
        "key": "7DD7364CD842AD18C17C2B820C84C3D6",
        "phase": 0,
        "minSecurity": "high",
        "timestamp": "2024-03-01T10:00:00Z"
    }],
    "appKeys": [{
        "name": "Lights",
        "index": 0,
        "boundNetKey": 0,
        "key": "63964771734FBD76E3B40519D1D94A48"
    }],
    "nodes": [{
        "UUID": "5F1A9E0C1C434C5A9D4E2D3B6A0F7E11",
        "name": "Phone",
        "unicastAddress": "0001",
        "deviceKey": "00112233445566778899AABBCCDDEEFF",
        "security": "secure",
        "netKeys": [{"index": 0, "updated": false}],
        "appKeys": [{"index": 0, "updated": false}],
        "configComplete": true,
        "elements": [{"name": "Primary Element", "index": 0, "location": "0000", "models": []}],
        "excluded": false,
        "heartbeatSub": {"source": "0002", "destination": "0001"}
    }, {
        "UUID": "c5c7fa5e-2f3a-4b8e-8f5d-6a1b2c3d4e5f",
        "name": "Kitchen Light",
        "unicastAddress": "0002",
        "deviceKey": "FFEEDDCCBBAA99887766554433221100",
        "security": "low",
        "netKeys": [{"index": 0, "updated": false}],
        "appKeys": [{"index": 0, "updated": false}],
        "configComplete": true,
        "cid": "0059",
        "defaultTTL": 5,
        "elements": [{
            "index": 0,
            "location": "0000",
            "models": [{
                "modelId": "1000",
                "subscribe": ["C000"],
                "bind": [0],
                "publish": {
                    "address": "C000",
                    "index": 0,
                    "ttl": 255,
                    "period": {"numberOfSteps": 2, "resolution": 1000},
                    "credentials": 0,
                    "retransmit": {"count": 0, "interval": 50}
                }
            }]
        }],
        "blacklisted": false
    }],
    "groups": [{"name": "Kitchen", "address": "C000", "parentAddress": "0000"}],
    "scenes": [{"name": "Evening", "number": "0001", "addresses": ["0002"]}],
    "networkExclusions": [{"ivIndex": 0, "addresses": ["0010"]}]
}"#;

#[test]
fn test_decode_document() {
    let network = MeshNetwork::from_json(DOCUMENT).unwrap();
    assert_eq!(
        network.uuid(),
        Uuid::parse_str("9b7bdd5e-5b0b-4e3b-a3b8-7cc9b3b1e3f1").unwrap()
    );
    assert_eq!(network.name(), "Home");
    assert_eq!(network.nodes().len(), 2);

    // The provisioner's node is found whatever the UUID format
    let local = network.local_provisioner_node().unwrap();
    assert_eq!(local.name.as_deref(), Some("Phone"));
    assert!(local.heartbeat_subscription().is_none());

    let light = network.node_with_address(Address::new(0x0002)).unwrap();
    assert_eq!(light.security(), Security::Insecure);
    assert_eq!(light.company_identifier(), Some(0x0059));
    let model = light.models().next().unwrap();
    let publication = model.publication().unwrap();
    assert_eq!(publication.period.interval_ms(), 2000);
    assert!(publication.uses_default_ttl());

    let kitchen = network.group(Address::new(0xC000)).unwrap();
    assert!(network.group_is_used(kitchen));
    assert_eq!(network.nodes_registered_to(SceneNumber::new(1)).len(), 1);
    assert!(!network.is_address_available(Address::new(0x0010), 1));
}

#[test]
fn test_encode_document() {
    let network = MeshNetwork::from_json(DOCUMENT).unwrap();
    let value: serde_json::Value = serde_json::from_str(&network.to_json().unwrap()).unwrap();

    assert_eq!(value["meshUUID"], "9B7BDD5E5B0B4E3BA3B87CC9B3B1E3F1");
    assert_eq!(value["provisioners"][0]["UUID"], "5F1A9E0C1C434C5A9D4E2D3B6A0F7E11");
    assert_eq!(value["provisioners"][0]["allocatedUnicastRange"][0]["highAddress"], "00FF");
    assert_eq!(value["netKeys"][0]["minSecurity"], "secure");
    assert_eq!(value["nodes"][1]["security"], "insecure");
    assert_eq!(value["nodes"][1]["excluded"], false);
    assert!(value["nodes"][1].get("blacklisted").is_none());
    assert_eq!(value["nodes"][1]["elements"][0]["models"][0]["publish"]["period"], 2000);
    assert_eq!(value["networkExclusions"][0]["addresses"][0], "0010");

    let decoded = MeshNetwork::from_json(&network.to_json_pretty().unwrap()).unwrap();
    assert_eq!(decoded, network);
}

#[test]
fn test_decode_rejects_inconsistent_documents() {
    let no_device_key = DOCUMENT.replace(r#""deviceKey": "FFEEDDCCBBAA99887766554433221100","#, "");
    assert!(MeshNetwork::from_json(&no_device_key).is_err());

    let partial = no_device_key.replace(r#""partial": false"#, r#""partial": true"#);
    assert!(MeshNetwork::from_json(&partial).unwrap().is_partial());

    let overlapping = DOCUMENT.replace(r#""unicastAddress": "0002""#, r#""unicastAddress": "0001""#);
    assert!(matches!(
        MeshNetwork::from_json(&overlapping),
        Err(MeshError::Decode { .. })
    ));

    let unknown_net_key = DOCUMENT.replace(r#""boundNetKey": 0"#, r#""boundNetKey": 3"#);
    assert!(MeshNetwork::from_json(&unknown_net_key).is_err());
}

const PHONE_UNICAST: &str = r#""allocatedUnicastRange": [{"lowAddress": "0001", "highAddress": "00ff"}]"#;

#[test]
fn test_decode_rejects_invalid_provisioner_ranges() {
    let group_in_unicast = DOCUMENT.replace(
        PHONE_UNICAST,
        r#""allocatedUnicastRange": [{"lowAddress": "0001", "highAddress": "00ff"}, {"lowAddress": "C100", "highAddress": "C1FF"}]"#,
    );
    assert!(matches!(
        MeshNetwork::from_json(&group_in_unicast),
        Err(MeshError::Decode { .. })
    ));

    let no_unicast = DOCUMENT.replace(PHONE_UNICAST, r#""allocatedUnicastRange": []"#);
    assert!(matches!(
        MeshNetwork::from_json(&no_unicast),
        Err(MeshError::Decode { .. })
    ));

    let unicast_in_groups = DOCUMENT.replace(
        r#""allocatedGroupRange": [{"lowAddress": "C000", "highAddress": "C0FF"}]"#,
        r#""allocatedGroupRange": [{"lowAddress": "0100", "highAddress": "01FF"}]"#,
    );
    assert!(MeshNetwork::from_json(&unicast_in_groups).is_err());

    // A decoded network keeps group ranges exclusive
    let mut network = MeshNetwork::from_json(DOCUMENT).unwrap();
    let tablet = Provisioner::with_ranges("Tablet", &[unicast(0x0100, 0x01FF)], &[unicast(0xC0F0, 0xC1FF)], &[]);
    assert!(matches!(
        network.add_provisioner(tablet),
        Err(MeshError::Conflict(ConflictError::OverlappingProvisionerRanges))
    ));
}

#[test]
fn test_decode_checks_group_parents() {
    let groups = r#""groups": [{"name": "Kitchen", "address": "C000", "parentAddress": "0000"}]"#;
    let nested = DOCUMENT.replace(
        groups,
        r#""groups": [
            {"name": "Kitchen", "address": "C000", "parentAddress": "C001"},
            {"name": "Ground Floor", "address": "C001"}
        ]"#,
    );
    let network = MeshNetwork::from_json(&nested).unwrap();
    let kitchen = network.group(Address::new(0xC000)).unwrap();
    assert_eq!(network.group_parent(kitchen).map(|g| g.name()), Some("Ground Floor"));

    let missing_parent = DOCUMENT.replace(
        groups,
        r#""groups": [{"name": "Kitchen", "address": "C000", "parentAddress": "C005"}]"#,
    );
    assert!(matches!(
        MeshNetwork::from_json(&missing_parent),
        Err(MeshError::Decode { .. })
    ));

    let cycle = DOCUMENT.replace(
        groups,
        r#""groups": [
            {"name": "Kitchen", "address": "C000", "parentAddress": "C001"},
            {"name": "Ground Floor", "address": "C001", "parentAddress": "C000"}
        ]"#,
    );
    assert!(MeshNetwork::from_json(&cycle).is_err());

    let duplicate = DOCUMENT.replace(
        groups,
        r#""groups": [
            {"name": "Kitchen", "address": "C000"},
            {"name": "Also Kitchen", "address": "C000"}
        ]"#,
    );
    assert!(MeshNetwork::from_json(&duplicate).is_err());
}

#[test]
fn test_partial_export_of_document() {
    let mut network = MeshNetwork::from_json(DOCUMENT).unwrap();
    network.add_network_key(None, Some(1), "Guest").unwrap();

    let export = network.export_partial(&ExportConfiguration::with_network_keys(vec![1]).without_device_keys());
    assert!(export.is_partial());
    assert_eq!(export.network_keys().len(), 1);
    assert!(export.application_keys().is_empty());
    // Only the local node learnt the guest key
    assert_eq!(export.nodes().len(), 1);
    // The scene only used nodes that were left out
    assert!(export.scene(SceneNumber::new(1)).is_none());
    assert!(network.scene(SceneNumber::new(1)).unwrap().is_used());

    let decoded = MeshNetwork::from_json(&export.to_json().unwrap()).unwrap();
    assert_eq!(decoded.nodes()[0].device_key(), None);
}
