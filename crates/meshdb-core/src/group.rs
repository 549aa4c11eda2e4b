//! Groups of elements sharing a group or virtual address

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{Address, MeshAddress};
use crate::errors::MeshError;
use crate::Result;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupRecord {
    name: String,
    address: MeshAddress,
    #[serde(default = "unassigned")]
    parent_address: MeshAddress,
}

fn unassigned() -> MeshAddress {
    MeshAddress::new(Address::UNASSIGNED)
}

/// A named group address, optionally nested under a parent group
///
/// Groups are identified by their address. The parent is stored as an address
/// and resolved through the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GroupRecord", into = "GroupRecord")]
pub struct Group {
    name: String,
    address: MeshAddress,
    parent_address: Option<MeshAddress>,
}

const SPECIAL_GROUPS: [(Address, &str); 4] = [
    (Address::ALL_RELAYS, "All Relays"),
    (Address::ALL_FRIENDS, "All Friends"),
    (Address::ALL_PROXIES, "All Proxies"),
    (Address::ALL_NODES, "All Nodes"),
];

impl Group {
    /// Fails unless the address is a regular group address or a virtual label
    pub fn new<T: Into<String>>(name: T, address: MeshAddress) -> Result<Self> {
        if !is_assignable(&address) {
            return Err(MeshError::invalid_address(address.address()));
        }
        Ok(Self {
            name: name.into(),
            address,
            parent_address: None,
        })
    }

    pub fn with_address<T: Into<String>>(name: T, address: Address) -> Result<Self> {
        Self::new(name, MeshAddress::new(address))
    }

    /// The group predefined for a special group address
    pub fn special(address: Address) -> Option<Self> {
        SPECIAL_GROUPS
            .iter()
            .find(|(a, _)| *a == address)
            .map(|(a, name)| Self {
                name: (*name).to_string(),
                address: MeshAddress::new(*a),
                parent_address: None,
            })
    }

    /// All Relays, All Friends, All Proxies and All Nodes
    pub fn special_groups() -> Vec<Self> {
        SPECIAL_GROUPS.iter().filter_map(|(a, _)| Self::special(*a)).collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Special groups keep their predefined names
    pub fn set_name<T: Into<String>>(&mut self, name: T) {
        if !self.is_special() {
            self.name = name.into();
        }
    }

    pub fn address(&self) -> &MeshAddress {
        &self.address
    }

    pub fn is_special(&self) -> bool {
        self.address.address().is_special_group()
    }

    pub fn parent_address(&self) -> Option<&MeshAddress> {
        self.parent_address.as_ref()
    }

    pub fn is_direct_child_of(&self, parent: &Group) -> bool {
        self.parent_address.as_ref() == Some(&parent.address)
    }

    pub fn is_direct_parent_of(&self, child: &Group) -> bool {
        child.is_direct_child_of(self)
    }

    /// Use `MeshNetwork::set_group_parent` to validate the parent
    pub(crate) fn set_parent_address(&mut self, parent: Option<MeshAddress>) {
        self.parent_address = parent;
    }
}

fn is_assignable(address: &MeshAddress) -> bool {
    let address = address.address();
    (address.is_group() && !address.is_special_group()) || address.is_virtual()
}

impl TryFrom<GroupRecord> for Group {
    type Error = MeshError;

    fn try_from(record: GroupRecord) -> Result<Self> {
        if !is_assignable(&record.address) {
            return Err(MeshError::decode(format!("Invalid group address: {}", record.address)));
        }
        let parent = record.parent_address;
        if parent.address().is_unassigned() {
            return Ok(Self {
                name: record.name,
                address: record.address,
                parent_address: None,
            });
        }
        if !is_assignable(&parent) {
            return Err(MeshError::decode(format!("Invalid parent group address: {}", parent)));
        }
        Ok(Self {
            name: record.name,
            address: record.address,
            parent_address: Some(parent),
        })
    }
}

impl From<Group> for GroupRecord {
    fn from(group: Group) -> Self {
        Self {
            name: group.name,
            address: group.address,
            parent_address: group.parent_address.unwrap_or_else(unassigned),
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{})", self.name, self.address.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_group_addresses() {
        assert!(Group::with_address("Kitchen", Address::new(0xC000)).is_ok());
        assert!(Group::with_address("Bad", Address::new(0x0001)).is_err());
        assert!(Group::with_address("Bad", Address::ALL_NODES).is_err());

        let label = Uuid::parse_str("0073e7e4d8b9440faf8415df4c56c0e1").unwrap();
        let group = Group::new("Virtual", MeshAddress::from_label(label)).unwrap();
        assert!(group.address().is_virtual());
    }

    #[test]
    fn test_special_groups() {
        let groups = Group::special_groups();
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[3].name(), "All Nodes");

        let mut relays = Group::special(Address::ALL_RELAYS).unwrap();
        relays.set_name("Renamed");
        assert_eq!(relays.name(), "All Relays");
        assert!(Group::special(Address::new(0xC000)).is_none());
    }

    #[test]
    fn test_direct_parent() {
        let parent = Group::with_address("House", Address::new(0xC000)).unwrap();
        let mut child = Group::with_address("Kitchen", Address::new(0xC001)).unwrap();
        assert!(!child.is_direct_child_of(&parent));
        child.set_parent_address(Some(*parent.address()));
        assert!(child.is_direct_child_of(&parent));
        assert!(parent.is_direct_parent_of(&child));
    }

    #[test]
    fn test_group_json() {
        let json = r#"{"name": "Kitchen", "address": "C001", "parentAddress": "C000"}"#;
        let group: Group = serde_json::from_str(json).unwrap();
        assert_eq!(group.parent_address().map(|a| a.address()), Some(Address::new(0xC000)));

        let root: Group = serde_json::from_str(r#"{"name": "House", "address": "C000", "parentAddress": "0000"}"#).unwrap();
        assert!(root.parent_address().is_none());
        assert_eq!(serde_json::to_value(&root).unwrap()["parentAddress"], "0000");

        assert!(serde_json::from_str::<Group>(r#"{"name": "X", "address": "FFFF", "parentAddress": "0000"}"#).is_err());
        assert!(serde_json::from_str::<Group>(r#"{"name": "X", "address": "C000", "parentAddress": "0001"}"#).is_err());
    }
}
