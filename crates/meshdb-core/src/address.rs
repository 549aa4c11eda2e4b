//! Mesh addresses and scene numbers
//!
//! Addresses are 16-bit values whose kind (unicast, virtual, group) is a pure
//! function of the numeric value. Both addresses and scene numbers are written
//! to the network database as 4-character hexadecimal strings.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::crypto::{MeshCrypto, SoftwareCrypto};
use crate::errors::MeshError;
use crate::Result;

// ----------------------------------------------------------------------------
// Address
// ----------------------------------------------------------------------------

/// A 16-bit mesh address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u16);

/// Classification of an address; every 16-bit value maps to exactly one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Unassigned,
    Unicast,
    Virtual,
    Group(GroupKind),
}

/// Sub-kinds of the group address space `0xC000..=0xFFFF`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Freely assignable group address
    Regular,
    /// Reserved for future use, `0xFF00..=0xFFFB`
    Reserved,
    /// All-proxies, all-friends, all-relays or all-nodes
    Special,
}

impl Address {
    pub const UNASSIGNED: Self = Self(0x0000);
    pub const MIN_UNICAST: Self = Self(0x0001);
    pub const MAX_UNICAST: Self = Self(0x7FFF);
    pub const MIN_VIRTUAL: Self = Self(0x8000);
    pub const MAX_VIRTUAL: Self = Self(0xBFFF);
    pub const MIN_GROUP: Self = Self(0xC000);
    pub const MAX_GROUP: Self = Self(0xFEFF);
    pub const ALL_PROXIES: Self = Self(0xFFFC);
    pub const ALL_FRIENDS: Self = Self(0xFFFD);
    pub const ALL_RELAYS: Self = Self(0xFFFE);
    pub const ALL_NODES: Self = Self(0xFFFF);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u16 {
        self.0
    }

    /// False only for the reserved range `0xFF00..=0xFFFB`
    pub const fn is_valid(&self) -> bool {
        self.0 < 0xFF00 || self.0 > 0xFFFB
    }

    pub const fn is_unassigned(&self) -> bool {
        self.0 == 0x0000
    }

    pub const fn is_unicast(&self) -> bool {
        self.0 & 0x8000 == 0x0000 && self.0 != 0x0000
    }

    pub const fn is_virtual(&self) -> bool {
        self.0 & 0xC000 == 0x8000
    }

    /// True for valid group addresses, special groups included
    pub const fn is_group(&self) -> bool {
        self.0 & 0xC000 == 0xC000 && self.is_valid()
    }

    pub const fn is_special_group(&self) -> bool {
        self.0 >= 0xFF00
    }

    pub const fn kind(&self) -> AddressKind {
        match self.0 {
            0x0000 => AddressKind::Unassigned,
            0x0001..=0x7FFF => AddressKind::Unicast,
            0x8000..=0xBFFF => AddressKind::Virtual,
            0xC000..=0xFEFF => AddressKind::Group(GroupKind::Regular),
            0xFF00..=0xFFFB => AddressKind::Group(GroupKind::Reserved),
            _ => AddressKind::Group(GroupKind::Special),
        }
    }

    /// Address `count` positions after this one, if it does not wrap
    pub fn offset(&self, count: u16) -> Option<Self> {
        self.0.checked_add(count).map(Self)
    }
}

impl From<u16> for Address {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<Address> for u16 {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

impl FromStr for Address {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex_u16(s)
            .map(Self)
            .ok_or_else(|| MeshError::decode(format!("Address must be 4-character hexadecimal string: {}", s)))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse up to 4 hexadecimal characters, with an optional `0x` prefix
pub(crate) fn parse_hex_u16(s: &str) -> Option<u16> {
    let clean_str = s.strip_prefix("0x").unwrap_or(s);
    if clean_str.is_empty() || clean_str.len() > 4 || !clean_str.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(clean_str, 16).ok()
}

// ----------------------------------------------------------------------------
// Scene Number
// ----------------------------------------------------------------------------

/// A scene number; `0x0000` is prohibited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SceneNumber(u16);

impl SceneNumber {
    pub const MIN: Self = Self(0x0001);
    pub const MAX: Self = Self(0xFFFF);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u16 {
        self.0
    }

    pub const fn is_valid(&self) -> bool {
        self.0 != 0x0000
    }
}

impl From<u16> for SceneNumber {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for SceneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

impl FromStr for SceneNumber {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex_u16(s)
            .map(Self)
            .ok_or_else(|| MeshError::decode(format!("Scene number must be 4-character hexadecimal string: {}", s)))
    }
}

impl Serialize for SceneNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SceneNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ----------------------------------------------------------------------------
// Mesh Address
// ----------------------------------------------------------------------------

/// A publication or subscription target: a plain address or a virtual label
///
/// For virtual labels the 16-bit virtual address is derived once, when the
/// value is created, and kept alongside the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshAddress {
    address: Address,
    virtual_label: Option<Uuid>,
}

impl MeshAddress {
    pub const fn new(address: Address) -> Self {
        Self {
            address,
            virtual_label: None,
        }
    }

    /// Create a virtual address from a Label UUID
    pub fn from_label(label: Uuid) -> Self {
        Self::from_label_with(label, &SoftwareCrypto)
    }

    /// Create a virtual address from a Label UUID using the given crypto provider
    pub fn from_label_with<C: MeshCrypto + ?Sized>(label: Uuid, crypto: &C) -> Self {
        Self {
            address: crypto.virtual_address(&label),
            virtual_label: Some(label),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn virtual_label(&self) -> Option<&Uuid> {
        self.virtual_label.as_ref()
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_label.is_some()
    }

    /// True for addresses a model may subscribe to
    pub fn is_subscribable(&self) -> bool {
        self.address.is_group() || self.address.is_virtual()
    }
}

impl From<Address> for MeshAddress {
    fn from(address: Address) -> Self {
        Self::new(address)
    }
}

impl fmt::Display for MeshAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.virtual_label {
            Some(label) => write!(f, "{}", crate::serde_hex::uuid_to_hex(label)),
            None => write!(f, "{}", self.address),
        }
    }
}

impl FromStr for MeshAddress {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(address) = parse_hex_u16(s) {
            return Ok(Self::new(Address::new(address)));
        }
        Uuid::parse_str(s)
            .map(Self::from_label)
            .map_err(|_| MeshError::decode(format!("Address must be 4-character hexadecimal string or UUID: {}", s)))
    }
}

impl Serialize for MeshAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MeshAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_predicates() {
        assert!(Address::UNASSIGNED.is_unassigned());
        assert!(Address::new(0x0001).is_unicast());
        assert!(Address::new(0x7FFF).is_unicast());
        assert!(!Address::new(0x8000).is_unicast());
        assert!(Address::new(0x8000).is_virtual());
        assert!(Address::new(0xBFFF).is_virtual());
        assert!(Address::new(0xC000).is_group());
        assert!(Address::new(0xFEFF).is_group());
        assert!(!Address::new(0xFF00).is_group());
        assert!(!Address::new(0xFFFB).is_valid());
        assert!(Address::ALL_NODES.is_group());
        assert!(Address::ALL_PROXIES.is_special_group());
    }

    #[test]
    fn test_address_kind() {
        assert_eq!(Address::new(0x0000).kind(), AddressKind::Unassigned);
        assert_eq!(Address::new(0x1234).kind(), AddressKind::Unicast);
        assert_eq!(Address::new(0x9000).kind(), AddressKind::Virtual);
        assert_eq!(Address::new(0xC001).kind(), AddressKind::Group(GroupKind::Regular));
        assert_eq!(Address::new(0xFF10).kind(), AddressKind::Group(GroupKind::Reserved));
        assert_eq!(Address::ALL_RELAYS.kind(), AddressKind::Group(GroupKind::Special));
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let address = Address::new(0x01AB);
        assert_eq!(address.to_string(), "01AB");
        assert_eq!("01ab".parse::<Address>().unwrap(), address);
        assert_eq!("0x01AB".parse::<Address>().unwrap(), address);
        assert!("12345".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }

    #[test]
    fn test_hex_parse_rejects_signs() {
        assert!("+1".parse::<Address>().is_err());
        assert!("+C00".parse::<Address>().is_err());
        assert!("0x+1".parse::<Address>().is_err());
        assert!("-1".parse::<SceneNumber>().is_err());
        assert!(serde_json::from_str::<Address>(r#""+001""#).is_err());
        assert_eq!("00+1".parse::<Address>().ok(), None);
    }

    #[test]
    fn test_scene_number_validity() {
        assert!(!SceneNumber::new(0).is_valid());
        assert!(SceneNumber::MIN.is_valid());
        assert!(SceneNumber::MAX.is_valid());
        assert_eq!(SceneNumber::new(0x0A).to_string(), "000A");
    }

    #[test]
    fn test_mesh_address_parse() {
        let group: MeshAddress = "C001".parse().unwrap();
        assert_eq!(group.address(), Address::new(0xC001));
        assert!(!group.is_virtual());
        assert!(group.is_subscribable());

        let label = "0073E7E4D8B9440FAF8415DF4C56C0E1";
        let virtual_address: MeshAddress = label.parse().unwrap();
        assert!(virtual_address.is_virtual());
        assert!(virtual_address.address().is_virtual());
        assert_eq!(virtual_address.to_string(), label);

        let dashed: MeshAddress = "0073e7e4-d8b9-440f-af84-15df4c56c0e1".parse().unwrap();
        assert_eq!(dashed, virtual_address);
    }

    #[test]
    fn test_mesh_address_json() {
        let address = MeshAddress::new(Address::new(0xC002));
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"C002\"");
        let decoded: MeshAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, address);
    }
}
