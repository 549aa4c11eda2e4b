//! IV Index and the network exclusion lists
//!
//! Addresses of removed nodes must not be reassigned until the IV Index has
//! moved far enough for their replay protection entries to expire.

use core::cmp::Ordering;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::errors::MeshError;
use crate::range::AddressRange;
use crate::Result;

/// Number of IV Index values, counting the current one, for which addresses
/// of a removed node stay excluded
pub const DEFAULT_EXCLUSION_WINDOW: u32 = 2;

// ----------------------------------------------------------------------------
// IV Index
// ----------------------------------------------------------------------------

/// Current IV Index of the network and the IV Update procedure flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IvIndex {
    pub index: u32,
    pub update_active: bool,
}

impl IvIndex {
    pub const fn new(index: u32, update_active: bool) -> Self {
        Self { index, update_active }
    }

    /// Index used to transmit messages; lags by one during an update
    pub fn transmit_index(&self) -> u32 {
        if self.update_active && self.index > 0 {
            self.index - 1
        } else {
            self.index
        }
    }

    /// Full index matching the least significant bit received in a beacon
    pub fn index_for_ivi(&self, ivi: u8) -> u32 {
        if u32::from(ivi & 1) == self.index & 1 {
            self.index
        } else {
            self.index.max(1) - 1
        }
    }

    /// The state following this one in the IV Update procedure
    pub fn next(&self) -> Option<Self> {
        if self.update_active {
            Some(Self::new(self.index, false))
        } else if self.index < u32::MAX - 1 {
            Some(Self::new(self.index + 1, true))
        } else {
            None
        }
    }

    pub fn previous(&self) -> Option<Self> {
        if !self.update_active {
            Some(Self::new(self.index, true))
        } else if self.index > 0 {
            Some(Self::new(self.index - 1, false))
        } else {
            None
        }
    }
}

impl Ord for IvIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        // At the same index the update state precedes normal operation
        self.index
            .cmp(&other.index)
            .then_with(|| other.update_active.cmp(&self.update_active))
    }
}

impl PartialOrd for IvIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for IvIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.update_active {
            "update active"
        } else {
            "normal operation"
        };
        write!(f, "IV Index: {} ({})", self.index, state)
    }
}

// ----------------------------------------------------------------------------
// Exclusion Lists
// ----------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExclusionListRecord {
    iv_index: u32,
    addresses: Vec<Address>,
}

/// Unicast addresses excluded at one IV Index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExclusionListRecord", into = "ExclusionListRecord")]
pub struct ExclusionList {
    iv_index: u32,
    addresses: Vec<Address>,
}

impl ExclusionList {
    pub fn new(iv_index: u32) -> Self {
        Self {
            iv_index,
            addresses: Vec::new(),
        }
    }

    pub fn iv_index(&self) -> u32 {
        self.iv_index
    }

    /// Excluded addresses, sorted
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn is_excluded(&self, address: Address) -> bool {
        self.addresses.binary_search(&address).is_ok()
    }

    /// Non-unicast addresses are ignored
    pub fn exclude(&mut self, address: Address) {
        if !address.is_unicast() {
            return;
        }
        if let Err(position) = self.addresses.binary_search(&address) {
            self.addresses.insert(position, address);
        }
    }
}

impl TryFrom<ExclusionListRecord> for ExclusionList {
    type Error = MeshError;

    fn try_from(record: ExclusionListRecord) -> Result<Self> {
        if let Some(address) = record.addresses.iter().find(|a| !a.is_unicast()) {
            return Err(MeshError::decode(format!(
                "Excluded address must be of unicast type: {}",
                address
            )));
        }
        let mut addresses = record.addresses;
        addresses.sort_unstable();
        addresses.dedup();
        Ok(Self {
            iv_index: record.iv_index,
            addresses,
        })
    }
}

impl From<ExclusionList> for ExclusionListRecord {
    fn from(list: ExclusionList) -> Self {
        Self {
            iv_index: list.iv_index,
            addresses: list.addresses,
        }
    }
}

/// All exclusion lists of a network, at most one per IV Index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkExclusions(Vec<ExclusionList>);

impl NetworkExclusions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn lists(&self) -> &[ExclusionList] {
        &self.0
    }

    pub fn list(&self, iv_index: u32) -> Option<&ExclusionList> {
        self.0.iter().find(|l| l.iv_index == iv_index)
    }

    /// Exclude the addresses at the given IV Index
    pub fn exclude(&mut self, addresses: impl IntoIterator<Item = Address>, iv_index: IvIndex) {
        let position = match self.0.iter().position(|l| l.iv_index == iv_index.index) {
            Some(position) => position,
            None => {
                self.0.push(ExclusionList::new(iv_index.index));
                self.0.len() - 1
            }
        };
        let list = &mut self.0[position];
        for address in addresses {
            list.exclude(address);
        }
    }

    /// Drop empty lists and lists that fell out of the window
    pub fn clean_up(&mut self, iv_index: IvIndex, window: u32) {
        self.0.retain(|l| !l.addresses.is_empty());
        if let Some(oldest_kept) = iv_index.index.checked_sub(window) {
            self.0.retain(|l| l.iv_index > oldest_kept);
        }
    }

    /// Addresses excluded at the given IV Index, sorted
    pub fn excluded_addresses(&self, iv_index: IvIndex, window: u32) -> Vec<Address> {
        let mut addresses: Vec<Address> = self
            .0
            .iter()
            .filter(|l| is_within_window(l.iv_index, iv_index.index, window))
            .flat_map(|l| l.addresses.iter().copied())
            .collect();
        addresses.sort_unstable();
        addresses.dedup();
        addresses
    }

    /// Whether any address of the range is excluded
    pub fn contains(&self, range: &AddressRange, iv_index: IvIndex, window: u32) -> bool {
        self.0
            .iter()
            .filter(|l| is_within_window(l.iv_index, iv_index.index, window))
            .any(|l| l.addresses.iter().any(|a| range.contains_address(*a)))
    }
}

fn is_within_window(list_index: u32, current: u32, window: u32) -> bool {
    list_index <= current && current - list_index < window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::RangeObject;

    #[test]
    fn test_iv_index_transitions() {
        let iv = IvIndex::new(5, false);
        assert_eq!(iv.transmit_index(), 5);
        assert_eq!(iv.next(), Some(IvIndex::new(6, true)));
        assert_eq!(IvIndex::new(6, true).transmit_index(), 5);
        assert_eq!(IvIndex::new(6, true).next(), Some(IvIndex::new(6, false)));
        assert_eq!(iv.previous(), Some(IvIndex::new(5, true)));
        assert_eq!(IvIndex::new(5, true).previous(), Some(IvIndex::new(4, false)));
        assert_eq!(IvIndex::new(0, true).previous(), None);
        assert_eq!(IvIndex::new(u32::MAX - 1, false).next(), None);
    }

    #[test]
    fn test_iv_index_ordering() {
        assert!(IvIndex::new(1, false) < IvIndex::new(2, true));
        assert!(IvIndex::new(2, true) < IvIndex::new(2, false));
        assert_eq!(IvIndex::new(3, false).index_for_ivi(0), 2);
        assert_eq!(IvIndex::new(3, false).index_for_ivi(1), 3);
    }

    #[test]
    fn test_exclusion_window() {
        let mut exclusions = NetworkExclusions::new();
        exclusions.exclude([Address::new(0x0010), Address::new(0x0011)], IvIndex::new(0, false));
        let range = AddressRange::from_bounds(0x000F, 0x0010);

        for iv in [IvIndex::new(0, false), IvIndex::new(1, true), IvIndex::new(1, false)] {
            assert!(exclusions.contains(&range, iv, DEFAULT_EXCLUSION_WINDOW));
        }
        assert!(!exclusions.contains(&range, IvIndex::new(2, true), DEFAULT_EXCLUSION_WINDOW));
        assert_eq!(
            exclusions.excluded_addresses(IvIndex::new(1, false), DEFAULT_EXCLUSION_WINDOW),
            vec![Address::new(0x0010), Address::new(0x0011)]
        );

        exclusions.clean_up(IvIndex::new(1, false), DEFAULT_EXCLUSION_WINDOW);
        assert!(!exclusions.is_empty());
        exclusions.clean_up(IvIndex::new(2, false), DEFAULT_EXCLUSION_WINDOW);
        assert!(exclusions.is_empty());
    }

    #[test]
    fn test_exclusion_json() {
        let json = r#"[{"ivIndex": 3, "addresses": ["0005", "0002"]}]"#;
        let exclusions: NetworkExclusions = serde_json::from_str(json).unwrap();
        let list = exclusions.list(3).unwrap();
        assert!(list.is_excluded(Address::new(0x0002)));
        assert_eq!(list.addresses()[0], Address::new(0x0002));

        assert!(serde_json::from_str::<NetworkExclusions>(r#"[{"ivIndex": 0, "addresses": ["C000"]}]"#).is_err());
    }
}
