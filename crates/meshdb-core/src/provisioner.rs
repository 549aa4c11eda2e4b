//! Provisioners and their allocated ranges
//!
//! Range sets are kept merged. Checks against other provisioners need the
//! network and are performed by `MeshNetwork`.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::{Address, SceneNumber};
use crate::errors::MeshError;
use crate::range::{AddressRange, AddressRangeSet, RangeSet, RangeSetMut, SceneRange, SceneRangeSet};
use crate::serde_hex::uuid_hex;
use crate::Result;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionerRecord {
    provisioner_name: String,
    #[serde(rename = "UUID", with = "uuid_hex")]
    uuid: Uuid,
    allocated_unicast_range: Vec<AddressRange>,
    allocated_group_range: Vec<AddressRange>,
    allocated_scene_range: Vec<SceneRange>,
}

/// A device that provisions and configures nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProvisionerRecord", into = "ProvisionerRecord")]
pub struct Provisioner {
    pub name: String,
    uuid: Uuid,
    allocated_unicast_range: Vec<AddressRange>,
    allocated_group_range: Vec<AddressRange>,
    allocated_scene_range: Vec<SceneRange>,
}

impl Provisioner {
    /// A provisioner with a random UUID and no ranges
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self::with_uuid(name, Uuid::new_v4())
    }

    pub fn with_uuid<T: Into<String>>(name: T, uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            uuid,
            allocated_unicast_range: Vec::new(),
            allocated_group_range: Vec::new(),
            allocated_scene_range: Vec::new(),
        }
    }

    /// A provisioner with the given ranges, merged
    pub fn with_ranges<T: Into<String>>(
        name: T,
        unicast: &[AddressRange],
        group: &[AddressRange],
        scene: &[SceneRange],
    ) -> Self {
        Self {
            allocated_unicast_range: unicast.merged(),
            allocated_group_range: group.merged(),
            allocated_scene_range: scene.merged(),
            ..Self::new(name)
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn allocated_unicast_range(&self) -> &[AddressRange] {
        &self.allocated_unicast_range
    }

    pub fn allocated_group_range(&self) -> &[AddressRange] {
        &self.allocated_group_range
    }

    pub fn allocated_scene_range(&self) -> &[SceneRange] {
        &self.allocated_scene_range
    }

    /// Each range set lies in its own sub-space and the unicast set is not empty
    pub fn is_valid(&self) -> bool {
        !self.allocated_unicast_range.is_empty()
            && self.allocated_unicast_range.is_unicast_range()
            && self.allocated_group_range.is_group_range()
            && SceneRangeSet::is_valid(self.allocated_scene_range.as_slice())
    }

    // ------------------------------------------------------------------------
    // Overlap
    // ------------------------------------------------------------------------

    pub fn has_overlapping_unicast_ranges(&self, other: &Provisioner) -> bool {
        self.allocated_unicast_range.overlaps_any(&other.allocated_unicast_range)
    }

    pub fn has_overlapping_group_ranges(&self, other: &Provisioner) -> bool {
        self.allocated_group_range.overlaps_any(&other.allocated_group_range)
    }

    pub fn has_overlapping_scene_ranges(&self, other: &Provisioner) -> bool {
        self.allocated_scene_range.overlaps_any(&other.allocated_scene_range)
    }

    pub fn has_overlapping_ranges(&self, other: &Provisioner) -> bool {
        self.has_overlapping_unicast_ranges(other)
            || self.has_overlapping_group_ranges(other)
            || self.has_overlapping_scene_ranges(other)
    }

    // ------------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------------

    /// Add a unicast range, merging it with the allocated ones
    ///
    /// Only the sub-space is checked here; use
    /// `MeshNetwork::allocate_unicast_range` for a provisioner of a network.
    pub fn allocate_unicast_range(&mut self, range: AddressRange) -> Result<()> {
        self.allocate_unicast_ranges(&[range])
    }

    pub fn allocate_unicast_ranges(&mut self, ranges: &[AddressRange]) -> Result<()> {
        if !ranges.is_unicast_range() {
            return Err(MeshError::invalid_range());
        }
        self.allocated_unicast_range.add_ranges(ranges);
        Ok(())
    }

    pub fn allocate_group_range(&mut self, range: AddressRange) -> Result<()> {
        self.allocate_group_ranges(&[range])
    }

    pub fn allocate_group_ranges(&mut self, ranges: &[AddressRange]) -> Result<()> {
        if !ranges.is_group_range() {
            return Err(MeshError::invalid_range());
        }
        self.allocated_group_range.add_ranges(ranges);
        Ok(())
    }

    pub fn allocate_scene_range(&mut self, range: SceneRange) -> Result<()> {
        self.allocate_scene_ranges(&[range])
    }

    pub fn allocate_scene_ranges(&mut self, ranges: &[SceneRange]) -> Result<()> {
        if !SceneRangeSet::is_valid(ranges) {
            return Err(MeshError::invalid_range());
        }
        self.allocated_scene_range.add_ranges(ranges);
        Ok(())
    }

    /// Cut the range out of the allocated unicast ranges
    pub fn deallocate_unicast_range(&mut self, range: &AddressRange) {
        self.allocated_unicast_range.subtract_range(range);
    }

    pub fn deallocate_group_range(&mut self, range: &AddressRange) {
        self.allocated_group_range.subtract_range(range);
    }

    pub fn deallocate_scene_range(&mut self, range: &SceneRange) {
        self.allocated_scene_range.subtract_range(range);
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Whether a unicast or group range lies fully inside the allocated ranges
    pub fn has_allocated_address_range(&self, range: &AddressRange) -> bool {
        if range.is_unicast_range() {
            RangeSet::contains_range(self.allocated_unicast_range.as_slice(), range)
        } else if range.is_group_range() {
            RangeSet::contains_range(self.allocated_group_range.as_slice(), range)
        } else {
            false
        }
    }

    pub fn has_allocated_address(&self, address: Address) -> bool {
        self.has_allocated_address_range(&AddressRange::from_address(address, 1))
    }

    pub fn has_allocated_scene(&self, scene: SceneNumber) -> bool {
        scene.is_valid() && self.allocated_scene_range.contains_value(scene.value())
    }

    /// Number of consecutive allocated addresses starting at `address`
    ///
    /// Ignores nodes; `MeshNetwork::max_element_count` accounts for them.
    pub fn max_element_count(&self, address: Address) -> u8 {
        if !address.is_unicast() {
            return 0;
        }
        self.allocated_unicast_range
            .iter()
            .find(|r| r.contains_address(address))
            .map_or(0, |r| {
                let count = r.high_address().value() - address.value() + 1;
                count.min(u16::from(u8::MAX)) as u8
            })
    }
}

impl TryFrom<ProvisionerRecord> for Provisioner {
    type Error = MeshError;

    fn try_from(record: ProvisionerRecord) -> Result<Self> {
        let provisioner = Self {
            name: record.provisioner_name,
            uuid: record.uuid,
            allocated_unicast_range: record.allocated_unicast_range.merged(),
            allocated_group_range: record.allocated_group_range.merged(),
            allocated_scene_range: record.allocated_scene_range.merged(),
        };
        if !provisioner.is_valid() {
            return Err(MeshError::decode(format!(
                "Provisioner '{}' needs a unicast range and ranges within their address spaces",
                provisioner.name
            )));
        }
        Ok(provisioner)
    }
}

impl From<Provisioner> for ProvisionerRecord {
    fn from(provisioner: Provisioner) -> Self {
        Self {
            provisioner_name: provisioner.name,
            uuid: provisioner.uuid,
            allocated_unicast_range: provisioner.allocated_unicast_range,
            allocated_group_range: provisioner.allocated_group_range,
            allocated_scene_range: provisioner.allocated_scene_range,
        }
    }
}

impl fmt::Display for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
