//! Range allocation across the provisioners of the network
//!
//! Ranges of different provisioners never overlap. The `next_available_*`
//! functions look for gaps between the ranges of all provisioners; when no
//! gap is large enough the largest one is returned.

use tracing::debug;
use uuid::Uuid;

use super::MeshNetwork;
use crate::address::{Address, SceneNumber};
use crate::errors::{ConflictError, MeshError};
use crate::provisioner::Provisioner;
use crate::range::{next_available_range, AddressRange, RangeObject, RangeSet, SceneRange};
use crate::Result;

fn sorted<T: RangeObject>(ranges: impl Iterator<Item = T>) -> Vec<T> {
    let mut ranges: Vec<T> = ranges.collect();
    ranges.sort_by_key(|r| r.lower_bound());
    ranges
}

impl MeshNetwork {
    // ------------------------------------------------------------------------
    // Availability
    // ------------------------------------------------------------------------

    /// Whether no provisioner owns any part of the range
    pub fn is_range_available_for_allocation(&self, range: &AddressRange) -> bool {
        self.is_address_range_free(range, None)
    }

    pub fn is_scene_range_available_for_allocation(&self, range: &SceneRange) -> bool {
        self.is_scene_range_free(range, None)
    }

    /// Whether no provisioner other than the given one owns any part of the range
    pub fn is_range_available_for_allocation_to(&self, range: &AddressRange, provisioner: Uuid) -> bool {
        self.is_address_range_free(range, Some(provisioner))
    }

    pub fn is_scene_range_available_for_allocation_to(&self, range: &SceneRange, provisioner: Uuid) -> bool {
        self.is_scene_range_free(range, Some(provisioner))
    }

    fn is_address_range_free(&self, range: &AddressRange, except: Option<Uuid>) -> bool {
        let others = self.provisioners.iter().filter(|p| Some(p.uuid()) != except);
        if range.is_unicast_range() {
            return !others.into_iter().any(|p| p.allocated_unicast_range().overlaps_range(range));
        }
        if range.is_group_range() {
            return !others.into_iter().any(|p| p.allocated_group_range().overlaps_range(range));
        }
        false
    }

    fn is_scene_range_free(&self, range: &SceneRange, except: Option<Uuid>) -> bool {
        range.is_valid()
            && !self
                .provisioners
                .iter()
                .filter(|p| Some(p.uuid()) != except)
                .any(|p| p.allocated_scene_range().overlaps_range(range))
    }

    // ------------------------------------------------------------------------
    // Next Available Range
    // ------------------------------------------------------------------------

    /// A unicast range of `size` addresses not owned by any provisioner
    ///
    /// Pass `u16::MAX` to get the largest free range.
    pub fn next_available_unicast_address_range(&self, size: u16) -> Option<AddressRange> {
        let taken = sorted(self.provisioners.iter().flat_map(|p| p.allocated_unicast_range().iter().copied()));
        next_available_range(
            size,
            (Address::MIN_UNICAST.value(), Address::MAX_UNICAST.value()),
            &taken,
        )
    }

    pub fn next_available_group_address_range(&self, size: u16) -> Option<AddressRange> {
        let taken = sorted(self.provisioners.iter().flat_map(|p| p.allocated_group_range().iter().copied()));
        next_available_range(size, (Address::MIN_GROUP.value(), Address::MAX_GROUP.value()), &taken)
    }

    pub fn next_available_scene_range(&self, size: u16) -> Option<SceneRange> {
        let taken = sorted(self.provisioners.iter().flat_map(|p| p.allocated_scene_range().iter().copied()));
        next_available_range(size, (SceneNumber::MIN.value(), SceneNumber::MAX.value()), &taken)
    }

    // ------------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------------

    fn provisioner_mut(&mut self, uuid: Uuid) -> Result<&mut Provisioner> {
        self.provisioners
            .iter_mut()
            .find(|p| p.uuid() == uuid)
            .ok_or_else(|| ConflictError::ProvisionerNotInNetwork { uuid }.into())
    }

    /// Allocate a unicast range to a provisioner of the network
    pub fn allocate_unicast_range(&mut self, provisioner: Uuid, range: AddressRange) -> Result<()> {
        if !self.contains_provisioner(provisioner) {
            return Err(ConflictError::ProvisionerNotInNetwork { uuid: provisioner }.into());
        }
        if !range.is_unicast_range() {
            return Err(MeshError::invalid_range());
        }
        if !self.is_range_available_for_allocation_to(&range, provisioner) {
            return Err(ConflictError::OverlappingProvisionerRanges.into());
        }
        self.provisioner_mut(provisioner)?.allocate_unicast_range(range)?;
        self.touch();
        debug!("Allocated {} to provisioner {}", range, provisioner);
        Ok(())
    }

    pub fn allocate_group_range(&mut self, provisioner: Uuid, range: AddressRange) -> Result<()> {
        if !self.contains_provisioner(provisioner) {
            return Err(ConflictError::ProvisionerNotInNetwork { uuid: provisioner }.into());
        }
        if !range.is_group_range() {
            return Err(MeshError::invalid_range());
        }
        if !self.is_range_available_for_allocation_to(&range, provisioner) {
            return Err(ConflictError::OverlappingProvisionerRanges.into());
        }
        self.provisioner_mut(provisioner)?.allocate_group_range(range)?;
        self.touch();
        debug!("Allocated {} to provisioner {}", range, provisioner);
        Ok(())
    }

    pub fn allocate_scene_range(&mut self, provisioner: Uuid, range: SceneRange) -> Result<()> {
        if !self.contains_provisioner(provisioner) {
            return Err(ConflictError::ProvisionerNotInNetwork { uuid: provisioner }.into());
        }
        if !range.is_valid() {
            return Err(MeshError::invalid_range());
        }
        if !self.is_scene_range_available_for_allocation_to(&range, provisioner) {
            return Err(ConflictError::OverlappingProvisionerRanges.into());
        }
        self.provisioner_mut(provisioner)?.allocate_scene_range(range)?;
        self.touch();
        debug!("Allocated {} to provisioner {}", range, provisioner);
        Ok(())
    }

    /// Release part of a provisioner's ranges
    ///
    /// Fails if the provisioner would be left without any unicast range.
    pub fn deallocate_range(&mut self, provisioner: Uuid, range: &AddressRange) -> Result<()> {
        let target = self.provisioner_mut(provisioner)?;
        let mut updated = target.clone();
        if range.is_unicast_range() {
            updated.deallocate_unicast_range(range);
        } else {
            updated.deallocate_group_range(range);
        }
        if !updated.is_valid() {
            return Err(MeshError::invalid_range());
        }
        *target = updated;
        self.touch();
        debug!("Released {} from provisioner {}", range, provisioner);
        Ok(())
    }

    pub fn deallocate_scene_range(&mut self, provisioner: Uuid, range: &SceneRange) -> Result<()> {
        self.provisioner_mut(provisioner)?.deallocate_scene_range(range);
        self.touch();
        debug!("Released {} from provisioner {}", range, provisioner);
        Ok(())
    }
}
