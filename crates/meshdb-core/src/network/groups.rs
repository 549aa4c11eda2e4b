//! Groups and the group hierarchy

use tracing::{debug, info};

use super::MeshNetwork;
use crate::address::Address;
use crate::errors::{ConflictError, MeshError, PolicyError};
use crate::group::Group;
use crate::Result;

impl MeshNetwork {
    pub fn group(&self, address: Address) -> Option<&Group> {
        self.groups.iter().find(|g| g.address().address() == address)
    }

    fn group_mut(&mut self, address: Address) -> Result<&mut Group> {
        self.groups
            .iter_mut()
            .find(|g| g.address().address() == address)
            .ok_or_else(|| MeshError::not_found(format!("Group 0x{}", address)))
    }

    pub fn add_group(&mut self, group: Group) -> Result<()> {
        let address = group.address().address();
        if group.is_special() {
            return Err(MeshError::invalid_address(address));
        }
        if self.group(address).is_some() {
            return Err(ConflictError::GroupAlreadyExists { address }.into());
        }
        info!("Added group {}", group);
        self.groups.push(group);
        self.touch();
        Ok(())
    }

    /// Remove a group that is not in use
    pub fn remove_group(&mut self, address: Address) -> Result<Group> {
        let position = self
            .groups
            .iter()
            .position(|g| g.address().address() == address)
            .ok_or_else(|| MeshError::not_found(format!("Group 0x{}", address)))?;
        if self.group_is_used(&self.groups[position]) {
            return Err(PolicyError::GroupInUse { address }.into());
        }
        let group = self.groups.remove(position);
        self.touch();
        info!("Removed group {}", group);
        Ok(group)
    }

    /// A group is in use when it is special, when it is the parent of
    /// another group, or when any model publishes or subscribes to it
    pub fn group_is_used(&self, group: &Group) -> bool {
        if group.is_special() {
            return true;
        }
        if self.groups.iter().any(|g| group.is_direct_parent_of(g)) {
            return true;
        }
        let address = group.address();
        self.nodes.iter().flat_map(|n| n.models()).any(|m| {
            m.publication().map_or(false, |p| &p.address == address) || m.is_subscribed_to(address)
        })
    }

    // ------------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------------

    pub fn group_parent(&self, group: &Group) -> Option<&Group> {
        let parent = group.parent_address()?;
        self.groups.iter().find(|g| g.address() == parent)
    }

    /// Direct children of the group
    pub fn group_children<'a>(&'a self, group: &'a Group) -> impl Iterator<Item = &'a Group> {
        self.groups.iter().filter(move |g| g.is_direct_child_of(group))
    }

    /// Whether `parent` is an ancestor of `child`
    pub fn is_group_child_of(&self, child: &Group, parent: &Group) -> bool {
        let mut current = child;
        // A hierarchy is never deeper than the number of groups
        for _ in 0..self.groups.len() {
            match self.group_parent(current) {
                Some(p) if p.address() == parent.address() => return true,
                Some(p) => current = p,
                None => return false,
            }
        }
        false
    }

    /// Set or clear the parent of a group
    ///
    /// Special groups take no part in the hierarchy, and a group cannot
    /// become a descendant of itself.
    pub fn set_group_parent(&mut self, child: Address, parent: Option<Address>) -> Result<()> {
        let child_group = self
            .group(child)
            .ok_or_else(|| MeshError::not_found(format!("Group 0x{}", child)))?;
        let parent_address = match parent {
            None => None,
            Some(address) => {
                let parent_group = self
                    .group(address)
                    .ok_or_else(|| MeshError::not_found(format!("Group 0x{}", address)))?;
                if address == child || self.is_group_child_of(parent_group, child_group) {
                    return Err(MeshError::invalid_address(address));
                }
                Some(*parent_group.address())
            }
        };
        self.group_mut(child)?.set_parent_address(parent_address);
        self.touch();
        debug!("Group 0x{} parent set to {:?}", child, parent);
        Ok(())
    }
}
