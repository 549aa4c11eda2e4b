//! Unicast and group address assignment

use super::MeshNetwork;
use crate::address::Address;
use crate::provisioner::Provisioner;

impl MeshNetwork {
    /// Unicast addresses of all elements and excluded addresses, sorted
    fn used_unicast_addresses(&self) -> Vec<u32> {
        let mut used: Vec<u32> = self
            .network_exclusions
            .excluded_addresses(self.iv_index, self.exclusion_window)
            .into_iter()
            .map(|a| u32::from(a.value()))
            .collect();
        for node in &self.nodes {
            let range = node.unicast_range();
            used.extend(u32::from(range.low_address().value())..=u32::from(range.high_address().value()));
        }
        used.sort_unstable();
        used
    }

    /// The lowest address at or above `offset` from which `element_count`
    /// consecutive addresses are free, taken from the provisioner's ranges
    ///
    /// Returns `None` when the allocated ranges are exhausted.
    pub fn next_available_unicast_address(
        &self,
        offset: Address,
        element_count: u8,
        provisioner: &Provisioner,
    ) -> Option<Address> {
        let used = self.used_unicast_addresses();
        let count = u32::from(element_count.max(1));
        let offset = u32::from(offset.value());

        for range in provisioner.allocated_unicast_range() {
            let low = u32::from(range.low_address().value());
            let high = u32::from(range.high_address().value());
            let mut address = if low < offset && offset <= high { offset } else { low };

            for &used_address in &used {
                if address > used_address {
                    continue;
                }
                if address + count - 1 < used_address {
                    break;
                }
                address = used_address + 1;
                if address + count - 1 > high {
                    break;
                }
            }
            if address + count - 1 <= high {
                return Some(Address::new(address as u16));
            }
        }
        None
    }

    /// Number of elements a node of `provisioner` could have with its
    /// primary element at `address`
    ///
    /// Limited by the provisioner's ranges, by other nodes and by excluded
    /// addresses. The provisioner's own node does not count.
    pub fn max_element_count(&self, provisioner: &Provisioner, address: Address) -> u8 {
        let allocated = u32::from(provisioner.max_element_count(address));
        if allocated == 0 {
            return 0;
        }
        let start = u32::from(address.value());
        let next_used = self
            .network_exclusions
            .excluded_addresses(self.iv_index, self.exclusion_window)
            .into_iter()
            .map(|a| u32::from(a.value()))
            .chain(
                self.nodes
                    .iter()
                    .filter(|n| n.uuid() != provisioner.uuid())
                    .map(|n| {
                        let range = n.unicast_range();
                        let low = u32::from(range.low_address().value());
                        let high = u32::from(range.high_address().value());
                        // A node covering `address` leaves no room at all
                        if low <= start && start <= high {
                            start
                        } else {
                            low
                        }
                    }),
            )
            .filter(|&a| a >= start)
            .min();
        match next_used {
            Some(used) => allocated.min(used - start) as u8,
            None => allocated as u8,
        }
    }

    /// The lowest group address of the provisioner's ranges not used by a group
    pub fn next_available_group_address(&self, provisioner: &Provisioner) -> Option<Address> {
        let mut used: Vec<u32> = self
            .groups
            .iter()
            .map(|g| g.address().address())
            .filter(|a| a.is_group())
            .map(|a| u32::from(a.value()))
            .collect();
        used.sort_unstable();

        for range in provisioner.allocated_group_range() {
            let high = u32::from(range.high_address().value());
            let mut address = u32::from(range.low_address().value());
            for &used_address in &used {
                if address > used_address {
                    continue;
                }
                if address < used_address {
                    break;
                }
                address = used_address + 1;
            }
            if address <= high {
                return Some(Address::new(address as u16));
            }
        }
        None
    }
}
