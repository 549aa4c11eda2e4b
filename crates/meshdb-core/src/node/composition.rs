//! Composition Data Page 0

use crate::element::Element;
use crate::errors::ValidationError;
use crate::node::NodeFeaturesState;
use crate::Result;

/// Contents of Composition Data Page 0 as reported by a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionDataPage0 {
    pub company_identifier: u16,
    pub product_identifier: u16,
    pub version_identifier: u16,
    pub minimum_number_of_replay_protection_list: u16,
    pub features: NodeFeaturesState,
    pub elements: Vec<Element>,
}

impl CompositionDataPage0 {
    const HEADER_LEN: usize = 10;

    /// Parse the page, excluding the leading page number byte
    ///
    /// Layout: CID, PID, VID, CRPL and the features bit field (all
    /// little-endian `u16`), followed by element entries until the end.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::HEADER_LEN {
            return Err(ValidationError::InvalidCompositionData {
                reason: format!("expected at least {} bytes, got {}", Self::HEADER_LEN, data.len()),
            }
            .into());
        }
        let field = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);

        let mut elements = Vec::new();
        let mut offset = Self::HEADER_LEN;
        while offset < data.len() {
            let (element, consumed) = Element::from_composition_data(&data[offset..])?;
            elements.push(element);
            offset += consumed;
        }

        Ok(Self {
            company_identifier: field(0),
            product_identifier: field(2),
            version_identifier: field(4),
            minimum_number_of_replay_protection_list: field(6),
            features: NodeFeaturesState::from_mask(field(8)),
            elements,
        })
    }
}
