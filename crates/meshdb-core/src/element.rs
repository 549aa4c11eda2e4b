//! Elements and their location descriptors

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::parse_hex_u16;
use crate::errors::ValidationError;
use crate::model::{ids, Model, ModelId};
use crate::Result;

// ----------------------------------------------------------------------------
// Location
// ----------------------------------------------------------------------------

/// GATT Namespace Descriptor of an element, `0x0000..=0x0110`
///
/// Values `0x0001..=0x00FF` are ordinals ("first" to "two hundred fifty-fifth").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location(u16);

const LOCATION_NAMES: [&str; 17] = [
    "Front",
    "Back",
    "Top",
    "Bottom",
    "Upper",
    "Lower",
    "Main",
    "Backup",
    "Auxiliary",
    "Supplementary",
    "Flash",
    "Inside",
    "Outside",
    "Left",
    "Right",
    "Internal",
    "External",
];

impl Location {
    pub const UNKNOWN: Self = Self(0x0000);
    pub const FRONT: Self = Self(0x0100);
    pub const BACK: Self = Self(0x0101);
    pub const TOP: Self = Self(0x0102);
    pub const BOTTOM: Self = Self(0x0103);
    pub const UPPER: Self = Self(0x0104);
    pub const LOWER: Self = Self(0x0105);
    pub const MAIN: Self = Self(0x0106);
    pub const BACKUP: Self = Self(0x0107);
    pub const AUXILIARY: Self = Self(0x0108);
    pub const SUPPLEMENTARY: Self = Self(0x0109);
    pub const FLASH: Self = Self(0x010A);
    pub const INSIDE: Self = Self(0x010B);
    pub const OUTSIDE: Self = Self(0x010C);
    pub const LEFT: Self = Self(0x010D);
    pub const RIGHT: Self = Self(0x010E);
    pub const INTERNAL: Self = Self(0x010F);
    pub const EXTERNAL: Self = Self(0x0110);

    /// `None` for values outside of the namespace
    pub const fn new(value: u16) -> Option<Self> {
        if value <= 0x0110 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Ordinal location, e.g. `ordinal(1)` is "first"
    pub const fn ordinal(n: u8) -> Self {
        Self(n as u16)
    }

    pub const fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0x0000 => write!(f, "Unknown"),
            n @ 0x0001..=0x00FF => write!(f, "#{}", n),
            n => write!(f, "{}", LOCATION_NAMES[usize::from(n - 0x0100)]),
        }
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("{:04X}", self.0))
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let value = parse_hex_u16(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("Location must be 4-character hexadecimal string: {}", s)))?;
        Self::new(value).ok_or_else(|| serde::de::Error::custom(format!("Unknown location: 0x{}", s)))
    }
}

// ----------------------------------------------------------------------------
// Element
// ----------------------------------------------------------------------------

/// An addressable part of a node
///
/// The unicast address of an element is the node's primary address plus the
/// element index. The index is assigned when the element is added to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub(crate) index: u8,
    pub location: Location,
    #[serde(default)]
    pub(crate) models: Vec<Model>,
}

impl Element {
    pub const PRIMARY_ELEMENT_NAME: &'static str = "Primary Element";

    pub fn new(name: Option<String>, location: Location, models: Vec<Model>) -> Self {
        Self {
            name,
            index: 0,
            location,
            models,
        }
    }

    /// An element with no models
    pub fn empty(location: Location) -> Self {
        Self::new(None, location, Vec::new())
    }

    /// The primary element of a provisioner's node, with the configuration
    /// and health server and client models
    pub fn primary() -> Self {
        Self::new(
            Some(Self::PRIMARY_ELEMENT_NAME.to_string()),
            Location::UNKNOWN,
            vec![
                Model::sig(ids::CONFIGURATION_SERVER),
                Model::sig(ids::CONFIGURATION_CLIENT),
                Model::sig(ids::HEALTH_SERVER),
                Model::sig(ids::HEALTH_CLIENT),
            ],
        )
    }

    /// Parse one element entry of Composition Data Page 0
    ///
    /// Returns the element and the number of bytes consumed.
    pub fn from_composition_data(data: &[u8]) -> Result<(Self, usize)> {
        let header = data.get(..4).ok_or_else(|| truncated("element header"))?;
        let location = u16::from_le_bytes([header[0], header[1]]);
        let sig_count = usize::from(header[2]);
        let vendor_count = usize::from(header[3]);

        let mut offset = 4;
        let mut models = Vec::with_capacity(sig_count + vendor_count);
        for _ in 0..sig_count {
            let bytes = data.get(offset..offset + 2).ok_or_else(|| truncated("SIG model"))?;
            models.push(Model::new(ModelId::sig(u16::from_le_bytes([bytes[0], bytes[1]]))));
            offset += 2;
        }
        for _ in 0..vendor_count {
            let bytes = data.get(offset..offset + 4).ok_or_else(|| truncated("vendor model"))?;
            let company_id = u16::from_le_bytes([bytes[0], bytes[1]]);
            let model_id = u16::from_le_bytes([bytes[2], bytes[3]]);
            models.push(Model::new(ModelId::vendor(company_id, model_id)));
            offset += 4;
        }

        let location = Location::new(location).unwrap_or(Location::UNKNOWN);
        Ok((Self::new(None, location, models), offset))
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn is_primary(&self) -> bool {
        self.index == 0
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut [Model] {
        &mut self.models
    }

    pub fn add_model(&mut self, model: Model) {
        self.models.push(model);
    }

    pub fn model(&self, model_id: ModelId) -> Option<&Model> {
        self.models.iter().find(|m| m.model_id() == model_id)
    }

    pub fn model_mut(&mut self, model_id: ModelId) -> Option<&mut Model> {
        self.models.iter_mut().find(|m| m.model_id() == model_id)
    }

    pub fn contains_model(&self, model_id: ModelId) -> bool {
        self.model(model_id).is_some()
    }
}

fn truncated(what: &str) -> crate::errors::MeshError {
    ValidationError::InvalidCompositionData {
        reason: format!("truncated {}", what),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location() {
        assert_eq!(Location::UNKNOWN.to_string(), "Unknown");
        assert_eq!(Location::ordinal(3).to_string(), "#3");
        assert_eq!(Location::FRONT.to_string(), "Front");
        assert_eq!(Location::EXTERNAL.to_string(), "External");
        assert!(Location::new(0x0111).is_none());
    }

    #[test]
    fn test_primary_element() {
        let element = Element::primary();
        assert_eq!(element.name.as_deref(), Some("Primary Element"));
        assert_eq!(element.models().len(), 4);
        assert!(element.contains_model(ModelId::sig(ids::HEALTH_CLIENT)));
    }

    #[test]
    fn test_parse_composition_element() {
        // Location 0x0100, 2 SIG models, 1 vendor model
        let data = [0x00, 0x01, 0x02, 0x01, 0x00, 0x00, 0x00, 0x10, 0x59, 0x00, 0x01, 0x00, 0xFF];
        let (element, consumed) = Element::from_composition_data(&data).unwrap();
        assert_eq!(consumed, 12);
        assert_eq!(element.location, Location::FRONT);
        assert_eq!(element.models()[1].model_id(), ModelId::sig(0x1000));
        assert_eq!(element.models()[2].model_id(), ModelId::vendor(0x0059, 0x0001));

        assert!(Element::from_composition_data(&data[..7]).is_err());
    }

    #[test]
    fn test_element_json() {
        let json = r#"{"name": "Light", "index": 1, "location": "010D", "models": []}"#;
        let element: Element = serde_json::from_str(json).unwrap();
        assert_eq!(element.index(), 1);
        assert_eq!(element.location, Location::LEFT);
        assert_eq!(serde_json::to_value(&element).unwrap()["location"], "010D");

        assert!(serde_json::from_str::<Element>(&json.replace("010D", "0200")).is_err());
    }
}
