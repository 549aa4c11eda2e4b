//! Models hosted by an element
//!
//! A model is identified by a 32-bit id. SIG models use the lower 16 bits
//! only; vendor models carry the company identifier in the upper 16 bits.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::MeshAddress;
use crate::errors::{MeshError, ValidationError};
use crate::key::{is_valid_key_index, KeyIndex};
use crate::publish::Publish;
use crate::Result;

/// Identifiers of SIG models the database treats specially
pub mod ids {
    pub const CONFIGURATION_SERVER: u16 = 0x0000;
    pub const CONFIGURATION_CLIENT: u16 = 0x0001;
    pub const HEALTH_SERVER: u16 = 0x0002;
    pub const HEALTH_CLIENT: u16 = 0x0003;
    pub const REMOTE_PROVISIONING_SERVER: u16 = 0x0004;
    pub const REMOTE_PROVISIONING_CLIENT: u16 = 0x0005;
    pub const DIRECTED_FORWARDING_CONFIGURATION_SERVER: u16 = 0x0006;
    pub const DIRECTED_FORWARDING_CONFIGURATION_CLIENT: u16 = 0x0007;
    pub const BRIDGE_CONFIGURATION_SERVER: u16 = 0x0008;
    pub const BRIDGE_CONFIGURATION_CLIENT: u16 = 0x0009;
    pub const PRIVATE_BEACON_SERVER: u16 = 0x000A;
    pub const PRIVATE_BEACON_CLIENT: u16 = 0x000B;
    pub const ON_DEMAND_PRIVATE_PROXY_SERVER: u16 = 0x000C;
    pub const ON_DEMAND_PRIVATE_PROXY_CLIENT: u16 = 0x000D;
    pub const SAR_CONFIGURATION_SERVER: u16 = 0x000E;
    pub const SAR_CONFIGURATION_CLIENT: u16 = 0x000F;
    pub const OPCODES_AGGREGATOR_SERVER: u16 = 0x0010;
    pub const OPCODES_AGGREGATOR_CLIENT: u16 = 0x0011;
    pub const LARGE_COMPOSITION_DATA_SERVER: u16 = 0x0012;
    pub const LARGE_COMPOSITION_DATA_CLIENT: u16 = 0x0013;
    pub const GENERIC_ON_OFF_SERVER: u16 = 0x1000;
    pub const GENERIC_ON_OFF_CLIENT: u16 = 0x1001;
    pub const SCENE_SERVER: u16 = 0x1203;
    pub const SCENE_SETUP_SERVER: u16 = 0x1204;
    pub const SCENE_CLIENT: u16 = 0x1205;

    /// Models whose messages are secured with the device key
    pub(crate) const DEVICE_KEY_MODELS: [u16; 16] = [
        CONFIGURATION_SERVER,
        CONFIGURATION_CLIENT,
        REMOTE_PROVISIONING_SERVER,
        REMOTE_PROVISIONING_CLIENT,
        DIRECTED_FORWARDING_CONFIGURATION_SERVER,
        DIRECTED_FORWARDING_CONFIGURATION_CLIENT,
        BRIDGE_CONFIGURATION_SERVER,
        BRIDGE_CONFIGURATION_CLIENT,
        PRIVATE_BEACON_SERVER,
        PRIVATE_BEACON_CLIENT,
        ON_DEMAND_PRIVATE_PROXY_SERVER,
        ON_DEMAND_PRIVATE_PROXY_CLIENT,
        SAR_CONFIGURATION_SERVER,
        SAR_CONFIGURATION_CLIENT,
        LARGE_COMPOSITION_DATA_SERVER,
        LARGE_COMPOSITION_DATA_CLIENT,
    ];
}

/// Model id; 4 hex characters for SIG models, 8 for vendor models
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelId(u32);

impl ModelId {
    pub const fn sig(model_id: u16) -> Self {
        Self(model_id as u32)
    }

    pub const fn vendor(company_id: u16, model_id: u16) -> Self {
        Self((company_id as u32) << 16 | model_id as u32)
    }

    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Bits 0-15
    pub const fn model_identifier(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Bits 16-31, for vendor models only
    pub const fn company_identifier(&self) -> Option<u16> {
        if self.is_bluetooth_sig_assigned() {
            None
        } else {
            Some((self.0 >> 16) as u16)
        }
    }

    pub const fn is_bluetooth_sig_assigned(&self) -> bool {
        self.0 <= 0xFFFF
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bluetooth_sig_assigned() {
            write!(f, "{:04X}", self.0)
        } else {
            write!(f, "{:08X}", self.0)
        }
    }
}

impl Serialize for ModelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let value = match s.len() {
            4 | 8 => u32::from_str_radix(&s, 16).ok(),
            _ => None,
        };
        value
            .map(Self)
            .ok_or_else(|| serde::de::Error::custom(format!("Model ID must be 4 or 8-character hexadecimal string: {}", s)))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelRecord {
    model_id: ModelId,
    #[serde(default)]
    subscribe: Vec<MeshAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    publish: Option<Publish>,
    #[serde(default)]
    bind: Vec<KeyIndex>,
}

/// A model with its key bindings, subscriptions and publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ModelRecord", into = "ModelRecord")]
pub struct Model {
    model_id: ModelId,
    subscribe: Vec<MeshAddress>,
    publish: Option<Publish>,
    bind: Vec<KeyIndex>,
}

impl Model {
    pub fn new(model_id: ModelId) -> Self {
        Self {
            model_id,
            subscribe: Vec::new(),
            publish: None,
            bind: Vec::new(),
        }
    }

    pub fn sig(model_id: u16) -> Self {
        Self::new(ModelId::sig(model_id))
    }

    pub fn vendor(company_id: u16, model_id: u16) -> Self {
        Self::new(ModelId::vendor(company_id, model_id))
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn subscriptions(&self) -> &[MeshAddress] {
        &self.subscribe
    }

    pub fn publication(&self) -> Option<&Publish> {
        self.publish.as_ref()
    }

    /// Bound application key indexes, sorted
    pub fn bound_keys(&self) -> &[KeyIndex] {
        &self.bind
    }

    pub fn is_bound_to(&self, index: KeyIndex) -> bool {
        self.bind.binary_search(&index).is_ok()
    }

    pub fn is_subscribed_to(&self, address: &MeshAddress) -> bool {
        self.subscribe.iter().any(|a| a.address() == address.address())
    }

    /// Configuration and other foundation models use the device key only
    pub fn requires_device_key(&self) -> bool {
        self.model_id.is_bluetooth_sig_assigned()
            && ids::DEVICE_KEY_MODELS.contains(&self.model_id.model_identifier())
    }

    pub fn supports_device_key(&self) -> bool {
        self.requires_device_key()
            || self.model_id == ModelId::sig(ids::OPCODES_AGGREGATOR_SERVER)
            || self.model_id == ModelId::sig(ids::OPCODES_AGGREGATOR_CLIENT)
    }

    // ------------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------------

    pub fn bind(&mut self, index: KeyIndex) -> Result<()> {
        if !is_valid_key_index(index) {
            return Err(ValidationError::KeyIndexOutOfRange { index }.into());
        }
        if let Err(position) = self.bind.binary_search(&index) {
            self.bind.insert(position, index);
        }
        Ok(())
    }

    /// Remove a binding; a publication using that key is cancelled too
    pub fn unbind(&mut self, index: KeyIndex) {
        if let Ok(position) = self.bind.binary_search(&index) {
            self.bind.remove(position);
            if self.publish.map_or(false, |p| p.index == index) {
                self.publish = None;
            }
        }
    }

    pub fn set_bound_keys(&mut self, mut indexes: Vec<KeyIndex>) {
        indexes.sort_unstable();
        indexes.dedup();
        self.bind = indexes;
    }

    // ------------------------------------------------------------------------
    // Publication and Subscriptions
    // ------------------------------------------------------------------------

    pub fn set_publication(&mut self, publish: Publish) {
        self.publish = Some(publish);
    }

    pub fn clear_publication(&mut self) {
        self.publish = None;
    }

    /// Subscribe to a group or virtual address
    pub fn subscribe(&mut self, address: MeshAddress) -> Result<()> {
        if !address.is_subscribable() {
            return Err(MeshError::invalid_address(address.address()));
        }
        if !self.is_subscribed_to(&address) {
            self.subscribe.push(address);
        }
        Ok(())
    }

    pub fn unsubscribe(&mut self, address: &MeshAddress) {
        self.subscribe.retain(|a| a.address() != address.address());
    }

    pub fn unsubscribe_all(&mut self) {
        self.subscribe.clear();
    }

    /// Copy bindings, subscriptions and publication from another model
    pub fn copy_state_from(&mut self, other: &Model) {
        self.bind = other.bind.clone();
        self.subscribe = other.subscribe.clone();
        self.publish = other.publish;
    }

    /// Drop every binding to keys other than `keep`
    pub(crate) fn retain_keys(&mut self, keep: impl Fn(KeyIndex) -> bool) {
        self.bind.retain(|index| keep(*index));
        if self.publish.map_or(false, |p| !keep(p.index)) {
            self.publish = None;
        }
    }

    pub(crate) fn retain_subscriptions(&mut self, keep: impl Fn(&MeshAddress) -> bool) {
        self.subscribe.retain(|address| keep(address));
    }
}

impl TryFrom<ModelRecord> for Model {
    type Error = MeshError;

    fn try_from(record: ModelRecord) -> Result<Self> {
        if let Some(address) = record.subscribe.iter().find(|a| !a.is_subscribable()) {
            return Err(MeshError::decode(format!(
                "Subscription address {} must be of group or virtual type",
                address
            )));
        }
        if let Some(index) = record.bind.iter().find(|i| !is_valid_key_index(**i)) {
            return Err(ValidationError::KeyIndexOutOfRange { index: *index }.into());
        }
        let mut model = Self::new(record.model_id);
        model.subscribe = record.subscribe;
        model.publish = record.publish;
        model.set_bound_keys(record.bind);
        Ok(model)
    }
}

impl From<Model> for ModelRecord {
    fn from(model: Model) -> Self {
        Self {
            model_id: model.model_id,
            subscribe: model.subscribe,
            publish: model.publish,
            bind: model.bind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    #[test]
    fn test_model_id() {
        let sig = ModelId::sig(0x1000);
        assert!(sig.is_bluetooth_sig_assigned());
        assert_eq!(sig.company_identifier(), None);
        assert_eq!(sig.to_string(), "1000");

        let vendor = ModelId::vendor(0x0059, 0x0001);
        assert_eq!(vendor.value(), 0x0059_0001);
        assert_eq!(vendor.company_identifier(), Some(0x0059));
        assert_eq!(vendor.model_identifier(), 0x0001);
        assert_eq!(vendor.to_string(), "00590001");
    }

    #[test]
    fn test_bind_keeps_sorted() {
        let mut model = Model::sig(ids::GENERIC_ON_OFF_SERVER);
        model.bind(3).unwrap();
        model.bind(1).unwrap();
        model.bind(3).unwrap();
        assert_eq!(model.bound_keys(), &[1, 3]);
        assert!(model.bind(4096).is_err());
    }

    #[test]
    fn test_unbind_clears_publication() {
        let mut model = Model::sig(ids::GENERIC_ON_OFF_SERVER);
        model.bind(1).unwrap();
        model.bind(2).unwrap();
        model.set_publication(Publish::to(MeshAddress::new(Address::new(0xC000)), 1));

        model.unbind(2);
        assert!(model.publication().is_some());
        model.unbind(1);
        assert!(model.publication().is_none());
        assert!(model.bound_keys().is_empty());
    }

    #[test]
    fn test_subscribe() {
        let mut model = Model::sig(ids::GENERIC_ON_OFF_SERVER);
        let group = MeshAddress::new(Address::new(0xC001));
        model.subscribe(group).unwrap();
        model.subscribe(group).unwrap();
        assert_eq!(model.subscriptions().len(), 1);

        let err = model.subscribe(MeshAddress::new(Address::new(0x0001))).unwrap_err();
        assert!(err.is_validation());

        model.unsubscribe(&group);
        assert!(model.subscriptions().is_empty());
    }

    #[test]
    fn test_requires_device_key() {
        assert!(Model::sig(ids::CONFIGURATION_SERVER).requires_device_key());
        assert!(!Model::sig(ids::HEALTH_SERVER).requires_device_key());
        assert!(Model::sig(ids::OPCODES_AGGREGATOR_CLIENT).supports_device_key());
        assert!(!Model::vendor(0x0001, 0x0000).requires_device_key());
    }

    #[test]
    fn test_model_json() {
        let json = r#"{"modelId": "00590001", "subscribe": ["C000"], "bind": [2, 0]}"#;
        let model: Model = serde_json::from_str(json).unwrap();
        assert_eq!(model.model_id(), ModelId::vendor(0x0059, 0x0001));
        assert_eq!(model.bound_keys(), &[0, 2]);

        let encoded = serde_json::to_value(&model).unwrap();
        assert_eq!(encoded["modelId"], "00590001");
        assert!(encoded.get("publish").is_none());

        assert!(serde_json::from_str::<Model>(r#"{"modelId": "1000", "subscribe": ["0001"], "bind": []}"#).is_err());
        assert!(serde_json::from_str::<Model>(r#"{"modelId": "100", "subscribe": [], "bind": []}"#).is_err());
    }
}
