//! Node features: relay, proxy, friend and low power

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single node feature, serialized by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeFeature {
    Relay,
    Proxy,
    Friend,
    LowPower,
}

impl NodeFeature {
    pub const ALL: [NodeFeature; 4] = [Self::Relay, Self::Proxy, Self::Friend, Self::LowPower];

    pub const fn bit(&self) -> u16 {
        match self {
            Self::Relay => 1 << 0,
            Self::Proxy => 1 << 1,
            Self::Friend => 1 << 2,
            Self::LowPower => 1 << 3,
        }
    }
}

/// A set of node features, used by heartbeat publications
///
/// Serialized as an array of feature names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeFeatures(u16);

impl NodeFeatures {
    pub const NONE: Self = Self(0);
    pub const RELAY: Self = Self(1 << 0);
    pub const PROXY: Self = Self(1 << 1);
    pub const FRIEND: Self = Self(1 << 2);
    pub const LOW_POWER: Self = Self(1 << 3);

    /// Bits above the four defined features are ignored
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & 0x000F)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, feature: NodeFeature) -> bool {
        self.0 & feature.bit() != 0
    }

    pub fn insert(&mut self, feature: NodeFeature) {
        self.0 |= feature.bit();
    }

    pub fn remove(&mut self, feature: NodeFeature) {
        self.0 &= !feature.bit();
    }

    pub fn to_vec(&self) -> Vec<NodeFeature> {
        NodeFeature::ALL.into_iter().filter(|f| self.contains(*f)).collect()
    }
}

impl core::ops::BitOr for NodeFeatures {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl FromIterator<NodeFeature> for NodeFeatures {
    fn from_iter<I: IntoIterator<Item = NodeFeature>>(iter: I) -> Self {
        let mut features = Self::NONE;
        for feature in iter {
            features.insert(feature);
        }
        features
    }
}

impl fmt::Display for NodeFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_vec())
    }
}

impl Serialize for NodeFeatures {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        self.to_vec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NodeFeatures {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let features = Vec::<NodeFeature>::deserialize(deserializer)?;
        Ok(features.into_iter().collect())
    }
}

// ----------------------------------------------------------------------------
// Feature State
// ----------------------------------------------------------------------------

/// State of a single feature, serialized as 0, 1 or 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodeFeatureState {
    NotEnabled = 0,
    Enabled = 1,
    NotSupported = 2,
}

impl TryFrom<u8> for NodeFeatureState {
    type Error = crate::errors::MeshError;

    fn try_from(value: u8) -> crate::Result<Self> {
        match value {
            0 => Ok(Self::NotEnabled),
            1 => Ok(Self::Enabled),
            2 => Ok(Self::NotSupported),
            _ => Err(crate::errors::MeshError::decode(format!("Invalid feature state: {}", value))),
        }
    }
}

impl From<NodeFeatureState> for u8 {
    fn from(state: NodeFeatureState) -> Self {
        state as u8
    }
}

impl fmt::Display for NodeFeatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEnabled => write!(f, "Not enabled"),
            Self::Enabled => write!(f, "Enabled"),
            Self::NotSupported => write!(f, "Not supported"),
        }
    }
}

/// Known state of each feature of a node; `None` means unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFeaturesState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<NodeFeatureState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<NodeFeatureState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friend: Option<NodeFeatureState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_power: Option<NodeFeatureState>,
}

impl NodeFeaturesState {
    /// Every feature reported as not supported
    pub const fn not_supported() -> Self {
        Self {
            relay: Some(NodeFeatureState::NotSupported),
            proxy: Some(NodeFeatureState::NotSupported),
            friend: Some(NodeFeatureState::NotSupported),
            low_power: Some(NodeFeatureState::NotSupported),
        }
    }

    /// State derived from the features field of the composition data
    ///
    /// Unsupported features are known. Supported relay, proxy and friend
    /// features remain unknown until queried; a supported low power feature is
    /// always enabled.
    pub fn from_mask(mask: u16) -> Self {
        let unsupported_or_unknown = |bit: u16| {
            if mask & bit == 0 {
                Some(NodeFeatureState::NotSupported)
            } else {
                None
            }
        };
        Self {
            relay: unsupported_or_unknown(0x01),
            proxy: unsupported_or_unknown(0x02),
            friend: unsupported_or_unknown(0x04),
            low_power: Some(if mask & 0x08 == 0 {
                NodeFeatureState::NotSupported
            } else {
                NodeFeatureState::Enabled
            }),
        }
    }

    /// Bit field of features that are not known to be unsupported
    pub fn mask(&self) -> u16 {
        [self.relay, self.proxy, self.friend, self.low_power]
            .iter()
            .enumerate()
            .filter(|(_, state)| **state != Some(NodeFeatureState::NotSupported))
            .fold(0, |bits, (i, _)| bits | 1 << i)
    }

    /// Fill features that are still unknown from `other`
    pub fn apply_missing(&mut self, other: &NodeFeaturesState) {
        self.relay = self.relay.or(other.relay);
        self.proxy = self.proxy.or(other.proxy);
        self.friend = self.friend.or(other.friend);
        self.low_power = self.low_power.or(other.low_power);
    }

    /// Features currently enabled
    pub fn enabled(&self) -> NodeFeatures {
        let mut features = NodeFeatures::NONE;
        let states = [
            (NodeFeature::Relay, self.relay),
            (NodeFeature::Proxy, self.proxy),
            (NodeFeature::Friend, self.friend),
            (NodeFeature::LowPower, self.low_power),
        ];
        for (feature, state) in states {
            if state == Some(NodeFeatureState::Enabled) {
                features.insert(feature);
            }
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_json() {
        let features = NodeFeatures::RELAY | NodeFeatures::LOW_POWER;
        let json = serde_json::to_string(&features).unwrap();
        assert_eq!(json, r#"["relay","lowPower"]"#);
        let decoded: NodeFeatures = serde_json::from_str(r#"["friend","relay"]"#).unwrap();
        assert_eq!(decoded.bits(), 0x05);
    }

    #[test]
    fn test_state_from_mask() {
        let state = NodeFeaturesState::from_mask(0x0009);
        assert_eq!(state.relay, None);
        assert_eq!(state.proxy, Some(NodeFeatureState::NotSupported));
        assert_eq!(state.friend, Some(NodeFeatureState::NotSupported));
        assert_eq!(state.low_power, Some(NodeFeatureState::Enabled));
        assert_eq!(state.mask(), 0x0009);
    }

    #[test]
    fn test_apply_missing() {
        let mut state = NodeFeaturesState::from_mask(0x0003);
        let other = NodeFeaturesState {
            relay: Some(NodeFeatureState::Enabled),
            proxy: Some(NodeFeatureState::NotEnabled),
            friend: Some(NodeFeatureState::Enabled),
            low_power: None,
        };
        state.apply_missing(&other);
        assert_eq!(state.relay, Some(NodeFeatureState::Enabled));
        assert_eq!(state.proxy, Some(NodeFeatureState::NotEnabled));
        // Already known, not overwritten.
        assert_eq!(state.friend, Some(NodeFeatureState::NotSupported));
        assert_eq!(state.enabled(), NodeFeatures::RELAY);
    }

    #[test]
    fn test_state_json() {
        let state: NodeFeaturesState = serde_json::from_str(r#"{"relay": 1, "lowPower": 2}"#).unwrap();
        assert_eq!(state.relay, Some(NodeFeatureState::Enabled));
        assert_eq!(state.proxy, None);
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"relay":1,"lowPower":2}"#);
    }
}
