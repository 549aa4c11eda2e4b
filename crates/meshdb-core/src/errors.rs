//! Error types for the mesh network database
//!
//! Failures are grouped by kind: validation of caller input, conflicts with the
//! current state of the network, and policy refusals. `MeshError` unifies them
//! together with decoding and serialization failures.

use uuid::Uuid;

use crate::address::Address;
use crate::key::KeyIndex;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Caller input that can never be accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Key index {index} is out of range (0-4095)")]
    KeyIndexOutOfRange { index: u16 },
    #[error("Key must be 16 bytes long, got {length}")]
    InvalidKeyLength { length: usize },
    #[error("Invalid range")]
    InvalidRange,
    #[error("Address 0x{address} is outside of the allocated range")]
    AddressNotInAllocatedRange { address: Address },
    #[error("Invalid address 0x{address}")]
    InvalidAddress { address: Address },
    #[error("Invalid period: {value}")]
    InvalidPeriod { value: u32 },
    #[error("Invalid TTL: {ttl}")]
    InvalidTtl { ttl: u8 },
    #[error("Invalid retransmit: {reason}")]
    InvalidRetransmit { reason: String },
    #[error("Invalid composition data: {reason}")]
    InvalidCompositionData { reason: String },
    #[error("Invalid scene number 0x{scene:04X}")]
    InvalidSceneNumber { scene: u16 },
}

/// Request that collides with existing network state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("Node {uuid} already exists")]
    NodeAlreadyExists { uuid: Uuid },
    #[error("Address 0x{address} is not available")]
    AddressNotAvailable { address: Address },
    #[error("Provisioner ranges overlap with another provisioner")]
    OverlappingProvisionerRanges,
    #[error("Provisioner {uuid} is not part of this network")]
    ProvisionerNotInNetwork { uuid: Uuid },
    #[error("Key index {index} is already in use")]
    KeyIndexInUse { index: KeyIndex },
    #[error("Group 0x{address} already exists")]
    GroupAlreadyExists { address: Address },
    #[error("Scene 0x{scene:04X} already exists")]
    SceneAlreadyExists { scene: u16 },
    #[error("No address available in the allocated ranges")]
    NoAddressAvailable,
    #[error("Network key {index} does not exist")]
    InvalidKey { index: KeyIndex },
}

/// Operation refused because of how the entity is used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("Key {index} is in use")]
    KeyInUse { index: KeyIndex },
    #[error("The last provisioner cannot be removed")]
    CannotRemove,
    #[error("No network key to bind to")]
    NoNetworkKey,
    #[error("Group 0x{address} is in use")]
    GroupInUse { address: Address },
    #[error("Scene 0x{scene:04X} is in use")]
    SceneInUse { scene: u16 },
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the mesh network database
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Not allowed: {0}")]
    Policy(#[from] PolicyError),

    /// Malformed or inconsistent network document
    #[error("Decoding error: {reason}")]
    Decode { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("{what} not found")]
    NotFound { what: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl MeshError {
    /// Create a decoding error with a reason
    pub fn decode<T: Into<String>>(reason: T) -> Self {
        MeshError::Decode {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        MeshError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a not-found error naming the missing entity
    pub fn not_found<T: Into<String>>(what: T) -> Self {
        MeshError::NotFound { what: what.into() }
    }

    pub fn key_in_use(index: KeyIndex) -> Self {
        MeshError::Policy(PolicyError::KeyInUse { index })
    }

    pub fn address_not_available(address: Address) -> Self {
        MeshError::Conflict(ConflictError::AddressNotAvailable { address })
    }

    pub fn invalid_address(address: Address) -> Self {
        MeshError::Validation(ValidationError::InvalidAddress { address })
    }

    pub fn invalid_range() -> Self {
        MeshError::Validation(ValidationError::InvalidRange)
    }

    /// True for errors caused by caller input rather than network state
    pub fn is_validation(&self) -> bool {
        matches!(self, MeshError::Validation(_))
    }

    /// True for errors caused by a collision with existing network state
    pub fn is_conflict(&self) -> bool {
        matches!(self, MeshError::Conflict(_))
    }

    /// True for refusals to remove or rebind something still in use
    pub fn is_policy(&self) -> bool {
        matches!(self, MeshError::Policy(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(MeshError::key_in_use(0).is_policy());
        assert!(MeshError::invalid_range().is_validation());
        assert!(MeshError::address_not_available(Address::new(1)).is_conflict());
        assert!(!MeshError::decode("bad").is_conflict());
    }

    #[test]
    fn test_error_messages() {
        let err = MeshError::from(ValidationError::KeyIndexOutOfRange { index: 5000 });
        assert_eq!(
            err.to_string(),
            "Validation error: Key index 5000 is out of range (0-4095)"
        );

        let err = MeshError::address_not_available(Address::new(0x0102));
        assert_eq!(err.to_string(), "Conflict: Address 0x0102 is not available");
    }
}
