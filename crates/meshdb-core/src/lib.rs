//! Bluetooth Mesh Network Configuration Database
//!
//! This crate provides the data model of a Bluetooth Mesh network as kept by a
//! provisioner: network and application keys, provisioners with their address
//! and scene ranges, nodes with their elements and models, groups and scenes.
//! `MeshNetwork` owns all of it, enforces the invariants that span entities
//! and reads and writes the Mesh Configuration Database JSON format.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod address;
pub mod config;
pub mod crypto;
pub mod element;
pub mod errors;
pub mod exclusion;
pub mod group;
pub mod heartbeat;
pub mod key;
pub mod model;
pub mod network;
pub mod node;
pub mod provisioner;
pub mod publish;
pub mod range;
pub mod scene;
pub mod serde_hex;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use address::{Address, AddressKind, GroupKind, MeshAddress, SceneNumber};
pub use config::{NetworkConfig, ProvisionerDefaults};
pub use crypto::{MeshCrypto, SoftwareCrypto};
pub use element::{Element, Location};
pub use errors::{ConflictError, MeshError, PolicyError, ValidationError};
pub use exclusion::{IvIndex, NetworkExclusions};
pub use group::Group;
pub use heartbeat::{HeartbeatPublication, HeartbeatSubscription};
pub use key::{ApplicationKey, Key, KeyIndex, KeyRefreshPhase, NetworkKey, Security};
pub use model::{Model, ModelId};
pub use network::{ExportConfiguration, MeshNetwork, NodeSelection, ProvisionerSelection, Selection};
pub use node::{CompositionDataPage0, Node, NodeFeatures, NodeFeaturesState, NodeKey};
pub use provisioner::Provisioner;
pub use publish::{Period, Publish, Retransmit, StepResolution, TransitionTime};
pub use range::{AddressRange, RangeObject, RangeSet, RangeSetMut, SceneRange};
pub use scene::Scene;

pub type Result<T> = core::result::Result<T, MeshError>;
