//! Network and application keys
//!
//! Both key kinds carry a 12-bit index that is unique within its collection.
//! Replacing the key material keeps the previous key as `old_key` until the
//! key refresh procedure completes.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{MeshCrypto, SoftwareCrypto};
use crate::errors::{MeshError, ValidationError};
use crate::serde_hex::{key_hex, option_key_hex};
use crate::Result;

/// Index of a network or application key, valid in `0..=4095`
pub type KeyIndex = u16;

/// Largest valid key index
pub const MAX_KEY_INDEX: KeyIndex = 4095;

pub fn is_valid_key_index(index: KeyIndex) -> bool {
    index <= MAX_KEY_INDEX
}

fn check_index(index: KeyIndex) -> Result<()> {
    if !is_valid_key_index(index) {
        return Err(ValidationError::KeyIndexOutOfRange { index }.into());
    }
    Ok(())
}

/// Generate random 128-bit key material
pub fn random_key() -> [u8; 16] {
    rand::random()
}

/// Behaviour shared by network and application keys
pub trait Key {
    fn name(&self) -> &str;

    fn index(&self) -> KeyIndex;

    fn key(&self) -> &[u8; 16];

    fn old_key(&self) -> Option<&[u8; 16]>;

    /// The primary key of a collection has index 0
    fn is_primary(&self) -> bool {
        self.index() == 0
    }
}

// ----------------------------------------------------------------------------
// Key Refresh Phase and Security
// ----------------------------------------------------------------------------

/// Progress of the key refresh procedure, serialized as 0, 1 or 2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum KeyRefreshPhase {
    #[default]
    NormalOperation = 0,
    KeyDistribution = 1,
    Finalizing = 2,
}

impl TryFrom<u8> for KeyRefreshPhase {
    type Error = MeshError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::NormalOperation),
            1 => Ok(Self::KeyDistribution),
            2 => Ok(Self::Finalizing),
            _ => Err(MeshError::decode(format!("Invalid key refresh phase: {}", value))),
        }
    }
}

impl From<KeyRefreshPhase> for u8 {
    fn from(phase: KeyRefreshPhase) -> Self {
        phase as u8
    }
}

impl fmt::Display for KeyRefreshPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NormalOperation => write!(f, "Normal Operation"),
            Self::KeyDistribution => write!(f, "Key Distribution"),
            Self::Finalizing => write!(f, "Finalizing"),
        }
    }
}

/// Security level of a key or of a node's provisioning
///
/// Older documents use `"low"` and `"high"`; both are still accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    #[serde(alias = "low")]
    Insecure,
    #[default]
    #[serde(alias = "high")]
    Secure,
}

// ----------------------------------------------------------------------------
// Network Key
// ----------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkKeyRecord {
    name: String,
    index: KeyIndex,
    #[serde(with = "key_hex")]
    key: [u8; 16],
    #[serde(default, with = "option_key_hex", skip_serializing_if = "Option::is_none")]
    old_key: Option<[u8; 16]>,
    phase: KeyRefreshPhase,
    min_security: Security,
    timestamp: DateTime<Utc>,
}

/// A network key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NetworkKeyRecord", into = "NetworkKeyRecord")]
pub struct NetworkKey {
    pub name: String,
    index: KeyIndex,
    key: [u8; 16],
    old_key: Option<[u8; 16]>,
    phase: KeyRefreshPhase,
    min_security: Security,
    timestamp: DateTime<Utc>,
}

impl NetworkKey {
    pub const PRIMARY_KEY_NAME: &'static str = "Primary Network Key";

    pub fn new<T: Into<String>>(name: T, index: KeyIndex, key: [u8; 16]) -> Result<Self> {
        check_index(index)?;
        Ok(Self {
            name: name.into(),
            index,
            key,
            old_key: None,
            phase: KeyRefreshPhase::NormalOperation,
            min_security: Security::Secure,
            timestamp: Utc::now(),
        })
    }

    /// Create a key from a byte slice, which must be exactly 16 bytes long
    pub fn from_slice<T: Into<String>>(name: T, index: KeyIndex, key: &[u8]) -> Result<Self> {
        Self::new(name, index, crate::serde_hex::key_from_slice(key)?)
    }

    /// Primary network key with random key material
    pub fn primary() -> Self {
        Self {
            name: Self::PRIMARY_KEY_NAME.to_string(),
            index: 0,
            key: random_key(),
            old_key: None,
            phase: KeyRefreshPhase::NormalOperation,
            min_security: Security::Secure,
            timestamp: Utc::now(),
        }
    }

    pub fn phase(&self) -> KeyRefreshPhase {
        self.phase
    }

    pub fn min_security(&self) -> Security {
        self.min_security
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Start a key refresh: the current key becomes the old key
    pub fn set_key(&mut self, key: [u8; 16]) {
        self.old_key = Some(self.key);
        self.key = key;
        self.set_phase(KeyRefreshPhase::KeyDistribution);
    }

    pub fn set_phase(&mut self, phase: KeyRefreshPhase) {
        self.phase = phase;
        self.timestamp = Utc::now();
    }

    /// Drop the old key, which ends the key refresh procedure
    pub fn clear_old_key(&mut self) {
        self.old_key = None;
        self.set_phase(KeyRefreshPhase::NormalOperation);
    }

    pub fn lower_security(&mut self) {
        self.min_security = Security::Insecure;
    }

    /// Key material used for sending: the old key during key distribution
    pub fn transmit_key(&self) -> &[u8; 16] {
        match (self.phase, &self.old_key) {
            (KeyRefreshPhase::KeyDistribution, Some(old_key)) => old_key,
            _ => &self.key,
        }
    }
}

impl Key for NetworkKey {
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> KeyIndex {
        self.index
    }

    fn key(&self) -> &[u8; 16] {
        &self.key
    }

    fn old_key(&self) -> Option<&[u8; 16]> {
        self.old_key.as_ref()
    }
}

impl TryFrom<NetworkKeyRecord> for NetworkKey {
    type Error = MeshError;

    fn try_from(record: NetworkKeyRecord) -> Result<Self> {
        check_index(record.index)?;
        Ok(Self {
            name: record.name,
            index: record.index,
            key: record.key,
            old_key: record.old_key,
            phase: record.phase,
            min_security: record.min_security,
            timestamp: record.timestamp,
        })
    }
}

impl From<NetworkKey> for NetworkKeyRecord {
    fn from(key: NetworkKey) -> Self {
        Self {
            name: key.name,
            index: key.index,
            key: key.key,
            old_key: key.old_key,
            phase: key.phase,
            min_security: key.min_security,
            timestamp: key.timestamp,
        }
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.phase != KeyRefreshPhase::NormalOperation {
            return write!(f, "{} (index: {}, phase: {})", self.name, self.index, self.phase);
        }
        write!(f, "{} (index: {})", self.name, self.index)
    }
}

// ----------------------------------------------------------------------------
// Application Key
// ----------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationKeyRecord {
    name: String,
    index: KeyIndex,
    #[serde(rename = "boundNetKey")]
    bound_network_key: KeyIndex,
    #[serde(with = "key_hex")]
    key: [u8; 16],
    #[serde(default, with = "option_key_hex", skip_serializing_if = "Option::is_none")]
    old_key: Option<[u8; 16]>,
}

/// An application key, bound to exactly one network key
///
/// The AID is derived from the key material and recomputed whenever the key
/// changes. An old AID exists only while an old key exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ApplicationKeyRecord", into = "ApplicationKeyRecord")]
pub struct ApplicationKey {
    pub name: String,
    index: KeyIndex,
    bound_network_key: KeyIndex,
    key: [u8; 16],
    old_key: Option<[u8; 16]>,
    aid: u8,
    old_aid: Option<u8>,
}

impl ApplicationKey {
    pub fn new<T: Into<String>>(name: T, index: KeyIndex, key: [u8; 16], bound_to: &NetworkKey) -> Result<Self> {
        Self::new_with(name, index, key, bound_to, &SoftwareCrypto)
    }

    /// Create an application key, deriving the AID with the given crypto provider
    pub fn new_with<T: Into<String>, C: MeshCrypto + ?Sized>(
        name: T,
        index: KeyIndex,
        key: [u8; 16],
        bound_to: &NetworkKey,
        crypto: &C,
    ) -> Result<Self> {
        check_index(index)?;
        let mut app_key = Self {
            name: name.into(),
            index,
            bound_network_key: bound_to.index(),
            key,
            old_key: None,
            aid: 0,
            old_aid: None,
        };
        app_key.regenerate_key_derivatives(crypto);
        Ok(app_key)
    }

    pub fn bound_network_key(&self) -> KeyIndex {
        self.bound_network_key
    }

    pub(crate) fn set_bound_network_key(&mut self, index: KeyIndex) {
        self.bound_network_key = index;
    }

    pub fn aid(&self) -> u8 {
        self.aid
    }

    pub fn old_aid(&self) -> Option<u8> {
        self.old_aid
    }

    pub fn set_key(&mut self, key: [u8; 16]) {
        self.set_key_with(key, &SoftwareCrypto);
    }

    /// Replace the key material; the current key becomes the old key
    pub fn set_key_with<C: MeshCrypto + ?Sized>(&mut self, key: [u8; 16], crypto: &C) {
        self.old_key = Some(self.key);
        self.old_aid = None;
        self.key = key;
        self.regenerate_key_derivatives(crypto);
    }

    pub fn clear_old_key(&mut self) {
        self.old_key = None;
        self.old_aid = None;
    }

    /// Recompute the AID, and the old AID when an old key is present
    pub fn regenerate_key_derivatives<C: MeshCrypto + ?Sized>(&mut self, crypto: &C) {
        self.aid = crypto.k4(&self.key);
        self.old_aid = self.old_key.as_ref().map(|old_key| crypto.k4(old_key));
    }
}

impl Key for ApplicationKey {
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> KeyIndex {
        self.index
    }

    fn key(&self) -> &[u8; 16] {
        &self.key
    }

    fn old_key(&self) -> Option<&[u8; 16]> {
        self.old_key.as_ref()
    }
}

impl TryFrom<ApplicationKeyRecord> for ApplicationKey {
    type Error = MeshError;

    fn try_from(record: ApplicationKeyRecord) -> Result<Self> {
        check_index(record.index)?;
        check_index(record.bound_network_key)?;
        let mut app_key = Self {
            name: record.name,
            index: record.index,
            bound_network_key: record.bound_network_key,
            key: record.key,
            old_key: record.old_key,
            aid: 0,
            old_aid: None,
        };
        app_key.regenerate_key_derivatives(&SoftwareCrypto);
        Ok(app_key)
    }
}

impl From<ApplicationKey> for ApplicationKeyRecord {
    fn from(key: ApplicationKey) -> Self {
        Self {
            name: key.name,
            index: key.index,
            bound_network_key: key.bound_network_key,
            key: key.key,
            old_key: key.old_key,
        }
    }
}

impl fmt::Display for ApplicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (index: {})", self.name, self.index)
    }
}
