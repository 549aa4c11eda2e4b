//! Hexadecimal field encodings used by the network database
//!
//! Keys, UUIDs and 16-bit identifiers are stored as hex strings rather than as
//! native JSON numbers. Decoding is case-insensitive; encoding is uppercase.

use serde::{Deserialize, Deserializer, Serializer};
use uuid::Uuid;

use crate::errors::{MeshError, ValidationError};
use crate::Result;

/// Uppercase, undashed representation of a UUID
pub fn uuid_to_hex(uuid: &Uuid) -> String {
    hex::encode_upper(uuid.as_bytes())
}

/// Decode a 128-bit key from 32 hex characters
pub fn parse_key(s: &str) -> Result<[u8; 16]> {
    let clean_str = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(clean_str)
        .map_err(|_| MeshError::decode(format!("Invalid hex in key: {}", s)))?;
    key_from_slice(&bytes)
}

/// Copy a 16-byte key out of a slice, rejecting any other length
pub fn key_from_slice(bytes: &[u8]) -> Result<[u8; 16]> {
    <[u8; 16]>::try_from(bytes).map_err(|_| {
        ValidationError::InvalidKeyLength {
            length: bytes.len(),
        }
        .into()
    })
}

pub mod uuid_hex {
    use super::*;

    pub fn serialize<S: Serializer>(uuid: &Uuid, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&uuid_to_hex(uuid))
    }

    /// Accepts both the dashed and the 32-character form
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Uuid, D::Error> {
        let s = String::deserialize(deserializer)?;
        Uuid::parse_str(&s).map_err(|_| serde::de::Error::custom(format!("Invalid UUID: {}", s)))
    }
}

pub mod key_hex {
    use super::*;

    pub fn serialize<S: Serializer>(key: &[u8; 16], serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_upper(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> core::result::Result<[u8; 16], D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_key(&s).map_err(serde::de::Error::custom)
    }
}

pub mod option_key_hex {
    use super::*;

    pub fn serialize<S: Serializer>(key: &Option<[u8; 16]>, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        match key {
            Some(key) => serializer.serialize_some(&hex::encode_upper(key)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Option<[u8; 16]>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| parse_key(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

pub mod option_u16_hex {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<u16>, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&format!("{:04X}", value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Option<u16>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| {
                crate::address::parse_hex_u16(&s)
                    .ok_or_else(|| serde::de::Error::custom(format!("Expected 4-character hexadecimal string: {}", s)))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        let key = parse_key("0123456789abcdef0123456789ABCDEF").unwrap();
        assert_eq!(key[0], 0x01);
        assert_eq!(key[15], 0xEF);

        let err = parse_key("0123").unwrap_err();
        assert!(matches!(
            err,
            MeshError::Validation(ValidationError::InvalidKeyLength { length: 2 })
        ));
        assert!(parse_key("zz").is_err());
    }

    #[test]
    fn test_uuid_to_hex() {
        let uuid = Uuid::parse_str("70cf7c97-32a3-45b6-9149-4810d2e9cbf4").unwrap();
        assert_eq!(uuid_to_hex(&uuid), "70CF7C9732A345B691494810D2E9CBF4");
    }
}
