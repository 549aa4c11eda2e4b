//! Key derivation used by the network database
//!
//! Only two derivations are needed here: the application key identifier (AID)
//! and the virtual address of a Label UUID. Both are defined on top of
//! AES-CMAC. Callers with their own crypto backend implement `MeshCrypto`.

use aes::Aes128;
use cmac::{Cmac, Mac};
use uuid::Uuid;

use crate::address::Address;

/// Derivations the data model delegates to a crypto provider
pub trait MeshCrypto {
    /// 6-bit application key identifier of a 128-bit key
    fn k4(&self, key: &[u8; 16]) -> u8;

    /// Virtual address of a Label UUID
    fn virtual_address(&self, label: &Uuid) -> Address;
}

/// Software implementation of `MeshCrypto` based on RustCrypto AES-CMAC
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareCrypto;

impl SoftwareCrypto {
    /// AES-CMAC of `data` with a 128-bit key
    pub fn cmac(&self, key: &[u8; 16], data: &[u8]) -> [u8; 16] {
        let mut mac = <Cmac<Aes128> as Mac>::new(key.into());
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    /// The salt generation function s1
    pub fn s1(&self, m: &[u8]) -> [u8; 16] {
        self.cmac(&[0u8; 16], m)
    }
}

impl MeshCrypto for SoftwareCrypto {
    fn k4(&self, key: &[u8; 16]) -> u8 {
        let salt = self.s1(b"smk4");
        let t = self.cmac(&salt, key);
        let result = self.cmac(&t, b"id6\x01");
        result[15] & 0x3F
    }

    fn virtual_address(&self, label: &Uuid) -> Address {
        let salt = self.s1(b"vtad");
        let hash = self.cmac(&salt, label.as_bytes());
        let value = u16::from_be_bytes([hash[14], hash[15]]) & 0x3FFF | 0x8000;
        Address::new(value)
    }
}
