//! 32-byte hashes and the digest functions used by Bitcoin
//!
//! A [`Hash`] is stored in internal (wire) order. Block explorers and the
//! JSON-RPC interface display hashes byte-reversed; `Display`, `FromStr` and
//! the serde representation all use that reversed "RPC" order.

use std::fmt;
use std::str::FromStr;

use bitcoin_hashes::{sha1 as bh_sha1, sha256d, Hash as BitcoinHash};
use ripemd::Ripemd160;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{BitcoinError, Result};

/// SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// SHA-256(SHA-256(data))
pub fn dhash(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).into_inner()
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    bh_sha1::Hash::hash(data).into_inner()
}

pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(data));
    out
}

/// HASH160: RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&Sha256::digest(data))
}

/// A 256-bit hash in internal byte order
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const LEN: usize = 32;

    pub fn zero() -> Self {
        Hash([0u8; 32])
    }

    /// Wraps 32 bytes already in internal order.
    pub fn new(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Builds a hash from a slice in internal order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner: [u8; 32] = bytes.try_into().map_err(|_| {
            BitcoinError::Deserialization(format!("hash must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Hash(inner))
    }

    /// Parses RPC-order hex.
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = hex::decode(s)?;
        bytes.reverse();
        Hash::from_bytes(&bytes)
    }

    /// Double SHA-256 of `data`.
    pub fn dhash(data: &[u8]) -> Self {
        Hash(dhash(data))
    }

    /// Internal-order bytes, as they appear on the wire.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// RPC-order bytes, as they are displayed.
    pub fn to_be_bytes(self) -> [u8; 32] {
        let mut out = self.0;
        out.reverse();
        out
    }

    /// RPC-order hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_be_bytes())
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = BitcoinError;

    fn from_str(s: &str) -> Result<Self> {
        Hash::from_hex(s)
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
