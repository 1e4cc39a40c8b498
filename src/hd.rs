//! BIP32 hierarchical-deterministic keys
//!
//! CKDpriv: ℐ = HMAC-SHA512(c_par, data), k_i = (IL + k_par) mod n, c_i = IR
//! CKDpub:  K_i = IL·G + K_par, defined for non-hardened indices only
//!
//! where data is `0x00 || k_par || i` for hardened i and
//! `serP(K_par) || i` otherwise.

use std::fmt;
use std::str::FromStr;

use bitcoin_hashes::hmac::{Hmac, HmacEngine};
use bitcoin_hashes::{sha512, Hash as BitcoinHash, HashEngine};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;

use crate::constants::*;
use crate::curve::{Point, Scalar};
use crate::encoding::{base58check_decode, base58check_encode, ByteReader};
use crate::error::{BitcoinError, Result};
use crate::keys::{PrivateKey, PublicKey};
use crate::types::Network;

fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut engine = HmacEngine::<sha512::Hash>::new(key);
    engine.input(data);
    Hmac::<sha512::Hash>::from_engine(engine).into_inner()
}

fn split_i(i: &[u8; 64]) -> Result<(Scalar, [u8; 32])> {
    let mut il = [0u8; 32];
    let mut ir = [0u8; 32];
    il.copy_from_slice(&i[..32]);
    ir.copy_from_slice(&i[32..]);
    let il = Scalar::from_be_bytes(il)
        .map_err(|_| BitcoinError::Domain("derived IL is not below the curve order".to_string()))?;
    Ok((il, ir))
}

pub fn is_hardened_index(index: u32) -> bool {
    index & HARDENED_INDEX != 0
}

/// Metadata shared by private and public extended keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct KeyInfo {
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    index: u32,
    network: Network,
}

impl KeyInfo {
    fn new(chain_code: [u8; 32], depth: u8, parent_fingerprint: [u8; 4], index: u32, network: Network) -> Result<Self> {
        if depth == 0 && (parent_fingerprint != [0u8; 4] || index != 0) {
            return Err(BitcoinError::Domain(
                "a depth-0 key must have a zero parent fingerprint and index".to_string(),
            ));
        }
        Ok(KeyInfo { chain_code, depth, parent_fingerprint, index, network })
    }

    fn child(parent: &impl ExtendedKey, chain_code: [u8; 32], index: u32) -> Result<Self> {
        let depth = parent
            .depth()
            .checked_add(1)
            .ok_or_else(|| BitcoinError::Domain("maximum derivation depth reached".to_string()))?;
        KeyInfo::new(chain_code, depth, parent.fingerprint(), index, parent.network())
    }
}

/// Accessors and serialization common to both kinds of extended key.
pub trait ExtendedKey {
    fn chain_code(&self) -> &[u8; 32];
    fn depth(&self) -> u8;
    fn index(&self) -> u32;
    fn parent_fingerprint(&self) -> [u8; 4];
    fn network(&self) -> Network;
    /// The point this key controls.
    fn verifying_key(&self) -> &PublicKey;
    /// BIP32 version word for this key's kind and network.
    fn version(&self) -> u32;
    /// The 33-byte key field of the serialization.
    fn key_material(&self) -> [u8; 33];

    fn is_master(&self) -> bool {
        self.depth() == 0
    }

    fn is_hardened(&self) -> bool {
        is_hardened_index(self.index())
    }

    /// HASH160 of the compressed public key.
    fn identifier(&self) -> [u8; 20] {
        self.verifying_key().hash160(true)
    }

    fn fingerprint(&self) -> [u8; 4] {
        let id = self.identifier();
        [id[0], id[1], id[2], id[3]]
    }

    /// version(4) || depth(1) || parent_fingerprint(4) || index(4) || chain_code(32) || key(33)
    fn to_bytes(&self) -> [u8; EXTENDED_KEY_LEN] {
        let mut out = [0u8; EXTENDED_KEY_LEN];
        out[..4].copy_from_slice(&self.version().to_be_bytes());
        out[4] = self.depth();
        out[5..9].copy_from_slice(&self.parent_fingerprint());
        out[9..13].copy_from_slice(&self.index().to_be_bytes());
        out[13..45].copy_from_slice(self.chain_code());
        out[45..].copy_from_slice(&self.key_material());
        out
    }

    fn to_b58check(&self) -> String {
        base58check_encode(&self.to_bytes())
    }
}

macro_rules! impl_key_info_accessors {
    () => {
        fn chain_code(&self) -> &[u8; 32] {
            &self.info.chain_code
        }

        fn depth(&self) -> u8 {
            self.info.depth
        }

        fn index(&self) -> u32 {
            self.info.index
        }

        fn parent_fingerprint(&self) -> [u8; 4] {
            self.info.parent_fingerprint
        }

        fn network(&self) -> Network {
            self.info.network
        }
    };
}

/// An extended private key
#[derive(Clone, PartialEq, Eq)]
pub struct HDPrivateKey {
    key: PrivateKey,
    info: KeyInfo,
}

impl HDPrivateKey {
    /// Master key from a BIP32 seed: I = HMAC-SHA512("Bitcoin seed", seed).
    pub fn master_key_from_seed(seed: &[u8], network: Network) -> Result<Self> {
        let (il, chain_code) = split_i(&hmac_sha512(BIP32_SEED_KEY, seed))?;
        let key = PrivateKey::from_scalar(il, network)?;
        Ok(HDPrivateKey { key, info: KeyInfo::new(chain_code, 0, [0u8; 4], 0, network)? })
    }

    /// Master key from a BIP39 mnemonic sentence and optional passphrase.
    pub fn master_key_from_mnemonic(mnemonic: &str, passphrase: &str, network: Network) -> Result<Self> {
        let salt = format!("mnemonic{passphrase}");
        let mut seed = [0u8; 64];
        pbkdf2_hmac::<Sha512>(mnemonic.as_bytes(), salt.as_bytes(), BIP39_PBKDF2_ROUNDS, &mut seed);
        HDPrivateKey::master_key_from_seed(&seed, network)
    }

    /// CKDpriv. Fails in the (astronomically rare) case BIP32 marks the
    /// index as invalid; callers should move on to the next index.
    pub fn from_parent(parent: &HDPrivateKey, index: u32) -> Result<Self> {
        let mut data = Vec::with_capacity(37);
        if is_hardened_index(index) {
            data.push(0x00);
            data.extend_from_slice(&parent.key.to_bytes());
        } else {
            data.extend_from_slice(&parent.key.public_key().compressed_bytes());
        }
        data.extend_from_slice(&index.to_be_bytes());

        let (il, chain_code) = split_i(&hmac_sha512(parent.chain_code(), &data))?;
        let child = il.add(&parent.key.scalar());
        let key = PrivateKey::from_scalar(child, parent.network())
            .map_err(|_| BitcoinError::Domain(format!("child key at index {index} is zero")))?;
        Ok(HDPrivateKey { key, info: KeyInfo::child(parent, chain_code, index)? })
    }

    pub fn key(&self) -> &PrivateKey {
        &self.key
    }

    /// The matching extended public key with identical metadata.
    pub fn public_key(&self) -> HDPublicKey {
        HDPublicKey { key: *self.key.public_key(), info: self.info }
    }
}

impl ExtendedKey for HDPrivateKey {
    impl_key_info_accessors!();

    fn verifying_key(&self) -> &PublicKey {
        self.key.public_key()
    }

    fn version(&self) -> u32 {
        self.info.network.xprv_version()
    }

    fn key_material(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[1..].copy_from_slice(&self.key.to_bytes());
        out
    }
}

impl fmt::Debug for HDPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HDPrivateKey")
            .field("public_key", self.key.public_key())
            .field("depth", &self.info.depth)
            .field("index", &self.info.index)
            .finish_non_exhaustive()
    }
}

/// An extended public key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HDPublicKey {
    key: PublicKey,
    info: KeyInfo,
}

impl HDPublicKey {
    /// CKDpub. Hardened indices need the private key and are rejected.
    pub fn from_parent(parent: &HDPublicKey, index: u32) -> Result<Self> {
        if is_hardened_index(index) {
            return Err(BitcoinError::Domain(
                "cannot derive a hardened child from a public key".to_string(),
            ));
        }
        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&parent.key.compressed_bytes());
        data.extend_from_slice(&index.to_be_bytes());

        let (il, chain_code) = split_i(&hmac_sha512(parent.chain_code(), &data))?;
        let child = Point::mul_generator(&il).add(&parent.key.point());
        let key = PublicKey::from_point(&child, parent.network())
            .map_err(|_| BitcoinError::Domain(format!("child key at index {index} is the point at infinity")))?;
        Ok(HDPublicKey { key, info: KeyInfo::child(parent, chain_code, index)? })
    }

    /// Public child of a private parent; hardened indices are allowed.
    pub fn from_private_parent(parent: &HDPrivateKey, index: u32) -> Result<Self> {
        Ok(HDPrivateKey::from_parent(parent, index)?.public_key())
    }

    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    /// Compressed P2PKH address.
    pub fn address(&self) -> String {
        self.key.address_for(true, self.info.network)
    }

    /// HASH160 of the compressed key.
    pub fn hash160(&self) -> [u8; 20] {
        self.key.hash160(true)
    }
}

impl ExtendedKey for HDPublicKey {
    impl_key_info_accessors!();

    fn verifying_key(&self) -> &PublicKey {
        &self.key
    }

    fn version(&self) -> u32 {
        self.info.network.xpub_version()
    }

    fn key_material(&self) -> [u8; 33] {
        self.key.compressed_bytes()
    }
}

/// Either kind of extended key, as decoded from its serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HDKey {
    Private(HDPrivateKey),
    Public(HDPublicKey),
}

impl HDKey {
    /// Decodes the 78-byte BIP32 serialization.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != EXTENDED_KEY_LEN {
            return Err(BitcoinError::Deserialization(format!(
                "extended key must be {} bytes, got {}",
                EXTENDED_KEY_LEN,
                bytes.len()
            )));
        }
        let mut reader = ByteReader::new(bytes);
        let version = u32::from_be_bytes(reader.read_array()?);
        let depth = reader.read_u8()?;
        let parent_fingerprint = reader.read_array::<4>()?;
        let index = u32::from_be_bytes(reader.read_array()?);
        let chain_code = reader.read_array::<32>()?;
        let material = reader.read_array::<33>()?;

        let (private, network) = match version {
            XPRV_MAINNET_VERSION => (true, Network::Mainnet),
            XPRV_TESTNET_VERSION => (true, Network::Testnet),
            XPUB_MAINNET_VERSION => (false, Network::Mainnet),
            XPUB_TESTNET_VERSION => (false, Network::Testnet),
            v => return Err(BitcoinError::Deserialization(format!("unknown extended key version 0x{v:08x}"))),
        };
        let info = KeyInfo::new(chain_code, depth, parent_fingerprint, index, network)?;

        if private {
            if material[0] != 0x00 {
                return Err(BitcoinError::Deserialization(
                    "private key material must start with 0x00".to_string(),
                ));
            }
            let key = PrivateKey::from_bytes(&material[1..], network)?;
            Ok(HDKey::Private(HDPrivateKey { key, info }))
        } else {
            if !matches!(material[0], 0x02 | 0x03) {
                return Err(BitcoinError::Deserialization(
                    "public key material must be a compressed point".to_string(),
                ));
            }
            let key = PublicKey::from_bytes(&material, network)?;
            Ok(HDKey::Public(HDPublicKey { key, info }))
        }
    }

    pub fn from_b58check(s: &str) -> Result<Self> {
        HDKey::from_bytes(&base58check_decode(s)?)
    }

    /// Child at `index`, keeping the parent's kind.
    pub fn derive(&self, index: u32) -> Result<HDKey> {
        match self {
            HDKey::Private(k) => HDPrivateKey::from_parent(k, index).map(HDKey::Private),
            HDKey::Public(k) => HDPublicKey::from_parent(k, index).map(HDKey::Public),
        }
    }

    /// Every key along `path`, starting with `root`.
    ///
    /// A path beginning with `m` requires `root` to be a master key.
    pub fn from_path(root: &HDKey, path: &str) -> Result<Vec<HDKey>> {
        let path: DerivationPath = path.parse()?;
        if path.absolute && !root.is_master() {
            return Err(BitcoinError::Domain(
                "root key must be a master key when the path starts with 'm'".to_string(),
            ));
        }
        let mut keys = vec![root.clone()];
        for &index in &path.indices {
            let next = keys[keys.len() - 1].derive(index)?;
            keys.push(next);
        }
        Ok(keys)
    }

    pub fn as_private(&self) -> Option<&HDPrivateKey> {
        match self {
            HDKey::Private(k) => Some(k),
            HDKey::Public(_) => None,
        }
    }

    pub fn as_public(&self) -> Option<&HDPublicKey> {
        match self {
            HDKey::Public(k) => Some(k),
            HDKey::Private(_) => None,
        }
    }

    fn inner(&self) -> &dyn ExtendedKey {
        match self {
            HDKey::Private(k) => k,
            HDKey::Public(k) => k,
        }
    }
}

impl ExtendedKey for HDKey {
    fn chain_code(&self) -> &[u8; 32] {
        self.inner().chain_code()
    }

    fn depth(&self) -> u8 {
        self.inner().depth()
    }

    fn index(&self) -> u32 {
        self.inner().index()
    }

    fn parent_fingerprint(&self) -> [u8; 4] {
        self.inner().parent_fingerprint()
    }

    fn network(&self) -> Network {
        self.inner().network()
    }

    fn verifying_key(&self) -> &PublicKey {
        self.inner().verifying_key()
    }

    fn version(&self) -> u32 {
        self.inner().version()
    }

    fn key_material(&self) -> [u8; 33] {
        self.inner().key_material()
    }
}

impl From<HDPrivateKey> for HDKey {
    fn from(k: HDPrivateKey) -> Self {
        HDKey::Private(k)
    }
}

impl From<HDPublicKey> for HDKey {
    fn from(k: HDPublicKey) -> Self {
        HDKey::Public(k)
    }
}

/// A derivation path such as `m/44'/0'/0'` or `0/1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath {
    /// Whether the path starts at the master key (`m`).
    pub absolute: bool,
    pub indices: Vec<u32>,
}

impl FromStr for DerivationPath {
    type Err = BitcoinError;

    /// `'`, `h` and `H` mark hardened components. A trailing `/` is ignored.
    fn from_str(path: &str) -> Result<Self> {
        let path = path.trim().trim_end_matches('/');
        let mut parts = path.split('/').peekable();
        let absolute = parts.peek() == Some(&"m");
        if absolute {
            parts.next();
        }
        let indices = parts
            .map(|part| {
                let (digits, hardened) = match part.strip_suffix(['\'', 'h', 'H']) {
                    Some(digits) => (digits, true),
                    None => (part, false),
                };
                let index: u32 = digits
                    .parse()
                    .ok()
                    .filter(|&i| i < HARDENED_INDEX)
                    .ok_or_else(|| BitcoinError::Domain(format!("invalid path component '{part}'")))?;
                Ok(if hardened { index | HARDENED_INDEX } else { index })
            })
            .collect::<Result<Vec<u32>>>()?;
        Ok(DerivationPath { absolute, indices })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(self.indices.len() + 1);
        if self.absolute {
            parts.push("m".to_string());
        }
        for &index in &self.indices {
            if is_hardened_index(index) {
                parts.push(format!("{}'", index & !HARDENED_INDEX));
            } else {
                parts.push(index.to_string());
            }
        }
        f.write_str(&parts.join("/"))
    }
}

/// Parses a path into its child indices.
pub fn parse_path(path: &str) -> Result<DerivationPath> {
    path.parse()
}

/// Renders indices as an absolute path, e.g. `m/0'/1`.
pub fn path_from_indices(indices: &[u32]) -> String {
    DerivationPath { absolute: true, indices: indices.to_vec() }.to_string()
}
