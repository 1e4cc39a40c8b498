//! secp256k1 private and public keys
//!
//! Signing is deterministic (RFC 6979) and always produces low-s signatures.
//! Verification accepts high-s signatures, which legacy consensus allows.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use secp256k1::rand::{rngs::OsRng, RngCore};
use secp256k1::{Message, PublicKey as SecpPoint, SecretKey};
use tracing::debug;

use crate::constants::{MESSAGE_MAGIC, MESSAGE_SIGNATURE_HEADER};
use crate::curve::{secp, Point, Scalar};
use crate::encoding::{base58check_decode, base58check_encode, decode_address, key_hash_to_address, pack_compact_int};
use crate::error::{BitcoinError, Result};
use crate::hash::{hash160, sha256};
use crate::signature::Signature;
use crate::types::Network;

fn message_from_digest(digest: &[u8]) -> Result<Message> {
    Message::from_digest_slice(digest)
        .map_err(|_| BitcoinError::Domain(format!("digest must be 32 bytes, got {}", digest.len())))
}

/// The preimage signed by "Bitcoin Signed Message".
fn message_preimage(message: &[u8]) -> Vec<u8> {
    let mut preimage = MESSAGE_MAGIC.to_vec();
    preimage.extend_from_slice(&pack_compact_int(message.len() as u64));
    preimage.extend_from_slice(message);
    preimage
}

/// A secp256k1 private key: k in [1, n-1].
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    secret: SecretKey,
    public_key: PublicKey,
    network: Network,
}

impl PrivateKey {
    pub fn from_scalar(k: Scalar, network: Network) -> Result<Self> {
        let secret = k
            .to_secret_key()
            .ok_or_else(|| BitcoinError::Domain("private key must be in [1, n-1]".to_string()))?;
        Ok(PrivateKey::from_secret(secret, network))
    }

    fn from_secret(secret: SecretKey, network: Network) -> Self {
        let point = SecpPoint::from_secret_key(secp(), &secret);
        PrivateKey { secret, public_key: PublicKey::from_secp(point, network), network }
    }

    /// 32-byte big-endian scalar.
    pub fn from_bytes(bytes: &[u8], network: Network) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(BitcoinError::Deserialization(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        PrivateKey::from_scalar(Scalar::from_be_slice(bytes)?, network)
    }

    pub fn from_hex(s: &str, network: Network) -> Result<Self> {
        PrivateKey::from_bytes(&hex::decode(s)?, network)
    }

    /// Draws k uniformly from [1, n-1] using the operating system's CSPRNG.
    pub fn from_random(network: Network) -> Result<Self> {
        let mut bytes = [0u8; 32];
        loop {
            OsRng
                .try_fill_bytes(&mut bytes)
                .map_err(|e| BitcoinError::Domain(format!("randomness unavailable: {e}")))?;
            // Rejection sampling: retry on zero or values >= n.
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return Ok(PrivateKey::from_secret(secret, network));
            }
        }
    }

    /// Decodes WIF. A trailing 0x01 compression marker is accepted.
    pub fn from_b58check(wif: &str) -> Result<Self> {
        let payload = base58check_decode(wif)?;
        let key = match payload.len() {
            33 => &payload[1..],
            34 if payload[33] == 0x01 => &payload[1..33],
            n => {
                return Err(BitcoinError::Deserialization(format!("WIF payload must be 33 or 34 bytes, got {n}")))
            }
        };
        let network = Network::from_wif_version(payload[0]).ok_or_else(|| {
            BitcoinError::Deserialization(format!("unknown WIF version 0x{:02x}", payload[0]))
        })?;
        PrivateKey::from_bytes(key, network)
    }

    /// Uncompressed WIF.
    pub fn to_b58check(&self) -> String {
        self.to_wif(false)
    }

    pub fn to_wif(&self, compressed: bool) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(self.network.wif_version());
        payload.extend_from_slice(&self.secret.secret_bytes());
        if compressed {
            payload.push(0x01);
        }
        base58check_encode(&payload)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn scalar(&self) -> Scalar {
        // SecretKey is always in range
        Scalar::from_be_bytes(self.secret.secret_bytes()).unwrap_or(Scalar::ZERO)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Same scalar, different network prefix.
    pub fn with_network(&self, network: Network) -> Self {
        PrivateKey::from_secret(self.secret, network)
    }

    /// Signs a 32-byte digest, returning a low-s signature with its recovery id.
    pub fn raw_sign(&self, digest: &[u8]) -> Result<Signature> {
        let msg = message_from_digest(digest)?;
        let sig = secp().sign_ecdsa_recoverable(&msg, &self.secret);
        Signature::from_recoverable(&sig)
    }

    /// Signs `message`, SHA-256 hashing it first when `do_hash` is set.
    pub fn sign(&self, message: &[u8], do_hash: bool) -> Result<Signature> {
        if do_hash {
            self.raw_sign(&sha256(message))
        } else {
            self.raw_sign(message)
        }
    }

    /// "Bitcoin Signed Message" signature, Base64 encoded.
    pub fn sign_bitcoin(&self, message: &[u8], compressed: bool) -> Result<String> {
        let msg_hash = sha256(&message_preimage(message));
        let sig = self.sign(&msg_hash, true)?;
        let recovery_id = sig
            .recovery_id()
            .ok_or_else(|| BitcoinError::Signing("signature is missing its recovery id".to_string()))?;
        let mut packed = Vec::with_capacity(65);
        packed.push(MESSAGE_SIGNATURE_HEADER + recovery_id + if compressed { 4 } else { 0 });
        packed.extend_from_slice(&sig.to_bytes());
        Ok(STANDARD.encode(packed))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

/// A secp256k1 public key with its two address hashes cached.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    point: SecpPoint,
    network: Network,
    hash160_compressed: [u8; 20],
    hash160_uncompressed: [u8; 20],
}

impl PublicKey {
    fn from_secp(point: SecpPoint, network: Network) -> Self {
        PublicKey {
            point,
            network,
            hash160_compressed: hash160(&point.serialize()),
            hash160_uncompressed: hash160(&point.serialize_uncompressed()),
        }
    }

    pub fn from_point(point: &Point, network: Network) -> Result<Self> {
        point
            .as_secp()
            .map(|p| PublicKey::from_secp(*p, network))
            .ok_or_else(|| BitcoinError::Domain("public key cannot be the point at infinity".to_string()))
    }

    /// SEC1: `0x04 || x || y` (65 bytes) or `0x02/0x03 || x` (33 bytes).
    pub fn from_bytes(bytes: &[u8], network: Network) -> Result<Self> {
        match (bytes.first(), bytes.len()) {
            (Some(0x04), 65) | (Some(0x02 | 0x03), 33) => {}
            (Some(prefix), len) => {
                return Err(BitcoinError::Deserialization(format!(
                    "bad public key encoding: prefix 0x{prefix:02x}, {len} bytes"
                )))
            }
            (None, _) => return Err(BitcoinError::Deserialization("empty public key".to_string())),
        }
        let point = SecpPoint::from_slice(bytes)
            .map_err(|_| BitcoinError::Domain("public key is not on the curve".to_string()))?;
        Ok(PublicKey::from_secp(point, network))
    }

    pub fn from_hex(s: &str, network: Network) -> Result<Self> {
        PublicKey::from_bytes(&hex::decode(s)?, network)
    }

    /// Recovers the signer's key from a digest and a signature carrying a
    /// recovery id.
    pub fn from_signature(digest: &[u8], signature: &Signature, network: Network) -> Result<Self> {
        let msg = message_from_digest(digest)?;
        let point = secp().recover_ecdsa(&msg, &signature.to_recoverable()?)?;
        Ok(PublicKey::from_secp(point, network))
    }

    pub fn point(&self) -> Point {
        Point::Affine(self.point)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Uncompressed SEC1 encoding.
    pub fn to_bytes(&self) -> [u8; 65] {
        self.point.serialize_uncompressed()
    }

    pub fn compressed_bytes(&self) -> [u8; 33] {
        self.point.serialize()
    }

    pub fn to_vec(&self, compressed: bool) -> Vec<u8> {
        if compressed {
            self.compressed_bytes().to_vec()
        } else {
            self.to_bytes().to_vec()
        }
    }

    pub fn hash160(&self, compressed: bool) -> [u8; 20] {
        if compressed {
            self.hash160_compressed
        } else {
            self.hash160_uncompressed
        }
    }

    /// P2PKH address on this key's network.
    pub fn address(&self, compressed: bool) -> String {
        self.address_for(compressed, self.network)
    }

    pub fn address_for(&self, compressed: bool, network: Network) -> String {
        key_hash_to_address(&self.hash160(compressed), network.p2pkh_version())
    }

    /// Verifies `signature` over `message`, SHA-256 hashing it first when
    /// `do_hash` is set. Returns false on any failure.
    pub fn verify(&self, message: &[u8], signature: &Signature, do_hash: bool) -> bool {
        let digest;
        let digest_ref = if do_hash {
            digest = sha256(message);
            &digest[..]
        } else {
            message
        };
        let (Ok(msg), Ok(sig)) = (message_from_digest(digest_ref), signature.to_secp()) else {
            return false;
        };
        secp().verify_ecdsa(&msg, &sig, &self.point).is_ok()
    }

    /// Checks a Base64 "Bitcoin Signed Message" signature against an address.
    pub fn verify_bitcoin(message: &[u8], signature: &str, address: &str) -> bool {
        match PublicKey::check_bitcoin_signature(message, signature, address) {
            Ok(valid) => valid,
            Err(e) => {
                debug!(error = %e, "message signature rejected");
                false
            }
        }
    }

    fn check_bitcoin_signature(message: &[u8], signature: &str, address: &str) -> Result<bool> {
        let packed = STANDARD.decode(signature)?;
        if packed.len() != 65 {
            return Err(BitcoinError::Deserialization(format!(
                "message signature must be 65 bytes, got {}",
                packed.len()
            )));
        }
        let header = packed[0]
            .checked_sub(MESSAGE_SIGNATURE_HEADER)
            .filter(|&h| h < 8)
            .ok_or_else(|| BitcoinError::Deserialization(format!("bad signature header {}", packed[0])))?;
        let compressed = header & 4 != 0;
        let sig = Signature::from_bytes(&packed[1..])?.with_recovery_id(header & 3)?;

        let (_, network, _) = decode_address(address)?;
        let digest = sha256(&sha256(&message_preimage(message)));
        let recovered = PublicKey::from_signature(&digest, &sig, network)?;
        if recovered.address(compressed) != address {
            return Ok(false);
        }
        Ok(recovered.verify(&digest, &sig, false))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.compressed_bytes()))
    }
}
