//! ECDSA signatures and their strict DER encoding

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature as SecpSignature};

use crate::curve::Scalar;
use crate::error::{BitcoinError, Result};

/// An ECDSA signature (r, s) with an optional recovery id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    r: Scalar,
    s: Scalar,
    recovery_id: Option<u8>,
}

fn der_error(msg: &str) -> BitcoinError {
    BitcoinError::Domain(format!("invalid DER signature: {msg}"))
}

/// Validates one DER INTEGER body and converts it to a non-zero scalar.
fn der_scalar(bytes: &[u8]) -> Result<Scalar> {
    if bytes[0] & 0x80 != 0 {
        return Err(der_error("negative integer"));
    }
    if bytes.len() > 1 && bytes[0] == 0x00 && bytes[1] & 0x80 == 0 {
        return Err(der_error("excessively padded integer"));
    }
    let trimmed = if bytes[0] == 0x00 { &bytes[1..] } else { bytes };
    let value = Scalar::from_be_slice(trimmed).map_err(|_| der_error("integer out of range"))?;
    if value.is_zero() {
        return Err(der_error("integer is zero"));
    }
    Ok(value)
}

/// Minimal two's-complement big-endian encoding of a positive scalar.
fn der_integer(value: &Scalar) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(31);
    let mut out = Vec::with_capacity(33);
    if bytes[start] & 0x80 != 0 {
        out.push(0x00);
    }
    out.extend_from_slice(&bytes[start..]);
    out
}

impl Signature {
    pub fn new(r: Scalar, s: Scalar, recovery_id: Option<u8>) -> Result<Self> {
        if r.is_zero() || s.is_zero() {
            return Err(BitcoinError::Domain("r and s must be in [1, n-1]".to_string()));
        }
        if matches!(recovery_id, Some(id) if id > 3) {
            return Err(BitcoinError::Domain("recovery id must be 0..=3".to_string()));
        }
        Ok(Signature { r, s, recovery_id })
    }

    /// Strict DER decoding.
    ///
    /// Layout: `0x30 len 0x02 rlen r 0x02 slen s`, with neither integer
    /// negative nor padded beyond what its sign requires.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let total = der.len();
        if total < 8 {
            return Err(der_error("too short"));
        }
        if der[0] != 0x30 {
            return Err(der_error("missing sequence marker"));
        }
        if der[1] as usize != total - 2 {
            return Err(der_error("sequence length does not match"));
        }
        if der[2] != 0x02 {
            return Err(der_error("missing integer marker for r"));
        }
        let rlen = der[3] as usize;
        if rlen == 0 || rlen > total - 7 {
            return Err(der_error("bad r length"));
        }
        let r = der_scalar(&der[4..4 + rlen])?;

        if der[4 + rlen] != 0x02 {
            return Err(der_error("missing integer marker for s"));
        }
        let slen = der[5 + rlen] as usize;
        if slen == 0 || 6 + rlen + slen != total {
            return Err(der_error("bad s length"));
        }
        let s = der_scalar(&der[6 + rlen..])?;

        Ok(Signature { r, s, recovery_id: None })
    }

    pub fn to_der(&self) -> Vec<u8> {
        let r = der_integer(&self.r);
        let s = der_integer(&self.s);
        let mut out = Vec::with_capacity(6 + r.len() + s.len());
        out.push(0x30);
        out.push((4 + r.len() + s.len()) as u8);
        out.push(0x02);
        out.push(r.len() as u8);
        out.extend_from_slice(&r);
        out.push(0x02);
        out.push(s.len() as u8);
        out.extend_from_slice(&s);
        out
    }

    /// 64-byte `r || s`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            return Err(BitcoinError::Deserialization(format!(
                "compact signature must be 64 bytes, got {}",
                bytes.len()
            )));
        }
        let r = Scalar::from_be_slice(&bytes[..32])?;
        let s = Scalar::from_be_slice(&bytes[32..])?;
        Signature::new(r, s, None)
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r.to_be_bytes());
        out[32..].copy_from_slice(&self.s.to_be_bytes());
        out
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Signature::from_der(&hex::decode(s)?)
    }

    /// DER hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_der())
    }

    /// Base64 of the DER encoding.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_der())
    }

    pub fn r(&self) -> Scalar {
        self.r
    }

    pub fn s(&self) -> Scalar {
        self.s
    }

    pub fn recovery_id(&self) -> Option<u8> {
        self.recovery_id
    }

    pub fn with_recovery_id(mut self, recovery_id: u8) -> Result<Self> {
        if recovery_id > 3 {
            return Err(BitcoinError::Domain("recovery id must be 0..=3".to_string()));
        }
        self.recovery_id = Some(recovery_id);
        Ok(self)
    }

    /// Low-s form for libsecp256k1 verification. High-s signatures are
    /// still valid under legacy consensus rules.
    pub(crate) fn to_secp(&self) -> Result<SecpSignature> {
        let mut sig = SecpSignature::from_compact(&self.to_bytes())?;
        sig.normalize_s();
        Ok(sig)
    }

    pub(crate) fn to_recoverable(&self) -> Result<RecoverableSignature> {
        let id = self
            .recovery_id
            .ok_or_else(|| BitcoinError::Domain("signature has no recovery id".to_string()))?;
        let id = RecoveryId::from_i32(id as i32)?;
        Ok(RecoverableSignature::from_compact(&self.to_bytes(), id)?)
    }

    pub(crate) fn from_recoverable(sig: &RecoverableSignature) -> Result<Self> {
        let (id, compact) = sig.serialize_compact();
        let recovery_id = u8::try_from(id.to_i32())
            .map_err(|_| BitcoinError::Domain("recovery id out of range".to_string()))?;
        Signature::from_bytes(&compact)?.with_recovery_id(recovery_id)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("der", &self.to_hex())
            .field("recovery_id", &self.recovery_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG_HEX: &str = "3045022100ed84be709227397fb1bc13b749f235e1f98f07ef8216f15da79e926b99d2bdeb02206ff39819d91bc81fecd74e59a721a38b00725389abb9cbecb42ad1c939fd8262";

    #[test]
    fn test_der_round_trip() {
        let der = hex::decode(SIG_HEX).unwrap();
        let sig = Signature::from_der(&der).unwrap();
        assert_eq!(sig.to_der(), der);
        assert_eq!(
            hex::encode(sig.r().to_be_bytes()),
            "ed84be709227397fb1bc13b749f235e1f98f07ef8216f15da79e926b99d2bdeb"
        );
        assert_eq!(Signature::from_bytes(&sig.to_bytes()).unwrap(), sig);
    }

    #[test]
    fn test_negative_integer_rejected() {
        // r with the high bit set and no zero pad
        let mut der = hex::decode(SIG_HEX).unwrap();
        der.remove(4);
        der[3] = 0x20;
        der[1] -= 1;
        assert!(matches!(Signature::from_der(&der), Err(BitcoinError::Domain(_))));
    }

    #[test]
    fn test_excess_padding_rejected() {
        // s = 0x00 0x6f.. is padded although its high bit is clear
        let mut der = hex::decode(SIG_HEX).unwrap();
        let s_len_pos = 5 + 0x21;
        der[s_len_pos] = 0x21;
        der.insert(s_len_pos + 1, 0x00);
        der[1] += 1;
        assert!(Signature::from_der(&der).is_err());
    }

    #[test]
    fn test_malformed_lengths_rejected() {
        let der = hex::decode(SIG_HEX).unwrap();
        assert!(Signature::from_der(&der[..7]).is_err());
        let mut wrong_total = der.clone();
        wrong_total[1] += 1;
        assert!(Signature::from_der(&wrong_total).is_err());
        let mut trailing = der.clone();
        trailing.push(0x01);
        assert!(Signature::from_der(&trailing).is_err());
        let mut no_marker = der;
        no_marker[0] = 0x31;
        assert!(Signature::from_der(&no_marker).is_err());
    }

    #[test]
    fn test_zero_and_overflow_rejected() {
        assert!(Signature::from_der(&hex::decode("3006020100020101").unwrap()).is_err());
        let mut order = vec![0x30, 0x26, 0x02, 0x21, 0x00];
        order.extend_from_slice(&crate::curve::CURVE_ORDER);
        order.extend_from_slice(&[0x02, 0x01, 0x01]);
        assert!(Signature::from_der(&order).is_err());
    }

    #[test]
    fn test_small_integers_encode_minimally() {
        let sig = Signature::new(Scalar::from_u64(1), Scalar::from_u64(0x80), None).unwrap();
        assert_eq!(hex::encode(sig.to_der()), "30070201010202 0080".replace(' ', ""));
        assert_eq!(Signature::from_der(&sig.to_der()).unwrap(), sig);
    }
}
