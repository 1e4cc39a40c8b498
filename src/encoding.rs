//! Wire encodings: compact-size integers, var-strings, Script numbers,
//! Base58Check and addresses.

use crate::error::{BitcoinError, Result};
use crate::types::{AddressKind, Network};

/// Encodes a "compact size" integer (1, 3, 5 or 9 bytes).
pub fn pack_compact_int(n: u64) -> Vec<u8> {
    match n {
        0..=0xfc => vec![n as u8],
        0xfd..=0xffff => {
            let mut out = vec![0xfd];
            out.extend_from_slice(&(n as u16).to_le_bytes());
            out
        }
        0x1_0000..=0xffff_ffff => {
            let mut out = vec![0xfe];
            out.extend_from_slice(&(n as u32).to_le_bytes());
            out
        }
        _ => {
            let mut out = vec![0xff];
            out.extend_from_slice(&n.to_le_bytes());
            out
        }
    }
}

/// Length-prefixed byte string.
pub fn pack_var_str(data: &[u8]) -> Vec<u8> {
    let mut out = pack_compact_int(data.len() as u64);
    out.extend_from_slice(data);
    out
}

/// Minimal Script-number encoding: little-endian magnitude with the sign in
/// the top bit of the last byte. Zero encodes as the empty string.
pub fn render_int(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let negative = n < 0;
    let mut magnitude = n.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while magnitude > 0 {
        out.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// Decodes a Script number of at most `max_len` bytes.
///
/// Non-minimal encodings are accepted; negative zero decodes to 0.
pub fn parse_script_num(bytes: &[u8], max_len: usize) -> Result<i64> {
    if bytes.len() > max_len {
        return Err(BitcoinError::ScriptInterpreter(format!(
            "numeric operand of {} bytes exceeds {} bytes",
            bytes.len(),
            max_len
        )));
    }
    if bytes.len() > 8 {
        return Err(BitcoinError::ScriptInterpreter("numeric operand too large".to_string()));
    }
    let Some(&last) = bytes.last() else {
        return Ok(0);
    };
    let mut value: u64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as u64) << (8 * i);
    }
    if last & 0x80 != 0 {
        let sign_bit = 0x80u64 << (8 * (bytes.len() - 1));
        Ok(-((value & !sign_bit) as i64))
    } else {
        Ok(value as i64)
    }
}

/// Bounds-checked cursor over serialized data.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Unread tail of the input.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len()).ok_or_else(|| {
            BitcoinError::Deserialization(format!(
                "unexpected end of data: wanted {} bytes at offset {}, {} available",
                n,
                self.pos,
                self.data.len() - self.pos
            ))
        })?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_compact_int(&mut self) -> Result<u64> {
        match self.read_u8()? {
            0xfd => Ok(self.read_u16_le()? as u64),
            0xfe => Ok(self.read_u32_le()? as u64),
            0xff => self.read_u64_le(),
            n => Ok(n as u64),
        }
    }

    /// Reads a compact-size length followed by that many bytes.
    pub fn read_var_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_compact_int()?;
        let len = usize::try_from(len)
            .map_err(|_| BitcoinError::Deserialization(format!("length {len} does not fit in memory")))?;
        self.read_bytes(len)
    }
}

/// Base58Check over a payload that already includes its version prefix.
pub fn base58check_encode(payload: &[u8]) -> String {
    bs58::encode(payload).with_check().into_string()
}

/// Decodes Base58Check, returning the version prefix and payload together.
pub fn base58check_decode(s: &str) -> Result<Vec<u8>> {
    Ok(bs58::decode(s).with_check(None).into_vec()?)
}

/// Base58Check address for a 20-byte key or script hash.
pub fn key_hash_to_address(hash160: &[u8; 20], version: u8) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(hash160);
    base58check_encode(&payload)
}

/// Splits an address into its version byte and 20-byte hash.
pub fn address_to_key_hash(address: &str) -> Result<(u8, [u8; 20])> {
    let payload = base58check_decode(address)?;
    if payload.len() != 21 {
        return Err(BitcoinError::Deserialization(format!(
            "address payload must be 21 bytes, got {}",
            payload.len()
        )));
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok((payload[0], hash))
}

/// Decodes an address and classifies its version byte.
pub fn decode_address(address: &str) -> Result<(AddressKind, Network, [u8; 20])> {
    let (version, hash) = address_to_key_hash(address)?;
    let (kind, network) = AddressKind::from_version(version).ok_or_else(|| {
        BitcoinError::Deserialization(format!("unknown address version 0x{version:02x}"))
    })?;
    Ok((kind, network, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_int_boundaries() {
        for (n, len) in [(0u64, 1), (0xfc, 1), (0xfd, 3), (0xffff, 3), (0x10000, 5), (0xffff_ffff, 5), (1 << 32, 9)] {
            let packed = pack_compact_int(n);
            assert_eq!(packed.len(), len, "n = {n:#x}");
            let mut reader = ByteReader::new(&packed);
            assert_eq!(reader.read_compact_int().unwrap(), n);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn test_render_int_vectors() {
        assert_eq!(render_int(0), Vec::<u8>::new());
        assert_eq!(render_int(1), vec![0x01]);
        assert_eq!(render_int(-1), vec![0x81]);
        assert_eq!(render_int(127), vec![0x7f]);
        assert_eq!(render_int(128), vec![0x80, 0x00]);
        assert_eq!(render_int(-128), vec![0x80, 0x80]);
        assert_eq!(render_int(255), vec![0xff, 0x00]);
        assert_eq!(render_int(367987), vec![0x73, 0x9d, 0x05]);
    }

    #[test]
    fn test_parse_script_num() {
        assert_eq!(parse_script_num(&[], 4).unwrap(), 0);
        assert_eq!(parse_script_num(&[0x80], 4).unwrap(), 0);
        assert_eq!(parse_script_num(&[0x81], 4).unwrap(), -1);
        assert_eq!(parse_script_num(&[0x80, 0x00], 4).unwrap(), 128);
        assert_eq!(parse_script_num(&[0xff, 0xf7, 0x4d, 0x05], 5).unwrap(), 0x054df7ff);
        assert_eq!(parse_script_num(&[0x74, 0x9d, 0x05], 4).unwrap(), 367988);
        assert!(parse_script_num(&[1, 2, 3, 4, 5], 4).is_err());
        for n in [-100_000i64, -255, -1, 0, 1, 16, 255, 0x7fff_ffff] {
            assert_eq!(parse_script_num(&render_int(n), 5).unwrap(), n);
        }
    }

    #[test]
    fn test_reader_truncation() {
        let mut reader = ByteReader::new(&[0x05, 0x01, 0x02]);
        assert!(matches!(reader.read_var_bytes(), Err(BitcoinError::Deserialization(_))));
        let mut reader = ByteReader::new(&[0x01, 0x02]);
        assert!(reader.read_u32_le().is_err());
    }

    #[test]
    fn test_address_round_trip() {
        let hash: [u8; 20] = hex::decode("68bf827a2fa3b31e53215e5dd19260d21fdf053e").unwrap().try_into().unwrap();
        let address = key_hash_to_address(&hash, 0x00);
        assert_eq!(address, "1AYrhH1SAQqhT8w5NguBSogN63ajS6PxNL");
        let (kind, network, back) = decode_address(&address).unwrap();
        assert_eq!((kind, network, back), (AddressKind::P2pkh, Network::Mainnet, hash));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        assert!(address_to_key_hash("1AYrhH1SAQqhT8w5NguBSogN63ajS6PxNM").is_err());
    }
}
