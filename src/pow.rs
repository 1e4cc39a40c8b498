//! Proof of work targets: difficulty, 256-bit targets and compact "bits"

use std::cmp::Ordering;
use std::fmt;

use crate::constants::MAX_TARGET;
use crate::error::{BitcoinError, Result};

fn domain_error(msg: impl Into<String>) -> BitcoinError {
    BitcoinError::Domain(msg.into())
}

/// 256-bit unsigned integer for target calculations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct U256([u64; 4]); // little-endian words

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);

    pub fn from_u32(value: u32) -> Self {
        U256([value as u64, 0, 0, 0])
    }

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0)
    }

    /// Number of significant bits.
    pub fn bits(&self) -> u32 {
        for (i, &word) in self.0.iter().enumerate().rev() {
            if word != 0 {
                return 64 * i as u32 + (64 - word.leading_zeros());
            }
        }
        0
    }

    pub fn low_u64(&self) -> u64 {
        self.0[0]
    }

    /// Shifts left, dropping bits shifted past 256.
    pub fn shl(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }

        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;

        for i in 0..4 {
            if i + word_shift < 4 {
                result.0[i + word_shift] |= self.0[i] << bit_shift;
                if bit_shift > 0 && i + word_shift + 1 < 4 {
                    result.0[i + word_shift + 1] |= self.0[i] >> (64 - bit_shift);
                }
            }
        }

        result
    }

    pub fn shr(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }

        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;

        for i in word_shift..4 {
            result.0[i - word_shift] |= self.0[i] >> bit_shift;
            if bit_shift > 0 && i > word_shift {
                result.0[i - word_shift - 1] |= self.0[i] << (64 - bit_shift);
            }
        }

        result
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, chunk) in bytes.chunks_exact(8).enumerate() {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            words[3 - i] = u64::from_be_bytes(word);
        }
        U256(words)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, word) in self.0.iter().rev().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&word.to_be_bytes());
        }
        bytes
    }

    /// Parses big-endian hex of up to 64 digits, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() || digits.len() > 64 {
            return Err(BitcoinError::Deserialization(format!("'{s}' is not a 256-bit hex number")));
        }
        let padded = format!("{digits:0>64}");
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(padded, &mut bytes)?;
        Ok(U256::from_be_bytes(bytes))
    }

    /// Nearest f64; exact for values of 53 significant bits or fewer.
    pub fn to_f64(&self) -> f64 {
        self.0
            .iter()
            .rev()
            .fold(0.0, |acc, &word| acc * 18_446_744_073_709_551_616.0 + word as f64)
    }

    /// The integer part of a finite, non-negative f64.
    fn from_f64_trunc(value: f64) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(domain_error(format!("{value} is not a non-negative finite number")));
        }
        if value < 1.0 {
            return Ok(U256::ZERO);
        }
        let raw = value.to_bits();
        let exponent = ((raw >> 52) & 0x7ff) as i32 - 1075;
        let mantissa = (raw & ((1u64 << 52) - 1)) | (1u64 << 52);
        if exponent < 0 {
            return Ok(U256::from_u64(mantissa >> (-exponent) as u32));
        }
        if exponent + 53 > 256 {
            return Err(domain_error(format!("{value} does not fit in 256 bits")));
        }
        Ok(U256::from_u64(mantissa).shl(exponent as u32))
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().rev().zip(other.0.iter().rev()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.to_be_bytes());
        let trimmed = hex.trim_start_matches('0');
        write!(f, "0x{}", if trimmed.is_empty() { "0" } else { trimmed })
    }
}

/// The difficulty-1 target
pub fn max_target() -> U256 {
    U256::from_be_bytes(MAX_TARGET)
}

/// DifficultyToTarget: ℝ⁺ → ℕ
///
/// target = ⌊MAX_TARGET / difficulty⌋, with the division done in f64.
pub fn difficulty_to_target(difficulty: f64) -> Result<U256> {
    if !difficulty.is_finite() || difficulty <= 0.0 {
        return Err(domain_error(format!("difficulty must be positive, got {difficulty}")));
    }
    U256::from_f64_trunc(max_target().to_f64() / difficulty)
}

/// Compact encoding of a target.
///
/// The format is 0xEEMMMMMM where:
/// - EE is the size of the target in bytes
/// - MMMMMM holds its three most significant bytes
///
/// The mantissa's top bit is a sign bit, so a mantissa that would set it is
/// shifted down a byte and the size grows by one.
pub fn target_to_bits(target: &U256) -> u32 {
    let mut size = target.bits().div_ceil(8);
    let mantissa = if size <= 3 {
        target.low_u64() << (8 * (3 - size))
    } else {
        target.shr(8 * (size - 3)).low_u64()
    };
    let mut compact = mantissa as u32;
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Expands compact bits into a target.
///
/// Negative and overflowing encodings are rejected.
pub fn bits_to_target(bits: u32) -> Result<U256> {
    let exponent = bits >> 24;
    let mantissa = bits & 0x007f_ffff;

    if mantissa == 0 {
        return Ok(U256::ZERO);
    }
    if bits & 0x0080_0000 != 0 {
        return Err(domain_error(format!("bits 0x{bits:08x} encode a negative target")));
    }

    if exponent <= 3 {
        return Ok(U256::from_u32(mantissa >> (8 * (3 - exponent))));
    }
    let shift = 8 * (exponent - 3);
    let mantissa_bits = 32 - mantissa.leading_zeros();
    if shift + mantissa_bits > 256 {
        return Err(domain_error(format!("bits 0x{bits:08x} overflow 256 bits")));
    }
    Ok(U256::from_u32(mantissa).shl(shift))
}

/// MAX_TARGET / target for a compact target.
pub fn bits_to_difficulty(bits: u32) -> Result<f64> {
    let target = bits_to_target(bits)?;
    if target.is_zero() {
        return Err(domain_error("zero target has no difficulty"));
    }
    Ok(max_target().to_f64() / target.to_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_zero() {
        assert!(U256::ZERO.is_zero());
        assert_eq!(U256::ZERO.bits(), 0);
        assert_eq!(U256::ZERO.to_string(), "0x0");
    }

    #[test]
    fn test_u256_shl_shr() {
        let value = U256::from_u32(0x12345678);
        assert_eq!(value.shl(0), value);
        assert!(value.shl(300).is_zero());
        assert_eq!(value.shl(8).shr(8), value);
        assert_eq!(value.shl(100).shr(100), value);
        assert_eq!(value.shr(4), U256::from_u32(0x01234567));
        assert_eq!(U256::from_u64(1).shl(64).bits(), 65);
    }

    #[test]
    fn test_u256_bytes_and_hex() {
        let max = max_target();
        assert_eq!(max.to_be_bytes(), MAX_TARGET);
        assert_eq!(max, U256::from_u32(0xffff).shl(208));
        assert_eq!(U256::from_hex("0x00000000ffff0000000000000000000000000000000000000000000000000000").unwrap(), max);
        assert_eq!(U256::from_hex("ff").unwrap(), U256::from_u32(0xff));
        assert!(U256::from_hex("").is_err());
        assert!(U256::from_hex(&"1".repeat(65)).is_err());
    }

    #[test]
    fn test_u256_ordering() {
        let small = U256::from_u32(0x12345678);
        let large = U256::from_u32(0x87654321);
        assert!(small < large);
        assert!(U256::from_u64(1).shl(200) > large);
        assert_eq!(small.cmp(&small), Ordering::Equal);
    }

    #[test]
    fn test_difficulty_one() {
        assert_eq!(difficulty_to_target(1.0).unwrap(), max_target());
        assert_eq!(target_to_bits(&max_target()), 0x1d00ffff);
        assert_eq!(bits_to_difficulty(0x1d00ffff).unwrap(), 1.0);
    }

    #[test]
    fn test_bad_difficulty() {
        assert!(difficulty_to_target(0.0).is_err());
        assert!(difficulty_to_target(-3.0).is_err());
        assert!(difficulty_to_target(f64::NAN).is_err());
        assert!(difficulty_to_target(f64::INFINITY).is_err());
    }

    #[test]
    fn test_bits_edge_cases() {
        assert!(bits_to_target(0x1d000000).unwrap().is_zero());
        assert!(bits_to_target(0x04923456).is_err());
        assert!(bits_to_target(0xff123456).is_err());
        assert_eq!(bits_to_target(0x03123456).unwrap(), U256::from_u32(0x123456));
        assert_eq!(bits_to_target(0x02123456).unwrap(), U256::from_u32(0x1234));
        assert_eq!(target_to_bits(&U256::from_u32(0x80)), 0x02008000);
    }
}
