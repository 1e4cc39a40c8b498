//! Error types for parsing, interpreting and signing Bitcoin data

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitcoinError {
    /// Malformed bytes for a hash, script, transaction or key.
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Unbalanced conditionals, bad push lengths, unknown tokens.
    #[error("Script parsing failed: {0}")]
    ScriptParsing(String),

    /// A script does not match the template an operation requires.
    #[error("Script type mismatch: {0}")]
    ScriptType(String),

    /// Malformed opcode usage during execution.
    #[error("Script interpreter error: {0}")]
    ScriptInterpreter(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    /// Out-of-range scalars or points, invalid DER, impossible derivations.
    #[error("Domain error: {0}")]
    Domain(String),
}

pub type Result<T> = std::result::Result<T, BitcoinError>;

impl From<hex::FromHexError> for BitcoinError {
    fn from(e: hex::FromHexError) -> Self {
        BitcoinError::Deserialization(format!("invalid hex: {e}"))
    }
}

impl From<bs58::decode::Error> for BitcoinError {
    fn from(e: bs58::decode::Error) -> Self {
        BitcoinError::Deserialization(format!("invalid base58check: {e}"))
    }
}

impl From<base64::DecodeError> for BitcoinError {
    fn from(e: base64::DecodeError) -> Self {
        BitcoinError::Deserialization(format!("invalid base64: {e}"))
    }
}

impl From<secp256k1::Error> for BitcoinError {
    fn from(e: secp256k1::Error) -> Self {
        BitcoinError::Domain(format!("secp256k1: {e}"))
    }
}
