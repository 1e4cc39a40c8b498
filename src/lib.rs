//! # btc-primitives
//!
//! Legacy (pre-SegWit) Bitcoin primitives: keys and signatures, BIP32 HD
//! keys, Script, a Script interpreter, and transaction signing.
//!
//! ## Architecture
//!
//! The crate is layered bottom-up:
//! - Hashes and wire encodings (`hash`, `encoding`)
//! - The secp256k1 curve, keys and signatures (`curve`, `keys`, `signature`, `hd`)
//! - Script representation (`opcodes`, `script`)
//! - Evaluation (`interpreter`)
//! - Transactions, signature hashing and signing (`transaction`)
//!
//! ## Design Principles
//!
//! 1. **Byte Exactness**: every wire format round-trips bit-for-bit
//! 2. **Value Types**: keys, scripts and transactions are plain owned values; derivation returns new values
//! 3. **Exact Version Pinning**: all consensus-critical dependencies are pinned to exact versions
//! 4. **Historical Quirks Preserved**: SIGHASH_SINGLE with a missing output and the CHECKMULTISIG extra element
//!
//! ## Usage
//!
//! ```rust
//! use btc_primitives::{Network, PrivateKey, Script};
//!
//! let key = PrivateKey::from_hex(
//!     "0000000000000000000000000000000000000000000000000000000000000001",
//!     Network::Mainnet,
//! )
//! .unwrap();
//! let script = Script::build_p2pkh(&key.public_key().hash160(true));
//! assert!(script.is_p2pkh());
//! assert_eq!(script.get_hash160(), Some(key.public_key().hash160(true)));
//! ```

pub mod constants;
pub mod curve;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod hd;
pub mod interpreter;
pub mod keys;
pub mod opcodes;
pub mod pow;
pub mod script;
pub mod signature;
pub mod transaction;
pub mod types;

// Re-export commonly used types
pub use error::{BitcoinError, Result};
pub use hash::Hash;
pub use hd::{DerivationPath, ExtendedKey, HDKey, HDPrivateKey, HDPublicKey};
pub use interpreter::{InterpreterConfig, ScriptInterpreter, StackItem};
pub use keys::{PrivateKey, PublicKey};
pub use opcodes::Opcode;
pub use script::{Node, PushData, PushKind, Script, TemplateToken, Token};
pub use signature::Signature;
pub use transaction::{
    CoinbaseInput, Transaction, TransactionAddresses, TransactionInput, TransactionOutput, UnspentTransactionOutput,
};
pub use types::{AddressKind, Network};
