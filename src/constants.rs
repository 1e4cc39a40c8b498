//! Bitcoin protocol constants for the legacy script and transaction model

/// Maximum combined size of the main stack and the alt-stack during execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum nesting of OP_IF/OP_NOTIF branches accepted by the parser
pub const MAX_BRANCH_DEPTH: usize = 256;

/// Maximum length of a numeric stack operand
pub const MAX_SCRIPT_NUM_LEN: usize = 4;

/// OP_CHECKLOCKTIMEVERIFY operands may be one byte longer
pub const MAX_LOCKTIME_NUM_LEN: usize = 5;

/// Maximum number of public keys consumed by OP_CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;

/// Largest m and n a standard multisig redeem script encodes with OP_1..OP_16
pub const MAX_STANDARD_MULTISIG_KEYS: usize = 16;

/// Largest data push that fits in a single length-byte opcode
pub const MAX_INLINE_PUSH: usize = 75;

/// Lock time threshold: lock times below this are block heights
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number for final transaction inputs
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Outpoint index used by coinbase inputs
pub const COINBASE_OUTPOINT_INDEX: u32 = 0xffffffff;

/// Confirmations after which an unspent output is considered settled
pub const CONFIRMED_THRESHOLD: u32 = 6;

// Signature hash types
pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// Mask selecting the base signature hash mode
pub const SIGHASH_BASE_MASK: u32 = 0x1f;

// Address and key version bytes
pub const P2PKH_MAINNET_VERSION: u8 = 0x00;
pub const P2PKH_TESTNET_VERSION: u8 = 0x6f;
pub const P2SH_MAINNET_VERSION: u8 = 0x05;
pub const P2SH_TESTNET_VERSION: u8 = 0xc4;
pub const WIF_MAINNET_VERSION: u8 = 0x80;
pub const WIF_TESTNET_VERSION: u8 = 0xef;

// BIP32 extended key version words
pub const XPRV_MAINNET_VERSION: u32 = 0x0488_ade4;
pub const XPRV_TESTNET_VERSION: u32 = 0x0435_8394;
pub const XPUB_MAINNET_VERSION: u32 = 0x0488_b21e;
pub const XPUB_TESTNET_VERSION: u32 = 0x0435_87cf;

/// Serialized length of a BIP32 extended key before Base58Check
pub const EXTENDED_KEY_LEN: usize = 78;

/// Child indices at or above this value are hardened
pub const HARDENED_INDEX: u32 = 0x8000_0000;

/// HMAC key for BIP32 master key generation
pub const BIP32_SEED_KEY: &[u8] = b"Bitcoin seed";

/// PBKDF2 rounds for BIP39 seed stretching
pub const BIP39_PBKDF2_ROUNDS: u32 = 2048;

/// Prefix for "Bitcoin Signed Message" signing
pub const MESSAGE_MAGIC: &[u8] = b"\x18Bitcoin Signed Message:\n";

/// Base value of the header byte in compact message signatures
pub const MESSAGE_SIGNATURE_HEADER: u8 = 27;

/// Maximum target (minimum difficulty): 0x00000000FFFF0000...0000
pub const MAX_TARGET: [u8; 32] = [
    0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];
