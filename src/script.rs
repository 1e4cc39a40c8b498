//! Bitcoin Script: text, byte and AST representations
//!
//! A script is held as its serialized bytes. The token sequence and the AST
//! built from it are produced on first use and cached. Scripts built from
//! text or tokens are parsed eagerly; scripts built from bytes are not parsed
//! until something asks for their structure.
//!
//! Text grammar (whitespace separated):
//! - `OP_<NAME>`: an opcode
//! - `0x<hex>`: a data push, encoded with the smallest push opcode that fits
//! - `OP_PUSHDATA{1,2,4} 0x<len> 0x<data>`: an explicitly encoded push
//!
//! AST: `Script := Node*`, `Node := Op | Push | Branch(IF|NOTIF, Node*, [Node*])`

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{MAX_BRANCH_DEPTH, MAX_INLINE_PUSH, MAX_STANDARD_MULTISIG_KEYS};
use crate::encoding::{key_hash_to_address, render_int, ByteReader};
use crate::error::{BitcoinError, Result};
use crate::hash::hash160;
use crate::opcodes::Opcode;
use crate::signature::Signature;
use crate::types::Network;

fn parse_error(msg: impl Into<String>) -> BitcoinError {
    BitcoinError::ScriptParsing(msg.into())
}

fn type_error(msg: impl Into<String>) -> BitcoinError {
    BitcoinError::ScriptType(msg.into())
}

/// Whether `key` has the size and header byte of a SEC1 public key.
pub fn is_valid_pubkey_size(key: &[u8]) -> bool {
    matches!((key.first(), key.len()), (Some(0x02 | 0x03), 33) | (Some(0x04), 65))
}

/// The opcode that introduces a data push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushKind {
    /// Length byte 0x01..=0x4b followed by the data
    Inline,
    PushData1,
    PushData2,
    PushData4,
}

impl PushKind {
    /// Smallest encoding able to carry `len` bytes.
    pub fn minimal_for(len: usize) -> PushKind {
        match len {
            0..=MAX_INLINE_PUSH => PushKind::Inline,
            76..=0xff => PushKind::PushData1,
            0x100..=0xffff => PushKind::PushData2,
            _ => PushKind::PushData4,
        }
    }

    fn max_len(self) -> usize {
        match self {
            PushKind::Inline => MAX_INLINE_PUSH,
            PushKind::PushData1 => 0xff,
            PushKind::PushData2 => 0xffff,
            PushKind::PushData4 => u32::MAX as usize,
        }
    }

    pub fn opcode(self) -> Option<Opcode> {
        match self {
            PushKind::Inline => None,
            PushKind::PushData1 => Some(Opcode::OP_PUSHDATA1),
            PushKind::PushData2 => Some(Opcode::OP_PUSHDATA2),
            PushKind::PushData4 => Some(Opcode::OP_PUSHDATA4),
        }
    }

    fn from_opcode(op: Opcode) -> Option<PushKind> {
        match op {
            Opcode::OP_PUSHDATA1 => Some(PushKind::PushData1),
            Opcode::OP_PUSHDATA2 => Some(PushKind::PushData2),
            Opcode::OP_PUSHDATA4 => Some(PushKind::PushData4),
            _ => None,
        }
    }
}

/// A data push together with the encoding it was written with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PushData {
    kind: PushKind,
    data: Vec<u8>,
}

impl PushData {
    /// Minimally encoded push. Empty pushes are written as OP_0 instead.
    pub fn new(data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(parse_error("cannot push an empty byte string; use OP_0"));
        }
        Ok(PushData { kind: PushKind::minimal_for(data.len()), data })
    }

    /// Push with an explicit encoding. Inline pushes carry 1..=75 bytes.
    pub fn with_kind(kind: PushKind, data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        if data.len() > kind.max_len() || (kind == PushKind::Inline && data.is_empty()) {
            return Err(parse_error(format!("{} bytes cannot be pushed with {:?}", data.len(), kind)));
        }
        Ok(PushData { kind, data })
    }

    pub fn kind(&self) -> PushKind {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn is_minimal(&self) -> bool {
        !self.data.is_empty() && self.kind == PushKind::minimal_for(self.data.len())
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        let len = self.data.len();
        match self.kind {
            PushKind::Inline => out.push(len as u8),
            PushKind::PushData1 => {
                out.push(Opcode::OP_PUSHDATA1.to_byte());
                out.push(len as u8);
            }
            PushKind::PushData2 => {
                out.push(Opcode::OP_PUSHDATA2.to_byte());
                out.extend_from_slice(&(len as u16).to_le_bytes());
            }
            PushKind::PushData4 => {
                out.push(Opcode::OP_PUSHDATA4.to_byte());
                out.extend_from_slice(&(len as u32).to_le_bytes());
            }
        }
        out.extend_from_slice(&self.data);
    }
}

impl fmt::Display for PushData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.data.len();
        match self.kind {
            _ if self.is_minimal() => {}
            PushKind::Inline => {}
            PushKind::PushData1 => write!(f, "OP_PUSHDATA1 0x{len:02x} ")?,
            PushKind::PushData2 => write!(f, "OP_PUSHDATA2 0x{len:04x} ")?,
            PushKind::PushData4 => write!(f, "OP_PUSHDATA4 0x{len:08x} ")?,
        }
        write!(f, "0x{}", hex::encode(&self.data))
    }
}

/// One element of the flat token sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Op(Opcode),
    Push(PushData),
}

impl Token {
    /// Minimal push of `data`.
    pub fn push(data: impl Into<Vec<u8>>) -> Result<Token> {
        PushData::new(data).map(Token::Push)
    }

    pub fn as_op(&self) -> Option<Opcode> {
        match self {
            Token::Op(op) => Some(*op),
            Token::Push(_) => None,
        }
    }

    pub fn as_push(&self) -> Option<&[u8]> {
        match self {
            Token::Push(p) => Some(p.data()),
            Token::Op(_) => None,
        }
    }
}

impl From<Opcode> for Token {
    fn from(op: Opcode) -> Self {
        Token::Op(op)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Op(op) => f.write_str(op.name()),
            Token::Push(p) => p.fmt(f),
        }
    }
}

/// A node of the parsed program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Op(Opcode),
    Push(PushData),
    /// OP_IF/OP_NOTIF with the branches up to the matching OP_ENDIF.
    Branch {
        op: Opcode,
        then_branch: Vec<Node>,
        else_branch: Option<Vec<Node>>,
    },
}

/// Element accepted by [`Script::validate_template`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateToken {
    Op(Opcode),
    /// Any data push
    Data,
}

/// Information extracted from a P2PKH scriptSig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigInfo {
    pub hash_type: u8,
    /// DER signature without the trailing hash type byte
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// Information extracted from a multisig redeem script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigRedeemInfo {
    pub m: usize,
    pub n: usize,
    pub public_keys: Vec<Vec<u8>>,
}

/// Information extracted from a P2SH multisig scriptSig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigSigInfo {
    /// Signatures including their hash type bytes, in script order
    pub signatures: Vec<Vec<u8>>,
    pub redeem_script: Script,
}

#[derive(Debug, Clone)]
struct Parsed {
    tokens: Vec<Token>,
    ast: Vec<Node>,
}

impl Parsed {
    fn from_tokens(tokens: Vec<Token>) -> Result<Self> {
        let ast = build_ast(&tokens)?;
        Ok(Parsed { tokens, ast })
    }
}

/// Disassembles serialized bytes into tokens.
fn tokens_from_bytes(bytes: &[u8]) -> Result<Vec<Token>> {
    let mut reader = ByteReader::new(bytes);
    let mut tokens = Vec::new();
    while !reader.is_empty() {
        let byte = reader.read_u8()?;
        let token = match byte {
            0x01..=0x4b => Token::Push(PushData { kind: PushKind::Inline, data: reader.read_bytes(byte as usize)?.to_vec() }),
            0x4c => {
                let len = reader.read_u8()? as usize;
                Token::Push(PushData { kind: PushKind::PushData1, data: reader.read_bytes(len)?.to_vec() })
            }
            0x4d => {
                let len = reader.read_u16_le()? as usize;
                Token::Push(PushData { kind: PushKind::PushData2, data: reader.read_bytes(len)?.to_vec() })
            }
            0x4e => {
                let len = reader.read_u32_le()? as usize;
                Token::Push(PushData { kind: PushKind::PushData4, data: reader.read_bytes(len)?.to_vec() })
            }
            _ => Token::Op(Opcode::from_byte(byte).ok_or_else(|| {
                BitcoinError::Deserialization(format!(
                    "unknown opcode 0x{byte:02x} at offset {}",
                    reader.position() - 1
                ))
            })?),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn parse_hex_word(word: &str) -> Result<Vec<u8>> {
    let digits = word.strip_prefix("0x").ok_or_else(|| parse_error(format!("expected 0x<hex>, found '{word}'")))?;
    hex::decode(digits).map_err(|e| parse_error(format!("invalid hex '{word}': {e}")))
}

/// Tokenizes the text form.
fn tokens_from_text(text: &str) -> Result<Vec<Token>> {
    let mut words = text.split_whitespace();
    let mut tokens = Vec::new();
    while let Some(word) = words.next() {
        if word.starts_with("0x") {
            tokens.push(Token::Push(PushData::new(parse_hex_word(word)?)?));
            continue;
        }
        let op: Opcode = word.parse()?;
        let Some(kind) = PushKind::from_opcode(op) else {
            tokens.push(Token::Op(op));
            continue;
        };
        let len_word = words.next().ok_or_else(|| parse_error(format!("{op} is missing its length")))?;
        let len_digits = len_word
            .strip_prefix("0x")
            .ok_or_else(|| parse_error(format!("{op} length must be 0x<hex>, found '{len_word}'")))?;
        let len = usize::from_str_radix(len_digits, 16)
            .map_err(|_| parse_error(format!("invalid {op} length '{len_word}'")))?;
        let data_word = words.next().ok_or_else(|| parse_error(format!("{op} is missing its data")))?;
        let data = parse_hex_word(data_word)?;
        if data.len() != len {
            return Err(parse_error(format!("{op} declares {len} bytes but carries {}", data.len())));
        }
        tokens.push(Token::Push(PushData::with_kind(kind, data)?));
    }
    Ok(tokens)
}

struct OpenBranch {
    op: Opcode,
    then_branch: Vec<Node>,
    else_branch: Option<Vec<Node>>,
}

impl OpenBranch {
    fn current(&mut self) -> &mut Vec<Node> {
        match &mut self.else_branch {
            Some(nodes) => nodes,
            None => &mut self.then_branch,
        }
    }
}

/// Nests the flat token sequence at OP_IF/OP_NOTIF..OP_ELSE..OP_ENDIF.
fn build_ast(tokens: &[Token]) -> Result<Vec<Node>> {
    let mut root = Vec::new();
    let mut open: Vec<OpenBranch> = Vec::new();
    for token in tokens {
        let node = match token {
            Token::Op(op) if op.is_conditional() => {
                if open.len() >= MAX_BRANCH_DEPTH {
                    return Err(parse_error(format!("conditionals nested deeper than {MAX_BRANCH_DEPTH}")));
                }
                open.push(OpenBranch { op: *op, then_branch: Vec::new(), else_branch: None });
                continue;
            }
            Token::Op(Opcode::OP_ELSE) => {
                let branch = open.last_mut().ok_or_else(|| parse_error("OP_ELSE without matching OP_IF/OP_NOTIF"))?;
                if branch.else_branch.is_some() {
                    return Err(parse_error("more than one OP_ELSE in a conditional"));
                }
                branch.else_branch = Some(Vec::new());
                continue;
            }
            Token::Op(Opcode::OP_ENDIF) => {
                let branch = open.pop().ok_or_else(|| parse_error("OP_ENDIF without matching OP_IF/OP_NOTIF"))?;
                Node::Branch { op: branch.op, then_branch: branch.then_branch, else_branch: branch.else_branch }
            }
            Token::Op(op) => Node::Op(*op),
            Token::Push(p) => Node::Push(p.clone()),
        };
        match open.last_mut() {
            Some(branch) => branch.current().push(node),
            None => root.push(node),
        }
    }
    if !open.is_empty() {
        return Err(parse_error("No matching OP_ENDIF"));
    }
    Ok(root)
}

/// Serializes an AST, re-emitting branch delimiters around nested nodes.
fn serialize_ast(nodes: &[Node]) -> Vec<u8> {
    enum Work<'a> {
        Node(&'a Node),
        Emit(Opcode),
    }

    let mut out = Vec::new();
    let mut work: Vec<Work<'_>> = nodes.iter().rev().map(Work::Node).collect();
    while let Some(item) = work.pop() {
        match item {
            Work::Emit(op) | Work::Node(&Node::Op(op)) => out.push(op.to_byte()),
            Work::Node(Node::Push(p)) => p.write_to(&mut out),
            Work::Node(Node::Branch { op, then_branch, else_branch }) => {
                out.push(op.to_byte());
                work.push(Work::Emit(Opcode::OP_ENDIF));
                if let Some(else_branch) = else_branch {
                    work.extend(else_branch.iter().rev().map(Work::Node));
                    work.push(Work::Emit(Opcode::OP_ELSE));
                }
                work.extend(then_branch.iter().rev().map(Work::Node));
            }
        }
    }
    out
}

/// A Bitcoin script
#[derive(Clone, Default)]
pub struct Script {
    raw: Vec<u8>,
    parsed: OnceLock<Parsed>,
}

impl Script {
    pub fn new() -> Self {
        Script::default()
    }

    /// Wraps serialized bytes; parsing is deferred until first needed.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Script { raw: bytes.into(), parsed: OnceLock::new() }
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Script::from_bytes(hex::decode(s)?))
    }

    /// Parses the text form.
    pub fn parse(text: &str) -> Result<Self> {
        Script::from_tokens(tokens_from_text(text)?)
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Result<Self> {
        let parsed = Parsed::from_tokens(tokens)?;
        let raw = serialize_ast(&parsed.ast);
        Ok(Script { raw, parsed: OnceLock::from(parsed) })
    }

    fn parsed(&self) -> Result<&Parsed> {
        if let Some(parsed) = self.parsed.get() {
            return Ok(parsed);
        }
        let parsed = Parsed::from_tokens(tokens_from_bytes(&self.raw)?)?;
        Ok(self.parsed.get_or_init(|| parsed))
    }

    pub fn tokens(&self) -> Result<&[Token]> {
        Ok(&self.parsed()?.tokens)
    }

    pub fn ast(&self) -> Result<&[Node]> {
        Ok(&self.parsed()?.ast)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.clone()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.raw)
    }

    /// Serialized length in bytes.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Text form; fails if the bytes cannot be disassembled.
    pub fn to_text(&self) -> Result<String> {
        let tokens = self.tokens()?;
        Ok(tokens.iter().map(Token::to_string).collect::<Vec<_>>().join(" "))
    }

    /// HASH160 of the serialized script.
    pub fn hash160(&self) -> [u8; 20] {
        hash160(&self.raw)
    }

    /// P2SH address paying to this script.
    pub fn address(&self, network: Network) -> String {
        key_hash_to_address(&self.hash160(), network.p2sh_version())
    }

    // ---- Token-level editing ----

    /// A copy of this script without any occurrence of `op`.
    pub fn remove_op(&self, op: Opcode) -> Result<Script> {
        let tokens = self.tokens()?.iter().filter(|t| t.as_op() != Some(op)).cloned().collect();
        Script::from_tokens(tokens)
    }

    /// A copy of this script without pushes of exactly `data`.
    pub fn remove_push(&self, data: &[u8]) -> Result<Script> {
        let tokens = self.tokens()?.iter().filter(|t| t.as_push() != Some(data)).cloned().collect();
        Script::from_tokens(tokens)
    }

    /// Applies `edit` to a copy of the tokens and replaces `self` only if
    /// the result still forms balanced conditionals.
    fn edit_tokens<T>(&mut self, edit: impl FnOnce(&mut Vec<Token>) -> Result<T>) -> Result<T> {
        let mut tokens = self.tokens()?.to_vec();
        let out = edit(&mut tokens)?;
        *self = Script::from_tokens(tokens)?;
        Ok(out)
    }

    pub fn insert(&mut self, index: usize, token: Token) -> Result<()> {
        self.edit_tokens(|tokens| {
            if index > tokens.len() {
                return Err(BitcoinError::Domain(format!("insert index {index} out of range")));
            }
            tokens.insert(index, token);
            Ok(())
        })
    }

    pub fn append(&mut self, token: Token) -> Result<()> {
        self.edit_tokens(|tokens| {
            tokens.push(token);
            Ok(())
        })
    }

    /// Removes and returns the token at `index`.
    pub fn delete(&mut self, index: usize) -> Result<Token> {
        self.edit_tokens(|tokens| {
            if index >= tokens.len() {
                return Err(BitcoinError::Domain(format!("delete index {index} out of range")));
            }
            Ok(tokens.remove(index))
        })
    }

    /// Replaces the token at `index`.
    pub fn set(&mut self, index: usize, token: Token) -> Result<Token> {
        self.edit_tokens(|tokens| {
            let slot = tokens
                .get_mut(index)
                .ok_or_else(|| BitcoinError::Domain(format!("token index {index} out of range")))?;
            Ok(std::mem::replace(slot, token))
        })
    }

    // ---- Standard templates ----

    /// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn is_p2pkh(&self) -> bool {
        let b = &self.raw;
        b.len() == 25 && b[0] == 0x76 && b[1] == 0xa9 && b[2] == 0x14 && b[23] == 0x88 && b[24] == 0xac
    }

    /// `OP_HASH160 <20 bytes> OP_EQUAL`
    pub fn is_p2sh(&self) -> bool {
        let b = &self.raw;
        b.len() == 23 && b[0] == 0xa9 && b[1] == 0x14 && b[22] == 0x87
    }

    pub fn is_multisig_redeem(&self) -> bool {
        self.extract_multisig_redeem_info().is_ok()
    }

    pub fn is_multisig_sig(&self) -> bool {
        self.extract_multisig_sig_info().is_ok()
    }

    /// `<sig||hash_type> <pubkey>`
    pub fn is_p2pkh_sig(&self) -> bool {
        self.extract_sig_info().is_ok()
    }

    /// Matches the token sequence against `template` exactly.
    pub fn validate_template(&self, template: &[TemplateToken]) -> bool {
        let Ok(tokens) = self.tokens() else {
            return false;
        };
        tokens.len() == template.len()
            && tokens.iter().zip(template).all(|(token, expected)| match (token, expected) {
                (Token::Op(op), TemplateToken::Op(want)) => op == want,
                (Token::Push(_), TemplateToken::Data) => true,
                _ => false,
            })
    }

    /// `OP_m <pubkey>... OP_n OP_CHECKMULTISIG` with 1 <= m <= n <= 16.
    pub fn extract_multisig_redeem_info(&self) -> Result<MultisigRedeemInfo> {
        let b = &self.raw;
        let not_multisig = || type_error("script is not a multisig redeem script");
        if b.len() < 3 || b[b.len() - 1] != Opcode::OP_CHECKMULTISIG.to_byte() {
            return Err(not_multisig());
        }
        let small_int = |byte: u8| {
            Opcode::from_byte(byte)
                .and_then(Opcode::small_int)
                .filter(|&v| v >= 1)
                .map(|v| v as usize)
        };
        let m = small_int(b[0]).ok_or_else(not_multisig)?;
        let n = small_int(b[b.len() - 2]).ok_or_else(not_multisig)?;
        if m > n || n > MAX_STANDARD_MULTISIG_KEYS {
            return Err(not_multisig());
        }
        let mut reader = ByteReader::new(&b[1..b.len() - 2]);
        let mut public_keys = Vec::with_capacity(n);
        for _ in 0..n {
            let len = reader.read_u8().map_err(|_| not_multisig())? as usize;
            let key = reader.read_bytes(len).map_err(|_| not_multisig())?;
            if !is_valid_pubkey_size(key) {
                return Err(not_multisig());
            }
            public_keys.push(key.to_vec());
        }
        if !reader.is_empty() {
            return Err(not_multisig());
        }
        Ok(MultisigRedeemInfo { m, n, public_keys })
    }

    /// `OP_0 <sig>... <redeem script>`
    pub fn extract_multisig_sig_info(&self) -> Result<MultisigSigInfo> {
        let not_multisig = || type_error("script is not a multisig signature script");
        let tokens = self.tokens().map_err(|_| not_multisig())?;
        let (Some(Token::Op(Opcode::OP_0)), Some(Token::Push(last))) = (tokens.first(), tokens.last()) else {
            return Err(not_multisig());
        };
        if tokens.len() < 2 {
            return Err(not_multisig());
        }
        let redeem_script = Script::from_bytes(last.data().to_vec());
        if !redeem_script.is_multisig_redeem() {
            return Err(not_multisig());
        }
        let signatures = tokens[1..tokens.len() - 1]
            .iter()
            .map(|t| t.as_push().map(<[u8]>::to_vec).ok_or_else(not_multisig))
            .collect::<Result<Vec<_>>>()?;
        Ok(MultisigSigInfo { signatures, redeem_script })
    }

    /// `<DER sig || hash_type> <pubkey>`
    pub fn extract_sig_info(&self) -> Result<SigInfo> {
        let not_sig = || type_error("script is not a P2PKH signature script");
        let tokens = self.tokens().map_err(|_| not_sig())?;
        let [Token::Push(sig), Token::Push(public_key)] = tokens else {
            return Err(not_sig());
        };
        let (&hash_type, der) = sig.data().split_last().ok_or_else(not_sig)?;
        if !is_valid_pubkey_size(public_key.data()) || Signature::from_der(der).is_err() {
            return Err(not_sig());
        }
        Ok(SigInfo { hash_type, signature: der.to_vec(), public_key: public_key.data().to_vec() })
    }

    /// The 20-byte hash this script commits to or reveals, if it is a
    /// standard output or input script.
    pub fn get_hash160(&self) -> Option<[u8; 20]> {
        let mut out = [0u8; 20];
        if self.is_p2pkh() {
            out.copy_from_slice(&self.raw[3..23]);
        } else if self.is_p2sh() {
            out.copy_from_slice(&self.raw[2..22]);
        } else if let Ok(info) = self.extract_multisig_sig_info() {
            out = info.redeem_script.hash160();
        } else if let Ok(info) = self.extract_sig_info() {
            out = hash160(&info.public_key);
        } else {
            return None;
        }
        Some(out)
    }

    /// Addresses paid to (output scripts) or signing (input scripts).
    ///
    /// A multisig scriptSig yields the P2PKH address of every key in its
    /// redeem script followed by the redeem script's P2SH address.
    pub fn get_addresses(&self, network: Network) -> Vec<String> {
        let p2pkh = |hash: &[u8; 20]| key_hash_to_address(hash, network.p2pkh_version());
        if self.is_p2pkh() {
            self.get_hash160().map(|h| p2pkh(&h)).into_iter().collect()
        } else if self.is_p2sh() {
            self.get_hash160()
                .map(|h| key_hash_to_address(&h, network.p2sh_version()))
                .into_iter()
                .collect()
        } else if let Ok(info) = self.extract_multisig_sig_info() {
            let mut addresses: Vec<String> = info
                .redeem_script
                .extract_multisig_redeem_info()
                .map(|redeem| redeem.public_keys.iter().map(|k| p2pkh(&hash160(k))).collect())
                .unwrap_or_default();
            addresses.push(info.redeem_script.address(network));
            addresses
        } else if let Ok(info) = self.extract_sig_info() {
            vec![p2pkh(&hash160(&info.public_key))]
        } else if self.validate_template(&[TemplateToken::Data, TemplateToken::Op(Opcode::OP_CHECKSIG)]) {
            // Pay-to-pubkey
            self.tokens()
                .ok()
                .and_then(|t| t[0].as_push().map(|k| p2pkh(&hash160(k))))
                .into_iter()
                .collect()
        } else {
            Vec::new()
        }
    }

    // ---- Builders ----

    pub fn build_p2pkh(hash160: &[u8; 20]) -> Script {
        let mut raw = vec![0x76, 0xa9, 0x14];
        raw.extend_from_slice(hash160);
        raw.extend_from_slice(&[0x88, 0xac]);
        Script::from_bytes(raw)
    }

    pub fn build_p2sh(hash160: &[u8; 20]) -> Script {
        let mut raw = vec![0xa9, 0x14];
        raw.extend_from_slice(hash160);
        raw.push(0x87);
        Script::from_bytes(raw)
    }

    /// `OP_m <key>... OP_n OP_CHECKMULTISIG`
    pub fn build_multisig_redeem<K: AsRef<[u8]>>(m: usize, public_keys: &[K]) -> Result<Script> {
        let n = public_keys.len();
        if m == 0 || m > n || n > MAX_STANDARD_MULTISIG_KEYS {
            return Err(BitcoinError::Domain(format!("invalid multisig parameters: {m} of {n}")));
        }
        let mut tokens = Vec::with_capacity(n + 3);
        tokens.push(Token::Op(small_int_opcode(m)?));
        for key in public_keys {
            let key = key.as_ref();
            if !is_valid_pubkey_size(key) {
                return Err(BitcoinError::Domain(format!("{} bytes is not a public key", key.len())));
            }
            tokens.push(Token::push(key)?);
        }
        tokens.push(Token::Op(small_int_opcode(n)?));
        tokens.push(Token::Op(Opcode::OP_CHECKMULTISIG));
        Script::from_tokens(tokens)
    }

    /// `OP_0 <sig>... <redeem script>`, with signatures already carrying
    /// their hash type bytes.
    pub fn build_multisig_sig<S: AsRef<[u8]>>(signatures: &[S], redeem_script: &Script) -> Result<Script> {
        let info = redeem_script.extract_multisig_redeem_info()?;
        if signatures.len() > info.n {
            return Err(BitcoinError::Signing(format!(
                "{} signatures exceed the {} keys of the redeem script",
                signatures.len(),
                info.n
            )));
        }
        let mut tokens = Vec::with_capacity(signatures.len() + 2);
        tokens.push(Token::Op(Opcode::OP_0));
        for sig in signatures {
            tokens.push(Token::push(sig.as_ref())?);
        }
        tokens.push(Token::push(redeem_script.as_bytes())?);
        Script::from_tokens(tokens)
    }
}

fn small_int_opcode(n: usize) -> Result<Opcode> {
    u8::try_from(n)
        .ok()
        .and_then(Opcode::from_small_int)
        .ok_or_else(|| BitcoinError::Domain(format!("{n} does not fit OP_0..OP_16")))
}

/// Serialized push of an integer: OP_0, OP_1NEGATE, OP_1..OP_16 where
/// possible, otherwise a minimal Script-number push.
pub fn build_push_int(value: i64) -> Vec<u8> {
    match value {
        -1 => vec![Opcode::OP_1NEGATE.to_byte()],
        0 => vec![Opcode::OP_0.to_byte()],
        1..=16 => vec![0x50 + value as u8],
        _ => {
            let data = render_int(value);
            let mut out = Vec::with_capacity(data.len() + 1);
            // at most 9 bytes, always an inline push
            PushData { kind: PushKind::Inline, data }.write_to(&mut out);
            out
        }
    }
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Script {}

impl std::hash::Hash for Script {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("[error]"),
        }
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self.to_hex())
    }
}

impl FromStr for Script {
    type Err = BitcoinError;

    fn from_str(s: &str) -> Result<Self> {
        Script::parse(s)
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Script::from_bytes(bytes)
    }
}

impl AsRef<[u8]> for Script {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Script::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
