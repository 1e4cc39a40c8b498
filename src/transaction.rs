//! Transactions: wire format, signature hashing, signing and verification

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::constants::{
    COINBASE_OUTPOINT_INDEX, CONFIRMED_THRESHOLD, SIGHASH_ANYONECANPAY, SIGHASH_BASE_MASK,
    SIGHASH_NONE, SIGHASH_SINGLE,
};
use crate::encoding::{address_to_key_hash, pack_compact_int, pack_var_str, parse_script_num, ByteReader};
use crate::error::{BitcoinError, Result};
use crate::hash::{dhash, Hash};
use crate::interpreter::ScriptInterpreter;
use crate::keys::{PrivateKey, PublicKey};
use crate::opcodes::Opcode;
use crate::script::{build_push_int, Script, Token};
use crate::signature::Signature;
use crate::types::Network;

fn signing_error(msg: impl Into<String>) -> BitcoinError {
    BitcoinError::Signing(msg.into())
}

/// A reference to the output being spent plus the script that unlocks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub outpoint: Hash,
    pub outpoint_index: u32,
    pub script: Script,
    pub sequence_num: u32,
}

impl TransactionInput {
    pub fn new(outpoint: Hash, outpoint_index: u32, script: Script, sequence_num: u32) -> Self {
        TransactionInput { outpoint, outpoint_index, script, sequence_num }
    }

    /// Parses one input, returning it with the unread bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let mut reader = ByteReader::new(bytes);
        let input = TransactionInput::read(&mut reader)?;
        Ok((input, reader.remaining()))
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let outpoint = Hash::new(reader.read_array::<32>()?);
        let outpoint_index = reader.read_u32_le()?;
        let script = Script::from_bytes(reader.read_var_bytes()?.to_vec());
        let sequence_num = reader.read_u32_le()?;
        Ok(TransactionInput { outpoint, outpoint_index, script, sequence_num })
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.outpoint.as_bytes());
        out.extend_from_slice(&self.outpoint_index.to_le_bytes());
        out.extend_from_slice(&pack_var_str(self.script.as_bytes()));
        out.extend_from_slice(&self.sequence_num.to_le_bytes());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    /// Null outpoint with index 0xffffffff.
    pub fn is_coinbase(&self) -> bool {
        self.outpoint.is_zero() && self.outpoint_index == COINBASE_OUTPOINT_INDEX
    }

    pub fn get_addresses(&self, network: Network) -> Vec<String> {
        if self.is_coinbase() {
            return Vec::new();
        }
        self.script.get_addresses(network)
    }

    fn to_json(&self) -> Value {
        json!({
            "outpoint": self.outpoint.to_hex(),
            "outpoint_index": self.outpoint_index,
            "script": self.script.to_hex(),
            "script_text": self.script.to_string(),
            "sequence_num": self.sequence_num,
        })
    }
}

/// The input of a coinbase transaction.
///
/// Its script is opaque: the block height push (BIP34, block version 2 and
/// later) followed by arbitrary miner data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbaseInput {
    height: Option<u32>,
    input: TransactionInput,
}

impl CoinbaseInput {
    pub fn new(height: u32, raw_script: &[u8], sequence: u32, block_version: u32) -> Self {
        let mut script = Vec::with_capacity(raw_script.len() + 6);
        if block_version != 1 {
            script.extend_from_slice(&build_push_int(height as i64));
        }
        script.extend_from_slice(raw_script);
        CoinbaseInput {
            height: Some(height),
            input: TransactionInput::new(Hash::zero(), COINBASE_OUTPOINT_INDEX, Script::from_bytes(script), sequence),
        }
    }

    /// Recognises a coinbase input, reading the height from a leading
    /// BIP34 push when there is one.
    pub fn from_input(input: TransactionInput) -> Result<Self> {
        if !input.is_coinbase() {
            return Err(BitcoinError::Deserialization("input does not spend the null outpoint".to_string()));
        }
        let height = leading_height(input.script.as_bytes());
        Ok(CoinbaseInput { height, input })
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn script(&self) -> &[u8] {
        self.input.script.as_bytes()
    }

    pub fn sequence_num(&self) -> u32 {
        self.input.sequence_num
    }

    pub fn input(&self) -> &TransactionInput {
        &self.input
    }

    pub fn into_input(self) -> TransactionInput {
        self.input
    }
}

fn leading_height(script: &[u8]) -> Option<u32> {
    let (&first, rest) = script.split_first()?;
    let value = match first {
        0x00 => 0,
        0x51..=0x60 => (first - 0x50) as i64,
        0x01..=0x05 => parse_script_num(rest.get(..first as usize)?, 5).ok()?,
        _ => return None,
    };
    u32::try_from(value).ok()
}

impl From<CoinbaseInput> for TransactionInput {
    fn from(coinbase: CoinbaseInput) -> Self {
        coinbase.input
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Satoshis
    pub value: u64,
    pub script: Script,
}

impl TransactionOutput {
    pub fn new(value: u64, script: Script) -> Self {
        TransactionOutput { value, script }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let mut reader = ByteReader::new(bytes);
        let output = TransactionOutput::read(&mut reader)?;
        Ok((output, reader.remaining()))
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let value = reader.read_u64_le()?;
        let script = Script::from_bytes(reader.read_var_bytes()?.to_vec());
        Ok(TransactionOutput { value, script })
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&pack_var_str(self.script.as_bytes()));
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    pub fn get_addresses(&self, network: Network) -> Vec<String> {
        self.script.get_addresses(network)
    }

    fn to_json(&self) -> Value {
        json!({
            "value": self.value,
            "script": self.script.to_hex(),
            "script_text": self.script.to_string(),
        })
    }
}

/// An output available for spending, as reported by a data provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentTransactionOutput {
    pub transaction_hash: Hash,
    pub outpoint_index: u32,
    pub value: u64,
    pub script: Script,
    pub num_confirmations: u32,
}

impl UnspentTransactionOutput {
    pub fn new(transaction_hash: Hash, outpoint_index: u32, value: u64, script: Script, num_confirmations: u32) -> Self {
        UnspentTransactionOutput { transaction_hash, outpoint_index, value, script, num_confirmations }
    }

    pub fn confirmed(&self) -> bool {
        self.num_confirmations >= CONFIRMED_THRESHOLD
    }
}

/// Addresses found in each input and output script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAddresses {
    pub inputs: Vec<Vec<String>>,
    pub outputs: Vec<Vec<String>>,
}

/// How a private key relates to the script being signed.
enum KeyMatch {
    P2pkh { compressed: bool },
    Multisig { key_index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(version: u32, inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>, lock_time: u32) -> Self {
        Transaction { version, inputs, outputs, lock_time }
    }

    /// Parses a transaction, returning it with the unread bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.read_u32_le()?;
        let num_inputs = reader.read_compact_int()?;
        let inputs = (0..num_inputs)
            .map(|_| TransactionInput::read(&mut reader))
            .collect::<Result<Vec<_>>>()?;
        let num_outputs = reader.read_compact_int()?;
        let outputs = (0..num_outputs)
            .map(|_| TransactionOutput::read(&mut reader))
            .collect::<Result<Vec<_>>>()?;
        let lock_time = reader.read_u32_le()?;
        Ok((Transaction { version, inputs, outputs, lock_time }, reader.remaining()))
    }

    /// Parses a hex transaction; trailing bytes are an error.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let (txn, rest) = Transaction::from_bytes(&bytes)?;
        if !rest.is_empty() {
            return Err(BitcoinError::Deserialization(format!(
                "{} trailing bytes after transaction",
                rest.len()
            )));
        }
        Ok(txn)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&pack_compact_int(self.inputs.len() as u64));
        for input in &self.inputs {
            input.write_to(&mut out);
        }
        out.extend_from_slice(&pack_compact_int(self.outputs.len() as u64));
        for output in &self.outputs {
            output.write_to(&mut out);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Double SHA-256 of the serialization.
    pub fn hash(&self) -> Hash {
        Hash::dhash(&self.to_bytes())
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    fn check_input_index(&self, input_index: usize) -> Result<()> {
        if input_index >= self.inputs.len() {
            return Err(BitcoinError::Domain(format!(
                "input index {input_index} out of range for {} inputs",
                self.inputs.len()
            )));
        }
        Ok(())
    }

    /// The copy of this transaction that a `hash_type` signature commits to.
    ///
    /// - ANYONECANPAY keeps only the input being signed.
    /// - Otherwise every other input gets an empty script, and for NONE and
    ///   SINGLE a zero sequence number.
    /// - NONE drops every output. SINGLE keeps outputs up to `input_index`,
    ///   blanking all but the last.
    ///
    /// The signed input's script is replaced by `sub_script`.
    pub fn copy_for_sig(&self, input_index: usize, hash_type: u32, sub_script: &Script) -> Result<Transaction> {
        self.check_input_index(input_index)?;
        let base_type = hash_type & SIGHASH_BASE_MASK;
        let mut copy = self.clone();

        if hash_type & SIGHASH_ANYONECANPAY != 0 {
            let mut input = copy.inputs.swap_remove(input_index);
            input.script = sub_script.clone();
            copy.inputs = vec![input];
        } else {
            for (i, input) in copy.inputs.iter_mut().enumerate() {
                if i == input_index {
                    input.script = sub_script.clone();
                } else {
                    input.script = Script::new();
                    if base_type == SIGHASH_NONE || base_type == SIGHASH_SINGLE {
                        input.sequence_num = 0;
                    }
                }
            }
        }

        if base_type == SIGHASH_NONE {
            copy.outputs.clear();
        } else if base_type == SIGHASH_SINGLE {
            copy.outputs.truncate(input_index + 1);
            let kept = copy.outputs.len();
            for output in copy.outputs.iter_mut().take(kept.saturating_sub(1)) {
                output.value = u64::MAX;
                output.script = Script::new();
            }
        }
        Ok(copy)
    }

    /// SignatureHash: 𝒯𝒳 × ℕ × ℕ × 𝒮 → ℍ
    ///
    /// `dhash(copy_for_sig(i, t, s') || t as u32 LE)`, where `s'` is
    /// `sub_script` without OP_CODESEPARATOR. SIGHASH_SINGLE for an input
    /// with no matching output signs the constant 1 instead.
    pub fn signature_digest(&self, input_index: usize, hash_type: u32, sub_script: &Script) -> Result<[u8; 32]> {
        self.check_input_index(input_index)?;
        if hash_type & SIGHASH_BASE_MASK == SIGHASH_SINGLE && input_index >= self.outputs.len() {
            let mut one = [0u8; 32];
            one[0] = 1;
            return Ok(one);
        }
        let sub_script = sub_script.remove_op(Opcode::OP_CODESEPARATOR)?;
        let mut preimage = self.copy_for_sig(input_index, hash_type, &sub_script)?.to_bytes();
        preimage.extend_from_slice(&hash_type.to_le_bytes());
        Ok(dhash(&preimage))
    }

    /// Signs input `input_index` without modifying it. Returns the
    /// signature and the digest that was signed.
    pub fn get_signature_for_input(
        &self,
        input_index: usize,
        hash_type: u32,
        private_key: &PrivateKey,
        sub_script: &Script,
    ) -> Result<(Signature, [u8; 32])> {
        let digest = self.signature_digest(input_index, hash_type, sub_script)?;
        let signature = private_key.sign(&digest, false)?;
        Ok((signature, digest))
    }

    fn match_public_key(private_key: &PrivateKey, sub_script: &Script) -> Result<KeyMatch> {
        let public_key = private_key.public_key();
        if let Ok(info) = sub_script.extract_multisig_redeem_info() {
            let full = public_key.to_vec(false);
            let compressed = public_key.to_vec(true);
            return info
                .public_keys
                .iter()
                .position(|k| *k == full || *k == compressed)
                .map(|key_index| KeyMatch::Multisig { key_index })
                .ok_or_else(|| signing_error("public key does not match any key in the redeem script"));
        }
        let expected = sub_script
            .get_hash160()
            .ok_or_else(|| signing_error("no public key hash found in sub_script"))?;
        [true, false]
            .into_iter()
            .find(|&compressed| public_key.hash160(compressed) == expected)
            .map(|compressed| KeyMatch::P2pkh { compressed })
            .ok_or_else(|| signing_error("address derived from private key does not match sub_script"))
    }

    /// Signs input `input_index` and writes its new scriptSig.
    ///
    /// `sub_script` is the scriptPubKey being spent for P2PKH, or the redeem
    /// script for P2SH multisig. For multisig the new signature is merged
    /// into any signatures already present, in public key order.
    pub fn sign_input(
        &mut self,
        input_index: usize,
        hash_type: u32,
        private_key: &PrivateKey,
        sub_script: &Script,
    ) -> Result<()> {
        self.check_input_index(input_index)?;
        let hash_type_byte =
            u8::try_from(hash_type).map_err(|_| signing_error(format!("hash type {hash_type:#x} does not fit a byte")))?;
        if !sub_script.is_multisig_redeem() && !sub_script.is_p2pkh() {
            return Err(signing_error("only P2PKH scripts and multisig redeem scripts can be signed"));
        }
        let sub_script = sub_script.remove_op(Opcode::OP_CODESEPARATOR)?;
        let key_match = Transaction::match_public_key(private_key, &sub_script)?;
        let (signature, digest) = self.get_signature_for_input(input_index, hash_type, private_key, &sub_script)?;
        let mut sig_bytes = signature.to_der();
        sig_bytes.push(hash_type_byte);

        let script_sig = match key_match {
            KeyMatch::P2pkh { compressed } => {
                let public_key = private_key.public_key().to_vec(compressed);
                Script::from_tokens(vec![Token::push(sig_bytes)?, Token::push(public_key)?])?
            }
            KeyMatch::Multisig { key_index } => self.merge_multisig_signature(
                &self.inputs[input_index].script,
                key_index,
                signature,
                &digest,
                &sub_script,
                hash_type_byte,
            )?,
        };
        self.inputs[input_index].script = script_sig;
        Ok(())
    }

    /// Builds the multisig scriptSig holding the existing signatures of
    /// `current` plus `signature` for key `key_index`.
    fn merge_multisig_signature(
        &self,
        current: &Script,
        key_index: usize,
        signature: Signature,
        digest: &[u8; 32],
        redeem_script: &Script,
        hash_type: u8,
    ) -> Result<Script> {
        let with_hash_type = |sig: &Signature| {
            let mut bytes = sig.to_der();
            bytes.push(hash_type);
            bytes
        };
        if current.is_empty() {
            return Script::build_multisig_sig(&[with_hash_type(&signature)], redeem_script);
        }

        let redeem = redeem_script.extract_multisig_redeem_info()?;
        let existing = current.extract_multisig_sig_info()?;
        if existing.redeem_script != *redeem_script {
            return Err(signing_error("redeem script in the signature script does not match sub_script"));
        }
        if existing.signatures.len() >= redeem.m {
            return Err(signing_error(format!(
                "input already carries {} of {} required signatures",
                existing.signatures.len(),
                redeem.m
            )));
        }

        let public_keys = redeem
            .public_keys
            .iter()
            .map(|k| PublicKey::from_bytes(k, Network::default()))
            .collect::<Result<Vec<_>>>()?;

        let mut by_key: Vec<Option<Signature>> = vec![None; redeem.n];
        for raw in &existing.signatures {
            let (&existing_type, der) = raw
                .split_last()
                .ok_or_else(|| signing_error("empty signature in signature script"))?;
            if existing_type != hash_type {
                return Err(signing_error("hash type does not match that of the existing signatures"));
            }
            let sig = Signature::from_der(der)?;
            let slot = public_keys
                .iter()
                .enumerate()
                .position(|(i, key)| by_key[i].is_none() && key.verify(digest, &sig, false))
                .ok_or_else(|| signing_error("existing signature does not match any public key"))?;
            by_key[slot] = Some(sig);
        }
        debug!(existing = existing.signatures.len(), key_index, "merging multisig signature");
        if by_key[key_index].is_some() {
            return Err(signing_error("key has already signed this input"));
        }
        by_key[key_index] = Some(signature);

        let signatures: Vec<Vec<u8>> = by_key.iter().flatten().map(|sig| with_hash_type(sig)).collect();
        Script::build_multisig_sig(&signatures, redeem_script)
    }

    /// Runs scriptSig then `sub_script` (and the revealed redeem script for
    /// P2SH) and reports whether the input is validly signed.
    pub fn verify_input_signature(&self, input_index: usize, sub_script: &Script) -> bool {
        self.verify_logged(input_index, sub_script, false)
    }

    /// Like [`verify_input_signature`](Self::verify_input_signature), but a
    /// P2SH multisig input passes with at least one and at most the present
    /// number of valid signatures.
    pub fn verify_partial_multisig(&self, input_index: usize, sub_script: &Script) -> bool {
        self.verify_logged(input_index, sub_script, true)
    }

    fn verify_logged(&self, input_index: usize, sub_script: &Script, partial: bool) -> bool {
        match self.verify_input(input_index, sub_script, partial) {
            Ok(valid) => valid,
            Err(e) => {
                debug!(input_index, error = %e, "input verification failed");
                false
            }
        }
    }

    fn verify_input(&self, input_index: usize, sub_script: &Script, partial: bool) -> Result<bool> {
        self.check_input_index(input_index)?;
        let sig_script = &self.inputs[input_index].script;
        let p2sh = sub_script.is_p2sh();

        let mut si = ScriptInterpreter::with_transaction(self, input_index, sub_script.clone())?;
        si.run_script(sig_script)?;
        if p2sh {
            si.copy_stack();
        }
        si.run_script(sub_script)?;
        let mut valid = si.valid();
        if !p2sh {
            return Ok(valid);
        }

        si.restore_stack()?;
        let redeem_script = Script::from_bytes(si.pop()?.to_bytes());
        si.set_sub_script(redeem_script.clone());
        if partial && sig_script.is_multisig_sig() {
            let present = sig_script.extract_multisig_sig_info()?.signatures.len();
            si.set_partial_multisig(true);
            si.run_script(&redeem_script)?;
            valid &= si.match_count() > 0 && si.match_count() <= present;
        } else {
            si.run_script(&redeem_script)?;
            valid &= si.valid();
        }
        Ok(valid)
    }

    /// Index of the first P2PKH or P2SH output paying to `address`.
    pub fn output_index_for_address(&self, address: &str) -> Result<Option<usize>> {
        let (_, hash160) = address_to_key_hash(address)?;
        Ok(self.output_index_for_hash160(&hash160))
    }

    pub fn output_index_for_hash160(&self, hash160: &[u8; 20]) -> Option<usize> {
        self.outputs.iter().position(|output| {
            (output.script.is_p2pkh() || output.script.is_p2sh()) && output.script.get_hash160() == Some(*hash160)
        })
    }

    pub fn get_addresses(&self, network: Network) -> TransactionAddresses {
        TransactionAddresses {
            inputs: self.inputs.iter().map(|i| i.get_addresses(network)).collect(),
            outputs: self.outputs.iter().map(|o| o.get_addresses(network)).collect(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "hash": self.hash().to_hex(),
            "version": self.version,
            "lock_time": self.lock_time,
            "inputs": self.inputs.iter().map(TransactionInput::to_json).collect::<Vec<_>>(),
            "outputs": self.outputs.iter().map(TransactionOutput::to_json).collect::<Vec<_>>(),
        })
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction { version: 1, inputs: Vec::new(), outputs: Vec::new(), lock_time: 0 }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transaction: version {}, lock time {}", self.version, self.lock_time)?;
        for input in &self.inputs {
            writeln!(
                f,
                "  in  {}:{} script {} sequence 0x{:08x}",
                input.outpoint, input.outpoint_index, input.script, input.sequence_num
            )?;
        }
        for output in &self.outputs {
            writeln!(f, "  out {} script {}", output.value, output.script)?;
        }
        Ok(())
    }
}
