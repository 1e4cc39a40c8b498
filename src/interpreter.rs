//! Legacy Script interpreter
//!
//! Evaluates a script AST against an operand stack, an alt-stack and an
//! optional transaction context used by the signature opcodes.
//!
//! Two outcomes are kept apart:
//! - an `Err` means the script used an opcode incorrectly (stack underflow,
//!   an oversized numeric operand, the stack ceiling, a missing transaction)
//! - `stop()` means the script ran and failed (VERIFY, OP_RETURN, a
//!   disabled or reserved opcode, a CLTV rule)
//!
//! Bad signatures are neither: the signature opcodes push `false`.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::constants::{
    LOCKTIME_THRESHOLD, MAX_BRANCH_DEPTH, MAX_LOCKTIME_NUM_LEN, MAX_PUBKEYS_PER_MULTISIG, MAX_SCRIPT_NUM_LEN,
    MAX_STACK_SIZE, SEQUENCE_FINAL,
};
use crate::encoding::{parse_script_num, render_int};
use crate::error::{BitcoinError, Result};
use crate::hash::{dhash, hash160, ripemd160, sha1, sha256};
use crate::keys::PublicKey;
use crate::opcodes::Opcode;
use crate::script::{Node, Script};
use crate::signature::Signature;
use crate::transaction::Transaction;
use crate::types::Network;

fn interp_error(msg: impl Into<String>) -> BitcoinError {
    BitcoinError::ScriptInterpreter(msg.into())
}

/// Interpreter limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Ceiling on stack plus alt-stack items
    pub max_stack_size: usize,
    /// Deepest OP_IF/OP_NOTIF nesting the interpreter will enter
    pub max_branch_depth: usize,
    /// Largest numeric operand in bytes (CLTV always allows 5)
    pub max_num_len: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_stack_size: MAX_STACK_SIZE,
            max_branch_depth: MAX_BRANCH_DEPTH,
            max_num_len: MAX_SCRIPT_NUM_LEN,
        }
    }
}

/// A stack value. Numbers and booleans produced by opcodes stay typed
/// until something needs their byte form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackItem {
    Bytes(Vec<u8>),
    Int(i64),
    Bool(bool),
}

impl StackItem {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            StackItem::Bytes(b) => b.clone(),
            StackItem::Int(i) => render_int(*i),
            StackItem::Bool(true) => vec![1],
            StackItem::Bool(false) => Vec::new(),
        }
    }

    /// Any byte other than a trailing sign bit makes a byte string true;
    /// negative zero is false.
    pub fn to_bool(&self) -> bool {
        match self {
            StackItem::Bytes(b) => match b.split_last() {
                None => false,
                Some((&last, rest)) => rest.iter().any(|&x| x != 0) || (last & 0x7f) != 0,
            },
            StackItem::Int(i) => *i != 0,
            StackItem::Bool(b) => *b,
        }
    }

    pub fn to_int(&self, max_len: usize) -> Result<i64> {
        match self {
            StackItem::Bytes(b) => parse_script_num(b, max_len),
            StackItem::Int(i) => {
                let len = render_int(*i).len();
                if len > max_len {
                    return Err(interp_error(format!("numeric operand of {len} bytes exceeds {max_len} bytes")));
                }
                Ok(*i)
            }
            StackItem::Bool(b) => Ok(*b as i64),
        }
    }
}

impl From<Vec<u8>> for StackItem {
    fn from(bytes: Vec<u8>) -> Self {
        StackItem::Bytes(bytes)
    }
}

impl From<i64> for StackItem {
    fn from(i: i64) -> Self {
        StackItem::Int(i)
    }
}

impl From<bool> for StackItem {
    fn from(b: bool) -> Self {
        StackItem::Bool(b)
    }
}

/// Evaluates scripts against a shared stack.
///
/// Several scripts may be run in sequence on the same interpreter; they all
/// see the same stack, which is how scriptSig and scriptPubKey are chained.
#[derive(Debug, Clone)]
pub struct ScriptInterpreter<'a> {
    config: InterpreterConfig,
    stack: Vec<StackItem>,
    alt_stack: Vec<StackItem>,
    stack_copy: Option<Vec<StackItem>>,
    if_else_stack: Vec<bool>,
    stop: bool,
    txn: Option<(&'a Transaction, usize)>,
    sub_script: Option<Script>,
    partial_multisig: bool,
    match_count: usize,
}

impl Default for ScriptInterpreter<'_> {
    fn default() -> Self {
        ScriptInterpreter::new()
    }
}

impl<'a> ScriptInterpreter<'a> {
    /// An interpreter without transaction context.
    pub fn new() -> Self {
        ScriptInterpreter {
            config: InterpreterConfig::default(),
            stack: Vec::new(),
            alt_stack: Vec::new(),
            stack_copy: None,
            if_else_stack: Vec::new(),
            stop: false,
            txn: None,
            sub_script: None,
            partial_multisig: false,
            match_count: 0,
        }
    }

    /// An interpreter for spending input `input_index` of `txn`.
    ///
    /// `sub_script` replaces the signature script when hashing: the
    /// scriptPubKey for P2PKH, the redeem script for P2SH.
    pub fn with_transaction(txn: &'a Transaction, input_index: usize, sub_script: Script) -> Result<Self> {
        if input_index >= txn.inputs.len() {
            return Err(interp_error(format!(
                "input index {input_index} out of range for {} inputs",
                txn.inputs.len()
            )));
        }
        let mut interpreter = ScriptInterpreter::new();
        interpreter.txn = Some((txn, input_index));
        interpreter.sub_script = Some(sub_script);
        Ok(interpreter)
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Runs `script` unless a previous script already stopped execution.
    pub fn run_script(&mut self, script: &Script) -> Result<()> {
        if self.stop {
            return Ok(());
        }
        let ast = script.ast()?;
        self.if_else_stack.clear();
        let mut frames: Vec<std::slice::Iter<'_, Node>> = vec![ast.iter()];
        while let Some(frame) = frames.last_mut() {
            let Some(node) = frame.next() else {
                frames.pop();
                if !frames.is_empty() {
                    self.if_else_stack.pop();
                }
                continue;
            };
            self.check_stack_size()?;
            match node {
                Node::Push(push) => self.stack.push(StackItem::Bytes(push.data().to_vec())),
                Node::Op(op) => self.execute(*op)?,
                Node::Branch { op, then_branch, else_branch } => {
                    trace!(opcode = %op, depth = self.stack.len(), "branch");
                    let condition = self.pop_bool()?;
                    let taken = if *op == Opcode::OP_NOTIF { !condition } else { condition };
                    let branch = if taken { Some(then_branch) } else { else_branch.as_ref() };
                    if let Some(nodes) = branch {
                        if frames.len() > self.config.max_branch_depth {
                            return Err(interp_error("conditional nesting too deep"));
                        }
                        self.if_else_stack.push(taken);
                        frames.push(nodes.iter());
                    }
                }
            }
            if self.stop {
                break;
            }
        }
        self.if_else_stack.clear();
        Ok(())
    }

    /// Not stopped, and the top of the stack is true.
    pub fn valid(&self) -> bool {
        !self.stop && self.stack.last().is_some_and(StackItem::to_bool)
    }

    pub fn stop(&self) -> bool {
        self.stop
    }

    pub fn stack(&self) -> &[StackItem] {
        &self.stack
    }

    pub fn alt_stack(&self) -> &[StackItem] {
        &self.alt_stack
    }

    /// Snapshots the main stack for a later [`restore_stack`](Self::restore_stack).
    pub fn copy_stack(&mut self) {
        self.stack_copy = Some(self.stack.clone());
    }

    pub fn restore_stack(&mut self) -> Result<()> {
        self.stack = self
            .stack_copy
            .take()
            .ok_or_else(|| interp_error("stack must be copied before it can be restored"))?;
        Ok(())
    }

    pub fn push(&mut self, item: impl Into<StackItem>) {
        self.stack.push(item.into());
    }

    pub fn pop(&mut self) -> Result<StackItem> {
        self.stack.pop().ok_or_else(|| interp_error("stack is empty"))
    }

    pub fn set_sub_script(&mut self, sub_script: Script) {
        self.sub_script = Some(sub_script);
    }

    pub fn sub_script(&self) -> Option<&Script> {
        self.sub_script.as_ref()
    }

    /// In partial mode CHECKMULTISIG accepts fewer than m signatures and
    /// records how many matched.
    pub fn set_partial_multisig(&mut self, partial: bool) {
        self.partial_multisig = partial;
    }

    /// Signatures matched by the most recent CHECKMULTISIG.
    pub fn match_count(&self) -> usize {
        self.match_count
    }

    fn halt(&mut self, reason: &str) {
        debug!(reason, "script execution stopped");
        self.stop = true;
    }

    fn check_stack_size(&self) -> Result<()> {
        let total = self.stack.len() + self.alt_stack.len();
        if total > self.config.max_stack_size {
            return Err(interp_error(format!("too many items ({total}) on the stack")));
        }
        Ok(())
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.stack.len() < n {
            return Err(interp_error(format!("stack has fewer than {n} operands")));
        }
        Ok(())
    }

    /// Item `depth` positions below the top (0 is the top).
    fn peek(&self, depth: usize) -> Result<&StackItem> {
        self.need(depth + 1)?;
        Ok(&self.stack[self.stack.len() - 1 - depth])
    }

    fn pop_int(&mut self) -> Result<i64> {
        let max_len = self.config.max_num_len;
        self.pop()?.to_int(max_len)
    }

    fn pop_bool(&mut self) -> Result<bool> {
        Ok(self.pop()?.to_bool())
    }

    fn pop_bytes(&mut self) -> Result<Vec<u8>> {
        Ok(self.pop()?.to_bytes())
    }

    fn context(&self) -> Result<(&'a Transaction, usize, &Script)> {
        let (txn, input_index) = self.txn.ok_or_else(|| interp_error("no transaction found"))?;
        let sub_script = self.sub_script.as_ref().ok_or_else(|| interp_error("sub_script must be set"))?;
        Ok((txn, input_index, sub_script))
    }

    fn verify(&mut self, reason: &str) -> Result<()> {
        if !self.pop_bool()? {
            self.halt(reason);
        }
        Ok(())
    }

    fn unary(&mut self, f: impl FnOnce(i64) -> StackItem) -> Result<()> {
        let a = self.pop_int()?;
        self.stack.push(f(a));
        Ok(())
    }

    /// `a` is the second item, `b` the top.
    fn binary(&mut self, f: impl FnOnce(i64, i64) -> StackItem) -> Result<()> {
        self.need(2)?;
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.stack.push(f(a, b));
        Ok(())
    }

    fn digest(&mut self, f: impl FnOnce(&[u8]) -> Vec<u8>) -> Result<()> {
        let data = self.pop_bytes()?;
        self.stack.push(StackItem::Bytes(f(&data)));
        Ok(())
    }

    fn execute(&mut self, op: Opcode) -> Result<()> {
        use Opcode::*;

        trace!(opcode = %op, depth = self.stack.len(), "execute");
        match op {
            OP_0 => self.stack.push(StackItem::Bytes(Vec::new())),
            OP_1NEGATE => self.stack.push(StackItem::Int(-1)),
            OP_1 | OP_2 | OP_3 | OP_4 | OP_5 | OP_6 | OP_7 | OP_8 | OP_9 | OP_10 | OP_11 | OP_12 | OP_13
            | OP_14 | OP_15 | OP_16 => {
                let n = op.small_int().unwrap_or_default();
                self.stack.push(StackItem::Int(n as i64));
            }

            OP_NOP | OP_NOP1 | OP_NOP3 | OP_NOP4 | OP_NOP5 | OP_NOP6 | OP_NOP7 | OP_NOP8 | OP_NOP9
            | OP_NOP10 | OP_CODESEPARATOR => {}

            OP_VERIFY => self.verify("OP_VERIFY failed")?,
            OP_RETURN => self.halt("OP_RETURN"),

            OP_TOALTSTACK => {
                let item = self.pop()?;
                self.alt_stack.push(item);
            }
            OP_FROMALTSTACK => {
                let item = self.alt_stack.pop().ok_or_else(|| interp_error("alt-stack is empty"))?;
                self.stack.push(item);
            }
            OP_2DROP => {
                self.need(2)?;
                self.stack.truncate(self.stack.len() - 2);
            }
            OP_2DUP => {
                self.need(2)?;
                let len = self.stack.len();
                self.stack.extend_from_within(len - 2..);
            }
            OP_3DUP => {
                self.need(3)?;
                let len = self.stack.len();
                self.stack.extend_from_within(len - 3..);
            }
            OP_2OVER => {
                self.need(4)?;
                let len = self.stack.len();
                self.stack.extend_from_within(len - 4..len - 2);
            }
            OP_2ROT => {
                self.need(6)?;
                let len = self.stack.len();
                let moved: Vec<StackItem> = self.stack.drain(len - 6..len - 4).collect();
                self.stack.extend(moved);
            }
            OP_2SWAP => {
                self.need(4)?;
                let len = self.stack.len();
                self.stack.swap(len - 4, len - 2);
                self.stack.swap(len - 3, len - 1);
            }
            OP_IFDUP => {
                let top = self.peek(0)?.clone();
                if top.to_bool() {
                    self.stack.push(top);
                }
            }
            OP_DEPTH => self.stack.push(StackItem::Int(self.stack.len() as i64)),
            OP_DROP => {
                self.pop()?;
            }
            OP_DUP => {
                let top = self.peek(0)?.clone();
                self.stack.push(top);
            }
            OP_NIP => {
                self.need(2)?;
                let len = self.stack.len();
                self.stack.remove(len - 2);
            }
            OP_OVER => {
                let item = self.peek(1)?.clone();
                self.stack.push(item);
            }
            OP_PICK | OP_ROLL => {
                self.need(2)?;
                let n = self.pop_int()?;
                let n = usize::try_from(n)
                    .ok()
                    .filter(|&n| n < self.stack.len())
                    .ok_or_else(|| interp_error(format!("{op} index {n} out of range")))?;
                let pos = self.stack.len() - 1 - n;
                let item = if op == OP_PICK { self.stack[pos].clone() } else { self.stack.remove(pos) };
                self.stack.push(item);
            }
            OP_ROT => {
                self.need(3)?;
                let len = self.stack.len();
                let item = self.stack.remove(len - 3);
                self.stack.push(item);
            }
            OP_SWAP => {
                self.need(2)?;
                let len = self.stack.len();
                self.stack.swap(len - 2, len - 1);
            }
            OP_TUCK => {
                self.need(2)?;
                let len = self.stack.len();
                let top = self.stack[len - 1].clone();
                self.stack.insert(len - 2, top);
            }

            OP_SIZE => {
                let size = self.peek(0)?.to_bytes().len();
                self.stack.push(StackItem::Int(size as i64));
            }

            OP_EQUAL | OP_EQUALVERIFY => {
                self.need(2)?;
                let b = self.pop_bytes()?;
                let a = self.pop_bytes()?;
                self.stack.push(StackItem::Bool(a == b));
                if op == OP_EQUALVERIFY {
                    self.verify("OP_EQUALVERIFY failed")?;
                }
            }

            OP_1ADD => self.unary(|a| StackItem::Int(a + 1))?,
            OP_1SUB => self.unary(|a| StackItem::Int(a - 1))?,
            OP_NEGATE => self.unary(|a| StackItem::Int(-a))?,
            OP_ABS => self.unary(|a| StackItem::Int(a.abs()))?,
            OP_NOT => self.unary(|a| StackItem::Bool(a == 0))?,
            OP_0NOTEQUAL => self.unary(|a| StackItem::Bool(a != 0))?,

            OP_ADD => self.binary(|a, b| StackItem::Int(a + b))?,
            OP_SUB => self.binary(|a, b| StackItem::Int(a - b))?,
            OP_BOOLAND => self.binary(|a, b| StackItem::Bool(a != 0 && b != 0))?,
            OP_BOOLOR => self.binary(|a, b| StackItem::Bool(a != 0 || b != 0))?,
            OP_NUMEQUAL => self.binary(|a, b| StackItem::Bool(a == b))?,
            OP_NUMEQUALVERIFY => {
                self.binary(|a, b| StackItem::Bool(a == b))?;
                self.verify("OP_NUMEQUALVERIFY failed")?;
            }
            OP_NUMNOTEQUAL => self.binary(|a, b| StackItem::Bool(a != b))?,
            OP_LESSTHAN => self.binary(|a, b| StackItem::Bool(a < b))?,
            OP_GREATERTHAN => self.binary(|a, b| StackItem::Bool(a > b))?,
            OP_LESSTHANOREQUAL => self.binary(|a, b| StackItem::Bool(a <= b))?,
            OP_GREATERTHANOREQUAL => self.binary(|a, b| StackItem::Bool(a >= b))?,
            OP_MIN => self.binary(|a, b| StackItem::Int(a.min(b)))?,
            OP_MAX => self.binary(|a, b| StackItem::Int(a.max(b)))?,
            OP_WITHIN => {
                self.need(3)?;
                let max = self.pop_int()?;
                let min = self.pop_int()?;
                let x = self.pop_int()?;
                self.stack.push(StackItem::Bool(min <= x && x < max));
            }

            OP_RIPEMD160 => self.digest(|d| ripemd160(d).to_vec())?,
            OP_SHA1 => self.digest(|d| sha1(d).to_vec())?,
            OP_SHA256 => self.digest(|d| sha256(d).to_vec())?,
            OP_HASH160 => self.digest(|d| hash160(d).to_vec())?,
            OP_HASH256 => self.digest(|d| dhash(d).to_vec())?,

            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                self.op_checksig()?;
                if op == OP_CHECKSIGVERIFY {
                    self.verify("OP_CHECKSIGVERIFY failed")?;
                }
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                self.op_checkmultisig()?;
                if op == OP_CHECKMULTISIGVERIFY {
                    self.verify("OP_CHECKMULTISIGVERIFY failed")?;
                }
            }
            OP_CHECKLOCKTIMEVERIFY => self.op_checklocktimeverify()?,

            // Consumed by the parser; never executed directly.
            OP_IF | OP_NOTIF | OP_ELSE | OP_ENDIF | OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4 => {
                return Err(interp_error(format!("unexpected {op} in parsed script")));
            }

            _ if op.is_disabled() => self.halt("disabled opcode"),
            _ => {
                debug_assert!(op.is_reserved(), "{op} has no handler");
                self.halt("reserved opcode")
            }
        }
        Ok(())
    }

    /// Checks one `sig || hash_type` push against one public key.
    fn check_signature(&self, sig: &[u8], public_key: &[u8], sub_script: &Script) -> Result<bool> {
        let (txn, input_index, _) = self.context()?;
        let Some((&hash_type, der)) = sig.split_last() else {
            return Ok(false);
        };
        let (Ok(signature), Ok(key)) = (Signature::from_der(der), PublicKey::from_bytes(public_key, Network::default()))
        else {
            return Ok(false);
        };
        let digest = txn.signature_digest(input_index, hash_type as u32, sub_script)?;
        Ok(key.verify(&digest, &signature, false))
    }

    fn op_checksig(&mut self) -> Result<()> {
        self.need(2)?;
        self.context()?;
        let public_key = self.pop_bytes()?;
        let sig = self.pop_bytes()?;
        let sub_script = self.context()?.2.remove_push(&sig)?;
        let verified = self.check_signature(&sig, &public_key, &sub_script)?;
        self.stack.push(StackItem::Bool(verified));
        Ok(())
    }

    /// Signatures must match keys in order: once a signature matches key i,
    /// later signatures only try keys after i. One extra item below the
    /// signatures is consumed and must be empty.
    fn op_checkmultisig(&mut self) -> Result<()> {
        self.context()?;

        let n = self.pop_int()?;
        if !(0..=MAX_PUBKEYS_PER_MULTISIG).contains(&n) {
            return Err(interp_error(format!("public key count {n} out of range")));
        }
        let n = n as usize;
        self.need(n)?;
        let keys: Vec<Vec<u8>> = self.stack.split_off(self.stack.len() - n).iter().map(StackItem::to_bytes).collect();

        let m = self.pop_int()?;
        if m < 0 || m as usize > n {
            return Err(interp_error(format!("signature count {m} out of range for {n} keys")));
        }
        let m = m as usize;

        let mut sigs = Vec::with_capacity(m);
        if self.partial_multisig {
            while sigs.len() < m && self.stack.last().is_some_and(|item| !item.to_bytes().is_empty()) {
                sigs.push(self.pop_bytes()?);
            }
        } else {
            self.need(m)?;
            for _ in 0..m {
                sigs.push(self.pop_bytes()?);
            }
        }
        sigs.reverse();

        let dummy = self.pop().map_err(|_| interp_error("missing extra CHECKMULTISIG element"))?;
        let dummy_ok = dummy.to_bytes().is_empty();

        let mut sub_script = self.context()?.2.clone();
        for sig in &sigs {
            sub_script = sub_script.remove_push(sig)?;
        }

        let (mut isig, mut ikey) = (0, 0);
        while isig < sigs.len() && sigs.len() - isig <= keys.len() - ikey {
            if self.check_signature(&sigs[isig], &keys[ikey], &sub_script)? {
                isig += 1;
            }
            ikey += 1;
        }
        self.match_count = isig;

        let success = dummy_ok && isig == sigs.len() && sigs.len() == m;
        if !dummy_ok {
            debug!("CHECKMULTISIG extra element is not empty");
        }
        debug!(matched = isig, required = m, keys = n, partial = self.partial_multisig, "CHECKMULTISIG");
        self.stack.push(StackItem::Bool(success));
        Ok(())
    }

    /// BIP65. Leaves the operand on the stack.
    fn op_checklocktimeverify(&mut self) -> Result<()> {
        let (txn, input_index, _) = self.context()?;
        let lock_time = self.peek(0)?.to_int(MAX_LOCKTIME_NUM_LEN)?;
        let tx_lock_time = txn.lock_time as i64;
        let threshold = LOCKTIME_THRESHOLD as i64;

        if lock_time < 0 {
            self.halt("CLTV: negative lock time");
        } else if (lock_time < threshold) != (tx_lock_time < threshold) {
            self.halt("CLTV: lock time type mismatch");
        } else if lock_time > tx_lock_time {
            self.halt("CLTV: lock time not reached");
        } else if txn.inputs[input_index].sequence_num == SEQUENCE_FINAL {
            self.halt("CLTV: input is final");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Token;

    fn run(text: &str) -> ScriptInterpreter<'static> {
        let mut si = ScriptInterpreter::new();
        si.run_script(&Script::parse(text).unwrap()).unwrap();
        si
    }

    fn ints(si: &ScriptInterpreter<'_>) -> Vec<i64> {
        si.stack().iter().map(|item| item.to_int(8).unwrap()).collect()
    }

    #[test]
    fn test_if_executes_taken_branch() {
        let si = run("OP_1 OP_IF OP_2 OP_3 OP_ENDIF OP_4");
        assert_eq!(ints(&si), vec![2, 3, 4]);
        let si = run("OP_0 OP_IF OP_2 OP_ELSE OP_3 OP_ENDIF");
        assert_eq!(ints(&si), vec![3]);
        let si = run("OP_0 OP_NOTIF OP_7 OP_ENDIF");
        assert_eq!(ints(&si), vec![7]);
    }

    #[test]
    fn test_nested_conditionals() {
        let si = run("OP_1 OP_IF OP_0 OP_IF OP_5 OP_ELSE OP_1 OP_IF OP_6 OP_ENDIF OP_ENDIF OP_ENDIF");
        assert_eq!(ints(&si), vec![6]);
    }

    #[test]
    fn test_verify_and_return() {
        let si = run("OP_1 OP_0 OP_VERIFY OP_5");
        assert!(si.stop());
        assert_eq!(ints(&si), vec![1]);
        let si = run("OP_1 OP_RETURN OP_5");
        assert!(si.stop());
        assert_eq!(ints(&si), vec![1]);
        assert!(!si.valid());
    }

    #[test]
    fn test_disabled_opcode_stops() {
        let si = run("OP_1 OP_2 OP_CAT OP_3");
        assert!(si.stop());
        assert_eq!(ints(&si), vec![1, 2]);
    }

    #[test]
    fn test_every_disabled_and_reserved_opcode_stops() {
        for &op in Opcode::ALL.iter().filter(|op| op.is_disabled() || op.is_reserved()) {
            let script = Script::from_tokens(vec![Token::Op(Opcode::OP_1), Token::Op(op), Token::Op(Opcode::OP_2)]).unwrap();
            let mut si = ScriptInterpreter::new();
            si.run_script(&script).unwrap();
            assert!(si.stop(), "{op}");
            assert_eq!(ints(&si), vec![1], "{op}");
        }
    }

    #[test]
    fn test_negative_zero_is_false() {
        assert!(!StackItem::Bytes(vec![0x80]).to_bool());
        assert!(!StackItem::Bytes(vec![0x00, 0x00]).to_bool());
        assert!(StackItem::Bytes(vec![0x00, 0x80, 0x01]).to_bool());
        assert!(StackItem::Bytes(vec![0x81]).to_bool());
    }

    #[test]
    fn test_underflow_is_error() {
        let mut si = ScriptInterpreter::new();
        let err = si.run_script(&Script::parse("OP_DUP").unwrap()).unwrap_err();
        assert!(matches!(err, BitcoinError::ScriptInterpreter(_)));
    }

    #[test]
    fn test_stack_ceiling() {
        let mut si = ScriptInterpreter::new().with_config(InterpreterConfig { max_stack_size: 3, ..Default::default() });
        assert!(si.run_script(&Script::parse("OP_1 OP_2 OP_3 OP_4 OP_5").unwrap()).is_err());
    }

    #[test]
    fn test_checksig_requires_transaction() {
        let mut si = ScriptInterpreter::new();
        assert!(si.run_script(&Script::parse("0x01 0x02 OP_CHECKSIG").unwrap()).is_err());
    }

    #[test]
    fn test_oversized_operand_rejected() {
        let mut si = ScriptInterpreter::new();
        assert!(si.run_script(&Script::parse("0x0102030405 OP_1ADD").unwrap()).is_err());
    }

    #[test]
    fn test_copy_and_restore_stack() {
        let mut si = ScriptInterpreter::new();
        assert!(si.restore_stack().is_err());
        si.push(1i64);
        si.copy_stack();
        si.push(2i64);
        si.restore_stack().unwrap();
        assert_eq!(si.stack(), &[StackItem::Int(1)]);
    }
}
