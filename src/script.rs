//! Bitcoin Script: command representation, wire codec and the stack
//! interpreter for the p2pkh and native-segwit p2wpkh programs.

use crate::ecdsa::{PublicKey, Signature};
use crate::encoding::{decode_varint, encode_varint, read_array, read_bytes, read_u16_le};
use crate::error::{Error, Result};
use crate::hashing::{hash160, hash256};
use crate::types::{reverse, Hash160, Hash256};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::io::Read;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CHECKSIG: u8 = 0xac;

/// Data pushes above this length have no standard push opcode.
pub const MAX_PUSH_LEN: usize = 520;

fn opcode_name(op: u8) -> Option<&'static str> {
    Some(match op {
        OP_0 => "OP_0",
        OP_PUSHDATA1 => "OP_PUSHDATA1",
        OP_PUSHDATA2 => "OP_PUSHDATA2",
        OP_NOP => "OP_NOP",
        OP_VERIFY => "OP_VERIFY",
        OP_RETURN => "OP_RETURN",
        OP_DUP => "OP_DUP",
        OP_EQUAL => "OP_EQUAL",
        OP_EQUALVERIFY => "OP_EQUALVERIFY",
        OP_HASH160 => "OP_HASH160",
        OP_HASH256 => "OP_HASH256",
        OP_CHECKSIG => "OP_CHECKSIG",
        _ => return None,
    })
}

/// A script command: an opcode byte or a pushed data element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Opcode(u8),
    Data(Vec<u8>),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Opcode(op) => match opcode_name(*op) {
                Some(name) => write!(f, "{name}"),
                None => write!(f, "OP_{op:#04x}"),
            },
            Command::Data(data) => write!(f, "{}", hex::encode(data)),
        }
    }
}

/// An ordered sequence of commands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Script(pub Vec<Command>);

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", rendered.join(" "))
    }
}

/// Encodes an integer in the script stack format: little-endian
/// sign-magnitude, zero as the empty string, minimal length.
pub fn encode_num(num: i64) -> Vec<u8> {
    if num == 0 {
        return Vec::new();
    }
    let mut abs = num.unsigned_abs();
    let negative = num < 0;
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    // the top byte's high bit is the sign; grow a byte if the magnitude
    // already uses it
    if out.last().is_some_and(|b| b & 0x80 != 0) {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        *out.last_mut().expect("non-zero magnitude") |= 0x80;
    }
    out
}

/// Inverse of [`encode_num`].
///
/// Inputs longer than 8 bytes (hashes, keys left on the stack) wrap; the
/// evaluator only cares whether the result is zero.
pub fn decode_num(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let big_endian = reverse(bytes);
    let negative = big_endian[0] & 0x80 != 0;
    let mut num = i64::from(big_endian[0] & if negative { 0x7f } else { 0xff });
    for &byte in &big_endian[1..] {
        num = num.wrapping_shl(8).wrapping_add(i64::from(byte));
    }
    if negative {
        num.wrapping_neg()
    } else {
        num
    }
}

impl Script {
    pub fn new(commands: Vec<Command>) -> Self {
        Self(commands)
    }

    /// The canonical pay-to-pubkey-hash locking script.
    pub fn p2pkh(h160: &Hash160) -> Self {
        Self(vec![
            Command::Opcode(OP_DUP),
            Command::Opcode(OP_HASH160),
            Command::Data(h160.to_vec()),
            Command::Opcode(OP_EQUALVERIFY),
            Command::Opcode(OP_CHECKSIG),
        ])
    }

    /// Whether this is `OP_DUP OP_HASH160 <20B> OP_EQUALVERIFY OP_CHECKSIG`.
    pub fn is_p2pkh(&self) -> bool {
        matches!(
            self.0.as_slice(),
            [
                Command::Opcode(OP_DUP),
                Command::Opcode(OP_HASH160),
                Command::Data(h160),
                Command::Opcode(OP_EQUALVERIFY),
                Command::Opcode(OP_CHECKSIG),
            ] if h160.len() == 20
        )
    }

    /// Whether this is the native witness v0 program `OP_0 <20B>`.
    pub fn is_p2wpkh(&self) -> bool {
        matches!(
            self.0.as_slice(),
            [Command::Opcode(OP_0), Command::Data(h160)] if h160.len() == 20
        )
    }

    /// The bytes of the data element at `index`, if there is one.
    pub fn data(&self, index: usize) -> Option<&[u8]> {
        match self.0.get(index) {
            Some(Command::Data(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Appends the other script's commands, as done when gluing a
    /// scriptSig to its scriptPubKey.
    pub fn concat(mut self, other: &Script) -> Script {
        self.0.extend(other.0.iter().cloned());
        self
    }

    /// Serializes the command list: VarInt body length, then for each
    /// command either the opcode byte or a length-prefixed data push
    /// (direct for 1..=75 bytes, PUSHDATA1/PUSHDATA2 beyond).
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        for command in &self.0 {
            match command {
                Command::Opcode(op) => body.push(*op),
                Command::Data(data) => {
                    let length = data.len();
                    if length <= 75 {
                        body.push(length as u8);
                    } else if length <= 0xff {
                        body.push(OP_PUSHDATA1);
                        body.push(length as u8);
                    } else if length <= MAX_PUSH_LEN {
                        body.push(OP_PUSHDATA2);
                        body.extend_from_slice(&(length as u16).to_le_bytes());
                    } else {
                        return Err(Error::PushTooLong);
                    }
                    body.extend_from_slice(data);
                }
            }
        }
        let mut out = encode_varint(body.len() as u64);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parses a VarInt-framed script body.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let length = decode_varint(r)? as usize;
        let mut commands = Vec::new();
        let mut count = 0usize;
        while count < length {
            let [current] = read_array::<1, _>(r)?;
            count += 1;
            match current {
                1..=75 => {
                    commands.push(Command::Data(read_bytes(r, current as usize)?));
                    count += current as usize;
                }
                OP_PUSHDATA1 => {
                    let [data_len] = read_array::<1, _>(r)?;
                    count += 1;
                    commands.push(Command::Data(read_bytes(r, data_len as usize)?));
                    count += data_len as usize;
                }
                OP_PUSHDATA2 => {
                    let data_len = read_u16_le(r)? as usize;
                    count += 2;
                    commands.push(Command::Data(read_bytes(r, data_len)?));
                    count += data_len;
                }
                op => commands.push(Command::Opcode(op)),
            }
        }
        Ok(Self(commands))
    }

    /// Evaluates the script against a signature hash and (for segwit
    /// inputs) the witness stack.
    ///
    /// Succeeds iff, after all commands ran, the stack top decodes to a
    /// non-zero number. A failing operation yields `Ok(false)`; an opcode
    /// without an evaluator is an error.
    pub fn eval(&self, sighash: &Hash256, witness: &[Vec<u8>]) -> Result<bool> {
        let mut commands: VecDeque<Command> = self.0.iter().cloned().collect();
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut alt_stack: Vec<Vec<u8>> = Vec::new();

        while let Some(command) = commands.pop_front() {
            match command {
                Command::Opcode(op) => {
                    if !execute_opcode(op, &mut stack, &mut alt_stack, sighash)? {
                        return Ok(false);
                    }
                }
                Command::Data(data) => {
                    stack.push(data);
                    // Witness program version 0: an empty push under a
                    // 20-byte push is p2wpkh. Replace the two items with
                    // the witness elements and the equivalent p2pkh
                    // script.
                    if stack.len() == 2 && stack[0].is_empty() && stack[1].len() == 20 {
                        let mut h160 = [0u8; 20];
                        h160.copy_from_slice(&stack.pop().unwrap());
                        stack.pop();
                        for element in witness {
                            commands.push_back(Command::Data(element.clone()));
                        }
                        commands.extend(Script::p2pkh(&h160).0);
                    }
                }
            }
        }

        match stack.pop() {
            Some(top) => Ok(decode_num(&top) != 0),
            None => Ok(false),
        }
    }
}

fn execute_opcode(
    op: u8,
    stack: &mut Vec<Vec<u8>>,
    alt_stack: &mut Vec<Vec<u8>>,
    sighash: &Hash256,
) -> Result<bool> {
    match op {
        OP_0 => {
            stack.push(encode_num(0));
            Ok(true)
        }
        OP_DUP => {
            if let Some(top) = stack.last().cloned() {
                stack.push(top);
                Ok(true)
            } else {
                Ok(false)
            }
        }
        OP_HASH160 => match stack.pop() {
            Some(top) => {
                stack.push(hash160(&top).to_vec());
                Ok(true)
            }
            None => Ok(false),
        },
        OP_HASH256 => match stack.pop() {
            Some(top) => {
                stack.push(hash256(&top).to_vec());
                Ok(true)
            }
            None => Ok(false),
        },
        OP_EQUAL => {
            if stack.len() < 2 {
                return Ok(false);
            }
            let a = stack.pop().unwrap();
            let b = stack.pop().unwrap();
            stack.push(encode_num(if a == b { 1 } else { 0 }));
            Ok(true)
        }
        OP_VERIFY => match stack.pop() {
            Some(top) => Ok(decode_num(&top) != 0),
            None => Ok(false),
        },
        OP_EQUALVERIFY => {
            Ok(execute_opcode(OP_EQUAL, stack, alt_stack, sighash)?
                && execute_opcode(OP_VERIFY, stack, alt_stack, sighash)?)
        }
        OP_CHECKSIG => {
            if stack.len() < 2 {
                return Ok(false);
            }
            let sec = stack.pop().unwrap();
            let mut der = stack.pop().unwrap();
            if der.is_empty() {
                return Ok(false);
            }
            der.pop(); // the trailing byte is the sighash type
            let valid = match (PublicKey::from_sec(&sec), Signature::from_der(&der)) {
                (Ok(public_key), Ok(signature)) => public_key.verify(sighash, &signature),
                _ => false,
            };
            stack.push(encode_num(if valid { 1 } else { 0 }));
            Ok(true)
        }
        other => Err(Error::UnknownOpcode(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdsa::PrivateKey;
    use std::io::Cursor;

    #[test]
    fn test_encode_num_cases() {
        assert_eq!(encode_num(0), Vec::<u8>::new());
        assert_eq!(encode_num(1), vec![0x01]);
        assert_eq!(encode_num(-1), vec![0x81]);
        assert_eq!(encode_num(128), vec![0x80, 0x00]);
        assert_eq!(encode_num(-128), vec![0x80, 0x80]);
        assert_eq!(encode_num(256), vec![0x00, 0x01]);
    }

    #[test]
    fn test_decode_num_round_trip() {
        for n in [0i64, 1, -1, 127, -127, 128, -128, 255, 256, 0x7fff_ffff, -0x8000_0000] {
            assert_eq!(decode_num(&encode_num(n)), n);
        }
    }

    #[test]
    fn test_serialize_vector() {
        // OP_1 OP_2 OP_2DUP OP_EQUAL OP_NOT OP_VERIFY OP_SHA1 OP_SWAP OP_SHA1 OP_EQUAL
        let script = Script(vec![
            Command::Opcode(0x51),
            Command::Opcode(0x52),
            Command::Opcode(0x6e),
            Command::Opcode(0x87),
            Command::Opcode(0x91),
            Command::Opcode(0x69),
            Command::Opcode(0xa7),
            Command::Opcode(0x7c),
            Command::Opcode(0xa7),
            Command::Opcode(0x87),
        ]);
        assert_eq!(
            script.serialize().unwrap(),
            vec![10, 81, 82, 110, 135, 145, 105, 167, 124, 167, 135]
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let script = Script(vec![
            Command::Opcode(OP_DUP),
            Command::Data(vec![0xab; 20]),
            Command::Data(vec![0xcd; 76]),
            Command::Data(vec![0xef; 300]),
            Command::Opcode(OP_CHECKSIG),
        ]);
        let bytes = script.serialize().unwrap();
        let parsed = Script::parse(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(parsed, script);
    }

    #[test]
    fn test_serialize_rejects_oversized_push() {
        let script = Script(vec![Command::Data(vec![0u8; 521])]);
        assert!(matches!(script.serialize(), Err(Error::PushTooLong)));
    }

    #[test]
    fn test_recognizers() {
        let p2pkh = Script::p2pkh(&[0u8; 20]);
        assert!(p2pkh.is_p2pkh());
        assert!(!p2pkh.is_p2wpkh());

        let p2wpkh = Script(vec![Command::Opcode(OP_0), Command::Data(vec![0u8; 20])]);
        assert!(p2wpkh.is_p2wpkh());
        assert!(!p2wpkh.is_p2pkh());

        assert!(!Script::default().is_p2pkh());
    }

    #[test]
    fn test_eval_p2pkh() {
        let private_key = PrivateKey::from_passphrase("script eval");
        let sighash = hash256(b"spend authorization");
        let mut sig = private_key.sign(&sighash).der();
        sig.push(0x01);
        let sec = private_key.public_key.sec_compressed().to_vec();

        let script_sig = Script(vec![Command::Data(sig), Command::Data(sec.clone())]);
        let script_pubkey = Script::p2pkh(&hash160(&sec));
        let combined = script_sig.concat(&script_pubkey);
        assert!(combined.eval(&sighash, &[]).unwrap());
    }

    #[test]
    fn test_eval_p2pkh_wrong_key_hash() {
        let private_key = PrivateKey::from_passphrase("script eval");
        let sighash = hash256(b"spend authorization");
        let mut sig = private_key.sign(&sighash).der();
        sig.push(0x01);
        let sec = private_key.public_key.sec_compressed().to_vec();

        let script_sig = Script(vec![Command::Data(sig), Command::Data(sec)]);
        let script_pubkey = Script::p2pkh(&[0x42; 20]);
        let combined = script_sig.concat(&script_pubkey);
        assert!(!combined.eval(&sighash, &[]).unwrap());
    }

    #[test]
    fn test_eval_promotes_p2wpkh_witness() {
        let private_key = PrivateKey::from_passphrase("witness eval");
        let sighash = hash256(b"segwit spend");
        let mut sig = private_key.sign(&sighash).der();
        sig.push(0x01);
        let sec = private_key.public_key.sec_compressed().to_vec();

        let script_pubkey = Script(vec![
            Command::Opcode(OP_0),
            Command::Data(hash160(&sec).to_vec()),
        ]);
        let witness = vec![sig, sec];
        assert!(script_pubkey.eval(&sighash, &witness).unwrap());
    }

    #[test]
    fn test_eval_checksig_malformed_signature() {
        let script = Script(vec![
            Command::Data(vec![0x01, 0x02, 0x03]),
            Command::Data(vec![0x02; 33]),
            Command::Opcode(OP_CHECKSIG),
        ]);
        // malformed pubkey/signature bytes evaluate to false, not a panic
        assert!(!script.eval(&[0u8; 32], &[]).unwrap());
    }

    #[test]
    fn test_eval_unknown_opcode() {
        let script = Script(vec![Command::Opcode(0xb3)]);
        assert!(matches!(
            script.eval(&[0u8; 32], &[]),
            Err(Error::UnknownOpcode(0xb3))
        ));
    }

    #[test]
    fn test_eval_underflow_fails_cleanly() {
        let script = Script(vec![Command::Opcode(OP_DUP)]);
        assert!(!script.eval(&[0u8; 32], &[]).unwrap());
    }

    #[test]
    fn test_eval_empty_script() {
        assert!(!Script::default().eval(&[0u8; 32], &[]).unwrap());
    }

    #[test]
    fn test_display_names() {
        let script = Script::p2pkh(&[0u8; 20]);
        let rendered = script.to_string();
        assert!(rendered.starts_with("OP_DUP OP_HASH160 "));
        assert!(rendered.ends_with("OP_EQUALVERIFY OP_CHECKSIG"));
    }
}
