//! Transaction model: legacy and segwit wire formats, txids, fees, both
//! signature-hash algorithms, and input signing/verification.

use crate::constants::SIGHASH_ALL;
use crate::ecdsa::PrivateKey;
use crate::encoding::{decode_varint, encode_varint, read_array, read_bytes, read_u32_le, read_u64_le};
use crate::error::{Error, Result};
use crate::fetcher::UtxoLookup;
use crate::hashing::hash256;
use crate::script::{Command, Script};
use crate::types::{reverse, reverse_hash, Hash256};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::OnceLock;

/// A reference to an output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Previous transaction id in display (big-endian) order.
    pub txid: Hash256,
    /// Output index within that transaction.
    pub vout: u32,
}

/// A transaction input spending a previous output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
    /// Witness stack elements; empty on legacy inputs.
    pub witness: Vec<Vec<u8>>,
}

impl TransactionInput {
    pub fn new(prevout: OutPoint) -> Self {
        Self { prevout, script_sig: Script::default(), sequence: 0xffff_ffff, witness: Vec::new() }
    }

    /// `reverse(txid) ‖ vout ‖ script_sig ‖ sequence`.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        self.serialize_with_script(&self.script_sig)
    }

    /// Serialization with a substituted script, used by the legacy sighash
    /// (empty script for unsigned inputs, previous scriptPubKey for the
    /// signed one).
    fn serialize_with_script(&self, script: &Script) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(40);
        out.extend_from_slice(&reverse(&self.prevout.txid));
        out.extend_from_slice(&self.prevout.vout.to_le_bytes());
        out.extend_from_slice(&script.serialize()?);
        out.extend_from_slice(&self.sequence.to_le_bytes());
        Ok(out)
    }

    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let txid_le = read_array::<32, _>(r)?;
        let txid = reverse_hash(&txid_le);
        let vout = read_u32_le(r)?;
        let script_sig = Script::parse(r)?;
        let sequence = read_u32_le(r)?;
        Ok(Self { prevout: OutPoint { txid, vout }, script_sig, sequence, witness: Vec::new() })
    }

    /// Amount of the spent output, from the UTXO lookup.
    pub fn value(&self, testnet: bool, lookup: &mut dyn UtxoLookup) -> Result<u64> {
        Ok(self.previous_output(testnet, lookup)?.amount)
    }

    /// ScriptPubKey of the spent output, from the UTXO lookup.
    pub fn script_pubkey(&self, testnet: bool, lookup: &mut dyn UtxoLookup) -> Result<Script> {
        Ok(self.previous_output(testnet, lookup)?.script_pubkey)
    }

    fn previous_output(&self, testnet: bool, lookup: &mut dyn UtxoLookup) -> Result<TransactionOutput> {
        let previous = lookup.fetch_previous(&self.prevout.txid, testnet, false)?;
        previous
            .outputs
            .get(self.prevout.vout as usize)
            .cloned()
            .ok_or_else(|| {
                Error::TxNotFound(format!("{}:{}", hex::encode(self.prevout.txid), self.prevout.vout))
            })
    }
}

/// A transaction output: an amount locked by a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Value in satoshi.
    pub amount: u64,
    pub script_pubkey: Script,
}

impl TransactionOutput {
    /// `amount ‖ script_pubkey`.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.script_pubkey.serialize()?);
        Ok(out)
    }

    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let amount = read_u64_le(r)?;
        let script_pubkey = Script::parse(r)?;
        Ok(Self { amount, script_pubkey })
    }
}

/// A Bitcoin transaction.
///
/// The three BIP-143 digests are memoized on first use; a transaction must
/// not have its inputs or outputs mutated once signing or verification has
/// started.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub locktime: u32,
    pub testnet: bool,
    pub segwit: bool,

    #[serde(skip)]
    hash_prevouts: OnceLock<Hash256>,
    #[serde(skip)]
    hash_sequence: OnceLock<Hash256>,
    #[serde(skip)]
    hash_outputs: OnceLock<Hash256>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.locktime == other.locktime
            && self.testnet == other.testnet
            && self.segwit == other.segwit
    }
}

impl Eq for Transaction {}

impl Transaction {
    pub fn new(
        version: u32,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        locktime: u32,
        testnet: bool,
    ) -> Self {
        Self { version, inputs, outputs, locktime, testnet, ..Self::default() }
    }

    /// Transaction id: `reverse(hash256(legacy serialization))`. Segwit
    /// transactions hash their non-witness form, so the id is stable
    /// across both serializations.
    pub fn txid(&self) -> Result<Hash256> {
        Ok(reverse_hash(&hash256(&self.serialize_legacy()?)))
    }

    /// Transaction id as lowercase hex.
    pub fn id(&self) -> Result<String> {
        Ok(hex::encode(self.txid()?))
    }

    /// Wire serialization; segwit transactions get the marker/flag form
    /// with per-input witness fields.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if !self.segwit {
            return self.serialize_legacy();
        }
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(0x00); // segwit marker
        out.push(0x01); // segwit flag
        out.extend_from_slice(&encode_varint(self.inputs.len() as u64));
        for input in &self.inputs {
            out.extend_from_slice(&input.serialize()?);
        }
        out.extend_from_slice(&encode_varint(self.outputs.len() as u64));
        for output in &self.outputs {
            out.extend_from_slice(&output.serialize()?);
        }
        for input in &self.inputs {
            out.extend_from_slice(&encode_varint(input.witness.len() as u64));
            for element in &input.witness {
                out.extend_from_slice(&encode_varint(element.len() as u64));
                out.extend_from_slice(element);
            }
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        Ok(out)
    }

    /// The non-witness serialization used for txids and legacy sighashes.
    pub fn serialize_legacy(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&encode_varint(self.inputs.len() as u64));
        for input in &self.inputs {
            out.extend_from_slice(&input.serialize()?);
        }
        out.extend_from_slice(&encode_varint(self.outputs.len() as u64));
        for output in &self.outputs {
            out.extend_from_slice(&output.serialize()?);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        Ok(out)
    }

    /// Parses either wire form.
    ///
    /// A zero input count peeks one flag byte: 0x01 selects the segwit
    /// layout, anything else is a transaction with outputs but no inputs.
    pub fn parse<R: Read>(r: &mut R, testnet: bool) -> Result<Self> {
        let version = read_u32_le(r)?;
        let mut segwit = false;
        let mut input_count = decode_varint(r)?;
        if input_count == 0 {
            let [flag] = read_array::<1, _>(r)?;
            if flag != 0x01 {
                return Err(Error::OutputsWithoutInputs);
            }
            segwit = true;
            input_count = decode_varint(r)?;
        }

        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            inputs.push(TransactionInput::parse(r)?);
        }

        let output_count = decode_varint(r)?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            outputs.push(TransactionOutput::parse(r)?);
        }

        if segwit {
            for input in &mut inputs {
                let element_count = decode_varint(r)?;
                for _ in 0..element_count {
                    let element_len = decode_varint(r)? as usize;
                    input.witness.push(read_bytes(r, element_len)?);
                }
            }
        }

        let locktime = read_u32_le(r)?;
        Ok(Self { version, inputs, outputs, locktime, testnet, segwit, ..Self::default() })
    }

    /// Fee in satoshi: input values minus output values. Negative means
    /// the transaction creates money and is invalid.
    pub fn fee(&self, lookup: &mut dyn UtxoLookup) -> Result<i64> {
        let mut input_sum: u64 = 0;
        for input in &self.inputs {
            input_sum += input.value(self.testnet, lookup)?;
        }
        let output_sum: u64 = self.outputs.iter().map(|o| o.amount).sum();
        Ok(input_sum as i64 - output_sum as i64)
    }

    /// The pre-segwit signature hash for one input: the transaction with
    /// every other scriptSig emptied, the signed input's scriptSig
    /// replaced by the previous scriptPubKey, and SIGHASH_ALL appended.
    pub fn sighash_legacy(&self, index: usize, lookup: &mut dyn UtxoLookup) -> Result<Hash256> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&encode_varint(self.inputs.len() as u64));
        let empty = Script::default();
        for (i, input) in self.inputs.iter().enumerate() {
            if i == index {
                let script_pubkey = input.script_pubkey(self.testnet, lookup)?;
                buf.extend_from_slice(&input.serialize_with_script(&script_pubkey)?);
            } else {
                buf.extend_from_slice(&input.serialize_with_script(&empty)?);
            }
        }
        buf.extend_from_slice(&encode_varint(self.outputs.len() as u64));
        for output in &self.outputs {
            buf.extend_from_slice(&output.serialize()?);
        }
        buf.extend_from_slice(&self.locktime.to_le_bytes());
        buf.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
        Ok(hash256(&buf))
    }

    /// hash256 over all `reverse(txid) ‖ vout` pairs, cached.
    pub fn hash_prevouts(&self) -> Hash256 {
        *self.hash_prevouts.get_or_init(|| {
            let mut all = Vec::with_capacity(36 * self.inputs.len());
            for input in &self.inputs {
                all.extend_from_slice(&reverse(&input.prevout.txid));
                all.extend_from_slice(&input.prevout.vout.to_le_bytes());
            }
            hash256(&all)
        })
    }

    /// hash256 over all input sequence numbers, cached.
    pub fn hash_sequence(&self) -> Hash256 {
        *self.hash_sequence.get_or_init(|| {
            let mut all = Vec::with_capacity(4 * self.inputs.len());
            for input in &self.inputs {
                all.extend_from_slice(&input.sequence.to_le_bytes());
            }
            hash256(&all)
        })
    }

    /// hash256 over all serialized outputs, cached.
    pub fn hash_outputs(&self) -> Result<Hash256> {
        if let Some(cached) = self.hash_outputs.get() {
            return Ok(*cached);
        }
        let mut all = Vec::new();
        for output in &self.outputs {
            all.extend_from_slice(&output.serialize()?);
        }
        let digest = hash256(&all);
        Ok(*self.hash_outputs.get_or_init(|| digest))
    }

    /// The BIP-143 signature hash for one input.
    ///
    /// The previous scriptPubKey and amount come from the caller when
    /// known, otherwise from the UTXO lookup. Only p2wpkh previous outputs
    /// are supported; the inner serialization uses the equivalent p2pkh
    /// script. The prevouts/sequence/outputs digests are reused across
    /// inputs, keeping multi-input signing linear.
    pub fn sighash_bip143(
        &self,
        index: usize,
        script_pubkey: Option<&Script>,
        amount: Option<u64>,
        lookup: &mut dyn UtxoLookup,
    ) -> Result<Hash256> {
        let input = &self.inputs[index];

        let previous_script = match script_pubkey {
            Some(script) => script.clone(),
            None => input.script_pubkey(self.testnet, lookup)?,
        };
        if !previous_script.is_p2wpkh() {
            return Err(Error::UnsupportedScriptType);
        }
        let mut h160 = [0u8; 20];
        h160.copy_from_slice(previous_script.data(1).expect("p2wpkh has a data element"));

        let value = match amount {
            Some(v) => v,
            None => input.value(self.testnet, lookup)?,
        };

        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.hash_prevouts());
        buf.extend_from_slice(&self.hash_sequence());
        buf.extend_from_slice(&reverse(&input.prevout.txid));
        buf.extend_from_slice(&input.prevout.vout.to_le_bytes());
        buf.extend_from_slice(&Script::p2pkh(&h160).serialize()?);
        buf.extend_from_slice(&value.to_le_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());
        buf.extend_from_slice(&self.hash_outputs()?);
        buf.extend_from_slice(&self.locktime.to_le_bytes());
        buf.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
        Ok(hash256(&buf))
    }

    /// Signs one input with SIGHASH_ALL, installing
    /// `<der ‖ 0x01> <compressed pubkey>` as the scriptSig, then verifies
    /// the freshly signed input.
    pub fn sign_input(
        &mut self,
        index: usize,
        private_key: &PrivateKey,
        lookup: &mut dyn UtxoLookup,
    ) -> Result<bool> {
        let sighash = if self.segwit {
            self.sighash_bip143(index, None, None, lookup)?
        } else {
            self.sighash_legacy(index, lookup)?
        };
        let mut signature = private_key.sign(&sighash).der();
        signature.push(0x01); // SIGHASH_ALL
        let sec = private_key.public_key.sec_compressed().to_vec();
        self.inputs[index].script_sig =
            Script(vec![Command::Data(signature), Command::Data(sec)]);
        self.verify_input(index, lookup)
    }

    /// Evaluates `scriptSig ‖ scriptPubKey` for one input against the
    /// sighash algorithm the previous output calls for.
    pub fn verify_input(&self, index: usize, lookup: &mut dyn UtxoLookup) -> Result<bool> {
        let input = &self.inputs[index];
        let script_pubkey = input.script_pubkey(self.testnet, lookup)?;
        let sighash = if script_pubkey.is_p2pkh() {
            self.sighash_legacy(index, lookup)?
        } else if script_pubkey.is_p2wpkh() {
            self.sighash_bip143(index, None, None, lookup)?
        } else {
            return Err(Error::UnsupportedScriptType);
        };
        let combined = input.script_sig.clone().concat(&script_pubkey);
        combined.eval(&sighash, &input.witness)
    }

    /// Whether the fee is non-negative and every input verifies.
    pub fn verify(&self, lookup: &mut dyn UtxoLookup) -> Result<bool> {
        if self.fee(lookup)? < 0 {
            return Ok(false);
        }
        for index in 0..self.inputs.len() {
            if !self.verify_input(index, lookup)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
