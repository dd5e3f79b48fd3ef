// SPDX-License-Identifier: CC0-1.0

//! Conversion between PSBT v2 and the original v0 format.
//!
//! [`Psbt::to_v0`] synthesizes the legacy unsigned transaction out of the v2
//! per-input and per-output fields, [`Psbt::from_v0`] goes the other way by
//! replaying the v2 creation lifecycle. `rust-bitcoin`'s [`bitcoin::Psbt`] is
//! the v0 representation on both sides.

use core::fmt;

use bitcoin::bip32::KeySource;
use bitcoin::hashes::{hash160, ripemd160, sha256, sha256d, Hash};
use bitcoin::psbt::{self as v0, raw as v0_raw};
use bitcoin::{ecdsa, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use log::warn;

use crate::consts::{
    PSBT_GLOBAL_FALLBACK_LOCKTIME, PSBT_GLOBAL_INPUT_COUNT, PSBT_GLOBAL_OUTPUT_COUNT,
    PSBT_GLOBAL_PROPRIETARY, PSBT_GLOBAL_TX_MODIFIABLE, PSBT_GLOBAL_TX_VERSION,
    PSBT_GLOBAL_UNSIGNED_TX, PSBT_GLOBAL_VERSION, PSBT_GLOBAL_XPUB, PSBT_IN_BIP32_DERIVATION,
    PSBT_IN_FINAL_SCRIPTSIG, PSBT_IN_FINAL_SCRIPTWITNESS, PSBT_IN_HASH160, PSBT_IN_HASH256,
    PSBT_IN_NON_WITNESS_UTXO, PSBT_IN_OUTPUT_INDEX, PSBT_IN_PARTIAL_SIG, PSBT_IN_PREVIOUS_TXID,
    PSBT_IN_PROPRIETARY, PSBT_IN_REDEEM_SCRIPT, PSBT_IN_REQUIRED_HEIGHT_LOCKTIME,
    PSBT_IN_REQUIRED_TIME_LOCKTIME, PSBT_IN_RIPEMD160, PSBT_IN_SEQUENCE, PSBT_IN_SHA256,
    PSBT_IN_SIGHASH_TYPE, PSBT_IN_WITNESS_SCRIPT, PSBT_IN_WITNESS_UTXO, PSBT_OUT_AMOUNT,
    PSBT_OUT_BIP32_DERIVATION, PSBT_OUT_PROPRIETARY, PSBT_OUT_REDEEM_SCRIPT, PSBT_OUT_SCRIPT,
    PSBT_OUT_WITNESS_SCRIPT,
};
use crate::error::write_err;
use crate::prelude::*;
use crate::raw;
use crate::serialize::{Deserialize, Serialize};
use crate::sighash_type::PsbtSighashType;
use crate::v2::{
    AddInputError, AddOutputError, AddPartialSigError, GetError, InputBuilder, KeyMap,
    OutputBuilder, Psbt,
};

impl Psbt {
    /// Converts this PSBT to the original v0 format.
    ///
    /// The legacy unsigned transaction is synthesized from the global
    /// transaction version, [`Psbt::determine_lock_time`], and the per-input
    /// outpoints and sequence numbers (defaulting to `0xffffffff`). Inputs and
    /// outputs that are missing their required fields are skipped with a
    /// warning, as are partial signatures that do not parse as DER plus
    /// sighash byte. The v2-only keys have no v0 slot and are stripped,
    /// everything else carries over.
    pub fn to_v0(&self) -> Result<v0::Psbt, ToV0Error> {
        let version = self.tx_version().map_err(ToV0Error::TxVersion)?;
        let lock_time = self.determine_lock_time().map_err(ToV0Error::LockTime)?;

        let mut tx_inputs: Vec<TxIn> = Vec::with_capacity(self.inputs.len());
        let mut v0_inputs: Vec<v0::Input> = Vec::with_capacity(self.inputs.len());
        for input in self.inputs() {
            let previous_output = match input.out_point() {
                Ok(out_point) => out_point,
                Err(_) => {
                    warn!("input {} is missing its outpoint, skipping it", input.index());
                    continue;
                }
            };
            let sequence = match input.sequence() {
                Ok(sequence) => sequence.unwrap_or(Sequence::MAX),
                Err(_) => {
                    warn!("input {} sequence does not deserialize, defaulting it", input.index());
                    Sequence::MAX
                }
            };

            tx_inputs.push(TxIn {
                previous_output,
                script_sig: ScriptBuf::new(),
                sequence,
                witness: Witness::default(),
            });
            v0_inputs.push(convert_input(input.map, input.index()));
        }

        let mut tx_outputs: Vec<TxOut> = Vec::with_capacity(self.outputs.len());
        let mut v0_outputs: Vec<v0::Output> = Vec::with_capacity(self.outputs.len());
        for output in self.outputs() {
            let (value, script_pubkey) = match (output.amount(), output.script_pubkey()) {
                (Ok(amount), Ok(script)) => (amount, script),
                _ => {
                    warn!("output {} is missing its amount or script, skipping it", output.index());
                    continue;
                }
            };

            tx_outputs.push(TxOut { value, script_pubkey });
            v0_outputs.push(convert_output(output.map, output.index()));
        }

        let unsigned_tx = Transaction {
            version,
            lock_time,
            input: tx_inputs,
            output: tx_outputs,
        };

        let mut xpub = BTreeMap::new();
        for (key, source) in self.xpubs().map_err(ToV0Error::Xpubs)? {
            xpub.insert(key, source);
        }

        let mut proprietary = BTreeMap::new();
        let mut unknown = BTreeMap::new();
        for pair in self.global.pairs() {
            match pair.key.type_value {
                // These all live in the unsigned transaction or stay v2-only.
                PSBT_GLOBAL_UNSIGNED_TX
                | PSBT_GLOBAL_XPUB
                | PSBT_GLOBAL_TX_VERSION
                | PSBT_GLOBAL_FALLBACK_LOCKTIME
                | PSBT_GLOBAL_INPUT_COUNT
                | PSBT_GLOBAL_OUTPUT_COUNT
                | PSBT_GLOBAL_TX_MODIFIABLE
                | PSBT_GLOBAL_VERSION => {}
                PSBT_GLOBAL_PROPRIETARY => {
                    convert_proprietary_pair(pair, &mut proprietary, "global map")
                }
                type_value => {
                    unknown.insert(
                        v0_raw::Key { type_value, key: pair.key.key.clone() },
                        pair.value.clone(),
                    );
                }
            }
        }

        Ok(v0::Psbt {
            unsigned_tx,
            version: 0,
            xpub,
            proprietary,
            unknown,
            inputs: v0_inputs,
            outputs: v0_outputs,
        })
    }

    /// Builds a v2 PSBT out of a v0 one by replaying the creation lifecycle.
    ///
    /// Runs Creator, Constructor (one [`Psbt::add_input`]/[`Psbt::add_output`]
    /// per legacy entry), Signer ([`Psbt::add_partial_sig`] per signature, so
    /// the modifiable flags narrow exactly as if the signatures had been
    /// gathered on the v2 PSBT), and finally copies any final scripts over.
    ///
    /// The fallback lock time is taken from the legacy unsigned transaction.
    /// A legacy transaction version of 1 is rejected unless
    /// `allow_tx_version_1` is set, in which case the dangerous downgrade
    /// path is used.
    ///
    /// Inputs that were finalized before the conversion keep their redeem and
    /// witness scripts, so they are finalized but not extractor-ready. The v0
    /// hash preimage, proof-of-reserves, taproot, proprietary, and unknown
    /// fields are not carried over.
    pub fn from_v0(v0: &v0::Psbt, allow_tx_version_1: bool) -> Result<Psbt, FromV0Error> {
        let mut psbt = Psbt::create();

        let tx_version = v0.unsigned_tx.version;
        if tx_version.0 >= 2 {
            psbt.global.set(raw::Pair {
                key: raw::Key::singleton(PSBT_GLOBAL_TX_VERSION),
                value: tx_version.serialize(),
            });
        } else if tx_version.0 == 1 && allow_tx_version_1 {
            psbt.dangerously_set_tx_version_1()
                .expect("a freshly created PSBT is constructor ready");
        } else {
            return Err(FromV0Error::WrongTxVersion(tx_version.0));
        }

        psbt.global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_FALLBACK_LOCKTIME),
            value: v0.unsigned_tx.lock_time.serialize(),
        });

        for (xpub, source) in &v0.xpub {
            psbt.add_global_xpub(*xpub, source.0, source.1.clone());
        }

        for (txin, input) in v0.unsigned_tx.input.iter().zip(v0.inputs.iter()) {
            let mut builder =
                InputBuilder::new(&txin.previous_output).sequence(txin.sequence);
            if let Some(ref tx) = input.non_witness_utxo {
                builder = builder.legacy_fund(tx.clone());
            }
            if let Some(ref utxo) = input.witness_utxo {
                builder = builder.segwit_fund(utxo.clone());
            }
            if let Some(ref script) = input.redeem_script {
                builder = builder.redeem_script(script.clone());
            }
            if let Some(ref script) = input.witness_script {
                builder = builder.witness_script(script.clone());
            }
            for (pubkey, source) in &input.bip32_derivation {
                builder = builder.bip32_derivation(PublicKey::new(*pubkey), source.clone());
            }
            if let Some(sighash_type) = input.sighash_type {
                builder = builder.sighash_type(PsbtSighashType::from_u32(sighash_type.to_u32()));
            }
            psbt.add_input(builder)?;
        }

        for (txout, output) in v0.unsigned_tx.output.iter().zip(v0.outputs.iter()) {
            let mut builder = OutputBuilder::new(txout.value, txout.script_pubkey.clone());
            if let Some(ref script) = output.redeem_script {
                builder = builder.redeem_script(script.clone());
            }
            if let Some(ref script) = output.witness_script {
                builder = builder.witness_script(script.clone());
            }
            for (pubkey, source) in &output.bip32_derivation {
                builder = builder.bip32_derivation(PublicKey::new(*pubkey), source.clone());
            }
            psbt.add_output(builder)?;
        }

        // Signatures go in last, each one narrows the modifiable flags.
        for (index, input) in v0.inputs.iter().enumerate() {
            for (pubkey, sig) in &input.partial_sigs {
                psbt.add_partial_sig(index, *pubkey, &sig.to_vec())?;
            }
        }

        for (index, input) in v0.inputs.iter().enumerate() {
            if let Some(ref script) = input.final_script_sig {
                psbt.inputs[index].set(raw::Pair {
                    key: raw::Key::singleton(PSBT_IN_FINAL_SCRIPTSIG),
                    value: script.serialize(),
                });
            }
            if let Some(ref witness) = input.final_script_witness {
                psbt.inputs[index].set(raw::Pair {
                    key: raw::Key::singleton(PSBT_IN_FINAL_SCRIPTWITNESS),
                    value: witness.serialize(),
                });
            }
        }

        Ok(psbt)
    }
}

fn convert_input(map: &KeyMap, index: usize) -> v0::Input {
    let mut input = v0::Input::default();

    for pair in map.pairs() {
        match pair.key.type_value {
            PSBT_IN_NON_WITNESS_UTXO => match Transaction::deserialize(&pair.value) {
                Ok(tx) => input.non_witness_utxo = Some(tx),
                Err(_) => {
                    warn!("input {} non witness utxo does not deserialize, dropping it", index)
                }
            },
            PSBT_IN_WITNESS_UTXO => match TxOut::deserialize(&pair.value) {
                Ok(utxo) => input.witness_utxo = Some(utxo),
                Err(_) => warn!("input {} witness utxo does not deserialize, dropping it", index),
            },
            PSBT_IN_PARTIAL_SIG => {
                let pubkey = PublicKey::deserialize(&pair.key.key);
                let sig = ecdsa::Signature::from_slice(&pair.value);
                match (pubkey, sig) {
                    (Ok(pubkey), Ok(sig)) => {
                        input.partial_sigs.insert(pubkey, sig);
                    }
                    _ => warn!("input {} has a signature that does not parse, dropping it", index),
                }
            }
            PSBT_IN_SIGHASH_TYPE => match PsbtSighashType::deserialize(&pair.value) {
                Ok(ty) => input.sighash_type = Some(v0::PsbtSighashType::from_u32(ty.to_u32())),
                Err(_) => warn!("input {} sighash type does not deserialize, dropping it", index),
            },
            PSBT_IN_REDEEM_SCRIPT => match ScriptBuf::deserialize(&pair.value) {
                Ok(script) => input.redeem_script = Some(script),
                Err(_) => warn!("input {} redeem script does not deserialize, dropping it", index),
            },
            PSBT_IN_WITNESS_SCRIPT => match ScriptBuf::deserialize(&pair.value) {
                Ok(script) => input.witness_script = Some(script),
                Err(_) => warn!("input {} witness script does not deserialize, dropping it", index),
            },
            PSBT_IN_BIP32_DERIVATION => {
                let pubkey = PublicKey::deserialize(&pair.key.key);
                let source = KeySource::deserialize(&pair.value);
                match (pubkey, source) {
                    (Ok(pubkey), Ok(source)) => {
                        input.bip32_derivation.insert(pubkey.inner, source);
                    }
                    _ => warn!("input {} has a derivation that does not parse, dropping it", index),
                }
            }
            PSBT_IN_FINAL_SCRIPTSIG => match ScriptBuf::deserialize(&pair.value) {
                Ok(script) => input.final_script_sig = Some(script),
                Err(_) => {
                    warn!("input {} final script sig does not deserialize, dropping it", index)
                }
            },
            PSBT_IN_FINAL_SCRIPTWITNESS => match Witness::deserialize(&pair.value) {
                Ok(witness) => input.final_script_witness = Some(witness),
                Err(_) => warn!("input {} final witness does not deserialize, dropping it", index),
            },
            PSBT_IN_RIPEMD160 => match ripemd160::Hash::from_slice(&pair.key.key) {
                Ok(hash) => {
                    input.ripemd160_preimages.insert(hash, pair.value.clone());
                }
                Err(_) => {
                    warn!("input {} has a ripemd160 key that is not a hash, dropping it", index)
                }
            },
            PSBT_IN_SHA256 => match sha256::Hash::from_slice(&pair.key.key) {
                Ok(hash) => {
                    input.sha256_preimages.insert(hash, pair.value.clone());
                }
                Err(_) => warn!("input {} has a sha256 key that is not a hash, dropping it", index),
            },
            PSBT_IN_HASH160 => match hash160::Hash::from_slice(&pair.key.key) {
                Ok(hash) => {
                    input.hash160_preimages.insert(hash, pair.value.clone());
                }
                Err(_) => {
                    warn!("input {} has a hash160 key that is not a hash, dropping it", index)
                }
            },
            PSBT_IN_HASH256 => match sha256d::Hash::from_slice(&pair.key.key) {
                Ok(hash) => {
                    input.hash256_preimages.insert(hash, pair.value.clone());
                }
                Err(_) => {
                    warn!("input {} has a hash256 key that is not a hash, dropping it", index)
                }
            },
            // These move into the synthesized transaction.
            PSBT_IN_PREVIOUS_TXID
            | PSBT_IN_OUTPUT_INDEX
            | PSBT_IN_SEQUENCE
            | PSBT_IN_REQUIRED_TIME_LOCKTIME
            | PSBT_IN_REQUIRED_HEIGHT_LOCKTIME => {}
            PSBT_IN_PROPRIETARY => {
                convert_proprietary_pair(pair, &mut input.proprietary, "input map")
            }
            // Proof-of-reserves, taproot, and unrecognized pairs ride along untyped.
            type_value => {
                input.unknown.insert(
                    v0_raw::Key { type_value, key: pair.key.key.clone() },
                    pair.value.clone(),
                );
            }
        }
    }

    input
}

fn convert_output(map: &KeyMap, index: usize) -> v0::Output {
    let mut output = v0::Output::default();

    for pair in map.pairs() {
        match pair.key.type_value {
            PSBT_OUT_REDEEM_SCRIPT => match ScriptBuf::deserialize(&pair.value) {
                Ok(script) => output.redeem_script = Some(script),
                Err(_) => warn!("output {} redeem script does not deserialize, dropping it", index),
            },
            PSBT_OUT_WITNESS_SCRIPT => match ScriptBuf::deserialize(&pair.value) {
                Ok(script) => output.witness_script = Some(script),
                Err(_) => {
                    warn!("output {} witness script does not deserialize, dropping it", index)
                }
            },
            PSBT_OUT_BIP32_DERIVATION => {
                let pubkey = PublicKey::deserialize(&pair.key.key);
                let source = KeySource::deserialize(&pair.value);
                match (pubkey, source) {
                    (Ok(pubkey), Ok(source)) => {
                        output.bip32_derivation.insert(pubkey.inner, source);
                    }
                    _ => {
                        warn!("output {} has a derivation that does not parse, dropping it", index)
                    }
                }
            }
            // These move into the synthesized transaction.
            PSBT_OUT_AMOUNT | PSBT_OUT_SCRIPT => {}
            PSBT_OUT_PROPRIETARY => {
                convert_proprietary_pair(pair, &mut output.proprietary, "output map")
            }
            type_value => {
                output.unknown.insert(
                    v0_raw::Key { type_value, key: pair.key.key.clone() },
                    pair.value.clone(),
                );
            }
        }
    }

    output
}

fn convert_proprietary_pair(
    pair: &raw::Pair,
    proprietary: &mut BTreeMap<v0_raw::ProprietaryKey, Vec<u8>>,
    map_name: &str,
) {
    match raw::ProprietaryKey::try_from(pair.key.clone()) {
        Ok(key) => {
            proprietary.insert(
                v0_raw::ProprietaryKey { prefix: key.prefix, subtype: key.subtype, key: key.key },
                pair.value.clone(),
            );
        }
        Err(_) => warn!("{} has a proprietary key that does not parse, dropping it", map_name),
    }
}

/// Error converting a PSBT to the v0 format.
#[derive(Debug)]
#[non_exhaustive]
pub enum ToV0Error {
    /// Error reading the global transaction version.
    TxVersion(GetError),
    /// Error determining the lock time for the unsigned transaction.
    LockTime(GetError),
    /// Error reading the global xpubs.
    Xpubs(GetError),
}

impl fmt::Display for ToV0Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ToV0Error::*;

        match *self {
            TxVersion(ref e) => write_err!(f, "error reading the global transaction version"; e),
            LockTime(ref e) => write_err!(f, "error determining the lock time"; e),
            Xpubs(ref e) => write_err!(f, "error reading the global xpubs"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ToV0Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use ToV0Error::*;

        match *self {
            TxVersion(ref e) => Some(e),
            LockTime(ref e) => Some(e),
            Xpubs(ref e) => Some(e),
        }
    }
}

/// Error converting a v0 PSBT to the v2 format.
#[derive(Debug)]
#[non_exhaustive]
pub enum FromV0Error {
    /// The legacy transaction version is below 2 and was not explicitly allowed.
    WrongTxVersion(i32),
    /// Error adding an input during the lifecycle replay.
    AddInput(AddInputError),
    /// Error adding an output during the lifecycle replay.
    AddOutput(AddOutputError),
    /// Error replaying a partial signature.
    PartialSig(AddPartialSigError),
}

impl fmt::Display for FromV0Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use FromV0Error::*;

        match *self {
            WrongTxVersion(v) => write!(f, "transaction version must be at least 2, found: {}", v),
            AddInput(ref e) => write_err!(f, "error adding an input"; e),
            AddOutput(ref e) => write_err!(f, "error adding an output"; e),
            PartialSig(ref e) => write_err!(f, "error replaying a partial signature"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FromV0Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use FromV0Error::*;

        match *self {
            WrongTxVersion(_) => None,
            AddInput(ref e) => Some(e),
            AddOutput(ref e) => Some(e),
            PartialSig(ref e) => Some(e),
        }
    }
}

impl From<AddInputError> for FromV0Error {
    fn from(e: AddInputError) -> Self { Self::AddInput(e) }
}

impl From<AddOutputError> for FromV0Error {
    fn from(e: AddOutputError) -> Self { Self::AddOutput(e) }
}

impl From<AddPartialSigError> for FromV0Error {
    fn from(e: AddPartialSigError) -> Self { Self::PartialSig(e) }
}

#[cfg(test)]
mod tests {
    use bitcoin::bip32::{DerivationPath, Fingerprint};
    use bitcoin::locktime::absolute;
    use bitcoin::{transaction, Amount, OutPoint, Txid};

    use super::*;
    use crate::version::Version;

    const SIG_HEX: &str = "3044022074018ad4180097b873323c0015720b3684cc8123891048e7dbcd9b55ad679c99022073d369b740e3eb53dcefa33823c8070514ca55a7dd9544f157c167913261118c01";

    fn out_point() -> OutPoint {
        OutPoint { txid: Txid::deserialize(&[0xab; 32]).unwrap(), vout: 3 }
    }

    fn pubkey() -> PublicKey {
        "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798".parse().unwrap()
    }

    fn spend_script() -> ScriptBuf { ScriptBuf::from(vec![0x51]) }

    fn v0_one_in_one_out() -> v0::Psbt {
        let tx = Transaction {
            version: transaction::Version::TWO,
            lock_time: absolute::LockTime::from_consensus(650_000),
            input: vec![TxIn {
                previous_output: out_point(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::from_consensus(0xffff_fffd),
                witness: Witness::default(),
            }],
            output: vec![TxOut { value: Amount::from_sat(9_000), script_pubkey: spend_script() }],
        };
        v0::Psbt::from_unsigned_tx(tx).unwrap()
    }

    #[test]
    fn from_v0_replays_the_creation_lifecycle() {
        let mut legacy = v0_one_in_one_out();
        legacy.inputs[0].witness_utxo =
            Some(TxOut { value: Amount::from_sat(10_000), script_pubkey: spend_script() });

        let psbt = Psbt::from_v0(&legacy, false).unwrap();

        assert_eq!(psbt.version(), Version::TWO);
        assert_eq!(psbt.tx_version().unwrap(), transaction::Version::TWO);
        assert_eq!(psbt.input_count(), 1);
        assert_eq!(psbt.output_count(), 1);
        assert!(psbt.is_inputs_modifiable());
        assert!(psbt.is_outputs_modifiable());

        let input = psbt.input(0).unwrap();
        assert_eq!(input.out_point().unwrap(), out_point());
        assert_eq!(input.sequence().unwrap(), Some(Sequence::from_consensus(0xffff_fffd)));
        assert!(input.witness_utxo().unwrap().is_some());

        let output = psbt.output(0).unwrap();
        assert_eq!(output.amount().unwrap(), Amount::from_sat(9_000));
        assert_eq!(output.script_pubkey().unwrap(), spend_script());

        // The legacy lock time becomes the fallback.
        assert_eq!(
            psbt.fallback_lock_time().unwrap(),
            Some(absolute::LockTime::from_consensus(650_000))
        );
        assert_eq!(
            psbt.determine_lock_time().unwrap(),
            absolute::LockTime::from_consensus(650_000)
        );
    }

    #[test]
    fn from_v0_rejects_tx_version_1_without_the_override() {
        let mut legacy = v0_one_in_one_out();
        legacy.unsigned_tx.version = transaction::Version::ONE;

        let err = Psbt::from_v0(&legacy, false).unwrap_err();
        assert!(matches!(err, FromV0Error::WrongTxVersion(1)));

        let psbt = Psbt::from_v0(&legacy, true).unwrap();
        assert_eq!(psbt.tx_version().unwrap(), transaction::Version::ONE);
    }

    #[test]
    fn from_v0_replays_signatures_and_narrows_flags() {
        let sig: ecdsa::Signature = SIG_HEX.parse().unwrap();
        let mut legacy = v0_one_in_one_out();
        legacy.inputs[0].partial_sigs.insert(pubkey(), sig);

        let psbt = Psbt::from_v0(&legacy, false).unwrap();

        let sigs = psbt.input(0).unwrap().partial_sigs().unwrap();
        assert_eq!(sigs, vec![(pubkey(), sig.to_vec())]);
        // SIGHASH_ALL commits to everything.
        assert!(!psbt.is_inputs_modifiable());
        assert!(!psbt.is_outputs_modifiable());
    }

    #[test]
    fn from_v0_keeps_redeem_script_of_finalized_input() {
        let mut legacy = v0_one_in_one_out();
        legacy.inputs[0].witness_utxo =
            Some(TxOut { value: Amount::from_sat(10_000), script_pubkey: spend_script() });
        legacy.inputs[0].redeem_script = Some(spend_script());
        legacy.inputs[0].final_script_sig = Some(spend_script());

        let psbt = Psbt::from_v0(&legacy, false).unwrap();

        assert!(psbt.is_finalized());
        let input = psbt.input(0).unwrap();
        assert_eq!(input.final_script_sig().unwrap(), Some(spend_script()));
        // The redeem script was not stripped when the input was finalized.
        assert_eq!(input.redeem_script().unwrap(), Some(spend_script()));
        assert!(!psbt.is_ready_for_transaction_extractor());
    }

    #[test]
    fn to_v0_synthesizes_the_unsigned_transaction() {
        let mut psbt = Psbt::create();
        psbt.add_input(
            InputBuilder::new(&out_point())
                .sequence(Sequence::from_consensus(0xffff_fffd))
                .segwit_fund(TxOut {
                    value: Amount::from_sat(10_000),
                    script_pubkey: spend_script(),
                })
                .bip32_derivation(
                    pubkey(),
                    (Fingerprint::from([0u8; 4]), DerivationPath::master()),
                ),
        )
        .unwrap();
        psbt.add_output(OutputBuilder::new(Amount::from_sat(9_000), spend_script())).unwrap();

        let legacy = psbt.to_v0().unwrap();

        assert_eq!(legacy.version, 0);
        assert_eq!(legacy.unsigned_tx.version, transaction::Version::TWO);
        assert_eq!(legacy.unsigned_tx.lock_time, absolute::LockTime::ZERO);
        assert_eq!(legacy.unsigned_tx.input.len(), 1);
        assert_eq!(legacy.unsigned_tx.input[0].previous_output, out_point());
        assert_eq!(legacy.unsigned_tx.input[0].sequence, Sequence::from_consensus(0xffff_fffd));
        assert_eq!(legacy.unsigned_tx.output.len(), 1);
        assert_eq!(legacy.unsigned_tx.output[0].value, Amount::from_sat(9_000));

        assert!(legacy.inputs[0].witness_utxo.is_some());
        assert!(legacy.inputs[0].bip32_derivation.contains_key(&pubkey().inner));
        // Serializes as a valid v0 blob.
        assert!(v0::Psbt::deserialize(&legacy.serialize()).is_ok());
    }

    #[test]
    fn to_v0_defaults_missing_sequence_to_max() {
        let mut psbt = Psbt::create();
        psbt.add_input(InputBuilder::new(&out_point())).unwrap();

        let legacy = psbt.to_v0().unwrap();
        assert_eq!(legacy.unsigned_tx.input[0].sequence, Sequence::MAX);
    }

    #[test]
    fn to_v0_skips_incomplete_inputs_and_outputs() {
        let mut psbt = Psbt::create();
        psbt.add_input(InputBuilder::new(&out_point())).unwrap();
        psbt.add_output(OutputBuilder::new(Amount::from_sat(9_000), spend_script())).unwrap();

        // An input with no output index and an output with no script.
        let mut incomplete_input = KeyMap::new();
        incomplete_input.set(raw::Pair {
            key: raw::Key::singleton(PSBT_IN_PREVIOUS_TXID),
            value: Txid::deserialize(&[0xcd; 32]).unwrap().serialize(),
        });
        psbt.inputs.push(incomplete_input);
        let mut incomplete_output = KeyMap::new();
        incomplete_output.set(raw::Pair {
            key: raw::Key::singleton(PSBT_OUT_AMOUNT),
            value: Amount::from_sat(1).serialize(),
        });
        psbt.outputs.push(incomplete_output);
        psbt.set_counts();

        let legacy = psbt.to_v0().unwrap();

        assert_eq!(legacy.unsigned_tx.input.len(), 1);
        assert_eq!(legacy.inputs.len(), 1);
        assert_eq!(legacy.unsigned_tx.output.len(), 1);
        assert_eq!(legacy.outputs.len(), 1);
    }

    #[test]
    fn to_v0_drops_signatures_that_do_not_parse() {
        let mut psbt = Psbt::create();
        psbt.add_input(InputBuilder::new(&out_point())).unwrap();
        psbt.inputs[0].set(raw::Pair {
            key: raw::Key { type_value: PSBT_IN_PARTIAL_SIG, key: pubkey().to_bytes() },
            value: vec![0xde, 0xad],
        });

        let legacy = psbt.to_v0().unwrap();
        assert!(legacy.inputs[0].partial_sigs.is_empty());
    }

    #[test]
    fn to_v0_carries_proprietary_and_unknown_pairs() {
        use crate::v2::MapSelector;

        let mut psbt = Psbt::create();
        psbt.add_input(InputBuilder::new(&out_point())).unwrap();
        psbt.set_proprietary_value(
            MapSelector::Global,
            raw::ProprietaryKey { prefix: b"org".to_vec(), subtype: 0x01, key: vec![0xaa] },
            vec![0x01],
        )
        .unwrap();
        // A proof-of-reserves commitment and a key this crate does not know.
        psbt.inputs[0].set(raw::Pair {
            key: raw::Key::singleton(crate::consts::PSBT_IN_POR_COMMITMENT),
            value: b"commitment".to_vec(),
        });
        psbt.inputs[0].set(raw::Pair {
            key: raw::Key { type_value: 0x20, key: vec![0x01] },
            value: vec![0x02],
        });

        let legacy = psbt.to_v0().unwrap();

        assert_eq!(legacy.proprietary.len(), 1);
        let por = v0_raw::Key {
            type_value: crate::consts::PSBT_IN_POR_COMMITMENT,
            key: Vec::new(),
        };
        assert_eq!(legacy.inputs[0].unknown.get(&por), Some(&b"commitment".to_vec()));
        let other = v0_raw::Key { type_value: 0x20, key: vec![0x01] };
        assert_eq!(legacy.inputs[0].unknown.get(&other), Some(&vec![0x02]));
    }
}
