// SPDX-License-Identifier: CC0-1.0

//! Typed access to a single input map.

use bitcoin::bip32::KeySource;
use bitcoin::locktime::absolute;
use bitcoin::{OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxOut, Txid, Witness};

use crate::consts::{
    PSBT_IN_BIP32_DERIVATION, PSBT_IN_FINAL_SCRIPTSIG, PSBT_IN_FINAL_SCRIPTWITNESS,
    PSBT_IN_HASH160, PSBT_IN_HASH256, PSBT_IN_NON_WITNESS_UTXO, PSBT_IN_OUTPUT_INDEX,
    PSBT_IN_PARTIAL_SIG, PSBT_IN_POR_COMMITMENT, PSBT_IN_PREVIOUS_TXID, PSBT_IN_REDEEM_SCRIPT,
    PSBT_IN_REQUIRED_HEIGHT_LOCKTIME, PSBT_IN_REQUIRED_TIME_LOCKTIME, PSBT_IN_RIPEMD160,
    PSBT_IN_SEQUENCE, PSBT_IN_SHA256, PSBT_IN_SIGHASH_TYPE, PSBT_IN_TAP_BIP32_DERIVATION,
    PSBT_IN_TAP_INTERNAL_KEY, PSBT_IN_TAP_KEY_SIG, PSBT_IN_TAP_LEAF_SCRIPT,
    PSBT_IN_TAP_MERKLE_ROOT, PSBT_IN_TAP_SCRIPT_SIG, PSBT_IN_WITNESS_SCRIPT,
    PSBT_IN_WITNESS_UTXO,
};
use crate::prelude::*;
use crate::raw;
use crate::serialize::{Deserialize, Serialize};
use crate::sighash_type::PsbtSighashType;
use crate::v2::error::GetError;
use crate::v2::map::KeyMap;
use crate::v2::MapSelector;

/// A read-only typed view of one input map.
///
/// Views decode value bytes on demand, the backing store keeps whatever came
/// off the wire. Required fields (previous txid, spent output index) return an
/// error when absent, everything else is optional.
#[derive(Clone, Copy, Debug)]
pub struct InputView<'a> {
    pub(crate) map: &'a KeyMap,
    pub(crate) index: usize,
}

impl<'a> InputView<'a> {
    /// The index of this input within the PSBT.
    pub fn index(&self) -> usize { self.index }

    fn required<T: Deserialize>(&self, type_value: u8) -> Result<T, GetError> {
        let value = self.map.get_singleton(type_value).ok_or(GetError::MissingKey {
            map: MapSelector::Input(self.index),
            type_value,
        })?;
        Ok(T::deserialize(value)?)
    }

    fn optional<T: Deserialize>(&self, type_value: u8) -> Result<Option<T>, GetError> {
        match self.map.get_singleton(type_value) {
            None => Ok(None),
            Some(value) => Ok(Some(T::deserialize(value)?)),
        }
    }

    fn keyed(&self, type_value: u8) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.map
            .pairs_of_type(type_value)
            .map(|pair| (pair.key.key.clone(), pair.value.clone()))
            .collect()
    }

    /// The txid of the transaction containing the output being spent.
    pub fn previous_txid(&self) -> Result<Txid, GetError> {
        self.required(PSBT_IN_PREVIOUS_TXID)
    }

    /// The index of the output being spent.
    pub fn output_index(&self) -> Result<u32, GetError> { self.required(PSBT_IN_OUTPUT_INDEX) }

    /// The outpoint being spent, built from the previous txid and output index.
    pub fn out_point(&self) -> Result<OutPoint, GetError> {
        Ok(OutPoint { txid: self.previous_txid()?, vout: self.output_index()? })
    }

    /// The sequence number for this input.
    pub fn sequence(&self) -> Result<Option<Sequence>, GetError> {
        self.optional(PSBT_IN_SEQUENCE)
    }

    /// The transaction containing the output being spent, in full.
    pub fn non_witness_utxo(&self) -> Result<Option<Transaction>, GetError> {
        self.optional(PSBT_IN_NON_WITNESS_UTXO)
    }

    /// The output being spent, for segwit inputs.
    pub fn witness_utxo(&self) -> Result<Option<TxOut>, GetError> {
        self.optional(PSBT_IN_WITNESS_UTXO)
    }

    /// The partial signatures on this input, in insertion order.
    ///
    /// Signature bytes are returned raw (DER plus trailing sighash byte), this
    /// crate never parses them.
    pub fn partial_sigs(&self) -> Result<Vec<(PublicKey, Vec<u8>)>, GetError> {
        self.map
            .pairs_of_type(PSBT_IN_PARTIAL_SIG)
            .map(|pair| {
                let pubkey = PublicKey::deserialize(&pair.key.key)?;
                Ok((pubkey, pair.value.clone()))
            })
            .collect()
    }

    /// The sighash type to be used when signing this input.
    pub fn sighash_type(&self) -> Result<Option<PsbtSighashType>, GetError> {
        self.optional(PSBT_IN_SIGHASH_TYPE)
    }

    /// The redeem script for this input.
    pub fn redeem_script(&self) -> Result<Option<ScriptBuf>, GetError> {
        self.optional(PSBT_IN_REDEEM_SCRIPT)
    }

    /// The witness script for this input.
    pub fn witness_script(&self) -> Result<Option<ScriptBuf>, GetError> {
        self.optional(PSBT_IN_WITNESS_SCRIPT)
    }

    /// The BIP-32 derivations for the pubkeys that may sign this input.
    pub fn bip32_derivations(&self) -> Result<Vec<(PublicKey, KeySource)>, GetError> {
        self.map
            .pairs_of_type(PSBT_IN_BIP32_DERIVATION)
            .map(|pair| {
                let pubkey = PublicKey::deserialize(&pair.key.key)?;
                let source = KeySource::deserialize(&pair.value)?;
                Ok((pubkey, source))
            })
            .collect()
    }

    /// The finalized scriptSig, set by an Input Finalizer.
    pub fn final_script_sig(&self) -> Result<Option<ScriptBuf>, GetError> {
        self.optional(PSBT_IN_FINAL_SCRIPTSIG)
    }

    /// The finalized script witness, set by an Input Finalizer.
    pub fn final_script_witness(&self) -> Result<Option<Witness>, GetError> {
        self.optional(PSBT_IN_FINAL_SCRIPTWITNESS)
    }

    /// The smallest time-based lock time this input is willing to sign for.
    pub fn min_time(&self) -> Result<Option<absolute::Time>, GetError> {
        self.optional(PSBT_IN_REQUIRED_TIME_LOCKTIME)
    }

    /// The smallest height-based lock time this input is willing to sign for.
    pub fn min_height(&self) -> Result<Option<absolute::Height>, GetError> {
        self.optional(PSBT_IN_REQUIRED_HEIGHT_LOCKTIME)
    }

    /// RIPEMD160 hash to preimage pairs, kept raw.
    pub fn ripemd160_preimages(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.keyed(PSBT_IN_RIPEMD160)
    }

    /// SHA256 hash to preimage pairs, kept raw.
    pub fn sha256_preimages(&self) -> Vec<(Vec<u8>, Vec<u8>)> { self.keyed(PSBT_IN_SHA256) }

    /// HASH160 hash to preimage pairs, kept raw.
    pub fn hash160_preimages(&self) -> Vec<(Vec<u8>, Vec<u8>)> { self.keyed(PSBT_IN_HASH160) }

    /// HASH256 hash to preimage pairs, kept raw.
    pub fn hash256_preimages(&self) -> Vec<(Vec<u8>, Vec<u8>)> { self.keyed(PSBT_IN_HASH256) }

    /// The proof of reserves commitment, kept raw.
    pub fn por_commitment(&self) -> Option<&[u8]> {
        self.map.get_singleton(PSBT_IN_POR_COMMITMENT)
    }

    /// The taproot key path signature, kept raw.
    pub fn tap_key_sig(&self) -> Option<&[u8]> { self.map.get_singleton(PSBT_IN_TAP_KEY_SIG) }

    /// Taproot script path signatures, keyed by pubkey and leaf hash, kept raw.
    pub fn tap_script_sigs(&self) -> Vec<(Vec<u8>, Vec<u8>)> { self.keyed(PSBT_IN_TAP_SCRIPT_SIG) }

    /// Taproot leaf scripts, keyed by control block, kept raw.
    pub fn tap_leaf_scripts(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.keyed(PSBT_IN_TAP_LEAF_SCRIPT)
    }

    /// Taproot BIP-32 derivations, keyed by x-only pubkey, kept raw.
    pub fn tap_bip32_derivations(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.keyed(PSBT_IN_TAP_BIP32_DERIVATION)
    }

    /// The taproot internal key, kept raw.
    pub fn tap_internal_key(&self) -> Option<&[u8]> {
        self.map.get_singleton(PSBT_IN_TAP_INTERNAL_KEY)
    }

    /// The taproot merkle root, kept raw.
    pub fn tap_merkle_root(&self) -> Option<&[u8]> {
        self.map.get_singleton(PSBT_IN_TAP_MERKLE_ROOT)
    }

    /// All key-value pairs of this map, in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = &raw::Pair> + '_ { self.map.pairs() }

    /// The key-value pairs carrying `type_value`, in insertion order.
    pub fn pairs_of_type(&self, type_value: u8) -> impl Iterator<Item = &raw::Pair> + '_ {
        self.map.pairs_of_type(type_value)
    }

    /// Returns true if this input has been finalized.
    ///
    /// An Input Finalizer writes the final scriptSig for legacy inputs and the
    /// final script witness for segwit inputs, so either record marks the
    /// input finalized.
    pub fn is_finalized(&self) -> bool {
        self.map.get_singleton(PSBT_IN_FINAL_SCRIPTSIG).is_some()
            || self.map.get_singleton(PSBT_IN_FINAL_SCRIPTWITNESS).is_some()
    }

    /// Returns true if either form of funding utxo is present.
    pub fn has_funding_utxo(&self) -> bool {
        self.map.get_singleton(PSBT_IN_NON_WITNESS_UTXO).is_some()
            || self.map.get_singleton(PSBT_IN_WITNESS_UTXO).is_some()
    }

    /// Returns true if any field a Transaction Extractor requires to be
    /// cleared is still present.
    pub(crate) fn has_non_finalization_fields(&self) -> bool {
        const NON_FINALIZATION_TYPES: &[u8] = &[
            PSBT_IN_PARTIAL_SIG,
            PSBT_IN_SIGHASH_TYPE,
            PSBT_IN_REDEEM_SCRIPT,
            PSBT_IN_WITNESS_SCRIPT,
            PSBT_IN_BIP32_DERIVATION,
            PSBT_IN_SEQUENCE,
            PSBT_IN_REQUIRED_TIME_LOCKTIME,
            PSBT_IN_REQUIRED_HEIGHT_LOCKTIME,
            PSBT_IN_TAP_KEY_SIG,
            PSBT_IN_TAP_SCRIPT_SIG,
            PSBT_IN_TAP_LEAF_SCRIPT,
            PSBT_IN_TAP_BIP32_DERIVATION,
            PSBT_IN_TAP_INTERNAL_KEY,
            PSBT_IN_TAP_MERKLE_ROOT,
        ];

        self.map.pairs().any(|pair| NON_FINALIZATION_TYPES.contains(&pair.key.type_value))
    }
}

/// Builds the map for one input before it is added to a PSBT.
///
/// The previous txid and spent output index are the only required fields in a
/// v2 input, everything else is opt-in.
#[derive(Clone, Debug)]
pub struct InputBuilder {
    previous_txid: Txid,
    output_index: u32,
    sequence: Option<Sequence>,
    non_witness_utxo: Option<Transaction>,
    witness_utxo: Option<TxOut>,
    redeem_script: Option<ScriptBuf>,
    witness_script: Option<ScriptBuf>,
    bip32_derivations: Vec<(PublicKey, KeySource)>,
    sighash_type: Option<PsbtSighashType>,
    min_time: Option<absolute::Time>,
    min_height: Option<absolute::Height>,
}

impl InputBuilder {
    /// Creates a builder for an input that spends `previous_output`.
    pub fn new(previous_output: &OutPoint) -> Self {
        InputBuilder {
            previous_txid: previous_output.txid,
            output_index: previous_output.vout,
            sequence: None,
            non_witness_utxo: None,
            witness_utxo: None,
            redeem_script: None,
            witness_script: None,
            bip32_derivations: Vec::new(),
            sighash_type: None,
            min_time: None,
            min_height: None,
        }
    }

    /// Sets the sequence number.
    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Funds this input with the full previous transaction (legacy outputs).
    pub fn legacy_fund(mut self, tx: Transaction) -> Self {
        self.non_witness_utxo = Some(tx);
        self
    }

    /// Funds this input with the spent output alone (segwit outputs).
    pub fn segwit_fund(mut self, utxo: TxOut) -> Self {
        self.witness_utxo = Some(utxo);
        self
    }

    /// Sets the redeem script.
    pub fn redeem_script(mut self, script: ScriptBuf) -> Self {
        self.redeem_script = Some(script);
        self
    }

    /// Sets the witness script.
    pub fn witness_script(mut self, script: ScriptBuf) -> Self {
        self.witness_script = Some(script);
        self
    }

    /// Appends a BIP-32 derivation for a pubkey that may sign this input.
    pub fn bip32_derivation(mut self, pubkey: PublicKey, source: KeySource) -> Self {
        self.bip32_derivations.push((pubkey, source));
        self
    }

    /// Sets the sighash type signers should use for this input.
    pub fn sighash_type(mut self, sighash_type: PsbtSighashType) -> Self {
        self.sighash_type = Some(sighash_type);
        self
    }

    /// Sets the minimum required time-based lock time for this input.
    pub fn minimum_required_time_based_lock_time(mut self, lock: absolute::Time) -> Self {
        self.min_time = Some(lock);
        self
    }

    /// Sets the minimum required height-based lock time for this input.
    pub fn minimum_required_height_based_lock_time(mut self, lock: absolute::Height) -> Self {
        self.min_height = Some(lock);
        self
    }

    pub(crate) fn into_map(self) -> KeyMap {
        let mut map = KeyMap::new();

        map.set(raw::Pair {
            key: raw::Key::singleton(PSBT_IN_PREVIOUS_TXID),
            value: self.previous_txid.serialize(),
        });
        map.set(raw::Pair {
            key: raw::Key::singleton(PSBT_IN_OUTPUT_INDEX),
            value: self.output_index.serialize(),
        });
        if let Some(sequence) = self.sequence {
            map.set(raw::Pair {
                key: raw::Key::singleton(PSBT_IN_SEQUENCE),
                value: sequence.serialize(),
            });
        }
        if let Some(ref tx) = self.non_witness_utxo {
            map.set(raw::Pair {
                key: raw::Key::singleton(PSBT_IN_NON_WITNESS_UTXO),
                value: tx.serialize(),
            });
        }
        if let Some(ref utxo) = self.witness_utxo {
            map.set(raw::Pair {
                key: raw::Key::singleton(PSBT_IN_WITNESS_UTXO),
                value: utxo.serialize(),
            });
        }
        if let Some(ref script) = self.redeem_script {
            map.set(raw::Pair {
                key: raw::Key::singleton(PSBT_IN_REDEEM_SCRIPT),
                value: script.serialize(),
            });
        }
        if let Some(ref script) = self.witness_script {
            map.set(raw::Pair {
                key: raw::Key::singleton(PSBT_IN_WITNESS_SCRIPT),
                value: script.serialize(),
            });
        }
        for (pubkey, source) in &self.bip32_derivations {
            map.set(raw::Pair {
                key: raw::Key { type_value: PSBT_IN_BIP32_DERIVATION, key: pubkey.serialize() },
                value: Serialize::serialize(source),
            });
        }
        if let Some(sighash_type) = self.sighash_type {
            map.set(raw::Pair {
                key: raw::Key::singleton(PSBT_IN_SIGHASH_TYPE),
                value: sighash_type.serialize(),
            });
        }
        if let Some(lock) = self.min_time {
            map.set(raw::Pair {
                key: raw::Key::singleton(PSBT_IN_REQUIRED_TIME_LOCKTIME),
                value: lock.serialize(),
            });
        }
        if let Some(lock) = self.min_height {
            map.set(raw::Pair {
                key: raw::Key::singleton(PSBT_IN_REQUIRED_HEIGHT_LOCKTIME),
                value: lock.serialize(),
            });
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::PSBT_IN_PROPRIETARY;

    fn out_point() -> OutPoint {
        OutPoint { txid: Txid::deserialize(&[0xab; 32]).unwrap(), vout: 1 }
    }

    fn view(map: &KeyMap) -> InputView<'_> { InputView { map, index: 0 } }

    #[test]
    fn builder_writes_required_keys() {
        let map = InputBuilder::new(&out_point()).into_map();
        let input = view(&map);

        assert_eq!(input.previous_txid().unwrap(), out_point().txid);
        assert_eq!(input.output_index().unwrap(), 1);
        assert_eq!(input.out_point().unwrap(), out_point());
        assert_eq!(input.sequence().unwrap(), None);
        assert!(!input.is_finalized());
        assert!(!input.has_funding_utxo());
    }

    #[test]
    fn builder_optional_fields_roundtrip() {
        let script = ScriptBuf::from(vec![0x51]);
        let map = InputBuilder::new(&out_point())
            .sequence(Sequence::from_consensus(0xffff_fffd))
            .witness_script(script.clone())
            .minimum_required_height_based_lock_time(
                absolute::Height::from_consensus(700_000).unwrap(),
            )
            .into_map();
        let input = view(&map);

        assert_eq!(input.sequence().unwrap(), Some(Sequence::from_consensus(0xffff_fffd)));
        assert_eq!(input.witness_script().unwrap(), Some(script));
        assert_eq!(
            input.min_height().unwrap(),
            Some(absolute::Height::from_consensus(700_000).unwrap())
        );
        assert_eq!(input.min_time().unwrap(), None);
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let map = KeyMap::new();
        let input = view(&map);

        let err = input.previous_txid().unwrap_err();
        assert!(matches!(
            err,
            GetError::MissingKey { map: MapSelector::Input(0), type_value: PSBT_IN_PREVIOUS_TXID }
        ));
    }

    #[test]
    fn non_finalization_fields_are_detected() {
        let map = InputBuilder::new(&out_point()).into_map();
        assert!(!view(&map).has_non_finalization_fields());

        let map = InputBuilder::new(&out_point())
            .sequence(Sequence::from_consensus(0xffff_fffd))
            .into_map();
        assert!(view(&map).has_non_finalization_fields());

        // Proprietary and unknown keys do not block extraction.
        let mut map = InputBuilder::new(&out_point()).into_map();
        map.set(raw::Pair {
            key: raw::Key { type_value: PSBT_IN_PROPRIETARY, key: vec![0x01] },
            value: vec![0x02],
        });
        assert!(!view(&map).has_non_finalization_fields());
    }

    #[test]
    fn raw_keytype_accessors() {
        let mut map = InputBuilder::new(&out_point()).into_map();
        map.set(raw::Pair {
            key: raw::Key::singleton(PSBT_IN_TAP_INTERNAL_KEY),
            value: vec![0x02; 32],
        });
        map.set(raw::Pair {
            key: raw::Key { type_value: PSBT_IN_TAP_SCRIPT_SIG, key: vec![0x03; 64] },
            value: vec![0x04; 64],
        });
        let input = view(&map);

        assert_eq!(input.tap_internal_key(), Some(&[0x02; 32][..]));
        assert_eq!(input.tap_key_sig(), None);
        assert_eq!(input.por_commitment(), None);

        let sigs = input.tap_script_sigs();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].0, vec![0x03; 64]);
        assert_eq!(input.pairs_of_type(PSBT_IN_TAP_SCRIPT_SIG).count(), 1);
        // Two required keys plus the two taproot records.
        assert_eq!(input.pairs().count(), 4);
    }
}
