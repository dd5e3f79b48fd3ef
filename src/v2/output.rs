// SPDX-License-Identifier: CC0-1.0

//! Typed access to a single output map.

use bitcoin::bip32::KeySource;
use bitcoin::{Amount, PublicKey, ScriptBuf, TxOut};

use crate::consts::{
    PSBT_OUT_AMOUNT, PSBT_OUT_BIP32_DERIVATION, PSBT_OUT_REDEEM_SCRIPT, PSBT_OUT_SCRIPT,
    PSBT_OUT_TAP_BIP32_DERIVATION, PSBT_OUT_TAP_INTERNAL_KEY, PSBT_OUT_TAP_TREE,
    PSBT_OUT_WITNESS_SCRIPT,
};
use crate::prelude::*;
use crate::raw;
use crate::serialize::{Deserialize, Serialize};
use crate::v2::error::GetError;
use crate::v2::map::KeyMap;
use crate::v2::MapSelector;

/// A read-only typed view of one output map.
///
/// The amount and script are required in a v2 output, everything else is
/// optional.
#[derive(Clone, Copy, Debug)]
pub struct OutputView<'a> {
    pub(crate) map: &'a KeyMap,
    pub(crate) index: usize,
}

impl<'a> OutputView<'a> {
    /// The index of this output within the PSBT.
    pub fn index(&self) -> usize { self.index }

    fn required<T: Deserialize>(&self, type_value: u8) -> Result<T, GetError> {
        let value = self.map.get_singleton(type_value).ok_or(GetError::MissingKey {
            map: MapSelector::Output(self.index),
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

    /// The amount this output pays.
    pub fn amount(&self) -> Result<Amount, GetError> { self.required(PSBT_OUT_AMOUNT) }

    /// The script this output pays to.
    pub fn script_pubkey(&self) -> Result<ScriptBuf, GetError> { self.required(PSBT_OUT_SCRIPT) }

    /// The amount and script as a [`TxOut`].
    pub fn tx_out(&self) -> Result<TxOut, GetError> {
        Ok(TxOut { value: self.amount()?, script_pubkey: self.script_pubkey()? })
    }

    /// The redeem script for this output.
    pub fn redeem_script(&self) -> Result<Option<ScriptBuf>, GetError> {
        self.optional(PSBT_OUT_REDEEM_SCRIPT)
    }

    /// The witness script for this output.
    pub fn witness_script(&self) -> Result<Option<ScriptBuf>, GetError> {
        self.optional(PSBT_OUT_WITNESS_SCRIPT)
    }

    /// The BIP-32 derivations for the pubkeys behind this output.
    pub fn bip32_derivations(&self) -> Result<Vec<(PublicKey, KeySource)>, GetError> {
        self.map
            .pairs_of_type(PSBT_OUT_BIP32_DERIVATION)
            .map(|pair| {
                let pubkey = PublicKey::deserialize(&pair.key.key)?;
                let source = KeySource::deserialize(&pair.value)?;
                Ok((pubkey, source))
            })
            .collect()
    }

    /// The taproot internal key, kept raw.
    pub fn tap_internal_key(&self) -> Option<&[u8]> {
        self.map.get_singleton(PSBT_OUT_TAP_INTERNAL_KEY)
    }

    /// The taproot tree, kept raw.
    pub fn tap_tree(&self) -> Option<&[u8]> { self.map.get_singleton(PSBT_OUT_TAP_TREE) }

    /// Taproot BIP-32 derivations, keyed by x-only pubkey, kept raw.
    pub fn tap_bip32_derivations(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.keyed(PSBT_OUT_TAP_BIP32_DERIVATION)
    }

    /// All key-value pairs of this map, in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = &raw::Pair> + '_ { self.map.pairs() }

    /// The key-value pairs carrying `type_value`, in insertion order.
    pub fn pairs_of_type(&self, type_value: u8) -> impl Iterator<Item = &raw::Pair> + '_ {
        self.map.pairs_of_type(type_value)
    }
}

/// Builds the map for one output before it is added to a PSBT.
#[derive(Clone, Debug)]
pub struct OutputBuilder {
    amount: Amount,
    script_pubkey: ScriptBuf,
    redeem_script: Option<ScriptBuf>,
    witness_script: Option<ScriptBuf>,
    bip32_derivations: Vec<(PublicKey, KeySource)>,
}

impl OutputBuilder {
    /// Creates a builder for an output paying `amount` to `script_pubkey`.
    pub fn new(amount: Amount, script_pubkey: ScriptBuf) -> Self {
        OutputBuilder {
            amount,
            script_pubkey,
            redeem_script: None,
            witness_script: None,
            bip32_derivations: Vec::new(),
        }
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

    /// Appends a BIP-32 derivation for a pubkey behind this output.
    pub fn bip32_derivation(mut self, pubkey: PublicKey, source: KeySource) -> Self {
        self.bip32_derivations.push((pubkey, source));
        self
    }

    pub(crate) fn into_map(self) -> KeyMap {
        let mut map = KeyMap::new();

        map.set(raw::Pair {
            key: raw::Key::singleton(PSBT_OUT_AMOUNT),
            value: self.amount.serialize(),
        });
        map.set(raw::Pair {
            key: raw::Key::singleton(PSBT_OUT_SCRIPT),
            value: self.script_pubkey.serialize(),
        });
        if let Some(ref script) = self.redeem_script {
            map.set(raw::Pair {
                key: raw::Key::singleton(PSBT_OUT_REDEEM_SCRIPT),
                value: script.serialize(),
            });
        }
        if let Some(ref script) = self.witness_script {
            map.set(raw::Pair {
                key: raw::Key::singleton(PSBT_OUT_WITNESS_SCRIPT),
                value: script.serialize(),
            });
        }
        for (pubkey, source) in &self.bip32_derivations {
            map.set(raw::Pair {
                key: raw::Key { type_value: PSBT_OUT_BIP32_DERIVATION, key: pubkey.serialize() },
                value: Serialize::serialize(source),
            });
        }

        map
    }
}
