// SPDX-License-Identifier: CC0-1.0

//! PSBT Version 2.
//!
//! The engine for the second version of the Partially Signed Bitcoin Transaction
//! format described in [BIP-370].
//!
//! All transaction data lives in three levels of key-value maps (one global map,
//! one map per input, one map per output). [`Psbt`] keeps the maps raw and decodes
//! values on demand, so unknown and proprietary pairs survive a parse/serialize
//! round trip byte for byte.
//!
//! # Roles
//!
//! BIP-370 describes various operator roles. Instead of one type per role this
//! module exposes readiness predicates on [`Psbt`], checked again by every
//! mutating operation:
//!
//! - The **Creator** role: use [`Psbt::create`].
//! - The **Constructor** role: gated by [`Psbt::is_ready_for_constructor`], acts
//!   through [`Psbt::add_input`], [`Psbt::add_output`], [`Psbt::delete_input`],
//!   and [`Psbt::delete_output`].
//! - The **Updater** role: gated by [`Psbt::is_ready_for_updater`], acts through
//!   [`Psbt::set_input_sequence`].
//! - The **Signer** role: gated by [`Psbt::is_ready_for_signer`], acts through
//!   [`Psbt::add_partial_sig`].
//! - The **Combiner** role: see [`crate::combiner`].
//! - The **Transaction Extractor** role: readiness only, see
//!   [`Psbt::is_ready_for_transaction_extractor`].
//!
//! [BIP-370]: <https://github.com/bitcoin/bips/blob/master/bip-0370.mediawiki>

mod convert;
mod error;
mod input;
pub mod map;
mod output;

use core::fmt;

use bitcoin::bip32::{DerivationPath, Fingerprint, KeySource, Xpub};
use bitcoin::locktime::absolute;
use bitcoin::{transaction, PublicKey, Sequence, VarInt};
use log::warn;

use crate::consts::{
    PSBT_GLOBAL_FALLBACK_LOCKTIME, PSBT_GLOBAL_INPUT_COUNT, PSBT_GLOBAL_OUTPUT_COUNT,
    PSBT_GLOBAL_PROPRIETARY, PSBT_GLOBAL_TX_MODIFIABLE, PSBT_GLOBAL_TX_VERSION,
    PSBT_GLOBAL_UNSIGNED_TX, PSBT_GLOBAL_VERSION, PSBT_GLOBAL_XPUB, PSBT_IN_PARTIAL_SIG,
    PSBT_IN_PROPRIETARY, PSBT_IN_SEQUENCE, PSBT_OUT_PROPRIETARY,
};
use crate::prelude::*;
use crate::raw;
use crate::serialize::{Deserialize, Serialize};
use crate::version::Version;

#[rustfmt::skip]                // Keep public exports separate.
#[doc(inline)]
pub use self::{
    convert::{FromV0Error, ToV0Error},
    error::{
        AddInputError, AddOutputError, AddPartialSigError, DeleteInputError, DeleteOutputError,
        DeserializeError, GetError, IndexOutOfBoundsError, InputsNotModifiableError,
        NotReadyForConstructorError, NotReadyForSignerError, NotReadyForUpdaterError,
        OutputsNotModifiableError, ProprietaryValuesError, RemovePartialSigError,
        SetInputSequenceError, SetTxVersionError, ValidateError,
    },
    input::{InputBuilder, InputView},
    // The map level decode error stays behind the module path, use form `map::DecodeError`.
    map::{DuplicateKeyError, KeyMap},
    output::{OutputBuilder, OutputView},
};

/// The Inputs Modifiable Flag, set to 1 to indicate whether inputs can be added or removed.
const INPUTS_MODIFIABLE: u8 = 0x01 << 0;
/// The Outputs Modifiable Flag, set to 1 to indicate whether outputs can be added or removed.
const OUTPUTS_MODIFIABLE: u8 = 0x01 << 1;
/// The Has SIGHASH_SINGLE flag, set to 1 to indicate the transaction has a SIGHASH_SINGLE
/// signature whose input and output pairing must be preserved.
const HAS_SIGHASH_SINGLE: u8 = 0x01 << 2;

/// The SIGHASH_ANYONECANPAY bit of a signature's trailing sighash byte.
const SIGHASH_ANYONECANPAY: u8 = 0x80;
/// Sighash type SIGHASH_NONE, after masking off SIGHASH_ANYONECANPAY.
const SIGHASH_NONE: u8 = 0x02;
/// Sighash type SIGHASH_SINGLE, after masking off SIGHASH_ANYONECANPAY.
const SIGHASH_SINGLE: u8 = 0x03;

/// Identifies one of the maps of a PSBT.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub enum MapSelector {
    /// The global map.
    Global,
    /// The input map at this index.
    Input(usize),
    /// The output map at this index.
    Output(usize),
}

impl fmt::Display for MapSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use MapSelector::*;

        match *self {
            Global => f.write_str("global map"),
            Input(index) => write!(f, "input map {}", index),
            Output(index) => write!(f, "output map {}", index),
        }
    }
}

/// A Partially Signed Bitcoin Transaction, version 2.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub struct Psbt {
    /// The global key-value map.
    pub(crate) global: KeyMap,
    /// One key-value map per transaction input.
    pub(crate) inputs: Vec<KeyMap>,
    /// One key-value map per transaction output.
    pub(crate) outputs: Vec<KeyMap>,
}

impl Psbt {
    /// Creates an empty PSBT with the Creator role defaults.
    ///
    /// Sets PSBT version 2, transaction version 2, zero inputs and outputs, a
    /// fallback lock time of zero, and both structural modifiable flags.
    pub fn create() -> Self {
        let mut global = KeyMap::new();

        global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_TX_VERSION),
            value: transaction::Version::TWO.serialize(),
        });
        global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_FALLBACK_LOCKTIME),
            value: absolute::LockTime::ZERO.serialize(),
        });
        global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_INPUT_COUNT),
            value: VarInt::from(0_usize).serialize(),
        });
        global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_OUTPUT_COUNT),
            value: VarInt::from(0_usize).serialize(),
        });
        global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_TX_MODIFIABLE),
            value: vec![INPUTS_MODIFIABLE | OUTPUTS_MODIFIABLE],
        });
        global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_VERSION),
            value: Version::TWO.serialize(),
        });

        Psbt { global, inputs: Vec::new(), outputs: Vec::new() }
    }

    /// Serializes this PSBT to its binary wire form.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();

        buf.extend_from_slice(b"psbt");
        buf.push(0xff_u8);

        buf.extend(self.global.serialize_map());

        for input in &self.inputs {
            buf.extend(input.serialize_map());
        }

        for output in &self.outputs {
            buf.extend(output.serialize_map());
        }

        buf
    }

    /// Serializes this PSBT as a hex string.
    pub fn serialize_hex(&self) -> String { self.serialize().to_lower_hex_string() }

    /// Deserializes a PSBT from its binary wire form.
    ///
    /// Rejects PSBTs that carry the v0 unsigned transaction key or a
    /// transaction version below 2.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let psbt = Psbt::decode(bytes)?;
        psbt.validate(false)?;
        Ok(psbt)
    }

    /// Deserializes a PSBT from its binary wire form, accepting transaction version 1.
    ///
    /// Some deployed producers emit v2 PSBTs with transaction version 1 even
    /// though BIP-370 forbids it. This constructor accepts them, everything
    /// else is validated as for [`Psbt::deserialize`].
    pub fn deserialize_allow_tx_version_1(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let psbt = Psbt::decode(bytes)?;
        psbt.validate(true)?;
        Ok(psbt)
    }

    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError> {
        use DeserializeError::*;

        const MAGIC_BYTES: &[u8] = b"psbt";
        if bytes.get(0..MAGIC_BYTES.len()) != Some(MAGIC_BYTES) {
            return Err(InvalidMagic);
        }

        const PSBT_SEPARATOR: u8 = 0xff_u8;
        if bytes.get(MAGIC_BYTES.len()) != Some(&PSBT_SEPARATOR) {
            return Err(InvalidSeparator);
        }

        let mut d = &bytes[MAGIC_BYTES.len() + 1..];

        let global = KeyMap::decode(&mut d).map_err(Global)?;

        if global.get_singleton(PSBT_GLOBAL_UNSIGNED_TX).is_some() {
            return Err(UnsignedTx);
        }

        let input_count = match global.get_singleton(PSBT_GLOBAL_INPUT_COUNT) {
            Some(value) => {
                let count = VarInt::deserialize(value).map_err(Count)?.0;
                usize::try_from(count).map_err(|_| CountOverflow(count))?
            }
            None => return Err(MissingInputCount),
        };
        let output_count = match global.get_singleton(PSBT_GLOBAL_OUTPUT_COUNT) {
            Some(value) => {
                let count = VarInt::deserialize(value).map_err(Count)?.0;
                usize::try_from(count).map_err(|_| CountOverflow(count))?
            }
            None => return Err(MissingOutputCount),
        };

        let mut inputs: Vec<KeyMap> = Vec::with_capacity(input_count);
        for index in 0..input_count {
            inputs.push(KeyMap::decode(&mut d).map_err(|error| Input { index, error })?);
        }

        let mut outputs: Vec<KeyMap> = Vec::with_capacity(output_count);
        for index in 0..output_count {
            outputs.push(KeyMap::decode(&mut d).map_err(|error| Output { index, error })?);
        }

        Ok(Psbt { global, inputs, outputs })
    }

    /// Checks the structural requirements of the decoded maps.
    fn validate(&self, allow_tx_version_1: bool) -> Result<(), ValidateError> {
        use ValidateError::*;

        match self.global.get_singleton(PSBT_GLOBAL_VERSION) {
            None => warn!("PSBT version key is missing, treating the PSBT as version 2"),
            Some(value) =>
                if let Ok(version) = u32::deserialize(value) {
                    if version < Version::TWO.to_u32() {
                        return Err(WrongPsbtVersion(version));
                    }
                },
        }

        match self.global.get_singleton(PSBT_GLOBAL_TX_VERSION) {
            None => return Err(MissingTxVersion),
            Some(value) =>
                if let Ok(version) = transaction::Version::deserialize(value) {
                    let allowed = version.0 >= 2 || (allow_tx_version_1 && version.0 == 1);
                    if !allowed {
                        return Err(WrongTxVersion(version.0));
                    }
                    if version.0 == 1 {
                        warn!("accepting a PSBT with transaction version 1");
                    }
                },
        }

        for (input_index, input) in self.inputs().enumerate() {
            if input.previous_txid().is_err() {
                return Err(MissingPreviousTxid { input_index });
            }
            if input.output_index().is_err() {
                return Err(MissingOutputIndex { input_index });
            }
            // The typed lock time values enforce the 500000000 threshold.
            if input.min_time().is_err() {
                return Err(InvalidTimeLocktime { input_index });
            }
            if input.min_height().is_err() {
                return Err(InvalidHeightLocktime { input_index });
            }
        }

        for (output_index, output) in self.outputs().enumerate() {
            if output.amount().is_err() {
                return Err(MissingAmount { output_index });
            }
            if output.script_pubkey().is_err() {
                return Err(MissingScript { output_index });
            }
        }

        Ok(())
    }

    /// The PSBT version number.
    ///
    /// A missing or unreadable version key is treated as version 2 with a
    /// logged warning, some deployed producers omit the key.
    pub fn version(&self) -> Version {
        match self.global.get_singleton(PSBT_GLOBAL_VERSION) {
            Some(value) => Version::deserialize(value).unwrap_or_else(|_| {
                warn!("unreadable or unsupported PSBT version, treating it as version 2");
                Version::TWO
            }),
            None => {
                warn!("PSBT version key is missing, treating the PSBT as version 2");
                Version::TWO
            }
        }
    }

    /// The version of the transaction being built.
    pub fn tx_version(&self) -> Result<transaction::Version, GetError> {
        self.required_global(PSBT_GLOBAL_TX_VERSION)
    }

    /// The lock time to fall back to if no input requires one.
    pub fn fallback_lock_time(&self) -> Result<Option<absolute::LockTime>, GetError> {
        self.optional_global(PSBT_GLOBAL_FALLBACK_LOCKTIME)
    }

    /// Sets the version of the transaction being built.
    ///
    /// Versions below 2 violate BIP-370 and are rejected,
    /// [`Psbt::dangerously_set_tx_version_1`] is the explicit downgrade path.
    pub fn set_tx_version(
        &mut self,
        version: transaction::Version,
    ) -> Result<(), SetTxVersionError> {
        self.check_ready_for_constructor()?;
        if version.0 < 2 {
            return Err(SetTxVersionError::WrongTxVersion(version.0));
        }

        self.global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_TX_VERSION),
            value: version.serialize(),
        });

        Ok(())
    }

    /// Sets the lock time to fall back to, `None` removes it.
    pub fn set_fallback_lock_time(
        &mut self,
        lock_time: Option<absolute::LockTime>,
    ) -> Result<(), NotReadyForConstructorError> {
        self.check_ready_for_constructor()?;

        match lock_time {
            Some(lock_time) => self.global.set(raw::Pair {
                key: raw::Key::singleton(PSBT_GLOBAL_FALLBACK_LOCKTIME),
                value: lock_time.serialize(),
            }),
            None => {
                self.global.remove(&raw::Key::singleton(PSBT_GLOBAL_FALLBACK_LOCKTIME));
            }
        }

        Ok(())
    }

    /// The number of inputs in this PSBT.
    pub fn input_count(&self) -> usize { self.inputs.len() }

    /// The number of outputs in this PSBT.
    pub fn output_count(&self) -> usize { self.outputs.len() }

    /// The raw transaction modifiable flags bitfield.
    ///
    /// A missing key means no modification is allowed.
    pub fn tx_modifiable_flags(&self) -> u8 {
        self.global
            .get_singleton(PSBT_GLOBAL_TX_MODIFIABLE)
            .and_then(|value| value.first().copied())
            .unwrap_or(0)
    }

    /// Returns true if inputs may be added to or removed from this PSBT.
    pub fn is_inputs_modifiable(&self) -> bool {
        self.tx_modifiable_flags() & INPUTS_MODIFIABLE > 0
    }

    /// Returns true if outputs may be added to or removed from this PSBT.
    pub fn is_outputs_modifiable(&self) -> bool {
        self.tx_modifiable_flags() & OUTPUTS_MODIFIABLE > 0
    }

    /// Returns true if a SIGHASH_SINGLE signature ties inputs to outputs at
    /// the same index.
    pub fn has_sighash_single(&self) -> bool {
        self.tx_modifiable_flags() & HAS_SIGHASH_SINGLE > 0
    }

    pub(crate) fn set_inputs_modifiable_flag(&mut self) {
        self.set_modifiable_flags(self.tx_modifiable_flags() | INPUTS_MODIFIABLE);
    }

    pub(crate) fn set_outputs_modifiable_flag(&mut self) {
        self.set_modifiable_flags(self.tx_modifiable_flags() | OUTPUTS_MODIFIABLE);
    }

    pub(crate) fn set_sighash_single_flag(&mut self) {
        self.set_modifiable_flags(self.tx_modifiable_flags() | HAS_SIGHASH_SINGLE);
    }

    pub(crate) fn clear_inputs_modifiable_flag(&mut self) {
        self.set_modifiable_flags(self.tx_modifiable_flags() & !INPUTS_MODIFIABLE);
    }

    pub(crate) fn clear_outputs_modifiable_flag(&mut self) {
        self.set_modifiable_flags(self.tx_modifiable_flags() & !OUTPUTS_MODIFIABLE);
    }

    fn set_modifiable_flags(&mut self, flags: u8) {
        self.global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_TX_MODIFIABLE),
            value: vec![flags],
        });
    }

    /// The global xpubs with their key origin information.
    pub fn xpubs(&self) -> Result<Vec<(Xpub, KeySource)>, GetError> {
        self.global
            .pairs_of_type(PSBT_GLOBAL_XPUB)
            .map(|pair| {
                let xpub = Xpub::deserialize(&pair.key.key)?;
                let source = KeySource::deserialize(&pair.value)?;
                Ok((xpub, source))
            })
            .collect()
    }

    /// Adds a global xpub with its key origin.
    ///
    /// Replaces the origin if this xpub is already present.
    pub fn add_global_xpub(&mut self, xpub: Xpub, fingerprint: Fingerprint, path: DerivationPath) {
        let source: KeySource = (fingerprint, path);
        self.global.set(raw::Pair {
            key: raw::Key { type_value: PSBT_GLOBAL_XPUB, key: xpub.serialize() },
            value: Serialize::serialize(&source),
        });
    }

    /// A typed view of the input map at `index`.
    pub fn input(&self, index: usize) -> Option<InputView<'_>> {
        self.inputs.get(index).map(|map| InputView { map, index })
    }

    /// A typed view of the output map at `index`.
    pub fn output(&self, index: usize) -> Option<OutputView<'_>> {
        self.outputs.get(index).map(|map| OutputView { map, index })
    }

    /// Iterates typed views of the input maps.
    pub fn inputs(&self) -> impl Iterator<Item = InputView<'_>> {
        self.inputs.iter().enumerate().map(|(index, map)| InputView { map, index })
    }

    /// Iterates typed views of the output maps.
    pub fn outputs(&self) -> impl Iterator<Item = OutputView<'_>> {
        self.outputs.iter().enumerate().map(|(index, map)| OutputView { map, index })
    }

    /// Returns true if a Constructor may still act on this PSBT.
    ///
    /// True while inputs or outputs remain modifiable.
    pub fn is_ready_for_constructor(&self) -> bool {
        self.is_inputs_modifiable() || self.is_outputs_modifiable()
    }

    /// Returns true if an Updater may act on this PSBT.
    ///
    /// An Updater needs at least one input and the inputs modifiable flag.
    pub fn is_ready_for_updater(&self) -> bool {
        !self.inputs.is_empty() && self.is_inputs_modifiable()
    }

    /// Returns true if a Signer may act on this PSBT.
    ///
    /// A Signer needs at least one input and a PSBT that is not yet finalized.
    pub fn is_ready_for_signer(&self) -> bool { !self.inputs.is_empty() && !self.is_finalized() }

    /// Returns true if a Combiner may act on this PSBT.
    pub fn is_ready_for_combiner(&self) -> bool {
        self.is_ready_for_constructor() || self.is_ready_for_updater() || self.is_ready_for_signer()
    }

    /// Returns true if a Transaction Extractor may act on this PSBT.
    ///
    /// Extraction requires every input to be finalized, to still carry its
    /// funding utxo, and to have cleared the fields finalization supersedes
    /// (scripts, partial signatures, derivations, taproot fields, sighash
    /// type, sequence, and lock times).
    pub fn is_ready_for_transaction_extractor(&self) -> bool {
        self.is_finalized()
            && self
                .inputs()
                .all(|input| input.has_funding_utxo() && !input.has_non_finalization_fields())
    }

    /// Returns true if every input has been finalized.
    ///
    /// A PSBT with no inputs is not considered finalized.
    pub fn is_finalized(&self) -> bool {
        !self.inputs.is_empty() && self.inputs().all(|input| input.is_finalized())
    }

    /// Determines the lock time of the transaction being built, as described
    /// in BIP-370.
    ///
    /// If no input requires a lock time the fallback lock time is used,
    /// defaulting to zero. Otherwise the kind required by more inputs wins,
    /// height based locks winning ties, and the lock is the maximum of the
    /// winning kind.
    pub fn determine_lock_time(&self) -> Result<absolute::LockTime, GetError> {
        let mut heights: Vec<absolute::Height> = Vec::new();
        let mut times: Vec<absolute::Time> = Vec::new();

        for input in self.inputs() {
            if let Some(height) = input.min_height()? {
                heights.push(height);
            }
            if let Some(time) = input.min_time()? {
                times.push(time);
            }
        }

        if heights.is_empty() && times.is_empty() {
            return Ok(self.fallback_lock_time()?.unwrap_or(absolute::LockTime::ZERO));
        }

        let lock = if !heights.is_empty() && heights.len() >= times.len() {
            let height = heights.into_iter().max().expect("heights is non-empty");
            absolute::LockTime::from(height)
        } else {
            let time = times.into_iter().max().expect("times is non-empty");
            absolute::LockTime::from(time)
        };

        Ok(lock)
    }

    /// Returns true if any input signals opt-in replace-by-fee.
    ///
    /// An input signals RBF when its sequence number is set and below
    /// `0xfffffffe`.
    pub fn is_rbf_signaled(&self) -> Result<bool, GetError> {
        for input in self.inputs() {
            if input.sequence()?.map_or(false, |sequence| sequence.is_rbf()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Adds an input to the PSBT.
    ///
    /// The stored input count is re-derived so it always matches the number of
    /// input maps.
    pub fn add_input(&mut self, input: InputBuilder) -> Result<(), AddInputError> {
        self.check_ready_for_constructor()?;
        if !self.is_inputs_modifiable() {
            return Err(InputsNotModifiableError.into());
        }

        self.inputs.push(input.into_map());
        self.set_counts();

        Ok(())
    }

    /// Adds an output to the PSBT.
    ///
    /// The stored output count is re-derived so it always matches the number
    /// of output maps.
    pub fn add_output(&mut self, output: OutputBuilder) -> Result<(), AddOutputError> {
        self.check_ready_for_constructor()?;
        if !self.is_outputs_modifiable() {
            return Err(OutputsNotModifiableError.into());
        }

        self.outputs.push(output.into_map());
        self.set_counts();

        Ok(())
    }

    /// Deletes the input map at `index`.
    pub fn delete_input(&mut self, index: usize) -> Result<(), DeleteInputError> {
        self.check_ready_for_constructor()?;
        if !self.is_inputs_modifiable() {
            return Err(InputsNotModifiableError.into());
        }
        let length = self.inputs.len();
        if index >= length {
            return Err(IndexOutOfBoundsError::Inputs { index, length }.into());
        }

        self.inputs.remove(index);
        self.set_counts();

        Ok(())
    }

    /// Deletes the output map at `index`.
    ///
    /// When the has SIGHASH_SINGLE flag is set a signature ties each output to
    /// the input at the same index, so the paired input's partial signatures
    /// are removed along with the output.
    pub fn delete_output(&mut self, index: usize) -> Result<(), DeleteOutputError> {
        self.check_ready_for_constructor()?;
        if !self.is_outputs_modifiable() {
            return Err(OutputsNotModifiableError.into());
        }
        let length = self.outputs.len();
        if index >= length {
            return Err(IndexOutOfBoundsError::Outputs { index, length }.into());
        }

        if self.has_sighash_single() {
            // The paired input's signature no longer matches any output.
            if let Some(input) = self.inputs.get_mut(index) {
                input.remove_type(PSBT_IN_PARTIAL_SIG);
            }
        }

        self.outputs.remove(index);
        self.set_counts();

        Ok(())
    }

    /// Sets the sequence number of the input at `index`.
    pub fn set_input_sequence(
        &mut self,
        index: usize,
        sequence: Sequence,
    ) -> Result<(), SetInputSequenceError> {
        if !self.is_ready_for_updater() {
            return Err(NotReadyForUpdaterError.into());
        }
        let length = self.inputs.len();
        let map = self
            .inputs
            .get_mut(index)
            .ok_or(IndexOutOfBoundsError::Inputs { index, length })?;

        map.set(raw::Pair {
            key: raw::Key::singleton(PSBT_IN_SEQUENCE),
            value: sequence.serialize(),
        });

        Ok(())
    }

    /// Adds a partial signature for `pubkey` on the input at `index`.
    ///
    /// `sig` is the DER encoded ECDSA signature with its trailing sighash
    /// byte. After the write the modifiable flags narrow according to that
    /// byte: a signature without SIGHASH_ANYONECANPAY clears the inputs
    /// modifiable flag, a type other than SIGHASH_NONE clears the outputs
    /// modifiable flag, and SIGHASH_SINGLE sets the has SIGHASH_SINGLE flag.
    ///
    /// All checks run before the write, a rejected signature leaves the PSBT
    /// untouched.
    pub fn add_partial_sig(
        &mut self,
        index: usize,
        pubkey: PublicKey,
        sig: &[u8],
    ) -> Result<(), AddPartialSigError> {
        if !self.is_ready_for_signer() {
            return Err(NotReadyForSignerError.into());
        }
        let length = self.inputs.len();
        if index >= length {
            return Err(IndexOutOfBoundsError::Inputs { index, length }.into());
        }
        let sighash = *sig.last().ok_or(AddPartialSigError::EmptySignature)?;

        let key = raw::Key { type_value: PSBT_IN_PARTIAL_SIG, key: pubkey.serialize() };
        self.inputs[index]
            .insert(raw::Pair { key, value: sig.to_vec() })
            .map_err(|_| AddPartialSigError::DuplicateSignature(pubkey))?;

        self.narrow_modifiable_flags(sighash);

        Ok(())
    }

    /// Removes the partial signature for `pubkey` from the input at `index`.
    pub fn remove_partial_sig(
        &mut self,
        index: usize,
        pubkey: &PublicKey,
    ) -> Result<(), RemovePartialSigError> {
        let length = self.inputs.len();
        let map = self
            .inputs
            .get_mut(index)
            .ok_or(IndexOutOfBoundsError::Inputs { index, length })?;

        let key = raw::Key { type_value: PSBT_IN_PARTIAL_SIG, key: pubkey.serialize() };
        match map.remove(&key) {
            Some(_) => Ok(()),
            None => Err(RemovePartialSigError::MissingSignature(*pubkey)),
        }
    }

    /// Removes every partial signature from the input at `index`, returning
    /// how many were removed.
    pub fn remove_partial_sigs(&mut self, index: usize) -> Result<usize, IndexOutOfBoundsError> {
        let length = self.inputs.len();
        let map = self
            .inputs
            .get_mut(index)
            .ok_or(IndexOutOfBoundsError::Inputs { index, length })?;

        Ok(map.remove_type(PSBT_IN_PARTIAL_SIG))
    }

    /// Forces the transaction version to 1.
    ///
    /// A v2 PSBT with transaction version 1 violates BIP-370 and no guarantee
    /// can be made that outside consumers will accept it. This exists for
    /// compatibility with deployed producers and logs a warning on every call.
    pub fn dangerously_set_tx_version_1(&mut self) -> Result<(), NotReadyForConstructorError> {
        self.check_ready_for_constructor()?;

        warn!("dangerously setting the global transaction version to 1");
        self.global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_TX_VERSION),
            value: transaction::Version::ONE.serialize(),
        });

        Ok(())
    }

    /// Writes a proprietary key-value pair to the selected map.
    ///
    /// Replaces the value if the key is already present.
    pub fn set_proprietary_value(
        &mut self,
        selector: MapSelector,
        key: raw::ProprietaryKey,
        value: Vec<u8>,
    ) -> Result<(), IndexOutOfBoundsError> {
        let map = self.select_map_mut(selector)?;
        map.set(raw::Pair { key: key.to_key(), value });
        Ok(())
    }

    /// The proprietary key-value pairs of the selected map.
    pub fn proprietary_values(
        &self,
        selector: MapSelector,
    ) -> Result<Vec<(raw::ProprietaryKey, Vec<u8>)>, ProprietaryValuesError> {
        let map = self.select_map(selector)?;
        let proprietary_type = match selector {
            MapSelector::Global => PSBT_GLOBAL_PROPRIETARY,
            MapSelector::Input(_) => PSBT_IN_PROPRIETARY,
            MapSelector::Output(_) => PSBT_OUT_PROPRIETARY,
        };

        map.pairs_of_type(proprietary_type)
            .map(|pair| {
                let key = raw::ProprietaryKey::try_from(pair.key.clone())
                    .map_err(ProprietaryValuesError::Key)?;
                Ok((key, pair.value.clone()))
            })
            .collect()
    }

    fn required_global<T: Deserialize>(&self, type_value: u8) -> Result<T, GetError> {
        match self.global.get_singleton(type_value) {
            Some(value) => Ok(T::deserialize(value)?),
            None => Err(GetError::MissingKey { map: MapSelector::Global, type_value }),
        }
    }

    fn optional_global<T: Deserialize>(&self, type_value: u8) -> Result<Option<T>, GetError> {
        match self.global.get_singleton(type_value) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    fn check_ready_for_constructor(&self) -> Result<(), NotReadyForConstructorError> {
        if self.is_ready_for_constructor() {
            Ok(())
        } else {
            Err(NotReadyForConstructorError)
        }
    }

    /// Narrows the modifiable flags after a signature commits to parts of the
    /// transaction, as described by the BIP-370 Signer role.
    fn narrow_modifiable_flags(&mut self, sighash: u8) {
        let mut flags = self.tx_modifiable_flags();
        let mut ty = sighash;

        if ty & SIGHASH_ANYONECANPAY == 0 {
            flags &= !INPUTS_MODIFIABLE;
        } else {
            ty ^= SIGHASH_ANYONECANPAY;
        }

        // Bit tests alone cannot tell the types apart, SIGHASH_SINGLE is a 3.
        if ty != SIGHASH_NONE {
            flags &= !OUTPUTS_MODIFIABLE;
        }
        if ty == SIGHASH_SINGLE {
            flags |= HAS_SIGHASH_SINGLE;
        }

        self.set_modifiable_flags(flags);
    }

    fn set_counts(&mut self) {
        self.global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_INPUT_COUNT),
            value: VarInt::from(self.inputs.len()).serialize(),
        });
        self.global.set(raw::Pair {
            key: raw::Key::singleton(PSBT_GLOBAL_OUTPUT_COUNT),
            value: VarInt::from(self.outputs.len()).serialize(),
        });
    }

    fn select_map(&self, selector: MapSelector) -> Result<&KeyMap, IndexOutOfBoundsError> {
        match selector {
            MapSelector::Global => Ok(&self.global),
            MapSelector::Input(index) => {
                let length = self.inputs.len();
                self.inputs.get(index).ok_or(IndexOutOfBoundsError::Inputs { index, length })
            }
            MapSelector::Output(index) => {
                let length = self.outputs.len();
                self.outputs.get(index).ok_or(IndexOutOfBoundsError::Outputs { index, length })
            }
        }
    }

    fn select_map_mut(
        &mut self,
        selector: MapSelector,
    ) -> Result<&mut KeyMap, IndexOutOfBoundsError> {
        match selector {
            MapSelector::Global => Ok(&mut self.global),
            MapSelector::Input(index) => {
                let length = self.inputs.len();
                self.inputs.get_mut(index).ok_or(IndexOutOfBoundsError::Inputs { index, length })
            }
            MapSelector::Output(index) => {
                let length = self.outputs.len();
                self.outputs.get_mut(index).ok_or(IndexOutOfBoundsError::Outputs { index, length })
            }
        }
    }
}
