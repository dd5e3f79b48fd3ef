// SPDX-License-Identifier: CC0-1.0

//! PSBT v2 errors.
//!
//! One enum per fallible operation so callers can tell "this PSBT is invalid"
//! apart from "this mutation is illegal at the current lifecycle point".

use core::fmt;

use bitcoin::PublicKey;

use crate::consts;
use crate::error::write_err;
use crate::serialize;
use crate::v2::map;
use crate::v2::MapSelector;

/// Error returned by the typed accessors when a key is missing or its value
/// bytes do not decode.
#[derive(Debug)]
#[non_exhaustive]
pub enum GetError {
    /// A key the accessor requires is not present.
    MissingKey {
        /// The map the key was expected in.
        map: MapSelector,
        /// The keytype of the missing key.
        type_value: u8,
    },
    /// The value bytes failed to deserialize.
    Value(serialize::Error),
}

impl fmt::Display for GetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use GetError::*;

        match *self {
            MissingKey { ref map, type_value } => {
                let name = match map {
                    MapSelector::Global => consts::psbt_global_key_type_value_to_str(type_value),
                    MapSelector::Input(_) => consts::psbt_in_key_type_value_to_str(type_value),
                    MapSelector::Output(_) => consts::psbt_out_key_type_value_to_str(type_value),
                };
                write!(f, "required key {} is missing from the {}", name, map)
            }
            Value(ref e) => write_err!(f, "error deserializing value"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use GetError::*;

        match *self {
            MissingKey { .. } => None,
            Value(ref e) => Some(e),
        }
    }
}

impl From<serialize::Error> for GetError {
    fn from(e: serialize::Error) -> Self { GetError::Value(e) }
}

/// Input or output index out of bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IndexOutOfBoundsError {
    /// The index is out of bounds for the input maps.
    Inputs {
        /// Attempted index access.
        index: usize,
        /// Number of input maps.
        length: usize,
    },
    /// The index is out of bounds for the output maps.
    Outputs {
        /// Attempted index access.
        index: usize,
        /// Number of output maps.
        length: usize,
    },
}

impl fmt::Display for IndexOutOfBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use IndexOutOfBoundsError::*;

        match *self {
            Inputs { index, length } =>
                write!(f, "index {} is out-of-bounds for {} input maps", index, length),
            Outputs { index, length } =>
                write!(f, "index {} is out-of-bounds for {} output maps", index, length),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for IndexOutOfBoundsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { None }
}

/// Error when a Constructor operation is attempted on a PSBT that no longer
/// accepts structural changes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct NotReadyForConstructorError;

impl fmt::Display for NotReadyForConstructorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PSBT is not ready for a Constructor, inputs and outputs are both frozen")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for NotReadyForConstructorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { None }
}

/// Error when an Updater operation is attempted too early or too late.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct NotReadyForUpdaterError;

impl fmt::Display for NotReadyForUpdaterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PSBT is not ready for an Updater, it needs an input that is still modifiable")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for NotReadyForUpdaterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { None }
}

/// Error when a Signer operation is attempted on a PSBT with no inputs or with
/// every input already finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct NotReadyForSignerError;

impl fmt::Display for NotReadyForSignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PSBT is not ready for a Signer, it needs at least one non-finalized input")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for NotReadyForSignerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { None }
}

/// Error when adding an input to a PSBT with inputs not modifiable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct InputsNotModifiableError;

impl fmt::Display for InputsNotModifiableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PSBT does not have the inputs modifiable flag set")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InputsNotModifiableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { None }
}

/// Error when adding an output to a PSBT with outputs not modifiable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct OutputsNotModifiableError;

impl fmt::Display for OutputsNotModifiableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PSBT does not have the outputs modifiable flag set")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OutputsNotModifiableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { None }
}

/// Error adding an input to the PSBT.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AddInputError {
    /// The PSBT is past the Constructor stage.
    NotReady(NotReadyForConstructorError),
    /// The inputs modifiable flag is not set.
    NotModifiable(InputsNotModifiableError),
}

impl fmt::Display for AddInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AddInputError::*;

        match *self {
            NotReady(ref e) => write_err!(f, "add input"; e),
            NotModifiable(ref e) => write_err!(f, "add input"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AddInputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use AddInputError::*;

        match *self {
            NotReady(ref e) => Some(e),
            NotModifiable(ref e) => Some(e),
        }
    }
}

impl From<NotReadyForConstructorError> for AddInputError {
    fn from(e: NotReadyForConstructorError) -> Self { Self::NotReady(e) }
}

impl From<InputsNotModifiableError> for AddInputError {
    fn from(e: InputsNotModifiableError) -> Self { Self::NotModifiable(e) }
}

/// Error adding an output to the PSBT.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AddOutputError {
    /// The PSBT is past the Constructor stage.
    NotReady(NotReadyForConstructorError),
    /// The outputs modifiable flag is not set.
    NotModifiable(OutputsNotModifiableError),
}

impl fmt::Display for AddOutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AddOutputError::*;

        match *self {
            NotReady(ref e) => write_err!(f, "add output"; e),
            NotModifiable(ref e) => write_err!(f, "add output"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AddOutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use AddOutputError::*;

        match *self {
            NotReady(ref e) => Some(e),
            NotModifiable(ref e) => Some(e),
        }
    }
}

impl From<NotReadyForConstructorError> for AddOutputError {
    fn from(e: NotReadyForConstructorError) -> Self { Self::NotReady(e) }
}

impl From<OutputsNotModifiableError> for AddOutputError {
    fn from(e: OutputsNotModifiableError) -> Self { Self::NotModifiable(e) }
}

/// Error deleting an input from the PSBT.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeleteInputError {
    /// The PSBT is past the Constructor stage.
    NotReady(NotReadyForConstructorError),
    /// The inputs modifiable flag is not set.
    NotModifiable(InputsNotModifiableError),
    /// Input index out of bounds.
    IndexOutOfBounds(IndexOutOfBoundsError),
}

impl fmt::Display for DeleteInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DeleteInputError::*;

        match *self {
            NotReady(ref e) => write_err!(f, "delete input"; e),
            NotModifiable(ref e) => write_err!(f, "delete input"; e),
            IndexOutOfBounds(ref e) => write_err!(f, "delete input"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DeleteInputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use DeleteInputError::*;

        match *self {
            NotReady(ref e) => Some(e),
            NotModifiable(ref e) => Some(e),
            IndexOutOfBounds(ref e) => Some(e),
        }
    }
}

impl From<NotReadyForConstructorError> for DeleteInputError {
    fn from(e: NotReadyForConstructorError) -> Self { Self::NotReady(e) }
}

impl From<InputsNotModifiableError> for DeleteInputError {
    fn from(e: InputsNotModifiableError) -> Self { Self::NotModifiable(e) }
}

impl From<IndexOutOfBoundsError> for DeleteInputError {
    fn from(e: IndexOutOfBoundsError) -> Self { Self::IndexOutOfBounds(e) }
}

/// Error deleting an output from the PSBT.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeleteOutputError {
    /// The PSBT is past the Constructor stage.
    NotReady(NotReadyForConstructorError),
    /// The outputs modifiable flag is not set.
    NotModifiable(OutputsNotModifiableError),
    /// Output index out of bounds.
    IndexOutOfBounds(IndexOutOfBoundsError),
}

impl fmt::Display for DeleteOutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DeleteOutputError::*;

        match *self {
            NotReady(ref e) => write_err!(f, "delete output"; e),
            NotModifiable(ref e) => write_err!(f, "delete output"; e),
            IndexOutOfBounds(ref e) => write_err!(f, "delete output"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DeleteOutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use DeleteOutputError::*;

        match *self {
            NotReady(ref e) => Some(e),
            NotModifiable(ref e) => Some(e),
            IndexOutOfBounds(ref e) => Some(e),
        }
    }
}

impl From<NotReadyForConstructorError> for DeleteOutputError {
    fn from(e: NotReadyForConstructorError) -> Self { Self::NotReady(e) }
}

impl From<OutputsNotModifiableError> for DeleteOutputError {
    fn from(e: OutputsNotModifiableError) -> Self { Self::NotModifiable(e) }
}

impl From<IndexOutOfBoundsError> for DeleteOutputError {
    fn from(e: IndexOutOfBoundsError) -> Self { Self::IndexOutOfBounds(e) }
}

/// Error setting the global transaction version.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SetTxVersionError {
    /// The PSBT is not at the Constructor stage.
    NotReady(NotReadyForConstructorError),
    /// Transaction versions below 2 violate BIP-370.
    WrongTxVersion(i32),
}

impl fmt::Display for SetTxVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SetTxVersionError::*;

        match *self {
            NotReady(ref e) => write_err!(f, "set transaction version"; e),
            WrongTxVersion(v) => {
                write!(f, "transaction version must be at least 2, found: {}", v)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SetTxVersionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use SetTxVersionError::*;

        match *self {
            NotReady(ref e) => Some(e),
            WrongTxVersion(_) => None,
        }
    }
}

impl From<NotReadyForConstructorError> for SetTxVersionError {
    fn from(e: NotReadyForConstructorError) -> Self { Self::NotReady(e) }
}

/// Error setting the sequence number on an input.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SetInputSequenceError {
    /// The PSBT is not at the Updater stage.
    NotReady(NotReadyForUpdaterError),
    /// Input index out of bounds.
    IndexOutOfBounds(IndexOutOfBoundsError),
}

impl fmt::Display for SetInputSequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SetInputSequenceError::*;

        match *self {
            NotReady(ref e) => write_err!(f, "set input sequence"; e),
            IndexOutOfBounds(ref e) => write_err!(f, "set input sequence"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SetInputSequenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use SetInputSequenceError::*;

        match *self {
            NotReady(ref e) => Some(e),
            IndexOutOfBounds(ref e) => Some(e),
        }
    }
}

impl From<NotReadyForUpdaterError> for SetInputSequenceError {
    fn from(e: NotReadyForUpdaterError) -> Self { Self::NotReady(e) }
}

impl From<IndexOutOfBoundsError> for SetInputSequenceError {
    fn from(e: IndexOutOfBoundsError) -> Self { Self::IndexOutOfBounds(e) }
}

/// Error adding a partial signature to an input.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AddPartialSigError {
    /// The PSBT is not at the Signer stage.
    NotReady(NotReadyForSignerError),
    /// Input index out of bounds.
    IndexOutOfBounds(IndexOutOfBoundsError),
    /// A signature for this public key is already present on the input.
    DuplicateSignature(PublicKey),
    /// The signature is empty so it carries no trailing sighash byte.
    EmptySignature,
}

impl fmt::Display for AddPartialSigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AddPartialSigError::*;

        match *self {
            NotReady(ref e) => write_err!(f, "add partial signature"; e),
            IndexOutOfBounds(ref e) => write_err!(f, "add partial signature"; e),
            DuplicateSignature(ref pubkey) =>
                write!(f, "input already has a signature for pubkey {}", pubkey),
            EmptySignature => f.write_str("signature is empty"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AddPartialSigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use AddPartialSigError::*;

        match *self {
            NotReady(ref e) => Some(e),
            IndexOutOfBounds(ref e) => Some(e),
            DuplicateSignature(_) | EmptySignature => None,
        }
    }
}

impl From<NotReadyForSignerError> for AddPartialSigError {
    fn from(e: NotReadyForSignerError) -> Self { Self::NotReady(e) }
}

impl From<IndexOutOfBoundsError> for AddPartialSigError {
    fn from(e: IndexOutOfBoundsError) -> Self { Self::IndexOutOfBounds(e) }
}

/// Error removing a partial signature from an input.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RemovePartialSigError {
    /// Input index out of bounds.
    IndexOutOfBounds(IndexOutOfBoundsError),
    /// No signature for this public key on the input.
    MissingSignature(PublicKey),
}

impl fmt::Display for RemovePartialSigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RemovePartialSigError::*;

        match *self {
            IndexOutOfBounds(ref e) => write_err!(f, "remove partial signature"; e),
            MissingSignature(ref pubkey) =>
                write!(f, "input has no signature for pubkey {}", pubkey),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RemovePartialSigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use RemovePartialSigError::*;

        match *self {
            IndexOutOfBounds(ref e) => Some(e),
            MissingSignature(_) => None,
        }
    }
}

impl From<IndexOutOfBoundsError> for RemovePartialSigError {
    fn from(e: IndexOutOfBoundsError) -> Self { Self::IndexOutOfBounds(e) }
}

/// Error deserializing a PSBT from its binary wire form.
#[derive(Debug)]
#[non_exhaustive]
pub enum DeserializeError {
    /// Serialized data does not start with the PSBT magic bytes.
    InvalidMagic,
    /// Magic bytes are not followed by the `0xff` separator.
    InvalidSeparator,
    /// PSBT v2 requires exclusion of the v0 unsigned transaction key.
    UnsignedTx,
    /// Serialized PSBT is missing the input count.
    MissingInputCount,
    /// Serialized PSBT is missing the output count.
    MissingOutputCount,
    /// Error decoding an input or output count.
    Count(serialize::Error),
    /// Input or output count does not fit in a usize.
    CountOverflow(u64),
    /// Error decoding the global map.
    Global(map::DecodeError),
    /// Error decoding an input map.
    Input {
        /// Index of the input map that failed to decode.
        index: usize,
        /// The decode error.
        error: map::DecodeError,
    },
    /// Error decoding an output map.
    Output {
        /// Index of the output map that failed to decode.
        index: usize,
        /// The decode error.
        error: map::DecodeError,
    },
    /// Decoded PSBT violates a BIP-370 requirement.
    Validate(ValidateError),
}

impl fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DeserializeError::*;

        match *self {
            InvalidMagic => f.write_str("serialized data does not start with the PSBT magic bytes"),
            InvalidSeparator => {
                f.write_str("PSBT magic bytes are not followed by the 0xff separator")
            }
            UnsignedTx => f.write_str("PSBT v2 requires exclusion of the unsigned transaction"),
            MissingInputCount => f.write_str("serialized PSBT is missing the input count"),
            MissingOutputCount => f.write_str("serialized PSBT is missing the output count"),
            Count(ref e) => write_err!(f, "error decoding an input or output count"; e),
            CountOverflow(count) =>
                write!(f, "count {} overflows word size for current architecture", count),
            Global(ref e) => write_err!(f, "error decoding the global map"; e),
            Input { index, ref error } =>
                write_err!(f, "error decoding input map {}", index; error),
            Output { index, ref error } =>
                write_err!(f, "error decoding output map {}", index; error),
            Validate(ref e) => write_err!(f, "decoded PSBT is not valid"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DeserializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use DeserializeError::*;

        match *self {
            Count(ref e) => Some(e),
            Global(ref e) => Some(e),
            Input { ref error, .. } => Some(error),
            Output { ref error, .. } => Some(error),
            Validate(ref e) => Some(e),
            InvalidMagic | InvalidSeparator | UnsignedTx | MissingInputCount
            | MissingOutputCount | CountOverflow(_) => None,
        }
    }
}

impl From<ValidateError> for DeserializeError {
    fn from(e: ValidateError) -> Self { Self::Validate(e) }
}

/// A decoded PSBT violates a BIP-370 requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidateError {
    /// The global version key holds a version below 2.
    WrongPsbtVersion(u32),
    /// The global transaction version key is missing.
    MissingTxVersion,
    /// The transaction version is below 2 (and not the explicitly allowed 1).
    WrongTxVersion(i32),
    /// An input map is missing the previous txid.
    MissingPreviousTxid {
        /// Index of the offending input.
        input_index: usize,
    },
    /// An input map is missing the output index of its previous output.
    MissingOutputIndex {
        /// Index of the offending input.
        input_index: usize,
    },
    /// An output map is missing the amount.
    MissingAmount {
        /// Index of the offending output.
        output_index: usize,
    },
    /// An output map is missing the script.
    MissingScript {
        /// Index of the offending output.
        output_index: usize,
    },
    /// A required time lock time is below the 500000000 threshold (or undecodable).
    InvalidTimeLocktime {
        /// Index of the offending input.
        input_index: usize,
    },
    /// A required height lock time is at or above the 500000000 threshold (or undecodable).
    InvalidHeightLocktime {
        /// Index of the offending input.
        input_index: usize,
    },
}

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ValidateError::*;

        match *self {
            WrongPsbtVersion(v) => write!(f, "PSBT version must be at least 2, found: {}", v),
            MissingTxVersion => f.write_str("PSBT is missing the global transaction version"),
            WrongTxVersion(v) => write!(f, "transaction version must be at least 2, found: {}", v),
            MissingPreviousTxid { input_index } =>
                write!(f, "input {} is missing the previous txid", input_index),
            MissingOutputIndex { input_index } =>
                write!(f, "input {} is missing the spent output index", input_index),
            MissingAmount { output_index } =>
                write!(f, "output {} is missing the amount", output_index),
            MissingScript { output_index } =>
                write!(f, "output {} is missing the script", output_index),
            InvalidTimeLocktime { input_index } =>
                write!(f, "input {} required time lock time is invalid", input_index),
            InvalidHeightLocktime { input_index } =>
                write!(f, "input {} required height lock time is invalid", input_index),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ValidateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { None }
}

/// Error reading the proprietary pairs of a map.
#[derive(Debug)]
#[non_exhaustive]
pub enum ProprietaryValuesError {
    /// The selector index is out of bounds.
    IndexOutOfBounds(IndexOutOfBoundsError),
    /// A proprietary key failed to parse.
    Key(serialize::Error),
}

impl fmt::Display for ProprietaryValuesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ProprietaryValuesError::*;

        match *self {
            IndexOutOfBounds(ref e) => write_err!(f, "proprietary values"; e),
            Key(ref e) => write_err!(f, "error parsing a proprietary key"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProprietaryValuesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use ProprietaryValuesError::*;

        match *self {
            IndexOutOfBounds(ref e) => Some(e),
            Key(ref e) => Some(e),
        }
    }
}

impl From<IndexOutOfBoundsError> for ProprietaryValuesError {
    fn from(e: IndexOutOfBoundsError) -> Self { Self::IndexOutOfBounds(e) }
}

