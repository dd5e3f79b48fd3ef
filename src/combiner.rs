// SPDX-License-Identifier: CC0-1.0

//! Cross-version helpers for the Combiner role.
//!
//! Multi-party signing flows hand PSBTs around between wallets and hardware
//! devices that disagree about which PSBT version to speak. The helpers here
//! work on raw serialized PSBTs so a coordinator can detect the version of
//! whatever a signer returned, normalize it, merge the signatures, and check
//! the result against the original funding transaction.
//!
//! Combining goes through the v0 format: every party's PSBT describes the same
//! transaction, so the v0 Combiner of [`bitcoin::Psbt`] does the merging and
//! the result is converted back to the requested version.

use core::fmt;

use bitcoin::psbt as v0;
use bitcoin::PublicKey;
use log::debug;

use crate::consts::PSBT_GLOBAL_VERSION;
use crate::error::write_err;
use crate::prelude::*;
use crate::serialize::{self, Deserialize};
use crate::v2::{map, DeserializeError, FromV0Error, KeyMap, Psbt, ToV0Error};
use crate::version::Version;

/// Reads the version number a serialized PSBT declares for itself.
///
/// Only the global map is decoded. A PSBT without the version key is a v0
/// PSBT, so absence maps to `0`.
pub fn version_number(bytes: &[u8]) -> Result<u32, VersionDetectError> {
    const MAGIC_BYTES: &[u8] = b"psbt";
    if bytes.get(0..MAGIC_BYTES.len()) != Some(MAGIC_BYTES) {
        return Err(VersionDetectError::InvalidMagic);
    }
    if bytes.get(MAGIC_BYTES.len()) != Some(&0xff_u8) {
        return Err(VersionDetectError::InvalidSeparator);
    }

    let mut d = &bytes[MAGIC_BYTES.len() + 1..];
    let global = KeyMap::decode(&mut d).map_err(VersionDetectError::Global)?;

    match global.get_singleton(PSBT_GLOBAL_VERSION) {
        Some(value) => u32::deserialize(value).map_err(VersionDetectError::Version),
        None => Ok(0),
    }
}

/// Detects which version this crate should treat a serialized PSBT as.
///
/// Lenient by intent: anything that does not positively identify itself as v2
/// (including blobs that do not parse at all) is treated as v0 and will fail
/// later with a v0 parse error if it is garbage.
pub fn detect_version(bytes: &[u8]) -> Version {
    match version_number(bytes) {
        Ok(2) => Version::TWO,
        Ok(_) => Version::ZERO,
        Err(e) => {
            debug!("could not detect a PSBT version, assuming v0: {}", e);
            Version::ZERO
        }
    }
}

/// Re-serializes a PSBT as `target`, converting formats if necessary.
///
/// A PSBT already at the target version is returned as-is. Conversion is
/// lenient about transaction version 1 in both directions, deployed signers
/// still emit it.
pub fn convert_to_version(bytes: &[u8], target: Version) -> Result<Vec<u8>, ConvertError> {
    if detect_version(bytes) == target {
        return Ok(bytes.to_vec());
    }

    if target == Version::ZERO {
        let psbt =
            Psbt::deserialize_allow_tx_version_1(bytes).map_err(ConvertError::Deserialize)?;
        let legacy = psbt.to_v0().map_err(ConvertError::ToV0)?;
        Ok(legacy.serialize())
    } else {
        let legacy = v0::Psbt::deserialize(bytes).map_err(ConvertError::Psbt)?;
        let psbt = Psbt::from_v0(&legacy, true).map_err(ConvertError::FromV0)?;
        Ok(psbt.serialize())
    }
}

/// Signature tallies over a whole PSBT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignatureInfo {
    /// Number of distinct pubkeys that have signed at least one input.
    pub signer_count: usize,
    /// Number of partial signatures across all inputs.
    pub total_signatures: usize,
}

/// Counts partial signatures and distinct signers on a serialized PSBT.
///
/// A blob that cannot be read as either version counts as unsigned.
pub fn count_signatures(bytes: &[u8]) -> SignatureInfo {
    match to_legacy(bytes) {
        Ok(legacy) => tally_signatures(&legacy),
        Err(e) => {
            debug!("could not count signatures, reporting zero: {}", e);
            SignatureInfo::default()
        }
    }
}

fn tally_signatures(legacy: &v0::Psbt) -> SignatureInfo {
    let mut signers: BTreeSet<PublicKey> = BTreeSet::new();
    let mut total_signatures = 0;

    for input in &legacy.inputs {
        total_signatures += input.partial_sigs.len();
        signers.extend(input.partial_sigs.keys().copied());
    }

    SignatureInfo { signer_count: signers.len(), total_signatures }
}

fn to_legacy(bytes: &[u8]) -> Result<v0::Psbt, ConvertError> {
    let blob = convert_to_version(bytes, Version::ZERO)?;
    v0::Psbt::deserialize(&blob).map_err(ConvertError::Psbt)
}

/// The output of [`combine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombineResult {
    /// The combined PSBT, serialized at `output_version`.
    pub combined: Vec<u8>,
    /// The version the combined PSBT was serialized as.
    pub output_version: Version,
    /// Signature tallies of the combined PSBT.
    pub signatures: SignatureInfo,
}

/// Combines the signatures of many serialized PSBTs for the same transaction.
///
/// The PSBTs may be a mix of v0 and v2. The output version defaults to the
/// detected version of the first PSBT. A single PSBT is converted only, more
/// than one are merged pairwise through the v0 Combiner.
pub fn combine(psbts: &[Vec<u8>], target: Option<Version>) -> Result<CombineResult, CombineError> {
    let (first, rest) = psbts.split_first().ok_or(CombineError::Empty)?;
    let output_version = target.unwrap_or_else(|| detect_version(first));

    if rest.is_empty() {
        let combined = convert_to_version(first, output_version)?;
        let signatures = count_signatures(&combined);
        return Ok(CombineResult { combined, output_version, signatures });
    }

    let mut merged = to_legacy(first)?;
    for bytes in rest {
        merged.combine(to_legacy(bytes)?).map_err(CombineError::Combine)?;
    }

    let combined = convert_to_version(&merged.serialize(), output_version)?;
    let signatures = count_signatures(&combined);
    Ok(CombineResult { combined, output_version, signatures })
}

/// The output of [`validate_signed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedPsbtCheck {
    /// Number of partial signatures across all inputs.
    pub total_signatures: usize,
    /// Number of partial signatures on each input.
    pub signatures_per_input: Vec<usize>,
}

/// Checks a PSBT returned by a signer against the unsigned original.
///
/// Both are normalized to v0, then the signed PSBT must fund the same
/// transaction: the same outpoints in the same order, and the same output
/// scripts and amounts. On success the signature tallies are reported.
pub fn validate_signed(
    signed: &[u8],
    unsigned: &[u8],
) -> Result<SignedPsbtCheck, SignedPsbtError> {
    let signed = to_legacy(signed)?;
    let unsigned = to_legacy(unsigned)?;

    let signed_inputs = signed.unsigned_tx.input.len();
    let unsigned_inputs = unsigned.unsigned_tx.input.len();
    if signed_inputs != unsigned_inputs {
        return Err(SignedPsbtError::InputCountMismatch {
            signed: signed_inputs,
            unsigned: unsigned_inputs,
        });
    }

    let signed_outputs = signed.unsigned_tx.output.len();
    let unsigned_outputs = unsigned.unsigned_tx.output.len();
    if signed_outputs != unsigned_outputs {
        return Err(SignedPsbtError::OutputCountMismatch {
            signed: signed_outputs,
            unsigned: unsigned_outputs,
        });
    }

    let input_pairs = signed.unsigned_tx.input.iter().zip(unsigned.unsigned_tx.input.iter());
    for (index, (signed_in, unsigned_in)) in input_pairs.enumerate() {
        if signed_in.previous_output != unsigned_in.previous_output {
            return Err(SignedPsbtError::InputOutpointMismatch { index });
        }
    }

    let output_pairs = signed.unsigned_tx.output.iter().zip(unsigned.unsigned_tx.output.iter());
    for (index, (signed_out, unsigned_out)) in output_pairs.enumerate() {
        if signed_out.script_pubkey != unsigned_out.script_pubkey {
            return Err(SignedPsbtError::OutputScriptMismatch { index });
        }
        if signed_out.value != unsigned_out.value {
            return Err(SignedPsbtError::OutputAmountMismatch { index });
        }
    }

    let signatures_per_input: Vec<usize> =
        signed.inputs.iter().map(|input| input.partial_sigs.len()).collect();
    let total_signatures = signatures_per_input.iter().sum();

    Ok(SignedPsbtCheck { total_signatures, signatures_per_input })
}

/// Error reading the declared version of a serialized PSBT.
#[derive(Debug)]
#[non_exhaustive]
pub enum VersionDetectError {
    /// Bytes do not start with the PSBT magic.
    InvalidMagic,
    /// Magic is not followed by the separator byte `0xff`.
    InvalidSeparator,
    /// The global map failed to decode.
    Global(map::DecodeError),
    /// The version value bytes failed to deserialize.
    Version(serialize::Error),
}

impl fmt::Display for VersionDetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use VersionDetectError::*;

        match *self {
            InvalidMagic => f.write_str("serialized data does not start with the PSBT magic"),
            InvalidSeparator => f.write_str("magic bytes are not followed by the separator"),
            Global(ref e) => write_err!(f, "error decoding the global map"; e),
            Version(ref e) => write_err!(f, "error deserializing the version value"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for VersionDetectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use VersionDetectError::*;

        match *self {
            InvalidMagic | InvalidSeparator => None,
            Global(ref e) => Some(e),
            Version(ref e) => Some(e),
        }
    }
}

/// Error converting a serialized PSBT between versions.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConvertError {
    /// The bytes did not parse as a v2 PSBT.
    Deserialize(DeserializeError),
    /// The v2 PSBT could not be converted down to v0.
    ToV0(ToV0Error),
    /// The bytes did not parse as a v0 PSBT.
    Psbt(v0::Error),
    /// The v0 PSBT could not be converted up to v2.
    FromV0(FromV0Error),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConvertError::*;

        match *self {
            Deserialize(ref e) => write_err!(f, "error deserializing a v2 PSBT"; e),
            ToV0(ref e) => write_err!(f, "error converting to v0"; e),
            Psbt(ref e) => write_err!(f, "error deserializing a v0 PSBT"; e),
            FromV0(ref e) => write_err!(f, "error converting to v2"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use ConvertError::*;

        match *self {
            Deserialize(ref e) => Some(e),
            ToV0(ref e) => Some(e),
            Psbt(ref e) => Some(e),
            FromV0(ref e) => Some(e),
        }
    }
}

/// Error combining serialized PSBTs.
#[derive(Debug)]
#[non_exhaustive]
pub enum CombineError {
    /// No PSBTs were given.
    Empty,
    /// One of the PSBTs could not be normalized to v0.
    Convert(ConvertError),
    /// Two of the PSBTs do not describe the same transaction.
    Combine(v0::Error),
}

impl fmt::Display for CombineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CombineError::*;

        match *self {
            Empty => f.write_str("no PSBTs to combine"),
            Convert(ref e) => write_err!(f, "error normalizing a PSBT to v0"; e),
            Combine(ref e) => write_err!(f, "error merging two PSBTs"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CombineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use CombineError::*;

        match *self {
            Empty => None,
            Convert(ref e) => Some(e),
            Combine(ref e) => Some(e),
        }
    }
}

impl From<ConvertError> for CombineError {
    fn from(e: ConvertError) -> Self { Self::Convert(e) }
}

/// Error validating a signed PSBT against its unsigned original.
#[derive(Debug)]
#[non_exhaustive]
pub enum SignedPsbtError {
    /// One of the two PSBTs could not be normalized to v0.
    Convert(ConvertError),
    /// The two PSBTs have a different number of inputs.
    InputCountMismatch {
        /// Input count of the signed PSBT.
        signed: usize,
        /// Input count of the unsigned PSBT.
        unsigned: usize,
    },
    /// The two PSBTs have a different number of outputs.
    OutputCountMismatch {
        /// Output count of the signed PSBT.
        signed: usize,
        /// Output count of the unsigned PSBT.
        unsigned: usize,
    },
    /// An input of the signed PSBT spends a different outpoint.
    InputOutpointMismatch {
        /// Index of the offending input.
        index: usize,
    },
    /// An output of the signed PSBT pays a different script.
    OutputScriptMismatch {
        /// Index of the offending output.
        index: usize,
    },
    /// An output of the signed PSBT pays a different amount.
    OutputAmountMismatch {
        /// Index of the offending output.
        index: usize,
    },
}

impl fmt::Display for SignedPsbtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SignedPsbtError::*;

        match *self {
            Convert(ref e) => write_err!(f, "error normalizing a PSBT to v0"; e),
            InputCountMismatch { signed, unsigned } => write!(
                f,
                "signed PSBT has {} inputs but the unsigned one has {}",
                signed, unsigned
            ),
            OutputCountMismatch { signed, unsigned } => write!(
                f,
                "signed PSBT has {} outputs but the unsigned one has {}",
                signed, unsigned
            ),
            InputOutpointMismatch { index } =>
                write!(f, "input {} spends a different outpoint than the unsigned PSBT", index),
            OutputScriptMismatch { index } =>
                write!(f, "output {} pays a different script than the unsigned PSBT", index),
            OutputAmountMismatch { index } =>
                write!(f, "output {} pays a different amount than the unsigned PSBT", index),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SignedPsbtError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use SignedPsbtError::*;

        match *self {
            Convert(ref e) => Some(e),
            InputCountMismatch { .. }
            | OutputCountMismatch { .. }
            | InputOutpointMismatch { .. }
            | OutputScriptMismatch { .. }
            | OutputAmountMismatch { .. } => None,
        }
    }
}

impl From<ConvertError> for SignedPsbtError {
    fn from(e: ConvertError) -> Self { Self::Convert(e) }
}

#[cfg(test)]
mod tests {
    use bitcoin::{Amount, OutPoint, ScriptBuf, Txid};

    use super::*;
    use crate::v2::{InputBuilder, OutputBuilder};

    const SIG_HEX: &str = "3044022074018ad4180097b873323c0015720b3684cc8123891048e7dbcd9b55ad679c99022073d369b740e3eb53dcefa33823c8070514ca55a7dd9544f157c167913261118c01";

    fn pubkey() -> PublicKey {
        "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798".parse().unwrap()
    }

    fn other_pubkey() -> PublicKey {
        "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5".parse().unwrap()
    }

    fn sig_bytes() -> Vec<u8> {
        let sig: bitcoin::ecdsa::Signature = SIG_HEX.parse().unwrap();
        sig.to_vec()
    }

    fn out_point(byte: u8) -> OutPoint {
        OutPoint { txid: Txid::deserialize(&[byte; 32]).unwrap(), vout: 0 }
    }

    fn two_in_one_out() -> Psbt {
        let script = ScriptBuf::from(vec![0x51]);
        let mut psbt = Psbt::create();
        psbt.add_input(InputBuilder::new(&out_point(0xab))).unwrap();
        psbt.add_input(InputBuilder::new(&out_point(0xcd))).unwrap();
        psbt.add_output(OutputBuilder::new(Amount::from_sat(9_000), script)).unwrap();
        psbt
    }

    #[test]
    fn version_number_reads_the_global_key() {
        let v2_bytes = Psbt::create().serialize();
        assert_eq!(version_number(&v2_bytes).unwrap(), 2);

        // v0 PSBTs do not carry the version key.
        let v0_bytes = two_in_one_out().to_v0().unwrap().serialize();
        assert_eq!(version_number(&v0_bytes).unwrap(), 0);

        assert!(matches!(version_number(b"junk"), Err(VersionDetectError::InvalidMagic)));
    }

    #[test]
    fn detect_version_is_lenient() {
        assert_eq!(detect_version(&Psbt::create().serialize()), Version::TWO);
        let v0_bytes = two_in_one_out().to_v0().unwrap().serialize();
        assert_eq!(detect_version(&v0_bytes), Version::ZERO);
        assert_eq!(detect_version(b"junk"), Version::ZERO);
    }

    #[test]
    fn convert_to_same_version_is_identity() {
        let v2_bytes = two_in_one_out().serialize();
        assert_eq!(convert_to_version(&v2_bytes, Version::TWO).unwrap(), v2_bytes);

        let v0_bytes = two_in_one_out().to_v0().unwrap().serialize();
        assert_eq!(convert_to_version(&v0_bytes, Version::ZERO).unwrap(), v0_bytes);
    }

    #[test]
    fn convert_round_trips_across_versions() {
        let v2_bytes = two_in_one_out().serialize();

        let v0_bytes = convert_to_version(&v2_bytes, Version::ZERO).unwrap();
        let legacy = v0::Psbt::deserialize(&v0_bytes).unwrap();
        assert_eq!(legacy.unsigned_tx.input.len(), 2);

        let back = convert_to_version(&v0_bytes, Version::TWO).unwrap();
        let psbt = Psbt::deserialize(&back).unwrap();
        assert_eq!(psbt.input_count(), 2);
        assert_eq!(psbt.output_count(), 1);
        assert_eq!(psbt.input(0).unwrap().out_point().unwrap(), out_point(0xab));
    }

    #[test]
    fn count_signatures_tallies_unique_signers() {
        let mut psbt = two_in_one_out();
        psbt.add_partial_sig(0, pubkey(), &sig_bytes()).unwrap();
        psbt.add_partial_sig(1, pubkey(), &sig_bytes()).unwrap();
        psbt.add_partial_sig(1, other_pubkey(), &sig_bytes()).unwrap();

        let info = count_signatures(&psbt.serialize());
        assert_eq!(info, SignatureInfo { signer_count: 2, total_signatures: 3 });
    }

    #[test]
    fn count_signatures_reports_zero_for_garbage() {
        assert_eq!(count_signatures(b"junk"), SignatureInfo::default());
    }

    #[test]
    fn combine_rejects_an_empty_slice() {
        assert!(matches!(combine(&[], None), Err(CombineError::Empty)));
    }

    #[test]
    fn combine_converts_a_single_psbt() {
        let v2_bytes = two_in_one_out().serialize();

        let result = combine(&[v2_bytes.clone()], Some(Version::ZERO)).unwrap();
        assert_eq!(result.output_version, Version::ZERO);
        assert!(v0::Psbt::deserialize(&result.combined).is_ok());

        // Default target is the detected version of the first PSBT.
        let result = combine(&[v2_bytes.clone()], None).unwrap();
        assert_eq!(result.output_version, Version::TWO);
        assert_eq!(result.combined, v2_bytes);
    }

    #[test]
    fn combine_merges_signatures_from_two_parties() {
        let base = two_in_one_out();

        let mut alice = base.clone();
        alice.add_partial_sig(0, pubkey(), &sig_bytes()).unwrap();
        let mut bob = base.clone();
        bob.add_partial_sig(0, other_pubkey(), &sig_bytes()).unwrap();

        let result = combine(&[alice.serialize(), bob.serialize()], None).unwrap();

        assert_eq!(result.output_version, Version::TWO);
        assert_eq!(result.signatures, SignatureInfo { signer_count: 2, total_signatures: 2 });

        let merged = Psbt::deserialize(&result.combined).unwrap();
        assert_eq!(merged.input(0).unwrap().partial_sigs().unwrap().len(), 2);
    }

    #[test]
    fn validate_signed_accepts_a_matching_pair() {
        let unsigned = two_in_one_out();
        let mut signed = unsigned.clone();
        signed.add_partial_sig(0, pubkey(), &sig_bytes()).unwrap();

        let check = validate_signed(&signed.serialize(), &unsigned.serialize()).unwrap();
        assert_eq!(check.total_signatures, 1);
        assert_eq!(check.signatures_per_input, vec![1, 0]);
    }

    #[test]
    fn validate_signed_rejects_a_different_transaction() {
        let unsigned = two_in_one_out();

        let mut fewer_inputs = Psbt::create();
        fewer_inputs.add_input(InputBuilder::new(&out_point(0xab))).unwrap();
        fewer_inputs
            .add_output(OutputBuilder::new(Amount::from_sat(9_000), ScriptBuf::from(vec![0x51])))
            .unwrap();
        assert!(matches!(
            validate_signed(&fewer_inputs.serialize(), &unsigned.serialize()),
            Err(SignedPsbtError::InputCountMismatch { signed: 1, unsigned: 2 })
        ));

        let mut wrong_outpoint = Psbt::create();
        wrong_outpoint.add_input(InputBuilder::new(&out_point(0xab))).unwrap();
        wrong_outpoint.add_input(InputBuilder::new(&out_point(0xef))).unwrap();
        wrong_outpoint
            .add_output(OutputBuilder::new(Amount::from_sat(9_000), ScriptBuf::from(vec![0x51])))
            .unwrap();
        assert!(matches!(
            validate_signed(&wrong_outpoint.serialize(), &unsigned.serialize()),
            Err(SignedPsbtError::InputOutpointMismatch { index: 1 })
        ));

        let mut wrong_amount = two_in_one_out();
        wrong_amount.delete_output(0).unwrap();
        wrong_amount
            .add_output(OutputBuilder::new(Amount::from_sat(1_000), ScriptBuf::from(vec![0x51])))
            .unwrap();
        assert!(matches!(
            validate_signed(&wrong_amount.serialize(), &unsigned.serialize()),
            Err(SignedPsbtError::OutputAmountMismatch { index: 0 })
        ));
    }
}
