// SPDX-License-Identifier: CC0-1.0

//! Coordinates a multi-party signing round over serialized PSBTs.

#![cfg(feature = "std")]

use psbt_coordinator::bitcoin::hashes::Hash;
use psbt_coordinator::bitcoin::psbt as v0;
use psbt_coordinator::bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use psbt_coordinator::bitcoin::sighash::EcdsaSighashType;
use psbt_coordinator::bitcoin::{ecdsa, Amount, OutPoint, PublicKey, ScriptBuf, TxOut, Txid};
use psbt_coordinator::combiner::{
    combine, convert_to_version, count_signatures, detect_version, validate_signed,
    version_number, SignatureInfo,
};
use psbt_coordinator::v2::{InputBuilder, OutputBuilder, Psbt};
use psbt_coordinator::Version;

struct Signer {
    sk: SecretKey,
    pk: PublicKey,
}

impl Signer {
    fn new(seed: u8) -> Self {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).expect("32 bytes in range");
        let pk = PublicKey::new(sk.public_key(&secp));
        Signer { sk, pk }
    }

    fn sign(&self) -> Vec<u8> {
        let secp = Secp256k1::new();
        let msg = Message::from_digest([0x07; 32]);
        let sig = ecdsa::Signature {
            sig: secp.sign_ecdsa(&msg, &self.sk),
            hash_ty: EcdsaSighashType::All,
        };
        sig.to_vec()
    }
}

fn out_point(byte: u8) -> OutPoint {
    OutPoint { txid: Txid::from_byte_array([byte; 32]), vout: 0 }
}

fn payment_script() -> ScriptBuf { ScriptBuf::from(vec![0x00, 0x14, 0xaa]) }

fn funding(amount: u64) -> TxOut {
    TxOut { value: Amount::from_sat(amount), script_pubkey: payment_script() }
}

/// The unsigned PSBT the coordinator hands to every party.
fn unsigned_round() -> Psbt {
    let mut psbt = Psbt::create();
    psbt.add_input(InputBuilder::new(&out_point(0x11)).segwit_fund(funding(60_000))).unwrap();
    psbt.add_input(InputBuilder::new(&out_point(0x22)).segwit_fund(funding(50_000))).unwrap();
    psbt.add_output(OutputBuilder::new(Amount::from_sat(100_000), payment_script())).unwrap();
    psbt
}

#[test]
fn version_detection_across_formats() {
    let unsigned = unsigned_round();
    let v2_bytes = unsigned.serialize();
    let v0_bytes = unsigned.to_v0().unwrap().serialize();

    assert_eq!(version_number(&v2_bytes).unwrap(), 2);
    assert_eq!(version_number(&v0_bytes).unwrap(), 0);
    assert!(version_number(&[0xde, 0xad]).is_err());

    assert_eq!(detect_version(&v2_bytes), Version::TWO);
    assert_eq!(detect_version(&v0_bytes), Version::ZERO);
    assert_eq!(detect_version(&[0xde, 0xad]), Version::ZERO);
}

#[test]
fn conversion_round_trip_preserves_the_transaction() {
    let unsigned = unsigned_round();
    let v2_bytes = unsigned.serialize();

    let v0_bytes = convert_to_version(&v2_bytes, Version::ZERO).unwrap();
    let legacy = v0::Psbt::deserialize(&v0_bytes).unwrap();
    assert_eq!(legacy.unsigned_tx.input.len(), 2);
    assert_eq!(legacy.unsigned_tx.input[0].previous_output, out_point(0x11));
    assert_eq!(legacy.unsigned_tx.output[0].value, Amount::from_sat(100_000));
    assert_eq!(legacy.inputs[0].witness_utxo, Some(funding(60_000)));

    let back = convert_to_version(&v0_bytes, Version::TWO).unwrap();
    let reparsed = Psbt::deserialize(&back).unwrap();
    assert_eq!(reparsed.input_count(), 2);
    assert_eq!(reparsed.input(1).unwrap().out_point().unwrap(), out_point(0x22));
    assert_eq!(reparsed.output(0).unwrap().amount().unwrap(), Amount::from_sat(100_000));
}

#[test]
fn two_party_round_combines_into_a_fully_signed_psbt() {
    let alice = Signer::new(0x01);
    let bob = Signer::new(0x02);
    let unsigned = unsigned_round();

    // Each party signs its own copy, one of them responds with a v0 PSBT.
    let mut alice_copy = unsigned.clone();
    alice_copy.add_partial_sig(0, alice.pk, &alice.sign()).unwrap();
    alice_copy.add_partial_sig(1, alice.pk, &alice.sign()).unwrap();
    let alice_bytes = alice_copy.serialize();

    let mut bob_copy = unsigned.clone();
    bob_copy.add_partial_sig(0, bob.pk, &bob.sign()).unwrap();
    bob_copy.add_partial_sig(1, bob.pk, &bob.sign()).unwrap();
    let bob_bytes = bob_copy.to_v0().unwrap().serialize();

    assert_eq!(
        count_signatures(&alice_bytes),
        SignatureInfo { signer_count: 1, total_signatures: 2 }
    );

    let result = combine(&[alice_bytes, bob_bytes], None).unwrap();
    assert_eq!(result.output_version, Version::TWO);
    assert_eq!(result.signatures, SignatureInfo { signer_count: 2, total_signatures: 4 });

    let merged = Psbt::deserialize(&result.combined).unwrap();
    assert_eq!(merged.input(0).unwrap().partial_sigs().unwrap().len(), 2);
    assert_eq!(merged.input(1).unwrap().partial_sigs().unwrap().len(), 2);

    // The merged PSBT still funds the transaction the round started from.
    let check = validate_signed(&result.combined, &unsigned.serialize()).unwrap();
    assert_eq!(check.total_signatures, 4);
    assert_eq!(check.signatures_per_input, vec![2, 2]);
}

#[test]
fn combine_can_target_the_legacy_format() {
    let alice = Signer::new(0x01);

    let mut signed = unsigned_round();
    signed.add_partial_sig(0, alice.pk, &alice.sign()).unwrap();

    let result = combine(&[signed.serialize()], Some(Version::ZERO)).unwrap();
    assert_eq!(result.output_version, Version::ZERO);
    assert_eq!(result.signatures, SignatureInfo { signer_count: 1, total_signatures: 1 });

    let legacy = v0::Psbt::deserialize(&result.combined).unwrap();
    assert_eq!(legacy.inputs[0].partial_sigs.len(), 1);
}

#[test]
fn validate_signed_rejects_a_substituted_output() {
    let alice = Signer::new(0x01);
    let unsigned = unsigned_round();

    // An attacker redirects the payment before returning the signed copy.
    let mut tampered = Psbt::create();
    tampered.add_input(InputBuilder::new(&out_point(0x11)).segwit_fund(funding(60_000))).unwrap();
    tampered.add_input(InputBuilder::new(&out_point(0x22)).segwit_fund(funding(50_000))).unwrap();
    tampered
        .add_output(OutputBuilder::new(
            Amount::from_sat(100_000),
            ScriptBuf::from(vec![0x00, 0x14, 0xee]),
        ))
        .unwrap();
    tampered.add_partial_sig(0, alice.pk, &alice.sign()).unwrap();

    let err = validate_signed(&tampered.serialize(), &unsigned.serialize()).unwrap_err();
    assert!(matches!(
        err,
        psbt_coordinator::combiner::SignedPsbtError::OutputScriptMismatch { index: 0 }
    ));
}
