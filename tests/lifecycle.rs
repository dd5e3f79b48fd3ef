// SPDX-License-Identifier: CC0-1.0

//! Walks a PSBT through the BIP-370 roles the way a coordinator drives it.

#![cfg(feature = "std")]

use psbt_coordinator::bitcoin::hashes::Hash;
use psbt_coordinator::bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use psbt_coordinator::bitcoin::sighash::EcdsaSighashType;
use psbt_coordinator::bitcoin::{
    ecdsa, Amount, OutPoint, PublicKey, ScriptBuf, Sequence, TxOut, Txid,
};
use psbt_coordinator::v2::{InputBuilder, OutputBuilder, Psbt};

/// A party that signs with a fixed secret key.
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

    /// Produces a DER signature over a dummy digest with SIGHASH_ALL appended.
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

fn out_point(byte: u8, vout: u32) -> OutPoint {
    OutPoint { txid: Txid::from_byte_array([byte; 32]), vout }
}

fn payment_script() -> ScriptBuf { ScriptBuf::from(vec![0x00, 0x14, 0xaa]) }

fn change_script() -> ScriptBuf { ScriptBuf::from(vec![0x00, 0x14, 0xbb]) }

fn funding(amount: u64) -> TxOut {
    TxOut { value: Amount::from_sat(amount), script_pubkey: payment_script() }
}

#[test]
fn constructor_updater_signer_flow() {
    let mut psbt = Psbt::create();
    assert!(psbt.is_ready_for_constructor());

    // Constructor: two funding inputs and a payment plus change.
    psbt.add_input(
        InputBuilder::new(&out_point(0x11, 0))
            .sequence(Sequence::from_consensus(0xFFFF_FFFD))
            .segwit_fund(funding(60_000)),
    )
    .unwrap();
    psbt.add_input(InputBuilder::new(&out_point(0x22, 1)).segwit_fund(funding(50_000))).unwrap();
    psbt.add_output(OutputBuilder::new(Amount::from_sat(80_000), payment_script())).unwrap();
    psbt.add_output(OutputBuilder::new(Amount::from_sat(29_000), change_script())).unwrap();

    assert_eq!(psbt.input_count(), 2);
    assert_eq!(psbt.output_count(), 2);
    assert!(psbt.is_rbf_signaled().unwrap());
    assert!(psbt.is_ready_for_updater());
    assert!(psbt.is_ready_for_signer());
    assert!(!psbt.is_ready_for_transaction_extractor());

    // The wire format round trips what the constructor built.
    let reparsed = Psbt::deserialize(&psbt.serialize()).unwrap();
    assert_eq!(reparsed, psbt);
    assert_eq!(reparsed.input(0).unwrap().out_point().unwrap(), out_point(0x11, 0));
    assert_eq!(reparsed.input(1).unwrap().witness_utxo().unwrap(), Some(funding(50_000)));

    // Signer: a SIGHASH_ALL signature freezes the transaction structure.
    let alice = Signer::new(0x01);
    psbt.add_partial_sig(0, alice.pk, &alice.sign()).unwrap();

    assert!(!psbt.is_inputs_modifiable());
    assert!(!psbt.is_outputs_modifiable());
    assert!(!psbt.is_ready_for_constructor());
    assert!(!psbt.is_ready_for_updater());
    assert!(psbt.is_ready_for_signer());

    let err = psbt.add_input(InputBuilder::new(&out_point(0x33, 0))).unwrap_err();
    let _ = format!("{}", err);
}

#[test]
fn fee_is_visible_through_the_views() {
    let mut psbt = Psbt::create();
    psbt.add_input(InputBuilder::new(&out_point(0x11, 0)).segwit_fund(funding(60_000))).unwrap();
    psbt.add_output(OutputBuilder::new(Amount::from_sat(59_000), payment_script())).unwrap();

    let fund: u64 =
        psbt.inputs().map(|input| input.witness_utxo().unwrap().unwrap().value.to_sat()).sum();
    let spend: u64 = psbt.outputs().map(|output| output.amount().unwrap().to_sat()).sum();
    assert_eq!(fund - spend, 1_000);
}

#[test]
fn signature_removal_reopens_signing_but_not_construction() {
    let alice = Signer::new(0x01);

    let mut psbt = Psbt::create();
    psbt.add_input(InputBuilder::new(&out_point(0x11, 0)).segwit_fund(funding(10_000))).unwrap();
    psbt.add_output(OutputBuilder::new(Amount::from_sat(9_000), payment_script())).unwrap();
    psbt.add_partial_sig(0, alice.pk, &alice.sign()).unwrap();

    psbt.remove_partial_sig(0, &alice.pk).unwrap();
    assert_eq!(psbt.input(0).unwrap().partial_sigs().unwrap().len(), 0);

    // The narrowed flags stay narrowed, replacing inputs needs a fresh PSBT.
    assert!(!psbt.is_ready_for_constructor());
    assert!(psbt.is_ready_for_signer());
}

#[test]
fn lock_time_resolution_prefers_heights() {
    let mut psbt = Psbt::create();
    psbt.add_input(
        InputBuilder::new(&out_point(0x11, 0)).minimum_required_height_based_lock_time(
            psbt_coordinator::bitcoin::absolute::Height::from_consensus(700_000).unwrap(),
        ),
    )
    .unwrap();
    psbt.add_input(
        InputBuilder::new(&out_point(0x22, 0)).minimum_required_time_based_lock_time(
            psbt_coordinator::bitcoin::absolute::Time::from_consensus(1_700_000_000).unwrap(),
        ),
    )
    .unwrap();

    let lock = psbt.determine_lock_time().unwrap();
    assert_eq!(lock.to_consensus_u32(), 700_000);
}

#[cfg(feature = "base64")]
#[test]
fn base64_display_round_trips() {
    use core::str::FromStr;

    let mut psbt = Psbt::create();
    psbt.add_input(InputBuilder::new(&out_point(0x11, 0)).segwit_fund(funding(10_000))).unwrap();
    psbt.add_output(OutputBuilder::new(Amount::from_sat(9_000), payment_script())).unwrap();

    let encoded = psbt.to_string();
    let decoded = Psbt::from_str(&encoded).unwrap();
    assert_eq!(decoded, psbt);

    assert!(Psbt::from_str("definitely not base64!").is_err());
}
