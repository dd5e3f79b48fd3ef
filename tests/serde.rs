// SPDX-License-Identifier: CC0-1.0

//! PSBTs survive generic serde round trips in both readable and compact form.

#![cfg(all(feature = "std", feature = "serde"))]

use psbt_coordinator::bitcoin::hashes::Hash;
use psbt_coordinator::bitcoin::{Amount, OutPoint, ScriptBuf, TxOut, Txid};
use psbt_coordinator::v2::{InputBuilder, OutputBuilder, Psbt};
use psbt_coordinator::Version;
use serde_test::{assert_tokens, Token};

fn sample() -> Psbt {
    let out_point = OutPoint { txid: Txid::from_byte_array([0x11; 32]), vout: 7 };
    let fund = TxOut {
        value: Amount::from_sat(10_000),
        script_pubkey: ScriptBuf::from(vec![0x00, 0x14, 0xaa]),
    };

    let mut psbt = Psbt::create();
    psbt.add_input(InputBuilder::new(&out_point).segwit_fund(fund)).unwrap();
    psbt.add_output(
        OutputBuilder::new(Amount::from_sat(9_000), ScriptBuf::from(vec![0x00, 0x14, 0xbb])),
    )
    .unwrap();
    psbt
}

#[test]
fn serde_json_round_trip() {
    let psbt = sample();
    let ser = serde_json::to_string(&psbt).unwrap();
    let de: Psbt = serde_json::from_str(&ser).unwrap();
    assert_eq!(de, psbt);
}

#[test]
fn serde_bincode_round_trip() {
    let psbt = sample();
    let ser = bincode::serialize(&psbt).unwrap();
    let de: Psbt = bincode::deserialize(&ser).unwrap();
    assert_eq!(de, psbt);
}

#[test]
fn version_tokens() {
    assert_tokens(&Version::TWO, &[Token::NewtypeStruct { name: "Version" }, Token::U32(2)]);
}
