//! A two party signing round driven over serialized PSBTs.
//!
//! Alice and Bob each contribute a native segwit v0 input to fund a 2-of-2
//! multisig output. Each party signs their own copy of the PSBT and the
//! coordinator merges the copies and checks the signature tallies.
//!
//! We sign a stand-in digest, this code is never run against Bitcoin Core so
//! nothing in it should be taken as proven correct.

use std::str::FromStr;

use psbt_coordinator::bitcoin::bip32::{DerivationPath, KeySource, Xpriv};
use psbt_coordinator::bitcoin::hashes::Hash;
use psbt_coordinator::bitcoin::locktime::absolute;
use psbt_coordinator::bitcoin::opcodes::all::OP_CHECKMULTISIG;
use psbt_coordinator::bitcoin::secp256k1::{Message, SECP256K1};
use psbt_coordinator::bitcoin::sighash::EcdsaSighashType;
use psbt_coordinator::bitcoin::{
    ecdsa, script, Address, Amount, Network, OutPoint, PublicKey, ScriptBuf, Sequence, TxOut,
    Txid,
};
use psbt_coordinator::combiner;
use psbt_coordinator::v2::{InputBuilder, OutputBuilder, Psbt};

const UTXO_AMOUNT: Amount = Amount::from_sat(20_000_000);
const CHANGE_AMOUNT: Amount = Amount::from_sat(100_000);
const FEE: Amount = Amount::from_sat(1_000); // Usually this would be calculated.

const MAINNET: Network = Network::Bitcoin;

fn main() -> anyhow::Result<()> {
    // Two people, Alice and Bob, fund a 2-of-2 multisig output together.
    let alice = Party::alice();
    let bob = Party::bob();

    let witness_script = multisig_witness_script(&alice.public_key()?, &bob.public_key()?);
    let spend_value = UTXO_AMOUNT * 2 - CHANGE_AMOUNT - FEE;
    let spend_script = Address::p2wsh(&witness_script, MAINNET).script_pubkey();

    // The constructor role. Alice wants her input to be unspendable until
    // block 800,000, use of a lock time is of course optional.
    let min_height = absolute::Height::from_consensus(800_000).expect("valid height");

    let mut psbt = Psbt::create();
    psbt.add_input(alice.funded_input()?.minimum_required_height_based_lock_time(min_height))?;
    psbt.add_input(bob.funded_input()?)?;
    psbt.add_output(OutputBuilder::new(spend_value, spend_script))?;
    psbt.add_output(OutputBuilder::new(CHANGE_AMOUNT, alice.script_pubkey()?))?;

    // The updater role. Bob's sequence must enable the lock time.
    psbt.set_input_sequence(1, Sequence::ENABLE_LOCKTIME_NO_RBF)?;

    assert_eq!(psbt.determine_lock_time()?, absolute::LockTime::from_height(800_000)?);
    assert!(psbt.is_ready_for_signer());

    // Each party signs their own copy, the way the PSBT travels between
    // wallets.
    let unsigned = psbt.serialize();
    let signed_by_a = alice.sign(&unsigned)?;
    let signed_by_b = bob.sign(&unsigned)?;

    // Back at the coordinator. Each copy still funds the unsigned transaction
    // and carries exactly one signature, on the party's own input.
    let check = combiner::validate_signed(&signed_by_a, &unsigned)?;
    assert_eq!(check.signatures_per_input, vec![1, 0]);

    let round = combiner::combine(&[signed_by_a, signed_by_b], None)?;
    assert_eq!(round.signatures.signer_count, 2);
    assert_eq!(round.signatures.total_signatures, 2);

    // The merged PSBT is fully signed, the SIGHASH_ALL signatures froze it,
    // and the lock time survived the round.
    let merged = Psbt::deserialize(&round.combined)?;
    assert!(!merged.is_inputs_modifiable());
    assert!(!merged.is_outputs_modifiable());
    assert_eq!(merged.determine_lock_time()?, absolute::LockTime::from_height(800_000)?);

    // At this stage we would usually finalize each input and extract the
    // transaction.

    Ok(())
}

/// Creates a 2-of-2 multisig script locking to a and b's keys.
fn multisig_witness_script(a: &PublicKey, b: &PublicKey) -> ScriptBuf {
    script::Builder::new()
        .push_int(2)
        .push_key(a)
        .push_key(b)
        .push_int(2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// One of the two people funding and signing the transaction.
struct Party {
    master: Xpriv,
    input_index: usize,
    path: &'static str,
}

impl Party {
    fn alice() -> Self {
        let seed = [0x00; 32]; // Fake example with a fake seed :)
        Party {
            master: Xpriv::new_master(MAINNET, &seed).expect("valid seed"),
            input_index: 0,
            path: "m/84'/0'/0'/0/42",
        }
    }

    fn bob() -> Self {
        let seed = [0x11; 32]; // Fake example with a fake seed :)
        Party {
            master: Xpriv::new_master(MAINNET, &seed).expect("valid seed"),
            input_index: 1,
            path: "m/84'/0'/0'/0/0",
        }
    }

    /// The pubkey this party contributes to the multisig.
    ///
    /// The usual caveat about reusing addresses applies here, the same key
    /// also locks this party's funding utxo.
    fn public_key(&self) -> anyhow::Result<PublicKey> {
        let (pubkey, _) = self.key_source()?;
        Ok(pubkey)
    }

    /// A p2wpkh script locked to this party's key.
    fn script_pubkey(&self) -> anyhow::Result<ScriptBuf> {
        let pubkey = self.public_key()?;
        Ok(ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash().expect("uncompressed key")))
    }

    /// This party's funding input, annotated with the utxo and the key source
    /// a signer needs.
    fn funded_input(&self) -> anyhow::Result<InputBuilder> {
        // An obviously invalid outpoint, the `vout` differentiates Alice's
        // from Bob's.
        let out = OutPoint { txid: Txid::all_zeros(), vout: self.input_index as u32 };
        let utxo = TxOut { value: UTXO_AMOUNT, script_pubkey: self.script_pubkey()? };
        let (pubkey, key_source) = self.key_source()?;

        Ok(InputBuilder::new(&out).segwit_fund(utxo).bip32_derivation(pubkey, key_source))
    }

    /// Signs this party's input on a fresh copy of `unsigned`.
    fn sign(&self, unsigned: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut psbt = Psbt::deserialize(unsigned)?;

        // A stand-in digest, a real signer computes the BIP-143 sighash.
        let msg = Message::from_digest([0x07; 32]);
        let signature = ecdsa::Signature {
            sig: SECP256K1.sign_ecdsa(&msg, &self.derived()?.to_priv().inner),
            hash_ty: EcdsaSighashType::All,
        };

        let (pubkey, _) = self.key_source()?;
        psbt.add_partial_sig(self.input_index, pubkey, &signature.to_vec())?;
        Ok(psbt.serialize())
    }

    fn key_source(&self) -> anyhow::Result<(PublicKey, KeySource)> {
        let path = DerivationPath::from_str(self.path)?;
        let fingerprint = self.master.fingerprint(SECP256K1);
        let pubkey = self.derived()?.to_priv().public_key(SECP256K1);
        Ok((pubkey, (fingerprint, path)))
    }

    fn derived(&self) -> anyhow::Result<Xpriv> {
        let path = DerivationPath::from_str(self.path)?;
        Ok(self.master.derive_priv(SECP256K1, &path)?)
    }
}
