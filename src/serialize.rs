// SPDX-License-Identifier: CC0-1.0

//! Serialization of PSBT key types and value types.
//!
//! Every typed accessor in this crate goes through the [`Serialize`] and
//! [`Deserialize`] traits below, the wire forms are those given in [BIP-174]
//! and [BIP-370] (integers little endian, scripts raw, paths as fingerprint
//! plus 32-bit child indexes).
//!
//! [BIP-174]: <https://github.com/bitcoin/bips/blob/master/bip-0174.mediawiki>
//! [BIP-370]: <https://github.com/bitcoin/bips/blob/master/bip-0370.mediawiki>

use core::fmt;

use bitcoin::bip32::{self, ChildNumber, DerivationPath, Fingerprint, KeySource, Xpub};
use bitcoin::consensus::encode as consensus;
use bitcoin::consensus::encode::VarInt;
use bitcoin::consensus::Decodable;
use bitcoin::locktime::absolute;
use bitcoin::{key, secp256k1, transaction, Amount, PublicKey, ScriptBuf, Sequence};
use bitcoin::{Transaction, TxOut, Txid, Witness};

use crate::error::write_err;
use crate::prelude::*;
use crate::sighash_type::PsbtSighashType;

/// A type that can be serialized as the value (or key data) of a PSBT key-value pair.
pub trait Serialize {
    /// Serializes `self` into the raw byte form carried on the wire.
    fn serialize(&self) -> Vec<u8>;
}

/// A type that can be deserialized from the value (or key data) of a PSBT key-value pair.
pub trait Deserialize: Sized {
    /// Deserializes `Self` from the raw byte form carried on the wire.
    fn deserialize(bytes: &[u8]) -> Result<Self, Error>;
}

impl_psbt_de_serialize!(Transaction);
impl_psbt_de_serialize!(TxOut);
impl_psbt_de_serialize!(Witness);
impl_psbt_de_serialize!(Txid);
impl_psbt_de_serialize!(VarInt);

impl Serialize for ScriptBuf {
    fn serialize(&self) -> Vec<u8> { self.to_bytes() }
}

impl Deserialize for ScriptBuf {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> { Ok(Self::from(bytes.to_vec())) }
}

impl Serialize for u32 {
    fn serialize(&self) -> Vec<u8> { self.to_le_bytes().to_vec() }
}

impl Deserialize for u32 {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| Error::WrongValueLength { length: bytes.len(), expected: 4 })?;
        Ok(u32::from_le_bytes(arr))
    }
}

impl Serialize for transaction::Version {
    fn serialize(&self) -> Vec<u8> { self.0.to_le_bytes().to_vec() }
}

impl Deserialize for transaction::Version {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| Error::WrongValueLength { length: bytes.len(), expected: 4 })?;
        Ok(transaction::Version(i32::from_le_bytes(arr)))
    }
}

impl Serialize for Amount {
    fn serialize(&self) -> Vec<u8> { self.to_sat().to_le_bytes().to_vec() }
}

impl Deserialize for Amount {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::WrongValueLength { length: bytes.len(), expected: 8 })?;
        Ok(Amount::from_sat(u64::from_le_bytes(arr)))
    }
}

impl Serialize for Sequence {
    fn serialize(&self) -> Vec<u8> { self.to_consensus_u32().to_le_bytes().to_vec() }
}

impl Deserialize for Sequence {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Sequence::from_consensus(u32::deserialize(bytes)?))
    }
}

impl Serialize for absolute::LockTime {
    fn serialize(&self) -> Vec<u8> { self.to_consensus_u32().to_le_bytes().to_vec() }
}

impl Deserialize for absolute::LockTime {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Ok(absolute::LockTime::from_consensus(u32::deserialize(bytes)?))
    }
}

impl Serialize for absolute::Height {
    fn serialize(&self) -> Vec<u8> { self.to_consensus_u32().to_le_bytes().to_vec() }
}

impl Deserialize for absolute::Height {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Ok(absolute::Height::from_consensus(u32::deserialize(bytes)?)?)
    }
}

impl Serialize for absolute::Time {
    fn serialize(&self) -> Vec<u8> { self.to_consensus_u32().to_le_bytes().to_vec() }
}

impl Deserialize for absolute::Time {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Ok(absolute::Time::from_consensus(u32::deserialize(bytes)?)?)
    }
}

impl Serialize for PsbtSighashType {
    fn serialize(&self) -> Vec<u8> { self.to_u32().to_le_bytes().to_vec() }
}

impl Deserialize for PsbtSighashType {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Ok(PsbtSighashType::from_u32(u32::deserialize(bytes)?))
    }
}

impl Serialize for PublicKey {
    fn serialize(&self) -> Vec<u8> { self.to_bytes() }
}

impl Deserialize for PublicKey {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        PublicKey::from_slice(bytes).map_err(Error::PublicKey)
    }
}

impl Serialize for secp256k1::PublicKey {
    fn serialize(&self) -> Vec<u8> { self.serialize().to_vec() }
}

impl Deserialize for secp256k1::PublicKey {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        secp256k1::PublicKey::from_slice(bytes).map_err(Error::Secp256k1)
    }
}

impl Serialize for Xpub {
    fn serialize(&self) -> Vec<u8> { self.encode().to_vec() }
}

impl Deserialize for Xpub {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Xpub::decode(bytes).map_err(Error::Bip32)
    }
}

impl Serialize for KeySource {
    fn serialize(&self) -> Vec<u8> {
        let mut rv: Vec<u8> = Vec::with_capacity(4 + 4 * self.1.len());
        rv.extend_from_slice(self.0.as_bytes());
        for child in self.1.into_iter() {
            rv.extend_from_slice(&u32::from(*child).to_le_bytes());
        }
        rv
    }
}

impl Deserialize for KeySource {
    fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 4 {
            return Err(Error::WrongValueLength { length: bytes.len(), expected: 4 });
        }

        let fingerprint: Fingerprint =
            bytes[0..4].try_into().expect("4 is the fingerprint length");

        let mut path: Vec<ChildNumber> = Default::default();
        let mut d = &bytes[4..];
        while !d.is_empty() {
            match u32::consensus_decode(&mut d) {
                Ok(index) => path.push(index.into()),
                Err(e) => return Err(e.into()),
            }
        }

        Ok((fingerprint, DerivationPath::from(path)))
    }
}

/// Error that can occur while (de)serializing a PSBT key or value.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Signals that there are no more key-value pairs in this map.
    NoMorePairs,
    /// Attempted to convert a non-proprietary key to a proprietary key.
    InvalidProprietaryKey,
    /// Value (or key data) byte length does not match the keytype's wire form.
    WrongValueLength {
        /// Length of the bytes we attempted to deserialize.
        length: usize,
        /// Length the wire form requires.
        expected: usize,
    },
    /// Error consensus deserializing type.
    Consensus(consensus::Error),
    /// Error parsing a public key with a parity byte.
    PublicKey(key::Error),
    /// Error parsing an x-only or compressed public key.
    Secp256k1(secp256k1::Error),
    /// Error parsing an extended public key.
    Bip32(bip32::Error),
    /// Error parsing a lock time from a 32-bit consensus value.
    LockTime(absolute::Error),
    /// Version number is not one this crate knows how to handle.
    Version(crate::version::UnsupportedVersionError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;

        match *self {
            NoMorePairs => write!(f, "no more key-value pairs for this psbt map"),
            InvalidProprietaryKey => {
                write!(f, "non-proprietary key type found when proprietary key was expected")
            }
            WrongValueLength { length, expected } => {
                write!(f, "value wrong length: {} (expected {})", length, expected)
            }
            Consensus(ref e) => write_err!(f, "error consensus deserializing type"; e),
            PublicKey(ref e) => write_err!(f, "error parsing public key"; e),
            Secp256k1(ref e) => write_err!(f, "error parsing secp256k1 public key"; e),
            Bip32(ref e) => write_err!(f, "error parsing extended public key"; e),
            LockTime(ref e) => write_err!(f, "error parsing lock time"; e),
            Version(ref e) => write_err!(f, "error parsing version number"; e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use Error::*;

        match *self {
            NoMorePairs | InvalidProprietaryKey | WrongValueLength { .. } => None,
            Consensus(ref e) => Some(e),
            PublicKey(ref e) => Some(e),
            Secp256k1(ref e) => Some(e),
            Bip32(ref e) => Some(e),
            LockTime(ref e) => Some(e),
            Version(ref e) => Some(e),
        }
    }
}

impl From<consensus::Error> for Error {
    fn from(e: consensus::Error) -> Self { Error::Consensus(e) }
}

impl From<absolute::Error> for Error {
    fn from(e: absolute::Error) -> Self { Error::LockTime(e) }
}

impl From<crate::version::UnsupportedVersionError> for Error {
    fn from(e: crate::version::UnsupportedVersionError) -> Self { Error::Version(e) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_roundtrip() {
        let ser = 700_000_u32.serialize();
        assert_eq!(ser, vec![0x60, 0xae, 0x0a, 0x00]);
        assert_eq!(u32::deserialize(&ser).unwrap(), 700_000);
    }

    #[test]
    fn u32_rejects_wrong_length() {
        assert!(matches!(
            u32::deserialize(&[0x01, 0x02]),
            Err(Error::WrongValueLength { length: 2, expected: 4 })
        ));
    }

    #[test]
    fn amount_is_eight_le_bytes() {
        let ser = Amount::from_sat(1_000_000).serialize();
        assert_eq!(ser, vec![0x40, 0x42, 0x0f, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(Amount::deserialize(&ser).unwrap(), Amount::from_sat(1_000_000));
    }

    #[test]
    fn height_locktime_respects_threshold() {
        assert!(absolute::Height::deserialize(&700_000_u32.serialize()).is_ok());
        assert!(absolute::Height::deserialize(&1_700_000_000_u32.serialize()).is_err());

        assert!(absolute::Time::deserialize(&1_700_000_000_u32.serialize()).is_ok());
        assert!(absolute::Time::deserialize(&700_000_u32.serialize()).is_err());
    }

    #[test]
    fn key_source_roundtrip() {
        let fingerprint = Fingerprint::from([0xde, 0xad, 0xbe, 0xef]);
        let path = DerivationPath::from(vec![
            ChildNumber::from_hardened_idx(45).unwrap(),
            ChildNumber::from_normal_idx(0).unwrap(),
            ChildNumber::from_normal_idx(7).unwrap(),
        ]);
        let source: KeySource = (fingerprint, path);

        let ser = Serialize::serialize(&source);
        assert_eq!(ser.len(), 4 + 4 * 3);
        let decoded = KeySource::deserialize(&ser).unwrap();
        assert_eq!(decoded, source);
    }

    #[test]
    fn key_source_requires_fingerprint() {
        assert!(matches!(
            KeySource::deserialize(&[0x00, 0x01]),
            Err(Error::WrongValueLength { length: 2, expected: 4 })
        ));
    }
}
