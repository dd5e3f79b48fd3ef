// SPDX-License-Identifier: CC0-1.0

//! Raw PSBT key-value pairs.
//!
//! Raw key-value pairs are defined in [BIP-174], every map in the wire format
//! is a sequence of them terminated by a single `0x00` separator byte.
//!
//! [BIP-174]: <https://github.com/bitcoin/bips/blob/master/bip-0174.mediawiki>

use core::convert::TryFrom;
use core::fmt;

use bitcoin::consensus::encode::{self as consensus, VarInt, MAX_VEC_SIZE};
use bitcoin::consensus::{Decodable, Encodable};

use crate::io::{self, Cursor};
use crate::prelude::*;
use crate::serialize::{Error, Serialize};

/// A PSBT key in its raw byte form: `{ type_value, key }`.
///
/// Two keys are the same key iff both the type value and the key data are
/// equal, this is the identity used for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub struct Key {
    /// The type of this PSBT key.
    pub type_value: u8,
    /// The key data itself in raw byte form.
    pub key: Vec<u8>,
}

impl Key {
    /// Creates a key with no key data, the form taken by all singleton keytypes.
    pub fn singleton(type_value: u8) -> Self { Key { type_value, key: vec![] } }

    pub(crate) fn decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let VarInt(byte_size): VarInt = Decodable::consensus_decode(r)?;

        if byte_size == 0 {
            return Err(Error::NoMorePairs);
        }

        let key_byte_size: u64 = byte_size - 1;

        if key_byte_size > MAX_VEC_SIZE as u64 {
            return Err(consensus::Error::OversizedVectorAllocation {
                requested: key_byte_size as usize,
                max: MAX_VEC_SIZE,
            }
            .into());
        }

        let type_value: u8 = Decodable::consensus_decode(r)?;

        let mut key = Vec::with_capacity(key_byte_size as usize);
        for _ in 0..key_byte_size {
            key.push(Decodable::consensus_decode(r)?);
        }

        Ok(Key { type_value, key })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "type: {:#x}, key: {:x}", self.type_value, self.key.as_hex())
    }
}

impl Serialize for Key {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        VarInt((self.key.len() + 1) as u64)
            .consensus_encode(&mut buf)
            .expect("in-memory writers don't error");

        buf.push(self.type_value);
        buf.extend(self.key.iter());

        buf
    }
}

/// A PSBT key-value pair in its raw byte form: `{ key, value }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub struct Pair {
    /// The key of this key-value pair.
    pub key: Key,
    /// The value data of this key-value pair in raw byte form.
    pub value: Vec<u8>,
}

impl Pair {
    pub(crate) fn decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        Ok(Pair { key: Key::decode(r)?, value: Decodable::consensus_decode(r)? })
    }
}

impl Serialize for Pair {
    fn serialize(&self) -> Vec<u8> {
        let mut rv = self.key.serialize();
        self.value.consensus_encode(&mut rv).expect("in-memory writers don't error");
        rv
    }
}

/// A proprietary key, the structured form of key data under keytype `0xfc`.
///
/// Wire form of the key data: compact size prefix length, prefix identifier,
/// subtype byte, then free form subkey data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub struct ProprietaryKey {
    /// Proprietary type prefix used for grouping together keys under some
    /// application and avoiding namespace collision.
    pub prefix: Vec<u8>,
    /// Custom proprietary subtype.
    pub subtype: u8,
    /// Additional key bytes (like serialized public key data etc).
    pub key: Vec<u8>,
}

impl ProprietaryKey {
    /// Constructs a [`Key`] from this proprietary key.
    pub fn to_key(&self) -> Key {
        let mut key = Vec::with_capacity(self.prefix.len() + self.key.len() + 2);
        self.prefix.consensus_encode(&mut key).expect("in-memory writers don't error");
        key.push(self.subtype);
        key.extend(self.key.iter());

        Key { type_value: 0xFC, key }
    }
}

impl TryFrom<Key> for ProprietaryKey {
    type Error = Error;

    /// Converts a [`Key`] to a [`ProprietaryKey`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProprietaryKey`] if `key` does not have the
    /// proprietary type value `0xFC`.
    fn try_from(key: Key) -> Result<Self, Self::Error> {
        if key.type_value != 0xFC {
            return Err(Error::InvalidProprietaryKey);
        }

        let mut decoder = Cursor::new(key.key);
        let prefix = Vec::<u8>::consensus_decode(&mut decoder)?;
        let subtype = u8::consensus_decode(&mut decoder)?;

        let position = decoder.position() as usize;
        let key = decoder.into_inner()[position..].to_vec();

        Ok(ProprietaryKey { prefix, subtype, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_serialize_roundtrip() {
        let key = Key { type_value: 0x02, key: vec![0xab, 0xcd] };

        let ser = key.serialize();
        assert_eq!(ser, vec![0x03, 0x02, 0xab, 0xcd]);

        let decoded = Key::decode(&mut Cursor::new(ser)).expect("failed to decode");
        assert_eq!(decoded, key);
    }

    #[test]
    fn key_decode_zero_length_signals_end_of_map() {
        let err = Key::decode(&mut Cursor::new(vec![0x00])).unwrap_err();
        assert!(matches!(err, Error::NoMorePairs));
    }

    #[test]
    fn pair_serialize_roundtrip() {
        let pair = Pair { key: Key::singleton(0x03), value: vec![0x01, 0x02, 0x03, 0x04] };

        let ser = pair.serialize();
        let decoded = Pair::decode(&mut Cursor::new(ser)).expect("failed to decode");
        assert_eq!(decoded, pair);
    }

    #[test]
    fn proprietary_key_roundtrip() {
        let pk = ProprietaryKey { prefix: b"org".to_vec(), subtype: 0x01, key: vec![0xff] };

        let key = pk.to_key();
        assert_eq!(key.type_value, 0xFC);
        assert_eq!(key.key, vec![0x03, b'o', b'r', b'g', 0x01, 0xff]);

        let back = ProprietaryKey::try_from(key).expect("failed to convert");
        assert_eq!(back, pk);
    }

    #[test]
    fn proprietary_key_requires_proprietary_type_value() {
        let key = Key { type_value: 0x01, key: vec![0x00] };
        assert!(matches!(ProprietaryKey::try_from(key), Err(Error::InvalidProprietaryKey)));
    }
}
