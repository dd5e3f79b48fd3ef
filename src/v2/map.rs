// SPDX-License-Identifier: CC0-1.0

//! The backing store for PSBT maps.
//!
//! A PSBT is a sequence of key-value maps (one global map, one map per input,
//! one map per output). [`KeyMap`] stores a single map as the raw pairs that
//! came off the wire, preserving insertion order so a parse/serialize round
//! trip is byte-for-byte identical. Typed reads and writes live on
//! [`crate::v2::Psbt`], this module only enforces the map level rule that a
//! key may appear at most once.

use core::fmt;

use crate::error::write_err;
use crate::io;
use crate::prelude::*;
use crate::raw;
use crate::serialize::{self, Serialize};

/// A single PSBT key-value map.
///
/// Keys are held in insertion order. Unknown and proprietary keys are kept
/// verbatim so they survive a parse/serialize round trip.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub struct KeyMap {
    pairs: Vec<raw::Pair>,
}

impl KeyMap {
    /// Creates an empty map.
    pub fn new() -> Self { KeyMap { pairs: Vec::new() } }

    /// Returns the number of key-value pairs in this map.
    pub fn len(&self) -> usize { self.pairs.len() }

    /// Returns true if this map holds no key-value pairs.
    pub fn is_empty(&self) -> bool { self.pairs.is_empty() }

    /// Returns the value bytes stored under `key`, if any.
    pub fn get(&self, key: &raw::Key) -> Option<&[u8]> {
        self.pairs.iter().find(|pair| pair.key == *key).map(|pair| pair.value.as_slice())
    }

    /// Returns the value bytes stored under the singleton key for `type_value`.
    ///
    /// A singleton key is one with empty key data, the form taken by all the
    /// scalar fields (version, counts, lock times and friends).
    pub fn get_singleton(&self, type_value: u8) -> Option<&[u8]> {
        self.get(&raw::Key::singleton(type_value))
    }

    /// Returns true if `key` is present in this map.
    pub fn contains(&self, key: &raw::Key) -> bool { self.get(key).is_some() }

    /// Returns an iterator over all pairs in insertion order.
    pub fn pairs(&self) -> core::slice::Iter<'_, raw::Pair> { self.pairs.iter() }

    /// Returns an iterator over the pairs whose keytype is `type_value`.
    pub fn pairs_of_type(&self, type_value: u8) -> impl Iterator<Item = &raw::Pair> + '_ {
        self.pairs.iter().filter(move |pair| pair.key.type_value == type_value)
    }

    /// Appends `pair` to the map.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateKeyError`] if the key is already present, the map is
    /// left unchanged.
    pub fn insert(&mut self, pair: raw::Pair) -> Result<(), DuplicateKeyError> {
        if self.contains(&pair.key) {
            return Err(DuplicateKeyError(pair.key));
        }
        self.pairs.push(pair);
        Ok(())
    }

    /// Sets `pair`, replacing the value in place if the key is already present.
    ///
    /// Replacing in place keeps the key at its original position so the
    /// serialized order is stable across updates.
    pub fn set(&mut self, pair: raw::Pair) {
        match self.pairs.iter_mut().find(|p| p.key == pair.key) {
            Some(existing) => existing.value = pair.value,
            None => self.pairs.push(pair),
        }
    }

    /// Removes `key` from the map, returning the value bytes if it was present.
    pub fn remove(&mut self, key: &raw::Key) -> Option<Vec<u8>> {
        let index = self.pairs.iter().position(|pair| pair.key == *key)?;
        Some(self.pairs.remove(index).value)
    }

    /// Removes every pair whose keytype is `type_value`, returning how many were removed.
    pub fn remove_type(&mut self, type_value: u8) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|pair| pair.key.type_value != type_value);
        before - self.pairs.len()
    }

    /// Decodes a map from `r`, consuming pairs up to and including the `0x00` separator.
    pub(crate) fn decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, DecodeError> {
        let mut map = KeyMap::new();
        loop {
            match raw::Pair::decode(r) {
                Ok(pair) => map.insert(pair)?,
                Err(serialize::Error::NoMorePairs) => break,
                Err(e) => return Err(DecodeError::Pair(e)),
            }
        }
        Ok(map)
    }

    /// Serializes the map, each pair in insertion order followed by the `0x00` separator.
    pub fn serialize_map(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for pair in self.pairs() {
            buf.extend(pair.serialize());
        }
        buf.push(0x00_u8);
        buf
    }
}

/// Key already present in the map.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DuplicateKeyError(pub raw::Key);

impl fmt::Display for DuplicateKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "duplicate key: {}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DuplicateKeyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { None }
}

/// Error decoding one of the maps of a PSBT.
#[derive(Debug)]
#[non_exhaustive]
pub enum DecodeError {
    /// Error decoding a raw key-value pair.
    Pair(serialize::Error),
    /// Keys within a map must never repeat.
    DuplicateKey(raw::Key),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DecodeError::*;

        match *self {
            Pair(ref e) => write_err!(f, "error decoding key-value pair"; e),
            DuplicateKey(ref key) => write!(f, "duplicate key: {}", key),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use DecodeError::*;

        match *self {
            Pair(ref e) => Some(e),
            DuplicateKey(_) => None,
        }
    }
}

impl From<DuplicateKeyError> for DecodeError {
    fn from(e: DuplicateKeyError) -> Self { DecodeError::DuplicateKey(e.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Cursor;

    fn pair(type_value: u8, key: &[u8], value: &[u8]) -> raw::Pair {
        raw::Pair {
            key: raw::Key { type_value, key: key.to_vec() },
            value: value.to_vec(),
        }
    }

    #[test]
    fn insert_rejects_duplicate_key() {
        let mut map = KeyMap::new();
        map.insert(pair(0x01, b"k", b"v1")).unwrap();

        let err = map.insert(pair(0x01, b"k", b"v2")).unwrap_err();
        assert_eq!(err.0, raw::Key { type_value: 0x01, key: b"k".to_vec() });

        // Same type with different key data is a different key.
        map.insert(pair(0x01, b"other", b"v2")).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn set_replaces_value_in_place() {
        let mut map = KeyMap::new();
        map.insert(pair(0x01, b"", b"a")).unwrap();
        map.insert(pair(0x02, b"", b"b")).unwrap();

        map.set(pair(0x01, b"", b"z"));

        assert_eq!(map.get_singleton(0x01), Some(&b"z"[..]));
        let order: Vec<u8> = map.pairs().map(|p| p.key.type_value).collect();
        assert_eq!(order, vec![0x01, 0x02]);
    }

    #[test]
    fn remove_returns_old_value() {
        let mut map = KeyMap::new();
        map.insert(pair(0x03, b"", b"gone")).unwrap();

        assert_eq!(map.remove(&raw::Key::singleton(0x03)), Some(b"gone".to_vec()));
        assert_eq!(map.remove(&raw::Key::singleton(0x03)), None);
        assert!(map.is_empty());
    }

    #[test]
    fn remove_type_filters_all_matching_pairs() {
        let mut map = KeyMap::new();
        map.insert(pair(0x02, b"a", b"sig1")).unwrap();
        map.insert(pair(0x02, b"b", b"sig2")).unwrap();
        map.insert(pair(0x03, b"", b"keep")).unwrap();

        assert_eq!(map.remove_type(0x02), 2);
        assert_eq!(map.len(), 1);
        assert!(map.get_singleton(0x03).is_some());
    }

    #[test]
    fn decode_serialize_roundtrip_preserves_order() {
        let mut map = KeyMap::new();
        map.insert(pair(0x0e, b"", &[0xaa; 32])).unwrap();
        map.insert(pair(0x0f, b"", &[0x01, 0x00, 0x00, 0x00])).unwrap();
        map.insert(pair(0xfc, b"id", b"value")).unwrap();

        let ser = map.serialize_map();
        assert_eq!(*ser.last().unwrap(), 0x00);

        let decoded = KeyMap::decode(&mut Cursor::new(ser.clone())).unwrap();
        assert_eq!(decoded, map);
        assert_eq!(decoded.serialize_map(), ser);
    }

    #[test]
    fn decode_rejects_duplicate_key() {
        let mut ser = Vec::new();
        ser.extend(pair(0x01, b"", b"a").serialize());
        ser.extend(pair(0x01, b"", b"b").serialize());
        ser.push(0x00);

        let err = KeyMap::decode(&mut Cursor::new(ser)).unwrap_err();
        assert!(matches!(err, DecodeError::DuplicateKey(_)));
    }

    #[test]
    fn empty_map_serializes_to_lone_separator() {
        let map = KeyMap::new();
        assert_eq!(map.serialize_map(), vec![0x00]);

        let decoded = KeyMap::decode(&mut Cursor::new(vec![0x00])).unwrap();
        assert!(decoded.is_empty());
    }
}
