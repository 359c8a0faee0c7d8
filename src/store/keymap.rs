//! `hash_key` and the secondary key→record-index map (§4.2).
//!
//! Arbitrary string keys (message ids, tag names) are hashed down to a
//! 16-byte digest before being used to look up a record, so the on-disk
//! map has a fixed-width key regardless of how long the caller's key text
//! is. Salted so two stores never produce colliding digests for the same
//! plaintext key, matching §4.2's "first 128 bits of SHA-256 keyed with a
//! per-store salt" wording.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::codec::Value;
use crate::error::Result;

pub type KeyHash = [u8; 16];

pub fn hash_key(salt: &[u8], key: &str) -> KeyHash {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// Maps a key's hash to the `(position, index)` of the record that holds
/// it: `position` is the record's byte offset in the data file, `index`
/// is its record number, kept alongside so a caller holding only the hash
/// can still invalidate the matching cache entry.
#[derive(Default, Clone)]
pub struct KeyMap {
    entries: BTreeMap<KeyHash, (u64, u32)>,
}

impl KeyMap {
    pub fn new() -> KeyMap {
        KeyMap::default()
    }

    pub fn get(&self, hash: &KeyHash) -> Option<(u64, u32)> {
        self.entries.get(hash).copied()
    }

    pub fn set(&mut self, hash: KeyHash, position: u64, index: u32) {
        self.entries.insert(hash, (position, index));
    }

    pub fn remove(&mut self, hash: &KeyHash) -> Option<(u64, u32)> {
        self.entries.remove(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_value(&self) -> Value {
        Value::List(
            self.entries
                .iter()
                .map(|(hash, (pos, idx))| {
                    Value::List(vec![
                        Value::Bytes(hash.to_vec()),
                        Value::UInt(*pos),
                        Value::UInt(*idx as u64),
                    ])
                })
                .collect(),
        )
    }

    pub fn from_value(value: &Value) -> Result<KeyMap> {
        let mut map = KeyMap::new();
        if let Some(items) = value.as_list() {
            for item in items {
                if let Some(fields) = item.as_list() {
                    if let (Some(Value::Bytes(hash)), Some(pos), Some(idx)) =
                        (fields.get(0), fields.get(1).and_then(Value::as_uint), fields.get(2).and_then(Value::as_uint))
                    {
                        if hash.len() == 16 {
                            let mut k = [0u8; 16];
                            k.copy_from_slice(hash);
                            map.set(k, pos, idx as u32);
                        }
                    }
                }
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
#[path = "keymap_test.rs"]
mod keymap_test;
