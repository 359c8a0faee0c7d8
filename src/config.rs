//! Engine configuration, persisted at reserved record 0 (§3).
//!
//! Mirrors `engine.py.__init__`'s `self.config = copy.copy(DEFAULTS);
//! self.config.update(stored)` merge: defaults are baked into the binary,
//! and whatever is found on disk overrides them field by field rather than
//! replacing the whole struct, so upgrading the defaults doesn't require a
//! migration for stores that predate a new field.

use crate::codec::{dict, Value};
use crate::error::Result;

pub const RECORD_CONFIG: u64 = 0;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Max candidate words tracked by the partial-match wordblob.
    pub partial_list_len: u64,
    /// Minimum documents a word must appear in before it is offered as a
    /// partial-match candidate.
    pub partial_min_hits: u64,
    /// Shortest word length eligible for partial matching.
    pub partial_shortest: u64,
    /// Longest word length eligible for partial matching.
    pub partial_longest: u64,
    /// Max candidates returned for one partial-match query.
    pub partial_matches: u64,
    /// Size of the reserved, direct-mapped L1 keyword region.
    pub l1_keywords: u64,
    /// Number of hashed L2 keyword buckets.
    pub l2_buckets: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            partial_list_len: 1_000_000,
            partial_min_hits: 3,
            partial_shortest: 6,
            partial_longest: 32,
            partial_matches: 25,
            l1_keywords: 512_000,
            l2_buckets: 40 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Apply the stored dict on top of the defaults, field by field.
    pub fn merge(&mut self, stored: &Value) {
        macro_rules! merge_field {
            ($field:ident) => {
                if let Some(v) = stored.get(stringify!($field)).and_then(Value::as_uint) {
                    self.$field = v;
                }
            };
        }
        merge_field!(partial_list_len);
        merge_field!(partial_min_hits);
        merge_field!(partial_shortest);
        merge_field!(partial_longest);
        merge_field!(partial_matches);
        merge_field!(l1_keywords);
        merge_field!(l2_buckets);
    }

    pub fn to_value(&self) -> Value {
        dict([
            ("partial_list_len", Value::UInt(self.partial_list_len)),
            ("partial_min_hits", Value::UInt(self.partial_min_hits)),
            ("partial_shortest", Value::UInt(self.partial_shortest)),
            ("partial_longest", Value::UInt(self.partial_longest)),
            ("partial_matches", Value::UInt(self.partial_matches)),
            ("l1_keywords", Value::UInt(self.l1_keywords)),
            ("l2_buckets", Value::UInt(self.l2_buckets)),
        ])
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_value().encode(&mut buf)?;
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Config> {
        let mut config = Config::default();
        if !buf.is_empty() {
            let (value, _) = Value::decode(buf)?;
            config.merge(&value);
        }
        Ok(config)
    }

    /// First record number available to the L1 keyword region, directly
    /// following the reserved wordblob/history records.
    pub fn l1_begin(&self) -> u64 {
        2001
    }

    pub fn l1_end(&self) -> u64 {
        self.l1_begin() + self.l1_keywords
    }

    pub fn l2_begin(&self) -> u64 {
        self.l1_end()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
