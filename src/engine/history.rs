//! Undo/redo history ring (§3, §4.4).
//!
//! A mutation's effect on a posting list is recorded as the pair of sets
//! it saw (`iset_before`) and left behind (`oset_after`), not as a diff.
//! Replaying it forward or backward is then just picking which of the two
//! set differences is the "add" half and which is the "subtract" half —
//! the same `add_bits`/`sub_bits` decomposition `engine.py`'s
//! `historic_mutations` uses, which lets a mutation replay cleanly even if
//! the live bucket has drifted from the snapshot it was recorded against.

use crate::codec::Value;
use crate::error::{Error, Result};
use crate::intset::IntSet;
use crate::store::Store;

pub const RECORD_STATUS: u64 = 1000;
pub const RING_BEGIN: u64 = 1001;
pub const RING_SIZE: u64 = 1000;

#[derive(Clone)]
pub struct Change {
    pub keyword: String,
    pub record: u64,
    pub iset_before: IntSet,
    pub oset_after: IntSet,
}

impl Change {
    fn to_value(&self) -> Value {
        Value::List(vec![
            Value::Str(self.keyword.clone()),
            Value::UInt(self.record),
            Value::IntSet(self.iset_before.clone()),
            Value::IntSet(self.oset_after.clone()),
        ])
    }

    fn from_value(value: &Value) -> Result<Change> {
        let fields = value
            .as_list()
            .ok_or_else(|| Error::Corruption("history: change is not a list".into()))?;
        let keyword = fields
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Corruption("history: change missing keyword".into()))?
            .to_string();
        let record = fields
            .get(1)
            .and_then(Value::as_uint)
            .ok_or_else(|| Error::Corruption("history: change missing record".into()))?;
        let iset_before = fields
            .get(2)
            .and_then(Value::as_intset)
            .ok_or_else(|| Error::Corruption("history: change missing iset_before".into()))?
            .clone();
        let oset_after = fields
            .get(3)
            .and_then(Value::as_intset)
            .ok_or_else(|| Error::Corruption("history: change missing oset_after".into()))?
            .clone();
        Ok(Change {
            keyword,
            record,
            iset_before,
            oset_after,
        })
    }
}

#[derive(Clone)]
pub struct HistoryEntry {
    pub id: u64,
    pub ts: i64,
    pub comment: String,
    pub version: u64,
    pub changes: Vec<Change>,
}

impl HistoryEntry {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let value = Value::List(vec![
            Value::UInt(self.id),
            Value::Int(self.ts),
            Value::Str(self.comment.clone()),
            Value::UInt(self.version),
            Value::List(self.changes.iter().map(Change::to_value).collect()),
        ]);
        let mut buf = Vec::new();
        value.encode(&mut buf)?;
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<HistoryEntry> {
        let (value, _) = Value::decode(buf)?;
        let fields = value
            .as_list()
            .ok_or_else(|| Error::Corruption("history: entry is not a list".into()))?;
        let id = fields
            .get(0)
            .and_then(Value::as_uint)
            .ok_or_else(|| Error::Corruption("history: entry missing id".into()))?;
        let ts = fields
            .get(1)
            .and_then(Value::as_int)
            .ok_or_else(|| Error::Corruption("history: entry missing ts".into()))?;
        let comment = fields
            .get(2)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Corruption("history: entry missing comment".into()))?
            .to_string();
        let version = fields
            .get(3)
            .and_then(Value::as_uint)
            .ok_or_else(|| Error::Corruption("history: entry missing version".into()))?;
        let changes = fields
            .get(4)
            .and_then(Value::as_list)
            .ok_or_else(|| Error::Corruption("history: entry missing changes".into()))?
            .iter()
            .map(Change::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(HistoryEntry {
            id,
            ts,
            comment,
            version,
            changes,
        })
    }

    /// Ring slot this entry lives (or will live) at.
    pub fn slot(&self) -> u64 {
        RING_BEGIN + (self.id % RING_SIZE)
    }
}

/// Allocate the next history id, round-robining over the fixed-size ring
/// (records 1001..=2000). Overwriting a slot silently discards whatever
/// entry used to live there — the ring has no separate tombstone state.
pub fn allocate_history_slot(store: &mut Store) -> Result<u64> {
    let next_id = match store.get(RECORD_STATUS)? {
        Some(buf) => {
            let (value, _) = Value::decode(&buf)?;
            value.get("next_id").and_then(Value::as_uint).unwrap_or(0)
        }
        None => 0,
    };

    let mut buf = Vec::new();
    crate::codec::dict([("next_id", Value::UInt(next_id + 1))]).encode(&mut buf)?;
    store.set(RECORD_STATUS, &buf)?;

    log::debug!("history: allocated id {} at slot {}", next_id, RING_BEGIN + next_id % RING_SIZE);
    Ok(next_id)
}

/// For each change in `entry`, compute the `(add_bits, sub_bits)` to apply
/// against the live bucket's posting list for `keyword`. `undo = false`
/// replays the mutation forward (redo); `undo = true` reverses it by
/// swapping which side is added and which is subtracted.
pub fn historic_mutations(entry: &HistoryEntry, undo: bool) -> Vec<(String, u64, IntSet, IntSet)> {
    entry
        .changes
        .iter()
        .map(|c| {
            let (add_bits, sub_bits) = if undo {
                (
                    IntSet::sub(&c.iset_before, &c.oset_after),
                    IntSet::sub(&c.oset_after, &c.iset_before),
                )
            } else {
                (
                    IntSet::sub(&c.oset_after, &c.iset_before),
                    IntSet::sub(&c.iset_before, &c.oset_after),
                )
            };
            (c.keyword.clone(), c.record, add_bits, sub_bits)
        })
        .collect()
}

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;
