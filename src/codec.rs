//! The "dumb codec": a small self-describing binary format used for every
//! persisted value that isn't a raw record blob — [`crate::config::Config`],
//! history-ring entries, tag-comment patches, and embedded [`IntSet`]s
//! (§3, §6).
//!
//! Grounded on the teacher's `Serialize` trait in `dlog_entry.rs`
//! (`encode(&self, buf: &mut Vec<u8>) -> Result<usize>` /
//! `decode(&mut self, buf: &[u8]) -> Result<usize>`) and its length-prefixed
//! batch framing. Unlike `dlog_entry.rs`'s fixed per-type layouts, values
//! here carry their own leading tag byte so one decoder can walk a `Dict` or
//! `List` of mixed content without a schema.

use std::collections::BTreeMap;
use std::convert::TryInto;

use crate::error::{Error, Result};
use crate::intset::IntSet;

const TAG_NULL: u8 = b'Z';
const TAG_BOOL: u8 = b'T';
const TAG_INT: u8 = b'i';
const TAG_UINT: u8 = b'u';
const TAG_BYTES: u8 = b'b';
const TAG_STR: u8 = b's';
const TAG_LIST: u8 = b'L';
const TAG_DICT: u8 = b'D';
const TAG_INTSET: u8 = b'I';
const TAG_COMPRESSED: u8 = b'c';

/// Dynamically typed value that the dumb codec can encode and decode.
/// Dict keys are themselves `Value`s (usually `Str`) to avoid a second,
/// narrower map type.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    IntSet(IntSet),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(n) => Some(*n),
            Value::Int(n) if *n >= 0 => Some(*n as u64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::UInt(n) => (*n).try_into().ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_intset(&self) -> Option<&IntSet> {
        match self {
            Value::IntSet(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a key in a `Dict` value by plain string, the common case for
    /// config and comment patches.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        match self {
            Value::Null => {
                buf.push(TAG_NULL);
                Ok(1)
            }
            Value::Bool(b) => {
                buf.push(TAG_BOOL);
                buf.push(if *b { 1 } else { 0 });
                Ok(2)
            }
            Value::Int(v) => {
                buf.push(TAG_INT);
                buf.extend_from_slice(&v.to_be_bytes());
                Ok(9)
            }
            Value::UInt(v) => {
                buf.push(TAG_UINT);
                buf.extend_from_slice(&v.to_be_bytes());
                Ok(9)
            }
            Value::Bytes(v) => {
                let len: u32 = err_len(v.len())?;
                buf.push(TAG_BYTES);
                buf.extend_from_slice(&len.to_be_bytes());
                buf.extend_from_slice(v);
                Ok(5 + v.len())
            }
            Value::Str(v) => {
                let len: u32 = err_len(v.len())?;
                buf.push(TAG_STR);
                buf.extend_from_slice(&len.to_be_bytes());
                buf.extend_from_slice(v.as_bytes());
                Ok(5 + v.len())
            }
            Value::List(items) => {
                let count: u32 = err_len(items.len())?;
                buf.push(TAG_LIST);
                buf.extend_from_slice(&count.to_be_bytes());
                let mut n = 5;
                for item in items {
                    n += item.encode(buf)?;
                }
                Ok(n)
            }
            Value::Dict(pairs) => {
                let count: u32 = err_len(pairs.len())?;
                buf.push(TAG_DICT);
                buf.extend_from_slice(&count.to_be_bytes());
                let mut n = 5;
                for (k, v) in pairs {
                    n += k.encode(buf)?;
                    n += v.encode(buf)?;
                }
                Ok(n)
            }
            Value::IntSet(iset) => {
                let raw = iset.encode();
                let len: u32 = err_len(raw.len())?;
                buf.push(TAG_INTSET);
                buf.extend_from_slice(&len.to_be_bytes());
                buf.extend_from_slice(&raw);
                Ok(5 + raw.len())
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<(Value, usize)> {
        check_remaining!(buf, 1, "codec-tag")?;
        match buf[0] {
            TAG_NULL => Ok((Value::Null, 1)),
            TAG_BOOL => {
                check_remaining!(buf, 2, "codec-bool")?;
                Ok((Value::Bool(buf[1] != 0), 2))
            }
            TAG_INT => {
                check_remaining!(buf, 9, "codec-int")?;
                let v = i64::from_be_bytes(buf[1..9].try_into().unwrap());
                Ok((Value::Int(v), 9))
            }
            TAG_UINT => {
                check_remaining!(buf, 9, "codec-uint")?;
                let v = u64::from_be_bytes(buf[1..9].try_into().unwrap());
                Ok((Value::UInt(v), 9))
            }
            TAG_BYTES => {
                let (len, hdr) = read_len(buf, "codec-bytes-len")?;
                check_remaining!(buf, hdr + len, "codec-bytes-body")?;
                Ok((Value::Bytes(buf[hdr..hdr + len].to_vec()), hdr + len))
            }
            TAG_STR => {
                let (len, hdr) = read_len(buf, "codec-str-len")?;
                check_remaining!(buf, hdr + len, "codec-str-body")?;
                let s = err_at!(Corruption, String::from_utf8(buf[hdr..hdr + len].to_vec()))?;
                Ok((Value::Str(s), hdr + len))
            }
            TAG_LIST => {
                let (count, mut n) = read_len(buf, "codec-list-count")?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let (item, used) = Value::decode(&buf[n..])?;
                    items.push(item);
                    n += used;
                }
                Ok((Value::List(items), n))
            }
            TAG_DICT => {
                let (count, mut n) = read_len(buf, "codec-dict-count")?;
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    let (k, used) = Value::decode(&buf[n..])?;
                    n += used;
                    let (v, used) = Value::decode(&buf[n..])?;
                    n += used;
                    pairs.push((k, v));
                }
                Ok((Value::Dict(pairs), n))
            }
            TAG_INTSET => {
                let (len, hdr) = read_len(buf, "codec-intset-len")?;
                check_remaining!(buf, hdr + len, "codec-intset-body")?;
                let iset = IntSet::decode(&buf[hdr..hdr + len])?;
                Ok((Value::IntSet(iset), hdr + len))
            }
            TAG_COMPRESSED => {
                let (len, hdr) = read_len(buf, "codec-compressed-len")?;
                check_remaining!(buf, hdr + len, "codec-compressed-body")?;
                let raw = err_at!(
                    StorageError,
                    zstd::stream::decode_all(&buf[hdr..hdr + len])
                )?;
                let (value, used) = Value::decode(&raw)?;
                if used != raw.len() {
                    return Err(Error::Corruption(format!(
                        "codec: trailing bytes after compressed value: {} of {}",
                        used,
                        raw.len()
                    )));
                }
                Ok((value, hdr + len))
            }
            tag => Err(Error::Corruption(format!("codec: unknown tag {:?}", tag))),
        }
    }

    /// Wrap this value with a zstd-compressed envelope (`c:<size>:<zstd>`
    /// in §6's shorthand). Used for large dict-shaped values like the
    /// wordblob's static term lists.
    pub fn encode_compressed(&self, level: i32) -> Result<Vec<u8>> {
        let mut inner = Vec::new();
        self.encode(&mut inner)?;
        let compressed = err_at!(StorageError, zstd::stream::encode_all(&inner[..], level))?;
        let mut out = Vec::with_capacity(compressed.len() + 5);
        let len: u32 = err_len(compressed.len())?;
        out.push(TAG_COMPRESSED);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }
}

fn err_len(n: usize) -> Result<u32> {
    err_at!(InvalidKey, n.try_into(), "codec: value exceeds u32 length")
}

fn read_len(buf: &[u8], ctx: &'static str) -> Result<(usize, usize)> {
    check_remaining!(buf, 5, ctx)?;
    let len = u32::from_be_bytes(buf[1..5].try_into().unwrap()) as usize;
    Ok((len, 5))
}

/// Build a `Dict` from `(&str, Value)` pairs, the common shape for config
/// and comment-patch records.
pub fn dict<I: IntoIterator<Item = (&'static str, Value)>>(pairs: I) -> Value {
    Value::Dict(
        pairs
            .into_iter()
            .map(|(k, v)| (Value::Str(k.to_string()), v))
            .collect(),
    )
}

/// Convenience: flatten a decoded `Dict` into a `BTreeMap<String, Value>`
/// for callers that want plain key lookups instead of linear scans.
pub fn dict_to_map(value: &Value) -> Result<BTreeMap<String, Value>> {
    match value {
        Value::Dict(pairs) => {
            let mut map = BTreeMap::new();
            for (k, v) in pairs {
                let key = k
                    .as_str()
                    .ok_or_else(|| Error::Corruption("codec: non-string dict key".into()))?
                    .to_string();
                map.insert(key, v.clone());
            }
            Ok(map)
        }
        _ => Err(Error::Corruption("codec: expected dict".into())),
    }
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
