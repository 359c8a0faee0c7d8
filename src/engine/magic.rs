//! Term magic (§4.5): rewriting one query leaf into the keyword(s) it
//! actually expands to, and the reversible escaping tag values need to
//! survive round-tripping through the keyword index.
//!
//! Grounded on `engine.py`'s `tag_quote_magic`, `msgid_hash_magic`, and
//! `magic_terms`/`magic_candidates` tables, which apply a rewrite keyed
//! on whatever punctuation (`@`, `:`, `*`) appears in the leaf term.

use chrono::{DateTime, Datelike, Utc};
use percent_encoding::{percent_decode_str, AsciiSet, NON_ALPHANUMERIC};
use sha1::{Digest, Sha1};

/// Bytes that don't need escaping in a quoted tag: `[A-Za-z0-9._-]`.
const TAG_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'_')
    .remove(b'-');

/// Reversible percent-style escape of any byte outside
/// `[A-Za-z0-9._-]`, so a tag value can embed arbitrary text and still be
/// stored as one keyword-safe token.
pub fn tag_quote(raw: &str) -> String {
    percent_encoding::utf8_percent_encode(raw, TAG_SAFE).to_string()
}

pub fn tag_unquote(quoted: &str) -> String {
    percent_decode_str(quoted).decode_utf8_lossy().into_owned()
}

/// Expand a UTC timestamp into the date-bucket keywords a message gets
/// tagged with on ingest, from coarsest to finest: `year:`, `month:`,
/// `day:`, and an exact `vdate:` stamp.
pub fn ts_to_keywords(ts: DateTime<Utc>) -> Vec<String> {
    vec![
        format!("year:{:04}", ts.year()),
        format!("month:{:04}-{:02}", ts.year(), ts.month()),
        format!("day:{:04}-{:02}-{:02}", ts.year(), ts.month(), ts.day()),
        format!("vdate:{}", ts.timestamp()),
    ]
}

/// Power-of-two version buckets (`version:>=1`, `version:>=2`, ..) plus an
/// exact `version:<v>` keyword, so a range query like `version:>=1024` can
/// be answered by a single keyword lookup instead of scanning every
/// touched id.
pub fn version_to_keywords(version: u64) -> Vec<String> {
    let mut out = vec![format!("version:{}", version)];
    let mut bucket = 1u64;
    while bucket <= version {
        out.push(format!("version:>={}", bucket));
        match bucket.checked_mul(2) {
            Some(next) => bucket = next,
            None => break,
        }
    }
    out
}

/// 27-character base32-ish digest of a message id, used as the `mid:`
/// keyword so message ids of arbitrary length still fit one fixed-width
/// token.
pub fn msg_id_hash(msg_id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(msg_id.as_bytes());
    let digest = hasher.finalize();
    let encoded = base32_encode(&digest);
    encoded[..27].to_string()
}

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &b in bytes {
        buffer = (buffer << 8) | b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// A handful of fixed query rewrites, applied before a leaf term is
/// looked up directly: `is:unread` is really `-in:read`, `is:read` is
/// `in:read`, and so on. Expressed as a trait so callers (or a future
/// plugin) can register additional rewrites without touching the
/// evaluator (Design Note: "callable magic maps become a trait with one
/// `rewrite` method").
pub trait MagicRewrite {
    /// Return `Some(rewritten term)` if this term has a fixed
    /// replacement, `None` to leave it untouched.
    fn rewrite(&self, term: &str) -> Option<String>;
}

pub struct StatusMagic;

impl MagicRewrite for StatusMagic {
    fn rewrite(&self, term: &str) -> Option<String> {
        match term {
            "is:unread" => Some("-in:read".to_string()),
            "is:read" => Some("in:read".to_string()),
            "is:starred" => Some("in:starred".to_string()),
            "is:unstarred" => Some("-in:starred".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "magic_test.rs"]
mod magic_test;
