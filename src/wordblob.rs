//! Partial-match word blob (§4.4's wordblob bullets, §8 scenario 4).
//!
//! Unlike the keyword index, the wordblob never has to resolve a query to
//! document ids — it only has to answer "which candidate words could
//! complete this prefix", so it is kept as a plain in-memory sorted map
//! rather than anything store-backed. It is rebuilt from the keyword index
//! on demand (`update_terms`) rather than persisted incrementally, the
//! same relationship `engine.py`'s `create_part_space`/`update_terms` pair
//! has to the posting lists.

use std::collections::{BTreeMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::Config;

lazy_static! {
    /// Candidate words are plain alphanumeric runs; anything else (digits
    /// only, punctuation-heavy tokens) is noise for partial matching.
    static ref IGNORE_RE: Regex = Regex::new(r"^[0-9]+$").unwrap();
}

/// Does `word` contain every fragment in order, with the first/last
/// fragment anchored to the word's start/end unless that side is
/// wildcarded?
fn matches_wildcard(word: &str, fragments: &[&str], leading_wild: bool, trailing_wild: bool) -> bool {
    if fragments.is_empty() {
        return true;
    }
    let mut pos = 0usize;
    for (i, frag) in fragments.iter().enumerate() {
        match word[pos..].find(frag) {
            Some(offset) => {
                let abs = pos + offset;
                if i == 0 && !leading_wild && abs != 0 {
                    return false;
                }
                pos = abs + frag.len();
            }
            None => return false,
        }
    }
    if !trailing_wild && pos != word.len() {
        return false;
    }
    true
}

pub struct Wordblob {
    shortest: usize,
    longest: usize,
    min_hits: u64,
    matches: usize,
    list_len: usize,
    words: BTreeMap<String, u64>,
    blacklist: HashSet<String>,
}

impl Wordblob {
    pub fn create_part_space(config: &Config) -> Wordblob {
        Wordblob {
            shortest: config.partial_shortest as usize,
            longest: config.partial_longest as usize,
            min_hits: config.partial_min_hits,
            matches: config.partial_matches as usize,
            list_len: config.partial_list_len as usize,
            words: BTreeMap::new(),
            blacklist: HashSet::new(),
        }
    }

    /// Tokenize `text` into lowercase byte-keywords eligible for partial
    /// matching: alphanumeric runs within `[shortest, longest]` bytes,
    /// skipping pure-digit tokens and anything already in the blacklist.
    pub fn iter_byte_keywords<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(move |w| w.len() >= self.shortest && w.len() <= self.longest)
            .filter(|w| !IGNORE_RE.is_match(w))
            .map(|w| w.to_lowercase())
            .filter(move |w| !self.blacklist.contains(w))
    }

    /// Record one more occurrence of every eligible word in `text`.
    pub fn update_terms(&mut self, text: &str) {
        let words: Vec<String> = self.iter_byte_keywords(text).collect();
        for word in words {
            *self.words.entry(word).or_insert(0) += 1;
        }
        self.evict_if_over_capacity();
    }

    fn evict_if_over_capacity(&mut self) {
        while self.words.len() > self.list_len {
            let victim = self
                .words
                .iter()
                .min_by_key(|(_, hits)| **hits)
                .map(|(w, _)| w.clone());
            match victim {
                Some(w) => {
                    self.words.remove(&w);
                }
                None => break,
            }
        }
    }

    /// Seed the blob with words that should never be offered as dynamic
    /// partial-match candidates because they're already known to the
    /// caller through some other channel (e.g. a contacts list).
    pub fn add_static_terms<I: IntoIterator<Item = String>>(&mut self, words: I) {
        for w in words {
            self.blacklist.insert(w.to_lowercase());
        }
    }

    /// Seed the blacklist from a newline-delimited dictionary file's
    /// contents.
    pub fn add_dictionary_terms(&mut self, text: &str) {
        self.add_static_terms(text.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()));
    }

    /// Up to `partial_matches` candidate words matching `pattern`, which
    /// may contain `*` wildcards (§4.4, §8 scenario 4): `abc*` anchors at
    /// the start, `*abc` anchors at the end, `*abc*` is a plain substring
    /// search, and `abc*def` requires both fragments in order. A plain
    /// pattern with no `*` is a prefix search. Only words that have hit at
    /// least `partial_min_hits` documents are offered, shortest and
    /// most-frequent first.
    pub fn candidates(&self, pattern: &str) -> Vec<String> {
        let pattern = pattern.to_lowercase();
        if !pattern.contains('*') {
            return self.prefix_candidates(&pattern);
        }

        let leading_wild = pattern.starts_with('*');
        let trailing_wild = pattern.ends_with('*');
        let fragments: Vec<&str> = pattern.split('*').filter(|f| !f.is_empty()).collect();

        let mut hits: Vec<(&String, &u64)> = self
            .words
            .iter()
            .filter(|(_, hits)| **hits >= self.min_hits)
            .filter(|(w, _)| matches_wildcard(w, &fragments, leading_wild, trailing_wild))
            .collect();

        hits.sort_by(|(wa, ha), (wb, hb)| wa.len().cmp(&wb.len()).then(hb.cmp(ha)).then(wa.cmp(wb)));
        hits.into_iter()
            .take(self.matches)
            .map(|(w, _)| w.clone())
            .collect()
    }

    fn prefix_candidates(&self, prefix: &str) -> Vec<String> {
        let mut hits: Vec<(&String, &u64)> = self
            .words
            .range(prefix.to_string()..)
            .take_while(|(w, _)| w.starts_with(prefix))
            .filter(|(_, hits)| **hits >= self.min_hits)
            .collect();

        hits.sort_by(|(wa, ha), (wb, hb)| wa.len().cmp(&wb.len()).then(hb.cmp(ha)).then(wa.cmp(wb)));
        hits.into_iter()
            .take(self.matches)
            .map(|(w, _)| w.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Snapshot the learned word/hit counts and blacklist for persistence
    /// at the reserved wordblob record. Thresholds come from `Config`, not
    /// this value, so reopening a store with different config values
    /// doesn't require migrating the blob.
    pub fn to_value(&self) -> crate::codec::Value {
        use crate::codec::{dict, Value};
        dict([
            (
                "words",
                Value::List(
                    self.words
                        .iter()
                        .map(|(w, hits)| Value::List(vec![Value::Str(w.clone()), Value::UInt(*hits)]))
                        .collect(),
                ),
            ),
            (
                "blacklist",
                Value::List(self.blacklist.iter().map(|w| Value::Str(w.clone())).collect()),
            ),
        ])
    }

    pub fn load_value(&mut self, value: &crate::codec::Value) {
        if let Some(items) = value.get("words").and_then(crate::codec::Value::as_list) {
            for item in items {
                if let Some(fields) = item.as_list() {
                    if let (Some(word), Some(hits)) = (
                        fields.get(0).and_then(crate::codec::Value::as_str),
                        fields.get(1).and_then(crate::codec::Value::as_uint),
                    ) {
                        self.words.insert(word.to_string(), hits);
                    }
                }
            }
        }
        if let Some(items) = value.get("blacklist").and_then(crate::codec::Value::as_list) {
            for item in items {
                if let Some(word) = item.as_str() {
                    self.blacklist.insert(word.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "wordblob_test.rs"]
mod wordblob_test;
