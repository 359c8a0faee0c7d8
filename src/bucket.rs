//! Posting-list bucket: the record payload stored at every L1/L2 keyword
//! slot (§3, §4.3). A bucket packs zero or more `(keyword, comment, IntSet)`
//! triples into one record so that hash collisions in the L2 region don't
//! require a second lookup.
//!
//! Wire layout per entry, little-endian, no padding (§6):
//!
//! ```text
//! +----------+---------------+--------------+-----------+--------------+---------------+
//! | kw_len:2 | comment_len:2 | iset_len:4   | kw bytes  | comment bytes | iset bytes    |
//! +----------+---------------+--------------+-----------+--------------+---------------+
//! ```
//!
//! Grounded on the teacher's packed-record style in `robt/entry.rs`-family
//! code (length-prefixed fixed fields ahead of variable-length payloads).

use std::convert::TryInto;

use crate::check_remaining;
use crate::error::{Error, Result};
use crate::intset::IntSet;

struct Entry {
    keyword: String,
    comment: String,
    iset: IntSet,
}

/// An in-memory, decoded posting-list bucket. Entries preserve insertion
/// order, matching the Python original's list-backed bucket.
#[derive(Default)]
pub struct PostingListBucket {
    entries: Vec<Entry>,
}

impl PostingListBucket {
    pub fn new() -> PostingListBucket {
        PostingListBucket { entries: vec![] }
    }

    fn find(&self, keyword: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.keyword == keyword)
    }

    /// Keyword iteration without decoding any `IntSet` (§4.3: "iterate
    /// keywords present in a bucket without materializing every posting
    /// list" — used by `iter_tags`/`iter_byte_keywords`).
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.keyword.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, keyword: &str) -> Option<&IntSet> {
        self.find(keyword).map(|i| &self.entries[i].iset)
    }

    pub fn get_with_comment(&self, keyword: &str) -> Option<(&IntSet, &str)> {
        self.find(keyword)
            .map(|i| (&self.entries[i].iset, self.entries[i].comment.as_str()))
    }

    pub fn get_comment(&self, keyword: &str) -> Option<&str> {
        self.find(keyword).map(|i| self.entries[i].comment.as_str())
    }

    /// Replace (or insert) the posting list for `keyword`, preserving its
    /// existing comment. Dropping the entry entirely when both the set and
    /// the comment end up empty keeps a bucket from accumulating dead
    /// weight after repeated deletes (§4.3's drop invariant).
    pub fn set(&mut self, keyword: &str, iset: IntSet) -> Result<()> {
        check_kw_len(keyword)?;
        match self.find(keyword) {
            Some(i) => {
                self.entries[i].iset = iset;
                self.drop_if_empty(i);
            }
            None => {
                if !iset.is_empty() {
                    self.entries.push(Entry {
                        keyword: keyword.to_string(),
                        comment: String::new(),
                        iset,
                    });
                }
            }
        }
        Ok(())
    }

    /// Union `ids` into `keyword`'s posting list, creating the entry if
    /// absent.
    pub fn add(&mut self, keyword: &str, ids: &IntSet) -> Result<()> {
        check_kw_len(keyword)?;
        if ids.is_empty() {
            return Ok(());
        }
        match self.find(keyword) {
            Some(i) => self.entries[i].iset |= ids,
            None => self.entries.push(Entry {
                keyword: keyword.to_string(),
                comment: String::new(),
                iset: ids.clone(),
            }),
        }
        Ok(())
    }

    /// Remove `ids` from `keyword`'s posting list. Dropping the whole entry
    /// when it becomes empty and has no comment (§4.3).
    pub fn remove(&mut self, keyword: &str, ids: &IntSet) -> Result<()> {
        if let Some(i) = self.find(keyword) {
            self.entries[i].iset -= ids;
            self.drop_if_empty(i);
        }
        Ok(())
    }

    pub fn set_comment(&mut self, keyword: &str, comment: &str) -> Result<()> {
        check_kw_len(keyword)?;
        check_comment_len(comment)?;
        match self.find(keyword) {
            Some(i) => {
                self.entries[i].comment = comment.to_string();
                self.drop_if_empty(i);
            }
            None if !comment.is_empty() => self.entries.push(Entry {
                keyword: keyword.to_string(),
                comment: comment.to_string(),
                iset: IntSet::new(),
            }),
            None => {}
        }
        Ok(())
    }

    fn drop_if_empty(&mut self, i: usize) {
        if self.entries[i].iset.is_empty() && self.entries[i].comment.is_empty() {
            self.entries.remove(i);
        }
    }

    /// `items(decode)`: iterate `(keyword, comment, Option<IntSet>)`.
    /// `decode = false` skips the `IntSet` entirely (`None`), matching the
    /// "keyword iteration without IntSet decode" contract used by tag
    /// listing where only the keyword and comment matter.
    pub fn items(&self, decode: bool) -> Vec<(&str, &str, Option<&IntSet>)> {
        self.entries
            .iter()
            .map(|e| {
                (
                    e.keyword.as_str(),
                    e.comment.as_str(),
                    if decode { Some(&e.iset) } else { None },
                )
            })
            .collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for e in &self.entries {
            let kw = e.keyword.as_bytes();
            let comment = e.comment.as_bytes();
            let iset = e.iset.encode();

            let kw_len: u16 = err_at!(InvalidKey, kw.len().try_into(), "bucket keyword too long")?;
            let comment_len: u16 =
                err_at!(InvalidKey, comment.len().try_into(), "bucket comment too long")?;
            let iset_len: u32 =
                err_at!(InvalidKey, iset.len().try_into(), "bucket intset blob too long")?;

            buf.extend_from_slice(&kw_len.to_le_bytes());
            buf.extend_from_slice(&comment_len.to_le_bytes());
            buf.extend_from_slice(&iset_len.to_le_bytes());
            buf.extend_from_slice(kw);
            buf.extend_from_slice(comment);
            buf.extend_from_slice(&iset);
        }
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<PostingListBucket> {
        let mut entries = Vec::new();
        let mut pos = 0;
        while pos < buf.len() {
            check_remaining!(buf, pos + 8, "bucket-entry-hdr")?;
            let kw_len = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap()) as usize;
            let comment_len = u16::from_le_bytes(buf[pos + 2..pos + 4].try_into().unwrap()) as usize;
            let iset_len = u32::from_le_bytes(buf[pos + 4..pos + 8].try_into().unwrap()) as usize;
            pos += 8;

            check_remaining!(buf, pos + kw_len + comment_len + iset_len, "bucket-entry-body")?;
            let keyword = err_at!(
                Corruption,
                String::from_utf8(buf[pos..pos + kw_len].to_vec())
            )?;
            pos += kw_len;
            let comment = err_at!(
                Corruption,
                String::from_utf8(buf[pos..pos + comment_len].to_vec())
            )?;
            pos += comment_len;
            let iset = IntSet::decode(&buf[pos..pos + iset_len])?;
            pos += iset_len;

            entries.push(Entry {
                keyword,
                comment,
                iset,
            });
        }
        Ok(PostingListBucket { entries })
    }
}

fn check_kw_len(keyword: &str) -> Result<()> {
    if keyword.len() > u16::MAX as usize {
        return Err(Error::InvalidKey(format!(
            "keyword {:?} exceeds {} bytes",
            keyword,
            u16::MAX
        )));
    }
    Ok(())
}

fn check_comment_len(comment: &str) -> Result<()> {
    if comment.len() > u16::MAX as usize {
        return Err(Error::InvalidKey(format!(
            "comment for keyword exceeds {} bytes",
            u16::MAX
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "bucket_test.rs"]
mod bucket_test;
