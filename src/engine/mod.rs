//! The search engine itself (§4.4): two-tier keyword placement, mutation
//! with undo/redo history, tag rename, versioning, and the query
//! evaluator.
//!
//! Grounded on `engine.py`'s `SearchEngine` class for the operation set,
//! and on the teacher's composing-module style (`src/llrb/mod.rs`,
//! `src/dgm.rs`: one struct wrapping a handful of collaborating
//! sub-modules behind a single public API) for how the pieces fit
//! together. Concurrency (§5) is a single reentrant lock around every
//! mutating and reading method — there is no lock-free sharing here, so
//! a plain `std::sync::Mutex` stands in for `rdms`'s MVCC machinery.

pub mod history;
pub mod magic;
pub mod query;

use std::{
    path::Path,
    sync::Mutex,
};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::bucket::PostingListBucket;
use crate::codec::Value;
use crate::config::{Config, RECORD_CONFIG};
use crate::error::{Error, Result};
use crate::intset::IntSet;
use crate::store::Store;
use crate::wordblob::Wordblob;

use history::{allocate_history_slot, historic_mutations, Change, HistoryEntry};
use query::{explain, parse_terms, parse_terms_in_namespace, IdSpec, OpTree};

const RECORD_WORDBLOB: u64 = 1;
/// Additional per-field address wordblobs (§3), e.g. To/From/Cc
/// autocomplete kept separate from the primary body wordblob so a
/// contacts-style lookup never surfaces unrelated body terms.
const RECORD_EMAIL_WORDBLOBS: [u64; 3] = [2, 3, 4];
const RECORD_COUNTERS: u64 = 5;
const RECORD_GLOBAL_ALL: u64 = 6;

const GLOBAL_ALL_KEYWORD: &str = "__all__";

/// `in:@NS` is the membership set of namespace `NS` (§3).
fn namespace_all_keyword(namespace: &str) -> String {
    format!("in:@{}", namespace)
}

/// True tag keywords get a guaranteed, non-colliding L1 slot. The
/// `in:@NS` namespace-membership bookkeeping keyword deliberately
/// doesn't — it's not part of the caller-facing tag budget, so it falls
/// back to the shared, hashed L2 region (as does the single global `ALL`
/// accumulator, routed through its own fixed reserved record instead).
fn is_l1_keyword(keyword: &str) -> bool {
    match keyword.strip_prefix("in:") {
        Some(rest) => !rest.starts_with('@'),
        None => false,
    }
}

/// `in:urgent@work` lives in namespace `work` (§3's `in:<tag>@NS`);
/// `in:inbox` has none. Used to keep `in:@NS` up to date without
/// scanning every tag at query time.
fn tag_namespace(keyword: &str) -> Option<&str> {
    let rest = keyword.strip_prefix("in:")?;
    let at = rest.rfind('@')?;
    let (tag, namespace) = (&rest[..at], &rest[at + 1..]);
    if tag.is_empty() || namespace.is_empty() {
        None
    } else {
        Some(namespace)
    }
}

/// Normalize a caller-supplied keyword the way `add_results`/`del_results`
/// do before resolving it to a bucket (§4.4): drop stray `*` (reserved for
/// wildcard queries), rewrite the `tag:` input alias to `in:`, and suffix
/// `in:…` tags with the active namespace's `@NS` unless already qualified.
fn normalize_keyword(keyword: &str, namespace: Option<&str>) -> String {
    let stripped: String = keyword.chars().filter(|&c| c != '*').collect();
    let aliased = match stripped.strip_prefix("tag:") {
        Some(body) => format!("in:{}", body),
        None => stripped,
    };
    match (namespace, aliased.starts_with("in:") && !aliased.contains('@')) {
        (Some(ns), true) => format!("{}@{}", aliased, ns),
        _ => aliased,
    }
}

/// `op` in a `mutate` entry (§4.4, §9's `MutationScope`/operator sketch):
/// union adds `scope_set`'s members to a keyword's posting list, subtract
/// removes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutateOp {
    Union,
    Subtract,
}

/// `scope_set` in a `mutate` entry: either the id set a union/subtract is
/// scoped to, or a JSON object patch applied to the touched keywords'
/// comments instead of their posting lists (§4.4 step 4).
#[derive(Clone, Debug)]
pub enum MutationScope {
    Ids(IntSet),
    CommentPatch(serde_json::Map<String, serde_json::Value>),
}

/// One `(scope_set, [(op, keyword)])` entry of a `mutate` call's `mlist`.
pub type MutationEntry = (MutationScope, Vec<(MutateOp, String)>);

/// Result of a `mutate` call: how many `(op, keyword)` pairs were applied,
/// the union of ids whose membership in some touched keyword actually
/// flipped, and the history id the whole transaction was recorded under.
#[derive(Clone, Debug)]
pub struct MutateResult {
    pub mutations: usize,
    pub changed: IntSet,
    pub history: u64,
}

/// The `in:*` wildcard operand (§4.4 step 1 of `mutate`): expands to every
/// tag in the active namespace for a subtract; using it with a union is an
/// error, since that would mean fabricating an unbounded number of tags
/// from one call.
const WILDCARD_TAG: &str = "in:*";

struct Inner {
    store: Store,
    config: Config,
    wordblob: Wordblob,
    email_wordblobs: [Wordblob; 3],
    version: u64,
    l1_count: u64,
}

pub struct SearchEngine {
    inner: Mutex<Inner>,
}

impl SearchEngine {
    pub fn open(dir: &Path, encryption_keys: &[[u8; 32]]) -> Result<SearchEngine> {
        let mut store = Store::open(dir, encryption_keys)?;

        let config = match store.get(RECORD_CONFIG)? {
            Some(buf) => Config::decode(&buf)?,
            None => {
                let config = Config::default();
                store.set(RECORD_CONFIG, &config.encode()?)?;
                config
            }
        };

        let mut wordblob = Wordblob::create_part_space(&config);
        if let Some(buf) = store.get(RECORD_WORDBLOB)? {
            let (value, _) = Value::decode(&buf)?;
            wordblob.load_value(&value);
        }

        let mut email_wordblobs = [
            Wordblob::create_part_space(&config),
            Wordblob::create_part_space(&config),
            Wordblob::create_part_space(&config),
        ];
        for (blob, record) in email_wordblobs.iter_mut().zip(RECORD_EMAIL_WORDBLOBS) {
            if let Some(buf) = store.get(record)? {
                let (value, _) = Value::decode(&buf)?;
                blob.load_value(&value);
            }
        }

        let (version, l1_count) = match store.get(RECORD_COUNTERS)? {
            Some(buf) => {
                let (value, _) = Value::decode(&buf)?;
                (
                    value.get("version").and_then(Value::as_uint).unwrap_or(0),
                    value.get("l1_count").and_then(Value::as_uint).unwrap_or(0),
                )
            }
            None => (0, 0),
        };

        Ok(SearchEngine {
            inner: Mutex::new(Inner {
                store,
                config,
                wordblob,
                email_wordblobs,
                version,
                l1_count,
            }),
        })
    }

    pub fn close(self) -> Result<()> {
        let inner = self.inner.into_inner().map_err(|_| Error::StorageError("poisoned engine lock".into()))?;
        inner.store.close()
    }

    pub fn flush(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.persist_counters()?;
        let mut buf = Vec::new();
        inner.wordblob.to_value().encode(&mut buf)?;
        inner.store.set(RECORD_WORDBLOB, &buf)?;
        for (blob, record) in inner.email_wordblobs.iter().zip(RECORD_EMAIL_WORDBLOBS) {
            let mut buf = Vec::new();
            blob.to_value().encode(&mut buf)?;
            inner.store.set(record, &buf)?;
        }
        inner.store.flush()
    }

    pub fn delete_everything(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.store.delete_everything()?;
        inner.version = 0;
        inner.l1_count = 0;
        inner.wordblob = Wordblob::create_part_space(&inner.config);
        inner.email_wordblobs = [
            Wordblob::create_part_space(&inner.config),
            Wordblob::create_part_space(&inner.config),
            Wordblob::create_part_space(&inner.config),
        ];
        inner.store.set(RECORD_CONFIG, &inner.config.encode()?)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::StorageError("poisoned engine lock".into()))
    }

    /// Resolve a keyword to the record number holding its posting list.
    /// Tag keywords (`in:` prefix, plus the reserved `ALL` accumulators)
    /// live one-per-record in the direct-mapped L1 region; everything
    /// else hashes into the shared L2 region.
    pub fn keyword_index(&self, keyword: &str) -> Result<u64> {
        let mut inner = self.lock()?;
        inner.keyword_index(keyword)
    }

    pub fn get_version(&self) -> Result<u64> {
        Ok(self.lock()?.version)
    }

    /// Union `ids` into `keyword`'s posting list, recording the change as
    /// a new history entry and tagging every id with the current version.
    pub fn add_results(&self, keyword: &str, ids: &IntSet) -> Result<u64> {
        let mut inner = self.lock()?;
        log::debug!("add_results: {} ids into {:?}", ids.len(), keyword);
        let change = inner.apply_change(keyword, |bucket, kw| bucket.add(kw, ids))?;
        if let Some(namespace) = tag_namespace(keyword) {
            inner.union_into_namespace_all(namespace, ids)?;
        }
        let history_id = inner.record_history(vec![change], "add_results")?;
        inner.touch_locked(ids)?;
        Ok(history_id)
    }

    pub fn del_results(&self, keyword: &str, ids: &IntSet) -> Result<u64> {
        let mut inner = self.lock()?;
        log::debug!("del_results: {} ids from {:?}", ids.len(), keyword);
        let change = inner.apply_change(keyword, |bucket, kw| bucket.remove(kw, ids))?;
        let history_id = inner.record_history(vec![change], "del_results")?;
        inner.touch_locked(ids)?;
        Ok(history_id)
    }

    /// `add_results`, but normalizing `keyword` first (§4.4's add_results
    /// step 1): strips stray `*`, rewrites the `tag:` alias to `in:`, and
    /// suffixes `in:…` tags with `namespace`'s `@NS` unless already
    /// qualified. The `@NS` suffix is what makes `add_results`'s own
    /// namespace-membership bookkeeping (`in:@NS`) fire.
    pub fn add_results_in_namespace(
        &self,
        keyword: &str,
        ids: &IntSet,
        namespace: Option<&str>,
    ) -> Result<u64> {
        self.add_results(&normalize_keyword(keyword, namespace), ids)
    }

    /// `del_results`, normalized the same way as [`SearchEngine::add_results_in_namespace`].
    pub fn del_results_in_namespace(
        &self,
        keyword: &str,
        ids: &IntSet,
        namespace: Option<&str>,
    ) -> Result<u64> {
        self.del_results(&normalize_keyword(keyword, namespace), ids)
    }

    /// Apply a batch of scope-relative posting-list unions/subtracts (or
    /// comment-JSON patches) as one history transaction (§4.4's
    /// `mutate(mlist, record_history?, tag_namespace?)`): `mlist` is
    /// `[(scope_set, [(op, keyword)])]`. A `scope_set` of
    /// [`MutationScope::Ids`] unions/subtracts those ids into/out of each
    /// keyword's current posting list; a [`MutationScope::CommentPatch`]
    /// merges (union) or removes (subtract) keys in each keyword's
    /// comment JSON instead, writing no `IntSet`. `in:*` expands to every
    /// tag in `tag_namespace` for a subtract and is an error for a union.
    /// Every id whose membership in some keyword actually flipped is
    /// touched once at the end, bumping the version counter exactly once
    /// per `mutate` call regardless of how many keywords it touched.
    pub fn mutate(
        &self,
        mlist: &[MutationEntry],
        record_history: Option<&str>,
        tag_namespace: Option<&str>,
    ) -> Result<MutateResult> {
        let mut inner = self.lock()?;

        let mut plan = Vec::with_capacity(mlist.len());
        for (scope, ops) in mlist {
            plan.push((scope, inner.expand_wildcard_ops(ops, tag_namespace)?));
        }

        let mut changes = vec![];
        let mut changed = IntSet::new();
        let mut mutations = 0usize;

        for (scope, ops) in &plan {
            match scope {
                MutationScope::Ids(scope_set) => {
                    for (op, keyword) in ops {
                        mutations += 1;
                        if let Some(change) = inner.apply_scoped_change(keyword, *op, scope_set)? {
                            let mut flipped = change.iset_before.clone();
                            flipped ^= &change.oset_after;
                            changed |= &flipped;
                            changes.push(change);
                        }
                    }
                }
                MutationScope::CommentPatch(patch) => {
                    for (op, keyword) in ops {
                        mutations += 1;
                        inner.patch_comment(keyword, *op, patch)?;
                    }
                }
            }
        }

        let history_id = inner.record_history(changes, record_history.unwrap_or("mutate"))?;
        inner.touch_locked(&changed)?;

        Ok(MutateResult {
            mutations,
            changed,
            history: history_id,
        })
    }

    pub fn set_tag_comment(&self, keyword: &str, comment: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let record = inner.keyword_index(keyword)?;
        let mut bucket = inner.load_bucket(record)?;
        bucket.set_comment(keyword, comment)?;
        inner.store.set(record, &bucket.encode()?)?;
        Ok(())
    }

    pub fn get_tag(&self, keyword: &str) -> Result<Option<(IntSet, String)>> {
        let mut inner = self.lock()?;
        let record = inner.keyword_index(keyword)?;
        let bucket = inner.load_bucket(record)?;
        Ok(bucket
            .get_with_comment(keyword)
            .map(|(iset, comment)| (iset.clone(), comment.to_string())))
    }

    /// Move an L1 tag keyword's posting list and comment to a new keyword
    /// name without touching the ids it carries, by relabeling the
    /// record's stored keyword and re-pointing the key→record map (§4.4).
    pub fn rename_l1(&self, old_keyword: &str, new_keyword: &str) -> Result<()> {
        let mut inner = self.lock()?;
        if !is_l1_keyword(old_keyword) || !is_l1_keyword(new_keyword) {
            return Err(Error::PermissionError(
                "rename_l1 only applies to L1 (in:) keywords".into(),
            ));
        }
        let record = inner.keyword_index(old_keyword)?;
        let old_bucket = inner.load_bucket(record)?;
        let iset = old_bucket.get(old_keyword).cloned().unwrap_or_default();
        let comment = old_bucket.get_comment(old_keyword).unwrap_or("").to_string();

        let mut new_bucket = PostingListBucket::new();
        new_bucket.set(new_keyword, iset)?;
        if !comment.is_empty() {
            new_bucket.set_comment(new_keyword, &comment)?;
        }
        inner.store.set(record, &new_bucket.encode()?)?;
        inner.store.del_key(old_keyword);
        inner.store.set_key(new_keyword, record);
        Ok(())
    }

    /// Bump the global version counter and tag every id in `ids` with the
    /// resulting version keywords (§4.4's `touch`).
    pub fn touch(&self, ids: &IntSet) -> Result<u64> {
        let mut inner = self.lock()?;
        inner.touch_locked(ids)
    }

    /// Undo (`undo = true`) or redo (`undo = false`) `history_id` by
    /// replaying its recorded `(keyword, add_bits, sub_bits)` decomposition
    /// through [`SearchEngine::mutate`] as a fresh transaction (§4.4: "undo
    /// is implemented by composition, not a separate code path") — so an
    /// undo bumps the version counter and creates its own history entry,
    /// exactly like any other mutation.
    pub fn historic_mutate(&self, history_id: u64, undo: bool) -> Result<MutateResult> {
        let entry = {
            let mut inner = self.lock()?;
            let slot = history::RING_BEGIN + (history_id % history::RING_SIZE);
            let buf = inner
                .store
                .get(slot)?
                .ok_or_else(|| Error::NotFound(format!("history id {}", history_id)))?;
            let entry = HistoryEntry::decode(&buf)?;
            if entry.id != history_id {
                return Err(Error::NotFound(format!(
                    "history id {} was overwritten by the ring",
                    history_id
                )));
            }
            entry
        };

        let mlist: Vec<MutationEntry> = historic_mutations(&entry, undo)
            .into_iter()
            .flat_map(|(keyword, _record, add_bits, sub_bits)| {
                let mut ops = vec![];
                if !add_bits.is_empty() {
                    ops.push((MutationScope::Ids(add_bits.clone()), vec![(MutateOp::Union, keyword.clone())]));
                }
                if !sub_bits.is_empty() {
                    ops.push((MutationScope::Ids(sub_bits), vec![(MutateOp::Subtract, keyword)]));
                }
                ops
            })
            .collect();

        let comment = if undo { "undo" } else { "redo" };
        self.mutate(&mlist, Some(comment), None)
    }

    pub fn iter_tags(&self, namespace: Option<&str>) -> Result<Vec<String>> {
        let mut inner = self.lock()?;
        inner.list_tags(namespace)
    }

    pub fn candidates(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.lock()?.wordblob.candidates(prefix))
    }

    pub fn update_terms(&self, text: &str) -> Result<()> {
        self.lock()?.wordblob.update_terms(text);
        Ok(())
    }

    /// Feed `text` into one of the three additional per-field address
    /// wordblobs (§3's reserved records 2-4), e.g. separate To/From/Cc
    /// autocomplete pools kept apart from the primary body wordblob.
    pub fn update_email_terms(&self, field: usize, text: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let blob = inner
            .email_wordblobs
            .get_mut(field)
            .ok_or_else(|| Error::InvalidQuery(format!("email wordblob field out of range: {}", field)))?;
        blob.update_terms(text);
        Ok(())
    }

    /// Candidate words from one of the three additional per-field address
    /// wordblobs, the same `*`-wildcard matching as [`SearchEngine::candidates`].
    pub fn email_candidates(&self, field: usize, pattern: &str) -> Result<Vec<String>> {
        let inner = self.lock()?;
        let blob = inner
            .email_wordblobs
            .get(field)
            .ok_or_else(|| Error::InvalidQuery(format!("email wordblob field out of range: {}", field)))?;
        Ok(blob.candidates(pattern))
    }

    pub fn search(&self, query: &str) -> Result<IntSet> {
        self.search_in_namespace(query, None)
    }

    /// Scope `query` to `namespace` (§4.4's `tag_namespace` parameter):
    /// bare `in:`/`tag:` terms inside the query get the namespace's `@NS`
    /// suffix, and the whole result is intersected with the namespace's
    /// membership set so a query can never leak ids from outside it.
    pub fn search_in_namespace(&self, query: &str, namespace: Option<&str>) -> Result<IntSet> {
        let tree = parse_terms_in_namespace(query, namespace)?;
        let tree = match namespace {
            Some(ns) => OpTree::And(vec![tree, OpTree::All(Some(ns.to_string()))]),
            None => tree,
        };
        let mut inner = self.lock()?;
        inner.eval(&tree)
    }

    pub fn search_tags(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .iter_tags(None)?
            .into_iter()
            .filter(|t| t.starts_with(prefix))
            .collect())
    }

    pub fn explain_query(&self, query: &str) -> Result<String> {
        Ok(explain(&parse_terms(query)?))
    }
}

impl Inner {
    fn persist_counters(&mut self) -> Result<()> {
        let mut buf = Vec::new();
        crate::codec::dict([
            ("version", Value::UInt(self.version)),
            ("l1_count", Value::UInt(self.l1_count)),
        ])
        .encode(&mut buf)?;
        self.store.set(RECORD_COUNTERS, &buf)
    }

    fn keyword_index(&mut self, keyword: &str) -> Result<u64> {
        if keyword == GLOBAL_ALL_KEYWORD {
            return Ok(RECORD_GLOBAL_ALL);
        }
        if is_l1_keyword(keyword) {
            if let Some(record) = self.store.get_by_key(keyword) {
                return Ok(record);
            }
            if self.l1_count >= self.config.l1_keywords {
                return Err(Error::StorageError("L1 region exhausted".into()));
            }
            let record = self.config.l1_begin() + self.l1_count;
            self.l1_count += 1;
            self.store.set_key(keyword, record);
            self.persist_counters()?;
            Ok(record)
        } else {
            let mut hasher = Sha256::new();
            hasher.update(keyword.as_bytes());
            let digest = hasher.finalize();
            let bucket_hash = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
            Ok(self.config.l2_begin() + (bucket_hash as u64 % self.config.l2_buckets))
        }
    }

    fn load_bucket(&mut self, record: u64) -> Result<PostingListBucket> {
        match self.store.get(record)? {
            Some(buf) => PostingListBucket::decode(&buf),
            None => Ok(PostingListBucket::new()),
        }
    }

    fn apply_change<F>(&mut self, keyword: &str, f: F) -> Result<Change>
    where
        F: FnOnce(&mut PostingListBucket, &str) -> Result<()>,
    {
        let record = self.keyword_index(keyword)?;
        let mut bucket = self.load_bucket(record)?;
        let iset_before = bucket.get(keyword).cloned().unwrap_or_default();

        f(&mut bucket, keyword)?;

        let oset_after = bucket.get(keyword).cloned().unwrap_or_default();
        self.store.set(record, &bucket.encode()?)?;

        Ok(Change {
            keyword: keyword.to_string(),
            record,
            iset_before,
            oset_after,
        })
    }

    fn record_history(&mut self, changes: Vec<Change>, comment: &str) -> Result<u64> {
        let id = allocate_history_slot(&mut self.store)?;
        let entry = HistoryEntry {
            id,
            ts: Utc::now().timestamp(),
            comment: comment.to_string(),
            version: self.version,
            changes,
        };
        let slot = history::RING_BEGIN + (id % history::RING_SIZE);
        self.store.set(slot, &entry.encode()?)?;
        Ok(id)
    }

    fn touch_locked(&mut self, ids: &IntSet) -> Result<u64> {
        self.version += 1;
        self.persist_counters()?;

        for keyword in magic::version_to_keywords(self.version) {
            let record = self.keyword_index(&keyword)?;
            let mut bucket = self.load_bucket(record)?;
            bucket.add(&keyword, ids)?;
            self.store.set(record, &bucket.encode()?)?;
        }

        let record = self.keyword_index(GLOBAL_ALL_KEYWORD)?;
        let mut bucket = self.load_bucket(record)?;
        bucket.add(GLOBAL_ALL_KEYWORD, ids)?;
        self.store.set(record, &bucket.encode()?)?;

        log::debug!("touch: bumped version to {} for {} ids", self.version, ids.len());
        Ok(self.version)
    }

    fn list_tags(&mut self, namespace: Option<&str>) -> Result<Vec<String>> {
        let begin = self.config.l1_begin();
        let end = self.config.l1_end();
        let records = self.store.records_in_range(begin, end);

        let mut tags = vec![];
        for record in records {
            let bucket = self.load_bucket(record)?;
            for kw in bucket.keywords() {
                let in_namespace = match namespace {
                    Some(ns) => kw.ends_with(&format!("@{}", ns)),
                    None => !kw.contains('@'),
                };
                if in_namespace {
                    tags.push(kw.to_string());
                }
            }
        }
        tags.sort();
        Ok(tags)
    }

    /// Expand `in:*` operands (§4.4 step 1 of `mutate`) into every tag in
    /// `tag_namespace`, each carrying the same op as the wildcard did.
    /// Erroring on a union keeps a single call from fabricating an
    /// unbounded number of fresh L1 tags.
    fn expand_wildcard_ops(
        &mut self,
        ops: &[(MutateOp, String)],
        tag_namespace: Option<&str>,
    ) -> Result<Vec<(MutateOp, String)>> {
        let mut expanded = Vec::with_capacity(ops.len());
        for (op, keyword) in ops {
            if keyword == WILDCARD_TAG {
                if *op == MutateOp::Union {
                    return Err(Error::PermissionError(
                        "in:* cannot be used with a union mutation".into(),
                    ));
                }
                for tag in self.list_tags(tag_namespace)? {
                    expanded.push((*op, tag));
                }
            } else {
                expanded.push((*op, keyword.clone()));
            }
        }
        Ok(expanded)
    }

    /// Union/subtract `scope_set` into/out of `keyword`'s posting list,
    /// recording the scope-masked before/after sets (§4.4 step 3:
    /// `(kw, idx, iset ∩ scope_set, oset ∩ scope_set)`) rather than the
    /// bucket's full state. A subtract against an L1 tag with no existing
    /// slot is a no-op (nothing to remove from), so it skips
    /// `keyword_index`'s allocate-on-demand path instead of fabricating a
    /// fresh tag slot just to subtract from it.
    fn apply_scoped_change(
        &mut self,
        keyword: &str,
        op: MutateOp,
        scope_set: &IntSet,
    ) -> Result<Option<Change>> {
        if op == MutateOp::Subtract && is_l1_keyword(keyword) && self.store.get_by_key(keyword).is_none() {
            return Ok(None);
        }

        let record = self.keyword_index(keyword)?;
        let mut bucket = self.load_bucket(record)?;
        let current = bucket.get(keyword).cloned().unwrap_or_default();
        let iset_before = IntSet::and(&[current, scope_set.clone()]);

        match op {
            MutateOp::Union => bucket.add(keyword, scope_set)?,
            MutateOp::Subtract => bucket.remove(keyword, scope_set)?,
        }

        let updated = bucket.get(keyword).cloned().unwrap_or_default();
        let oset_after = IntSet::and(&[updated, scope_set.clone()]);
        self.store.set(record, &bucket.encode()?)?;

        Ok(Some(Change {
            keyword: keyword.to_string(),
            record,
            iset_before,
            oset_after,
        }))
    }

    /// Merge (union) or remove (subtract) keys of `patch` in `keyword`'s
    /// comment, treated as a JSON object (§4.4 step 4's dict `scope_set`).
    /// A non-object or missing comment starts from an empty object.
    fn patch_comment(
        &mut self,
        keyword: &str,
        op: MutateOp,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let record = self.keyword_index(keyword)?;
        let mut bucket = self.load_bucket(record)?;
        let current = bucket.get_comment(keyword).unwrap_or("").to_string();

        let mut obj = if current.is_empty() {
            serde_json::Map::new()
        } else {
            match err_at!(Corruption, serde_json::from_str::<serde_json::Value>(&current))? {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            }
        };

        match op {
            MutateOp::Union => {
                for (k, v) in patch {
                    obj.insert(k.clone(), v.clone());
                }
            }
            MutateOp::Subtract => {
                for k in patch.keys() {
                    obj.remove(k);
                }
            }
        }

        let encoded = err_at!(Corruption, serde_json::to_string(&serde_json::Value::Object(obj)))?;
        bucket.set_comment(keyword, &encoded)?;
        self.store.set(record, &bucket.encode()?)?;
        Ok(())
    }

    fn union_into_namespace_all(&mut self, namespace: &str, ids: &IntSet) -> Result<()> {
        let keyword = namespace_all_keyword(namespace);
        let record = self.keyword_index(&keyword)?;
        let mut bucket = self.load_bucket(record)?;
        bucket.add(&keyword, ids)?;
        self.store.set(record, &bucket.encode()?)
    }

    fn eval(&mut self, tree: &OpTree) -> Result<IntSet> {
        match tree {
            OpTree::Term(kw) => {
                let record = self.keyword_index(kw)?;
                let bucket = self.load_bucket(record)?;
                Ok(bucket.get(kw).cloned().unwrap_or_default())
            }
            OpTree::And(items) => {
                let sets: Result<Vec<IntSet>> = items.iter().map(|i| self.eval(i)).collect();
                Ok(IntSet::and(&sets?))
            }
            OpTree::Or(items) => {
                let sets: Result<Vec<IntSet>> = items.iter().map(|i| self.eval(i)).collect();
                Ok(IntSet::or(&sets?))
            }
            OpTree::Not(inner) => {
                let universe = self.eval(&OpTree::All(None))?;
                let excluded = self.eval(inner)?;
                Ok(IntSet::sub(&universe, &excluded))
            }
            OpTree::Ids(specs) => {
                let mut iset = IntSet::new();
                for spec in specs {
                    match spec {
                        IdSpec::Single(n) => iset.add(*n as u32),
                        IdSpec::Range(a, b) => {
                            for n in *a..=*b {
                                iset.add(n as u32);
                            }
                        }
                    }
                }
                Ok(iset)
            }
            OpTree::All(None) => {
                let record = self.keyword_index(GLOBAL_ALL_KEYWORD)?;
                let bucket = self.load_bucket(record)?;
                Ok(bucket.get(GLOBAL_ALL_KEYWORD).cloned().unwrap_or_default())
            }
            OpTree::All(Some(ns)) => {
                let keyword = namespace_all_keyword(ns);
                let record = self.keyword_index(&keyword)?;
                let bucket = self.load_bucket(record)?;
                Ok(bucket.get(&keyword).cloned().unwrap_or_default())
            }
            OpTree::Wildcard(pattern) => {
                let candidates = self.wordblob.candidates(pattern);
                let mut sets = Vec::with_capacity(candidates.len());
                for candidate in &candidates {
                    let record = self.keyword_index(candidate)?;
                    let bucket = self.load_bucket(record)?;
                    sets.push(bucket.get(candidate).cloned().unwrap_or_default());
                }
                Ok(IntSet::or(&sets))
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
