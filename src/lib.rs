//! maildex is a keyword posting-list search engine for mail-like
//! collections: documents are plain `u64` ids, every query term resolves
//! to an [`IntSet`] of matching ids through a two-tier keyword index, and
//! every mutation is recorded so it can be undone or redone.
//!
//! The module layout mirrors the pieces a caller assembles a store from:
//!
//! - [`intset`] — the roaring-bitmap id set every other module passes
//!   around.
//! - [`codec`] — the self-describing binary encoding used for every
//!   persisted value (config, history entries, wordblob snapshots, the
//!   store's own checkpoint).
//! - [`bucket`] — the posting-list bucket format: one record holds many
//!   keywords' id sets plus an optional comment per keyword.
//! - [`config`] — tunable thresholds, defaulted and merged from whatever
//!   a caller persisted previously.
//! - [`wordblob`] — the partial-match candidate index used for prefix
//!   autocomplete.
//! - [`store`] — encrypted, record-number-addressed append storage.
//! - [`engine`] — the `SearchEngine` that ties the above together:
//!   two-tier keyword placement, the query language, and history.

mod error;

pub mod bucket;
pub mod codec;
pub mod config;
pub mod engine;
pub mod intset;
pub mod store;
pub mod wordblob;

pub use crate::bucket::PostingListBucket;
pub use crate::codec::Value;
pub use crate::config::Config;
pub use crate::engine::{MutateOp, MutateResult, MutationEntry, MutationScope, SearchEngine};
pub use crate::error::{Error, Result};
pub use crate::intset::IntSet;
pub use crate::store::Store;
