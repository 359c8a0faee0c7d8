//! Compressed ordered set of non-negative integers (§4.1).
//!
//! Backed by [croaring], the same crate the teacher uses in
//! `bitmaps/croaring.rs` to implement a Bloom filter. Roaring bitmaps
//! already choose between array, bitmap, and run-length containers per
//! chunk of 2^16 values, which is exactly the "most compact of dense /
//! medium / sparse" requirement the search engine needs for posting lists;
//! `IntSet` only adds the symbolic `ALL(n)` variant and the tag byte that
//! lets it round-trip without materializing.

use croaring::Bitmap;

use std::{
    fmt,
    iter::FromIterator,
    ops::{BitAndAssign, BitOrAssign, BitXorAssign, SubAssign},
};

use crate::error::{Error, Result};

const TAG_ALL: u8 = b'A';
const TAG_ROARING: u8 = b'R';

#[derive(Clone)]
enum Repr {
    /// `{0, 1, .., n-1}`, materialised into a real bitmap only when an
    /// operation needs one (union, intersection, iteration, etc).
    All(u32),
    Bitmap(Bitmap),
}

/// Ordered set of `u32` ids. Iteration is always ascending.
#[derive(Clone)]
pub struct IntSet(Repr);

impl IntSet {
    pub fn new() -> IntSet {
        IntSet(Repr::Bitmap(Bitmap::create()))
    }

    /// Clone constructor mirroring the Python `IntSet(copy=other)` idiom.
    pub fn copy(other: &IntSet) -> IntSet {
        other.clone()
    }

    /// Symbolic `{0..n-1}`. Stays symbolic until an operation forces
    /// materialization.
    pub fn all(n: u32) -> IntSet {
        IntSet(Repr::All(n))
    }

    fn materialize(&self) -> Bitmap {
        match &self.0 {
            Repr::Bitmap(bm) => bm.clone(),
            Repr::All(n) => {
                let mut bm = Bitmap::create();
                if *n > 0 {
                    bm.add_range(0..(*n as u64));
                }
                bm
            }
        }
    }

    fn force(&mut self) {
        if let Repr::All(_) = self.0 {
            self.0 = Repr::Bitmap(self.materialize());
        }
    }

    pub fn add(&mut self, x: u32) {
        self.force();
        if let Repr::Bitmap(bm) = &mut self.0 {
            bm.add(x);
        }
    }

    pub fn contains(&self, x: u32) -> bool {
        match &self.0 {
            Repr::Bitmap(bm) => bm.contains(x),
            Repr::All(n) => x < *n,
        }
    }

    pub fn len(&self) -> u64 {
        match &self.0 {
            Repr::Bitmap(bm) => bm.cardinality(),
            Repr::All(n) => *n as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        IntSetIter {
            inner: self.materialize().to_vec().into_iter(),
        }
    }

    pub fn to_vec(&self) -> Vec<u32> {
        match &self.0 {
            Repr::Bitmap(bm) => bm.to_vec(),
            Repr::All(n) => (0..*n).collect(),
        }
    }

    /// `Or(a, b, ..)`
    pub fn or<'a, I: IntoIterator<Item = &'a IntSet>>(sets: I) -> IntSet {
        let mut out = IntSet::new();
        for s in sets {
            out |= s;
        }
        out
    }

    /// `And(a, b, ..)`
    pub fn and<'a, I: IntoIterator<Item = &'a IntSet>>(sets: I) -> IntSet {
        let mut it = sets.into_iter();
        let mut out = match it.next() {
            Some(first) => first.clone(),
            None => return IntSet::new(),
        };
        for s in it {
            out &= s;
        }
        out
    }

    /// `Sub(a, b)` — a minus b.
    pub fn sub(a: &IntSet, b: &IntSet) -> IntSet {
        let mut out = a.clone();
        out -= b;
        out
    }

    /// Serialize using croaring's native portable format, tagged so
    /// `ALL(n)` can round-trip without ever materializing a bitmap (§4.1,
    /// §6: "the decoder must infer the encoding from a leading tag byte").
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match &self.0 {
            Repr::All(n) => {
                out.push(TAG_ALL);
                out.extend_from_slice(&n.to_le_bytes());
            }
            Repr::Bitmap(bm) => {
                out.push(TAG_ROARING);
                out.extend_from_slice(&bm.serialize());
            }
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<IntSet> {
        if buf.is_empty() {
            return Ok(IntSet::new());
        }
        match buf[0] {
            TAG_ALL => {
                check_remaining!(buf, 5, "intset-all")?;
                let n = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
                Ok(IntSet::all(n))
            }
            TAG_ROARING => Ok(IntSet(Repr::Bitmap(Bitmap::deserialize(&buf[1..])))),
            tag => Err(Error::Corruption(format!("unknown intset tag {:?}", tag))),
        }
    }
}

struct IntSetIter {
    inner: std::vec::IntoIter<u32>,
}

impl Iterator for IntSetIter {
    type Item = u32;
    fn next(&mut self) -> Option<u32> {
        self.inner.next()
    }
}

impl Default for IntSet {
    fn default() -> IntSet {
        IntSet::new()
    }
}

impl fmt::Debug for IntSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for IntSet {
    fn eq(&self, other: &IntSet) -> bool {
        match (&self.0, &other.0) {
            (Repr::All(a), Repr::All(b)) => a == b,
            _ => self.materialize() == other.materialize(),
        }
    }
}
impl Eq for IntSet {}

impl FromIterator<u32> for IntSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> IntSet {
        let mut bm = Bitmap::create();
        for x in iter {
            bm.add(x);
        }
        IntSet(Repr::Bitmap(bm))
    }
}

impl From<&[u32]> for IntSet {
    fn from(xs: &[u32]) -> IntSet {
        IntSet(Repr::Bitmap(Bitmap::of(xs)))
    }
}

impl From<Vec<u32>> for IntSet {
    fn from(xs: Vec<u32>) -> IntSet {
        IntSet::from(xs.as_slice())
    }
}

impl<'a> BitOrAssign<&'a IntSet> for IntSet {
    fn bitor_assign(&mut self, rhs: &'a IntSet) {
        if rhs.is_empty() {
            return;
        }
        self.force();
        if let Repr::Bitmap(bm) = &mut self.0 {
            bm.or_inplace(&rhs.materialize());
        }
    }
}

impl<'a> BitAndAssign<&'a IntSet> for IntSet {
    fn bitand_assign(&mut self, rhs: &'a IntSet) {
        self.force();
        if let Repr::Bitmap(bm) = &mut self.0 {
            bm.and_inplace(&rhs.materialize());
        }
    }
}

impl<'a> SubAssign<&'a IntSet> for IntSet {
    fn sub_assign(&mut self, rhs: &'a IntSet) {
        if rhs.is_empty() {
            return;
        }
        self.force();
        if let Repr::Bitmap(bm) = &mut self.0 {
            bm.andnot_inplace(&rhs.materialize());
        }
    }
}

impl<'a> BitXorAssign<&'a IntSet> for IntSet {
    fn bitxor_assign(&mut self, rhs: &'a IntSet) {
        let other = rhs.materialize();
        self.force();
        if let Repr::Bitmap(bm) = &mut self.0 {
            bm.xor_inplace(&other);
        }
    }
}

#[cfg(test)]
#[path = "intset_test.rs"]
mod intset_test;
