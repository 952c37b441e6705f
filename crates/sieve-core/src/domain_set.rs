//! Domain/Token Set
//!
//! A compact string set used for hostname dictionaries and `domain=` scopes.
//! Strings are bucketed by a cheap structural key (length plus a handful of
//! sampled character bits). Buckets start open and are compacted by
//! `freeze()` into one of two immutable layouts:
//!
//! - `Sparse`: `" a b c "`, scanned linearly; used for small buckets.
//! - `Dense`: sorted fixed-stride concatenation, binary searched; used when
//!   `stride * count` reaches the dense cutoff.
//!
//! The layout is a space/speed trade-off only; `test()` answers the same
//! either way.

use std::collections::{BTreeSet, HashMap};

use crate::psl::walk_host_suffixes;

/// Default `stride * count` threshold above which a bucket becomes dense.
pub const DEFAULT_DENSE_CUTOFF: usize = 500;

/// Lengths are capped at this value inside the structural key.
const MAX_KEY_LENGTH: usize = 255;

/// Structural key of a string: capped length in the low byte, and the low
/// bit of seven sampled characters in bits 8..=14.
pub fn structural_key(s: &[u8]) -> u16 {
    let len = s.len().min(MAX_KEY_LENGTH);
    let i8 = len >> 3;
    let i4 = len >> 2;
    let i2 = len >> 1;
    let bit = |i: usize| -> u16 { s.get(i).map_or(0, |&b| (b & 1) as u16) };

    bit(i8) << 14
        | bit(i4) << 13
        | bit(i4 + i8) << 12
        | bit(i2) << 11
        | bit(i2 + i8) << 10
        | bit(i2 + i4) << 9
        | bit(i2 + i4 + i8) << 8
        | len as u16
}

// =============================================================================
// Buckets
// =============================================================================

#[derive(Debug, Clone)]
enum Bucket {
    Open(BTreeSet<Box<str>>),
    Sparse(String),
    Dense { stride: usize, block: String },
}

impl Bucket {
    fn freeze(words: BTreeSet<Box<str>>, cutoff: usize) -> Bucket {
        let stride = words.iter().next().map_or(0, |w| w.len());
        let uniform = words.iter().all(|w| w.len() == stride);

        if !uniform || stride * words.len() < cutoff {
            let mut sparse = String::with_capacity(words.iter().map(|w| w.len() + 1).sum::<usize>() + 1);
            sparse.push(' ');
            for word in &words {
                sparse.push_str(word);
                sparse.push(' ');
            }
            return Bucket::Sparse(sparse);
        }

        // BTreeSet iterates in sorted order
        let mut block = String::with_capacity(stride * words.len());
        for word in &words {
            block.push_str(word);
        }
        Bucket::Dense { stride, block }
    }

    /// Insert into this bucket, melting a frozen layout back to open.
    fn insert(&mut self, word: &str) {
        match self {
            Bucket::Open(words) => {
                words.insert(Box::from(word));
            }
            _ => {
                let mut words: BTreeSet<Box<str>> = self.words().map(Box::from).collect();
                words.insert(Box::from(word));
                *self = Bucket::Open(words);
            }
        }
    }

    fn contains(&self, s: &str) -> bool {
        match self {
            Bucket::Open(words) => words.contains(s),
            Bucket::Sparse(sparse) => {
                let bytes = sparse.as_bytes();
                sparse.match_indices(s).any(|(pos, _)| {
                    pos > 0 && bytes[pos - 1] == b' ' && bytes.get(pos + s.len()) == Some(&b' ')
                })
            }
            Bucket::Dense { stride, block } => {
                if s.len() != *stride || *stride == 0 {
                    return false;
                }
                let mut left = 0;
                let mut right = block.len() / stride;
                while left < right {
                    let mid = left + (right - left) / 2;
                    let needle = match block.get(mid * stride..(mid + 1) * stride) {
                        Some(needle) => needle,
                        None => return false,
                    };
                    match s.cmp(needle) {
                        std::cmp::Ordering::Less => right = mid,
                        std::cmp::Ordering::Greater => left = mid + 1,
                        std::cmp::Ordering::Equal => return true,
                    }
                }
                false
            }
        }
    }

    fn words(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Bucket::Open(words) => Box::new(words.iter().map(|w| &**w)),
            Bucket::Sparse(sparse) => Box::new(sparse.split(' ').filter(|w| !w.is_empty())),
            Bucket::Dense { stride, block } => {
                let stride = (*stride).max(1);
                Box::new((0..block.len() / stride).filter_map(move |i| block.get(i * stride..(i + 1) * stride)))
            }
        }
    }
}

// =============================================================================
// Domain Set
// =============================================================================

/// Bucket layout counters, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DomainSetStats {
    pub entries: usize,
    pub open: usize,
    pub sparse: usize,
    pub dense: usize,
}

impl std::ops::Add for DomainSetStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            entries: self.entries + other.entries,
            open: self.open + other.open,
            sparse: self.sparse + other.sparse,
            dense: self.dense + other.dense,
        }
    }
}

/// Bucketed string set with a frozen compact form.
#[derive(Debug, Clone)]
pub struct DomainSet {
    buckets: HashMap<u16, Bucket>,
    count: usize,
    cutoff: usize,
}

impl Default for DomainSet {
    fn default() -> Self {
        Self::with_cutoff(DEFAULT_DENSE_CUTOFF)
    }
}

impl DomainSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set with a custom dense cutoff.
    pub fn with_cutoff(cutoff: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            count: 0,
            cutoff,
        }
    }

    /// Add a string. Returns false if it was already present, or if it is
    /// empty or contains whitespace. Adding to a frozen bucket melts it.
    pub fn add(&mut self, s: &str) -> bool {
        if s.is_empty() || s.bytes().any(|b| b.is_ascii_whitespace()) {
            return false;
        }
        let key = structural_key(s.as_bytes());
        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Bucket::Open(BTreeSet::new()));
        if bucket.contains(s) {
            return false;
        }
        bucket.insert(s);
        self.count += 1;
        true
    }

    /// Membership test.
    #[inline]
    pub fn test(&self, s: &str) -> bool {
        match self.buckets.get(&structural_key(s.as_bytes())) {
            Some(bucket) => bucket.contains(s),
            None => false,
        }
    }

    /// First suffix of `host` (most specific first) that is in the set.
    pub fn find_suffix<'h>(&self, host: &'h str) -> Option<&'h str> {
        if self.count == 0 {
            return None;
        }
        walk_host_suffixes(host).find(|suffix| self.test(suffix))
    }

    /// Compact every open bucket. Idempotent.
    pub fn freeze(&mut self) {
        let cutoff = self.cutoff;
        for bucket in self.buckets.values_mut() {
            if let Bucket::Open(words) = bucket {
                let words = std::mem::take(words);
                *bucket = Bucket::freeze(words, cutoff);
            }
        }
    }

    /// Discard all entries.
    pub fn reset(&mut self) {
        self.buckets.clear();
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// All entries in sorted order, independent of bucket layout.
    pub fn sorted_entries(&self) -> Vec<&str> {
        let mut entries: Vec<&str> = self.buckets.values().flat_map(|b| b.words()).collect();
        entries.sort_unstable();
        entries
    }

    pub fn stats(&self) -> DomainSetStats {
        let mut stats = DomainSetStats {
            entries: self.count,
            ..DomainSetStats::default()
        };
        for bucket in self.buckets.values() {
            match bucket {
                Bucket::Open(_) => stats.open += 1,
                Bucket::Sparse(_) => stats.sparse += 1,
                Bucket::Dense { .. } => stats.dense += 1,
            }
        }
        stats
    }
}

impl<'a> FromIterator<&'a str> for DomainSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = DomainSet::new();
        for s in iter {
            set.add(s);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_hosts(n: usize) -> Vec<String> {
        // Same length so they share buckets and exercise the dense layout
        (0..n).map(|i| format!("h{:05}.example.com", i)).collect()
    }

    #[test]
    fn structural_key_is_pure_and_carries_length() {
        assert_eq!(structural_key(b"example.com"), structural_key(b"example.com"));
        assert_eq!(structural_key(b"example.com") & 0xff, 11);
        assert_eq!(structural_key(&[b'a'; 300]) & 0xff, 255);
        assert_eq!(structural_key(b""), 0);
    }

    #[test]
    fn add_and_test_before_freeze() {
        let mut set = DomainSet::new();
        assert!(set.add("example.com"));
        assert!(!set.add("example.com"));
        assert!(set.test("example.com"));
        assert!(!set.test("example.org"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        let mut set = DomainSet::new();
        assert!(!set.add(""));
        assert!(!set.add("a b"));
        assert!(set.is_empty());
    }

    #[test]
    fn sparse_layout_after_freeze() {
        let mut set: DomainSet = ["ads.example.com", "track.net", "cdn.example.org"].into_iter().collect();
        set.freeze();
        let stats = set.stats();
        assert_eq!(stats.open, 0);
        assert_eq!(stats.dense, 0);
        assert!(stats.sparse > 0);
        for s in ["ads.example.com", "track.net", "cdn.example.org"] {
            assert!(set.test(s), "{s}");
        }
        assert!(!set.test("example.com"));
        assert!(!set.test("ads.example.co"));
        assert!(!set.test("track"));
    }

    #[test]
    fn dense_layout_after_freeze() {
        let hosts = synthetic_hosts(400);
        let mut set = DomainSet::with_cutoff(64);
        for h in &hosts {
            set.add(h);
        }
        set.freeze();
        assert!(set.stats().dense > 0);
        for h in &hosts {
            assert!(set.test(h), "{h}");
        }
        assert!(!set.test("h99999.example.com"));
        assert!(!set.test("h00001.example.org"));
    }

    #[test]
    fn freeze_is_idempotent_and_layout_free() {
        let hosts = synthetic_hosts(200);
        let mut open = DomainSet::with_cutoff(64);
        for h in &hosts {
            open.add(h);
        }
        let mut frozen = open.clone();
        frozen.freeze();
        frozen.freeze();
        assert_eq!(open.sorted_entries(), frozen.sorted_entries());
        for h in &hosts {
            assert_eq!(open.test(h), frozen.test(h));
        }
    }

    #[test]
    fn add_after_freeze_melts_bucket() {
        let mut set = DomainSet::with_cutoff(1);
        set.add("aaaa.com");
        set.add("bbbb.com");
        set.freeze();
        assert!(set.add("cccc.com"));
        assert!(!set.add("aaaa.com"));
        assert!(set.test("aaaa.com"));
        assert!(set.test("cccc.com"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn long_strings_share_capped_bucket() {
        let a = "a".repeat(300);
        let b = "a".repeat(280);
        let mut set = DomainSet::with_cutoff(1);
        set.add(&a);
        set.add(&b);
        set.freeze();
        assert!(set.test(&a));
        assert!(set.test(&b));
        assert!(!set.test(&"a".repeat(290)));
    }

    #[test]
    fn find_suffix_walks_host() {
        let set: DomainSet = ["example.com"].into_iter().collect();
        assert_eq!(set.find_suffix("ads.example.com"), Some("example.com"));
        assert_eq!(set.find_suffix("example.com"), Some("example.com"));
        assert_eq!(set.find_suffix("badexample.com"), None);
    }

    #[test]
    fn reset_clears() {
        let mut set: DomainSet = ["example.com"].into_iter().collect();
        set.freeze();
        set.reset();
        assert!(set.is_empty());
        assert!(!set.test("example.com"));
    }
}
