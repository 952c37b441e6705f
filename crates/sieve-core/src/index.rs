//! Token Index
//!
//! One `RealmIndex` per filter class. Each maps token hash → bucket of record
//! ids, and keeps the always-checked no-token and regex buckets plus one
//! hostname dictionary per source list.
//!
//! Buckets change representation, never content:
//!
//! - `Open`: insertion order, while lists are being loaded
//! - `Packed`: sorted, deduplicated, shrunk (`freeze()`)
//! - `Partitioned`: large packed buckets split by request type (`optimize()`)

use std::collections::{BTreeMap, HashMap};

use crate::domain_set::{DomainSet, DomainSetStats};
use crate::filter::FilterRecord;
use crate::types::RequestType;

/// Index of a record in the engine's record store.
pub type RecordId = u32;

/// Where a record is filed inside a realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Token(u32),
    NoToken,
    Regex,
}

// =============================================================================
// Bucket
// =============================================================================

#[derive(Debug, Clone)]
pub enum Bucket {
    Open(Vec<RecordId>),
    Packed(Box<[RecordId]>),
    Partitioned {
        /// Records whose type mask is zero (all types)
        any: Box<[RecordId]>,
        /// Per type bit, sorted ids of records that accept it
        by_type: Box<[(u32, Box<[RecordId]>)]>,
    },
}

impl Default for Bucket {
    fn default() -> Self {
        Bucket::Open(Vec::new())
    }
}

fn packed(mut ids: Vec<RecordId>) -> Box<[RecordId]> {
    ids.sort_unstable();
    ids.dedup();
    ids.into_boxed_slice()
}

impl Bucket {
    pub fn push(&mut self, id: RecordId) {
        match self {
            Bucket::Open(ids) => ids.push(id),
            _ => {
                let mut ids = self.sorted_ids();
                ids.push(id);
                *self = Bucket::Open(ids);
            }
        }
    }

    /// Number of distinct records.
    pub fn len(&self) -> usize {
        match self {
            Bucket::Open(ids) => ids.len(),
            Bucket::Packed(ids) => ids.len(),
            Bucket::Partitioned { .. } => self.sorted_ids().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Bucket::Open(ids) => ids.is_empty(),
            Bucket::Packed(ids) => ids.is_empty(),
            Bucket::Partitioned { any, by_type } => any.is_empty() && by_type.is_empty(),
        }
    }

    /// Logical contents, sorted and deduplicated.
    pub fn sorted_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = match self {
            Bucket::Open(ids) => ids.clone(),
            Bucket::Packed(ids) => return ids.to_vec(),
            Bucket::Partitioned { any, by_type } => any
                .iter()
                .chain(by_type.iter().flat_map(|(_, ids)| ids.iter()))
                .copied()
                .collect(),
        };
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn freeze(&mut self) {
        if let Bucket::Open(ids) = self {
            *self = Bucket::Packed(packed(std::mem::take(ids)));
        }
    }

    /// Split a packed bucket by request type once it reaches `threshold`.
    pub fn optimize(&mut self, records: &[FilterRecord], threshold: usize) {
        let ids = match self {
            Bucket::Packed(ids) if ids.len() >= threshold => ids,
            _ => return,
        };

        let mut any = Vec::new();
        let mut by_type: BTreeMap<u32, Vec<RecordId>> = BTreeMap::new();
        for &id in ids.iter() {
            let mask = match records.get(id as usize) {
                Some(record) => record.type_mask,
                None => {
                    debug_assert!(false, "bucket refers to missing record {id}");
                    continue;
                }
            };
            if mask.is_empty() {
                any.push(id);
            } else {
                for bit in mask.iter() {
                    by_type.entry(bit.bits()).or_default().push(id);
                }
            }
        }

        *self = Bucket::Partitioned {
            any: packed(any),
            by_type: by_type
                .into_iter()
                .map(|(bit, ids)| (bit, packed(ids)))
                .collect(),
        };
    }

    /// Visit candidate ids able to match `request_type`. Sorted slices are
    /// visited in ascending order and abandoned as soon as `f` returns true.
    pub fn visit(&self, request_type: RequestType, mut f: impl FnMut(RecordId) -> bool) {
        match self {
            Bucket::Open(ids) => {
                for &id in ids {
                    f(id);
                }
            }
            Bucket::Packed(ids) => visit_sorted(ids, &mut f),
            Bucket::Partitioned { any, by_type } => {
                visit_sorted(any, &mut f);
                for (bit, ids) in by_type.iter() {
                    if request_type.bits() & bit != 0 {
                        visit_sorted(ids, &mut f);
                    }
                }
            }
        }
    }

    pub fn is_partitioned(&self) -> bool {
        matches!(self, Bucket::Partitioned { .. })
    }
}

#[inline]
fn visit_sorted(ids: &[RecordId], f: &mut impl FnMut(RecordId) -> bool) {
    for &id in ids {
        if f(id) {
            break;
        }
    }
}

// =============================================================================
// Realm Index
// =============================================================================

/// Counters for one realm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RealmStats {
    pub token_buckets: usize,
    pub token_records: usize,
    pub partitioned_buckets: usize,
    pub no_token: usize,
    pub regex: usize,
    pub hostnames: usize,
    /// Bucket layout of the hostname dictionaries, summed over lists
    pub hostname_layout: DomainSetStats,
}

/// Searchable state of one filter class.
#[derive(Debug, Clone)]
pub struct RealmIndex {
    pub(crate) tokens: HashMap<u32, Bucket>,
    pub(crate) no_token: Bucket,
    pub(crate) regex: Bucket,
    pub(crate) hostnames: BTreeMap<u16, DomainSet>,
    dense_cutoff: usize,
}

impl RealmIndex {
    pub fn new(dense_cutoff: usize) -> Self {
        Self {
            tokens: HashMap::new(),
            no_token: Bucket::default(),
            regex: Bucket::default(),
            hostnames: BTreeMap::new(),
            dense_cutoff,
        }
    }

    pub fn insert(&mut self, slot: Slot, id: RecordId) {
        match slot {
            Slot::Token(hash) => self.tokens.entry(hash).or_default().push(id),
            Slot::NoToken => self.no_token.push(id),
            Slot::Regex => self.regex.push(id),
        }
    }

    /// Add a pure hostname filter for `list_id`.
    pub fn add_hostname(&mut self, list_id: u16, hostname: &str) -> bool {
        let cutoff = self.dense_cutoff;
        self.hostnames
            .entry(list_id)
            .or_insert_with(|| DomainSet::with_cutoff(cutoff))
            .add(hostname)
    }

    #[inline]
    pub fn token_bucket(&self, hash: u32) -> Option<&Bucket> {
        self.tokens.get(&hash)
    }

    /// First list (lowest id) whose dictionary holds a suffix of `host`.
    pub fn match_hostname<'h>(&self, host: &'h str) -> Option<(u16, &'h str)> {
        self.hostnames
            .iter()
            .find_map(|(&list_id, set)| set.find_suffix(host).map(|h| (list_id, h)))
    }

    pub fn freeze(&mut self) {
        for bucket in self.tokens.values_mut() {
            bucket.freeze();
        }
        self.tokens.shrink_to_fit();
        self.no_token.freeze();
        self.regex.freeze();
        for set in self.hostnames.values_mut() {
            set.freeze();
        }
    }

    pub fn optimize(&mut self, records: &[FilterRecord], threshold: usize) {
        for bucket in self.tokens.values_mut() {
            bucket.optimize(records, threshold);
        }
        self.no_token.optimize(records, threshold);
        self.regex.optimize(records, threshold);
    }

    /// Token buckets sorted by hash, each with sorted ids.
    pub fn sorted_tokens(&self) -> Vec<(u32, Vec<RecordId>)> {
        let mut out: Vec<(u32, Vec<RecordId>)> = self
            .tokens
            .iter()
            .map(|(&hash, bucket)| (hash, bucket.sorted_ids()))
            .filter(|(_, ids)| !ids.is_empty())
            .collect();
        out.sort_unstable_by_key(|(hash, _)| *hash);
        out
    }

    pub fn stats(&self) -> RealmStats {
        RealmStats {
            token_buckets: self.tokens.len(),
            token_records: self.tokens.values().map(Bucket::len).sum(),
            partitioned_buckets: self.tokens.values().filter(|b| b.is_partitioned()).count(),
            no_token: self.no_token.len(),
            regex: self.regex.len(),
            hostnames: self.hostnames.values().map(DomainSet::len).sum(),
            hostname_layout: self
                .hostnames
                .values()
                .map(DomainSet::stats)
                .fold(DomainSetStats::default(), |acc, s| acc + s),
        }
    }
}
