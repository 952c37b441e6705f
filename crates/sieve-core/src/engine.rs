//! Static Network Filtering Engine
//!
//! Owns the record store and one token index per realm. Lists are loaded
//! from compiled text while the engine is open; `freeze()` compacts every
//! index and after that the engine is read-only and shareable across threads.
//!
//! # Precedence
//!
//! 1. `$important` block filters decide first (result `Blocked`)
//! 2. Otherwise any exception filter decides (result `Allowed`)
//! 3. Otherwise plain block filters (result `Blocked`)
//! 4. Otherwise `NoMatch`
//!
//! Within a realm a hostname dictionary hit wins, then the matching record
//! with the lowest id. Since ids follow load order, the verdict depends only
//! on the loaded lists and never on bucket layout.

use std::collections::HashSet;

use log::{debug, warn};
use serde::Serialize;

use crate::compiled::{CompiledEntry, CompiledReader, LoadError, TokenSlot};
use crate::config::EngineConfig;
use crate::filter::{FilterRecord, UrlView};
use crate::hash::{fingerprint, hash_token};
use crate::index::{RealmIndex, RealmStats, RecordId, Slot};
use crate::types::{FilteringContext, MatchResult, Realm, RequestType};
use crate::url::tokenize_url;

// =============================================================================
// Verdicts
// =============================================================================

/// What decided a realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hit {
    /// A record in the store
    Record(RecordId),
    /// A hostname dictionary entry of the given list
    Hostname { list_id: u16, hostname: String },
}

/// The filter that produced a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner {
    pub realm: Realm,
    pub hit: Hit,
}

/// Result of one `match_request` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchVerdict {
    pub result: MatchResult,
    /// `None` exactly when `result` is `NoMatch`
    pub winner: Option<Winner>,
}

impl MatchVerdict {
    fn decided(result: MatchResult, winner: Winner) -> Self {
        Self {
            result,
            winner: Some(winner),
        }
    }
}

/// Human-readable description of a winning filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogData {
    /// Filter text as it appeared in the list
    pub raw_filter: String,
    /// Name of the list the filter came from
    pub source_list: String,
    pub realm: &'static str,
    /// What decided, e.g. `["exception", "script", "pattern"]`
    pub reason: Vec<String>,
}

// =============================================================================
// Statistics
// =============================================================================

/// Outcome of loading one compiled list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub list_id: u16,
    pub name: String,
    pub network: usize,
    pub hostnames: usize,
    pub duplicates: usize,
}

/// Engine-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub lists: usize,
    pub records: usize,
    pub duplicates: usize,
    pub frozen: bool,
    pub optimized: bool,
    pub important: RealmStats,
    pub exception: RealmStats,
    pub block: RealmStats,
}

// =============================================================================
// Engine
// =============================================================================

enum Staged {
    Record(Slot, Realm, FilterRecord),
    Hostname(Realm, String),
}

/// The filtering engine.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) lists: Vec<String>,
    pub(crate) records: Vec<FilterRecord>,
    pub(crate) realms: [RealmIndex; 3],
    /// Fingerprints of loaded lines; dropped on freeze
    seen: HashSet<u64>,
    duplicates: usize,
    frozen: bool,
    optimized: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let realm = || RealmIndex::new(config.dense_cutoff);
        Self {
            config,
            lists: Vec::new(),
            records: Vec::new(),
            realms: [realm(), realm(), realm()],
            seen: HashSet::new(),
            duplicates: 0,
            frozen: false,
            optimized: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load compiled text. Shorthand for `from_compiled(CompiledReader::new(text)?)`.
    pub fn load_compiled(&mut self, text: &str) -> Result<LoadStats, LoadError> {
        self.from_compiled(CompiledReader::new(text)?)
    }

    /// Load one compiled list as a new source list.
    ///
    /// The list is staged completely before anything is committed, so on
    /// error the engine is left exactly as it was.
    pub fn from_compiled(&mut self, reader: CompiledReader<'_>) -> Result<LoadStats, LoadError> {
        if self.frozen {
            return Err(LoadError::Frozen);
        }
        let list_id = u16::try_from(self.lists.len()).map_err(|_| LoadError::CapacityExceeded)?;
        let name = reader.name().to_string();

        let mut staged: Vec<Staged> = Vec::new();
        let mut fingerprints: Vec<u64> = Vec::new();
        let mut staged_seen: HashSet<u64> = HashSet::new();
        let mut duplicates = 0;

        for line in reader {
            let line = line?;
            let fp = fingerprint(line.text.as_bytes());
            if self.seen.contains(&fp) || !staged_seen.insert(fp) {
                duplicates += 1;
                continue;
            }
            fingerprints.push(fp);

            match line.entry {
                CompiledEntry::Hostname { flags, hostname } => {
                    staged.push(Staged::Hostname(Realm::from_flags(flags), hostname));
                }
                CompiledEntry::Network(entry) => {
                    let realm = Realm::from_flags(entry.flags);
                    let slot = match &entry.token {
                        TokenSlot::Token(token) => Slot::Token(hash_token(token.as_bytes())),
                        TokenSlot::NoToken => Slot::NoToken,
                        TokenSlot::Regex => Slot::Regex,
                    };
                    let record = FilterRecord::new(
                        entry.pattern,
                        entry.kind,
                        entry.flags,
                        entry.type_mask,
                        entry.party_mask,
                        entry.domain_opt,
                        list_id,
                        entry.raw,
                    )
                    .map_err(|e| {
                        warn!("compiled line {} rejected: {}", line.line, e);
                        LoadError::MalformedLine { line: line.line }
                    })?;
                    staged.push(Staged::Record(slot, realm, record));
                }
            }
        }

        let network = staged.iter().filter(|s| matches!(s, Staged::Record(..))).count();
        if RecordId::try_from(self.records.len() + network).is_err() {
            return Err(LoadError::CapacityExceeded);
        }

        // Commit
        let mut hostnames = 0;
        for item in staged {
            match item {
                Staged::Record(slot, realm, record) => {
                    let id = self.records.len() as RecordId;
                    self.records.push(record);
                    self.realms[realm.index()].insert(slot, id);
                }
                Staged::Hostname(realm, hostname) => {
                    if self.realms[realm.index()].add_hostname(list_id, &hostname) {
                        hostnames += 1;
                    }
                }
            }
        }
        self.seen.extend(fingerprints);
        self.lists.push(name.clone());
        self.duplicates += duplicates;

        debug!(
            "loaded list {} '{}': {} network, {} hostname, {} duplicate",
            list_id, name, network, hostnames, duplicates
        );

        Ok(LoadStats {
            list_id,
            name,
            network,
            hostnames,
            duplicates,
        })
    }

    /// Compact all indices and make the engine read-only. Idempotent.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        for realm in &mut self.realms {
            realm.freeze();
        }
        for record in &mut self.records {
            record.freeze();
        }
        self.records.shrink_to_fit();
        self.seen = HashSet::new();
        self.frozen = true;
        debug!("engine frozen: {} records, {} lists", self.records.len(), self.lists.len());
    }

    /// Freeze, then partition large token buckets by request type.
    pub fn optimize(&mut self) {
        self.freeze();
        if self.optimized {
            return;
        }
        let threshold = self.config.optimize_threshold.max(1);
        for realm in &mut self.realms {
            realm.optimize(&self.records, threshold);
        }
        self.optimized = true;
        debug!("engine optimized with threshold {}", threshold);
    }

    /// Drop every list and return to the open state.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn lists(&self) -> &[String] {
        &self.lists
    }

    pub fn record(&self, id: RecordId) -> Option<&FilterRecord> {
        self.records.get(id as usize)
    }

    // =========================================================================
    // Matching
    // =========================================================================

    /// Classify a request.
    pub fn match_request(&self, ctx: &FilteringContext<'_>) -> MatchVerdict {
        let url = UrlView::new(ctx.url);
        let tokens = tokenize_url(ctx.url);

        if let Some(winner) = self.match_realm(Realm::Important, ctx, &url, &tokens) {
            return MatchVerdict::decided(MatchResult::Blocked, winner);
        }
        if let Some(winner) = self.match_realm(Realm::Exception, ctx, &url, &tokens) {
            return MatchVerdict::decided(MatchResult::Allowed, winner);
        }
        if let Some(winner) = self.match_realm(Realm::Block, ctx, &url, &tokens) {
            return MatchVerdict::decided(MatchResult::Blocked, winner);
        }
        MatchVerdict::default()
    }

    fn match_realm(
        &self,
        realm: Realm,
        ctx: &FilteringContext<'_>,
        url: &UrlView<'_>,
        tokens: &[u32],
    ) -> Option<Winner> {
        let index = &self.realms[realm.index()];

        let any_type = !ctx.request_type.intersects(RequestType::SPECIAL);
        if let Some((list_id, hostname)) = index.match_hostname(&ctx.req_host).filter(|_| any_type) {
            return Some(Winner {
                realm,
                hit: Hit::Hostname {
                    list_id,
                    hostname: hostname.to_string(),
                },
            });
        }

        let mut best: Option<RecordId> = None;
        let mut probe = |id: RecordId| -> bool {
            if best.map_or(false, |b| id >= b) {
                return true;
            }
            match self.records.get(id as usize) {
                Some(record) if record.matches(ctx, url) => {
                    best = Some(id);
                    true
                }
                Some(_) => false,
                None => {
                    debug_assert!(false, "index refers to missing record {id}");
                    false
                }
            }
        };

        for &token in tokens {
            if let Some(bucket) = index.token_bucket(token) {
                bucket.visit(ctx.request_type, &mut probe);
            }
        }
        index.no_token.visit(ctx.request_type, &mut probe);
        index.regex.visit(ctx.request_type, &mut probe);

        best.map(|id| Winner {
            realm,
            hit: Hit::Record(id),
        })
    }

    /// Describe the filter behind a verdict.
    pub fn to_log_data(&self, verdict: &MatchVerdict) -> Option<LogData> {
        let winner = verdict.winner.as_ref()?;
        let mut reason = Vec::new();
        match winner.realm {
            Realm::Important => reason.push("important".to_string()),
            Realm::Exception => reason.push("exception".to_string()),
            Realm::Block => {}
        }

        let (raw_filter, list_id) = match &winner.hit {
            Hit::Record(id) => {
                let record = self.record(*id)?;
                reason.extend(record.option_labels().into_iter().filter(|l| l != "important"));
                reason.push("pattern".to_string());
                (record.raw.clone(), record.list_id)
            }
            Hit::Hostname { list_id, hostname } => {
                reason.push("hostname".to_string());
                let raw = match winner.realm {
                    Realm::Exception => format!("@@||{}^", hostname),
                    Realm::Important => format!("||{}^$important", hostname),
                    Realm::Block => format!("||{}^", hostname),
                };
                (raw, *list_id)
            }
        };

        Some(LogData {
            raw_filter,
            source_list: self.list_name(list_id),
            realm: winner.realm.name(),
            reason,
        })
    }

    fn list_name(&self, list_id: u16) -> String {
        self.lists.get(list_id as usize).cloned().unwrap_or_default()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            lists: self.lists.len(),
            records: self.records.len(),
            duplicates: self.duplicates,
            frozen: self.frozen,
            optimized: self.optimized,
            important: self.realms[Realm::Important.index()].stats(),
            exception: self.realms[Realm::Exception.index()].stats(),
            block: self.realms[Realm::Block.index()].stats(),
        }
    }

    /// Rebuild an engine from decoded selfie parts. The result is frozen.
    pub(crate) fn from_parts(
        config: EngineConfig,
        lists: Vec<String>,
        records: Vec<(Slot, FilterRecord)>,
        hostnames: Vec<(Realm, u16, Vec<String>)>,
    ) -> Self {
        let mut engine = Self::new(config);
        engine.lists = lists;
        for (slot, record) in records {
            let id = engine.records.len() as RecordId;
            let realm = Realm::from_flags(record.flags);
            engine.records.push(record);
            engine.realms[realm.index()].insert(slot, id);
        }
        for (realm, list_id, hosts) in hostnames {
            for host in hosts {
                engine.realms[realm.index()].add_hostname(list_id, &host);
            }
        }
        engine.freeze();
        engine
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::compiled::{CompiledWriter, NetworkEntry};
    use crate::types::{FilterFlags, MatchKind, PartyMask};

    fn network(raw: &str, flags: FilterFlags, kind: MatchKind, pattern: &str, token: &str) -> CompiledEntry {
        network_with(raw, flags, kind, pattern, token, RequestType::empty(), "")
    }

    fn network_with(
        raw: &str,
        flags: FilterFlags,
        kind: MatchKind,
        pattern: &str,
        token: &str,
        type_mask: RequestType,
        domain_opt: &str,
    ) -> CompiledEntry {
        let token = match token {
            "-" => TokenSlot::NoToken,
            "/" => TokenSlot::Regex,
            t => TokenSlot::Token(t.to_string()),
        };
        CompiledEntry::Network(NetworkEntry {
            flags,
            kind,
            type_mask,
            party_mask: PartyMask::empty(),
            token,
            pattern: pattern.to_string(),
            domain_opt: domain_opt.to_string(),
            raw: raw.to_string(),
        })
    }

    fn hostname(flags: FilterFlags, host: &str) -> CompiledEntry {
        CompiledEntry::Hostname {
            flags,
            hostname: host.to_string(),
        }
    }

    fn compiled(name: &str, entries: &[CompiledEntry]) -> String {
        let mut writer = CompiledWriter::new(name);
        for entry in entries {
            writer.push(entry);
        }
        writer.finish()
    }

    fn engine(entries: &[CompiledEntry]) -> Engine {
        let mut engine = Engine::default();
        engine.load_compiled(&compiled("test", entries)).expect("load");
        engine.freeze();
        engine
    }

    fn check(engine: &Engine, url: &str, doc: &str, ty: RequestType) -> MatchVerdict {
        engine.match_request(&FilteringContext::new(url, doc, ty))
    }

    const DOC: &str = "https://news.site.org/";

    #[test]
    fn hostname_block() {
        let engine = engine(&[hostname(FilterFlags::empty(), "ads.example.com")]);
        let verdict = check(&engine, "https://ads.example.com/x.js", DOC, RequestType::SCRIPT);
        assert_eq!(verdict.result, MatchResult::Blocked);

        let log = engine.to_log_data(&verdict).expect("log data");
        assert_eq!(log.raw_filter, "||ads.example.com^");
        assert_eq!(log.source_list, "test");
        assert_eq!(log.realm, "block");
        assert_eq!(log.reason, vec!["hostname"]);

        let verdict = check(&engine, "https://sub.ads.example.com/", DOC, RequestType::IMAGE);
        assert_eq!(verdict.result, MatchResult::Blocked);

        let verdict = check(&engine, "https://example.com/", DOC, RequestType::IMAGE);
        assert_eq!(verdict, MatchVerdict::default());
        assert!(engine.to_log_data(&verdict).is_none());
    }

    #[test]
    fn exception_overrides_block() {
        let engine = engine(&[
            hostname(FilterFlags::empty(), "ads.example.com"),
            network(
                "@@||ads.example.com/allowed.js",
                FilterFlags::EXCEPTION | FilterFlags::HOST_ANCHOR,
                MatchKind::HostnameAnchor,
                "ads.example.com/allowed.js",
                "allowed",
            ),
        ]);
        let verdict = check(&engine, "https://ads.example.com/allowed.js", DOC, RequestType::SCRIPT);
        assert_eq!(verdict.result, MatchResult::Allowed);
        let log = engine.to_log_data(&verdict).expect("log data");
        assert_eq!(log.raw_filter, "@@||ads.example.com/allowed.js");
        assert_eq!(log.realm, "exception");
        assert_eq!(log.reason, vec!["exception", "pattern"]);

        let verdict = check(&engine, "https://ads.example.com/other.js", DOC, RequestType::SCRIPT);
        assert_eq!(verdict.result, MatchResult::Blocked);
    }

    #[test]
    fn important_ignores_exceptions() {
        let engine = engine(&[
            network(
                "||ads.example.com^$important",
                FilterFlags::IMPORTANT | FilterFlags::HOST_ANCHOR,
                MatchKind::HostnameAnchor,
                "ads.example.com^",
                "example",
            ),
            hostname(FilterFlags::EXCEPTION, "ads.example.com"),
        ]);
        let verdict = check(&engine, "https://ads.example.com/x", DOC, RequestType::IMAGE);
        assert_eq!(verdict.result, MatchResult::Blocked);
        let log = engine.to_log_data(&verdict).expect("log data");
        assert_eq!(log.raw_filter, "||ads.example.com^$important");
        assert_eq!(log.reason, vec!["important", "pattern"]);
    }

    #[test]
    fn exception_without_block_still_allows() {
        let engine = engine(&[hostname(FilterFlags::EXCEPTION, "cdn.example.com")]);
        let verdict = check(&engine, "https://cdn.example.com/a.js", DOC, RequestType::SCRIPT);
        assert_eq!(verdict.result, MatchResult::Allowed);
        assert_eq!(
            engine.to_log_data(&verdict).map(|l| l.raw_filter),
            Some("@@||cdn.example.com^".to_string())
        );
    }

    #[test]
    fn type_option_limits_match() {
        let engine = engine(&[network_with(
            "/banner/$image",
            FilterFlags::empty(),
            MatchKind::Plain,
            "/banner/",
            "banner",
            RequestType::IMAGE,
            "",
        )]);
        let url = "https://x.com/banner/1.gif";
        assert_eq!(check(&engine, url, DOC, RequestType::IMAGE).result, MatchResult::Blocked);
        assert_eq!(check(&engine, url, DOC, RequestType::SCRIPT).result, MatchResult::NoMatch);
    }

    #[test]
    fn popups_only_match_popup_filters() {
        let engine = engine(&[
            hostname(FilterFlags::empty(), "ads.example.com"),
            network("/banner/", FilterFlags::empty(), MatchKind::Plain, "/banner/", "banner"),
            network_with(
                "||pop.example.com^$popup",
                FilterFlags::HOST_ANCHOR,
                MatchKind::HostnameAnchor,
                "pop.example.com^",
                "pop",
                RequestType::POPUP,
                "",
            ),
        ]);
        let popup = RequestType::POPUP;
        assert_eq!(check(&engine, "https://ads.example.com/", DOC, popup).result, MatchResult::NoMatch);
        assert_eq!(check(&engine, "https://x.com/banner/", DOC, popup).result, MatchResult::NoMatch);
        assert_eq!(check(&engine, "https://pop.example.com/", DOC, popup).result, MatchResult::Blocked);
        assert_eq!(
            check(&engine, "https://pop.example.com/", DOC, RequestType::SCRIPT).result,
            MatchResult::NoMatch
        );
    }

    #[test]
    fn domain_option_limits_match() {
        let engine = engine(&[network_with(
            "/track.js$domain=news.site.org|~sub.news.site.org",
            FilterFlags::empty(),
            MatchKind::Plain,
            "/track.js",
            "track",
            RequestType::empty(),
            "news.site.org|~sub.news.site.org",
        )]);
        let url = "https://cdn.net/track.js";
        assert_eq!(check(&engine, url, DOC, RequestType::SCRIPT).result, MatchResult::Blocked);
        assert_eq!(
            check(&engine, url, "https://sub.news.site.org/", RequestType::SCRIPT).result,
            MatchResult::NoMatch
        );
        assert_eq!(
            check(&engine, url, "https://other.org/", RequestType::SCRIPT).result,
            MatchResult::NoMatch
        );
    }

    #[test]
    fn lowest_id_wins_within_realm() {
        let engine = engine(&[
            network("/ads/", FilterFlags::empty(), MatchKind::Plain, "/ads/", "ads"),
            network("banner", FilterFlags::empty(), MatchKind::Plain, "banner", "-"),
            network(r"/ad[s]/", FilterFlags::empty(), MatchKind::Regex, r"/ad[s]/", "/"),
        ]);
        let verdict = check(&engine, "https://x.com/ads/banner.png", DOC, RequestType::IMAGE);
        assert_eq!(
            verdict.winner,
            Some(Winner {
                realm: Realm::Block,
                hit: Hit::Record(0)
            })
        );
        let verdict = check(&engine, "https://x.com/banner.png", DOC, RequestType::IMAGE);
        assert_eq!(verdict.winner.map(|w| w.hit), Some(Hit::Record(1)));
    }

    #[test]
    fn duplicate_lines_are_skipped_across_lists() {
        let entries = [
            hostname(FilterFlags::empty(), "ads.example.com"),
            network("/ads/", FilterFlags::empty(), MatchKind::Plain, "/ads/", "ads"),
        ];
        let mut engine = Engine::default();
        let first = engine.load_compiled(&compiled("a", &entries)).expect("load a");
        assert_eq!(first.duplicates, 0);
        let second = engine.load_compiled(&compiled("b", &entries)).expect("load b");
        assert_eq!(second.list_id, 1);
        assert_eq!(second.duplicates, 2);
        assert_eq!(engine.stats().records, 1);
        assert_eq!(engine.stats().duplicates, 2);
    }

    #[test]
    fn malformed_list_leaves_engine_unchanged() {
        let mut engine = Engine::default();
        let good = compiled("good", &[hostname(FilterFlags::empty(), "ads.example.com")]);
        engine.load_compiled(&good).expect("load");

        let bad = format!(
            "{}not a line\n",
            compiled("bad", &[network("/x/", FilterFlags::empty(), MatchKind::Plain, "/x/", "-")]),
        );
        assert_eq!(engine.load_compiled(&bad), Err(LoadError::MalformedLine { line: 3 }));

        let bad_regex = compiled(
            "regex",
            &[network("/(?<=a)b/", FilterFlags::empty(), MatchKind::Regex, "(?<=a)b", "/")],
        );
        assert_eq!(engine.load_compiled(&bad_regex), Err(LoadError::MalformedLine { line: 2 }));

        let stats = engine.stats();
        assert_eq!(stats.lists, 1);
        assert_eq!(stats.records, 0);
        assert_eq!(engine.lists(), ["good".to_string()]);
    }

    #[test]
    fn frozen_engine_rejects_loads_until_reset() {
        let text = compiled("a", &[hostname(FilterFlags::empty(), "ads.example.com")]);
        let mut engine = Engine::default();
        engine.load_compiled(&text).expect("load");
        engine.freeze();
        assert!(engine.is_frozen());
        assert_eq!(engine.load_compiled(&text), Err(LoadError::Frozen));

        engine.reset();
        assert!(!engine.is_frozen());
        assert_eq!(engine.stats().lists, 0);
        engine.load_compiled(&text).expect("reload");
    }

    #[test]
    fn optimize_preserves_verdicts() {
        let mut entries = Vec::new();
        let types = [RequestType::SCRIPT, RequestType::IMAGE, RequestType::empty()];
        for i in 0..24 {
            let pattern = format!("/ads/{}/", i);
            entries.push(network_with(
                &pattern,
                FilterFlags::empty(),
                MatchKind::Plain,
                &pattern,
                "ads",
                types[i % 3],
                "",
            ));
        }
        let frozen = engine(&entries);
        let mut optimized = frozen.clone();
        optimized.optimize();
        assert!(optimized.stats().block.partitioned_buckets > 0);

        for i in 0..24 {
            let url = format!("https://x.com/ads/{}/a", i);
            for ty in [RequestType::SCRIPT, RequestType::IMAGE, RequestType::FONT] {
                assert_eq!(
                    check(&frozen, &url, DOC, ty),
                    check(&optimized, &url, DOC, ty),
                    "{url} {ty:?}"
                );
            }
        }
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();

        let engine = Arc::new(engine(&[
            hostname(FilterFlags::empty(), "ads.example.com"),
            network("/track/", FilterFlags::empty(), MatchKind::Plain, "/track/", "track"),
        ]));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    let url = if i % 2 == 0 {
                        "https://ads.example.com/a.js"
                    } else {
                        "https://x.com/track/p.gif"
                    };
                    (0..100)
                        .map(|_| check(&engine, url, DOC, RequestType::SCRIPT).result)
                        .all(|r| r == MatchResult::Blocked)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().expect("thread"));
        }
    }
}
