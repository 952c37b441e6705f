//! Compiled filter records
//!
//! A `FilterRecord` is created once when a compiled line is loaded and is
//! never mutated afterwards. It carries the pattern source, option bits, an
//! optional origin scope and the raw rule text, plus the evaluator built from
//! the pattern.

use regex::{Regex, RegexBuilder};

use crate::domain_set::DomainSet;
use crate::psl::walk_host_suffixes;
use crate::types::{FilterFlags, FilteringContext, MatchKind, PartyMask, RequestType};
use crate::url::{get_host_position, is_at_separator, is_separator_char};

/// Error building a record from compiled fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("invalid regex: {0}")]
    InvalidRegex(String),
    #[error("invalid domain option: {0}")]
    InvalidDomainOption(String),
}

// =============================================================================
// Request URL View
// =============================================================================

/// Per-request URL data shared by every candidate evaluation.
#[derive(Debug)]
pub struct UrlView<'a> {
    pub raw: &'a str,
    pub lower: String,
    pub host: Option<(usize, usize)>,
}

impl<'a> UrlView<'a> {
    pub fn new(url: &'a str) -> Self {
        Self {
            raw: url,
            lower: url.to_ascii_lowercase(),
            host: get_host_position(url),
        }
    }

    #[inline]
    fn text(&self, match_case: bool) -> &[u8] {
        if match_case {
            self.raw.as_bytes()
        } else {
            self.lower.as_bytes()
        }
    }
}

// =============================================================================
// Domain Scope
// =============================================================================

/// `domain=` restriction on the document origin.
#[derive(Debug, Clone)]
pub struct DomainScope {
    /// `None` when the option only lists negated domains. `Some(empty)` when
    /// every included domain was also negated, which never matches.
    include: Option<DomainSet>,
    exclude: DomainSet,
}

impl DomainScope {
    /// Parse a `|`-separated option value such as `a.com|~b.a.com`.
    pub fn parse(value: &str) -> Result<Self, FilterError> {
        let mut included: Vec<&str> = Vec::new();
        let mut exclude = DomainSet::new();

        for entry in value.split('|') {
            let (negated, domain) = match entry.strip_prefix('~') {
                Some(rest) => (true, rest),
                None => (false, entry),
            };
            if domain.is_empty() || domain.bytes().any(|b| b.is_ascii_whitespace() || b == b'~') {
                return Err(FilterError::InvalidDomainOption(value.to_string()));
            }
            if negated {
                exclude.add(domain);
            } else {
                included.push(domain);
            }
        }

        let include = if included.is_empty() {
            None
        } else {
            Some(included.into_iter().filter(|d| !exclude.test(d)).collect::<DomainSet>())
        };

        Ok(Self { include, exclude })
    }

    /// True when no document can ever satisfy the scope.
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(&self.include, Some(set) if set.is_empty())
    }

    /// Test a document hostname. The most specific listed suffix decides.
    pub fn matches(&self, doc_host: &str) -> bool {
        for suffix in walk_host_suffixes(doc_host) {
            if let Some(include) = &self.include {
                if include.test(suffix) {
                    return true;
                }
            }
            if self.exclude.test(suffix) {
                return false;
            }
        }
        self.include.is_none()
    }

    pub fn freeze(&mut self) {
        if let Some(include) = &mut self.include {
            include.freeze();
        }
        self.exclude.freeze();
    }
}

// =============================================================================
// Pattern Evaluation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Lit(Vec<u8>),
    Sep,
    Star,
}

#[derive(Debug, Clone)]
enum Evaluator {
    Plain(Vec<u8>),
    Exact(Vec<u8>),
    Ops(Vec<Op>),
    Regex(Regex),
}

fn compile_ops(pattern: &str) -> Vec<Op> {
    let mut ops: Vec<Op> = Vec::new();
    let mut lit: Vec<u8> = Vec::new();
    for &b in pattern.as_bytes() {
        match b {
            b'*' | b'^' => {
                if !lit.is_empty() {
                    ops.push(Op::Lit(std::mem::take(&mut lit)));
                }
                if b == b'^' {
                    ops.push(Op::Sep);
                } else if ops.last() != Some(&Op::Star) {
                    ops.push(Op::Star);
                }
            }
            _ => lit.push(b),
        }
    }
    if !lit.is_empty() {
        ops.push(Op::Lit(lit));
    }
    ops
}

/// Match a star-free run of ops at exactly `pos`. Returns the end offset.
fn match_segment(text: &[u8], mut pos: usize, segment: &[Op]) -> Option<usize> {
    for op in segment {
        match op {
            Op::Lit(lit) => {
                if text.len() < pos + lit.len() || &text[pos..pos + lit.len()] != lit.as_slice() {
                    return None;
                }
                pos += lit.len();
            }
            // `^` also matches the end of the URL
            Op::Sep if pos >= text.len() => {}
            Op::Sep if is_separator_char(text[pos]) => pos += 1,
            Op::Sep | Op::Star => return None,
        }
    }
    Some(pos)
}

/// End offset of the leftmost match of `segment` at or after `from`.
fn find_segment(text: &[u8], from: usize, segment: &[Op]) -> Option<usize> {
    if let Some(Op::Lit(lit)) = segment.first() {
        let mut start = from;
        while let Some(p) = find_from(text, lit, start) {
            if let Some(end) = match_segment(text, p, segment) {
                return Some(end);
            }
            start = p + 1;
        }
        return None;
    }
    (from..=text.len()).find_map(|p| match_segment(text, p, segment))
}

/// Match `ops` against `text` starting exactly at `pos`.
///
/// `None` when the ops before the first `*` do not match at `pos`. Once they
/// do, the verdict holds for every later start too, because each segment
/// after a `*` is matched at its leftmost position.
fn match_ops(text: &[u8], pos: usize, ops: &[Op], right_anchor: bool) -> Option<bool> {
    let mut segments = ops.split(|op| *op == Op::Star);
    let head = segments.next().unwrap_or(&[]);
    let mut cursor = match_segment(text, pos, head)?;

    let Some(mut last) = segments.next() else {
        return Some(!right_anchor || cursor == text.len());
    };
    for next in segments {
        match find_segment(text, cursor, last) {
            Some(end) => cursor = end,
            None => return Some(false),
        }
        last = next;
    }

    if last.is_empty() {
        return Some(true);
    }
    if !right_anchor {
        return Some(find_segment(text, cursor, last).is_some());
    }
    Some((cursor..=text.len()).any(|p| match_segment(text, p, last) == Some(text.len())))
}

fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if from >= haystack.len() || haystack.len() - from < needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

// =============================================================================
// Filter Record
// =============================================================================

/// An immutable compiled network filter.
#[derive(Debug, Clone)]
pub struct FilterRecord {
    /// Pattern body without anchors (regex source for `MatchKind::Regex`)
    pub pattern: String,
    pub kind: MatchKind,
    pub flags: FilterFlags,
    /// Zero means all types
    pub type_mask: RequestType,
    /// Zero means any party
    pub party_mask: PartyMask,
    /// Raw `domain=` value, empty when unscoped
    pub domain_opt: String,
    pub domain_scope: Option<DomainScope>,
    /// Index into the engine's list-name table
    pub list_id: u16,
    /// Original rule text
    pub raw: String,
    evaluator: Evaluator,
}

impl FilterRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pattern: String,
        kind: MatchKind,
        flags: FilterFlags,
        type_mask: RequestType,
        party_mask: PartyMask,
        domain_opt: String,
        list_id: u16,
        raw: String,
    ) -> Result<Self, FilterError> {
        let match_case = flags.contains(FilterFlags::MATCH_CASE);
        let pattern = if match_case || kind == MatchKind::Regex {
            pattern
        } else {
            pattern.to_ascii_lowercase()
        };

        let evaluator = match kind {
            MatchKind::Regex => RegexBuilder::new(&pattern)
                .case_insensitive(!match_case)
                .build()
                .map(Evaluator::Regex)
                .map_err(|e| FilterError::InvalidRegex(e.to_string()))?,
            MatchKind::Plain if !flags.intersects(FilterFlags::LEFT_ANCHOR | FilterFlags::RIGHT_ANCHOR) => {
                Evaluator::Plain(pattern.as_bytes().to_vec())
            }
            MatchKind::Exact => Evaluator::Exact(pattern.as_bytes().to_vec()),
            _ => Evaluator::Ops(compile_ops(&pattern)),
        };

        let domain_scope = if domain_opt.is_empty() {
            None
        } else {
            Some(DomainScope::parse(&domain_opt)?)
        };

        Ok(Self {
            pattern,
            kind,
            flags,
            type_mask,
            party_mask,
            domain_opt,
            domain_scope,
            list_id,
            raw,
            evaluator,
        })
    }

    /// Check type and party options. Popup, inline-script and elemhide
    /// requests only match filters that name their type.
    #[inline]
    pub fn matches_options(&self, ctx: &FilteringContext<'_>) -> bool {
        if self.type_mask.is_empty() {
            if ctx.request_type.intersects(RequestType::SPECIAL) {
                return false;
            }
        } else if !self.type_mask.intersects(ctx.request_type) {
            return false;
        }
        if !self.party_mask.is_empty() && !self.party_mask.intersects(ctx.party()) {
            return false;
        }
        true
    }

    /// Check the `domain=` scope against the document hostname.
    #[inline]
    pub fn matches_origin(&self, ctx: &FilteringContext<'_>) -> bool {
        match &self.domain_scope {
            Some(scope) => scope.matches(&ctx.doc_host),
            None => true,
        }
    }

    /// Evaluate the pattern against the request URL.
    pub fn matches_url(&self, url: &UrlView<'_>) -> bool {
        let match_case = self.flags.contains(FilterFlags::MATCH_CASE);
        match &self.evaluator {
            Evaluator::Regex(re) => re.is_match(url.raw),
            Evaluator::Plain(needle) => find_from(url.text(match_case), needle, 0).is_some(),
            Evaluator::Exact(needle) => url.text(match_case) == needle.as_slice(),
            Evaluator::Ops(ops) => self.match_ops_anywhere(url.text(match_case), url.host, ops),
        }
    }

    /// Full evaluation: options, origin, then pattern.
    pub fn matches(&self, ctx: &FilteringContext<'_>, url: &UrlView<'_>) -> bool {
        self.matches_options(ctx) && self.matches_origin(ctx) && self.matches_url(url)
    }

    fn match_ops_anywhere(&self, text: &[u8], host: Option<(usize, usize)>, ops: &[Op]) -> bool {
        let right = self.flags.contains(FilterFlags::RIGHT_ANCHOR);
        let has_star = ops.contains(&Op::Star);
        let first_decides = |p: usize| match match_ops(text, p, ops, right) {
            Some(true) => Some(true),
            Some(false) if has_star => Some(false),
            _ => None,
        };

        if self.flags.contains(FilterFlags::HOST_ANCHOR) {
            // Only at the start of a hostname label
            let Some((host_start, host_end)) = host else {
                return false;
            };
            return (host_start..host_end.max(host_start + 1))
                .filter(|&p| p == host_start || text.get(p - 1) == Some(&b'.'))
                .find_map(&first_decides)
                .unwrap_or(false);
        }

        if self.flags.contains(FilterFlags::LEFT_ANCHOR) {
            return match_ops(text, 0, ops, right).unwrap_or(false);
        }

        match ops.first() {
            Some(Op::Lit(lit)) => {
                let mut from = 0;
                while let Some(p) = find_from(text, lit, from) {
                    if let Some(decided) = first_decides(p) {
                        return decided;
                    }
                    from = p + 1;
                }
                false
            }
            Some(Op::Sep) => (0..=text.len())
                .filter(|&p| is_at_separator(text, p))
                .find_map(&first_decides)
                .unwrap_or(false),
            Some(Op::Star) => first_decides(0).unwrap_or(false),
            None => true,
        }
    }

    /// Options of this record that constrained the match, in filter syntax.
    pub fn option_labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if self.flags.contains(FilterFlags::IMPORTANT) {
            labels.push("important".to_string());
        }
        if self.flags.contains(FilterFlags::MATCH_CASE) {
            labels.push("match-case".to_string());
        }
        if !self.type_mask.is_empty() {
            for bit in self.type_mask.iter() {
                labels.push(bit.option_name().to_string());
            }
        }
        if self.party_mask == PartyMask::THIRD_PARTY {
            labels.push("third-party".to_string());
        } else if self.party_mask == PartyMask::FIRST_PARTY {
            labels.push("first-party".to_string());
        }
        if !self.domain_opt.is_empty() {
            labels.push(format!("domain={}", self.domain_opt));
        }
        labels
    }

    /// Freeze the domain sets of the scope.
    pub fn freeze(&mut self) {
        if let Some(scope) = &mut self.domain_scope {
            scope.freeze();
        }
    }
}
