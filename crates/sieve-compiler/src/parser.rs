//! Filter list parser
//!
//! Classifies each logical line of an ABP/uBO-style list and turns network
//! filters into `NetworkRule`s. Parsing never aborts a list: malformed lines
//! come back as `ParsedLine::Invalid` with the reason.

use std::borrow::Cow;
use std::net::IpAddr;

use sieve_core::types::{FilterFlags, PartyMask, RequestType};

/// Why a line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported option '{0}'")]
    UnsupportedOption(String),
    #[error("empty option")]
    EmptyOption,
    #[error("'important' is not allowed on exception filters")]
    ImportantException,
    #[error("{0} options match nothing")]
    EmptyMask(&'static str),
    #[error("invalid domain option '{0}'")]
    InvalidDomain(String),
    #[error("invalid hostname '{0}'")]
    InvalidHostname(String),
    #[error("empty pattern")]
    EmptyPattern,
    #[error("control character in filter")]
    ControlCharacter,
    #[error("invalid cosmetic filter")]
    InvalidCosmetic,
}

/// A parsed network filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRule {
    /// Exception, important, match-case and anchor bits
    pub flags: FilterFlags,
    /// Pattern body without anchors; regex source for regex filters
    pub pattern: String,
    pub is_regex: bool,
    /// Zero means all types
    pub type_mask: RequestType,
    /// Zero means any party
    pub party_mask: PartyMask,
    /// Normalized `domain=` value (`a.com|~b.a.com`), empty when unscoped
    pub domain_opt: String,
    pub badfilter: bool,
    /// Filter text as written in the list
    pub raw: String,
}

impl NetworkRule {
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.flags.contains(FilterFlags::EXCEPTION)
    }

    /// The hostname of a `||host^` filter without constraining options.
    pub fn pure_hostname(&self) -> Option<&str> {
        if self.is_regex
            || !self.flags.contains(FilterFlags::HOST_ANCHOR)
            || self.flags.intersects(FilterFlags::LEFT_ANCHOR | FilterFlags::RIGHT_ANCHOR)
            || !self.type_mask.is_empty()
            || !self.party_mask.is_empty()
            || !self.domain_opt.is_empty()
        {
            return None;
        }
        let host = self.pattern.strip_suffix('^').unwrap_or(&self.pattern);
        if is_hostname(host) {
            Some(host)
        } else {
            None
        }
    }
}

/// Classification of one logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Empty,
    Comment,
    Cosmetic,
    Network(NetworkRule),
    Invalid(ParseError),
}

// =============================================================================
// Logical Lines
// =============================================================================

/// Iterator over logical lines: `(first physical line number, text)`.
pub struct LogicalLines<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

/// Split list text into logical lines, joining backslash continuations.
pub fn logical_lines(text: &str) -> LogicalLines<'_> {
    LogicalLines {
        lines: text.lines().enumerate(),
    }
}

impl<'a> Iterator for LogicalLines<'a> {
    type Item = (usize, Cow<'a, str>);

    fn next(&mut self) -> Option<Self::Item> {
        let (index, first) = self.lines.next()?;
        let Some(head) = first.trim_end().strip_suffix('\\') else {
            return Some((index + 1, Cow::Borrowed(first)));
        };

        let mut joined = head.to_string();
        while let Some((_, next)) = self.lines.next() {
            let next = next.trim_start();
            match next.trim_end().strip_suffix('\\') {
                Some(part) => joined.push_str(part),
                None => {
                    joined.push_str(next);
                    break;
                }
            }
        }
        Some((index + 1, Cow::Owned(joined)))
    }
}

// =============================================================================
// Line Classification
// =============================================================================

const COSMETIC_MARKERS: [&str; 9] = ["#@?#", "#@$#", "#@%#", "#@#", "##", "#?#", "#$#", "#%#", "#+js"];

/// Names that hosts files map to loopback addresses.
const LOCAL_HOSTNAMES: [&str; 8] = [
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "0.0.0.0",
];

/// Classify and parse one logical line.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::Empty;
    }
    if line.starts_with('!') || line.starts_with('[') {
        return ParsedLine::Comment;
    }

    if let Some((marker, pos)) = find_cosmetic_marker(line) {
        return parse_cosmetic(&line[pos + marker.len()..], marker);
    }
    if line.starts_with('#') {
        return ParsedLine::Comment;
    }

    if let Some(parsed) = parse_hosts_file_line(line) {
        return parsed;
    }

    if line.chars().any(char::is_control) {
        return ParsedLine::Invalid(ParseError::ControlCharacter);
    }

    match parse_network(line) {
        Ok(rule) => ParsedLine::Network(rule),
        Err(e) => ParsedLine::Invalid(e),
    }
}

fn find_cosmetic_marker(line: &str) -> Option<(&'static str, usize)> {
    COSMETIC_MARKERS
        .iter()
        .filter_map(|marker| line.find(marker).map(|pos| (*marker, pos)))
        .min_by_key(|&(marker, pos)| (pos, std::cmp::Reverse(marker.len())))
}

fn parse_cosmetic(body: &str, marker: &str) -> ParsedLine {
    if body.trim().is_empty() || body.chars().any(char::is_control) {
        return ParsedLine::Invalid(ParseError::InvalidCosmetic);
    }
    let plain_selector = matches!(marker, "##" | "#@#");
    if plain_selector && !is_plausible_selector(body) {
        return ParsedLine::Invalid(ParseError::InvalidCosmetic);
    }
    ParsedLine::Cosmetic
}

/// Cheap CSS sanity check: every `#id` / `.class` outside brackets, quotes
/// and parentheses must start with an identifier character.
fn is_plausible_selector(selector: &str) -> bool {
    if selector.contains(['{', '}']) {
        return false;
    }
    let bytes = selector.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'[' | b'(' => depth += 1,
            b']' | b')' => depth = depth.saturating_sub(1),
            b'#' | b'.' if depth == 0 => {
                let ok = bytes
                    .get(i + 1)
                    .map_or(false, |&n| n.is_ascii_alphabetic() || n == b'_' || n == b'-' || n == b'\\' || n >= 0x80);
                if !ok {
                    return false;
                }
            }
            b'%' | b'`' if depth == 0 => return false,
            _ => {}
        }
    }
    quote.is_none() && depth == 0
}

/// `0.0.0.0 example.com` style lines become `||example.com^`. A lone
/// address is left to the network parser.
fn parse_hosts_file_line(line: &str) -> Option<ParsedLine> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    first.parse::<IpAddr>().ok()?;

    let host = parts.next()?;
    if host.starts_with('#') {
        return Some(ParsedLine::Comment);
    }
    let host = host.to_ascii_lowercase();
    if LOCAL_HOSTNAMES.contains(&host.as_str()) {
        return Some(ParsedLine::Comment);
    }
    let Some(host) = normalize_domain(&host) else {
        return Some(ParsedLine::Invalid(ParseError::InvalidHostname(host)));
    };
    Some(ParsedLine::Network(hostname_rule(host, line)))
}

fn hostname_rule(host: String, raw: &str) -> NetworkRule {
    NetworkRule {
        flags: FilterFlags::HOST_ANCHOR,
        pattern: format!("{}^", host),
        is_regex: false,
        type_mask: RequestType::empty(),
        party_mask: PartyMask::empty(),
        domain_opt: String::new(),
        badfilter: false,
        raw: raw.to_string(),
    }
}

// =============================================================================
// Network Filters
// =============================================================================

struct ParsedOptions {
    flags: FilterFlags,
    type_mask: RequestType,
    party_mask: PartyMask,
    domains: Vec<String>,
    badfilter: bool,
}

impl ParsedOptions {
    fn none() -> Self {
        Self {
            flags: FilterFlags::empty(),
            type_mask: RequestType::empty(),
            party_mask: PartyMask::empty(),
            domains: Vec::new(),
            badfilter: false,
        }
    }
}

fn parse_network(line: &str) -> Result<NetworkRule, ParseError> {
    // Bare hostnames read as `||host^`
    if is_hostname(line) && line.contains('.') {
        return Ok(hostname_rule(line.to_string(), line));
    }

    let mut flags = FilterFlags::empty();
    let mut body = line;
    if let Some(rest) = body.strip_prefix("@@") {
        flags |= FilterFlags::EXCEPTION;
        body = rest;
    }

    let (pattern_part, options_text) = split_rule_options(body);
    let options = match options_text {
        Some(text) => parse_options(text, flags.contains(FilterFlags::EXCEPTION))?,
        None => ParsedOptions::none(),
    };
    flags |= options.flags;
    if flags.contains(FilterFlags::EXCEPTION | FilterFlags::IMPORTANT) {
        return Err(ParseError::ImportantException);
    }

    let mut pattern = pattern_part;
    let is_regex = pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/');
    let pattern = if is_regex {
        pattern[1..pattern.len() - 1].to_string()
    } else {
        if let Some(rest) = pattern.strip_prefix("||") {
            flags |= FilterFlags::HOST_ANCHOR;
            pattern = rest;
        } else if let Some(rest) = pattern.strip_prefix('|') {
            flags |= FilterFlags::LEFT_ANCHOR;
            pattern = rest;
        }
        if let Some(rest) = pattern.strip_suffix('|') {
            flags |= FilterFlags::RIGHT_ANCHOR;
            pattern = rest;
        }
        normalize_wildcards(pattern, &mut flags)
    };

    let has_constraints = !options.type_mask.is_empty() || !options.party_mask.is_empty() || !options.domains.is_empty();
    if pattern.is_empty() && !has_constraints && !options.badfilter {
        return Err(ParseError::EmptyPattern);
    }

    Ok(NetworkRule {
        flags,
        pattern,
        is_regex,
        type_mask: options.type_mask,
        party_mask: options.party_mask,
        domain_opt: options.domains.join("|"),
        badfilter: options.badfilter,
        raw: line.to_string(),
    })
}

/// Collapse `**`, drop wildcards that only repeat what an absent anchor
/// already means.
fn normalize_wildcards(pattern: &str, flags: &mut FilterFlags) -> String {
    let mut out = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        if ch == '*' && out.ends_with('*') {
            continue;
        }
        out.push(ch);
    }

    if out.starts_with('*') {
        if flags.contains(FilterFlags::LEFT_ANCHOR) {
            flags.remove(FilterFlags::LEFT_ANCHOR);
        }
        if !flags.contains(FilterFlags::HOST_ANCHOR) {
            out.remove(0);
        }
    }
    if out.ends_with('*') {
        flags.remove(FilterFlags::RIGHT_ANCHOR);
        out.pop();
    }
    out
}

/// Split at the last `$` that starts an option list: one followed by a
/// comma, `~` or an alphanumeric, with no `/` after it.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    let Some(pos) = line.rfind('$') else {
        return (line, None);
    };
    let options = &line[pos + 1..];
    let starts_options = options
        .bytes()
        .next()
        .map_or(false, |b| b == b',' || b == b'~' || b.is_ascii_alphanumeric());
    if starts_options && !options.contains('/') {
        (&line[..pos], Some(options))
    } else {
        (line, None)
    }
}

fn parse_options(text: &str, exception: bool) -> Result<ParsedOptions, ParseError> {
    let mut options = ParsedOptions::none();
    let mut type_include = 0u32;
    let mut type_exclude = 0u32;
    let mut party_include = 0u8;
    let mut party_exclude = 0u8;

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseError::EmptyOption);
        }

        let raw_lower = raw.to_ascii_lowercase();
        let raw_lower = raw_lower.as_str();

        match raw_lower {
            "important" => {
                options.flags |= FilterFlags::IMPORTANT;
                continue;
            }
            "match-case" | "match_case" => {
                options.flags |= FilterFlags::MATCH_CASE;
                continue;
            }
            "badfilter" => {
                options.badfilter = true;
                continue;
            }
            _ => {}
        }

        if let Some(value) = raw_lower.strip_prefix("domain=").or_else(|| raw_lower.strip_prefix("from=")) {
            options.domains.extend(parse_domain_option(value)?);
            continue;
        }

        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower),
        };

        // Element hiding can only be turned off for a site
        if matches!(name, "elemhide" | "generichide") {
            if negated || !exception {
                return Err(ParseError::UnsupportedOption(raw.to_string()));
            }
            type_include |= RequestType::ELEMHIDE.bits();
            continue;
        }

        if let Some(mask) = request_type_mask(name) {
            if negated {
                type_exclude |= mask;
            } else {
                type_include |= mask;
            }
            continue;
        }

        if let Some(mask) = party_mask(name) {
            if negated {
                party_exclude |= mask;
            } else {
                party_include |= mask;
            }
            continue;
        }

        return Err(ParseError::UnsupportedOption(raw.to_string()));
    }

    // Popup, inline-script and elemhide sit outside `all`. Named alone they
    // make the filter apply to those types only.
    let special_include = type_include & RequestType::SPECIAL.bits();
    let special = special_include & !type_exclude;
    let type_bits = if special_include != 0 && type_include & RequestType::ALL.bits() == 0 {
        if special == 0 {
            return Err(ParseError::EmptyMask("type"));
        }
        special
    } else {
        finalize_mask_u32(type_include, type_exclude, RequestType::ALL.bits()).ok_or(ParseError::EmptyMask("type"))?
            | special
    };
    // `1p,3p` asks for both parties at once and is rejected like `1p,~1p`
    if party_include == PartyMask::ALL.bits() {
        return Err(ParseError::EmptyMask("party"));
    }
    let party_bits =
        finalize_mask_u8(party_include, party_exclude, PartyMask::ALL.bits()).ok_or(ParseError::EmptyMask("party"))?;
    options.type_mask = RequestType::from_bits_truncate(type_bits);
    options.party_mask = PartyMask::from_bits_truncate(party_bits);

    Ok(options)
}

/// Normalize a `|`-separated domain list. Entries keep their `~` prefix.
fn parse_domain_option(value: &str) -> Result<Vec<String>, ParseError> {
    let mut domains = Vec::new();
    for raw in value.split('|') {
        let raw = raw.trim();
        let (negated, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let domain = normalize_domain(domain_raw).ok_or_else(|| ParseError::InvalidDomain(value.to_string()))?;
        domains.push(if negated { format!("~{}", domain) } else { domain });
    }
    Ok(domains)
}

/// Include minus exclude over `all`. `None` when nothing is left; a mask
/// covering everything collapses to zero.
fn finalize_mask_u32(include: u32, exclude: u32, all: u32) -> Option<u32> {
    let include = include & all;
    let exclude = exclude & all;
    let mut mask = if include != 0 { include & !exclude } else { all & !exclude };
    if mask == 0 {
        return None;
    }
    if mask == all {
        mask = 0;
    }
    Some(mask)
}

fn finalize_mask_u8(include: u8, exclude: u8, all: u8) -> Option<u8> {
    let include = include & all;
    let exclude = exclude & all;
    let mut mask = if include != 0 { include & !exclude } else { all & !exclude };
    if mask == 0 {
        return None;
    }
    if mask == all {
        mask = 0;
    }
    Some(mask)
}

fn request_type_mask(name: &str) -> Option<u32> {
    match name {
        "script" => Some(RequestType::SCRIPT.bits()),
        "image" => Some(RequestType::IMAGE.bits()),
        "stylesheet" | "css" => Some(RequestType::STYLESHEET.bits()),
        "object" => Some(RequestType::OBJECT.bits()),
        "subdocument" | "frame" => Some(RequestType::SUBDOCUMENT.bits()),
        "document" | "doc" | "main_frame" => Some(RequestType::MAIN_FRAME.bits()),
        "xmlhttprequest" | "xhr" => Some(RequestType::XMLHTTPREQUEST.bits()),
        "media" => Some(RequestType::MEDIA.bits()),
        "font" => Some(RequestType::FONT.bits()),
        "ping" => Some(RequestType::PING.bits()),
        "websocket" => Some(RequestType::WEBSOCKET.bits()),
        "popup" => Some(RequestType::POPUP.bits()),
        "inline-script" => Some(RequestType::INLINE_SCRIPT.bits()),
        "other" => Some(RequestType::OTHER.bits()),
        "all" => Some(RequestType::ALL.bits()),
        _ => None,
    }
}

fn party_mask(name: &str) -> Option<u8> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(PartyMask::THIRD_PARTY.bits()),
        "first-party" | "firstparty" | "1p" => Some(PartyMask::FIRST_PARTY.bits()),
        _ => None,
    }
}

/// `[0-9a-z][0-9a-z.-]*[0-9a-z]`
fn is_hostname(s: &str) -> bool {
    let bytes = s.as_bytes();
    let edge = |b: &u8| b.is_ascii_digit() || b.is_ascii_lowercase();
    bytes.len() >= 2
        && bytes.first().map_or(false, edge)
        && bytes.last().map_or(false, edge)
        && bytes
            .iter()
            .all(|&b| b.is_ascii_digit() || b.is_ascii_lowercase() || b == b'.' || b == b'-')
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}
