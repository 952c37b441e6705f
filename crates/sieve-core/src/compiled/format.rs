//! Compiled List Format v1
//!
//! ```text
//! #sieve-compiled\t1\tname=<list name>
//! n\v<flags>\v<kind>\v<types>\v<party>\v<token>\v<pattern>\v<domain>\v<raw>
//! h\v<flags>\v<hostname>
//! ```
//!
//! Numeric fields are lowercase hex. The token field holds the token text,
//! `-` for the no-token bucket or `/` for the regex bucket. `\v` is the
//! vertical tab (0x0b), which never appears in accepted rule text.

use crate::types::{FilterFlags, MatchKind, PartyMask, RequestType};

/// Header magic
pub const COMPILED_MAGIC: &str = "#sieve-compiled";

/// Current format version
pub const COMPILED_VERSION: u32 = 1;

/// Field separator
pub const FIELD_SEP: char = '\x0b';

/// Token field value for the no-token bucket
pub const NO_TOKEN_FIELD: &str = "-";

/// Token field value for the regex bucket
pub const REGEX_TOKEN_FIELD: &str = "/";

/// Number of fields in a network line, including the tag
const NETWORK_FIELDS: usize = 9;

// =============================================================================
// Entries
// =============================================================================

/// Where a network filter is indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenSlot {
    /// Token text; hashed with `hash_token` at load time
    Token(String),
    /// Checked for every request
    NoToken,
    /// Regex bucket, checked for every request
    Regex,
}

impl TokenSlot {
    fn field(&self) -> &str {
        match self {
            TokenSlot::Token(t) => t,
            TokenSlot::NoToken => NO_TOKEN_FIELD,
            TokenSlot::Regex => REGEX_TOKEN_FIELD,
        }
    }

    fn from_field(field: &str) -> Option<Self> {
        match field {
            NO_TOKEN_FIELD => Some(TokenSlot::NoToken),
            REGEX_TOKEN_FIELD => Some(TokenSlot::Regex),
            "" => None,
            t if t.bytes().all(crate::url::is_token_char) => Some(TokenSlot::Token(t.to_string())),
            _ => None,
        }
    }
}

/// A network filter line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkEntry {
    pub flags: FilterFlags,
    pub kind: MatchKind,
    pub type_mask: RequestType,
    pub party_mask: PartyMask,
    pub token: TokenSlot,
    pub pattern: String,
    pub domain_opt: String,
    pub raw: String,
}

/// One compiled record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompiledEntry {
    Network(NetworkEntry),
    /// Pure hostname filter (`||host^`) for the realm's hostname dictionary
    Hostname { flags: FilterFlags, hostname: String },
}

impl CompiledEntry {
    /// Encode as one line, without the trailing newline.
    pub fn encode(&self) -> String {
        match self {
            CompiledEntry::Network(n) => format!(
                "n{sep}{:x}{sep}{:x}{sep}{:x}{sep}{:x}{sep}{}{sep}{}{sep}{}{sep}{}",
                n.flags.bits(),
                n.kind as u8,
                n.type_mask.bits(),
                n.party_mask.bits(),
                n.token.field(),
                n.pattern,
                n.domain_opt,
                n.raw,
                sep = FIELD_SEP,
            ),
            CompiledEntry::Hostname { flags, hostname } => {
                format!("h{sep}{:x}{sep}{}", flags.bits(), hostname, sep = FIELD_SEP)
            }
        }
    }

    /// Decode one line. Returns `None` for malformed input.
    pub fn decode(line: &str) -> Option<Self> {
        let mut fields = line.splitn(NETWORK_FIELDS, FIELD_SEP);
        match fields.next()? {
            "n" => {
                let flags = FilterFlags::from_bits(u8::from_str_radix(fields.next()?, 16).ok()?)?;
                let kind = MatchKind::try_from(u8::from_str_radix(fields.next()?, 16).ok()?).ok()?;
                let type_mask = RequestType::from_bits(u32::from_str_radix(fields.next()?, 16).ok()?)?;
                let party_mask = PartyMask::from_bits(u8::from_str_radix(fields.next()?, 16).ok()?)?;
                let token = TokenSlot::from_field(fields.next()?)?;
                let pattern = fields.next()?.to_string();
                let domain_opt = fields.next()?.to_string();
                let raw = fields.next()?.to_string();
                Some(CompiledEntry::Network(NetworkEntry {
                    flags,
                    kind,
                    type_mask,
                    party_mask,
                    token,
                    pattern,
                    domain_opt,
                    raw,
                }))
            }
            "h" => {
                let flags = FilterFlags::from_bits(u8::from_str_radix(fields.next()?, 16).ok()?)?;
                let hostname = fields.next()?;
                if hostname.is_empty() || fields.next().is_some() {
                    return None;
                }
                Some(CompiledEntry::Hostname {
                    flags,
                    hostname: hostname.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Build the header line for a list.
pub fn header_line(name: &str) -> String {
    format!("{}\t{}\tname={}", COMPILED_MAGIC, COMPILED_VERSION, name)
}

/// Parsed header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header<'a> {
    Valid { name: &'a str },
    WrongVersion { found: &'a str },
    Invalid,
}

/// Parse a header line.
pub fn parse_header(line: &str) -> Header<'_> {
    let mut parts = line.splitn(3, '\t');
    if parts.next() != Some(COMPILED_MAGIC) {
        return Header::Invalid;
    }
    let version = match parts.next() {
        Some(v) => v,
        None => return Header::Invalid,
    };
    if version.parse::<u32>().ok() != Some(COMPILED_VERSION) {
        return Header::WrongVersion { found: version };
    }
    match parts.next().and_then(|p| p.strip_prefix("name=")) {
        Some(name) => Header::Valid { name },
        None => Header::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_line_layout() {
        let entry = CompiledEntry::Network(NetworkEntry {
            flags: FilterFlags::HOST_ANCHOR | FilterFlags::IMPORTANT,
            kind: MatchKind::HostnameAnchor,
            type_mask: RequestType::SCRIPT,
            party_mask: PartyMask::THIRD_PARTY,
            token: TokenSlot::Token("ads".to_string()),
            pattern: "ads.example.com/x^".to_string(),
            domain_opt: "a.com|~b.a.com".to_string(),
            raw: "||ads.example.com/x^$script,3p,important,domain=a.com|~b.a.com".to_string(),
        });
        let line = entry.encode();
        assert!(line.starts_with("n\x0b22\x0b3\x0b2\x0b2\x0bads\x0b"));
        assert_eq!(CompiledEntry::decode(&line), Some(entry));
    }

    #[test]
    fn hostname_line_layout() {
        let entry = CompiledEntry::Hostname {
            flags: FilterFlags::EXCEPTION,
            hostname: "ads.example.com".to_string(),
        };
        assert_eq!(entry.encode(), "h\x0b1\x0bads.example.com");
        assert_eq!(CompiledEntry::decode(&entry.encode()), Some(entry));
    }

    #[test]
    fn token_slots() {
        assert_eq!(TokenSlot::from_field("-"), Some(TokenSlot::NoToken));
        assert_eq!(TokenSlot::from_field("/"), Some(TokenSlot::Regex));
        assert_eq!(TokenSlot::from_field("ad%20s"), Some(TokenSlot::Token("ad%20s".to_string())));
        assert_eq!(TokenSlot::from_field("a.b"), None);
        assert_eq!(TokenSlot::from_field(""), None);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(CompiledEntry::decode(""), None);
        assert_eq!(CompiledEntry::decode("x\x0b0"), None);
        assert_eq!(CompiledEntry::decode("n\x0bzz\x0b0\x0b0\x0b0\x0b-\x0bp\x0b\x0bp"), None);
        assert_eq!(CompiledEntry::decode("n\x0b0\x0b9\x0b0\x0b0\x0b-\x0bp\x0b\x0bp"), None);
        assert_eq!(CompiledEntry::decode("n\x0b0\x0b0\x0b0\x0b0\x0b-\x0bp"), None);
        assert_eq!(CompiledEntry::decode("h\x0b0\x0b"), None);
    }

    #[test]
    fn header_round_trip() {
        assert_eq!(parse_header(&header_line("easylist")), Header::Valid { name: "easylist" });
        assert_eq!(
            parse_header("#sieve-compiled\t0\tname=x"),
            Header::WrongVersion { found: "0" }
        );
        assert_eq!(parse_header("garbage"), Header::Invalid);
    }
}
