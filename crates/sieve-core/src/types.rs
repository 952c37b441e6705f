//! Core type definitions for the sieve engine
//!
//! These types appear in compiled lists, in selfie blobs and in every
//! `match_request` call.

use crate::psl::is_third_party;
use crate::url::extract_host;

// =============================================================================
// Filter Flags
// =============================================================================

bitflags::bitflags! {
    /// Per-filter behavior bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct FilterFlags: u8 {
        /// `@@` exception filter
        const EXCEPTION = 1 << 0;
        /// `$important` - ignores exception filters
        const IMPORTANT = 1 << 1;
        /// `$match-case`
        const MATCH_CASE = 1 << 2;
        /// Pattern starts with `|`
        const LEFT_ANCHOR = 1 << 3;
        /// Pattern ends with `|`
        const RIGHT_ANCHOR = 1 << 4;
        /// Pattern starts with `||`
        const HOST_ANCHOR = 1 << 5;
    }
}

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask. A filter mask of zero means "all types".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct RequestType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const MAIN_FRAME = 1 << 6;   // main document
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;

        /// Popup window opened by a page
        const POPUP = 1 << 12;
        /// Script embedded in the document
        const INLINE_SCRIPT = 1 << 13;
        /// Element hiding on the document
        const ELEMHIDE = 1 << 14;

        /// All network request types
        const ALL = 0x0FFF;
        /// Types that only filters naming them can match
        const SPECIAL = Self::POPUP.bits() | Self::INLINE_SCRIPT.bits() | Self::ELEMHIDE.bits();
    }
}

impl RequestType {
    /// Parse from a browser request type name. Unknown names map to `OTHER`.
    pub fn from_type_name(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::MAIN_FRAME,
            "sub_frame" | "subdocument" => Self::SUBDOCUMENT,
            "stylesheet" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" | "imageset" => Self::IMAGE,
            "font" => Self::FONT,
            "object" | "object_subrequest" => Self::OBJECT,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            "ping" | "beacon" => Self::PING,
            "media" => Self::MEDIA,
            "websocket" => Self::WEBSOCKET,
            "popup" => Self::POPUP,
            "inline-script" | "inline_script" => Self::INLINE_SCRIPT,
            "elemhide" | "cosmetic-filtering" => Self::ELEMHIDE,
            _ => Self::OTHER,
        }
    }

    /// Filter-syntax name of a single type bit.
    pub fn option_name(self) -> &'static str {
        match self {
            Self::SCRIPT => "script",
            Self::IMAGE => "image",
            Self::STYLESHEET => "stylesheet",
            Self::OBJECT => "object",
            Self::SUBDOCUMENT => "subdocument",
            Self::MAIN_FRAME => "document",
            Self::XMLHTTPREQUEST => "xmlhttprequest",
            Self::WEBSOCKET => "websocket",
            Self::FONT => "font",
            Self::MEDIA => "media",
            Self::PING => "ping",
            Self::POPUP => "popup",
            Self::INLINE_SCRIPT => "inline-script",
            Self::ELEMHIDE => "elemhide",
            _ => "other",
        }
    }
}

// =============================================================================
// Party Masks
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) mask. Zero means "any party".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct PartyMask: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

// =============================================================================
// Match Kind
// =============================================================================

/// How a filter's pattern is evaluated against a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MatchKind {
    /// Literal substring anywhere in the URL
    Plain = 0,
    /// Segments separated by `*` and `^`, optionally `|` anchored
    Wildcard = 1,
    /// `/.../` regular expression
    Regex = 2,
    /// `||` pattern, matched from a hostname label boundary
    HostnameAnchor = 3,
    /// `|literal|`, the whole URL
    Exact = 4,
}

impl TryFrom<u8> for MatchKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Plain),
            1 => Ok(Self::Wildcard),
            2 => Ok(Self::Regex),
            3 => Ok(Self::HostnameAnchor),
            4 => Ok(Self::Exact),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Realms
// =============================================================================

/// Filter class by precedence. Realms are probed in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Realm {
    /// `$important` block filters
    Important = 0,
    /// `@@` exception filters
    Exception = 1,
    /// Plain block filters
    Block = 2,
}

impl Realm {
    pub const ALL: [Realm; 3] = [Realm::Important, Realm::Exception, Realm::Block];

    /// Realm a filter with these flags belongs to.
    pub fn from_flags(flags: FilterFlags) -> Self {
        if flags.contains(FilterFlags::EXCEPTION) {
            Realm::Exception
        } else if flags.contains(FilterFlags::IMPORTANT) {
            Realm::Important
        } else {
            Realm::Block
        }
    }

    /// Flags implied by membership in this realm.
    pub fn flags(self) -> FilterFlags {
        match self {
            Realm::Important => FilterFlags::IMPORTANT,
            Realm::Exception => FilterFlags::EXCEPTION,
            Realm::Block => FilterFlags::empty(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Realm::Important => "important",
            Realm::Exception => "exception",
            Realm::Block => "block",
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Realm {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Important),
            1 => Ok(Self::Exception),
            2 => Ok(Self::Block),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Filtering Context
// =============================================================================

/// A request being classified. Owned by the caller, never stored by the engine.
#[derive(Debug, Clone)]
pub struct FilteringContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// URL of the document that issued the request
    pub document_url: &'a str,
    /// Request type
    pub request_type: RequestType,
    /// Lowercased request hostname
    pub req_host: String,
    /// Lowercased document hostname
    pub doc_host: String,
    /// Request and document belong to different sites
    pub is_third_party: bool,
}

impl<'a> FilteringContext<'a> {
    /// Build a context, deriving hostnames and the third-party flag.
    pub fn new(url: &'a str, document_url: &'a str, request_type: RequestType) -> Self {
        let req_host = extract_host(url).unwrap_or("").to_ascii_lowercase();
        let doc_host = extract_host(document_url).unwrap_or("").to_ascii_lowercase();
        let is_third_party =
            !doc_host.is_empty() && !req_host.is_empty() && is_third_party(&doc_host, &req_host);
        Self {
            url,
            document_url,
            request_type,
            req_host,
            doc_host,
            is_third_party,
        }
    }

    /// Party bit of this request.
    #[inline]
    pub fn party(&self) -> PartyMask {
        if self.is_third_party {
            PartyMask::THIRD_PARTY
        } else {
            PartyMask::FIRST_PARTY
        }
    }
}

// =============================================================================
// Match Result
// =============================================================================

/// Final classification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MatchResult {
    /// No filter matched; default policy applies
    #[default]
    NoMatch = 0,
    /// A block filter decided
    Blocked = 1,
    /// An exception filter decided
    Allowed = 2,
}

impl From<MatchResult> for u8 {
    fn from(result: MatchResult) -> u8 {
        result as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_type_names() {
        assert_eq!(RequestType::from_type_name("script"), RequestType::SCRIPT);
        assert_eq!(RequestType::from_type_name("xhr"), RequestType::XMLHTTPREQUEST);
        assert_eq!(RequestType::from_type_name("sub_frame"), RequestType::SUBDOCUMENT);
        assert_eq!(RequestType::from_type_name("popup"), RequestType::POPUP);
        assert_eq!(RequestType::from_type_name("nonsense"), RequestType::OTHER);
        assert_eq!(RequestType::SCRIPT.option_name(), "script");
        assert_eq!(RequestType::INLINE_SCRIPT.option_name(), "inline-script");
        // bitflags' own lookup by flag name stays available
        assert_eq!(RequestType::from_name("SCRIPT"), Some(RequestType::SCRIPT));
    }

    #[test]
    fn realm_from_flags() {
        assert_eq!(Realm::from_flags(FilterFlags::empty()), Realm::Block);
        assert_eq!(Realm::from_flags(FilterFlags::IMPORTANT), Realm::Important);
        assert_eq!(Realm::from_flags(FilterFlags::EXCEPTION), Realm::Exception);
        for realm in Realm::ALL {
            assert_eq!(Realm::try_from(realm as u8), Ok(realm));
        }
    }

    #[test]
    fn context_derives_party() {
        let ctx = FilteringContext::new(
            "https://ads.tracker.net/x.js",
            "https://www.example.com/",
            RequestType::SCRIPT,
        );
        assert_eq!(ctx.req_host, "ads.tracker.net");
        assert_eq!(ctx.doc_host, "www.example.com");
        assert!(ctx.is_third_party);

        let ctx = FilteringContext::new(
            "https://cdn.Example.com/app.css",
            "https://www.example.com/",
            RequestType::STYLESHEET,
        );
        assert_eq!(ctx.req_host, "cdn.example.com");
        assert!(!ctx.is_third_party);
        assert_eq!(ctx.party(), PartyMask::FIRST_PARTY);
    }

    #[test]
    fn match_result_codes() {
        assert_eq!(u8::from(MatchResult::NoMatch), 0);
        assert_eq!(u8::from(MatchResult::Blocked), 1);
        assert_eq!(u8::from(MatchResult::Allowed), 2);
    }
}
