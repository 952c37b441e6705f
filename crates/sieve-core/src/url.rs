//! Fast URL scanning utilities for the hot path
//!
//! These functions avoid allocations and work directly on string slices.

use crate::hash::hash_token;

// =============================================================================
// Scheme and Host
// =============================================================================

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    None
}

/// Get the start and end positions of the hostname in a URL.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    // Skip userinfo
    let mut host_start = scheme_end;
    for (i, &b) in bytes.iter().enumerate().skip(scheme_end) {
        if b == b'@' {
            host_start = i + 1;
            break;
        }
        if b == b'/' || b == b'?' || b == b'#' {
            break;
        }
    }

    let mut host_end = bytes.len();
    for (i, &b) in bytes.iter().enumerate().skip(host_start) {
        if b == b'/' || b == b'?' || b == b'#' || b == b':' {
            host_end = i;
            break;
        }
    }

    Some((host_start, host_end))
}

/// Fast host extraction without allocations.
/// Returns a slice into the original URL.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    Some(&url[host_start..host_end])
}

// =============================================================================
// Tokens
// =============================================================================

/// Characters that can belong to an index token.
#[inline]
pub fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'%'
}

/// Iterator over maximal runs of token characters, as `(start, end)`.
pub struct TokenRuns<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for TokenRuns<'a> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.bytes;
        while self.pos < bytes.len() && !is_token_char(bytes[self.pos]) {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return None;
        }
        let start = self.pos;
        while self.pos < bytes.len() && is_token_char(bytes[self.pos]) {
            self.pos += 1;
        }
        Some((start, self.pos))
    }
}

/// Scan a string for maximal token runs.
#[inline]
pub fn token_runs(s: &str) -> TokenRuns<'_> {
    TokenRuns {
        bytes: s.as_bytes(),
        pos: 0,
    }
}

/// Tokenize a URL into candidate token hashes.
///
/// Every maximal run is hashed, whatever its length, and the whole URL is
/// scanned so that no compiled token can be missed. The result is sorted
/// and deduplicated.
pub fn tokenize_url(url: &str) -> Vec<u32> {
    let bytes = url.as_bytes();
    let mut tokens: Vec<u32> = token_runs(url)
        .map(|(start, end)| hash_token(&bytes[start..end]))
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

// =============================================================================
// Separator Check
// =============================================================================

/// Check if a character is a filter-syntax separator (`^`).
/// Anything but a letter, a digit, or one of `_ - . %` is a separator.
#[inline]
pub fn is_separator_char(c: u8) -> bool {
    !(c.is_ascii_alphanumeric() || c == b'_' || c == b'-' || c == b'.' || c == b'%')
}

/// Check if position in string is at a separator. The end of the string counts.
#[inline]
pub fn is_at_separator(s: &[u8], pos: usize) -> bool {
    if pos >= s.len() {
        return true;
    }
    is_separator_char(s[pos])
}
