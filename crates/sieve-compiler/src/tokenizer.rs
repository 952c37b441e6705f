//! Index token selection
//!
//! A filter is filed under one token that every URL it matches is
//! guaranteed to produce when scanned. Only maximal literal runs qualify:
//! the characters on both sides must be non-token literals, `^`, or an
//! anchored end of the pattern.

use serde::{Deserialize, Serialize};

use sieve_core::hash::MAX_TOKEN_LENGTH;
use sieve_core::types::FilterFlags;
use sieve_core::url::{is_token_char, token_runs};

/// Shortest run worth indexing.
pub const DEFAULT_MIN_TOKEN_LEN: usize = 2;

/// Runs so common in URLs that indexing under them buys nothing.
pub const DEFAULT_BAD_TOKENS: [&str; 10] = ["com", "http", "https", "icon", "images", "img", "js", "net", "news", "www"];

/// Token selection tuning. Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPolicy {
    pub min_token_len: usize,
    pub bad_tokens: Vec<String>,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
            bad_tokens: DEFAULT_BAD_TOKENS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl TokenPolicy {
    fn is_bad(&self, token: &str) -> bool {
        self.bad_tokens.iter().any(|bad| bad.eq_ignore_ascii_case(token))
    }

    /// Pick the index token of a (non-regex) pattern body.
    ///
    /// Preference: non-bad tokens, then the longest (capped at the hashed
    /// length), then the leftmost. `None` sends the filter to the no-token
    /// bucket.
    pub fn select<'p>(&self, pattern: &'p str, flags: FilterFlags) -> Option<&'p str> {
        let bytes = pattern.as_bytes();
        let left_anchored = flags.intersects(FilterFlags::LEFT_ANCHOR | FilterFlags::HOST_ANCHOR);
        let right_anchored = flags.contains(FilterFlags::RIGHT_ANCHOR);

        let mut best: Option<(bool, usize, &str)> = None;
        for (start, end) in token_runs(pattern) {
            let left_ok = match start.checked_sub(1).map(|i| bytes[i]) {
                Some(b) => is_boundary(b),
                None => left_anchored,
            };
            let right_ok = match bytes.get(end) {
                Some(&b) => is_boundary(b),
                None => right_anchored,
            };
            if !left_ok || !right_ok || end - start < self.min_token_len {
                continue;
            }

            let token = &pattern[start..end];
            let good = !self.is_bad(token);
            let weight = token.len().min(MAX_TOKEN_LENGTH);
            let better = match best {
                None => true,
                Some((best_good, best_weight, _)) => (good, weight) > (best_good, best_weight),
            };
            if better {
                best = Some((good, weight, token));
            }
        }
        best.map(|(_, _, token)| token)
    }
}

/// A neighbor that guarantees the run is maximal in any matching URL.
/// `*` can stand for more token characters, so it never qualifies.
#[inline]
fn is_boundary(b: u8) -> bool {
    !is_token_char(b) && b != b'*'
}
