//! Public-suffix heuristics for eTLD+1 extraction
//!
//! The engine never ships a full Public Suffix List. A built-in table of
//! common multi-label suffixes covers the usual cases and every other
//! hostname falls back to its last two labels.
//!
//! # Examples
//!
//! ```
//! use sieve_core::psl::get_etld1;
//!
//! assert_eq!(get_etld1("sub.example.com"), "example.com");
//! assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
//! ```

use std::net::IpAddr;

/// Common multi-label public suffixes.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "gov.uk", "ac.uk", "me.uk", "ltd.uk", "plc.uk", "net.uk",
    "co.jp", "ne.jp", "or.jp", "ac.jp", "go.jp",
    "co.nz", "net.nz", "org.nz",
    "co.za", "org.za",
    "co.in", "net.in", "org.in",
    "co.kr", "or.kr",
    "co.id", "co.il", "co.th",
    "com.au", "net.au", "org.au", "gov.au", "edu.au",
    "com.br", "net.br", "org.br",
    "com.cn", "net.cn", "org.cn",
    "com.mx", "com.tw", "com.hk", "com.sg", "com.tr", "com.ar", "com.ua",
    "com.my", "com.ph", "com.pl", "com.vn", "com.co", "com.pe",
    "github.io", "blogspot.com", "appspot.com", "herokuapp.com", "cloudfront.net",
];

/// Get the eTLD+1 (registrable domain) for a lowercase hostname.
///
/// IP addresses and single-label hosts are returned unchanged.
pub fn get_etld1(host: &str) -> &str {
    let host = host.trim_end_matches('.');
    if host.parse::<IpAddr>().is_ok() {
        return host;
    }

    let last = match host.rfind('.') {
        Some(pos) => pos,
        None => return host,
    };
    let second = match host[..last].rfind('.') {
        Some(pos) => pos,
        None => return host,
    };

    let last_two = &host[second + 1..];
    if MULTI_LABEL_SUFFIXES.contains(&last_two) {
        return match host[..second].rfind('.') {
            Some(pos) => &host[pos + 1..],
            None => host,
        };
    }

    last_two
}

/// Check if a request is third-party.
pub fn is_third_party(site_host: &str, req_host: &str) -> bool {
    get_etld1(site_host) != get_etld1(req_host)
}

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator for suffix-walking a host down to its last label.
pub struct HostSuffixIter<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = get_parent_domain(result);
        Some(result)
    }
}

/// Walk host suffixes from most specific to least specific.
///
/// `a.b.example.com` yields `a.b.example.com`, `b.example.com`,
/// `example.com`, `com`.
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    HostSuffixIter {
        current: if host.is_empty() { None } else { Some(host) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etld1_simple() {
        assert_eq!(get_etld1("example.com"), "example.com");
        assert_eq!(get_etld1("sub.example.com"), "example.com");
        assert_eq!(get_etld1("localhost"), "localhost");
    }

    #[test]
    fn test_etld1_multi_label() {
        assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
        assert_eq!(get_etld1("example.co.uk"), "example.co.uk");
        assert_eq!(get_etld1("co.uk"), "co.uk");
        assert_eq!(get_etld1("user.github.io"), "user.github.io");
    }

    #[test]
    fn test_etld1_ip() {
        assert_eq!(get_etld1("192.168.0.1"), "192.168.0.1");
    }

    #[test]
    fn test_third_party() {
        assert!(!is_third_party("www.example.com", "cdn.example.com"));
        assert!(is_third_party("www.example.com", "ads.tracker.net"));
        assert!(is_third_party("a.example.co.uk", "b.other.co.uk"));
    }

    #[test]
    fn test_get_parent_domain() {
        assert_eq!(get_parent_domain("sub.example.com"), Some("example.com"));
        assert_eq!(get_parent_domain("example.com"), Some("com"));
        assert_eq!(get_parent_domain("com"), None);
        assert_eq!(get_parent_domain(""), None);
    }

    #[test]
    fn test_walk_host_suffixes() {
        let all: Vec<_> = walk_host_suffixes("a.b.example.com").collect();
        assert_eq!(all, vec!["a.b.example.com", "b.example.com", "example.com", "com"]);
        assert_eq!(walk_host_suffixes("").count(), 0);
    }
}
