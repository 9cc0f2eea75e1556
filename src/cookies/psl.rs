//! Public Suffix List (PSL) checks for cookie domains.
//!
//! A registry entry or a cookie write on a public suffix like `.com` or
//! `.co.uk` would touch every site under it. The registry loader skips
//! such hosts and the in-memory store refuses such writes.
//!
//! Uses Mozilla's Public Suffix List via the `psl` crate.

use psl::{List, Psl};

/// Check if a domain is a public suffix (e.g., "com", "co.uk").
/// A leading `.` is ignored.
pub fn is_public_suffix(domain: &str) -> bool {
    let domain_lower = domain.trim_start_matches('.').to_lowercase();
    let domain_bytes = domain_lower.as_bytes();

    match List.suffix(domain_bytes) {
        Some(suffix) => suffix.as_bytes() == domain_bytes,
        None => false,
    }
}

/// Check if a cookie domain may be written from `url_host`.
/// The cookie domain must be the host or one of its parents, and
/// must not be a public suffix.
pub fn is_valid_cookie_domain(cookie_domain: &str, url_host: &str) -> bool {
    let cookie_domain_lower = cookie_domain.trim_start_matches('.').to_lowercase();
    let url_host_lower = url_host.to_lowercase();

    if cookie_domain_lower.is_empty() || is_public_suffix(&cookie_domain_lower) {
        return false;
    }

    url_host_lower == cookie_domain_lower
        || url_host_lower.ends_with(&format!(".{}", cookie_domain_lower))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_public_suffix_ignores_leading_dot() {
        assert!(is_public_suffix("com"));
        assert!(is_public_suffix(".com"));
        assert!(is_public_suffix("CO.UK"));
    }

    #[test]
    fn test_ad_network_hosts_are_not_suffixes() {
        assert!(!is_public_suffix("doubleclick.net"));
        assert!(!is_public_suffix(".btrll.com"));
        assert!(!is_public_suffix("ad.yieldmanager.com"));
    }

    #[test]
    fn test_valid_cookie_domain() {
        assert!(is_valid_cookie_domain(".doubleclick.net", "doubleclick.net"));
        assert!(is_valid_cookie_domain(".doubleclick.net", "ad.doubleclick.net"));
        assert!(is_valid_cookie_domain("example.com", "example.com"));
    }

    #[test]
    fn test_invalid_cookie_domain() {
        assert!(!is_valid_cookie_domain(".com", "example.com"));
        assert!(!is_valid_cookie_domain("other.com", "example.com"));
        assert!(!is_valid_cookie_domain(".", "example.com"));
    }
}
