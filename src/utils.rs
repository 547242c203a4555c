//! Host normalization shared by the login flow and the fetch path.

use url::Url;

/// Normalizes a host string: trim, strip leading "www.", trailing '.', and lowercase.
#[must_use]
pub fn canonical_host(host: &str) -> String {
    host.trim()
        .trim_start_matches("www.")
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Returns the lowercased host of `url`, or `None` when it has none.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
}

/// Returns true when `url`'s host equals `host` after [`canonical_host`]
/// normalization on both sides.
///
/// Sibling subdomains do not match: `sso.example.com` is not on `www.example.com`.
#[must_use]
pub fn url_on_host(url: &str, host: &str) -> bool {
    host_of(url).is_some_and(|actual| canonical_host(&actual) == canonical_host(host))
}
