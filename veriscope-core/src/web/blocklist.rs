//! Static domain blocklist and URL admission rules.
//!
//! Social media walls, low-quality aggregators, and paywalled news fronts
//! rarely yield extractable factual text, so their URLs are dropped before
//! fetching. The list ships with the binary.

use url::Url;

/// Domains never fetched. Matching is suffix-based so subdomains are
/// covered (`m.facebook.com`, `old.reddit.com`).
pub const BLOCKED_DOMAINS: &[&str] = &[
    // Social media walls
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "tiktok.com",
    "linkedin.com",
    "pinterest.com",
    "youtube.com",
    // Low-quality aggregators
    "reddit.com",
    "quora.com",
    "answers.com",
    "ehow.com",
    "slideshare.net",
    "scribd.com",
    // Paywalled news fronts
    "wsj.com",
    "ft.com",
    "bloomberg.com",
    "economist.com",
];

/// Whether a candidate URL may be fetched: http(s) scheme, a resolvable
/// host, and a domain outside the blocklist.
pub fn is_fetchable(url: &str) -> bool {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    match parsed.host_str() {
        Some(host) => !is_blocked_host(host),
        None => false,
    }
}

fn is_blocked_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    BLOCKED_DOMAINS
        .iter()
        .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")))
}

/// Lowercased host of a URL, if it parses.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Registered domain of a host: a leading `www.` is stripped and the host
/// is reduced to its last two labels. Good enough to tell `nasa.gov` from
/// `britannica.com`; multi-part public suffixes (`example.co.uk`) collapse
/// to their suffix-side pair, which only ever under-counts diversity.
pub fn registered_domain(host: &str) -> String {
    let host = host.trim_start_matches("www.").to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host
    } else {
        labels[labels.len() - 2..].join(".")
    }
}
