//! Request shaping that keeps lightweight fetches looking like one browser.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;

/// Used when no session has been bootstrapped yet.
pub const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Uniformly random delay within `range_ms`; an inverted range yields its start.
pub fn jitter(range_ms: &RangeInclusive<u64>) -> Duration {
    let (low, high) = (*range_ms.start(), *range_ms.end());
    if low >= high {
        return Duration::from_millis(low);
    }
    Duration::from_millis(rand::rng().random_range(low..=high))
}

/// Static header set sent with every lightweight fetch, before session headers.
pub fn browser_headers(accept_language: &str, referrer: Option<&str>) -> Vec<(String, String)> {
    let mut headers = vec![
        ("Accept".to_string(), ACCEPT_HTML.to_string()),
        ("Accept-Language".to_string(), accept_language.to_string()),
        ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
        ("Sec-Fetch-Dest".to_string(), "document".to_string()),
    ];
    if let Some(referrer) = referrer {
        headers.push(("Referer".to_string(), referrer.to_string()));
        headers.push(("Sec-Fetch-Site".to_string(), "same-origin".to_string()));
    } else {
        headers.push(("Sec-Fetch-Site".to_string(), "none".to_string()));
    }
    headers
}
