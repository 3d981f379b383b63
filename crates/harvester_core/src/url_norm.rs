use url::Url;

/// Query parameter that drives result pagination on list pages.
pub const PAGE_PARAM: &str = "page";

/// Query parameters that carry per-visit state and never identify content.
const VOLATILE_PARAMS: &[&str] = &[
    "_",
    "_ga",
    "_gl",
    "auth_token",
    "cb",
    "fbclid",
    "gclid",
    "jsessionid",
    "msclkid",
    "phpsessid",
    "session",
    "session_id",
    "sessionid",
    "sid",
    "timestamp",
    "token",
    "trk",
    "ts",
];

const VOLATILE_PREFIXES: &[&str] = &["utm_", "mc_"];

/// Returns true when `name` is a query parameter stripped during normalization.
pub fn is_volatile_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    VOLATILE_PARAMS.contains(&lower.as_str())
        || VOLATILE_PREFIXES
            .iter()
            .any(|prefix| lower.starts_with(prefix))
}

/// Normalizes an absolute URL into the dedup key used by the frontier.
///
/// The key keeps scheme, host, port and path, drops the fragment and any
/// credentials, strips volatile query parameters and sorts the remaining
/// ones. Applying it to its own output yields the same string.
///
/// Returns `None` for unparsable input and non-HTTP(S) schemes.
pub fn normalize_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    normalize_parsed(url)
}

/// Same as [`normalize_url`] for an already parsed URL.
pub fn normalize_parsed(mut url: Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str()?;
    url.set_fragment(None);
    let _ = url.set_username("");
    let _ = url.set_password(None);

    // Servlet containers smuggle the session into the path.
    let path = url.path().to_string();
    if let Some(idx) = path.to_ascii_lowercase().find(";jsessionid=") {
        url.set_path(&path[..idx]);
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_volatile_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.extend_pairs(pairs.iter());
    }

    Some(url.into())
}

/// Resolves an `href` found on a page at `base` into an absolute HTTP(S) URL.
///
/// Fragment-only links, scripting pseudo-links and non-web schemes are
/// rejected.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let trimmed = href.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }
    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => base.join(trimmed).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Synthesizes the successor of a list page by incrementing its `page`
/// query parameter, or appending `page=2` when there is none.
///
/// Every other query segment is carried over byte for byte, in order.
/// Returns `None` when the current `page` value is not a number.
pub fn next_page_url(current: &str) -> Option<String> {
    let mut url = Url::parse(current.trim()).ok()?;
    let query = url.query().unwrap_or("").to_string();

    let mut found = false;
    let mut segments = Vec::new();
    for segment in query.split('&').filter(|s| !s.is_empty()) {
        match segment.split_once('=') {
            Some((key, value)) if key == PAGE_PARAM && !found => {
                let page: u32 = value.parse().ok()?;
                segments.push(format!("{key}={}", page.checked_add(1)?));
                found = true;
            }
            _ => segments.push(segment.to_string()),
        }
    }
    if !found {
        segments.push(format!("{PAGE_PARAM}=2"));
    }

    url.set_fragment(None);
    url.set_query(Some(&segments.join("&")));
    Some(url.into())
}

/// Host of `url` with any leading `www.` removed, lower-cased.
pub fn site_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatile_params_match_case_insensitively() {
        assert!(is_volatile_param("UTM_source"));
        assert!(is_volatile_param("PHPSESSID"));
        assert!(!is_volatile_param("page"));
        assert!(!is_volatile_param("keyword"));
    }

    #[test]
    fn path_session_is_dropped() {
        let normalized =
            normalize_url("https://jobs.example.com/offer/42;jsessionid=ABC123?b=1").unwrap();
        assert_eq!(normalized, "https://jobs.example.com/offer/42?b=1");
    }

    #[test]
    fn site_host_ignores_www() {
        let url = Url::parse("https://WWW.Example.com/x").unwrap();
        assert_eq!(site_host(&url).as_deref(), Some("example.com"));
    }
}
