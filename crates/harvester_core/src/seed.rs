use serde::Deserialize;
use url::Url;

/// How a seed URL is constructed from search inputs when none is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStyle {
    /// `{site}/search?q=..&location=..&category=..&sort=date`
    #[default]
    Query,
    /// `{site}/{keyword}-jobs-in-{location}`
    Path,
}

/// Search inputs used to build a seed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery<'a> {
    pub keyword: Option<&'a str>,
    pub location: Option<&'a str>,
    pub category: Option<&'a str>,
}

/// Lower-cases, transliterates diacritics to ASCII and joins alphanumeric
/// runs with a single `-`, trimming separators at both ends.
pub fn slugify(input: &str) -> String {
    let ascii = deunicode::deunicode(input).to_ascii_lowercase();
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_separator = false;
    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch);
        } else {
            pending_separator = true;
        }
    }
    slug
}

/// Builds a search URL sorted by publication date.
pub fn build_search_url(site: &Url, query: &SearchQuery<'_>) -> Url {
    let mut url = site.clone();
    url.set_path("/search");
    url.set_fragment(None);
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        if let Some(keyword) = non_blank(query.keyword) {
            pairs.append_pair("q", keyword);
        }
        if let Some(location) = non_blank(query.location) {
            pairs.append_pair("location", location);
        }
        if let Some(category) = non_blank(query.category) {
            pairs.append_pair("category", category);
        }
        pairs.append_pair("sort", "date");
    }
    url
}

/// Builds an SEO-style listing URL from slugified keyword and location.
///
/// Returns `None` when neither input survives slugification.
pub fn build_path_url(site: &Url, query: &SearchQuery<'_>) -> Option<Url> {
    let keyword = non_blank(query.keyword).map(slugify).filter(|s| !s.is_empty());
    let location = non_blank(query.location)
        .map(slugify)
        .filter(|s| !s.is_empty());
    let segment = match (keyword, location) {
        (Some(k), Some(l)) => format!("{k}-jobs-in-{l}"),
        (Some(k), None) => format!("{k}-jobs"),
        (None, Some(l)) => format!("jobs-in-{l}"),
        (None, None) => return None,
    };
    site.join(&format!("/{segment}")).ok()
}

/// Builds the seed for `style`, falling back to the query form when the
/// path form has nothing to slugify.
pub fn build_seed(site: &Url, query: &SearchQuery<'_>, style: SeedStyle) -> Url {
    match style {
        SeedStyle::Query => build_search_url(site, query),
        SeedStyle::Path => {
            build_path_url(site, query).unwrap_or_else(|| build_search_url(site, query))
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
