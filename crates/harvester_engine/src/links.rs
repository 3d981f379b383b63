use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use harvester_core::{normalize_parsed, resolve_href, site_host};

use crate::page::element_text;

/// Default shape of a job detail URL on listing pages.
pub const DEFAULT_DETAIL_PATTERN: &str =
    r"(?i)/(job|jobs|offer|offers|oferta|ofertas|empleo|vacancy|vacancies|position)[-/_]";

const DEFAULT_MAX_LINKS: usize = 500;

/// Anchor texts that mean "next page", lower-cased.
const NEXT_TEXTS: &[&str] = &[
    "next",
    "next page",
    "siguiente",
    "página siguiente",
    "›",
    "»",
    "next ›",
    "next »",
    ">",
];

/// Explicit next-page affordances, most specific first.
const NEXT_SELECTORS: &[&str] = &[
    r#"link[rel="next"]"#,
    r#"a[rel~="next"]"#,
    r#"[class*="pagination"] [class*="next"] a"#,
    r#"[class*="pagination"] a[class*="next"]"#,
    r#"a[aria-label*="next" i]"#,
    r#"a[aria-label*="siguiente" i]"#,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub url: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListPageLinks {
    pub details: Vec<DiscoveredLink>,
    /// Explicit next-page affordance, if the page renders one.
    pub next_page: Option<String>,
}

/// How detail links are recognised on a listing page.
#[derive(Debug, Clone)]
pub struct LinkRules {
    detail_pattern: Regex,
    detail_selector: Option<Selector>,
    max_links: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkRulesError {
    #[error("invalid detail link pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid detail link selector: {0}")]
    Selector(String),
}

impl LinkRules {
    pub fn new(
        detail_pattern: &str,
        detail_selector: Option<&str>,
    ) -> Result<Self, LinkRulesError> {
        let detail_selector = detail_selector
            .map(|raw| {
                Selector::parse(raw).map_err(|err| LinkRulesError::Selector(err.to_string()))
            })
            .transpose()?;
        Ok(Self {
            detail_pattern: Regex::new(detail_pattern)?,
            detail_selector,
            max_links: DEFAULT_MAX_LINKS,
        })
    }

    pub fn with_max_links(mut self, max_links: usize) -> Self {
        self.max_links = max_links;
        self
    }

    pub fn is_detail_url(&self, url: &str) -> bool {
        self.detail_pattern.is_match(url)
    }

    /// Anchors that point at detail pages on the same site, in document order.
    pub fn detail_anchors<'a>(&self, document: &'a Html, base: &Url) -> Vec<(ElementRef<'a>, Url)> {
        let any_anchor = Selector::parse("a[href]").ok();
        let Some(selector) = self.detail_selector.as_ref().or(any_anchor.as_ref()) else {
            return Vec::new();
        };
        let home = site_host(base);
        let mut seen = HashSet::new();
        let mut anchors = Vec::new();

        for element in document.select(selector) {
            if anchors.len() >= self.max_links {
                break;
            }
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(url) = resolve_href(base, href) else {
                continue;
            };
            if site_host(&url) != home || !self.is_detail_url(url.as_str()) {
                continue;
            }
            let Some(key) = normalize_parsed(url.clone()) else {
                continue;
            };
            if seen.insert(key) {
                anchors.push((element, url));
            }
        }
        anchors
    }

    pub fn discover(&self, document: &Html, base: &Url) -> ListPageLinks {
        let details = self
            .detail_anchors(document, base)
            .into_iter()
            .map(|(element, url)| {
                let text = element_text(element);
                DiscoveredLink {
                    url: url.into(),
                    text: (!text.is_empty()).then_some(text),
                }
            })
            .collect();

        ListPageLinks {
            details,
            next_page: find_next_page(document, base),
        }
    }
}

/// Finds the page's own "next page" link, ignoring links back to `base`.
pub fn find_next_page(document: &Html, base: &Url) -> Option<String> {
    let current = normalize_parsed(base.clone());
    let accept = |href: &str| -> Option<String> {
        let url = resolve_href(base, href)?;
        let key = normalize_parsed(url.clone());
        (key != current).then(|| url.into())
    };

    for raw in NEXT_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let found = document
            .select(&selector)
            .filter_map(|element| element.value().attr("href"))
            .find_map(|href| accept(href));
        if found.is_some() {
            return found;
        }
    }

    let anchors = Selector::parse("a[href]").ok()?;
    document
        .select(&anchors)
        .filter(|element| {
            let text = element_text(*element).to_lowercase();
            NEXT_TEXTS.contains(&text.as_str())
        })
        .filter_map(|element| element.value().attr("href"))
        .find_map(|href| accept(href))
}
