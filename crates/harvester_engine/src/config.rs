use std::ops::RangeInclusive;
use std::path::PathBuf;

use engine_logging::engine_warn;
use serde::Deserialize;
use url::Url;

use harvester_core::{build_seed, site_host, FrontierLimits, SearchQuery, SeedStyle};

use crate::error::HarvestError;
use crate::fetch::FetchSettings;
use crate::links::{LinkRules, DEFAULT_DETAIL_PATTERN};
use crate::session::BootstrapSettings;

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 64;

/// Millisecond integers in config files.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Everything a run needs. Every field has a default, so config files only
/// name what they change.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub keyword: Option<String>,
    /// Location code passed to the site's search.
    pub location: Option<String>,
    pub category: Option<String>,
    /// Origin used to construct a seed when `seed_urls` is empty.
    pub site_url: Option<String>,
    pub seed_style: SeedStyle,
    pub seed_urls: Vec<String>,
    pub result_target: usize,
    pub page_ceiling: u32,
    /// When false, records come from listing cards and detail pages are never fetched.
    pub collect_details: bool,
    pub concurrency: usize,
    pub fetch: FetchSettings,
    pub delay_ms: RangeInclusive<u64>,
    pub max_transport_retries: u32,
    /// Base backoff between transport retries, doubled per attempt.
    pub retry_backoff_ms: u64,
    pub bootstrap: BootstrapSettings,
    pub proxies: Vec<String>,
    pub accept_language: String,
    pub detail_link_pattern: String,
    pub detail_link_selector: Option<String>,
    pub output: PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            keyword: None,
            location: None,
            category: None,
            site_url: None,
            seed_style: SeedStyle::Query,
            seed_urls: Vec::new(),
            result_target: 100,
            page_ceiling: 20,
            collect_details: true,
            concurrency: 8,
            fetch: FetchSettings::default(),
            delay_ms: 150..=600,
            max_transport_retries: 3,
            retry_backoff_ms: 500,
            bootstrap: BootstrapSettings::default(),
            proxies: Vec::new(),
            accept_language: "es-ES,es;q=0.9,en;q=0.8".to_string(),
            detail_link_pattern: DEFAULT_DETAIL_PATTERN.to_string(),
            detail_link_selector: None,
            output: PathBuf::from("jobs.jsonl"),
        }
    }
}

impl HarvestConfig {
    /// Rejects configurations that cannot produce a run.
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.result_target == 0 {
            return Err(config_error("result_target must be at least 1"));
        }
        if self.page_ceiling == 0 {
            return Err(config_error("page_ceiling must be at least 1"));
        }
        if self.delay_ms.start() > self.delay_ms.end() {
            return Err(config_error(format!(
                "delay_ms range is inverted ({}..={})",
                self.delay_ms.start(),
                self.delay_ms.end()
            )));
        }
        let settle = &self.bootstrap.settle_ms;
        if settle.start() > settle.end() {
            return Err(config_error(format!(
                "bootstrap.settle_ms range is inverted ({}..={})",
                settle.start(),
                settle.end()
            )));
        }
        if self.fetch.request_timeout.is_zero() {
            return Err(config_error("fetch.request_timeout must be positive"));
        }
        if self.fetch.max_bytes == 0 {
            return Err(config_error("fetch.max_bytes must be positive"));
        }
        self.link_rules()?;
        self.seed_urls()?;
        Ok(())
    }

    /// Explicit seeds when given, otherwise one seed built from the search inputs.
    pub fn seed_urls(&self) -> Result<Vec<String>, HarvestError> {
        if !self.seed_urls.is_empty() {
            return self
                .seed_urls
                .iter()
                .map(|raw| {
                    parse_http_url(raw).map(String::from).ok_or_else(|| {
                        config_error(format!("seed url {raw:?} is not an absolute http(s) url"))
                    })
                })
                .collect();
        }
        let site = self
            .site()?
            .ok_or_else(|| config_error("no usable seed: set seed_urls or site_url"))?;
        let query = SearchQuery {
            keyword: self.keyword.as_deref(),
            location: self.location.as_deref(),
            category: self.category.as_deref(),
        };
        Ok(vec![build_seed(&site, &query, self.seed_style).into()])
    }

    fn site(&self) -> Result<Option<Url>, HarvestError> {
        self.site_url
            .as_deref()
            .map(|raw| {
                parse_http_url(raw).ok_or_else(|| {
                    config_error(format!("site_url {raw:?} is not an absolute http(s) url"))
                })
            })
            .transpose()
    }

    pub fn link_rules(&self) -> Result<LinkRules, HarvestError> {
        LinkRules::new(&self.detail_link_pattern, self.detail_link_selector.as_deref())
            .map_err(|err| config_error(err.to_string()))
    }

    /// `concurrency` clamped into the supported worker range.
    pub fn effective_concurrency(&self) -> usize {
        let clamped = self.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        if clamped != self.concurrency {
            engine_warn!(
                "Concurrency {} out of range, using {}",
                self.concurrency,
                clamped
            );
        }
        clamped
    }

    pub fn frontier_limits(&self) -> FrontierLimits {
        FrontierLimits {
            result_target: self.result_target,
            page_ceiling: self.page_ceiling,
        }
    }

    /// Label written into each record's `source` field: the site host.
    pub fn source_name(&self) -> String {
        let from_site = self.site_url.as_deref().and_then(parse_http_url);
        let from_seed = || self.seed_urls.iter().find_map(|raw| parse_http_url(raw));
        from_site
            .or_else(from_seed)
            .as_ref()
            .and_then(site_host)
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn parse_http_url(raw: &str) -> Option<Url> {
    Url::parse(raw.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
}

fn config_error(message: impl Into<String>) -> HarvestError {
    HarvestError::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_site() -> HarvestConfig {
        HarvestConfig {
            site_url: Some("https://jobs.example.com".to_string()),
            keyword: Some("Rust".to_string()),
            ..HarvestConfig::default()
        }
    }

    #[test]
    fn defaults_need_a_seed() {
        let err = HarvestConfig::default().validate().unwrap_err();
        assert!(matches!(err, HarvestError::Configuration(_)));
        assert!(with_site().validate().is_ok());
    }

    #[test]
    fn explicit_seeds_win_over_construction() {
        let config = HarvestConfig {
            seed_urls: vec!["https://other.example/list".to_string()],
            ..with_site()
        };
        assert_eq!(config.seed_urls().unwrap(), vec!["https://other.example/list"]);
    }

    #[test]
    fn zero_limits_and_inverted_ranges_are_rejected() {
        for config in [
            HarvestConfig { result_target: 0, ..with_site() },
            HarvestConfig { page_ceiling: 0, ..with_site() },
            HarvestConfig { delay_ms: 10..=5, ..with_site() },
            HarvestConfig { detail_link_pattern: "(".to_string(), ..with_site() },
            HarvestConfig { seed_urls: vec!["ftp://x".to_string()], ..with_site() },
        ] {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(HarvestConfig { concurrency: 0, ..with_site() }.effective_concurrency(), 1);
        assert_eq!(HarvestConfig { concurrency: 500, ..with_site() }.effective_concurrency(), 64);
        assert_eq!(with_site().effective_concurrency(), 8);
    }
}
