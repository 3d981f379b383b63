use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser};
use harvester_core::SeedStyle;
use harvester_engine::{BootstrapFailurePolicy, HarvestConfig};

/// Harvest job postings: bootstrap a session once, then fetch listings and
/// detail pages with it.
#[derive(Debug, Parser)]
#[command(name = "harvester")]
#[command(version)]
pub struct Cli {
    /// RON file with a `HarvestConfig`; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Search keyword used to build the seed
    #[arg(short, long)]
    pub keyword: Option<String>,

    /// Location code used to build the seed
    #[arg(short, long)]
    pub location: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    /// Site origin the seed is built on
    #[arg(long)]
    pub site_url: Option<String>,

    /// Build an SEO path seed (`/rust-jobs-in-madrid`) instead of a search query
    #[arg(long)]
    pub path_seed: bool,

    /// Explicit seed URL; repeatable, wins over seed construction
    #[arg(long = "seed")]
    pub seeds: Vec<String>,

    /// Stop after this many saved records
    #[arg(short, long)]
    pub target: Option<usize>,

    /// Maximum number of listing pages to visit
    #[arg(short, long)]
    pub pages: Option<u32>,

    /// Save records from listing cards without fetching detail pages
    #[arg(long)]
    pub no_details: bool,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Proxy URL; repeatable, rotated round-robin
    #[arg(long = "proxy")]
    pub proxies: Vec<String>,

    /// JSON-lines output file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Regex identifying detail page URLs
    #[arg(long)]
    pub detail_pattern: Option<String>,

    /// CSS selector scoping detail anchors on listing pages
    #[arg(long)]
    pub detail_selector: Option<String>,

    /// Fail the run when no session can be bootstrapped
    #[arg(long)]
    pub abort_on_bootstrap_failure: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// More log output; repeat for trace
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Less log output
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,
}

impl Cli {
    pub fn verbosity(&self) -> i8 {
        let verbose = i8::try_from(self.verbose).unwrap_or(i8::MAX);
        let quiet = i8::try_from(self.quiet).unwrap_or(i8::MAX);
        verbose.saturating_sub(quiet)
    }

    /// The config file (or defaults) with command line overrides applied.
    pub fn load_config(&self) -> anyhow::Result<HarvestConfig> {
        let base = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                ron::from_str(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => HarvestConfig::default(),
        };
        Ok(self.apply_overrides(base))
    }

    fn apply_overrides(&self, mut config: HarvestConfig) -> HarvestConfig {
        override_some(&mut config.keyword, &self.keyword);
        override_some(&mut config.location, &self.location);
        override_some(&mut config.category, &self.category);
        override_some(&mut config.site_url, &self.site_url);
        override_some(&mut config.detail_link_selector, &self.detail_selector);
        if self.path_seed {
            config.seed_style = SeedStyle::Path;
        }
        if !self.seeds.is_empty() {
            config.seed_urls = self.seeds.clone();
        }
        if let Some(target) = self.target {
            config.result_target = target;
        }
        if let Some(pages) = self.pages {
            config.page_ceiling = pages;
        }
        if self.no_details {
            config.collect_details = false;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if !self.proxies.is_empty() {
            config.proxies = self.proxies.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(pattern) = &self.detail_pattern {
            config.detail_link_pattern = pattern.clone();
        }
        if self.abort_on_bootstrap_failure {
            config.bootstrap.on_failure = BootstrapFailurePolicy::Abort;
        }
        config
    }
}

fn override_some(slot: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn flags_override_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"(
                site_url: Some("https://jobs.example.com"),
                keyword: Some("rust"),
                result_target: 40,
                delay_ms: (start: 10, end: 20),
                fetch: (request_timeout: 5000),
                bootstrap: (on_failure: abort),
            )"#
        )
        .unwrap();

        let cli = Cli::parse_from([
            "harvester",
            "--config",
            file.path().to_str().unwrap(),
            "--keyword",
            "go",
            "--pages",
            "3",
            "-vv",
        ]);
        let config = cli.load_config().unwrap();

        assert_eq!(config.keyword.as_deref(), Some("go"));
        assert_eq!(config.site_url.as_deref(), Some("https://jobs.example.com"));
        assert_eq!(config.result_target, 40);
        assert_eq!(config.page_ceiling, 3);
        assert_eq!(config.delay_ms, 10..=20);
        assert_eq!(config.fetch.request_timeout, std::time::Duration::from_secs(5));
        assert_eq!(config.bootstrap.on_failure, BootstrapFailurePolicy::Abort);
        assert_eq!(cli.verbosity(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_without_a_file() {
        let cli = Cli::parse_from(["harvester", "--seed", "https://jobs.example.com/list", "-q"]);
        let config = cli.load_config().unwrap();

        assert_eq!(config.seed_urls, vec!["https://jobs.example.com/list"]);
        assert_eq!(config.result_target, 100);
        assert_eq!(config.page_ceiling, 20);
        assert!(config.collect_details);
        assert_eq!(cli.verbosity(), -1);
    }

    #[test]
    fn unreadable_config_is_an_error() {
        let cli = Cli::parse_from(["harvester", "--config", "/nonexistent/harvest.ron"]);
        assert!(cli.load_config().is_err());
    }
}
