//! Harvest orchestrator: seeds, bootstraps, runs the executor, reports.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use scraper::Html;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use harvester_core::{
    next_page_url, BlockDetector, BlockReason, CounterSnapshot, EntryKind, ExtractionFailure,
    Frontier, FrontierEntry, HealthState, JobRecord, Offer, RunCounters,
};

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::executor::{ExecutorSettings, FetchExecutor, PageHandler, StopReason};
use crate::extract::{extract_cards, JobExtractor, SemanticMarkupStage};
use crate::fetch::Fetcher;
use crate::links::LinkRules;
use crate::recovery::RecoveryCoordinator;
use crate::session::{BootstrapFailurePolicy, Renderer, SessionBootstrapper, SessionSlot};
use crate::sink::{RecordSink, SinkError};
use crate::{FetchError, FetchResult};

/// Summary of one run, printed by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    pub counters: CounterSnapshot,
    pub health: HealthState,
    pub stop_reason: StopReason,
    pub pagination_accepted: usize,
    /// Whether the run had a bootstrapped session at dispatch time.
    pub session_acquired: bool,
    #[serde(serialize_with = "millis")]
    pub elapsed: Duration,
}

fn millis<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

pub struct Harvester {
    config: HarvestConfig,
    fetcher: Arc<dyn Fetcher>,
    renderer: Arc<dyn Renderer>,
    sink: Arc<dyn RecordSink>,
    detector: BlockDetector,
}

impl Harvester {
    pub fn new(
        config: HarvestConfig,
        fetcher: Arc<dyn Fetcher>,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            config,
            fetcher,
            renderer,
            sink,
            detector: BlockDetector::default(),
        }
    }

    pub fn with_detector(mut self, detector: BlockDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Runs to completion. Only configuration, an aborting bootstrap policy,
    /// or a failing sink end the run with an error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<HarvestReport, HarvestError> {
        let started = Instant::now();
        self.config.validate()?;
        let seeds = self.config.seed_urls()?;
        let rules = self.config.link_rules()?;
        let representative_seed = seeds
            .first()
            .cloned()
            .ok_or_else(|| HarvestError::Configuration("no usable seed".to_string()))?;

        let counters = Arc::new(RunCounters::new());
        let frontier = Arc::new(Frontier::new(self.config.frontier_limits(), counters.clone()));
        let session = Arc::new(SessionSlot::new());
        let bootstrapper = Arc::new(SessionBootstrapper::new(
            self.renderer.clone(),
            self.config.bootstrap.clone(),
        ));

        match bootstrapper.bootstrap_with_retries(&representative_seed).await {
            Ok(identity) => {
                session.install(identity);
            }
            Err(err) => match self.config.bootstrap.on_failure {
                BootstrapFailurePolicy::Abort => {
                    engine_error!("Bootstrap exhausted, aborting: {}", err);
                    return Err(HarvestError::Bootstrap(err));
                }
                BootstrapFailurePolicy::Continue => {
                    engine_warn!("Bootstrap exhausted, continuing without a session: {}", err);
                }
            },
        }
        let session_acquired = session.snapshot().is_some();

        let recovery = Arc::new(RecoveryCoordinator::new(
            bootstrapper,
            session.clone(),
            frontier.clone(),
            counters.clone(),
            representative_seed,
        ));
        let halt = cancel.child_token();
        let handler = Arc::new(HarvestHandler {
            frontier: frontier.clone(),
            counters: counters.clone(),
            recovery: recovery.clone(),
            sink: self.sink.clone(),
            extractor: JobExtractor::new(self.config.source_name()),
            semantic: SemanticMarkupStage::new(),
            rules,
            collect_details: self.config.collect_details,
            result_target: self.config.result_target,
            halt: halt.clone(),
            sink_error: Mutex::new(None),
        });

        let executor = FetchExecutor::new(
            self.fetcher.clone(),
            session,
            frontier.clone(),
            counters.clone(),
            Arc::new(self.detector.clone()),
            ExecutorSettings {
                concurrency: self.config.effective_concurrency(),
                delay_ms: self.config.delay_ms.clone(),
                max_transport_retries: self.config.max_transport_retries,
                retry_backoff: Duration::from_millis(self.config.retry_backoff_ms),
                accept_language: self.config.accept_language.clone(),
            },
        );
        let stop_reason = executor.run(&seeds, handler.clone(), halt).await;

        if let Some(err) = handler.take_sink_error() {
            return Err(HarvestError::Sink(err));
        }

        let report = HarvestReport {
            counters: counters.snapshot(),
            health: recovery.health().await,
            stop_reason,
            pagination_accepted: frontier.pagination_accepted(),
            session_acquired,
            elapsed: started.elapsed(),
        };
        engine_info!(
            "Run finished ({}): {} saved, {} pages, {} blocked, {} failed, {} re-bootstraps \
             in {:?}",
            report.stop_reason,
            report.counters.saved,
            report.counters.pages_visited,
            report.counters.blocked,
            report.counters.failed,
            report.counters.rebootstraps,
            report.elapsed
        );
        Ok(report)
    }
}

/// What the synchronous document pass produced.
enum Digest {
    Listing { records: Vec<JobRecord> },
    Detail(Result<JobRecord, ExtractionFailure>),
}

struct HarvestHandler {
    frontier: Arc<Frontier>,
    counters: Arc<RunCounters>,
    recovery: Arc<RecoveryCoordinator>,
    sink: Arc<dyn RecordSink>,
    extractor: JobExtractor,
    semantic: SemanticMarkupStage,
    rules: LinkRules,
    collect_details: bool,
    result_target: usize,
    halt: CancellationToken,
    sink_error: Mutex<Option<SinkError>>,
}

impl HarvestHandler {
    fn digest_listing(
        &self,
        entry: &FrontierEntry,
        depth: u32,
        base: &Url,
        document: &Html,
    ) -> Digest {
        let visited = self.counters.record_page_visited();
        let mut records = Vec::new();

        let found = if self.collect_details {
            let links = self.rules.discover(document, base);
            let mut accepted = 0;
            for link in &links.details {
                match self.frontier.offer_detail(&link.url, &entry.url) {
                    Offer::Accepted => accepted += 1,
                    Offer::TargetReached => break,
                    _ => {}
                }
            }
            engine_debug!(
                "List page {} (depth {}): {} detail links, {} new",
                entry.url,
                depth,
                links.details.len(),
                accepted
            );
            self.offer_successor(entry, depth, links.next_page, !links.details.is_empty());
            links.details.len()
        } else {
            let cards = extract_cards(document, base, &self.rules, &self.semantic);
            for card in &cards {
                if !self.frontier.claim_card(&card.url).is_accepted() {
                    continue;
                }
                match self.extractor.assemble(card.fields.clone(), &card.url) {
                    Ok(record) => records.push(record),
                    Err(failure) => self.extraction_failed(&failure),
                }
            }
            let next = crate::links::find_next_page(document, base);
            self.offer_successor(entry, depth, next, !cards.is_empty());
            cards.len()
        };

        engine_info!("Visited list page {} ({} pages): {} jobs found", entry.url, visited, found);
        Digest::Listing { records }
    }

    /// Offers the explicit next page, or a synthesized `page=N+1`, while the
    /// current page still yields jobs.
    fn offer_successor(
        &self,
        entry: &FrontierEntry,
        depth: u32,
        explicit: Option<String>,
        had_jobs: bool,
    ) {
        if !had_jobs {
            engine_debug!("No jobs on {}, pagination chain ends", entry.url);
            return;
        }
        let Some(next) = explicit.or_else(|| next_page_url(&entry.url)) else {
            return;
        };
        match self.frontier.offer_pagination(&next, depth, &entry.url) {
            Offer::Accepted => engine_debug!("Queued page {} at depth {}", next, depth + 1),
            other => engine_debug!("Pagination to {} not taken: {:?}", next, other),
        }
    }

    fn extraction_failed(&self, failure: &ExtractionFailure) {
        self.counters.record_extraction_failure();
        engine_warn!("Extraction failed: {}", failure);
    }

    async fn save(&self, record: JobRecord) {
        if !self.counters.try_reserve_save(self.result_target) {
            engine_debug!("Target reached, dropping {}", record.url);
            return;
        }
        match self.sink.append(&record).await {
            Ok(()) => engine_info!(
                "Saved {} ({}/{})",
                record.url,
                self.counters.saved(),
                self.result_target
            ),
            Err(err) => {
                self.counters.release_save();
                engine_error!("Sink rejected {}: {}", record.url, err);
                let mut slot = self
                    .sink_error
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                slot.get_or_insert(err);
                self.halt.cancel();
            }
        }
    }

    fn take_sink_error(&self) -> Option<SinkError> {
        self.sink_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[async_trait::async_trait]
impl PageHandler for HarvestHandler {
    type Digest = Digest;

    fn digest(&self, entry: &FrontierEntry, page: &FetchResult, document: &Html) -> Digest {
        self.recovery.page_ok();
        match entry.kind {
            EntryKind::List { depth } => {
                let base = Url::parse(&page.final_url)
                    .or_else(|_| Url::parse(&entry.url));
                match base {
                    Ok(base) => self.digest_listing(entry, depth, &base, document),
                    Err(err) => {
                        engine_warn!("Unusable list url {}: {}", entry.url, err);
                        Digest::Listing { records: Vec::new() }
                    }
                }
            }
            EntryKind::Detail => Digest::Detail(self.extractor.extract(document, &entry.url)),
        }
    }

    async fn settle(&self, _entry: &FrontierEntry, digest: Digest) {
        match digest {
            Digest::Listing { records } => {
                for record in records {
                    self.save(record).await;
                }
            }
            Digest::Detail(Ok(record)) => self.save(record).await,
            Digest::Detail(Err(failure)) => self.extraction_failed(&failure),
        }
    }

    async fn on_blocked(&self, entry: &FrontierEntry, reason: BlockReason, generation: u64) {
        self.recovery.handle_block(entry, &reason, generation).await;
    }

    async fn on_failed(&self, entry: &FrontierEntry, error: FetchError) {
        self.counters.record_failed();
        engine_warn!("Failed {}: {}", entry.url, error);
    }
}
