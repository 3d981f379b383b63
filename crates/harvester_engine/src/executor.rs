//! Bounded pool of lightweight fetch workers.
//!
//! The dispatch loop owns the stopping conditions; workers only fetch,
//! classify and hand results to a [`PageHandler`]. Reaching a stop condition
//! (or external cancellation) stops dispatch and lets in-flight fetches
//! finish, so a self-cancelled socket is never mistaken for a block.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};
use scraper::Html;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use harvester_core::{BlockDetector, BlockReason, Frontier, FrontierEntry, RunCounters, Verdict};

use crate::fetch::Fetcher;
use crate::page::visible_text;
use crate::session::SessionSlot;
use crate::stealth::{browser_headers, jitter, FALLBACK_USER_AGENT};
use crate::{FailureKind, FetchError, FetchRequest, FetchResult};

/// Status that means the target refused the session outright.
const FORBIDDEN: u16 = 403;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    pub concurrency: usize,
    pub delay_ms: RangeInclusive<u64>,
    pub max_transport_retries: u32,
    pub retry_backoff: Duration,
    pub accept_language: String,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            delay_ms: 150..=600,
            max_transport_retries: 3,
            retry_backoff: Duration::from_millis(500),
            accept_language: "es-ES,es;q=0.9,en;q=0.8".to_string(),
        }
    }
}

/// Receives every fetched page.
///
/// `digest` runs synchronously on the parsed document so the parse tree
/// never lives across an await; its output is handed to `settle`.
#[async_trait::async_trait]
pub trait PageHandler: Send + Sync + 'static {
    type Digest: Send + 'static;

    /// Called for pages that passed block detection.
    fn digest(&self, entry: &FrontierEntry, page: &FetchResult, document: &Html) -> Self::Digest;

    async fn settle(&self, entry: &FrontierEntry, digest: Self::Digest);

    /// Called instead of `digest` when the page is a bot check. `generation`
    /// is the session generation the request was sent with.
    async fn on_blocked(&self, entry: &FrontierEntry, reason: BlockReason, generation: u64);

    /// Called once the URL is given up on after transport failures or a
    /// permanent HTTP status.
    async fn on_failed(&self, entry: &FrontierEntry, error: FetchError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    PageCeiling,
    FrontierExhausted,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::TargetReached => "result target reached",
            StopReason::PageCeiling => "page ceiling reached",
            StopReason::FrontierExhausted => "frontier exhausted",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

enum Inspected<D> {
    Blocked(BlockReason),
    Page(D),
}

#[derive(Clone)]
pub struct FetchExecutor {
    fetcher: Arc<dyn Fetcher>,
    session: Arc<SessionSlot>,
    frontier: Arc<Frontier>,
    counters: Arc<RunCounters>,
    detector: Arc<BlockDetector>,
    settings: Arc<ExecutorSettings>,
}

impl FetchExecutor {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        session: Arc<SessionSlot>,
        frontier: Arc<Frontier>,
        counters: Arc<RunCounters>,
        detector: Arc<BlockDetector>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            fetcher,
            session,
            frontier,
            counters,
            detector,
            settings: Arc::new(settings),
        }
    }

    /// Seeds the frontier with `initial` and dispatches until a stop condition.
    pub async fn run<H: PageHandler>(
        &self,
        initial: &[String],
        handler: Arc<H>,
        cancel: CancellationToken,
    ) -> StopReason {
        let seeded = self.frontier.seed(initial.iter().map(String::as_str));
        engine_info!("Dispatching with {} seed pages", seeded);

        let concurrency = self.settings.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let stop = cancel.child_token();
        let mut workers = JoinSet::new();

        let reason = loop {
            while let Some(joined) = workers.try_join_next() {
                log_join(joined);
            }
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if let Some(reason) = self.stop_reason() {
                break reason;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => permit,
                _ = cancel.cancelled() => break StopReason::Cancelled,
            };
            let Ok(permit) = permit else {
                break StopReason::Cancelled;
            };

            match self.frontier.next() {
                Some(entry) => {
                    engine_trace!("Dispatching {} ({:?})", entry.url, entry.kind);
                    let worker = self.clone();
                    let handler = handler.clone();
                    let stop = stop.clone();
                    workers.spawn(async move {
                        let _permit = permit;
                        worker.process(entry, handler.as_ref(), &stop).await;
                    });
                }
                None => {
                    drop(permit);
                    if workers.is_empty() {
                        break self.stop_reason().unwrap_or(StopReason::FrontierExhausted);
                    }
                    // An in-flight page may still offer more work.
                    tokio::select! {
                        joined = workers.join_next() => {
                            if let Some(joined) = joined {
                                log_join(joined);
                            }
                        }
                        _ = cancel.cancelled() => break StopReason::Cancelled,
                    }
                }
            }
        };

        stop.cancel();
        engine_info!(
            "Stopping dispatch: {} ({} in flight, {} queued)",
            reason,
            workers.len(),
            self.frontier.queued_len()
        );
        while let Some(joined) = workers.join_next().await {
            log_join(joined);
        }
        reason
    }

    fn stop_reason(&self) -> Option<StopReason> {
        let limits = self.frontier.limits();
        if self.counters.target_reached(limits.result_target) {
            return Some(StopReason::TargetReached);
        }
        if self.counters.pages_visited() >= limits.page_ceiling as usize
            && !self.frontier.has_pending_details()
            && self.frontier.in_flight_len() == 0
        {
            return Some(StopReason::PageCeiling);
        }
        if self.frontier.is_exhausted() {
            return Some(StopReason::FrontierExhausted);
        }
        None
    }

    async fn process<H: PageHandler>(
        &self,
        mut entry: FrontierEntry,
        handler: &H,
        stop: &CancellationToken,
    ) {
        let delay = jitter(&self.settings.delay_ms);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.cancelled() => {
                engine_debug!("Dropping {} before send, run is stopping", entry.url);
                self.frontier.mark_done(&entry.url);
                return;
            }
        }

        let (request, generation) = self.request_for(&entry);
        let max_attempts = self.settings.max_transport_retries + 1;

        loop {
            entry.attempt.transport_attempts += 1;
            let attempt = entry.attempt.transport_attempts;

            let error = match self.fetcher.fetch(&request).await {
                Ok(page) if page.status == FORBIDDEN => {
                    handler
                        .on_blocked(&entry, BlockReason::HttpStatus(page.status), generation)
                        .await;
                    break;
                }
                Ok(page) if page.is_success() => {
                    match self.inspect(&entry, &page, handler) {
                        Inspected::Blocked(reason) => {
                            handler.on_blocked(&entry, reason, generation).await
                        }
                        Inspected::Page(digest) => handler.settle(&entry, digest).await,
                    }
                    break;
                }
                Ok(page) => FetchError::new(
                    FailureKind::HttpStatus(page.status),
                    format!("{} answered {}", page.final_url, page.status),
                ),
                Err(err) => err,
            };

            if error.is_transient() && attempt < max_attempts {
                let backoff = self.settings.retry_backoff * 2u32.saturating_pow(attempt - 1);
                engine_debug!(
                    "Transport failure on {} (attempt {}/{}): {}; retrying in {:?}",
                    entry.url,
                    attempt,
                    max_attempts,
                    error,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            engine_warn!("Giving up on {} after {} attempts: {}", entry.url, attempt, error);
            handler.on_failed(&entry, error).await;
            break;
        }

        self.frontier.mark_done(&entry.url);
    }

    /// Block detection and the synchronous handler step on one parse.
    fn inspect<H: PageHandler>(
        &self,
        entry: &FrontierEntry,
        page: &FetchResult,
        handler: &H,
    ) -> Inspected<H::Digest> {
        let document = Html::parse_document(&page.body);
        match self.detector.classify(&page.body, &visible_text(&document)) {
            Verdict::Blocked { reason } => Inspected::Blocked(reason),
            Verdict::Ok => Inspected::Page(handler.digest(entry, page, &document)),
        }
    }

    /// Headers for `entry` under the current session snapshot.
    fn request_for(&self, entry: &FrontierEntry) -> (FetchRequest, u64) {
        let referrer = entry.referrer.clone().or_else(|| origin_of(&entry.url));
        let mut headers = browser_headers(&self.settings.accept_language, referrer.as_deref());

        let snapshot = self.session.snapshot();
        let generation = snapshot.as_ref().map_or(0, |session| session.generation());
        let user_agent = snapshot
            .as_ref()
            .map_or(FALLBACK_USER_AGENT, |session| session.user_agent());
        headers.push(("User-Agent".to_string(), user_agent.to_string()));
        if let Some(cookie) = snapshot
            .as_ref()
            .zip(Url::parse(&entry.url).ok())
            .and_then(|(session, url)| session.cookie_header(&url))
        {
            headers.push(("Cookie".to_string(), cookie));
        }

        let request = FetchRequest {
            url: entry.url.clone(),
            headers,
        };
        (request, generation)
    }
}

/// `scheme://host/` of `url`, the referrer used for seed pages.
fn origin_of(url: &str) -> Option<String> {
    let mut origin = Url::parse(url).ok()?;
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    Some(origin.into())
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        engine_error!("Fetch worker ended abnormally: {}", err);
    }
}
