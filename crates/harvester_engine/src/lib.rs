//! Harvester engine: session bootstrap, lightweight fetching, extraction and
//! the async pipeline that ties them to the core frontier.
mod config;
mod decode;
mod error;
mod executor;
mod extract;
mod fetch;
mod harvester;
mod links;
mod page;
mod persist;
mod proxy;
mod recovery;
mod render;
mod session;
mod sink;
mod stealth;
mod types;

pub use config::{duration_ms, HarvestConfig, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use decode::{decode_html, DecodedHtml};
pub use error::HarvestError;
pub use executor::{ExecutorSettings, FetchExecutor, PageHandler, StopReason};
pub use extract::{
    extract_cards, CardFields, ExtractionStage, HeuristicStage, JobExtractor,
    SemanticMarkupStage, StructuredDataStage,
};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use harvester::{HarvestReport, Harvester};
pub use links::{
    find_next_page, DiscoveredLink, LinkRules, LinkRulesError, ListPageLinks,
    DEFAULT_DETAIL_PATTERN,
};
pub use page::{element_text, html_to_text, visible_text};
pub use persist::{ensure_output_dir, JsonLinesSink};
pub use proxy::{NoProxy, ProxyProvider, RoundRobinProxies};
pub use recovery::{RecoveryCoordinator, RecoveryOutcome};
pub use render::PlainHttpRenderer;
pub use session::{
    BootstrapError, BootstrapFailurePolicy, BootstrapSettings, Cookie, NavigateOptions,
    RenderedPage, Renderer, SessionBootstrapper, SessionIdentity, SessionSlot,
};
pub use sink::{MemorySink, RecordSink, SinkError};
pub use stealth::{browser_headers, jitter, ACCEPT_HTML, FALLBACK_USER_AGENT};
pub use types::{FailureKind, FetchError, FetchRequest, FetchResult};
