//! Harvester core: pure domain logic shared by the engine.
//!
//! Nothing in here performs IO. The frontier and counters are safe to share
//! between workers; everything else is plain data or pure functions.
mod block;
mod counters;
mod effect;
mod frontier;
mod msg;
mod record;
mod seed;
mod state;
mod text;
mod update;
mod url_norm;

pub use block::{
    BlockDetector, BlockReason, Verdict, DEFAULT_CHALLENGE_PHRASES, DEFAULT_SHORT_DOCUMENT_FLOOR,
};
pub use counters::{CounterSnapshot, RunCounters};
pub use effect::{AbandonReason, Effect};
pub use frontier::{AttemptRecord, EntryKind, Frontier, FrontierEntry, FrontierLimits, Offer};
pub use msg::Msg;
pub use record::{ExtractionFailure, JobFields, JobRecord, Provenance};
pub use seed::{build_path_url, build_search_url, build_seed, slugify, SearchQuery, SeedStyle};
pub use state::{HealthState, RecoveryState};
pub use text::{clean_field, collapse_whitespace, truncate_on_char_boundary, MAX_DESCRIPTION_TEXT};
pub use update::update;
pub use url_norm::{
    is_volatile_param, next_page_url, normalize_parsed, normalize_url, resolve_href, site_host,
    PAGE_PARAM,
};
