use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::counters::RunCounters;
use crate::url_norm::normalize_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A result listing; `depth` is its 1-based position in the pagination chain.
    List { depth: u32 },
    Detail,
}

impl EntryKind {
    pub fn is_detail(&self) -> bool {
        matches!(self, EntryKind::Detail)
    }
}

/// Per-request retry bookkeeping carried alongside the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttemptRecord {
    /// Transport attempts already spent on this dispatch.
    pub transport_attempts: u32,
    /// Set once the request was re-enqueued after a block.
    pub retried_after_block: bool,
}

impl AttemptRecord {
    pub fn after_block(self) -> Self {
        Self {
            transport_attempts: 0,
            retried_after_block: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Normalized absolute URL, also the dedup key.
    pub url: String,
    pub kind: EntryKind,
    /// Page that discovered this entry, sent as `Referer`.
    pub referrer: Option<String>,
    pub attempt: AttemptRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Duplicate,
    Invalid,
    TargetReached,
    DepthCeiling,
}

impl Offer {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Offer::Accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierLimits {
    pub result_target: usize,
    pub page_ceiling: u32,
}

#[derive(Debug, Default)]
struct InFlight {
    detail: bool,
    count: u32,
}

#[derive(Debug, Default)]
struct Inner {
    lists: VecDeque<FrontierEntry>,
    details: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    in_flight: HashMap<String, InFlight>,
    pagination_accepted: usize,
}

/// Work queue of list and detail pages with a run-long seen-set.
///
/// All state sits behind one mutex that is never held across an await, so
/// workers may offer and dequeue concurrently.
#[derive(Debug)]
pub struct Frontier {
    limits: FrontierLimits,
    counters: Arc<RunCounters>,
    inner: Mutex<Inner>,
}

impl Frontier {
    pub fn new(limits: FrontierLimits, counters: Arc<RunCounters>) -> Self {
        Self {
            limits,
            counters,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn limits(&self) -> FrontierLimits {
        self.limits
    }

    /// Enqueues seed list pages at depth 1. Returns how many were accepted.
    pub fn seed<'a>(&self, urls: impl IntoIterator<Item = &'a str>) -> usize {
        let mut inner = self.lock();
        let mut accepted = 0;
        for raw in urls {
            let Some(url) = normalize_url(raw) else {
                continue;
            };
            if inner.seen.insert(url.clone()) {
                inner.lists.push_back(FrontierEntry {
                    url,
                    kind: EntryKind::List { depth: 1 },
                    referrer: None,
                    attempt: AttemptRecord::default(),
                });
                accepted += 1;
            }
        }
        accepted
    }

    /// Offers the successor of a list page found at `current_depth`.
    pub fn offer_pagination(&self, url: &str, current_depth: u32, referrer: &str) -> Offer {
        if current_depth >= self.limits.page_ceiling {
            return Offer::DepthCeiling;
        }
        if self.counters.target_reached(self.limits.result_target) {
            return Offer::TargetReached;
        }
        let offer = self.offer(
            url,
            EntryKind::List {
                depth: current_depth + 1,
            },
            referrer,
        );
        if offer.is_accepted() {
            self.lock().pagination_accepted += 1;
        }
        offer
    }

    pub fn offer_detail(&self, url: &str, referrer: &str) -> Offer {
        if self.counters.target_reached(self.limits.result_target) {
            return Offer::TargetReached;
        }
        self.offer(url, EntryKind::Detail, referrer)
    }

    /// Marks a detail URL seen without queueing it.
    ///
    /// Used when records come straight from listing cards, so the same
    /// posting on two listing pages is only saved once.
    pub fn claim_card(&self, url: &str) -> Offer {
        if self.counters.target_reached(self.limits.result_target) {
            return Offer::TargetReached;
        }
        let Some(url) = normalize_url(url) else {
            return Offer::Invalid;
        };
        if self.lock().seen.insert(url) {
            Offer::Accepted
        } else {
            Offer::Duplicate
        }
    }

    fn offer(&self, raw: &str, kind: EntryKind, referrer: &str) -> Offer {
        let Some(url) = normalize_url(raw) else {
            return Offer::Invalid;
        };
        let mut inner = self.lock();
        if !inner.seen.insert(url.clone()) {
            return Offer::Duplicate;
        }
        let entry = FrontierEntry {
            url,
            kind,
            referrer: Some(referrer.to_string()),
            attempt: AttemptRecord::default(),
        };
        match kind {
            EntryKind::Detail => inner.details.push_back(entry),
            EntryKind::List { .. } => inner.lists.push_back(entry),
        }
        Offer::Accepted
    }

    /// Dequeues the next entry, detail pages first.
    ///
    /// List pages are held back once the run has visited `page_ceiling` pages.
    pub fn next(&self) -> Option<FrontierEntry> {
        let lists_allowed = self.counters.pages_visited() < self.limits.page_ceiling as usize;
        let mut inner = self.lock();
        let entry = match inner.details.pop_front() {
            Some(entry) => entry,
            None if lists_allowed => inner.lists.pop_front()?,
            None => return None,
        };
        let slot = inner.in_flight.entry(entry.url.clone()).or_default();
        slot.detail = entry.kind.is_detail();
        slot.count += 1;
        Some(entry)
    }

    /// Resolves a dispatched URL (saved, blocked or failed).
    pub fn mark_done(&self, url: &str) {
        let mut inner = self.lock();
        let finished = match inner.in_flight.get_mut(url) {
            Some(slot) => {
                slot.count = slot.count.saturating_sub(1);
                slot.count == 0
            }
            None => false,
        };
        if finished {
            inner.in_flight.remove(url);
        }
    }

    /// Puts a blocked entry back at the head of its queue, exactly once.
    ///
    /// This is the only path by which a seen URL is dispatched again.
    /// Returns false when the entry was already retried after a block.
    pub fn requeue_after_block(&self, entry: &FrontierEntry) -> bool {
        if entry.attempt.retried_after_block {
            return false;
        }
        let retry = FrontierEntry {
            attempt: entry.attempt.after_block(),
            ..entry.clone()
        };
        let mut inner = self.lock();
        match retry.kind {
            EntryKind::Detail => inner.details.push_front(retry),
            EntryKind::List { .. } => inner.lists.push_front(retry),
        }
        true
    }

    /// True when detail work is queued or in flight.
    pub fn has_pending_details(&self) -> bool {
        let inner = self.lock();
        !inner.details.is_empty() || inner.in_flight.values().any(|slot| slot.detail)
    }

    /// True when nothing is queued and nothing is in flight.
    pub fn is_exhausted(&self) -> bool {
        let inner = self.lock();
        inner.lists.is_empty() && inner.details.is_empty() && inner.in_flight.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        let inner = self.lock();
        inner.lists.len() + inner.details.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.values().map(|slot| slot.count as usize).sum()
    }

    pub fn seen_len(&self) -> usize {
        self.lock().seen.len()
    }

    /// Pagination successors accepted so far.
    pub fn pagination_accepted(&self) -> usize {
        self.lock().pagination_accepted
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The queue stays structurally valid even if a holder panicked.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
