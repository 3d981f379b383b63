use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Process-wide run counters.
///
/// Every field is an independent atomic. `saved` is only ever advanced
/// through [`RunCounters::try_reserve_save`], which checks and increments in
/// one compare-and-swap so concurrent workers cannot both claim the last slot.
#[derive(Debug, Default)]
pub struct RunCounters {
    saved: AtomicUsize,
    blocked: AtomicUsize,
    pages_visited: AtomicUsize,
    failed: AtomicUsize,
    extraction_failures: AtomicUsize,
    rebootstraps: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CounterSnapshot {
    pub saved: usize,
    pub blocked: usize,
    pub pages_visited: usize,
    pub failed: usize,
    pub extraction_failures: usize,
    pub rebootstraps: usize,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims one save slot if fewer than `target` records are saved.
    pub fn try_reserve_save(&self, target: usize) -> bool {
        self.saved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |saved| {
                (saved < target).then_some(saved + 1)
            })
            .is_ok()
    }

    /// Gives back a slot claimed by [`try_reserve_save`](Self::try_reserve_save)
    /// whose record never reached the sink.
    pub fn release_save(&self) {
        let _ = self
            .saved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |saved| {
                saved.checked_sub(1)
            });
    }

    pub fn target_reached(&self, target: usize) -> bool {
        self.saved() >= target
    }

    pub fn saved(&self) -> usize {
        self.saved.load(Ordering::Acquire)
    }

    pub fn pages_visited(&self) -> usize {
        self.pages_visited.load(Ordering::Acquire)
    }

    pub fn record_blocked(&self) -> usize {
        self.blocked.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn record_page_visited(&self) -> usize {
        self.pages_visited.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_rebootstrap(&self) {
        self.rebootstraps.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            saved: self.saved(),
            blocked: self.blocked.load(Ordering::Acquire),
            pages_visited: self.pages_visited(),
            failed: self.failed.load(Ordering::Acquire),
            extraction_failures: self.extraction_failures.load(Ordering::Acquire),
            rebootstraps: self.rebootstraps.load(Ordering::Acquire),
        }
    }
}
