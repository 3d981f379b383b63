use std::sync::Arc;
use std::thread;

use harvester_core::{EntryKind, Frontier, FrontierLimits, Offer, RunCounters};
use pretty_assertions::assert_eq;

const LIST: &str = "https://jobs.example.com/search?q=rust&page=1";

fn frontier(target: usize, ceiling: u32) -> (Frontier, Arc<RunCounters>) {
    let counters = Arc::new(RunCounters::new());
    let limits = FrontierLimits {
        result_target: target,
        page_ceiling: ceiling,
    };
    (Frontier::new(limits, counters.clone()), counters)
}

#[test]
fn same_detail_offered_twice_dispatches_once() {
    let (frontier, _) = frontier(10, 5);
    let first = frontier.offer_detail("https://jobs.example.com/offer/1?utm_source=x", LIST);
    let second = frontier.offer_detail("https://jobs.example.com/offer/1#apply", LIST);

    assert_eq!(first, Offer::Accepted);
    assert_eq!(second, Offer::Duplicate);

    let entry = frontier.next().unwrap();
    assert_eq!(entry.url, "https://jobs.example.com/offer/1");
    assert_eq!(entry.kind, EntryKind::Detail);
    assert_eq!(entry.referrer.as_deref(), Some(LIST));
    assert!(frontier.next().is_none());
}

#[test]
fn seeds_are_depth_one_lists_and_deduplicated() {
    let (frontier, _) = frontier(10, 5);
    let accepted = frontier.seed([LIST, LIST, "not a url"]);
    assert_eq!(accepted, 1);

    let entry = frontier.next().unwrap();
    assert_eq!(entry.kind, EntryKind::List { depth: 1 });
    assert_eq!(entry.referrer, None);
}

#[test]
fn details_are_dispatched_before_lists() {
    let (frontier, _) = frontier(10, 5);
    frontier.seed([LIST]);
    frontier.offer_detail("https://jobs.example.com/offer/9", LIST);

    assert_eq!(frontier.next().unwrap().kind, EntryKind::Detail);
    assert_eq!(frontier.next().unwrap().kind, EntryKind::List { depth: 1 });
}

#[test]
fn pagination_respects_depth_ceiling() {
    let (frontier, _) = frontier(10, 2);
    let next = "https://jobs.example.com/search?q=rust&page=2";
    assert_eq!(frontier.offer_pagination(next, 1, LIST), Offer::Accepted);
    assert_eq!(
        frontier.offer_pagination("https://jobs.example.com/search?q=rust&page=3", 2, next),
        Offer::DepthCeiling
    );
    assert_eq!(frontier.pagination_accepted(), 1);

    let entry = frontier.next().unwrap();
    assert_eq!(entry.kind, EntryKind::List { depth: 2 });
}

#[test]
fn offers_rejected_once_target_is_satisfied() {
    let (frontier, counters) = frontier(1, 5);
    assert!(counters.try_reserve_save(1));

    assert_eq!(
        frontier.offer_detail("https://jobs.example.com/offer/2", LIST),
        Offer::TargetReached
    );
    assert_eq!(
        frontier.offer_pagination("https://jobs.example.com/search?page=2", 1, LIST),
        Offer::TargetReached
    );
}

#[test]
fn lists_held_back_after_page_ceiling_visits() {
    let (frontier, counters) = frontier(10, 1);
    frontier.seed([LIST, "https://jobs.example.com/search?q=go"]);
    let first = frontier.next().unwrap();
    counters.record_page_visited();
    frontier.mark_done(&first.url);

    assert!(frontier.next().is_none());
    assert!(!frontier.has_pending_details());
}

#[test]
fn in_flight_work_keeps_frontier_alive_until_done() {
    let (frontier, _) = frontier(10, 5);
    frontier.offer_detail("https://jobs.example.com/offer/3", LIST);
    let entry = frontier.next().unwrap();

    assert!(!frontier.is_exhausted());
    assert!(frontier.has_pending_details());
    assert_eq!(frontier.in_flight_len(), 1);

    frontier.mark_done(&entry.url);
    assert!(frontier.is_exhausted());
}

#[test]
fn blocked_entry_requeues_exactly_once() {
    let (frontier, _) = frontier(10, 5);
    frontier.offer_detail("https://jobs.example.com/offer/4", LIST);
    let entry = frontier.next().unwrap();

    assert!(frontier.requeue_after_block(&entry));
    frontier.mark_done(&entry.url);

    let retry = frontier.next().unwrap();
    assert_eq!(retry.url, entry.url);
    assert!(retry.attempt.retried_after_block);
    assert!(!frontier.requeue_after_block(&retry));
    frontier.mark_done(&retry.url);
    assert!(frontier.is_exhausted());
    assert_eq!(frontier.seen_len(), 1);
}

#[test]
fn concurrent_offers_keep_one_entry_per_url() {
    let (frontier, _) = frontier(10_000, 5);
    let frontier = Arc::new(frontier);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let frontier = frontier.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    frontier.offer_detail(&format!("https://jobs.example.com/offer/{i}"), LIST);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(frontier.queued_len(), 100);
}

#[test]
fn claimed_cards_are_seen_but_never_queued() {
    let (frontier, _counters) = frontier(10, 5);

    assert_eq!(
        frontier.claim_card("https://jobs.example.com/offer/7?utm_source=x"),
        Offer::Accepted
    );
    assert_eq!(frontier.claim_card("https://jobs.example.com/offer/7"), Offer::Duplicate);
    assert_eq!(frontier.queued_len(), 0);
    assert_eq!(
        frontier.offer_detail("https://jobs.example.com/offer/7", "https://jobs.example.com/"),
        Offer::Duplicate
    );
}
