use std::sync::Once;

use harvester_core::{
    update, AbandonReason, AttemptRecord, Effect, HealthState, Msg, RecoveryState,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn blocked(retried: bool, session_refreshed: bool) -> Msg {
    Msg::Blocked {
        attempt: AttemptRecord {
            transport_attempts: 0,
            retried_after_block: retried,
        },
        session_refreshed,
    }
}

#[test]
fn first_block_requests_rebootstrap() {
    init_logging();
    let (state, effects) = update(RecoveryState::new(3), blocked(false, false));

    assert_eq!(effects, vec![Effect::Rebootstrap]);
    assert_eq!(state.health(), HealthState::Rebootstrapping);
    assert_eq!(state.rebootstraps_used(), 1);
}

#[test]
fn successful_rebootstrap_requeues_and_heals() {
    init_logging();
    let (state, _) = update(RecoveryState::new(3), blocked(false, false));
    let (state, effects) = update(state, Msg::BootstrapSucceeded);

    assert_eq!(effects, vec![Effect::Requeue]);
    assert_eq!(state.health(), HealthState::Healthy);
}

#[test]
fn failed_rebootstrap_degrades_and_abandons() {
    init_logging();
    let (state, _) = update(RecoveryState::new(3), blocked(false, false));
    let (state, effects) = update(state, Msg::BootstrapFailed);

    assert_eq!(
        effects,
        vec![Effect::Abandon {
            reason: AbandonReason::BootstrapFailed
        }]
    );
    assert_eq!(state.health(), HealthState::Degraded);
}

#[test]
fn request_blocked_twice_is_abandoned_without_bootstrap() {
    init_logging();
    let state = RecoveryState::new(3);
    let (state, effects) = update(state, blocked(true, false));

    assert_eq!(
        effects,
        vec![Effect::Abandon {
            reason: AbandonReason::AlreadyRetried
        }]
    );
    assert_eq!(state.rebootstraps_used(), 0);
    assert_eq!(state.health(), HealthState::SuspectedBlocked);
}

#[test]
fn exhausted_ceiling_degrades() {
    init_logging();
    let mut state = RecoveryState::new(1);
    let (next, effects) = update(state, blocked(false, false));
    assert_eq!(effects, vec![Effect::Rebootstrap]);
    let (next, _) = update(next, Msg::BootstrapSucceeded);
    state = next;

    let (state, effects) = update(state, blocked(false, false));
    assert_eq!(
        effects,
        vec![Effect::Abandon {
            reason: AbandonReason::CeilingExhausted
        }]
    );
    assert_eq!(state.health(), HealthState::Degraded);
    assert_eq!(state.rebootstraps_used(), 1);
}

#[test]
fn refreshed_session_requeues_without_spending_budget() {
    init_logging();
    let (state, effects) = update(RecoveryState::new(2), blocked(false, true));

    assert_eq!(effects, vec![Effect::Requeue]);
    assert_eq!(state.rebootstraps_used(), 0);
    assert_eq!(state.health(), HealthState::Healthy);
}

#[test]
fn ok_page_clears_suspicion_but_not_degradation() {
    init_logging();
    let (state, _) = update(RecoveryState::new(3), blocked(true, false));
    let (state, _) = update(state, Msg::PageOk);
    assert_eq!(state.health(), HealthState::Healthy);

    let (state, _) = update(RecoveryState::new(0), blocked(false, false));
    assert_eq!(state.health(), HealthState::Degraded);
    let (state, effects) = update(state, Msg::PageOk);
    assert_eq!(state.health(), HealthState::Degraded);
    assert!(effects.is_empty());
}

#[test]
fn stray_bootstrap_messages_are_ignored() {
    init_logging();
    let (state, effects) = update(RecoveryState::new(3), Msg::BootstrapSucceeded);
    assert!(effects.is_empty());
    let (state, effects) = update(state, Msg::BootstrapFailed);
    assert!(effects.is_empty());
    assert_eq!(state.health(), HealthState::Healthy);
}
