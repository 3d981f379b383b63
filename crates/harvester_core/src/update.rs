use crate::{AbandonReason, Effect, HealthState, Msg, RecoveryState};

/// Pure update function: applies a message to the recovery state and
/// returns the effects the caller must carry out.
pub fn update(mut state: RecoveryState, msg: Msg) -> (RecoveryState, Vec<Effect>) {
    let effects = match msg {
        Msg::PageOk => {
            if state.health() == HealthState::SuspectedBlocked {
                state.set_health(HealthState::Healthy);
            }
            Vec::new()
        }
        Msg::Blocked {
            attempt,
            session_refreshed,
        } => {
            let degraded = state.health() == HealthState::Degraded;
            if !degraded {
                state.set_health(HealthState::SuspectedBlocked);
            }

            if attempt.retried_after_block {
                vec![Effect::Abandon {
                    reason: AbandonReason::AlreadyRetried,
                }]
            } else if session_refreshed {
                // Someone else already paid for the bootstrap.
                if !degraded {
                    state.set_health(HealthState::Healthy);
                }
                vec![Effect::Requeue]
            } else if !state.can_rebootstrap() {
                state.set_health(HealthState::Degraded);
                vec![Effect::Abandon {
                    reason: AbandonReason::CeilingExhausted,
                }]
            } else {
                state.spend_rebootstrap();
                state.set_health(HealthState::Rebootstrapping);
                vec![Effect::Rebootstrap]
            }
        }
        Msg::BootstrapSucceeded => {
            if state.health() == HealthState::Rebootstrapping {
                state.set_health(HealthState::Healthy);
                vec![Effect::Requeue]
            } else {
                Vec::new()
            }
        }
        Msg::BootstrapFailed => {
            if state.health() == HealthState::Rebootstrapping {
                state.set_health(HealthState::Degraded);
                vec![Effect::Abandon {
                    reason: AbandonReason::BootstrapFailed,
                }]
            } else {
                Vec::new()
            }
        }
    };

    (state, effects)
}
