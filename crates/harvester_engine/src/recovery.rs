use std::collections::VecDeque;
use std::sync::Arc;

use engine_logging::{engine_debug, engine_info, engine_warn};
use tokio::sync::Mutex;

use harvester_core::{
    update, AbandonReason, BlockReason, Effect, Frontier, FrontierEntry, HealthState, Msg,
    RecoveryState, RunCounters,
};

use crate::session::{SessionBootstrapper, SessionSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Requeued,
    Abandoned(AbandonReason),
}

/// Carries out the block-recovery machine's effects.
///
/// The state sits behind an async mutex held for the whole of a
/// re-bootstrap, which serializes bootstraps across workers. Workers that
/// queue up behind it see the newer session generation and requeue without
/// bootstrapping again.
pub struct RecoveryCoordinator {
    state: Mutex<RecoveryState>,
    bootstrapper: Arc<SessionBootstrapper>,
    session: Arc<SessionSlot>,
    frontier: Arc<Frontier>,
    counters: Arc<RunCounters>,
    seed_url: String,
}

impl RecoveryCoordinator {
    pub fn new(
        bootstrapper: Arc<SessionBootstrapper>,
        session: Arc<SessionSlot>,
        frontier: Arc<Frontier>,
        counters: Arc<RunCounters>,
        seed_url: impl Into<String>,
    ) -> Self {
        let max_rebootstraps = bootstrapper.settings().max_rebootstraps;
        Self {
            state: Mutex::new(RecoveryState::new(max_rebootstraps)),
            bootstrapper,
            session,
            frontier,
            counters,
            seed_url: seed_url.into(),
        }
    }

    pub async fn health(&self) -> HealthState {
        self.state.lock().await.health()
    }

    pub async fn rebootstraps_used(&self) -> u32 {
        self.state.lock().await.rebootstraps_used()
    }

    /// Reports a page that passed block detection.
    ///
    /// Skipped while a re-bootstrap holds the state; that path ends in a
    /// definite health of its own.
    pub fn page_ok(&self) {
        if let Ok(mut state) = self.state.try_lock() {
            let (next, _) = update(state.clone(), Msg::PageOk);
            if next.health() != state.health() {
                engine_info!("Session health {:?} -> {:?}", state.health(), next.health());
            }
            *state = next;
        }
    }

    /// Runs the recovery protocol for a blocked request sent under `generation`.
    pub async fn handle_block(
        &self,
        entry: &FrontierEntry,
        reason: &BlockReason,
        generation: u64,
    ) -> RecoveryOutcome {
        let blocked = self.counters.record_blocked();
        engine_warn!("Blocked on {} ({}); {} blocks so far", entry.url, reason, blocked);

        let mut state = self.state.lock().await;
        let msg = Msg::Blocked {
            attempt: entry.attempt,
            session_refreshed: self.session.generation() > generation,
        };
        let mut pending: VecDeque<Effect> = self.transition(&mut state, msg).into();
        let mut outcome = RecoveryOutcome::Abandoned(AbandonReason::AlreadyRetried);

        while let Some(effect) = pending.pop_front() {
            match effect {
                Effect::Rebootstrap => {
                    self.counters.record_rebootstrap();
                    engine_info!(
                        "Re-bootstrapping session ({} of {})",
                        state.rebootstraps_used(),
                        self.bootstrapper.settings().max_rebootstraps
                    );
                    let msg = match self.bootstrapper.bootstrap(&self.seed_url).await {
                        Ok(identity) => {
                            let generation = self.session.install(identity);
                            engine_info!("Installed session generation {}", generation);
                            Msg::BootstrapSucceeded
                        }
                        Err(err) => {
                            engine_warn!("Re-bootstrap failed: {}", err);
                            Msg::BootstrapFailed
                        }
                    };
                    pending.extend(self.transition(&mut state, msg));
                }
                Effect::Requeue => {
                    outcome = if self.frontier.requeue_after_block(entry) {
                        engine_debug!("Requeued {} after block", entry.url);
                        RecoveryOutcome::Requeued
                    } else {
                        RecoveryOutcome::Abandoned(AbandonReason::AlreadyRetried)
                    };
                }
                Effect::Abandon { reason } => {
                    self.counters.record_failed();
                    engine_warn!("Abandoning {}: {}", entry.url, reason);
                    outcome = RecoveryOutcome::Abandoned(reason);
                }
            }
        }
        outcome
    }

    fn transition(&self, state: &mut RecoveryState, msg: Msg) -> Vec<Effect> {
        let before = state.health();
        let (next, effects) = update(state.clone(), msg);
        if next.health() != before {
            engine_info!("Session health {:?} -> {:?}", before, next.health());
        }
        *state = next;
        effects
    }
}
