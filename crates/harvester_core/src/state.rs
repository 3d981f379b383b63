/// Health of the session as seen by the block-recovery machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Healthy,
    SuspectedBlocked,
    Rebootstrapping,
    /// A bootstrap failed or the re-bootstrap budget ran out; the run goes
    /// on with the last known session.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoveryState {
    health: HealthState,
    rebootstraps_used: u32,
    max_rebootstraps: u32,
}

impl RecoveryState {
    pub fn new(max_rebootstraps: u32) -> Self {
        Self {
            max_rebootstraps,
            ..Self::default()
        }
    }

    pub fn health(&self) -> HealthState {
        self.health
    }

    pub fn rebootstraps_used(&self) -> u32 {
        self.rebootstraps_used
    }

    pub fn can_rebootstrap(&self) -> bool {
        self.rebootstraps_used < self.max_rebootstraps
    }

    pub(crate) fn set_health(&mut self, health: HealthState) {
        self.health = health;
    }

    pub(crate) fn spend_rebootstrap(&mut self) {
        self.rebootstraps_used += 1;
    }
}
