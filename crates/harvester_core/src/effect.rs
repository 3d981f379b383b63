#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Acquire a fresh session, then report back with a bootstrap message.
    Rebootstrap,
    /// Re-enqueue the blocked request once, flagged as retried after block.
    Requeue,
    /// Drop the blocked request for the rest of the run.
    Abandon { reason: AbandonReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    AlreadyRetried,
    CeilingExhausted,
    BootstrapFailed,
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbandonReason::AlreadyRetried => write!(f, "blocked again after recovery"),
            AbandonReason::CeilingExhausted => write!(f, "re-bootstrap ceiling exhausted"),
            AbandonReason::BootstrapFailed => write!(f, "re-bootstrap failed"),
        }
    }
}
