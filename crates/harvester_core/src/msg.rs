use crate::frontier::AttemptRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A fetched page passed block detection.
    PageOk,
    /// A fetched page was classified as a bot check.
    Blocked {
        attempt: AttemptRecord,
        /// Another worker already installed a newer session since this
        /// request was sent.
        session_refreshed: bool,
    },
    /// The bootstrap requested by [`crate::Effect::Rebootstrap`] produced a session.
    BootstrapSucceeded,
    /// The bootstrap requested by [`crate::Effect::Rebootstrap`] failed.
    BootstrapFailed,
}
