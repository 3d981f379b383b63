use thiserror::Error;

use crate::session::BootstrapError;
use crate::sink::SinkError;

/// Errors that end a run. Everything per-page is absorbed and counted.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("session bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("record sink failed: {0}")]
    Sink(#[from] SinkError),
}
