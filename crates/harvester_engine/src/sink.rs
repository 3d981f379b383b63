use std::io;
use std::sync::Mutex;

use harvester_core::JobRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("output location unusable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for finished records, appended in discovery order.
#[async_trait::async_trait]
pub trait RecordSink: Send + Sync {
    async fn append(&self, record: &JobRecord) -> Result<(), SinkError>;
}

/// Keeps records in memory; used by tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<JobRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<JobRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl RecordSink for MemorySink {
    async fn append(&self, record: &JobRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}
