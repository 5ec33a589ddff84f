use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{FileRecord, RawFile};

/// Outcome of a `BeforeUpload` check.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadDecision {
    Accept,
    Reject,
    /// Admit this payload instead of the selected one.
    Replace(RawFile),
}

impl From<bool> for UploadDecision {
    fn from(value: bool) -> Self {
        if value {
            Self::Accept
        } else {
            Self::Reject
        }
    }
}

/// Host veto over a newly selected file. An `Err` abandons that file only.
#[async_trait]
pub trait BeforeUpload: Send + Sync {
    async fn before_upload(&self, file: &RawFile) -> Result<UploadDecision>;
}

/// Host veto over removing a record.
#[async_trait]
pub trait BeforeRemove: Send + Sync {
    async fn before_remove(&self, record: &FileRecord) -> Result<bool>;
}

/// Rejects files larger than `max_bytes`.
pub struct MaxSizeGate {
    pub max_bytes: u64,
}

#[async_trait]
impl BeforeUpload for MaxSizeGate {
    async fn before_upload(&self, file: &RawFile) -> Result<UploadDecision> {
        Ok((file.size <= self.max_bytes).into())
    }
}
