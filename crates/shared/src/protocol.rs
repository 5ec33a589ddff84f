use serde::{Deserialize, Serialize};

use crate::domain::{FileRecord, RawFile};

/// Raw progress reading reported by a transport alongside the percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl ProgressEvent {
    /// Fraction in `[0, 1]`; an unknown or zero total reads as no progress.
    pub fn fraction(&self) -> f64 {
        match self.total {
            Some(total) if total > 0 => (self.loaded as f64 / total as f64).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

/// Notifications published to the host after every mutation.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Full snapshot of the list; always precedes `Changed`.
    ListUpdated(Vec<FileRecord>),
    Changed {
        files: Vec<FileRecord>,
        file: FileRecord,
    },
    Progress {
        file: FileRecord,
        event: ProgressEvent,
    },
    ExceedLimit {
        files: Vec<FileRecord>,
        rejected: Vec<RawFile>,
    },
    Preview(FileRecord),
}

impl UploadEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ListUpdated(_) => "list_updated",
            Self::Changed { .. } => "change",
            Self::Progress { .. } => "progress",
            Self::ExceedLimit { .. } => "exceed_limit",
            Self::Preview(_) => "preview",
        }
    }
}
