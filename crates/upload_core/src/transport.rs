use std::{collections::HashMap, sync::Weak};

use serde_json::Value;
use shared::{
    domain::{FileId, FileRecord, RawFile},
    protocol::ProgressEvent,
};

use crate::{registry::TransferTicket, Shared};

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub record: FileRecord,
    pub file: Option<RawFile>,
    pub action: String,
    pub name: String,
    pub data: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub with_credentials: bool,
}

impl TransferRequest {
    pub fn file_id(&self) -> &FileId {
        &self.record.id
    }
}

pub trait TransferHandle: Send + Sync {
    /// Returns `false` when the transport cannot cancel.
    fn abort(&self) -> bool {
        false
    }
}

pub struct UnabortableTransfer;

impl TransferHandle for UnabortableTransfer {}

/// Performs the actual transfer. `start` must return without waiting for the
/// transfer; the work reports back through `reporter`, zero or more
/// `progress` calls followed by one `success` or `error`.
pub trait UploadTransport: Send + Sync {
    fn start(&self, request: TransferRequest, reporter: TransferReporter)
        -> Box<dyn TransferHandle>;
}

pub struct TransferReporter {
    shared: Weak<Shared>,
    file_id: FileId,
    ticket: TransferTicket,
}

impl TransferReporter {
    pub(crate) fn new(shared: Weak<Shared>, file_id: FileId, ticket: TransferTicket) -> Self {
        Self {
            shared,
            file_id,
            ticket,
        }
    }

    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    pub fn ticket(&self) -> TransferTicket {
        self.ticket
    }

    pub async fn progress(&self, percent: f64, event: ProgressEvent) {
        if let Some(shared) = self.shared.upgrade() {
            shared
                .handle_progress(&self.file_id, self.ticket, percent, event)
                .await;
        }
    }

    pub async fn success(self, response: Value) {
        if let Some(shared) = self.shared.upgrade() {
            shared
                .handle_success(&self.file_id, self.ticket, response)
                .await;
        }
    }

    pub async fn error(self, response: Value) {
        if let Some(shared) = self.shared.upgrade() {
            shared
                .handle_error(&self.file_id, self.ticket, response)
                .await;
        }
    }
}
