use std::collections::HashMap;

use shared::domain::FileId;

use crate::transport::TransferHandle;

/// Identifies one started transfer. Callbacks carrying a ticket that is no
/// longer registered for their file are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferTicket(pub u64);

struct ActiveTransfer {
    ticket: TransferTicket,
    handle: Box<dyn TransferHandle>,
}

#[derive(Default)]
pub struct TransferRegistry {
    next_ticket: u64,
    active: HashMap<FileId, ActiveTransfer>,
}

impl TransferRegistry {
    pub fn issue_ticket(&mut self) -> TransferTicket {
        self.next_ticket += 1;
        TransferTicket(self.next_ticket)
    }

    pub fn insert(&mut self, id: FileId, ticket: TransferTicket, handle: Box<dyn TransferHandle>) {
        self.active.insert(id, ActiveTransfer { ticket, handle });
    }

    pub fn is_current(&self, id: &FileId, ticket: TransferTicket) -> bool {
        self.active
            .get(id)
            .is_some_and(|active| active.ticket == ticket)
    }

    pub fn contains(&self, id: &FileId) -> bool {
        self.active.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn take(&mut self, id: &FileId) -> Option<Box<dyn TransferHandle>> {
        self.active.remove(id).map(|active| active.handle)
    }

    pub fn finish(&mut self, id: &FileId, ticket: TransferTicket) -> bool {
        if !self.is_current(id, ticket) {
            return false;
        }
        self.active.remove(id);
        true
    }
}
