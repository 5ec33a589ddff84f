use std::collections::HashMap;

use shared::domain::{FileId, FileRecord, UploadStatus};

#[derive(Debug, Default)]
pub struct FileStore {
    order: Vec<FileId>,
    records: HashMap<FileId, FileRecord>,
}

impl FileStore {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &FileId) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &FileId) -> Option<&FileRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &FileId) -> Option<&mut FileRecord> {
        self.records.get_mut(id)
    }

    // A known id is replaced in place.
    pub fn push(&mut self, record: FileRecord) {
        if !self.records.contains_key(&record.id) {
            self.order.push(record.id.clone());
        }
        self.records.insert(record.id.clone(), record);
    }

    pub fn remove(&mut self, id: &FileId) -> Option<FileRecord> {
        let record = self.records.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(record)
    }

    pub fn replace_all(&mut self, records: Vec<FileRecord>) {
        self.order.clear();
        self.records.clear();
        for record in records {
            self.push(record);
        }
    }

    pub fn ids_with_status(&self, status: UploadStatus) -> Vec<FileId> {
        self.iter()
            .filter(|record| record.status == status)
            .map(|record| record.id.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.iter().cloned().collect()
    }
}
