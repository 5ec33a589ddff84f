use std::collections::HashSet;

use shared::domain::{FileDescriptor, FileRecord, UploadStatus};
use tracing::warn;

use crate::id::IdGenerator;

/// Turns caller-supplied descriptors into fully populated records, in order.
///
/// - missing `id`: minted from `ids`
/// - missing `status`: `done`
/// - missing `percent`: `0` for `error`, `1` otherwise
///
/// A repeated id gets a fresh one so the resulting list stays unique.
pub fn reconcile(descriptors: Vec<FileDescriptor>, ids: &IdGenerator) -> Vec<FileRecord> {
    let mut seen = HashSet::with_capacity(descriptors.len());
    descriptors
        .into_iter()
        .map(|descriptor| {
            let mut id = descriptor
                .id
                .filter(|id| !id.as_str().is_empty())
                .unwrap_or_else(|| ids.next_id());
            while seen.contains(&id) {
                let fresh = ids.next_id();
                warn!(duplicate = %id, replacement = %fresh, "upload: duplicate file id in list");
                id = fresh;
            }
            seen.insert(id.clone());

            let status = descriptor.status.unwrap_or_default();
            let percent = descriptor.percent.unwrap_or(match status {
                UploadStatus::Error => 0.0,
                _ => 1.0,
            });

            FileRecord {
                id,
                status,
                percent,
                url: descriptor.url,
                name: descriptor.name,
                response: descriptor.response,
                file: descriptor.file,
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
