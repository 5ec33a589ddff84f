use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use shared::domain::FileId;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Mints `<unix-millis>-<sequence>` ids. The sequence is shared by every
/// generator in the process, so two batches started in the same millisecond
/// still get distinct ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn next_id(&self) -> FileId {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        FileId(format!("{}-{seq}", Utc::now().timestamp_millis()))
    }
}
