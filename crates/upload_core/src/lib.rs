use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use shared::{
    domain::{FileDescriptor, FileId, FileRecord, RawFile, UploadStatus},
    error::ConfigError,
    protocol::{ProgressEvent, UploadEvent},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod accept;
pub mod config;
pub mod gate;
pub mod id;
pub mod notifier;
pub mod preview;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod transport;

pub use config::{FieldSource, TransferOptions, UploaderConfig};
pub use gate::{BeforeRemove, BeforeUpload, MaxSizeGate, UploadDecision};
pub use preview::{DataUrlPreview, NoPreview, PreviewSource};
pub use registry::TransferTicket;
pub use transport::{
    TransferHandle, TransferReporter, TransferRequest, UnabortableTransfer, UploadTransport,
};

use id::IdGenerator;
use notifier::Notifier;
use registry::TransferRegistry;
use store::FileStore;

#[derive(Clone)]
pub struct UploaderHooks {
    pub before_upload: Option<Arc<dyn BeforeUpload>>,
    pub before_remove: Option<Arc<dyn BeforeRemove>>,
    pub preview: Arc<dyn PreviewSource>,
}

impl Default for UploaderHooks {
    fn default() -> Self {
        Self {
            before_upload: None,
            before_remove: None,
            preview: Arc::new(DataUrlPreview::default()),
        }
    }
}

#[derive(Default)]
struct UploaderState {
    store: FileStore,
    registry: TransferRegistry,
}

pub(crate) struct Shared {
    config: UploaderConfig,
    transport: Arc<dyn UploadTransport>,
    hooks: UploaderHooks,
    ids: IdGenerator,
    state: Mutex<UploaderState>,
    notifier: Notifier,
}

#[derive(Clone)]
pub struct Uploader {
    shared: Arc<Shared>,
}

impl Uploader {
    pub fn new(
        config: UploaderConfig,
        transport: Arc<dyn UploadTransport>,
    ) -> Result<Self, ConfigError> {
        Self::new_with_hooks(config, transport, UploaderHooks::default())
    }

    pub fn new_with_hooks(
        config: UploaderConfig,
        transport: Arc<dyn UploadTransport>,
        hooks: UploaderHooks,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let ids = IdGenerator;
        let mut state = UploaderState::default();
        state
            .store
            .replace_all(reconcile::reconcile(config.default_file_list.clone(), &ids));

        Ok(Self {
            shared: Arc::new(Shared {
                notifier: Notifier::new(config.event_capacity),
                config,
                transport,
                hooks,
                ids,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.shared.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.shared.notifier.subscribe()
    }

    pub async fn file_list(&self) -> Vec<FileRecord> {
        self.shared.state.lock().await.store.snapshot()
    }

    pub async fn file(&self, id: &FileId) -> Option<FileRecord> {
        self.shared.state.lock().await.store.get(id).cloned()
    }

    pub async fn has_active_transfer(&self, id: &FileId) -> bool {
        self.shared.state.lock().await.registry.contains(id)
    }

    /// Replaces the list with a caller-controlled one. In-flight transfers are
    /// left running and still land on a record that keeps their id.
    pub async fn set_file_list(&self, descriptors: Vec<FileDescriptor>) {
        let records = reconcile::reconcile(descriptors, &self.shared.ids);
        let mut guard = self.shared.state.lock().await;
        debug!(count = records.len(), "upload: file list replaced");
        guard.store.replace_all(records);
    }

    /// Files outside `accept` are dropped before the limit check; a batch over
    /// `limit` is rejected whole. Returns the ids that were admitted.
    pub async fn select_files(&self, files: Vec<RawFile>) -> Vec<FileId> {
        let files: Vec<RawFile> = match self.shared.config.accept.as_deref() {
            Some(accept) => files
                .into_iter()
                .filter(|file| {
                    let accepted = accept::is_accepted(file, accept);
                    if !accepted {
                        debug!(name = %file.name, accept, "upload: file filtered by accept");
                    }
                    accepted
                })
                .collect(),
            None => files,
        };
        if files.is_empty() {
            return Vec::new();
        }

        {
            let guard = self.shared.state.lock().await;
            let limit = self.shared.config.limit;
            let current = guard.store.len();
            if limit > 0 && current + files.len() > limit {
                info!(
                    limit,
                    current,
                    selected = files.len(),
                    "upload: selection exceeds limit"
                );
                self.shared
                    .notifier
                    .exceed_limit(guard.store.snapshot(), files);
                return Vec::new();
            }
        }

        join_all(files.into_iter().map(|file| self.shared.admit(file)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    pub async fn start_upload(&self, id: &FileId) -> bool {
        let mut guard = self.shared.state.lock().await;
        self.shared.start_locked(&mut guard, id)
    }

    /// Starts `id` if given, otherwise every record still in `init`.
    pub async fn submit(&self, id: Option<&FileId>) -> usize {
        let mut guard = self.shared.state.lock().await;
        match id {
            Some(id) => usize::from(self.shared.start_locked(&mut guard, id)),
            None => guard
                .store
                .ids_with_status(UploadStatus::Init)
                .iter()
                .filter(|id| self.shared.start_locked(&mut guard, id))
                .count(),
        }
    }

    pub async fn abort(&self, id: &FileId) -> bool {
        let mut guard = self.shared.state.lock().await;
        let Some(handle) = guard.registry.take(id) else {
            return false;
        };
        if !handle.abort() {
            debug!(file_id = %id, "upload: transport cannot cancel, marking failed anyway");
        }
        info!(file_id = %id, "upload: transfer aborted");

        if let Some(record) = guard.store.get_mut(id) {
            record.status = UploadStatus::Error;
            record.percent = 0.0;
            let record = record.clone();
            self.shared
                .notifier
                .list_changed(guard.store.snapshot(), record);
        }
        true
    }

    // An active transfer for the record keeps running.
    pub async fn remove(&self, id: &FileId) -> bool {
        let Some(record) = self.file(id).await else {
            return false;
        };

        if let Some(gate) = &self.shared.hooks.before_remove {
            match gate.before_remove(&record).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(file_id = %id, "upload: removal vetoed");
                    return false;
                }
                Err(err) => {
                    warn!(file_id = %id, error = %err, "upload: before_remove failed");
                    return false;
                }
            }
        }

        let mut guard = self.shared.state.lock().await;
        let Some(removed) = guard.store.remove(id) else {
            return false;
        };
        info!(file_id = %id, "upload: file removed");
        self.shared
            .notifier
            .list_changed(guard.store.snapshot(), removed);
        true
    }

    pub async fn update_file(&self, id: &FileId, file: RawFile) -> bool {
        if self.file(id).await.is_none() {
            return false;
        }
        let url = self.shared.preview_url(&file).await;

        let mut guard = self.shared.state.lock().await;
        let Some(record) = guard.store.get_mut(id) else {
            return false;
        };
        record.name = Some(file.name.clone());
        record.url = url;
        record.file = Some(file);
        let record = record.clone();
        self.shared
            .notifier
            .list_changed(guard.store.snapshot(), record);
        true
    }

    pub async fn preview(&self, id: &FileId) -> bool {
        let Some(record) = self.file(id).await else {
            return false;
        };
        self.shared.notifier.preview(record);
        true
    }
}

impl Shared {
    async fn admit(self: &Arc<Self>, file: RawFile) -> Option<FileId> {
        let file = match &self.hooks.before_upload {
            None => file,
            Some(gate) => match gate.before_upload(&file).await {
                Ok(UploadDecision::Accept) => file,
                Ok(UploadDecision::Replace(replacement)) => replacement,
                Ok(UploadDecision::Reject) => {
                    debug!(name = %file.name, "upload: file vetoed by before_upload");
                    return None;
                }
                Err(err) => {
                    warn!(name = %file.name, error = %err, "upload: before_upload failed");
                    return None;
                }
            },
        };

        let url = self.preview_url(&file).await;
        let record = FileRecord {
            id: self.ids.next_id(),
            status: UploadStatus::Init,
            percent: 0.0,
            url,
            name: Some(file.name.clone()),
            response: None,
            file: Some(file),
        };
        let id = record.id.clone();

        let mut guard = self.state.lock().await;
        guard.store.push(record.clone());
        debug!(file_id = %id, "upload: file added");
        self.notifier.list_changed(guard.store.snapshot(), record);

        if self.config.auto_upload {
            self.start_locked(&mut guard, &id);
        }
        Some(id)
    }

    async fn preview_url(&self, file: &RawFile) -> Option<String> {
        match self.hooks.preview.preview_url(file).await {
            Ok(url) => url,
            Err(err) => {
                warn!(name = %file.name, error = %err, "upload: preview unavailable");
                None
            }
        }
    }

    fn start_locked(self: &Arc<Self>, state: &mut UploaderState, id: &FileId) -> bool {
        let Some(record) = state.store.get_mut(id) else {
            return false;
        };
        record.status = UploadStatus::Uploading;
        record.percent = 0.0;
        let record = record.clone();

        let ticket = state.registry.issue_ticket();
        let request = self.config.transfer.request_for(&record);
        let reporter = TransferReporter::new(Arc::downgrade(self), id.clone(), ticket);
        let handle = self.transport.start(request, reporter);
        state.registry.insert(id.clone(), ticket, handle);
        info!(file_id = %id, ticket = ticket.0, "upload: transfer started");

        self.notifier.list_changed(state.store.snapshot(), record);
        true
    }

    pub(crate) async fn handle_progress(
        &self,
        id: &FileId,
        ticket: TransferTicket,
        percent: f64,
        event: ProgressEvent,
    ) {
        let mut guard = self.state.lock().await;
        if !guard.registry.is_current(id, ticket) {
            debug!(file_id = %id, ticket = ticket.0, "upload: stale progress dropped");
            return;
        }
        let Some(record) = guard.store.get_mut(id) else {
            debug!(file_id = %id, "upload: progress for removed file dropped");
            return;
        };
        record.status = UploadStatus::Uploading;
        if percent.is_finite() {
            record.percent = percent.clamp(0.0, 1.0);
        } else {
            warn!(file_id = %id, percent, "upload: non-finite progress ignored");
        }
        let record = record.clone();

        self.notifier.progress(record.clone(), event);
        self.notifier.list_changed(guard.store.snapshot(), record);
    }

    pub(crate) async fn handle_success(&self, id: &FileId, ticket: TransferTicket, response: Value) {
        let url = self.response_url(&response);
        self.finish(id, ticket, |record| {
            record.status = UploadStatus::Done;
            record.percent = 1.0;
            if url.is_some() {
                record.url = url;
            }
            record.response = Some(response);
        })
        .await;
    }

    pub(crate) async fn handle_error(&self, id: &FileId, ticket: TransferTicket, response: Value) {
        self.finish(id, ticket, |record| {
            record.status = UploadStatus::Error;
            record.percent = 0.0;
            record.response = Some(response);
        })
        .await;
    }

    async fn finish(
        &self,
        id: &FileId,
        ticket: TransferTicket,
        apply: impl FnOnce(&mut FileRecord),
    ) {
        let mut guard = self.state.lock().await;
        if !guard.registry.finish(id, ticket) {
            debug!(file_id = %id, ticket = ticket.0, "upload: stale completion dropped");
            return;
        }
        let Some(record) = guard.store.get_mut(id) else {
            debug!(file_id = %id, "upload: completion for removed file dropped");
            return;
        };
        apply(record);
        let record = record.clone();
        info!(file_id = %id, status = ?record.status, "upload: transfer finished");
        self.notifier.list_changed(guard.store.snapshot(), record);
    }

    fn response_url(&self, response: &Value) -> Option<String> {
        let key = self.config.response_url_key.as_deref()?;
        response
            .get(key)?
            .as_str()
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
