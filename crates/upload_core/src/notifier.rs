use shared::{
    domain::{FileRecord, RawFile},
    protocol::{ProgressEvent, UploadEvent},
};
use tokio::sync::broadcast;

/// Fire-and-forget publisher; a send with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct Notifier {
    events: broadcast::Sender<UploadEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    pub fn list_changed(&self, files: Vec<FileRecord>, file: FileRecord) {
        self.publish(UploadEvent::ListUpdated(files.clone()));
        self.publish(UploadEvent::Changed { files, file });
    }

    pub fn progress(&self, file: FileRecord, event: ProgressEvent) {
        self.publish(UploadEvent::Progress { file, event });
    }

    pub fn exceed_limit(&self, files: Vec<FileRecord>, rejected: Vec<RawFile>) {
        self.publish(UploadEvent::ExceedLimit { files, rejected });
    }

    pub fn preview(&self, file: FileRecord) {
        self.publish(UploadEvent::Preview(file));
    }

    fn publish(&self, event: UploadEvent) {
        let _ = self.events.send(event);
    }
}
