use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Init,
    Uploading,
    #[default]
    Done,
    Error,
}

impl UploadStatus {
    /// `done` and `error` stay put until a caller explicitly restarts the record.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Where the bytes of a selected file live.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    Memory(Arc<[u8]>),
    Path(PathBuf),
}

/// A file as handed over by the host, before it becomes a tracked record.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub size: u64,
    pub source: FileSource,
}

impl RawFile {
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: Option<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            name: name.into(),
            mime_type,
            size: bytes.len() as u64,
            source: FileSource::Memory(Arc::from(bytes)),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            mime_type: mime_from_name(&name).map(str::to_string),
            name,
            size: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Lowercased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }

    pub async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.to_vec()),
            FileSource::Path(path) => tokio::fs::read(path).await,
        }
    }
}

pub fn mime_from_name(name: &str) -> Option<&'static str> {
    mime_guess::from_path(name).first_raw()
}

/// One tracked file. `file` is the raw payload and is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub status: UploadStatus,
    pub percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip)]
    pub file: Option<RawFile>,
}

/// Caller-supplied entry of an external list; missing bookkeeping fields are
/// filled in during reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    #[serde(default)]
    pub id: Option<FileId>,
    #[serde(default)]
    pub status: Option<UploadStatus>,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(skip)]
    pub file: Option<RawFile>,
}

impl From<FileRecord> for FileDescriptor {
    fn from(record: FileRecord) -> Self {
        Self {
            id: Some(record.id),
            status: Some(record.status),
            percent: Some(record.percent),
            url: record.url,
            name: record.name,
            response: record.response,
            file: record.file,
        }
    }
}
