use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::domain::{FileSource, RawFile};
use url::Url;

const DEFAULT_MAX_INLINE_BYTES: u64 = 2 * 1024 * 1024;

/// Derives a display URL for a freshly selected payload.
#[async_trait]
pub trait PreviewSource: Send + Sync {
    async fn preview_url(&self, file: &RawFile) -> Result<Option<String>>;
}

pub struct NoPreview;

#[async_trait]
impl PreviewSource for NoPreview {
    async fn preview_url(&self, _file: &RawFile) -> Result<Option<String>> {
        Ok(None)
    }
}

/// `file://` URLs for files on disk and `data:` URLs for small in-memory images.
pub struct DataUrlPreview {
    pub max_inline_bytes: u64,
}

impl Default for DataUrlPreview {
    fn default() -> Self {
        Self {
            max_inline_bytes: DEFAULT_MAX_INLINE_BYTES,
        }
    }
}

#[async_trait]
impl PreviewSource for DataUrlPreview {
    async fn preview_url(&self, file: &RawFile) -> Result<Option<String>> {
        match &file.source {
            FileSource::Path(path) => {
                let absolute = tokio::fs::canonicalize(path).await?;
                let url = Url::from_file_path(&absolute)
                    .map_err(|_| anyhow!("cannot express '{}' as a file url", absolute.display()))?;
                Ok(Some(url.to_string()))
            }
            FileSource::Memory(bytes) => {
                let Some(mime) = file.mime_type.as_deref() else {
                    return Ok(None);
                };
                if !mime.starts_with("image/") || bytes.len() as u64 > self.max_inline_bytes {
                    return Ok(None);
                }
                Ok(Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes))))
            }
        }
    }
}
