use std::{collections::HashSet, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use http_transport::HttpTransport;
use shared::{
    domain::{FileId, FileRecord, RawFile, UploadStatus},
    protocol::UploadEvent,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use upload_core::{BeforeUpload, MaxSizeGate, Uploader, UploaderHooks};

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "uploader", about = "Upload local files to an HTTP endpoint")]
struct Args {
    /// Settings file; defaults to ./uploader.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    action: Option<String>,
    /// Maximum number of files in the list, 0 for unlimited.
    #[arg(long)]
    limit: Option<usize>,
    /// Queue files and start them together once all are selected.
    #[arg(long)]
    no_auto_upload: bool,
    #[arg(long)]
    response_url_key: Option<String>,
    /// Comma-separated extensions and MIME patterns, e.g. ".png,image/*".
    #[arg(long)]
    accept: Option<String>,
    #[arg(long)]
    field_name: Option<String>,
    #[arg(long = "header", value_parser = parse_key_value)]
    headers: Vec<(String, String)>,
    #[arg(long = "data", value_parser = parse_key_value)]
    data: Vec<(String, String)>,
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(action) = &self.action {
            settings.action = action.clone();
        }
        if let Some(limit) = self.limit {
            settings.limit = limit;
        }
        if self.no_auto_upload {
            settings.auto_upload = false;
        }
        if let Some(key) = &self.response_url_key {
            settings.response_url_key = (!key.is_empty()).then(|| key.clone());
        }
        if let Some(accept) = &self.accept {
            settings.accept = Some(accept.clone());
        }
        if let Some(name) = &self.field_name {
            settings.field_name = name.clone();
        }
        settings.headers.extend(self.headers.iter().cloned());
        settings.data.extend(self.data.iter().cloned());
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    args.apply(&mut settings);

    let mut transport = HttpTransport::new().with_chunk_size(settings.chunk_size);
    if let Some(token) = &settings.bearer_token {
        transport = transport.with_bearer_token(token.clone());
    }
    let mut hooks = UploaderHooks::default();
    if let Some(max_bytes) = settings.max_file_size {
        hooks.before_upload = Some(Arc::new(MaxSizeGate { max_bytes }) as Arc<dyn BeforeUpload>);
    }
    let uploader = Uploader::new_with_hooks(settings.uploader_config(), Arc::new(transport), hooks)
        .context("invalid uploader settings")?;
    let mut events = uploader.subscribe_events();

    let mut files = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let file = RawFile::from_path(path)
            .await
            .with_context(|| format!("failed to open '{}'", path.display()))?;
        files.push(file);
    }

    info!(action = %settings.action, files = files.len(), "uploader: selecting files");
    let ids = uploader.select_files(files).await;
    if ids.is_empty() {
        bail!("no files were admitted; check the limit, accept and size settings");
    }
    if !uploader.config().auto_upload {
        let started = uploader.submit(None).await;
        info!(started, "uploader: submitted pending files");
    }

    wait_until_settled(&uploader, &mut events, ids).await;

    let files = uploader.file_list().await;
    println!("{}", serde_json::to_string_pretty(&files)?);

    let failed = files
        .iter()
        .filter(|file| file.status == UploadStatus::Error)
        .count();
    if failed > 0 {
        bail!("{failed} of {} uploads failed", files.len());
    }
    Ok(())
}

/// Logs events until every admitted file is `done` or `error`.
async fn wait_until_settled(
    uploader: &Uploader,
    events: &mut broadcast::Receiver<UploadEvent>,
    ids: Vec<FileId>,
) {
    let mut pending: HashSet<FileId> = ids.into_iter().collect();
    retain_unsettled(uploader, &mut pending).await;

    while !pending.is_empty() {
        match events.recv().await {
            Ok(UploadEvent::Progress { file, event }) => {
                info!(
                    file_id = %file.id,
                    name = display_name(&file),
                    loaded = event.loaded,
                    percent = (file.percent * 100.0).round(),
                    "uploader: progress"
                );
            }
            Ok(UploadEvent::Changed { file, .. }) => {
                debug!(file_id = %file.id, status = ?file.status, "uploader: file changed");
                if file.status.is_terminal() && pending.remove(&file.id) {
                    match file.status {
                        UploadStatus::Done => {
                            info!(file_id = %file.id, url = ?file.url, "uploader: upload finished")
                        }
                        _ => warn!(file_id = %file.id, response = ?file.response, "uploader: upload failed"),
                    }
                }
            }
            Ok(UploadEvent::ExceedLimit { rejected, .. }) => {
                warn!(rejected = rejected.len(), "uploader: file limit exceeded");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "uploader: event stream lagged; rechecking files");
                retain_unsettled(uploader, &mut pending).await;
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn display_name(file: &FileRecord) -> &str {
    file.name.as_deref().unwrap_or(file.id.as_str())
}

async fn retain_unsettled(uploader: &Uploader, pending: &mut HashSet<FileId>) {
    let files = uploader.file_list().await;
    pending.retain(|id| {
        files
            .iter()
            .any(|file| &file.id == id && !file.status.is_terminal())
    });
}
