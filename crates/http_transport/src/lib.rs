//! Multipart HTTP transport for the upload core.

use std::io;

use futures::stream;
use reqwest::{
    header::{HeaderName, HeaderValue},
    multipart::{Form, Part},
    Body, Client, StatusCode,
};
use serde_json::{json, Value};
use shared::protocol::ProgressEvent;
use thiserror::Error;
use tokio::{sync::mpsc, task::AbortHandle};
use tracing::{debug, info, warn};
use upload_core::{TransferHandle, TransferReporter, TransferRequest, UploadTransport};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("file has no payload to send")]
    MissingPayload,
    #[error("failed to read payload: {0}")]
    Io(#[from] io::Error),
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server responded with {status}")]
    Status { status: StatusCode, body: Value },
}

impl TransferError {
    /// Payload handed to the core's error callback.
    pub fn into_response(self) -> Value {
        match self {
            Self::Status { status, body } => json!({ "status": status.as_u16(), "body": body }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

/// Posts each file as `multipart/form-data` to the request's action url.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    chunk_size: usize,
    bearer_token: Option<String>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(http: Client) -> Self {
        Self {
            http,
            chunk_size: DEFAULT_CHUNK_SIZE,
            bearer_token: None,
        }
    }

    /// Granularity of progress reports.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sent as `Authorization: Bearer ..` on requests that ask for credentials.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    async fn send(
        &self,
        request: TransferRequest,
        reporter: &TransferReporter,
    ) -> Result<Value, TransferError> {
        let file = request.file.as_ref().ok_or(TransferError::MissingPayload)?;
        let bytes = file.read_all().await?;
        let total = bytes.len() as u64;

        // The client pulls chunks from this stream as it writes the body;
        // each pull is counted as sent.
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel::<u64>();
        let chunks: Vec<Vec<u8>> = bytes.chunks(self.chunk_size).map(<[u8]>::to_vec).collect();
        let body = stream::iter(chunks.into_iter().map(move |chunk| {
            let _ = sent_tx.send(chunk.len() as u64);
            Ok::<_, io::Error>(chunk)
        }));

        let mut part =
            Part::stream_with_length(Body::wrap_stream(body), total).file_name(file.name.clone());
        if let Some(mime) = &file.mime_type {
            part = part.mime_str(mime)?;
        }
        let form = request
            .data
            .iter()
            .fold(Form::new(), |form, (key, value)| {
                form.text(key.clone(), value.clone())
            })
            .part(request.name.clone(), part);

        let mut builder = self.http.post(&request.action).multipart(form);
        for (name, value) in &request.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                TransferError::InvalidHeader {
                    name: name.clone(),
                    reason: err.to_string(),
                }
            })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|err| TransferError::InvalidHeader {
                    name: name.clone(),
                    reason: err.to_string(),
                })?;
            builder = builder.header(header_name, header_value);
        }
        if request.with_credentials {
            if let Some(token) = &self.bearer_token {
                builder = builder.bearer_auth(token);
            }
        }

        debug!(
            file_id = %request.file_id(),
            action = %request.action,
            bytes = total,
            "http: sending upload"
        );

        let response = builder.send();
        tokio::pin!(response);
        let mut loaded = 0u64;
        let response = loop {
            tokio::select! {
                result = &mut response => break result?,
                Some(sent) = sent_rx.recv() => {
                    loaded += sent;
                    report(reporter, loaded, total).await;
                }
            }
        };
        while let Ok(sent) = sent_rx.try_recv() {
            loaded += sent;
            report(reporter, loaded, total).await;
        }

        let status = response.status();
        let text = response.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if status.is_success() {
            Ok(body)
        } else {
            Err(TransferError::Status { status, body })
        }
    }
}

async fn report(reporter: &TransferReporter, loaded: u64, total: u64) {
    let event = ProgressEvent {
        loaded,
        total: Some(total),
    };
    reporter.progress(event.fraction(), event).await;
}

impl UploadTransport for HttpTransport {
    fn start(
        &self,
        request: TransferRequest,
        reporter: TransferReporter,
    ) -> Box<dyn TransferHandle> {
        let transport = self.clone();
        let task = tokio::spawn(async move {
            let file_id = reporter.file_id().clone();
            match transport.send(request, &reporter).await {
                Ok(response) => {
                    info!(file_id = %file_id, "http: upload accepted");
                    reporter.success(response).await;
                }
                Err(err) => {
                    warn!(file_id = %file_id, error = %err, "http: upload failed");
                    reporter.error(err.into_response()).await;
                }
            }
        });
        Box::new(HttpTransfer {
            task: task.abort_handle(),
        })
    }
}

/// Cancels by aborting the task driving the request.
pub struct HttpTransfer {
    task: AbortHandle,
}

impl TransferHandle for HttpTransfer {
    fn abort(&self) -> bool {
        self.task.abort();
        true
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
