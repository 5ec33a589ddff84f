use std::{sync::Arc, time::Duration};

use axum::{
    extract::Multipart,
    http::{header::AUTHORIZATION, HeaderMap},
    routing::post,
    Json, Router,
};
use shared::{
    domain::{FileDescriptor, FileId, FileRecord, RawFile, UploadStatus},
    protocol::UploadEvent,
};
use tokio::{
    net::TcpListener,
    sync::broadcast::{self, error::RecvError},
    time::timeout,
};
use upload_core::{Uploader, UploaderConfig};

use super::*;

struct ReceivedUpload {
    field: String,
    file_name: String,
    size: usize,
    data: serde_json::Map<String, Value>,
}

async fn read_upload(mut multipart: Multipart) -> Result<ReceivedUpload, StatusCode> {
    let mut data = serde_json::Map::new();
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                file = Some((name, file_name, bytes.len()));
            }
            None => {
                let text = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                data.insert(name, Value::String(text));
            }
        }
    }
    let (field, file_name, size) = file.ok_or(StatusCode::BAD_REQUEST)?;
    Ok(ReceivedUpload {
        field,
        file_name,
        size,
        data,
    })
}

async fn upload(multipart: Multipart) -> Result<Json<Value>, StatusCode> {
    let received = read_upload(multipart).await?;
    Ok(Json(json!({
        "url": format!("https://cdn.example/{}", received.file_name),
        "field": received.field,
        "size": received.size,
        "data": received.data,
    })))
}

async fn fail(multipart: Multipart) -> (axum::http::StatusCode, Json<Value>) {
    let _ = read_upload(multipart).await;
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "disk full" })),
    )
}

async fn slow(multipart: Multipart) -> Json<Value> {
    let _ = read_upload(multipart).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    Json(json!({}))
}

async fn auth(headers: HeaderMap, multipart: Multipart) -> Json<Value> {
    let _ = read_upload(multipart).await;
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    Json(json!({ "authorization": authorization }))
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/upload", post(upload))
        .route("/fail", post(fail))
        .route("/slow", post(slow))
        .route("/auth", post(auth));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

fn uploader(action: String, transport: HttpTransport) -> Uploader {
    let mut config = UploaderConfig::new(action);
    config.response_url_key = Some("url".into());
    Uploader::new(config, Arc::new(transport)).expect("uploader")
}

/// Collects events until `id` reaches `done` or `error`.
async fn until_finished(
    rx: &mut broadcast::Receiver<UploadEvent>,
    id: &FileId,
) -> (FileRecord, Vec<f64>) {
    let mut progress = Vec::new();
    let file = timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(UploadEvent::Progress { file, .. }) if &file.id == id => {
                    progress.push(file.percent);
                }
                Ok(UploadEvent::Changed { file, .. })
                    if &file.id == id && file.status.is_terminal() =>
                {
                    return file;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("upload finished in time");
    (file, progress)
}

#[test]
fn status_errors_keep_server_body() {
    let response = TransferError::Status {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        body: json!({ "message": "too big" }),
    }
    .into_response();
    assert_eq!(response, json!({ "status": 413, "body": { "message": "too big" } }));

    let response = TransferError::MissingPayload.into_response();
    assert_eq!(response, json!({ "error": "file has no payload to send" }));
}

#[tokio::test]
async fn uploads_file_with_progress_and_response_url() {
    let base = spawn_server().await;
    let mut config = UploaderConfig::new(format!("{base}/upload"));
    config.response_url_key = Some("url".into());
    config.transfer.name = upload_core::FieldSource::Fixed("attachment".into());
    config.transfer.data =
        upload_core::FieldSource::Fixed([("album".to_string(), "trip".to_string())].into());
    let uploader = Uploader::new(
        config,
        Arc::new(HttpTransport::new().with_chunk_size(4)),
    )
    .expect("uploader");
    let mut rx = uploader.subscribe_events();

    let id = uploader
        .select_files(vec![RawFile::from_bytes(
            "notes.txt",
            Some("text/plain".into()),
            b"0123456789".to_vec(),
        )])
        .await
        .remove(0);
    let (record, progress) = until_finished(&mut rx, &id).await;

    assert_eq!(record.status, UploadStatus::Done);
    assert_eq!(record.percent, 1.0);
    assert_eq!(record.url.as_deref(), Some("https://cdn.example/notes.txt"));
    let response = record.response.expect("response");
    assert_eq!(response["field"], "attachment");
    assert_eq!(response["size"], 10);
    assert_eq!(response["data"]["album"], "trip");

    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(progress.last().copied(), Some(1.0));
}

#[tokio::test]
async fn server_error_marks_record_failed() {
    let base = spawn_server().await;
    let uploader = uploader(format!("{base}/fail"), HttpTransport::new());
    let mut rx = uploader.subscribe_events();

    let id = uploader
        .select_files(vec![RawFile::from_bytes("a.bin", None, vec![1, 2, 3])])
        .await
        .remove(0);
    let (record, _) = until_finished(&mut rx, &id).await;

    assert_eq!(record.status, UploadStatus::Error);
    assert_eq!(record.percent, 0.0);
    assert_eq!(
        record.response,
        Some(json!({ "status": 500, "body": { "message": "disk full" } }))
    );
}

#[tokio::test]
async fn unreachable_server_reports_client_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let uploader = uploader(format!("http://{addr}/upload"), HttpTransport::new());
    let mut rx = uploader.subscribe_events();
    let id = uploader
        .select_files(vec![RawFile::from_bytes("a.bin", None, vec![1])])
        .await
        .remove(0);
    let (record, _) = until_finished(&mut rx, &id).await;

    assert_eq!(record.status, UploadStatus::Error);
    let response = record.response.expect("response");
    assert!(response["error"].as_str().is_some_and(|e| e.starts_with("request failed")));
}

#[tokio::test]
async fn records_without_payload_fail_without_a_request() {
    let mut config = UploaderConfig::new("http://127.0.0.1:9/never");
    config.auto_upload = false;
    config.default_file_list = vec![FileDescriptor {
        name: Some("remote.png".into()),
        ..FileDescriptor::default()
    }];
    let uploader = Uploader::new(config, Arc::new(HttpTransport::new())).expect("uploader");
    let id = uploader.file_list().await[0].id.clone();
    let mut rx = uploader.subscribe_events();

    assert_eq!(uploader.submit(Some(&id)).await, 1);
    let (record, _) = until_finished(&mut rx, &id).await;

    assert_eq!(record.status, UploadStatus::Error);
    assert_eq!(
        record.response,
        Some(json!({ "error": "file has no payload to send" }))
    );
}

#[tokio::test]
async fn abort_stops_in_flight_request() {
    let base = spawn_server().await;
    let uploader = uploader(format!("{base}/slow"), HttpTransport::new());

    let id = uploader
        .select_files(vec![RawFile::from_bytes("a.bin", None, vec![0; 32])])
        .await
        .remove(0);
    assert!(uploader.has_active_transfer(&id).await);

    assert!(uploader.abort(&id).await);
    let mut rx = uploader.subscribe_events();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let record = uploader.file(&id).await.expect("record");
    assert_eq!(record.status, UploadStatus::Error);
    assert_eq!(record.percent, 0.0);
    assert!(!uploader.has_active_transfer(&id).await);

    assert!(
        rx.try_recv().is_err(),
        "aborted transfer must not report anything further"
    );
}

#[tokio::test]
async fn bearer_token_is_sent_only_with_credentials() {
    let base = spawn_server().await;
    let transport = HttpTransport::new().with_bearer_token("secret");

    let mut config = UploaderConfig::new(format!("{base}/auth"));
    config.transfer.with_credentials = true;
    let with_credentials =
        Uploader::new(config, Arc::new(transport.clone())).expect("uploader");
    let without_credentials = uploader(format!("{base}/auth"), transport);

    for (uploader, expected) in [
        (with_credentials, json!("Bearer secret")),
        (without_credentials, Value::Null),
    ] {
        let mut rx = uploader.subscribe_events();
        let id = uploader
            .select_files(vec![RawFile::from_bytes("a.bin", None, vec![1])])
            .await
            .remove(0);
        let (record, _) = until_finished(&mut rx, &id).await;
        assert_eq!(record.response.expect("response")["authorization"], expected);
    }
}

#[tokio::test]
async fn custom_headers_are_validated() {
    let mut config = UploaderConfig::new("http://127.0.0.1:9/never");
    config
        .transfer
        .headers
        .insert("bad header".into(), "value".into());
    let uploader = Uploader::new(config, Arc::new(HttpTransport::new())).expect("uploader");
    let mut rx = uploader.subscribe_events();

    let id = uploader
        .select_files(vec![RawFile::from_bytes("a.bin", None, vec![1])])
        .await
        .remove(0);
    let (record, _) = until_finished(&mut rx, &id).await;

    let response = record.response.expect("response");
    assert!(response["error"]
        .as_str()
        .is_some_and(|e| e.starts_with("invalid header bad header")));
}
