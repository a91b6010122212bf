use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;
use synth_core::{BatchJob, IngestOptions, JobStatus, RemoteBatchStatus, UploadFile};
use synth_engine::{error_from_body, BatchApi, ClientSettings, FailureKind, FieldError, HttpClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpClient {
    HttpClient::new(ClientSettings::with_base_url(server.uri())).expect("client")
}

#[tokio::test]
async fn upload_sends_files_and_options_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/ingest/batch"))
        .and(body_string_contains("filename=\"a.pdf\""))
        .and(body_string_contains("filename=\"b.pdf\""))
        .and(body_string_contains("name=\"vlm_captioning\""))
        .and(body_string_contains("name=\"title_prefix\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "batch_id": "b1",
            "jobs": [
                {"job_id": "j1", "filename": "a.pdf", "status": "pending"},
                {"job_id": "j2", "filename": "b.pdf", "status": "pending"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = IngestOptions {
        title_prefix: Some("Neuro".to_string()),
        vlm_captioning: true,
        ..IngestOptions::default()
    };
    let files = vec![
        UploadFile::new("a.pdf", b"%PDF-a".to_vec()).with_content_type("application/pdf"),
        UploadFile::new("b.pdf", b"%PDF-b".to_vec()),
    ];

    let submission = client_for(&server)
        .upload_batch(files, &options)
        .await
        .expect("upload ok");
    assert_eq!(submission.batch_id, "b1");
    assert_eq!(
        submission.jobs,
        vec![BatchJob::pending("j1", "a.pdf"), BatchJob::pending("j2", "b.pdf")]
    );
}

#[tokio::test]
async fn upload_rejects_malformed_content_type_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let files = vec![UploadFile::new("a.pdf", b"x".to_vec()).with_content_type("not a mime")];
    let err = client_for(&server)
        .upload_batch(files, &IngestOptions::default())
        .await
        .expect_err("bad mime");
    assert_eq!(err.kind, FailureKind::InvalidRequest);
}

#[tokio::test]
async fn status_decodes_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/ingest/batch/status/b1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "processing",
            "jobs": [
                {"job_id": "j1", "filename": "a.pdf", "status": "completed", "progress": 100},
                {"job_id": "j2", "filename": "b.pdf", "status": "processing",
                 "progress": 40, "current_stage": "vlm_captioning"}
            ],
            "current_file_index": 1,
            "current_file_name": "b.pdf",
            "elapsed_seconds": 12.5
        })))
        .mount(&server)
        .await;

    let snapshot = client_for(&server).batch_status("b1").await.expect("status");
    assert_eq!(snapshot.status, RemoteBatchStatus::Processing);
    assert_eq!(snapshot.jobs.len(), 2);
    assert_eq!(snapshot.jobs[0].status, JobStatus::Completed);
    assert_eq!(snapshot.jobs[1].current_stage.as_deref(), Some("vlm_captioning"));
    assert_eq!(snapshot.current_file_index, 1);
    assert_eq!(snapshot.current_file_name.as_deref(), Some("b.pdf"));
    assert_eq!(snapshot.elapsed_seconds, 12.5);
}

#[tokio::test]
async fn status_maps_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/ingest/batch/status/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Batch not found"})))
        .mount(&server)
        .await;

    let err = client_for(&server).batch_status("gone").await.expect_err("404");
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
    assert_eq!(err.message, "Batch not found");
    assert_eq!(err.kind.status_code(), Some(404));
}

#[tokio::test]
async fn status_with_garbage_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/ingest/batch/status/b1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client_for(&server).batch_status("b1").await.expect_err("decode");
    assert_eq!(err.kind, FailureKind::Decode);
}

#[tokio::test]
async fn status_body_cut_short_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|window| window == b"\r\n\r\n") {
            let read = socket.read(&mut buf).await.unwrap();
            if read == 0 {
                return;
            }
            head.extend_from_slice(&buf[..read]);
        }
        // Promises 200 bytes, sends a few, then hangs up.
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 200\r\n\r\n{\"status\":",
            )
            .await
            .unwrap();
    });

    let client = HttpClient::new(ClientSettings::with_base_url(format!("http://{addr}"))).expect("client");
    let err = client.batch_status("b1").await.expect_err("truncated");
    assert_eq!(err.kind, FailureKind::Network);
}

#[tokio::test]
async fn validation_errors_carry_field_details() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/ingest/batch"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [
                {"loc": ["body", "chunk_size"], "msg": "must be positive", "type": "value_error"},
                {"loc": ["body", "files", 0], "msg": "unsupported type", "type": "type_error"}
            ]
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .upload_batch(vec![UploadFile::new("a.exe", b"MZ".to_vec())], &IngestOptions::default())
        .await
        .expect_err("422");
    assert_eq!(err.kind.status_code(), Some(422));
    assert_eq!(
        err.field_errors(),
        &[
            FieldError {
                loc: vec!["body".to_string(), "chunk_size".to_string()],
                message: "must be positive".to_string(),
                kind: "value_error".to_string(),
            },
            FieldError {
                loc: vec!["body".to_string(), "files".to_string(), "0".to_string()],
                message: "unsupported type".to_string(),
                kind: "type_error".to_string(),
            },
        ]
    );
    assert_eq!(
        err.message,
        "body.chunk_size: must be positive; body.files.0: unsupported type"
    );
}

#[tokio::test]
async fn cancel_posts_to_batch_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/ingest/batch/cancel/b1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "cancelled"})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server).cancel_batch("b1").await.expect("cancel ok");
}

#[tokio::test]
async fn cancel_failure_surfaces_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/ingest/batch/cancel/b1"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "already finished"})))
        .mount(&server)
        .await;

    let err = client_for(&server).cancel_batch("b1").await.expect_err("409");
    assert_eq!(err.kind, FailureKind::HttpStatus(409));
    assert_eq!(err.message, "already finished");
}

#[tokio::test]
async fn retry_returns_requeued_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/ingest/batch/retry/b1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"retry_count": 2})))
        .mount(&server)
        .await;

    let count = client_for(&server).retry_failed("b1").await.expect("retry ok");
    assert_eq!(count, 2);
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    // Port 9 (discard) is not expected to accept connections.
    let client = HttpClient::new(ClientSettings::with_base_url("http://127.0.0.1:9")).expect("client");
    let err = client.batch_status("b1").await.expect_err("no server");
    assert!(matches!(err.kind, FailureKind::Network | FailureKind::Timeout));
}

#[test]
fn invalid_base_url_is_reported() {
    let client = HttpClient::new(ClientSettings::with_base_url("not a url")).expect("client");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let err = runtime
        .block_on(client.batch_status("b1"))
        .expect_err("invalid url");
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[test]
fn error_body_falls_back_to_status_text() {
    let err = error_from_body(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
    assert_eq!(err.kind, FailureKind::HttpStatus(500));
    assert_eq!(err.message, "500 Internal Server Error");
    assert_eq!(err.to_string(), "http status 500: 500 Internal Server Error");
}

#[test]
fn error_body_prefers_detail_over_message() {
    let err = error_from_body(
        StatusCode::BAD_REQUEST,
        r#"{"detail": "chunk_overlap must be smaller", "message": "bad"}"#,
    );
    assert_eq!(err.message, "chunk_overlap must be smaller");
    assert!(err.field_errors().is_empty());
}

#[test]
fn string_detail_on_422_is_not_a_field_list() {
    let err = error_from_body(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail": "bad input"}"#);
    assert_eq!(err.kind, FailureKind::HttpStatus(422));
    assert_eq!(err.message, "bad input");
}
