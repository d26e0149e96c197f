//! LlamaParse client against an in-process HTTP server.
//!
//! The server is a few lines of tokio: one request per connection, routed by
//! method and path, answered with `Connection: close`. Every request line is
//! logged so the tests can count polls and check the exact paths requested.

use serde_json::{json, Value};
use smart_pdf_parser::{
    ClientConfig, LlamaParseClient, ParseService, Session, SessionProgressCallback, SessionState,
    SmartPdfError, Upload,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const UPLOAD: &str = "/api/v1/parsing/upload";
const STATUS: &str = "/api/v1/parsing/job/job-1";
const RESULT: &str = "/api/v1/parsing/job/job-1/result/json";
const IMAGES: &str = "/api/v1/parsing/job/job-1/result/image/";

// ── Minimal HTTP server ──────────────────────────────────────────────────────

struct Request {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

struct Reply {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
    delay: Duration,
}

impl Reply {
    fn json(value: Value) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type", "application/json".to_string())],
            body: value.to_string().into_bytes(),
            delay: Duration::ZERO,
        }
    }

    fn bytes(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type", "image/png".to_string())],
            body,
            delay: Duration::ZERO,
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: message.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    fn after(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} Mock\r\n", self.status);
        out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        out.push_str("Connection: close\r\n");
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

struct MockServer {
    base_url: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let handler = Arc::new(handler);
        let log = Arc::new(Mutex::new(Vec::new()));

        let accept_log = Arc::clone(&log);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&accept_log);
                tokio::spawn(async move {
                    let Some(req) = read_request(&mut stream).await else {
                        return;
                    };
                    log.lock().unwrap().push(format!("{} {}", req.method, req.path));
                    let reply = (*handler)(&req);
                    if !reply.delay.is_zero() {
                        tokio::time::sleep(reply.delay).await;
                    }
                    let _ = stream.write_all(&reply.encode()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            log,
        }
    }

    fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, line: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == line).count()
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let chunked = headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.contains("chunked"));

    let mut body = buf[head_end..].to_vec();
    loop {
        let complete = if chunked {
            body.ends_with(b"0\r\n\r\n")
        } else {
            body.len() >= content_length
        };
        if complete {
            break;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(Request {
        method,
        path,
        headers,
        body,
    })
}

// ── LlamaParse scenario ──────────────────────────────────────────────────────

/// A scripted parsing job.
struct Job {
    /// Replies to the first uploads; later uploads succeed.
    upload_failures: Vec<(u16, Option<&'static str>)>,
    /// Status per poll; the last one repeats.
    statuses: Vec<&'static str>,
    pages: Value,
    /// Per-image reply delay in ms.
    image_delays: HashMap<&'static str, u64>,
    /// Images answered with HTTP 500.
    broken_images: Vec<&'static str>,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            upload_failures: Vec::new(),
            statuses: vec!["PENDING", "SUCCESS"],
            pages: report_pages(),
            image_delays: HashMap::new(),
            broken_images: Vec::new(),
        }
    }
}

fn report_pages() -> Value {
    json!([
        {
            "page": 1,
            "text": "Report\nIntro",
            "md": "# Report\n\nThe report covers the year.",
            "images": [
                {"name": "page_1.jpg", "type": "full_page_screenshot"},
                {"name": "a.png", "type": "layout_picture"}
            ]
        },
        {
            "page": 2,
            "text": "a b\n1 2",
            "md": "| a | b |\n|---|---|\n| 1 | 2 |",
            "images": [
                {"name": "b.png", "type": "layout_picture"},
                {"name": "c.png", "type": "layout_picture"}
            ]
        }
    ])
}

async fn serve(job: Job) -> MockServer {
    let uploads = AtomicUsize::new(0);
    let polls = AtomicUsize::new(0);

    MockServer::start(move |req| {
        match (req.method.as_str(), req.path.as_str()) {
            ("POST", UPLOAD) => {
                let n = uploads.fetch_add(1, Ordering::SeqCst);
                match job.upload_failures.get(n) {
                    Some(&(status, retry_after)) => {
                        let reply = Reply::error(status, "upload rejected");
                        match retry_after {
                            Some(secs) => reply.header("Retry-After", secs),
                            None => reply,
                        }
                    }
                    None => Reply::json(json!({"id": "job-1", "status": "PENDING"})),
                }
            }
            ("GET", STATUS) => {
                let n = polls.fetch_add(1, Ordering::SeqCst);
                let status = job
                    .statuses
                    .get(n)
                    .or(job.statuses.last())
                    .copied()
                    .unwrap_or("SUCCESS");
                Reply::json(json!({"id": "job-1", "status": status}))
            }
            ("GET", RESULT) => Reply::json(json!({"pages": job.pages})),
            ("GET", path) if path.starts_with(IMAGES) => {
                let name = &path[IMAGES.len()..];
                if job.broken_images.iter().any(|b| *b == name) {
                    return Reply::error(500, "image store unavailable");
                }
                let mut body = PNG.to_vec();
                body.extend_from_slice(name.as_bytes());
                Reply::bytes(body).after(job.image_delays.get(name).copied().unwrap_or(0))
            }
            _ => Reply::error(404, "no route"),
        }
    })
    .await
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::builder()
        .llama_api_key("llama-cloud-test-key")
        .llama_base_url(&server.base_url)
        .poll_interval_ms(10)
        .request_timeout_secs(5)
        .build()
        .expect("valid config")
}

fn pdf() -> Upload {
    Upload::new("report.pdf", b"%PDF-1.7\n1 0 obj\n".to_vec())
}

fn names(blobs: &[smart_pdf_parser::ImageBlob]) -> Vec<&str> {
    blobs.iter().map(|b| b.name.as_str()).collect()
}

// ── Full flow ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_poll_result_and_images() {
    let server = serve(Job::default()).await;
    let mut session = Session::from_config(config(&server)).expect("session");

    let doc = session.upload(pdf()).await.expect("parse should succeed");
    assert_eq!(
        doc.extracted_text,
        "# Report\n\nThe report covers the year.\n\n| a | b |\n|---|---|\n| 1 | 2 |"
    );
    assert!(doc.has_tables);
    assert!(doc.has_images);
    assert_eq!(names(&doc.page_images), ["page_1.jpg"]);
    assert_eq!(names(&doc.embedded_images), ["a.png", "b.png", "c.png"]);
    assert_eq!(doc.embedded_images[0].mime_type, "image/png");
    assert_eq!(doc.embedded_images[2].page, Some(2));
    assert_eq!(session.state(), SessionState::Parsed);

    assert_eq!(server.count(&format!("POST {UPLOAD}")), 1);
    assert_eq!(server.count(&format!("GET {STATUS}")), 2);
    assert_eq!(server.count(&format!("GET {RESULT}")), 1);
}

#[tokio::test]
async fn upload_is_multipart_with_bearer_key() {
    let seen = Arc::new(Mutex::new(None::<(Option<String>, String)>));
    let seen_in_handler = Arc::clone(&seen);
    let server = MockServer::start(move |req| {
        if req.path == UPLOAD {
            *seen_in_handler.lock().unwrap() = Some((
                req.header("authorization").map(str::to_string),
                String::from_utf8_lossy(&req.body).into_owned(),
            ));
        }
        Reply::error(503, "stop here")
    })
    .await;
    let client = LlamaParseClient::new(config(&server)).unwrap();

    let err = client.parse(&pdf()).await.unwrap_err();
    assert!(matches!(err, SmartPdfError::ServiceUnavailable { .. }), "got {err:?}");

    let (auth, body) = seen.lock().unwrap().clone().expect("upload was sent");
    assert_eq!(auth.as_deref(), Some("Bearer llama-cloud-test-key"));
    assert!(body.contains(r#"name="file"; filename="report.pdf""#));
    assert!(body.contains(r#"name="result_type""#));
    assert!(body.contains("markdown"));
    assert!(body.contains("%PDF-1.7"));
}

#[tokio::test]
async fn images_keep_result_order_when_finishing_out_of_order() {
    struct Fetched(Mutex<Vec<String>>);
    impl SessionProgressCallback for Fetched {
        fn on_image_fetched(&self, name: &str, _done: usize, _total: usize) {
            self.0.lock().unwrap().push(name.to_string());
        }
    }

    let server = serve(Job {
        image_delays: HashMap::from([("page_1.jpg", 300), ("a.png", 200), ("b.png", 100)]),
        ..Default::default()
    })
    .await;
    let fetched = Arc::new(Fetched(Mutex::new(Vec::new())));
    let mut cfg = config(&server);
    cfg.image_concurrency = 4;
    cfg.progress_callback = Some(Arc::clone(&fetched) as Arc<dyn SessionProgressCallback>);

    let content = LlamaParseClient::new(cfg).unwrap().parse(&pdf()).await.unwrap();
    assert_eq!(names(&content.page_images), ["page_1.jpg"]);
    assert_eq!(names(&content.embedded_images), ["a.png", "b.png", "c.png"]);

    let completion = fetched.0.lock().unwrap().clone();
    assert_eq!(completion.len(), 4);
    assert_eq!(completion[0], "c.png", "downloads did not overlap: {completion:?}");
}

#[tokio::test]
async fn image_fetch_can_be_disabled() {
    let server = serve(Job::default()).await;
    let mut cfg = config(&server);
    cfg.fetch_images = false;

    let content = LlamaParseClient::new(cfg).unwrap().parse(&pdf()).await.unwrap();
    assert!(content.page_images.is_empty());
    assert!(content.embedded_images.is_empty());
    assert!(server.requests().iter().all(|r| !r.contains("/result/image/")));
}

#[tokio::test]
async fn image_names_are_sent_as_one_encoded_segment() {
    let server = serve(Job {
        pages: json!([{"page": 1, "md": "Figure page", "images": [{"name": "fig 1#2.png"}]}]),
        ..Default::default()
    })
    .await;

    let content = LlamaParseClient::new(config(&server))
        .unwrap()
        .parse(&pdf())
        .await
        .unwrap();
    assert_eq!(names(&content.embedded_images), ["fig 1#2.png"]);
    assert!(server
        .requests()
        .contains(&format!("GET {IMAGES}fig%201%232.png")));
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_image_download_fails_the_parse() {
    let server = serve(Job {
        broken_images: vec!["b.png"],
        ..Default::default()
    })
    .await;
    let mut session = Session::from_config(config(&server)).expect("session");

    let err = session.upload(pdf()).await.unwrap_err();
    assert!(matches!(err, SmartPdfError::ServiceUnavailable { .. }), "got {err:?}");
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.document().is_none());
}

#[tokio::test]
async fn failed_and_cancelled_jobs_are_parse_failures() {
    for terminal in ["ERROR", "CANCELED"] {
        let server = serve(Job {
            statuses: vec!["PENDING", terminal],
            ..Default::default()
        })
        .await;

        let err = LlamaParseClient::new(config(&server))
            .unwrap()
            .parse(&pdf())
            .await
            .unwrap_err();
        match err {
            SmartPdfError::ParseFailed { job_id, status } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(status, terminal);
            }
            other => panic!("expected ParseFailed for {terminal}, got {other:?}"),
        }
        assert_eq!(server.count(&format!("GET {RESULT}")), 0);
    }
}

#[tokio::test]
async fn job_that_never_finishes_times_out() {
    let server = serve(Job {
        statuses: vec!["PENDING"],
        ..Default::default()
    })
    .await;
    let mut cfg = config(&server);
    cfg.parse_timeout_secs = 1;
    cfg.poll_interval_ms = 50;

    let err = LlamaParseClient::new(cfg).unwrap().parse(&pdf()).await.unwrap_err();
    match err {
        SmartPdfError::ServiceUnavailable { detail, .. } => {
            assert!(detail.contains("still PENDING"), "detail: {detail}")
        }
        other => panic!("expected ServiceUnavailable, got {other:?}"),
    }
    assert!(server.count(&format!("GET {STATUS}")) >= 2);
}

#[tokio::test]
async fn upload_statuses_map_onto_errors() {
    let cases: [(u16, Option<&'static str>); 4] =
        [(401, None), (429, Some("7")), (415, None), (404, None)];

    for (status, retry_after) in cases {
        let server = serve(Job {
            upload_failures: vec![(status, retry_after)],
            ..Default::default()
        })
        .await;
        let err = LlamaParseClient::new(config(&server))
            .unwrap()
            .parse(&pdf())
            .await
            .unwrap_err();

        match (status, err) {
            (401, SmartPdfError::AuthError { service, .. }) => assert_eq!(service, "LlamaParse"),
            (429, SmartPdfError::RateLimited {
                retry_after_secs, ..
            }) => assert_eq!(retry_after_secs, Some(7)),
            (415, SmartPdfError::UnsupportedFormat { file_name, .. }) => {
                assert_eq!(file_name, "report.pdf")
            }
            (404, SmartPdfError::ServiceError { status, .. }) => assert_eq!(status, 404),
            (status, other) => panic!("HTTP {status} mapped to {other:?}"),
        }
        assert_eq!(server.count(&format!("GET {STATUS}")), 0);
    }
}

#[tokio::test]
async fn outage_is_retried_when_enabled() {
    let server = serve(Job {
        upload_failures: vec![(503, None)],
        ..Default::default()
    })
    .await;
    let mut cfg = config(&server);
    cfg.max_retries = 1;
    cfg.retry_backoff_ms = 1;
    cfg.fetch_images = false;

    let content = LlamaParseClient::new(cfg).unwrap().parse(&pdf()).await.unwrap();
    assert!(content.text.starts_with("# Report"));
    assert_eq!(server.count(&format!("POST {UPLOAD}")), 2);
}

#[tokio::test]
async fn outage_is_final_without_retries() {
    let server = serve(Job {
        upload_failures: vec![(503, None)],
        ..Default::default()
    })
    .await;

    let err = LlamaParseClient::new(config(&server))
        .unwrap()
        .parse(&pdf())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(server.count(&format!("POST {UPLOAD}")), 1);
}
