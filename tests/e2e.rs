//! End-to-end integration tests for smart-pdf-parser.
//!
//! These tests upload a real PDF to LlamaParse and make live LLM API calls.
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested, and each one also skips when
//! the key it needs is missing.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! Use another PDF:
//!   E2E_ENABLED=1 SMARTPDF_TEST_PDF=/path/to/file.pdf cargo test --test e2e
//!
//! The tests at the bottom of the file need no network and always run.

use smart_pdf_parser::export::csv::UTF8_BOM;
use smart_pdf_parser::{
    ClientConfig, ExportFormat, InstructionKind, LlamaParseClient, LlmTransformer,
    NoopProgressCallback, Session, SessionProgressCallback, SessionState, SmartPdfError, Upload,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Route library logs through the test harness; `RUST_LOG` picks the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_pdf() -> PathBuf {
    std::env::var("SMARTPDF_TEST_PDF")
        .map(PathBuf::from)
        .unwrap_or_else(|_| test_cases_dir().join("sample.pdf"))
}

/// Skip this test unless E2E_ENABLED is set, every listed key is present and
/// the test PDF exists. Evaluates to the PDF path.
macro_rules! e2e_skip_unless_ready {
    ($($key:expr),*) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        init_tracing();
        $(
            if std::env::var($key).map(|v| v.trim().is_empty()).unwrap_or(true) {
                println!("SKIP: {} is not set", $key);
                return;
            }
        )*
        let p: PathBuf = test_pdf();
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            println!("      Put a PDF there or set SMARTPDF_TEST_PDF");
            return;
        }
        p
    }};
}

/// Assert transformed output went through the output cleanup.
fn assert_output_quality(text: &str, context: &str) {
    assert!(!text.trim().is_empty(), "[{context}] output is empty");

    let first_line = text.lines().next().unwrap_or("");
    assert!(
        !first_line.starts_with("```"),
        "[{context}] output must not start with a code fence, got: {first_line:?}"
    );

    assert!(
        !text.contains("\n\n\n\n"),
        "[{context}] output has more than 3 consecutive blank lines"
    );

    let invisible = ['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'];
    for ch in invisible {
        assert!(
            !text.contains(ch),
            "[{context}] output contains invisible char U+{:04X}",
            ch as u32
        );
    }

    println!("[{context}] ✓  {} chars, quality checks passed", text.len());
}

fn live_session() -> Session<LlamaParseClient, LlmTransformer> {
    let mut config = ClientConfig::from_env();
    config.max_retries = 2;
    Session::from_config(config).expect("session")
}

// ── Parse (LlamaParse only) ──────────────────────────────────────────────────

#[tokio::test]
async fn test_parse_sample_pdf() {
    let path = e2e_skip_unless_ready!("LLAMA_CLOUD_API_KEY");

    let mut session = live_session();
    let doc = session
        .open(path.to_str().unwrap())
        .await
        .expect("parse should succeed");

    assert!(!doc.extracted_text.trim().is_empty(), "parsed text is empty");
    assert!(!doc.detected_language.is_empty());
    println!("Summary: {:?}", doc.summary());
    assert_eq!(session.state(), SessionState::Parsed);

    let out = session
        .export_to(ExportFormat::Markdown, output_dir())
        .await
        .expect("export");
    println!("wrote {}", out.display());
}

#[tokio::test]
async fn test_parse_reports_progress() {
    let path = e2e_skip_unless_ready!("LLAMA_CLOUD_API_KEY");

    struct Counter {
        uploads: AtomicUsize,
        polls: AtomicUsize,
        completes: AtomicUsize,
    }

    impl SessionProgressCallback for Counter {
        fn on_upload_start(&self, _file_name: &str, _size: usize) {
            self.uploads.fetch_add(1, Ordering::SeqCst);
        }
        fn on_job_status(&self, _job_id: &str, _status: &str) {
            self.polls.fetch_add(1, Ordering::SeqCst);
        }
        fn on_parse_complete(&self, _text_len: usize, _image_count: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
    }

    let counter = Arc::new(Counter {
        uploads: AtomicUsize::new(0),
        polls: AtomicUsize::new(0),
        completes: AtomicUsize::new(0),
    });
    let mut config = ClientConfig::from_env();
    config.progress_callback = Some(Arc::clone(&counter) as Arc<dyn SessionProgressCallback>);
    let mut session = Session::from_config(config).expect("session");

    session
        .open(path.to_str().unwrap())
        .await
        .expect("parse should succeed");

    assert_eq!(counter.uploads.load(Ordering::SeqCst), 1);
    assert!(counter.polls.load(Ordering::SeqCst) >= 1, "no status polls seen");
    assert_eq!(counter.completes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_llama_key_is_auth_error() {
    let path = e2e_skip_unless_ready!();

    let config = ClientConfig::builder()
        .llama_api_key("llama-cloud-not-a-real-key")
        .build()
        .expect("valid config");
    let mut session = Session::from_config(config).expect("session");

    let err = session
        .open(path.to_str().unwrap())
        .await
        .expect_err("a bogus key must be rejected");
    assert!(
        matches!(err, SmartPdfError::AuthError { .. }),
        "expected AuthError, got {err:?}"
    );
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.document().is_none());
}

// ── Parse + transform ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_summarize_sample_pdf() {
    let path = e2e_skip_unless_ready!("LLAMA_CLOUD_API_KEY", "OPENAI_API_KEY");

    let mut session = live_session();
    session.open(path.to_str().unwrap()).await.expect("parse");

    let result = session
        .transform(InstructionKind::Summarize)
        .await
        .expect("summary should succeed");
    assert_output_quality(&result.output_text, "summary");
    assert_eq!(session.state(), SessionState::Transformed);

    let out = session
        .export_to(ExportFormat::Docx, output_dir())
        .await
        .expect("docx export");
    let bytes = std::fs::read(&out).expect("read back");
    assert!(bytes.starts_with(b"PK"), "docx must be a zip container");
}

#[tokio::test]
async fn test_table_transform_exports_rows() {
    let path = e2e_skip_unless_ready!("LLAMA_CLOUD_API_KEY", "OPENAI_API_KEY");

    let mut session = live_session();
    session.open(path.to_str().unwrap()).await.expect("parse");

    let result = session
        .transform(InstructionKind::StructureAsTable)
        .await
        .expect("table should succeed");
    assert_output_quality(&result.output_text, "table");
    println!("rows: {:?}", result.rows.as_ref().map(|t| t.rows.len()));

    let csv = session.export(ExportFormat::Csv).expect("csv");
    assert!(csv.starts_with(UTF8_BOM));

    let xlsx = session.export(ExportFormat::Xlsx).expect("xlsx");
    assert!(xlsx.starts_with(b"PK"));
    std::fs::write(output_dir().join("ai_output.xlsx"), &xlsx).ok();
}

#[tokio::test]
async fn test_rerun_replaces_transform() {
    let path = e2e_skip_unless_ready!("LLAMA_CLOUD_API_KEY", "OPENAI_API_KEY");

    let mut session = live_session();
    session.open(path.to_str().unwrap()).await.expect("parse");
    session
        .transform(InstructionKind::RewriteAsReport)
        .await
        .expect("report");
    session
        .transform(InstructionKind::RewriteAsArticle)
        .await
        .expect("article");

    let doc = session.document().expect("document");
    let transform = doc.transform.as_ref().expect("transform");
    assert_eq!(transform.instruction, InstructionKind::RewriteAsArticle);
    assert_output_quality(&transform.output_text, "article");
}

// ── Structural tests (no network, always run) ────────────────────────────────

/// Without a LlamaCloud key the upload fails before any request is sent.
#[tokio::test]
async fn test_missing_llama_key_fails_locally() {
    let mut session = Session::from_config(ClientConfig::default()).expect("session");
    let err = session
        .upload(Upload::new("doc.pdf", b"%PDF-1.4\n".to_vec()))
        .await
        .expect_err("no key configured");

    assert!(matches!(err, SmartPdfError::AuthError { .. }));
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.last_error().unwrap().contains("LLAMA_CLOUD_API_KEY"));
}

/// A file that is not a PDF is refused before the key is even looked at.
#[tokio::test]
async fn test_non_pdf_is_refused_offline() {
    let mut session = Session::from_config(ClientConfig::default()).expect("session");
    let err = session
        .upload(Upload::new("photo.png", b"\x89PNG\r\n\x1a\n".to_vec()))
        .await
        .expect_err("png is not a pdf");
    assert!(matches!(err, SmartPdfError::UnsupportedFormat { .. }));
}

/// Verifies that a callback stored as `Arc<dyn SessionProgressCallback>` can
/// be moved into a `tokio::spawn` task, as the concurrent image download does.
#[tokio::test]
async fn test_callback_send_in_tokio_spawn() {
    use std::sync::Mutex;

    struct RetryLogger {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl SessionProgressCallback for RetryLogger {
        fn on_retry(&self, _attempt: u32, _max: u32, _delay_ms: u64, error: &str) {
            self.log.lock().unwrap().push(error.to_string());
        }
    }

    let log = Arc::new(Mutex::new(vec![]));
    let cb: Arc<dyn SessionProgressCallback> = Arc::new(RetryLogger {
        log: Arc::clone(&log),
    });

    tokio::spawn(async move {
        cb.on_retry(1, 3, 500, "rate limited");
    })
    .await
    .expect("spawn must succeed");

    assert_eq!(*log.lock().unwrap(), vec!["rate limited"]);
}

/// Verify that a Noop callback compiles and does not panic.
#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();

    let cb: Arc<dyn SessionProgressCallback> = Arc::new(NoopProgressCallback);
    cb.on_job_status("job-1", "PENDING");
    cb.on_image_fetched("page_1.jpg", 1, 1);
}
