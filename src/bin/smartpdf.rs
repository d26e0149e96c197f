//! CLI binary for smart-pdf-parser.
//!
//! A thin shim over the library crate that maps CLI flags to `ClientConfig`
//! and drives a `Session`, either once (`parse`) or interactively (`shell`).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use smart_pdf_parser::config::{check_llama_key, check_openai_key, LLAMA_KEY_ENV, OPENAI_KEY_ENV};
use smart_pdf_parser::{
    ClientConfig, Document, ExportFormat, ImageBlob, InstructionKind, KeyCheck, LlamaParseClient,
    LlmTransformer, ProgressCallback, ResultType, Session, SessionProgressCallback, SessionState,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

type CliSession = Session<LlamaParseClient, LlmTransformer>;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner shown while one action is in flight.
///
/// The bar only exists between the start and complete events, so the shell
/// prompt is never drawn over.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn start(&self, prefix: &str, msg: String) {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.set_prefix(prefix.to_string());
        bar.set_message(msg);
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(old) = slot.replace(bar) {
                old.finish_and_clear();
            }
        }
    }

    fn message(&self, msg: String) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_message(msg);
            }
        }
    }

    fn println(&self, line: String) {
        let guard = self.bar.lock().ok();
        match guard.as_ref().and_then(|slot| slot.as_ref()) {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    /// Clear the spinner. Safe to call when none is running.
    fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl SessionProgressCallback for CliProgressCallback {
    fn on_upload_start(&self, file_name: &str, size: usize) {
        self.start(
            "Parsing",
            format!("uploading {file_name} ({:.1} KB)…", size as f64 / 1024.0),
        );
    }

    fn on_job_status(&self, job_id: &str, status: &str) {
        self.message(format!("job {} {}", dim(job_id), status.to_lowercase()));
    }

    fn on_image_fetched(&self, _name: &str, done: usize, total: usize) {
        self.message(format!("images {done}/{total}"));
    }

    fn on_parse_complete(&self, text_len: usize, image_count: usize) {
        self.finish();
        eprintln!(
            "{} parsed {} chars, {} images",
            green("✔"),
            bold(&text_len.to_string()),
            image_count
        );
    }

    fn on_transform_start(&self, instruction: &str, model: &str) {
        self.start("Transforming", format!("{instruction} with {model}…"));
    }

    fn on_transform_complete(&self, output_len: usize) {
        self.finish();
        eprintln!("{} {} chars generated", green("✔"), bold(&output_len.to_string()));
    }

    fn on_retry(&self, attempt: u32, max_retries: u32, delay_ms: u64, error: &str) {
        self.println(format!(
            "  {} retry {attempt}/{max_retries} in {delay_ms}ms  {}",
            yellow("↻"),
            dim(error)
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse a PDF and print the extracted Markdown
  smartpdf parse invoice.pdf

  # Summarise and download as Word and JSON
  smartpdf parse report.pdf --transform summary --format docx --format json -o out/

  # Turn an exam into a question/answer table (CSV with BOM + Excel)
  smartpdf parse exam.pdf --transform table --format csv --format xlsx

  # Free-form instruction, images saved alongside
  smartpdf parse paper.pdf --prompt "List every dataset used" --images out/img

  # Interactive session
  smartpdf shell paper.pdf

  # Verify credentials / list models
  smartpdf check-keys
  smartpdf models

ENVIRONMENT VARIABLES:
  LLAMA_CLOUD_API_KEY     LlamaParse API key (starts with llama-cloud-)
  LLAMA_CLOUD_BASE_URL    LlamaCloud endpoint (default https://api.cloud.llamaindex.ai)
  OPENAI_API_KEY          OpenAI API key
  SMARTPDF_MODEL          Chat model (default gpt-4o)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Model for the override provider
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Parse PDFs with LlamaParse, transform them with an LLM, export anywhere.
#[derive(Parser, Debug)]
#[command(
    name = "smartpdf",
    version,
    about = "Parse PDFs with LlamaParse, transform them with an LLM, export to txt/md/docx/json/csv/xlsx",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// LlamaParse API key.
    #[arg(long, global = true, env = "LLAMA_CLOUD_API_KEY", hide_env_values = true)]
    llama_key: Option<String>,

    /// LlamaCloud base URL.
    #[arg(long, global = true, env = "LLAMA_CLOUD_BASE_URL")]
    llama_base_url: Option<String>,

    /// OpenAI API key.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,

    /// Chat model ID (default gpt-4o).
    #[arg(long, global = true, env = "SMARTPDF_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "SMARTPDF_PROVIDER")]
    provider: Option<String>,

    /// Page text representation returned by the parser.
    #[arg(long, global = true, value_enum, default_value = "markdown")]
    result_type: ResultTypeArg,

    /// Do not request full-page screenshots.
    #[arg(long, global = true)]
    no_screenshots: bool,

    /// Do not download any images.
    #[arg(long, global = true)]
    no_images: bool,

    /// Parse job timeout in seconds.
    #[arg(long, global = true, env = "SMARTPDF_PARSE_TIMEOUT", default_value_t = 300)]
    parse_timeout: u64,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, global = true, env = "SMARTPDF_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Automatic retries on rate limits and outages (0 = none).
    #[arg(long, global = true, env = "SMARTPDF_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Minimum parsed characters before a transformation is allowed.
    #[arg(long, global = true, default_value_t = 100)]
    min_chars: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, default_value_t = 0.1)]
    temperature: f32,

    /// Disable the spinner.
    #[arg(long, global = true)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse one PDF, optionally transform it, and export.
    Parse(ParseArgs),
    /// Interactive session over one document at a time.
    Shell {
        /// PDF to open on start.
        input: Option<String>,
    },
    /// List the models available to the OpenAI key.
    Models,
    /// Check the format of the configured API keys (offline).
    CheckKeys,
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Local PDF path or HTTP/HTTPS URL.
    input: String,

    /// Preset transformation: summary, table, report, article.
    #[arg(short, long, value_parser = parse_instruction, conflicts_with = "prompt")]
    transform: Option<InstructionKind>,

    /// Custom transformation instruction (used as the system prompt).
    #[arg(short, long)]
    prompt: Option<String>,

    /// Export format; repeat for several. Without it the text goes to stdout.
    #[arg(short, long = "format", value_parser = parse_format)]
    formats: Vec<ExportFormat>,

    /// Directory for exported files.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Save page and embedded images into this directory.
    #[arg(long)]
    images: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ResultTypeArg {
    Markdown,
    Text,
}

impl From<ResultTypeArg> for ResultType {
    fn from(v: ResultTypeArg) -> Self {
        match v {
            ResultTypeArg::Markdown => ResultType::Markdown,
            ResultTypeArg::Text => ResultType::Text,
        }
    }
}

fn parse_instruction(s: &str) -> Result<InstructionKind, String> {
    s.parse()
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback that matters; library INFO logs only
    // show when it is off.
    let show_progress = !g.quiet && !g.no_progress;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::CheckKeys => check_keys(g),
        Command::Models => list_models(g).await,
        Command::Parse(args) => {
            let progress = show_progress.then(CliProgressCallback::new);
            let mut session = build_session(g, progress.clone())?;
            let result = run_parse(&mut session, args, g.quiet).await;
            if let Some(p) = progress {
                p.finish();
            }
            result
        }
        Command::Shell { input } => {
            let progress = show_progress.then(CliProgressCallback::new);
            let mut session = build_session(g, progress.clone())?;
            run_shell(&mut session, input.as_deref(), progress.as_deref()).await
        }
    }
}

/// Map CLI args to `ClientConfig` and open a session.
fn build_session(g: &GlobalArgs, progress: Option<Arc<CliProgressCallback>>) -> Result<CliSession> {
    let mut builder = ClientConfig::builder()
        .result_type(g.result_type.into())
        .take_screenshot(!g.no_screenshots)
        .fetch_images(!g.no_images)
        .parse_timeout_secs(g.parse_timeout)
        .request_timeout_secs(g.request_timeout)
        .max_retries(g.max_retries)
        .min_transform_chars(g.min_chars)
        .temperature(g.temperature);

    if let Some(ref key) = g.llama_key {
        builder = builder.llama_api_key(key);
    }
    if let Some(ref url) = g.llama_base_url {
        builder = builder.llama_base_url(url);
    }
    if let Some(ref key) = g.openai_key {
        builder = builder.openai_api_key(key);
    }
    if let Some(ref model) = g.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = g.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb as ProgressCallback);
    }

    let config = builder.build().context("Invalid configuration")?;
    Session::from_config(config).context("Failed to set up session")
}

// ── parse ────────────────────────────────────────────────────────────────────

async fn run_parse(session: &mut CliSession, args: &ParseArgs, quiet: bool) -> Result<()> {
    let doc = session
        .open(&args.input)
        .await
        .with_context(|| format!("Failed to parse '{}'", args.input))?;
    if !quiet {
        print_info(doc, SessionState::Parsed);
    }

    if let Some(ref dir) = args.images {
        let saved = save_images(doc, dir).await?;
        if !quiet {
            eprintln!("{} {} images → {}", green("✔"), saved, bold(&dir.display().to_string()));
        }
    }

    let instruction = match (&args.transform, &args.prompt) {
        (Some(kind), _) => Some(kind.clone()),
        (None, Some(prompt)) => Some(InstructionKind::Custom(prompt.clone())),
        (None, None) => None,
    };
    if let Some(kind) = instruction {
        let label = kind.label().to_string();
        session
            .transform(kind)
            .await
            .with_context(|| format!("Transformation '{label}' failed"))?;
    }

    if args.formats.is_empty() {
        let payload = session.export_payload()?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(payload.text.as_bytes())
            .context("Failed to write to stdout")?;
        if !payload.text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
        return Ok(());
    }

    for format in &args.formats {
        let path = session
            .export_to(*format, &args.output)
            .await
            .with_context(|| format!("Export to {format} failed"))?;
        if !quiet {
            eprintln!("{} {}", green("✔"), bold(&path.display().to_string()));
        }
    }
    Ok(())
}

// ── shell ────────────────────────────────────────────────────────────────────

const SHELL_HELP: &str = "\
Commands:
  open <path|url>          parse a new PDF (discards the current document)
  info                     document metadata and session state
  show [chars]             print the current output (transformation or parsed text)
  transform <kind>         summary | table | report | article
  prompt <instruction>     transform with a custom instruction
  export <format> [dir]    txt | md | docx | json | csv | xlsx (default dir: .)
  images <dir>             save page and embedded images
  reset                    drop the current document
  help                     this text
  quit                     leave the shell";

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    Open(String),
    Info,
    Show(Option<usize>),
    Transform(InstructionKind),
    Export(ExportFormat, PathBuf),
    Images(PathBuf),
    Reset,
    Help,
    Quit,
    Nothing,
}

fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let line = line.trim();
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };
    let required = |what: &str| required_arg(cmd, rest, what);

    match cmd.to_ascii_lowercase().as_str() {
        "" => Ok(ShellCommand::Nothing),
        "open" | "upload" => Ok(ShellCommand::Open(required("path|url")?.to_string())),
        "info" | "state" => Ok(ShellCommand::Info),
        "show" => match rest {
            "" => Ok(ShellCommand::Show(None)),
            n => n
                .parse()
                .map(|n| ShellCommand::Show(Some(n)))
                .map_err(|_| format!("not a number: '{n}'")),
        },
        "transform" => required("kind")?.parse().map(ShellCommand::Transform),
        "prompt" => Ok(ShellCommand::Transform(InstructionKind::Custom(
            required("instruction")?.to_string(),
        ))),
        "export" | "download" => {
            let mut parts = required("format")?.split_whitespace();
            let format = parts.next().unwrap_or_default().parse()?;
            let dir = parts.next().unwrap_or(".");
            Ok(ShellCommand::Export(format, PathBuf::from(dir)))
        }
        "images" => Ok(ShellCommand::Images(PathBuf::from(required("dir")?))),
        "reset" | "clear" => Ok(ShellCommand::Reset),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" | "q" => Ok(ShellCommand::Quit),
        other => Err(format!("unknown command '{other}' (try 'help')")),
    }
}

fn required_arg<'a>(cmd: &str, rest: &'a str, what: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("usage: {cmd} <{what}>"))
    } else {
        Ok(rest)
    }
}

async fn run_shell(
    session: &mut CliSession,
    input: Option<&str>,
    progress: Option<&CliProgressCallback>,
) -> Result<()> {
    eprintln!("{} {}", cyan("◆"), bold("smartpdf shell  (type 'help')"));
    if let Some(input) = input {
        run_command(session, ShellCommand::Open(input.to_string()), progress).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", dim(&format!("smartpdf [{}]>", session.state())));
        io::stderr().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        match parse_command(&line) {
            Ok(ShellCommand::Quit) => break,
            Ok(cmd) => run_command(session, cmd, progress).await,
            Err(msg) => eprintln!("{} {}", red("✘"), msg),
        }
    }
    Ok(())
}

/// Execute one command; failures are printed, never fatal.
async fn run_command(
    session: &mut CliSession,
    cmd: ShellCommand,
    progress: Option<&CliProgressCallback>,
) {
    let result = execute(session, cmd).await;
    if let Some(p) = progress {
        p.finish();
    }
    if let Err(e) = result {
        eprintln!("{} {:#}", red("✘"), e);
    }
}

async fn execute(session: &mut CliSession, cmd: ShellCommand) -> Result<()> {
    match cmd {
        ShellCommand::Open(input) => {
            let doc = session.open(&input).await?;
            print_info(doc, SessionState::Parsed);
        }
        ShellCommand::Info => match session.document() {
            Some(doc) => print_info(doc, session.state()),
            None => {
                eprintln!("State:        {}", session.state());
                if let Some(err) = session.last_error() {
                    eprintln!("Last error:   {}", red(err));
                }
            }
        },
        ShellCommand::Show(limit) => {
            let text = session.export_payload()?.text;
            match limit.and_then(|n| text.char_indices().nth(n)) {
                Some((idx, _)) => println!("{}\n{}", &text[..idx], dim("…")),
                None => println!("{text}"),
            }
        }
        ShellCommand::Transform(kind) => {
            let result = session.transform(kind).await?;
            println!("{}", result.output_text);
        }
        ShellCommand::Export(format, dir) => {
            let path = session.export_to(format, &dir).await?;
            eprintln!("{} {}", green("✔"), bold(&path.display().to_string()));
        }
        ShellCommand::Images(dir) => {
            let doc = session
                .document()
                .context("No document loaded (use 'open <path>')")?;
            let saved = save_images(doc, &dir).await?;
            eprintln!("{} {} images → {}", green("✔"), saved, bold(&dir.display().to_string()));
        }
        ShellCommand::Reset => {
            session.reset();
            eprintln!("{} session cleared", green("✔"));
        }
        ShellCommand::Help => eprintln!("{SHELL_HELP}"),
        ShellCommand::Quit | ShellCommand::Nothing => {}
    }
    Ok(())
}

fn print_info(doc: &Document, state: SessionState) {
    let s = doc.summary();
    eprintln!("File:         {}", s.file_name);
    eprintln!("State:        {}", state);
    eprintln!("Size:         {:.1} KB", s.size_bytes as f64 / 1024.0);
    eprintln!("Characters:   {}", s.text_chars);
    eprintln!("Language:     {}", s.language);
    eprintln!("Tables:       {}", if s.has_tables { "yes" } else { "no" });
    eprintln!("Images:       {}", if s.has_images { "yes" } else { "no" });
    eprintln!("Page images:  {}", s.page_images);
    eprintln!("Embedded:     {}", s.embedded_images);
    if let Some(ref t) = s.transform {
        eprintln!("Transform:    {}", t);
    }
}

/// Write every page and embedded image into `dir`; returns the count.
async fn save_images(doc: &Document, dir: &Path) -> Result<usize> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let pages = doc.page_images.iter().map(|b| ("page", b));
    let embedded = doc.embedded_images.iter().map(|b| ("embedded", b));
    let mut count = 0;
    for (i, (kind, blob)) in pages.chain(embedded).enumerate() {
        let path = dir.join(image_file_name(kind, i + 1, blob));
        tokio::fs::write(&path, &blob.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        count += 1;
    }
    Ok(count)
}

/// `{kind}_{index}_{stem}.{ext}`; the running index keeps names unique.
fn image_file_name(kind: &str, index: usize, blob: &ImageBlob) -> String {
    let stem = Path::new(&blob.name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());
    format!("{kind}_{index:03}_{stem}.{}", blob.extension())
}

// ── check-keys / models ──────────────────────────────────────────────────────

fn check_keys(g: &GlobalArgs) -> Result<()> {
    let checks = [
        (LLAMA_KEY_ENV, check_llama_key(g.llama_key.as_deref())),
        (OPENAI_KEY_ENV, check_openai_key(g.openai_key.as_deref())),
    ];
    let mut invalid = 0;
    for (name, check) in &checks {
        match check {
            KeyCheck::Ok => eprintln!("{} {name}", green("✔")),
            KeyCheck::Suspicious(why) => eprintln!("{} {name}: {why}", yellow("⚠")),
            KeyCheck::Invalid(why) => {
                invalid += 1;
                eprintln!("{} {name}: {why}", red("✘"));
            }
        }
    }
    if invalid > 0 {
        anyhow::bail!("{invalid} key(s) invalid");
    }
    Ok(())
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

async fn list_models(g: &GlobalArgs) -> Result<()> {
    let key = g
        .openai_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .with_context(|| format!("{OPENAI_KEY_ENV} is not set"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(g.request_timeout))
        .build()
        .context("Failed to build HTTP client")?;
    let response = client
        .get("https://api.openai.com/v1/models")
        .bearer_auth(key.trim())
        .send()
        .await
        .context("Failed to reach the OpenAI API")?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI API returned HTTP {status}: {}", body.trim());
    }
    let list: ModelList = response.json().await.context("Malformed model list")?;

    let mut ids: Vec<String> = list.data.into_iter().map(|m| m.id).collect();
    ids.sort();
    for id in &ids {
        println!("{id}");
    }
    eprintln!("{}", dim(&format!("{} models", ids.len())));
    Ok(())
}
