//! Client configuration for the parse and transform services.
//!
//! All service behaviour is controlled through [`ClientConfig`], built via
//! [`ClientConfigBuilder`] or [`ClientConfig::from_env`]. The two credentials
//! (parse-service key and LLM key) live here alongside the HTTP and retry
//! knobs so the session controller can be handed a single value.

use crate::error::SmartPdfError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Environment variable holding the LlamaCloud API key.
pub const LLAMA_KEY_ENV: &str = "LLAMA_CLOUD_API_KEY";
/// Environment variable holding the OpenAI API key.
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable overriding the transform model.
pub const MODEL_ENV: &str = "SMARTPDF_MODEL";
/// Environment variable overriding the LlamaCloud endpoint.
pub const LLAMA_BASE_URL_ENV: &str = "LLAMA_CLOUD_BASE_URL";

/// Default LlamaCloud endpoint.
pub const DEFAULT_LLAMA_BASE_URL: &str = "https://api.cloud.llamaindex.ai";
/// Default chat model for transformations.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration shared by [`crate::pipeline::parse::LlamaParseClient`] and
/// [`crate::pipeline::transform::LlmTransformer`].
///
/// # Example
/// ```rust
/// use smart_pdf_parser::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .llama_api_key("llama-cloud-abc")
///     .model("gpt-4o-mini")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// LlamaCloud API key. `None` makes every parse fail with `AuthError`.
    pub llama_api_key: Option<String>,

    /// LlamaCloud base URL. Default: [`DEFAULT_LLAMA_BASE_URL`].
    pub llama_base_url: String,

    /// Which page text the parse result uses. Default: Markdown.
    pub result_type: ResultType,

    /// Ask the parse service for full-page screenshots. Default: true.
    pub take_screenshot: bool,

    /// Download page and embedded images after parsing. Default: true.
    pub fetch_images: bool,

    /// Parallel image downloads per parse. Default: 4.
    pub image_concurrency: usize,

    /// Delay between job status polls. Default: 1000 ms.
    pub poll_interval_ms: u64,

    /// Give up waiting on a parse job after this many seconds. Default: 300.
    pub parse_timeout_secs: u64,

    /// Per-request HTTP timeout. Default: 120 s.
    pub request_timeout_secs: u64,

    /// OpenAI API key. Falls back to `OPENAI_API_KEY` when `None`.
    pub openai_api_key: Option<String>,

    /// Chat model identifier. Default: [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Named provider (`openai`, `anthropic`, `gemini`, `ollama`, …).
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over everything else.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum output tokens for a transformation. `None` = provider default.
    pub max_tokens: Option<usize>,

    /// Parsed text shorter than this is not sent for transformation. Default: 100.
    pub min_transform_chars: usize,

    /// Automatic retries for rate-limited or unavailable services. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay, doubled after each attempt. Default: 500 ms.
    pub retry_backoff_ms: u64,

    /// Optional status callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            llama_api_key: None,
            llama_base_url: DEFAULT_LLAMA_BASE_URL.to_string(),
            result_type: ResultType::default(),
            take_screenshot: true,
            fetch_images: true,
            image_concurrency: 4,
            poll_interval_ms: 1000,
            parse_timeout_secs: 300,
            request_timeout_secs: 120,
            openai_api_key: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: None,
            min_transform_chars: 100,
            max_retries: 0,
            retry_backoff_ms: 500,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("llama_api_key", &redact(self.llama_api_key.as_deref()))
            .field("llama_base_url", &self.llama_base_url)
            .field("result_type", &self.result_type)
            .field("take_screenshot", &self.take_screenshot)
            .field("fetch_images", &self.fetch_images)
            .field("image_concurrency", &self.image_concurrency)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("parse_timeout_secs", &self.parse_timeout_secs)
            .field("openai_api_key", &redact(self.openai_api_key.as_deref()))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("min_transform_chars", &self.min_transform_chars)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

fn redact(key: Option<&str>) -> Option<&'static str> {
    key.map(|_| "<redacted>")
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overlaid with `LLAMA_CLOUD_API_KEY`, `OPENAI_API_KEY`,
    /// `SMARTPDF_MODEL` and `LLAMA_CLOUD_BASE_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.llama_api_key = non_empty_env(LLAMA_KEY_ENV);
        config.openai_api_key = non_empty_env(OPENAI_KEY_ENV);
        config.model = non_empty_env(MODEL_ENV);
        if let Some(url) = non_empty_env(LLAMA_BASE_URL_ENV) {
            config.llama_base_url = url;
        }
        config
    }

    /// The model actually used for transformations.
    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// The retry delay before `attempt` (1-based), doubling each time.
    pub fn backoff_for(&self, attempt: u32) -> u64 {
        self.retry_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn llama_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.llama_api_key = Some(key.into());
        self
    }

    pub fn llama_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.llama_base_url = url.into();
        self
    }

    pub fn result_type(mut self, rt: ResultType) -> Self {
        self.config.result_type = rt;
        self
    }

    pub fn take_screenshot(mut self, v: bool) -> Self {
        self.config.take_screenshot = v;
        self
    }

    pub fn fetch_images(mut self, v: bool) -> Self {
        self.config.fetch_images = v;
        self
    }

    pub fn image_concurrency(mut self, n: usize) -> Self {
        self.config.image_concurrency = n.max(1);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn parse_timeout_secs(mut self, secs: u64) -> Self {
        self.config.parse_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.openai_api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn min_transform_chars(mut self, n: usize) -> Self {
        self.config.min_transform_chars = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, SmartPdfError> {
        let c = &self.config;
        if !c.llama_base_url.starts_with("http://") && !c.llama_base_url.starts_with("https://") {
            return Err(SmartPdfError::InvalidConfig(format!(
                "LlamaCloud base URL must be http(s), got '{}'",
                c.llama_base_url
            )));
        }
        if c.poll_interval_ms == 0 {
            return Err(SmartPdfError::InvalidConfig(
                "Poll interval must be ≥ 1 ms".into(),
            ));
        }
        if c.parse_timeout_secs == 0 || c.request_timeout_secs == 0 {
            return Err(SmartPdfError::InvalidConfig(
                "Timeouts must be ≥ 1 s".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which representation of each page the parse service returns as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    /// GFM Markdown (tables and image references preserved). (default)
    #[default]
    Markdown,
    /// Plain text.
    Text,
}

impl ResultType {
    /// Name used by the parsing API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::Markdown => "markdown",
            ResultType::Text => "text",
        }
    }
}

// ── Credential format checks ─────────────────────────────────────────────

/// Outcome of a local (offline) credential format check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCheck {
    /// The key has the expected shape.
    Ok,
    /// The key is unusual but may still work.
    Suspicious(String),
    /// The key is missing or cannot be valid.
    Invalid(String),
}

/// LlamaCloud keys always carry the `llama-cloud-` prefix.
pub fn check_llama_key(key: Option<&str>) -> KeyCheck {
    match key.map(str::trim) {
        None | Some("") => KeyCheck::Invalid(format!("{LLAMA_KEY_ENV} is not set")),
        Some(k) if !k.starts_with("llama-cloud-") => {
            KeyCheck::Invalid("key should start with 'llama-cloud-'".to_string())
        }
        Some(_) => KeyCheck::Ok,
    }
}

/// OpenAI keys normally start with `sk-` (or `org-` for legacy org tokens).
pub fn check_openai_key(key: Option<&str>) -> KeyCheck {
    match key.map(str::trim) {
        None | Some("") => KeyCheck::Invalid(format!("{OPENAI_KEY_ENV} is not set")),
        Some(k) if !k.starts_with("sk-") && !k.starts_with("org-") => {
            KeyCheck::Suspicious("key format looks unusual".to_string())
        }
        Some(_) => KeyCheck::Ok,
    }
}
