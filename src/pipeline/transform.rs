//! Transform Client: one chat completion per instruction.
//!
//! The request is two messages: the instruction's system prompt from
//! [`crate::prompts`] and the full parsed text as the user turn. The answer
//! goes through [`super::postprocess::clean_output`] before it is returned.
//!
//! ## Provider Resolution
//!
//! From most to least specific:
//!
//! 1. a pre-built provider in [`ClientConfig::provider`]
//! 2. a named provider in [`ClientConfig::provider_name`]
//! 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` both set in the environment
//! 4. OpenAI, when an OpenAI key is configured
//!
//! An OpenAI provider (step 2 naming `openai`, or step 4) is built with the
//! key from [`ClientConfig::openai_api_key`], falling back to
//! `OPENAI_API_KEY`.
//!
//! With none of these the transform fails with `AuthError` before any
//! request is made.

use super::postprocess::clean_output;
use super::with_retry;
use crate::config::{ClientConfig, OPENAI_KEY_ENV};
use crate::document::InstructionKind;
use crate::error::SmartPdfError;
use crate::prompts::system_prompt_for;
use edgequake_llm::{
    ChatMessage, CompletionOptions, LLMProvider, OpenAIProvider, ProviderFactory,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Service name used in errors and logs.
pub const SERVICE: &str = "OpenAI";

/// A text transformation backend.
///
/// Returns the cleaned model answer. Implementations must not be called with
/// text that fails [`check_input`]; the session controller guarantees this.
pub trait TransformService: Send + Sync {
    fn transform(
        &self,
        text: &str,
        instruction: &InstructionKind,
    ) -> impl Future<Output = Result<String, SmartPdfError>> + Send;
}

/// Reject blank text and text below `min_chars` characters.
pub fn check_input(text: &str, min_chars: usize) -> Result<(), SmartPdfError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SmartPdfError::EmptyInput);
    }
    let len = trimmed.chars().count();
    if len < min_chars {
        return Err(SmartPdfError::TextTooShort {
            len,
            min: min_chars,
        });
    }
    Ok(())
}

/// [`TransformService`] backed by an `edgequake-llm` chat provider.
pub struct LlmTransformer {
    config: ClientConfig,
}

impl std::fmt::Debug for LlmTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmTransformer")
            .field("model", &self.config.effective_model())
            .finish()
    }
}

impl LlmTransformer {
    /// Provider resolution is deferred to the first transform, so a session
    /// without an OpenAI key can still parse and export.
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    fn provider(&self) -> Result<Arc<dyn LLMProvider>, SmartPdfError> {
        resolve_provider(&self.config)
    }
}

impl TransformService for LlmTransformer {
    async fn transform(
        &self,
        text: &str,
        instruction: &InstructionKind,
    ) -> Result<String, SmartPdfError> {
        check_input(text, self.config.min_transform_chars)?;
        let provider = self.provider()?;
        let model = self.config.effective_model();

        info!(
            "Transforming {} chars with '{}' ({})",
            text.len(),
            instruction.label(),
            model
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_transform_start(instruction.label(), model);
        }

        let messages = build_messages(text, instruction);
        let options = build_options(&self.config);
        let start = Instant::now();

        let provider = &provider;
        let messages = &messages;
        let options = &options;
        let response = with_retry(&self.config, "transform", move || async move {
            provider
                .chat(messages, Some(options))
                .await
                .map_err(|e| classify_llm_error(&e.to_string()))
        })
        .await?;

        debug!(
            "Transform: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let output = clean_output(&response.content);
        if output.is_empty() {
            return Err(SmartPdfError::LlmApiError {
                message: "model returned an empty answer".to_string(),
            });
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_transform_complete(output.len());
        }
        Ok(output)
    }
}

/// System prompt for the instruction, then the document text.
fn build_messages(text: &str, instruction: &InstructionKind) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt_for(instruction)),
        ChatMessage::user(text),
    ]
}

fn build_options(config: &ClientConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: config.max_tokens,
        ..Default::default()
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, SmartPdfError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        SmartPdfError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn resolve_provider(config: &ClientConfig) -> Result<Arc<dyn LLMProvider>, SmartPdfError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.effective_model();
    if let Some(ref name) = config.provider_name {
        if name.eq_ignore_ascii_case("openai") {
            if let Some(key) = openai_key(config) {
                return Ok(openai_provider(key, model));
            }
        }
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    match openai_key(config) {
        Some(key) => Ok(openai_provider(key, model)),
        None => Err(SmartPdfError::AuthError {
            service: SERVICE.to_string(),
            detail: format!("{OPENAI_KEY_ENV} is not set"),
        }),
    }
}

/// The configured OpenAI key, else `OPENAI_API_KEY`; blank counts as unset.
fn openai_key(config: &ClientConfig) -> Option<String> {
    config
        .openai_api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(OPENAI_KEY_ENV)
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        })
}

fn openai_provider(key: String, model: &str) -> Arc<dyn LLMProvider> {
    debug!("Using OpenAI provider with model {}", model);
    Arc::new(OpenAIProvider::new(key).with_model(model))
}

/// Map a provider error message onto the error taxonomy.
///
/// Providers surface HTTP failures as text, so the status and the usual
/// phrases are matched case-insensitively.
fn classify_llm_error(message: &str) -> SmartPdfError {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["401", "403", "unauthorized", "invalid api key", "incorrect api key", "authentication"]) {
        SmartPdfError::AuthError {
            service: SERVICE.to_string(),
            detail: message.to_string(),
        }
    } else if has(&["429", "rate limit", "rate_limit", "too many requests"]) {
        SmartPdfError::RateLimited {
            service: SERVICE.to_string(),
            retry_after_secs: None,
        }
    } else if has(&[
        "500", "502", "503", "504", "timed out", "timeout", "connection", "overloaded",
        "unavailable",
    ]) {
        SmartPdfError::ServiceUnavailable {
            service: SERVICE.to_string(),
            detail: message.to_string(),
        }
    } else {
        SmartPdfError::LlmApiError {
            message: message.to_string(),
        }
    }
}
