//! The topic oracle: an external classifier behind a trait.
//!
//! The pipeline only depends on [`TopicOracle`]. Production runs use
//! [`LlmOracle`], a thin wrapper over an `edgequake-llm` provider; tests plug
//! in a scripted stub through [`crate::config::TocConfigBuilder::oracle`].
//! Reply parsing and retries live in [`crate::pipeline::classify`] so an
//! oracle implementation only moves text.

use crate::config::{ConsolidationMode, TocConfig};
use crate::error::TocError;
use crate::prompts::{prior_topic_context, system_prompt_for};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// One classification request: a window (batch) or a page (streaming).
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    pub unit_index: usize,
    pub window_text: &'a str,
    /// Last accepted topic label; only sent in streaming mode.
    pub prior_topic_label: Option<&'a str>,
    pub mode: ConsolidationMode,
}

/// Raw oracle reply, before any parsing.
#[derive(Debug, Clone, Default)]
pub struct OracleReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl OracleReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Why an oracle call failed.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// Quota or rate limit hit; retry after a pause.
    #[error("rate limited: {detail}")]
    RateLimited {
        detail: String,
        retry_after_secs: Option<u64>,
    },

    /// Credentials rejected. Retrying cannot help.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network or provider failure.
    #[error("{0}")]
    Transport(String),
}

impl OracleError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, OracleError::Auth(_))
    }

    /// Sort a provider error message into a failure class.
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();
        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("invalid api key")
        {
            OracleError::Auth(msg)
        } else if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("quota")
            || lower.contains("resource exhausted")
        {
            OracleError::RateLimited {
                retry_after_secs: retry_after_hint(&lower),
                detail: msg,
            }
        } else {
            OracleError::Transport(msg)
        }
    }
}

/// `retry-after: 7`, `try again in 20s`, `retry in 340ms`.
static RE_RETRY_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:retry[- ]after|try again in|retry in)[:=\s]*(\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?)?\b",
    )
    .unwrap()
});

/// Wait the provider asked for, in whole seconds rounded up.
fn retry_after_hint(lowered: &str) -> Option<u64> {
    let caps = RE_RETRY_AFTER.captures(lowered)?;
    let value: f64 = caps[1].parse().ok()?;
    let secs = match caps.get(2).map(|m| m.as_str()) {
        Some(unit) if unit.starts_with("ms") || unit.starts_with("milli") => value / 1000.0,
        _ => value,
    };
    Some(secs.ceil() as u64)
}

/// Classifies transcript text into topic boundaries.
#[async_trait]
pub trait TopicOracle: Send + Sync {
    async fn classify(&self, request: &OracleRequest<'_>) -> Result<OracleReply, OracleError>;
}

/// [`TopicOracle`] backed by an LLM chat provider.
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    system_prompt: Option<String>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        let defaults = TocConfig::default();
        Self {
            provider,
            system_prompt: None,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &TocConfig) -> Self {
        Self {
            provider,
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Message layout: system prompt, prior topic (streaming only), then the
    /// window text as the user turn.
    fn build_messages(&self, request: &OracleRequest<'_>) -> Vec<ChatMessage> {
        let system_prompt = self
            .system_prompt
            .as_deref()
            .unwrap_or_else(|| system_prompt_for(request.mode));

        let mut messages = vec![ChatMessage::system(system_prompt)];
        if request.mode == ConsolidationMode::Streaming {
            messages.push(ChatMessage::system(prior_topic_context(
                request.prior_topic_label,
            )));
        }
        messages.push(ChatMessage::user(request.window_text));
        messages
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TopicOracle for LlmOracle {
    async fn classify(&self, request: &OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        let messages = self.build_messages(request);
        let options = self.build_options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| OracleError::from_message(e.to_string()))?;

        debug!(
            "Unit {}: {} input tokens, {} output tokens",
            request.unit_index, response.prompt_tokens, response.completion_tokens
        );

        Ok(OracleReply {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

// ── Resolution ───────────────────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, TocError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TocError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`])
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. [`ProviderFactory::from_env`] auto-detection
fn resolve_provider(config: &TocConfig) -> Result<Arc<dyn LLMProvider>, TocError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TocError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// The oracle for a run. An explicit `config.oracle` always wins.
pub fn resolve_oracle(config: &TocConfig) -> Result<Arc<dyn TopicOracle>, TocError> {
    if let Some(ref oracle) = config.oracle {
        return Ok(Arc::clone(oracle));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(LlmOracle::from_config(provider, config)))
}
