//! The generative-model capability and its `edgequake-llm` implementation.
//!
//! Everything the pipeline asks of a model goes through one operation,
//! [`SummarizerBackend::complete`]: a prompt plus zero or more base64 PNG
//! images in, trimmed prose out. Yes/no questions are decoded into `bool` at
//! this boundary by [`ask_yes_no`] so nothing downstream compares strings.
//!
//! ## Provider resolution
//!
//! [`LlmBackend::from_config`] follows the same fallback chain as the rest of
//! the edgequake tooling:
//!
//! 1. a pre-built `Arc<dyn LLMProvider>` in the config,
//! 2. a named provider (`--provider anthropic`) with an optional model,
//! 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set,
//! 4. `ProviderFactory::from_env()` auto-detection.

use crate::config::DigestConfig;
use crate::error::{BackendError, DigestError};
use crate::retry::{run_with_retry, Attempted, RetryPolicy};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default model when a provider is named without one.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// A generative model that can read slide images.
#[async_trait]
pub trait SummarizerBackend: Send + Sync {
    /// Send `prompt` with `images` (base64 PNG) and return the generated text.
    ///
    /// Must distinguish throttling ([`BackendError::RateLimited`]) from every
    /// other failure ([`BackendError::Failed`]).
    async fn complete(&self, prompt: &str, images: &[String]) -> Result<String, BackendError>;
}

/// Decode a yes/no reply. Only an exact `"yes"` is true.
///
/// Anything outside the `yes`/`no` vocabulary is logged as an anomaly and
/// read as `false`.
pub fn decode_yes_no(reply: &str, context: &str) -> bool {
    match reply.trim() {
        "yes" => true,
        "no" => false,
        other => {
            warn!("{}: unexpected classifier reply {:?}, treating as \"no\"", context, other);
            false
        }
    }
}

/// Ask a yes/no question about one image, with retry.
pub async fn ask_yes_no(
    backend: &dyn SummarizerBackend,
    policy: &RetryPolicy,
    image: &str,
    prompt: &str,
    context: &str,
) -> Attempted<bool> {
    let images = [image.to_string()];
    let attempted = run_with_retry(policy, context, || backend.complete(prompt, &images)).await;
    Attempted {
        outcome: attempted.outcome.map(|reply| decode_yes_no(&reply, context)),
        attempts: attempted.attempts,
        delays: attempted.delays,
    }
}

/// [`SummarizerBackend`] over any `edgequake-llm` provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &DigestConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the provider from the config / environment and wrap it.
    pub fn from_config(config: &DigestConfig) -> Result<Self, DigestError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
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
impl SummarizerBackend for LlmBackend {
    async fn complete(&self, prompt: &str, images: &[String]) -> Result<String, BackendError> {
        let images: Vec<ImageData> = images
            .iter()
            .map(|b64| ImageData::new(b64.clone(), "image/png"))
            .collect();
        let image_count = images.len();
        let messages = vec![ChatMessage::user_with_images(prompt, images)];
        let options = self.build_options();

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| {
                BackendError::Failed(format!("timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        debug!(
            "VLM call: {} images, {} input tokens, {} output tokens",
            image_count, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content.trim().to_string())
    }
}

/// Map a provider error message onto the retry taxonomy.
///
/// Providers report throttling as HTTP 429, "rate limit" or (Anthropic)
/// "overloaded"; all of those are worth backing off for.
fn classify_provider_error(message: &str) -> BackendError {
    let lower = message.to_lowercase();
    let throttled = lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("ratelimit")
        || lower.contains("429")
        || lower.contains("overloaded")
        || lower.contains("too many requests");
    if throttled {
        BackendError::RateLimited(message.to_string())
    } else {
        BackendError::Failed(message.to_string())
    }
}

fn default_model_for(provider_name: &str) -> &'static str {
    if provider_name.eq_ignore_ascii_case("anthropic") {
        DEFAULT_ANTHROPIC_MODEL
    } else {
        DEFAULT_MODEL
    }
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DigestError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DigestError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn resolve_provider(config: &DigestConfig) -> Result<Arc<dyn LLMProvider>, DigestError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config
            .model
            .as_deref()
            .unwrap_or_else(|| default_model_for(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DigestError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<Result<String, BackendError>>>);

    #[async_trait]
    impl SummarizerBackend for Scripted {
        async fn complete(&self, _prompt: &str, _images: &[String]) -> Result<String, BackendError> {
            self.0.lock().unwrap().remove(0)
        }
    }

    #[test]
    fn only_exact_yes_is_true() {
        assert!(decode_yes_no("yes", "t"));
        assert!(decode_yes_no("  yes\n", "t"));
        assert!(!decode_yes_no("no", "t"));
        assert!(!decode_yes_no("Yes", "t"));
        assert!(!decode_yes_no("yes.", "t"));
        assert!(!decode_yes_no("I think yes", "t"));
    }

    #[test]
    fn throttling_messages_are_rate_limits() {
        assert!(classify_provider_error("HTTP 429 Too Many Requests").is_rate_limit());
        assert!(classify_provider_error("Rate limit exceeded").is_rate_limit());
        assert!(classify_provider_error("overloaded_error: Overloaded").is_rate_limit());
        assert!(!classify_provider_error("invalid api key").is_rate_limit());
    }

    #[test]
    fn anthropic_gets_a_claude_default() {
        assert_eq!(default_model_for("anthropic"), DEFAULT_ANTHROPIC_MODEL);
        assert_eq!(default_model_for("openai"), DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn ask_yes_no_decodes_after_failure() {
        let backend = Scripted(Mutex::new(vec![Ok("Maybe".into())]));
        let a = ask_yes_no(&backend, &RetryPolicy::default(), "img", "q?", "slide 1").await;
        assert_eq!(a.outcome, Ok(false));

        let backend = Scripted(Mutex::new(vec![Err(BackendError::Failed("boom".into()))]));
        let a = ask_yes_no(&backend, &RetryPolicy::default(), "img", "q?", "slide 1").await;
        assert!(a.outcome.is_err());
        assert_eq!(a.attempts, 1);
    }
}
