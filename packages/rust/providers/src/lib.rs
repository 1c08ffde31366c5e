//! Completion providers and the registry that resolves them.
//!
//! This crate provides:
//! - [`Provider`] — the single contract every backend exposes upward:
//!   `invoke(prompt, opts) -> trimmed completion text`
//! - [`ProviderKind`] — the enumerated transports (OpenAI-compatible chat,
//!   Anthropic messages, Gemini generateContent, local Ollama generate)
//! - [`ProviderRegistry`] — resolves a provider name to a ready client or
//!   "unavailable", from layered credential/config lookup

mod anthropic;
mod gemini;
mod http;
mod ollama;
mod openai;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use quillpin_shared::ProviderError;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatibleProvider;
pub use registry::{ProviderOverrides, ProviderRegistry, ResolvedProvider};

/// System instruction sent with every request that supports one.
pub(crate) const SYSTEM_PROMPT: &str = "You are a professional blog content editor who excels at optimizing article content and generating metadata. Always respond in the same language as the input content.";

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Wire protocol family of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAiCompatible,
    Anthropic,
    GeminiStyle,
    LocalInference,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAiCompatible => "openai_compatible",
            Self::Anthropic => "anthropic",
            Self::GeminiStyle => "gemini",
            Self::LocalInference => "local",
        }
    }

    /// Whether calls need a credential to be attempted at all.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, Self::LocalInference)
    }

    /// Constructor for this kind's transport.
    pub(crate) fn constructor(&self) -> Constructor {
        match self {
            Self::OpenAiCompatible => build_openai,
            Self::Anthropic => build_anthropic,
            Self::GeminiStyle => build_gemini,
            Self::LocalInference => build_ollama,
        }
    }
}

fn build_openai(cfg: ProviderConfig, client: reqwest::Client) -> Arc<dyn Provider> {
    Arc::new(OpenAiCompatibleProvider::new(cfg, client))
}

fn build_anthropic(cfg: ProviderConfig, client: reqwest::Client) -> Arc<dyn Provider> {
    Arc::new(AnthropicProvider::new(cfg, client))
}

fn build_gemini(cfg: ProviderConfig, client: reqwest::Client) -> Arc<dyn Provider> {
    Arc::new(GeminiProvider::new(cfg, client))
}

fn build_ollama(cfg: ProviderConfig, client: reqwest::Client) -> Arc<dyn Provider> {
    Arc::new(OllamaProvider::new(cfg, client))
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) type Constructor = fn(ProviderConfig, reqwest::Client) -> Arc<dyn Provider>;

// ---------------------------------------------------------------------------
// Config + options
// ---------------------------------------------------------------------------

/// Fully resolved settings for one provider. Immutable once built.
#[derive(Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub credential: Option<String>,
    pub base_url: Url,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url.as_str())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ProviderConfig {
    /// `<base_url>/<path>` without doubling slashes.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Per-call options. Unset fields fall back to the provider's config.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Options with every field filled in from the provider config.
pub(crate) struct EffectiveOptions<'a> {
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl InvokeOptions {
    pub(crate) fn effective<'a>(&'a self, config: &'a ProviderConfig) -> EffectiveOptions<'a> {
        EffectiveOptions {
            model: self.model.as_deref().unwrap_or(&config.model),
            temperature: self.temperature.unwrap_or(config.temperature),
            max_tokens: self.max_output_tokens.unwrap_or(config.max_tokens),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A completion backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name (`openai`, `deepseek`, `anthropic`, `gemini`, `ollama`).
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Default model used when the call does not override it.
    fn model(&self) -> &str;

    /// Run one completion and return the trimmed text.
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, ProviderError>;
}

/// Trim a completion and reject empty output.
pub(crate) fn finish_text(provider: &str, text: Option<String>) -> Result<String, ProviderError> {
    match text.map(|t| t.trim().to_string()) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(ProviderError::MalformedResponse {
            provider: provider.to_string(),
            message: "response contained no completion text".into(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn config(kind: ProviderKind, name: &str, base_url: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.into(),
            kind,
            credential: Some("test-key".into()),
            base_url: Url::parse(base_url).expect("valid url"),
            model: "test-model".into(),
            temperature: 0.7,
            max_tokens: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_credential() {
        let cfg = test_support::config(ProviderKind::Anthropic, "anthropic", "https://x.test");
        let text = format!("{cfg:?}");
        assert!(!text.contains("test-key"));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn endpoint_joins_cleanly() {
        let cfg = test_support::config(ProviderKind::OpenAiCompatible, "openai", "https://x.test/v1/");
        assert_eq!(cfg.endpoint("/chat/completions"), "https://x.test/v1/chat/completions");
    }

    #[test]
    fn options_fall_back_to_config() {
        let cfg = test_support::config(ProviderKind::GeminiStyle, "gemini", "https://x.test");
        let opts = InvokeOptions {
            temperature: Some(0.1),
            ..Default::default()
        };
        let eff = opts.effective(&cfg);
        assert_eq!(eff.model, "test-model");
        assert_eq!(eff.temperature, 0.1);
        assert_eq!(eff.max_tokens, 256);
    }

    #[test]
    fn finish_text_trims_and_rejects_empty() {
        assert_eq!(finish_text("p", Some("  hi \n".into())).unwrap(), "hi");
        assert!(matches!(
            finish_text("p", Some("   ".into())),
            Err(ProviderError::MalformedResponse { .. })
        ));
        assert!(finish_text("p", None).is_err());
    }

    #[test]
    fn only_local_inference_skips_credentials() {
        assert!(ProviderKind::OpenAiCompatible.requires_credential());
        assert!(!ProviderKind::LocalInference.requires_credential());
    }
}
