//! Provider name → ready client, with layered setting resolution.
//!
//! Each setting (credential, base URL, model) resolves in this order, first
//! non-blank value winning:
//!
//! 1. explicit call-site override ([`ProviderOverrides`])
//! 2. the provider's own environment variable (`OPENAI_API_KEY`, ...)
//! 3. the generic `QUILLPIN_*` environment fallback
//! 4. the config file (`[ai.providers.<name>]`)
//! 5. the built-in default
//!
//! Resolution reads the environment on every call, so a failed resolution is
//! never cached.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use reqwest::Client;
use tracing::debug;
use url::Url;

use quillpin_shared::{AiConfig, ProviderSettings, QuillpinError, Result};

use crate::{Provider, ProviderConfig, ProviderKind, http};

pub const GENERIC_API_KEY_ENV: &str = "QUILLPIN_API_KEY";
pub const GENERIC_BASE_URL_ENV: &str = "QUILLPIN_BASE_URL";
pub const GENERIC_MODEL_ENV: &str = "QUILLPIN_MODEL";

// ---------------------------------------------------------------------------
// Built-in table
// ---------------------------------------------------------------------------

struct BuiltIn {
    name: &'static str,
    kind: ProviderKind,
    key_envs: &'static [&'static str],
    base_url_env: &'static str,
    base_url: &'static str,
    model_env: &'static str,
    model: &'static str,
}

const BUILT_INS: &[BuiltIn] = &[
    BuiltIn {
        name: "openai",
        kind: ProviderKind::OpenAiCompatible,
        key_envs: &["OPENAI_API_KEY"],
        base_url_env: "OPENAI_BASE_URL",
        base_url: "https://api.openai.com/v1",
        model_env: "OPENAI_MODEL",
        model: "gpt-4",
    },
    BuiltIn {
        name: "deepseek",
        kind: ProviderKind::OpenAiCompatible,
        key_envs: &["DEEPSEEK_API_KEY"],
        base_url_env: "DEEPSEEK_BASE_URL",
        base_url: "https://api.siliconflow.cn/v1",
        model_env: "DEEPSEEK_MODEL",
        model: "deepseek-chat",
    },
    BuiltIn {
        name: "anthropic",
        kind: ProviderKind::Anthropic,
        key_envs: &["ANTHROPIC_API_KEY"],
        base_url_env: "ANTHROPIC_BASE_URL",
        base_url: "https://api.anthropic.com",
        model_env: "ANTHROPIC_MODEL",
        model: "claude-3-sonnet-20240229",
    },
    BuiltIn {
        name: "gemini",
        kind: ProviderKind::GeminiStyle,
        key_envs: &["GEMINI_API_KEY", "Gemini_API_KEY"],
        base_url_env: "GEMINI_BASE_URL",
        base_url: "https://generativelanguage.googleapis.com",
        model_env: "GEMINI_MODEL",
        model: "gemini-2.5-flash",
    },
    BuiltIn {
        name: "ollama",
        kind: ProviderKind::LocalInference,
        key_envs: &[],
        base_url_env: "OLLAMA_BASE_URL",
        base_url: "http://localhost:11434",
        model_env: "OLLAMA_MODEL",
        model: "llama2",
    },
];

fn built_in(name: &str) -> Option<&'static BuiltIn> {
    BUILT_INS.iter().find(|b| b.name == name)
}

/// Names the registry knows how to build.
pub fn known_providers() -> impl Iterator<Item = &'static str> {
    BUILT_INS.iter().map(|b| b.name)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Explicit call-site settings. Highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ProviderOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Outcome of [`ProviderRegistry::resolve`].
pub enum ResolvedProvider {
    Available(Arc<dyn Provider>),
    Unavailable { name: String, reason: String },
}

impl ResolvedProvider {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Turn "unavailable" into a configuration error.
    pub fn into_result(self) -> Result<Arc<dyn Provider>> {
        match self {
            Self::Available(p) => Ok(p),
            Self::Unavailable { name, reason } => Err(QuillpinError::config(format!(
                "provider '{name}' is unavailable: {reason}"
            ))),
        }
    }
}

impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(p) => f
                .debug_tuple("Available")
                .field(&format_args!("{} ({}, {})", p.name(), p.kind(), p.model()))
                .finish(),
            Self::Unavailable { name, reason } => f
                .debug_struct("Unavailable")
                .field("name", name)
                .field("reason", reason)
                .finish(),
        }
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Built once per process and passed by reference.
#[derive(Clone)]
pub struct ProviderRegistry {
    client: Client,
    settings: BTreeMap<String, ProviderSettings>,
    temperature: f32,
    max_tokens: u32,
    env: EnvLookup,
}

impl ProviderRegistry {
    /// Registry reading the process environment.
    pub fn new(ai: &AiConfig) -> Result<Self> {
        Self::with_env(ai, quillpin_shared::env_var)
    }

    /// Registry with a custom environment lookup.
    pub fn with_env<F>(ai: &AiConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Ok(Self {
            client: http::build_client()?,
            settings: ai.providers.clone(),
            temperature: ai.temperature,
            max_tokens: ai.max_tokens,
            env: Arc::new(lookup),
        })
    }

    /// Resolve `name` into a ready provider, or explain why it is unavailable.
    pub fn resolve(&self, name: &str, overrides: &ProviderOverrides) -> ResolvedProvider {
        let name = name.trim().to_ascii_lowercase();
        match self.resolve_config(&name, overrides) {
            Ok(config) => {
                debug!(
                    provider = %config.name,
                    kind = %config.kind,
                    model = %config.model,
                    base_url = %config.base_url,
                    "provider resolved"
                );
                let construct = config.kind.constructor();
                ResolvedProvider::Available(construct(config, self.client.clone()))
            }
            Err(reason) => {
                debug!(provider = %name, %reason, "provider unavailable");
                ResolvedProvider::Unavailable { name, reason }
            }
        }
    }

    /// Layered settings for `name`, without building a client.
    pub fn resolve_config(
        &self,
        name: &str,
        overrides: &ProviderOverrides,
    ) -> std::result::Result<ProviderConfig, String> {
        let Some(builtin) = built_in(name) else {
            return Err(format!(
                "unknown provider (known: {})",
                known_providers().collect::<Vec<_>>().join(", ")
            ));
        };
        let file = self.settings.get(name).cloned().unwrap_or_default();

        let credential = if builtin.kind.requires_credential() {
            let mut key_envs: Vec<&str> = Vec::new();
            if let Some(custom) = file.api_key_env.as_deref() {
                key_envs.push(custom);
            }
            key_envs.extend(builtin.key_envs.iter().copied());
            key_envs.push(GENERIC_API_KEY_ENV);

            let found = non_blank(overrides.api_key.as_deref())
                .or_else(|| key_envs.iter().find_map(|k| self.env(k)));
            match found {
                Some(key) => Some(key),
                None => {
                    return Err(format!("no credential found (set {})", key_envs.join(" or ")));
                }
            }
        } else {
            None
        };

        let base_url_env = file.base_url_env.as_deref().unwrap_or(builtin.base_url_env);
        let base_url = non_blank(overrides.base_url.as_deref())
            .or_else(|| self.env(base_url_env))
            .or_else(|| self.env(GENERIC_BASE_URL_ENV))
            .or_else(|| non_blank(file.base_url.as_deref()))
            .unwrap_or_else(|| builtin.base_url.to_string());
        let base_url = Url::parse(&base_url)
            .map_err(|e| format!("invalid base URL '{base_url}': {e}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(format!("unsupported base URL scheme '{}'", base_url.scheme()));
        }

        let model_env = file.model_env.as_deref().unwrap_or(builtin.model_env);
        let model = non_blank(overrides.model.as_deref())
            .or_else(|| self.env(model_env))
            .or_else(|| self.env(GENERIC_MODEL_ENV))
            .or_else(|| non_blank(file.model.as_deref()))
            .unwrap_or_else(|| builtin.model.to_string());

        Ok(ProviderConfig {
            name: builtin.name.to_string(),
            kind: builtin.kind,
            credential,
            base_url,
            model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }

    fn env(&self, key: &str) -> Option<String> {
        (self.env)(key).and_then(|v| non_blank(Some(v.as_str())))
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
