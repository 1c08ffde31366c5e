//! OpenAI-compatible chat completions (`POST {base}/chat/completions`).
//!
//! Also serves any vendor that speaks the same dialect (DeepSeek via
//! SiliconFlow, self-hosted gateways).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use quillpin_shared::ProviderError;

use crate::{InvokeOptions, Provider, ProviderConfig, ProviderKind, SYSTEM_PROMPT, finish_text, http};

pub struct OpenAiCompatibleProvider {
    config: ProviderConfig,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: ProviderConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiCompatible
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(provider = %self.config.name))]
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, ProviderError> {
        let eff = opts.effective(&self.config);
        let body = json!({
            "model": eff.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": eff.temperature,
            "max_tokens": eff.max_tokens,
        });

        let mut request = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .json(&body);
        if let Some(key) = &self.config.credential {
            request = request.bearer_auth(key);
        }

        debug!(model = eff.model, prompt_len = prompt.len(), "sending chat completion");
        let response: ChatResponse = http::send_json(&self.config.name, request).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content);
        finish_text(&self.config.name, text)
    }
}
