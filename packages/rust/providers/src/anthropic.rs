//! Anthropic messages API (`POST {base}/v1/messages`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use quillpin_shared::ProviderError;

use crate::{InvokeOptions, Provider, ProviderConfig, ProviderKind, SYSTEM_PROMPT, finish_text, http};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    config: ProviderConfig,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(provider = %self.config.name))]
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, ProviderError> {
        let eff = opts.effective(&self.config);
        let body = json!({
            "model": eff.model,
            "max_tokens": eff.max_tokens,
            "temperature": eff.temperature,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut request = self
            .client
            .post(self.config.endpoint("v1/messages"))
            .header("anthropic-version", API_VERSION)
            .json(&body);
        if let Some(key) = &self.config.credential {
            request = request.header("x-api-key", key);
        }

        debug!(model = eff.model, prompt_len = prompt.len(), "sending messages request");
        let response: MessagesResponse = http::send_json(&self.config.name, request).await?;

        let text: String = response
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect();
        finish_text(&self.config.name, Some(text))
    }
}
