//! Local inference via Ollama (`POST {base}/api/generate`, non-streaming).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use quillpin_shared::ProviderError;

use crate::{InvokeOptions, Provider, ProviderConfig, ProviderKind, SYSTEM_PROMPT, finish_text, http};

pub struct OllamaProvider {
    config: ProviderConfig,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalInference
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(provider = %self.config.name))]
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, ProviderError> {
        let eff = opts.effective(&self.config);
        let body = json!({
            "model": eff.model,
            "system": SYSTEM_PROMPT,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": eff.temperature,
                "num_predict": eff.max_tokens,
            },
        });

        let request = self.client.post(self.config.endpoint("api/generate")).json(&body);

        debug!(model = eff.model, prompt_len = prompt.len(), "sending local generate");
        let response: GenerateResponse = http::send_json(&self.config.name, request).await?;
        finish_text(&self.config.name, response.response)
    }
}
