//! Gemini `generateContent` (`POST {base}/v1beta/models/{model}:generateContent`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use quillpin_shared::ProviderError;

use crate::{InvokeOptions, Provider, ProviderConfig, ProviderKind, SYSTEM_PROMPT, finish_text, http};

pub struct GeminiProvider {
    config: ProviderConfig,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::GeminiStyle
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(provider = %self.config.name))]
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, ProviderError> {
        let eff = opts.effective(&self.config);
        let body = json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": eff.temperature,
                "maxOutputTokens": eff.max_tokens,
            },
        });

        let url = self
            .config
            .endpoint(&format!("v1beta/models/{}:generateContent", eff.model));
        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.config.credential {
            request = request.query(&[("key", key)]);
        }

        debug!(model = eff.model, prompt_len = prompt.len(), "sending generateContent");
        let response: GenerateResponse = http::send_json(&self.config.name, request).await?;

        let text = response.candidates.into_iter().next().and_then(|c| c.content).map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        });
        finish_text(&self.config.name, text)
    }
}
