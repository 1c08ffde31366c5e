//! Web3.Storage upload API.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::Form;
use serde::Deserialize;
use tracing::{info, instrument};

use quillpin_shared::{ContentId, UploadError};

use super::{StorageBackend, file_form, malformed, send_text, trim_base};
use crate::{PublishMetadata, PublishReceipt, SiteTree};

const NAME: &str = "web3storage";

pub struct Web3StorageBackend {
    api_url: String,
    token: String,
    client: Client,
}

#[derive(Deserialize)]
struct UploadResponse {
    cid: Option<String>,
}

impl Web3StorageBackend {
    pub fn new(api_url: &str, token: String, client: Client) -> Self {
        Self {
            api_url: trim_base(api_url),
            token,
            client,
        }
    }
}

#[async_trait]
impl StorageBackend for Web3StorageBackend {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(backend = NAME, files = tree.len()))]
    async fn publish(
        &self,
        tree: &SiteTree,
        meta: &PublishMetadata,
    ) -> Result<PublishReceipt, UploadError> {
        let form = Form::new().percent_encode_noop();
        let form = file_form(NAME, tree, form, |f| f.relative.clone()).await?;
        let request = self
            .client
            .post(format!("{}/upload", self.api_url))
            .bearer_auth(&self.token)
            .header("X-Name", meta.name.as_str())
            .multipart(form);
        let body = send_text(NAME, request).await?;

        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| malformed(NAME, format!("undecodable response: {e}")))?;
        let content_id = parsed
            .cid
            .and_then(ContentId::new)
            .ok_or_else(|| malformed(NAME, "response has no cid"))?;

        info!(cid = %content_id, "stored on web3.storage");
        Ok(PublishReceipt {
            content_id,
            pinned: true,
            advisories: Vec::new(),
        })
    }
}
