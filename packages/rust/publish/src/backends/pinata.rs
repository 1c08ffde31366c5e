//! Pinata pinning service.

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use quillpin_shared::{ContentId, UploadError};

use super::{StorageBackend, file_form, malformed, send_text, trim_base};
use crate::{PublishMetadata, PublishReceipt, SiteTree};

const NAME: &str = "pinata";

/// Either a JWT or the legacy key/secret header pair.
#[derive(Clone)]
pub enum PinataAuth {
    Jwt(String),
    ApiKey { key: String, secret: String },
}

impl std::fmt::Debug for PinataAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jwt(_) => f.write_str("Jwt(<redacted>)"),
            Self::ApiKey { .. } => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

pub struct PinataBackend {
    api_url: String,
    auth: PinataAuth,
    test_authentication: bool,
    client: Client,
}

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: Option<String>,
}

impl PinataBackend {
    pub fn new(api_url: &str, auth: PinataAuth, test_authentication: bool, client: Client) -> Self {
        Self {
            api_url: trim_base(api_url),
            auth,
            test_authentication,
            client,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            PinataAuth::Jwt(jwt) => request.bearer_auth(jwt),
            PinataAuth::ApiKey { key, secret } => request
                .header("pinata_api_key", key)
                .header("pinata_secret_api_key", secret),
        }
    }

    async fn check_authentication(&self) -> Result<(), UploadError> {
        let request = self
            .authorize(self.client.get(format!("{}/data/testAuthentication", self.api_url)));
        send_text(NAME, request).await.map(|_| ())
    }
}

#[async_trait]
impl StorageBackend for PinataBackend {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(backend = NAME, files = tree.len()))]
    async fn publish(
        &self,
        tree: &SiteTree,
        meta: &PublishMetadata,
    ) -> Result<PublishReceipt, UploadError> {
        if self.test_authentication {
            self.check_authentication().await?;
        }

        let mut keyvalues = serde_json::Map::new();
        if let Some(digest) = &meta.digest {
            keyvalues.insert("digest".into(), json!(digest));
        }
        let form = Form::new()
            .percent_encode_noop()
            .text(
                "pinataMetadata",
                json!({ "name": meta.name, "keyvalues": keyvalues }).to_string(),
            )
            .text("pinataOptions", json!({ "cidVersion": 0 }).to_string());
        let form = file_form(NAME, tree, form, |f| format!("{}/{}", meta.name, f.relative)).await?;

        let request = self
            .authorize(self.client.post(format!("{}/pinning/pinFileToIPFS", self.api_url)))
            .multipart(form);
        let body = send_text(NAME, request).await?;

        let parsed: PinResponse = serde_json::from_str(&body)
            .map_err(|e| malformed(NAME, format!("undecodable response: {e}")))?;
        let content_id = parsed
            .ipfs_hash
            .and_then(ContentId::new)
            .ok_or_else(|| malformed(NAME, "response has no IpfsHash"))?;

        info!(cid = %content_id, "pinned to pinata");
        Ok(PublishReceipt {
            content_id,
            pinned: true,
            advisories: Vec::new(),
        })
    }
}
