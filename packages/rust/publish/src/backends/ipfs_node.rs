//! Self-hosted IPFS (Kubo) node over its HTTP RPC API.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use quillpin_shared::{ContentId, UploadError};

use super::{StorageBackend, file_form, malformed, send_text, trim_base};
use crate::{Advisory, AdvisoryKind, PublishMetadata, PublishReceipt, SiteTree};

const NAME: &str = "ipfs-node";

pub struct IpfsNodeBackend {
    api_url: String,
    pin: bool,
    client: Client,
}

/// One NDJSON line from `/api/v0/add`.
#[derive(Deserialize)]
struct AddEntry {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Hash")]
    hash: Option<String>,
}

impl IpfsNodeBackend {
    pub fn new(api_url: &str, pin: bool, client: Client) -> Self {
        Self {
            api_url: trim_base(api_url),
            pin,
            client,
        }
    }

    async fn pin_root(&self, cid: &ContentId) -> Result<(), UploadError> {
        let request = self
            .client
            .post(format!("{}/api/v0/pin/add", self.api_url))
            .query(&[("arg", cid.as_str())]);
        send_text(NAME, request).await.map(|_| ())
    }
}

/// Percent-encode everything but unreserved characters, `/` included.
fn encode_path(path: &str) -> String {
    urlencoding::encode(path).into_owned()
}

/// Root of a wrapped add: the entry whose name is empty.
fn root_of(ndjson: &str) -> Result<ContentId, UploadError> {
    let mut root = None;
    for line in ndjson.lines().filter(|l| !l.trim().is_empty()) {
        let entry: AddEntry = serde_json::from_str(line)
            .map_err(|e| malformed(NAME, format!("undecodable add entry: {e}")))?;
        if entry.name.is_empty() {
            root = entry.hash.and_then(ContentId::new);
        }
    }
    root.ok_or_else(|| malformed(NAME, "add response has no wrapping directory entry"))
}

#[async_trait]
impl StorageBackend for IpfsNodeBackend {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(backend = NAME, files = tree.len()))]
    async fn publish(
        &self,
        tree: &SiteTree,
        _meta: &PublishMetadata,
    ) -> Result<PublishReceipt, UploadError> {
        // Names go out pre-encoded; the node unescapes them into paths.
        let mut form = Form::new().percent_encode_noop();
        for dir in tree.directories() {
            let part = Part::bytes(Vec::new())
                .file_name(encode_path(&dir))
                .mime_str("application/x-directory")
                .map_err(|e| malformed(NAME, format!("invalid directory part: {e}")))?;
            form = form.part("file", part);
        }
        let form = file_form(NAME, tree, form, |f| encode_path(&f.relative)).await?;

        let request = self
            .client
            .post(format!("{}/api/v0/add", self.api_url))
            .query(&[
                ("recursive", "true"),
                ("wrap-with-directory", "true"),
                ("pin", "false"),
            ])
            .multipart(form);
        let body = send_text(NAME, request).await?;
        let content_id = root_of(&body)?;
        info!(cid = %content_id, "added to ipfs node");

        let mut advisories = Vec::new();
        let pinned = if self.pin {
            match self.pin_root(&content_id).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(cid = %content_id, error = %e, "pin failed; content is unpinned");
                    advisories.push(Advisory::new(
                        AdvisoryKind::Pin,
                        format!("content added but not pinned: {e}"),
                    ));
                    false
                }
            }
        } else {
            false
        };

        Ok(PublishReceipt {
            content_id,
            pinned,
            advisories,
        })
    }
}
