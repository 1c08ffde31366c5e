//! Storage backend trait and the built-in backends.
//!
//! Backends are tried in priority order; the first success wins.

mod ipfs_node;
mod pinata;
mod web3storage;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, info};

use quillpin_shared::{DeployConfig, QuillpinError, Result, UploadError, env_var};

use crate::{EnvLookup, PublishMetadata, PublishReceipt, SiteTree, TreeFile};

pub use ipfs_node::IpfsNodeBackend;
pub use pinata::{PinataAuth, PinataBackend};
pub use web3storage::Web3StorageBackend;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const USER_AGENT: &str = concat!("quillpin/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One upload target.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name as recorded in the ledger.
    fn name(&self) -> &str;

    /// Upload the whole tree and return its root content id.
    async fn publish(
        &self,
        tree: &SiteTree,
        meta: &PublishMetadata,
    ) -> std::result::Result<PublishReceipt, UploadError>;
}

// ---------------------------------------------------------------------------
// Construction from config
// ---------------------------------------------------------------------------

/// HTTP client shared by all backends.
pub fn build_upload_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(UPLOAD_TIMEOUT)
        .build()
        .map_err(|e| QuillpinError::config(format!("failed to build HTTP client: {e}")))
}

/// Enabled backends that have credentials, in priority order:
/// Pinata, Web3.Storage, self-hosted node.
pub fn configured_backends(
    deploy: &DeployConfig,
    client: &Client,
    env: EnvLookup<'_>,
) -> Vec<Box<dyn StorageBackend>> {
    let lookup = |name: &str| env(name).filter(|v| !v.trim().is_empty());
    let mut backends: Vec<Box<dyn StorageBackend>> = Vec::new();

    if deploy.pinata.enabled {
        let auth = match lookup(&deploy.pinata.jwt_env) {
            Some(jwt) => Some(PinataAuth::Jwt(jwt)),
            None => match (
                lookup(&deploy.pinata.api_key_env),
                lookup(&deploy.pinata.secret_api_key_env),
            ) {
                (Some(key), Some(secret)) => Some(PinataAuth::ApiKey { key, secret }),
                _ => None,
            },
        };
        match auth {
            Some(auth) => backends.push(Box::new(PinataBackend::new(
                &deploy.pinata.api_url,
                auth,
                deploy.pinata.test_authentication,
                client.clone(),
            ))),
            None => debug!("pinata: no credentials, skipping"),
        }
    }

    if deploy.web3storage.enabled {
        match lookup(&deploy.web3storage.token_env) {
            Some(token) => backends.push(Box::new(Web3StorageBackend::new(
                &deploy.web3storage.api_url,
                token,
                client.clone(),
            ))),
            None => debug!("web3storage: no token, skipping"),
        }
    }

    let node_enabled = deploy.node.enabled
        || lookup(&deploy.node.enabled_env).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
    if node_enabled {
        let api_url = lookup(&deploy.node.api_url_env).unwrap_or_else(|| deploy.node.api_url.clone());
        backends.push(Box::new(IpfsNodeBackend::new(
            &api_url,
            deploy.node.pin,
            client.clone(),
        )));
    }

    info!(
        backends = %backends.iter().map(|b| b.name()).collect::<Vec<_>>().join(","),
        "storage backends configured"
    );
    backends
}

/// [`configured_backends`] reading the process environment.
pub fn configured_backends_from_env(deploy: &DeployConfig, client: &Client) -> Vec<Box<dyn StorageBackend>> {
    configured_backends(deploy, client, &env_var)
}

// ---------------------------------------------------------------------------
// Shared HTTP helpers
// ---------------------------------------------------------------------------

/// Send, read the body, and classify a non-success status.
pub(crate) async fn send_text(
    backend: &str,
    request: RequestBuilder,
) -> std::result::Result<String, UploadError> {
    let response = request.send().await.map_err(|e| UploadError::Transport {
        backend: backend.to_string(),
        message: e.without_url().to_string(),
    })?;
    let status = response.status();
    let body = response.text().await.map_err(|e| UploadError::Transport {
        backend: backend.to_string(),
        message: format!("failed to read response body: {e}"),
    })?;

    debug!(backend, status = status.as_u16(), body_len = body.len(), "backend response");

    if status.is_success() {
        return Ok(body);
    }
    let message = body.trim().chars().take(200).collect::<String>();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UploadError::Unauthenticated {
            backend: backend.to_string(),
            message,
        },
        _ => UploadError::Http {
            backend: backend.to_string(),
            status: status.as_u16(),
            message,
        },
    })
}

pub(crate) fn malformed(backend: &str, message: impl Into<String>) -> UploadError {
    UploadError::MalformedResponse {
        backend: backend.to_string(),
        message: message.into(),
    }
}

/// Multipart form with one `file` part per tree file, named by `name_of`.
pub(crate) async fn file_form(
    backend: &str,
    tree: &SiteTree,
    mut form: Form,
    name_of: impl Fn(&TreeFile) -> String,
) -> std::result::Result<Form, UploadError> {
    for file in &tree.files {
        let bytes = tokio::fs::read(&file.absolute)
            .await
            .map_err(|e| UploadError::Read {
                backend: backend.to_string(),
                path: file.absolute.clone(),
                message: e.to_string(),
            })?;
        form = form.part("file", Part::bytes(bytes).file_name(name_of(file)));
    }
    Ok(form)
}

/// Base URL without a trailing slash.
pub(crate) fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn names(backends: &[Box<dyn StorageBackend>]) -> Vec<&str> {
        backends.iter().map(|b| b.name()).collect()
    }

    #[test]
    fn nothing_configured_yields_no_backends() {
        let env = env_of(&[]);
        let backends = configured_backends(&DeployConfig::default(), &Client::new(), &env);
        assert!(backends.is_empty());
    }

    #[test]
    fn priority_order_is_fixed() {
        let env = env_of(&[
            ("LOCAL_IPFS_ENABLED", "true"),
            ("WEB3_STORAGE_TOKEN", "w3"),
            ("PINATA_JWT", "jwt"),
        ]);
        let backends = configured_backends(&DeployConfig::default(), &Client::new(), &env);
        assert_eq!(names(&backends), ["pinata", "web3storage", "ipfs-node"]);
    }

    #[test]
    fn pinata_needs_both_key_and_secret() {
        let env = env_of(&[("PINATA_API_KEY", "k")]);
        assert!(configured_backends(&DeployConfig::default(), &Client::new(), &env).is_empty());

        let env = env_of(&[("PINATA_API_KEY", "k"), ("PINATA_SECRET_API_KEY", "s")]);
        let backends = configured_backends(&DeployConfig::default(), &Client::new(), &env);
        assert_eq!(names(&backends), ["pinata"]);
    }

    #[test]
    fn disabled_backends_are_skipped() {
        let mut deploy = DeployConfig::default();
        deploy.pinata.enabled = false;
        let env = env_of(&[("PINATA_JWT", "jwt"), ("WEB3_STORAGE_TOKEN", "w3")]);
        let backends = configured_backends(&deploy, &Client::new(), &env);
        assert_eq!(names(&backends), ["web3storage"]);
    }
}
