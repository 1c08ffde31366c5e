//! DNSLink pointer updates.
//!
//! After a publish, `_dnslink.<domain>` is pointed at the new root so the
//! site resolves through any gateway that honors DNSLink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use quillpin_shared::{ContentId, DnsLinkConfig};

use crate::EnvLookup;

const DNS_TIMEOUT: Duration = Duration::from_secs(30);
const RECORD_TTL: u32 = 300;

#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("DNS provider rejected the update (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("DNS request failed: {0}")]
    Transport(String),
}

/// Something that can point a name at a content id.
#[async_trait]
pub trait DnsPointer: Send + Sync {
    /// Record being maintained, for logs.
    fn record_name(&self) -> String;

    async fn update(&self, cid: &ContentId) -> Result<(), DnsError>;
}

// ---------------------------------------------------------------------------
// Cloudflare
// ---------------------------------------------------------------------------

/// DNSLink TXT record managed through the Cloudflare v4 API.
pub struct CloudflareDnsLink {
    api_url: String,
    token: String,
    zone_id: String,
    record_id: Option<String>,
    domain: String,
    client: Client,
}

#[derive(Deserialize)]
struct CloudflareResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareMessage>,
}

#[derive(Deserialize)]
struct CloudflareMessage {
    #[serde(default)]
    message: String,
}

impl CloudflareDnsLink {
    pub fn new(
        api_url: &str,
        token: String,
        zone_id: String,
        record_id: Option<String>,
        domain: &str,
        client: Client,
    ) -> Self {
        Self {
            api_url: api_url.trim().trim_end_matches('/').to_string(),
            token,
            zone_id,
            record_id,
            domain: domain.trim().trim_end_matches('.').to_string(),
            client,
        }
    }
}

#[async_trait]
impl DnsPointer for CloudflareDnsLink {
    fn record_name(&self) -> String {
        format!("_dnslink.{}", self.domain)
    }

    #[instrument(skip_all, fields(record = %self.record_name(), cid = %cid))]
    async fn update(&self, cid: &ContentId) -> Result<(), DnsError> {
        let body = json!({
            "type": "TXT",
            "name": self.record_name(),
            "content": format!("dnslink=/ipfs/{cid}"),
            "ttl": RECORD_TTL,
        });

        let records_url = format!("{}/zones/{}/dns_records", self.api_url, self.zone_id);
        let request = match &self.record_id {
            Some(id) => self.client.put(format!("{records_url}/{id}")),
            None => self.client.post(records_url),
        };

        let response = request
            .bearer_auth(&self.token)
            .timeout(DNS_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| DnsError::Transport(e.without_url().to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DnsError::Transport(e.to_string()))?;

        let parsed: Option<CloudflareResponse> = serde_json::from_str(&text).ok();
        let accepted = status.is_success() && parsed.as_ref().is_none_or(|r| r.success);
        if !accepted {
            let message = parsed
                .map(|r| {
                    r.errors
                        .into_iter()
                        .map(|e| e.message)
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| text.trim().chars().take(200).collect());
            return Err(DnsError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        info!("dnslink updated");
        Ok(())
    }
}

/// The configured DNS pointer, or `None` when disabled or missing settings.
pub fn configured_dns_pointer(
    cfg: &DnsLinkConfig,
    client: &Client,
    env: EnvLookup<'_>,
) -> Option<Box<dyn DnsPointer>> {
    if !cfg.enabled {
        return None;
    }
    let lookup = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    if cfg.domain.trim().is_empty() {
        warn!("dnslink enabled but no domain configured");
        return None;
    }
    let (Some(token), Some(zone_id)) = (lookup(&cfg.api_token_env), lookup(&cfg.zone_id_env)) else {
        warn!(
            token_env = %cfg.api_token_env,
            zone_env = %cfg.zone_id_env,
            "dnslink enabled but Cloudflare credentials are missing"
        );
        return None;
    };
    let record_id = lookup(&cfg.record_id_env);
    debug!(domain = %cfg.domain, update_existing = record_id.is_some(), "dnslink configured");

    Some(Box::new(CloudflareDnsLink::new(
        &cfg.api_url,
        token,
        zone_id,
        record_id,
        &cfg.domain,
        client.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pointer(server: &MockServer, record_id: Option<&str>) -> CloudflareDnsLink {
        CloudflareDnsLink::new(
            &server.uri(),
            "cf-token".into(),
            "zone1".into(),
            record_id.map(String::from),
            "blog.example.com",
            Client::new(),
        )
    }

    fn cid() -> ContentId {
        ContentId::new("QmSite").unwrap()
    }

    #[tokio::test]
    async fn creates_record_without_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/zones/zone1/dns_records"))
            .and(header("authorization", "Bearer cf-token"))
            .and(body_partial_json(json!({
                "type": "TXT",
                "name": "_dnslink.blog.example.com",
                "content": "dnslink=/ipfs/QmSite",
                "ttl": 300
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        pointer(&server, None).update(&cid()).await.expect("update");
    }

    #[tokio::test]
    async fn updates_existing_record_with_put() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/zones/zone1/dns_records/rec9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        pointer(&server, Some("rec9")).update(&cid()).await.expect("update");
    }

    #[tokio::test]
    async fn api_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 81057, "message": "Record already exists." }]
            })))
            .mount(&server)
            .await;

        let err = pointer(&server, None).update(&cid()).await.unwrap_err();
        match err {
            DnsError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Record already exists.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn disabled_or_incomplete_config_yields_none() {
        let none = |_: &str| -> Option<String> { None };
        let cfg = DnsLinkConfig::default();
        assert!(configured_dns_pointer(&cfg, &Client::new(), &none).is_none());

        let cfg = DnsLinkConfig {
            enabled: true,
            domain: "blog.example.com".into(),
            ..DnsLinkConfig::default()
        };
        assert!(configured_dns_pointer(&cfg, &Client::new(), &none).is_none());

        let env = |k: &str| match k {
            "CLOUDFLARE_API_TOKEN" => Some("t".to_string()),
            "CLOUDFLARE_ZONE_ID" => Some("z".to_string()),
            _ => None,
        };
        let pointer = configured_dns_pointer(&cfg, &Client::new(), &env).expect("configured");
        assert_eq!(pointer.record_name(), "_dnslink.blog.example.com");
    }
}
