//! Publishing the built site with storage fallback.
//!
//! Backends are tried one at a time in priority order and the first success
//! wins. The publish only fails when every backend failed; recording the
//! result in the ledger and updating the DNS pointer are best-effort steps
//! whose failures come back as advisories.

use std::path::Path;

use chrono::Utc;
use tracing::{info, instrument, warn};

use quillpin_publish::{
    Advisory, AdvisoryKind, DnsPointer, ExclusionFilter, PublishMetadata, SiteTree,
    StorageBackend, build_upload_client, configured_backends_from_env, configured_dns_pointer,
};
use quillpin_shared::{
    AggregateDeploymentError, AppConfig, ContentId, DeploymentRecord, QuillpinError, Result,
    SitePaths, UploadError, env_var,
};
use quillpin_storage::DeploymentLedger;

use crate::ProgressReporter;

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub record: DeploymentRecord,
    /// SHA-256 of the uploaded tree.
    pub digest: String,
    pub gateway_urls: Vec<String>,
    /// Backends that failed before one succeeded, in trial order.
    pub failures: Vec<UploadError>,
    pub advisories: Vec<Advisory>,
}

impl PublishOutcome {
    pub fn content_id(&self) -> &ContentId {
        &self.record.content_id
    }
}

/// Ledger contents for the `status` command.
#[derive(Debug, Clone)]
pub struct DeploymentStatus {
    pub current: Option<ContentId>,
    pub history: Vec<DeploymentRecord>,
    /// Set when the ledger could not be read.
    pub history_error: Option<String>,
    pub gateway_urls: Vec<String>,
}

pub struct DeploymentOrchestrator {
    backends: Vec<Box<dyn StorageBackend>>,
    ledger: DeploymentLedger,
    filter: ExclusionFilter,
    dns: Option<Box<dyn DnsPointer>>,
    gateways: Vec<String>,
    pin_name: String,
}

impl DeploymentOrchestrator {
    pub fn new(
        backends: Vec<Box<dyn StorageBackend>>,
        ledger: DeploymentLedger,
        filter: ExclusionFilter,
    ) -> Self {
        Self {
            backends,
            ledger,
            filter,
            dns: None,
            gateways: Vec::new(),
            pin_name: "quillpin-site".into(),
        }
    }

    /// Backends, DNS pointer and ledger as configured, credentials from the environment.
    pub fn from_config(config: &AppConfig, paths: &SitePaths) -> Result<Self> {
        let deploy = &config.deploy;
        let client = build_upload_client()?;
        let filter = ExclusionFilter::new(&deploy.exclude, deploy.exclude_mode)?;
        let ledger = DeploymentLedger::new(
            &paths.ledger_path,
            &paths.pointer_path,
            deploy.ledger_capacity,
        );

        let orchestrator = Self::new(configured_backends_from_env(deploy, &client), ledger, filter)
            .with_gateways(deploy.gateways.clone())
            .with_pin_name(&deploy.pin_name);
        Ok(match configured_dns_pointer(&deploy.dnslink, &client, &env_var) {
            Some(dns) => orchestrator.with_dns(dns),
            None => orchestrator,
        })
    }

    pub fn with_dns(mut self, dns: Box<dyn DnsPointer>) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn with_gateways(mut self, gateways: Vec<String>) -> Self {
        self.gateways = gateways;
        self
    }

    pub fn with_pin_name(mut self, name: &str) -> Self {
        self.pin_name = name.to_string();
        self
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn ledger(&self) -> &DeploymentLedger {
        &self.ledger
    }

    /// Upload `root` through the first backend that accepts it.
    #[instrument(skip_all, fields(root = %root.display(), backends = self.backends.len()))]
    pub async fn publish(&self, root: &Path, progress: &dyn ProgressReporter) -> Result<PublishOutcome> {
        if self.backends.is_empty() {
            return Err(QuillpinError::config(
                "no storage backend configured; set PINATA_JWT, PINATA_API_KEY and PINATA_SECRET_API_KEY, WEB3_STORAGE_TOKEN, or enable the local IPFS node",
            ));
        }

        progress.phase("scanning site");
        let tree = SiteTree::scan(root, &self.filter)?;
        if tree.is_empty() {
            return Err(QuillpinError::config(format!(
                "nothing to publish: {} has no files after exclusions",
                root.display()
            )));
        }
        let digest = tree.digest()?;
        info!(files = tree.len(), bytes = tree.total_bytes(), %digest, "site scanned");

        let meta = PublishMetadata {
            name: self.pin_name.clone(),
            digest: Some(digest.clone()),
        };

        progress.phase("uploading");
        let mut failures = Vec::new();
        let mut accepted = None;
        for (i, backend) in self.backends.iter().enumerate() {
            progress.item(i + 1, self.backends.len(), backend.name());
            match backend.publish(&tree, &meta).await {
                Ok(receipt) => {
                    info!(backend = backend.name(), cid = %receipt.content_id, "upload accepted");
                    accepted = Some((backend.name().to_string(), receipt));
                    break;
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "upload failed, trying next backend");
                    failures.push(e);
                }
            }
        }

        let Some((backend, receipt)) = accepted else {
            return Err(AggregateDeploymentError { failures }.into());
        };

        let record = DeploymentRecord {
            content_id: receipt.content_id,
            backend,
            timestamp: Utc::now(),
            size_bytes: tree.total_bytes(),
            pinned: receipt.pinned,
            file_count: tree.len(),
        };
        let mut advisories = receipt.advisories;

        progress.phase("recording");
        match self.ledger.append(&record) {
            Ok(len) => info!(entries = len, "deployment recorded"),
            Err(e) => {
                warn!(error = %e, "could not record deployment");
                advisories.push(Advisory::new(AdvisoryKind::Ledger, e.to_string()));
            }
        }

        if let Some(dns) = &self.dns {
            progress.phase("updating dnslink");
            if let Err(e) = dns.update(&record.content_id).await {
                warn!(record = %dns.record_name(), error = %e, "dnslink update failed");
                advisories.push(Advisory::new(
                    AdvisoryKind::DnsPointer,
                    format!("{}: {e}", dns.record_name()),
                ));
            }
        }

        Ok(PublishOutcome {
            gateway_urls: record.content_id.gateway_urls(&self.gateways),
            record,
            digest,
            failures,
            advisories,
        })
    }

    /// The pointer is authoritative; an unreadable ledger only costs the history.
    pub fn status(&self) -> Result<DeploymentStatus> {
        let (history, history_error) = match self.ledger.read() {
            Ok(history) => (history, None),
            Err(e) => {
                warn!(error = %e, "deployment history unreadable");
                (Vec::new(), Some(e.to_string()))
            }
        };
        let current = match self.ledger.current()? {
            Some(cid) => Some(cid),
            None => history.first().map(|r| r.content_id.clone()),
        };
        let gateway_urls = current
            .as_ref()
            .map(|cid| cid.gateway_urls(&self.gateways))
            .unwrap_or_default();
        Ok(DeploymentStatus {
            current,
            history,
            history_error,
            gateway_urls,
        })
    }
}
