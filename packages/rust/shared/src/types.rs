//! Core domain types shared by the publish pipeline and the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ContentId
// ---------------------------------------------------------------------------

/// A content identifier (CID) returned by a content-addressed store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap a CID string, trimming surrounding whitespace.
    /// Returns `None` for an empty identifier.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<gateway>/ipfs/<cid>` for each gateway base URL.
    pub fn gateway_urls(&self, gateways: &[String]) -> Vec<String> {
        gateways
            .iter()
            .map(|g| format!("{}/ipfs/{}", g.trim_end_matches('/'), self.0))
            .collect()
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// DeploymentRecord
// ---------------------------------------------------------------------------

/// One successful publish, as stored in the deployment ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub content_id: ContentId,
    /// Backend that accepted the upload (`pinata`, `web3storage`, `ipfs-node`).
    pub backend: String,
    pub timestamp: DateTime<Utc>,
    /// Total bytes of the files uploaded.
    pub size_bytes: u64,
    /// Whether the content is known to be pinned.
    pub pinned: bool,
    #[serde(default)]
    pub file_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_rejects_blank() {
        assert!(ContentId::new("  \n").is_none());
        let cid = ContentId::new(" QmRoot \n").expect("cid");
        assert_eq!(cid.as_str(), "QmRoot");
    }

    #[test]
    fn gateway_urls_strip_trailing_slash() {
        let cid = ContentId::new("QmRoot").unwrap();
        let urls = cid.gateway_urls(&["https://ipfs.io/".into(), "https://dweb.link".into()]);
        assert_eq!(
            urls,
            vec![
                "https://ipfs.io/ipfs/QmRoot".to_string(),
                "https://dweb.link/ipfs/QmRoot".to_string(),
            ]
        );
    }

    #[test]
    fn record_serializes_cid_as_plain_string() {
        let record = DeploymentRecord {
            content_id: ContentId::new("QmRoot").unwrap(),
            backend: "pinata".into(),
            timestamp: Utc::now(),
            size_bytes: 42,
            pinned: true,
            file_count: 3,
        };
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["content_id"], "QmRoot");
        assert_eq!(json["pinned"], true);
    }

    #[test]
    fn record_without_file_count_still_parses() {
        let json = r#"{"content_id":"QmOld","backend":"pinata","timestamp":"2025-01-02T03:04:05Z","size_bytes":10,"pinned":false}"#;
        let record: DeploymentRecord = serde_json::from_str(json).expect("deserialize");
        assert_eq!(record.file_count, 0);
        assert_eq!(record.content_id.as_str(), "QmOld");
    }
}
