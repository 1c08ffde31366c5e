//! Publishing a built site to content-addressed storage.
//!
//! This crate provides:
//! - [`SiteTree`] / [`ExclusionFilter`] — the file set to upload
//! - [`StorageBackend`] — one upload target (Pinata, Web3.Storage, a Kubo node)
//! - [`DnsPointer`] — the DNSLink record updater
//!
//! Choosing between backends and recording the result is the orchestrator's
//! job (`quillpin-core`).

pub mod backends;
pub mod dns;
pub mod tree;

use std::fmt;

use quillpin_shared::ContentId;

pub use backends::{
    IpfsNodeBackend, PinataAuth, PinataBackend, StorageBackend, Web3StorageBackend,
    build_upload_client, configured_backends, configured_backends_from_env,
};
pub use dns::{CloudflareDnsLink, DnsError, DnsPointer, configured_dns_pointer};
pub use tree::{ExclusionFilter, SiteTree, TreeFile};

/// Environment lookup used when building backends from config.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Describes the upload to backends that label what they store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMetadata {
    /// Pin / upload name.
    pub name: String,
    /// SHA-256 of the uploaded tree.
    pub digest: Option<String>,
}

/// What a backend hands back on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub content_id: ContentId,
    pub pinned: bool,
    pub advisories: Vec<Advisory>,
}

/// Which best-effort step an [`Advisory`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryKind {
    Pin,
    Ledger,
    DnsPointer,
}

impl fmt::Display for AdvisoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pin => "pin",
            Self::Ledger => "ledger",
            Self::DnsPointer => "dns",
        })
    }
}

/// A best-effort step that failed without failing the publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub kind: AdvisoryKind,
    pub message: String,
}

impl Advisory {
    pub fn new(kind: AdvisoryKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
