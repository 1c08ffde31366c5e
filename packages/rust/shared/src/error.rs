//! Error types for quillpin.
//!
//! Library crates use [`QuillpinError`] and the per-concern errors below via
//! `thiserror`. The CLI wraps them with `color-eyre` for rich diagnostics.
//!
//! Per-call errors ([`ProviderError`], [`UploadError`]) are caught by the
//! orchestrators and reported per field / per backend. Only configuration
//! problems and [`AggregateDeploymentError`] surface as command failures.

use std::fmt;
use std::path::PathBuf;

/// Top-level error type for all quillpin operations.
#[derive(Debug, thiserror::Error)]
pub enum QuillpinError {
    /// Configuration loading or validation error (missing credential, no backend, ...).
    #[error("config error: {message}")]
    Config { message: String },

    /// A completion provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Every configured storage backend failed.
    #[error(transparent)]
    Deployment(#[from] AggregateDeploymentError),

    /// Ledger or pointer file could not be read or written.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Post or frontmatter parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QuillpinError>;

impl QuillpinError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider errors
// ---------------------------------------------------------------------------

/// Failure of a single completion call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Credential missing, invalid or revoked (HTTP 401/403).
    #[error("{provider}: unauthenticated: {message}")]
    Unauthenticated { provider: String, message: String },

    /// The provider asked us to slow down (HTTP 429). Not retried.
    #[error("{provider}: rate limited")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Network failure, timeout or an unexpected HTTP status.
    #[error("{provider}: transient failure: {message}")]
    Transient { provider: String, message: String },

    /// The provider answered, but not with usable completion text.
    #[error("{provider}: malformed response: {message}")]
    MalformedResponse { provider: String, message: String },
}

impl ProviderError {
    /// Name of the provider that produced this error.
    pub fn provider(&self) -> &str {
        match self {
            Self::Unauthenticated { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Transient { provider, .. }
            | Self::MalformedResponse { provider, .. } => provider,
        }
    }

    /// Short machine-friendly label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient { .. } => "transient",
            Self::MalformedResponse { .. } => "malformed_response",
        }
    }
}

// ---------------------------------------------------------------------------
// Deployment errors
// ---------------------------------------------------------------------------

/// Failure of one storage backend during a publish.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// The backend rejected our credentials.
    #[error("{backend}: authentication rejected: {message}")]
    Unauthenticated { backend: String, message: String },

    /// The backend answered with a non-success status.
    #[error("{backend}: upload failed with HTTP {status}: {message}")]
    Http {
        backend: String,
        status: u16,
        message: String,
    },

    /// Connection, timeout or body transfer failure.
    #[error("{backend}: transport error: {message}")]
    Transport { backend: String, message: String },

    /// The backend answered 2xx but without a usable content identifier.
    #[error("{backend}: unexpected response: {message}")]
    MalformedResponse { backend: String, message: String },

    /// A local file could not be read while building the upload.
    #[error("{backend}: could not read {path:?}: {message}")]
    Read {
        backend: String,
        path: PathBuf,
        message: String,
    },
}

impl UploadError {
    /// Name of the backend that produced this error.
    pub fn backend(&self) -> &str {
        match self {
            Self::Unauthenticated { backend, .. }
            | Self::Http { backend, .. }
            | Self::Transport { backend, .. }
            | Self::MalformedResponse { backend, .. }
            | Self::Read { backend, .. } => backend,
        }
    }
}

/// Every enabled backend failed; carries each individual failure in trial order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDeploymentError {
    pub failures: Vec<UploadError>,
}

impl fmt::Display for AggregateDeploymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} storage backends failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateDeploymentError {}

/// Ledger or pointer file failure. Logged only; never rolls back a publish.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path:?} is not a valid deployment ledger: {message}")]
    Corrupt { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = QuillpinError::config("no storage backend configured");
        assert_eq!(err.to_string(), "config error: no storage backend configured");

        let err = QuillpinError::validation("post has no body");
        assert!(err.to_string().contains("no body"));
    }

    #[test]
    fn provider_error_accessors() {
        let err = ProviderError::RateLimited {
            provider: "openai".into(),
            retry_after_secs: Some(30),
        };
        assert_eq!(err.provider(), "openai");
        assert_eq!(err.label(), "rate_limited");
        assert_eq!(err.to_string(), "openai: rate limited");
    }

    #[test]
    fn aggregate_lists_every_backend() {
        let err = AggregateDeploymentError {
            failures: vec![
                UploadError::Http {
                    backend: "pinata".into(),
                    status: 500,
                    message: "boom".into(),
                },
                UploadError::Transport {
                    backend: "ipfs-node".into(),
                    message: "connection refused".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("all 2 storage backends failed"));
        assert!(text.contains("pinata: upload failed with HTTP 500"));
        assert!(text.contains("ipfs-node: transport error"));
        assert_eq!(err.failures[1].backend(), "ipfs-node");
    }
}
