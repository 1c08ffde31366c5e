//! Shared types, error model, and configuration for quillpin.
//!
//! This crate is the foundation depended on by all other quillpin crates.
//! It provides:
//! - [`QuillpinError`] and the per-concern errors ([`ProviderError`], [`UploadError`], ...)
//! - Domain types ([`ContentId`], [`DeploymentRecord`])
//! - Configuration ([`AppConfig`], [`SitePaths`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AiConfig, AppConfig, CONFIG_FILE_NAME, DeployConfig, DnsLinkConfig, ExcludeMode,
    IpfsNodeConfig, PinataConfig, PromptsConfig, ProviderSettings, SiteConfig, SitePaths,
    Web3StorageConfig, config_dir, config_file_path, env_var, init_config, init_config_in,
    load_config, load_config_from, load_site_config,
};
pub use error::{
    AggregateDeploymentError, PersistenceError, ProviderError, QuillpinError, Result, UploadError,
};
pub use types::{ContentId, DeploymentRecord};
