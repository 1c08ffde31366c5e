//! Application configuration for quillpin.
//!
//! A project-local `quillpin.toml` in the site root wins; otherwise the user
//! config at `~/.quillpin/quillpin.toml` is used; otherwise defaults.
//! CLI flags override config file values, which override defaults.
//!
//! Secrets never live in the file: every credential is named by the
//! environment variable that holds it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuillpinError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "quillpin.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".quillpin";

// ---------------------------------------------------------------------------
// Config structs (matching quillpin.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Site layout.
    #[serde(default)]
    pub site: SiteConfig,

    /// AI enhancement settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// Publish settings.
    #[serde(default)]
    pub deploy: DeployConfig,
}

/// `[site]` section. Relative paths are resolved against the site root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Post corpus, laid out as `<posts_dir>/<YYYY>/<MM>/*.md`.
    #[serde(default = "default_posts_dir")]
    pub posts_dir: String,

    /// Built site directory that gets published.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,

    /// Generated navigation sidebar.
    #[serde(default = "default_sidebar_path")]
    pub sidebar_path: String,

    /// Directory holding the deployment ledger and pointer files.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            posts_dir: default_posts_dir(),
            build_dir: default_build_dir(),
            sidebar_path: default_sidebar_path(),
            state_dir: default_state_dir(),
        }
    }
}

fn default_posts_dir() -> String {
    "docs/posts".into()
}
fn default_build_dir() -> String {
    "docs".into()
}
fn default_sidebar_path() -> String {
    "docs/_sidebar.md".into()
}
fn default_state_dir() -> String {
    ".".into()
}

/// `[ai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Provider used when none is given on the command line.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Sampling temperature passed to every provider.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum completion tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Posts whose body is not longer than this are never sent to a provider.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,

    /// Generated summaries longer than this (in characters) are truncated.
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Fixed pause between posts in a batch run.
    #[serde(default = "default_inter_post_delay_ms")]
    pub inter_post_delay_ms: u64,

    /// Prompt templates; `{content}` is replaced by the post body.
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Per-provider overrides keyed by provider name (`openai`, `gemini`, ...).
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            min_content_chars: default_min_content_chars(),
            summary_max_chars: default_summary_max_chars(),
            inter_post_delay_ms: default_inter_post_delay_ms(),
            prompts: PromptsConfig::default(),
            providers: BTreeMap::new(),
        }
    }
}

fn default_provider() -> String {
    "openai".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_min_content_chars() -> usize {
    100
}
fn default_summary_max_chars() -> usize {
    300
}
fn default_inter_post_delay_ms() -> u64 {
    1000
}

/// `[ai.prompts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_summary_prompt")]
    pub summary: String,
    #[serde(default = "default_tags_prompt")]
    pub tags: String,
    #[serde(default = "default_title_prompt")]
    pub title: String,
    #[serde(default = "default_rewrite_prompt")]
    pub rewrite: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            summary: default_summary_prompt(),
            tags: default_tags_prompt(),
            title: default_title_prompt(),
            rewrite: default_rewrite_prompt(),
        }
    }
}

fn default_summary_prompt() -> String {
    "Please generate a concise summary (no more than 100 words) for the following blog post:\n\n{content}".into()
}
fn default_tags_prompt() -> String {
    "Please generate 3-5 relevant tags for the following blog post, separated by commas:\n\n{content}".into()
}
fn default_title_prompt() -> String {
    "Please generate an engaging title for the following blog post:\n\n{content}".into()
}
fn default_rewrite_prompt() -> String {
    "Please optimize the following blog post content, keeping the original meaning but making the expression clearer and more fluent:\n\n{content}".into()
}

/// `[ai.providers.<name>]` entry. Every field is optional; unset fields fall
/// back to the provider's built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Base URL default for this provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Env var that overrides the base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url_env: Option<String>,

    /// Model default for this provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Env var that overrides the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_env: Option<String>,
}

/// How `*` patterns in the exclusion list are matched against entry names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExcludeMode {
    /// `*` becomes `.*`, the rest is used as a regex as-is and unanchored.
    #[default]
    Loose,
    /// Literal text is escaped and the whole name must match.
    Anchored,
}

/// `[deploy]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Display name attached to pins.
    #[serde(default = "default_pin_name")]
    pub pin_name: String,

    /// Entry names (files or directories) left out of the upload.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub exclude_mode: ExcludeMode,

    /// Maximum number of entries kept in the deployment ledger.
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,

    /// Ledger file name inside `site.state_dir`.
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,

    /// Current-CID pointer file name inside `site.state_dir`.
    #[serde(default = "default_pointer_file")]
    pub pointer_file: String,

    /// Public gateways used to build access URLs.
    #[serde(default = "default_gateways")]
    pub gateways: Vec<String>,

    #[serde(default)]
    pub pinata: PinataConfig,

    #[serde(default)]
    pub web3storage: Web3StorageConfig,

    #[serde(default)]
    pub node: IpfsNodeConfig,

    #[serde(default)]
    pub dnslink: DnsLinkConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            pin_name: default_pin_name(),
            exclude: default_exclude(),
            exclude_mode: ExcludeMode::default(),
            ledger_capacity: default_ledger_capacity(),
            ledger_file: default_ledger_file(),
            pointer_file: default_pointer_file(),
            gateways: default_gateways(),
            pinata: PinataConfig::default(),
            web3storage: Web3StorageConfig::default(),
            node: IpfsNodeConfig::default(),
            dnslink: DnsLinkConfig::default(),
        }
    }
}

fn default_pin_name() -> String {
    "quillpin-site".into()
}
fn default_exclude() -> Vec<String> {
    [".DS_Store", "Thumbs.db", "*.tmp", "node_modules", ".git"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_ledger_capacity() -> usize {
    20
}
fn default_ledger_file() -> String {
    "deployment-history.json".into()
}
fn default_pointer_file() -> String {
    "ipfs-hash.txt".into()
}
fn default_gateways() -> Vec<String> {
    [
        "https://ipfs.io",
        "https://gateway.pinata.cloud",
        "https://cloudflare-ipfs.com",
        "https://dweb.link",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_true() -> bool {
    true
}

/// `[deploy.pinata]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinataConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_pinata_api_url")]
    pub api_url: String,
    /// JWT auth wins over the key pair when set.
    #[serde(default = "default_pinata_jwt_env")]
    pub jwt_env: String,
    #[serde(default = "default_pinata_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_pinata_secret_env")]
    pub secret_api_key_env: String,
    /// Call `/data/testAuthentication` before uploading.
    #[serde(default = "default_true")]
    pub test_authentication: bool,
}

impl Default for PinataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_pinata_api_url(),
            jwt_env: default_pinata_jwt_env(),
            api_key_env: default_pinata_api_key_env(),
            secret_api_key_env: default_pinata_secret_env(),
            test_authentication: true,
        }
    }
}

fn default_pinata_api_url() -> String {
    "https://api.pinata.cloud".into()
}
fn default_pinata_jwt_env() -> String {
    "PINATA_JWT".into()
}
fn default_pinata_api_key_env() -> String {
    "PINATA_API_KEY".into()
}
fn default_pinata_secret_env() -> String {
    "PINATA_SECRET_API_KEY".into()
}

/// `[deploy.web3storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Web3StorageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_web3_api_url")]
    pub api_url: String,
    #[serde(default = "default_web3_token_env")]
    pub token_env: String,
}

impl Default for Web3StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_web3_api_url(),
            token_env: default_web3_token_env(),
        }
    }
}

fn default_web3_api_url() -> String {
    "https://api.web3.storage".into()
}
fn default_web3_token_env() -> String {
    "WEB3_STORAGE_TOKEN".into()
}

/// `[deploy.node]` section: a self-hosted IPFS (Kubo) node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpfsNodeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Env var that, when set to `true`, enables the node regardless of `enabled`.
    #[serde(default = "default_node_enabled_env")]
    pub enabled_env: String,
    #[serde(default = "default_node_api_url")]
    pub api_url: String,
    #[serde(default = "default_node_api_url_env")]
    pub api_url_env: String,
    /// Pin the uploaded root after adding it.
    #[serde(default = "default_true")]
    pub pin: bool,
}

impl Default for IpfsNodeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enabled_env: default_node_enabled_env(),
            api_url: default_node_api_url(),
            api_url_env: default_node_api_url_env(),
            pin: true,
        }
    }
}

fn default_node_enabled_env() -> String {
    "LOCAL_IPFS_ENABLED".into()
}
fn default_node_api_url() -> String {
    "http://127.0.0.1:5001".into()
}
fn default_node_api_url_env() -> String {
    "IPFS_API_URL".into()
}

/// `[deploy.dnslink]` section: Cloudflare-hosted DNSLink TXT record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsLinkConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Domain whose `_dnslink.` record is updated.
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cloudflare_api_url")]
    pub api_url: String,
    #[serde(default = "default_cloudflare_token_env")]
    pub api_token_env: String,
    #[serde(default = "default_cloudflare_zone_env")]
    pub zone_id_env: String,
    /// When the named variable is set the record is updated in place (PUT).
    #[serde(default = "default_cloudflare_record_env")]
    pub record_id_env: String,
}

impl Default for DnsLinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            domain: String::new(),
            api_url: default_cloudflare_api_url(),
            api_token_env: default_cloudflare_token_env(),
            zone_id_env: default_cloudflare_zone_env(),
            record_id_env: default_cloudflare_record_env(),
        }
    }
}

fn default_cloudflare_api_url() -> String {
    "https://api.cloudflare.com/client/v4".into()
}
fn default_cloudflare_token_env() -> String {
    "CLOUDFLARE_API_TOKEN".into()
}
fn default_cloudflare_zone_env() -> String {
    "CLOUDFLARE_ZONE_ID".into()
}
fn default_cloudflare_record_env() -> String {
    "CLOUDFLARE_RECORD_ID".into()
}

// ---------------------------------------------------------------------------
// Site paths (runtime, resolved against the site root)
// ---------------------------------------------------------------------------

/// Absolute locations of everything quillpin reads or writes for one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    pub root: PathBuf,
    pub posts_dir: PathBuf,
    pub build_dir: PathBuf,
    pub sidebar_path: PathBuf,
    pub ledger_path: PathBuf,
    pub pointer_path: PathBuf,
}

impl AppConfig {
    /// Resolve the configured relative paths against `root`.
    pub fn site_paths(&self, root: &Path) -> SitePaths {
        let state_dir = root.join(&self.site.state_dir);
        SitePaths {
            root: root.to_path_buf(),
            posts_dir: root.join(&self.site.posts_dir),
            build_dir: root.join(&self.site.build_dir),
            sidebar_path: root.join(&self.site.sidebar_path),
            ledger_path: state_dir.join(&self.deploy.ledger_file),
            pointer_path: state_dir.join(&self.deploy.pointer_file),
        }
    }
}

// ---------------------------------------------------------------------------
// Environment lookup
// ---------------------------------------------------------------------------

/// Read a non-empty environment variable.
pub fn env_var(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.quillpin/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| QuillpinError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the user config file (`~/.quillpin/quillpin.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the user config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the config for a site: `<root>/quillpin.toml` if present, else the user config.
pub fn load_site_config(root: &Path) -> Result<AppConfig> {
    let local = root.join(CONFIG_FILE_NAME);
    if local.exists() {
        tracing::debug!(path = ?local, "using project-local config");
        return load_config_from(&local);
    }
    load_config()
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| QuillpinError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        QuillpinError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default config file into `dir`, creating the directory.
/// Returns the path to the created file.
pub fn init_config_in(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| QuillpinError::io(dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| QuillpinError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| QuillpinError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Create the user config directory and write a default config file.
pub fn init_config() -> Result<PathBuf> {
    init_config_in(&config_dir()?)
}
