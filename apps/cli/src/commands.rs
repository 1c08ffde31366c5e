//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use quillpin_core::enhancer::FieldOutcome;
use quillpin_core::{
    ContentEnhancer, DeploymentOrchestrator, EnhancementReport, EnhancerSettings, FieldStatus,
    NewPost, PostState, PostStore, ProgressReporter,
};
use quillpin_providers::{ProviderOverrides, ProviderRegistry};
use quillpin_shared::{AppConfig, SitePaths, init_config, init_config_in, load_site_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// quillpin: AI-assisted metadata and IPFS publishing for a markdown blog.
#[derive(Parser)]
#[command(
    name = "quillpin",
    version,
    about = "Enhance blog posts with AI-generated metadata and publish the site to IPFS.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Site root (holds quillpin.toml, the posts and the built site).
    #[arg(long, default_value = ".", env = "QUILLPIN_SITE", global = true)]
    pub site: PathBuf,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate missing summaries, tags and titles; rewrite posts marked `enhance: true`.
    Enhance {
        /// Only this post (defaults to every post).
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Provider name: openai, deepseek, anthropic, gemini, ollama.
        #[arg(short, long)]
        provider: Option<String>,

        /// API key, overriding the environment.
        #[arg(long)]
        api_key: Option<String>,

        /// Model, overriding config and environment.
        #[arg(long)]
        model: Option<String>,

        /// Stop with an error at the first provider failure.
        #[arg(long)]
        strict: bool,
    },

    /// Upload the built site and record the deployment.
    Publish {
        /// Directory to publish (defaults to `site.build_dir`).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Show the current deployment and its history.
    Status,

    /// Regenerate the navigation sidebar.
    Sidebar,

    /// Post management.
    Post {
        #[command(subcommand)]
        action: PostAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Post subcommands.
#[derive(Subcommand)]
pub(crate) enum PostAction {
    /// Create a dated post skeleton.
    New {
        /// Post title.
        title: String,

        #[arg(short, long)]
        category: Option<String>,

        /// Comma-separated tags.
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Mark the post for an AI rewrite on the next `enhance`.
        #[arg(long)]
        enhance: bool,
    },
    /// Delete a post and refresh the sidebar.
    Delete {
        /// Post path, absolute or relative to the posts directory.
        path: PathBuf,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default quillpin.toml into the site root.
    Init {
        /// Write the user config (~/.quillpin/quillpin.toml) instead.
        #[arg(long)]
        global: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "quillpin=info",
        1 => "quillpin=debug",
        _ => "quillpin=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let site = cli.site;
    match cli.command {
        Command::Enhance {
            file,
            provider,
            api_key,
            model,
            strict,
        } => {
            let overrides = ProviderOverrides {
                api_key,
                base_url: None,
                model,
            };
            cmd_enhance(&site, file.as_deref(), provider.as_deref(), &overrides, strict).await
        }
        Command::Publish { dir } => cmd_publish(&site, dir.as_deref()).await,
        Command::Status => cmd_status(&site).await,
        Command::Sidebar => cmd_sidebar(&site).await,
        Command::Post { action } => match action {
            PostAction::New {
                title,
                category,
                tags,
                enhance,
            } => cmd_post_new(&site, title, category, tags, enhance).await,
            PostAction::Delete { path } => cmd_post_delete(&site, &path).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init { global } => cmd_config_init(&site, global).await,
            ConfigAction::Show => cmd_config_show(&site).await,
        },
    }
}

fn load_site(site: &Path) -> Result<(AppConfig, SitePaths)> {
    let config = load_site_config(site)?;
    let paths = config.site_paths(site);
    Ok((config, paths))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_enhance(
    site: &Path,
    file: Option<&Path>,
    provider: Option<&str>,
    overrides: &ProviderOverrides,
    strict: bool,
) -> Result<()> {
    let (config, paths) = load_site(site)?;
    let name = provider.unwrap_or(&config.ai.provider);

    let registry = ProviderRegistry::new(&config.ai)?;
    let provider = registry.resolve(name, overrides).into_result()?;
    let store = PostStore::from_paths(&paths);
    let enhancer = ContentEnhancer::new(EnhancerSettings {
        strict,
        ..EnhancerSettings::from(&config.ai)
    });

    info!(provider = provider.name(), model = provider.model(), "enhancing posts");

    let reports = match file {
        Some(file) => {
            let path = store.resolve(file)?;
            let report = enhancer.process_file(&store, &path, provider.as_ref()).await;
            enhancer.check_strict(&report)?;
            vec![report]
        }
        None => {
            let reporter = CliProgress::new();
            let summary = enhancer
                .process_all(&store, provider.as_ref(), &reporter)
                .await;
            reporter.finish();
            summary?.reports
        }
    };

    println!();
    for report in &reports {
        print_report(report);
    }
    let count = |state| reports.iter().filter(|r| r.state == state).count();
    println!(
        "  {} updated, {} unchanged, {} skipped on error",
        count(PostState::Persisted),
        count(PostState::Unchanged),
        count(PostState::SkippedOnError)
    );
    println!();

    Ok(())
}

fn print_report(report: &EnhancementReport) {
    let path = report
        .path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    println!("  {path} [{:?}]", report.state);
    if let Some(error) = &report.error {
        println!("      error: {error}");
    }
    for outcome in &report.outcomes {
        println!("      {:<8} {}", outcome.field.as_str(), describe(outcome));
    }
}

fn describe(outcome: &FieldOutcome) -> String {
    match &outcome.status {
        FieldStatus::Generated => "generated".into(),
        FieldStatus::Skipped(reason) => format!("skipped ({reason})"),
        FieldStatus::Failed(e) => format!("failed [{}]: {e}", e.label()),
    }
}

async fn cmd_publish(site: &Path, dir: Option<&Path>) -> Result<()> {
    let (config, paths) = load_site(site)?;
    let root = dir.map(Path::to_path_buf).unwrap_or_else(|| paths.build_dir.clone());

    let orchestrator = DeploymentOrchestrator::from_config(&config, &paths)?;
    info!(
        dir = %root.display(),
        backends = ?orchestrator.backend_names(),
        "publishing site"
    );

    let reporter = CliProgress::new();
    let result = orchestrator.publish(&root, &reporter).await;
    reporter.finish();
    let outcome = result?;

    println!();
    println!("  Site published!");
    println!("  CID:     {}", outcome.content_id());
    println!("  Backend: {}", outcome.record.backend);
    println!("  Files:   {}", outcome.record.file_count);
    println!("  Size:    {} bytes", outcome.record.size_bytes);
    println!("  Pinned:  {}", outcome.record.pinned);
    for failure in &outcome.failures {
        println!("  Failed:  {failure}");
    }
    for advisory in &outcome.advisories {
        println!("  Warning: {advisory}");
    }
    if !outcome.gateway_urls.is_empty() {
        println!("  Gateways:");
        for url in &outcome.gateway_urls {
            println!("    {url}");
        }
    }
    println!();

    Ok(())
}

async fn cmd_status(site: &Path) -> Result<()> {
    let (config, paths) = load_site(site)?;
    let status = DeploymentOrchestrator::from_config(&config, &paths)?.status()?;

    let Some(current) = &status.current else {
        println!("No deployments recorded yet.");
        return Ok(());
    };

    println!();
    println!("  Current: {current}");
    if let Some(latest) = status.history.first() {
        println!(
            "  Latest:  {} via {} ({} files, {} bytes)",
            latest.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            latest.backend,
            latest.file_count,
            latest.size_bytes
        );
    }
    for url in &status.gateway_urls {
        println!("    {url}");
    }
    if let Some(err) = &status.history_error {
        println!("  History unavailable: {err}");
    }
    if status.history.len() > 1 {
        println!("  History:");
        for record in &status.history {
            println!(
                "    {}  {}  {}",
                record.timestamp.format("%Y-%m-%d %H:%M"),
                record.content_id,
                record.backend
            );
        }
    }
    println!();

    Ok(())
}

async fn cmd_sidebar(site: &Path) -> Result<()> {
    let (_, paths) = load_site(site)?;
    let summary = PostStore::from_paths(&paths).sidebar().update()?;
    println!(
        "Sidebar written to {} ({} posts)",
        summary.path.display(),
        summary.posts
    );
    Ok(())
}

async fn cmd_post_new(
    site: &Path,
    title: String,
    category: Option<String>,
    tags: Vec<String>,
    enhance: bool,
) -> Result<()> {
    let (_, paths) = load_site(site)?;
    let tags = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let new = NewPost {
        title,
        body: String::new(),
        date: chrono::Local::now().date_naive(),
        category,
        tags,
        enhance,
    };
    let path = PostStore::from_paths(&paths).create(&new)?;
    println!("Created {}", path.display());
    Ok(())
}

async fn cmd_post_delete(site: &Path, path: &Path) -> Result<()> {
    let (_, paths) = load_site(site)?;
    let removed = PostStore::from_paths(&paths).delete(path)?;
    println!("Deleted {}", removed.display());
    Ok(())
}

async fn cmd_config_init(site: &Path, global: bool) -> Result<()> {
    let path = if global {
        init_config()?
    } else {
        init_config_in(site)?
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(site: &Path) -> Result<()> {
    let config: AppConfig = load_site_config(site)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize, label: &str) {
        self.spinner.set_message(format!("[{current}/{total}] {label}"));
    }
}
