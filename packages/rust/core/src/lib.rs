//! Orchestration for quillpin.
//!
//! This crate ties the provider, publish and storage crates into the
//! workflows the CLI exposes:
//! - [`enhancer::ContentEnhancer`]: AI metadata and rewrites for posts
//! - [`deploy::DeploymentOrchestrator`]: publish with backend fallback
//! - [`sidebar::DerivedViewUpdater`]: the generated navigation sidebar
//! - [`posts::PostStore`]: post writes that keep the sidebar current

pub mod deploy;
pub mod enhancer;
pub mod posts;
pub mod sidebar;

pub use deploy::{DeploymentOrchestrator, DeploymentStatus, PublishOutcome};
pub use enhancer::{
    ContentEnhancer, EnhanceField, EnhancementReport, EnhancementSummary, EnhancerSettings,
    FieldStatus, PostState,
};
pub use posts::{NewPost, PostStore};
pub use sidebar::{DerivedViewUpdater, SidebarSummary};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback trait, so the CLI can drive a spinner.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each unit of work within a phase (a post, a backend).
    fn item(&self, current: usize, total: usize, label: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _label: &str) {}
}
