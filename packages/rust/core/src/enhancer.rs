//! AI metadata generation and body rewriting for posts.
//!
//! One pass over a post evaluates, in order, summary → tags → title →
//! rewrite. Every prompt is built from the post as it was read, so a value
//! generated early in the pass never feeds a later prompt. Metadata is only
//! ever filled in where absent; the body is only rewritten when the post's
//! `enhance` flag asks for it, and the flag is cleared by the same write.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use quillpin_markdown::Post;
use quillpin_providers::{InvokeOptions, Provider};
use quillpin_shared::{AiConfig, PromptsConfig, ProviderError, QuillpinError, Result};

use crate::ProgressReporter;
use crate::posts::PostStore;

const MAX_TAGS: usize = 5;
const ELLIPSIS: &str = "...";
const QUOTE_CHARS: &[char] = &['"', '\'', '`', '“', '”', '‘', '’', '«', '»', '「', '」', '『', '』'];

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnhanceField {
    Summary,
    Tags,
    Title,
    Rewrite,
}

impl EnhanceField {
    /// Evaluation order within one pass.
    pub const ORDER: [EnhanceField; 4] = [Self::Summary, Self::Tags, Self::Title, Self::Rewrite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Tags => "tags",
            Self::Title => "title",
            Self::Rewrite => "rewrite",
        }
    }
}

impl fmt::Display for EnhanceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field's worth of work, built before the provider is called.
#[derive(Debug, Clone)]
pub struct EnhancementRequest {
    pub field: EnhanceField,
    pub prompt: String,
    pub provider: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Metadata already set.
    AlreadyPresent,
    /// Rewrite without the `enhance` flag.
    NotRequested,
    /// Body at or under the minimum length.
    ContentTooShort,
    /// The provider answered but nothing usable survived sanitizing.
    NothingUsable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AlreadyPresent => "already present",
            Self::NotRequested => "not requested",
            Self::ContentTooShort => "content too short",
            Self::NothingUsable => "no usable output",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStatus {
    Generated,
    Skipped(SkipReason),
    Failed(ProviderError),
}

/// A generated value, ready to patch into a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Tags(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub field: EnhanceField,
    pub status: FieldStatus,
    pub new_value: Option<FieldValue>,
}

impl FieldOutcome {
    fn skipped(field: EnhanceField, reason: SkipReason) -> Self {
        Self {
            field,
            status: FieldStatus::Skipped(reason),
            new_value: None,
        }
    }

    pub fn applied(&self) -> bool {
        matches!(self.status, FieldStatus::Generated)
    }

    pub fn error(&self) -> Option<&ProviderError> {
        match &self.status {
            FieldStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Accumulated changes for one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPatch {
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub title: Option<String>,
    /// Rewritten body; applying it also clears `enhance`.
    pub body: Option<String>,
}

impl PostPatch {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.tags.is_none() && self.title.is_none() && self.body.is_none()
    }

    fn record(&mut self, field: EnhanceField, value: &FieldValue) {
        match (field, value) {
            (EnhanceField::Summary, FieldValue::Text(s)) => self.summary = Some(s.clone()),
            (EnhanceField::Title, FieldValue::Text(s)) => self.title = Some(s.clone()),
            (EnhanceField::Rewrite, FieldValue::Text(s)) => self.body = Some(s.clone()),
            (EnhanceField::Tags, FieldValue::Tags(t)) => self.tags = Some(t.clone()),
            _ => {}
        }
    }

    /// Fill absent metadata and apply a rewrite. Returns whether anything
    /// changed; a second application of the same patch changes nothing.
    pub fn apply(&self, post: &mut Post) -> bool {
        let mut changed = false;

        if let Some(summary) = &self.summary {
            if post.front.summary_is_absent() {
                post.front.summary = Some(summary.clone());
                changed = true;
            }
        }
        if let Some(tags) = &self.tags {
            if post.front.tags_are_absent() {
                post.front.tags = Some(tags.clone());
                changed = true;
            }
        }
        if let Some(title) = &self.title {
            if post.front.title_is_absent() {
                post.front.title = Some(title.clone());
                changed = true;
            }
        }
        if let Some(body) = &self.body {
            if post.body != *body {
                post.body = body.clone();
                changed = true;
            }
            if post.front.enhance {
                post.front.enhance = false;
                changed = true;
            }
        }

        changed
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Per-post lifecycle. `Persisted`, `Unchanged` and `SkippedOnError` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostState {
    Unexamined,
    FieldsEvaluated,
    Patched,
    Unchanged,
    Persisted,
    SkippedOnError,
}

impl PostState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Persisted | Self::Unchanged | Self::SkippedOnError)
    }
}

#[derive(Debug, Clone)]
pub struct EnhancementReport {
    pub path: Option<PathBuf>,
    pub state: PostState,
    pub outcomes: Vec<FieldOutcome>,
    pub patch: PostPatch,
    /// Why the post ended in `SkippedOnError`.
    pub error: Option<String>,
}

impl EnhancementReport {
    fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            state: PostState::Unexamined,
            outcomes: Vec::new(),
            patch: PostPatch::default(),
            error: None,
        }
    }

    pub fn outcome(&self, field: EnhanceField) -> Option<&FieldOutcome> {
        self.outcomes.iter().find(|o| o.field == field)
    }

    pub fn generated(&self) -> usize {
        self.outcomes.iter().filter(|o| o.applied()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error().is_some()).count()
    }

    pub fn first_error(&self) -> Option<&ProviderError> {
        self.outcomes.iter().find_map(FieldOutcome::error)
    }
}

/// Totals for a corpus run.
#[derive(Debug, Clone, Default)]
pub struct EnhancementSummary {
    pub reports: Vec<EnhancementReport>,
}

impl EnhancementSummary {
    pub fn count(&self, state: PostState) -> usize {
        self.reports.iter().filter(|r| r.state == state).count()
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EnhancerSettings {
    pub min_content_chars: usize,
    pub summary_max_chars: usize,
    pub inter_post_delay: Duration,
    pub prompts: PromptsConfig,
    pub invoke: InvokeOptions,
    /// Stop the run at the first provider failure.
    pub strict: bool,
}

impl From<&AiConfig> for EnhancerSettings {
    fn from(ai: &AiConfig) -> Self {
        Self {
            min_content_chars: ai.min_content_chars,
            summary_max_chars: ai.summary_max_chars,
            inter_post_delay: Duration::from_millis(ai.inter_post_delay_ms),
            prompts: ai.prompts.clone(),
            invoke: InvokeOptions {
                model: None,
                temperature: Some(ai.temperature),
                max_output_tokens: Some(ai.max_tokens),
            },
            strict: false,
        }
    }
}

impl Default for EnhancerSettings {
    fn default() -> Self {
        Self::from(&AiConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Enhancer
// ---------------------------------------------------------------------------

pub struct ContentEnhancer {
    settings: EnhancerSettings,
}

impl ContentEnhancer {
    pub fn new(settings: EnhancerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EnhancerSettings {
        &self.settings
    }

    /// The request for `field`, or why no request is needed.
    pub fn request_for(
        &self,
        post: &Post,
        field: EnhanceField,
        provider: &str,
    ) -> std::result::Result<EnhancementRequest, SkipReason> {
        let wanted = match field {
            EnhanceField::Summary => post.front.summary_is_absent(),
            EnhanceField::Tags => post.front.tags_are_absent(),
            EnhanceField::Title => post.front.title_is_absent(),
            EnhanceField::Rewrite => post.front.enhance,
        };
        if !wanted {
            return Err(match field {
                EnhanceField::Rewrite => SkipReason::NotRequested,
                _ => SkipReason::AlreadyPresent,
            });
        }
        // Rewrites run on drafts of any length.
        if field != EnhanceField::Rewrite && post.body_chars() <= self.settings.min_content_chars {
            return Err(SkipReason::ContentTooShort);
        }

        let template = match field {
            EnhanceField::Summary => &self.settings.prompts.summary,
            EnhanceField::Tags => &self.settings.prompts.tags,
            EnhanceField::Title => &self.settings.prompts.title,
            EnhanceField::Rewrite => &self.settings.prompts.rewrite,
        };
        Ok(EnhancementRequest {
            field,
            prompt: render_prompt(template, &post.body),
            provider: provider.to_string(),
        })
    }

    /// Generate one field. Provider failures are reported, never raised.
    pub async fn enhance_field(
        &self,
        post: &Post,
        field: EnhanceField,
        provider: &dyn Provider,
    ) -> FieldOutcome {
        let request = match self.request_for(post, field, provider.name()) {
            Ok(r) => r,
            Err(reason) => {
                debug!(%field, %reason, "field skipped");
                return FieldOutcome::skipped(field, reason);
            }
        };

        let raw = match provider.invoke(&request.prompt, &self.settings.invoke).await {
            Ok(text) => text,
            Err(e) => {
                warn!(%field, provider = %request.provider, error = %e, kind = e.label(), "generation failed");
                return FieldOutcome {
                    field,
                    status: FieldStatus::Failed(e),
                    new_value: None,
                };
            }
        };

        let value = match field {
            EnhanceField::Summary => Some(truncate_summary(
                &strip_wrapping_quotes(&raw),
                self.settings.summary_max_chars,
            ))
            .filter(|s| !s.is_empty())
            .map(FieldValue::Text),
            EnhanceField::Tags => Some(normalize_tags(&raw))
                .filter(|t| !t.is_empty())
                .map(FieldValue::Tags),
            EnhanceField::Title => Some(sanitize_title(&raw))
                .filter(|t| !t.is_empty())
                .map(FieldValue::Text),
            EnhanceField::Rewrite => Some(format!("{}\n", raw.trim()))
                .filter(|b| !b.trim().is_empty())
                .map(FieldValue::Text),
        };

        match value {
            Some(value) => {
                debug!(%field, "field generated");
                FieldOutcome {
                    field,
                    status: FieldStatus::Generated,
                    new_value: Some(value),
                }
            }
            None => FieldOutcome::skipped(field, SkipReason::NothingUsable),
        }
    }

    /// Evaluate every field against the post as given. Nothing is written.
    pub async fn enhance_post(&self, post: &Post, provider: &dyn Provider) -> EnhancementReport {
        let mut report = EnhancementReport::new(None);
        for field in EnhanceField::ORDER {
            let outcome = self.enhance_field(post, field, provider).await;
            if let Some(value) = &outcome.new_value {
                report.patch.record(field, value);
            }
            report.outcomes.push(outcome);
        }
        report.state = PostState::FieldsEvaluated;
        report
    }

    /// Enhance one file and save it if anything changed.
    #[instrument(skip_all, fields(path = %path.display(), provider = %provider.name()))]
    pub async fn process_file(
        &self,
        store: &PostStore,
        path: &Path,
        provider: &dyn Provider,
    ) -> EnhancementReport {
        let mut post = match store.load(path) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "could not read post");
                let mut report = EnhancementReport::new(Some(path.to_path_buf()));
                report.state = PostState::SkippedOnError;
                report.error = Some(e.to_string());
                return report;
            }
        };

        let mut report = self.enhance_post(&post, provider).await;
        report.path = Some(path.to_path_buf());

        if report.patch.apply(&mut post) {
            report.state = PostState::Patched;
            match store.update(path, &post) {
                Ok(()) => report.state = PostState::Persisted,
                Err(e) => {
                    warn!(error = %e, "could not save post");
                    report.state = PostState::SkippedOnError;
                    report.error = Some(e.to_string());
                }
            }
        } else {
            report.state = PostState::Unchanged;
        }

        info!(
            state = ?report.state,
            generated = report.generated(),
            failed = report.failed(),
            "post processed"
        );
        report
    }

    /// In strict mode, the provider failure recorded in `report`, if any.
    pub fn check_strict(&self, report: &EnhancementReport) -> Result<()> {
        match report.first_error() {
            Some(e) if self.settings.strict => Err(QuillpinError::Provider(e.clone())),
            _ => Ok(()),
        }
    }

    /// Every post in path order, one at a time, with a fixed pause between posts.
    #[instrument(skip_all, fields(posts_dir = %store.posts_dir().display(), provider = %provider.name()))]
    pub async fn process_all(
        &self,
        store: &PostStore,
        provider: &dyn Provider,
        progress: &dyn ProgressReporter,
    ) -> Result<EnhancementSummary> {
        let paths = store.list()?;
        info!(posts = paths.len(), "enhancing corpus");
        progress.phase("enhancing posts");

        let mut summary = EnhancementSummary::default();
        for (i, path) in paths.iter().enumerate() {
            if i > 0 && !self.settings.inter_post_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_post_delay).await;
            }
            progress.item(i + 1, paths.len(), &path.display().to_string());
            let report = self.process_file(store, path, provider).await;
            if let Err(e) = self.check_strict(&report) {
                warn!(path = %path.display(), error = %e, "stopping at provider failure");
                return Err(e);
            }
            summary.reports.push(report);
        }

        info!(
            persisted = summary.count(PostState::Persisted),
            unchanged = summary.count(PostState::Unchanged),
            errors = summary.count(PostState::SkippedOnError),
            "enhancement finished"
        );
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Sanitizing
// ---------------------------------------------------------------------------

pub fn render_prompt(template: &str, content: &str) -> String {
    if template.contains("{content}") {
        template.replace("{content}", content)
    } else {
        format!("{template}\n\n{content}")
    }
}

/// Trim, then strip quote characters (ASCII and typographic) wrapping the text.
pub fn strip_wrapping_quotes(text: &str) -> String {
    text.trim().trim_matches(QUOTE_CHARS).trim().to_string()
}

/// Unquoted, single-line title.
pub fn sanitize_title(raw: &str) -> String {
    let unquoted = strip_wrapping_quotes(raw);
    let one_line = unquoted.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_heading = one_line.trim_start_matches('#').trim();
    strip_wrapping_quotes(without_heading)
}

/// At most `max_chars` characters, ending in `...` when cut.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= ELLIPSIS.len() {
        return text.chars().take(max_chars).collect();
    }
    let kept: String = text.chars().take(max_chars - ELLIPSIS.len()).collect();
    format!("{}{ELLIPSIS}", kept.trim_end())
}

/// Split on commas, clean each tag, drop empties and exact duplicates, keep five.
pub fn normalize_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for piece in raw.split([',', '，', '\n']) {
        let tag = strip_wrapping_quotes(piece);
        let tag = tag.trim_start_matches('#').trim();
        let tag = strip_wrapping_quotes(tag);
        if tag.is_empty() || tags.contains(&tag) {
            continue;
        }
        tags.push(tag);
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use quillpin_markdown::FrontMatter;
    use quillpin_providers::ProviderKind;

    use crate::SilentProgress;
    use crate::sidebar::DerivedViewUpdater;

    /// Answers by prompt keyword; records every prompt it sees.
    struct ScriptedProvider {
        answers: HashMap<EnhanceField, std::result::Result<String, ProviderError>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(answers: Vec<(EnhanceField, std::result::Result<&str, ProviderError>)>) -> Self {
            Self {
                answers: answers
                    .into_iter()
                    .map(|(f, a)| (f, a.map(str::to_string)))
                    .collect(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    fn field_of(prompt: &str) -> EnhanceField {
        let p = PromptsConfig::default();
        let prefix = |t: &str| t.split("{content}").next().unwrap().to_string();
        if prompt.starts_with(&prefix(&p.summary)) {
            EnhanceField::Summary
        } else if prompt.starts_with(&prefix(&p.tags)) {
            EnhanceField::Tags
        } else if prompt.starts_with(&prefix(&p.title)) {
            EnhanceField::Title
        } else {
            EnhanceField::Rewrite
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::LocalInference
        }
        fn model(&self) -> &str {
            "script"
        }
        async fn invoke(
            &self,
            prompt: &str,
            _opts: &InvokeOptions,
        ) -> std::result::Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers
                .get(&field_of(prompt))
                .cloned()
                .unwrap_or_else(|| Ok("unused".into()))
        }
    }

    fn long_body() -> String {
        "Rust ownership makes memory safety a compile-time property. ".repeat(5)
    }

    fn enhancer() -> ContentEnhancer {
        ContentEnhancer::new(EnhancerSettings {
            inter_post_delay: Duration::ZERO,
            ..EnhancerSettings::default()
        })
    }

    fn post(front: FrontMatter, body: &str) -> Post {
        Post {
            front,
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn generates_three_fields_for_bare_post() {
        let provider = ScriptedProvider::new(vec![
            (EnhanceField::Summary, Ok("A summary.")),
            (EnhanceField::Tags, Ok("rust, web, async, rust, , x, y, z")),
            (EnhanceField::Title, Ok("\"A Title\"")),
        ]);
        let original = post(FrontMatter::default(), &long_body());
        let report = enhancer().enhance_post(&original, &provider).await;

        assert_eq!(report.state, PostState::FieldsEvaluated);
        assert_eq!(report.patch.summary.as_deref(), Some("A summary."));
        assert_eq!(
            report.patch.tags,
            Some(vec!["rust".into(), "web".into(), "async".into(), "x".into(), "y".into()])
        );
        assert_eq!(report.patch.title.as_deref(), Some("A Title"));
        assert_eq!(report.patch.body, None);
        assert_eq!(
            report.outcome(EnhanceField::Rewrite).unwrap().status,
            FieldStatus::Skipped(SkipReason::NotRequested)
        );
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn populated_summary_is_never_regenerated() {
        let provider = ScriptedProvider::new(vec![]);
        let front = FrontMatter {
            summary: Some("Existing".into()),
            tags: Some(vec!["t".into()]),
            title: Some("T".into()),
            ..FrontMatter::default()
        };
        let report = enhancer().enhance_post(&post(front, &long_body()), &provider).await;
        assert!(report.patch.is_empty());
        assert_eq!(provider.calls(), 0);
        assert_eq!(
            report.outcome(EnhanceField::Summary).unwrap().status,
            FieldStatus::Skipped(SkipReason::AlreadyPresent)
        );
    }

    #[tokio::test]
    async fn short_posts_get_no_metadata() {
        let provider = ScriptedProvider::new(vec![]);
        let report = enhancer()
            .enhance_post(&post(FrontMatter::default(), &"x".repeat(100)), &provider)
            .await;
        for field in [EnhanceField::Summary, EnhanceField::Tags, EnhanceField::Title] {
            assert_eq!(
                report.outcome(field).unwrap().status,
                FieldStatus::Skipped(SkipReason::ContentTooShort)
            );
        }
        assert_eq!(
            report.outcome(EnhanceField::Rewrite).unwrap().status,
            FieldStatus::Skipped(SkipReason::NotRequested)
        );
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn short_draft_marked_enhance_is_still_rewritten() {
        let provider = ScriptedProvider::new(vec![(EnhanceField::Rewrite, Ok("Polished draft."))]);
        let front = FrontMatter {
            enhance: true,
            ..FrontMatter::default()
        };
        let draft = "# T\n\nShort draft that needs polish.\n";
        let report = enhancer().enhance_post(&post(front, draft), &provider).await;

        assert_eq!(
            report.outcome(EnhanceField::Rewrite).unwrap().status,
            FieldStatus::Generated
        );
        assert_eq!(
            report.outcome(EnhanceField::Summary).unwrap().status,
            FieldStatus::Skipped(SkipReason::ContentTooShort)
        );
        assert_eq!(report.patch.body.as_deref(), Some("Polished draft.\n"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_siblings() {
        let provider = ScriptedProvider::new(vec![
            (
                EnhanceField::Summary,
                Err(ProviderError::RateLimited {
                    provider: "scripted".into(),
                    retry_after_secs: Some(10),
                }),
            ),
            (EnhanceField::Tags, Ok("a, b")),
            (EnhanceField::Title, Ok("Title")),
        ]);
        let report = enhancer()
            .enhance_post(&post(FrontMatter::default(), &long_body()), &provider)
            .await;
        let summary = report.outcome(EnhanceField::Summary).unwrap();
        assert!(!summary.applied());
        assert_eq!(summary.error().unwrap().label(), "rate_limited");
        assert_eq!(report.generated(), 2);
        assert_eq!(report.failed(), 1);
        // Not retried.
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn prompts_use_the_original_text() {
        let provider = ScriptedProvider::new(vec![
            (EnhanceField::Title, Ok("Brand New Title")),
            (EnhanceField::Rewrite, Ok("Rewritten body text.")),
        ]);
        let front = FrontMatter {
            summary: Some("s".into()),
            tags: Some(vec!["t".into()]),
            enhance: true,
            ..FrontMatter::default()
        };
        let body = long_body();
        let report = enhancer().enhance_post(&post(front, &body), &provider).await;

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts.iter().all(|p| p.contains(&body)));
        assert!(!prompts[1].contains("Brand New Title"));
        assert_eq!(report.patch.body.as_deref(), Some("Rewritten body text.\n"));
    }

    #[test]
    fn patch_apply_is_idempotent_and_clears_enhance() {
        let mut p = post(
            FrontMatter {
                enhance: true,
                title: Some("Kept".into()),
                ..FrontMatter::default()
            },
            "old body",
        );
        let patch = PostPatch {
            summary: Some("sum".into()),
            title: Some("Ignored".into()),
            body: Some("new body\n".into()),
            ..PostPatch::default()
        };

        assert!(patch.apply(&mut p));
        assert!(!p.front.enhance);
        assert_eq!(p.front.title.as_deref(), Some("Kept"));
        assert_eq!(p.front.summary.as_deref(), Some("sum"));
        assert_eq!(p.body, "new body\n");

        let snapshot = p.clone();
        assert!(!patch.apply(&mut p));
        assert_eq!(p, snapshot);
    }

    #[test]
    fn tag_normalization() {
        assert_eq!(
            normalize_tags("\"Rust\", #async, 'web'，Rust, rust\n  , Tokio, Serde, Extra"),
            ["Rust", "async", "web", "rust", "Tokio"]
        );
        assert!(normalize_tags(" , ,, ").is_empty());
    }

    #[test]
    fn title_and_summary_sanitizing() {
        assert_eq!(sanitize_title("  “A  Better\nTitle”  "), "A Better Title");
        assert_eq!(sanitize_title("# 'Heading'"), "Heading");

        let long = "word ".repeat(100);
        let cut = truncate_summary(&long, 300);
        assert!(cut.chars().count() <= 300);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_summary("short", 300), "short");
        assert_eq!(truncate_summary("abcdef", 2), "ab");
    }

    #[test]
    fn prompt_without_placeholder_appends_content() {
        assert_eq!(render_prompt("Summarize:", "body"), "Summarize:\n\nbody");
        assert_eq!(render_prompt("A {content} B", "x"), "A x B");
    }

    fn store(root: &Path) -> PostStore {
        let posts = root.join("posts");
        std::fs::create_dir_all(&posts).unwrap();
        PostStore::new(&posts, DerivedViewUpdater::new(&posts, root.join("_sidebar.md")))
    }

    #[tokio::test]
    async fn process_all_persists_only_changed_posts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let posts = store.posts_dir().to_path_buf();
        std::fs::write(
            posts.join("a.md"),
            format!("---\nenhance: true\n---\n{}", long_body()),
        )
        .unwrap();
        let complete = format!(
            "---\ntitle: Done\nsummary: S\ntags:\n- t\n---\n{}",
            long_body()
        );
        std::fs::write(posts.join("b.md"), &complete).unwrap();
        std::fs::write(posts.join("c.md"), "---\ntitle: [broken\n---\nbody").unwrap();

        let provider = ScriptedProvider::new(vec![
            (EnhanceField::Summary, Ok("Sum")),
            (EnhanceField::Tags, Ok("one, two")),
            (EnhanceField::Title, Ok("Title A")),
            (EnhanceField::Rewrite, Ok("Better body.")),
        ]);
        let summary = enhancer()
            .process_all(&store, &provider, &SilentProgress)
            .await
            .unwrap();

        let states: Vec<PostState> = summary.reports.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            [PostState::Persisted, PostState::Unchanged, PostState::SkippedOnError]
        );
        assert!(states.iter().all(PostState::is_terminal));

        let a = store.load(&posts.join("a.md")).unwrap();
        assert!(!a.front.enhance);
        assert_eq!(a.front.title.as_deref(), Some("Title A"));
        assert_eq!(a.front.tags, Some(vec!["one".to_string(), "two".to_string()]));
        assert_eq!(a.body, "Better body.\n");

        assert_eq!(std::fs::read_to_string(posts.join("b.md")).unwrap(), complete);
        assert!(tmp.path().join("_sidebar.md").exists());

        // Second pass: enhance flag is gone and metadata is present.
        let again = enhancer()
            .process_file(&store, &posts.join("a.md"), &provider)
            .await;
        assert_eq!(again.state, PostState::Unchanged);
    }

    #[tokio::test]
    async fn strict_run_stops_at_first_provider_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let posts = store.posts_dir().to_path_buf();
        std::fs::write(posts.join("a.md"), long_body()).unwrap();
        std::fs::write(posts.join("b.md"), long_body()).unwrap();

        let provider = ScriptedProvider::new(vec![
            (
                EnhanceField::Summary,
                Err(ProviderError::Unauthenticated {
                    provider: "scripted".into(),
                    message: "bad key".into(),
                }),
            ),
            (EnhanceField::Tags, Ok("one")),
            (EnhanceField::Title, Ok("Title")),
        ]);

        let lenient = enhancer().process_all(&store, &provider, &SilentProgress).await;
        assert_eq!(lenient.unwrap().reports.len(), 2);

        std::fs::write(posts.join("a.md"), long_body()).unwrap();
        std::fs::write(posts.join("b.md"), long_body()).unwrap();
        let calls_before = provider.calls();
        let strict = ContentEnhancer::new(EnhancerSettings {
            inter_post_delay: Duration::ZERO,
            strict: true,
            ..EnhancerSettings::default()
        });
        let err = strict
            .process_all(&store, &provider, &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            QuillpinError::Provider(ProviderError::Unauthenticated { .. })
        ));
        assert_eq!(provider.calls() - calls_before, 3);
        let b = store.load(&posts.join("b.md")).unwrap();
        assert!(b.front.title.is_none());
    }
}
