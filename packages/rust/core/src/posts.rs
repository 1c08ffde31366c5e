//! Post corpus writes. Every mutation refreshes the sidebar.

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde_yaml_ng::Value;
use tracing::{info, instrument, warn};

use quillpin_markdown::{Post, file_name_for};
use quillpin_shared::{QuillpinError, Result, SitePaths};
use quillpin_storage::write_atomic;

use crate::sidebar::{DerivedViewUpdater, list_posts};

/// A post to create.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub date: NaiveDate,
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// Ask for a body rewrite on the next enhancement pass.
    pub enhance: bool,
}

/// Owns the posts directory and keeps the sidebar in step with it.
#[derive(Debug, Clone)]
pub struct PostStore {
    posts_dir: PathBuf,
    sidebar: DerivedViewUpdater,
}

impl PostStore {
    pub fn new(posts_dir: impl Into<PathBuf>, sidebar: DerivedViewUpdater) -> Self {
        Self {
            posts_dir: posts_dir.into(),
            sidebar,
        }
    }

    pub fn from_paths(paths: &SitePaths) -> Self {
        Self::new(
            &paths.posts_dir,
            DerivedViewUpdater::new(&paths.posts_dir, &paths.sidebar_path),
        )
    }

    pub fn posts_dir(&self) -> &Path {
        &self.posts_dir
    }

    pub fn sidebar(&self) -> &DerivedViewUpdater {
        &self.sidebar
    }

    /// Every post file, sorted by path.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        list_posts(&self.posts_dir)
    }

    pub fn load(&self, path: &Path) -> Result<Post> {
        let content = std::fs::read_to_string(path).map_err(|e| QuillpinError::io(path, e))?;
        Post::parse(&content)
    }

    /// Write `posts/YYYY/MM/YYYY-MM-DD-<slug>.md`. Refuses to overwrite.
    #[instrument(skip_all, fields(title = %new.title))]
    pub fn create(&self, new: &NewPost) -> Result<PathBuf> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(QuillpinError::validation("post title must not be empty"));
        }

        let path = self
            .posts_dir
            .join(format!("{:04}", new.date.year()))
            .join(format!("{:02}", new.date.month()))
            .join(file_name_for(title, new.date));
        if path.exists() {
            return Err(QuillpinError::validation(format!(
                "post already exists: {}",
                path.display()
            )));
        }

        let mut post = Post::default();
        post.front.title = Some(title.to_string());
        post.front.enhance = new.enhance;
        if !new.tags.is_empty() {
            post.front.tags = Some(new.tags.clone());
        }
        post.front.extra.insert(
            Value::String("date".into()),
            Value::String(new.date.format("%Y-%m-%d").to_string()),
        );
        if let Some(category) = new.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            post.front.extra.insert(
                Value::String("category".into()),
                Value::String(category.to_string()),
            );
        }
        post.body = format!("# {title}\n\n{}\n", new.body.trim_end());

        self.write(&path, &post)?;
        info!(path = %path.display(), "post created");
        self.refresh_sidebar();
        Ok(path)
    }

    /// Overwrite an existing post.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn update(&self, path: &Path, post: &Post) -> Result<()> {
        let path = self.resolve(path)?;
        self.write(&path, post)?;
        info!(path = %path.display(), "post saved");
        self.refresh_sidebar();
        Ok(())
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn delete(&self, path: &Path) -> Result<PathBuf> {
        let path = self.resolve(path)?;
        std::fs::remove_file(&path).map_err(|e| QuillpinError::io(&path, e))?;
        info!(path = %path.display(), "post deleted");
        self.refresh_sidebar();
        Ok(path)
    }

    /// An existing `.md` file inside the posts directory. Relative paths are
    /// tried as given, then against the posts directory.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let candidate = if path.is_absolute() || path.exists() {
            path.to_path_buf()
        } else {
            self.posts_dir.join(path)
        };

        if candidate.extension().is_none_or(|e| e != "md") {
            return Err(QuillpinError::validation(format!(
                "not a markdown post: {}",
                candidate.display()
            )));
        }

        let canonical = candidate
            .canonicalize()
            .map_err(|e| QuillpinError::io(&candidate, e))?;
        let root = self
            .posts_dir
            .canonicalize()
            .map_err(|e| QuillpinError::io(&self.posts_dir, e))?;
        if !canonical.starts_with(&root) {
            return Err(QuillpinError::validation(format!(
                "{} is outside the posts directory {}",
                candidate.display(),
                self.posts_dir.display()
            )));
        }
        Ok(canonical)
    }

    fn write(&self, path: &Path, post: &Post) -> Result<()> {
        let rendered = post.render()?;
        write_atomic(path, rendered.as_bytes())?;
        Ok(())
    }

    /// The post write already happened; a sidebar failure is only logged.
    fn refresh_sidebar(&self) {
        if let Err(e) = self.sidebar.update() {
            warn!(error = %e, "sidebar refresh failed");
        }
    }
}
