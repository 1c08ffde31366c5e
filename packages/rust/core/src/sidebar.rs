//! Navigation sidebar regenerated from the post corpus.
//!
//! The sidebar is a pure function of the posts on disk (plus a timestamp
//! banner), so it is rebuilt from a full scan after every corpus change.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use tracing::{debug, info, instrument, warn};

use quillpin_markdown::{Post, body_category, filename_date, first_heading, strip_date_prefix};
use quillpin_shared::{QuillpinError, Result};
use quillpin_storage::write_atomic;

const RECENT_LIMIT: usize = 10;
const DEFAULT_CATEGORY: &str = "general";
const BANNER_PREFIX: &str = "<!-- Auto-generated sidebar - Last updated: ";

/// What the sidebar needs to know about one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub title: String,
    pub date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub category: String,
    /// Link target, relative to the sidebar file.
    pub link: String,
    /// Path relative to the posts directory; final tie-breaker.
    pub relative_path: String,
}

/// Result of one regeneration.
#[derive(Debug, Clone)]
pub struct SidebarSummary {
    pub path: PathBuf,
    pub posts: usize,
}

/// Rebuilds the sidebar artifact from the posts directory.
#[derive(Debug, Clone)]
pub struct DerivedViewUpdater {
    posts_dir: PathBuf,
    sidebar_path: PathBuf,
}

impl DerivedViewUpdater {
    pub fn new(posts_dir: impl Into<PathBuf>, sidebar_path: impl Into<PathBuf>) -> Self {
        Self {
            posts_dir: posts_dir.into(),
            sidebar_path: sidebar_path.into(),
        }
    }

    pub fn sidebar_path(&self) -> &Path {
        &self.sidebar_path
    }

    /// Scan, render, write.
    #[instrument(skip_all, fields(sidebar = %self.sidebar_path.display()))]
    pub fn update(&self) -> Result<SidebarSummary> {
        let entries = self.scan()?;
        let content = render_sidebar(&entries, Utc::now());
        write_atomic(&self.sidebar_path, content.as_bytes())?;

        info!(posts = entries.len(), "sidebar regenerated");
        Ok(SidebarSummary {
            path: self.sidebar_path.clone(),
            posts: entries.len(),
        })
    }

    /// Every post, in sidebar order. Unreadable posts are skipped with a warning.
    pub fn scan(&self) -> Result<Vec<SidebarEntry>> {
        let mut entries = Vec::new();
        for path in list_posts(&self.posts_dir)? {
            match self.entry_for(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping post in sidebar"),
            }
        }
        sort_entries(&mut entries);
        debug!(posts = entries.len(), "corpus scanned");
        Ok(entries)
    }

    fn entry_for(&self, path: &Path) -> Result<SidebarEntry> {
        let content = std::fs::read_to_string(path).map_err(|e| QuillpinError::io(path, e))?;
        let post = Post::parse(&content)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = file_name.strip_suffix(".md").unwrap_or(&file_name);

        let title = post
            .front
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| first_heading(&post.body))
            .unwrap_or_else(|| strip_date_prefix(stem).to_string());

        let date = post
            .front
            .extra_str("date")
            .and_then(|d| parse_date(&d))
            .or_else(|| filename_date(&file_name));

        let category = post
            .front
            .extra_str("category")
            .or_else(|| body_category(&post.body))
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let relative_path = relative_slash_path(path, &self.posts_dir);
        let (dir_year, dir_month) = year_month_dirs(&relative_path);
        let year = dir_year.or(date.map(|d| d.year()));
        let month = dir_month.or(date.map(|d| d.month()));

        let link = match self.sidebar_path.parent() {
            Some(base) if path.starts_with(base) && !base.as_os_str().is_empty() => {
                relative_slash_path(path, base)
            }
            _ => relative_slash_path(path, self.posts_dir.parent().unwrap_or(Path::new(""))),
        };

        Ok(SidebarEntry {
            title,
            date,
            year,
            month,
            category,
            link,
            relative_path,
        })
    }
}

/// Every `.md` file under `dir`, sorted by path. A missing directory is empty.
pub fn list_posts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if dir.is_dir() {
        collect_markdown(dir, &mut out)?;
    }
    out.sort();
    Ok(out)
}

fn collect_markdown(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| QuillpinError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| QuillpinError::io(dir, e))?.path();
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }
        if path.is_dir() {
            collect_markdown(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "md") {
            out.push(path);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Ordering + rendering
// ---------------------------------------------------------------------------

/// Year desc, month desc, date desc, then relative path asc. Undated sorts last.
pub fn sort_entries(entries: &mut [SidebarEntry]) {
    entries.sort_by(|a, b| {
        b.year
            .cmp(&a.year)
            .then(b.month.cmp(&a.month))
            .then(b.date.cmp(&a.date))
            .then_with(|| a.relative_path.cmp(&b.relative_path))
    });
}

/// Render the sidebar. Entries must already be in sidebar order.
pub fn render_sidebar(entries: &[SidebarEntry], generated_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "{BANNER_PREFIX}{} -->\n\n* [Home](/)\n\n",
        generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    );

    if entries.is_empty() {
        return out;
    }

    out.push_str("* [Recent Posts](#recent-posts)\n");
    for entry in entries.iter().take(RECENT_LIMIT) {
        out.push_str(&format!("  * {}\n", link(entry)));
    }
    out.push('\n');

    // Archive: year -> month -> entries, newest first.
    let mut archive: BTreeMap<Option<i32>, BTreeMap<Option<u32>, Vec<&SidebarEntry>>> =
        BTreeMap::new();
    for entry in entries {
        archive
            .entry(entry.year)
            .or_default()
            .entry(entry.month)
            .or_default()
            .push(entry);
    }
    out.push_str("* [Archives](#archives)\n");
    for (year, months) in archive.iter().rev() {
        match year {
            Some(y) => out.push_str(&format!("  * [{y}](#{y})\n")),
            None => out.push_str("  * [Undated](#undated)\n"),
        }
        for (month, posts) in months.iter().rev() {
            let (label, anchor) = match (year, month) {
                (Some(y), Some(m)) => (month_name(*m).to_string(), format!("{y}-{m:02}")),
                (Some(y), None) => ("Unknown month".to_string(), format!("{y}")),
                _ => ("Undated".to_string(), "undated".to_string()),
            };
            out.push_str(&format!("    * [{label} ({})](#{anchor})\n", posts.len()));
            for entry in posts {
                out.push_str(&format!("      * {}\n", link(entry)));
            }
        }
    }
    out.push('\n');

    let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in entries {
        *categories.entry(entry.category.as_str()).or_default() += 1;
    }
    out.push_str("* [Categories](#categories)\n");
    for (category, count) in categories {
        out.push_str(&format!(
            "  * [{} ({count})](posts/?category={})\n",
            escape_link_text(category),
            urlencoding::encode(category)
        ));
    }
    out.push('\n');

    out
}

/// Sidebar text without the timestamp banner, for change comparisons.
pub fn strip_banner(sidebar: &str) -> &str {
    if sidebar.starts_with(BANNER_PREFIX) {
        sidebar.split_once('\n').map_or("", |(_, rest)| rest)
    } else {
        sidebar
    }
}

fn link(entry: &SidebarEntry) -> String {
    let href: Vec<_> = entry.link.split('/').map(urlencoding::encode).collect();
    format!("[{}]({})", escape_link_text(&entry.title), href.join("/"))
}

fn escape_link_text(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

fn month_name(month: u32) -> &'static str {
    const NAMES: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    month
        .checked_sub(1)
        .and_then(|i| NAMES.get(i as usize))
        .copied()
        .unwrap_or("Unknown month")
}

// ---------------------------------------------------------------------------
// Path + date helpers
// ---------------------------------------------------------------------------

fn relative_slash_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `YYYY/MM/...` directory layout under the posts root.
fn year_month_dirs(relative: &str) -> (Option<i32>, Option<u32>) {
    let parts: Vec<&str> = relative.split('/').collect();
    if parts.len() < 2 {
        return (None, None);
    }
    let year = Some(parts[0])
        .filter(|p| p.len() == 4)
        .and_then(|p| p.parse::<i32>().ok());
    let month = if parts.len() >= 3 {
        Some(parts[1])
            .filter(|p| p.len() == 2)
            .and_then(|p| p.parse::<u32>().ok())
            .filter(|m| (1..=12).contains(m))
    } else {
        None
    };
    match year {
        Some(_) => (year, month),
        None => (None, None),
    }
}

/// `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn fixture() -> (tempfile::TempDir, DerivedViewUpdater) {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("docs");
        write(&docs, "posts/2024/03/2024-03-05-spring.md", "# Spring Notes\n\n**Category:** travel\n");
        write(&docs, "posts/2024/03/2024-03-20-later.md", "---\ntitle: Later in March\n---\nbody");
        write(&docs, "posts/2024/11/2024-11-02-autumn.md", "---\ncategory: travel\n---\nno heading");
        write(&docs, "posts/2023/12/2023-12-31-eve.md", "# Eve\n");
        write(&docs, "posts/drafts/idea.md", "just an idea");
        let updater = DerivedViewUpdater::new(docs.join("posts"), docs.join("_sidebar.md"));
        (tmp, updater)
    }

    #[test]
    fn scan_orders_newest_first() {
        let (_tmp, updater) = fixture();
        let entries = updater.scan().unwrap();
        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(
            titles,
            ["autumn", "Later in March", "Spring Notes", "Eve", "idea"]
        );
        assert_eq!(entries[0].category, "travel");
        assert_eq!(entries[1].category, "general");
        assert_eq!(entries[2].category, "travel");
        assert_eq!(entries[0].link, "posts/2024/11/2024-11-02-autumn.md");
        assert_eq!(entries[4].year, None);
    }

    #[test]
    fn ties_break_on_path() {
        let mut entries = vec![
            SidebarEntry {
                title: "b".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1),
                year: Some(2024),
                month: Some(1),
                category: "general".into(),
                link: "b.md".into(),
                relative_path: "2024/01/b.md".into(),
            },
            SidebarEntry {
                title: "a".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1),
                year: Some(2024),
                month: Some(1),
                category: "general".into(),
                link: "a.md".into(),
                relative_path: "2024/01/a.md".into(),
            },
        ];
        sort_entries(&mut entries);
        assert_eq!(entries[0].title, "a");
    }

    #[test]
    fn render_has_recent_archive_and_categories() {
        let (_tmp, updater) = fixture();
        let entries = updater.scan().unwrap();
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let text = render_sidebar(&entries, at);

        assert!(text.starts_with(
            "<!-- Auto-generated sidebar - Last updated: 2025-01-02T03:04:05.000Z -->"
        ));
        assert!(text.contains("  * [autumn](posts/2024/11/2024-11-02-autumn.md)\n"));
        assert!(text.contains("    * [March (2)](#2024-03)\n"));
        assert!(text.contains("    * [December (1)](#2023-12)\n"));
        assert!(text.contains("  * [Undated](#undated)\n"));
        assert!(text.contains("  * [general (3)](posts/?category=general)\n"));
        assert!(text.contains("  * [travel (2)](posts/?category=travel)\n"));

        let year_2024 = text.find("  * [2024](#2024)").unwrap();
        let year_2023 = text.find("  * [2023](#2023)").unwrap();
        assert!(year_2024 < year_2023);
    }

    #[test]
    fn reserved_characters_are_escaped_in_links() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "posts/2024/05/2024-05-01-faq #1.md",
            "---\ncategory: \"Q&A #1\"\n---\n# FAQ\n",
        );
        let updater = DerivedViewUpdater::new(tmp.path().join("posts"), tmp.path().join("_sidebar.md"));
        let text = render_sidebar(&updater.scan().unwrap(), Utc::now());

        assert!(text.contains("  * [Q&A #1 (1)](posts/?category=Q%26A%20%231)\n"));
        assert!(text.contains("[FAQ](posts/2024/05/2024-05-01-faq%20%231.md)"));
    }

    #[test]
    fn recent_list_is_capped() {
        let tmp = tempfile::tempdir().unwrap();
        for day in 1..=15 {
            write(
                tmp.path(),
                &format!("posts/2024/01/2024-01-{day:02}-p{day}.md"),
                &format!("# Post {day}\n"),
            );
        }
        let updater = DerivedViewUpdater::new(tmp.path().join("posts"), tmp.path().join("_sidebar.md"));
        let text = render_sidebar(&updater.scan().unwrap(), Utc::now());
        let recent = text
            .split("* [Archives]")
            .next()
            .unwrap()
            .matches("  * [Post ")
            .count();
        assert_eq!(recent, RECENT_LIMIT);
        assert!(text.contains("[January (15)](#2024-01)"));
    }

    #[test]
    fn update_is_idempotent_apart_from_banner() {
        let (_tmp, updater) = fixture();
        updater.update().unwrap();
        let first = std::fs::read_to_string(updater.sidebar_path()).unwrap();
        updater.update().unwrap();
        let second = std::fs::read_to_string(updater.sidebar_path()).unwrap();
        assert_eq!(strip_banner(&first), strip_banner(&second));
    }

    #[test]
    fn empty_corpus_renders_banner_and_home() {
        let tmp = tempfile::tempdir().unwrap();
        let updater = DerivedViewUpdater::new(tmp.path().join("posts"), tmp.path().join("_sidebar.md"));
        let summary = updater.update().unwrap();
        assert_eq!(summary.posts, 0);
        let text = std::fs::read_to_string(&summary.path).unwrap();
        assert!(text.contains("* [Home](/)"));
        assert!(!text.contains("Recent Posts"));
    }

    #[test]
    fn frontmatter_date_wins_over_file_name() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "posts/2024-01-01-x.md", "---\ndate: 2023-06-15\n---\n# X\n");
        let updater = DerivedViewUpdater::new(tmp.path().join("posts"), tmp.path().join("_sidebar.md"));
        let entries = updater.scan().unwrap();
        assert_eq!(entries[0].date, NaiveDate::from_ymd_opt(2023, 6, 15));
        assert_eq!(entries[0].year, Some(2023));
        assert_eq!(entries[0].month, Some(6));
    }
}
