//! Built-site enumeration with name-based exclusions.

use std::path::{Path, PathBuf};

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use quillpin_shared::{ExcludeMode, QuillpinError, Result};

// ---------------------------------------------------------------------------
// Exclusion filter
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Matcher {
    Exact(String),
    Pattern { exact: String, re: Regex },
}

/// Rejects entries by bare name (files and directories alike).
///
/// A pattern without `*` matches the exact name only. A pattern with `*`
/// also matches the name in full, or as a regex:
/// - [`ExcludeMode::Loose`]: `*` becomes `.*`, the rest is used as-is, no anchors
///   (`*.tmp` matches `atmpx`).
/// - [`ExcludeMode::Anchored`]: literal text escaped, anchored at both ends.
#[derive(Debug)]
pub struct ExclusionFilter {
    matchers: Vec<Matcher>,
}

impl ExclusionFilter {
    pub fn new(patterns: &[String], mode: ExcludeMode) -> Result<Self> {
        let matchers = patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| {
                if !p.contains('*') {
                    return Ok(Matcher::Exact(p.to_string()));
                }
                let source = match mode {
                    ExcludeMode::Loose => p.replace('*', ".*"),
                    ExcludeMode::Anchored => {
                        format!("^{}$", regex::escape(p).replace(r"\*", ".*"))
                    }
                };
                let re = Regex::new(&source).map_err(|e| {
                    QuillpinError::config(format!("invalid exclude pattern '{p}': {e}"))
                })?;
                Ok(Matcher::Pattern {
                    exact: p.to_string(),
                    re,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { matchers })
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.matchers.iter().any(|m| match m {
            Matcher::Exact(exact) => exact == name,
            Matcher::Pattern { exact, re } => exact == name || re.is_match(name),
        })
    }
}

// ---------------------------------------------------------------------------
// Site tree
// ---------------------------------------------------------------------------

/// One file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    /// Path relative to the tree root, `/`-separated.
    pub relative: String,
    pub absolute: PathBuf,
    pub size: u64,
}

/// Root directory plus every included file, sorted by relative path.
#[derive(Debug, Clone)]
pub struct SiteTree {
    pub root: PathBuf,
    pub files: Vec<TreeFile>,
}

impl SiteTree {
    /// Walk `root`, skipping excluded names. Excluded directories are not descended.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn scan(root: &Path, filter: &ExclusionFilter) -> Result<Self> {
        if !root.is_dir() {
            return Err(QuillpinError::config(format!(
                "build directory not found: {}",
                root.display()
            )));
        }

        let mut files = Vec::new();
        walk(root, root, filter, &mut files)?;
        files.sort_by(|a, b| a.relative.cmp(&b.relative));

        debug!(files = files.len(), "site tree scanned");
        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Directories implied by the file list, parents before children.
    pub fn directories(&self) -> Vec<String> {
        let mut dirs: Vec<String> = Vec::new();
        for file in &self.files {
            let mut prefix = String::new();
            let parts: Vec<&str> = file.relative.split('/').collect();
            for part in &parts[..parts.len().saturating_sub(1)] {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(part);
                if !dirs.contains(&prefix) {
                    dirs.push(prefix.clone());
                }
            }
        }
        dirs.sort();
        dirs
    }

    /// SHA-256 over each relative path and its contents, in tree order.
    pub fn digest(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        for file in &self.files {
            let bytes =
                std::fs::read(&file.absolute).map_err(|e| QuillpinError::io(&file.absolute, e))?;
            hasher.update(file.relative.as_bytes());
            hasher.update([0u8]);
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

fn walk(root: &Path, dir: &Path, filter: &ExclusionFilter, out: &mut Vec<TreeFile>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| QuillpinError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| QuillpinError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if filter.is_excluded(&name) {
            debug!(name = %name, "excluded");
            continue;
        }

        let path = entry.path();
        // Names travel unescaped in multipart part headers.
        if name.chars().any(|c| c == '"' || c.is_control()) {
            return Err(QuillpinError::config(format!(
                "cannot publish {}: file name contains a quote or control character",
                path.display()
            )));
        }
        let file_type = entry.file_type().map_err(|e| QuillpinError::io(&path, e))?;
        if file_type.is_dir() {
            walk(root, &path, filter, out)?;
            continue;
        }

        // Symlinks are followed for files only.
        let meta = std::fs::metadata(&path).map_err(|e| QuillpinError::io(&path, e))?;
        if !meta.is_file() {
            debug!(path = %path.display(), "skipping non-file entry");
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push(TreeFile {
            relative,
            absolute: path,
            size: meta.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str], mode: ExcludeMode) -> ExclusionFilter {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        ExclusionFilter::new(&owned, mode).expect("filter")
    }

    #[test]
    fn loose_mode_is_unanchored() {
        let f = filter(&["*.tmp"], ExcludeMode::Loose);
        assert!(f.is_excluded("x.tmp"));
        assert!(f.is_excluded("atmpx"));
        assert!(!f.is_excluded("x.html"));
    }

    #[test]
    fn anchored_mode_matches_whole_name() {
        let f = filter(&["*.tmp"], ExcludeMode::Anchored);
        assert!(f.is_excluded("x.tmp"));
        assert!(!f.is_excluded("atmpx"));
        assert!(!f.is_excluded("x.tmp.bak"));
    }

    #[test]
    fn plain_names_match_exactly() {
        let f = filter(&[".git", "node_modules"], ExcludeMode::Loose);
        assert!(f.is_excluded(".git"));
        assert!(!f.is_excluded(".github"));
        assert!(f.is_excluded("node_modules"));
    }

    #[test]
    fn invalid_loose_pattern_is_config_error() {
        let err = ExclusionFilter::new(&["(*".to_string()], ExcludeMode::Loose).unwrap_err();
        assert!(matches!(err, QuillpinError::Config { .. }));
        // The same text is fine when escaped.
        assert!(ExclusionFilter::new(&["(*".to_string()], ExcludeMode::Anchored).is_ok());
    }

    fn site() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("assets/img")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::write(root.join("x.tmp"), "scratch").unwrap();
        std::fs::write(root.join(".DS_Store"), "junk").unwrap();
        std::fs::write(root.join("assets/app.css"), "body{}").unwrap();
        std::fs::write(root.join("assets/img/logo.svg"), "<svg/>").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        tmp
    }

    fn default_filter() -> ExclusionFilter {
        filter(
            &[".DS_Store", "Thumbs.db", "*.tmp", "node_modules", ".git"],
            ExcludeMode::Loose,
        )
    }

    #[test]
    fn scan_skips_excluded_files_and_directories() {
        let tmp = site();
        let tree = SiteTree::scan(tmp.path(), &default_filter()).unwrap();
        let rels: Vec<&str> = tree.files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(rels, ["assets/app.css", "assets/img/logo.svg", "index.html"]);
        assert_eq!(tree.total_bytes(), 6 + 6 + 11);
        assert_eq!(tree.directories(), ["assets", "assets/img"]);
    }

    #[test]
    fn junk_and_temp_files_are_excluded_in_both_modes() {
        for mode in [ExcludeMode::Loose, ExcludeMode::Anchored] {
            let f = filter(&[".DS_Store", "*.tmp"], mode);
            assert!(f.is_excluded(".DS_Store"), "{mode:?}");
            assert!(f.is_excluded("build.tmp"), "{mode:?}");
            assert!(!f.is_excluded("keep.md"), "{mode:?}");

            let tmp = tempfile::tempdir().unwrap();
            for name in [".DS_Store", "build.tmp", "keep.md"] {
                std::fs::write(tmp.path().join(name), name).unwrap();
            }
            let tree = SiteTree::scan(tmp.path(), &f).unwrap();
            let kept: Vec<&str> = tree.files.iter().map(|file| file.relative.as_str()).collect();
            assert_eq!(kept, ["keep.md"], "{mode:?}");
        }
    }

    #[test]
    fn header_unsafe_names_are_rejected() {
        for name in ["say \"hi\".html", "line\nbreak.html"] {
            let tmp = tempfile::tempdir().unwrap();
            std::fs::write(tmp.path().join("index.html"), "ok").unwrap();
            std::fs::create_dir(tmp.path().join("posts")).unwrap();
            std::fs::write(tmp.path().join("posts").join(name), "x").unwrap();
            let err = SiteTree::scan(tmp.path(), &default_filter()).unwrap_err();
            assert!(matches!(err, QuillpinError::Config { .. }), "{name:?}");
        }
    }

    #[test]
    fn missing_root_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = SiteTree::scan(&tmp.path().join("nope"), &default_filter()).unwrap_err();
        assert!(matches!(err, QuillpinError::Config { .. }));
    }

    #[test]
    fn digest_tracks_content() {
        let tmp = site();
        let a = SiteTree::scan(tmp.path(), &default_filter()).unwrap().digest().unwrap();
        let b = SiteTree::scan(tmp.path(), &default_filter()).unwrap().digest().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        std::fs::write(tmp.path().join("index.html"), "<h1>changed</h1>").unwrap();
        let c = SiteTree::scan(tmp.path(), &default_filter()).unwrap().digest().unwrap();
        assert_ne!(a, c);

        // Excluded files do not affect it.
        std::fs::write(tmp.path().join("y.tmp"), "more scratch").unwrap();
        let d = SiteTree::scan(tmp.path(), &default_filter()).unwrap().digest().unwrap();
        assert_eq!(c, d);
    }
}
