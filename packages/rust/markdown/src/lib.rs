//! Post file model: YAML frontmatter + markdown body.
//!
//! A post on disk looks like:
//!
//! ```text
//! ---
//! title: Hello
//! tags:
//! - rust
//! enhance: true
//! ---
//! Body text...
//! ```
//!
//! Unknown frontmatter keys (`date`, `category`, anything hand-written) are
//! carried through a parse/render cycle untouched, in their original order.

mod meta;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml_ng::{Mapping, Value};
use tracing::debug;

use quillpin_shared::{QuillpinError, Result};

pub use meta::{body_category, file_name_for, filename_date, first_heading, strip_date_prefix};

// ---------------------------------------------------------------------------
// Frontmatter
// ---------------------------------------------------------------------------

/// Structured metadata block at the top of a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontMatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Accepts either a YAML list or a comma-separated string on input.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_tags"
    )]
    pub tags: Option<Vec<String>>,

    /// Request a one-shot body rewrite on the next enhancement pass.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enhance: bool,

    /// Every other key, preserved verbatim.
    #[serde(flatten)]
    pub extra: Mapping,
}

impl FrontMatter {
    pub fn title_is_absent(&self) -> bool {
        is_blank(self.title.as_deref())
    }

    pub fn summary_is_absent(&self) -> bool {
        is_blank(self.summary.as_deref())
    }

    pub fn tags_are_absent(&self) -> bool {
        self.tags.as_ref().is_none_or(|t| t.iter().all(|s| s.trim().is_empty()))
    }

    /// String value of an extra key (`date`, `category`, ...).
    pub fn extra_str(&self, key: &str) -> Option<String> {
        match self.extra.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.summary.is_none()
            && self.tags.is_none()
            && !self.enhance
            && self.extra.is_empty()
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagsRepr {
    List(Vec<String>),
    Text(String),
}

fn deserialize_tags<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<TagsRepr>::deserialize(deserializer)?;
    Ok(repr.map(|r| match r {
        TagsRepr::List(list) => list,
        TagsRepr::Text(text) => text
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    }))
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// A parsed post file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub front: FrontMatter,
    pub body: String,
}

impl Post {
    /// Parse a post file. Files without a leading `---` block are all body.
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let Some((yaml, body)) = split_frontmatter(content) else {
            return Ok(Self {
                front: FrontMatter::default(),
                body: content.to_string(),
            });
        };

        let front = if yaml.trim().is_empty() {
            FrontMatter::default()
        } else {
            serde_yaml_ng::from_str(yaml)
                .map_err(|e| QuillpinError::parse(format!("invalid frontmatter: {e}")))?
        };

        debug!(yaml_len = yaml.len(), body_len = body.len(), "parsed post");

        Ok(Self {
            front,
            body: body.to_string(),
        })
    }

    /// Render back to file form. A post with no metadata renders as bare body.
    pub fn render(&self) -> Result<String> {
        if self.front.is_empty() {
            return Ok(self.body.clone());
        }

        let yaml = serde_yaml_ng::to_string(&self.front)
            .map_err(|e| QuillpinError::parse(format!("failed to serialize frontmatter: {e}")))?;

        let mut out = String::with_capacity(yaml.len() + self.body.len() + 8);
        out.push_str("---\n");
        out.push_str(&yaml);
        if !yaml.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("---\n");
        out.push_str(&self.body);
        Ok(out)
    }

    /// Body length in characters, ignoring surrounding whitespace.
    pub fn body_chars(&self) -> usize {
        self.body.trim().chars().count()
    }
}

/// Split `---\n<yaml>\n---\n<body>`. Returns `None` when there is no block.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "---" || trimmed == "..." {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }

    // Unterminated block: treat the whole file as body.
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
