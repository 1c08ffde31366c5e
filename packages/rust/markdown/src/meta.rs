//! Metadata that lives outside the frontmatter: headings, dated file names,
//! inline `**Category:**` lines.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t]*$").expect("valid regex"));

static DATE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})-?").expect("valid regex"));

static CATEGORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:\*\*Category:\*\*|Category:)[ \t]*(.+?)[ \t]*$").expect("valid regex")
});

/// Text of the first `# ` heading in the body.
pub fn first_heading(body: &str) -> Option<String> {
    H1_RE
        .captures(body)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Date encoded as a `YYYY-MM-DD-` file name prefix.
pub fn filename_date(file_name: &str) -> Option<NaiveDate> {
    let caps = DATE_PREFIX_RE.captures(file_name)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

/// File stem with any `YYYY-MM-DD-` prefix removed.
pub fn strip_date_prefix(stem: &str) -> &str {
    match DATE_PREFIX_RE.find(stem) {
        Some(m) if m.end() < stem.len() => &stem[m.end()..],
        _ => stem,
    }
}

/// Category declared inline in the body.
pub fn body_category(body: &str) -> Option<String> {
    CATEGORY_RE
        .captures(body)
        .map(|c| c[1].trim().to_string())
        .filter(|c| !c.is_empty())
}

/// `YYYY-MM-DD-<slug>.md` for a new post. The slug keeps ASCII letters,
/// digits and spaces (as dashes), capped at 50 characters.
pub fn file_name_for(title: &str, date: NaiveDate) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    let mut slug = cleaned.split_whitespace().collect::<Vec<_>>().join("-");
    slug.truncate(50);
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "post" } else { slug };

    format!("{}-{slug}.md", date.format("%Y-%m-%d"))
}
