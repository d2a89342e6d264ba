//! HTML and text sanitization
//!
//! Two ammonia policies are applied to the same input:
//! - strict: every tag removed, text kept (plain text)
//! - relaxed: a handful of structural tags kept (safe HTML)
//!
//! Both drop the bodies of scripting and embedding elements. Plain text is
//! then cleaned of control characters and scanned for SQL and shell
//! injection signatures, which are replaced with a filter marker.

use ammonia::Builder;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::warn;

/// Marker written in place of injection signatures
pub const FILTER_MARKER: &str = "[FILTERED]";

const TITLE_MAX_CHARS: usize = 200;

static SQL_INJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(union\s+select|drop\s+table|insert\s+into|delete\s+from|--|;|'|")"#).unwrap()
});

static COMMAND_INJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(&&|\|\||;|`|\$\(|\$\{)").unwrap()
});

static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0D\x0E-\x1F\x7F]").unwrap()
});

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static MULTI_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Elements whose content is dropped along with the tag
const SKIP_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "svg",
];

/// Tags kept by the relaxed policy
const RELAXED_TAGS: &[&str] = &["p", "br", "strong", "em", "u", "h1", "h2", "h3"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("sanitization error: null byte found - text contains disallowed NUL bytes")]
    NullByte,
}

#[derive(Debug, Clone)]
pub struct SanitizerConfig {
    pub max_text_length: usize,
    pub log_dangerous: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_text_length: 50_000,
            log_dangerous: true,
        }
    }
}

/// Output of [`Sanitizer::sanitize`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedContent {
    pub plain_text: String,
    pub safe_html: String,
    /// Injection signatures were found and filtered
    pub was_dangerous: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    config: SanitizerConfig,
}

impl Sanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    pub fn sanitize(&self, html: &str) -> SanitizedContent {
        let plain = strip_to_plain_text(html);
        let safe_html = relaxed_html(html);
        let mut plain_text = self.clean_text(&plain);
        let mut was_dangerous = false;

        if SQL_INJECTION.is_match(&plain_text) {
            if self.config.log_dangerous {
                warn!(pattern = "sql_injection", "Dangerous pattern detected in content");
            }
            was_dangerous = true;
            plain_text = remove_dangerous_patterns(&plain_text);
        }

        if COMMAND_INJECTION.is_match(&plain_text) {
            if self.config.log_dangerous {
                warn!(pattern = "command_injection", "Dangerous pattern detected in content");
            }
            was_dangerous = true;
            plain_text = remove_dangerous_patterns(&plain_text);
        }

        SanitizedContent {
            plain_text,
            safe_html,
            was_dangerous,
        }
    }

    /// Plain text only
    pub fn sanitize_content(&self, html: &str) -> String {
        self.sanitize(html).plain_text
    }

    /// Strip markup and control characters, collapse whitespace, hard-cut at 200 characters
    pub fn sanitize_title(&self, title: &str) -> String {
        let title = strip_to_plain_text(title);
        let title = CONTROL_CHARS.replace_all(&title, "");
        let title = normalize_whitespace(&title);
        let title = title.trim();

        match title.char_indices().nth(TITLE_MAX_CHARS) {
            Some((cut, _)) => title[..cut].trim_end().to_string(),
            None => title.to_string(),
        }
    }

    /// Reject text that storage cannot hold
    pub fn validate_for_storage(&self, text: &str) -> Result<(), SanitizeError> {
        if text.contains('\0') {
            return Err(SanitizeError::NullByte);
        }
        Ok(())
    }

    /// Drop NUL bytes and normalize line endings to `\n`
    pub fn sanitize_for_storage(&self, text: &str) -> String {
        text.replace('\0', "").replace("\r\n", "\n").replace('\r', "\n")
    }

    fn clean_text(&self, text: &str) -> String {
        let text = CONTROL_CHARS.replace_all(text, "");
        let text = normalize_whitespace(&text);
        truncate_with_ellipsis(text.trim(), self.config.max_text_length)
    }
}

fn normalize_whitespace(text: &str) -> String {
    let text = MULTI_SPACE.replace_all(text, " ");
    MULTI_NEWLINE.replace_all(&text, "\n\n").into_owned()
}

fn remove_dangerous_patterns(text: &str) -> String {
    let text = SQL_INJECTION.replace_all(text, FILTER_MARKER);
    COMMAND_INJECTION.replace_all(&text, FILTER_MARKER).into_owned()
}

/// Cut at `max` bytes (on a char boundary), back off to the last space, add "..."
fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }

    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut head = &text[..cut];
    if let Some(pos) = head.rfind(' ') {
        if pos > 0 {
            head = &head[..pos];
        }
    }

    format!("{head}...")
}

fn content_skip_set() -> HashSet<&'static str> {
    SKIP_CONTENT.iter().copied().collect()
}

/// Strict policy: no tags, no attributes
fn strict_policy() -> Builder<'static> {
    let mut builder = Builder::empty();
    builder.clean_content_tags(content_skip_set());
    builder
}

/// Relaxed policy: a few structural tags, `class` on paragraphs
fn relaxed_policy() -> Builder<'static> {
    let mut builder = Builder::empty();
    builder
        .tags(RELAXED_TAGS.iter().copied().collect())
        .clean_content_tags(content_skip_set())
        .add_tag_attributes("p", &["class"])
        .link_rel(None);
    builder
}

/// Strict-policy text with entities decoded
fn strip_to_plain_text(html: &str) -> String {
    let cleaned = strict_policy().clean(html).to_string();
    html_escape::decode_html_entities(&cleaned).into_owned()
}

fn relaxed_html(html: &str) -> String {
    relaxed_policy().clean(html).to_string()
}
