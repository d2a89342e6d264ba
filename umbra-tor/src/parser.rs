//! HTML document parsing
//!
//! Extracts title, author, publish date and main content using ordered CSS
//! selector candidates, plus links and images. Non-content elements are
//! removed from the tree before anything is read.

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

use crate::dates::{extract_date_from_text, parse_date};

const DEFAULT_TITLE: &str = "Untitled";
const DEFAULT_AUTHOR: &str = "Unknown";

static MULTI_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

static NON_CONTENT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("script, style, link, meta, noscript, iframe, svg").unwrap()
});

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static IMAGES: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img[src]").unwrap());

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
    "article", "section", "header", "footer", "table", "ul", "ol", "hr",
];

/// Ordered selector candidates per field
pub struct SelectorStrategy {
    pub title: Vec<Selector>,
    pub content: Vec<Selector>,
    pub author: Vec<Selector>,
    pub date: Vec<Selector>,
}

fn compile(selectors: &[&str]) -> Vec<Selector> {
    selectors.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

impl Default for SelectorStrategy {
    fn default() -> Self {
        Self {
            title: compile(&[
                "h1.post-title",
                "h1.title",
                "div.post-header h1",
                ".entry-title",
                "article h1",
                "h1",
                "h2",
                "title",
            ]),
            content: compile(&[
                "div.post-content",
                "div.entry-content",
                "article.post",
                ".post-body",
                ".content",
                "div.message-body",
                "article",
                "main",
                "body",
            ]),
            author: compile(&[
                ".author",
                ".post-author",
                ".username",
                "span.user",
                "a.author-link",
                "div.author-info",
            ]),
            date: compile(&[
                "time",
                ".post-date",
                ".published",
                ".date",
                "span.timestamp",
                ".entry-date",
            ]),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("document is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub extract_links: bool,
    pub extract_images: bool,
    pub save_raw_html: bool,
    /// Content limit in bytes
    pub max_content_len: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            extract_links: true,
            extract_images: false,
            save_raw_html: false,
            max_content_len: 50_000,
        }
    }
}

/// Structured fields read from one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedData {
    pub url: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Word count before truncation
    pub word_count: usize,
    pub links: Vec<String>,
    pub image_urls: Vec<String>,
    pub raw_html: Option<String>,
}

#[derive(Default)]
pub struct Parser {
    config: ParserConfig,
    strategy: SelectorStrategy,
}

impl Parser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            strategy: SelectorStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SelectorStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn parse(&self, html: &[u8], url: &str) -> Result<ParsedData, ParseError> {
        let html = std::str::from_utf8(html).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

        let mut document = Html::parse_document(html);
        strip_non_content(&mut document);

        let title = self
            .first_text(&document, &self.strategy.title)
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let author = self
            .first_text(&document, &self.strategy.author)
            .unwrap_or_else(|| DEFAULT_AUTHOR.to_string());
        let published_at = self.extract_date(&document);
        let mut content = self.extract_content(&document);
        let word_count = content.split_whitespace().count();

        let links = if self.config.extract_links {
            collect_attr(&document, &LINKS, "href", |href| href != "#")
        } else {
            Vec::new()
        };

        let image_urls = if self.config.extract_images {
            collect_attr(&document, &IMAGES, "src", |_| true)
        } else {
            Vec::new()
        };

        if content.len() > self.config.max_content_len {
            content = truncate_text(&content, self.config.max_content_len);
        }

        debug!(
            "Parsed {}: title={:?}, {} words, {} links",
            url,
            title,
            word_count,
            links.len()
        );

        Ok(ParsedData {
            url: url.to_string(),
            title,
            content,
            author,
            published_at,
            word_count,
            links,
            image_urls,
            raw_html: self.config.save_raw_html.then(|| html.to_string()),
        })
    }

    fn first_text(&self, document: &Html, selectors: &[Selector]) -> Option<String> {
        selectors.iter().find_map(|selector| {
            let text: String = document.select(selector).next()?.text().collect();
            let text = clean_text(&text);
            (!text.is_empty()).then_some(text)
        })
    }

    fn extract_date(&self, document: &Html) -> Option<DateTime<Utc>> {
        self.strategy.date.iter().find_map(|selector| {
            let element = document.select(selector).next()?;
            element
                .value()
                .attr("datetime")
                .and_then(parse_date)
                .or_else(|| extract_date_from_text(&element.text().collect::<String>()))
        })
    }

    /// First selector with any match wins; matches are joined as paragraphs
    fn extract_content(&self, document: &Html) -> String {
        for selector in &self.strategy.content {
            let elements: Vec<ElementRef> = document.select(selector).collect();
            if elements.is_empty() {
                continue;
            }

            let parts: Vec<String> = elements
                .into_iter()
                .map(|element| {
                    let rich = block_text(element);
                    if rich.trim().is_empty() {
                        element.text().collect()
                    } else {
                        rich
                    }
                })
                .collect();

            return clean_text(&parts.join("\n\n"));
        }

        let root = document
            .select(&BODY)
            .next()
            .unwrap_or_else(|| document.root_element());
        clean_text(&root.text().collect::<String>())
    }
}

fn strip_non_content(document: &mut Html) {
    let ids: Vec<_> = document.select(&NON_CONTENT).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Text with line breaks at block boundaries and whitespace runs collapsed
fn block_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    render_block(element, &mut out);

    out.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_block(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let mut words = text.split_whitespace().peekable();
                if words.peek().is_none() {
                    if !text.is_empty() && !out.ends_with([' ', '\n']) {
                        out.push(' ');
                    }
                    continue;
                }
                if text.starts_with(char::is_whitespace) && !out.ends_with([' ', '\n']) {
                    out.push(' ');
                }
                out.push_str(&words.collect::<Vec<_>>().join(" "));
                if text.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
            }
            Node::Element(el) => {
                let is_block = BLOCK_TAGS.contains(&el.name());
                if is_block && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    render_block(child_el, out);
                }
                if is_block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn collect_attr(
    document: &Html,
    selector: &Selector,
    attr: &str,
    keep: impl Fn(&str) -> bool,
) -> Vec<String> {
    let mut seen = HashSet::new();
    document
        .select(selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty() && keep(*value))
        .filter(|value| seen.insert(value.to_string()))
        .map(str::to_string)
        .collect()
}

/// Trim, collapse 3+ newlines, drop control characters other than `\n` and `\t`
pub fn clean_text(text: &str) -> String {
    let text = MULTI_NEWLINE.replace_all(text.trim(), "\n\n");
    text.chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect()
}

/// Cut at `max` bytes, back off to the last space, append "..."
pub fn truncate_text(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }

    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }

    let head = &text[..cut];
    let head = match head.rfind(' ') {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };

    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const FORUM_PAGE: &str = r##"
        <html>
        <head>
            <title>Dread - Market Talk</title>
            <meta charset="utf-8">
            <style>.post { color: red; }</style>
            <script>var tracker = 1;</script>
        </head>
        <body>
            <div class="post-header"><h1>Selling fresh database dump</h1></div>
            <span class="username">  darkvendor </span>
            <time datetime="2024-03-15T10:30:00Z">two days ago</time>
            <div class="post-content">
                <p>Full dump of   customer table.</p>
                <p>Contact via <a href="http://abc.onion/msg">message</a>.</p>
                <script>alert('x')</script>
            </div>
            <a href="#">top</a>
            <a href="http://abc.onion/msg">dup</a>
            <a href=" /rules ">rules</a>
            <img src="/logo.png">
        </body>
        </html>
    "##;

    #[test]
    fn test_parse_forum_post() {
        let parsed = Parser::default().parse(FORUM_PAGE.as_bytes(), "http://abc.onion/t/1").unwrap();

        assert_eq!(parsed.title, "Selling fresh database dump");
        assert_eq!(parsed.author, "darkvendor");
        assert_eq!(parsed.published_at.map(|d| d.day()), Some(15));
        assert_eq!(parsed.content, "Full dump of customer table.\nContact via message.");
        assert!(!parsed.content.contains("alert"));
        assert_eq!(parsed.word_count, 8);
        assert_eq!(parsed.links, vec!["http://abc.onion/msg", "/rules"]);
        assert!(parsed.image_urls.is_empty());
        assert!(parsed.raw_html.is_none());
    }

    #[test]
    fn test_defaults_when_nothing_matches() {
        let html = b"<html><body><p>just some words here</p></body></html>";
        let parsed = Parser::default().parse(html, "u").unwrap();
        assert_eq!(parsed.title, DEFAULT_TITLE);
        assert_eq!(parsed.author, DEFAULT_AUTHOR);
        assert!(parsed.published_at.is_none());
        assert_eq!(parsed.content, "just some words here");
    }

    #[test]
    fn test_fallback_content_is_body_text() {
        let strategy = SelectorStrategy {
            content: compile(&["div.never-there"]),
            ..SelectorStrategy::default()
        };
        let html = b"<html><head><title>Head title</title></head>\
            <body><p>body words only</p></body></html>";
        let parsed = Parser::default().with_strategy(strategy).parse(html, "u").unwrap();

        assert_eq!(parsed.content, "body words only");
        assert!(!parsed.content.contains("Head title"));
        assert_eq!(parsed.title, "Head title");
    }

    #[test]
    fn test_date_from_text_fallback() {
        let html = b"<html><body><span class=\"post-date\">Posted on 03/15/2024</span></body></html>";
        let parsed = Parser::default().parse(html, "u").unwrap();
        assert_eq!(parsed.published_at.map(|d| (d.month(), d.day())), Some((3, 15)));
    }

    #[test]
    fn test_unparsable_date_is_none() {
        let html = b"<html><body><time>last week</time></body></html>";
        let parsed = Parser::default().parse(html, "u").unwrap();
        assert!(parsed.published_at.is_none());
    }

    #[test]
    fn test_multiple_content_matches_joined() {
        let html = b"<html><body><article>first</article><article>second</article></body></html>";
        let parsed = Parser::default().parse(html, "u").unwrap();
        assert_eq!(parsed.content, "first\n\nsecond");
    }

    #[test]
    fn test_images_and_raw_html_when_enabled() {
        let parser = Parser::new(ParserConfig {
            extract_images: true,
            save_raw_html: true,
            ..Default::default()
        });
        let parsed = parser.parse(FORUM_PAGE.as_bytes(), "u").unwrap();
        assert_eq!(parsed.image_urls, vec!["/logo.png"]);
        assert_eq!(parsed.raw_html.as_deref(), Some(FORUM_PAGE));
    }

    #[test]
    fn test_content_truncated() {
        let parser = Parser::new(ParserConfig {
            max_content_len: 20,
            ..Default::default()
        });
        let html = b"<html><body><main>alpha bravo charlie delta echo</main></body></html>";
        let parsed = parser.parse(html, "u").unwrap();
        assert_eq!(parsed.content, "alpha bravo charlie...");
        assert_eq!(parsed.word_count, 5);
    }

    #[test]
    fn test_invalid_utf8() {
        let err = Parser::default().parse(b"<p>\xff\xfe</p>", "u").unwrap_err();
        assert!(matches!(err, ParseError::InvalidUtf8(_)));
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a\n\n\n\nb\u{7}\tc  "), "a\n\nb\tc");
    }
}
