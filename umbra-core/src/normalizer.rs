//! Text normalization profiles for scoring, display and keyword analysis
//!
//! A [`NormalizeProfile`] is a fixed set of toggles applied in this order:
//! NFC, accent stripping, lowercasing, whitespace collapsing, punctuation
//! stripping, stopword removal, word-boundary truncation.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static HORIZONTAL_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());
static NONSPACING_MARKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Mn}+").unwrap());
static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").unwrap());

const PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '\'', '"', '(', ')', '[', ']', '{', '}', '<', '>',
];

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "an", "the", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us",
    "them", "my", "your", "his", "its", "our", "their", "in", "on", "at", "to", "for", "of",
    "with", "from", "by", "about", "as", "into", "through", "and", "or", "but", "if", "while",
    "because", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do",
    "does", "did", "will", "would", "could", "should", "may", "might", "this", "that", "these",
    "those", "what", "which", "who", "where", "when", "why", "how", "not", "no", "yes",
];

/// Lowercase word set removed by profiles with `remove_stopwords`
#[derive(Debug, Clone)]
pub struct StopwordSet {
    words: HashSet<String>,
}

impl Default for StopwordSet {
    fn default() -> Self {
        Self {
            words: ENGLISH_STOPWORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl StopwordSet {
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    /// Add an extra stopword (stored lowercased)
    pub fn add(&mut self, word: &str) {
        self.words.insert(word.to_lowercase());
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Normalization toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeProfile {
    pub unicode_nfc: bool,
    pub strip_accents: bool,
    pub lowercase: bool,
    pub collapse_whitespace: bool,
    pub strip_punctuation: bool,
    pub remove_stopwords: bool,
    /// Maximum length in characters, cut at a word boundary
    pub max_length: Option<usize>,
}

impl NormalizeProfile {
    /// Everything on; used before extraction and scoring
    pub fn scoring(max_length: usize) -> Self {
        Self {
            unicode_nfc: true,
            strip_accents: true,
            lowercase: true,
            collapse_whitespace: true,
            strip_punctuation: true,
            remove_stopwords: true,
            max_length: Some(max_length),
        }
    }

    /// Keeps case and punctuation; used for stored summaries
    pub fn display(max_length: usize) -> Self {
        Self {
            unicode_nfc: true,
            strip_accents: false,
            lowercase: false,
            collapse_whitespace: true,
            strip_punctuation: false,
            remove_stopwords: false,
            max_length: Some(max_length),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub summary_max_length: usize,
    pub scoring_max_length: usize,
    /// Minimum token length kept by the keywords profile
    pub keyword_min_length: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            summary_max_length: 1_000,
            scoring_max_length: 50_000,
            keyword_min_length: 3,
        }
    }
}

/// Normalized text and its whitespace word count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub word_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
    stopwords: StopwordSet,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self {
            config,
            stopwords: StopwordSet::default(),
        }
    }

    pub fn with_stopwords(mut self, stopwords: StopwordSet) -> Self {
        self.stopwords = stopwords;
        self
    }

    pub fn stopwords_mut(&mut self) -> &mut StopwordSet {
        &mut self.stopwords
    }

    /// Apply a profile to text
    pub fn normalize(&self, text: &str, profile: &NormalizeProfile) -> NormalizedText {
        let mut out = text.to_string();

        if profile.unicode_nfc {
            out = out.nfc().collect();
        }

        if profile.strip_accents {
            out = strip_accents(&out);
        }

        if profile.lowercase {
            out = out.to_lowercase();
        }

        if profile.collapse_whitespace {
            out = collapse_whitespace(&out);
        }

        if profile.strip_punctuation {
            out = strip_punctuation(&out);
            if profile.collapse_whitespace {
                out = collapse_whitespace(&out);
            }
        }

        if profile.remove_stopwords {
            out = out
                .split_whitespace()
                .filter(|word| !self.stopwords.contains(word))
                .collect::<Vec<_>>()
                .join(" ");
        }

        if let Some(max) = profile.max_length {
            out = truncate_at_word(&out, max);
        }

        let word_count = out.split_whitespace().count();
        NormalizedText {
            text: out,
            word_count,
        }
    }

    pub fn normalize_for_scoring(&self, text: &str) -> NormalizedText {
        self.normalize(text, &NormalizeProfile::scoring(self.config.scoring_max_length))
    }

    pub fn normalize_for_display(&self, text: &str) -> NormalizedText {
        self.normalize(text, &NormalizeProfile::display(self.config.summary_max_length))
    }

    /// Scoring-normalize, then split into tokens of the minimum keyword length
    pub fn normalize_for_keywords(&self, text: &str) -> Vec<String> {
        self.normalize_for_scoring(text)
            .text
            .split_whitespace()
            .filter(|w| w.chars().count() >= self.config.keyword_min_length)
            .map(str::to_string)
            .collect()
    }
}

/// NFD, drop nonspacing marks (Mn), recompose
fn strip_accents(text: &str) -> String {
    let decomposed: String = text.nfd().collect();
    NONSPACING_MARKS.replace_all(&decomposed, "").nfc().collect()
}

fn collapse_whitespace(text: &str) -> String {
    let text = HORIZONTAL_WS.replace_all(text.trim(), " ");
    BLANK_LINES.replace_all(&text, "\n").into_owned()
}

/// Strip punctuation from token edges only
///
/// Interior characters stay so `host.onion`, `10.0.0.1` and `a@b.io` survive.
fn strip_punctuation(text: &str) -> String {
    TOKEN
        .replace_all(text, |caps: &Captures| {
            caps[0].trim_matches(|c| PUNCTUATION.contains(&c)).to_string()
        })
        .into_owned()
}

/// Truncate to at most `max` characters, backing off to the last whitespace
fn truncate_at_word(text: &str, max: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max) else {
        return text.to_string();
    };

    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };

    head.trim_end().to_string()
}
