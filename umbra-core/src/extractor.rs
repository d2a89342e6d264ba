//! Indicator extraction from normalized page text
//!
//! Supports extraction of:
//! - Onion service hosts
//! - Cryptocurrency addresses (Bitcoin, Ethereum, Monero) with shape validation
//! - Emails, phone numbers
//! - CVE identifiers
//! - IPv4 addresses and clearnet domains
//! - Threat keywords with frequency counts
//!
//! Patterns live in a static registry; adding an indicator type means adding a
//! row to [`PATTERNS`], not touching the extraction loop.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

use crate::crypto::{validate_bitcoin, validate_ethereum, validate_monero};
use crate::keywords::KeywordExtractor;

/// Indicator categories recognised by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Onion,
    Bitcoin,
    Monero,
    Ethereum,
    Email,
    Cve,
    Ipv4,
    Domain,
    Phone,
}

static ONION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z2-7]{16,56}\.onion\b").unwrap()
});

static BITCOIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:bc1|[13])[a-zA-HJ-NP-Z0-9]{25,89}\b").unwrap()
});

static MONERO_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[48][a-zA-Z0-9]{94}\b").unwrap()
});

static ETHEREUM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b0x[a-fA-F0-9]{40}\b").unwrap()
});

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b").unwrap()
});

static CVE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bCVE-\d{4}-\d{4,7}\b").unwrap()
});

static IPV4_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b").unwrap()
});

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9][a-z0-9-]{0,61}[a-z0-9]\b").unwrap()
});

static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?\d{1,4}[-.\s]?\(?\d{1,4}\)?[-.\s]?\d{1,4}[-.\s]?\d{1,9}").unwrap()
});

/// One row of the pattern registry
pub struct Pattern {
    pub kind: PatternType,
    pub regex: &'static LazyLock<Regex>,
    /// Enabled unless the config says otherwise
    pub enabled_by_default: bool,
    /// Extra check applied to each regex match
    pub validate: Option<fn(&str) -> bool>,
}

fn not_onion(domain: &str) -> bool {
    !domain.to_lowercase().ends_with(".onion")
}

/// Indicator pattern registry
///
/// Domain and phone are off by default; both are noisy on forum text.
pub static PATTERNS: &[Pattern] = &[
    Pattern { kind: PatternType::Onion, regex: &ONION_REGEX, enabled_by_default: true, validate: None },
    Pattern { kind: PatternType::Bitcoin, regex: &BITCOIN_REGEX, enabled_by_default: true, validate: Some(validate_bitcoin) },
    Pattern { kind: PatternType::Monero, regex: &MONERO_REGEX, enabled_by_default: true, validate: Some(validate_monero) },
    Pattern { kind: PatternType::Ethereum, regex: &ETHEREUM_REGEX, enabled_by_default: true, validate: Some(validate_ethereum) },
    Pattern { kind: PatternType::Email, regex: &EMAIL_REGEX, enabled_by_default: true, validate: None },
    Pattern { kind: PatternType::Cve, regex: &CVE_REGEX, enabled_by_default: true, validate: None },
    Pattern { kind: PatternType::Ipv4, regex: &IPV4_REGEX, enabled_by_default: true, validate: None },
    Pattern { kind: PatternType::Domain, regex: &DOMAIN_REGEX, enabled_by_default: false, validate: Some(not_onion) },
    Pattern { kind: PatternType::Phone, regex: &PHONE_REGEX, enabled_by_default: false, validate: None },
];

/// Indicators and keyword statistics extracted from one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub onion_urls: Vec<String>,
    pub domains: Vec<String>,
    pub ip_addresses: Vec<String>,
    pub bitcoin_addrs: Vec<String>,
    pub ethereum_addrs: Vec<String>,
    pub monero_addrs: Vec<String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub cves: Vec<String>,
    /// Top-ranked keywords, most relevant first
    pub keywords: Vec<String>,
    /// Raw frequency of every counted token
    pub keyword_counts: HashMap<String, usize>,
}

impl Features {
    /// Indicator list for a pattern type
    pub fn list(&self, kind: PatternType) -> &[String] {
        match kind {
            PatternType::Onion => &self.onion_urls,
            PatternType::Bitcoin => &self.bitcoin_addrs,
            PatternType::Monero => &self.monero_addrs,
            PatternType::Ethereum => &self.ethereum_addrs,
            PatternType::Email => &self.emails,
            PatternType::Cve => &self.cves,
            PatternType::Ipv4 => &self.ip_addresses,
            PatternType::Domain => &self.domains,
            PatternType::Phone => &self.phones,
        }
    }

    fn list_mut(&mut self, kind: PatternType) -> &mut Vec<String> {
        match kind {
            PatternType::Onion => &mut self.onion_urls,
            PatternType::Bitcoin => &mut self.bitcoin_addrs,
            PatternType::Monero => &mut self.monero_addrs,
            PatternType::Ethereum => &mut self.ethereum_addrs,
            PatternType::Email => &mut self.emails,
            PatternType::Cve => &mut self.cves,
            PatternType::Ipv4 => &mut self.ip_addresses,
            PatternType::Domain => &mut self.domains,
            PatternType::Phone => &mut self.phones,
        }
    }

    pub fn has_crypto(&self) -> bool {
        !self.bitcoin_addrs.is_empty()
            || !self.ethereum_addrs.is_empty()
            || !self.monero_addrs.is_empty()
    }

    pub fn has_vulnerability_info(&self) -> bool {
        !self.cves.is_empty()
    }

    pub fn has_contact_info(&self) -> bool {
        !self.emails.is_empty() || !self.phones.is_empty()
    }

    /// Total number of indicators across all pattern types (keywords excluded)
    pub fn total_matches(&self) -> usize {
        PATTERNS.iter().map(|p| self.list(p.kind).len()).sum()
    }

    /// Number of distinct counted tokens
    pub fn unique_tokens(&self) -> usize {
        self.keyword_counts.len()
    }
}

/// Which patterns run and how many keywords are kept
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    enabled: HashSet<PatternType>,
    pub extract_keywords: bool,
    pub max_keywords: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            enabled: PATTERNS
                .iter()
                .filter(|p| p.enabled_by_default)
                .map(|p| p.kind)
                .collect(),
            extract_keywords: true,
            max_keywords: 50,
        }
    }
}

impl ExtractorConfig {
    pub fn enable(mut self, kind: PatternType) -> Self {
        self.enabled.insert(kind);
        self
    }

    pub fn disable(mut self, kind: PatternType) -> Self {
        self.enabled.remove(&kind);
        self
    }

    pub fn is_enabled(&self, kind: PatternType) -> bool {
        self.enabled.contains(&kind)
    }
}

/// Runs the pattern registry and keyword analysis over text
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    config: ExtractorConfig,
    keywords: KeywordExtractor,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let keywords = KeywordExtractor::new(config.max_keywords);
        Self { config, keywords }
    }

    /// Extract every enabled indicator type plus keywords
    pub fn extract(&self, text: &str) -> Features {
        let mut features = Features::default();

        for pattern in PATTERNS.iter().filter(|p| self.config.is_enabled(p.kind)) {
            *features.list_mut(pattern.kind) = match_pattern(pattern, text);
        }

        if self.config.extract_keywords {
            let (keywords, counts) = self.keywords.extract(text);
            features.keywords = keywords;
            features.keyword_counts = counts;
        }

        debug!(
            "Extracted {} indicators ({} onion, {} btc, {} emails, {} cves), {} keywords",
            features.total_matches(),
            features.onion_urls.len(),
            features.bitcoin_addrs.len(),
            features.emails.len(),
            features.cves.len(),
            features.keywords.len()
        );

        features
    }
}

/// Match one pattern, validate, and dedupe in first-seen order
fn match_pattern(pattern: &Pattern, text: &str) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut values = Vec::new();

    for m in pattern.regex.find_iter(text) {
        let value = m.as_str();
        if let Some(validate) = pattern.validate {
            if !validate(value) {
                continue;
            }
        }
        if seen.insert(value) {
            values.push(value.to_string());
        }
    }

    values
}
