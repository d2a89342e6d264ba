//! Rule-based criticality scoring
//!
//! Six rules each read the same [`Features`]/content pair and return a
//! sub-score. The sub-scores sum to a raw total, which is clamped to
//! `[0, 100]` and classified against [`CriticalityThresholds`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::criticality::{Criticality, CriticalityThresholds};
use crate::extractor::Features;
use crate::keywords::is_threat_keyword;

/// Per-keyword weights used by the keyword rule
pub static THREAT_SCORE_WEIGHTS: &[(&str, i32)] = &[
    ("0day", 25),
    ("zeroday", 25),
    ("ransomware", 25),
    ("exploit", 20),
    ("vulnerability", 20),
    ("backdoor", 20),
    ("rootkit", 20),
    ("leak", 20),
    ("breach", 20),
    ("rce", 20),
    ("malware", 18),
    ("trojan", 18),
    ("dump", 18),
    ("phishing", 15),
    ("ddos", 15),
    ("bypass", 15),
    ("injection", 15),
    ("lfi", 15),
    ("xss", 15),
    ("sqli", 15),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of a vocabulary word missing from the score table
    pub threat_keyword_base: i32,
    pub threat_keyword_max: i32,
    pub bitcoin_address: i32,
    pub ethereum_address: i32,
    pub monero_address: i32,
    pub max_crypto_score: i32,
    pub cve_identifier: i32,
    pub max_cve_score: i32,
    pub email_address: i32,
    pub phone_number: i32,
    pub onion_url: i32,
    pub ip_address: i32,
    pub keyword_density_multiplier: f64,
    pub long_content_bonus: i32,
    pub empty_content_penalty: i32,
    /// Operator-supplied keyword weights; override the built-in table
    #[serde(default)]
    pub custom_keywords: HashMap<String, i32>,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            threat_keyword_base: 5,
            threat_keyword_max: 40,
            bitcoin_address: 8,
            ethereum_address: 6,
            monero_address: 10,
            max_crypto_score: 25,
            cve_identifier: 15,
            max_cve_score: 30,
            email_address: 3,
            phone_number: 2,
            onion_url: 5,
            ip_address: 3,
            keyword_density_multiplier: 1.5,
            long_content_bonus: 5,
            empty_content_penalty: -10,
            custom_keywords: HashMap::new(),
        }
    }
}

impl ScoringWeights {
    /// Add or override a keyword weight (stored lowercased)
    pub fn with_keyword(mut self, keyword: &str, weight: i32) -> Self {
        self.custom_keywords.insert(keyword.to_lowercase(), weight);
        self
    }

    /// Weight the keyword rule assigns to a token, if it scores at all
    pub fn keyword_weight(&self, keyword: &str) -> Option<i32> {
        let keyword = keyword.to_lowercase();
        if let Some(weight) = self.custom_keywords.get(&keyword) {
            return Some(*weight);
        }
        if let Some((_, weight)) = THREAT_SCORE_WEIGHTS.iter().find(|(k, _)| *k == keyword) {
            return Some(*weight);
        }
        is_threat_keyword(&keyword).then_some(self.threat_keyword_base)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScorerConfig {
    pub weights: ScoringWeights,
    pub thresholds: CriticalityThresholds,
}

/// Scoring rules, evaluated independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Keyword,
    Crypto,
    Cve,
    Contact,
    Network,
    Content,
}

impl Rule {
    pub const ALL: [Rule; 6] = [
        Rule::Keyword,
        Rule::Crypto,
        Rule::Cve,
        Rule::Contact,
        Rule::Network,
        Rule::Content,
    ];

    pub fn apply(&self, weights: &ScoringWeights, features: &Features, content: &str) -> i32 {
        match self {
            Rule::Keyword => {
                let score: i32 = features
                    .keyword_counts
                    .iter()
                    .filter_map(|(keyword, &count)| {
                        weights.keyword_weight(keyword).map(|w| w * count as i32)
                    })
                    .sum();
                score.min(weights.threat_keyword_max)
            }
            Rule::Crypto => {
                let score = features.bitcoin_addrs.len() as i32 * weights.bitcoin_address
                    + features.ethereum_addrs.len() as i32 * weights.ethereum_address
                    + features.monero_addrs.len() as i32 * weights.monero_address;
                score.min(weights.max_crypto_score)
            }
            Rule::Cve => {
                (features.cves.len() as i32 * weights.cve_identifier).min(weights.max_cve_score)
            }
            Rule::Contact => {
                features.emails.len() as i32 * weights.email_address
                    + features.phones.len() as i32 * weights.phone_number
            }
            Rule::Network => {
                features.onion_urls.len() as i32 * weights.onion_url
                    + features.ip_addresses.len() as i32 * weights.ip_address
            }
            Rule::Content => content_score(weights, features, content),
        }
    }
}

fn content_score(weights: &ScoringWeights, features: &Features, content: &str) -> i32 {
    let word_count = content.split_whitespace().count();
    let mut score = 0;

    if word_count > 0 {
        let density = features.unique_tokens() as f64 / word_count as f64;
        if density > 0.3 {
            score += (weights.threat_keyword_base as f64 * weights.keyword_density_multiplier) as i32;
        }
    }

    if word_count > 500 {
        score += weights.long_content_bonus;
    }

    let has_important_data = !features.cves.is_empty()
        || !features.bitcoin_addrs.is_empty()
        || !features.onion_urls.is_empty()
        || !features.keyword_counts.is_empty();

    if word_count < 50 && !has_important_data {
        score += weights.empty_content_penalty;
    }

    score
}

/// Per-rule sub-scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub keyword_score: i32,
    pub crypto_score: i32,
    pub cve_score: i32,
    pub contact_score: i32,
    pub network_score: i32,
    pub content_score: i32,
    pub total_raw_score: i32,
}

impl ScoreBreakdown {
    fn record(&mut self, rule: Rule, score: i32) {
        match rule {
            Rule::Keyword => self.keyword_score = score,
            Rule::Crypto => self.crypto_score = score,
            Rule::Cve => self.cve_score = score,
            Rule::Contact => self.contact_score = score,
            Rule::Network => self.network_score = score,
            Rule::Content => self.content_score = score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Final score in [0, 100]
    pub score: u8,
    pub criticality: Criticality,
    pub criticality_color: String,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Default)]
pub struct Scorer {
    config: ScorerConfig,
}

impl Scorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.config.weights
    }

    pub fn score(&self, features: &Features, content: &str) -> ScoreResult {
        let mut breakdown = ScoreBreakdown::default();
        for rule in Rule::ALL {
            breakdown.record(rule, rule.apply(&self.config.weights, features, content));
        }

        breakdown.total_raw_score = breakdown.keyword_score
            + breakdown.crypto_score
            + breakdown.cve_score
            + breakdown.contact_score
            + breakdown.network_score
            + breakdown.content_score;

        let score = breakdown.total_raw_score.clamp(0, 100) as u8;
        let criticality = self.config.thresholds.classify(score);

        info!(
            score,
            criticality = %criticality,
            raw_score = breakdown.total_raw_score,
            keyword_score = breakdown.keyword_score,
            crypto_score = breakdown.crypto_score,
            cve_score = breakdown.cve_score,
            "Scoring completed"
        );

        ScoreResult {
            score,
            criticality,
            criticality_color: criticality.color().to_string(),
            breakdown,
        }
    }

    /// Score plus a one-line summary of the non-zero contributions
    pub fn score_with_explanation(&self, features: &Features, content: &str) -> (ScoreResult, String) {
        let result = self.score(features, content);
        let explanation = explain(&result.breakdown, features);
        (result, explanation)
    }
}

fn explain(breakdown: &ScoreBreakdown, features: &Features) -> String {
    let mut parts = Vec::new();

    if breakdown.keyword_score > 0 {
        parts.push(format!("Threat keywords detected (+{})", breakdown.keyword_score));
    }
    if breakdown.crypto_score > 0 {
        parts.push(format!("Cryptocurrency addresses found (+{})", breakdown.crypto_score));
    }
    if breakdown.cve_score > 0 {
        parts.push(format!(
            "{} CVE identifier(s) (+{})",
            features.cves.len(),
            breakdown.cve_score
        ));
    }
    if breakdown.network_score > 0 {
        parts.push(format!(
            "Network indicators (.onion, IPs) (+{})",
            breakdown.network_score
        ));
    }

    if parts.is_empty() {
        return "Low threat indicators detected".to_string();
    }
    parts.join("; ")
}
