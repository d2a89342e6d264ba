//! Threat keyword vocabulary and frequency analysis

use std::collections::HashMap;

/// Weighted threat vocabulary used to boost keyword ranking
pub static THREAT_KEYWORDS: &[(&str, u32)] = &[
    // vulnerabilities and exploitation
    ("exploit", 20),
    ("vulnerability", 20),
    ("0day", 25),
    ("zero-day", 25),
    ("zeroday", 25),
    ("rce", 20),
    ("lfi", 15),
    ("xss", 15),
    ("sqli", 15),
    ("injection", 15),
    ("bypass", 15),
    // malware
    ("ransomware", 25),
    ("malware", 18),
    ("trojan", 18),
    ("backdoor", 20),
    ("rootkit", 20),
    ("botnet", 18),
    ("rat", 15),
    // data exposure
    ("leak", 20),
    ("breach", 20),
    ("dump", 18),
    ("database", 15),
    ("credentials", 18),
    ("passwords", 18),
    // attack activity
    ("phishing", 15),
    ("ddos", 15),
    ("bruteforce", 15),
    ("cracking", 15),
    ("scanning", 12),
    // payments
    ("bitcoin", 12),
    ("btc", 12),
    ("crypto", 10),
    ("wallet", 10),
    ("monero", 12),
    ("ethereum", 10),
    // targets
    ("windows", 8),
    ("linux", 8),
    ("apache", 8),
    ("nginx", 8),
    ("mysql", 8),
    ("wordpress", 8),
    // post-exploitation
    ("download", 10),
    ("upload", 10),
    ("execute", 12),
    ("shell", 15),
    ("admin", 10),
    ("root", 12),
    ("privilege", 12),
    ("escalation", 15),
];

/// Check if a word is in the threat vocabulary (case-insensitive)
pub fn is_threat_keyword(word: &str) -> bool {
    threat_keyword_weight(word).is_some()
}

/// Weight of a threat keyword, if listed
pub fn threat_keyword_weight(word: &str) -> Option<u32> {
    let word = word.to_lowercase();
    THREAT_KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == word)
        .map(|(_, weight)| *weight)
}

/// Ranks whitespace tokens by frequency, boosted by threat weight
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    min_word_length: usize,
    max_keywords: usize,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self {
            min_word_length: 3,
            max_keywords: 50,
        }
    }
}

impl KeywordExtractor {
    pub fn new(max_keywords: usize) -> Self {
        Self {
            max_keywords,
            ..Default::default()
        }
    }

    /// Extract the top keywords and the raw frequency of every counted token
    ///
    /// Ranking score is `count + weight * 10` for threat keywords and `count`
    /// otherwise. Ties break alphabetically so output is deterministic.
    pub fn extract(&self, text: &str) -> (Vec<String>, HashMap<String, usize>) {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for word in text.split_whitespace() {
            if word.chars().count() >= self.min_word_length {
                *counts.entry(word.to_string()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&String, usize)> = counts
            .iter()
            .map(|(word, &count)| {
                let boost = threat_keyword_weight(word).unwrap_or(0) as usize * 10;
                (word, count + boost)
            })
            .collect();

        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let keywords = ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(word, _)| word.clone())
            .collect();

        (keywords, counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threat_lookup() {
        assert!(is_threat_keyword("ransomware"));
        assert!(is_threat_keyword("RANSOMWARE"));
        assert_eq!(threat_keyword_weight("0day"), Some(25));
        assert_eq!(threat_keyword_weight("shell"), Some(15));
        assert_eq!(threat_keyword_weight("banana"), None);
    }

    #[test]
    fn test_extract_counts_and_ranking() {
        let extractor = KeywordExtractor::default();
        let text = "market market market market exploit an to of ransomware";
        let (keywords, counts) = extractor.extract(text);

        // short tokens are not counted
        assert!(!counts.contains_key("an"));
        assert!(!counts.contains_key("to"));
        assert_eq!(counts.get("market"), Some(&4));

        // ransomware (1 + 250) > exploit (1 + 200) > market (4)
        assert_eq!(keywords, vec!["ransomware", "exploit", "market"]);
    }

    #[test]
    fn test_extract_respects_limit() {
        let extractor = KeywordExtractor::new(2);
        let (keywords, counts) = extractor.extract("alpha bravo charlie delta");
        assert_eq!(keywords.len(), 2);
        assert_eq!(counts.len(), 4);
        // equal scores fall back to alphabetical order
        assert_eq!(keywords, vec!["alpha", "bravo"]);
    }
}
