//! Monitored sources and the intelligence records produced from them
//!
//! A [`Source`] is created and edited by the admin layer; the scraper only reads
//! it and moves its `last_scraped_at` forward. An [`IntelligenceInput`] is what
//! one successful pipeline run hands to storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Re-fetch cadence of a source
///
/// Stored as one of a fixed set of canonical strings ("15 minutes" ... "1 day").
/// Anything else resolves to one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScrapeInterval {
    FifteenMinutes,
    ThirtyMinutes,
    #[default]
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    TwelveHours,
    OneDay,
}

impl ScrapeInterval {
    /// All intervals in ascending order
    pub const ALL: [ScrapeInterval; 8] = [
        ScrapeInterval::FifteenMinutes,
        ScrapeInterval::ThirtyMinutes,
        ScrapeInterval::OneHour,
        ScrapeInterval::TwoHours,
        ScrapeInterval::FourHours,
        ScrapeInterval::SixHours,
        ScrapeInterval::TwelveHours,
        ScrapeInterval::OneDay,
    ];

    /// Resolve a canonical interval string, falling back to one hour
    pub fn parse(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|interval| interval.as_str() == value)
            .unwrap_or_default()
    }

    /// Check whether a string is one of the canonical interval names
    pub fn is_canonical(value: &str) -> bool {
        Self::ALL.iter().any(|interval| interval.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeInterval::FifteenMinutes => "15 minutes",
            ScrapeInterval::ThirtyMinutes => "30 minutes",
            ScrapeInterval::OneHour => "1 hour",
            ScrapeInterval::TwoHours => "2 hours",
            ScrapeInterval::FourHours => "4 hours",
            ScrapeInterval::SixHours => "6 hours",
            ScrapeInterval::TwelveHours => "12 hours",
            ScrapeInterval::OneDay => "1 day",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            ScrapeInterval::FifteenMinutes => Duration::minutes(15),
            ScrapeInterval::ThirtyMinutes => Duration::minutes(30),
            ScrapeInterval::OneHour => Duration::hours(1),
            ScrapeInterval::TwoHours => Duration::hours(2),
            ScrapeInterval::FourHours => Duration::hours(4),
            ScrapeInterval::SixHours => Duration::hours(6),
            ScrapeInterval::TwelveHours => Duration::hours(12),
            ScrapeInterval::OneDay => Duration::days(1),
        }
    }
}

impl std::fmt::Display for ScrapeInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    /// Usually an .onion URL
    pub url: String,
    pub category: String,
    /// Criticality declared by the operator (independent of computed scores)
    pub criticality: String,
    pub enabled: bool,
    /// Canonical interval string, see [`ScrapeInterval`]
    #[serde(default = "default_interval")]
    pub scrape_interval: String,
    #[serde(default)]
    pub last_scraped_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_interval() -> String {
    ScrapeInterval::default().as_str().to_string()
}

impl Source {
    pub fn new(id: i64, name: &str, url: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            url: url.to_string(),
            category: "general".to_string(),
            criticality: "medium".to_string(),
            enabled: true,
            scrape_interval: default_interval(),
            last_scraped_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_interval(mut self, interval: &str) -> Self {
        self.scrape_interval = interval.to_string();
        self
    }

    pub fn with_last_scraped(mut self, at: DateTime<Utc>) -> Self {
        self.last_scraped_at = Some(at);
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Resolved re-fetch interval
    pub fn interval(&self) -> ScrapeInterval {
        ScrapeInterval::parse(&self.scrape_interval)
    }

    /// Whether a fetch is due at `now`
    ///
    /// Never-scraped sources are always due; otherwise the interval must have
    /// strictly elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_scraped_at {
            None => true,
            Some(last) => now > last + self.interval().duration(),
        }
    }
}

/// Indicator lists persisted alongside an intelligence record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureInput {
    pub bitcoin_addrs: Vec<String>,
    pub ethereum_addrs: Vec<String>,
    pub monero_addrs: Vec<String>,
    pub onion_urls: Vec<String>,
    pub ip_addresses: Vec<String>,
    pub domains: Vec<String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub cves: Vec<String>,
    pub keywords: Vec<String>,
}

/// Payload handed to storage after a successful pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceInput {
    pub source_id: i64,
    pub title: String,
    pub summary: String,
    pub source_url: String,
    /// Final score in [0, 100]
    pub criticality_score: u8,
    pub published_at: Option<DateTime<Utc>>,
    pub features: FeatureInput,
}

/// A stored intelligence item as returned by storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceRecord {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub summary: String,
    pub source_url: String,
    pub criticality_score: u8,
    pub published_at: Option<DateTime<Utc>>,
    pub features: FeatureInput,
    pub created_at: DateTime<Utc>,
}

impl IntelligenceRecord {
    pub fn from_input(id: i64, input: IntelligenceInput) -> Self {
        Self {
            id,
            source_id: input.source_id,
            title: input.title,
            summary: input.summary,
            source_url: input.source_url,
            criticality_score: input.criticality_score,
            published_at: input.published_at,
            features: input.features,
            created_at: Utc::now(),
        }
    }
}
