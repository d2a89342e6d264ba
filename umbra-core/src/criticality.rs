//! Criticality levels and the score ladder that maps onto them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse severity label derived from a 0-100 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Low,
    Medium,
    High,
    Critical,
}

impl Criticality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Low => "low",
            Criticality::Medium => "medium",
            Criticality::High => "high",
            Criticality::Critical => "critical",
        }
    }

    /// Display color as a hex string
    pub fn color(&self) -> &'static str {
        match self {
            Criticality::Critical => "#DC2626",
            Criticality::High => "#F59E0B",
            Criticality::Medium => "#FBBF24",
            Criticality::Low => "#10B981",
        }
    }

    /// Ordinal priority, low = 1 .. critical = 4
    pub fn priority(&self) -> u8 {
        match self {
            Criticality::Low => 1,
            Criticality::Medium => 2,
            Criticality::High => 3,
            Criticality::Critical => 4,
        }
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bounds (inclusive) of each level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalityThresholds {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
    pub critical: u8,
}

impl Default for CriticalityThresholds {
    fn default() -> Self {
        Self {
            low: 25,
            medium: 50,
            high: 75,
            critical: 100,
        }
    }
}

impl CriticalityThresholds {
    pub fn classify(&self, score: u8) -> Criticality {
        if score <= self.low {
            Criticality::Low
        } else if score <= self.medium {
            Criticality::Medium
        } else if score <= self.high {
            Criticality::High
        } else {
            Criticality::Critical
        }
    }
}

/// Classify against the default ladder
pub fn classify_criticality(score: u8) -> Criticality {
    CriticalityThresholds::default().classify(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        assert_eq!(classify_criticality(0), Criticality::Low);
        assert_eq!(classify_criticality(25), Criticality::Low);
        assert_eq!(classify_criticality(26), Criticality::Medium);
        assert_eq!(classify_criticality(50), Criticality::Medium);
        assert_eq!(classify_criticality(51), Criticality::High);
        assert_eq!(classify_criticality(75), Criticality::High);
        assert_eq!(classify_criticality(76), Criticality::Critical);
        assert_eq!(classify_criticality(100), Criticality::Critical);
    }

    #[test]
    fn test_custom_thresholds() {
        let strict = CriticalityThresholds {
            low: 10,
            medium: 20,
            high: 30,
            critical: 100,
        };
        assert_eq!(strict.classify(15), Criticality::Medium);
        assert_eq!(strict.classify(31), Criticality::Critical);
    }

    #[test]
    fn test_color_and_priority() {
        assert_eq!(Criticality::Critical.color(), "#DC2626");
        assert_eq!(Criticality::Low.color(), "#10B981");
        assert_eq!(Criticality::Low.priority(), 1);
        assert_eq!(Criticality::Critical.priority(), 4);
        assert!(Criticality::High > Criticality::Medium);
        assert_eq!(serde_json::to_string(&Criticality::High).unwrap(), "\"high\"");
    }
}
