//! Umbra Core - Domain model and text analysis for onion-service threat intelligence
//!
//! This crate provides the CPU-only stages of the scraping pipeline:
//! - Monitored sources and intelligence records
//! - Indicator extraction (onion hosts, crypto wallets, CVEs, contacts)
//! - HTML sanitization and text normalization
//! - Rule-based criticality scoring

pub mod criticality;
pub mod crypto;
pub mod extractor;
pub mod keywords;
pub mod normalizer;
pub mod sanitizer;
pub mod scorer;
pub mod source;

pub use criticality::*;
pub use crypto::*;
pub use extractor::*;
pub use keywords::*;
pub use normalizer::*;
pub use sanitizer::*;
pub use scorer::*;
pub use source::*;

/// Number of keywords carried into a stored intelligence record
pub const STORED_KEYWORDS: usize = 20;
