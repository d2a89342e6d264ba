//! Storage contract used by the scraper, plus an in-memory implementation
//!
//! The scraper only reads sources, moves their `last_scraped_at` forward and
//! appends intelligence records. Anything persistent sits behind [`Storage`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

use umbra_core::{IntelligenceInput, IntelligenceRecord, Sanitizer, Source};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("source {0} not found")]
    NotFound(i64),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("invalid record: {0}")]
    Invalid(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence capability consumed by the scraper and health checker
#[async_trait]
pub trait Storage: Send + Sync {
    /// Enabled sources, least-recently-scraped first
    async fn get_enabled_sources(&self) -> Result<Vec<Source>, StorageError>;

    async fn get_source_by_id(&self, id: i64) -> Result<Source, StorageError>;

    async fn update_source_last_scraped(&self, id: i64, at: DateTime<Utc>) -> Result<(), StorageError>;

    async fn save_intelligence(&self, input: IntelligenceInput) -> Result<IntelligenceRecord, StorageError>;

    /// Liveness probe
    async fn ping(&self) -> Result<(), StorageError>;
}

/// Records kept by [`MemoryStorage`] before the oldest are evicted
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

#[derive(Debug, Default)]
struct Inner {
    sources: Vec<Source>,
    records: VecDeque<IntelligenceRecord>,
    next_record_id: i64,
}

/// Process-local [`Storage`], seeded with a fixed source list
///
/// Holds at most `max_records` intelligence records; saving past the cap
/// drops the oldest. Record ids keep counting up across evictions.
#[derive(Debug)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
    sanitizer: Sanitizer,
    available: AtomicBool,
    max_records: usize,
}

impl MemoryStorage {
    pub fn new(sources: Vec<Source>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sources,
                records: VecDeque::new(),
                next_record_id: 1,
            }),
            sanitizer: Sanitizer::default(),
            available: AtomicBool::new(true),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    /// Cap on retained records; values below 1 are treated as 1
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    /// Seed from a JSON array of sources
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        let sources: Vec<Source> =
            serde_json::from_str(json).map_err(|e| StorageError::Invalid(e.to_string()))?;
        Ok(Self::new(sources))
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let storage = Self::from_json(&json)?;
        info!(
            "Loaded {} sources from {}",
            storage.inner.lock().sources.len(),
            path.display()
        );
        Ok(storage)
    }

    /// Simulate an outage: every call fails with `Unavailable` while false
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Snapshot of retained records, oldest first
    pub fn records(&self) -> Vec<IntelligenceRecord> {
        self.inner.lock().records.iter().cloned().collect()
    }

    /// Snapshot of all sources, enabled or not
    pub fn sources(&self) -> Vec<Source> {
        self.inner.lock().sources.clone()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("memory storage marked offline".to_string()))
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_enabled_sources(&self) -> Result<Vec<Source>, StorageError> {
        self.check_available()?;
        let mut sources: Vec<Source> = self
            .inner
            .lock()
            .sources
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect();

        // None sorts first
        sources.sort_by_key(|s| s.last_scraped_at);
        Ok(sources)
    }

    async fn get_source_by_id(&self, id: i64) -> Result<Source, StorageError> {
        self.check_available()?;
        self.inner
            .lock()
            .sources
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    async fn update_source_last_scraped(&self, id: i64, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        let source = inner
            .sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StorageError::NotFound(id))?;
        source.last_scraped_at = Some(at);
        Ok(())
    }

    async fn save_intelligence(&self, input: IntelligenceInput) -> Result<IntelligenceRecord, StorageError> {
        self.check_available()?;

        for field in [&input.title, &input.summary] {
            self.sanitizer
                .validate_for_storage(field)
                .map_err(|e| StorageError::Invalid(e.to_string()))?;
        }

        let mut inner = self.inner.lock();
        if !inner.sources.iter().any(|s| s.id == input.source_id) {
            return Err(StorageError::NotFound(input.source_id));
        }

        let id = inner.next_record_id;
        inner.next_record_id += 1;

        let record = IntelligenceRecord::from_input(id, input);
        inner.records.push_back(record.clone());
        while inner.records.len() > self.max_records {
            if let Some(evicted) = inner.records.pop_front() {
                warn!("Record cap {} reached, evicted record {}", self.max_records, evicted.id);
            }
        }
        debug!("Stored intelligence record {} for source {}", id, record.source_id);

        Ok(record)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use umbra_core::FeatureInput;

    fn input(source_id: i64, title: &str) -> IntelligenceInput {
        IntelligenceInput {
            source_id,
            title: title.to_string(),
            summary: "summary".to_string(),
            source_url: "http://example.onion".to_string(),
            criticality_score: 42,
            published_at: None,
            features: FeatureInput::default(),
        }
    }

    #[tokio::test]
    async fn test_enabled_sources_least_recent_first() {
        let now = Utc::now();
        let storage = MemoryStorage::new(vec![
            Source::new(1, "recent", "http://a.onion").with_last_scraped(now),
            Source::new(2, "never", "http://b.onion"),
            Source::new(3, "older", "http://c.onion").with_last_scraped(now - Duration::hours(3)),
            Source::new(4, "off", "http://d.onion").disabled(),
        ]);

        let ids: Vec<i64> = storage
            .get_enabled_sources()
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_save_and_update() {
        let storage = MemoryStorage::new(vec![Source::new(1, "a", "http://a.onion")]);

        let first = storage.save_intelligence(input(1, "one")).await.unwrap();
        let second = storage.save_intelligence(input(1, "two")).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(storage.records().len(), 2);

        let at = Utc::now();
        storage.update_source_last_scraped(1, at).await.unwrap();
        assert_eq!(storage.get_source_by_id(1).await.unwrap().last_scraped_at, Some(at));
    }

    #[tokio::test]
    async fn test_record_cap_evicts_oldest() {
        let storage =
            MemoryStorage::new(vec![Source::new(1, "a", "http://a.onion")]).with_max_records(3);

        for i in 0..5 {
            storage.save_intelligence(input(1, &format!("t{i}"))).await.unwrap();
        }

        let records = storage.records();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(records[0].title, "t2");

        let next = storage.save_intelligence(input(1, "t5")).await.unwrap();
        assert_eq!(next.id, 6);
        assert_eq!(storage.records().len(), 3);
    }

    #[test]
    fn test_default_record_cap() {
        let storage = MemoryStorage::new(Vec::new());
        assert_eq!(storage.max_records, DEFAULT_MAX_RECORDS);
        assert_eq!(storage.with_max_records(0).max_records, 1);
    }

    #[tokio::test]
    async fn test_rejects_null_bytes_and_unknown_source() {
        let storage = MemoryStorage::new(vec![Source::new(1, "a", "http://a.onion")]);

        let err = storage.save_intelligence(input(1, "bad\0title")).await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));

        let err = storage.save_intelligence(input(9, "ok")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(9)));
        assert!(storage.records().is_empty());
    }

    #[tokio::test]
    async fn test_outage() {
        let storage = MemoryStorage::new(Vec::new());
        assert!(storage.ping().await.is_ok());

        storage.set_available(false);
        assert!(matches!(storage.ping().await, Err(StorageError::Unavailable(_))));
        assert!(storage.get_enabled_sources().await.is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {"id": 1, "name": "forum", "url": "http://f.onion", "category": "forum",
             "criticality": "high", "enabled": true, "scrape_interval": "15 minutes"}
        ]"#;
        let storage = MemoryStorage::from_json(json).unwrap();
        assert_eq!(storage.sources()[0].scrape_interval, "15 minutes");

        assert!(matches!(MemoryStorage::from_json("{"), Err(StorageError::Invalid(_))));
    }
}
