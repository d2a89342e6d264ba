//! Due-source selection

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use umbra_core::{ScrapeInterval, Source};

use crate::storage::{Storage, StorageError};

pub struct Scheduler {
    storage: Arc<dyn Storage>,
}

impl Scheduler {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Enabled sources whose interval has elapsed, in storage order
    pub async fn get_due_sources(&self) -> Result<Vec<Source>, StorageError> {
        let sources = self.storage.get_enabled_sources().await?;
        let total = sources.len();
        let due = due_sources(sources, Utc::now());

        debug!("Checked source schedule: {} total, {} due", total, due.len());
        Ok(due)
    }
}

/// Filter `sources` to those due at `now`, preserving order
pub fn due_sources(sources: Vec<Source>, now: DateTime<Utc>) -> Vec<Source> {
    sources
        .into_iter()
        .filter(|source| {
            if !ScrapeInterval::is_canonical(&source.scrape_interval) {
                warn!(
                    "Unknown interval {:?} for source {}, using 1 hour",
                    source.scrape_interval, source.name
                );
            }
            source.is_due(now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::Duration;

    #[test]
    fn test_due_by_interval() {
        let now = Utc::now();
        let two_hours_ago = now - Duration::hours(2);

        let sources = vec![
            Source::new(1, "hourly", "http://a.onion").with_last_scraped(two_hours_ago),
            Source::new(2, "slow", "http://b.onion")
                .with_interval("4 hours")
                .with_last_scraped(two_hours_ago),
            Source::new(3, "new", "http://c.onion"),
            Source::new(4, "odd", "http://d.onion")
                .with_interval("fortnightly")
                .with_last_scraped(two_hours_ago),
        ];

        let ids: Vec<i64> = due_sources(sources, now).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn test_get_due_sources_from_storage() {
        let now = Utc::now();
        let storage = Arc::new(MemoryStorage::new(vec![
            Source::new(1, "fresh", "http://a.onion").with_last_scraped(now),
            Source::new(2, "stale", "http://b.onion").with_last_scraped(now - Duration::days(2)),
            Source::new(3, "off", "http://c.onion").disabled(),
        ]));

        let scheduler = Scheduler::new(storage);
        let due = scheduler.get_due_sources().await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, 2);
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let storage = Arc::new(MemoryStorage::new(Vec::new()));
        storage.set_available(false);
        assert!(Scheduler::new(storage).get_due_sources().await.is_err());
    }
}
