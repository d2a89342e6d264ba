//! Scrape loop
//!
//! - Runs one cycle immediately, then one per interval tick
//! - Each cycle processes due sources one at a time, pausing between them
//! - Cancellation stops the loop between sources and aborts in-flight waits
//! - Running counters are exposed through [`Scraper::stats`]

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use umbra_core::IntelligenceRecord;

use crate::pipeline::{Pipeline, PipelineError, ProcessingResult};
use crate::scheduler::Scheduler;
use crate::storage::{Storage, StorageError};

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Time between cycle starts
    pub interval: Duration,
    /// Pause after each source within a cycle
    pub inter_request_delay: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            inter_request_delay: Duration::from_secs(2),
        }
    }
}

/// Running totals since start
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total_scraped: u64,
    pub total_errors: u64,
    pub last_scrape_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Outcome counts of one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

pub struct Scraper {
    storage: Arc<dyn Storage>,
    scheduler: Scheduler,
    pipeline: Pipeline,
    config: ScraperConfig,
    stats: RwLock<Stats>,
}

impl Scraper {
    pub fn new(storage: Arc<dyn Storage>, pipeline: Pipeline, config: ScraperConfig) -> Self {
        Self {
            scheduler: Scheduler::new(storage.clone()),
            storage,
            pipeline,
            config,
            stats: RwLock::new(Stats::default()),
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats.read().clone()
    }

    /// Loop until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting scraper (interval {:?}, delay {:?})",
            self.config.interval, self.config.inter_request_delay
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                // first tick completes immediately
                _ = ticker.tick() => {
                    self.run_cycle(&cancel).await;
                }
            }
        }

        info!("Scraper stopped");
    }

    /// One pass over every due source
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleSummary {
        let mut summary = CycleSummary::default();

        let sources = match self.scheduler.get_due_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                error!("Failed to get due sources: {}", e);
                return summary;
            }
        };

        summary.due = sources.len();
        if sources.is_empty() {
            debug!("No sources due");
            return summary;
        }
        info!("Scrape cycle: {} sources due", sources.len());

        for source in &sources {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let result = self.pipeline.process(cancel, source).await;
            match self.persist(result).await {
                Ok(record) => {
                    summary.succeeded += 1;
                    info!(
                        "Saved intelligence {} from {} (score {})",
                        record.id, source.name, record.criticality_score
                    );
                    self.update_stats(Ok(()));
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("Scrape of {} failed: {}", source.name, e);
                    self.update_stats(Err(&e));
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(self.config.inter_request_delay) => {}
            }
        }

        info!(
            "Cycle done: {} succeeded, {} failed",
            summary.succeeded, summary.failed
        );
        summary
    }

    /// Scrape one source on demand; leaves [`Stats`] untouched
    pub async fn scrape_source(
        &self,
        cancel: &CancellationToken,
        source_id: i64,
    ) -> Result<IntelligenceRecord, ScrapeError> {
        let source = self.storage.get_source_by_id(source_id).await?;
        let result = self.pipeline.process(cancel, &source).await;
        let processed = result.outcome?;

        let record = self.storage.save_intelligence(processed.intelligence).await?;
        self.storage
            .update_source_last_scraped(source_id, Utc::now())
            .await?;

        Ok(record)
    }

    /// Save a successful run; a failed timestamp update is only logged
    async fn persist(&self, result: ProcessingResult) -> Result<IntelligenceRecord, ScrapeError> {
        let source_id = result.source_id;
        let processed = result.outcome?;

        let record = self.storage.save_intelligence(processed.intelligence).await?;
        if let Err(e) = self
            .storage
            .update_source_last_scraped(source_id, Utc::now())
            .await
        {
            warn!("Failed to update last_scraped_at for source {}: {}", source_id, e);
        }

        Ok(record)
    }

    fn update_stats(&self, outcome: Result<(), &ScrapeError>) {
        let mut stats = self.stats.write();
        stats.last_scrape_at = Some(Utc::now());
        match outcome {
            Ok(()) => stats.total_scraped += 1,
            Err(e) => {
                stats.total_errors += 1;
                stats.last_error = Some(e.to_string());
            }
        }
    }
}
