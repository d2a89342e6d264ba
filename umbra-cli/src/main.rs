//! Umbra CLI
//!
//! Onion-service threat intelligence scraper with deterministic scoring.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use umbra_runtime::{
    router, HealthChecker, MemoryStorage, Pipeline, PipelineConfig, Scraper, ScraperConfig,
    Storage,
};
use umbra_tor::{TorClient, TorConfig};

/// Grace period for the in-flight cycle after a shutdown request
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "umbra")]
#[command(author, version, about = "Umbra: onion-service threat intelligence scraper", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape due sources on an interval and serve /health
    ///
    /// Records are held in memory only and lost on exit; past 10000 records
    /// the oldest are dropped.
    Run {
        #[command(flatten)]
        tor: TorArgs,

        /// JSON file with the monitored sources
        #[arg(long, env = "SOURCES_FILE", default_value = "sources.json")]
        sources: PathBuf,

        /// Seconds between scrape cycles
        #[arg(long, env = "SCRAPER_INTERVAL", default_value = "3600")]
        interval: u64,

        /// Health endpoint port
        #[arg(long, env = "HEALTH_PORT", default_value = "8080")]
        health_port: u16,
    },

    /// Scrape a single source once and print the saved record
    Scrape {
        #[command(flatten)]
        tor: TorArgs,

        /// JSON file with the monitored sources
        #[arg(long, env = "SOURCES_FILE", default_value = "sources.json")]
        sources: PathBuf,

        /// Source to scrape
        #[arg(long)]
        source_id: i64,
    },

    /// Score a local HTML file without fetching anything
    Score {
        /// HTML document to analyze
        file: PathBuf,

        /// URL recorded as the document's origin
        #[arg(long, default_value = "file://local")]
        url: String,
    },

    /// Check Tor connection status
    Status {
        #[command(flatten)]
        tor: TorArgs,
    },
}

#[derive(Args)]
struct TorArgs {
    /// SOCKS5h proxy address
    #[arg(long, env = "TOR_PROXY", default_value = "socks5h://127.0.0.1:9050")]
    tor_proxy: String,

    /// Request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30")]
    request_timeout: u64,

    /// Attempts per fetch
    #[arg(long, env = "MAX_RETRIES", default_value = "3")]
    max_retries: u32,

    /// Requests per second admitted by the rate limiter
    #[arg(long, env = "RATE_LIMIT_RPS", default_value = "1")]
    rate_limit_rps: u32,
}

impl TorArgs {
    fn config(&self) -> TorConfig {
        TorConfig {
            socks_addr: Some(self.tor_proxy.clone()),
            timeout_secs: self.request_timeout,
            max_retries: self.max_retries,
            rate_limit_rps: self.rate_limit_rps,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Run {
            tor,
            sources,
            interval,
            health_port,
        } => {
            run_service(tor.config(), &sources, Duration::from_secs(interval), health_port).await?;
        }
        Commands::Scrape {
            tor,
            sources,
            source_id,
        } => {
            scrape_once(tor.config(), &sources, source_id).await?;
        }
        Commands::Score { file, url } => {
            score_file(&file, &url).await?;
        }
        Commands::Status { tor } => {
            check_status(tor.config()).await?;
        }
    }

    Ok(())
}

fn build_scraper(
    tor_config: TorConfig,
    storage: Arc<MemoryStorage>,
    scraper_config: ScraperConfig,
) -> Result<Scraper> {
    let client = TorClient::new(tor_config).context("invalid Tor proxy configuration")?;
    let pipeline = Pipeline::new(Arc::new(client), PipelineConfig::default());
    Ok(Scraper::new(storage, pipeline, scraper_config))
}

async fn load_storage(path: &Path) -> Result<Arc<MemoryStorage>> {
    let storage = MemoryStorage::from_json_file(path)
        .await
        .with_context(|| format!("failed to load sources from {}", path.display()))?;
    Ok(Arc::new(storage))
}

async fn run_service(
    tor_config: TorConfig,
    sources: &Path,
    interval: Duration,
    health_port: u16,
) -> Result<()> {
    println!("🕵️ Umbra - Onion threat intelligence scraper\n");

    let storage = load_storage(sources).await?;
    let scraper_config = ScraperConfig {
        interval,
        ..Default::default()
    };
    let scraper = Arc::new(build_scraper(tor_config, storage.clone(), scraper_config)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], health_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind health endpoint on {}", addr))?;
    info!("Health endpoint listening on {}", addr);

    let storage: Arc<dyn Storage> = storage;
    let checker = Arc::new(HealthChecker::new(storage, scraper.clone()));
    let cancel = CancellationToken::new();

    let health = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let shutdown = async move { cancel.cancelled().await };
            if let Err(e) = axum::serve(listener, router(checker))
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Health server failed: {}", e);
            }
        }
    });

    let scrape_loop = tokio::spawn({
        let scraper = scraper.clone();
        let cancel = cancel.clone();
        async move { scraper.run(cancel).await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested, waiting up to {:?} for the current cycle", SHUTDOWN_GRACE);
    cancel.cancel();

    if tokio::time::timeout(SHUTDOWN_GRACE, scrape_loop).await.is_err() {
        error!("Scrape loop did not stop within the grace period");
    }

    let _ = health.await;

    let stats = scraper.stats();
    println!("\n📊 Final stats:");
    println!("   Scraped: {}", stats.total_scraped);
    println!("   Errors: {}", stats.total_errors);
    if let Some(last_error) = stats.last_error {
        println!("   Last error: {}", last_error);
    }

    Ok(())
}

async fn scrape_once(tor_config: TorConfig, sources: &Path, source_id: i64) -> Result<()> {
    let storage = load_storage(sources).await?;
    let scraper = build_scraper(tor_config, storage, ScraperConfig::default())?;

    println!("🔍 Scraping source {}...", source_id);
    let record = scraper
        .scrape_source(&CancellationToken::new(), source_id)
        .await
        .with_context(|| format!("scrape of source {} failed", source_id))?;

    println!("✅ Saved intelligence record {}\n", record.id);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn score_file(file: &Path, url: &str) -> Result<()> {
    let html = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let client = TorClient::new(TorConfig::direct())?;
    let pipeline = Pipeline::new(Arc::new(client), PipelineConfig::default());
    let processed = pipeline.analyze(0, url, &html)?;

    let score = &processed.score;
    let breakdown = &score.breakdown;
    println!("📄 {}", processed.intelligence.title);
    println!(
        "🎯 Score: {} ({}, {})",
        score.score, score.criticality, score.criticality_color
    );
    println!("📝 {}\n", processed.explanation);
    println!("   Keywords: {}", breakdown.keyword_score);
    println!("   Crypto:   {}", breakdown.crypto_score);
    println!("   CVE:      {}", breakdown.cve_score);
    println!("   Contact:  {}", breakdown.contact_score);
    println!("   Network:  {}", breakdown.network_score);
    println!("   Content:  {}", breakdown.content_score);
    println!("   Raw:      {}", breakdown.total_raw_score);

    if processed.was_dangerous {
        println!("\n⚠️  Injection patterns were filtered from the content");
    }

    let features = &processed.intelligence.features;
    if !features.keywords.is_empty() {
        println!("\n🔑 Keywords: {}", features.keywords.join(", "));
    }

    Ok(())
}

async fn check_status(config: TorConfig) -> Result<()> {
    println!("🔌 Checking Tor connection...\n");

    let proxy = config.socks_addr.clone().unwrap_or_default();

    match umbra_tor::check_tor_connection(&config).await {
        Ok(true) => {
            println!("✅ Tor is running and accessible");
            println!("   Proxy: {}", proxy);
        }
        Ok(false) => {
            println!("❌ Tor is not accessible");
            println!("   Expected proxy at: {}", proxy);
            println!("\n   To install Tor:");
            println!("   - Linux: sudo apt install tor");
            println!("   - Mac: brew install tor");
            println!("   - Then start: sudo systemctl start tor (or brew services start tor)");
        }
        Err(e) => {
            println!("❌ Error checking Tor: {}", e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_defaults() {
        let cli = Cli::try_parse_from(["umbra", "run"]).unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run {
                tor, health_port, ..
            } => {
                let config = tor.config();
                assert_eq!(config.max_retries, 3);
                assert!(config.socks_addr.is_some());
                assert!(health_port > 0);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_help_mentions_memory_cap() {
        use clap::CommandFactory;

        let cli = Cli::command();
        let run = cli.find_subcommand("run").unwrap();
        let help = run.get_long_about().unwrap().to_string();
        assert!(help.contains("in memory only"));
        assert!(help.contains(&umbra_runtime::DEFAULT_MAX_RECORDS.to_string()));
    }

    #[test]
    fn test_cli_parses_scrape() {
        let cli = Cli::try_parse_from(["umbra", "-v", "2", "scrape", "--source-id", "7"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Scrape { source_id: 7, .. }));
    }
}
