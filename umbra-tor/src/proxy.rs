//! Tor SOCKS5h proxy client
//!
//! Creates HTTP clients that route through Tor for .onion access.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{redirect, Client, Proxy};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Tor transport configuration
#[derive(Debug, Clone)]
pub struct TorConfig {
    /// SOCKS5h proxy address; `None` builds a direct client
    pub socks_addr: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per fetch, including the first
    pub max_retries: u32,
    /// Admitted requests per second
    pub rate_limit_rps: u32,
    /// Upper bound of the random delay added after rate-limit admission
    pub max_jitter: Duration,
    /// Cap on the exponential backoff between attempts
    pub max_backoff: Duration,
    pub max_redirects: usize,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            socks_addr: Some("socks5h://127.0.0.1:9050".to_string()),
            timeout_secs: 30,
            max_retries: 3,
            rate_limit_rps: 1,
            max_jitter: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            max_redirects: 5,
        }
    }
}

impl TorConfig {
    /// Unproxied config with no jitter or backoff, for local endpoints
    pub fn direct() -> Self {
        Self {
            socks_addr: None,
            max_jitter: Duration::ZERO,
            max_backoff: Duration::ZERO,
            rate_limit_rps: 100,
            ..Default::default()
        }
    }
}

/// Errors from Tor client construction
#[derive(Debug, Error)]
pub enum TorError {
    #[error("Failed to build Tor client: {0}")]
    ClientBuild(String),
}

/// User agents for rotation
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:137.0) Gecko/20100101 Firefox/137.0",
];

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANG: &str = "en-US,en;q=0.5";

/// Tor Project onion service used for connectivity probes
const TOR_PROBE_URL: &str = "http://2gzyxa5ihm7nsggfxnu52rck2vv4rvmdlkiu3ber7fzs2xqxczfebsid.onion/";

/// Get a random user agent
pub fn random_user_agent() -> &'static str {
    use rand::seq::SliceRandom;
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Create an HTTP client, routed through Tor when a SOCKS address is set
pub fn create_tor_client(config: &TorConfig) -> Result<Client, TorError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANG));

    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(random_user_agent())
        .default_headers(headers)
        .redirect(redirect::Policy::limited(config.max_redirects))
        .danger_accept_invalid_certs(true); // Many .onion sites have self-signed certs

    if let Some(addr) = &config.socks_addr {
        let proxy = Proxy::all(addr).map_err(|e| TorError::ClientBuild(e.to_string()))?;
        builder = builder.proxy(proxy);
        info!("Tor client initialized (proxy {}, timeout {}s)", addr, config.timeout_secs);
    }

    builder
        .build()
        .map_err(|e| TorError::ClientBuild(e.to_string()))
}

/// Check if Tor proxy is reachable
pub async fn check_tor_connection(config: &TorConfig) -> Result<bool, TorError> {
    let client = create_tor_client(config)?;

    match client.get(TOR_PROBE_URL).send().await {
        Ok(resp) => Ok(resp.status().is_success() || resp.status().is_redirection()),
        Err(_) => Ok(false),
    }
}
