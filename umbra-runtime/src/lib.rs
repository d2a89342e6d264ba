//! Umbra Runtime - Scheduling and orchestration
//!
//! Wires the Tor layer and the core analysis stages into a running service:
//! - Storage contract and an in-memory implementation
//! - Due-source scheduling by interval
//! - The seven-stage processing pipeline
//! - The periodic scrape loop with running stats
//! - A JSON health endpoint

pub mod health;
pub mod pipeline;
pub mod scheduler;
pub mod scraper;
pub mod storage;

pub use health::*;
pub use pipeline::*;
pub use scheduler::*;
pub use scraper::*;
pub use storage::*;
