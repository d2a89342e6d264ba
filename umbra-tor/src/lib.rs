//! Umbra Tor Layer
//!
//! Everything between a source URL and a parsed document:
//! - SOCKS5h proxy client (DNS resolution via Tor)
//! - Token-bucket rate limiting with jitter
//! - Retrying transport with exponential backoff
//! - Response validation and charset transcoding
//! - HTML parsing with selector fallbacks

pub mod dates;
pub mod encoding;
pub mod parser;
pub mod proxy;
pub mod rate_limit;
pub mod transport;
pub mod validator;

pub use dates::*;
pub use encoding::*;
pub use parser::*;
pub use proxy::*;
pub use rate_limit::*;
pub use transport::*;
pub use validator::*;
