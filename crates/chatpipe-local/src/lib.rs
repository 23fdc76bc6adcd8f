use chatpipe_core::{Error, Result};
use std::time::Duration;

pub mod agent;
pub mod extract;
pub mod openai_compat;
pub mod retrieve;
pub mod scrapingbee;

/// Shared async HTTP client for every outbound call (search, fetch, LLM).
///
/// Per-request timeouts still apply on top of these defaults.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("chatpipe-local/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        // Avoid "hang forever" on DNS/TLS stalls when a caller forgets a timeout.
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| Error::Unexpected(e.to_string()))
}
