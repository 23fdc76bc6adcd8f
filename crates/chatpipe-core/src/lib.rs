use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Returned by a page fetch when the proxy reports the target page as missing.
pub const PAGE_NOT_FOUND: &str = "404";
/// Returned by a page fetch on any other failure (status, timeout, network).
pub const PAGE_UNAVAILABLE: &str = "Could not load page";
/// Returned by the retrieval tool when nothing usable could be produced.
pub const NO_RESULTS_FOUND: &str = "No results found";

pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("search unavailable: {0}")]
    SearchUnavailable(String),
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("tool failed: {0}")]
    Tool(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Knobs for one retrieval call. The defaults are the production values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// How many ranked search results get their pages fetched.
    pub max_links: usize,
    /// How many paragraphs are kept per page.
    pub top_k_paragraphs: usize,
    /// Lines shorter than this (in chars) are dropped by the extractor.
    pub min_line_chars: usize,
    /// Result-language hint sent to the search provider.
    pub language: String,
    /// Ask the fetch proxy to execute JavaScript before returning HTML.
    pub render_js: bool,
    pub search_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_links: 3,
            top_k_paragraphs: 3,
            min_line_chars: 100,
            language: "fr".to_string(),
            render_js: false,
            search_timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub language: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// One organic search result, with provider field names already normalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Always serialized; `null` when the provider gave no URL.
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayed_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub sitelinks: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Ranked, best first.
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    pub render_js: bool,
    pub timeout_ms: Option<u64>,
}

impl FetchRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Outcome of fetching one page through the render proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBody {
    Html(String),
    NotFound,
    Unavailable,
}

impl PageBody {
    /// Flatten into the text handed to the extractor: the body, or a sentinel.
    pub fn into_text(self) -> String {
        match self {
            PageBody::Html(body) => body,
            PageBody::NotFound => PAGE_NOT_FOUND.to_string(),
            PageBody::Unavailable => PAGE_UNAVAILABLE.to_string(),
        }
    }
}

/// Async page fetch. Implementations report provider-level failures through
/// `PageBody` sentinels; `Err` is reserved for failures the caller must isolate.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<PageBody>;
}

/// A search result plus the text fetched for its link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchedPage {
    #[serde(flatten)]
    pub result: SearchResult,
    /// Raw body, `""` when the fetch itself failed, or a sentinel string.
    pub parsed_content: String,
}

/// The unit handed back to the model: where the text came from and its best paragraphs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedSnippet {
    pub source: Option<String>,
    pub contents: Vec<String>,
}
