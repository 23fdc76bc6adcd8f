use crate::extract::extract_paragraphs_with;
use chatpipe_core::{
    Error, ExtractedSnippet, FetchRequest, FetchedPage, PageFetcher, Result, RetrievalConfig,
    SearchProvider, SearchQuery, SearchResult, NO_RESULTS_FOUND,
};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Search → fetch top links concurrently → extract paragraphs → JSON.
#[derive(Clone)]
pub struct Retriever {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            search,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    async fn fetch_one(&self, result: SearchResult) -> FetchedPage {
        let Some(url) = result.link.clone() else {
            warn!("search result has no link; skipping fetch");
            return FetchedPage {
                result,
                parsed_content: String::new(),
            };
        };
        let req = FetchRequest {
            url,
            render_js: self.config.render_js,
            timeout_ms: Some(self.config.fetch_timeout_ms),
        };
        let parsed_content = match self.fetcher.fetch(&req).await {
            Ok(body) => body.into_text(),
            Err(e) => {
                error!(url = %req.url, error = %e, "error accessing url");
                String::new()
            }
        };
        FetchedPage {
            result,
            parsed_content,
        }
    }

    /// Fetch the first `max_links` results concurrently.
    ///
    /// Each fetch owns its own page; a failure only empties that page's content.
    /// Output order follows search rank.
    pub async fn fetch_top_pages(&self, results: Vec<SearchResult>) -> Vec<FetchedPage> {
        let selected = results.into_iter().take(self.config.max_links);
        join_all(selected.map(|r| self.fetch_one(r))).await
    }

    /// Typed form of the pipeline; callers decide how to degrade.
    pub async fn retrieve_snippets(&self, query: &str) -> Result<Vec<ExtractedSnippet>> {
        let q = SearchQuery {
            query: query.to_string(),
            language: Some(self.config.language.clone()),
            timeout_ms: Some(self.config.search_timeout_ms),
        };
        let resp = self.search.search(&q).await?;
        let pages = self.fetch_top_pages(resp.results).await;

        Ok(pages
            .into_iter()
            .map(|p| ExtractedSnippet {
                contents: extract_paragraphs_with(
                    &p.parsed_content,
                    self.config.top_k_paragraphs,
                    self.config.min_line_chars,
                ),
                source: p.result.link,
            })
            .collect())
    }

    /// Tool entry point. Always returns usable text: a JSON array of
    /// `{source, contents}` or the "No results found" sentence.
    pub async fn retrieve(&self, query: &str) -> String {
        let t0 = Instant::now();
        let out = self.retrieve_snippets(query).await.and_then(|snippets| {
            serde_json::to_string(&snippets).map_err(|e| Error::Unexpected(e.to_string()))
        });
        match out {
            Ok(json) => {
                info!(
                    provider = self.search.name(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "internet search done"
                );
                json
            }
            Err(e) => {
                error!(query, error = %e, "error when getting information from search provider");
                NO_RESULTS_FOUND.to_string()
            }
        }
    }
}
