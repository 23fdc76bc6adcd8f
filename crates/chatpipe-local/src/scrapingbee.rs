use chatpipe_core::{
    Error, FetchRequest, PageBody, PageFetcher, Result, SearchProvider, SearchQuery,
    SearchResponse, SearchResult, DEFAULT_FETCH_TIMEOUT_MS,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

pub const DEFAULT_BASE_URL: &str = "https://app.scrapingbee.com/api/v1/";

/// Credentials and endpoint for the ScrapingBee API.
///
/// Built once at startup and handed to the clients; nothing in here reads the
/// environment. An empty key is accepted and shows up as a 401 at call time.
#[derive(Debug, Clone)]
pub struct ScrapingBeeConfig {
    pub api_key: String,
    pub base_url: String,
}

impl ScrapingBeeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn base(&self) -> String {
        format!("{}/", self.base_url.trim().trim_end_matches('/'))
    }

    /// Google search "store" endpoint.
    pub fn search_endpoint(&self) -> String {
        format!("{}store/google", self.base())
    }

    /// The render proxy lives at the API root.
    pub fn fetch_endpoint(&self) -> String {
        self.base()
    }

    fn fetch_params<'a>(&'a self, req: &'a FetchRequest) -> [(&'static str, &'a str); 3] {
        [
            ("api_key", self.api_key.as_str()),
            ("url", req.url.as_str()),
            ("render_js", if req.render_js { "true" } else { "false" }),
        ]
    }
}

fn fetch_timeout(req: &FetchRequest) -> Duration {
    req.timeout()
        .unwrap_or(Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS))
}

/// Status policy shared by the async and blocking fetchers.
fn page_body_for_status(url: &str, status: u16, body: String) -> PageBody {
    match status {
        404 => PageBody::NotFound,
        200 => PageBody::Html(body),
        _ => {
            error!(url, status, body = %body, "scrapingbee fetch failed");
            PageBody::Unavailable
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapingBeeClient {
    client: reqwest::Client,
    config: ScrapingBeeConfig,
}

impl ScrapingBeeClient {
    pub fn new(client: reqwest::Client, config: ScrapingBeeConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ScrapingBeeConfig {
        &self.config
    }

    /// Fetch one page through the render proxy. Never fails: every problem
    /// collapses into `PageBody::NotFound` or `PageBody::Unavailable`.
    pub async fn fetch_page(&self, req: &FetchRequest) -> PageBody {
        let sent = self
            .client
            .get(self.config.fetch_endpoint())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(&self.config.fetch_params(req))
            .timeout(fetch_timeout(req))
            .send()
            .await;
        let resp = match sent {
            Ok(resp) => resp,
            Err(e) => {
                error!(url = %req.url, error = %e, "error while accessing url");
                return PageBody::Unavailable;
            }
        };

        let status = resp.status().as_u16();
        if status == 404 {
            return PageBody::NotFound;
        }
        match resp.text().await {
            Ok(body) => page_body_for_status(&req.url, status, body),
            Err(e) => {
                error!(url = %req.url, error = %e, "error while reading page body");
                PageBody::Unavailable
            }
        }
    }

    /// String form of [`Self::fetch_page`]: the body or a sentinel.
    pub async fn access_url_async(&self, url: &str, render_js: bool) -> String {
        let req = FetchRequest {
            url: url.to_string(),
            render_js,
            timeout_ms: None,
        };
        self.fetch_page(&req).await.into_text()
    }
}

#[derive(Debug, Deserialize)]
struct GoogleSearchResponse {
    #[serde(default, deserialize_with = "lenient")]
    organic_results: Option<Vec<serde_json::Value>>,
}

/// Organic result as ScrapingBee returns it.
///
/// Every field is optional and a field of the wrong shape reads as absent, so
/// one odd record never costs the rest of the page.
#[derive(Debug, Deserialize)]
struct RawOrganicResult {
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    displayed_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    date: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    sitelinks: Option<Vec<serde_json::Value>>,
}

fn lenient<'de, D, T>(d: D) -> std::result::Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let v = serde_json::Value::deserialize(d)?;
    Ok(serde_json::from_value(v).ok())
}

/// Normalize `organic_results` record by record; non-object entries are skipped.
fn organic_results(parsed: GoogleSearchResponse) -> Vec<SearchResult> {
    parsed
        .organic_results
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<RawOrganicResult>(v) {
            Ok(raw) => Some(SearchResult::from(raw)),
            Err(e) => {
                warn!(error = %e, "skipping malformed organic result");
                None
            }
        })
        .collect()
}

impl From<RawOrganicResult> for SearchResult {
    fn from(r: RawOrganicResult) -> Self {
        SearchResult {
            title: r.title,
            link: r.url,
            snippet: r.description,
            displayed_link: r.displayed_url,
            date: r.date,
            sitelinks: r.sitelinks.unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl SearchProvider for ScrapingBeeClient {
    fn name(&self) -> &'static str {
        "scrapingbee"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();

        let mut req = self
            .client
            .get(self.config.search_endpoint())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(&[
                ("api_key", self.config.api_key.as_str()),
                ("search", q.query.as_str()),
            ]);
        if let Some(lang) = q.language.as_deref() {
            req = req.query(&[("language", lang)]);
        }
        if let Some(timeout) = q.timeout() {
            req = req.timeout(timeout);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::SearchUnavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::SearchUnavailable(format!(
                "scrapingbee search HTTP {status}"
            )));
        }

        let parsed: GoogleSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::SearchUnavailable(e.to_string()))?;
        let results = organic_results(parsed);
        debug!(query = %q.query, count = results.len(), "scrapingbee search ok");

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());

        Ok(SearchResponse {
            results,
            provider: "scrapingbee".to_string(),
            timings_ms,
        })
    }
}

#[async_trait::async_trait]
impl PageFetcher for ScrapingBeeClient {
    async fn fetch(&self, req: &FetchRequest) -> Result<PageBody> {
        Ok(self.fetch_page(req).await)
    }
}

/// Blocking twin of [`ScrapingBeeClient`]'s fetch, same contract and policy.
///
/// Must not be constructed or dropped on an async runtime thread; wrap calls in
/// `tokio::task::spawn_blocking` from async code.
#[derive(Debug, Clone)]
pub struct BlockingScrapingBeeFetcher {
    client: reqwest::blocking::Client,
    config: ScrapingBeeConfig,
}

impl BlockingScrapingBeeFetcher {
    pub fn new(config: ScrapingBeeConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("chatpipe-local/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::FetchFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn fetch_page(&self, req: &FetchRequest) -> PageBody {
        let sent = self
            .client
            .get(self.config.fetch_endpoint())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(&self.config.fetch_params(req))
            .timeout(fetch_timeout(req))
            .send();
        let resp = match sent {
            Ok(resp) => resp,
            Err(e) => {
                error!(url = %req.url, error = %e, "error while accessing url");
                return PageBody::Unavailable;
            }
        };

        let status = resp.status().as_u16();
        if status == 404 {
            return PageBody::NotFound;
        }
        match resp.text() {
            Ok(body) => page_body_for_status(&req.url, status, body),
            Err(e) => {
                error!(url = %req.url, error = %e, "error while reading page body");
                PageBody::Unavailable
            }
        }
    }

    pub fn access_url(&self, url: &str, render_js: bool) -> String {
        let req = FetchRequest {
            url: url.to_string(),
            render_js,
            timeout_ms: None,
        };
        self.fetch_page(&req).into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_provider_field_names() {
        let js = r#"{"url": "http://x", "description": "d", "displayed_url": "disp"}"#;
        let raw: RawOrganicResult = serde_json::from_str(js).unwrap();
        let v = serde_json::to_value(SearchResult::from(raw)).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "link": "http://x",
                "snippet": "d",
                "displayed_link": "disp",
                "sitelinks": []
            })
        );
    }

    #[test]
    fn keeps_date_and_existing_sitelinks() {
        let js = r#"
        {
          "title": "T",
          "url": "https://example.com",
          "date": "2 days ago",
          "sitelinks": [{"title": "Docs"}]
        }
        "#;
        let r = SearchResult::from(serde_json::from_str::<RawOrganicResult>(js).unwrap());
        assert_eq!(r.title.as_deref(), Some("T"));
        assert_eq!(r.date.as_deref(), Some("2 days ago"));
        assert_eq!(r.sitelinks.len(), 1);
        assert!(r.snippet.is_none());
    }

    #[test]
    fn missing_url_becomes_null_link() {
        let r = SearchResult::from(serde_json::from_str::<RawOrganicResult>("{}").unwrap());
        assert!(r.link.is_none());
        let v = serde_json::to_value(&r).unwrap();
        assert!(v["link"].is_null());
    }

    #[test]
    fn parses_response_without_organic_results() {
        let parsed: GoogleSearchResponse =
            serde_json::from_str(r#"{"meta_data": {"url": "x"}}"#).unwrap();
        assert!(parsed.organic_results.is_none());
        let parsed: GoogleSearchResponse =
            serde_json::from_str(r#"{"organic_results": null}"#).unwrap();
        assert!(parsed.organic_results.is_none());
    }

    #[test]
    fn odd_record_only_loses_its_odd_fields() {
        let js = r#"
        {
          "organic_results": [
            {"title": "Good", "url": "https://good.test/", "sitelinks": [{"title": "Docs"}]},
            {"url": "https://odd.test/", "sitelinks": {"inline": [{"title": "x"}]}, "date": 20240101},
            "not a record",
            {"title": 7, "url": "https://third.test/", "description": "kept"}
          ]
        }
        "#;
        let parsed: GoogleSearchResponse = serde_json::from_str(js).unwrap();
        let results = organic_results(parsed);
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].link.as_deref(), Some("https://good.test/"));
        assert_eq!(results[0].sitelinks.len(), 1);

        assert_eq!(results[1].link.as_deref(), Some("https://odd.test/"));
        assert!(results[1].sitelinks.is_empty());
        assert!(results[1].date.is_none());

        assert!(results[2].title.is_none());
        assert_eq!(results[2].snippet.as_deref(), Some("kept"));
    }

    #[test]
    fn organic_results_of_the_wrong_shape_read_as_empty() {
        let parsed: GoogleSearchResponse =
            serde_json::from_str(r#"{"organic_results": {"0": {"url": "x"}}}"#).unwrap();
        assert!(organic_results(parsed).is_empty());
    }

    #[test]
    fn endpoints_follow_base_url() {
        let c = ScrapingBeeConfig::new("k");
        assert_eq!(
            c.search_endpoint(),
            "https://app.scrapingbee.com/api/v1/store/google"
        );
        assert_eq!(c.fetch_endpoint(), "https://app.scrapingbee.com/api/v1/");

        let c = ScrapingBeeConfig::new("k").with_base_url("http://127.0.0.1:9");
        assert_eq!(c.search_endpoint(), "http://127.0.0.1:9/store/google");
        assert_eq!(c.fetch_endpoint(), "http://127.0.0.1:9/");
    }

    #[test]
    fn fetch_params_encode_render_flag() {
        let c = ScrapingBeeConfig::new("k");
        let mut req = FetchRequest {
            url: "https://example.com".to_string(),
            render_js: false,
            timeout_ms: None,
        };
        assert_eq!(c.fetch_params(&req)[2], ("render_js", "false"));
        req.render_js = true;
        assert_eq!(c.fetch_params(&req)[2], ("render_js", "true"));
        assert_eq!(fetch_timeout(&req), Duration::from_secs(10));
    }

    #[test]
    fn status_policy_maps_to_exactly_one_outcome() {
        assert_eq!(
            page_body_for_status("u", 200, "<p>ok</p>".into()),
            PageBody::Html("<p>ok</p>".into())
        );
        assert_eq!(page_body_for_status("u", 404, String::new()), PageBody::NotFound);
        for s in [201u16, 301, 403, 429, 500, 503] {
            assert_eq!(
                page_body_for_status("u", s, "nope".into()),
                PageBody::Unavailable
            );
        }
    }
}
