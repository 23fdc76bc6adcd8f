use axum::{extract::Query, http::StatusCode, response::IntoResponse, routing::get, Router};
use chatpipe_core::{
    FetchRequest, PageBody, RetrievalConfig, SearchProvider, SearchQuery, NO_RESULTS_FOUND,
};
use chatpipe_local::retrieve::Retriever;
use chatpipe_local::scrapingbee::{ScrapingBeeClient, ScrapingBeeConfig};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn paragraph(word: &str) -> String {
    std::iter::repeat(word).take(30).collect::<Vec<_>>().join(" ")
}

/// ScrapingBee lookalike: `/store/google` returns three organic results, `/`
/// renders the page named by the `url` param.
fn fixture(seen: Arc<Mutex<Vec<HashMap<String, String>>>>) -> Router {
    let search = get(|Query(q): Query<HashMap<String, String>>| async move {
        assert_eq!(q.get("api_key").map(String::as_str), Some("test-key"));
        assert_eq!(q.get("language").map(String::as_str), Some("fr"));
        let query = q.get("search").cloned().unwrap_or_default();
        axum::Json(serde_json::json!({
            "meta_data": {"number_of_results": 3},
            "organic_results": [
                {"title": "A", "url": format!("https://site.test/a?q={query}"), "description": "alpha", "displayed_url": "site.test/a"},
                {"title": "B", "url": "https://site.test/broken", "description": "beta"},
                {"title": "C", "url": "https://site.test/short", "date": "1 day ago"},
                {"title": "D", "url": "https://site.test/never-fetched"}
            ]
        }))
    });

    let fetch = get(move |Query(q): Query<HashMap<String, String>>| {
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push(q.clone());
            let url = q.get("url").cloned().unwrap_or_default();
            if url.contains("broken") {
                return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded".to_string())
                    .into_response();
            }
            if url.contains("missing") {
                return (StatusCode::NOT_FOUND, String::new()).into_response();
            }
            if url.contains("short") {
                return axum::response::Html(
                    "<html><body><article><h1>Tiny</h1>\n<p>too short</p></article></body></html>"
                        .to_string(),
                )
                .into_response();
            }
            axum::response::Html(format!(
                "<html><body><nav>menu</nav><article><p>{}\n{}</p></article></body></html>",
                paragraph("first"),
                paragraph("second")
            ))
            .into_response()
        }
    });

    Router::new()
        .route("/store/google", search)
        .route("/", fetch)
}

fn client(addr: SocketAddr) -> ScrapingBeeClient {
    ScrapingBeeClient::new(
        chatpipe_local::http_client().unwrap(),
        ScrapingBeeConfig::new("test-key").with_base_url(format!("http://{addr}/")),
    )
}

fn retriever(c: ScrapingBeeClient) -> Retriever {
    let c = Arc::new(c);
    Retriever::new(c.clone(), c, RetrievalConfig::default())
}

#[tokio::test]
async fn search_fetch_extract_end_to_end() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let addr = serve(fixture(seen.clone())).await;

    let out = retriever(client(addr)).retrieve("rust").await;
    let v: serde_json::Value = serde_json::from_str(&out).expect("retrieve returns json");
    let arr = v.as_array().expect("array of snippets");
    assert_eq!(arr.len(), 3);

    assert_eq!(arr[0]["source"], "https://site.test/a?q=rust");
    assert_eq!(
        arr[0]["contents"],
        serde_json::json!([paragraph("first"), paragraph("second")])
    );
    // 500 from the proxy becomes the unavailable sentinel, which has no paragraphs.
    assert_eq!(arr[1]["source"], "https://site.test/broken");
    assert_eq!(arr[1]["contents"], serde_json::json!([]));
    // Page with only short lines.
    assert_eq!(arr[2]["contents"], serde_json::json!([]));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3, "only the top three links are fetched");
    assert!(seen
        .iter()
        .all(|q| q.get("render_js").map(String::as_str) == Some("false")));
    assert!(!seen
        .iter()
        .any(|q| q.get("url").map(String::as_str) == Some("https://site.test/never-fetched")));
}

#[tokio::test]
async fn unreachable_search_degrades_to_fallback_sentence() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap()
    };
    let out = retriever(client(addr)).retrieve("rust").await;
    assert_eq!(out, NO_RESULTS_FOUND);
}

#[tokio::test]
async fn search_http_error_degrades_to_fallback_sentence() {
    let app = Router::new().route(
        "/store/google",
        get(|| async { (StatusCode::UNAUTHORIZED, "invalid api key") }),
    );
    let addr = serve(app).await;
    assert_eq!(retriever(client(addr)).retrieve("rust").await, NO_RESULTS_FOUND);
}

#[tokio::test]
async fn search_without_organic_results_is_empty_array() {
    let app = Router::new().route(
        "/store/google",
        get(|| async { axum::Json(serde_json::json!({"meta_data": {}})) }),
    );
    let addr = serve(app).await;
    let c = client(addr);
    let resp = c
        .search(&SearchQuery {
            query: "nothing".to_string(),
            language: None,
            timeout_ms: Some(2_000),
        })
        .await
        .unwrap();
    assert!(resp.results.is_empty());
    assert_eq!(resp.provider, "scrapingbee");
    assert!(resp.timings_ms.contains_key("search"));
    assert_eq!(retriever(c).retrieve("nothing").await, "[]");
}

#[tokio::test]
async fn async_fetch_maps_status_to_sentinels() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let addr = serve(fixture(seen.clone())).await;
    let c = client(addr);

    let ok = c.access_url_async("https://site.test/a", true).await;
    assert!(ok.contains(&paragraph("first")));
    assert_eq!(
        c.access_url_async("https://site.test/missing", false).await,
        "404"
    );
    assert_eq!(
        c.access_url_async("https://site.test/broken", false).await,
        "Could not load page"
    );
    assert_eq!(
        seen.lock().unwrap()[0].get("render_js").map(String::as_str),
        Some("true")
    );
}

#[tokio::test]
async fn async_fetch_timeout_is_unavailable() {
    let app = Router::new().route(
        "/",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }),
    );
    let addr = serve(app).await;
    let body = client(addr)
        .fetch_page(&FetchRequest {
            url: "https://site.test/slow".to_string(),
            render_js: false,
            timeout_ms: Some(200),
        })
        .await;
    assert_eq!(body, PageBody::Unavailable);
}
