//! Command-line / environment configuration.
//!
//! Secrets and endpoints are read here once and turned into the config structs
//! the library crates take; nothing below `main` looks at the environment.

use anyhow::Result;
use chatpipe_core::RetrievalConfig;
use chatpipe_local::agent::{ChatAgent, SearchTool, DEFAULT_MAX_TURNS};
use chatpipe_local::openai_compat::{self, OpenAiCompatClient, OpenAiCompatConfig};
use chatpipe_local::retrieve::Retriever;
use chatpipe_local::scrapingbee::{self, ScrapingBeeClient, ScrapingBeeConfig};
use std::sync::Arc;

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[derive(clap::Args, Debug, Clone)]
pub struct ScrapingBeeArgs {
    /// ScrapingBee API key.
    #[arg(long, env = "SCRAPINGBEE_API_KEY", hide_env_values = true, default_value = "")]
    pub scrapingbee_api_key: String,
    /// ScrapingBee API root (search lives at `store/google` under it).
    #[arg(long, env = "CHATPIPE_SCRAPINGBEE_BASE_URL", default_value = scrapingbee::DEFAULT_BASE_URL)]
    pub scrapingbee_base_url: String,
}

impl ScrapingBeeArgs {
    pub fn is_configured(&self) -> bool {
        !self.scrapingbee_api_key.trim().is_empty()
    }

    pub fn config(&self) -> ScrapingBeeConfig {
        ScrapingBeeConfig::new(self.scrapingbee_api_key.trim())
            .with_base_url(self.scrapingbee_base_url.trim())
    }

    pub fn client(&self, http: reqwest::Client) -> ScrapingBeeClient {
        ScrapingBeeClient::new(http, self.config())
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct RetrievalArgs {
    /// How many top-ranked search results get fetched.
    #[arg(long, default_value_t = 3)]
    pub max_links: usize,
    /// Paragraphs kept per fetched page.
    #[arg(long, default_value_t = 3)]
    pub top_k_paragraphs: usize,
    /// Lines shorter than this many characters are dropped.
    #[arg(long, default_value_t = chatpipe_local::extract::MIN_LINE_CHARS)]
    pub min_line_chars: usize,
    /// Result-language hint sent with the search.
    #[arg(long, default_value = "fr")]
    pub language: String,
    /// Ask the fetch proxy to execute JavaScript.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    pub render_js: bool,
}

impl RetrievalArgs {
    pub fn config(&self) -> RetrievalConfig {
        RetrievalConfig {
            max_links: self.max_links,
            top_k_paragraphs: self.top_k_paragraphs,
            min_line_chars: self.min_line_chars,
            language: self.language.clone(),
            render_js: self.render_js,
            ..RetrievalConfig::default()
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct LlmArgs {
    /// API key for the OpenAI-compatible chat endpoint.
    #[arg(long, env = "QWEN_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,
    #[arg(long, env = "CHATPIPE_LLM_BASE_URL", default_value = openai_compat::DEFAULT_BASE_URL)]
    pub llm_base_url: String,
    #[arg(long, env = "CHATPIPE_LLM_MODEL", default_value = openai_compat::DEFAULT_MODEL)]
    pub llm_model: String,
    #[arg(long, default_value_t = openai_compat::DEFAULT_TEMPERATURE)]
    pub temperature: f64,
    /// Upper bound on model round trips per chat message.
    #[arg(long, default_value_t = DEFAULT_MAX_TURNS)]
    pub max_turns: usize,
}

impl LlmArgs {
    pub fn is_configured(&self) -> bool {
        self.llm_api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    pub fn config(&self) -> OpenAiCompatConfig {
        OpenAiCompatConfig {
            base_url: self.llm_base_url.trim().to_string(),
            api_key: self
                .llm_api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            model: self.llm_model.trim().to_string(),
            temperature: Some(self.temperature),
            ..OpenAiCompatConfig::default()
        }
    }
}

pub fn retriever(
    http: &reqwest::Client,
    sb: &ScrapingBeeArgs,
    r: &RetrievalArgs,
) -> Retriever {
    let client = Arc::new(sb.client(http.clone()));
    Retriever::new(client.clone(), client, r.config())
}

/// Wire the agent: ScrapingBee-backed `SearchTool` plus the chat model.
pub fn build_agent(sb: &ScrapingBeeArgs, r: &RetrievalArgs, llm: &LlmArgs) -> Result<ChatAgent> {
    let http = chatpipe_local::http_client()?;
    let model = OpenAiCompatClient::new(http.clone(), llm.config())?;
    Ok(ChatAgent::new(model)
        .tool(SearchTool::new(retriever(&http, sb, r)))
        .max_turns(llm.max_turns))
}
