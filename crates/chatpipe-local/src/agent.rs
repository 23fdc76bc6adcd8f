use crate::openai_compat::{ChatMessage, OpenAiCompatClient, ToolSpec};
use crate::retrieve::Retriever;
use chatpipe_core::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const SEARCH_TOOL_NAME: &str = "SearchTool";
pub const SEARCH_TOOL_DESCRIPTION: &str = "Use this tool to retrieve factual information with their sources. This is useful to answer factual or knowledge-based questions";

pub const DEFAULT_PREAMBLE: &str = "You are a helpful assistant. When a question needs factual or current information, call SearchTool with a short search query, then answer from the returned paragraphs and cite their sources. If SearchTool returns \"No results found\", answer from what you know and say so.";

pub const DEFAULT_MAX_TURNS: usize = 5;

/// A callable the model can invoke by name.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object.
    fn parameters(&self) -> serde_json::Value;
    async fn call(&self, args: serde_json::Value) -> Result<String>;
}

fn tool_spec(tool: &dyn Tool) -> ToolSpec {
    ToolSpec::function(tool.name(), tool.description(), tool.parameters())
}

/// Exposes the retrieval pipeline to the model.
pub struct SearchTool {
    retriever: Retriever,
}

impl SearchTool {
    pub fn new(retriever: Retriever) -> Self {
        Self { retriever }
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        SEARCH_TOOL_DESCRIPTION
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search engine query"
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> Result<String> {
        // Some models send the bare string instead of an object.
        let query = match &args {
            serde_json::Value::String(s) => Some(s.as_str()),
            v => v.get("query").and_then(|q| q.as_str()),
        }
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| Error::Tool(format!("{SEARCH_TOOL_NAME} needs a non-empty query")))?;

        Ok(self.retriever.retrieve(query).await)
    }
}

/// Conversational agent: an OpenAI-compatible model, a set of tools, and a
/// process-wide message history.
pub struct ChatAgent {
    llm: OpenAiCompatClient,
    tools: Vec<Arc<dyn Tool>>,
    preamble: String,
    max_turns: usize,
    memory: Mutex<Vec<ChatMessage>>,
}

impl ChatAgent {
    pub fn new(llm: OpenAiCompatClient) -> Self {
        Self {
            llm,
            tools: Vec::new(),
            preamble: DEFAULT_PREAMBLE.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
            memory: Mutex::new(Vec::new()),
        }
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Snapshot of the conversation so far (user/assistant pairs).
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.memory.lock().await.clone()
    }

    pub async fn clear_memory(&self) {
        self.memory.lock().await.clear();
    }

    /// A name the model made up is reported back to it like any other tool
    /// failure, so it can retry or answer directly.
    async fn call_tool(&self, name: &str, args: serde_json::Value) -> Result<String> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| Error::Tool(format!("{name} is not a valid tool")))?;
        tool.call(args).await
    }

    /// Answer one user message, calling tools as the model requests.
    ///
    /// Holds the memory lock for the whole turn, so concurrent callers are
    /// served one at a time and history stays ordered. Memory only records
    /// turns that produced an answer.
    pub async fn run(&self, input: &str) -> Result<String> {
        let mut memory = self.memory.lock().await;

        let mut messages = Vec::with_capacity(memory.len() + 2);
        messages.push(ChatMessage::system(&self.preamble));
        messages.extend(memory.iter().cloned());
        messages.push(ChatMessage::user(input));

        let specs: Vec<ToolSpec> = self.tools.iter().map(|t| tool_spec(t.as_ref())).collect();

        for turn in 1..=self.max_turns {
            debug!(turn, model = self.llm.model(), "agent turn");
            let reply = self.llm.chat(&messages, &specs).await?;
            let calls = reply.requested_tool_calls().to_vec();

            if calls.is_empty() {
                let answer = reply.content.unwrap_or_default();
                memory.push(ChatMessage::user(input));
                memory.push(ChatMessage::assistant(answer.clone()));
                return Ok(answer);
            }

            messages.push(reply);
            for tc in calls {
                let args: serde_json::Value =
                    serde_json::from_str(&tc.function.arguments).unwrap_or_default();

                info!(tool = %tc.function.name, "executing tool call");
                let result = match self.call_tool(&tc.function.name, args).await {
                    Ok(out) => out,
                    Err(e) => {
                        warn!(tool = %tc.function.name, error = %e, "tool call failed");
                        format!("Error: {e}")
                    }
                };
                messages.push(ChatMessage::tool(&tc.id, result));
            }
        }

        Err(Error::Llm(format!("max turns ({}) exceeded", self.max_turns)))
    }
}
