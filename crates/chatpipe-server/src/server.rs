use anyhow::Result;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chatpipe_local::agent::ChatAgent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ChatAgent>,
}

impl AppState {
    pub fn new(agent: ChatAgent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Agent failures are reported in-band with a 200, so clients only ever parse
/// one of these two shapes.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChatReply {
    Response { response: String },
    Error { error: String },
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "Hello": "The backend is running" }))
}

async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Json<ChatReply> {
    let t0 = Instant::now();
    match state.agent.run(&req.message).await {
        Ok(response) => {
            info!(elapsed_ms = t0.elapsed().as_millis() as u64, "chat answered");
            Json(ChatReply::Response { response })
        }
        Err(e) => {
            error!(error = %e, "chat failed");
            Json(ChatReply::Error {
                error: e.to_string(),
            })
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/chat", post(chat))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "chatpipe listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
