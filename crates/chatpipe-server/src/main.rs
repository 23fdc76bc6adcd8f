use anyhow::{Context, Result};
use chatpipe::config::{self, LlmArgs, RetrievalArgs, ScrapingBeeArgs};
use chatpipe::server::{self, AppState};
use chatpipe_core::FetchRequest;
use chatpipe_local::extract::extract_paragraphs_with;
use chatpipe_local::scrapingbee::BlockingScrapingBeeFetcher;
use clap::{Parser, Subcommand};
use std::io::Read;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "chatpipe")]
#[command(about = "Chat backend with a web-search tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
enum Commands {
    /// Run the HTTP chat server.
    Serve(ServeCmd),
    /// Run search -> fetch -> extract once and print the tool output.
    Search(SearchCmd),
    /// Fetch one page through ScrapingBee and print the body (or a sentinel).
    Fetch(FetchCmd),
    /// Extract paragraphs from an HTML file (or stdin) as a JSON array.
    Extract(ExtractCmd),
    /// Diagnose configuration (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info (json).
    Version,
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    /// Address to listen on.
    #[arg(long, env = "CHATPIPE_BIND", default_value = config::DEFAULT_BIND)]
    bind: String,
    #[command(flatten)]
    scrapingbee: ScrapingBeeArgs,
    #[command(flatten)]
    retrieval: RetrievalArgs,
    #[command(flatten)]
    llm: LlmArgs,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    query: String,
    #[command(flatten)]
    scrapingbee: ScrapingBeeArgs,
    #[command(flatten)]
    retrieval: RetrievalArgs,
}

#[derive(clap::Args, Debug)]
struct FetchCmd {
    url: String,
    /// Use the blocking client instead of the async one.
    #[arg(long)]
    blocking: bool,
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    render_js: bool,
    #[command(flatten)]
    scrapingbee: ScrapingBeeArgs,
}

#[derive(clap::Args, Debug)]
struct ExtractCmd {
    /// HTML file to read; stdin when omitted.
    #[arg(long)]
    file: Option<std::path::PathBuf>,
    #[arg(long, default_value_t = 3)]
    top_k: usize,
    #[arg(long, default_value_t = chatpipe_local::extract::MIN_LINE_CHARS)]
    min_line_chars: usize,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    #[command(flatten)]
    scrapingbee: ScrapingBeeArgs,
    #[command(flatten)]
    retrieval: RetrievalArgs,
    #[command(flatten)]
    llm: LlmArgs,
}

fn init_tracing() {
    // stderr only: stdout carries the JSON that the CLI prints.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatpipe=info,chatpipe_local=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` never overrides variables already in the process environment.
    if std::env::var("CHATPIPE_DOTENV").as_deref() != Ok("0") {
        dotenv::dotenv().ok();
    }
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            if !args.scrapingbee.is_configured() {
                tracing::warn!("SCRAPINGBEE_API_KEY is not set; every search will come back empty");
            }
            let agent = config::build_agent(&args.scrapingbee, &args.retrieval, &args.llm)?;
            info!(
                tools = ?agent.tool_names(),
                model = %args.llm.llm_model,
                "agent ready"
            );
            server::serve(&args.bind, AppState::new(agent)).await?;
        }
        Commands::Search(args) => {
            let http = chatpipe_local::http_client()?;
            let retriever = config::retriever(&http, &args.scrapingbee, &args.retrieval);
            println!("{}", retriever.retrieve(&args.query).await);
        }
        Commands::Fetch(args) => {
            let body = if args.blocking {
                let cfg = args.scrapingbee.config();
                let (url, render_js) = (args.url.clone(), args.render_js);
                tokio::task::spawn_blocking(move || {
                    BlockingScrapingBeeFetcher::new(cfg).map(|f| f.access_url(&url, render_js))
                })
                .await
                .context("blocking fetch task")??
            } else {
                let http = chatpipe_local::http_client()?;
                args.scrapingbee
                    .client(http)
                    .fetch_page(&FetchRequest {
                        url: args.url.clone(),
                        render_js: args.render_js,
                        timeout_ms: None,
                    })
                    .await
                    .into_text()
            };
            println!("{body}");
        }
        Commands::Extract(args) => {
            let html = match &args.file {
                Some(p) => std::fs::read_to_string(p)
                    .with_context(|| format!("read {}", p.display()))?,
                None => {
                    let mut s = String::new();
                    std::io::stdin()
                        .read_to_string(&mut s)
                        .context("read stdin")?;
                    s
                }
            };
            let paragraphs = extract_paragraphs_with(&html, args.top_k, args.min_line_chars);
            println!("{}", serde_json::to_string(&paragraphs)?);
        }
        Commands::Doctor(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "name": "chatpipe",
                "version": env!("CARGO_PKG_VERSION"),
                "configured": {
                    "scrapingbee": args.scrapingbee.is_configured(),
                    "llm": args.llm.is_configured(),
                },
                "scrapingbee": {
                    "base_url": args.scrapingbee.scrapingbee_base_url,
                },
                "llm": {
                    "base_url": args.llm.llm_base_url,
                    "model": args.llm.llm_model,
                    "temperature": args.llm.temperature,
                    "max_turns": args.llm.max_turns,
                },
                "retrieval": args.retrieval.config(),
            });
            println!("{v}");
        }
        Commands::Version => {
            let v = serde_json::json!({
                "schema_version": 1,
                "name": "chatpipe",
                "version": env!("CARGO_PKG_VERSION"),
            });
            println!("{v}");
        }
    }

    Ok(())
}
