//! llm-stream - command-line client for the LLM compute service
//!
//! Connects a session, optionally asks one question, and closes.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llm_stream::client::HttpBlobFetcher;
use llm_stream::{Args, ChatRequest, GrpcTransport, LlmClient};

#[derive(Parser, Debug)]
#[command(name = "llm-stream", version)]
struct Cli {
    #[command(flatten)]
    args: Args,

    /// Question to ask once connected
    #[arg(long)]
    prompt: Option<String>,

    /// System message sent before the prompt
    #[arg(long)]
    system: Option<String>,

    /// Tags attached to the request
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Only answer from the server-side cache
    #[arg(long)]
    cache_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let args = &cli.args;

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("llm_stream={},info", log_level).into()),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  llm-stream");
    info!("======================================");
    info!("Server: {}", args.server_url);
    info!("Method: {}", args.method_path);
    info!("Engine: {}", args.engine);
    info!("Identity: {:?}", args.identity);
    info!("======================================");

    let transport = GrpcTransport::connect_lazy(&args.server_url, &args.method_path)?;
    let client = LlmClient::connect(Arc::new(transport), args.session_config(), args.retry_policy())
        .await?
        .with_blob_fetcher(Arc::new(HttpBlobFetcher::new(args.blob_timeout())));

    info!("Session token: {}", client.token().await);

    if let Some(prompt) = &cli.prompt {
        let mut chat = ChatRequest::new(None)?;
        if let Some(system) = &cli.system {
            chat = chat.system(system);
        }
        let chat = chat.user(prompt);

        let output = client.ask(&chat, &cli.tags, cli.cache_only, None).await?;
        match (&output.error, output.text()) {
            (Some(err), _) => error!("Server reported an error: {}", err),
            (None, Some(text)) => println!("{}", text),
            (None, None) => info!("No answer returned"),
        }
    }

    client.close().await;
    info!("Shutdown complete");
    Ok(())
}
