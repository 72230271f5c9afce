use anyhow::{Context, Result};
use artsensei_api::config::Config;
use artsensei_api::state::AppState;
use artsensei_core::GROUNDED_PROMPT_VERSION;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Real-time art conversation server")]
struct Cli {
    /// Address to listen on. Overrides BIND_ADDRESS.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 2. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 3. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    info!(
        "Configuration loaded. Gemini model: {}, grounded prompt template v{}.",
        config.gemini_model, GROUNDED_PROMPT_VERSION
    );

    // --- 4. Build Shared State ---
    let state = Arc::new(AppState::from_config(&config));
    let app = artsensei_api::app(state);

    // --- 5. Serve ---
    let addr = args.bind.unwrap_or(config.bind_address);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("ArtSensei server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
