//! Web-K relay backend binary.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use webk_chat::LLMConfig;
use webk_core::WebKConfig;
use webk_server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" | "help" => {
                println!("Web-K: ask an LLM about any text you select");
                println!();
                println!("Usage: webk [command]");
                println!();
                println!("Commands:");
                println!("  (none)    Start the relay server");
                println!("  help      Show this help message");
                println!();
                println!("Environment:");
                println!("  PORT                           Listen port (default 3001)");
                println!("  GOOGLE_GENERATIVE_AI_API_KEY   Gemini API key (or GEMINI_API_KEY)");
                println!("  OPENAI_API_KEY                 OpenAI API key");
                println!("  WEBK_PROVIDER                  auto | gemini | openai");
                println!("  WEBK_MODEL                     Model override");
                println!("  GEMINI_BASE_URL                Gemini API base override");
                println!("  OPENAI_BASE_URL                OpenAI-compatible API base override");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'webk help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let config = WebKConfig::from_env();
    let llm_config = LLMConfig::from_env();
    let port = config.port;

    match llm_config.resolve_provider() {
        Some((provider, model, _)) => info!("LLM provider: {} ({})", provider, model),
        None => warn!("No LLM provider configured; /api/ask will answer 503"),
    }

    let state = Arc::new(AppState::new(config, llm_config));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Web-K relay listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
