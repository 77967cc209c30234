//! Pagegen Server
//!
//! HTTP API and one-shot CLI around the landing page orchestrator.

mod api;
mod config;

use api::AppState;
use clap::{Parser, Subcommand};
use config::PersistedConfig;
use futures::StreamExt;
use pagegen_core::{Orchestrator, WorkflowEvent};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pagegen")]
#[command(about = "SDK demo landing page generator", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Start the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
    /// Generate one landing page, printing progress as it runs
    Generate {
        /// What the page should demo
        message: String,
        /// Customer website to take branding from
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// SDK API key embedded in the page
        #[arg(long)]
        api_key: String,
        /// SDK endpoint embedded in the page
        #[arg(long)]
        endpoint: String,
    },
}

async fn build_orchestrator() -> anyhow::Result<Arc<Orchestrator>> {
    let config = PersistedConfig::load().await.into_orchestrator_config();
    let orchestrator = Orchestrator::from_env(config)?;
    Ok(Arc::new(orchestrator))
}

async fn run_server(port: u16) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator().await?;
    let state = Arc::new(AppState::new(orchestrator));
    let app = api::router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("🚀 Pagegen Server running at http://{}", addr);
    println!("   POST /api/v1/configure");
    println!("   POST /api/v1/generate, /api/v1/generate/stream");
    println!("   POST /api/v1/stop");
    println!("   GET  /api/v1/config (PATCH to persist), /api/v1/providers");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_generate(
    message: String,
    url: Option<String>,
    max_iterations: Option<u32>,
    api_key: String,
    endpoint: String,
) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator().await?;
    orchestrator.configure(&api_key, &endpoint)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹ Stopping...");
            ctrl_c.cancel();
        }
    });

    let mut events = orchestrator.generate_streaming(&message, url, max_iterations, cancel);
    while let Some(event) = events.next().await {
        match event {
            WorkflowEvent::NodeStart { node } => println!("▶ {}", node),
            WorkflowEvent::NodeComplete { status, .. } => println!("  {}", status),
            WorkflowEvent::Status { message, .. } => println!("  … {}", message),
            WorkflowEvent::Message { .. } | WorkflowEvent::Token { .. } => {}
            WorkflowEvent::Error { message } => eprintln!("  ❌ {}", message),
            WorkflowEvent::Complete { state } => {
                if let Some(path) = &state.export_path {
                    println!("✅ Landing page exported to {}", path);
                }
                return Ok(());
            }
            WorkflowEvent::Cancelled => anyhow::bail!("generation cancelled"),
        }
    }
    anyhow::bail!("generation failed")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagegen_core=info,pagegen_server=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    match args.command {
        Some(CliCommand::Generate {
            message,
            url,
            max_iterations,
            api_key,
            endpoint,
        }) => run_generate(message, url, max_iterations, api_key, endpoint).await,
        Some(CliCommand::Serve { port }) => run_server(port).await,
        None => run_server(8080).await,
    }
}
