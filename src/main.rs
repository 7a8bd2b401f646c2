use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tilecast::config::Config;
use tilecast::server::HttpServer;
use tilecast::transport::{EmptyWorld, LogTransport, StaticBundleHost};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Public base URL of the audio bundle host
    #[arg(long)]
    bundle_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting tilecast playback server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }

    // Standalone collaborators; a world integration swaps in its own
    // transport and proximity implementations.
    let server = HttpServer::new(
        config,
        Arc::new(LogTransport),
        Arc::new(EmptyWorld),
        Arc::new(StaticBundleHost::new(args.bundle_url)),
    );

    let engine = server.engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            engine.shutdown();
            std::process::exit(0);
        }
    });

    server.run().await?;

    Ok(())
}
