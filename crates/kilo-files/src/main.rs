use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use kilo_files::{AppState, Config};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kilo-files")]
#[command(about = "Read-only file indexing and search tools for the kilo agent")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "KILO_FILES_PORT", default_value = "8000")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "KILO_FILES_BIND", default_value = "127.0.0.1")]
    bind: String,

    /// Allowed root directory (repeatable; the first resolves relative paths)
    #[arg(short, long, env = "KILO_FILES_ROOT", default_value = ".", value_delimiter = ',')]
    root: Vec<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "KILO_FILES_VERBOSE")]
    verbose: bool,

    /// Config file path (optional)
    #[arg(short, long, env = "KILO_FILES_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "kilo_files=debug,tower_http=debug"
    } else {
        "kilo_files=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    for root in &cli.root {
        if !root.is_dir() {
            return Err(format!("Root is not a directory: {}", root.display()).into());
        }
    }

    let state = AppState::new(cli.root.clone(), config)?;
    for root in state.tools.roots() {
        info!("Allowing access to: {}", root.display());
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = kilo_files::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    info!("Starting kilo-files on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
