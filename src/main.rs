//! threadline - terminal chat client
//!
//! Talks to a remote assistant backend: logs in with an identity-provider
//! token, keeps the access token fresh, and shows conversations that survive
//! across sessions on the server.

mod app;
mod config;
mod error;
mod models;
mod services;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// threadline - chat with your assistant from the terminal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Config file path (default: ~/.config/threadline/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Backend base URL (overrides config)
    #[arg(long)]
    api_url: Option<String>,

    /// Open this saved conversation on startup
    #[arg(short, long)]
    session: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let filter = if args.debug {
        "threadline=debug,info"
    } else {
        "threadline=info,warn"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let mut config = if let Some(path) = args.config {
        config::Config::from_file(&path)?
    } else {
        config::Config::load()?
    };

    if let Some(api_url) = args.api_url {
        config.api.base_url = api_url;
    }
    tracing::debug!("Using backend {}", config.api.base_url);

    let mut app = app::App::new(config)?;
    app.run(args.session).await
}
