//! CLI binary for localchat.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use localchat::{AppConfig, ChatServer, EngineBootstrapper};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// localchat: chat with a local language model in your browser.
#[derive(Parser)]
#[command(name = "localchat", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host the engine on a dedicated worker thread.
    #[arg(long, conflicts_with = "in_process")]
    worker: bool,

    /// Run the engine on the main runtime.
    #[arg(long)]
    in_process: bool,

    /// Port for the chat page (0 picks a free port).
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind the chat page to.
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.worker {
        config.use_worker = true;
    }
    if cli.in_process {
        config.use_worker = false;
    }
    if let Some(port) = cli.port {
        config.ui.port = port;
    }
    if let Some(host) = cli.host {
        config.ui.host = host;
    }

    // Suppress noisy dependency logs by default. RUST_LOG overrides everything.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "localchat={},mistralrs=warn,hf_hub=warn",
                config.log_level
            ))
        }))
        .init();

    println!("localchat v{}", env!("CARGO_PKG_VERSION"));
    // Bootstrap reports an invalid config through the engine status.
    if let Err(e) = config.validate() {
        warn!("invalid configuration: {e}");
    }

    let bootstrapper = EngineBootstrapper::new(config.clone());
    let status = bootstrapper.initialize();
    let server = ChatServer::start(&config, status).await?;
    println!("Open http://{} in your browser (Ctrl-C to quit)", server.addr());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutting down");
    server.shutdown();
    Ok(())
}

/// An explicit path must exist; a missing default file means defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    if let Some(path) = path {
        return AppConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }

    let default_path = AppConfig::default_config_path();
    if default_path.is_file() {
        AppConfig::from_file(&default_path)
            .with_context(|| format!("failed to load config from {}", default_path.display()))
    } else {
        Ok(AppConfig::default())
    }
}
