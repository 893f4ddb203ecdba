//! AJP13 server binary.
//!
//! Runs the demonstration [`EchoHandler`] behind an AJP listener.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use ajp13_server::config::{load_config, AjpConfig};
use ajp13_server::lifecycle::startup;
use ajp13_server::observability::logging;
use ajp13_server::EchoHandler;

#[derive(Parser)]
#[command(name = "ajp13-server")]
#[command(about = "AJP13 endpoint for a front-end web server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AjpConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);

    tracing::info!("ajp13-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        acceptors = config.listener.acceptors,
        max_connections = config.listener.max_connections,
        jvm_route = ?config.session.jvm_route,
        config_file = ?cli.config,
        "Configuration loaded"
    );

    startup::serve(config, Arc::new(EchoHandler)).await?;
    Ok(())
}
