use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use traffic_switch::backend::FileVersionStore;
use traffic_switch::config::Config;
use traffic_switch::proxy::{init_tracing, ProxyServer};

/// Route traffic to the v1 or v2 backend pool with live, health-checked cutover.
#[derive(Debug, Parser)]
#[command(name = "traffic-switch", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,

    /// Listen address, overriding `server.bind_addr`.
    #[arg(long)]
    bind: Option<String>,

    /// Version state file, overriding `routing.state_file`.
    #[arg(long)]
    state_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::load_from(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }
    if let Some(state_file) = cli.state_file {
        config.routing.state_file = state_file;
    }

    let store = Arc::new(FileVersionStore::new(config.routing.state_file.clone()));
    let mut server = ProxyServer::new(&config, store)?;
    server.bind(&config.server.bind_addr).await?;
    server.run().await?;

    Ok(())
}
