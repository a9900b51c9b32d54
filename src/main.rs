mod config;
mod logs;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use config::{CommonConfig, PathSet};
use server::config::ServerConfig;
use server::factory::ServerFactory;

/// Game deals API server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct ServerArgs {
    /// Config directory, holds `server.toml` and `pki/`. Default:
    /// `$GAMEDEALS_CONFIG` or `~/.config/gamedeals`.
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Data directory for the sqlite database. Default: `$GAMEDEALS_DATA` or
    /// `~/.local/share/gamedeals`.
    #[arg(long)]
    pub data_path: Option<PathBuf>,

    /// One of error, warn, info, debug.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Print server configuration data (JSON) and exit.
    #[arg(long)]
    pub print_config: bool,
}

async fn run(args: ServerArgs) -> Result<()> {
    logs::init(&args.log_level)?;

    let ps = PathSet::new(args.config_path, args.data_path)?;
    let cfg: ServerConfig = ps.load_config("server", ServerConfig::default)?;

    if args.print_config {
        let json = serde_json::to_string_pretty(&cfg).context("encode config")?;
        println!("{json}");
        return Ok(());
    }

    let factory = ServerFactory::new(cfg)?;
    let srv = factory.build_server().await?;
    srv.run().await.context("run restful server")?;

    info!("Server exited by user");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();
    if let Err(e) = run(args).await {
        error!("Error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
