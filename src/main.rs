use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use bughead::config::AppConfig;
use bughead::server;

#[derive(Parser)]
#[command(name = "bughead")]
#[command(version, about = "Bug report collection backend with GitHub issue forwarding")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database path (overrides BUGHEAD_DB)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bughead=info,tower_http=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { port, db } => {
            let mut config = AppConfig::from_env()?;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(db) = db {
                config.db_path = db;
            }
            server::start_server(config).await
        }
    }
}
