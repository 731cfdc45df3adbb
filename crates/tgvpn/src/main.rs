//! tgvpn: VPN dashboard CLI
//!
//! Usage:
//!   tgvpn servers [--ranked]      List servers with latency, load and score
//!   tgvpn recommend               Show the best server
//!   tgvpn connect [ID]            Connect (recommended server if no ID) until Ctrl-C
//!   tgvpn cycle [ID]              Connect, hold, disconnect
//!   tgvpn status                  Dashboard overview
//!   tgvpn guide [PROVIDER]        Deployment guides
//!   tgvpn docs [SECTION]          Documentation
//!   tgvpn content [KEY]           Raw content blobs
//!   tgvpn init-config <PATH>      Write the default config

mod commands;
mod host;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "tgvpn")]
#[command(version)]
#[command(about = "VPN dashboard: servers, sessions, deployment guides", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Dashboard config (.toml or .json)
    #[arg(short, long, global = true, env = "TGVPN_CONFIG")]
    config: Option<PathBuf>,

    /// Directory whose files override the bundled guides and docs
    #[arg(long, global = true, env = "TGVPN_CONTENT_DIR")]
    content_dir: Option<PathBuf>,

    /// Machine-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List servers
    Servers {
        /// Order by score instead of catalog order
        #[arg(short, long)]
        ranked: bool,
    },

    /// Show the recommended server
    Recommend,

    /// Connect and stay connected until Ctrl-C
    Connect {
        /// Server id (defaults to the recommended server)
        id: Option<String>,
    },

    /// Connect, hold the tunnel, then disconnect
    Cycle {
        /// Server id (defaults to the recommended server)
        id: Option<String>,

        /// Seconds to stay connected
        #[arg(long, default_value_t = 3)]
        hold: u64,
    },

    /// Dashboard overview
    Status,

    /// Deployment guides
    Guide {
        /// aws, digitalocean, docker or telegram
        provider: Option<String>,
    },

    /// Documentation pages
    Docs {
        /// overview, api, configuration, troubleshooting or security
        section: Option<String>,
    },

    /// Print a content blob by key, or list keys
    Content { key: Option<String> },

    /// Write the default configuration
    InitConfig {
        /// Target file (.toml or .json)
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "tgvpn=debug,tgvpn_core=debug,tgvpn_content=debug"
    } else {
        "tgvpn=info,tgvpn_core=info,tgvpn_content=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        command,
        config,
        content_dir,
        json,
        verbose,
    } = Cli::parse();
    init_logging(verbose);
    info!("tgvpn {}", env!("CARGO_PKG_VERSION"));

    let context = || commands::Context::new(config.as_deref(), content_dir.clone(), json);

    match command {
        Commands::Servers { ranked } => commands::servers(&context()?, ranked),
        Commands::Recommend => commands::recommend(&context()?),
        Commands::Connect { id } => commands::connect(&context()?, id).await,
        Commands::Cycle { id, hold } => {
            commands::cycle(&context()?, id, Duration::from_secs(hold)).await
        }
        Commands::Status => commands::status(&context()?).await,
        Commands::Guide { provider } => commands::guide(&context()?, provider),
        Commands::Docs { section } => commands::docs(&context()?, section),
        Commands::Content { key } => commands::content(&context()?, key),
        Commands::InitConfig { path, force } => commands::init_config(&path, force),
    }
}
