//! obfs3 proxy binary
//!
//! Usage: obfs3proxy <COMMAND>
//!
//! Commands:
//!   run       Run from a configuration file
//!   client    Accept plaintext locally and obfuscate towards a server
//!   server    Accept obfuscated connections and relay plaintext to a target
//!   generate  Print a configuration template

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use obfs3::proxy::{Mode, ProxyConfig, ProxyConfigFile};

#[derive(Parser)]
#[command(name = "obfs3proxy", version, about = "obfs3 stream obfuscation proxy")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run from a configuration file
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Accept plaintext locally and obfuscate towards a server
    Client(Endpoints),
    /// Accept obfuscated connections and relay plaintext to a target
    Server(Endpoints),
    /// Print a configuration template
    Generate {
        /// Side of the link the template is for
        #[arg(short, long, value_enum, default_value = "client")]
        mode: ModeArg,
    },
}

#[derive(clap::Args)]
struct Endpoints {
    /// Address to listen on (host:port)
    #[arg(short, long)]
    listen: String,
    /// Address to relay to (host:port)
    #[arg(short, long)]
    remote: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Client,
    Server,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Client => Mode::Client,
            ModeArg::Server => Mode::Server,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, respects RUST_LOG (e.g. RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run_from_file(&config).await,
        Command::Client(endpoints) => {
            run_proxy(ProxyConfig::new(Mode::Client, endpoints.listen, endpoints.remote)).await
        }
        Command::Server(endpoints) => {
            run_proxy(ProxyConfig::new(Mode::Server, endpoints.listen, endpoints.remote)).await
        }
        Command::Generate { mode } => generate_config(mode.into()),
    }
}

fn generate_config(mode: Mode) -> anyhow::Result<()> {
    let config = match mode {
        Mode::Client => ProxyConfig::new(mode, "127.0.0.1:1080", "SERVER_IP:8443"),
        Mode::Server => ProxyConfig::new(mode, "0.0.0.0:8443", "127.0.0.1:9001"),
    };

    println!("# obfs3 proxy configuration");
    println!();
    println!("{}", ProxyConfigFile::from_config(&config).to_toml()?);

    Ok(())
}

async fn run_from_file(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = ProxyConfigFile::from_toml(&content)?.to_config()?;
    run_proxy(config).await
}

async fn run_proxy(config: ProxyConfig) -> anyhow::Result<()> {
    tracing::info!(
        "Starting obfs3 {:?} proxy: {} -> {}",
        config.mode,
        config.listen_addr,
        config.remote_addr
    );
    obfs3::proxy::run(config).await?;
    Ok(())
}
