mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{connect, diff, init, replay, ConnectArgs, DiffArgs, InitArgs, ReplayArgs};
use tracing_subscriber::EnvFilter;

/// Tether CLI - client for server-rendered live views
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a tether.config.json
    Init(InitArgs),

    /// Mount a view on a live server and send events from stdin
    Connect(ConnectArgs),

    /// Feed a recorded server message log through a session
    Replay(ReplayArgs),

    /// Compute the patches between two trees
    Diff(DiffArgs),
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    match cli.command {
        Command::Init(args) => init(args, &cwd),
        Command::Connect(args) => connect(args, &cwd).await,
        Command::Replay(args) => replay(args, &cwd),
        Command::Diff(args) => diff(args, &cwd),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tether=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
