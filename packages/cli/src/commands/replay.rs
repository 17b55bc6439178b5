use crate::config::ConfigArgs;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tether_client::{ClientConfig, Effect, NoopHooks, SessionController, SessionStats};
use tether_protocol::decode_server;
use tether_vdom::render_live;

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Recorded server messages, one JSON record per line
    pub log: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Print the final tree as HTML
    #[arg(long)]
    pub html: bool,
}

/// What a replay left behind.
#[derive(Debug)]
pub struct ReplaySummary {
    pub version: Option<u64>,
    pub html: Option<String>,
    pub stats: SessionStats,
    /// Effects the session asked for, one line each
    pub effects: Vec<String>,
}

fn describe(effect: &Effect) -> String {
    match effect {
        Effect::Send(message) | Effect::SendEvent { message, .. } => format!("send {}", message.kind()),
        Effect::HardReload { reason } => format!("hard reload ({})", reason),
    }
}

/// Feed a message log through a fresh session.
pub fn replay_log(config: &ClientConfig, log: &str) -> ReplaySummary {
    let mut session = SessionController::new(config, Box::new(NoopHooks));
    let mut effects = Vec::new();
    session.connection_opened(true);

    for line in log.lines().map(str::trim).filter(|l| !l.is_empty()) {
        for effect in session.handle_inbound(decode_server(line), Instant::now()) {
            effects.push(describe(&effect));
        }
    }

    ReplaySummary {
        version: session.version(),
        html: session.tree().map(|tree| render_live(tree, tree.root())),
        stats: session.stats().clone(),
        effects,
    }
}

pub fn replay(args: ReplayArgs, cwd: &Path) -> Result<()> {
    let config = args.config.resolve(cwd)?;
    let log = fs::read_to_string(&args.log)
        .with_context(|| format!("cannot read {}", args.log.display()))?;

    println!("{}", "▶ Replaying message log...".bright_blue().bold());
    let summary = replay_log(&config, &log);

    for effect in &summary.effects {
        println!("  {} {}", "→".cyan(), effect);
    }

    let stats = &summary.stats;
    println!();
    println!("  messages    {}", stats.messages);
    println!("  malformed   {}", stats.malformed);
    println!("  patches     {} applied, {} failed", stats.patches_applied, stats.patch_failures);
    println!("  morphs      {}", stats.morphs);
    println!("  desyncs     {}", stats.desyncs);
    match summary.version {
        Some(version) => println!("  version     {}", version),
        None => println!("  version     {}", "none".dimmed()),
    }

    if args.html {
        println!();
        match &summary.html {
            Some(html) => println!("{}", html),
            None => println!("{}", "(no tree mounted)".dimmed()),
        }
    }

    if stats.patch_failures == 0 && stats.desyncs == 0 {
        println!("\n{} Replay consistent", "✅".green());
    } else {
        println!("\n{} Replay needed recovery", "⚠️".yellow());
    }

    Ok(())
}
