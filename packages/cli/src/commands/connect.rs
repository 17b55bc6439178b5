use crate::config::{parse_params, ConfigArgs};
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tether_client::{ClientHandle, ClientRuntime, RunOutcome, ViewHooks};
use tether_protocol::Params;
use tether_vdom::{render_live, LiveTree, NodeId};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Args)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// How many hard reloads to go through before giving up
    #[arg(long, default_value_t = 3)]
    pub max_reloads: u32,

    /// Print the final tree as HTML
    #[arg(long)]
    pub html: bool,
}

/// Prints what happens to the view.
struct TerminalHooks;

impl ViewHooks for TerminalHooks {
    fn subtree_mutated(&mut self, _tree: &LiveTree, roots: &[NodeId]) {
        println!("  {} updated {} subtree(s)", "↻".cyan(), roots.len());
    }

    fn connection_changed(&mut self, connected: bool) {
        if connected {
            println!("{} connected", "●".green());
        } else {
            println!("{} disconnected", "○".yellow());
        }
    }

    fn server_error(&mut self, message: &str, _detail: &Params) {
        eprintln!("  {} {}", "✗".red(), message.red());
    }

    fn push_event(&mut self, event: &str, payload: &Value) {
        println!("  {} {} {}", "⇣".bright_blue(), event.bold(), payload);
    }

    fn warning(&mut self, message: &str) {
        println!("  {} {}", "⚠️".yellow(), message);
    }
}

/// Parse one input line: `EVENT [JSON-OBJECT]`. Blank lines and `#`
/// comments yield nothing.
pub fn parse_line(line: &str) -> Result<Option<(String, Params)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (event, rest) = match line.split_once(char::is_whitespace) {
        Some((event, rest)) => (event, rest.trim()),
        None => (line, ""),
    };
    if event.is_empty() {
        return Err(anyhow!("missing event name"));
    }
    let params = if rest.is_empty() { Params::new() } else { parse_params(rest)? };
    Ok(Some((event.to_string(), params)))
}

/// Read events from stdin and forward them to whichever session is current.
fn spawn_input(current: Arc<Mutex<Option<ClientHandle>>>, eof: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => break,
            };
            let handle = match current.lock() {
                Ok(guard) => guard.clone(),
                Err(_) => break,
            };
            match (parse_line(&line), handle) {
                (Ok(Some((event, params))), Some(handle)) => {
                    if handle.dispatch(event, params).is_err() {
                        tracing::debug!("session gone, event dropped");
                    }
                }
                (Ok(Some(_)), None) => eprintln!("  {} not connected yet", "⚠️".yellow()),
                (Ok(None), _) => {}
                (Err(e), _) => eprintln!("  {} {}", "✗".red(), e),
            }
        }

        eof.store(true, Ordering::SeqCst);
        if let Ok(guard) = current.lock() {
            if let Some(handle) = guard.as_ref() {
                let _ = handle.shutdown();
            }
        }
    });
}

pub async fn connect(args: ConnectArgs, cwd: &Path) -> Result<()> {
    let config = args.config.resolve(cwd)?;
    if config.view.is_empty() {
        return Err(anyhow!("no view configured; pass --view or run `tether init`"));
    }

    println!(
        "{} {} at {}",
        "🔌 Connecting".bright_blue().bold(),
        config.view.bright_white(),
        config.url
    );
    println!("{}", "Type `EVENT {\"param\": ...}` per line, Ctrl-D to leave.".dimmed());

    let current: Arc<Mutex<Option<ClientHandle>>> = Arc::new(Mutex::new(None));
    let eof = Arc::new(AtomicBool::new(false));
    spawn_input(current.clone(), eof.clone());

    let mut reloads = 0;
    loop {
        let (runtime, handle) = ClientRuntime::new(config.clone(), Box::new(TerminalHooks));
        if let Ok(mut guard) = current.lock() {
            *guard = Some(handle);
        }

        let report = runtime.run().await?;
        match report.outcome {
            RunOutcome::Closed => {
                if args.html {
                    if let Some(tree) = report.session.tree() {
                        println!("{}", render_live(tree, tree.root()));
                    }
                }
                let stats = report.session.stats();
                println!(
                    "\n{} {} messages, {} patches applied, {} failovers",
                    "✅".green(),
                    stats.messages,
                    stats.patches_applied,
                    report.failovers
                );
                return Ok(());
            }
            RunOutcome::Reload { reason } => {
                reloads += 1;
                if eof.load(Ordering::SeqCst) {
                    return Ok(());
                }
                if reloads > args.max_reloads {
                    return Err(anyhow!("gave up after {} reloads (last: {})", args.max_reloads, reason));
                }
                println!("{} reloading view: {}", "⟲".yellow(), reason);
            }
        }
    }
}
