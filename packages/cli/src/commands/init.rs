use crate::config::DEFAULT_CONFIG_NAME;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::Path;
use tether_client::ClientConfig;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Page URL of the view
    #[arg(long, default_value = "http://127.0.0.1:8000/")]
    pub url: String,

    /// View to mount
    #[arg(long, default_value = "")]
    pub view: String,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &Path) -> Result<()> {
    let config_path = cwd.join(DEFAULT_CONFIG_NAME);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    let config = ClientConfig {
        url: args.url,
        view: args.view,
        ..ClientConfig::default()
    };
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);
    println!();
    println!("Next steps:");
    println!("  1. Set the view in {}", DEFAULT_CONFIG_NAME);
    println!("  2. Run: tether connect");

    Ok(())
}
