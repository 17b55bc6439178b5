use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tether_client::{ClientConfig, Tier};
use tether_protocol::Params;

pub const DEFAULT_CONFIG_NAME: &str = "tether.config.json";

/// Flags shared by commands that build a client configuration
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Config file (defaults to tether.config.json in the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Page URL of the view (overrides config)
    #[arg(long)]
    pub url: Option<String>,

    /// View to mount (overrides config)
    #[arg(long)]
    pub view: Option<String>,

    /// Mount parameters as a JSON object
    #[arg(long)]
    pub params: Option<String>,

    /// Restrict to these transport tiers (socket, push-stream, polling)
    #[arg(long = "tier", value_parser = parse_tier)]
    pub tiers: Vec<Tier>,
}

pub fn parse_tier(value: &str) -> Result<Tier, String> {
    match value {
        "socket" | "ws" => Ok(Tier::Socket),
        "push-stream" | "sse" => Ok(Tier::PushStream),
        "polling" | "http" => Ok(Tier::Polling),
        other => Err(format!("unknown tier {:?} (socket, push-stream, polling)", other)),
    }
}

/// Parse a JSON object given on the command line.
pub fn parse_params(json: &str) -> Result<Params> {
    match serde_json::from_str(json).with_context(|| format!("invalid JSON: {}", json))? {
        serde_json::Value::Object(params) => Ok(params),
        other => Err(anyhow!("expected a JSON object, got {}", other)),
    }
}

impl ConfigArgs {
    /// Load the config file, then apply flag overrides.
    pub fn resolve(&self, cwd: &Path) -> Result<ClientConfig> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_NAME));
        let mut config = ClientConfig::load(&path)?;

        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(view) = &self.view {
            config.view = view.clone();
        }
        if let Some(params) = &self.params {
            config.params = parse_params(params)?;
        }
        if !self.tiers.is_empty() {
            config.tiers.socket = self.tiers.contains(&Tier::Socket);
            config.tiers.push_stream = self.tiers.contains(&Tier::PushStream);
            config.tiers.polling = self.tiers.contains(&Tier::Polling);
        }
        Ok(config)
    }
}
