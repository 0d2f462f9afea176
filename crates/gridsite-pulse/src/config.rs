use anyhow::{bail, Result};
use clap::Parser;
use gridsite_client::ClientConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "gridsite-pulse")]
#[command(about = "Live terminal dashboard for gridsite queries", long_about = None)]
#[command(rename_all = "kebab-case")]
pub struct Config {
    /// Backend root, e.g. http://localhost:8000
    #[arg(long, env = "GRIDSITE_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub base_url: String,
    #[arg(long, env = "GRIDSITE_CSRF_TOKEN")]
    pub csrf_token: Option<String>,
    /// Session cookie value, or a full `name=value` cookie pair.
    #[arg(long, env = "GRIDSITE_SESSION_COOKIE")]
    pub session_cookie: Option<String>,
    /// Health endpoint; relative paths resolve against the base URL.
    #[arg(long, env = "GRIDSITE_HEALTH_URL")]
    pub health_url: Option<String>,
    #[arg(long, env = "GRIDSITE_POLL_MS", default_value_t = 2_000)]
    pub poll_ms: u64,
    #[arg(long, env = "GRIDSITE_HEALTH_MS", default_value_t = 60_000)]
    pub health_ms: u64,
    #[arg(long, env = "GRIDSITE_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
    /// Program that opens export URLs.
    #[arg(long, env = "GRIDSITE_OPENER", default_value = "xdg-open")]
    pub opener: String,
    /// JSON file used instead of the page's initial-data block.
    #[arg(long, env = "GRIDSITE_INITIAL_DATA")]
    pub initial_data: Option<PathBuf>,
    /// JSON file used instead of the page's templates-data block.
    #[arg(long, env = "GRIDSITE_TEMPLATES_DATA")]
    pub templates_data: Option<PathBuf>,
    #[arg(long, env = "GRIDSITE_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("base url must start with http:// or https://, got {base:?}");
        }
        if self.poll_ms == 0 || self.health_ms == 0 {
            bail!("poll and health intervals must be positive");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_ms)
    }

    pub fn client(&self) -> ClientConfig {
        let mut client = ClientConfig::new(self.base_url.trim());
        client.csrf_token = self.csrf_token.clone();
        client.session_cookie = self.session_cookie.clone();
        client.health_url = self.health_url.clone();
        client.timeout = Duration::from_secs(self.timeout_secs.max(1));
        client
    }
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn log_stdout_enabled() -> bool {
    std::env::var("GRIDSITE_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false)
}
