use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub sheet: SheetConfig,
    #[serde(default)]
    pub rate: RateConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LineConfig {
    #[serde(default)]
    pub channel_secret: String,
    #[serde(default)]
    pub channel_access_token: String,
    #[serde(default = "default_line_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetConfig {
    /// Google Apps Script web app that appends rows to the sheet.
    #[serde(default)]
    pub webapp_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateConfig {
    #[serde(default = "default_rate_api_url")]
    pub api_url: String,
    /// TWD per KRW used whenever the live rate cannot be fetched.
    #[serde(default = "default_fallback_rate")]
    pub fallback: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_table_keyword")]
    pub table_keyword: String,
}

fn default_line_api_base_url() -> String {
    "https://api.line.me".to_string()
}

fn default_rate_api_url() -> String {
    "https://open.er-api.com/v6/latest/KRW".to_string()
}

fn default_fallback_rate() -> f64 {
    crate::rate::FALLBACK_RATE
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_table_keyword() -> String {
    "對照表".to_string()
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_secret: String::new(),
            channel_access_token: String::new(),
            api_base_url: default_line_api_base_url(),
        }
    }
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            webapp_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            api_url: default_rate_api_url(),
            fallback: default_fallback_rate(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            table_keyword: default_table_keyword(),
        }
    }
}

impl SheetConfig {
    /// Web app URL with blank strings treated as unset.
    pub fn url(&self) -> Option<&str> {
        self.webapp_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load the TOML file at `path` (absent file means all defaults), then
    /// apply overrides from the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// `load` with the environment supplied by `lookup`.
    pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Environment variables win over the file. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = lookup("LINE_CHANNEL_SECRET") {
            self.line.channel_secret = secret;
        }
        if let Some(token) = lookup("LINE_CHANNEL_ACCESS_TOKEN") {
            self.line.channel_access_token = token;
        }
        if let Some(url) = lookup("GOOGLE_SHEET_WEBAPP_URL") {
            self.sheet.webapp_url = Some(url);
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        Ok(())
    }

    /// The LINE credentials are required to serve at all; the sheet URL is
    /// not, since its absence only degrades expense recording.
    pub fn validate(&self) -> Result<()> {
        if self.line.channel_secret.is_empty() {
            anyhow::bail!("LINE channel secret is not set (LINE_CHANNEL_SECRET)");
        }
        if self.line.channel_access_token.is_empty() {
            anyhow::bail!("LINE channel access token is not set (LINE_CHANNEL_ACCESS_TOKEN)");
        }
        if !(self.rate.fallback.is_finite() && self.rate.fallback > 0.0) {
            anyhow::bail!("rate.fallback must be a positive number");
        }
        Ok(())
    }
}
