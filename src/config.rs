//! Configuration management
//!
//! Configuration is read from an optional TOML file and then overridden by
//! the environment variables a container deployment sets (`UNIFI_URL`,
//! `PORT`, ...). The resulting [`Config`] is built once at startup and
//! handed to constructors; nothing below `main` reads the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Listener and page settings
    #[serde(default)]
    pub server: ServerConfig,

    /// UniFi controller connection
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Pending-login cache maintenance
    #[serde(default)]
    pub cache: CacheConfig,

    /// Audit database settings
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to serve the portal on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding index.html, success.html and static assets
    #[serde(default = "default_frontend_dir")]
    pub frontend_dir: PathBuf,

    /// Substituted for `%VITE_PAGE_TITLE%` in rendered pages
    #[serde(default = "default_page_title")]
    pub page_title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            frontend_dir: default_frontend_dir(),
            page_title: default_page_title(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct ControllerConfig {
    /// Base URL of the controller, e.g. `https://192.168.1.1`
    #[serde(default)]
    pub url: String,

    /// Site the guests are authorized on
    #[serde(default = "default_site")]
    pub site: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Guest access granted per authorization, in minutes
    #[serde(default = "default_duration")]
    pub duration: u32,

    /// Skip certificate validation (self-signed controllers on a trusted LAN)
    #[serde(default)]
    pub disable_tls: bool,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            site: default_site(),
            username: String::new(),
            password: String::new(),
            duration: default_duration(),
            disable_tls: false,
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("url", &self.url)
            .field("site", &self.site)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("duration", &self.duration)
            .field("disable_tls", &self.disable_tls)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Seconds between expiry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,

    /// Seconds a pending login stays resolvable
    #[serde(default = "default_max_age")]
    pub max_age: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
            max_age: default_max_age(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    /// Directory the SQLite database lives in
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_frontend_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_page_title() -> String {
    "Unifi Guest Portal".to_string()
}

fn default_site() -> String {
    "default".to_string()
}

fn default_duration() -> u32 {
    60
}

fn default_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_max_age() -> u64 {
    3600
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration: `.env`, then the TOML file (explicit path or the
    /// first one found), then environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        report_dotenv(dotenvy::dotenv());

        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::search_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn search_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("config.toml"),
            PathBuf::from("/etc/guest-portal/config.toml"),
            dirs::home_dir()
                .map(|h| h.join(".config/guest-portal/config.toml"))
                .unwrap_or_default(),
        ]
    }

    fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Apply the container-style environment variables on top of file values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("UNIFI_USERNAME") {
            self.controller.username = v;
        }
        if let Some(v) = get("UNIFI_PASSWORD") {
            self.controller.password = v;
        }
        if let Some(v) = get("UNIFI_URL") {
            self.controller.url = v;
        }
        if let Some(v) = get("UNIFI_SITE") {
            self.controller.site = v;
        }
        if let Some(v) = get("UNIFI_DURATION") {
            self.controller.duration = v
                .trim()
                .parse()
                .with_context(|| format!("UNIFI_DURATION is not a number of minutes: '{}'", v))?;
        }
        if let Some(v) = get("DISABLE_TLS") {
            // Anything unparseable keeps verification on.
            self.controller.disable_tls = parse_bool(&v).unwrap_or(false);
        }
        if let Some(v) = get("PORT") {
            self.server.port = v
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port: '{}'", v))?;
        }
        if let Some(v) = get("DB_PATH") {
            self.audit.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("VITE_PAGE_TITLE") {
            self.server.page_title = v;
        }
        if get("DEBUG_MODE").and_then(|v| parse_bool(&v)).unwrap_or(false) {
            self.server.frontend_dir = PathBuf::from("dist");
        }

        Ok(())
    }

    /// Reject configurations the portal cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.controller.url.trim().is_empty() {
            bail!("Controller URL is not configured (controller.url / UNIFI_URL)");
        }
        if self.controller.site.trim().is_empty() {
            bail!("Controller site is empty (controller.site / UNIFI_SITE)");
        }
        if self.controller.duration == 0 {
            bail!("Guest duration must be at least one minute");
        }
        if self.cache.sweep_interval == 0 {
            bail!("cache.sweep_interval must be greater than zero");
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" => Some(true),
        "0" | "f" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn report_dotenv(result: dotenvy::Result<PathBuf>) {
    match result {
        Ok(path) => tracing::info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {
            tracing::info!("No .env file found, using the process environment")
        }
        Err(e) => tracing::warn!("Ignoring .env file: {}", e),
    }
}
