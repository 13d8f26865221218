//! Configuration management.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the `/mcp` endpoint manages handler instances.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// One long-lived handler per session, with a push channel.
    #[default]
    Stateful,
    /// A fresh handler for every POST; no sessions.
    Stateless,
}

/// Transport and endpoint settings (`[transport]` in TOML).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    /// Reject requests whose Host header is not in `allowed_hosts`.
    pub dns_rebinding_protection: bool,
    pub allowed_hosts: Vec<String>,
    /// Origins accepted while protection is on. Empty means Origin is not checked.
    pub allowed_origins: Vec<String>,
    /// Answer POSTs with plain JSON instead of a single SSE frame.
    pub json_response: bool,
    /// Keep-alive interval on idle push channels. Unset or 0 disables it.
    pub sse_keep_alive_secs: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Stateful,
            dns_rebinding_protection: false,
            allowed_hosts: vec!["127.0.0.1".to_string()],
            allowed_origins: Vec::new(),
            json_response: false,
            sse_keep_alive_secs: Some(15),
        }
    }
}

impl TransportConfig {
    pub fn keep_alive(&self) -> Option<Duration> {
        self.sse_keep_alive_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    transport: TransportConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

fn default_host() -> String {
    kube_mcp_types::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    kube_mcp_types::DEFAULT_PORT
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub mode: Option<TransportMode>,
    pub dns_rebinding_protection: bool,
    pub allowed_hosts: Vec<String>,
    pub json_response: bool,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// `/mcp` endpoint behaviour
    pub transport: TransportConfig,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, overrides RUST_LOG environment variable)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain:
    /// CLI args > prefixed env vars > legacy env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `config.toml` in user config directory (~/.config/kube-mcp/ on Linux)
    /// 2. `.kube-mcp.toml` in current directory
    pub fn from_figment(overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(".kube-mcp.toml"));
        let user_config = directories::ProjectDirs::from("", "", "kube-mcp")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        // 1. Start with defaults
        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile::default()));

        // 2. Merge user config file if it exists
        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // 3. Merge local config file if it exists
        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // 4. Merge the unprefixed variables earlier deployments relied on
        figment = merge_legacy_env(figment);

        // 5. Merge environment variables (KUBE_MCP_<SECTION>__<KEY>)
        figment = figment.merge(Env::prefixed("KUBE_MCP_").split("__"));

        // 6. Merge CLI arguments (highest priority)
        if let Some(ref host) = overrides.host {
            figment = figment.merge(Serialized::default("server.host", host));
        }
        if let Some(port) = overrides.port {
            figment = figment.merge(Serialized::default("server.port", port));
        }
        if let Some(mode) = overrides.mode {
            figment = figment.merge(Serialized::default("transport.mode", mode));
        }
        if overrides.dns_rebinding_protection {
            figment = figment.merge(Serialized::default(
                "transport.dns_rebinding_protection",
                true,
            ));
        }
        if !overrides.allowed_hosts.is_empty() {
            figment = figment.merge(Serialized::default(
                "transport.allowed_hosts",
                &overrides.allowed_hosts,
            ));
        }
        if overrides.json_response {
            figment = figment.merge(Serialized::default("transport.json_response", true));
        }
        if let Some(ref level) = overrides.log_level {
            figment = figment.merge(Serialized::default("logging.log_level", level));
        }
        if let Some(ref file) = overrides.log_file {
            figment = figment.merge(Serialized::default("logging.log_file", file));
        }

        let config_file: ConfigFile = figment.extract()?;

        Ok(Self {
            host: config_file.server.host,
            port: config_file.server.port,
            transport: config_file.transport,
            log_file: config_file.logging.log_file,
            log_level: config_file.logging.log_level,
        })
    }

    /// `host:port` string handed to the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        let file = ConfigFile::default();
        Self {
            host: file.server.host,
            port: file.server.port,
            transport: file.transport,
            log_file: None,
            log_level: None,
        }
    }
}

/// `HOST`, `PORT`, `DNS_REBINDING_PROTECTION` and `DNS_REBINDING_ALLOWED_HOST`.
///
/// Protection is only switched on by the exact value `true`; an allowed host
/// replaces the whole list. An unparsable `PORT` is ignored.
fn merge_legacy_env(mut figment: Figment) -> Figment {
    if let Ok(host) = std::env::var("HOST") {
        figment = figment.merge(Serialized::default("server.host", host));
    }
    if let Ok(port) = std::env::var("PORT") {
        // Logging is not up yet, so this one goes straight to stderr.
        match port.trim().parse::<u16>() {
            Ok(port) => figment = figment.merge(Serialized::default("server.port", port)),
            Err(_) => eprintln!("Invalid PORT environment variable {:?}, ignoring it.", port),
        }
    }
    if let Ok(flag) = std::env::var("DNS_REBINDING_PROTECTION") {
        figment = figment.merge(Serialized::default(
            "transport.dns_rebinding_protection",
            flag == "true",
        ));
    }
    if let Ok(host) = std::env::var("DNS_REBINDING_ALLOWED_HOST") {
        figment = figment.merge(Serialized::default(
            "transport.allowed_hosts",
            vec![host],
        ));
    }
    figment
}
