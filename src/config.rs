use std::net::SocketAddr;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "tillbook", about = "Tillbook - ledger posting service for agency banking tills")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "tillbook.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Storage backend: memory, sqlite or postgres (overrides config file)
    #[arg(short, long)]
    pub backend: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Path to a chart-of-accounts TOML file. Falls back to the builtin
    /// chart when unset.
    #[serde(default)]
    pub chart: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    /// SQLite database path.
    #[serde(default = "default_sqlite_path")]
    pub path: String,

    /// Postgres connection string.
    #[serde(default)]
    pub connection_string: Option<String>,
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_sqlite_path() -> String {
    "tillbook.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: default_backend(),
            path: default_sqlite_path(),
            connection_string: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            storage: StorageConfig::default(),
            chart: None,
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref backend) = cli.backend {
            config.storage.backend = backend.clone();
        }

        config
    }

    pub fn listen_addr(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.backend, "memory");
        assert!(config.chart.is_none());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            backend = "sqlite"
            path = "/var/lib/tillbook/ledger.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.storage.path, "/var/lib/tillbook/ledger.db");
        assert_eq!(config.logging.level, "info");
    }
}
