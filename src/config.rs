//! TOML configuration.
//!
//! ```toml
//! [db]
//! connection_string = "server=tcp:db.local,1433;database=EcoCircular;user=svc;password=...;TrustServerCertificate=true"
//! procedure = "dbo.sp_Extraccion_Subasta"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [logging]
//! filter = "info"
//! json = false
//! ```
//!
//! The connection string may instead come from the
//! `SUBASTAS_DB_CONNECTION_STRING` environment variable, which wins over the
//! file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

use crate::store::DEFAULT_PROCEDURE;

/// Environment variable overriding `db.connection_string`.
pub const CONNECTION_STRING_ENV: &str = "SUBASTAS_DB_CONNECTION_STRING";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default)]
    pub connection_string: String,
    #[serde(default = "default_procedure")]
    pub procedure: String,
}

fn default_procedure() -> String {
    DEFAULT_PROCEDURE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    "info,tiberius=warn".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Ok(conn) = std::env::var(CONNECTION_STRING_ENV) {
        if !conn.trim().is_empty() {
            config.db.connection_string = conn;
        }
    }

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.db.connection_string.trim().is_empty() {
        bail!(
            "db.connection_string must be set (or provide {})",
            CONNECTION_STRING_ENV
        );
    }

    if !is_valid_procedure_name(&config.db.procedure) {
        bail!(
            "db.procedure must be a plain (optionally schema-qualified) identifier, got '{}'",
            config.db.procedure
        );
    }

    config
        .server
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("server.bind is not a socket address: '{}'", config.server.bind))?;

    Ok(())
}

/// Letters, digits and underscores, in at most three dot-separated parts.
fn is_valid_procedure_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 3
        && parts.iter().all(|p| {
            !p.is_empty() && p.chars().all(|c| c.is_alphanumeric() || c == '_')
        })
}
