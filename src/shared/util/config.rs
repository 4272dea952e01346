//! Loads config from config.toml

use serde_derive::Deserialize;
use cached::proc_macro::cached;
use std::fs;
use std::path::Path;
use std::process::exit;
use std::time::Duration;
use thiserror::Error;
use toml;
use sqlx::postgres::{PgPoolOptions, PgPool};

/// Environment variable overriding `sync.remote`, read once at startup
pub const REMOTE_MODE_ENV: &str = "JOB_SYNC_REMOTE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read {0}: {1}")]
    Read(String, std::io::Error),
    #[error("Unable to load data from config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unknown remote mode `{0}`, expected none, simulated or http")]
    RemoteMode(String)
}

#[derive(Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig
}

#[derive(Deserialize, Clone)]
pub struct DatabaseConfig {
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String
}

#[derive(Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub log: bool
}

impl ServerConfig {
    /// Debug logging for either binary when `log` is set. Returns whether a logger is active.
    pub fn init_logging(&self) -> bool {
        if !self.log { return false; }
        if std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var("RUST_LOG", "debug");
        }
        // Already installed is fine
        let _ = env_logger::try_init();
        true
    }
}

/// Where the HTTP server keeps jobs
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres
}

#[derive(Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend
}

/// Which remote a job service mirrors its store to. Chosen once at startup.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteMode {
    None,
    #[default]
    Simulated,
    Http
}

impl std::str::FromStr for RemoteMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(RemoteMode::None),
            "simulated" => Ok(RemoteMode::Simulated),
            "http" => Ok(RemoteMode::Http),
            other => Err(ConfigError::RemoteMode(other.to_string()))
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SyncConfig {
    pub remote: RemoteMode,
    pub remote_url: String,
    /// Directory backing the per-profile durable store, in-memory when unset
    pub store_dir: Option<String>,
    /// Directory backing the simulated central database
    pub simulated_dir: Option<String>,
    pub broadcast_topic: String,
    pub storage_fallback: bool,
    pub fallback_clear_ms: u64,
    pub poll_interval_ms: u64,
    /// Defaults to 2000 for the simulated remote and 3000 for http
    pub remote_poll_interval_ms: Option<u64>,
    pub second_wave_delay_ms: u64,
    pub simulated_latency_ms: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_ms: u64
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            remote: RemoteMode::Simulated,
            remote_url: "http://localhost:8080".to_string(),
            store_dir: None,
            simulated_dir: None,
            broadcast_topic: "locksmith-job-sync".to_string(),
            storage_fallback: true,
            fallback_clear_ms: 100,
            poll_interval_ms: 1000,
            remote_poll_interval_ms: None,
            second_wave_delay_ms: 200,
            simulated_latency_ms: 0,
            retry_attempts: 3,
            retry_base_delay_ms: 250,
            request_timeout_ms: 10_000
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn remote_poll_interval(&self) -> Duration {
        Duration::from_millis(self.remote_poll_interval_ms.unwrap_or(match self.remote {
            RemoteMode::Http => 3000,
            _ => 2000
        }))
    }

    pub fn second_wave_delay(&self) -> Duration {
        Duration::from_millis(self.second_wave_delay_ms)
    }

    pub fn fallback_clear_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_clear_ms)
    }

    /// `JOB_SYNC_REMOTE` (from the environment or `.env`) wins over the file
    pub fn with_env_override(mut self) -> Result<SyncConfig, ConfigError> {
        dotenv::dotenv().ok();
        if let Ok(mode) = std::env::var(REMOTE_MODE_ENV) {
            self.remote = mode.parse()?;
        }
        Ok(self)
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
    let mut data: Config = toml::from_str(&contents)?;
    data.sync = data.sync.with_env_override()?;
    Ok(data)
}

pub async fn get_pool() -> Result<PgPool, sqlx::Error> {
    let config = get_config();
    PgPoolOptions::new()
        .max_connections(5)
        .connect(format!("postgres://{}:{}@{}:{}/{}", // user:password / ip/db
            config.database.user,
            config.database.password,
            config.database.ip,
            config.database.port,
            config.database.name
        ).as_str())
        .await
}

#[cached]
pub fn get_config() -> Config {
    match load_config(Path::new("config.toml")) {
        Ok(c) => c,
        Err(ConfigError::Read(..)) => {
            eprintln!("Could not find config.toml, please create or ensure it's accessible");
            exit(1);
        },
        Err(err) => {
            eprintln!("{err}");
            exit(1);
        }
    }
}
