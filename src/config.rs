use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::db::DEFAULT_BUSY_TIMEOUT;

/// Application-level constants
pub const APP_NAME: &str = "HeartShield";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_ORACLE_URL: &str = "http://localhost:5000/predict";
const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STORE_TIMEOUT_MS: u64 = DEFAULT_BUSY_TIMEOUT.as_millis() as u64;
const DEFAULT_MAIL_FROM: &str = "no-reply@heartshield.local";
const DEFAULT_MAIL_QUEUE_CAPACITY: usize = 64;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "heartshield=info,tower_http=info"
}

/// Get the application data directory
/// ~/HeartShield/ when a home directory exists, ./HeartShield otherwise.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub listen_addr: SocketAddr,
    pub oracle_url: String,
    /// Deadline for a single RiskOracle call.
    pub oracle_timeout: Duration,
    /// SQLite busy timeout for every store call.
    pub store_timeout: Duration,
    /// `None` selects the log-only mail transport.
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
    pub mail_queue_capacity: usize,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = get("HEARTSHIELD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(app_data_dir);
        let db_path = get("HEARTSHIELD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("heartshield.db"));
        let uploads_dir = get("HEARTSHIELD_UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("uploads"));

        let listen_raw = get("HEARTSHIELD_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.into());
        let listen_addr = listen_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "HEARTSHIELD_LISTEN_ADDR",
                value: listen_raw.clone(),
            })?;

        Ok(Self {
            oracle_url: get("RISK_ORACLE_URL").unwrap_or_else(|| DEFAULT_ORACLE_URL.into()),
            oracle_timeout: Duration::from_secs(parse_number(
                &get,
                "RISK_ORACLE_TIMEOUT_SECS",
                DEFAULT_ORACLE_TIMEOUT_SECS,
            )?),
            store_timeout: Duration::from_millis(parse_number(
                &get,
                "STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            )?),
            mail_relay_url: get("MAIL_RELAY_URL"),
            mail_from: get("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.into()),
            mail_queue_capacity: parse_number(
                &get,
                "MAIL_QUEUE_CAPACITY",
                DEFAULT_MAIL_QUEUE_CAPACITY,
            )?,
            max_upload_bytes: parse_number(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            data_dir,
            db_path,
            uploads_dir,
            listen_addr,
        })
    }

    /// Defaults rooted at `data_dir`. Used by tests and embedders.
    pub fn with_data_dir(data_dir: PathBuf) -> Result<Self, ConfigError> {
        let dir = data_dir.to_string_lossy().into_owned();
        Self::from_lookup(move |key| match key {
            "HEARTSHIELD_DATA_DIR" => Some(dir.clone()),
            _ => None,
        })
    }
}

fn parse_number<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) if v > T::default() => Ok(v),
            _ => Err(ConfigError::InvalidValue { key, value: raw }),
        },
    }
}
