//! Executor and server settings read from the environment.

use std::collections::HashMap;
use std::time::Duration;

const MAX_CONCURRENT_UNITS: &str = "INGEST_MAX_CONCURRENT_UNITS";
const FETCH_TIMEOUT_SECS: &str = "INGEST_FETCH_TIMEOUT_SECS";
const MAX_UPLOAD_BYTES: &str = "INGEST_MAX_UPLOAD_BYTES";
const SERVER_ADDR: &str = "INGEST_SERVER_ADDR";

pub const DEFAULT_MAX_CONCURRENT_UNITS: usize = 4;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8080";

fn collect_envs(keys: &[&str]) -> HashMap<String, String> {
    let mut envs = HashMap::new();
    for key in keys {
        if let Ok(value) = std::env::var(key) {
            envs.insert(key.to_string(), value);
        }
    }
    envs
}

fn parse_positive<T>(envs: &HashMap<String, String>, key: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr + PartialOrd + Default + Copy,
{
    let Some(raw) = envs.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(format!("invalid {}='{}'. expected a positive integer", key, raw)),
    }
}

/// Limits applied by the upload executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Units allowed to run at once across all batches.
    pub max_concurrent_units: usize,
    pub fetch_timeout: Duration,
    /// Largest remote payload accepted per part.
    pub max_upload_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_units: DEFAULT_MAX_CONCURRENT_UNITS,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ExecutorConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_env_map(&collect_envs(&[
            MAX_CONCURRENT_UNITS,
            FETCH_TIMEOUT_SECS,
            MAX_UPLOAD_BYTES,
        ]))
    }

    fn from_env_map(envs: &HashMap<String, String>) -> Result<Self, String> {
        Ok(Self {
            max_concurrent_units: parse_positive(
                envs,
                MAX_CONCURRENT_UNITS,
                DEFAULT_MAX_CONCURRENT_UNITS,
            )?,
            fetch_timeout: Duration::from_secs(parse_positive(
                envs,
                FETCH_TIMEOUT_SECS,
                DEFAULT_FETCH_TIMEOUT_SECS,
            )?),
            max_upload_bytes: parse_positive(envs, MAX_UPLOAD_BYTES, DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }

    pub fn with_max_concurrent_units(mut self, max_concurrent_units: usize) -> Self {
        self.max_concurrent_units = max_concurrent_units.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// Listen address of the upload server binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_SERVER_ADDR.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_env_map(&collect_envs(&[SERVER_ADDR]))
    }

    fn from_env_map(envs: &HashMap<String, String>) -> Result<Self, String> {
        let addr = envs
            .get(SERVER_ADDR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());
        if !addr.contains(':') {
            return Err(format!(
                "invalid {}='{}'. expected host:port",
                SERVER_ADDR, addr
            ));
        }
        Ok(Self { addr })
    }
}
