//! Runtime configuration from `THEORIO_*` environment variables.

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const APP_DIR: &str = "theorio-api";
const SECS_PER_DAY: u64 = 24 * 3600;
/// Upper bound on the access log retention: 100 years.
const MAX_RETENTION_SECS: u64 = 100 * 365 * SECS_PER_DAY;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which [`DocumentStore`](crate::store::DocumentStore) backend to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreKind::Sqlite),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!("expected 'sqlite' or 'memory', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub store: StoreKind,
    /// Requests per window per (client IP, API key).
    pub rate_limit: u64,
    pub rate_window: Duration,
    /// Maximum request body size in bytes.
    pub body_limit: usize,
    pub access_log_retention: Duration,
    /// Generate a default key on an empty in-memory registry.
    pub bootstrap_key: bool,
    /// Take the client address from the right-most `x-forwarded-for` hop
    /// instead of the socket peer. Only safe behind a proxy that appends it.
    pub trust_proxy: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: default_data_dir(),
            store: StoreKind::Sqlite,
            rate_limit: 100,
            rate_window: Duration::from_secs(60),
            body_limit: 1024 * 1024,
            access_log_retention: Duration::from_secs(30 * 24 * 3600),
            bootstrap_key: false,
            trust_proxy: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset variables keep their
    /// defaults; set but unparsable ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let window_secs: u64 = load(&lookup, "THEORIO_RATE_WINDOW_SECS", 60)?;
        let retention_days: u64 = load(&lookup, "THEORIO_ACCESS_LOG_RETENTION_DAYS", 30)?;
        let access_log_retention = retention_days
            .checked_mul(SECS_PER_DAY)
            .filter(|secs| *secs <= MAX_RETENTION_SECS)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                invalid(
                    "THEORIO_ACCESS_LOG_RETENTION_DAYS",
                    &retention_days.to_string(),
                    "retention period too large",
                )
            })?;

        let config = Config {
            bind: load(&lookup, "THEORIO_BIND", defaults.bind)?,
            data_dir: lookup("THEORIO_DATA_DIR")
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            store: load(&lookup, "THEORIO_STORE", defaults.store)?,
            rate_limit: load(&lookup, "THEORIO_RATE_LIMIT", defaults.rate_limit)?,
            rate_window: Duration::from_secs(window_secs),
            body_limit: load(&lookup, "THEORIO_BODY_LIMIT", defaults.body_limit)?,
            access_log_retention,
            bootstrap_key: load(&lookup, "THEORIO_BOOTSTRAP_KEY", defaults.bootstrap_key)?,
            trust_proxy: load(&lookup, "THEORIO_TRUST_PROXY", defaults.trust_proxy)?,
        };

        if config.rate_limit == 0 {
            return Err(invalid("THEORIO_RATE_LIMIT", "0", "must be at least 1"));
        }
        if window_secs == 0 {
            return Err(invalid("THEORIO_RATE_WINDOW_SECS", "0", "must be at least 1"));
        }
        Ok(config)
    }
}

fn invalid(var: &'static str, value: &str, reason: impl Display) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn load<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e| invalid(var, &raw, e))
        }
        _ => Ok(default),
    }
}
