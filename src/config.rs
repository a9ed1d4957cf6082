//! Runtime configuration.
//!
//! Built from defaults, then environment variables, then CLI flags (applied
//! by the `cli` module).
//!
//! # Environment Variables
//!
//! - `AVATAR_PORT` / `PORT`: HTTP port (default: 3001)
//! - `AVATAR_HOST`: Bind address (default: 127.0.0.1)
//! - `AVATAR_CATALOG`: Expression catalog file (default: expressions.json)
//! - `AVATAR_STATIC_DIR`: Directory served for unmatched paths
//! - `AVATAR_PID_FILE`: Pid file for detached servers
//! - `AVATAR_LOG_FILE`: Append logs to this file
//! - `AVATAR_POLL_INTERVAL_MS`: Display client poll interval (default: 1000)

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AvatarError;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_CATALOG: &str = "expressions.json";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub catalog_path: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub pid_file: PathBuf,
    pub log_file: Option<PathBuf>,
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            catalog_path: PathBuf::from(DEFAULT_CATALOG),
            static_dir: None,
            pid_file: default_pid_path(),
            log_file: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// `<tmp>/avatar-overlay.pid`
pub fn default_pid_path() -> PathBuf {
    std::env::temp_dir().join("avatar-overlay.pid")
}

impl Config {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, AvatarError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AvatarError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get("AVATAR_PORT").or_else(|| get("PORT")) {
            config.port = parse_port(&raw)?;
        }
        if let Some(host) = get("AVATAR_HOST") {
            config.host = host;
        }
        if let Some(path) = get("AVATAR_CATALOG") {
            config.catalog_path = PathBuf::from(path);
        }
        config.static_dir = get("AVATAR_STATIC_DIR").map(PathBuf::from);
        if let Some(path) = get("AVATAR_PID_FILE") {
            config.pid_file = PathBuf::from(path);
        }
        config.log_file = get("AVATAR_LOG_FILE").map(PathBuf::from);
        if let Some(raw) = get("AVATAR_POLL_INTERVAL_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                AvatarError::InvalidArgument(format!(
                    "AVATAR_POLL_INTERVAL_MS must be a whole number of milliseconds, got '{}'",
                    raw
                ))
            })?;
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        Ok(config)
    }

    /// `host:port` for binding the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL a local client uses to reach this server.
    pub fn base_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" => "127.0.0.1",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }
}

fn parse_port(raw: &str) -> Result<u16, AvatarError> {
    raw.trim()
        .parse()
        .map_err(|_| AvatarError::InvalidArgument(format!("invalid port '{}'", raw)))
}
