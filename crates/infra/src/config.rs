//! Configuration loading and representation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

/// Log output style, independent of the observability crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStyle {
    #[default]
    Json,
    Pretty,
}

pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub log_style: LogStyle,
    pub admin_password: String,
    pub main_worker_threads: usize,
    pub worker_pause: Duration,
    pub static_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8069)),
            environment: Environment::Development,
            log_style: LogStyle::Json,
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            main_worker_threads: 4,
            worker_pause: Duration::from_millis(500),
            static_dir: None,
        }
    }
}

impl AppConfig {
    /// Read `BASIS_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("BASIS_BIND_ADDR") {
            config.bind_addr = v
                .parse()
                .map_err(|e| ConfigError::invalid("BASIS_BIND_ADDR", &v, format!("{e}")))?;
        }
        if let Some(v) = get("BASIS_ENV") {
            config.environment = match v.to_ascii_lowercase().as_str() {
                "development" | "dev" => Environment::Development,
                "production" | "prod" => Environment::Production,
                "test" => Environment::Test,
                _ => {
                    return Err(ConfigError::invalid(
                        "BASIS_ENV",
                        &v,
                        "expected development, production or test",
                    ));
                }
            };
        }
        if let Some(v) = get("BASIS_LOG_FORMAT") {
            config.log_style = match v.to_ascii_lowercase().as_str() {
                "json" => LogStyle::Json,
                "pretty" => LogStyle::Pretty,
                _ => return Err(ConfigError::invalid("BASIS_LOG_FORMAT", &v, "expected json or pretty")),
            };
        }
        match get("BASIS_ADMIN_PASSWORD") {
            Some(v) => config.admin_password = v,
            None if config.environment == Environment::Production => {
                return Err(ConfigError::invalid(
                    "BASIS_ADMIN_PASSWORD",
                    "",
                    "must be set in production",
                ));
            }
            None => {}
        }
        if let Some(v) = get("BASIS_MAIN_WORKER_THREADS") {
            config.main_worker_threads = match v.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::invalid(
                        "BASIS_MAIN_WORKER_THREADS",
                        &v,
                        "expected a positive integer",
                    ));
                }
            };
        }
        if let Some(v) = get("BASIS_WORKER_PAUSE_MS") {
            let ms = v.parse::<u64>().map_err(|e| {
                ConfigError::invalid("BASIS_WORKER_PAUSE_MS", &v, format!("{e}"))
            })?;
            config.worker_pause = Duration::from_millis(ms);
        }
        config.static_dir = get("BASIS_STATIC_DIR").map(PathBuf::from);
        Ok(config)
    }

    pub fn uses_default_password(&self) -> bool {
        self.admin_password == DEFAULT_ADMIN_PASSWORD
    }
}
