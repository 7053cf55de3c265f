//! Service configuration read once at startup.
//!
//! # Responsibility
//! - Resolve port, storage location, page size bound and logging options.
//! - Report the offending variable when a value cannot be used.
//!
//! # Invariants
//! - Parsing never touches global state; `from_env` is a thin wrapper over
//!   `from_lookup`.
//! - Blank values are treated as unset.

use crate::logging::{default_log_level, normalize_level, normalize_log_dir};
use crate::service::prescription_service::DEFAULT_MAX_PAGE_SIZE;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const PORT_VAR: &str = "PRESCRIPTION_PORT";
pub const PORT_FALLBACK_VAR: &str = "PORT";
pub const DATABASE_URL_VAR: &str = "PRESCRIPTION_DATABASE_URL";
pub const DATABASE_URL_FALLBACK_VAR: &str = "DATABASE_URL";
pub const MAX_PAGE_SIZE_VAR: &str = "PRESCRIPTION_MAX_PAGE_SIZE";
pub const LOG_LEVEL_VAR: &str = "PRESCRIPTION_LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "PRESCRIPTION_LOG_DIR";

pub const DEFAULT_PORT: u16 = 8005;
const DEFAULT_DB_FILE_NAME: &str = "prescriptions.sqlite3";
const SQLITE_URL_PREFIX: &str = "sqlite://";

/// Configuration error naming the variable that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid value `{value}` for {key}: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Effective service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    /// SQLite database file backing the store.
    pub database_path: PathBuf,
    pub max_page_size: u32,
    pub log_level: &'static str,
    /// File logging is disabled when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: std::env::temp_dir().join(DEFAULT_DB_FILE_NAME),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which returns a variable's raw
    /// value when set.
    ///
    /// # Errors
    /// - Returns `ConfigError::InvalidValue` for the first unusable variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &'static str| -> Option<(&'static str, String)> {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (key, value))
        };
        let mut config = Self::default();

        if let Some((key, value)) = read(PORT_VAR).or_else(|| read(PORT_FALLBACK_VAR)) {
            config.port = match value.parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => return Err(invalid(key, value, "expected a port in 1..=65535")),
            };
        }

        if let Some((key, value)) =
            read(DATABASE_URL_VAR).or_else(|| read(DATABASE_URL_FALLBACK_VAR))
        {
            config.database_path = parse_database_url(key, value)?;
        }

        if let Some((key, value)) = read(MAX_PAGE_SIZE_VAR) {
            config.max_page_size = match value.parse::<u32>() {
                Ok(size) if size > 0 => size,
                _ => return Err(invalid(key, value, "expected a positive integer")),
            };
        }

        if let Some((key, value)) = read(LOG_LEVEL_VAR) {
            config.log_level =
                normalize_level(&value).map_err(|reason| invalid(key, value.clone(), reason))?;
        }

        if let Some((key, value)) = read(LOG_DIR_VAR) {
            let dir =
                normalize_log_dir(&value).map_err(|reason| invalid(key, value.clone(), reason))?;
            config.log_dir = Some(dir);
        }

        Ok(config)
    }
}

fn parse_database_url(key: &'static str, value: String) -> Result<PathBuf, ConfigError> {
    let path = value
        .strip_prefix(SQLITE_URL_PREFIX)
        .unwrap_or(&value)
        .to_string();
    if let Some((scheme, _)) = path.split_once("://") {
        let reason = format!("unsupported storage scheme `{scheme}`; expected sqlite");
        return Err(invalid(key, value, reason));
    }
    if path.is_empty() || path == ":memory:" {
        return Err(invalid(key, value, "expected a database file path"));
    }
    Ok(PathBuf::from(path))
}

fn invalid(key: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value,
        reason: reason.into(),
    }
}
