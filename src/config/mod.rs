//! Configuration Module
//!
//! The host reads a small, enumerated set of environment keys. Paths the
//! loader derives from them (per-plugin data directory, database file) are
//! computed here so every component agrees on the layout.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// HTTP listen port.
pub const ENV_PORT: &str = "HEARTH_PORT";
/// Root of per-plugin data directories.
pub const ENV_DATA_DIR: &str = "HEARTH_DATA_DIR";
/// Directory scanned for plugins at startup.
pub const ENV_PLUGIN_DIR: &str = "HEARTH_PLUGIN_DIR";
/// Directory of the static web front-end.
pub const ENV_WEB_DIR: &str = "HEARTH_WEB_DIR";
/// Per-call RPC deadline, in seconds.
pub const ENV_CALL_TIMEOUT_SECS: &str = "HEARTH_CALL_TIMEOUT_SECS";

/// Error type for configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An environment value could not be parsed
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Host configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// Root data directory; plugin databases live under `plugins/{id}/`.
    pub data_dir: PathBuf,
    /// Directory containing one subdirectory per plugin.
    pub plugin_dir: PathBuf,
    /// Static front-end directory.
    pub web_dir: PathBuf,
    /// Deadline applied to each plugin RPC call.
    pub call_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8420,
            data_dir: PathBuf::from("./data"),
            plugin_dir: PathBuf::from("./plugins"),
            web_dir: PathBuf::from("./web"),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Build a configuration from the environment, falling back to
    /// defaults for unset keys. Set-but-unparsable values are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match env::var(ENV_PORT) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_PORT,
                value,
            })?,
            Err(_) => defaults.port,
        };

        let call_timeout = match env::var(ENV_CALL_TIMEOUT_SECS) {
            Ok(value) => {
                let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_CALL_TIMEOUT_SECS,
                    value,
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => defaults.call_timeout,
        };

        Ok(Self {
            port,
            data_dir: env::var(ENV_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            plugin_dir: env::var(ENV_PLUGIN_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.plugin_dir),
            web_dir: env::var(ENV_WEB_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.web_dir),
            call_timeout,
        })
    }

    /// Address the HTTP server binds.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Data directory reserved for one plugin.
    pub fn plugin_data_dir(&self, id: &str) -> PathBuf {
        self.data_dir.join("plugins").join(id)
    }

    /// Database file handed to a plugin's `Migrate` hook. The host never
    /// opens this file.
    pub fn plugin_db_path(&self, id: &str) -> PathBuf {
        self.plugin_data_dir(id).join("db.sqlite")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 8420);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_derived_paths() {
        let config = Config {
            data_dir: PathBuf::from("/srv/hearth"),
            ..Config::default()
        };

        assert_eq!(
            config.plugin_db_path("notes"),
            PathBuf::from("/srv/hearth/plugins/notes/db.sqlite")
        );
    }
}
