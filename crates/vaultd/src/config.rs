//! Daemon configuration.
//!
//! Configuration comes from a YAML file (`vaultd.yml`) with environment
//! variable overrides for the values that should not live on disk. Unknown
//! fields in the file are rejected so typos fail loudly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable holding the HTTP API password.
pub const API_PASSWORD_ENV: &str = "VAULTD_API_PASSWORD";
/// Environment variable overriding the config file path.
pub const CONFIG_FILE_ENV: &str = "VAULTD_CONFIG_FILE";
/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "VAULTD_DATA_DIR";
/// Environment variable holding the vault secret for auto-unlock.
pub const SECRET_ENV: &str = "VAULTD_SECRET";

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The config file could not be decoded.
    #[error("failed to decode config file: {0}")]
    Decode(#[from] serde_yaml::Error),
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Http {
    /// The listen address.
    pub address: String,
    /// The basic-auth password; required at startup.
    pub password: String,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            address: "localhost:9980".to_string(),
            password: String::new(),
        }
    }
}

/// Explorer configuration for fetching the chain tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Explorer {
    /// Explicit explorer base URL; overrides the network preset.
    pub url: String,
    /// Network preset: `mainnet` or `zen`.
    pub network: String,
}

impl Default for Explorer {
    fn default() -> Self {
        Self {
            url: String::new(),
            network: "mainnet".to_string(),
        }
    }
}

/// Stdout log output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StdOut {
    /// Whether stdout logging is enabled.
    pub enabled: bool,
    /// Minimum level: `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `human` or `json`.
    pub format: String,
    /// Whether to colorize human output.
    #[serde(rename = "enableANSI")]
    pub enable_ansi: bool,
}

impl Default for StdOut {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: "human".to_string(),
            enable_ansi: !cfg!(windows),
        }
    }
}

/// Log file output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LogFile {
    /// Whether file logging is enabled.
    pub enabled: bool,
    /// Minimum level: `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `human` or `json`.
    pub format: String,
    /// The log file path; defaults to `vaultd.log` in the data directory.
    pub path: String,
}

impl Default for LogFile {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: "json".to_string(),
            path: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
    /// Stdout output.
    pub stdout: StdOut,
    /// File output.
    pub file: LogFile,
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The vault secret; if set, an unlock is attempted at startup.
    pub secret: String,
    /// The data directory holding the database and log file.
    pub directory: String,
    /// HTTP server settings.
    pub http: Http,
    /// Explorer settings.
    pub explorer: Explorer,
    /// Logging settings.
    pub log: Log,
}

impl Config {
    /// Loads the config file at `path` into `self`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or decoded.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let buf = std::fs::read(path)?;
        *self = serde_yaml::from_slice(&buf)?;
        Ok(())
    }

    /// Applies environment variable overrides on top of file values.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(SECRET_ENV) {
            self.secret = secret;
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            self.directory = dir;
        }
        if let Ok(password) = std::env::var(API_PASSWORD_ENV) {
            self.http.password = password;
        }
    }
}

/// The config file locations tried in order: an explicit override, the
/// working directory, the data directory, then the platform defaults.
#[must_use]
pub fn try_config_paths() -> Vec<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return vec![PathBuf::from(path)];
    }

    let mut paths = vec![PathBuf::from("vaultd.yml")];
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        paths.push(Path::new(&dir).join("vaultd.yml"));
    }
    if cfg!(target_os = "windows") {
        if let Ok(appdata) = std::env::var("APPDATA") {
            paths.push(Path::new(&appdata).join("vaultd").join("vaultd.yml"));
        }
    } else if cfg!(target_os = "macos") {
        if let Ok(home) = std::env::var("HOME") {
            paths.push(
                Path::new(&home)
                    .join("Library")
                    .join("Application Support")
                    .join("vaultd")
                    .join("vaultd.yml"),
            );
        }
    } else {
        paths.push(PathBuf::from("/etc/vaultd/vaultd.yml"));
        paths.push(PathBuf::from("/var/lib/vaultd/vaultd.yml"));
    }
    paths
}

/// Resolves the data directory: the configured path if set, the working
/// directory if it already holds a database, otherwise the platform
/// default.
#[must_use]
pub fn default_data_directory(configured: &str) -> PathBuf {
    if !configured.is_empty() {
        return PathBuf::from(configured);
    }
    if Path::new("vaultd.sqlite3").exists() {
        return PathBuf::from(".");
    }
    if cfg!(target_os = "windows") {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Path::new(&appdata).join("vaultd");
        }
    } else if cfg!(target_os = "macos") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home)
                .join("Library")
                .join("Application Support")
                .join("vaultd");
        }
    } else {
        return PathBuf::from("/var/lib/vaultd");
    }
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.http.address, "localhost:9980");
        assert_eq!(cfg.explorer.network, "mainnet");
        assert!(cfg.log.stdout.enabled);
        assert_eq!(cfg.log.file.format, "json");
    }

    #[test]
    fn test_load_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vaultd.yml");
        std::fs::write(
            &path,
            "secret: hunter2\ndirectory: /tmp/vaultd\nhttp:\n  address: 127.0.0.1:9880\n  password: pw\nlog:\n  stdout:\n    enableANSI: false\n",
        )
        .expect("write");

        let mut cfg = Config::default();
        cfg.load_file(&path).expect("load");
        assert_eq!(cfg.secret, "hunter2");
        assert_eq!(cfg.http.address, "127.0.0.1:9880");
        assert!(!cfg.log.stdout.enable_ansi);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vaultd.yml");
        std::fs::write(&path, "sekrit: oops\n").expect("write");

        let mut cfg = Config::default();
        assert!(matches!(
            cfg.load_file(&path),
            Err(ConfigError::Decode(_))
        ));
    }

    #[test]
    fn test_default_data_directory_prefers_configured() {
        assert_eq!(
            default_data_directory("/data/vaultd"),
            PathBuf::from("/data/vaultd")
        );
    }
}
