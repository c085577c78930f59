//! Configuration management for mongoferry
//!
//! Process-lifetime settings for the copy-and-transfer engine:
//! database timeouts, fallback batch size, verification sampling,
//! SSH/SCP and FTP transport options and backup staging. Values are
//! read once at startup and treated as read-only constants for the
//! rest of the process; nothing here is caller-mutable at run time.
//!
//! # Examples
//!
//! ```rust
//! use mongoferry_config::{Config, ConfigBuilder};
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_env_prefix("MONGOFERRY")
//!     .build()
//!     .expect("failed to load configuration");
//!
//! assert_eq!(config.copy.batch_size, 1000);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for mongoferry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database connection configuration
    pub mongo: MongoConfig,
    /// Fallback copier configuration
    pub copy: CopyConfig,
    /// Integrity verification configuration
    pub verify: VerifyConfig,
    /// SSH/SCP storage transport configuration
    pub ssh: SshConfig,
    /// FTP storage transport configuration
    pub ftp: FtpConfig,
    /// Native tool configuration
    pub tools: ToolsConfig,
    /// Backup and staging configuration
    pub backup: BackupConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    /// Server selection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
        }
    }
}

impl MongoConfig {
    /// Server selection timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Fallback copier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Documents per insert batch
    pub batch_size: u32,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self { batch_size: 1_000 }
    }
}

/// Integrity verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Random sample size for document comparison
    pub sample_size: u32,
    /// Collections below this document count get a full aggregate
    /// checksum instead of relying on sampling alone
    pub checksum_threshold: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            sample_size: 100,
            checksum_threshold: 10_000,
        }
    }
}

/// SSH/SCP storage transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Connection timeout in seconds (`-o ConnectTimeout`)
    pub connect_timeout_secs: u64,
    /// Keep-alive interval in seconds (`-o ServerAliveInterval`)
    pub keepalive_interval_secs: u64,
    /// Keep-alive max count (`-o ServerAliveCountMax`)
    pub keepalive_max_count: u32,
    /// SCP transfer timeout in seconds
    pub transfer_timeout_secs: u64,
    /// Identity file passed with `-i`, when set
    pub key_file: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            keepalive_interval_secs: 5,
            keepalive_max_count: 3,
            transfer_timeout_secs: 300,
            key_file: None,
        }
    }
}

impl SshConfig {
    /// SCP transfer timeout as a [`Duration`]
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

/// FTP storage transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    /// Default control port when the storage URI does not name one
    pub default_port: u16,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self { default_port: 21 }
    }
}

/// Native tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Timeout for the availability probe in seconds
    pub probe_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 5,
        }
    }
}

impl ToolsConfig {
    /// Probe timeout as a [`Duration`]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Backup and staging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory for automatic safety backups when no storage target
    /// is configured explicitly
    pub safety_dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            safety_dir: std::env::temp_dir().join("mongoferry-backups"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = Config::default();
        assert_eq!(config.mongo.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.copy.batch_size, 1_000);
        assert_eq!(config.verify.sample_size, 100);
        assert_eq!(config.verify.checksum_threshold, 10_000);
        assert_eq!(config.ssh.connect_timeout_secs, 10);
        assert_eq!(config.ssh.keepalive_interval_secs, 5);
        assert_eq!(config.ssh.keepalive_max_count, 3);
        assert_eq!(config.ssh.transfer_timeout(), Duration::from_secs(300));
        assert_eq!(config.ftp.default_port, 21);
        assert_eq!(config.tools.probe_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let parsed: Config = toml::from_str("[copy]\nbatch_size = 250\n").unwrap();
        assert_eq!(parsed.copy.batch_size, 250);
        assert_eq!(parsed.verify.sample_size, 100);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let rendered = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.copy.batch_size, config.copy.batch_size);
        assert_eq!(parsed.ssh.transfer_timeout_secs, config.ssh.transfer_timeout_secs);
    }
}
