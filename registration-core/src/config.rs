//! Configuration for the registration ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Credential rendering configuration
    pub credential: CredentialConfig,

    /// Writer actor configuration
    pub writer: WriterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/registrations"),
            service_name: "registration-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            credential: CredentialConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// QR code rendering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Pixels per QR module
    pub module_size: u32,

    /// Draw the 4-module quiet zone around the code
    pub quiet_zone: bool,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            module_size: 10,
            quiet_zone: true,
        }
    }
}

/// Single-writer actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Bounded mailbox capacity (backpressure)
    pub mailbox_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("REGISTRATION_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(size) = std::env::var("REGISTRATION_QR_MODULE_SIZE") {
            config.credential.module_size = size.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid REGISTRATION_QR_MODULE_SIZE: {}", e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.credential.module_size == 0 {
            return Err(crate::Error::Config(
                "credential.module_size must be positive".to_string(),
            ));
        }
        if self.writer.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "writer.mailbox_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "registration-ledger");
        assert_eq!(config.credential.module_size, 10);
        assert!(config.credential.quiet_zone);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/var/lib/registrations"

            [credential]
            module_size = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/registrations"));
        assert_eq!(config.credential.module_size, 4);
        assert!(config.credential.quiet_zone);
        assert_eq!(config.writer.mailbox_capacity, 1000);
    }

    #[test]
    fn test_zero_module_size_rejected() {
        let mut config = Config::default();
        config.credential.module_size = 0;
        assert!(config.validate().is_err());
    }
}
