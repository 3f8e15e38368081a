//! Daemon configuration: interface list, thresholds, and tunables.
//!
//! Loaded once at startup from a TOML file. Malformed configuration is
//! fatal before anything is running; problems with an individual
//! interface discovered later (missing on the host, privilege error)
//! only degrade that interface.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ifcast_core::{InterfaceConfig, InterfaceId};
use serde::Deserialize;
use thiserror::Error;

/// Default WebSocket listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8766";

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ifcast.toml";

/// Daemon configuration as loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Address the WebSocket server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Sampling tool invoked per interface. Configurable so tests and
    /// unusual installs can substitute a path.
    #[serde(default = "default_sampler_command")]
    pub sampler_command: String,

    /// How many connections each sample keeps, sorted by rate.
    #[serde(default = "default_top_connections")]
    pub top_connections: usize,

    /// Per-client outbound queue depth; the oldest update is dropped
    /// when a slow client lets its queue fill.
    #[serde(default = "default_client_queue_depth")]
    pub client_queue_depth: usize,

    /// Maximum concurrently connected clients.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// First restart delay after a sampler crash, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub restart_backoff_base_ms: u64,

    /// Upper bound on the restart delay, in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub restart_backoff_cap_ms: u64,

    /// Consecutive sampler failures before an interface is marked
    /// permanently failed and retries stop.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Optional ethers-format file (`MAC name` pairs) for host naming.
    #[serde(default)]
    pub ethers_file: Option<PathBuf>,

    /// Optional command whose output lists DHCP leases (`MAC IP name`).
    #[serde(default)]
    pub lease_command: Option<String>,

    /// Monitored interfaces with their display-threshold capacities.
    pub interfaces: Vec<InterfaceConfig>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8766))
}

fn default_sampler_command() -> String {
    "iftop".to_string()
}

fn default_top_connections() -> usize {
    10
}

fn default_client_queue_depth() -> usize {
    16
}

fn default_max_clients() -> usize {
    64
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_max_consecutive_failures() -> u32 {
    5
}

impl DaemonConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: DaemonConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Builds a config with defaults and the given interfaces.
    ///
    /// Used by tests and embedding callers; the result still passes
    /// through `validate`.
    pub fn with_interfaces(interfaces: Vec<InterfaceConfig>) -> Result<Self, ConfigError> {
        let config = Self {
            listen_addr: default_listen_addr(),
            sampler_command: default_sampler_command(),
            top_connections: default_top_connections(),
            client_queue_depth: default_client_queue_depth(),
            max_clients: default_max_clients(),
            restart_backoff_base_ms: default_backoff_base_ms(),
            restart_backoff_cap_ms: default_backoff_cap_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            ethers_file: None,
            lease_command: None,
            interfaces,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints the TOML layer cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interfaces.is_empty() {
            return Err(ConfigError::NoInterfaces);
        }

        let mut seen: Vec<&InterfaceId> = Vec::with_capacity(self.interfaces.len());
        for iface in &self.interfaces {
            if seen.contains(&&iface.id) {
                return Err(ConfigError::DuplicateInterface {
                    id: iface.id.clone(),
                });
            }
            seen.push(&iface.id);

            // Re-run the domain validation: TOML deserialization
            // bypasses InterfaceConfig::new.
            InterfaceConfig::new(iface.id.clone(), iface.capacity_bps)
                .map_err(|e| ConfigError::InvalidInterface(e.to_string()))?;
        }

        if self.top_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "top_connections",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.client_queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client_queue_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_clients == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_clients",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.restart_backoff_base_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "restart_backoff_base_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.restart_backoff_cap_ms < self.restart_backoff_base_ms {
            return Err(ConfigError::InvalidValue {
                field: "restart_backoff_cap_ms",
                reason: "must be >= restart_backoff_base_ms".to_string(),
            });
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_consecutive_failures",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// First restart delay as a Duration.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_base_ms)
    }

    /// Restart delay cap as a Duration.
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_cap_ms)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Config lists no interfaces to monitor")]
    NoInterfaces,

    #[error("Interface {id} is listed more than once")]
    DuplicateInterface { id: InterfaceId },

    #[error("{0}")]
    InvalidInterface(String),

    #[error("Invalid {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config(
            r#"
            [[interfaces]]
            id = "eth0"
            capacity_bps = 500000000.0
            "#,
        );

        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.interfaces.len(), 1);
        assert_eq!(config.listen_addr.port(), 8766);
        assert_eq!(config.sampler_command, "iftop");
        assert_eq!(config.top_connections, 10);
        assert_eq!(config.max_consecutive_failures, 5);
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
            listen_addr = "127.0.0.1:9000"
            sampler_command = "/usr/sbin/iftop"
            top_connections = 5
            client_queue_depth = 8
            max_clients = 10
            restart_backoff_base_ms = 500
            restart_backoff_cap_ms = 8000
            max_consecutive_failures = 3
            ethers_file = "/usr/local/etc/ethers"
            lease_command = "dhcp-lease-list"

            [[interfaces]]
            id = "eth0"
            capacity_bps = 500000000.0

            [[interfaces]]
            id = "eth1"
            capacity_bps = 100000000.0
            "#,
        );

        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.interfaces.len(), 2);
        assert_eq!(config.backoff_base(), Duration::from_millis(500));
        assert_eq!(config.backoff_cap(), Duration::from_millis(8000));
    }

    #[test]
    fn test_rejects_empty_interface_list() {
        let file = write_config("interfaces = []\n");
        assert!(matches!(
            DaemonConfig::load(file.path()),
            Err(ConfigError::NoInterfaces)
        ));
    }

    #[test]
    fn test_rejects_duplicate_interface() {
        let file = write_config(
            r#"
            [[interfaces]]
            id = "eth0"
            capacity_bps = 1000.0

            [[interfaces]]
            id = "eth0"
            capacity_bps = 2000.0
            "#,
        );
        assert!(matches!(
            DaemonConfig::load(file.path()),
            Err(ConfigError::DuplicateInterface { .. })
        ));
    }

    #[test]
    fn test_rejects_nonpositive_capacity() {
        let file = write_config(
            r#"
            [[interfaces]]
            id = "eth0"
            capacity_bps = -5.0
            "#,
        );
        assert!(matches!(
            DaemonConfig::load(file.path()),
            Err(ConfigError::InvalidInterface(_))
        ));
    }

    #[test]
    fn test_rejects_cap_below_base() {
        let file = write_config(
            r#"
            restart_backoff_base_ms = 5000
            restart_backoff_cap_ms = 1000

            [[interfaces]]
            id = "eth0"
            capacity_bps = 1000.0
            "#,
        );
        assert!(matches!(
            DaemonConfig::load(file.path()),
            Err(ConfigError::InvalidValue { field: "restart_backoff_cap_ms", .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let file = write_config(
            r#"
            not_a_real_field = true

            [[interfaces]]
            id = "eth0"
            capacity_bps = 1000.0
            "#,
        );
        assert!(matches!(
            DaemonConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            DaemonConfig::load(Path::new("/nonexistent/ifcast.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
