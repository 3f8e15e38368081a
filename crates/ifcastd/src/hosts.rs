//! LAN host naming for endpoint display.
//!
//! Builds an IP -> name map from two optional sources at startup: an
//! ethers-format file (`MAC name` pairs) and the output of a DHCP
//! lease listing command (`MAC IP name` lines). The ethers name for a
//! MAC takes precedence over the lease name. Either source being
//! absent is a quiet no-op.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, warn};

/// Resolved host names keyed by IP address string.
#[derive(Debug, Clone, Default)]
pub struct HostNames {
    by_ip: HashMap<String, String>,
}

impl HostNames {
    /// An empty map; every lookup falls through to the bare address.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads names from the configured sources.
    pub async fn load(ethers_file: Option<&Path>, lease_command: Option<&str>) -> Self {
        let ethers = match ethers_file {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(contents) => parse_ethers(&contents),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "No ethers file, skipping");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        let by_ip = match lease_command {
            Some(cmd) => match Command::new(cmd).output().await {
                Ok(output) if output.status.success() => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    parse_leases(&stdout, &ethers)
                }
                Ok(output) => {
                    warn!(
                        command = cmd,
                        status = %output.status,
                        "Lease command failed, continuing without host names"
                    );
                    HashMap::new()
                }
                Err(e) => {
                    debug!(command = cmd, error = %e, "Lease command unavailable, skipping");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        debug!(entries = by_ip.len(), "Host name map loaded");
        Self { by_ip }
    }

    /// Builds a map directly from lease-listing output, with no
    /// ethers overrides.
    pub fn from_lease_output(stdout: &str) -> Self {
        Self {
            by_ip: parse_leases(stdout, &HashMap::new()),
        }
    }

    /// Annotates a host string as `ip[name]` when the IP is known.
    pub fn annotate(&self, host: &str) -> String {
        match self.by_ip.get(host) {
            Some(name) => format!("{host}[{name}]"),
            None => host.to_string(),
        }
    }

    /// Number of known hosts.
    pub fn len(&self) -> usize {
        self.by_ip.len()
    }

    /// True when no names were loaded.
    pub fn is_empty(&self) -> bool {
        self.by_ip.is_empty()
    }
}

/// Parses an ethers-format file into MAC -> name pairs.
///
/// Each line is `MAC name`; lines with fewer than two fields are
/// skipped.
fn parse_ethers(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let mac = parts.next()?;
            let name = parts.next()?;
            Some((mac.to_string(), name.to_string()))
        })
        .collect()
}

/// Parses lease listing output into IP -> name pairs.
///
/// Each useful line is `MAC IP name ...`; the second field must parse
/// as an IP address or the line is skipped (the listing starts with
/// banner lines). An ethers entry for the MAC overrides the lease
/// name.
fn parse_leases(stdout: &str, ethers: &HashMap<String, String>) -> HashMap<String, String> {
    let mut by_ip = HashMap::new();
    for line in stdout.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (Some(mac), Some(ip), Some(name)) = (parts.first(), parts.get(1), parts.get(2))
        else {
            continue;
        };
        if ip.parse::<IpAddr>().is_err() {
            continue;
        }
        let name = ethers.get(*mac).map(String::as_str).unwrap_or(name);
        by_ip.insert(ip.to_string(), name.to_string());
    }
    by_ip
}
