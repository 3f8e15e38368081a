//! Traffic samples: connection records, per-interface totals, and the
//! client-visible interface entry.

use crate::iface::InterfaceId;
use crate::rates::{CumulativeTotals, PeakRates, RateWindows};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of a traffic flow as printed by the sampler.
///
/// `host` may carry a resolved-name suffix (`10.0.0.2[laptop]`) and
/// `port` stays a string: the tool prints service aliases when port
/// lookup is enabled and `*` for unknown ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Display label for a handful of well-known ports.
///
/// Matches on either endpoint's port at parse time; the first match in
/// table order wins.
pub fn well_known_service(port: &str) -> Option<&'static str> {
    match port.parse::<u16>().ok()? {
        22 => Some("SSH"),
        80 => Some("HTTP"),
        143 => Some("IMAP"),
        443 => Some("HTTPS"),
        16393 => Some("FaceTime"),
        25565 => Some("Minecraft"),
        _ => None,
    }
}

/// One observed traffic flow at a sampling instant.
///
/// Records have no identity across samples; every block produces a
/// fresh snapshot list, never a diffed delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Endpoint on the monitored host's side.
    pub local: Endpoint,

    /// Remote endpoint.
    pub remote: Endpoint,

    /// Outbound rolling averages (local -> remote).
    pub sent: RateWindows,

    /// Inbound rolling averages (remote -> local).
    pub received: RateWindows,

    /// Cumulative outbound transfer over the sampler run.
    pub sent_cumulative: f64,

    /// Cumulative inbound transfer over the sampler run.
    pub received_cumulative: f64,

    /// Well-known-port classification, if either port matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl ConnectionRecord {
    /// Combined short-window rate, the sort key for top-connection
    /// ordering.
    pub fn short_window_combined_bps(&self) -> f64 {
        self.sent.short_bps + self.received.short_bps
    }
}

/// Sorts connection records by descending short-window combined rate,
/// ties broken by local then remote endpoint string, and truncates to
/// `cap` entries.
///
/// The tie-break keeps ordering deterministic when several idle flows
/// report identical rates.
pub fn sort_top_connections(connections: &mut Vec<ConnectionRecord>, cap: usize) {
    connections.sort_by(|a, b| {
        b.short_window_combined_bps()
            .total_cmp(&a.short_window_combined_bps())
            .then_with(|| a.local.to_string().cmp(&b.local.to_string()))
            .then_with(|| a.remote.to_string().cmp(&b.remote.to_string()))
    });
    connections.truncate(cap);
}

/// Aggregate rates for one interface, as reported by the sampler's
/// totals lines.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InterfaceTotals {
    pub sent: RateWindows,
    pub received: RateWindows,
    pub combined: RateWindows,
}

/// The authoritative current state of one interface: one snapshot of
/// everything the sampler reported for its latest block.
///
/// Stored whole and replaced wholesale on each new block; readers
/// always see a complete sample, never a partial update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSample {
    /// Interface this sample belongs to.
    pub interface: InterfaceId,

    /// Aggregate rolling averages.
    pub totals: InterfaceTotals,

    /// Peak rates over the sampler run.
    pub peak: PeakRates,

    /// Cumulative transfer over the sampler run.
    pub cumulative: CumulativeTotals,

    /// Flows sorted by descending short-window combined rate, bounded
    /// to the configured display cap.
    pub top_connections: Vec<ConnectionRecord>,

    /// When the block terminator was seen.
    pub sampled_at: DateTime<Utc>,
}

/// How an interface is currently faring, from a client's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// No valid block received yet.
    Waiting,

    /// Sampler is producing blocks.
    Live,

    /// Sampler permanently failed (privilege error, missing interface,
    /// or too many consecutive crashes). No further data will arrive.
    Failed,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Live => write!(f, "live"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Client-visible state of one configured interface.
///
/// `sample` is `None` until the first valid block; a `Failed`
/// interface keeps whatever sample it last had.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceEntry {
    pub id: InterfaceId,

    /// Configured display threshold, bits per second.
    pub capacity_bps: f64,

    pub status: LinkStatus,

    /// Consecutive sampler failures, for observability.
    pub consecutive_failures: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<InterfaceSample>,
}
