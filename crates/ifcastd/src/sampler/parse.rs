//! Block parser for the sampling tool's text output mode.
//!
//! In `-t` mode the tool emits repeating blocks: paired flow lines
//! (a sender line, optionally prefixed with a row index, followed by
//! its receiver line), totals lines, peak and cumulative lines, and a
//! `====` terminator. Column layout is the tool's to define; the
//! parser matches line shapes token-wise and ignores everything it
//! does not recognize (banners, headers, rules).
//!
//! Failure policy: a flow line that does not parse loses that flow
//! only. A totals-shaped line that does not parse poisons the whole
//! block, which is discarded at the terminator so an interface keeps
//! its last good sample rather than a corrupted one.

use std::sync::Arc;

use chrono::Utc;
use ifcast_core::{
    parse_rate, sort_top_connections, well_known_service, ConnectionRecord, CumulativeTotals,
    Endpoint, InterfaceId, InterfaceSample, InterfaceTotals, PeakRates, RateWindows,
};
use tracing::debug;

use crate::hosts::HostNames;

/// Tagged shape of one raw output line.
#[derive(Debug, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Sender half of a flow pair: `host:port => 2s 10s 40s cum`.
    SenderFlow {
        endpoint: &'a str,
        rates: [&'a str; 4],
    },

    /// Receiver half of a flow pair: `host:port <= 2s 10s 40s cum`.
    ReceiverFlow {
        endpoint: &'a str,
        rates: [&'a str; 4],
    },

    /// `Total send rate:` followed by the three windows.
    TotalSend([&'a str; 3]),

    /// `Total receive rate:` followed by the three windows.
    TotalReceive([&'a str; 3]),

    /// `Total send and receive rate:` followed by the three windows.
    TotalBoth([&'a str; 3]),

    /// `Peak rate (sent/received/total):` followed by three values.
    Peak([&'a str; 3]),

    /// `Cumulative (sent/received/total):` followed by three values.
    Cumulative([&'a str; 3]),

    /// `====...` block terminator.
    BlockEnd,

    /// A flow-shaped line with the wrong arity (truncation).
    MalformedFlow,

    /// A totals-shaped line with the wrong arity (truncation).
    MalformedTotals,

    /// Header, banner, rule, or blank line.
    Ignorable,
}

/// Classifies one raw line by shape.
pub fn classify_line(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Ignorable;
    }
    if trimmed.starts_with("====") {
        return LineKind::BlockEnd;
    }

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.contains(&"=>") || parts.contains(&"<=") {
        return classify_flow(parts);
    }

    // Longest prefix first: "Total send rate:" is a prefix cousin of
    // "Total send and receive rate:".
    if trimmed.starts_with("Total send and receive rate:") {
        return rate_triple(&parts, 5).map_or(LineKind::MalformedTotals, LineKind::TotalBoth);
    }
    if trimmed.starts_with("Total send rate:") {
        return rate_triple(&parts, 3).map_or(LineKind::MalformedTotals, LineKind::TotalSend);
    }
    if trimmed.starts_with("Total receive rate:") {
        return rate_triple(&parts, 3).map_or(LineKind::MalformedTotals, LineKind::TotalReceive);
    }
    if trimmed.starts_with("Peak rate") {
        return rate_triple(&parts, 3).map_or(LineKind::MalformedTotals, LineKind::Peak);
    }
    if trimmed.starts_with("Cumulative") {
        return rate_triple(&parts, 2).map_or(LineKind::MalformedTotals, LineKind::Cumulative);
    }

    LineKind::Ignorable
}

fn rate_triple<'a>(parts: &[&'a str], start: usize) -> Option<[&'a str; 3]> {
    Some([
        *parts.get(start)?,
        *parts.get(start + 1)?,
        *parts.get(start + 2)?,
    ])
}

fn classify_flow<'a>(mut parts: Vec<&'a str>) -> LineKind<'a> {
    // Sender lines carry a leading row index.
    if parts
        .first()
        .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        parts.remove(0);
    }

    let arrow = parts.get(1).copied();
    let is_sender = arrow == Some("=>");
    if !is_sender && arrow != Some("<=") {
        return LineKind::MalformedFlow;
    }

    let (Some(endpoint), Some(r2), Some(r10), Some(r40), Some(cum)) = (
        parts.first().copied(),
        parts.get(2).copied(),
        parts.get(3).copied(),
        parts.get(4).copied(),
        parts.get(5).copied(),
    ) else {
        return LineKind::MalformedFlow;
    };

    let rates = [r2, r10, r40, cum];
    if is_sender {
        LineKind::SenderFlow { endpoint, rates }
    } else {
        LineKind::ReceiverFlow { endpoint, rates }
    }
}

/// One parsed half of a flow pair.
struct FlowHalf {
    endpoint: Endpoint,
    rates: RateWindows,
    cumulative: f64,
}

/// Accumulates lines into one snapshot block and emits an
/// `InterfaceSample` at each terminator.
///
/// Construct one per subprocess run: a restart gets a fresh parser, so
/// a stale partial block can never be merged with new output.
pub struct BlockParser {
    interface: InterfaceId,
    display_cap: usize,
    hosts: Arc<HostNames>,
    pending: Option<FlowHalf>,
    connections: Vec<ConnectionRecord>,
    total_sent: Option<RateWindows>,
    total_received: Option<RateWindows>,
    total_combined: Option<RateWindows>,
    peak: Option<PeakRates>,
    cumulative: Option<CumulativeTotals>,
    poisoned: bool,
}

impl BlockParser {
    /// Creates a parser for one interface with the given display cap.
    pub fn new(interface: InterfaceId, display_cap: usize) -> Self {
        Self {
            interface,
            display_cap,
            hosts: Arc::new(HostNames::empty()),
            pending: None,
            connections: Vec::new(),
            total_sent: None,
            total_received: None,
            total_combined: None,
            peak: None,
            cumulative: None,
            poisoned: false,
        }
    }

    /// Attaches a host-name resolver; endpoint hosts are annotated as
    /// `ip[name]` before sorting.
    pub fn with_hosts(mut self, hosts: Arc<HostNames>) -> Self {
        self.hosts = hosts;
        self
    }

    /// Feeds one output line; returns a sample when the line completed
    /// a valid block.
    pub fn push_line(&mut self, line: &str) -> Option<InterfaceSample> {
        match classify_line(line) {
            LineKind::SenderFlow { endpoint, rates } => {
                if self.pending.take().is_some() {
                    debug!(
                        interface = %self.interface,
                        "Sender line without paired receiver, dropping previous flow"
                    );
                }
                match self.parse_flow_half(endpoint, rates) {
                    Some(half) => self.pending = Some(half),
                    None => debug!(
                        interface = %self.interface,
                        line,
                        "Skipping flow with unparsable sender line"
                    ),
                }
                None
            }

            LineKind::ReceiverFlow { endpoint, rates } => {
                let Some(sender) = self.pending.take() else {
                    debug!(
                        interface = %self.interface,
                        "Receiver line without preceding sender, skipping"
                    );
                    return None;
                };
                match self.parse_flow_half(endpoint, rates) {
                    Some(receiver) => {
                        let service = well_known_service(&sender.endpoint.port)
                            .or_else(|| well_known_service(&receiver.endpoint.port))
                            .map(String::from);
                        self.connections.push(ConnectionRecord {
                            local: sender.endpoint,
                            remote: receiver.endpoint,
                            sent: sender.rates,
                            received: receiver.rates,
                            sent_cumulative: sender.cumulative,
                            received_cumulative: receiver.cumulative,
                            service,
                        });
                    }
                    None => debug!(
                        interface = %self.interface,
                        line,
                        "Skipping flow with unparsable receiver line"
                    ),
                }
                None
            }

            LineKind::TotalSend(tokens) => {
                self.total_sent = self.parse_windows(tokens);
                None
            }
            LineKind::TotalReceive(tokens) => {
                self.total_received = self.parse_windows(tokens);
                None
            }
            LineKind::TotalBoth(tokens) => {
                self.total_combined = self.parse_windows(tokens);
                None
            }
            LineKind::Peak(tokens) => {
                self.peak = self.parse_windows(tokens).map(|w| PeakRates {
                    sent_bps: w.short_bps,
                    received_bps: w.medium_bps,
                    total_bps: w.long_bps,
                });
                None
            }
            LineKind::Cumulative(tokens) => {
                self.cumulative = self.parse_windows(tokens).map(|w| CumulativeTotals {
                    sent: w.short_bps,
                    received: w.medium_bps,
                    total: w.long_bps,
                });
                None
            }

            LineKind::MalformedTotals => {
                debug!(interface = %self.interface, line, "Malformed totals line, poisoning block");
                self.poisoned = true;
                None
            }
            LineKind::MalformedFlow => {
                debug!(interface = %self.interface, line, "Malformed flow line, skipping");
                self.pending = None;
                None
            }

            LineKind::BlockEnd => self.finish(),
            LineKind::Ignorable => None,
        }
    }

    fn parse_flow_half(&self, endpoint: &str, rates: [&str; 4]) -> Option<FlowHalf> {
        let (host, port) = endpoint.rsplit_once(':')?;
        let [r2, r10, r40, cum] = rates;
        let windows = RateWindows::new(
            parse_rate(r2).ok()?,
            parse_rate(r10).ok()?,
            parse_rate(r40).ok()?,
        );
        Some(FlowHalf {
            endpoint: Endpoint::new(self.hosts.annotate(host), port),
            rates: windows,
            cumulative: parse_rate(cum).ok()?,
        })
    }

    /// Parses a three-value group; a failure poisons the block.
    fn parse_windows(&mut self, tokens: [&str; 3]) -> Option<RateWindows> {
        let [a, b, c] = tokens;
        match (parse_rate(a), parse_rate(b), parse_rate(c)) {
            (Ok(a), Ok(b), Ok(c)) => Some(RateWindows::new(a, b, c)),
            _ => {
                self.poisoned = true;
                None
            }
        }
    }

    /// Closes the current block, emitting a sample if it was intact.
    fn finish(&mut self) -> Option<InterfaceSample> {
        let poisoned = self.poisoned;
        let total_sent = self.total_sent.take();
        let total_received = self.total_received.take();
        let total_combined = self.total_combined.take();
        let peak = self.peak.take();
        let cumulative = self.cumulative.take();
        let mut connections = std::mem::take(&mut self.connections);
        self.pending = None;
        self.poisoned = false;

        if poisoned {
            debug!(interface = %self.interface, "Discarding poisoned block");
            return None;
        }
        let (Some(sent), Some(received), Some(combined)) =
            (total_sent, total_received, total_combined)
        else {
            debug!(interface = %self.interface, "Block ended without totals, discarding");
            return None;
        };

        sort_top_connections(&mut connections, self.display_cap);

        Some(InterfaceSample {
            interface: self.interface.clone(),
            totals: InterfaceTotals {
                sent,
                received,
                combined,
            },
            peak: peak.unwrap_or_default(),
            cumulative: cumulative.unwrap_or_default(),
            top_connections: connections,
            sampled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = "\
interface: eth0
IP address is: 10.0.0.5
MAC address is: aa:bb:cc:dd:ee:ff
Listening on eth0
   # Host name (port/service if enabled)            last 2s   last 10s   last 40s cumulative
--------------------------------------------------------------------------------------------
   1 10.0.0.5:22                              =>      128Kb      110Kb       96Kb       64KB
     10.0.0.7:51022                           <=       64Kb       60Kb       48Kb       32KB
   2 10.0.0.5:443                             =>     3.66Mb     3.66Mb     3.66Mb     1.83MB
     93.184.216.34:52014                      <=      219Kb      219Kb      219Kb      110KB
--------------------------------------------------------------------------------------------
Total send rate:                                     3.79Mb     3.77Mb     3.76Mb
Total receive rate:                                   283Kb      279Kb      267Kb
Total send and receive rate:                         4.07Mb     4.05Mb     4.03Mb
--------------------------------------------------------------------------------------------
Peak rate (sent/received/total):                     3.79Mb      283Kb     4.07Mb
Cumulative (sent/received/total):                    1.89MB      142KB     2.03MB
============================================================================================
";

    fn parse_block(parser: &mut BlockParser, block: &str) -> Option<InterfaceSample> {
        let mut sample = None;
        for line in block.lines() {
            if let Some(s) = parser.push_line(line) {
                sample = Some(s);
            }
        }
        sample
    }

    #[test]
    fn test_classify_block_end() {
        assert_eq!(classify_line("===================="), LineKind::BlockEnd);
    }

    #[test]
    fn test_classify_headers_ignorable() {
        assert_eq!(classify_line("interface: eth0"), LineKind::Ignorable);
        assert_eq!(classify_line("Listening on eth0"), LineKind::Ignorable);
        assert_eq!(classify_line("----------------"), LineKind::Ignorable);
        assert_eq!(classify_line(""), LineKind::Ignorable);
        assert_eq!(
            classify_line("   # Host name (port/service if enabled)"),
            LineKind::Ignorable
        );
    }

    #[test]
    fn test_classify_sender_strips_row_index() {
        let kind = classify_line("   1 10.0.0.5:443  =>  3.66Mb  3.66Mb  3.66Mb  1.83MB");
        match kind {
            LineKind::SenderFlow { endpoint, rates } => {
                assert_eq!(endpoint, "10.0.0.5:443");
                assert_eq!(rates, ["3.66Mb", "3.66Mb", "3.66Mb", "1.83MB"]);
            }
            other => panic!("expected SenderFlow, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_receiver_has_no_index() {
        let kind = classify_line("     93.184.216.34:52014  <=  219Kb  219Kb  219Kb  110KB");
        assert!(matches!(kind, LineKind::ReceiverFlow { endpoint, .. } if endpoint == "93.184.216.34:52014"));
    }

    #[test]
    fn test_classify_truncated_flow_is_malformed() {
        assert_eq!(
            classify_line("   1 10.0.0.5:443  =>  3.66Mb"),
            LineKind::MalformedFlow
        );
    }

    #[test]
    fn test_classify_truncated_totals_is_malformed() {
        assert_eq!(
            classify_line("Total send rate:  3.79Mb"),
            LineKind::MalformedTotals
        );
    }

    #[test]
    fn test_parse_complete_block() {
        let mut parser = BlockParser::new(InterfaceId::new("eth0"), 10);
        let sample = parse_block(&mut parser, BLOCK).expect("block should parse");

        assert_eq!(sample.interface.as_str(), "eth0");
        assert_eq!(sample.top_connections.len(), 2);
        assert_eq!(sample.totals.sent.short_bps, 3_790_000.0);
        assert_eq!(sample.totals.received.medium_bps, 279_000.0);
        assert_eq!(sample.totals.combined.long_bps, 4_030_000.0);
        assert_eq!(sample.peak.total_bps, 4_070_000.0);
        assert_eq!(sample.cumulative.sent, 1_890_000.0);
    }

    #[test]
    fn test_connections_sorted_by_short_window_combined() {
        let mut parser = BlockParser::new(InterfaceId::new("eth0"), 10);
        let sample = parse_block(&mut parser, BLOCK).expect("block should parse");

        // The HTTPS flow (3.66Mb + 219Kb) outranks the SSH flow even
        // though SSH appeared first in the block.
        let first = sample.top_connections.first().expect("first connection");
        assert_eq!(first.local.port, "443");
        assert_eq!(first.service.as_deref(), Some("HTTPS"));

        let second = sample.top_connections.get(1).expect("second connection");
        assert_eq!(second.local.port, "22");
        assert_eq!(second.service.as_deref(), Some("SSH"));
    }

    #[test]
    fn test_parsing_is_idempotent() {
        let mut first = BlockParser::new(InterfaceId::new("eth0"), 10);
        let mut second = BlockParser::new(InterfaceId::new("eth0"), 10);

        let a = parse_block(&mut first, BLOCK).expect("first parse");
        let b = parse_block(&mut second, BLOCK).expect("second parse");

        // Field-for-field identical, including connection order; only
        // the timestamp differs between runs.
        assert_eq!(a.top_connections, b.top_connections);
        assert_eq!(a.totals, b.totals);
        assert_eq!(a.peak, b.peak);
        assert_eq!(a.cumulative, b.cumulative);
    }

    #[test]
    fn test_display_cap_enforced() {
        let mut parser = BlockParser::new(InterfaceId::new("eth0"), 1);
        let sample = parse_block(&mut parser, BLOCK).expect("block should parse");

        assert_eq!(sample.top_connections.len(), 1);
        assert_eq!(
            sample.top_connections.first().map(|c| c.local.port.as_str()),
            Some("443")
        );
    }

    #[test]
    fn test_bad_rate_unit_skips_only_that_flow() {
        let block = "\
   1 10.0.0.5:443   =>  whatMb  3.66Mb  3.66Mb  1.83MB
     1.2.3.4:52014  <=  219Kb   219Kb   219Kb   110KB
   2 10.0.0.5:22    =>  128Kb   110Kb   96Kb    64KB
     10.0.0.7:51022 <=  64Kb    60Kb    48Kb    32KB
Total send rate:        3.79Mb  3.77Mb  3.76Mb
Total receive rate:     283Kb   279Kb   267Kb
Total send and receive rate:  4.07Mb  4.05Mb  4.03Mb
====
";
        let mut parser = BlockParser::new(InterfaceId::new("eth0"), 10);
        let sample = parse_block(&mut parser, block).expect("block should still parse");

        assert_eq!(sample.top_connections.len(), 1);
        assert_eq!(
            sample.top_connections.first().map(|c| c.local.port.as_str()),
            Some("22")
        );
    }

    #[test]
    fn test_malformed_totals_discards_block() {
        let block = "\
   1 10.0.0.5:443   =>  3.66Mb  3.66Mb  3.66Mb  1.83MB
     1.2.3.4:52014  <=  219Kb   219Kb   219Kb   110KB
Total send rate:        oops    3.77Mb  3.76Mb
Total receive rate:     283Kb   279Kb   267Kb
Total send and receive rate:  4.07Mb  4.05Mb  4.03Mb
====
";
        let mut parser = BlockParser::new(InterfaceId::new("eth0"), 10);
        assert!(parse_block(&mut parser, block).is_none());
    }

    #[test]
    fn test_terminator_without_totals_discards_block() {
        let block = "\
   1 10.0.0.5:443   =>  3.66Mb  3.66Mb  3.66Mb  1.83MB
     1.2.3.4:52014  <=  219Kb   219Kb   219Kb   110KB
====
";
        let mut parser = BlockParser::new(InterfaceId::new("eth0"), 10);
        assert!(parse_block(&mut parser, block).is_none());
    }

    #[test]
    fn test_discarded_block_does_not_leak_into_next() {
        let truncated = "\
   1 10.0.0.5:9999  =>  9.99Mb  9.99Mb  9.99Mb  9.99MB
     9.9.9.9:1111   <=  9.99Mb  9.99Mb  9.99Mb  9.99MB
====
";
        let mut parser = BlockParser::new(InterfaceId::new("eth0"), 10);
        assert!(parse_block(&mut parser, truncated).is_none());

        let sample = parse_block(&mut parser, BLOCK).expect("next block should parse");
        assert_eq!(sample.top_connections.len(), 2);
        assert!(sample
            .top_connections
            .iter()
            .all(|c| c.local.port != "9999"));
    }

    #[test]
    fn test_orphan_receiver_skipped() {
        let block = "\
     1.2.3.4:52014  <=  219Kb   219Kb   219Kb   110KB
Total send rate:        3.79Mb  3.77Mb  3.76Mb
Total receive rate:     283Kb   279Kb   267Kb
Total send and receive rate:  4.07Mb  4.05Mb  4.03Mb
====
";
        let mut parser = BlockParser::new(InterfaceId::new("eth0"), 10);
        let sample = parse_block(&mut parser, block).expect("block should parse");
        assert!(sample.top_connections.is_empty());
    }

    #[test]
    fn test_host_annotation_applied() {
        let hosts = HostNames::from_lease_output("aa:bb:cc:dd:ee:01 10.0.0.7 laptop");
        let mut parser =
            BlockParser::new(InterfaceId::new("eth0"), 10).with_hosts(Arc::new(hosts));
        let sample = parse_block(&mut parser, BLOCK).expect("block should parse");

        let ssh = sample
            .top_connections
            .iter()
            .find(|c| c.local.port == "22")
            .expect("ssh flow");
        assert_eq!(ssh.remote.host, "10.0.0.7[laptop]");
    }
}
