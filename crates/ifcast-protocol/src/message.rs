//! Protocol message types for daemon-to-client communication.

use crate::version::ProtocolVersion;
use ifcast_core::InterfaceEntry;
use serde::{Deserialize, Serialize};

/// Messages sent from the daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Complete current state, sent exactly once when a client
    /// connects and before any update. One entry per configured
    /// interface, including those with no data yet.
    FullState {
        /// Daemon's protocol version, for client compatibility checks
        protocol_version: ProtocolVersion,
        /// All configured interfaces with their current samples
        interfaces: Vec<InterfaceEntry>,
    },

    /// One interface changed: a new sample arrived or its sampler
    /// transitioned to a failed state.
    InterfaceUpdate {
        /// The updated interface entry (boxed for size optimization)
        update: Box<InterfaceEntry>,
    },

    /// Reply to a client ping.
    Pong {
        /// Sequence number echoed from the ping
        seq: u64,
    },
}

impl ServerMessage {
    /// Creates a full-state message with the current protocol version.
    pub fn full_state(interfaces: Vec<InterfaceEntry>) -> Self {
        Self::FullState {
            protocol_version: ProtocolVersion::CURRENT,
            interfaces,
        }
    }

    /// Creates an interface-update message.
    pub fn interface_update(update: InterfaceEntry) -> Self {
        Self::InterfaceUpdate {
            update: Box::new(update),
        }
    }

    /// Creates a pong reply.
    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }
}

/// Messages clients may send to the daemon.
///
/// The stream is fire-and-forget from the daemon's side; clients only
/// speak to keep the connection alive or to leave.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe.
    Ping {
        /// Sequence number for matching the pong response
        seq: u64,
    },

    /// Client disconnecting gracefully.
    Disconnect,
}

impl ClientMessage {
    /// Creates a ping message.
    pub fn ping(seq: u64) -> Self {
        Self::Ping { seq }
    }

    /// Creates a disconnect message.
    pub fn disconnect() -> Self {
        Self::Disconnect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifcast_core::{InterfaceId, LinkStatus};

    fn waiting_entry(id: &str) -> InterfaceEntry {
        InterfaceEntry {
            id: InterfaceId::new(id),
            capacity_bps: 500_000_000.0,
            status: LinkStatus::Waiting,
            consecutive_failures: 0,
            sample: None,
        }
    }

    #[test]
    fn test_full_state_wire_shape() {
        let msg = ServerMessage::full_state(vec![waiting_entry("eth0")]);
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "full_state");
        assert_eq!(json["interfaces"][0]["id"], "eth0");
        assert_eq!(json["interfaces"][0]["status"], "waiting");
        // No-data entries omit the sample field entirely
        assert!(json["interfaces"][0].get("sample").is_none());
    }

    #[test]
    fn test_interface_update_wire_shape() {
        let msg = ServerMessage::interface_update(waiting_entry("eth1"));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "interface_update");
        assert_eq!(json["update"]["id"], "eth1");
    }

    #[test]
    fn test_client_ping_round_trip() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"ping","seq":7}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::Ping { seq: 7 }));

        let json = serde_json::to_value(ClientMessage::ping(7)).unwrap();
        assert_eq!(json["type"], "ping");
        assert_eq!(json["seq"], 7);
    }

    #[test]
    fn test_client_disconnect_parses() {
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"disconnect"}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::Disconnect));
    }

    #[test]
    fn test_unknown_client_message_is_an_error() {
        let parsed = serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#);
        assert!(parsed.is_err());
    }
}
