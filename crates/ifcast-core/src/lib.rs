//! ifcast core - Shared types for interface bandwidth monitoring
//!
//! This crate provides the domain types shared between the daemon
//! (ifcastd) and the wire protocol (ifcast-protocol): interface
//! identity and capacity configuration, normalized rate windows, and
//! per-interface traffic samples.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod iface;
pub mod rates;
pub mod sample;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use iface::{InterfaceConfig, InterfaceId};
pub use rates::{parse_rate, CumulativeTotals, PeakRates, RateWindows};
pub use sample::{
    sort_top_connections, well_known_service, ConnectionRecord, Endpoint, InterfaceEntry,
    InterfaceSample, InterfaceTotals, LinkStatus,
};
