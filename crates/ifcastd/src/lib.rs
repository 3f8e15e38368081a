//! ifcast daemon - sampler supervision and broadcast server
//!
//! This crate provides the core infrastructure for the ifcast daemon:
//! - `sampler` - per-interface iftop subprocess supervision and output parsing
//! - `store` - interface state store actor holding the latest sample per interface
//! - `broadcast` - client registry with bounded per-session queues and fan-out
//! - `server` - WebSocket server for browser clients
//! - `config` - TOML configuration loading and validation
//! - `hosts` - LAN host naming from ethers files and DHCP leases
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ifcastd daemon                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌────────────────┐  samples   ┌─────────────────────────────┐   │
//! │  │ iftop per iface│───────────▶│        StoreActor           │   │
//! │  │  (supervised,  │            │  (interface state owner)    │   │
//! │  │   parsed)      │            └──────────────┬──────────────┘   │
//! │  └────────────────┘                           │ events           │
//! │                                               ▼                  │
//! │  ┌────────────────┐  queues    ┌─────────────────────────────┐   │
//! │  │ WebSocket      │◀───────────│        Broadcaster          │   │
//! │  │ sessions       │            │ (serialize once, fan out to │   │
//! │  │ (per client)   │            │  bounded per-client queues) │   │
//! │  └────────────────┘            └─────────────────────────────┘   │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate avoids `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, and `todo!()`. Fallible operations
//! return `Result` or `Option`, and channel closure is handled
//! gracefully.

pub mod broadcast;
pub mod config;
pub mod hosts;
pub mod sampler;
pub mod server;
pub mod store;
