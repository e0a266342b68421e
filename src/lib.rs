//! # Leasewire - A DHCPv4 Client Engine
//!
//! Leasewire obtains IPv4 leases by driving the full DORA (Discover, Offer,
//! Request, Acknowledge) exchange: it builds and parses the BOOTP/DHCP wire
//! format itself, matches responses by transaction ID, retransmits with
//! exponential backoff, and returns an immutable [`Lease`].
//!
//! ## Features
//!
//! - Hand-rolled RFC 2131/2132 wire codec, unknown options preserved
//! - DORA state machine with per-stage retry budgets and backoff caps
//! - Asynchronous operation using Tokio
//! - Configurable UDP ports for unprivileged loopback testing
//! - Optional Linux interface binding (`SO_BINDTODEVICE`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use leasewire::{ClientConfig, DhcpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mac = Bytes::from_static(&[0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);
//!     let config = ClientConfig::new(mac);
//!     let mut client = DhcpClient::new(config).await?;
//!     let lease = client.get_lease().await?;
//!     println!("{lease}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod v4;

pub use client::DhcpClient;
pub use config::{Args, ClientConfig};
pub use error::{LeasewireError, Result};
pub use v4::{DhcpOption, Lease, MessageType, RetryPolicy};
