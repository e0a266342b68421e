//! DHCPv4 protocol implementation
//!
//! This module contains the DHCPv4-specific implementation including:
//! - Option and message wire codecs
//! - The DORA transaction state machine
//! - The lease record

pub mod lease;
pub mod message;
pub mod options;
pub mod transaction;

#[cfg(test)]
mod tests;

pub use lease::Lease;
pub use message::{build_discover, build_request, Message};
pub use options::{DhcpOption, MessageType, OptionCode};
pub use transaction::{Action, RetryPolicy, Transaction, TxState};
