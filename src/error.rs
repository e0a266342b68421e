use crate::network::SocketError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeasewireError {
    #[error("Socket operation failed")]
    Socket(#[from] SocketError),

    #[error("Malformed DHCP option: {0}")]
    MalformedOption(String),

    #[error("Malformed DHCP message: {0}")]
    MalformedMessage(String),

    #[error("Hardware address is {0} bytes, exceeds the 16-byte chaddr field")]
    InvalidHardwareAddress(usize),

    /// The server answered the REQUEST with a NAK. Carries the server's
    /// explanatory message (option 56) when one was sent.
    #[error("Lease denied by server{}", .0.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    LeaseDenied(Option<String>),

    #[error("No response from server after exhausting the retry budget")]
    Timeout,

    #[error("Failed to parse MAC address: {0}")]
    MacParse(String),

    #[error("Interface '{0}' not found or has no MAC address")]
    InterfaceInvalid(String),
}

/// A specialized Result type for DHCP client operations.
pub type Result<T> = std::result::Result<T, LeasewireError>;
