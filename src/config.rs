use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;

use crate::v4::options::DhcpOption;
use crate::v4::transaction::RetryPolicy;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The network interface to bind to (e.g., 'eth0', 'lo')
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Hardware address to use instead of reading it from the interface
    #[arg(short, long)]
    pub mac: Option<String>,

    /// Unicast server address; broadcasts when omitted
    #[arg(short, long)]
    pub server: Option<Ipv4Addr>,

    /// Port to send from (bootpc is 68)
    #[arg(long, default_value_t = 68)]
    pub client_port: u16,

    /// Port to send to (bootps is 67)
    #[arg(long, default_value_t = 67)]
    pub server_port: u16,

    /// Retransmissions allowed per exchange stage
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Receive window for the first attempt, in milliseconds
    #[arg(long, default_value_t = 4000)]
    pub base_timeout_ms: u64,
}

/// Everything that parameterizes one client. There are no config files and
/// no persisted state; a config plus a socket is the whole environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Unicast destination. `None` sends to the limited broadcast address
    /// with the broadcast flag set.
    pub server: Option<Ipv4Addr>,
    /// Local port to bind and send from.
    pub client_port: u16,
    /// Remote port to send to.
    pub server_port: u16,
    /// Local address to bind.
    pub bind_address: Ipv4Addr,
    /// Optional device to pin the socket to (`SO_BINDTODEVICE`, Linux only).
    pub interface: Option<String>,
    pub hardware_address: Bytes,
    /// Caller options merged into outgoing DISCOVER/REQUEST messages.
    pub options: Vec<DhcpOption>,
    pub retry: RetryPolicy,
    /// Hard cap on the whole exchange, across all retry windows.
    pub overall_deadline: Option<Duration>,
}

impl ClientConfig {
    pub fn new(hardware_address: Bytes) -> Self {
        Self {
            server: None,
            client_port: 68,
            server_port: 67,
            bind_address: Ipv4Addr::UNSPECIFIED,
            interface: None,
            hardware_address,
            options: Vec::new(),
            retry: RetryPolicy::default(),
            overall_deadline: None,
        }
    }

    /// Targets a specific server instead of broadcasting.
    pub fn with_server(mut self, server: Ipv4Addr) -> Self {
        self.server = Some(server);
        self
    }

    /// Overrides both UDP ports, e.g. for loopback testing without
    /// privileged ports.
    pub fn with_ports(mut self, client_port: u16, server_port: u16) -> Self {
        self.client_port = client_port;
        self.server_port = server_port;
        self
    }

    pub fn with_options(mut self, options: Vec<DhcpOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = Some(deadline);
        self
    }
}
